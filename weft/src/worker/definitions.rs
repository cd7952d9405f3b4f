use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use weft_api::{Call, Payload, ThrownError};

use super::scope::WorkerScope;
use super::{runner, WorkerEntry};

pub type TaskFn = Arc<dyn Fn(&WorkerScope, Vec<Payload>) -> anyhow::Result<Payload> + Send + Sync>;
/// Runs around every task; receives the task name.
pub type HookFn = Arc<dyn Fn(&WorkerScope, &str) -> anyhow::Result<()> + Send + Sync>;
pub type InitFn = Arc<dyn Fn(&WorkerScope) -> anyhow::Result<()> + Send + Sync>;
pub type MessageFn = Arc<dyn Fn(&WorkerScope, Payload) + Send + Sync>;

/// A named set of tasks plus optional hooks, started as either a task worker or a
/// service worker.
///
/// A worker only runs definitions whose identity matches the identity it was
/// started with; otherwise it takes no action and exits with code 0.
///
/// ```rust,ignore
/// let math = Definitions::new("math")
///     .task("add", |_, params| Ok(json!(params[0].as_i64() + params[1].as_i64())))
///     .before(|scope, task| { tracing::info!(task, "starting"); Ok(()) })
///     .into_entry();
/// ```
#[derive(Clone)]
pub struct Definitions {
    identity: String,
    tasks: HashMap<String, TaskFn>,
    before: Option<HookFn>,
    after: Option<HookFn>,
    init: Option<InitFn>,
    on_message: Option<MessageFn>,
}

impl fmt::Debug for Definitions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Definitions")
            .field("identity", &self.identity)
            .field("tasks", &self.task_names())
            .field("before", &self.before.is_some())
            .field("after", &self.after.is_some())
            .field("init", &self.init.is_some())
            .field("on_message", &self.on_message.is_some())
            .finish()
    }
}

impl Definitions {
    pub fn new(identity: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            tasks: HashMap::new(),
            before: None,
            after: None,
            init: None,
            on_message: None,
        }
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Sorted task names.
    pub fn task_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tasks.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn task<F>(mut self, name: impl Into<String>, task: F) -> Self
    where
        F: Fn(&WorkerScope, Vec<Payload>) -> anyhow::Result<Payload> + Send + Sync + 'static,
    {
        self.tasks.insert(name.into(), Arc::new(task));
        self
    }

    /// Register a task under `C::task_name()` that decodes its request as `C`.
    pub fn typed_task<C, F>(self, task: F) -> Self
    where
        C: Call,
        F: Fn(&WorkerScope, C) -> anyhow::Result<C::Output> + Send + Sync + 'static,
    {
        self.task(C::task_name(), move |scope, params| {
            let request = C::from_params(params)?;
            let output = task(scope, request)?;
            Ok(C::encode_output(&output)?)
        })
    }

    pub fn before<F>(mut self, hook: F) -> Self
    where
        F: Fn(&WorkerScope, &str) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.before = Some(Arc::new(hook));
        self
    }

    pub fn after<F>(mut self, hook: F) -> Self
    where
        F: Fn(&WorkerScope, &str) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.after = Some(Arc::new(hook));
        self
    }

    /// Service workers run this once, before reporting `Initialized`.
    pub fn init<F>(mut self, hook: F) -> Self
    where
        F: Fn(&WorkerScope) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.init = Some(Arc::new(hook));
        self
    }

    /// Handler for `Message` payloads posted to a service worker.
    pub fn on_message<F>(mut self, handler: F) -> Self
    where
        F: Fn(&WorkerScope, Payload) + Send + Sync + 'static,
    {
        self.on_message = Some(Arc::new(handler));
        self
    }

    pub fn into_entry(self) -> Arc<dyn WorkerEntry> {
        Arc::new(self)
    }

    /// Before-hook, task, after-hook. Any error is attributed to the task.
    pub(crate) fn invoke(
        &self,
        scope: &WorkerScope,
        name: &str,
        params: Vec<Payload>,
    ) -> Result<Payload, ThrownError> {
        let task = self
            .tasks
            .get(name)
            .ok_or_else(|| ThrownError::task_not_found(name))?;
        let thrown = |err: anyhow::Error| ThrownError::from_anyhow(name, &err);

        if let Some(before) = &self.before {
            before(scope, name).map_err(thrown)?;
        }
        let value = task(scope, params).map_err(thrown)?;
        if let Some(after) = &self.after {
            after(scope, name).map_err(thrown)?;
        }
        Ok(value)
    }

    pub(crate) fn run_init(&self, scope: &WorkerScope) -> Result<(), ThrownError> {
        match &self.init {
            Some(init) => init(scope).map_err(|err| ThrownError::from_anyhow("init", &err)),
            None => Ok(()),
        }
    }

    pub(crate) fn message_handler(&self) -> Option<&MessageFn> {
        self.on_message.as_ref()
    }
}

impl WorkerEntry for Definitions {
    fn run(&self, scope: &WorkerScope) {
        if scope.identity() != self.identity {
            tracing::debug!(
                requested = scope.identity(),
                identity = %self.identity,
                "identity mismatch, worker takes no action"
            );
            return;
        }
        runner::run(self, scope);
    }
}

/// Several `Definitions` behind one entry point, selected by identity.
#[derive(Clone, Debug, Default)]
pub struct DefinitionSet {
    sets: Vec<Definitions>,
}

impl DefinitionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, definitions: Definitions) -> Self {
        self.sets.push(definitions);
        self
    }

    pub fn identities(&self) -> Vec<&str> {
        self.sets.iter().map(Definitions::identity).collect()
    }

    pub fn into_entry(self) -> Arc<dyn WorkerEntry> {
        Arc::new(self)
    }
}

impl WorkerEntry for DefinitionSet {
    fn run(&self, scope: &WorkerScope) {
        match self.sets.iter().find(|set| set.identity == scope.identity()) {
            Some(definitions) => runner::run(definitions, scope),
            None => tracing::debug!(
                requested = scope.identity(),
                "no definitions with this identity, worker takes no action"
            ),
        }
    }
}
