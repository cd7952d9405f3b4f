use std::time::Duration;

/// Default multiplier used to size SharedMap buffers from their initial contents.
pub const DEFAULT_SHARED_MAP_MULTIPLIER: usize = 10;

// --- Configuration Enums ---

/// Pool ceiling expressed as a multiple of the logical core count.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Concurrency {
    Quarter,
    Half,
    /// One worker per logical core.
    #[default]
    Single,
    Double,
    Quadruple,
    Sextuple,
    Octuple,
    Decuple,
}

impl Concurrency {
    /// Number of concurrently running workers allowed for `cores` logical cores.
    /// Never below one.
    pub fn ceiling(self, cores: usize) -> usize {
        let scaled = match self {
            Concurrency::Quarter => cores / 4,
            Concurrency::Half => cores / 2,
            Concurrency::Single => cores,
            Concurrency::Double => cores * 2,
            Concurrency::Quadruple => cores * 4,
            Concurrency::Sextuple => cores * 6,
            Concurrency::Octuple => cores * 8,
            Concurrency::Decuple => cores * 10,
        };
        scaled.max(1)
    }
}

/// Whether a worker keeps `Runtime::join` waiting for it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Reference {
    #[default]
    Ref,
    /// The worker is detached and never joined.
    Unref,
}

/// Per-thread resource limits applied at creation.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ResourceLimits {
    /// Stack size of the worker thread in bytes
    pub stack_size: Option<usize>,
}

// --- Runtime Configuration ---

/// Configuration for a `Runtime`.
#[derive(Clone, Debug)]
pub struct RuntimeConfig {
    /// Ceiling multiplier over the logical core count.
    pub concurrency: Concurrency,

    /// Absolute ceiling; overrides `concurrency` when set.
    pub max_workers: Option<usize>,

    /// Multiplier used to size SharedMap buffers.
    pub shared_map_multiplier: usize,

    /// Prefix for worker thread names.
    pub thread_name_prefix: String,

    /// Stack size for workers that do not specify one.
    pub default_stack_size: Option<usize>,

    /// How long `Service::launch` waits for `Initialized`. `None` waits forever.
    pub launch_timeout: Option<Duration>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            concurrency: Concurrency::Single,
            max_workers: None,
            shared_map_multiplier: DEFAULT_SHARED_MAP_MULTIPLIER,
            thread_name_prefix: "weft-worker-".to_string(),
            default_stack_size: None,
            launch_timeout: None,
        }
    }
}

impl RuntimeConfig {
    /// Pool ceiling for this machine.
    pub fn ceiling(&self) -> usize {
        match self.max_workers {
            Some(max) => max.max(1),
            None => self.concurrency.ceiling(num_cpus::get()),
        }
    }

    /// Merge runtime defaults into per-worker options.
    pub fn merge_with_worker_options(&self, options: &WorkerOptions) -> WorkerOptions {
        WorkerOptions {
            priority: options.priority,
            reference: options.reference,
            limits: ResourceLimits {
                stack_size: options.limits.stack_size.or(self.default_stack_size),
            },
            argv: options.argv.clone(),
            name: options.name.clone(),
        }
    }
}

// --- Worker Options ---

/// Creation options for a single worker.
#[derive(Clone, Debug, Default)]
pub struct WorkerOptions {
    /// Admit ahead of ordinary queued items.
    pub priority: bool,

    pub reference: Reference,

    pub limits: ResourceLimits,

    /// Startup arguments visible to the worker.
    pub argv: Vec<String>,

    /// Thread name suffix; a generated id is used when absent.
    pub name: Option<String>,
}

impl WorkerOptions {
    pub fn priority(mut self) -> Self {
        self.priority = true;
        self
    }

    pub fn unref(mut self) -> Self {
        self.reference = Reference::Unref;
        self
    }

    pub fn with_stack_size(mut self, bytes: usize) -> Self {
        self.limits.stack_size = Some(bytes);
        self
    }

    pub fn with_argv<I, S>(mut self, argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.argv = argv.into_iter().map(Into::into).collect();
        self
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}
