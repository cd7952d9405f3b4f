//! # Runtime
//!
//! The orchestration context: one pool (with its host), one messenger hub, one
//! configuration. Cloning a `Runtime` is cheap and every clone refers to the same
//! context. Independent runtimes share nothing.

use std::fmt;
use std::sync::Arc;

use weft_api::Payload;

use crate::config::RuntimeConfig;
use crate::error::SystemError;
use crate::messenger::{Messenger, MessengerHub};
use crate::pool::Pool;
use crate::host::Host;
use crate::shared_map::{SharedMap, SharedMapBuilder};

struct RuntimeInner {
    config: RuntimeConfig,
    pool: Pool,
    hub: Arc<MessengerHub>,
}

#[derive(Clone)]
pub struct Runtime {
    inner: Arc<RuntimeInner>,
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("config", &self.inner.config)
            .field("pool", &self.inner.pool)
            .finish()
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new(RuntimeConfig::default())
    }
}

impl Runtime {
    pub fn new(config: RuntimeConfig) -> Self {
        let hub = MessengerHub::new();
        let host = Host::new(config.thread_name_prefix.clone(), Arc::clone(&hub));
        let pool = Pool::new(config.clone(), host);
        tracing::info!(ceiling = pool.ceiling(), "runtime created");
        Self {
            inner: Arc::new(RuntimeInner { config, pool, hub }),
        }
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.inner.config
    }

    pub fn pool(&self) -> &Pool {
        &self.inner.pool
    }

    pub fn hub(&self) -> &Arc<MessengerHub> {
        &self.inner.hub
    }

    /// Attach a new instance to the messenger channel `name`.
    pub fn messenger(&self, name: &str) -> Messenger {
        self.inner.hub.open(name)
    }

    /// A shared map sized with this runtime's multiplier.
    pub fn shared_map<I, K, V>(&self, initial: I) -> Result<SharedMap, SystemError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Payload>,
    {
        SharedMapBuilder::default()
            .multiplier(self.inner.config.shared_map_multiplier)
            .build(initial)
            .map_err(SystemError::from)
    }

    /// Wait for every reffed worker to end.
    pub async fn join(&self) -> Result<(), SystemError> {
        let host = self.inner.pool.host().clone();
        let failures = tokio::task::spawn_blocking(move || host.join_all())
            .await
            .map_err(|err| SystemError::Other(err.into()))?;
        into_join_result(failures)
    }

    /// Blocking variant of `join`.
    pub fn join_blocking(&self) -> Result<(), SystemError> {
        into_join_result(self.inner.pool.host().join_all())
    }

    /// Stop admitting workers. Running workers finish on their own.
    pub fn shutdown(&self) {
        tracing::info!("runtime shutting down");
        self.inner.pool.shutdown();
    }
}

fn into_join_result(failures: Vec<(crate::host::WorkerId, String)>) -> Result<(), SystemError> {
    match failures.into_iter().next() {
        None => Ok(()),
        Some((worker, reason)) => Err(SystemError::JoinError(worker.to_string(), reason)),
    }
}
