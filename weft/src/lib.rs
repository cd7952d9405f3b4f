// weft thread orchestration runtime
//
// Worker threads behind a bounded pool, with a correlation-keyed call protocol,
// a chunked stream transport, named messengers and a mutex-guarded shared map.

pub mod config;
pub mod error;
pub mod host;
pub mod logging;
pub mod messenger;
pub mod pool;
pub mod runtime;
pub mod service;
pub mod shared_map;
pub mod stream;
pub mod subscription;
pub mod sync;
pub mod worker;

// Re-export commonly used types
pub use config::{Concurrency, Reference, ResourceLimits, RuntimeConfig, WorkerOptions};
pub use error::{
    CallError, MessengerError, MutexError, PoolError, SharedMapError, SpawnError, StreamError,
    SystemError,
};
pub use host::{WorkerEvent, WorkerHandle, WorkerId};
pub use messenger::{Messenger, MessengerHub};
pub use pool::{Pool, PoolItem, Ticket};
pub use runtime::Runtime;
pub use service::{CallTarget, Service, ServiceCluster, ServiceExit, Task};
pub use shared_map::{SharedMap, SharedMapBuilder};
pub use stream::{message_channel, AcceptMode, MessagePort, StreamEndpoint, StreamWriter};
pub use subscription::Subscription;
pub use sync::{Counter, Mutex};
pub use worker::{DefinitionSet, Definitions, WorkerData, WorkerEntry, WorkerScope};

pub use weft_api::{Call, CorrelationKey, Payload, ThrownError};
