use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::runtime::Handle;
use weft_api::Payload;

use super::{CallTarget, Service, ServiceExit};
use crate::config::WorkerOptions;
use crate::error::CallError;
use crate::runtime::Runtime;
use crate::worker::{WorkerData, WorkerEntry};

struct Member {
    id: String,
    service: Service,
}

struct ClusterInner {
    runtime: Runtime,
    entry: Arc<dyn WorkerEntry>,
    data: WorkerData,
    options: WorkerOptions,
    auto_renew: AtomicBool,
    next_id: AtomicU64,
    members: Mutex<Vec<Member>>,
    /// Members still launching; only changed while `members` is locked.
    launching: AtomicUsize,
}

/// A place under the pool ceiling held by a member that is still launching.
struct Slot<'a> {
    launching: &'a AtomicUsize,
}

impl Drop for Slot<'_> {
    fn drop(&mut self) {
        self.launching.fetch_sub(1, Ordering::SeqCst);
    }
}

/// A set of services launched from the same definitions.
///
/// Calls go to the member with the fewest calls in flight. The cluster never grows
/// past the pool ceiling. With auto-renew on, a member that exits with a non-zero
/// code it was not asked for is replaced under the same id; its in-flight calls
/// are not replayed.
#[derive(Clone)]
pub struct ServiceCluster {
    inner: Arc<ClusterInner>,
}

impl fmt::Debug for ServiceCluster {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceCluster")
            .field("members", &self.ids())
            .field("auto_renew", &self.inner.auto_renew.load(Ordering::SeqCst))
            .finish()
    }
}

impl ServiceCluster {
    pub fn new(
        runtime: &Runtime,
        entry: Arc<dyn WorkerEntry>,
        data: WorkerData,
        options: WorkerOptions,
    ) -> Self {
        Self {
            inner: Arc::new(ClusterInner {
                runtime: runtime.clone(),
                entry,
                data,
                options,
                auto_renew: AtomicBool::new(false),
                next_id: AtomicU64::new(0),
                members: Mutex::new(Vec::new()),
                launching: AtomicUsize::new(0),
            }),
        }
    }

    pub fn set_auto_renew(&self, enabled: bool) {
        self.inner.auto_renew.store(enabled, Ordering::SeqCst);
    }

    pub fn auto_renew(self, enabled: bool) -> Self {
        self.set_auto_renew(enabled);
        self
    }

    /// Launch up to `count` services. Stops without error once the cluster has as
    /// many members as the pool ceiling. Returns how many were launched.
    pub async fn launch(&self, count: usize) -> Result<usize, CallError> {
        let mut launched = 0;
        for _ in 0..count {
            let Some(slot) = self.inner.reserve() else {
                tracing::debug!(members = self.len(), "cluster at pool ceiling");
                break;
            };
            let id = format!("service-{}", self.inner.next_id.fetch_add(1, Ordering::SeqCst));
            self.inner.launch_member(id, slot).await?;
            launched += 1;
        }
        Ok(launched)
    }

    /// The member with the fewest calls in flight; ties go to the oldest member.
    pub fn use_service(&self) -> Option<Service> {
        lock(&self.inner.members)
            .iter()
            .filter(|member| member.service.is_running())
            .min_by_key(|member| member.service.in_flight())
            .map(|member| member.service.clone())
    }

    /// The member `id`, or the least busy one if there is no such member.
    pub fn use_id(&self, id: &str) -> Option<Service> {
        self.get(id).or_else(|| self.use_service())
    }

    pub fn get(&self, id: &str) -> Option<Service> {
        lock(&self.inner.members)
            .iter()
            .find(|member| member.id == id)
            .map(|member| member.service.clone())
    }

    pub fn ids(&self) -> Vec<String> {
        lock(&self.inner.members)
            .iter()
            .map(|member| member.id.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        lock(&self.inner.members).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Close every member. Nothing is renewed.
    pub fn close_all(&self) {
        let members = std::mem::take(&mut *lock(&self.inner.members));
        tracing::debug!(members = members.len(), "closing cluster");
        for member in members {
            member.service.close();
        }
    }
}

#[async_trait]
impl CallTarget for ServiceCluster {
    async fn call(&self, task: &str, params: Vec<Payload>) -> Result<Payload, CallError> {
        let service = self.use_service().ok_or(CallError::Terminated)?;
        service.call(task, params).await
    }
}

impl ClusterInner {
    /// Take a slot if members plus launches in progress are below the ceiling.
    fn reserve(&self) -> Option<Slot<'_>> {
        let ceiling = self.runtime.pool().ceiling();
        let members = lock(&self.members);
        if members.len() + self.launching.load(Ordering::SeqCst) >= ceiling {
            return None;
        }
        self.launching.fetch_add(1, Ordering::SeqCst);
        Some(Slot {
            launching: &self.launching,
        })
    }

    async fn launch_member(self: &Arc<Self>, id: String, slot: Slot<'_>) -> Result<(), CallError> {
        let service = Service::launch(
            &self.runtime,
            Arc::clone(&self.entry),
            self.data.clone(),
            self.options.clone(),
        )
        .await?;

        let cluster = Arc::downgrade(self);
        let member_id = id.clone();
        let runtime = Handle::current();
        service
            .on_exit(move |exit| {
                if let Some(cluster) = cluster.upgrade() {
                    cluster.member_exited(&member_id, *exit, &runtime);
                }
            })
            .detach();

        tracing::debug!(member = %id, worker = %service.id(), "cluster member launched");
        let mut members = lock(&self.members);
        members.push(Member { id, service });
        drop(slot);
        // A member that exited before it was registered had nothing to remove.
        members.retain(|member| member.service.is_running());
        Ok(())
    }

    fn member_exited(self: &Arc<Self>, id: &str, exit: ServiceExit, runtime: &Handle) {
        let removed = {
            let mut members = lock(&self.members);
            let position = members.iter().position(|member| member.id == id);
            position.map(|index| members.remove(index))
        };
        if removed.is_none() {
            return;
        }

        let renew = exit.code != 0 && !exit.requested && self.auto_renew.load(Ordering::SeqCst);
        if !renew {
            return;
        }
        tracing::info!(member = %id, code = exit.code, "renewing cluster member");
        let cluster = Arc::clone(self);
        let id = id.to_string();
        runtime.spawn(async move {
            let Some(slot) = cluster.reserve() else {
                tracing::warn!(member = %id, "cluster at pool ceiling, member not renewed");
                return;
            };
            if let Err(err) = cluster.launch_member(id.clone(), slot).await {
                crate::log_error!(err, member = %id, "cluster member renewal failed");
            }
        });
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
