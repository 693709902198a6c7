//! Worker pool driving the work queue through the reconciler

use std::future::Future;
use std::sync::Arc;

use tokio::task::JoinSet;
use tracing::{debug, error, info};

use crate::config::ControllerConfig;
use crate::event_router::EventRouter;
use crate::events::EventRecorder;
use crate::reconciler::{Reconciler, SyncOutcome};
use crate::store::ResourceStore;
use crate::workqueue::WorkQueue;
use crate::{ControllerError, Result};

/// Name of the controller's work queue
pub const QUEUE_NAME: &str = "VirtualRouters";

pub struct VirtualRouterController {
    queue: WorkQueue<String>,
    store: Arc<dyn ResourceStore>,
    reconciler: Reconciler,
}

impl VirtualRouterController {
    pub fn new(
        store: Arc<dyn ResourceStore>,
        recorder: Arc<dyn EventRecorder>,
        config: &ControllerConfig,
    ) -> Self {
        Self {
            queue: WorkQueue::new(QUEUE_NAME, config.rate_limiter()),
            reconciler: Reconciler::new(Arc::clone(&store), recorder),
            store,
        }
    }

    pub fn queue(&self) -> &WorkQueue<String> {
        &self.queue
    }

    /// Router feeding watch notifications into this controller's queue
    pub fn event_router(&self) -> EventRouter {
        EventRouter::new(self.queue.clone(), Arc::clone(&self.store))
    }

    /// Take one key off the queue and sync it.
    ///
    /// Returns false once the queue is shut down and drained.
    pub async fn process_next_work_item(&self) -> bool {
        let Some(key) = self.queue.get().await else {
            return false;
        };

        match self.reconciler.sync(&key).await {
            Ok(outcome) => {
                self.queue.forget(&key).await;
                match outcome {
                    SyncOutcome::Synced { available_replicas } => {
                        info!(%key, available_replicas, "Successfully synced");
                    }
                    SyncOutcome::Dropped(reason) => debug!(%key, ?reason, "Dropped key"),
                }
            }
            Err(e) if !e.is_retryable() => {
                self.queue.forget(&key).await;
                error!(%key, error = %e, "Error syncing, not retrying");
            }
            Err(e) => {
                self.queue.add_rate_limited(key.clone()).await;
                error!(%key, error = %e, "Error syncing, requeuing");
            }
        }

        self.queue.done(&key).await;
        true
    }

    async fn run_worker(self: Arc<Self>, id: usize) {
        debug!(worker = id, "Worker started");
        while self.process_next_work_item().await {}
        debug!(worker = id, "Worker stopped");
    }

    /// Wait for `caches_synced`, then process keys with `workers` workers
    /// until `shutdown` resolves. In-flight and queued keys are drained
    /// before returning.
    ///
    /// Fails if the caches never sync or a worker panics.
    pub async fn run<S, F>(self: Arc<Self>, workers: usize, caches_synced: S, shutdown: F) -> Result<()>
    where
        S: Future<Output = Result<()>>,
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        info!("Starting VirtualRouter controller");

        info!("Waiting for informer caches to sync");
        let synced = tokio::select! {
            synced = caches_synced => synced,
            _ = &mut shutdown => Err(ControllerError::CacheSync),
        };
        if let Err(e) = synced {
            self.queue.shut_down().await;
            return Err(e);
        }

        info!(workers, "Starting workers");
        let mut pool = JoinSet::new();
        for id in 0..workers {
            pool.spawn(Arc::clone(&self).run_worker(id));
        }
        info!("Started workers");

        let mut failure = None;
        tokio::select! {
            _ = &mut shutdown => info!("Shutting down workers"),
            Some(joined) = pool.join_next() => {
                error!("Worker exited before shutdown, stopping controller");
                failure = Some(worker_failure(joined));
            }
        }

        self.queue.shut_down().await;
        while let Some(joined) = pool.join_next().await {
            if joined.is_err() && failure.is_none() {
                failure = Some(worker_failure(joined));
            }
        }
        info!("Workers stopped");

        match failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

fn worker_failure(joined: std::result::Result<(), tokio::task::JoinError>) -> ControllerError {
    match joined {
        Err(e) if e.is_panic() => {
            error!(error = %e, "Worker panicked");
            ControllerError::WorkerPanicked(e.to_string())
        }
        Err(e) => ControllerError::Internal(format!("worker cancelled: {}", e)),
        Ok(()) => ControllerError::Internal("worker exited unexpectedly".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::time::Duration;

    use async_trait::async_trait;
    use k8s_openapi::api::apps::v1::Deployment;
    use tokio::sync::oneshot;
    use virtualrouter_api::{VirtualRouter, VirtualRouterSpec};

    use crate::fake::{FakeRecorder, FakeStore, Write};
    use crate::store::{SupportingKind, SupportingObject};

    fn intent() -> VirtualRouter {
        named_intent("r1")
    }

    fn named_intent(name: &str) -> VirtualRouter {
        let mut vr = VirtualRouter::new(
            name,
            VirtualRouterSpec {
                deployment_name: "d1".to_string(),
                replicas: Some(2),
                image: "img:v1".to_string(),
                node_selector: BTreeMap::new(),
                affinity: None,
            },
        );
        vr.metadata.namespace = Some("default".to_string());
        vr
    }

    fn controller(store: Arc<dyn ResourceStore>) -> Arc<VirtualRouterController> {
        controller_with(store, &ControllerConfig::default())
    }

    fn controller_with(
        store: Arc<dyn ResourceStore>,
        config: &ControllerConfig,
    ) -> Arc<VirtualRouterController> {
        Arc::new(VirtualRouterController::new(
            store,
            Arc::new(FakeRecorder::new()),
            config,
        ))
    }

    fn insert_foreign_deployment(store: &FakeStore, namespace: &str) {
        let mut foreign = Deployment::default();
        foreign.metadata.name = Some("d1".to_string());
        foreign.metadata.namespace = Some(namespace.to_string());
        store.insert_deployment(foreign);
    }

    #[tokio::test]
    async fn test_success_forgets_key() {
        let store = Arc::new(FakeStore::new());
        store.insert_router(intent());
        let controller = controller(store.clone());
        let key = "default/r1".to_string();

        controller.queue().add(key.clone()).await;
        assert!(controller.process_next_work_item().await);

        assert_eq!(controller.queue().num_requeues(&key).await, 0);
        assert!(controller.queue().is_empty().await);
        assert!(store.deployment("r1", "d1").is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_conflict_requeues_with_backoff() {
        let store = Arc::new(FakeStore::new());
        store.insert_router(intent());
        insert_foreign_deployment(&store, "r1");

        let controller = controller(store.clone());
        let key = "default/r1".to_string();

        controller.queue().add(key.clone()).await;
        assert!(controller.process_next_work_item().await);
        assert_eq!(controller.queue().num_requeues(&key).await, 1);
        assert!(controller.queue().is_empty().await, "requeue waits for backoff");

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(controller.queue().len().await, 1);

        assert!(controller.process_next_work_item().await);
        assert_eq!(controller.queue().num_requeues(&key).await, 2);
        assert!(store
            .writes()
            .iter()
            .all(|w| !matches!(w, Write::CreateDeployment(_) | Write::UpdateDeployment { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_starved_token_bucket_still_requeues() {
        let store = Arc::new(FakeStore::new());
        store.insert_router(intent());
        insert_foreign_deployment(&store, "r1");

        let config = ControllerConfig {
            qps: 1e-20,
            burst: 0,
            ..Default::default()
        };
        let controller = controller_with(store.clone(), &config);
        let key = "default/r1".to_string();
        controller.queue().add(key.clone()).await;

        let worker = Arc::clone(&controller);
        let processed = tokio::spawn(async move { worker.process_next_work_item().await })
            .await
            .expect("requeue must not panic");
        assert!(processed);
        assert_eq!(controller.queue().num_requeues(&key).await, 1);

        // the key was released, so a fresh add is visible right away
        controller.queue().add(key.clone()).await;
        assert_eq!(controller.queue().len().await, 1);
    }

    #[tokio::test]
    async fn test_dropped_key_is_forgotten() {
        let store = Arc::new(FakeStore::new());
        let controller = controller(store.clone());
        let key = "default/missing".to_string();

        controller.queue().add(key.clone()).await;
        assert!(controller.process_next_work_item().await);
        assert_eq!(controller.queue().num_requeues(&key).await, 0);
        assert!(store.writes().is_empty());
    }

    #[tokio::test]
    async fn test_run_processes_until_shutdown() {
        let store = Arc::new(FakeStore::new());
        store.insert_router(intent());
        store.set_available_replicas(2);
        let controller = controller(store.clone());

        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let running = tokio::spawn(Arc::clone(&controller).run(
            2,
            async { Ok(()) },
            async {
                let _ = stop_rx.await;
            },
        ));

        controller.queue().add("default/r1".to_string()).await;
        tokio::time::timeout(Duration::from_secs(5), async {
            while store.router("default", "r1").unwrap().status.is_none() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("status should be written");

        stop_tx.send(()).unwrap();
        running.await.unwrap().unwrap();
        assert!(controller.queue().is_shutting_down().await);
        assert_eq!(
            store.router("default", "r1").unwrap().status.as_ref().unwrap().available_replicas,
            2
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_failing_key_does_not_block_others() {
        let store = Arc::new(FakeStore::new());
        store.insert_router(named_intent("r1"));
        store.insert_router(named_intent("r2"));
        insert_foreign_deployment(&store, "r1");
        store.set_available_replicas(2);
        let controller = controller(store.clone());

        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let running = tokio::spawn(Arc::clone(&controller).run(
            2,
            async { Ok(()) },
            async {
                let _ = stop_rx.await;
            },
        ));

        let failing = "default/r1".to_string();
        controller.queue().add(failing.clone()).await;
        controller.queue().add("default/r2".to_string()).await;

        tokio::time::timeout(Duration::from_secs(60), async {
            loop {
                let synced = store.router("default", "r2").unwrap().status.is_some();
                if synced && controller.queue().num_requeues(&failing).await >= 3 {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("r2 should sync while r1 keeps retrying");

        stop_tx.send(()).unwrap();
        running.await.unwrap().unwrap();

        assert!(store.router("default", "r1").unwrap().status.is_none());
        assert_eq!(
            store.router("default", "r2").unwrap().status.as_ref().unwrap().available_replicas,
            2
        );
        assert!(store.deployment("r1", "d1").unwrap().metadata.owner_references.is_none());
    }

    #[tokio::test]
    async fn test_workers_wait_for_cache_sync() {
        let store = Arc::new(FakeStore::new());
        store.insert_router(intent());
        let controller = controller(store.clone());
        controller.queue().add("default/r1".to_string()).await;

        let (synced_tx, synced_rx) = oneshot::channel::<()>();
        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let running = tokio::spawn(Arc::clone(&controller).run(
            2,
            async { synced_rx.await.map_err(|_| ControllerError::CacheSync) },
            async {
                let _ = stop_rx.await;
            },
        ));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(store.writes().is_empty(), "no sync before caches are ready");
        assert_eq!(controller.queue().len().await, 1);

        synced_tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(5), async {
            while store.router("default", "r1").unwrap().status.is_none() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("status should be written once caches sync");

        stop_tx.send(()).unwrap();
        running.await.unwrap().unwrap();
        assert!(store.deployment("r1", "d1").is_some());
    }

    #[tokio::test]
    async fn test_run_stops_when_caches_never_sync() {
        let controller = controller(Arc::new(FakeStore::new()));
        let result = Arc::clone(&controller)
            .run(2, futures::future::pending(), async {})
            .await;
        assert!(matches!(result, Err(ControllerError::CacheSync)));
        assert!(controller.queue().is_shutting_down().await);
    }

    struct PanickingStore;

    #[async_trait]
    impl ResourceStore for PanickingStore {
        async fn get_virtual_router(
            &self,
            _namespace: &str,
            _name: &str,
        ) -> Result<Option<Arc<VirtualRouter>>> {
            panic!("store exploded")
        }

        async fn update_virtual_router_status(&self, _router: &VirtualRouter) -> Result<VirtualRouter> {
            unreachable!()
        }

        async fn get_deployment(&self, _namespace: &str, _name: &str) -> Result<Option<Arc<Deployment>>> {
            unreachable!()
        }

        async fn create_deployment(&self, _deployment: &Deployment) -> Result<Deployment> {
            unreachable!()
        }

        async fn update_deployment(&self, _deployment: &Deployment) -> Result<Deployment> {
            unreachable!()
        }

        async fn supporting_object_exists(
            &self,
            _kind: SupportingKind,
            _namespace: &str,
            _name: &str,
        ) -> Result<bool> {
            unreachable!()
        }

        async fn create_supporting_object(&self, _object: &SupportingObject) -> Result<()> {
            unreachable!()
        }
    }

    #[tokio::test]
    async fn test_worker_panic_fails_run() {
        let controller = controller(Arc::new(PanickingStore));
        controller.queue().add("default/r1".to_string()).await;

        let result = tokio::time::timeout(
            Duration::from_secs(5),
            Arc::clone(&controller).run(1, async { Ok(()) }, futures::future::pending()),
        )
        .await
        .expect("run should stop after a panic");
        assert!(matches!(result, Err(ControllerError::WorkerPanicked(_))));
    }
}
