//! Controller lifecycle management.
//!
//! The orchestrator owns the registry of running region controllers and
//! keeps it aligned with the regions the store declares. Regions are
//! logically independent, so there is no cross-region locking — but within
//! one region the old controller's shutdown is always confirmed before a
//! replacement starts, so a region never has two writers.

use crate::counter::Counters;
use crate::foreman::{ConnectivityProber, LocalIpSource, RoleSource};
use crate::region::{POLL_INTERVAL, RegionController};
use crate::status;
use armada_cloud::{ProviderFactory, ProviderKind};
use armada_db::{Database, Table};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

type RegionKey = (ProviderKind, String);

struct Controller {
    namespace: String,
    token: CancellationToken,
    reconcile: JoinHandle<()>,
    status: JoinHandle<()>,
    counters: Arc<Counters>,
}

/// Starts and stops region controllers as the store's topology changes.
pub struct Orchestrator {
    db: Database,
    factory: Arc<dyn ProviderFactory>,
    roles: Arc<dyn RoleSource>,
    prober: Arc<dyn ConnectivityProber>,
    local_ip: Arc<dyn LocalIpSource>,
    controllers: HashMap<RegionKey, Controller>,
}

impl Orchestrator {
    pub fn new(
        db: Database,
        factory: Arc<dyn ProviderFactory>,
        roles: Arc<dyn RoleSource>,
        prober: Arc<dyn ConnectivityProber>,
        local_ip: Arc<dyn LocalIpSource>,
    ) -> Self {
        Self {
            db,
            factory,
            roles,
            prober,
            local_ip,
            controllers: HashMap::new(),
        }
    }

    /// Watch the store and manage controllers until cancelled.
    pub async fn run(mut self, token: CancellationToken) {
        let mut trigger = self
            .db
            .trigger_tick(POLL_INTERVAL, &[Table::Machine, Table::Blueprint]);
        info!("orchestrator started");

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                ev = trigger.recv() => {
                    if ev.is_none() {
                        break;
                    }
                }
            }
            self.sync_controllers().await;
        }

        self.shutdown().await;
        info!("orchestrator stopped");
    }

    /// Align running controllers with the regions the store declares.
    pub async fn sync_controllers(&mut self) {
        let (namespace, regions) = self
            .db
            .transact(|txn| {
                let namespace = txn.blueprint().map(|b| b.namespace);
                let regions: BTreeSet<RegionKey> = txn
                    .machines()
                    .iter()
                    .map(|m| (m.provider, m.region.clone()))
                    .collect();
                (namespace, regions)
            })
            .await;

        let Some(namespace) = namespace else {
            // No blueprint: nothing should be running.
            self.shutdown().await;
            return;
        };

        // Stop controllers whose region vanished or whose namespace moved,
        // and wait for each shutdown before any replacement may start.
        let stale: Vec<RegionKey> = self
            .controllers
            .iter()
            .filter(|&(key, c)| !regions.contains(key) || c.namespace != namespace)
            .map(|(key, _)| key.clone())
            .collect();
        for key in stale {
            if let Some(controller) = self.controllers.remove(&key) {
                stop_controller(&key, controller).await;
            }
        }

        for key in regions {
            if self.controllers.contains_key(&key) {
                continue;
            }
            let (kind, region) = key.clone();
            info!(provider = %kind, %region, %namespace, "starting region controller");

            let token = CancellationToken::new();
            let counters = Arc::new(Counters::default());
            let provider = self.factory.new_provider(kind, &region);
            let controller = RegionController::new(
                self.db.clone(),
                provider,
                kind,
                region.clone(),
                namespace.clone(),
                Arc::clone(&self.roles),
                Arc::clone(&self.local_ip),
                Arc::clone(&counters),
            );
            let reconcile = tokio::spawn(controller.run(token.clone()));
            let status = tokio::spawn(status::run_evaluator(
                self.db.clone(),
                kind,
                region,
                Arc::clone(&self.prober),
                token.clone(),
            ));
            self.controllers.insert(
                key,
                Controller {
                    namespace: namespace.clone(),
                    token,
                    reconcile,
                    status,
                    counters,
                },
            );
        }
    }

    /// Failure counters for a running region, if one is registered.
    pub fn counters(&self, kind: ProviderKind, region: &str) -> Option<Arc<Counters>> {
        self.controllers
            .get(&(kind, region.to_string()))
            .map(|c| Arc::clone(&c.counters))
    }

    /// Regions with a live controller.
    pub fn running(&self) -> Vec<(ProviderKind, String)> {
        self.controllers.keys().cloned().collect()
    }

    async fn shutdown(&mut self) {
        let keys: Vec<RegionKey> = self.controllers.keys().cloned().collect();
        for key in keys {
            if let Some(controller) = self.controllers.remove(&key) {
                stop_controller(&key, controller).await;
            }
        }
    }
}

/// Cancel a controller and wait until both of its tasks have exited, so
/// the region slot is free for reuse.
async fn stop_controller(key: &RegionKey, controller: Controller) {
    let (kind, region) = key;
    controller.token.cancel();
    for handle in [controller.reconcile, controller.status] {
        if let Err(err) = handle.await
            && err.is_panic()
        {
            error!(provider = %kind, %region, "controller task panicked during shutdown");
        }
    }
    debug!(provider = %kind, %region, "region controller shut down");
}
