//! Per-(provider, region) reconciliation controller.

use crate::acl;
use crate::counter::{Action, Counters};
use crate::diff;
use crate::foreman::{LocalIpSource, RoleSource};
use armada_cloud::{BootRequest, Machine as CloudMachine, Provider, ProviderKind, Status};
use armada_db::{Database, Table};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub(crate) const POLL_INTERVAL: Duration = Duration::from_secs(60);

/// Role refreshes from the foreman arrive in bursts; re-listing the
/// provider for each one would hammer its API.
const ROLE_REFRESH_DELAY: Duration = Duration::from_secs(5);

/// What a cycle accomplished; used to pace the next one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Machine-topology actions were issued or store rows changed.
    Acted,
    /// The region is converged; no store row moved this cycle.
    Idle,
    /// The cycle could not run: inventory failed or the namespace moved.
    Aborted,
}

/// Everything a cycle decided inside its transaction, to be carried out
/// against the provider afterwards.
struct SyncActions {
    boot: Vec<BootRequest>,
    stop: Vec<CloudMachine>,
    update_ips: Vec<CloudMachine>,
    desired_count: usize,
    wrote: bool,
}

/// Drives one provider's inventory in one region toward the store's
/// desired rows. Owns its [`Provider`] instance exclusively.
pub struct RegionController {
    db: Database,
    provider: Box<dyn Provider>,
    kind: ProviderKind,
    region: String,
    namespace: String,
    roles: Arc<dyn RoleSource>,
    local_ip: Arc<dyn LocalIpSource>,
    counters: Arc<Counters>,
}

impl RegionController {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        db: Database,
        provider: Box<dyn Provider>,
        kind: ProviderKind,
        region: impl Into<String>,
        namespace: impl Into<String>,
        roles: Arc<dyn RoleSource>,
        local_ip: Arc<dyn LocalIpSource>,
        counters: Arc<Counters>,
    ) -> Self {
        Self {
            db,
            provider,
            kind,
            region: region.into(),
            namespace: namespace.into(),
            roles,
            local_ip,
            counters,
        }
    }

    /// Reconcile until cancelled: once per store write touching the
    /// Machine or Blueprint table, and at least once per poll interval.
    pub async fn run(mut self, token: CancellationToken) {
        let mut trigger = self
            .db
            .trigger_tick(POLL_INTERVAL, &[Table::Machine, Table::Blueprint]);
        info!(provider = %self.kind, region = %self.region, "region controller started");

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                ev = trigger.recv() => {
                    if ev.is_none() {
                        break;
                    }
                }
            }
            if self.run_once().await == CycleOutcome::Idle {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = tokio::time::sleep(ROLE_REFRESH_DELAY) => {}
                }
            }
        }
        info!(provider = %self.kind, region = %self.region, "region controller stopped");
    }

    /// One reconciliation cycle.
    pub async fn run_once(&mut self) -> CycleOutcome {
        // Without fresh inventory no diff or action is safe.
        let mut observed = match self.provider.list().await {
            Ok(machines) => machines,
            Err(err) => {
                warn!(
                    provider = %self.kind,
                    region = %self.region,
                    %err,
                    "inventory listing failed; skipping cycle"
                );
                self.counters.failure(Action::List);
                return CycleOutcome::Aborted;
            }
        };

        // A listing need not know its own provider or region; tag them on,
        // then merge whatever role discovery has learned so far.
        for machine in &mut observed {
            machine.provider = self.kind;
            machine.region = self.region.clone();
            if let Some(public_ip) = machine.public_ip.as_deref() {
                machine.role = self.roles.role(public_ip);
                machine.connected = self.roles.is_connected(public_ip);
            }
        }

        let kind = self.kind;
        let region = self.region.clone();
        let namespace = self.namespace.clone();
        let actions = self
            .db
            .transact(move |txn| {
                let Some(blueprint) = txn.blueprint() else {
                    debug!(%namespace, "no blueprint applied; aborting cycle");
                    return None;
                };
                if blueprint.namespace != namespace {
                    // Expected race during topology changes, not an error.
                    debug!(
                        %namespace,
                        current = %blueprint.namespace,
                        "namespace changed mid-cycle; aborting"
                    );
                    return None;
                }

                let desired = txn.machines_where(|m| m.provider == kind && m.region == region);
                let desired_count = desired.len();
                let plan = diff::diff(desired, observed);

                let mut wrote = false;
                let mut boot = Vec::new();
                for row in &plan.boot {
                    boot.push(row.boot_request());
                    // Re-marking an already-booting row would wake our own
                    // trigger for nothing.
                    if row.status != Some(Status::Booting) {
                        let mut row = row.clone();
                        row.status = Some(Status::Booting);
                        txn.commit_machine(row);
                        wrote = true;
                    }
                }

                let mut update_ips = Vec::new();
                for (mut row, machine) in plan.pairs {
                    let before = row.clone();
                    if let Some(target) = diff::apply_pair(&mut row, &machine) {
                        update_ips.push(target);
                    }
                    if row != before {
                        txn.commit_machine(row);
                        wrote = true;
                    }
                }

                Some(SyncActions {
                    boot,
                    stop: plan.stop,
                    update_ips,
                    desired_count,
                    wrote,
                })
            })
            .await;

        let Some(actions) = actions else {
            return CycleOutcome::Aborted;
        };

        if actions.boot.is_empty() && actions.stop.is_empty() && actions.update_ips.is_empty() {
            // Topology is stable; this is the only kind of cycle that may
            // narrow ACLs, so live traffic is never cut mid-convergence.
            if actions.desired_count > 0 {
                self.sync_acls().await;
            }
            if actions.wrote {
                return CycleOutcome::Acted;
            }
            return CycleOutcome::Idle;
        }

        self.apply(actions).await;
        CycleOutcome::Acted
    }

    /// Issue the cycle's provider calls. Each class is independent and
    /// best-effort: a failure is counted and left for a later cycle.
    async fn apply(&self, actions: SyncActions) {
        let provider = self.provider.as_ref();
        let boot = async {
            if actions.boot.is_empty() {
                return;
            }
            let count = actions.boot.len();
            match provider.boot(actions.boot).await {
                Ok(()) => info!(provider = %self.kind, region = %self.region, count, "booted machines"),
                Err(err) => {
                    warn!(provider = %self.kind, region = %self.region, %err, "boot failed");
                    self.counters.failure(Action::Boot);
                }
            }
        };
        let stop = async {
            if actions.stop.is_empty() {
                return;
            }
            let count = actions.stop.len();
            match provider.stop(&actions.stop).await {
                Ok(()) => info!(provider = %self.kind, region = %self.region, count, "stopped machines"),
                Err(err) => {
                    warn!(provider = %self.kind, region = %self.region, %err, "stop failed");
                    self.counters.failure(Action::Stop);
                }
            }
        };
        let update_ips = async {
            if actions.update_ips.is_empty() {
                return;
            }
            let count = actions.update_ips.len();
            match provider.update_floating_ips(&actions.update_ips).await {
                Ok(()) => {
                    info!(provider = %self.kind, region = %self.region, count, "updated floating IPs");
                }
                Err(err) => {
                    warn!(provider = %self.kind, region = %self.region, %err, "floating IP update failed");
                    self.counters.failure(Action::UpdateFloatingIps);
                }
            }
        };
        tokio::join!(boot, stop, update_ips);
    }

    async fn sync_acls(&self) {
        let local_ip = match self.local_ip.local_ip().await {
            Ok(ip) => ip,
            Err(err) => {
                warn!(
                    provider = %self.kind,
                    region = %self.region,
                    %err,
                    "operator address resolution failed; skipping ACL sync"
                );
                self.counters.failure(Action::SetAcls);
                return;
            }
        };

        let Some(blueprint) = self.db.transact(|txn| txn.blueprint()).await else {
            return;
        };
        let acls = acl::desired_acls(&blueprint, &local_ip);

        if let Err(err) = self.provider.set_acls(&acls).await {
            warn!(provider = %self.kind, region = %self.region, %err, "ACL sync failed");
            self.counters.failure(Action::SetAcls);
        }
    }
}
