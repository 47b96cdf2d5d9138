//! End-to-end reconciliation against the in-memory mock provider.

use armada_cloud::mock::MockProvider;
use armada_cloud::{
    Acl, BootRequest, CloudError, Machine as CloudMachine, Provider, ProviderFactory, ProviderKind,
    Role, Status,
};
use armada_controlplane::counter::{Action, Counters};
use armada_controlplane::foreman::{AssumeReachable, FixedLocalIp, StaticRoles};
use armada_controlplane::{CycleOutcome, Orchestrator, RegionController};
use armada_db::{Blueprint, Database, Machine};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

const KIND: ProviderKind = ProviderKind::Mock;
const REGION: &str = "r1";
const OPERATOR_IP: &str = "192.0.2.7";

struct Harness {
    db: Database,
    provider: MockProvider,
    roles: Arc<StaticRoles>,
    counters: Arc<Counters>,
    controller: RegionController,
}

async fn harness(namespace: &str) -> Harness {
    let db = Database::new();
    db.transact(|txn| {
        txn.insert_blueprint(Blueprint::new("prod"));
    })
    .await;

    let provider = MockProvider::new(KIND, REGION);
    let roles = Arc::new(StaticRoles::new());
    let counters = Arc::new(Counters::default());
    let controller = RegionController::new(
        db.clone(),
        Box::new(provider.clone()),
        KIND,
        REGION,
        namespace,
        roles.clone(),
        Arc::new(FixedLocalIp(OPERATOR_IP.to_string())),
        counters.clone(),
    );
    Harness {
        db,
        provider,
        roles,
        counters,
        controller,
    }
}

async fn declare(db: &Database, size: &str, role: Role) -> Machine {
    let size = size.to_string();
    db.transact(move |txn| {
        let mut machine = Machine::new(KIND, REGION);
        machine.size = size;
        machine.disk_size = 32;
        machine.role = Some(role);
        txn.insert_machine(machine)
    })
    .await
}

#[tokio::test]
async fn boots_binds_and_syncs_acls_over_cycles() {
    let mut h = harness("prod").await;
    declare(&h.db, "m4.large", Role::Master).await;
    declare(&h.db, "m4.xlarge", Role::Worker).await;

    // Cycle 1: nothing observed yet, so both rows boot. ACLs must not be
    // touched while the topology is in motion.
    assert_eq!(h.controller.run_once().await, CycleOutcome::Acted);
    assert_eq!(h.provider.machines().await.len(), 2);
    let rows = h.db.transact(|txn| txn.machines()).await;
    assert!(rows.iter().all(|m| m.status == Some(Status::Booting)));
    assert!(rows.iter().all(|m| m.cloud_id.is_none()));
    assert_eq!(h.provider.acls().await, None);

    // Cycle 2: the booted machines are observed and paired. Addresses are
    // copied and the now-stable topology lets ACLs sync, but no identity
    // binds until role discovery corroborates.
    assert_eq!(h.controller.run_once().await, CycleOutcome::Acted);
    let rows = h.db.transact(|txn| txn.machines()).await;
    assert!(rows.iter().all(|m| m.public_ip.is_some()));
    assert!(rows.iter().all(|m| m.cloud_id.is_none()));
    assert_eq!(h.provider.machines().await.len(), 2);
    assert_eq!(
        h.provider.acls().await,
        Some(vec![Acl::new(format!("{OPERATOR_IP}/32"), 1, 65535)])
    );

    // Role discovery catches up.
    for machine in h.provider.machines().await {
        let role = if machine.size == "m4.large" {
            Role::Master
        } else {
            Role::Worker
        };
        let ip = machine.public_ip.clone().expect("mock assigns addresses");
        h.roles.report(ip, role, true);
    }

    // Cycle 3: identities bind.
    assert_eq!(h.controller.run_once().await, CycleOutcome::Acted);
    let rows = h.db.transact(|txn| txn.machines()).await;
    assert!(rows.iter().all(|m| m.cloud_id.is_some()));
    assert!(rows.iter().all(|m| m.connected));
    assert_eq!(
        h.provider.acls().await,
        Some(vec![Acl::new(format!("{OPERATOR_IP}/32"), 1, 65535)])
    );

    // Cycle 4: fully converged.
    assert_eq!(h.controller.run_once().await, CycleOutcome::Idle);
}

#[tokio::test]
async fn undeclared_machines_are_stopped() {
    let mut h = harness("prod").await;
    let row = declare(&h.db, "m4.large", Role::Worker).await;

    h.controller.run_once().await;
    assert_eq!(h.provider.machines().await.len(), 1);

    h.db.transact(move |txn| txn.remove_machine(row.id)).await;
    assert_eq!(h.controller.run_once().await, CycleOutcome::Acted);
    assert!(h.provider.machines().await.is_empty());
}

#[tokio::test]
async fn floating_ip_converges_after_binding() {
    let mut h = harness("prod").await;
    let row = declare(&h.db, "m4.large", Role::Worker).await;

    h.controller.run_once().await; // boot
    h.controller.run_once().await; // pair
    for machine in h.provider.machines().await {
        let ip = machine.public_ip.clone().expect("mock assigns addresses");
        h.roles.report(ip, Role::Worker, true);
    }
    h.controller.run_once().await; // bind

    h.db.transact(move |txn| {
        if let Some(mut machine) = txn.machine(row.id) {
            machine.floating_ip = Some("198.51.100.9".to_string());
            txn.commit_machine(machine);
        }
    })
    .await;

    assert_eq!(h.controller.run_once().await, CycleOutcome::Acted);
    let machines = h.provider.machines().await;
    assert_eq!(machines[0].floating_ip.as_deref(), Some("198.51.100.9"));

    // And once converged, the cycle settles back to idle.
    h.controller.run_once().await;
    assert_eq!(h.controller.run_once().await, CycleOutcome::Idle);
}

#[tokio::test]
async fn namespace_race_aborts_without_actions() {
    let mut h = harness("stale").await;
    declare(&h.db, "m4.large", Role::Worker).await;

    assert_eq!(h.controller.run_once().await, CycleOutcome::Aborted);
    assert!(h.provider.machines().await.is_empty());
    let rows = h.db.transact(|txn| txn.machines()).await;
    assert!(rows.iter().all(|m| m.status.is_none()));
    // The race is expected, not a provider failure.
    assert_eq!(h.counters.failures(Action::List), 0);
}

struct FailingProvider;

#[async_trait]
impl Provider for FailingProvider {
    async fn list(&self) -> armada_cloud::Result<Vec<CloudMachine>> {
        Err(CloudError::ListFailed("simulated outage".to_string()))
    }

    async fn boot(&self, _machines: Vec<BootRequest>) -> armada_cloud::Result<()> {
        Ok(())
    }

    async fn stop(&self, _machines: &[CloudMachine]) -> armada_cloud::Result<()> {
        Ok(())
    }

    async fn set_acls(&self, _acls: &[Acl]) -> armada_cloud::Result<()> {
        Ok(())
    }

    async fn update_floating_ips(&self, _machines: &[CloudMachine]) -> armada_cloud::Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn inventory_failure_skips_the_cycle() {
    let db = Database::new();
    db.transact(|txn| {
        txn.insert_blueprint(Blueprint::new("prod"));
    })
    .await;
    declare(&db, "m4.large", Role::Worker).await;

    let counters = Arc::new(Counters::default());
    let mut controller = RegionController::new(
        db.clone(),
        Box::new(FailingProvider),
        KIND,
        REGION,
        "prod",
        Arc::new(StaticRoles::new()),
        Arc::new(FixedLocalIp(OPERATOR_IP.to_string())),
        counters.clone(),
    );

    assert_eq!(controller.run_once().await, CycleOutcome::Aborted);
    assert_eq!(counters.failures(Action::List), 1);
    let rows = db.transact(|txn| txn.machines()).await;
    assert!(rows.iter().all(|m| m.status.is_none()));
}

#[derive(Default)]
struct RecordingFactory {
    created: Mutex<Vec<(ProviderKind, String)>>,
}

impl RecordingFactory {
    fn created(&self) -> Vec<(ProviderKind, String)> {
        self.created.lock().unwrap().clone()
    }
}

impl ProviderFactory for RecordingFactory {
    fn new_provider(&self, kind: ProviderKind, region: &str) -> Box<dyn Provider> {
        self.created.lock().unwrap().push((kind, region.to_string()));
        Box::new(MockProvider::new(kind, region))
    }
}

#[tokio::test]
async fn orchestrator_tracks_declared_regions() {
    let db = Database::new();
    let factory = Arc::new(RecordingFactory::default());
    let mut orchestrator = Orchestrator::new(
        db.clone(),
        factory.clone(),
        Arc::new(StaticRoles::new()),
        Arc::new(AssumeReachable::default()),
        Arc::new(FixedLocalIp(OPERATOR_IP.to_string())),
    );

    // No blueprint yet: nothing to run.
    orchestrator.sync_controllers().await;
    assert!(orchestrator.running().is_empty());

    db.transact(|txn| {
        txn.insert_blueprint(Blueprint::new("prod"));
        let mut machine = Machine::new(KIND, "r1");
        machine.size = "m4.large".to_string();
        machine.role = Some(Role::Worker);
        txn.insert_machine(machine);
        let mut machine = Machine::new(KIND, "r2");
        machine.size = "m4.large".to_string();
        machine.role = Some(Role::Worker);
        txn.insert_machine(machine);
    })
    .await;

    orchestrator.sync_controllers().await;
    let mut running = orchestrator.running();
    running.sort();
    assert_eq!(
        running,
        vec![(KIND, "r1".to_string()), (KIND, "r2".to_string())]
    );
    assert_eq!(factory.created().len(), 2);
    assert!(orchestrator.counters(KIND, "r1").is_some());

    // Dropping a region's machines tears its controller down.
    db.transact(|txn| {
        let stale: Vec<_> = txn
            .machines_where(|m| m.region == "r2")
            .into_iter()
            .map(|m| m.id)
            .collect();
        for id in stale {
            txn.remove_machine(id);
        }
    })
    .await;
    orchestrator.sync_controllers().await;
    assert_eq!(orchestrator.running(), vec![(KIND, "r1".to_string())]);
}

#[tokio::test]
async fn namespace_change_replaces_controllers() {
    let db = Database::new();
    let factory = Arc::new(RecordingFactory::default());
    let mut orchestrator = Orchestrator::new(
        db.clone(),
        factory.clone(),
        Arc::new(StaticRoles::new()),
        Arc::new(AssumeReachable::default()),
        Arc::new(FixedLocalIp(OPERATOR_IP.to_string())),
    );

    db.transact(|txn| {
        txn.insert_blueprint(Blueprint::new("prod"));
        let mut machine = Machine::new(KIND, "r1");
        machine.size = "m4.large".to_string();
        machine.role = Some(Role::Worker);
        txn.insert_machine(machine);
    })
    .await;
    orchestrator.sync_controllers().await;
    assert_eq!(factory.created().len(), 1);

    // Same region, new namespace: the old controller must be confirmed
    // gone and a fresh one started in its place.
    db.transact(|txn| {
        if let Some(mut blueprint) = txn.blueprint() {
            blueprint.namespace = "staging".to_string();
            txn.commit_blueprint(blueprint);
        }
    })
    .await;
    orchestrator.sync_controllers().await;
    assert_eq!(orchestrator.running(), vec![(KIND, "r1".to_string())]);
    assert_eq!(factory.created().len(), 2);
}

#[tokio::test]
async fn orchestrator_run_shuts_down_cleanly() {
    let db = Database::new();
    db.transact(|txn| {
        txn.insert_blueprint(Blueprint::new("prod"));
        let mut machine = Machine::new(KIND, "r1");
        machine.size = "m4.large".to_string();
        machine.role = Some(Role::Worker);
        txn.insert_machine(machine);
    })
    .await;

    let orchestrator = Orchestrator::new(
        db,
        Arc::new(RecordingFactory::default()),
        Arc::new(StaticRoles::new()),
        Arc::new(AssumeReachable::default()),
        Arc::new(FixedLocalIp(OPERATOR_IP.to_string())),
    );
    let token = CancellationToken::new();
    let handle = tokio::spawn(orchestrator.run(token.clone()));

    // Give the run loop a chance to start its controllers, then cancel.
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    token.cancel();
    handle.await.expect("orchestrator exits without panicking");
}
