//! armadad: the Armada control plane daemon.
//!
//! Seeds the store from a JSON manifest (desired state is normally
//! produced upstream from a compiled blueprint; the manifest stands in for
//! that pipeline), then runs the orchestrator until interrupted.

use anyhow::{Context, Result, bail};
use armada_cloud::mock::MockFactory;
use armada_cloud::{ProviderKind, Role};
use armada_controlplane::Orchestrator;
use armada_controlplane::foreman::{AssumeReachable, HttpLocalIp, NoRoles};
use armada_db::{Blueprint, Connection, Database, Machine};
use clap::Parser;
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Armada control plane daemon
#[derive(Parser, Debug)]
#[command(name = "armadad", version, about)]
struct Args {
    /// Path to a JSON manifest describing the desired cluster
    #[arg(long)]
    manifest: PathBuf,

    /// Use the in-memory mock provider instead of vendor bindings
    #[arg(long)]
    mock: bool,

    /// Log filter, e.g. "info,armada_controlplane=debug"
    #[arg(long, env = "ARMADA_LOG", default_value = "info")]
    log: String,
}

/// On-disk shape of the seed manifest.
#[derive(Debug, Deserialize)]
struct Manifest {
    namespace: String,
    #[serde(default)]
    admin_acls: Vec<String>,
    #[serde(default)]
    connections: Vec<ManifestConnection>,
    machines: Vec<ManifestMachine>,
}

#[derive(Debug, Deserialize)]
struct ManifestConnection {
    from: String,
    to: String,
    min_port: u16,
    max_port: u16,
}

#[derive(Debug, Deserialize)]
struct ManifestMachine {
    provider: ProviderKind,
    region: String,
    size: String,
    #[serde(default)]
    disk_size: u32,
    #[serde(default)]
    preemptible: bool,
    #[serde(default)]
    ssh_keys: Vec<String>,
    role: Option<Role>,
    #[serde(default)]
    floating_ip: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&args.log))
        .init();

    let raw = std::fs::read_to_string(&args.manifest)
        .with_context(|| format!("reading manifest {}", args.manifest.display()))?;
    let manifest: Manifest = serde_json::from_str(&raw)
        .with_context(|| format!("parsing manifest {}", args.manifest.display()))?;

    if !args.mock {
        // Vendor bindings are linked in by downstream builds.
        bail!("no vendor provider bindings are linked into this build; run with --mock");
    }

    let db = Database::new();
    seed(&db, manifest).await;

    let orchestrator = Orchestrator::new(
        db,
        Arc::new(MockFactory),
        Arc::new(NoRoles),
        Arc::new(AssumeReachable::default()),
        Arc::new(HttpLocalIp::default()),
    );
    let token = CancellationToken::new();
    let run = tokio::spawn(orchestrator.run(token.clone()));

    tokio::signal::ctrl_c()
        .await
        .context("waiting for interrupt")?;
    info!("interrupt received; shutting down");
    token.cancel();
    run.await.context("orchestrator task failed")?;
    Ok(())
}

async fn seed(db: &Database, manifest: Manifest) {
    let machine_count = manifest.machines.len();
    let namespace = manifest.namespace.clone();

    db.transact(move |txn| {
        let mut blueprint = Blueprint::new(manifest.namespace);
        blueprint.admin_acls = manifest.admin_acls;
        blueprint.connections = manifest
            .connections
            .into_iter()
            .map(|c| Connection {
                from: c.from,
                to: c.to,
                min_port: c.min_port,
                max_port: c.max_port,
            })
            .collect();
        txn.insert_blueprint(blueprint);

        for entry in manifest.machines {
            let mut machine = Machine::new(entry.provider, entry.region);
            machine.blueprint_id = uuid::Uuid::new_v4().to_string();
            machine.size = entry.size;
            machine.disk_size = entry.disk_size;
            machine.preemptible = entry.preemptible;
            machine.ssh_keys = entry.ssh_keys;
            machine.role = entry.role;
            machine.floating_ip = entry.floating_ip;
            txn.insert_machine(machine);
        }
    })
    .await;

    info!(%namespace, machines = machine_count, "seeded store from manifest");
}
