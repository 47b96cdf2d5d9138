//! Connectivity status state machine and its evaluator loop.

use crate::foreman::ConnectivityProber;
use armada_cloud::{ProviderKind, Status};
use armada_db::{Database, RowId};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::debug;

const STATUS_INTERVAL: Duration = Duration::from_secs(30);

/// Decide the next status for a machine given a probe of its public
/// address. `None` means no decision: the caller leaves the stored status
/// untouched.
///
/// A probe success always wins. A failure after the machine has ever been
/// connected means transient loss (`Reconnecting`), not a fresh connection
/// attempt. `Stopping` was requested externally and is never overwritten
/// here.
pub fn next_status(current: Option<Status>, reachable: bool) -> Option<Status> {
    if current == Some(Status::Stopping) {
        return None;
    }
    if reachable {
        return Some(Status::Connected);
    }
    match current {
        Some(Status::Connected) | Some(Status::Reconnecting) => Some(Status::Reconnecting),
        _ => Some(Status::Connecting),
    }
}

/// Evaluator loop for one region: re-probes on a periodic tick merged with
/// the prober's change events, committing only statuses that changed.
pub(crate) async fn run_evaluator(
    db: Database,
    kind: ProviderKind,
    region: String,
    prober: Arc<dyn ConnectivityProber>,
    token: CancellationToken,
) {
    let mut events = prober.subscribe();
    let mut events_open = true;
    let mut tick = tokio::time::interval(STATUS_INTERVAL);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = tick.tick() => {}
            // A lagged receiver still means connectivity changed somewhere.
            ev = events.recv(), if events_open => {
                if let Err(broadcast::error::RecvError::Closed) = ev {
                    // Prober went away; keep evaluating on the tick alone.
                    events_open = false;
                }
            }
        }
        evaluate_once(&db, kind, &region, prober.as_ref()).await;
    }
    debug!(provider = %kind, %region, "status evaluator stopped");
}

pub(crate) async fn evaluate_once(
    db: &Database,
    kind: ProviderKind,
    region: &str,
    prober: &dyn ConnectivityProber,
) {
    let machines = db
        .transact(|txn| {
            txn.machines_where(|m| {
                m.provider == kind && m.region == region && m.public_ip.is_some()
            })
        })
        .await;

    // Probe outside the transaction; probes can block on the network.
    let mut updates: Vec<(RowId, Status)> = Vec::new();
    for machine in machines {
        let Some(public_ip) = machine.public_ip.as_deref() else {
            continue;
        };
        let reachable = prober.reachable(public_ip).await;
        if let Some(next) = next_status(machine.status, reachable)
            && machine.status != Some(next)
        {
            updates.push((machine.id, next));
        }
    }
    if updates.is_empty() {
        return;
    }

    db.transact(move |txn| {
        for (id, status) in updates {
            let Some(mut machine) = txn.machine(id) else {
                continue;
            };
            // The row may have moved under us while we probed.
            if machine.status == Some(Status::Stopping) {
                continue;
            }
            machine.status = Some(status);
            txn.commit_machine(machine);
        }
    })
    .await;
}
