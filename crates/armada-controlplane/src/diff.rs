//! Desired-vs-observed machine diff.
//!
//! A single equality test cannot pair these collections: a never-booted
//! desired row has no cloud identifier yet, and role discovery may not
//! have caught up with the observed side. The diff therefore runs in two
//! passes — an exact pass where the cloud identifier is definitive, then a
//! scored pass over the unassigned remainder.

use crate::matcher;
use armada_cloud as cloud;
use armada_db as db;

// Only the ordering of these matters: role agreement must dominate
// address agreement, which must dominate floating-address agreement.
const BASE_SCORE: i32 = 10;
const ROLE_BONUS: i32 = 4;
const IP_BONUS: i32 = 2;
const FLOATING_IP_BONUS: i32 = 1;

/// Partition of a region's machines into convergence actions.
#[derive(Debug, Default)]
pub struct Diff {
    /// Desired rows with no observed counterpart: to be booted.
    pub boot: Vec<db::Machine>,
    /// Observed machines no desired row claims: to be terminated.
    pub stop: Vec<cloud::Machine>,
    /// Matched pairs, to be folded into the store via [`apply_pair`].
    pub pairs: Vec<(db::Machine, cloud::Machine)>,
}

/// Hard compatibility: fields that exclude an obviously wrong pairing.
///
/// An unreported disk size and an undiscovered role are wildcards, never
/// mismatches.
fn compatible(d: &db::Machine, o: &cloud::Machine) -> bool {
    d.provider == o.provider
        && d.region == o.region
        && d.size == o.size
        && d.preemptible == o.preemptible
        && o.disk_size.is_none_or(|ds| ds == d.disk_size)
        && o.role.is_none_or(|r| d.role == Some(r))
}

/// Diff `desired` rows against `observed` inventory.
///
/// Pure: repeated invocation on the same input yields the same partition.
pub fn diff(desired: Vec<db::Machine>, observed: Vec<cloud::Machine>) -> Diff {
    // Pass 1: a shared cloud identifier is a definitive identity match;
    // the compatibility fields only guard against corrupt pairings.
    let exact = matcher::pair(desired, observed, |d, o| {
        (d.cloud_id.as_deref() == Some(o.cloud_id.as_str()) && compatible(d, o)).then_some(0)
    });

    // Pass 2: rank the remaining compatible candidates. Role agreement
    // dominates so that a Master row is never bound to a machine already
    // known to be a Worker just because another candidate's addresses
    // happen to line up.
    let scored = matcher::pair(exact.unmatched_left, exact.unmatched_right, |d, o| {
        if !compatible(d, o) {
            return None;
        }
        let mut score = BASE_SCORE;
        if d.role.is_some() && d.role == o.role {
            score -= ROLE_BONUS;
        }
        if d.public_ip == o.public_ip && d.private_ip == o.private_ip {
            score -= IP_BONUS;
        }
        if d.floating_ip == o.floating_ip {
            score -= FLOATING_IP_BONUS;
        }
        Some(score)
    });

    let mut pairs = exact.pairs;
    pairs.extend(scored.pairs);
    Diff {
        boot: scored.unmatched_left,
        stop: scored.unmatched_right,
        pairs,
    }
}

/// Fold one matched pair into its desired row.
///
/// Binds the cloud identifier only when the discovered role corroborates
/// the declared one — an unbound row simply waits for another cycle.
/// Returns the floating-IP update target when one is needed: the observed
/// record with the desired floating address in place of its own.
pub fn apply_pair(desired: &mut db::Machine, observed: &cloud::Machine) -> Option<cloud::Machine> {
    if desired.cloud_id.is_none() && observed.role.is_some() && observed.role == desired.role {
        desired.cloud_id = Some(observed.cloud_id.clone());
    }

    // A status computed under the old address is meaningless.
    if desired.public_ip != observed.public_ip {
        desired.status = None;
    }
    desired.public_ip = observed.public_ip.clone();
    desired.private_ip = observed.private_ip.clone();
    desired.connected = observed.connected;

    if desired.cloud_id.as_deref() == Some(observed.cloud_id.as_str())
        && desired.floating_ip != observed.floating_ip
    {
        let mut target = observed.clone();
        target.floating_ip = desired.floating_ip.clone();
        return Some(target);
    }
    None
}
