//! Desired firewall rule computation.

use armada_cloud::Acl;
use armada_db::{Blueprint, Connection};
use std::collections::BTreeSet;

const MIN_PORT: u16 = 1;
const MAX_PORT: u16 = 65535;

/// CIDR matching the whole public internet.
const PUBLIC_CIDR: &str = "0.0.0.0/0";

/// Compute the firewall rules a region should converge to.
///
/// Every admin CIDR — plus the implicit [`Acl::LOCAL`] entry — is granted
/// the whole port range, and every blueprint connection sourced from the
/// public internet is granted its own port range from anywhere.
///
/// `local_ip` is the operator's current public address. Resolve it freshly
/// for every sync; the operator may have moved since the last one.
pub fn desired_acls(blueprint: &Blueprint, local_ip: &str) -> Vec<Acl> {
    let mut rules = BTreeSet::new();

    for cidr in blueprint
        .admin_acls
        .iter()
        .map(String::as_str)
        .chain([Acl::LOCAL])
    {
        let cidr = if cidr == Acl::LOCAL {
            format!("{local_ip}/32")
        } else {
            cidr.to_string()
        };
        rules.insert(Acl::new(cidr, MIN_PORT, MAX_PORT));
    }

    for conn in &blueprint.connections {
        if conn.from == Connection::PUBLIC {
            rules.insert(Acl::new(PUBLIC_CIDR, conn.min_port, conn.max_port));
        }
    }

    rules.into_iter().collect()
}
