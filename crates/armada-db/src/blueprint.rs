//! Blueprint rows: namespace, connections, and admin ACLs.

use crate::machine::RowId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A connection declared by the blueprint, from one entity to another or
/// from the public internet when `from` is [`Connection::PUBLIC`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Connection {
    pub from: String,
    pub to: String,
    pub min_port: u16,
    pub max_port: u16,
}

impl Connection {
    /// Sentinel `from` entity meaning "anywhere on the public internet".
    pub const PUBLIC: &'static str = "public";
}

/// The blueprint governing a namespace's machine set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Blueprint {
    /// Store-assigned row identifier. 0 until inserted.
    pub id: RowId,

    /// Logical identifier isolating this blueprint's machines from others
    /// sharing the same provider account and region.
    pub namespace: String,

    pub connections: Vec<Connection>,

    /// CIDRs granted access to every machine on every port.
    pub admin_acls: Vec<String>,

    pub applied_at: DateTime<Utc>,
}

impl Blueprint {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            id: 0,
            namespace: namespace.into(),
            connections: Vec::new(),
            admin_acls: Vec::new(),
            applied_at: Utc::now(),
        }
    }
}
