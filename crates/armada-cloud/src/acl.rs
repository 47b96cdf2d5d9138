//! Firewall rule type.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A single firewall rule, keyed as a set element by all three fields.
///
/// `cidr` may carry the sentinel [`Acl::LOCAL`], which the control plane
/// resolves to the operator's current public address at sync time.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Acl {
    pub cidr: String,
    pub min_port: u16,
    pub max_port: u16,
}

impl Acl {
    /// Sentinel CIDR meaning "the caller's current public address".
    pub const LOCAL: &'static str = "local";

    pub fn new(cidr: impl Into<String>, min_port: u16, max_port: u16) -> Self {
        Self {
            cidr: cidr.into(),
            min_port,
            max_port,
        }
    }
}

impl fmt::Display for Acl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}-{}", self.cidr, self.min_port, self.max_port)
    }
}
