//! Desired machine rows.

use armada_cloud::{BootRequest, ProviderKind, Role, Status};
use serde::{Deserialize, Serialize};

/// Row identifier, unique within one store.
pub type RowId = u32;

/// A desired machine: blueprint-declared intent, independent of whether a
/// cloud resource exists for it yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Machine {
    /// Store-assigned row identifier. 0 until inserted.
    pub id: RowId,

    /// Opaque identifier tying this row to its blueprint entry.
    pub blueprint_id: String,

    pub provider: ProviderKind,
    pub region: String,
    pub size: String,
    pub disk_size: u32,
    pub preemptible: bool,
    pub ssh_keys: Vec<String>,

    /// Authoritative role. The matcher never binds a cloud identity whose
    /// discovered role contradicts this.
    pub role: Option<Role>,

    /// Provider-assigned identity; `None` until the matcher binds one.
    pub cloud_id: Option<String>,

    pub public_ip: Option<String>,
    pub private_ip: Option<String>,
    pub floating_ip: Option<String>,

    pub status: Option<Status>,

    /// Whether the agent on this machine currently holds a connection to
    /// role discovery.
    pub connected: bool,
}

impl Machine {
    /// A blank desired row; callers fill in the remaining intent fields
    /// before inserting it.
    pub fn new(provider: ProviderKind, region: impl Into<String>) -> Self {
        Self {
            id: 0,
            blueprint_id: String::new(),
            provider,
            region: region.into(),
            size: String::new(),
            disk_size: 0,
            preemptible: false,
            ssh_keys: Vec::new(),
            role: None,
            cloud_id: None,
            public_ip: None,
            private_ip: None,
            floating_ip: None,
            status: None,
            connected: false,
        }
    }

    /// Boot-call view of this row. The cloud identifier is intentionally
    /// absent; the provider assigns one.
    pub fn boot_request(&self) -> BootRequest {
        BootRequest {
            provider: self.provider,
            region: self.region.clone(),
            size: self.size.clone(),
            disk_size: self.disk_size,
            preemptible: self.preemptible,
            role: self.role,
            ssh_keys: self.ssh_keys.clone(),
        }
    }
}
