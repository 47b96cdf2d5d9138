//! Machine domain types shared by the store and the providers.

use crate::error::CloudError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Cloud providers a machine can run on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// Amazon EC2.
    Aws,
    /// Google Compute Engine.
    Gce,
    /// DigitalOcean droplets.
    DigitalOcean,
    /// In-memory provider for development and tests.
    Mock,
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderKind::Aws => write!(f, "aws"),
            ProviderKind::Gce => write!(f, "gce"),
            ProviderKind::DigitalOcean => write!(f, "digital_ocean"),
            ProviderKind::Mock => write!(f, "mock"),
        }
    }
}

impl FromStr for ProviderKind {
    type Err = CloudError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "aws" => Ok(ProviderKind::Aws),
            "gce" => Ok(ProviderKind::Gce),
            "digital_ocean" => Ok(ProviderKind::DigitalOcean),
            "mock" => Ok(ProviderKind::Mock),
            other => Err(CloudError::UnknownProvider(other.to_string())),
        }
    }
}

/// Role a machine plays in the cluster.
///
/// The role on a desired row is authoritative. On an observed machine it is
/// a late-arriving corroboration from role discovery and is `None` until
/// the agent on the machine has reported in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Master,
    Worker,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Master => write!(f, "master"),
            Role::Worker => write!(f, "worker"),
        }
    }
}

/// Connectivity lifecycle of a machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// A boot was requested; the machine has not appeared in inventory yet.
    Booting,
    /// The machine has an address but has never answered a probe.
    Connecting,
    /// The machine answers probes.
    Connected,
    /// The machine answered probes in the past but currently does not.
    Reconnecting,
    /// Termination was requested externally. Terminal for the evaluator.
    Stopping,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Booting => write!(f, "booting"),
            Status::Connecting => write!(f, "connecting"),
            Status::Connected => write!(f, "connected"),
            Status::Reconnecting => write!(f, "reconnecting"),
            Status::Stopping => write!(f, "stopping"),
        }
    }
}

/// A machine reported by a provider's inventory listing.
///
/// `provider` and `region` are tagged on by the region controller after
/// `list` returns; a provider implementation need not fill them. `role` and
/// `connected` are merged from role discovery, never from the provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Machine {
    /// Provider-assigned identifier, unique within a (provider, region).
    pub cloud_id: String,
    pub provider: ProviderKind,
    pub region: String,
    pub size: String,
    /// `None` means the provider did not report a disk size; never treat
    /// that as a mismatch.
    pub disk_size: Option<u32>,
    pub preemptible: bool,
    pub public_ip: Option<String>,
    pub private_ip: Option<String>,
    pub floating_ip: Option<String>,
    pub role: Option<Role>,
    pub connected: bool,
}

impl Machine {
    pub fn new(
        cloud_id: impl Into<String>,
        provider: ProviderKind,
        region: impl Into<String>,
        size: impl Into<String>,
    ) -> Self {
        Self {
            cloud_id: cloud_id.into(),
            provider,
            region: region.into(),
            size: size.into(),
            disk_size: None,
            preemptible: false,
            public_ip: None,
            private_ip: None,
            floating_ip: None,
            role: None,
            connected: false,
        }
    }
}

/// Subset of a desired machine passed to [`crate::Provider::boot`].
///
/// The cloud identifier is intentionally absent: the provider assigns one,
/// and it becomes visible on a later `list`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BootRequest {
    pub provider: ProviderKind,
    pub region: String,
    pub size: String,
    pub disk_size: u32,
    pub preemptible: bool,
    pub role: Option<Role>,
    pub ssh_keys: Vec<String>,
}
