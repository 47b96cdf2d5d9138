//! Cloud provider trait definition

use crate::acl::Acl;
use crate::error::Result;
use crate::machine::{BootRequest, Machine, ProviderKind};
use async_trait::async_trait;

/// Cloud provider abstraction
///
/// One instance manages a single (provider, region) pair and is owned
/// exclusively by that region's controller; implementations do not need to
/// be re-entrant across regions. Calls may block for the duration of the
/// underlying API request — timeouts are the implementation's concern.
#[async_trait]
pub trait Provider: Send + Sync {
    /// The provider's authoritative current inventory. No side effects.
    async fn list(&self) -> Result<Vec<Machine>>;

    /// Launch new machines. Cloud identifiers are assigned by the provider
    /// and become visible on a later [`list`](Provider::list).
    async fn boot(&self, machines: Vec<BootRequest>) -> Result<()>;

    /// Terminate the given machines.
    async fn stop(&self, machines: &[Machine]) -> Result<()>;

    /// Idempotently converge the provider's firewall state to exactly
    /// `acls`.
    async fn set_acls(&self, acls: &[Acl]) -> Result<()>;

    /// Assign, reassign, or remove floating addresses so that each given
    /// machine (matched by cloud identifier) ends up holding its
    /// `floating_ip`. Providers that allow only one binding per address
    /// must unassign before reassigning.
    async fn update_floating_ips(&self, machines: &[Machine]) -> Result<()>;
}

/// Factory turning a (provider, region) pair into a live [`Provider`].
///
/// The orchestrator calls this once per region controller it starts, so a
/// factory is also the injection point for test doubles.
pub trait ProviderFactory: Send + Sync {
    fn new_provider(&self, kind: ProviderKind, region: &str) -> Box<dyn Provider>;
}
