//! External collaborator contracts: role discovery, connectivity probing,
//! and operator address resolution.
//!
//! The control plane consumes these; it never implements the underlying
//! mechanisms. The concrete types here are the trivial implementations the
//! daemon and the test suite share.

use armada_cloud::Role;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::broadcast;

/// Out-of-band role discovery (the "foreman").
///
/// Reports arrive asynchronously and may lag the provider inventory by any
/// number of cycles, or never arrive at all; consumers must treat `None`
/// as "not yet known", never as a contradiction.
pub trait RoleSource: Send + Sync {
    /// Role learned for the machine at `public_ip`, if any.
    fn role(&self, public_ip: &str) -> Option<Role>;

    /// Whether the agent at `public_ip` currently holds a connection.
    fn is_connected(&self, public_ip: &str) -> bool;
}

/// Reachability probing for machine public addresses.
#[async_trait]
pub trait ConnectivityProber: Send + Sync {
    async fn reachable(&self, public_ip: &str) -> bool;

    /// Change events: each item signals that some machine's connectivity
    /// flipped, prompting an immediate re-evaluation.
    fn subscribe(&self) -> broadcast::Receiver<()>;
}

/// Source of the operator's current public address.
#[async_trait]
pub trait LocalIpSource: Send + Sync {
    async fn local_ip(&self) -> anyhow::Result<String>;
}

/// A role source with no backend: nothing is ever discovered.
pub struct NoRoles;

impl RoleSource for NoRoles {
    fn role(&self, _public_ip: &str) -> Option<Role> {
        None
    }

    fn is_connected(&self, _public_ip: &str) -> bool {
        false
    }
}

/// A role source fed by hand, for tests and static deployments.
#[derive(Default)]
pub struct StaticRoles {
    reports: Mutex<HashMap<String, (Role, bool)>>,
}

impl StaticRoles {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a discovery report for the machine at `public_ip`.
    pub fn report(&self, public_ip: impl Into<String>, role: Role, connected: bool) {
        if let Ok(mut reports) = self.reports.lock() {
            reports.insert(public_ip.into(), (role, connected));
        }
    }
}

impl RoleSource for StaticRoles {
    fn role(&self, public_ip: &str) -> Option<Role> {
        self.reports
            .lock()
            .ok()
            .and_then(|r| r.get(public_ip).map(|(role, _)| *role))
    }

    fn is_connected(&self, public_ip: &str) -> bool {
        self.reports
            .lock()
            .ok()
            .and_then(|r| r.get(public_ip).map(|(_, connected)| *connected))
            .unwrap_or(false)
    }
}

/// A prober that treats every address as reachable and never signals a
/// change. Suits deployments without a probing backend.
pub struct AssumeReachable {
    events: broadcast::Sender<()>,
}

impl Default for AssumeReachable {
    fn default() -> Self {
        let (events, _) = broadcast::channel(1);
        Self { events }
    }
}

#[async_trait]
impl ConnectivityProber for AssumeReachable {
    async fn reachable(&self, _public_ip: &str) -> bool {
        true
    }

    fn subscribe(&self) -> broadcast::Receiver<()> {
        self.events.subscribe()
    }
}

/// Resolves the operator's address through an external echo service.
///
/// Resolution happens on every call; the result is never cached, since the
/// operator's address can change between syncs.
pub struct HttpLocalIp {
    client: reqwest::Client,
    url: String,
}

const CHECK_IP_URL: &str = "https://checkip.amazonaws.com";

impl Default for HttpLocalIp {
    fn default() -> Self {
        Self {
            client: reqwest::Client::new(),
            url: CHECK_IP_URL.to_string(),
        }
    }
}

#[async_trait]
impl LocalIpSource for HttpLocalIp {
    async fn local_ip(&self) -> anyhow::Result<String> {
        let body = self
            .client
            .get(&self.url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        Ok(body.trim().to_string())
    }
}

/// A fixed operator address, for tests and air-gapped deployments.
pub struct FixedLocalIp(pub String);

#[async_trait]
impl LocalIpSource for FixedLocalIp {
    async fn local_ip(&self) -> anyhow::Result<String> {
        Ok(self.0.clone())
    }
}
