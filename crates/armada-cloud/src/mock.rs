//! In-memory provider used by the test suite and `armadad --mock`.

use crate::acl::Acl;
use crate::error::Result;
use crate::machine::{BootRequest, Machine, ProviderKind};
use crate::provider::{Provider, ProviderFactory};
use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::Mutex;

/// Deterministic in-memory provider.
///
/// Boots complete instantly: a booted machine appears in the next `list`
/// with a cloud identifier and addresses derived from a per-provider
/// counter. Clones share state, so a test can keep a handle for inspection
/// while the controller owns the boxed copy.
#[derive(Clone)]
pub struct MockProvider {
    kind: ProviderKind,
    region: String,
    state: Arc<Mutex<MockState>>,
    next_id: Arc<AtomicU64>,
}

#[derive(Default)]
struct MockState {
    machines: Vec<Machine>,
    acls: Option<Vec<Acl>>,
}

impl MockProvider {
    pub fn new(kind: ProviderKind, region: impl Into<String>) -> Self {
        Self {
            kind,
            region: region.into(),
            state: Arc::new(Mutex::new(MockState::default())),
            next_id: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Current machine inventory, for test assertions.
    pub async fn machines(&self) -> Vec<Machine> {
        self.state.lock().await.machines.clone()
    }

    /// The last ACL set pushed via `set_acls`, if any.
    pub async fn acls(&self) -> Option<Vec<Acl>> {
        self.state.lock().await.acls.clone()
    }
}

#[async_trait]
impl Provider for MockProvider {
    async fn list(&self) -> Result<Vec<Machine>> {
        Ok(self.state.lock().await.machines.clone())
    }

    async fn boot(&self, machines: Vec<BootRequest>) -> Result<()> {
        let mut state = self.state.lock().await;
        for req in machines {
            let n = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
            state.machines.push(Machine {
                cloud_id: format!("{}-{}-{n}", self.kind, self.region),
                provider: self.kind,
                region: self.region.clone(),
                size: req.size,
                disk_size: Some(req.disk_size),
                preemptible: req.preemptible,
                public_ip: Some(format!("203.0.113.{n}")),
                private_ip: Some(format!("10.0.0.{n}")),
                floating_ip: None,
                role: None,
                connected: false,
            });
        }
        Ok(())
    }

    async fn stop(&self, machines: &[Machine]) -> Result<()> {
        let mut state = self.state.lock().await;
        state
            .machines
            .retain(|m| !machines.iter().any(|s| s.cloud_id == m.cloud_id));
        Ok(())
    }

    async fn set_acls(&self, acls: &[Acl]) -> Result<()> {
        self.state.lock().await.acls = Some(acls.to_vec());
        Ok(())
    }

    async fn update_floating_ips(&self, machines: &[Machine]) -> Result<()> {
        let mut state = self.state.lock().await;
        for target in machines {
            if let Some(m) = state
                .machines
                .iter_mut()
                .find(|m| m.cloud_id == target.cloud_id)
            {
                m.floating_ip = target.floating_ip.clone();
            }
        }
        Ok(())
    }
}

/// Factory handing out a fresh [`MockProvider`] for every region.
pub struct MockFactory;

impl ProviderFactory for MockFactory {
    fn new_provider(&self, kind: ProviderKind, region: &str) -> Box<dyn Provider> {
        Box::new(MockProvider::new(kind, region))
    }
}
