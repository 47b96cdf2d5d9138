//! Action failure counters.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Provider call classes whose failures are counted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    List,
    Boot,
    Stop,
    SetAcls,
    UpdateFloatingIps,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::List => write!(f, "list"),
            Action::Boot => write!(f, "boot"),
            Action::Stop => write!(f, "stop"),
            Action::SetAcls => write!(f, "set_acls"),
            Action::UpdateFloatingIps => write!(f, "update_floating_ips"),
        }
    }
}

/// Per-region failure counters, shared between a controller and whoever
/// wants to observe it.
#[derive(Debug, Default)]
pub struct Counters {
    list: AtomicU64,
    boot: AtomicU64,
    stop: AtomicU64,
    set_acls: AtomicU64,
    update_floating_ips: AtomicU64,
}

impl Counters {
    pub fn failure(&self, action: Action) {
        self.cell(action).fetch_add(1, Ordering::Relaxed);
    }

    pub fn failures(&self, action: Action) -> u64 {
        self.cell(action).load(Ordering::Relaxed)
    }

    fn cell(&self, action: Action) -> &AtomicU64 {
        match action {
            Action::List => &self.list,
            Action::Boot => &self.boot,
            Action::Stop => &self.stop,
            Action::SetAcls => &self.set_acls,
            Action::UpdateFloatingIps => &self.update_floating_ips,
        }
    }
}
