//! In-memory tables and transactions.

use crate::blueprint::Blueprint;
use crate::machine::{Machine, RowId};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{Mutex, broadcast};

/// Store tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    Machine,
    Blueprint,
}

#[derive(Default)]
struct Tables {
    machines: BTreeMap<RowId, Machine>,
    blueprints: BTreeMap<RowId, Blueprint>,
    next_id: RowId,
}

/// Handle to the shared store. Cheap to clone; all clones see one state.
#[derive(Clone)]
pub struct Database {
    tables: Arc<Mutex<Tables>>,
    machine_events: broadcast::Sender<()>,
    blueprint_events: broadcast::Sender<()>,
}

impl Default for Database {
    fn default() -> Self {
        Self::new()
    }
}

impl Database {
    pub fn new() -> Self {
        let (machine_events, _) = broadcast::channel(64);
        let (blueprint_events, _) = broadcast::channel(64);
        Self {
            tables: Arc::new(Mutex::new(Tables::default())),
            machine_events,
            blueprint_events,
        }
    }

    /// Run `f` inside a transaction over the whole store.
    ///
    /// The closure sees a consistent snapshot and its writes land
    /// atomically with respect to every other transaction. Aborting is
    /// returning before writing anything. Change notifications fire after
    /// the transaction ends, once per table written.
    pub async fn transact<T>(&self, f: impl FnOnce(&mut Transaction<'_>) -> T) -> T {
        let mut tables = self.tables.lock().await;
        let mut txn = Transaction {
            tables: &mut tables,
            wrote_machines: false,
            wrote_blueprints: false,
        };
        let out = f(&mut txn);
        let (wrote_machines, wrote_blueprints) = (txn.wrote_machines, txn.wrote_blueprints);
        drop(tables);

        // A send error only means nobody is subscribed.
        if wrote_machines {
            let _ = self.machine_events.send(());
        }
        if wrote_blueprints {
            let _ = self.blueprint_events.send(());
        }
        out
    }

    pub(crate) fn events_for(&self, table: Table) -> &broadcast::Sender<()> {
        match table {
            Table::Machine => &self.machine_events,
            Table::Blueprint => &self.blueprint_events,
        }
    }
}

/// A live view of the store, handed to [`Database::transact`] closures.
pub struct Transaction<'a> {
    tables: &'a mut Tables,
    wrote_machines: bool,
    wrote_blueprints: bool,
}

impl Transaction<'_> {
    /// All machine rows, in row-id order.
    pub fn machines(&self) -> Vec<Machine> {
        self.tables.machines.values().cloned().collect()
    }

    /// Machine rows satisfying `pred`, in row-id order.
    pub fn machines_where(&self, pred: impl Fn(&Machine) -> bool) -> Vec<Machine> {
        self.tables
            .machines
            .values()
            .filter(|m| pred(m))
            .cloned()
            .collect()
    }

    pub fn machine(&self, id: RowId) -> Option<Machine> {
        self.tables.machines.get(&id).cloned()
    }

    /// Insert `machine` as a new row, assigning it a fresh identifier.
    pub fn insert_machine(&mut self, mut machine: Machine) -> Machine {
        self.tables.next_id += 1;
        machine.id = self.tables.next_id;
        self.tables.machines.insert(machine.id, machine.clone());
        self.wrote_machines = true;
        machine
    }

    /// Write `machine` back, replacing the stored row with the same id.
    pub fn commit_machine(&mut self, machine: Machine) {
        self.tables.machines.insert(machine.id, machine);
        self.wrote_machines = true;
    }

    pub fn remove_machine(&mut self, id: RowId) {
        if self.tables.machines.remove(&id).is_some() {
            self.wrote_machines = true;
        }
    }

    /// The blueprint row, if one has been applied.
    pub fn blueprint(&self) -> Option<Blueprint> {
        self.tables.blueprints.values().next().cloned()
    }

    pub fn insert_blueprint(&mut self, mut blueprint: Blueprint) -> Blueprint {
        self.tables.next_id += 1;
        blueprint.id = self.tables.next_id;
        self.tables
            .blueprints
            .insert(blueprint.id, blueprint.clone());
        self.wrote_blueprints = true;
        blueprint
    }

    pub fn commit_blueprint(&mut self, blueprint: Blueprint) {
        self.tables.blueprints.insert(blueprint.id, blueprint);
        self.wrote_blueprints = true;
    }

    pub fn remove_blueprint(&mut self, id: RowId) {
        if self.tables.blueprints.remove(&id).is_some() {
            self.wrote_blueprints = true;
        }
    }
}
