//! Change notification for store tables.

use crate::store::{Database, Table};
use futures_util::StreamExt;
use futures_util::stream::{self, SelectAll};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Interval, MissedTickBehavior};
use tokio_stream::wrappers::BroadcastStream;

/// A subscription to store changes, optionally merged with a periodic
/// tick.
///
/// Delivery is coalesced: a burst of writes while the subscriber is busy
/// arrives as a single wake-up. That is enough for consumers that re-read
/// the store on every wake-up rather than interpreting individual events.
pub struct Trigger {
    rx: mpsc::Receiver<()>,
}

impl Trigger {
    /// Wait for the next change (or tick). `None` means the store side was
    /// dropped and no further notifications will arrive.
    pub async fn recv(&mut self) -> Option<()> {
        self.rx.recv().await
    }
}

impl Database {
    /// Edge-triggered subscription to writes on `tables`.
    pub fn trigger(&self, tables: &[Table]) -> Trigger {
        self.trigger_inner(tables, None)
    }

    /// Like [`Database::trigger`], additionally firing every `period`.
    /// The first tick fires immediately, so a fresh subscriber always gets
    /// an initial wake-up.
    pub fn trigger_tick(&self, period: Duration, tables: &[Table]) -> Trigger {
        self.trigger_inner(tables, Some(period))
    }

    fn trigger_inner(&self, tables: &[Table], period: Option<Duration>) -> Trigger {
        let events: SelectAll<_> = stream::select_all(
            tables
                .iter()
                .map(|t| BroadcastStream::new(self.events_for(*t).subscribe())),
        );
        let tick = period.map(|p| {
            let mut interval = tokio::time::interval(p);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval
        });

        let (tx, rx) = mpsc::channel(1);
        tokio::spawn(forward(events, tick, tx));
        Trigger { rx }
    }
}

async fn forward(
    mut events: SelectAll<BroadcastStream<()>>,
    mut tick: Option<Interval>,
    tx: mpsc::Sender<()>,
) {
    loop {
        let fired = tokio::select! {
            // A lagged receiver still signals "something changed".
            ev = events.next() => ev.is_some(),
            _ = maybe_tick(&mut tick) => true,
        };
        if !fired {
            break;
        }
        // Full means a wake-up is already pending; the write coalesces
        // into it.
        if tx.try_send(()).is_err() && tx.is_closed() {
            break;
        }
    }
}

async fn maybe_tick(tick: &mut Option<Interval>) {
    match tick {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}
