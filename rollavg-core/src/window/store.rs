use std::sync::{Mutex, MutexGuard, PoisonError};

use indexmap::IndexMap;
use tracing::debug;

use crate::{
    keyed::{partitioners::index_select, TumblingWindows, WindowKey},
    types::{InputRecord, ProcessingTime},
};

use super::WindowState;

/// In-memory state of all open windows.
///
/// The store is split into shards by entity id, every shard behind its own lock.
/// Folding a record and taking closed windows both happen under the lock of
/// the shard owning the key, so a window is either folded into or fired,
/// never both at once.
pub struct WindowStore {
    assigner: TumblingWindows,
    shards: Vec<Mutex<Shard>>,
}

#[derive(Default)]
struct Shard {
    windows: IndexMap<WindowKey, WindowState>,
    /// Processing time of the latest firing. Every window ending at or
    /// before this time has been fired and must not be recreated.
    horizon: Option<ProcessingTime>,
}

/// Outcome of folding one record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fold {
    /// Window the record was folded into
    pub key: WindowKey,
    /// True if the window assigned at arrival had already fired and the
    /// record was moved to a later window
    pub late: bool,
}

impl WindowStore {
    /// **PANIC:** if `shards` is zero
    pub fn new(assigner: TumblingWindows, shards: usize) -> Self {
        assert!(shards > 0, "Need at least one shard");
        Self {
            assigner,
            shards: (0..shards).map(|_| Mutex::default()).collect(),
        }
    }

    pub fn assigner(&self) -> &TumblingWindows {
        &self.assigner
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    /// Fold a record which arrived at processing time `now` into its window.
    pub fn fold(&self, record: &InputRecord, now: ProcessingTime) -> Fold {
        let mut shard = self.lock_shard(&record.entity_id);
        let mut key = self.assigner.assign_key(&record.entity_id, now);
        let mut late = false;
        if let Some(horizon) = shard.horizon {
            if key.window.is_closed_at(horizon) {
                debug!(
                    entity_id = %record.entity_id,
                    window_end = key.window.end,
                    horizon,
                    "Window already fired, moving record to a later window"
                );
                key = self.assigner.assign_key(&record.entity_id, horizon);
                late = true;
            }
        }
        shard
            .windows
            .entry(key.clone())
            .and_modify(|state| state.fold(record.amount))
            .or_insert_with(|| WindowState::first(record.amount));
        Fold { key, late }
    }

    /// Remove and return every window which is closed at `now`.
    /// Afterwards no record can be folded into any of the returned windows.
    pub fn take_closed(&self, now: ProcessingTime) -> Vec<(WindowKey, WindowState)> {
        let mut closed = Vec::new();
        for shard in self.shards.iter() {
            let mut shard = lock(shard);
            shard.horizon = Some(shard.horizon.map_or(now, |h| h.max(now)));
            if shard.windows.is_empty() {
                continue;
            }
            let windows = std::mem::take(&mut shard.windows);
            for (key, state) in windows {
                if key.window.is_closed_at(now) {
                    closed.push((key, state));
                } else {
                    shard.windows.insert(key, state);
                }
            }
        }
        closed
    }

    /// Remove and return all windows, open or not.
    /// Records folded afterwards start new windows after the latest drained one.
    pub fn drain_all(&self) -> Vec<(WindowKey, WindowState)> {
        let mut drained = Vec::new();
        for shard in self.shards.iter() {
            let mut shard = lock(shard);
            let latest_end = shard.windows.keys().map(|k| k.window.end).max();
            if let Some(end) = latest_end {
                shard.horizon = Some(shard.horizon.map_or(end, |h| h.max(end)));
            }
            drained.extend(shard.windows.drain(..));
        }
        drained
    }

    /// Number of windows currently holding state
    pub fn open_windows(&self) -> usize {
        self.shards.iter().map(|s| lock(s).windows.len()).sum()
    }

    /// Current state of a window, if it exists
    pub fn get(&self, key: &WindowKey) -> Option<WindowState> {
        self.lock_shard(&key.entity_id).windows.get(key).copied()
    }

    fn lock_shard(&self, entity_id: &str) -> MutexGuard<'_, Shard> {
        let idx = index_select(entity_id, self.shards.len());
        lock(&self.shards[idx])
    }
}

// A panic while holding the lock can not leave a shard half updated, every
// mutation is a single map operation.
fn lock(shard: &Mutex<Shard>) -> MutexGuard<'_, Shard> {
    shard.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use std::{
        collections::HashSet,
        sync::atomic::{AtomicBool, AtomicI64, Ordering},
    };

    use chrono::NaiveDateTime;

    use super::*;
    use crate::types::TimeWindow;

    fn record(entity: &str, amount: f64) -> InputRecord {
        InputRecord::new(entity, amount, NaiveDateTime::default())
    }

    fn store() -> WindowStore {
        WindowStore::new(TumblingWindows::new(1_000), 1)
    }

    #[test]
    fn fold_creates_and_updates_state() {
        let store = store();
        let fold = store.fold(&record("A", 10.0), 100);
        assert_eq!(fold.key, WindowKey::new("A", TimeWindow::new(0, 1_000)));
        assert!(!fold.late);
        store.fold(&record("A", 20.0), 900);

        let state = store.get(&fold.key).unwrap();
        assert_eq!(state.count(), 2);
        assert_eq!(state.average(), 15.0);
        assert_eq!(store.open_windows(), 1);
    }

    #[test]
    fn entities_are_independent() {
        let store = store();
        let a = store.fold(&record("A", 1.0), 10).key;
        let b = store.fold(&record("B", 3.0), 10).key;
        assert_ne!(a, b);
        assert_eq!(store.get(&a).unwrap().sum(), 1.0);
        assert_eq!(store.get(&b).unwrap().sum(), 3.0);
    }

    #[test]
    fn take_closed_only_returns_ended_windows() {
        let store = store();
        store.fold(&record("A", 1.0), 10);
        store.fold(&record("A", 2.0), 1_010);

        assert!(store.take_closed(999).is_empty());
        let closed = store.take_closed(1_000);
        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].0.window, TimeWindow::new(0, 1_000));
        assert_eq!(store.open_windows(), 1);

        // already taken, nothing left to fire
        assert!(store.take_closed(1_500).is_empty());
    }

    #[test]
    fn stale_fold_goes_to_later_window() {
        let store = store();
        store.fold(&record("A", 1.0), 10);
        assert_eq!(store.take_closed(1_200).len(), 1);

        // clock reading taken before the firing happened
        let fold = store.fold(&record("A", 5.0), 500);
        assert!(fold.late);
        assert_eq!(fold.key.window, TimeWindow::new(1_000, 2_000));
        assert!(store.take_closed(1_999).is_empty());
        let closed = store.take_closed(2_000);
        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].1.sum(), 5.0);
    }

    #[test]
    fn drain_all_empties_every_shard() {
        let store = WindowStore::new(TumblingWindows::new(1_000), 4);
        for i in 0..20 {
            store.fold(&record(&format!("E{i}"), i as f64), 10);
        }
        assert_eq!(store.open_windows(), 20);
        let drained = store.drain_all();
        assert_eq!(drained.len(), 20);
        assert_eq!(store.open_windows(), 0);

        // drained windows are not recreated
        let fold = store.fold(&record("E1", 1.0), 20);
        assert!(fold.late);
        assert_eq!(fold.key.window, TimeWindow::new(1_000, 2_000));
    }

    #[test]
    fn sharded_store_keeps_keys_apart() {
        let store = WindowStore::new(TumblingWindows::new(1_000), 3);
        assert_eq!(store.shard_count(), 3);
        for i in 0..30 {
            store.fold(&record(&format!("E{}", i % 10), 2.0), 10);
        }
        let closed = store.take_closed(1_000);
        assert_eq!(closed.len(), 10);
        assert!(closed.iter().all(|(_, s)| s.count() == 3));
    }

    #[test]
    fn concurrent_fold_and_fire_lose_nothing() {
        const THREADS: usize = 4;
        const PER_THREAD: usize = 2_000;
        let store = WindowStore::new(TumblingWindows::new(10), 3);
        let now = AtomicI64::new(0);
        let done = AtomicBool::new(false);
        let fired = Mutex::new(Vec::new());

        std::thread::scope(|s| {
            let folders: Vec<_> = (0..THREADS)
                .map(|t| {
                    let (store, now) = (&store, &now);
                    s.spawn(move || {
                        for i in 0..PER_THREAD {
                            let entity = format!("E{}", (t + i) % 7);
                            store.fold(&record(&entity, 1.0), now.fetch_add(1, Ordering::SeqCst));
                        }
                    })
                })
                .collect();
            s.spawn(|| {
                while !done.load(Ordering::SeqCst) {
                    let closed = store.take_closed(now.load(Ordering::SeqCst));
                    fired.lock().unwrap().extend(closed);
                }
            });
            for folder in folders {
                folder.join().unwrap();
            }
            done.store(true, Ordering::SeqCst);
        });

        let mut all = fired.into_inner().unwrap();
        all.extend(store.drain_all());
        let total: u64 = all.iter().map(|(_, state)| state.count()).sum();
        assert_eq!(total, (THREADS * PER_THREAD) as u64);
        // no window was taken twice
        let keys: HashSet<_> = all.iter().map(|(key, _)| key).collect();
        assert_eq!(keys.len(), all.len());
    }
}
