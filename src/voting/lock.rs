//! Per-key admission locks and status gates
//!
//! Vote admission for one (voter, position) or (voter, issue) pair must run as
//! a single unit: two concurrent requests for the same pair must not both pass
//! the ceiling and duplicate checks. Each pair maps to a lock key; a request
//! waits while another request holds the same key, and unrelated keys never
//! contend.
//!
//! [`StatusGates`] order work that depends on a target's status against the
//! transitions that change it. Admissions and assignments hold a position or
//! issue gate shared while they check status and insert; lifecycle
//! transitions hold it exclusive. A waiting exclusive holder blocks new shared
//! holders, so a close is never starved by a stream of votes.
//!
//! Lock order is admission lock, then gate, then repository. No holder takes a
//! second gate.
//!
//! Holders only ever run one bounded operation, so waits are bounded too.

use crate::types::{IssueId, PositionId};
use crate::{Error, Result};
use std::collections::{HashMap, HashSet};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

/// What an admission lock serializes on
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AdmissionKey {
    Position {
        shareholder_id: String,
        position_id: PositionId,
    },
    Issue {
        shareholder_id: String,
        issue_id: IssueId,
    },
}

impl AdmissionKey {
    pub fn position(shareholder_id: &str, position_id: PositionId) -> Self {
        Self::Position {
            shareholder_id: shareholder_id.to_string(),
            position_id,
        }
    }

    pub fn issue(shareholder_id: &str, issue_id: IssueId) -> Self {
        Self::Issue {
            shareholder_id: shareholder_id.to_string(),
            issue_id,
        }
    }

    /// Generate lock key for the registry
    pub fn lock_key(&self) -> String {
        match self {
            Self::Position {
                shareholder_id,
                position_id,
            } => format!("admission_lock:{shareholder_id}:position:{position_id}"),
            Self::Issue {
                shareholder_id,
                issue_id,
            } => format!("admission_lock:{shareholder_id}:issue:{issue_id}"),
        }
    }
}

/// Registry of held admission keys
pub struct AdmissionLocks {
    held: Mutex<HashSet<String>>,
    released: Condvar,
}

/// Releases its key when dropped
#[must_use = "the admission lock is released as soon as the guard is dropped"]
pub struct AdmissionGuard<'a> {
    locks: &'a AdmissionLocks,
    key: String,
}

impl AdmissionLocks {
    pub fn new() -> Self {
        Self {
            held: Mutex::new(HashSet::new()),
            released: Condvar::new(),
        }
    }

    /// Block until `key` is free, then hold it
    pub fn acquire(&self, key: &AdmissionKey) -> Result<AdmissionGuard<'_>> {
        let lock_key = key.lock_key();
        let mut held = self
            .held
            .lock()
            .map_err(|_| Error::internal("Admission lock registry poisoned"))?;

        while held.contains(&lock_key) {
            held = self
                .released
                .wait(held)
                .map_err(|_| Error::internal("Admission lock registry poisoned"))?;
        }
        held.insert(lock_key.clone());

        tracing::trace!(key = %lock_key, "admission lock acquired");
        Ok(AdmissionGuard {
            locks: self,
            key: lock_key,
        })
    }

    /// Whether some request currently holds `key`
    pub fn is_held(&self, key: &AdmissionKey) -> Result<bool> {
        let held = self
            .held
            .lock()
            .map_err(|_| Error::internal("Admission lock registry poisoned"))?;
        Ok(held.contains(&key.lock_key()))
    }

    pub fn held_count(&self) -> Result<usize> {
        let held = self
            .held
            .lock()
            .map_err(|_| Error::internal("Admission lock registry poisoned"))?;
        Ok(held.len())
    }
}

impl Default for AdmissionLocks {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for AdmissionGuard<'_> {
    fn drop(&mut self) {
        // Release even if another holder panicked; the set itself stays consistent.
        let mut held = self
            .locks
            .held
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        held.remove(&self.key);
        drop(held);
        self.locks.released.notify_all();
    }
}

/// What a status gate protects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GateKey {
    Position(PositionId),
    Issue(IssueId),
    /// The global set of issue titles
    IssueTitles,
}

#[derive(Debug, Default)]
struct GateState {
    readers: usize,
    writer: bool,
    writers_waiting: usize,
}

impl GateState {
    fn is_idle(&self) -> bool {
        self.readers == 0 && !self.writer && self.writers_waiting == 0
    }
}

/// Shared/exclusive gates keyed by [`GateKey`]
pub struct StatusGates {
    gates: Mutex<HashMap<GateKey, GateState>>,
    changed: Condvar,
}

/// Leaves its gate when dropped
#[must_use = "the gate is left as soon as the guard is dropped"]
pub struct GateGuard<'a> {
    gates: &'a StatusGates,
    key: GateKey,
    exclusive: bool,
}

impl StatusGates {
    pub fn new() -> Self {
        Self {
            gates: Mutex::new(HashMap::new()),
            changed: Condvar::new(),
        }
    }

    /// Enter `key` alongside other shared holders
    pub fn shared(&self, key: GateKey) -> Result<GateGuard<'_>> {
        let mut gates = self.lock()?;
        loop {
            let state = gates.entry(key).or_default();
            if !state.writer && state.writers_waiting == 0 {
                state.readers += 1;
                break;
            }
            gates = self.wait(gates)?;
        }

        tracing::trace!(?key, "status gate entered shared");
        Ok(GateGuard {
            gates: self,
            key,
            exclusive: false,
        })
    }

    /// Enter `key` alone, after every shared holder has left
    pub fn exclusive(&self, key: GateKey) -> Result<GateGuard<'_>> {
        let mut gates = self.lock()?;
        gates.entry(key).or_default().writers_waiting += 1;
        loop {
            let state = gates.entry(key).or_default();
            if !state.writer && state.readers == 0 {
                state.writers_waiting -= 1;
                state.writer = true;
                break;
            }
            gates = self.wait(gates)?;
        }

        tracing::trace!(?key, "status gate entered exclusive");
        Ok(GateGuard {
            gates: self,
            key,
            exclusive: true,
        })
    }

    /// Number of keys with a holder or a waiter
    pub fn busy_count(&self) -> Result<usize> {
        Ok(self.lock()?.len())
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<GateKey, GateState>>> {
        self.gates
            .lock()
            .map_err(|_| Error::internal("Status gate registry poisoned"))
    }

    fn wait<'a>(
        &self,
        gates: MutexGuard<'a, HashMap<GateKey, GateState>>,
    ) -> Result<MutexGuard<'a, HashMap<GateKey, GateState>>> {
        self.changed
            .wait(gates)
            .map_err(|_| Error::internal("Status gate registry poisoned"))
    }
}

impl Default for StatusGates {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for GateGuard<'_> {
    fn drop(&mut self) {
        let mut gates = self
            .gates
            .gates
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(state) = gates.get_mut(&self.key) {
            if self.exclusive {
                state.writer = false;
            } else {
                state.readers = state.readers.saturating_sub(1);
            }
            if state.is_idle() {
                gates.remove(&self.key);
            }
        }
        drop(gates);
        self.gates.changed.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_guard_releases_on_drop() {
        let locks = AdmissionLocks::new();
        let key = AdmissionKey::position("SH-1", PositionId::new());

        {
            let _guard = locks.acquire(&key).unwrap();
            assert!(locks.is_held(&key).unwrap());
        }
        assert!(!locks.is_held(&key).unwrap());
        assert_eq!(locks.held_count().unwrap(), 0);
    }

    #[test]
    fn test_distinct_keys_do_not_contend() {
        let locks = AdmissionLocks::new();
        let position = PositionId::new();
        let a = locks.acquire(&AdmissionKey::position("SH-1", position)).unwrap();
        let b = locks.acquire(&AdmissionKey::position("SH-2", position)).unwrap();
        let c = locks.acquire(&AdmissionKey::issue("SH-1", IssueId::new())).unwrap();
        assert_eq!(locks.held_count().unwrap(), 3);
        drop((a, b, c));
    }

    #[test]
    fn test_same_key_is_mutually_exclusive() {
        let locks = Arc::new(AdmissionLocks::new());
        let key = AdmissionKey::issue("SH-7", IssueId::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let max_inside = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let locks = locks.clone();
                let key = key.clone();
                let inside = inside.clone();
                let max_inside = max_inside.clone();
                thread::spawn(move || {
                    let _guard = locks.acquire(&key).unwrap();
                    let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                    max_inside.fetch_max(now, Ordering::SeqCst);
                    thread::sleep(Duration::from_millis(2));
                    inside.fetch_sub(1, Ordering::SeqCst);
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(max_inside.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_shared_holders_coexist() {
        let gates = StatusGates::new();
        let key = GateKey::Position(PositionId::new());
        let a = gates.shared(key).unwrap();
        let b = gates.shared(key).unwrap();
        let other = gates.exclusive(GateKey::IssueTitles).unwrap();
        assert_eq!(gates.busy_count().unwrap(), 2);
        drop((a, b, other));
        assert_eq!(gates.busy_count().unwrap(), 0);
    }

    #[test]
    fn test_exclusive_waits_for_shared_holders() {
        let gates = Arc::new(StatusGates::new());
        let key = GateKey::Issue(IssueId::new());
        let entered = Arc::new(AtomicUsize::new(0));

        let reader = gates.shared(key).unwrap();
        let writer = {
            let gates = gates.clone();
            let entered = entered.clone();
            thread::spawn(move || {
                let _guard = gates.exclusive(key).unwrap();
                entered.store(1, Ordering::SeqCst);
            })
        };

        thread::sleep(Duration::from_millis(30));
        assert_eq!(entered.load(Ordering::SeqCst), 0);
        drop(reader);
        writer.join().unwrap();
        assert_eq!(entered.load(Ordering::SeqCst), 1);
        assert_eq!(gates.busy_count().unwrap(), 0);
    }

    #[test]
    fn test_waiting_writer_blocks_new_readers() {
        let gates = Arc::new(StatusGates::new());
        let key = GateKey::Position(PositionId::new());
        let order = Arc::new(Mutex::new(Vec::new()));

        let first = gates.shared(key).unwrap();
        let writer = {
            let (gates, order) = (gates.clone(), order.clone());
            thread::spawn(move || {
                let _guard = gates.exclusive(key).unwrap();
                order.lock().unwrap().push("writer");
            })
        };
        thread::sleep(Duration::from_millis(30));

        let late_reader = {
            let (gates, order) = (gates.clone(), order.clone());
            thread::spawn(move || {
                let _guard = gates.shared(key).unwrap();
                order.lock().unwrap().push("reader");
            })
        };
        thread::sleep(Duration::from_millis(30));
        assert!(order.lock().unwrap().is_empty());

        drop(first);
        writer.join().unwrap();
        late_reader.join().unwrap();
        assert_eq!(*order.lock().unwrap(), vec!["writer", "reader"]);
    }
}
