//! Per-page shared/exclusive locks enforcing strict two-phase locking.
//!
//! All state sits behind a single monitor. A transaction that cannot be
//! granted a lock waits on the monitor with a randomized budget; waking up
//! past the budget is the deadlock signal and aborts the transaction.

use crate::transaction::TransactionId;
use crate::PageId;
use rand::Rng;
use std::collections::HashMap;
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// The two lock strengths a page can be held at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockMode {
    Shared,
    Exclusive,
}

#[derive(Debug)]
pub enum LockError {
    /// The wait budget expired before the lock was granted; the owning
    /// transaction must abort.
    Aborted,
}

#[derive(Debug, Default)]
struct LockTable {
    holders: HashMap<(PageId, LockMode), Vec<TransactionId>>,
    waiters: Vec<TransactionId>,
}

#[derive(Debug, Default)]
pub struct LockManager {
    table: Mutex<LockTable>,
    cvar: Condvar,
}

fn lock_recover(mutex: &Mutex<LockTable>) -> MutexGuard<'_, LockTable> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl LockManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Blocks until `tid` holds `mode` on `pid`, or the randomized wait
    /// budget expires.
    pub fn acquire_lock(
        &self,
        tid: TransactionId,
        pid: PageId,
        mode: LockMode,
    ) -> Result<(), LockError> {
        let mut table = lock_recover(&self.table);
        loop {
            if Self::try_acquire(&mut table, tid, pid, mode) {
                return Ok(());
            }
            table = self.park(table, tid)?;
        }
    }

    /// Waits on the monitor for a budget drawn uniformly from [1000, 2000)
    /// milliseconds. A fresh budget is drawn on every wait.
    fn park<'a>(
        &self,
        mut table: MutexGuard<'a, LockTable>,
        tid: TransactionId,
    ) -> Result<MutexGuard<'a, LockTable>, LockError> {
        table.waiters.push(tid);

        let budget = Duration::from_millis(rand::thread_rng().gen_range(1000..2000));
        let start = Instant::now();
        let (mut table, _) = self
            .cvar
            .wait_timeout(table, budget)
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        table.waiters.retain(|waiter| *waiter != tid);

        if start.elapsed() >= budget {
            crate::basalt_debug_log!(
                "[LockManager::park] tx {:?} exceeded its wait budget, aborting",
                tid
            );
            Err(LockError::Aborted)
        } else {
            Ok(table)
        }
    }

    fn try_acquire(table: &mut LockTable, tid: TransactionId, pid: PageId, mode: LockMode) -> bool {
        match mode {
            LockMode::Shared => {
                if let Some(exclusive) = table.holders.get(&(pid, LockMode::Exclusive)) {
                    // Compatible only with our own write lock.
                    return exclusive.contains(&tid);
                }
                let shared = table.holders.entry((pid, LockMode::Shared)).or_default();
                if !shared.contains(&tid) {
                    shared.push(tid);
                }
                true
            }
            LockMode::Exclusive => {
                if let Some(exclusive) = table.holders.get(&(pid, LockMode::Exclusive)) {
                    return exclusive.contains(&tid);
                }
                match table.holders.get(&(pid, LockMode::Shared)) {
                    // Sole shared holder: upgrade in place. The monitor is
                    // held across the check and the install, so no second
                    // acquisition path is needed.
                    Some(shared) if shared.contains(&tid) && shared.len() == 1 => {
                        table
                            .holders
                            .insert((pid, LockMode::Exclusive), vec![tid]);
                        true
                    }
                    Some(_) => false,
                    None => {
                        table
                            .holders
                            .insert((pid, LockMode::Exclusive), vec![tid]);
                        true
                    }
                }
            }
        }
    }

    /// Removes `tid` from the holder list for `mode` on `pid` and wakes
    /// every waiter. Safe to call for locks that were never taken.
    pub fn release_lock(&self, tid: TransactionId, pid: PageId, mode: LockMode) {
        let mut table = lock_recover(&self.table);
        let now_empty = match table.holders.get_mut(&(pid, mode)) {
            Some(holders) => {
                holders.retain(|holder| *holder != tid);
                holders.is_empty()
            }
            None => false,
        };
        if now_empty {
            table.holders.remove(&(pid, mode));
        }
        table.waiters.retain(|waiter| *waiter != tid);
        self.cvar.notify_all();
    }

    /// Whether `tid` holds the page at either strength.
    pub fn holds_lock(&self, tid: TransactionId, pid: PageId) -> bool {
        let table = lock_recover(&self.table);
        [LockMode::Shared, LockMode::Exclusive].iter().any(|mode| {
            table
                .holders
                .get(&(pid, *mode))
                .is_some_and(|holders| holders.contains(&tid))
        })
    }

    /// Every page where `tid` appears in a holder list.
    pub fn pages_held_by(&self, tid: TransactionId) -> Vec<PageId> {
        let table = lock_recover(&self.table);
        let mut pages: Vec<PageId> = table
            .holders
            .iter()
            .filter(|(_, holders)| holders.contains(&tid))
            .map(|((pid, _), _)| *pid)
            .collect();
        pages.sort();
        pages.dedup();
        pages
    }
}
