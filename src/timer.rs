//! Per-key expiring timers
//!
//! Scheduling a key that is already pending replaces its deadline, and
//! cancelling removes it, so an expiry is only ever reported for the most
//! recent schedule of a key. Intended to be polled from a single event
//! loop: sleep until `next_deadline()`, then drain `pop_expired()`.

use std::collections::{BTreeSet, HashMap};
use std::hash::Hash;
use std::time::Duration;

use tokio::time::Instant;

#[derive(Debug)]
pub struct ExpiryTimers<K> {
    timeout: Duration,
    deadlines: HashMap<K, (Instant, u64)>,
    queue: BTreeSet<(Instant, u64, K)>,
    seq: u64,
}

impl<K> ExpiryTimers<K>
where
    K: Clone + Eq + Hash + Ord,
{
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            deadlines: HashMap::new(),
            queue: BTreeSet::new(),
            seq: 0,
        }
    }

    /// (Re)start the timer for `key`, expiring `timeout` after `now`
    pub fn schedule(&mut self, key: K, now: Instant) {
        self.cancel(&key);
        self.seq += 1;
        let deadline = now + self.timeout;
        self.deadlines.insert(key.clone(), (deadline, self.seq));
        self.queue.insert((deadline, self.seq, key));
    }

    /// Stop the timer for `key`. Returns true if one was pending.
    pub fn cancel(&mut self, key: &K) -> bool {
        match self.deadlines.remove(key) {
            Some((deadline, seq)) => {
                self.queue.remove(&(deadline, seq, key.clone()));
                true
            }
            None => false,
        }
    }

    /// Earliest pending deadline
    pub fn next_deadline(&self) -> Option<Instant> {
        self.queue.first().map(|(deadline, _, _)| *deadline)
    }

    /// Remove and return every key whose deadline is at or before `now`,
    /// earliest first
    pub fn pop_expired(&mut self, now: Instant) -> Vec<K> {
        let mut expired = Vec::new();
        while let Some((deadline, _, _)) = self.queue.first() {
            if *deadline > now {
                break;
            }
            if let Some((_, _, key)) = self.queue.pop_first() {
                self.deadlines.remove(&key);
                expired.push(key);
            }
        }
        expired
    }
}
