//! Global state container (§4.8, §6): slot, entropy, service accounts, privileged
//! state, and the ready/accumulated queues. Append-only at the interface level — the
//! accumulate STF takes a `State` and hands back a new one via [`State::commit`];
//! nothing here is shared mutable state across invocations (design note: no global
//! mutable state).

use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use crate::codec::{CompleteServiceAccount, PartialState};
use crate::implications::ImplicationsBuffer;

/// η0..η3, the four most recent entropy accumulators.
pub type Entropy = [[u8; 32]; 4];

/// A work report parked in the ready queue, along with the package hashes of the
/// prerequisites it is still waiting on. Report bytes are held opaque (arena +
/// index design note): the core does not interpret their contents beyond what
/// `accumulate` needs to extract per report.
#[derive(Clone, Debug)]
pub struct ReadyReport {
    pub report: Vec<u8>,
    pub unsatisfied_dependencies: Vec<[u8; 32]>,
}

/// Global state. One value per slot; transitions produce a new value rather than
/// mutating a shared one in place.
#[derive(Clone, Debug, Default)]
pub struct State {
    pub slot: u32,
    pub entropy: Entropy,
    /// Keyed by u64 to match `HostFunctionContext`'s register-width convention;
    /// values never exceed `u32::MAX`. Wrapped in `Rc` so one invocation's
    /// implications buffer can borrow it as a cheap, refcount-bumped base instead of
    /// deep-cloning every account up front (§9 arena + index design note).
    pub accounts: Rc<HashMap<u64, CompleteServiceAccount>>,
    pub privileged: PartialState,
    /// Indexed by core; each core's queue is a ring advanced by a wrap-shift every slot.
    pub ready_queue: Vec<VecDeque<ReadyReport>>,
    /// Indexed by core; holds package hashes of reports accumulated in the last
    /// `epoch_length` slots, used to detect already-accumulated dependencies.
    pub accumulated_queue: Vec<VecDeque<[u8; 32]>>,
    pub current_validators: Vec<Vec<u8>>,
    pub epoch_length: usize,
}

impl State {
    #[must_use]
    pub fn new(num_cores: usize, epoch_length: usize) -> Self {
        Self {
            slot: 0,
            entropy: [[0u8; 32]; 4],
            accounts: Rc::new(HashMap::new()),
            privileged: PartialState::default(),
            ready_queue: (0..num_cores).map(|_| VecDeque::new()).collect(),
            accumulated_queue: (0..num_cores).map(|_| VecDeque::new()).collect(),
            current_validators: Vec::new(),
            epoch_length,
        }
    }

    /// `get_account(service_id) -> Option<Account>` (§6 state container interface).
    #[must_use]
    pub fn get_account(&self, service_id: u64) -> Option<&CompleteServiceAccount> {
        self.accounts.get(&service_id)
    }

    #[must_use]
    pub fn get_account_mut(&mut self, service_id: u64) -> Option<&mut CompleteServiceAccount> {
        Rc::make_mut(&mut self.accounts).get_mut(&service_id)
    }

    /// Merge a committed implications buffer into state: overwrite only the accounts
    /// the invocation actually touched (not every account in state), replace
    /// privileged state, and apply any service it ejected.
    pub fn merge_implications(&mut self, buffer: ImplicationsBuffer) {
        let (touched, removed) = buffer.accounts.into_touched();
        if !touched.is_empty() || !removed.is_empty() {
            let accounts = Rc::make_mut(&mut self.accounts);
            for id in removed {
                accounts.remove(&id);
            }
            for (service_id, account) in touched {
                accounts.insert(service_id, account);
            }
        }
        self.privileged = buffer.privileged;
    }

    /// Park a report in a core's ready queue.
    pub fn park_ready(&mut self, core: usize, report: ReadyReport) {
        self.ready_queue[core].push_back(report);
    }

    /// Record a report's package hash as accumulated this slot, trimming the queue
    /// back to `epoch_length` entries (wrap-shift, §4.7).
    pub fn record_accumulated(&mut self, core: usize, package_hash: [u8; 32]) {
        let queue = &mut self.accumulated_queue[core];
        queue.push_back(package_hash);
        while queue.len() > self.epoch_length {
            queue.pop_front();
        }
    }

    /// Re-evaluate dependency satisfaction for every core's ready queue and pull out
    /// the reports that are now unblocked, in queue order (§4.7).
    pub fn drain_satisfied(&mut self, core: usize) -> Vec<ReadyReport> {
        let accumulated = &self.accumulated_queue[core];
        let queue = &mut self.ready_queue[core];
        let mut satisfied = Vec::new();
        let mut remaining = VecDeque::with_capacity(queue.len());
        for mut entry in queue.drain(..) {
            entry
                .unsatisfied_dependencies
                .retain(|dep| !accumulated.contains(dep));
            if entry.unsatisfied_dependencies.is_empty() {
                satisfied.push(entry);
            } else {
                remaining.push_back(entry);
            }
        }
        *queue = remaining;
        satisfied
    }

    /// Advance the slot. Per §4.7 the ready queue rotates by a wrap-shift on every
    /// slot transition; with one queue per core (not per slot-offset) that reduces to
    /// re-checking dependency satisfaction, which callers do via `drain_satisfied`.
    pub fn advance_slot(&mut self, target_slot: u32) {
        self.slot = target_slot;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_overwrites_touched_accounts_only() {
        let mut state = State::new(1, 12);
        Rc::make_mut(&mut state.accounts).insert(1, CompleteServiceAccount {
            balance: 10,
            ..Default::default()
        });
        Rc::make_mut(&mut state.accounts).insert(2, CompleteServiceAccount {
            balance: 20,
            ..Default::default()
        });

        let mut touched = HashMap::new();
        touched.insert(1, CompleteServiceAccount {
            balance: 999,
            ..Default::default()
        });
        let buffer = ImplicationsBuffer::new(1, touched, PartialState::default(), 0);
        state.merge_implications(buffer);

        assert_eq!(state.get_account(1).unwrap().balance, 999);
        assert_eq!(state.get_account(2).unwrap().balance, 20);
    }

    #[test]
    fn accumulated_queue_caps_at_epoch_length() {
        let mut state = State::new(1, 2);
        state.record_accumulated(0, [1u8; 32]);
        state.record_accumulated(0, [2u8; 32]);
        state.record_accumulated(0, [3u8; 32]);
        assert_eq!(state.accumulated_queue[0].len(), 2);
        assert_eq!(state.accumulated_queue[0][0], [2u8; 32]);
    }

    #[test]
    fn drain_satisfied_releases_only_fully_unblocked_reports() {
        let mut state = State::new(1, 12);
        state.record_accumulated(0, [1u8; 32]);
        state.park_ready(0, ReadyReport {
            report: vec![],
            unsatisfied_dependencies: vec![[1u8; 32]],
        });
        state.park_ready(0, ReadyReport {
            report: vec![],
            unsatisfied_dependencies: vec![[9u8; 32]],
        });
        let satisfied = state.drain_satisfied(0);
        assert_eq!(satisfied.len(), 1);
        assert_eq!(state.ready_queue[0].len(), 1);
    }
}
