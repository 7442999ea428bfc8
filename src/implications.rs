//! Implications buffer (§4.6): the mutable view over state that one accumulate
//! invocation observes and mutates. A fresh buffer is built from [`crate::state::State`]
//! before the guest runs; on success it is committed back wholesale, on panic/fault/
//! out-of-gas it is discarded — except for whatever was snapshotted into the
//! exceptional dimension by an earlier CHECKPOINT (Gray Paper line 752: imY' = imX).

use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use crate::codec::{
    self, CompleteServiceAccount, DeferredTransfer, Implications, ImplicationsPair, PartialState,
    ProvisionEntry,
};
use crate::errors::StfError;

/// A sparse, copy-on-write view over a shared account map. `base` is an `Rc` clone
/// of `State::accounts` (refcount bump, not a deep copy); `overlay` and `removed`
/// only ever grow as large as the accounts one invocation actually touches. This is
/// the arena-plus-index overlay: reads fall through to `base`, writes clone just the
/// one touched account into `overlay`, and `into_touched` hands the caller only what
/// changed instead of every account in state.
#[derive(Clone, Debug)]
pub struct AccountsOverlay {
    base: Rc<HashMap<u64, CompleteServiceAccount>>,
    overlay: HashMap<u64, CompleteServiceAccount>,
    removed: HashSet<u64>,
}

impl AccountsOverlay {
    /// Wrap a shared base with no accounts yet touched.
    #[must_use]
    pub fn from_base(base: Rc<HashMap<u64, CompleteServiceAccount>>) -> Self {
        Self {
            base,
            overlay: HashMap::new(),
            removed: HashSet::new(),
        }
    }

    /// Wrap an already-materialized map (wire decode, tests) as the overlay itself,
    /// with an empty base — every entry counts as touched.
    #[must_use]
    pub fn from_full(accounts: HashMap<u64, CompleteServiceAccount>) -> Self {
        Self {
            base: Rc::new(HashMap::new()),
            overlay: accounts,
            removed: HashSet::new(),
        }
    }

    #[must_use]
    pub fn get(&self, id: &u64) -> Option<&CompleteServiceAccount> {
        if self.removed.contains(id) {
            return None;
        }
        self.overlay.get(id).or_else(|| self.base.get(id))
    }

    pub fn get_mut(&mut self, id: &u64) -> Option<&mut CompleteServiceAccount> {
        if self.removed.contains(id) {
            return None;
        }
        if !self.overlay.contains_key(id) {
            let existing = self.base.get(id)?.clone();
            self.overlay.insert(*id, existing);
        }
        self.overlay.get_mut(id)
    }

    #[must_use]
    pub fn contains_key(&self, id: &u64) -> bool {
        !self.removed.contains(id) && (self.overlay.contains_key(id) || self.base.contains_key(id))
    }

    pub fn insert(&mut self, id: u64, account: CompleteServiceAccount) -> Option<CompleteServiceAccount> {
        self.removed.remove(&id);
        match self.overlay.insert(id, account) {
            Some(old) => Some(old),
            None => self.base.get(&id).cloned(),
        }
    }

    pub fn remove(&mut self, id: &u64) -> Option<CompleteServiceAccount> {
        let existing = self.get(id).cloned();
        self.removed.insert(*id);
        self.overlay.remove(id);
        existing
    }

    /// Consume the overlay, returning only what one invocation touched: the
    /// account entries it wrote or created, and the ids it removed. `merge_implications`
    /// folds these into `State::accounts` instead of replacing the whole map.
    #[must_use]
    pub fn into_touched(self) -> (HashMap<u64, CompleteServiceAccount>, HashSet<u64>) {
        (self.overlay, self.removed)
    }

    /// Materialize the full account map (base ∪ overlay, minus removed) for wire
    /// encoding. Unlike every other method here this is O(n); it only runs where the
    /// wire format itself demands every account be listed.
    #[must_use]
    pub fn into_full_map(self) -> HashMap<u64, CompleteServiceAccount> {
        let mut result = match Rc::try_unwrap(self.base) {
            Ok(map) => map,
            Err(rc) => (*rc).clone(),
        };
        for id in &self.removed {
            result.remove(id);
        }
        for (id, account) in self.overlay {
            result.insert(id, account);
        }
        result
    }
}

/// One dimension (regular or exceptional) of the pair actually carried during
/// execution. Accounts are held as a copy-on-write overlay for O(1) lookup without
/// cloning every sibling account; `state.accounts` on the wire form is rebuilt from
/// this overlay at encode time.
#[derive(Clone, Debug)]
pub struct ImplicationsBuffer {
    /// Widened to u64 to match `HostFunctionContext`'s register-width service ids;
    /// values never exceed `u32::MAX` (Gray Paper serviceid ≡ Nbits{32}).
    pub service_id: u64,
    pub accounts: AccountsOverlay,
    pub privileged: PartialState,
    pub nextfreeid: u32,
    pub xfers: Vec<DeferredTransfer>,
    pub yield_hash: Option<Vec<u8>>,
    pub provisions: Vec<ProvisionEntry>,
}

impl ImplicationsBuffer {
    #[must_use]
    pub fn new(service_id: u64, accounts: HashMap<u64, CompleteServiceAccount>, privileged: PartialState, nextfreeid: u32) -> Self {
        Self {
            service_id,
            accounts: AccountsOverlay::from_full(accounts),
            privileged,
            nextfreeid,
            xfers: Vec::new(),
            yield_hash: None,
            provisions: Vec::new(),
        }
    }

    /// Build a buffer backed directly by a shared base map — the accumulate driver's
    /// entry point for one work result or deferred transfer. `Rc::clone` is a refcount
    /// bump, not a copy; nothing here clones an untouched account.
    #[must_use]
    pub fn from_state_overlay(
        service_id: u64,
        base: Rc<HashMap<u64, CompleteServiceAccount>>,
        privileged: PartialState,
        nextfreeid: u32,
    ) -> Self {
        Self {
            service_id,
            accounts: AccountsOverlay::from_base(base),
            privileged,
            nextfreeid,
            xfers: Vec::new(),
            yield_hash: None,
            provisions: Vec::new(),
        }
    }

    /// Decode a wire `Implications` into a working buffer, folding its embedded
    /// account list into a map.
    #[must_use]
    pub fn from_wire(wire: Implications) -> Self {
        let mut accounts = HashMap::with_capacity(wire.state.accounts.len());
        let mut privileged = wire.state;
        for entry in privileged.accounts.drain(..) {
            accounts.insert(u64::from(entry.service_id), entry.account);
        }
        Self {
            service_id: u64::from(wire.id),
            accounts: AccountsOverlay::from_full(accounts),
            privileged,
            nextfreeid: wire.nextfreeid,
            xfers: wire.xfers,
            yield_hash: wire.yield_hash,
            provisions: wire.provisions,
        }
    }

    /// Encode back to the wire form, folding the account map back into `state.accounts`.
    #[must_use]
    pub fn into_wire(self) -> Implications {
        let mut state = self.privileged;
        let mut accounts: Vec<_> = self
            .accounts
            .into_full_map()
            .into_iter()
            .map(|(service_id, account)| crate::codec::AccountEntry {
                service_id: service_id as u32,
                account,
            })
            .collect();
        accounts.sort_by_key(|e| e.service_id);
        state.accounts = accounts;
        Implications {
            id: self.service_id as u32,
            state,
            nextfreeid: self.nextfreeid,
            xfers: self.xfers,
            yield_hash: self.yield_hash,
            provisions: self.provisions,
        }
    }

    /// Borrow the invoking service's own account, if it exists among the siblings.
    #[must_use]
    pub fn own_account(&self) -> Option<&CompleteServiceAccount> {
        self.accounts.get(&self.service_id)
    }

    #[must_use]
    pub fn own_account_mut(&mut self) -> Option<&mut CompleteServiceAccount> {
        self.accounts.get_mut(&self.service_id)
    }

    /// Snapshot this buffer into the exceptional dimension (CHECKPOINT, Gray Paper
    /// line 752). A plain clone: the exceptional copy evolves independently from
    /// this point on.
    #[must_use]
    pub fn snapshot(&self) -> Self {
        self.clone()
    }
}

/// The full pair (imX regular and exceptional) threaded through one invocation.
#[derive(Clone, Debug)]
pub struct ImplicationsPairBuffer {
    pub regular: ImplicationsBuffer,
    pub exceptional: ImplicationsBuffer,
}

impl ImplicationsPairBuffer {
    #[must_use]
    pub fn from_wire(pair: ImplicationsPair) -> Self {
        Self {
            regular: ImplicationsBuffer::from_wire(pair.regular),
            exceptional: ImplicationsBuffer::from_wire(pair.exceptional),
        }
    }

    /// Decode a raw wire-encoded implications pair straight into a working buffer
    /// pair. The one path from untrusted STF input bytes into this type, so it is
    /// also the one place a malformed blob surfaces as `StfError::Decode` rather
    /// than being silently skipped the way a bad guest program is.
    pub fn decode_wire(
        data: &[u8],
        num_cores: i32,
        num_validators: i32,
        auth_queue_size: i32,
    ) -> Result<Self, StfError> {
        let decoded = codec::decode_implications_pair(data, num_cores, num_validators, auth_queue_size)?;
        Ok(Self::from_wire(decoded.value))
    }

    #[must_use]
    pub fn into_wire(self) -> ImplicationsPair {
        ImplicationsPair {
            regular: self.regular.into_wire(),
            exceptional: self.exceptional.into_wire(),
        }
    }

    /// Start a fresh pair where both dimensions begin identically — the state
    /// before CHECKPOINT has been called (Gray Paper: imX = imY at invocation start).
    #[must_use]
    pub fn identical(buffer: ImplicationsBuffer) -> Self {
        let exceptional = buffer.clone();
        Self {
            regular: buffer,
            exceptional,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_privileged() -> PartialState {
        PartialState::default()
    }

    #[test]
    fn wire_roundtrip_preserves_accounts() {
        let mut accounts = HashMap::new();
        accounts.insert(7, CompleteServiceAccount {
            balance: 100,
            ..Default::default()
        });
        let buffer = ImplicationsBuffer::new(7, accounts, empty_privileged(), 256);
        let wire = buffer.into_wire();
        assert_eq!(wire.state.accounts.len(), 1);
        assert_eq!(wire.state.accounts[0].service_id, 7);

        let restored = ImplicationsBuffer::from_wire(wire);
        assert_eq!(restored.own_account().unwrap().balance, 100);
    }

    #[test]
    fn snapshot_is_independent() {
        let mut accounts = HashMap::new();
        accounts.insert(1, CompleteServiceAccount::default());
        let mut buffer = ImplicationsBuffer::new(1, accounts, empty_privileged(), 0);
        let snapshot = buffer.snapshot();
        buffer.own_account_mut().unwrap().balance = 500;
        assert_eq!(snapshot.own_account().unwrap().balance, 0);
    }

    #[test]
    fn decode_wire_roundtrips_through_pair_buffer() {
        let mut accounts = HashMap::new();
        accounts.insert(3, CompleteServiceAccount {
            balance: 42,
            ..Default::default()
        });
        let buffer = ImplicationsBuffer::new(3, accounts, empty_privileged(), 0);
        let pair = ImplicationsPairBuffer::identical(buffer).into_wire();
        let encoded = codec::encode_implications_pair(&pair, 1, 1, 1);

        let restored = ImplicationsPairBuffer::decode_wire(&encoded, 1, 1, 1).unwrap();
        assert_eq!(restored.regular.own_account().unwrap().balance, 42);
    }

    #[test]
    fn decode_wire_surfaces_truncated_input_as_stf_error() {
        let err = ImplicationsPairBuffer::decode_wire(&[], 1, 1, 1).unwrap_err();
        assert!(matches!(err, StfError::Decode(_)));
    }
}
