//! Accumulate STF (§4.7): the driver that schedules work results, runs each one
//! through the PVM at entry point 5, and commits or discards its implications. No
//! step here holds a global lock; everything is owned by the `State`/`Pvm` values
//! passed through the call.

use std::collections::HashMap;
use std::rc::Rc;

use crate::codec::{self, CompleteServiceAccount, DeferredTransfer};
use crate::config::{self, FetchSystemConstantsConfig};
use crate::errors::StfError;
use crate::host_functions::base::{HostFunction, HostFunctionContext};
use crate::host_functions::get_host_function;
use crate::host_functions::refine::{pages_access_to_memory_type, InvokeResult, RefineContext, RefineMachine};
use crate::implications::{ImplicationsBuffer, ImplicationsPairBuffer};
use crate::memory::SparseMemory;
use crate::parser::PvmParser;
use crate::pvm::{ExecutionStatus, Pvm};
use crate::state::State;
use crate::types::MemoryAccessType;

/// Entry-point table indices (design note: no other index may be assumed).
pub const ENTRY_ACCUMULATE: usize = 5;
pub const ENTRY_ON_TRANSFER: usize = 10;

const HOST_BASE_GAS: i64 = 10;

/// Accumulation-context host-call allowlist (general 0-13, LOG 100, accumulation 14-26).
/// Mirrors the AssemblyScript `handleAccumulationHostCall` gate — the refine-host-call
/// family (HISTORICAL_LOOKUP through EXPUNGE) is reachable from accumulate's
/// child-machine path via MACHINE/INVOKE, so it belongs in the same range as GAS..INFO.
fn host_call_allowed_during_accumulation(id: u32) -> bool {
    let id = u64::from(id);
    id <= 13 || id == 100 || (14..=26).contains(&id)
}

/// One work result as handed to the STF (§4.7 input). Package/context/segment-root
/// fields travel as opaque bytes — the STF reads only what it needs to build the
/// argument buffer and does not itself parse the full work-report wire format.
#[derive(Clone, Debug)]
pub struct WorkResult {
    pub service_id: u64,
    pub code_hash: [u8; 32],
    pub package_hash: [u8; 32],
    pub segment_root: [u8; 32],
    pub authorizer_hash: [u8; 32],
    pub payload_hash: [u8; 32],
    pub accumulate_gas: u64,
    pub auth_trace: Vec<u8>,
    /// `Ok(output)` for a successful refine; `Err(code)` for a refine error variant.
    pub refine_result: Result<Vec<u8>, u32>,
}

/// One work report: an ordered sequence of work results sharing a core (§4.7).
#[derive(Clone, Debug)]
pub struct WorkReport {
    pub core: usize,
    pub results: Vec<WorkResult>,
}

/// Outcome of running one invocation: which implications (if any) the caller should merge.
enum InvocationOutcome {
    Commit(ImplicationsBuffer),
    Discard,
}

/// Encode the argument buffer for accumulate (§4.4): fixed-width little-endian
/// fields, distinct from the variable-length natural-number encoding the rest of
/// the codec uses — the spec's bit-exact layout governs this buffer specifically.
fn encode_accumulate_arguments(timeslot: u32, service_id: u32, results: &[WorkResult]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&timeslot.to_le_bytes());
    out.extend_from_slice(&service_id.to_le_bytes());
    out.extend_from_slice(&(results.len() as u32).to_le_bytes());
    for r in results {
        out.extend_from_slice(&r.package_hash);
        out.extend_from_slice(&r.segment_root);
        out.extend_from_slice(&r.authorizer_hash);
        out.extend_from_slice(&r.payload_hash);
        out.extend_from_slice(&r.accumulate_gas.to_le_bytes());
        out.extend_from_slice(&(r.auth_trace.len() as u32).to_le_bytes());
        out.extend_from_slice(&r.auth_trace);
        match &r.refine_result {
            Ok(output) => {
                out.push(0);
                out.extend_from_slice(&(output.len() as u32).to_le_bytes());
                out.extend_from_slice(output);
            }
            Err(code) => {
                out.push(1);
                out.extend_from_slice(&code.to_le_bytes());
            }
        }
    }
    out
}

/// Encode the argument buffer for on-transfer (§4.4 entry index 10): fixed-width
/// little-endian header, then one encoded entry per transfer destined for this
/// service this slot — grouped so the entry point runs once per destination rather
/// than once per transfer.
fn encode_on_transfer_arguments(timeslot: u32, dest: u32, transfers: &[DeferredTransfer]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&timeslot.to_le_bytes());
    out.extend_from_slice(&dest.to_le_bytes());
    out.extend_from_slice(&(transfers.len() as u32).to_le_bytes());
    for t in transfers {
        out.extend_from_slice(&t.source.to_le_bytes());
        out.extend_from_slice(&t.amount.to_le_bytes());
        out.extend_from_slice(&(t.memo.len() as u32).to_le_bytes());
        out.extend_from_slice(&t.memo);
    }
    out
}

/// A child PVM spawned by MACHINE, wrapped to satisfy `RefineMachine`. Child
/// machines share no memory with the invocation that created them (design note);
/// an `ecalli` inside a child is treated as a panic since accumulate-phase children
/// communicate only through INVOKE's parameters and return values.
struct ChildMachine {
    pvm: Pvm,
}

impl RefineMachine for ChildMachine {
    fn ram_read(&mut self, offset: u32, length: u32) -> Option<Vec<u8>> {
        self.pvm.memory.read_octets(offset, length).data
    }

    fn ram_write(&mut self, offset: u32, data: &[u8]) -> bool {
        !self.pvm.memory.write_octets(offset, data).has_fault
    }

    fn ram_is_readable(&self, offset: u32, length: u32) -> bool {
        self.pvm.memory.is_readable_with_fault(offset, length).success
    }

    fn ram_is_writable(&self, offset: u32, length: u32) -> bool {
        self.pvm.memory.is_writable_with_fault(offset, length).success
    }

    fn set_page_access(&mut self, page_start: u32, page_count: u32, access: u8) {
        let access_type = pages_access_to_memory_type(access);
        self.pvm.memory.set_page_access_rights(
            page_start * config::PAGE_SIZE,
            page_count * config::PAGE_SIZE,
            access_type,
        );
    }

    fn invoke(&mut self, gas_limit: u32, registers: &[u64; 13]) -> InvokeResult {
        self.pvm.registers = *registers;
        self.pvm.gas_remaining = i64::from(gas_limit);
        self.pvm.status = ExecutionStatus::Running;
        loop {
            self.pvm.step();
            match self.pvm.status {
                ExecutionStatus::Running => continue,
                ExecutionStatus::Halted => {
                    return InvokeResult::halt(self.pvm.gas_remaining.max(0) as u32, self.pvm.registers)
                }
                ExecutionStatus::OutOfGas => return InvokeResult::oog(0, self.pvm.registers),
                ExecutionStatus::PageFault => {
                    return InvokeResult::fault(
                        self.pvm.fault_address,
                        self.pvm.gas_remaining.max(0) as u32,
                        self.pvm.registers,
                    )
                }
                ExecutionStatus::WaitingForHost | ExecutionStatus::Panic => {
                    return InvokeResult::panic(self.pvm.gas_remaining.max(0) as u32, self.pvm.registers)
                }
            }
        }
    }

    fn get_pc(&self) -> u64 {
        u64::from(self.pvm.program_counter)
    }
}

/// Machines and export segments (m, e) for one invocation's MACHINE/INVOKE/EXPUNGE/
/// EXPORT/PEEK/POKE/PAGES host calls.
#[derive(Default)]
struct AccumulateRefineContext {
    machines: HashMap<u64, ChildMachine>,
    next_machine_id: u64,
    export_segments: Vec<Vec<u8>>,
}

impl RefineContext for AccumulateRefineContext {
    fn segment_offset(&self) -> i64 {
        0
    }

    fn push_export_segment(&mut self, segment: Vec<u8>) -> Result<i64, ()> {
        if self.export_segments.len() >= config::MAX_PACKAGE_EXPORTS as usize {
            return Err(());
        }
        let result = self.export_segments.len() as i64;
        self.export_segments.push(segment);
        Ok(result)
    }

    fn add_machine(&mut self, program: &[u8], initial_pc: u64) -> u64 {
        let id = self.next_machine_id;
        self.next_machine_id += 1;
        let parser = PvmParser::new();
        let parsed = parser.parse_program(program);
        let mut memory = SparseMemory::new();
        memory.init_page(0, config::PAGE_SIZE, MemoryAccessType::None);
        let mut pvm = Pvm::new(parsed.extended_code, parsed.bitmask, parsed.jump_table, memory, 0);
        pvm.program_counter = initial_pc as u32;
        self.machines.insert(id, ChildMachine { pvm });
        id
    }

    fn with_machine(&mut self, machine_id: u64, f: &mut dyn FnMut(&mut dyn RefineMachine)) -> bool {
        match self.machines.get_mut(&machine_id) {
            Some(m) => {
                f(m);
                true
            }
            None => false,
        }
    }

    fn remove_machine(&mut self, machine_id: u64) -> Option<u64> {
        self.machines.remove(&machine_id).map(|m| m.get_pc())
    }
}

/// Everything one invocation needs beyond the PVM itself: the implications pair, a
/// refine context for child machines, scratch log output, and whether a CHECKPOINT
/// snapshot has ever been taken (governs what a later panic/OOG commits).
struct InvocationScratch {
    pair: ImplicationsPairBuffer,
    refine: AccumulateRefineContext,
    log_messages: Vec<String>,
    checkpoint_requested: bool,
    checkpoint_taken: bool,
    fetch_config: FetchSystemConstantsConfig,
}

impl InvocationScratch {
    fn new(pair: ImplicationsPairBuffer, fetch_config: FetchSystemConstantsConfig) -> Self {
        Self {
            pair,
            refine: AccumulateRefineContext::default(),
            log_messages: Vec::new(),
            checkpoint_requested: false,
            checkpoint_taken: false,
            fetch_config,
        }
    }
}

/// Build the context for one host call, threading a local `u32` gas counter in and
/// out (the trait wants `&mut u32`; the PVM core tracks gas as `i64`).
fn dispatch_host_call(pvm: &mut Pvm, scratch: &mut InvocationScratch, service_id: u64, handler: &dyn HostFunction) {
    let manager_id = Some(u64::from(scratch.pair.regular.privileged.manager));
    let registrar_id = Some(u64::from(scratch.pair.regular.privileged.registrar));
    let mut gas_u32 = pvm.gas_remaining.max(0) as u32;

    let result = {
        let mut context = HostFunctionContext {
            registers: &mut pvm.registers,
            ram: &mut pvm.memory,
            gas_remaining: &mut gas_u32,
            service_id: Some(service_id),
            service_account: None,
            accounts: Some(&mut scratch.pair.regular.accounts),
            manager_id,
            registrar_id,
            nextfreeid: Some(&mut scratch.pair.regular.nextfreeid),
            lookup_timeslot: None,
            timeslot: None,
            expunge_period: Some(u64::from(scratch.fetch_config.preimage_expunge_period)),
            refine_context: Some(&mut scratch.refine),
            yield_hash: Some(&mut scratch.pair.regular.yield_hash),
            provisions: Some(&mut scratch.pair.regular.provisions),
            xfers: Some(&mut scratch.pair.regular.xfers),
            num_validators: None,
            accumulation_state: Some(&mut scratch.pair.regular.privileged),
            checkpoint_requested: Some(&mut scratch.checkpoint_requested),
            num_cores: None,
            fetch_entropy_accumulator: None,
            fetch_authorizer_trace: None,
            fetch_export_segments: None,
            fetch_import_segments: None,
            fetch_work_item_index: None,
            fetch_accumulate_inputs: None,
            fetch_work_package_encoded: None,
            fetch_auth_config: None,
            fetch_auth_token: None,
            fetch_refine_context_encoded: None,
            fetch_work_item_summaries: None,
            fetch_work_item_payloads: None,
            log_messages: Some(&mut scratch.log_messages),
            fetch_system_constants_config: Some(&scratch.fetch_config),
        };
        handler.execute(&mut context)
    };

    pvm.gas_remaining = i64::from(gas_u32);
    tracing::debug!(
        service_id,
        host_call_id = pvm.host_call_id,
        name = handler.name(),
        result_code = result.result_code,
        "host call dispatched"
    );

    // Gray Paper line 752: imY' = imX at the moment CHECKPOINT ran.
    if scratch.checkpoint_requested {
        scratch.pair.exceptional = scratch.pair.regular.snapshot();
        scratch.checkpoint_requested = false;
        scratch.checkpoint_taken = true;
        tracing::debug!(service_id, "checkpoint snapshot taken");
    }

    if !result.should_continue() {
        let status = match result.result_code {
            x if x == config::RESULT_CODE_HALT => ExecutionStatus::Halted,
            x if x == config::RESULT_CODE_PANIC => ExecutionStatus::Panic,
            x if x == config::RESULT_CODE_FAULT => ExecutionStatus::PageFault,
            x if x == config::RESULT_CODE_OOG => ExecutionStatus::OutOfGas,
            _ => ExecutionStatus::Panic,
        };
        pvm.terminate(status);
    }
}

/// Drive one PVM to completion, dispatching host calls as they arrive. Returns
/// which implications (if any) the caller should commit.
fn drive_invocation(pvm: &mut Pvm, scratch: &mut InvocationScratch, service_id: u64) -> InvocationOutcome {
    loop {
        pvm.step();
        match pvm.status {
            ExecutionStatus::Running => continue,
            ExecutionStatus::Halted => {
                tracing::debug!(service_id, "invocation halted, committing regular implications");
                return InvocationOutcome::Commit(scratch.pair.regular.clone());
            }
            ExecutionStatus::Panic | ExecutionStatus::PageFault | ExecutionStatus::OutOfGas => {
                return if scratch.checkpoint_taken {
                    tracing::debug!(
                        service_id,
                        status = ?pvm.status,
                        "invocation terminated after checkpoint, committing exceptional implications"
                    );
                    InvocationOutcome::Commit(scratch.pair.exceptional.clone())
                } else {
                    tracing::debug!(service_id, status = ?pvm.status, "invocation terminated, discarding implications");
                    InvocationOutcome::Discard
                };
            }
            ExecutionStatus::WaitingForHost => {
                let id = pvm.host_call_id;
                if pvm.gas_remaining < HOST_BASE_GAS {
                    pvm.terminate(ExecutionStatus::OutOfGas);
                    continue;
                }
                if host_call_allowed_during_accumulation(id) {
                    if let Some(handler) = get_host_function(id) {
                        dispatch_host_call(pvm, scratch, service_id, handler);
                    } else {
                        tracing::warn!(service_id, host_call_id = id, "unknown host call id");
                        pvm.registers[7] = config::REG_WHAT;
                    }
                } else {
                    tracing::warn!(service_id, host_call_id = id, "host call not allowed during accumulation");
                    pvm.registers[7] = config::REG_WHAT;
                }
                if pvm.status == ExecutionStatus::WaitingForHost {
                    pvm.resume_after_host(HOST_BASE_GAS);
                }
            }
        }
    }
}

/// Reconstitute the preimage blob backing a service's code. `CompleteServiceAccount`
/// does not carry raw preimage bytes as a dedicated field; they live in the
/// account's key-value storage under `create_preimage_key` the way PROVIDE/LOOKUP
/// address them, so code lookup mirrors that path.
fn account_code_preimage(service_id: u32, account: &CompleteServiceAccount) -> Option<Vec<u8>> {
    let key = codec::create_preimage_key(service_id, &account.codehash);
    account
        .raw_csh_keyvals
        .iter()
        .find(|(k, _)| k.as_slice() == key.as_slice())
        .map(|(_, v)| v.clone())
}

/// Run a single work result's accumulate invocation (§4.7 steps 1-6). Returns
/// `None` when steps 1-3 say to skip (account absent, code-hash mismatch, refine
/// error), otherwise the invocation outcome to commit or discard.
fn run_work_result(state: &State, target_slot: u32, result: &WorkResult) -> Option<InvocationOutcome> {
    let service_id = result.service_id;
    let account = state.get_account(service_id).or_else(|| {
        tracing::warn!(service_id, "skipping work result: account not found");
        None
    })?;
    if account.codehash != result.code_hash {
        tracing::warn!(service_id, "skipping work result: code hash mismatch");
        return None;
    }
    if result.refine_result.is_err() {
        tracing::warn!(service_id, "skipping work result: refine error");
        return None;
    }

    let preimage = account_code_preimage(result.service_id as u32, account).or_else(|| {
        tracing::warn!(service_id, "skipping work result: code preimage not found");
        None
    })?;
    let decoded = match codec::decode_program_from_preimage(&preimage) {
        Ok(decoded) => decoded,
        Err(err) => {
            tracing::warn!(service_id, error = %err, "skipping work result: malformed program blob");
            return None;
        }
    };

    let parser = PvmParser::new();
    let parsed = parser.parse_program(&decoded.code);
    if !parsed.success {
        tracing::warn!(service_id, "skipping work result: program parse failed");
        return None;
    }

    let argument_buffer = encode_accumulate_arguments(target_slot, result.service_id as u32, std::slice::from_ref(result));

    let mut memory = SparseMemory::new();
    memory.initialize_memory_layout(
        &argument_buffer,
        &decoded.ro_data,
        &decoded.rw_data,
        decoded.stack_size,
        decoded.heap_zero_padding_size,
    );

    let mut pvm = Pvm::new(parsed.extended_code, parsed.bitmask, parsed.jump_table, memory, result.accumulate_gas as i64);
    pvm.program_counter = *parsed.jump_table.get(ENTRY_ACCUMULATE).unwrap_or(&0);
    pvm.registers[0] = u64::from(config::HALT_ADDRESS);
    pvm.registers[1] = u64::from(config::STACK_SEGMENT_END);
    pvm.registers[7] = u64::from(config::ARGS_SEGMENT_START);
    pvm.registers[8] = argument_buffer.len() as u64;

    let buffer = ImplicationsBuffer::from_state_overlay(result.service_id, Rc::clone(&state.accounts), state.privileged.clone(), 0);
    let pair = ImplicationsPairBuffer::identical(buffer);
    let mut scratch = InvocationScratch::new(pair, FetchSystemConstantsConfig::default());

    Some(drive_invocation(&mut pvm, &mut scratch, result.service_id))
}

/// Run one destination service's on-transfer entry (index 10) once, under its own
/// implications buffer, covering every deferred transfer enqueued for it this slot
/// (§4.7 step 9: "running each destination service's on-transfer entry point"). Gas
/// is budgeted from the destination's own `min_memo_gas`, not any transfer's
/// guest-supplied `gas_limit` (that field is only a floor `transfer.rs` checks
/// against dest.minmemogas, not a gas grant).
fn run_on_transfer(state: &State, target_slot: u32, dest: u32, transfers: &[DeferredTransfer]) -> Option<InvocationOutcome> {
    let dest_id = u64::from(dest);
    let account = state.get_account(dest_id).or_else(|| {
        tracing::warn!(service_id = dest_id, "skipping on-transfer: destination account not found");
        None
    })?;
    let preimage = account_code_preimage(dest, account).or_else(|| {
        tracing::warn!(service_id = dest_id, "skipping on-transfer: code preimage not found");
        None
    })?;
    let decoded = match codec::decode_program_from_preimage(&preimage) {
        Ok(decoded) => decoded,
        Err(err) => {
            tracing::warn!(service_id = dest_id, error = %err, "skipping on-transfer: malformed program blob");
            return None;
        }
    };

    let parser = PvmParser::new();
    let parsed = parser.parse_program(&decoded.code);
    if !parsed.success {
        tracing::warn!(service_id = dest_id, "skipping on-transfer: program parse failed");
        return None;
    }

    let argument_buffer = encode_on_transfer_arguments(target_slot, dest, transfers);
    let total_amount: u64 = transfers.iter().map(|t| t.amount).sum();

    let mut memory = SparseMemory::new();
    memory.initialize_memory_layout(
        &argument_buffer,
        &decoded.ro_data,
        &decoded.rw_data,
        decoded.stack_size,
        decoded.heap_zero_padding_size,
    );

    let mut pvm = Pvm::new(parsed.extended_code, parsed.bitmask, parsed.jump_table, memory, account.minmemogas as i64);
    pvm.program_counter = *parsed.jump_table.get(ENTRY_ON_TRANSFER).unwrap_or(&0);
    pvm.registers[0] = u64::from(config::HALT_ADDRESS);
    pvm.registers[1] = u64::from(config::STACK_SEGMENT_END);
    pvm.registers[7] = u64::from(config::ARGS_SEGMENT_START);
    pvm.registers[8] = argument_buffer.len() as u64;

    let mut buffer = ImplicationsBuffer::from_state_overlay(dest_id, Rc::clone(&state.accounts), state.privileged.clone(), 0);
    if let Some(acct) = buffer.accounts.get_mut(&dest_id) {
        acct.balance = acct.balance.saturating_add(total_amount);
    }
    let pair = ImplicationsPairBuffer::identical(buffer);
    let mut scratch = InvocationScratch::new(pair, FetchSystemConstantsConfig::default());

    Some(drive_invocation(&mut pvm, &mut scratch, dest_id))
}

/// Main STF entry (§4.7). Processes every work result across every report in
/// order, then runs the deferred-transfer phase (step 9). Structural input errors
/// surface as `StfError`; guest failures never do (§7 propagation policy).
pub fn accumulate(state: &mut State, target_slot: u32, reports: &[WorkReport]) -> Result<(), StfError> {
    if target_slot <= state.slot {
        return Err(StfError::NonMonotonicSlot {
            current: state.slot,
            target: target_slot,
        });
    }

    let mut deferred_transfers = Vec::new();

    for report in reports {
        for result in &report.results {
            let Some(outcome) = run_work_result(state, target_slot, result) else {
                continue;
            };
            if let InvocationOutcome::Commit(buffer) = outcome {
                deferred_transfers.extend(buffer.xfers.clone());
                state.merge_implications(buffer);
                if let Some(account) = state.get_account_mut(result.service_id) {
                    account.lastacc = target_slot;
                }
                state.record_accumulated(report.core, result.package_hash);
            }
        }
    }

    // §5 ordering guarantee: transfers run in the order their destinations were
    // first enqueued; every transfer to the same destination this slot is handed
    // to a single on-transfer invocation rather than one invocation per transfer.
    let mut dest_order = Vec::new();
    let mut by_dest: HashMap<u32, Vec<DeferredTransfer>> = HashMap::new();
    for transfer in deferred_transfers {
        by_dest.entry(transfer.dest).or_insert_with(|| {
            dest_order.push(transfer.dest);
            Vec::new()
        }).push(transfer);
    }

    for dest in dest_order {
        let transfers = by_dest.remove(&dest).unwrap_or_default();
        let dest_id = u64::from(dest);
        let total_amount: u64 = transfers.iter().map(|t| t.amount).sum();
        match run_on_transfer(state, target_slot, dest, &transfers) {
            Some(InvocationOutcome::Commit(buffer)) => state.merge_implications(buffer),
            Some(InvocationOutcome::Discard) | None => {
                if let Some(acct) = state.get_account_mut(dest_id) {
                    acct.balance = acct.balance.saturating_add(total_amount);
                }
            }
        }
    }

    state.advance_slot(target_slot);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_monotonic_slot() {
        let mut state = State::new(1, 12);
        state.slot = 10;
        let err = accumulate(&mut state, 10, &[]).unwrap_err();
        assert!(matches!(err, StfError::NonMonotonicSlot { current: 10, target: 10 }));
    }

    #[test]
    fn empty_reports_only_advance_slot() {
        let mut state = State::new(1, 12);
        Rc::make_mut(&mut state.accounts).insert(1, CompleteServiceAccount::default());
        accumulate(&mut state, 1, &[]).unwrap();
        assert_eq!(state.slot, 1);
        assert_eq!(state.accounts.get(&1).unwrap().balance, 0);
    }

    /// Builds a preimage blob (`decode_program_from_preimage` format) wrapping a
    /// single-instruction program whose jump table points entry 5 (accumulate) at
    /// offset 0. `code` is the program's raw instruction bytes; `bitmask` marks
    /// instruction boundaries.
    fn single_instruction_preimage(opcode: u8) -> Vec<u8> {
        let inner_blob = codec::encode_blob(&codec::DecodedBlob {
            code: vec![opcode],
            bitmask: vec![1],
            jump_table: vec![0, 0, 0, 0, 0, 0],
            element_size: 1,
            header_size: 0,
        });

        let mut code_blob = Vec::new();
        code_blob.extend_from_slice(&[0u8; 3]); // ro_data_length
        code_blob.extend_from_slice(&[0u8; 3]); // rw_data_length
        code_blob.extend_from_slice(&[0u8; 2]); // heap_zero_padding_size
        code_blob.extend_from_slice(&[0u8; 3]); // stack_size
        code_blob.extend_from_slice(&(inner_blob.len() as u32).to_le_bytes()); // code_size
        code_blob.extend_from_slice(&inner_blob);

        let mut preimage = codec::encode_natural(0); // metadata length
        preimage.extend_from_slice(&code_blob);
        preimage
    }

    /// Builds a loop program: `count` FALLTHROUGH instructions followed by a TRAP,
    /// used to exhaust a small gas budget before the TRAP is ever reached.
    fn looping_preimage(count: usize) -> Vec<u8> {
        let mut code = vec![1u8; count]; // OPCODE_FALLTHROUGH
        code.push(0); // OPCODE_TRAP
        let bitmask = vec![1u8; code.len()];
        let inner_blob = codec::encode_blob(&codec::DecodedBlob {
            code,
            bitmask,
            jump_table: vec![0, 0, 0, 0, 0, 0],
            element_size: 1,
            header_size: 0,
        });

        let mut code_blob = Vec::new();
        code_blob.extend_from_slice(&[0u8; 3]);
        code_blob.extend_from_slice(&[0u8; 3]);
        code_blob.extend_from_slice(&[0u8; 2]);
        code_blob.extend_from_slice(&[0u8; 3]);
        code_blob.extend_from_slice(&(inner_blob.len() as u32).to_le_bytes());
        code_blob.extend_from_slice(&inner_blob);

        let mut preimage = codec::encode_natural(0);
        preimage.extend_from_slice(&code_blob);
        preimage
    }

    fn account_with_preimage(service_id: u32, preimage: Vec<u8>) -> CompleteServiceAccount {
        let codehash = crate::crypto::blake2b256(&preimage);
        let key = codec::create_preimage_key(service_id, &codehash);
        CompleteServiceAccount {
            codehash,
            balance: 1_000_000,
            raw_csh_keyvals: vec![(key.to_vec(), preimage)],
            ..CompleteServiceAccount::default()
        }
    }

    fn seed_work_result(service_id: u64, code_hash: [u8; 32], accumulate_gas: u64) -> WorkResult {
        WorkResult {
            service_id,
            code_hash,
            package_hash: [7u8; 32],
            segment_root: [0u8; 32],
            authorizer_hash: [0u8; 32],
            payload_hash: [0u8; 32],
            accumulate_gas,
            auth_trace: vec![],
            refine_result: Ok(vec![]),
        }
    }

    #[test]
    fn panic_without_checkpoint_discards_implications() {
        let mut state = State::new(1, 12);
        let account = account_with_preimage(7, single_instruction_preimage(0 /* OPCODE_TRAP */));
        let code_hash = account.codehash;
        Rc::make_mut(&mut state.accounts).insert(7, account);

        let report = WorkReport {
            core: 0,
            results: vec![seed_work_result(7, code_hash, 10_000)],
        };
        accumulate(&mut state, 1, &[report]).unwrap();

        assert_eq!(state.slot, 1);
        assert_eq!(state.accounts.get(&7).unwrap().balance, 1_000_000);
        assert_eq!(state.accounts.get(&7).unwrap().lastacc, 0);
    }

    #[test]
    fn gas_exhaustion_discards_implications() {
        let mut state = State::new(1, 12);
        let account = account_with_preimage(9, looping_preimage(64));
        let code_hash = account.codehash;
        Rc::make_mut(&mut state.accounts).insert(9, account);

        // Budget far smaller than the 64 FALLTHROUGH steps needed to reach TRAP.
        let report = WorkReport {
            core: 0,
            results: vec![seed_work_result(9, code_hash, 5)],
        };
        accumulate(&mut state, 1, &[report]).unwrap();

        assert_eq!(state.slot, 1);
        assert_eq!(state.accounts.get(&9).unwrap().balance, 1_000_000);
        assert_eq!(state.accounts.get(&9).unwrap().lastacc, 0);
    }

    #[test]
    fn missing_account_skips_without_error() {
        let mut state = State::new(1, 12);
        let report = WorkReport {
            core: 0,
            results: vec![WorkResult {
                service_id: 42,
                code_hash: [0u8; 32],
                package_hash: [1u8; 32],
                segment_root: [0u8; 32],
                authorizer_hash: [0u8; 32],
                payload_hash: [0u8; 32],
                accumulate_gas: 1000,
                auth_trace: vec![],
                refine_result: Ok(vec![]),
            }],
        };
        accumulate(&mut state, 1, &[report]).unwrap();
        assert_eq!(state.slot, 1);
        assert!(state.accumulated_queue[0].is_empty());
    }
}
