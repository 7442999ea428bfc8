//! PVM core: a single owned interpreter instance (§4.4). No global state; every
//! invocation constructs its own `Pvm` over its own code, registers, and memory.

use crate::config::{self, RESULT_CODE_FAULT, RESULT_CODE_HALT, RESULT_CODE_HOST, RESULT_CODE_OOG, RESULT_CODE_PANIC};
use crate::instructions::registry::InstructionRegistry;
use crate::instructions::registry_instructions::register_all_instructions;
use crate::memory::SparseMemory;
use crate::parser::PvmParser;
use crate::types::{InstructionContext, InstructionResult, RegisterState};

/// Single decoded instruction (opcode, operands, fskip, pc).
#[derive(Clone, Debug)]
pub struct PvmInstruction {
    pub opcode: i32,
    pub operands: Vec<u8>,
    pub fskip: i32,
    pub pc: u32,
}

impl PvmInstruction {
    #[must_use]
    pub fn new(opcode: i32, operands: Vec<u8>, fskip: i32, pc: u32) -> Self {
        Self {
            opcode,
            operands,
            fskip,
            pc,
        }
    }
}

/// PVM execution status (§3).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExecutionStatus {
    Running,
    Halted,
    Panic,
    PageFault,
    OutOfGas,
    /// `host_call_id` carries the ecalli immediate; the driver dispatches and resumes.
    WaitingForHost,
}

fn registry() -> &'static InstructionRegistry {
    use std::sync::OnceLock;
    static REGISTRY: OnceLock<InstructionRegistry> = OnceLock::new();
    REGISTRY.get_or_init(|| {
        let mut r = InstructionRegistry::new();
        register_all_instructions(&mut r);
        r
    })
}

/// One guest invocation's interpreter state. Construct fresh per invocation; nothing
/// here outlives the call that owns it.
pub struct Pvm {
    pub registers: RegisterState,
    pub program_counter: u32,
    pub gas_remaining: i64,
    pub status: ExecutionStatus,
    pub code: Vec<u8>,
    pub bitmask: Vec<u8>,
    pub jump_table: Vec<u32>,
    pub memory: SparseMemory,
    pub host_call_id: u32,
    pub exports: Vec<Vec<u8>>,
    pub fault_address: u32,
    last_opcode: u8,
}

impl Pvm {
    #[must_use]
    pub fn new(code: Vec<u8>, bitmask: Vec<u8>, jump_table: Vec<u32>, memory: SparseMemory, gas_limit: i64) -> Self {
        Self {
            registers: [0u64; 13],
            program_counter: 0,
            gas_remaining: gas_limit,
            status: ExecutionStatus::Running,
            code,
            bitmask,
            jump_table,
            memory,
            host_call_id: 0,
            exports: Vec::new(),
            fault_address: 0,
            last_opcode: 0,
        }
    }

    /// Gas consumed so far relative to the `gas_limit` the Pvm was constructed with.
    #[must_use]
    pub fn gas_consumed(&self, gas_limit: i64) -> i64 {
        gas_limit - self.gas_remaining
    }

    /// Execute instructions until the status leaves `Running`/resumes past a host call
    /// hand-off. Callers that need to intercept host calls should use [`Pvm::step`]
    /// directly instead of this convenience loop.
    pub fn run_to_completion(&mut self) {
        while self.status == ExecutionStatus::Running {
            self.step();
        }
    }

    /// Execute exactly one instruction. On `ExecutionStatus::WaitingForHost`, the driver
    /// must call [`Pvm::resume_after_host`] before stepping again.
    pub fn step(&mut self) {
        self.host_call_id = 0;
        if self.code.is_empty() || self.program_counter as usize >= self.code.len() {
            self.status = ExecutionStatus::Halted;
            return;
        }
        if self.gas_remaining <= 0 {
            self.status = ExecutionStatus::OutOfGas;
            return;
        }

        let pc = self.program_counter;
        let parser = PvmParser::new();
        let fskip = parser.skip(pc as i32, &self.bitmask);
        let instruction_length = 1 + fskip;
        let opcode = self.code[pc as usize] as i32;
        let operands_end = (pc as usize + instruction_length as usize).min(self.code.len());
        let operands = &self.code[(pc as usize + 1)..operands_end];

        let Some(handler) = registry().get_handler(opcode) else {
            self.status = ExecutionStatus::Panic;
            return;
        };

        self.last_opcode = opcode as u8;
        self.gas_remaining -= 1;
        if self.gas_remaining < 0 {
            self.status = ExecutionStatus::OutOfGas;
            return;
        }

        let pc_before = pc;
        let mut host_call_id_out = 0u32;
        let mut context = InstructionContext {
            code: &self.code,
            bitmask: &self.bitmask,
            registers: &mut self.registers,
            program_counter: pc,
            gas_remaining: self.gas_remaining.max(0) as u32,
            operands,
            fskip,
            jump_table: &self.jump_table,
            ram: &mut self.memory,
            host_call_id_out: Some(&mut host_call_id_out),
        };
        let result = handler.execute(&mut context);
        let pc_after = context.program_counter;
        drop(context);
        self.host_call_id = host_call_id_out;

        if result.result_code == RESULT_CODE_HOST as i32 {
            self.program_counter = pc + instruction_length as u32;
            self.status = ExecutionStatus::WaitingForHost;
            return;
        }

        if result.result_code != InstructionResult::CONTINUE {
            self.status = match result.result_code as u8 {
                x if x == RESULT_CODE_HALT => ExecutionStatus::Halted,
                x if x == RESULT_CODE_PANIC => ExecutionStatus::Panic,
                x if x == RESULT_CODE_FAULT => ExecutionStatus::PageFault,
                x if x == RESULT_CODE_OOG => ExecutionStatus::OutOfGas,
                _ => ExecutionStatus::Panic,
            };
            self.fault_address = if result.has_fault_address {
                result.fault_address
            } else {
                0
            };
            return;
        }

        self.program_counter = if pc_after != pc_before {
            pc_after
        } else {
            pc + instruction_length as u32
        };
    }

    /// Deduct the host call's base gas cost and resume running (or go out-of-gas).
    /// The driver must call this after handling a `WaitingForHost` status, whether or
    /// not the host call's own side effects ran.
    pub fn resume_after_host(&mut self, base_gas: i64) {
        self.gas_remaining -= base_gas;
        if self.gas_remaining < 0 {
            self.status = ExecutionStatus::OutOfGas;
        } else {
            self.status = ExecutionStatus::Running;
        }
    }

    /// Terminate the invocation from outside the step loop (host call returned halt/panic/fault/oog).
    pub fn terminate(&mut self, status: ExecutionStatus) {
        self.status = status;
    }

    pub const fn halt_address() -> u32 {
        config::HALT_ADDRESS
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MemoryAccessType;

    #[test]
    fn empty_code_halts_immediately() {
        let mut pvm = Pvm::new(vec![], vec![], vec![], SparseMemory::new(), 1000);
        pvm.step();
        assert_eq!(pvm.status, ExecutionStatus::Halted);
    }

    #[test]
    fn trap_opcode_panics() {
        let mut mem = SparseMemory::new();
        mem.init_page(0, config::PAGE_SIZE, MemoryAccessType::Write);
        let mut pvm = Pvm::new(vec![config::OPCODE_TRAP, 1, 1], vec![1, 1, 1], vec![], mem, 1000);
        pvm.step();
        assert_eq!(pvm.status, ExecutionStatus::Panic);
    }

    #[test]
    fn gas_exhaustion_halts_before_executing() {
        let mut pvm = Pvm::new(vec![config::OPCODE_TRAP], vec![1], vec![], SparseMemory::new(), 0);
        pvm.step();
        assert_eq!(pvm.status, ExecutionStatus::OutOfGas);
    }
}
