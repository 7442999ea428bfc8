//! Error kinds for the decode and accumulate layers (§7).
//!
//! Guest traps (panic, out-of-gas, page-fault) are not modeled as `Result` errors:
//! they are PVM statuses, localized to one invocation, and never unwind past
//! [`crate::accumulate::accumulate`]. Only structural input errors — the kind that
//! should stop block processing rather than just skip a work result — are `Error`s.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("varint length field exceeds remaining blob ({remaining} bytes left, needed {needed})")]
    TruncatedLength { remaining: usize, needed: usize },
    #[error("ill-formed compact natural number encoding at offset {offset}")]
    MalformedVarint { offset: usize },
    #[error("opcode mask section is {got} bytes, expected at least {expected}")]
    MaskTooShort { got: usize, expected: usize },
    #[error("program blob malformed: {0}")]
    MalformedBlob(String),
}

#[derive(Debug, Error)]
pub enum StfError {
    #[error("target slot {target} is not monotonically greater than current slot {current}")]
    NonMonotonicSlot { current: u32, target: u32 },
    #[error("malformed work report extrinsic: {0}")]
    MalformedReport(String),
    #[error(transparent)]
    Decode(#[from] DecodeError),
}
