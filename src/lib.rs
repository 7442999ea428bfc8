//! JAM protocol PVM interpreter and Accumulate state-transition function.
//!
//! `pvm` holds the sandboxed 64-bit register machine (§4.4); `accumulate` drives
//! the Accumulate STF over it (§4.7); `state` and `implications` hold the state
//! container and the per-invocation mutable view over it (§4.6, §4.8); `codec`
//! and `crypto` provide the wire encodings and hashing the rest of the crate
//! builds on.

#![allow(dead_code)]

pub mod accumulate;
pub mod codec;
pub mod config;
pub mod crypto;
pub mod errors;
pub mod host_functions;
pub mod implications;
pub mod instructions;
pub mod memory;
pub mod parser;
pub mod pvm;
pub mod state;
pub mod types;

pub use accumulate::{accumulate as run_accumulate, WorkReport, WorkResult};
pub use errors::StfError;
pub use implications::{ImplicationsBuffer, ImplicationsPairBuffer};
pub use pvm::{ExecutionStatus, Pvm};
pub use state::State;
