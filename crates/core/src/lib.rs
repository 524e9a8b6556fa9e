// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Register-bank modeling engine.
//!
//! A device model declares a hierarchy of banks, registers and fields. The
//! [`Bank`](bank::Bank) then serves byte-addressed transactions against that
//! hierarchy, splitting accesses across register and field boundaries and
//! running instrumentation callbacks around each access.
//!
//! The engine is single-threaded per bank: the host issues one transaction
//! at a time and serializes instrumentation registry changes with respect to
//! in-flight dispatch. Callbacks receive only the access context, so nested
//! access to the dispatching bank from inside a callback cannot be expressed.
//! Callbacks that capture a handle to a different bank may access it.

pub mod bank;
pub mod behavior;
pub mod bits;
pub mod device;
pub mod field;
pub mod instrumentation;
pub mod memory;
pub mod naming;
pub mod register;
pub mod snapshot;

pub use bank::{Bank, BankAccess, MemoryTransaction, RegisterSpec, Transaction, TransactionStatus};
pub use behavior::Behavior;
pub use device::{Device, Node};
pub use field::Field;
pub use instrumentation::{CallbackHandle, CallbackKind, Connection, InstrumentationRegistry};
pub use memory::BankMemory;
pub use naming::{HierarchicalName, Level};
pub use register::{FieldInfo, FieldSpec, Register};
pub use regbank_config::ByteOrder;

/// Errors reported by the engine.
///
/// Configuration errors leave the bank untouched. Access errors are turned
/// into a failed transaction by [`Bank::transaction_access`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BankError {
    #[error("invalid hierarchical name '{0}'")]
    InvalidName(String),
    #[error("malformed array specification in '{0}'")]
    MalformedArraySpec(String),
    #[error("array '{name}' declares more than {limit} elements")]
    ArrayTooLarge { name: String, limit: u64 },
    #[error("empty name")]
    EmptyName,
    #[error("register '{name}' has invalid width of {size} bytes (expected 1-8)")]
    InvalidWidth { name: String, size: u8 },
    #[error("register '{name}' at offset {offset:#x} exceeds the bank address space")]
    InvalidOffset { name: String, offset: u64 },
    #[error("register '{name}' at [{offset:#x}, {end:#x}) overlaps register '{other}'")]
    Overlap {
        name: String,
        offset: u64,
        end: u64,
        other: String,
    },
    #[error("duplicate name '{0}'")]
    DuplicateName(String),
    #[error("field '{0}' has zero width")]
    InvalidFieldWidth(String),
    #[error("field '{name}' bits [{lsb}, {end}) exceed the register width of {width} bits")]
    FieldOutOfRange {
        name: String,
        lsb: u32,
        end: u32,
        width: u32,
    },
    #[error("field '{name}' overlaps field '{other}'")]
    FieldOverlap { name: String, other: String },
    #[error("field '{name}' covers {bits} bits, more than 64")]
    TooManyBits { name: String, bits: u32 },
    #[error("field '{0}' is already initialized")]
    AlreadyInitialized(String),
    #[error("'{0}' is finalized, its topology is immutable")]
    Finalized(String),
    #[error("zero-byte access at offset {0:#x}")]
    ZeroSizeAccess(u64),
    #[error("enabled bits {0:#x} are not contiguous")]
    NonContiguousMask(u64),
    #[error("unmapped access at offset {offset:#x}, size {size}")]
    Unmapped { offset: u64, size: usize },
    #[error("payload of {actual} bytes is shorter than the access size of {expected}")]
    ShortPayload { expected: usize, actual: usize },
    #[error("unknown register '{0}'")]
    UnknownRegister(String),
    #[error("unknown field '{0}'")]
    UnknownField(String),
    #[error("unknown bank '{0}'")]
    UnknownBank(String),
    #[error("illegal index in attribute '{0}'")]
    IllegalIndex(String),
    #[error("invalid value for attribute '{name}': {reason}")]
    InvalidAttribute { name: String, reason: String },
}

pub type BankResult<T> = Result<T, BankError>;

/// Receives a notification whenever the stored value of a register or field changes.
pub trait StateObserver: std::fmt::Debug + Send + Sync {
    fn on_value_changed(&self, _name: &str) {}
}
