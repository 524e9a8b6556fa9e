// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::ByteOrder;

/// A transaction issued by the host against a bank.
///
/// The bank reads the payload of writes through [`payload`](Self::payload)
/// and hands read results back through [`fill`](Self::fill).
pub trait Transaction {
    /// Bank-relative offset of the first byte.
    fn offset(&self) -> u64;
    fn size(&self) -> usize;
    fn is_write(&self) -> bool;
    /// Side-effect-free access, used for inspection and checkpointing.
    fn is_inquiry(&self) -> bool {
        false
    }
    fn initiator(&self) -> Option<&str> {
        None
    }
    fn payload(&self) -> &[u8];
    fn fill(&mut self, data: &[u8]);
}

/// Outcome of [`Bank::transaction_access`](super::Bank::transaction_access).
#[must_use]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionStatus {
    Completed,
    /// The host should treat the transaction as not taken.
    NotTaken,
}

impl TransactionStatus {
    pub fn is_completed(self) -> bool {
        self == Self::Completed
    }
}

/// A transaction with its own byte buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryTransaction {
    pub offset: u64,
    pub data: Vec<u8>,
    pub write: bool,
    pub inquiry: bool,
    pub initiator: Option<String>,
}

impl MemoryTransaction {
    pub fn read(offset: u64, size: usize) -> Self {
        Self {
            offset,
            data: vec![0; size],
            write: false,
            inquiry: false,
            initiator: None,
        }
    }

    pub fn write(offset: u64, data: impl Into<Vec<u8>>) -> Self {
        Self {
            offset,
            data: data.into(),
            write: true,
            inquiry: false,
            initiator: None,
        }
    }

    pub fn inquiry(mut self) -> Self {
        self.inquiry = true;
        self
    }

    pub fn with_initiator(mut self, initiator: impl Into<String>) -> Self {
        self.initiator = Some(initiator.into());
        self
    }
}

impl Transaction for MemoryTransaction {
    fn offset(&self) -> u64 {
        self.offset
    }

    fn size(&self) -> usize {
        self.data.len()
    }

    fn is_write(&self) -> bool {
        self.write
    }

    fn is_inquiry(&self) -> bool {
        self.inquiry
    }

    fn initiator(&self) -> Option<&str> {
        self.initiator.as_deref()
    }

    fn payload(&self) -> &[u8] {
        &self.data
    }

    fn fill(&mut self, data: &[u8]) {
        let n = data.len().min(self.data.len());
        self.data[..n].copy_from_slice(&data[..n]);
    }
}

/// The view of an in-flight access handed to instrumentation callbacks.
///
/// It borrows nothing from the bank. The bank stays mutably borrowed for the
/// whole dispatch, so re-entering it from a callback does not compile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BankAccess {
    offset: u64,
    size: usize,
    write: bool,
    inquiry: bool,
    initiator: Option<String>,
    value: u64,
    success: bool,
    suppressed: bool,
}

impl BankAccess {
    pub fn new(offset: u64, size: usize, write: bool, inquiry: bool) -> Self {
        Self {
            offset,
            size,
            write,
            inquiry,
            initiator: None,
            value: 0,
            success: true,
            suppressed: false,
        }
    }

    pub fn with_initiator(mut self, initiator: Option<&str>) -> Self {
        self.initiator = initiator.map(str::to_string);
        self
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn is_write(&self) -> bool {
        self.write
    }

    pub fn is_inquiry(&self) -> bool {
        self.inquiry
    }

    pub fn initiator(&self) -> Option<&str> {
        self.initiator.as_deref()
    }

    /// Value of the leading (at most 8) bytes of the access, in bank byte order.
    pub fn value(&self) -> u64 {
        self.value
    }

    /// Replaces the value seen by later callbacks and, once the callbacks
    /// have run, by the bank (before-write) or the initiator (after-read).
    pub fn set_value(&mut self, value: u64) {
        self.value = value;
    }

    pub fn success(&self) -> bool {
        self.success
    }

    pub(crate) fn fail(&mut self) {
        self.success = false;
    }

    /// Skips the register access. After-callbacks still run.
    pub fn suppress(&mut self) {
        self.suppressed = true;
    }

    pub fn is_suppressed(&self) -> bool {
        self.suppressed
    }
}

/// Leading `min(8, len)` bytes of `bytes` as a number in `order`.
pub(crate) fn bytes_to_value(order: ByteOrder, bytes: &[u8]) -> u64 {
    let head = &bytes[..bytes.len().min(8)];
    match order {
        ByteOrder::Little => head
            .iter()
            .rev()
            .fold(0u64, |acc, b| (acc << 8) | *b as u64),
        ByteOrder::Big => head.iter().fold(0u64, |acc, b| (acc << 8) | *b as u64),
    }
}

/// Inverse of [`bytes_to_value`]; bytes past the eighth are left untouched.
pub(crate) fn value_to_bytes(order: ByteOrder, value: u64, bytes: &mut [u8]) {
    let n = bytes.len().min(8);
    for (i, byte) in bytes[..n].iter_mut().enumerate() {
        let significance = match order {
            ByteOrder::Little => i,
            ByteOrder::Big => n - 1 - i,
        };
        *byte = (value >> (8 * significance)) as u8;
    }
}
