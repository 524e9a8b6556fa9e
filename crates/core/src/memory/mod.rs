// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::StateObserver;
use std::collections::HashMap;
use std::sync::Arc;

/// Sparse backing store owned by a bank.
///
/// Registers and fields address it by bank offset. Bytes that were never
/// written read as zero.
#[derive(Debug, Default, Clone)]
pub struct BankMemory {
    data: HashMap<u64, u8>,
    observer: Option<Arc<dyn StateObserver>>,
}

impl BankMemory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn read_u8(&self, offset: u64) -> u8 {
        self.data.get(&offset).copied().unwrap_or(0)
    }

    /// Stores `value` and reports whether the byte changed.
    pub fn write_u8(&mut self, offset: u64, value: u8) -> bool {
        let old = self.data.insert(offset, value).unwrap_or(0);
        old != value
    }

    /// Reads `len` bytes starting at `offset`, byte `i` holding bits `[8i, 8i+8)`.
    pub fn read_le(&self, offset: u64, len: u8) -> u64 {
        (0..len.min(8)).fold(0u64, |acc, i| {
            acc | (self.read_u8(offset + i as u64) as u64) << (8 * i as u32)
        })
    }

    /// Inverse of [`read_le`](Self::read_le). Reports whether any byte changed.
    pub fn write_le(&mut self, offset: u64, len: u8, value: u64) -> bool {
        let mut changed = false;
        for i in 0..len.min(8) {
            let byte = (value >> (8 * i as u32)) as u8;
            changed |= self.write_u8(offset + i as u64, byte);
        }
        changed
    }

    /// Number of bytes that have been materialized.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn set_observer(&mut self, observer: Option<Arc<dyn StateObserver>>) {
        self.observer = observer;
    }

    pub fn notify_changed(&self, name: &str) {
        if let Some(observer) = &self.observer {
            observer.on_value_changed(name);
        }
    }
}
