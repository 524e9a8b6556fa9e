// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::behavior::{self, Behavior};
use crate::memory::BankMemory;
use crate::naming::{HierarchicalName, Level};
use crate::{BankError, BankResult};

/// One byte of storage covered by a field, and which of its bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitSlice {
    /// Bank offset of the byte.
    pub offset: u64,
    pub mask: u8,
}

/// A named bit range inside a register.
///
/// A field does not own storage. It holds the list of bank bytes (and the bits
/// within them) that it covers, in ascending significance.
#[derive(Debug, Clone)]
pub struct Field {
    name: HierarchicalName,
    description: String,
    bits: Vec<BitSlice>,
    /// Position of the field's lsb within the owning register.
    offset: u8,
    number_of_bits: u32,
    behavior: Behavior,
    latched: bool,
}

impl Field {
    /// # Panics
    ///
    /// Panics if `name` is not a `bank.register.field` name.
    pub fn new(name: HierarchicalName, behavior: Behavior) -> Self {
        assert_eq!(
            name.level(),
            Level::Field,
            "'{}' cannot name a field",
            name
        );
        Self {
            name,
            description: String::new(),
            bits: Vec::new(),
            offset: 0,
            number_of_bits: 0,
            behavior,
            latched: false,
        }
    }

    /// Places the field. Only the first successful call has an effect.
    pub fn init(&mut self, description: &str, bits: Vec<BitSlice>, offset: u8) -> BankResult<()> {
        if self.is_initialized() {
            tracing::error!("Field {} is already initialized", self.name);
            return Err(BankError::AlreadyInitialized(self.name.to_string()));
        }
        let count: u32 = bits.iter().map(|b| b.mask.count_ones()).sum();
        if count > 64 {
            tracing::error!("Field {} would cover {} bits, max is 64", self.name, count);
            return Err(BankError::TooManyBits {
                name: self.name.to_string(),
                bits: count,
            });
        }
        if count == 0 {
            tracing::error!("Field {} covers no bits", self.name);
            return Err(BankError::InvalidFieldWidth(self.name.to_string()));
        }

        self.description = description.to_string();
        self.bits = bits;
        self.offset = offset;
        self.number_of_bits = count;
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        !self.bits.is_empty()
    }

    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    pub fn hierarchical_name(&self) -> &HierarchicalName {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Lsb position within the owning register.
    pub fn bit_offset(&self) -> u8 {
        self.offset
    }

    pub fn bit_width(&self) -> u32 {
        self.number_of_bits
    }

    pub fn behavior(&self) -> Behavior {
        self.behavior
    }

    pub fn bits(&self) -> &[BitSlice] {
        &self.bits
    }

    /// Current value, normalized so the field's lsb is bit 0. No side effects.
    pub fn get(&self, memory: &BankMemory) -> u64 {
        let raw = self
            .bits
            .iter()
            .enumerate()
            .fold(0u128, |acc, (i, slice)| {
                acc | ((memory.read_u8(slice.offset) & slice.mask) as u128) << (8 * i)
            });
        (raw >> (self.offset % 8)) as u64
    }

    /// Stores `value` without side effects. Notifies the bank's observer when
    /// any covered bit changes.
    pub fn set(&self, memory: &mut BankMemory, value: u64) {
        let mut remaining = (value as u128) << (self.offset % 8);
        let mut changed = false;
        for slice in &self.bits {
            let old = memory.read_u8(slice.offset);
            let new = (remaining as u8 & slice.mask) | (old & !slice.mask);
            changed |= memory.write_u8(slice.offset, new);
            remaining >>= 8;
        }
        if changed {
            memory.notify_changed(self.name.as_str());
        }
    }

    /// Software read of the bits in `enabled_bits` (field-relative).
    pub fn read(&mut self, memory: &mut BankMemory, enabled_bits: u64) -> u64 {
        let outcome = behavior::on_read(self.behavior, self.get(memory), enabled_bits);
        if let Some(violation) = outcome.violation {
            tracing::warn!(target: "spec_violation", "{}: {}", self.name, violation);
        }
        if let Some(value) = outcome.store {
            self.set(memory, value);
        }
        outcome.value
    }

    /// Software write of the bits in `enabled_bits` (field-relative).
    pub fn write(&mut self, memory: &mut BankMemory, value: u64, enabled_bits: u64) {
        let outcome = behavior::on_write(
            self.behavior,
            self.get(memory),
            value,
            enabled_bits,
            self.latched,
        );
        if let Some(violation) = outcome.violation {
            tracing::warn!(
                target: "spec_violation",
                "{}: {} (value {:#x})",
                self.name,
                violation,
                value
            );
        }
        if outcome.latch {
            self.latched = true;
        }
        if let Some(value) = outcome.store {
            self.set(memory, value);
        }
    }

    pub(crate) fn clear_latch(&mut self) {
        self.latched = false;
    }
}
