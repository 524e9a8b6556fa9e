// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

mod transaction;

pub use transaction::{BankAccess, MemoryTransaction, Transaction, TransactionStatus};

use crate::behavior::Behavior;
use crate::instrumentation::{CallbackKind, InstrumentationRegistry};
use crate::memory::BankMemory;
use crate::naming::{self, HierarchicalName, Level, SEPARATOR};
use crate::register::{FieldInfo, FieldSpec, Register, MAX_REGISTER_BYTES};
use crate::{BankError, BankResult, ByteOrder, StateObserver};
use anyhow::Context;
use regbank_config::{BankDescriptor, RegisterDescriptor};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use transaction::{bytes_to_value, value_to_bytes};

/// Upper bound on the elements a single register array may declare.
pub const MAX_ARRAY_ELEMENTS: u64 = 1 << 16;

/// Declaration of a register, as handed to [`Bank::add_register`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterSpec {
    /// Local name, may carry array dimensions.
    pub name: String,
    pub description: String,
    pub offset: u64,
    /// Width in bytes, 1 to 8.
    pub size: u8,
    pub init_value: u64,
    pub behavior: Behavior,
    pub fields: Vec<FieldSpec>,
}

impl RegisterSpec {
    pub fn new(name: impl Into<String>, offset: u64, size: u8) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            offset,
            size,
            init_value: 0,
            behavior: Behavior::default(),
            fields: Vec::new(),
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn init_value(mut self, init_value: u64) -> Self {
        self.init_value = init_value;
        self
    }

    pub fn behavior(mut self, behavior: Behavior) -> Self {
        self.behavior = behavior;
        self
    }

    pub fn field(mut self, field: FieldSpec) -> Self {
        self.fields.push(field);
        self
    }
}

impl From<&RegisterDescriptor> for RegisterSpec {
    fn from(desc: &RegisterDescriptor) -> Self {
        Self {
            name: desc.name.clone(),
            description: desc.description.clone().unwrap_or_default(),
            offset: desc.offset,
            size: desc.size,
            init_value: desc.init_value,
            behavior: desc.behavior,
            fields: desc.fields.iter().map(FieldSpec::from).collect(),
        }
    }
}

/// A byte-addressed container of registers.
///
/// The bank owns the backing memory of every register it holds and is the
/// entry point for transactions. Registers are kept ordered by offset and
/// never overlap.
#[derive(Debug)]
pub struct Bank {
    name: HierarchicalName,
    description: String,
    byte_order: ByteOrder,
    miss_pattern: Option<u8>,
    memory: BankMemory,
    registers: BTreeMap<u64, Register>,
    /// Local register name to offset.
    names: HashMap<String, u64>,
    instrumentation: InstrumentationRegistry,
    finalized: bool,
}

impl Bank {
    pub fn new(name: &str) -> BankResult<Self> {
        let name = HierarchicalName::parse(name)?;
        if name.level() != Level::Bank || naming::is_array(name.as_str()) {
            tracing::error!("'{}' is not a valid bank name", name);
            return Err(BankError::InvalidName(name.to_string()));
        }
        Ok(Self {
            name,
            description: String::new(),
            byte_order: ByteOrder::default(),
            miss_pattern: None,
            memory: BankMemory::new(),
            registers: BTreeMap::new(),
            names: HashMap::new(),
            instrumentation: InstrumentationRegistry::new(),
            finalized: false,
        })
    }

    pub fn with_byte_order(mut self, byte_order: ByteOrder) -> Self {
        self.byte_order = byte_order;
        self
    }

    pub fn with_miss_pattern(mut self, miss_pattern: Option<u8>) -> Self {
        self.miss_pattern = miss_pattern;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Builds a bank and all its registers from a parsed descriptor.
    pub fn from_descriptor(desc: &BankDescriptor) -> anyhow::Result<Self> {
        let mut bank = Bank::new(&desc.bank)?
            .with_byte_order(desc.byte_order)
            .with_miss_pattern(desc.miss_pattern)
            .with_description(desc.description.clone().unwrap_or_default());
        for reg in &desc.registers {
            bank.add_register(&RegisterSpec::from(reg))
                .with_context(|| format!("Invalid register '{}'", reg.name))?;
        }
        tracing::info!(
            "Bank {} configured with {} registers",
            bank.name,
            bank.number_of_registers()
        );
        Ok(bank)
    }

    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn byte_order(&self) -> ByteOrder {
        self.byte_order
    }

    pub fn miss_pattern(&self) -> Option<u8> {
        self.miss_pattern
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Freezes the register and field topology.
    pub fn finalize(&mut self) {
        if !self.finalized {
            tracing::info!("Bank {} finalized", self.name);
        }
        self.finalized = true;
    }

    /// Declares a register (or a register array) together with its fields.
    ///
    /// Either every element of an array is added or none is. Each new
    /// register starts at its initial value.
    pub fn add_register(&mut self, spec: &RegisterSpec) -> BankResult<()> {
        let result = self.try_add_register(spec);
        if let Err(e) = &result {
            tracing::error!("Failed to add register to bank {}: {}", self.name, e);
        }
        result
    }

    fn try_add_register(&mut self, spec: &RegisterSpec) -> BankResult<()> {
        self.check_not_finalized()?;
        if spec.name.is_empty() {
            return Err(BankError::EmptyName);
        }
        if spec.name.contains(SEPARATOR) || !naming::validate(&spec.name) {
            return Err(BankError::InvalidName(spec.name.clone()));
        }
        if spec.size == 0 || spec.size > MAX_REGISTER_BYTES {
            return Err(BankError::InvalidWidth {
                name: format!("{}{}{}", self.name, SEPARATOR, spec.name),
                size: spec.size,
            });
        }

        // Arrays are addressed by their base name, which must stay unique.
        let base = naming::array_base(&spec.name);
        if self.names.keys().any(|n| naming::array_base(n) == base) {
            return Err(BankError::DuplicateName(format!(
                "{}{}{}",
                self.name, SEPARATOR, base
            )));
        }

        let mut staged: Vec<Register> = Vec::new();
        let elements = naming::expand_array(&spec.name, spec.size as u64, MAX_ARRAY_ELEMENTS)?;
        for (local, relative) in elements {
            let full = format!("{}{}{}", self.name, SEPARATOR, local);
            let offset = spec
                .offset
                .checked_add(relative)
                .filter(|o| o.checked_add(spec.size as u64).is_some())
                .ok_or_else(|| BankError::InvalidOffset {
                    name: full.clone(),
                    offset: spec.offset,
                })?;
            let end = offset + spec.size as u64;

            if self.names.contains_key(&local) || staged.iter().any(|r| r.name() == full) {
                return Err(BankError::DuplicateName(full));
            }
            let clash = self
                .overlapping_register(offset, end)
                .or_else(|| staged.iter().find(|r| offset < r.end() && r.offset() < end));
            if let Some(other) = clash {
                return Err(BankError::Overlap {
                    name: full,
                    offset,
                    end,
                    other: other.name().to_string(),
                });
            }

            let mut register = Register::new(
                HierarchicalName::new(full, Level::Register),
                &spec.description,
                offset,
                spec.size,
                spec.init_value,
                spec.behavior,
            )?;
            for field in &spec.fields {
                register.add_field(field)?;
            }
            staged.push(register);
        }

        for mut register in staged {
            register.reset(&mut self.memory);
            tracing::debug!(
                "Added register {} at [{:#x}, {:#x}) to bank {}",
                register.name(),
                register.offset(),
                register.end(),
                self.name
            );
            self.names
                .insert(register.local_name().to_string(), register.offset());
            self.registers.insert(register.offset(), register);
        }
        Ok(())
    }

    /// The register whose byte range intersects `[offset, end)`, if any.
    fn overlapping_register(&self, offset: u64, end: u64) -> Option<&Register> {
        let before = self
            .registers
            .range(..=offset)
            .next_back()
            .map(|(_, r)| r)
            .filter(|r| r.end() > offset);
        let after = self
            .registers
            .range(offset..)
            .next()
            .map(|(_, r)| r)
            .filter(|r| r.offset() < end);
        before.or(after)
    }

    /// Declares a field on an already added register.
    pub fn add_field(&mut self, register: &str, spec: &FieldSpec) -> BankResult<()> {
        if let Err(e) = self.check_not_finalized() {
            tracing::error!("Failed to add field {} to {}: {}", spec.name, register, e);
            return Err(e);
        }
        let offset = self
            .resolve(register)
            .ok_or_else(|| BankError::UnknownRegister(register.to_string()))?;
        match self.registers.get_mut(&offset) {
            Some(reg) => reg.add_field(spec),
            None => Err(BankError::UnknownRegister(register.to_string())),
        }
    }

    fn check_not_finalized(&self) -> BankResult<()> {
        if self.finalized {
            tracing::warn!(
                target: "spec_violation",
                "Bank {} is finalized, topology change rejected",
                self.name
            );
            return Err(BankError::Finalized(self.name.to_string()));
        }
        Ok(())
    }

    /// Restores every register to its initial value.
    pub fn reset(&mut self) {
        for register in self.registers.values_mut() {
            register.reset(&mut self.memory);
        }
        tracing::info!("Bank {} reset", self.name);
    }

    pub fn set_observer(&mut self, observer: Option<Arc<dyn StateObserver>>) {
        self.memory.set_observer(observer);
    }

    pub fn memory(&self) -> &BankMemory {
        &self.memory
    }

    pub fn number_of_registers(&self) -> usize {
        self.registers.len()
    }

    /// The `index`-th register in offset order.
    pub fn register_at_index(&self, index: usize) -> Option<&Register> {
        self.registers.values().nth(index)
    }

    /// Offset to register map.
    pub fn mapped_registers(&self) -> &BTreeMap<u64, Register> {
        &self.registers
    }

    /// Looks a register up by local (`ctrl`) or full (`bank.ctrl`) name.
    pub fn register(&self, name: &str) -> Option<&Register> {
        self.resolve(name).and_then(|o| self.registers.get(&o))
    }

    pub fn fields_info(&self, register: &str) -> BankResult<Vec<FieldInfo>> {
        self.register(register)
            .map(Register::fields_info)
            .ok_or_else(|| BankError::UnknownRegister(register.to_string()))
    }

    /// Side-effect-free register value.
    pub fn register_value(&self, name: &str) -> BankResult<u64> {
        self.register(name)
            .map(|r| r.get(&self.memory))
            .ok_or_else(|| BankError::UnknownRegister(name.to_string()))
    }

    /// Side-effect-free register store.
    pub fn set_register_value(&mut self, name: &str, value: u64) -> BankResult<()> {
        let offset = self
            .resolve(name)
            .ok_or_else(|| BankError::UnknownRegister(name.to_string()))?;
        if let Some(register) = self.registers.get(&offset) {
            register.set(&mut self.memory, value);
        }
        Ok(())
    }

    /// Side-effect-free field value.
    pub fn field_value(&self, register: &str, field: &str) -> BankResult<u64> {
        let reg = self
            .register(register)
            .ok_or_else(|| BankError::UnknownRegister(register.to_string()))?;
        reg.field(field)
            .map(|f| f.get(&self.memory))
            .ok_or_else(|| BankError::UnknownField(format!("{}{}{}", reg.name(), SEPARATOR, field)))
    }

    pub(crate) fn resolve(&self, name: &str) -> Option<u64> {
        let local = name
            .strip_prefix(self.name.as_str())
            .and_then(|rest| rest.strip_prefix(SEPARATOR))
            .unwrap_or(name);
        self.names.get(local).copied()
    }

    pub(crate) fn register_names(&self) -> impl Iterator<Item = &str> {
        self.names.keys().map(String::as_str)
    }

    pub fn instrumentation(&self) -> &InstrumentationRegistry {
        &self.instrumentation
    }

    pub fn instrumentation_mut(&mut self) -> &mut InstrumentationRegistry {
        &mut self.instrumentation
    }

    fn fill_byte(&self) -> u8 {
        self.miss_pattern.unwrap_or(0)
    }

    /// Reads `size` bytes at `offset`, in bank byte order.
    ///
    /// Inquiry reads have no side effects. Without a miss pattern, any byte
    /// not backed by a register fails a normal read.
    pub fn read(&mut self, offset: u64, size: usize, inquiry: bool) -> BankResult<Vec<u8>> {
        let mut data = vec![self.fill_byte(); size];
        self.read_into(offset, &mut data, inquiry)?;
        Ok(data)
    }

    /// Writes `data` at `offset`, in bank byte order.
    pub fn write(&mut self, offset: u64, data: &[u8], inquiry: bool) -> BankResult<()> {
        if data.is_empty() {
            return Err(BankError::ZeroSizeAccess(offset));
        }
        let end = self.access_end(offset, data.len())?;
        let order = self.byte_order;
        let mut mapped = 0usize;

        let first = self.first_candidate(offset);
        for register in self.registers.range_mut(first..).map(|(_, r)| r) {
            if register.offset() >= end {
                break;
            }
            let Some((lo, hi)) = byte_intersection(offset, end, register) else {
                continue;
            };
            let mut value = 0u64;
            let mut enabled = 0u64;
            for addr in lo..hi {
                let k = significance(order, register, addr);
                value |= (data[(addr - offset) as usize] as u64) << (8 * k);
                enabled |= 0xFFu64 << (8 * k);
            }
            if inquiry {
                let merged = (register.get(&self.memory) & !enabled) | (value & enabled);
                register.set(&mut self.memory, merged);
            } else {
                register.write(&mut self.memory, value, enabled)?;
            }
            mapped += (hi - lo) as usize;
        }

        self.check_mapped(offset, data.len(), mapped, inquiry)
    }

    /// Reads into `data`, which the caller pre-fills. On an unmapped access
    /// the mapped bytes are still filled in before the error is returned.
    fn read_into(&mut self, offset: u64, data: &mut [u8], inquiry: bool) -> BankResult<()> {
        if data.is_empty() {
            return Err(BankError::ZeroSizeAccess(offset));
        }
        let end = self.access_end(offset, data.len())?;
        let order = self.byte_order;
        let mut mapped = 0usize;

        let first = self.first_candidate(offset);
        for register in self.registers.range_mut(first..).map(|(_, r)| r) {
            if register.offset() >= end {
                break;
            }
            let Some((lo, hi)) = byte_intersection(offset, end, register) else {
                continue;
            };
            let enabled = (lo..hi).fold(0u64, |acc, addr| {
                acc | 0xFFu64 << (8 * significance(order, register, addr))
            });
            let value = if inquiry {
                register.get(&self.memory) & enabled
            } else {
                register.read(&mut self.memory, enabled)?
            };
            for addr in lo..hi {
                let k = significance(order, register, addr);
                data[(addr - offset) as usize] = (value >> (8 * k)) as u8;
            }
            mapped += (hi - lo) as usize;
        }

        self.check_mapped(offset, data.len(), mapped, inquiry)
    }

    fn access_end(&self, offset: u64, size: usize) -> BankResult<u64> {
        offset.checked_add(size as u64).ok_or_else(|| {
            tracing::warn!(
                target: "spec_violation",
                "Bank {}: access at {:#x} of {} bytes wraps the address space",
                self.name,
                offset,
                size
            );
            BankError::Unmapped { offset, size }
        })
    }

    fn check_mapped(&self, offset: u64, size: usize, mapped: usize, inquiry: bool) -> BankResult<()> {
        if mapped < size && self.miss_pattern.is_none() && !inquiry {
            tracing::warn!(
                target: "spec_violation",
                "Bank {}: unmapped access at {:#x} ({} of {} bytes mapped)",
                self.name,
                offset,
                mapped,
                size
            );
            return Err(BankError::Unmapped { offset, size });
        }
        Ok(())
    }

    /// Key of the last register starting at or before `offset`, else `offset`.
    fn first_candidate(&self, offset: u64) -> u64 {
        self.registers
            .range(..=offset)
            .next_back()
            .map(|(k, _)| *k)
            .unwrap_or(offset)
    }

    /// Serves one host transaction.
    ///
    /// Errors never escape: they are logged and turn into
    /// [`TransactionStatus::NotTaken`]. Instrumentation is skipped for
    /// inquiry accesses.
    pub fn transaction_access(&mut self, txn: &mut dyn Transaction) -> TransactionStatus {
        let offset = txn.offset();
        let size = txn.size();
        if size == 0 {
            tracing::warn!(
                target: "spec_violation",
                "Bank {}: zero-byte transaction at {:#x} not taken",
                self.name,
                offset
            );
            return TransactionStatus::NotTaken;
        }

        let inquiry = txn.is_inquiry();
        let mut access =
            BankAccess::new(offset, size, txn.is_write(), inquiry).with_initiator(txn.initiator());
        if size > 8 && !inquiry && !self.instrumentation.is_empty() {
            tracing::debug!(
                "Bank {}: {}-byte access at {:#x}, instrumentation sees the leading 8 bytes only",
                self.name,
                size,
                offset
            );
        }

        if access.is_write() {
            self.write_access(txn, &mut access);
        } else {
            self.read_access(txn, &mut access);
        }

        if access.success() {
            TransactionStatus::Completed
        } else {
            TransactionStatus::NotTaken
        }
    }

    fn write_access(&mut self, txn: &mut dyn Transaction, access: &mut BankAccess) {
        let payload = txn.payload();
        if payload.len() < access.size() {
            let e = BankError::ShortPayload {
                expected: access.size(),
                actual: payload.len(),
            };
            tracing::error!("Bank {}: {}", self.name, e);
            access.fail();
            return;
        }
        let mut bytes = payload[..access.size()].to_vec();

        if !access.is_inquiry() {
            let value = bytes_to_value(self.byte_order, &bytes);
            access.set_value(value);
            self.instrumentation
                .issue_callbacks(access, CallbackKind::BeforeWrite);
            if access.value() != value {
                value_to_bytes(self.byte_order, access.value(), &mut bytes);
            }
        }

        if access.is_suppressed() {
            tracing::trace!("Bank {}: write at {:#x} suppressed", self.name, access.offset());
        } else if let Err(e) = self.write(access.offset(), &bytes, access.is_inquiry()) {
            tracing::warn!("Bank {}: write failed: {}", self.name, e);
            access.fail();
        }

        if !access.is_inquiry() {
            self.instrumentation
                .issue_callbacks(access, CallbackKind::AfterWrite);
        }
    }

    fn read_access(&mut self, txn: &mut dyn Transaction, access: &mut BankAccess) {
        if !access.is_inquiry() {
            self.instrumentation
                .issue_callbacks(access, CallbackKind::BeforeRead);
        }

        let mut bytes = vec![self.fill_byte(); access.size()];
        if access.is_suppressed() {
            tracing::trace!("Bank {}: read at {:#x} suppressed", self.name, access.offset());
        } else if let Err(e) = self.read_into(access.offset(), &mut bytes, access.is_inquiry()) {
            tracing::warn!("Bank {}: read failed: {}", self.name, e);
            access.fail();
        }

        if !access.is_inquiry() {
            let value = bytes_to_value(self.byte_order, &bytes);
            access.set_value(value);
            self.instrumentation
                .issue_callbacks(access, CallbackKind::AfterRead);
            if access.value() != value {
                value_to_bytes(self.byte_order, access.value(), &mut bytes);
            }
        }
        txn.fill(&bytes);
    }
}

/// Byte range shared by `[offset, end)` and `register`.
fn byte_intersection(offset: u64, end: u64, register: &Register) -> Option<(u64, u64)> {
    let lo = offset.max(register.offset());
    let hi = end.min(register.end());
    (lo < hi).then_some((lo, hi))
}

/// Byte significance within `register` of the byte at bank address `addr`.
fn significance(order: ByteOrder, register: &Register, addr: u64) -> u32 {
    let local = (addr - register.offset()) as u32;
    match order {
        ByteOrder::Little => local,
        ByteOrder::Big => register.size() as u32 - 1 - local,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bank() -> Bank {
        let mut bank = Bank::new("uart").unwrap();
        bank.add_register(&RegisterSpec::new("data", 0x0, 4)).unwrap();
        bank.add_register(&RegisterSpec::new("status", 0x4, 2).init_value(0x0081))
            .unwrap();
        bank.add_register(&RegisterSpec::new("ctrl", 0x8, 1)).unwrap();
        bank
    }

    #[test]
    fn test_bank_name_must_be_single_segment() {
        assert_eq!(
            Bank::new("a.b").unwrap_err(),
            BankError::InvalidName("a.b".to_string())
        );
        assert_eq!(Bank::new("").unwrap_err(), BankError::EmptyName);
        assert!(Bank::new("b[2]").is_err());
    }

    #[test]
    fn test_add_register_rejections() {
        let mut bank = bank();
        assert_eq!(
            bank.add_register(&RegisterSpec::new("", 0x20, 4)),
            Err(BankError::EmptyName)
        );
        assert!(matches!(
            bank.add_register(&RegisterSpec::new("wide", 0x20, 9)),
            Err(BankError::InvalidWidth { size: 9, .. })
        ));
        assert!(matches!(
            bank.add_register(&RegisterSpec::new("zero", 0x20, 0)),
            Err(BankError::InvalidWidth { size: 0, .. })
        ));
        assert_eq!(
            bank.add_register(&RegisterSpec::new("ctrl", 0x20, 1)),
            Err(BankError::DuplicateName("uart.ctrl".to_string()))
        );
        assert_eq!(
            bank.add_register(&RegisterSpec::new("a.b", 0x20, 1)),
            Err(BankError::InvalidName("a.b".to_string()))
        );
        assert!(matches!(
            bank.add_register(&RegisterSpec::new("far", u64::MAX - 1, 4)),
            Err(BankError::InvalidOffset { .. })
        ));
        assert_eq!(bank.number_of_registers(), 3);
    }

    #[test]
    fn test_overlap_predecessor_and_successor() {
        let mut bank = bank();
        // Starts inside `data`
        assert!(matches!(
            bank.add_register(&RegisterSpec::new("x", 0x2, 1)),
            Err(BankError::Overlap { ref other, .. }) if other == "uart.data"
        ));
        // Runs into `ctrl`
        assert!(matches!(
            bank.add_register(&RegisterSpec::new("x", 0x6, 4)),
            Err(BankError::Overlap { ref other, .. }) if other == "uart.ctrl"
        ));
        bank.add_register(&RegisterSpec::new("gap", 0x6, 2)).unwrap();
        assert_eq!(bank.number_of_registers(), 4);
    }

    #[test]
    fn test_register_array() {
        let mut bank = Bank::new("dma").unwrap();
        bank.add_register(
            &RegisterSpec::new("chan[2][3 stride 8]", 0x100, 4)
                .field(FieldSpec::new("en", 0, 1)),
        )
        .unwrap();
        assert_eq!(bank.number_of_registers(), 6);
        let offsets: Vec<u64> = bank.mapped_registers().keys().copied().collect();
        assert_eq!(offsets, vec![0x100, 0x108, 0x110, 0x118, 0x120, 0x128]);
        assert_eq!(bank.register_at_index(4).unwrap().name(), "dma.chan[1][1]");
        assert_eq!(bank.fields_info("chan[1][2]").unwrap()[0].name, "en");

        // Overlapping array elements are rejected as a whole
        assert!(bank
            .add_register(&RegisterSpec::new("bad[2 stride 2]", 0x0, 4))
            .is_err());
        assert_eq!(bank.number_of_registers(), 6);
    }

    #[test]
    fn test_array_base_name_is_unique() {
        let mut bank = Bank::new("b").unwrap();
        bank.add_register(&RegisterSpec::new("r", 0x0, 4)).unwrap();
        assert_eq!(
            bank.add_register(&RegisterSpec::new("r[2]", 0x10, 4)),
            Err(BankError::DuplicateName("b.r".to_string()))
        );

        bank.add_register(&RegisterSpec::new("s[2]", 0x20, 4)).unwrap();
        assert_eq!(
            bank.add_register(&RegisterSpec::new("s", 0x40, 4)),
            Err(BankError::DuplicateName("b.s".to_string()))
        );
        assert_eq!(
            bank.add_register(&RegisterSpec::new("s[2][2]", 0x40, 4)),
            Err(BankError::DuplicateName("b.s".to_string()))
        );
        assert_eq!(bank.number_of_registers(), 3);

        // Every register stays reachable through the checkpoint.
        bank.set_register_value("s[1]", 0x55).unwrap();
        let snapshot = bank.snapshot();
        bank.reset();
        bank.restore(&snapshot).unwrap();
        assert_eq!(bank.attribute_names(), vec!["r", "s"]);
        assert_eq!(bank.register_value("s[1]").unwrap(), 0x55);
    }

    #[test]
    fn test_oversized_array_rejected() {
        let mut bank = Bank::new("b").unwrap();
        assert!(matches!(
            bank.add_register(&RegisterSpec::new("r[4000000000]", 0, 1)),
            Err(BankError::ArrayTooLarge { limit: MAX_ARRAY_ELEMENTS, .. })
        ));
        assert!(matches!(
            bank.add_register(&RegisterSpec::new("r[65536][65536]", 0, 1)),
            Err(BankError::ArrayTooLarge { .. })
        ));
        assert_eq!(bank.number_of_registers(), 0);
    }

    #[test]
    fn test_bad_field_rejects_register() {
        let mut bank = Bank::new("b").unwrap();
        let spec = RegisterSpec::new("r", 0, 1).field(FieldSpec::new("f", 4, 8));
        assert!(matches!(
            bank.add_register(&spec),
            Err(BankError::FieldOutOfRange { .. })
        ));
        assert!(bank.register("r").is_none());
    }

    #[test]
    fn test_init_value_applied() {
        let bank = bank();
        assert_eq!(bank.register_value("status").unwrap(), 0x0081);
        assert_eq!(bank.register_value("uart.status").unwrap(), 0x0081);
        assert_eq!(
            bank.register_value("nope"),
            Err(BankError::UnknownRegister("nope".to_string()))
        );
    }

    #[test]
    fn test_read_write_little_endian() {
        let mut bank = bank();
        bank.write(0x0, &[0x11, 0x22, 0x33, 0x44], false).unwrap();
        assert_eq!(bank.register_value("data").unwrap(), 0x4433_2211);
        assert_eq!(bank.read(0x1, 2, false).unwrap(), vec![0x22, 0x33]);
    }

    #[test]
    fn test_read_write_big_endian() {
        let mut bank = Bank::new("be").unwrap().with_byte_order(ByteOrder::Big);
        bank.add_register(&RegisterSpec::new("r", 0, 4)).unwrap();
        bank.write(0, &[0x11, 0x22, 0x33, 0x44], false).unwrap();
        assert_eq!(bank.register_value("r").unwrap(), 0x1122_3344);
        // Bytes 2..4 are the low half in big-endian
        bank.write(2, &[0xAA, 0xBB], false).unwrap();
        assert_eq!(bank.register_value("r").unwrap(), 0x1122_AABB);
        assert_eq!(bank.read(0, 2, false).unwrap(), vec![0x11, 0x22]);
    }

    #[test]
    fn test_unmapped_access() {
        let mut bank = bank();
        assert_eq!(
            bank.read(0x6, 2, false),
            Err(BankError::Unmapped { offset: 0x6, size: 2 })
        );
        // Partially mapped write still reaches the mapped register
        assert!(bank.write(0x8, &[0x5A, 0x00], false).is_err());
        assert_eq!(bank.register_value("ctrl").unwrap(), 0x5A);
        // Inquiry accesses tolerate holes
        assert_eq!(bank.read(0x4, 4, true).unwrap(), vec![0x81, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn test_finalized_topology() {
        let mut bank = bank();
        bank.finalize();
        assert_eq!(
            bank.add_register(&RegisterSpec::new("late", 0x40, 4)),
            Err(BankError::Finalized("uart".to_string()))
        );
        assert_eq!(
            bank.add_field("ctrl", &FieldSpec::new("en", 0, 1)),
            Err(BankError::Finalized("uart".to_string()))
        );
        // Values are still writable
        bank.write(0x8, &[1], false).unwrap();
    }

    #[test]
    fn test_add_field_after_register() {
        let mut bank = bank();
        bank.add_field("ctrl", &FieldSpec::new("en", 0, 1)).unwrap();
        bank.write(0x8, &[0xFF], false).unwrap();
        assert_eq!(bank.field_value("ctrl", "en").unwrap(), 1);
        assert!(matches!(
            bank.field_value("ctrl", "nope"),
            Err(BankError::UnknownField(_))
        ));
        assert!(matches!(
            bank.add_field("nope", &FieldSpec::new("en", 0, 1)),
            Err(BankError::UnknownRegister(_))
        ));
    }

    #[test]
    fn test_reset() {
        let mut bank = bank();
        bank.write(0x4, &[0, 0], false).unwrap();
        assert_eq!(bank.register_value("status").unwrap(), 0);
        bank.reset();
        assert_eq!(bank.register_value("status").unwrap(), 0x81);
    }

    #[test]
    fn test_inquiry_bypasses_behavior() {
        let mut bank = Bank::new("b").unwrap();
        bank.add_register(&RegisterSpec::new("id", 0, 1).init_value(0x42).behavior(Behavior::ReadOnly))
            .unwrap();
        bank.write(0, &[0x00], false).unwrap();
        assert_eq!(bank.register_value("id").unwrap(), 0x42);
        bank.write(0, &[0x00], true).unwrap();
        assert_eq!(bank.register_value("id").unwrap(), 0x00);
    }
}
