// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::behavior::{self, Behavior};
use crate::bits;
use crate::field::{BitSlice, Field};
use crate::memory::BankMemory;
use crate::naming::{self, HierarchicalName, Level, SEPARATOR};
use crate::{BankError, BankResult};
use regbank_config::FieldDescriptor;
use serde::Serialize;
use std::collections::BTreeMap;

pub const MAX_REGISTER_BYTES: u8 = 8;

/// Declaration of a field, as handed to [`Register::add_field`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    /// Local name, may carry array dimensions.
    pub name: String,
    pub description: String,
    /// Lsb position within the register.
    pub offset: u8,
    pub width: u8,
    pub behavior: Behavior,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>, offset: u8, width: u8) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            offset,
            width,
            behavior: Behavior::default(),
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn behavior(mut self, behavior: Behavior) -> Self {
        self.behavior = behavior;
        self
    }
}

impl From<&FieldDescriptor> for FieldSpec {
    fn from(desc: &FieldDescriptor) -> Self {
        Self {
            name: desc.name.clone(),
            description: desc.description.clone().unwrap_or_default(),
            offset: desc.bit_offset,
            width: desc.bit_width,
            behavior: desc.behavior,
        }
    }
}

/// Introspection record for one field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldInfo {
    pub name: String,
    pub description: String,
    pub offset: u8,
    pub width: u32,
}

/// A 1 to 8 byte register backed by bank memory.
///
/// Storage is little-endian within the register: byte `i` (at bank offset
/// `offset + i`) holds bits `[8i, 8i+8)`. Fields are indexed by lsb.
#[derive(Debug, Clone)]
pub struct Register {
    name: HierarchicalName,
    description: String,
    offset: u64,
    size: u8,
    init_value: u64,
    behavior: Behavior,
    latched: bool,
    fields: BTreeMap<u8, Field>,
}

impl Register {
    /// # Panics
    ///
    /// Panics if `name` is not a `bank.register` name.
    pub fn new(
        name: HierarchicalName,
        description: &str,
        offset: u64,
        size: u8,
        init_value: u64,
        behavior: Behavior,
    ) -> BankResult<Self> {
        assert_eq!(
            name.level(),
            Level::Register,
            "'{}' cannot name a register",
            name
        );
        if size == 0 || size > MAX_REGISTER_BYTES {
            tracing::error!("Register {} has invalid width of {} bytes", name, size);
            return Err(BankError::InvalidWidth {
                name: name.to_string(),
                size,
            });
        }
        Ok(Self {
            name,
            description: description.to_string(),
            offset,
            size,
            init_value,
            behavior,
            latched: false,
            fields: BTreeMap::new(),
        })
    }

    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    pub fn hierarchical_name(&self) -> &HierarchicalName {
        &self.name
    }

    /// Name without the bank prefix.
    pub fn local_name(&self) -> &str {
        self.name.leaf()
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Bank offset of the first byte.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Width in bytes.
    pub fn size(&self) -> u8 {
        self.size
    }

    pub fn end(&self) -> u64 {
        self.offset + self.size as u64
    }

    pub fn init_value(&self) -> u64 {
        self.init_value
    }

    pub fn behavior(&self) -> Behavior {
        self.behavior
    }

    pub fn bit_width(&self) -> u32 {
        self.size as u32 * 8
    }

    /// Bits that exist in this register.
    pub fn byte_mask(&self) -> u64 {
        bits::byte_mask(self.size as u32)
    }

    pub fn number_of_fields(&self) -> usize {
        self.fields.len()
    }

    /// Fields in ascending lsb order.
    pub fn fields(&self) -> impl Iterator<Item = &Field> {
        self.fields.values()
    }

    /// Looks a field up by its local name.
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.values().find(|f| f.hierarchical_name().leaf() == name)
    }

    pub fn fields_info(&self) -> Vec<FieldInfo> {
        self.fields
            .values()
            .map(|f| FieldInfo {
                name: f.hierarchical_name().leaf().to_string(),
                description: f.description().to_string(),
                offset: f.bit_offset(),
                width: f.bit_width(),
            })
            .collect()
    }

    /// Declares a field (or a field array) covering `width` bits from `offset`.
    ///
    /// Either every element of an array is added or none is.
    pub fn add_field(&mut self, spec: &FieldSpec) -> BankResult<()> {
        let result = self.try_add_field(spec);
        if let Err(e) = &result {
            tracing::error!("Failed to add field to {}: {}", self.name, e);
        }
        result
    }

    fn try_add_field(&mut self, spec: &FieldSpec) -> BankResult<()> {
        if spec.name.is_empty() {
            return Err(BankError::EmptyName);
        }
        if spec.name.contains(SEPARATOR) || !naming::validate(&spec.name) {
            return Err(BankError::InvalidName(spec.name.clone()));
        }

        let mut staged: Vec<(u32, Field)> = Vec::new();
        // Each element covers at least one bit of the register.
        let elements =
            naming::expand_array(&spec.name, spec.width as u64, self.bit_width() as u64)?;
        for (local, relative) in elements {
            let full = format!("{}{}{}", self.name, SEPARATOR, local);
            if spec.width == 0 {
                return Err(BankError::InvalidFieldWidth(full));
            }
            let lsb = relative.saturating_add(spec.offset as u64);
            let end = lsb.saturating_add(spec.width as u64);
            if end > self.bit_width() as u64 {
                return Err(BankError::FieldOutOfRange {
                    name: full,
                    lsb: lsb.min(u32::MAX as u64) as u32,
                    end: end.min(u32::MAX as u64) as u32,
                    width: self.bit_width(),
                });
            }
            let (lsb, end) = (lsb as u32, end as u32);

            if self.field(&local).is_some() || staged.iter().any(|(_, f)| f.name() == full) {
                return Err(BankError::DuplicateName(full));
            }
            if let Some(other) = self.overlapping_field(lsb, end) {
                return Err(BankError::FieldOverlap {
                    name: full,
                    other: other.name().to_string(),
                });
            }
            if let Some((_, other)) = staged
                .iter()
                .find(|(s, f)| lsb < s + f.bit_width() && *s < end)
            {
                return Err(BankError::FieldOverlap {
                    name: full,
                    other: other.name().to_string(),
                });
            }

            let mut field = Field::new(HierarchicalName::new(full, Level::Field), spec.behavior);
            field.init(&spec.description, self.slices_for(lsb, end), lsb as u8)?;
            staged.push((lsb, field));
        }

        for (lsb, field) in staged {
            tracing::debug!(
                "Added field {} [{}, {}) to {}",
                field.name(),
                lsb,
                lsb + field.bit_width(),
                self.name
            );
            self.fields.insert(lsb as u8, field);
        }
        Ok(())
    }

    /// The field whose bit range intersects `[lsb, end)`, if any.
    fn overlapping_field(&self, lsb: u32, end: u32) -> Option<&Field> {
        // Fields never overlap, so only the last one starting before `end` can reach `lsb`.
        self.fields
            .range(..end as u8)
            .next_back()
            .map(|(_, f)| f)
            .filter(|f| (f.bit_offset() as u32 + f.bit_width()) > lsb)
    }

    /// One (byte, mask) pair per byte spanned by `[lsb, end)`.
    fn slices_for(&self, lsb: u32, end: u32) -> Vec<BitSlice> {
        let first = lsb / 8;
        let last = (end - 1) / 8;
        (first..=last)
            .map(|byte| {
                let mut mask = 0xFFu8;
                if byte == first {
                    mask &= 0xFF << (lsb % 8);
                }
                if byte == last {
                    mask &= 0xFF >> (7 - (end - 1) % 8);
                }
                BitSlice {
                    offset: self.offset + byte as u64,
                    mask,
                }
            })
            .collect()
    }

    /// Bits covered by declared fields.
    fn covered_mask(&self) -> u64 {
        self.fields.values().fold(0, |acc, f| {
            acc | (bits::mask(f.bit_width()) << f.bit_offset())
        })
    }

    /// Current value, read straight from storage.
    pub fn get(&self, memory: &BankMemory) -> u64 {
        memory.read_le(self.offset, self.size)
    }

    /// Stores `value` without side effects.
    ///
    /// With fields declared, bits outside any field are written to storage
    /// directly and each field stores its own slice.
    pub fn set(&self, memory: &mut BankMemory, value: u64) {
        let value = value & self.byte_mask();
        if self.fields.is_empty() {
            if memory.write_le(self.offset, self.size, value) {
                memory.notify_changed(self.name.as_str());
            }
            return;
        }

        let covered = self.covered_mask();
        let raw = (self.get(memory) & covered) | (value & !covered);
        if memory.write_le(self.offset, self.size, raw) {
            memory.notify_changed(self.name.as_str());
        }
        for field in self.fields.values() {
            field.set(memory, value >> field.bit_offset());
        }
    }

    /// Software read of `enabled_bits`, which must be one contiguous run.
    pub fn read(&mut self, memory: &mut BankMemory, enabled_bits: u64) -> BankResult<u64> {
        let enabled = enabled_bits & self.byte_mask();
        if enabled == 0 {
            return Ok(0);
        }
        let (start, count) = self.check_contiguous(enabled)?;

        if self.behavior != Behavior::ReadWrite {
            let outcome = behavior::on_read(self.behavior, self.get(memory), enabled);
            if let Some(violation) = outcome.violation {
                tracing::warn!(target: "spec_violation", "{}: {}", self.name, violation);
            }
            if let Some(value) = outcome.store {
                self.set(memory, value);
            }
            return Ok(outcome.value);
        }

        if self.fields.is_empty() {
            return Ok(enabled & self.get(memory));
        }

        let end = start + count;
        // Bits between fields reflect raw storage.
        let mut value = self.get(memory) & enabled & !self.covered_mask();
        let first = self.first_candidate(start);
        let reg_name = &self.name;
        for field in self.fields.range_mut(first..).map(|(_, f)| f) {
            let f_start = field.bit_offset() as u32;
            if f_start >= end {
                break;
            }
            let Some((lo, hi)) = intersect(start, end, f_start, f_start + field.bit_width())
            else {
                continue;
            };
            trace_field_access(reg_name, field, "read", lo, hi);
            let field_enabled = bits::mask(hi - lo) << (lo - f_start);
            value |= field.read(memory, field_enabled) << f_start;
        }
        Ok(value)
    }

    /// Software write of `enabled_bits`, which must be one contiguous run.
    pub fn write(
        &mut self,
        memory: &mut BankMemory,
        value: u64,
        enabled_bits: u64,
    ) -> BankResult<()> {
        let enabled = enabled_bits & self.byte_mask();
        if enabled == 0 {
            return Ok(());
        }
        let (start, count) = self.check_contiguous(enabled)?;

        if self.behavior != Behavior::ReadWrite || self.fields.is_empty() {
            let outcome = behavior::on_write(
                self.behavior,
                self.get(memory),
                value,
                enabled,
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
            if let Some(stored) = outcome.store {
                self.set(memory, stored);
            }
            return Ok(());
        }

        let gaps = enabled & !self.covered_mask();
        if gaps != 0 {
            let raw = (self.get(memory) & !gaps) | (value & gaps);
            if memory.write_le(self.offset, self.size, raw) {
                memory.notify_changed(self.name.as_str());
            }
        }

        let end = start + count;
        let first = self.first_candidate(start);
        let reg_name = &self.name;
        for field in self.fields.range_mut(first..).map(|(_, f)| f) {
            let f_start = field.bit_offset() as u32;
            if f_start >= end {
                break;
            }
            let Some((lo, hi)) = intersect(start, end, f_start, f_start + field.bit_width())
            else {
                continue;
            };
            trace_field_access(reg_name, field, "write", lo, hi);
            let field_enabled = bits::mask(hi - lo) << (lo - f_start);
            field.write(memory, value >> f_start, field_enabled);
        }
        Ok(())
    }

    /// Restores the initial value and clears write-once latches.
    pub fn reset(&mut self, memory: &mut BankMemory) {
        self.latched = false;
        for field in self.fields.values_mut() {
            field.clear_latch();
        }
        self.set(memory, self.init_value);
    }

    fn check_contiguous(&self, enabled: u64) -> BankResult<(u32, u32)> {
        bits::contiguous_run(enabled).ok_or_else(|| {
            tracing::warn!(
                target: "spec_violation",
                "{}: enabled bits {:#x} are not contiguous, access ignored",
                self.name,
                enabled
            );
            BankError::NonContiguousMask(enabled)
        })
    }

    /// Key of the last field starting at or before `start`, else `start`.
    fn first_candidate(&self, start: u32) -> u8 {
        let start = start as u8;
        self.fields
            .range(..=start)
            .next_back()
            .map(|(k, _)| *k)
            .unwrap_or(start)
    }
}

fn intersect(start: u32, end: u32, f_start: u32, f_end: u32) -> Option<(u32, u32)> {
    let lo = start.max(f_start);
    let hi = end.min(f_end);
    (lo < hi).then_some((lo, hi))
}

fn trace_field_access(reg: &HierarchicalName, field: &Field, kind: &str, lo: u32, hi: u32) {
    let f_start = field.bit_offset() as u32;
    let f_end = f_start + field.bit_width();
    if lo == f_start && hi == f_end {
        tracing::trace!("{}: {} of field {}", reg, kind, field.name());
    } else if lo % 8 == 0 && hi % 8 == 0 {
        tracing::trace!(
            "{}: partial {} of field {}, bytes {}..{}",
            reg,
            kind,
            field.name(),
            lo / 8,
            hi / 8
        );
    } else {
        tracing::trace!(
            "{}: partial {} of field {}, bits {}..{}",
            reg,
            kind,
            field.name(),
            lo,
            hi
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn register(size: u8) -> Register {
        Register::new(
            HierarchicalName::new("b.r", Level::Register),
            "test register",
            0x20,
            size,
            0,
            Behavior::ReadWrite,
        )
        .unwrap()
    }

    #[test]
    fn test_invalid_width() {
        for size in [0, 9] {
            let err = Register::new(
                HierarchicalName::new("b.r", Level::Register),
                "",
                0,
                size,
                0,
                Behavior::ReadWrite,
            )
            .unwrap_err();
            assert_eq!(
                err,
                BankError::InvalidWidth {
                    name: "b.r".to_string(),
                    size
                }
            );
        }
    }

    #[test]
    fn test_round_trip_without_fields() {
        let mut mem = BankMemory::new();
        for size in 1..=8u8 {
            let mut reg = register(size);
            let v = 0xFEDC_BA98_7654_3210u64;
            reg.write(&mut mem, v, u64::MAX).unwrap();
            assert_eq!(reg.read(&mut mem, u64::MAX).unwrap(), v & reg.byte_mask());
            assert_eq!(mem.read_u8(0x20), 0x10);
        }
    }

    #[test]
    fn test_field_slices() {
        let mut reg = register(4);
        reg.add_field(&FieldSpec::new("f", 6, 12)).unwrap();
        let f = reg.field("f").unwrap();
        assert_eq!(
            f.bits(),
            &[
                BitSlice {
                    offset: 0x20,
                    mask: 0xC0
                },
                BitSlice {
                    offset: 0x21,
                    mask: 0xFF
                },
                BitSlice {
                    offset: 0x22,
                    mask: 0x03
                },
            ]
        );
        assert_eq!(f.name(), "b.r.f");
    }

    #[test]
    fn test_add_field_rejections() {
        let mut reg = register(2);
        reg.add_field(&FieldSpec::new("a", 4, 4)).unwrap();

        assert_eq!(
            reg.add_field(&FieldSpec::new("z", 0, 0)),
            Err(BankError::InvalidFieldWidth("b.r.z".to_string()))
        );
        assert!(matches!(
            reg.add_field(&FieldSpec::new("big", 10, 7)),
            Err(BankError::FieldOutOfRange { end: 17, width: 16, .. })
        ));
        assert_eq!(
            reg.add_field(&FieldSpec::new("b", 7, 2)),
            Err(BankError::FieldOverlap {
                name: "b.r.b".to_string(),
                other: "b.r.a".to_string()
            })
        );
        assert_eq!(
            reg.add_field(&FieldSpec::new("c", 0, 5)),
            Err(BankError::FieldOverlap {
                name: "b.r.c".to_string(),
                other: "b.r.a".to_string()
            })
        );
        assert_eq!(
            reg.add_field(&FieldSpec::new("a", 12, 2)),
            Err(BankError::DuplicateName("b.r.a".to_string()))
        );
        assert_eq!(
            reg.add_field(&FieldSpec::new("x.y", 0, 1)),
            Err(BankError::InvalidName("x.y".to_string()))
        );
        assert_eq!(reg.number_of_fields(), 1);

        // Adjacent ranges do not overlap
        reg.add_field(&FieldSpec::new("lo", 0, 4)).unwrap();
        reg.add_field(&FieldSpec::new("hi", 8, 8)).unwrap();
        assert_eq!(reg.number_of_fields(), 3);
    }

    #[test]
    fn test_field_array() {
        let mut reg = register(2);
        reg.add_field(&FieldSpec::new("ch[4]", 0, 3)).unwrap();
        let info = reg.fields_info();
        assert_eq!(info.len(), 4);
        assert_eq!(info[2].name, "ch[2]");
        assert_eq!(info[2].offset, 6);
        assert_eq!(info[2].width, 3);

        // An array that does not fit is rejected as a whole
        let mut reg = register(1);
        assert!(reg.add_field(&FieldSpec::new("ch[3]", 0, 3)).is_err());
        assert_eq!(reg.number_of_fields(), 0);

        // Elements overlapping each other are rejected
        let mut reg = register(2);
        assert!(matches!(
            reg.add_field(&FieldSpec::new("o[2 stride 2]", 0, 4)),
            Err(BankError::FieldOverlap { .. })
        ));
    }

    #[test]
    fn test_field_array_limited_by_register_bits() {
        let mut reg = register(1);
        reg.add_field(&FieldSpec::new("bit[8]", 0, 1)).unwrap();
        assert_eq!(reg.number_of_fields(), 8);

        let mut reg = register(1);
        assert_eq!(
            reg.add_field(&FieldSpec::new("bit[4000000000]", 0, 1)),
            Err(BankError::ArrayTooLarge {
                name: "bit[4000000000]".to_string(),
                limit: 8
            })
        );
        assert_eq!(reg.number_of_fields(), 0);
    }

    #[test]
    fn test_field_composition() {
        let mut mem = BankMemory::new();
        let mut reg = register(1);
        reg.add_field(&FieldSpec::new("f0", 0, 4)).unwrap();
        reg.add_field(&FieldSpec::new("f1", 4, 4)).unwrap();

        reg.write(&mut mem, 0xFF, 0xFF).unwrap();
        assert_eq!(reg.field("f0").unwrap().get(&mem), 0xF);
        assert_eq!(reg.field("f1").unwrap().get(&mem), 0xF);

        reg.field("f0").unwrap().set(&mut mem, 0x3);
        assert_eq!(reg.field("f1").unwrap().get(&mem), 0xF);
        assert_eq!(reg.get(&mem), 0xF3);
    }

    #[test]
    fn test_partial_access_across_fields() {
        let mut mem = BankMemory::new();
        let mut reg = register(4);
        reg.add_field(&FieldSpec::new("a", 0, 12)).unwrap();
        reg.add_field(&FieldSpec::new("b", 12, 12)).unwrap();
        reg.add_field(&FieldSpec::new("c", 24, 8)).unwrap();
        reg.set(&mut mem, 0xCCBB_BAAA);

        // Byte 1 straddles a and b
        assert_eq!(reg.read(&mut mem, 0x0000_FF00).unwrap(), 0x0000_BA00);
        reg.write(&mut mem, 0x0000_1200, 0x0000_FF00).unwrap();
        assert_eq!(reg.get(&mem), 0xCCBB_12AA);
        assert_eq!(reg.field("a").unwrap().get(&mem), 0x2AA);
        assert_eq!(reg.field("b").unwrap().get(&mem), 0xBB1);
    }

    #[test]
    fn test_gaps_reflect_raw_storage() {
        let mut mem = BankMemory::new();
        let mut reg = register(2);
        reg.add_field(&FieldSpec::new("lo", 0, 4)).unwrap();
        reg.set(&mut mem, 0xABCD);
        assert_eq!(reg.get(&mem), 0xABCD);
        assert_eq!(reg.read(&mut mem, 0xFFFF).unwrap(), 0xABCD);
        reg.write(&mut mem, 0x1234, 0xFFFF).unwrap();
        assert_eq!(reg.get(&mem), 0x1234);
        assert_eq!(reg.field("lo").unwrap().get(&mem), 0x4);
    }

    #[test]
    fn test_non_contiguous_mask() {
        let mut mem = BankMemory::new();
        let mut reg = register(4);
        reg.set(&mut mem, 0xFFFF_FFFF);
        assert_eq!(
            reg.read(&mut mem, 0x00FF_00FF),
            Err(BankError::NonContiguousMask(0x00FF_00FF))
        );
        assert_eq!(
            reg.write(&mut mem, 0, 0x00FF_00FF),
            Err(BankError::NonContiguousMask(0x00FF_00FF))
        );
        assert_eq!(reg.get(&mem), 0xFFFF_FFFF);
    }

    #[test]
    fn test_field_behaviors_in_register() {
        let mut mem = BankMemory::new();
        let mut reg = register(1);
        reg.add_field(&FieldSpec::new("status", 0, 4).behavior(Behavior::Write1Clears))
            .unwrap();
        reg.add_field(&FieldSpec::new("id", 4, 4).behavior(Behavior::ReadOnly))
            .unwrap();
        reg.set(&mut mem, 0x5F);

        reg.write(&mut mem, 0xA3, 0xFF).unwrap();
        assert_eq!(reg.get(&mem), 0x5C);
    }

    #[test]
    fn test_register_behavior() {
        let mut mem = BankMemory::new();
        let mut reg = Register::new(
            HierarchicalName::new("b.status", Level::Register),
            "",
            0,
            2,
            0x00F0,
            Behavior::ClearOnRead,
        )
        .unwrap();
        reg.reset(&mut mem);
        assert_eq!(reg.read(&mut mem, 0xFFFF).unwrap(), 0x00F0);
        assert_eq!(reg.read(&mut mem, 0xFFFF).unwrap(), 0);
        reg.reset(&mut mem);
        assert_eq!(reg.get(&mem), 0x00F0);
    }

    #[test]
    fn test_set_notifies_field_and_register() {
        use crate::StateObserver;
        use std::sync::{Arc, Mutex};

        #[derive(Debug, Default)]
        struct Names(Mutex<Vec<String>>);
        impl StateObserver for Names {
            fn on_value_changed(&self, name: &str) {
                self.0.lock().unwrap().push(name.to_string());
            }
        }

        let names = Arc::new(Names::default());
        let mut mem = BankMemory::new();
        mem.set_observer(Some(names.clone()));
        let mut reg = register(2);
        reg.add_field(&FieldSpec::new("f", 0, 8)).unwrap();

        reg.set(&mut mem, 0x0001);
        assert_eq!(*names.0.lock().unwrap(), vec!["b.r.f".to_string()]);
        reg.set(&mut mem, 0x0101);
        assert_eq!(names.0.lock().unwrap().last().unwrap(), "b.r");
        let before = names.0.lock().unwrap().len();
        reg.set(&mut mem, 0x0101);
        assert_eq!(names.0.lock().unwrap().len(), before);
    }
}
