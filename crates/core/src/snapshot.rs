// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Register attributes and bank checkpoints.
//!
//! A plain register is exposed as a number. An array register is exposed
//! under its base name as nested JSON arrays, one level per dimension; each
//! level ends at the first missing index. All access here is side-effect
//! free.

use crate::bank::Bank;
use crate::naming;
use crate::{BankError, BankResult};
use serde_json::{Map, Value};
use std::collections::BTreeSet;

impl Bank {
    /// Attribute names in register offset order, array registers once under their base name.
    pub fn attribute_names(&self) -> Vec<String> {
        let mut seen = BTreeSet::new();
        self.mapped_registers()
            .values()
            .map(|r| naming::array_base(r.local_name()).to_string())
            .filter(|base| seen.insert(base.clone()))
            .collect()
    }

    pub fn register_attribute(&self, name: &str) -> BankResult<Value> {
        if !self.attribute_exists(name) {
            return Err(BankError::UnknownRegister(name.to_string()));
        }
        Ok(self.attribute_value(name))
    }

    /// Stores `value` into the register (or every element of the register array) `name`.
    ///
    /// Nothing is written unless the whole value matches the array shape.
    pub fn set_register_attribute(&mut self, name: &str, value: &Value) -> BankResult<()> {
        if !self.attribute_exists(name) {
            return Err(BankError::UnknownRegister(name.to_string()));
        }
        let mut assignments = Vec::new();
        self.collect_assignments(name, value, &mut assignments)?;
        self.apply(assignments)
    }

    /// Every register attribute keyed by attribute name.
    pub fn snapshot(&self) -> Value {
        let map: Map<String, Value> = self
            .attribute_names()
            .into_iter()
            .map(|name| {
                let value = self.attribute_value(&name);
                (name, value)
            })
            .collect();
        Value::Object(map)
    }

    /// Restores a [`snapshot`](Self::snapshot). Registers not named keep their value.
    pub fn restore(&mut self, snapshot: &Value) -> BankResult<()> {
        let map = snapshot
            .as_object()
            .ok_or_else(|| BankError::InvalidAttribute {
                name: self.name().to_string(),
                reason: "expected an object".to_string(),
            })?;
        let mut assignments = Vec::new();
        for (name, value) in map {
            if !self.attribute_exists(name) {
                return Err(BankError::UnknownRegister(name.clone()));
            }
            self.collect_assignments(name, value, &mut assignments)?;
        }
        self.apply(assignments)?;
        tracing::debug!("Bank {} restored from snapshot", self.name());
        Ok(())
    }

    fn attribute_exists(&self, prefix: &str) -> bool {
        let element = format!("{}[", prefix);
        self.register_names()
            .any(|n| n == prefix || n.starts_with(&element))
    }

    fn element_count(&self, prefix: &str) -> usize {
        (0..)
            .take_while(|i| self.attribute_exists(&format!("{}[{}]", prefix, i)))
            .count()
    }

    fn attribute_value(&self, prefix: &str) -> Value {
        if let Ok(value) = self.register_value(prefix) {
            return Value::from(value);
        }
        let items = (0..self.element_count(prefix))
            .map(|i| self.attribute_value(&format!("{}[{}]", prefix, i)))
            .collect();
        Value::Array(items)
    }

    fn collect_assignments(
        &self,
        prefix: &str,
        value: &Value,
        out: &mut Vec<(String, u64)>,
    ) -> BankResult<()> {
        if self.register(prefix).is_some() {
            let v = value.as_u64().ok_or_else(|| BankError::InvalidAttribute {
                name: prefix.to_string(),
                reason: format!("expected an unsigned integer, got {}", value),
            })?;
            out.push((prefix.to_string(), v));
            return Ok(());
        }

        let items = value.as_array().ok_or_else(|| BankError::InvalidAttribute {
            name: prefix.to_string(),
            reason: format!("expected an array, got {}", value),
        })?;
        let count = self.element_count(prefix);
        if items.len() != count {
            tracing::error!(
                "Attribute {}: {} values given for {} elements",
                prefix,
                items.len(),
                count
            );
            return Err(BankError::IllegalIndex(prefix.to_string()));
        }
        for (i, item) in items.iter().enumerate() {
            self.collect_assignments(&format!("{}[{}]", prefix, i), item, out)?;
        }
        Ok(())
    }

    fn apply(&mut self, assignments: Vec<(String, u64)>) -> BankResult<()> {
        for (name, value) in assignments {
            self.set_register_value(&name, value)?;
        }
        Ok(())
    }
}
