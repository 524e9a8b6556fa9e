// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::bank::{Bank, Transaction, TransactionStatus};
use crate::field::Field;
use crate::naming::{HierarchicalName, Level};
use crate::register::Register;
use crate::{BankError, BankResult, StateObserver};
use anyhow::Context;
use regbank_config::DeviceDescriptor;
use serde_json::{Map, Value};
use std::sync::Arc;

/// A resolved hierarchical name.
#[derive(Debug, Clone, Copy)]
pub enum Node<'a> {
    Bank(&'a Bank),
    Register(&'a Bank, &'a Register),
    Field(&'a Bank, &'a Register, &'a Field),
}

impl Node<'_> {
    /// Side-effect-free value. Banks have none.
    pub fn value(&self) -> Option<u64> {
        match self {
            Node::Bank(_) => None,
            Node::Register(bank, reg) => Some(reg.get(bank.memory())),
            Node::Field(bank, _, field) => Some(field.get(bank.memory())),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Node::Bank(bank) => bank.name(),
            Node::Register(_, reg) => reg.name(),
            Node::Field(_, _, field) => field.name(),
        }
    }
}

/// The banks of one device model.
#[derive(Debug)]
pub struct Device {
    name: String,
    banks: Vec<Bank>,
    finalized: bool,
}

impl Device {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            banks: Vec::new(),
            finalized: false,
        }
    }

    pub fn from_descriptor(desc: &DeviceDescriptor) -> anyhow::Result<Self> {
        let mut device = Device::new(&desc.device);
        for bank in &desc.banks {
            let bank = Bank::from_descriptor(bank)
                .with_context(|| format!("Invalid bank '{}'", bank.bank))?;
            device.add_bank(bank)?;
        }
        device.finalize();
        tracing::info!(
            "Device {} ready with {} banks",
            device.name,
            device.banks.len()
        );
        Ok(device)
    }

    pub fn from_file(path: impl AsRef<std::path::Path>) -> anyhow::Result<Self> {
        let desc = DeviceDescriptor::from_file(path)?;
        Self::from_descriptor(&desc)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn add_bank(&mut self, bank: Bank) -> BankResult<()> {
        if self.finalized {
            tracing::error!("Device {} is finalized, cannot add bank {}", self.name, bank.name());
            return Err(BankError::Finalized(self.name.clone()));
        }
        if self.bank(bank.name()).is_some() {
            tracing::error!("Device {} already has a bank {}", self.name, bank.name());
            return Err(BankError::DuplicateName(bank.name().to_string()));
        }
        self.banks.push(bank);
        Ok(())
    }

    pub fn bank(&self, name: &str) -> Option<&Bank> {
        self.banks.iter().find(|b| b.name() == name)
    }

    pub fn bank_mut(&mut self, name: &str) -> Option<&mut Bank> {
        self.banks.iter_mut().find(|b| b.name() == name)
    }

    pub fn banks(&self) -> &[Bank] {
        &self.banks
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Freezes the topology of every bank.
    pub fn finalize(&mut self) {
        for bank in &mut self.banks {
            bank.finalize();
        }
        self.finalized = true;
    }

    pub fn reset(&mut self) {
        for bank in &mut self.banks {
            bank.reset();
        }
    }

    pub fn set_observer(&mut self, observer: Option<Arc<dyn StateObserver>>) {
        for bank in &mut self.banks {
            bank.set_observer(observer.clone());
        }
    }

    /// Forwards `txn` to the bank named `bank`. Unknown banks do not take it.
    pub fn transaction_access(&mut self, bank: &str, txn: &mut dyn Transaction) -> TransactionStatus {
        match self.bank_mut(bank) {
            Some(bank) => bank.transaction_access(txn),
            None => {
                tracing::warn!("Device {}: no bank named {}", self.name, bank);
                TransactionStatus::NotTaken
            }
        }
    }

    /// Resolves `bank`, `bank.register` or `bank.register.field`.
    pub fn lookup(&self, name: &str) -> BankResult<Node<'_>> {
        let name = HierarchicalName::parse(name)?;
        let bank = self
            .bank(name.bank_name())
            .ok_or_else(|| BankError::UnknownBank(name.bank_name().to_string()))?;
        let Some(reg_name) = name.register_name() else {
            return Ok(Node::Bank(bank));
        };
        let reg = bank
            .register(reg_name)
            .ok_or_else(|| BankError::UnknownRegister(format!("{}.{}", bank.name(), reg_name)))?;
        match (name.level(), name.field_name()) {
            (Level::Field, Some(field_name)) => reg
                .field(field_name)
                .map(|f| Node::Field(bank, reg, f))
                .ok_or_else(|| BankError::UnknownField(name.to_string())),
            _ => Ok(Node::Register(bank, reg)),
        }
    }

    /// Checkpoint of every bank, keyed by bank name.
    pub fn snapshot(&self) -> Value {
        let map: Map<String, Value> = self
            .banks
            .iter()
            .map(|b| (b.name().to_string(), b.snapshot()))
            .collect();
        Value::Object(map)
    }

    pub fn restore(&mut self, snapshot: &Value) -> BankResult<()> {
        let map = snapshot
            .as_object()
            .ok_or_else(|| BankError::InvalidAttribute {
                name: self.name.clone(),
                reason: "expected an object".to_string(),
            })?;
        for (name, value) in map {
            let bank = self
                .bank_mut(name)
                .ok_or_else(|| BankError::UnknownBank(name.clone()))?;
            bank.restore(value)?;
        }
        Ok(())
    }
}
