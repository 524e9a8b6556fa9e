// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

/// Default schema version for YAML descriptors
fn default_schema_version() -> String {
    "1.0".to_string()
}

const SUPPORTED_SCHEMA_VERSION: &str = "1.0";

/// Byte order used when a bank serializes register values onto the transaction buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ByteOrder {
    #[default]
    #[serde(alias = "le", alias = "little-endian", alias = "little_endian")]
    Little,
    #[serde(alias = "be", alias = "big-endian", alias = "big_endian")]
    Big,
}

/// Leaf read/write semantics of a field or a register.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Behavior {
    #[default]
    #[serde(alias = "rw", alias = "R/W")]
    ReadWrite,
    #[serde(alias = "ro", alias = "RO")]
    ReadOnly,
    #[serde(alias = "wo", alias = "WO")]
    WriteOnly,
    IgnoreWrite,
    ReadZero,
    #[serde(alias = "w1c", alias = "oneToClear")]
    #[serde(rename = "write_1_clears")]
    Write1Clears,
    #[serde(alias = "w1s")]
    #[serde(rename = "write_1_sets")]
    Write1Sets,
    #[serde(alias = "w0c", alias = "zeroToClear")]
    #[serde(rename = "write_0_clears")]
    Write0Clears,
    #[serde(alias = "rc")]
    ClearOnRead,
    WriteOnce,
    Constant(u64),
    Reserved,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(alias = "lsb")]
    pub bit_offset: u8,
    #[serde(alias = "width")]
    pub bit_width: u8,
    #[serde(default)]
    pub behavior: Behavior,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct RegisterDescriptor {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub offset: u64,
    /// Width in bytes, 1 through 8.
    pub size: u8,
    #[serde(default, alias = "reset_value")]
    pub init_value: u64,
    #[serde(default)]
    pub behavior: Behavior,
    #[serde(default)]
    pub fields: Vec<FieldDescriptor>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct BankDescriptor {
    #[serde(default = "default_schema_version")]
    pub schema_version: String,
    pub bank: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub byte_order: ByteOrder,
    #[serde(default)]
    pub miss_pattern: Option<u8>,
    #[serde(default)]
    pub registers: Vec<RegisterDescriptor>,
}

impl BankDescriptor {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read bank descriptor at {:?}", path.as_ref()))?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let desc: Self = serde_yaml::from_str(yaml).context("Failed to parse Bank Descriptor")?;
        desc.validate()?;
        Ok(desc)
    }

    pub fn validate(&self) -> Result<()> {
        check_schema_version(&self.schema_version)?;

        if self.bank.trim().is_empty() {
            anyhow::bail!("Bank name cannot be empty");
        }

        let mut seen = HashSet::new();
        for reg in &self.registers {
            if !seen.insert(reg.name.as_str()) {
                anyhow::bail!(
                    "Duplicate register name '{}' in bank '{}'",
                    reg.name,
                    self.bank
                );
            }
        }

        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct DeviceDescriptor {
    #[serde(default = "default_schema_version")]
    pub schema_version: String,
    pub device: String,
    #[serde(default)]
    pub banks: Vec<BankDescriptor>,
}

impl DeviceDescriptor {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read device descriptor at {:?}", path.as_ref()))?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let desc: Self =
            serde_yaml::from_str(yaml).context("Failed to parse Device Descriptor YAML")?;
        desc.validate()?;
        Ok(desc)
    }

    pub fn validate(&self) -> Result<()> {
        check_schema_version(&self.schema_version)?;

        if self.device.trim().is_empty() {
            anyhow::bail!("Device name cannot be empty");
        }

        let mut seen = HashSet::new();
        for bank in &self.banks {
            bank.validate()
                .with_context(|| format!("Invalid bank '{}'", bank.bank))?;
            if !seen.insert(bank.bank.as_str()) {
                anyhow::bail!("Duplicate bank name '{}'", bank.bank);
            }
        }

        Ok(())
    }
}

fn check_schema_version(version: &str) -> Result<()> {
    if version != SUPPORTED_SCHEMA_VERSION {
        anyhow::bail!(
            "Unsupported schema_version '{}'. Supported versions: '{}'",
            version,
            SUPPORTED_SCHEMA_VERSION
        );
    }
    Ok(())
}
