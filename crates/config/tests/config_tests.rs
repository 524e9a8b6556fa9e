// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use regbank_config::{Behavior, ByteOrder, DeviceDescriptor};

#[test]
fn test_device_descriptor_parses() {
    let yaml = r#"
device: "timer0"
banks:
  - bank: "regs"
    byte_order: "big-endian"
    registers:
      - name: "CTRL"
        description: "Control register"
        offset: 0x0
        size: 4
        reset_value: 0x1
        fields:
          - { name: "EN", bit_offset: 0, bit_width: 1 }
          - { name: "MODE", bit_offset: 1, bit_width: 2, behavior: write_once }
      - name: "STATUS"
        offset: 0x4
        size: 4
        behavior: clear_on_read
"#;
    let desc = DeviceDescriptor::from_yaml(yaml).unwrap();
    assert_eq!(desc.device, "timer0");
    let bank = &desc.banks[0];
    assert_eq!(bank.byte_order, ByteOrder::Big);
    assert_eq!(bank.registers[0].init_value, 1);
    assert_eq!(
        bank.registers[0].description.as_deref(),
        Some("Control register")
    );
    assert_eq!(bank.registers[0].fields[1].behavior, Behavior::WriteOnce);
    assert_eq!(bank.registers[1].behavior, Behavior::ClearOnRead);
}

#[test]
fn test_invalid_bank_reports_context() {
    let yaml = r#"
device: "dev"
banks:
  - bank: "regs"
    schema_version: "0.9"
"#;
    let err = DeviceDescriptor::from_yaml(yaml).unwrap_err();
    let msg = format!("{:#}", err);
    assert!(msg.contains("Invalid bank 'regs'"));
    assert!(msg.contains("Unsupported schema_version"));
}

#[test]
fn test_unknown_behavior_rejected() {
    let yaml = r#"
device: "dev"
banks:
  - bank: "regs"
    registers:
      - { name: "R", offset: 0, size: 1, behavior: "explode_on_read" }
"#;
    assert!(DeviceDescriptor::from_yaml(yaml).is_err());
}
