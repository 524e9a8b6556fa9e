// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Leaf read/write semantics shared by fields and registers.
//!
//! These functions are pure: they take the current stored value and return
//! what the access yields and what should be stored. The caller owns the
//! storage and the logging.

pub use regbank_config::Behavior;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ReadOutcome {
    pub value: u64,
    pub store: Option<u64>,
    pub violation: Option<&'static str>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct WriteOutcome {
    pub store: Option<u64>,
    pub latch: bool,
    pub violation: Option<&'static str>,
}

pub(crate) fn on_read(behavior: Behavior, current: u64, enabled: u64) -> ReadOutcome {
    let plain = ReadOutcome {
        value: enabled & current,
        store: None,
        violation: None,
    };
    match behavior {
        Behavior::WriteOnly => ReadOutcome {
            value: 0,
            violation: Some("read of write-only bits returns 0"),
            ..plain
        },
        Behavior::ReadZero => ReadOutcome { value: 0, ..plain },
        Behavior::ClearOnRead => ReadOutcome {
            store: Some(current & !enabled),
            ..plain
        },
        Behavior::Constant(value) => ReadOutcome {
            value: enabled & value,
            ..plain
        },
        Behavior::ReadWrite
        | Behavior::ReadOnly
        | Behavior::IgnoreWrite
        | Behavior::Write1Clears
        | Behavior::Write1Sets
        | Behavior::Write0Clears
        | Behavior::WriteOnce
        | Behavior::Reserved => plain,
    }
}

/// `latched` is the per-object flag set by an earlier `latch: true` outcome
/// and cleared on reset.
pub(crate) fn on_write(
    behavior: Behavior,
    current: u64,
    value: u64,
    enabled: u64,
    latched: bool,
) -> WriteOutcome {
    let merged = (enabled & value) | (!enabled & current);
    let store = |v: u64| WriteOutcome {
        store: Some(v),
        latch: false,
        violation: None,
    };
    let ignore = |violation: Option<&'static str>| WriteOutcome {
        store: None,
        latch: false,
        violation,
    };
    match behavior {
        Behavior::ReadWrite | Behavior::WriteOnly | Behavior::ReadZero | Behavior::ClearOnRead => {
            store(merged)
        }
        Behavior::ReadOnly => {
            ignore((merged != current).then_some("write to read-only bits ignored"))
        }
        Behavior::IgnoreWrite => ignore(None),
        Behavior::Write1Clears => store(current & !(value & enabled)),
        Behavior::Write1Sets => store(current | (value & enabled)),
        Behavior::Write0Clears => store(current & (value | !enabled)),
        Behavior::WriteOnce if latched => ignore(Some("write to write-once bits ignored")),
        Behavior::WriteOnce => WriteOutcome {
            latch: true,
            ..store(merged)
        },
        Behavior::Constant(_) => ignore(Some("write to constant bits ignored")),
        Behavior::Reserved => WriteOutcome {
            store: Some(merged),
            latch: merged != current,
            violation: (!latched && merged != current).then_some("write to reserved bits"),
        },
    }
}
