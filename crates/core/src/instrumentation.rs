// LabWired - Firmware Simulation Platform
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! Per-bank registry of before/after read/write callbacks.
//!
//! Callbacks are grouped by subscriber connection. Connections are dispatched
//! in list order: the anonymous connection (if any) is created first in the
//! list, named connections follow in registration order, and
//! [`move_before`](InstrumentationRegistry::move_before) /
//! [`move_to_end`](InstrumentationRegistry::move_to_end) reorder them. Within
//! a connection, callbacks run in registration order.
//!
//! There is no locking. The host must not change the registry while a
//! dispatch is in flight.

use crate::bank::BankAccess;
use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;

/// Identity of an instrumentation subscriber.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Connection(String);

impl Connection {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Connection {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl fmt::Display for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Bank-unique id of a registered callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CallbackHandle(u64);

impl CallbackHandle {
    pub fn value(self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallbackKind {
    BeforeRead,
    AfterRead,
    BeforeWrite,
    AfterWrite,
}

impl CallbackKind {
    pub const ALL: [CallbackKind; 4] = [
        CallbackKind::BeforeRead,
        CallbackKind::AfterRead,
        CallbackKind::BeforeWrite,
        CallbackKind::AfterWrite,
    ];

    fn index(self) -> usize {
        match self {
            CallbackKind::BeforeRead => 0,
            CallbackKind::AfterRead => 1,
            CallbackKind::BeforeWrite => 2,
            CallbackKind::AfterWrite => 3,
        }
    }
}

pub type UserData = Box<dyn Any + Send>;

pub type AccessCallback = Box<dyn FnMut(&mut BankAccess, Option<&(dyn Any + Send)>) + Send>;

struct CallbackEntry {
    offset: u64,
    size: u64,
    callback: AccessCallback,
    user_data: Option<UserData>,
}

impl CallbackEntry {
    /// `(0, 0)` matches every access, otherwise the access must start inside the range.
    fn matches(&self, access_offset: u64) -> bool {
        (self.offset == 0 && self.size == 0)
            || (access_offset >= self.offset && access_offset - self.offset < self.size)
    }
}

#[derive(Default)]
struct ConnectionSlot {
    connection: Option<Connection>,
    enabled: bool,
    callbacks: [BTreeMap<CallbackHandle, CallbackEntry>; 4],
}

impl ConnectionSlot {
    fn is_empty(&self) -> bool {
        self.callbacks.iter().all(BTreeMap::is_empty)
    }

    fn count(&self) -> usize {
        self.callbacks.iter().map(BTreeMap::len).sum()
    }
}

#[derive(Default)]
pub struct InstrumentationRegistry {
    slots: Vec<ConnectionSlot>,
    next_handle: u64,
}

impl fmt::Debug for InstrumentationRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstrumentationRegistry")
            .field("connections", &self.connections())
            .field("callbacks", &self.number_of_callbacks())
            .finish()
    }
}

impl InstrumentationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `callback` for `kind` accesses starting in `[offset, offset+size)`,
    /// or for every access when both are 0. `None` is the anonymous connection.
    pub fn register_callback<F>(
        &mut self,
        kind: CallbackKind,
        connection: Option<&Connection>,
        offset: u64,
        size: u64,
        callback: F,
        user_data: Option<UserData>,
    ) -> CallbackHandle
    where
        F: FnMut(&mut BankAccess, Option<&(dyn Any + Send)>) + Send + 'static,
    {
        let handle = CallbackHandle(self.next_handle);
        self.next_handle += 1;

        let index = match self.slot_index(connection) {
            Some(index) => index,
            None => {
                let slot = ConnectionSlot {
                    connection: connection.cloned(),
                    enabled: true,
                    ..Default::default()
                };
                if connection.is_none() {
                    self.slots.insert(0, slot);
                    0
                } else {
                    self.slots.push(slot);
                    self.slots.len() - 1
                }
            }
        };

        self.slots[index].callbacks[kind.index()].insert(
            handle,
            CallbackEntry {
                offset,
                size,
                callback: Box::new(callback),
                user_data,
            },
        );
        tracing::debug!(
            "Registered {:?} callback {} for {} at [{:#x}, +{:#x})",
            kind,
            handle.0,
            display_connection(connection),
            offset,
            size
        );
        handle
    }

    pub fn register_before_read<F>(
        &mut self,
        connection: Option<&Connection>,
        offset: u64,
        size: u64,
        callback: F,
        user_data: Option<UserData>,
    ) -> CallbackHandle
    where
        F: FnMut(&mut BankAccess, Option<&(dyn Any + Send)>) + Send + 'static,
    {
        self.register_callback(
            CallbackKind::BeforeRead,
            connection,
            offset,
            size,
            callback,
            user_data,
        )
    }

    pub fn register_after_read<F>(
        &mut self,
        connection: Option<&Connection>,
        offset: u64,
        size: u64,
        callback: F,
        user_data: Option<UserData>,
    ) -> CallbackHandle
    where
        F: FnMut(&mut BankAccess, Option<&(dyn Any + Send)>) + Send + 'static,
    {
        self.register_callback(
            CallbackKind::AfterRead,
            connection,
            offset,
            size,
            callback,
            user_data,
        )
    }

    pub fn register_before_write<F>(
        &mut self,
        connection: Option<&Connection>,
        offset: u64,
        size: u64,
        callback: F,
        user_data: Option<UserData>,
    ) -> CallbackHandle
    where
        F: FnMut(&mut BankAccess, Option<&(dyn Any + Send)>) + Send + 'static,
    {
        self.register_callback(
            CallbackKind::BeforeWrite,
            connection,
            offset,
            size,
            callback,
            user_data,
        )
    }

    pub fn register_after_write<F>(
        &mut self,
        connection: Option<&Connection>,
        offset: u64,
        size: u64,
        callback: F,
        user_data: Option<UserData>,
    ) -> CallbackHandle
    where
        F: FnMut(&mut BankAccess, Option<&(dyn Any + Send)>) + Send + 'static,
    {
        self.register_callback(
            CallbackKind::AfterWrite,
            connection,
            offset,
            size,
            callback,
            user_data,
        )
    }

    /// Removes one callback. Unknown or already removed handles are ignored.
    pub fn remove_callback(&mut self, handle: CallbackHandle) -> bool {
        let found = self.slots.iter_mut().enumerate().find_map(|(i, slot)| {
            slot.callbacks
                .iter_mut()
                .any(|map| map.remove(&handle).is_some())
                .then_some(i)
        });
        match found {
            Some(i) => {
                if self.slots[i].is_empty() {
                    self.slots.remove(i);
                }
                true
            }
            None => false,
        }
    }

    pub fn remove_connection_callbacks(&mut self, connection: Option<&Connection>) -> bool {
        match self.slot_index(connection) {
            Some(index) => {
                self.slots.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn enable_connection_callbacks(&mut self, connection: Option<&Connection>) -> bool {
        self.set_enabled(connection, true)
    }

    pub fn disable_connection_callbacks(&mut self, connection: Option<&Connection>) -> bool {
        self.set_enabled(connection, false)
    }

    fn set_enabled(&mut self, connection: Option<&Connection>, enabled: bool) -> bool {
        match self.slot_index(connection) {
            Some(index) => {
                self.slots[index].enabled = enabled;
                true
            }
            None => false,
        }
    }

    /// Places `connection` immediately in front of `before`. Both must be known.
    pub fn move_before(
        &mut self,
        connection: Option<&Connection>,
        before: Option<&Connection>,
    ) -> bool {
        let (Some(from), Some(target)) = (self.slot_index(connection), self.slot_index(before))
        else {
            return false;
        };
        if from == target {
            return true;
        }
        let slot = self.slots.remove(from);
        // Re-resolve, the removal may have shifted `before`.
        let to = self.slot_index(before).unwrap_or(self.slots.len());
        self.slots.insert(to, slot);
        true
    }

    /// Places `connection` last in dispatch order.
    pub fn move_to_end(&mut self, connection: Option<&Connection>) -> bool {
        let Some(from) = self.slot_index(connection) else {
            return false;
        };
        let slot = self.slots.remove(from);
        self.slots.push(slot);
        true
    }

    /// Runs every enabled callback of `kind` matching `access`, in dispatch order.
    ///
    /// Callbacks only see the [`BankAccess`], never the bank that dispatched
    /// it, so a callback cannot issue a nested access to that same bank.
    pub fn issue_callbacks(&mut self, access: &mut BankAccess, kind: CallbackKind) {
        for slot in self.slots.iter_mut().filter(|s| s.enabled) {
            for entry in slot.callbacks[kind.index()].values_mut() {
                if !entry.matches(access.offset()) {
                    continue;
                }
                tracing::trace!(
                    "{:?} callback for {} at {:#x}",
                    kind,
                    display_connection(slot.connection.as_ref()),
                    access.offset()
                );
                let CallbackEntry {
                    callback,
                    user_data,
                    ..
                } = entry;
                callback(access, user_data.as_deref());
            }
        }
    }

    /// Connections in dispatch order, `None` being the anonymous one.
    pub fn connections(&self) -> Vec<Option<&Connection>> {
        self.slots.iter().map(|s| s.connection.as_ref()).collect()
    }

    pub fn is_enabled(&self, connection: Option<&Connection>) -> Option<bool> {
        self.slot_index(connection).map(|i| self.slots[i].enabled)
    }

    pub fn number_of_callbacks(&self) -> usize {
        self.slots.iter().map(ConnectionSlot::count).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    fn slot_index(&self, connection: Option<&Connection>) -> Option<usize> {
        self.slots
            .iter()
            .position(|s| s.connection.as_ref() == connection)
    }
}

fn display_connection(connection: Option<&Connection>) -> &str {
    connection.map_or("<anonymous>", Connection::name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    type Log = Arc<Mutex<Vec<&'static str>>>;

    fn recorder(log: &Log, tag: &'static str) -> impl FnMut(&mut BankAccess, Option<&(dyn Any + Send)>) + Send + 'static {
        let log = log.clone();
        move |_, _| log.lock().unwrap().push(tag)
    }

    fn read_at(offset: u64) -> BankAccess {
        BankAccess::new(offset, 4, false, false)
    }

    #[test]
    fn test_dispatch_order() {
        let log = Log::default();
        let mut reg = InstrumentationRegistry::new();
        let named = Connection::new("tracer");
        reg.register_before_read(Some(&named), 0, 0, recorder(&log, "named"), None);
        reg.register_before_read(None, 0, 0, recorder(&log, "anon1"), None);
        reg.register_before_read(None, 0, 0, recorder(&log, "anon2"), None);

        reg.issue_callbacks(&mut read_at(0), CallbackKind::BeforeRead);
        assert_eq!(*log.lock().unwrap(), vec!["anon1", "anon2", "named"]);
        assert_eq!(reg.connections(), vec![None, Some(&named)]);

        log.lock().unwrap().clear();
        assert!(reg.move_before(Some(&named), None));
        reg.issue_callbacks(&mut read_at(0), CallbackKind::BeforeRead);
        assert_eq!(*log.lock().unwrap(), vec!["named", "anon1", "anon2"]);

        log.lock().unwrap().clear();
        assert!(reg.move_to_end(Some(&named)));
        reg.issue_callbacks(&mut read_at(0), CallbackKind::BeforeRead);
        assert_eq!(*log.lock().unwrap(), vec!["anon1", "anon2", "named"]);
    }

    #[test]
    fn test_kinds_are_separate() {
        let log = Log::default();
        let mut reg = InstrumentationRegistry::new();
        reg.register_after_write(None, 0, 0, recorder(&log, "aw"), None);
        reg.issue_callbacks(&mut read_at(0), CallbackKind::AfterRead);
        assert!(log.lock().unwrap().is_empty());
        reg.issue_callbacks(&mut read_at(0), CallbackKind::AfterWrite);
        assert_eq!(*log.lock().unwrap(), vec!["aw"]);
    }

    #[test]
    fn test_range_filter() {
        let log = Log::default();
        let mut reg = InstrumentationRegistry::new();
        reg.register_before_read(None, 0x10, 8, recorder(&log, "hit"), None);

        for offset in [0x0F, 0x10, 0x17, 0x18] {
            reg.issue_callbacks(&mut read_at(offset), CallbackKind::BeforeRead);
        }
        assert_eq!(*log.lock().unwrap(), vec!["hit", "hit"]);
    }

    #[test]
    fn test_handle_removal_idempotent() {
        let log = Log::default();
        let mut reg = InstrumentationRegistry::new();
        let conn = Connection::new("c");
        let h1 = reg.register_before_write(Some(&conn), 0, 0, recorder(&log, "one"), None);
        let h2 = reg.register_before_write(Some(&conn), 0, 0, recorder(&log, "two"), None);
        assert_ne!(h1, h2);

        assert!(reg.remove_callback(h1));
        assert!(!reg.remove_callback(h1));
        reg.issue_callbacks(&mut read_at(0), CallbackKind::BeforeWrite);
        assert_eq!(*log.lock().unwrap(), vec!["two"]);

        // Removing the last callback drops the connection
        assert!(reg.remove_callback(h2));
        assert!(reg.is_empty());
        assert_eq!(reg.is_enabled(Some(&conn)), None);
    }

    #[test]
    fn test_enable_disable() {
        let log = Log::default();
        let mut reg = InstrumentationRegistry::new();
        let conn = Connection::new("c");
        reg.register_before_read(Some(&conn), 0, 0, recorder(&log, "c"), None);
        reg.register_before_read(None, 0, 0, recorder(&log, "anon"), None);

        assert!(reg.disable_connection_callbacks(Some(&conn)));
        reg.issue_callbacks(&mut read_at(0), CallbackKind::BeforeRead);
        assert_eq!(*log.lock().unwrap(), vec!["anon"]);

        assert!(reg.enable_connection_callbacks(Some(&conn)));
        reg.issue_callbacks(&mut read_at(0), CallbackKind::BeforeRead);
        assert_eq!(*log.lock().unwrap(), vec!["anon", "anon", "c"]);

        assert!(!reg.disable_connection_callbacks(Some(&Connection::new("unknown"))));
    }

    #[test]
    fn test_remove_connection() {
        let mut reg = InstrumentationRegistry::new();
        let conn = Connection::new("c");
        reg.register_before_read(Some(&conn), 0, 0, |_, _| {}, None);
        reg.register_after_read(Some(&conn), 0, 0, |_, _| {}, None);
        reg.register_after_read(None, 0, 0, |_, _| {}, None);
        assert_eq!(reg.number_of_callbacks(), 3);

        assert!(reg.remove_connection_callbacks(Some(&conn)));
        assert!(!reg.remove_connection_callbacks(Some(&conn)));
        assert_eq!(reg.number_of_callbacks(), 1);
        assert_eq!(reg.connections(), vec![None]);
    }

    #[test]
    fn test_move_unknown_fails() {
        let mut reg = InstrumentationRegistry::new();
        let a = Connection::new("a");
        let b = Connection::new("b");
        reg.register_before_read(Some(&a), 0, 0, |_, _| {}, None);
        assert!(!reg.move_before(Some(&a), Some(&b)));
        assert!(!reg.move_before(Some(&b), Some(&a)));
        assert!(!reg.move_before(Some(&a), None));
        assert!(!reg.move_to_end(Some(&b)));
    }

    #[test]
    fn test_move_before_itself_keeps_order() {
        let mut reg = InstrumentationRegistry::new();
        let a = Connection::new("a");
        let c = Connection::new("c");
        reg.register_before_read(Some(&a), 0, 0, |_, _| {}, None);
        reg.register_before_read(Some(&c), 0, 0, |_, _| {}, None);

        assert!(reg.move_before(Some(&a), Some(&a)));
        assert_eq!(reg.connections(), vec![Some(&a), Some(&c)]);
    }

    #[test]
    fn test_callbacks_see_user_data_and_edit_value() {
        let mut reg = InstrumentationRegistry::new();
        reg.register_after_read(
            None,
            0,
            0,
            |access, data| {
                let bias = data.and_then(|d| d.downcast_ref::<u64>()).copied().unwrap_or(0);
                access.set_value(access.value() + bias);
            },
            Some(Box::new(5u64)),
        );
        let mut access = read_at(0);
        access.set_value(10);
        reg.issue_callbacks(&mut access, CallbackKind::AfterRead);
        assert_eq!(access.value(), 15);
    }
}
