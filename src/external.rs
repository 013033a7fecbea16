//! Collaborator interfaces.
//!
//! The tracker core owns no I/O. It asks a [`LocationSource`] to start and stop the
//! platform's position watch, reads fields, storages and settings from [`FarmData`]
//! once per session, and hands finished records to an [`ActivitySink`]. Under the
//! `ffi` feature these are callback interfaces implemented by the mobile shell.
//!
//! In-memory implementations are provided for tests, demos and headless use.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use crate::config::TrackerSettings;
use crate::farm::{Field, StorageLocation};
use crate::record::ActivityRecord;

/// Starts and stops the platform geolocation watch.
#[cfg_attr(feature = "ffi", uniffi::export(callback_interface))]
pub trait LocationSource: Send + Sync {
    /// Begin delivering fixes; returns a watch id.
    fn watch(&self) -> u64;
    fn clear_watch(&self, watch_id: u64);
}

/// Farm data snapshotted at session start.
#[cfg_attr(feature = "ffi", uniffi::export(callback_interface))]
pub trait FarmData: Send + Sync {
    fn fields(&self) -> Vec<Field>;
    fn storage_locations(&self) -> Vec<StorageLocation>;
    fn settings(&self) -> TrackerSettings;
}

/// Receives the output of a finished session.
#[cfg_attr(feature = "ffi", uniffi::export(callback_interface))]
pub trait ActivitySink: Send + Sync {
    fn save_activity(&self, record: ActivityRecord);
    /// Amount withdrawn per storage id.
    fn update_storage_levels(&self, withdrawals: HashMap<String, f64>);
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ============================================================================
// In-memory implementations
// ============================================================================

/// A location source for hosts that push fixes themselves.
///
/// Hands out increasing watch ids and remembers which one is active.
#[derive(Debug, Default)]
pub struct ManualLocationSource {
    next_id: AtomicU64,
    active: Mutex<Option<u64>>,
}

impl ManualLocationSource {
    pub fn active_watch(&self) -> Option<u64> {
        *lock(&self.active)
    }
}

impl LocationSource for ManualLocationSource {
    fn watch(&self) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        *lock(&self.active) = Some(id);
        id
    }

    fn clear_watch(&self, watch_id: u64) {
        let mut active = lock(&self.active);
        if *active == Some(watch_id) {
            *active = None;
        }
    }
}

/// Fixed farm data held in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryFarm {
    pub fields: Vec<Field>,
    pub storages: Vec<StorageLocation>,
    pub settings: TrackerSettings,
}

impl MemoryFarm {
    pub fn new(fields: Vec<Field>, storages: Vec<StorageLocation>, settings: TrackerSettings) -> Self {
        Self { fields, storages, settings }
    }
}

impl FarmData for MemoryFarm {
    fn fields(&self) -> Vec<Field> {
        self.fields.clone()
    }

    fn storage_locations(&self) -> Vec<StorageLocation> {
        self.storages.clone()
    }

    fn settings(&self) -> TrackerSettings {
        self.settings.clone()
    }
}

/// Collects saved records and storage updates.
#[derive(Debug, Default)]
pub struct RecordingSink {
    records: Mutex<Vec<ActivityRecord>>,
    withdrawals: Mutex<Vec<HashMap<String, f64>>>,
}

impl RecordingSink {
    pub fn records(&self) -> Vec<ActivityRecord> {
        lock(&self.records).clone()
    }

    pub fn withdrawals(&self) -> Vec<HashMap<String, f64>> {
        lock(&self.withdrawals).clone()
    }
}

impl ActivitySink for RecordingSink {
    fn save_activity(&self, record: ActivityRecord) {
        lock(&self.records).push(record);
    }

    fn update_storage_levels(&self, withdrawals: HashMap<String, f64>) {
        lock(&self.withdrawals).push(withdrawals);
    }
}

/// Forwarding impls so a shared handle can be kept by the caller.
impl<T: LocationSource + ?Sized> LocationSource for std::sync::Arc<T> {
    fn watch(&self) -> u64 {
        (**self).watch()
    }

    fn clear_watch(&self, watch_id: u64) {
        (**self).clear_watch(watch_id)
    }
}

impl<T: ActivitySink + ?Sized> ActivitySink for std::sync::Arc<T> {
    fn save_activity(&self, record: ActivityRecord) {
        (**self).save_activity(record)
    }

    fn update_storage_levels(&self, withdrawals: HashMap<String, f64>) {
        (**self).update_storage_levels(withdrawals)
    }
}
