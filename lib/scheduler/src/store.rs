//! Durable trigger storage.
//!
//! The store is the source of truth for trigger definitions. The timer
//! engine's pending-fire index is always rebuilt from it on startup.

use crate::error::StoreError;
use crate::trigger::{Trigger, TriggerStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Trait for trigger storage.
///
/// `create` must perform the uniqueness check and the insert atomically:
/// of two concurrent creates for one name, exactly one succeeds.
#[async_trait]
pub trait TriggerStore: Send + Sync {
    /// Stores a new trigger, failing with `AlreadyExists` if the name is taken.
    async fn create(&self, trigger: Trigger) -> Result<Trigger, StoreError>;

    /// Gets a trigger by name.
    async fn get(&self, name: &str) -> Result<Trigger, StoreError>;

    /// Lists all triggers in registration order.
    async fn list(&self) -> Result<Vec<Trigger>, StoreError>;

    /// Deletes a trigger.
    async fn delete(&self, name: &str) -> Result<(), StoreError>;

    /// Advances the stored next fire time. Earlier timestamps are ignored.
    async fn update_next_fire(&self, name: &str, at: DateTime<Utc>) -> Result<(), StoreError>;

    /// Sets the lifecycle status.
    async fn update_status(&self, name: &str, status: TriggerStatus) -> Result<(), StoreError>;
}

/// In-memory implementation of [`TriggerStore`].
///
/// Used in tests and when the server runs without a database. A single
/// lock guards the map, which makes create's check-and-insert atomic.
#[derive(Debug, Default)]
pub struct InMemoryTriggerStore {
    triggers: RwLock<Entries>,
}

#[derive(Debug, Default)]
struct Entries {
    by_name: HashMap<String, (u64, Trigger)>,
    next_seq: u64,
}

impl Entries {
    fn get_mut(&mut self, name: &str) -> Result<&mut Trigger, StoreError> {
        self.by_name
            .get_mut(name)
            .map(|(_, trigger)| trigger)
            .ok_or_else(|| not_found(name))
    }
}

impl InMemoryTriggerStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored triggers.
    pub async fn len(&self) -> usize {
        self.triggers.read().await.by_name.len()
    }

    /// Returns whether the store is empty.
    pub async fn is_empty(&self) -> bool {
        self.triggers.read().await.by_name.is_empty()
    }
}

fn not_found(name: &str) -> StoreError {
    StoreError::NotFound {
        name: name.to_string(),
    }
}

#[async_trait]
impl TriggerStore for InMemoryTriggerStore {
    async fn create(&self, trigger: Trigger) -> Result<Trigger, StoreError> {
        let mut entries = self.triggers.write().await;
        if entries.by_name.contains_key(&trigger.name) {
            return Err(StoreError::AlreadyExists { name: trigger.name });
        }
        let seq = entries.next_seq;
        entries.next_seq += 1;
        entries
            .by_name
            .insert(trigger.name.clone(), (seq, trigger.clone()));
        Ok(trigger)
    }

    async fn get(&self, name: &str) -> Result<Trigger, StoreError> {
        self.triggers
            .read()
            .await
            .by_name
            .get(name)
            .map(|(_, trigger)| trigger.clone())
            .ok_or_else(|| not_found(name))
    }

    async fn list(&self) -> Result<Vec<Trigger>, StoreError> {
        let entries = self.triggers.read().await;
        let mut ordered: Vec<&(u64, Trigger)> = entries.by_name.values().collect();
        ordered.sort_by_key(|(seq, _)| *seq);
        Ok(ordered.into_iter().map(|(_, trigger)| trigger.clone()).collect())
    }

    async fn delete(&self, name: &str) -> Result<(), StoreError> {
        self.triggers
            .write()
            .await
            .by_name
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| not_found(name))
    }

    async fn update_next_fire(&self, name: &str, at: DateTime<Utc>) -> Result<(), StoreError> {
        let mut entries = self.triggers.write().await;
        let trigger = entries.get_mut(name)?;
        if trigger.next_fire_at.is_none_or(|current| current <= at) {
            trigger.next_fire_at = Some(at);
        }
        Ok(())
    }

    async fn update_status(&self, name: &str, status: TriggerStatus) -> Result<(), StoreError> {
        self.triggers.write().await.get_mut(name)?.status = status;
        Ok(())
    }
}
