//! Persistence for roster, directory and channel state with an in-memory backend.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rota_core::{Channel, DirectoryAccount, Event, EventAssignment, RosterPerson, ServiceType};
use std::collections::BTreeMap;
use thiserror::Error;
use tokio::sync::RwLock;

mod sqlite;

pub use sqlite::SqliteRotaStore;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, RotaStoreError>;

/// Errors returned by store implementations.
#[derive(Debug, Error)]
pub enum RotaStoreError {
    #[error("a channel already exists for event {0}")]
    DuplicateChannelEvent(u64),
    #[error("channel name '{0}' is already taken")]
    DuplicateChannelName(String),
    #[error("channel '{0}' already exists")]
    DuplicateChannelId(String),
    #[error("channel '{0}' not found")]
    ChannelNotFound(String),
    #[error("channel '{channel_id}' update rejected: {reason}")]
    ChannelUpdateRejected {
        channel_id: String,
        reason: &'static str,
    },
    #[error("invalid persisted value for '{field}': {value}")]
    InvalidPersistedValue { field: &'static str, value: String },
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Chrono(#[from] chrono::ParseError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Store contract used by the importers and the channel lifecycle engine.
#[async_trait]
pub trait RotaStore: Send + Sync {
    async fn upsert_people(&self, people: &[RosterPerson]) -> StoreResult<()>;
    /// All people ordered by ascending id.
    async fn list_people(&self) -> StoreResult<Vec<RosterPerson>>;

    async fn upsert_service_types(&self, service_types: &[ServiceType]) -> StoreResult<()>;
    async fn get_service_type(&self, id: u64) -> StoreResult<Option<ServiceType>>;

    async fn upsert_events(&self, events: &[Event]) -> StoreResult<()>;
    async fn get_event(&self, id: u64) -> StoreResult<Option<Event>>;
    /// Events with `start <= starts_at < end`, ordered by start then id.
    async fn list_events_starting_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StoreResult<Vec<Event>>;
    async fn has_event_starting_since(&self, since: DateTime<Utc>) -> StoreResult<bool>;

    async fn replace_event_assignments(
        &self,
        event_id: u64,
        assignments: &[EventAssignment],
    ) -> StoreResult<()>;
    /// Assignments of one event ordered by id.
    async fn list_event_assignments(&self, event_id: u64) -> StoreResult<Vec<EventAssignment>>;

    async fn upsert_accounts(&self, accounts: &[DirectoryAccount]) -> StoreResult<()>;
    /// All accounts ordered by id.
    async fn list_accounts(&self) -> StoreResult<Vec<DirectoryAccount>>;
    /// Lowest-id non-deleted account linked to `person_id`.
    async fn find_account_for_person(&self, person_id: u64)
        -> StoreResult<Option<DirectoryAccount>>;

    async fn get_channel_for_event(&self, event_id: u64) -> StoreResult<Option<Channel>>;
    /// True when any channel, archived or not, was ever stored under `name`.
    async fn channel_name_exists(&self, name: &str) -> StoreResult<bool>;
    async fn insert_channel(&self, channel: &Channel) -> StoreResult<()>;
    async fn update_channel(&self, channel: &Channel) -> StoreResult<()>;
    /// Non-archived channels with `starts_at < before`, ordered by start then id.
    async fn list_channels_started_before(&self, before: DateTime<Utc>)
        -> StoreResult<Vec<Channel>>;
    async fn list_channels(&self, include_archived: bool) -> StoreResult<Vec<Channel>>;
}

/// Rejects updates that would rename a channel, move it to another event,
/// un-archive it or drop invited accounts.
pub(crate) fn check_channel_update(existing: &Channel, next: &Channel) -> StoreResult<()> {
    let reject = |reason: &'static str| {
        Err(RotaStoreError::ChannelUpdateRejected {
            channel_id: next.id.clone(),
            reason,
        })
    };
    if existing.name != next.name {
        return reject("channel names are immutable");
    }
    if existing.event_id != next.event_id {
        return reject("channel event is immutable");
    }
    if existing.archived && !next.archived {
        return reject("archived channels cannot be reopened");
    }
    if existing
        .invited_account_ids
        .iter()
        .any(|account_id| !next.invited_account_ids.contains(account_id))
    {
        return reject("invited accounts cannot be removed");
    }
    Ok(())
}

fn event_by_start_then_id(left: &Event, right: &Event) -> std::cmp::Ordering {
    left.starts_at
        .cmp(&right.starts_at)
        .then(left.id.cmp(&right.id))
}

fn channel_by_start_then_id(left: &Channel, right: &Channel) -> std::cmp::Ordering {
    left.starts_at
        .cmp(&right.starts_at)
        .then(left.id.cmp(&right.id))
}

/// In-memory implementation for tests and dry runs.
#[derive(Debug, Default)]
pub struct InMemoryRotaStore {
    inner: RwLock<StoreInner>,
}

#[derive(Debug, Default)]
struct StoreInner {
    people: BTreeMap<u64, RosterPerson>,
    service_types: BTreeMap<u64, ServiceType>,
    events: BTreeMap<u64, Event>,
    assignments: BTreeMap<u64, Vec<EventAssignment>>,
    accounts: BTreeMap<String, DirectoryAccount>,
    channels: BTreeMap<String, Channel>,
}

impl InMemoryRotaStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RotaStore for InMemoryRotaStore {
    async fn upsert_people(&self, people: &[RosterPerson]) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        for person in people {
            inner.people.insert(person.id, person.clone());
        }
        Ok(())
    }

    async fn list_people(&self) -> StoreResult<Vec<RosterPerson>> {
        Ok(self.inner.read().await.people.values().cloned().collect())
    }

    async fn upsert_service_types(&self, service_types: &[ServiceType]) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        for service_type in service_types {
            inner
                .service_types
                .insert(service_type.id, service_type.clone());
        }
        Ok(())
    }

    async fn get_service_type(&self, id: u64) -> StoreResult<Option<ServiceType>> {
        Ok(self.inner.read().await.service_types.get(&id).cloned())
    }

    async fn upsert_events(&self, events: &[Event]) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        for event in events {
            inner.events.insert(event.id, event.clone());
        }
        Ok(())
    }

    async fn get_event(&self, id: u64) -> StoreResult<Option<Event>> {
        Ok(self.inner.read().await.events.get(&id).cloned())
    }

    async fn list_events_starting_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StoreResult<Vec<Event>> {
        let inner = self.inner.read().await;
        let mut events = inner
            .events
            .values()
            .filter(|event| start <= event.starts_at && event.starts_at < end)
            .cloned()
            .collect::<Vec<_>>();
        events.sort_by(event_by_start_then_id);
        Ok(events)
    }

    async fn has_event_starting_since(&self, since: DateTime<Utc>) -> StoreResult<bool> {
        Ok(self
            .inner
            .read()
            .await
            .events
            .values()
            .any(|event| event.starts_at >= since))
    }

    async fn replace_event_assignments(
        &self,
        event_id: u64,
        assignments: &[EventAssignment],
    ) -> StoreResult<()> {
        let mut rows = assignments.to_vec();
        rows.sort_by_key(|assignment| assignment.id);
        self.inner.write().await.assignments.insert(event_id, rows);
        Ok(())
    }

    async fn list_event_assignments(&self, event_id: u64) -> StoreResult<Vec<EventAssignment>> {
        Ok(self
            .inner
            .read()
            .await
            .assignments
            .get(&event_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn upsert_accounts(&self, accounts: &[DirectoryAccount]) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        for account in accounts {
            inner.accounts.insert(account.id.clone(), account.clone());
        }
        Ok(())
    }

    async fn list_accounts(&self) -> StoreResult<Vec<DirectoryAccount>> {
        Ok(self.inner.read().await.accounts.values().cloned().collect())
    }

    async fn find_account_for_person(
        &self,
        person_id: u64,
    ) -> StoreResult<Option<DirectoryAccount>> {
        Ok(self
            .inner
            .read()
            .await
            .accounts
            .values()
            .find(|account| !account.deleted && account.linked_roster_id == Some(person_id))
            .cloned())
    }

    async fn get_channel_for_event(&self, event_id: u64) -> StoreResult<Option<Channel>> {
        Ok(self
            .inner
            .read()
            .await
            .channels
            .values()
            .find(|channel| channel.event_id == event_id)
            .cloned())
    }

    async fn channel_name_exists(&self, name: &str) -> StoreResult<bool> {
        Ok(self
            .inner
            .read()
            .await
            .channels
            .values()
            .any(|channel| channel.name == name))
    }

    async fn insert_channel(&self, channel: &Channel) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        if inner.channels.contains_key(&channel.id) {
            return Err(RotaStoreError::DuplicateChannelId(channel.id.clone()));
        }
        if inner
            .channels
            .values()
            .any(|existing| existing.event_id == channel.event_id)
        {
            return Err(RotaStoreError::DuplicateChannelEvent(channel.event_id));
        }
        if inner
            .channels
            .values()
            .any(|existing| existing.name == channel.name)
        {
            return Err(RotaStoreError::DuplicateChannelName(channel.name.clone()));
        }
        inner.channels.insert(channel.id.clone(), channel.clone());
        Ok(())
    }

    async fn update_channel(&self, channel: &Channel) -> StoreResult<()> {
        let mut inner = self.inner.write().await;
        let existing = inner
            .channels
            .get_mut(&channel.id)
            .ok_or_else(|| RotaStoreError::ChannelNotFound(channel.id.clone()))?;
        check_channel_update(existing, channel)?;
        *existing = channel.clone();
        Ok(())
    }

    async fn list_channels_started_before(
        &self,
        before: DateTime<Utc>,
    ) -> StoreResult<Vec<Channel>> {
        let inner = self.inner.read().await;
        let mut channels = inner
            .channels
            .values()
            .filter(|channel| !channel.archived && channel.starts_at < before)
            .cloned()
            .collect::<Vec<_>>();
        channels.sort_by(channel_by_start_then_id);
        Ok(channels)
    }

    async fn list_channels(&self, include_archived: bool) -> StoreResult<Vec<Channel>> {
        let inner = self.inner.read().await;
        let mut channels = inner
            .channels
            .values()
            .filter(|channel| include_archived || !channel.archived)
            .cloned()
            .collect::<Vec<_>>();
        channels.sort_by(channel_by_start_then_id);
        Ok(channels)
    }
}
