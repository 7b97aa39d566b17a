//! Collaborator ports the sync runtime is wired against.
//!
//! Implementations live in the Planning Center and Slack client crates; tests
//! supply scripted fakes.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::types::{DirectoryAccount, Event, EventAssignment, RosterPerson, ServiceType};

/// Narrows which events the roster source returns.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventFilter {
    /// Service types to pull events for. Empty means none.
    pub service_type_ids: Vec<u64>,
    /// When set, events neither updated nor scheduled on/after this instant
    /// are skipped.
    pub changed_since: Option<DateTime<Utc>>,
}

impl EventFilter {
    /// True when an event with these timestamps should be refreshed.
    /// Missing timestamps count as older than any horizon.
    pub fn admits(
        &self,
        updated_at: Option<DateTime<Utc>>,
        scheduled_at: Option<DateTime<Utc>>,
    ) -> bool {
        let Some(since) = self.changed_since else {
            return true;
        };
        let is_recent = |value: Option<DateTime<Utc>>| value.is_some_and(|value| value >= since);
        is_recent(updated_at) || is_recent(scheduled_at)
    }
}

#[async_trait]
pub trait RosterSource: Send + Sync {
    async fn list_people(&self) -> Result<Vec<RosterPerson>>;
    async fn list_service_types(&self) -> Result<Vec<ServiceType>>;
    async fn list_events(&self, filter: &EventFilter) -> Result<Vec<Event>>;
    async fn list_assignments(&self, event: &Event) -> Result<Vec<EventAssignment>>;
}

#[async_trait]
pub trait DirectorySource: Send + Sync {
    async fn list_accounts(&self) -> Result<Vec<DirectoryAccount>>;
}

/// Channel operations used by the lifecycle engine.
#[async_trait]
pub trait ChatPlatform: Send + Sync {
    /// Creates a channel and returns its platform id.
    async fn create_channel(&self, name: &str, private: bool) -> Result<String>;
    async fn set_topic(&self, channel_id: &str, topic: &str) -> Result<()>;
    async fn set_purpose(&self, channel_id: &str, purpose: &str) -> Result<()>;
    async fn invite_accounts(&self, channel_id: &str, account_ids: &[String]) -> Result<()>;
    async fn archive_channel(&self, channel_id: &str) -> Result<()>;
    async fn channel_exists_by_name(&self, name: &str) -> Result<bool>;
}
