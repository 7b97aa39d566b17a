use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use rota_core::{
    ChatPlatform, DirectoryAccount, DirectorySource, Event, EventAssignment, EventFilter,
    RosterPerson, RosterSource, ServiceType,
};

pub(crate) fn at(year: i32, month: u32, day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, hour, 0, 0)
        .single()
        .expect("valid timestamp")
}

pub(crate) fn person(id: u64, first: &str, last: &str) -> RosterPerson {
    RosterPerson {
        id,
        first_name: first.to_string(),
        last_name: last.to_string(),
    }
}

pub(crate) fn service_type(id: u64, name: &str) -> ServiceType {
    ServiceType {
        id,
        name: name.to_string(),
    }
}

pub(crate) fn event(id: u64, service_type_id: u64, starts_at: DateTime<Utc>) -> Event {
    Event {
        id,
        service_type_id,
        title: format!("Plan {id}"),
        series_title: String::new(),
        starts_at,
        ends_at: starts_at + Duration::hours(2),
        updated_at: Some(starts_at - Duration::days(7)),
    }
}

pub(crate) fn assignment(id: u64, event_id: u64, person_id: u64) -> EventAssignment {
    EventAssignment {
        id,
        event_id,
        person_id,
        role: "Vocals".to_string(),
        status: "C".to_string(),
    }
}

pub(crate) fn account(id: &str, first: &str, last: &str) -> DirectoryAccount {
    DirectoryAccount {
        id: id.to_string(),
        display_name: format!("{first}{last}").to_lowercase(),
        real_name: format!("{first} {last}"),
        first_name: first.to_string(),
        last_name: last.to_string(),
        ..DirectoryAccount::default()
    }
}

pub(crate) fn linked_account(id: &str, person_id: u64) -> DirectoryAccount {
    DirectoryAccount {
        id: id.to_string(),
        linked_roster_id: Some(person_id),
        match_distance: Some(0),
        ..DirectoryAccount::default()
    }
}

#[derive(Default)]
pub(crate) struct ScriptedRoster {
    pub(crate) people: Vec<RosterPerson>,
    pub(crate) service_types: Vec<ServiceType>,
    pub(crate) events: Vec<Event>,
    pub(crate) assignments: BTreeMap<u64, Vec<EventAssignment>>,
    pub(crate) fail_assignments_for: Option<u64>,
    pub(crate) filters: Mutex<Vec<EventFilter>>,
}

#[async_trait]
impl RosterSource for ScriptedRoster {
    async fn list_people(&self) -> Result<Vec<RosterPerson>> {
        Ok(self.people.clone())
    }

    async fn list_service_types(&self) -> Result<Vec<ServiceType>> {
        Ok(self.service_types.clone())
    }

    async fn list_events(&self, filter: &EventFilter) -> Result<Vec<Event>> {
        self.filters.lock().expect("filters").push(filter.clone());
        Ok(self
            .events
            .iter()
            .filter(|event| filter.service_type_ids.contains(&event.service_type_id))
            .filter(|event| filter.admits(event.updated_at, Some(event.starts_at)))
            .cloned()
            .collect())
    }

    async fn list_assignments(&self, event: &Event) -> Result<Vec<EventAssignment>> {
        if self.fail_assignments_for == Some(event.id) {
            bail!("roster unavailable while listing assignments for {}", event.id);
        }
        Ok(self.assignments.get(&event.id).cloned().unwrap_or_default())
    }
}

#[derive(Default)]
pub(crate) struct ScriptedDirectory {
    pub(crate) accounts: Vec<DirectoryAccount>,
    pub(crate) fail: bool,
}

#[async_trait]
impl DirectorySource for ScriptedDirectory {
    async fn list_accounts(&self) -> Result<Vec<DirectoryAccount>> {
        if self.fail {
            bail!("directory unavailable");
        }
        Ok(self.accounts.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum PlatformCall {
    Create { name: String, private: bool },
    Topic { channel_id: String, text: String },
    Purpose { channel_id: String, text: String },
    Invite { channel_id: String, account_ids: Vec<String> },
    Archive { channel_id: String },
}

/// Records every platform call. Operations listed in `failing` return errors.
#[derive(Default)]
pub(crate) struct FakeChatPlatform {
    pub(crate) calls: Mutex<Vec<PlatformCall>>,
    pub(crate) failing: Mutex<HashSet<&'static str>>,
    pub(crate) existing_names: Mutex<HashSet<String>>,
}

impl FakeChatPlatform {
    pub(crate) fn fail(&self, operation: &'static str) {
        self.failing.lock().expect("failing").insert(operation);
    }

    pub(crate) fn recover(&self, operation: &'static str) {
        self.failing.lock().expect("failing").remove(operation);
    }

    pub(crate) fn calls(&self) -> Vec<PlatformCall> {
        self.calls.lock().expect("calls").clone()
    }

    pub(crate) fn clear_calls(&self) {
        self.calls.lock().expect("calls").clear();
    }

    fn record(&self, operation: &'static str, call: PlatformCall) -> Result<()> {
        self.calls.lock().expect("calls").push(call);
        if self.failing.lock().expect("failing").contains(operation) {
            bail!("{operation} rejected by fake platform");
        }
        Ok(())
    }
}

#[async_trait]
impl ChatPlatform for FakeChatPlatform {
    async fn create_channel(&self, name: &str, private: bool) -> Result<String> {
        self.record(
            "create",
            PlatformCall::Create {
                name: name.to_string(),
                private,
            },
        )?;
        self.existing_names
            .lock()
            .expect("names")
            .insert(name.to_string());
        Ok(format!("C-{name}"))
    }

    async fn set_topic(&self, channel_id: &str, topic: &str) -> Result<()> {
        self.record(
            "topic",
            PlatformCall::Topic {
                channel_id: channel_id.to_string(),
                text: topic.to_string(),
            },
        )
    }

    async fn set_purpose(&self, channel_id: &str, purpose: &str) -> Result<()> {
        self.record(
            "purpose",
            PlatformCall::Purpose {
                channel_id: channel_id.to_string(),
                text: purpose.to_string(),
            },
        )
    }

    async fn invite_accounts(&self, channel_id: &str, account_ids: &[String]) -> Result<()> {
        self.record(
            "invite",
            PlatformCall::Invite {
                channel_id: channel_id.to_string(),
                account_ids: account_ids.to_vec(),
            },
        )
    }

    async fn archive_channel(&self, channel_id: &str) -> Result<()> {
        self.record(
            "archive",
            PlatformCall::Archive {
                channel_id: channel_id.to_string(),
            },
        )
    }

    async fn channel_exists_by_name(&self, name: &str) -> Result<bool> {
        if self.failing.lock().expect("failing").contains("lookup") {
            bail!("lookup rejected by fake platform");
        }
        Ok(self.existing_names.lock().expect("names").contains(name))
    }
}
