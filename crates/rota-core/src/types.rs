//! Records exchanged between the roster source, the chat directory, the store
//! and the channel lifecycle engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Participant record pulled from the scheduling service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RosterPerson {
    pub id: u64,
    pub first_name: String,
    pub last_name: String,
}

impl RosterPerson {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// Chat platform user record plus its identity link to a roster person.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryAccount {
    pub id: String,
    pub display_name: String,
    pub real_name: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default)]
    pub is_bot: bool,
    /// Roster person this account is linked to. `None` means unlinked.
    #[serde(default)]
    pub linked_roster_id: Option<u64>,
    /// Distance of the best roster candidate seen by the last match, linked or not.
    #[serde(default)]
    pub match_distance: Option<u32>,
}

impl DirectoryAccount {
    pub fn is_linked(&self) -> bool {
        self.linked_roster_id.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceType {
    pub id: u64,
    pub name: String,
}

/// One scheduled occurrence. `starts_at`/`ends_at` are the primary service time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub id: u64,
    pub service_type_id: u64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub series_title: String,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Edge between an event and a roster person, labelled with the team position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventAssignment {
    pub id: u64,
    pub event_id: u64,
    pub person_id: u64,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub status: String,
}

/// Chat channel dedicated to a single event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    pub id: String,
    pub name: String,
    pub description: String,
    pub event_id: u64,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    /// Accounts invited so far, in invitation order. Append-only.
    #[serde(default)]
    pub invited_account_ids: Vec<String>,
    #[serde(default)]
    pub archived: bool,
}

impl Channel {
    pub fn for_event(id: String, name: String, event: &Event, description: String) -> Self {
        Self {
            id,
            name,
            description,
            event_id: event.id,
            starts_at: event.starts_at,
            ends_at: event.ends_at,
            invited_account_ids: Vec::new(),
            archived: false,
        }
    }

    pub fn has_invited(&self, account_id: &str) -> bool {
        self.invited_account_ids
            .iter()
            .any(|invited| invited == account_id)
    }

    /// Appends newly invited accounts, ignoring ones already recorded.
    /// Returns the number of ids added.
    pub fn record_invited(&mut self, account_ids: &[String]) -> usize {
        let mut added = 0;
        for account_id in account_ids {
            if !self.has_invited(account_id) {
                self.invited_account_ids.push(account_id.clone());
                added += 1;
            }
        }
        added
    }

    /// Flips the archived flag. Returns false when the channel was already archived.
    pub fn mark_archived(&mut self) -> bool {
        if self.archived {
            return false;
        }
        self.archived = true;
        true
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::{Channel, Event};

    fn sample_event() -> Event {
        Event {
            id: 42,
            service_type_id: 7,
            title: "Easter".to_string(),
            series_title: String::new(),
            starts_at: Utc.with_ymd_and_hms(2024, 5, 5, 9, 0, 0).unwrap(),
            ends_at: Utc.with_ymd_and_hms(2024, 5, 5, 11, 0, 0).unwrap(),
            updated_at: None,
        }
    }

    #[test]
    fn unit_channel_for_event_copies_event_times() {
        let event = sample_event();
        let channel = Channel::for_event(
            "C1".to_string(),
            "2024-05-05".to_string(),
            &event,
            "Sunday - Easter".to_string(),
        );
        assert_eq!(channel.event_id, 42);
        assert_eq!(channel.starts_at, event.starts_at);
        assert_eq!(channel.ends_at, event.ends_at);
        assert!(channel.invited_account_ids.is_empty());
        assert!(!channel.archived);
    }

    #[test]
    fn unit_record_invited_only_appends_new_ids() {
        let mut channel = Channel::for_event(
            "C1".to_string(),
            "2024-05-05".to_string(),
            &sample_event(),
            String::new(),
        );
        assert_eq!(
            channel.record_invited(&["U1".to_string(), "U2".to_string()]),
            2
        );
        assert_eq!(
            channel.record_invited(&["U2".to_string(), "U3".to_string()]),
            1
        );
        assert_eq!(channel.invited_account_ids, vec!["U1", "U2", "U3"]);
    }

    #[test]
    fn regression_mark_archived_is_one_way() {
        let mut channel = Channel::for_event(
            "C1".to_string(),
            "2024-05-05".to_string(),
            &sample_event(),
            String::new(),
        );
        assert!(channel.mark_archived());
        assert!(!channel.mark_archived());
        assert!(channel.archived);
    }
}
