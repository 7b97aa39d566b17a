//! SQLite-backed `RotaStore` implementation with durable persistence.

use crate::{
    channel_by_start_then_id, check_channel_update, RotaStore, RotaStoreError, StoreResult,
};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use rota_core::{Channel, DirectoryAccount, Event, EventAssignment, RosterPerson, ServiceType};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::{Path, PathBuf};
use std::time::Duration;

const EVENT_COLUMNS: &str =
    "id, service_type_id, title, series_title, starts_at, ends_at, updated_at";
const ACCOUNT_COLUMNS: &str = "id, display_name, real_name, first_name, last_name, deleted, \
     is_bot, linked_roster_id, match_distance";
const CHANNEL_COLUMNS: &str =
    "id, name, description, event_id, starts_at, ends_at, invited_json, archived";

/// Persistent SQLite store used by the `rota` binary.
#[derive(Debug)]
pub struct SqliteRotaStore {
    db_path: PathBuf,
}

impl SqliteRotaStore {
    /// Opens (or creates) the database at `path` and ensures the schema exists.
    pub fn new(path: impl AsRef<Path>) -> StoreResult<Self> {
        let db_path = path.as_ref().to_path_buf();
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let store = Self { db_path };
        let connection = store.open_connection()?;
        store.initialize_schema(&connection)?;
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }

    fn open_connection(&self) -> StoreResult<Connection> {
        let connection = Connection::open(&self.db_path)?;
        connection.busy_timeout(Duration::from_secs(5))?;
        connection.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            "#,
        )?;
        Ok(connection)
    }

    fn initialize_schema(&self, connection: &Connection) -> StoreResult<()> {
        connection.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS roster_people (
                id INTEGER PRIMARY KEY,
                first_name TEXT NOT NULL,
                last_name TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS service_types (
                id INTEGER PRIMARY KEY,
                name TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS events (
                id INTEGER PRIMARY KEY,
                service_type_id INTEGER NOT NULL,
                title TEXT NOT NULL,
                series_title TEXT NOT NULL,
                starts_at TEXT NOT NULL,
                ends_at TEXT NOT NULL,
                updated_at TEXT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_events_starts_at ON events (starts_at, id);

            CREATE TABLE IF NOT EXISTS event_assignments (
                id INTEGER PRIMARY KEY,
                event_id INTEGER NOT NULL,
                person_id INTEGER NOT NULL,
                role TEXT NOT NULL,
                status TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_event_assignments_event
                ON event_assignments (event_id, id);

            CREATE TABLE IF NOT EXISTS directory_accounts (
                id TEXT PRIMARY KEY,
                display_name TEXT NOT NULL,
                real_name TEXT NOT NULL,
                first_name TEXT NOT NULL,
                last_name TEXT NOT NULL,
                deleted INTEGER NOT NULL,
                is_bot INTEGER NOT NULL,
                linked_roster_id INTEGER NULL,
                match_distance INTEGER NULL
            );

            CREATE INDEX IF NOT EXISTS idx_directory_accounts_link
                ON directory_accounts (linked_roster_id, id);

            CREATE TABLE IF NOT EXISTS channels (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL UNIQUE,
                description TEXT NOT NULL,
                event_id INTEGER NOT NULL UNIQUE,
                starts_at TEXT NOT NULL,
                ends_at TEXT NOT NULL,
                invited_json TEXT NOT NULL,
                archived INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_channels_archival ON channels (archived, starts_at);
            "#,
        )?;
        Ok(())
    }
}

#[async_trait]
impl RotaStore for SqliteRotaStore {
    async fn upsert_people(&self, people: &[RosterPerson]) -> StoreResult<()> {
        let mut connection = self.open_connection()?;
        let transaction = connection.transaction()?;
        for person in people {
            transaction.execute(
                r#"
                INSERT INTO roster_people (id, first_name, last_name) VALUES (?1, ?2, ?3)
                ON CONFLICT(id) DO UPDATE SET
                    first_name = excluded.first_name,
                    last_name = excluded.last_name
                "#,
                params![
                    u64_to_i64("roster_people.id", person.id)?,
                    person.first_name,
                    person.last_name
                ],
            )?;
        }
        transaction.commit()?;
        Ok(())
    }

    async fn list_people(&self) -> StoreResult<Vec<RosterPerson>> {
        let connection = self.open_connection()?;
        let mut statement = connection
            .prepare("SELECT id, first_name, last_name FROM roster_people ORDER BY id ASC")?;
        let rows = statement.query_map([], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;
        let mut people = Vec::new();
        for row in rows {
            let (id, first_name, last_name) = row?;
            people.push(RosterPerson {
                id: i64_to_u64("roster_people.id", id)?,
                first_name,
                last_name,
            });
        }
        Ok(people)
    }

    async fn upsert_service_types(&self, service_types: &[ServiceType]) -> StoreResult<()> {
        let mut connection = self.open_connection()?;
        let transaction = connection.transaction()?;
        for service_type in service_types {
            transaction.execute(
                r#"
                INSERT INTO service_types (id, name) VALUES (?1, ?2)
                ON CONFLICT(id) DO UPDATE SET name = excluded.name
                "#,
                params![
                    u64_to_i64("service_types.id", service_type.id)?,
                    service_type.name
                ],
            )?;
        }
        transaction.commit()?;
        Ok(())
    }

    async fn get_service_type(&self, id: u64) -> StoreResult<Option<ServiceType>> {
        let connection = self.open_connection()?;
        let name = connection
            .query_row(
                "SELECT name FROM service_types WHERE id = ?1",
                params![u64_to_i64("service_types.id", id)?],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(name.map(|name| ServiceType { id, name }))
    }

    async fn upsert_events(&self, events: &[Event]) -> StoreResult<()> {
        let mut connection = self.open_connection()?;
        let transaction = connection.transaction()?;
        for event in events {
            transaction.execute(
                r#"
                INSERT INTO events (
                    id, service_type_id, title, series_title, starts_at, ends_at, updated_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                ON CONFLICT(id) DO UPDATE SET
                    service_type_id = excluded.service_type_id,
                    title = excluded.title,
                    series_title = excluded.series_title,
                    starts_at = excluded.starts_at,
                    ends_at = excluded.ends_at,
                    updated_at = excluded.updated_at
                "#,
                params![
                    u64_to_i64("events.id", event.id)?,
                    u64_to_i64("events.service_type_id", event.service_type_id)?,
                    event.title,
                    event.series_title,
                    timestamp_to_db(event.starts_at),
                    timestamp_to_db(event.ends_at),
                    option_timestamp_to_db(event.updated_at),
                ],
            )?;
        }
        transaction.commit()?;
        Ok(())
    }

    async fn get_event(&self, id: u64) -> StoreResult<Option<Event>> {
        let connection = self.open_connection()?;
        let row = connection
            .query_row(
                &format!("SELECT {EVENT_COLUMNS} FROM events WHERE id = ?1"),
                params![u64_to_i64("events.id", id)?],
                EventRow::from_row,
            )
            .optional()?;
        row.map(EventRow::into_event).transpose()
    }

    async fn list_events_starting_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> StoreResult<Vec<Event>> {
        let connection = self.open_connection()?;
        let mut statement = connection.prepare(&format!(
            "SELECT {EVENT_COLUMNS} FROM events WHERE starts_at >= ?1 AND starts_at < ?2 \
             ORDER BY starts_at ASC, id ASC"
        ))?;
        let rows = statement.query_map(
            params![timestamp_to_db(start), timestamp_to_db(end)],
            EventRow::from_row,
        )?;
        let mut events = Vec::new();
        for row in rows {
            events.push(row?.into_event()?);
        }
        Ok(events)
    }

    async fn has_event_starting_since(&self, since: DateTime<Utc>) -> StoreResult<bool> {
        let connection = self.open_connection()?;
        let found = connection
            .query_row(
                "SELECT 1 FROM events WHERE starts_at >= ?1 LIMIT 1",
                params![timestamp_to_db(since)],
                |row| row.get::<_, i64>(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    async fn replace_event_assignments(
        &self,
        event_id: u64,
        assignments: &[EventAssignment],
    ) -> StoreResult<()> {
        let event_key = u64_to_i64("event_assignments.event_id", event_id)?;
        let mut connection = self.open_connection()?;
        let transaction = connection.transaction()?;
        transaction.execute(
            "DELETE FROM event_assignments WHERE event_id = ?1",
            params![event_key],
        )?;
        for assignment in assignments {
            transaction.execute(
                r#"
                INSERT INTO event_assignments (id, event_id, person_id, role, status)
                VALUES (?1, ?2, ?3, ?4, ?5)
                ON CONFLICT(id) DO UPDATE SET
                    event_id = excluded.event_id,
                    person_id = excluded.person_id,
                    role = excluded.role,
                    status = excluded.status
                "#,
                params![
                    u64_to_i64("event_assignments.id", assignment.id)?,
                    event_key,
                    u64_to_i64("event_assignments.person_id", assignment.person_id)?,
                    assignment.role,
                    assignment.status,
                ],
            )?;
        }
        transaction.commit()?;
        Ok(())
    }

    async fn list_event_assignments(&self, event_id: u64) -> StoreResult<Vec<EventAssignment>> {
        let connection = self.open_connection()?;
        let mut statement = connection.prepare(
            "SELECT id, person_id, role, status FROM event_assignments \
             WHERE event_id = ?1 ORDER BY id ASC",
        )?;
        let rows = statement.query_map(
            params![u64_to_i64("event_assignments.event_id", event_id)?],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                ))
            },
        )?;
        let mut assignments = Vec::new();
        for row in rows {
            let (id, person_id, role, status) = row?;
            assignments.push(EventAssignment {
                id: i64_to_u64("event_assignments.id", id)?,
                event_id,
                person_id: i64_to_u64("event_assignments.person_id", person_id)?,
                role,
                status,
            });
        }
        Ok(assignments)
    }

    async fn upsert_accounts(&self, accounts: &[DirectoryAccount]) -> StoreResult<()> {
        let mut connection = self.open_connection()?;
        let transaction = connection.transaction()?;
        for account in accounts {
            transaction.execute(
                r#"
                INSERT INTO directory_accounts (
                    id, display_name, real_name, first_name, last_name, deleted, is_bot,
                    linked_roster_id, match_distance
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                ON CONFLICT(id) DO UPDATE SET
                    display_name = excluded.display_name,
                    real_name = excluded.real_name,
                    first_name = excluded.first_name,
                    last_name = excluded.last_name,
                    deleted = excluded.deleted,
                    is_bot = excluded.is_bot,
                    linked_roster_id = excluded.linked_roster_id,
                    match_distance = excluded.match_distance
                "#,
                params![
                    account.id,
                    account.display_name,
                    account.real_name,
                    account.first_name,
                    account.last_name,
                    account.deleted,
                    account.is_bot,
                    account
                        .linked_roster_id
                        .map(|id| u64_to_i64("directory_accounts.linked_roster_id", id))
                        .transpose()?,
                    account.match_distance.map(i64::from),
                ],
            )?;
        }
        transaction.commit()?;
        Ok(())
    }

    async fn list_accounts(&self) -> StoreResult<Vec<DirectoryAccount>> {
        let connection = self.open_connection()?;
        let mut statement = connection.prepare(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM directory_accounts ORDER BY id ASC"
        ))?;
        let rows = statement.query_map([], AccountRow::from_row)?;
        let mut accounts = Vec::new();
        for row in rows {
            accounts.push(row?.into_account()?);
        }
        Ok(accounts)
    }

    async fn find_account_for_person(
        &self,
        person_id: u64,
    ) -> StoreResult<Option<DirectoryAccount>> {
        let connection = self.open_connection()?;
        let row = connection
            .query_row(
                &format!(
                    "SELECT {ACCOUNT_COLUMNS} FROM directory_accounts \
                     WHERE linked_roster_id = ?1 AND deleted = 0 ORDER BY id ASC LIMIT 1"
                ),
                params![u64_to_i64("directory_accounts.linked_roster_id", person_id)?],
                AccountRow::from_row,
            )
            .optional()?;
        row.map(AccountRow::into_account).transpose()
    }

    async fn get_channel_for_event(&self, event_id: u64) -> StoreResult<Option<Channel>> {
        let connection = self.open_connection()?;
        let row = connection
            .query_row(
                &format!("SELECT {CHANNEL_COLUMNS} FROM channels WHERE event_id = ?1"),
                params![u64_to_i64("channels.event_id", event_id)?],
                ChannelRow::from_row,
            )
            .optional()?;
        row.map(ChannelRow::into_channel).transpose()
    }

    async fn channel_name_exists(&self, name: &str) -> StoreResult<bool> {
        let connection = self.open_connection()?;
        let found = connection
            .query_row(
                "SELECT 1 FROM channels WHERE name = ?1",
                params![name],
                |row| row.get::<_, i64>(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    async fn insert_channel(&self, channel: &Channel) -> StoreResult<()> {
        let mut connection = self.open_connection()?;
        let transaction = connection.transaction()?;
        let event_key = u64_to_i64("channels.event_id", channel.event_id)?;

        let conflict = transaction
            .query_row(
                "SELECT id, name, event_id FROM channels WHERE id = ?1 OR name = ?2 OR event_id = ?3 LIMIT 1",
                params![channel.id, channel.name, event_key],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, i64>(2)?,
                    ))
                },
            )
            .optional()?;
        if let Some((id, name, event_id)) = conflict {
            return Err(if id == channel.id {
                RotaStoreError::DuplicateChannelId(id)
            } else if event_id == event_key {
                RotaStoreError::DuplicateChannelEvent(channel.event_id)
            } else {
                RotaStoreError::DuplicateChannelName(name)
            });
        }

        transaction.execute(
            &format!(
                "INSERT INTO channels ({CHANNEL_COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"
            ),
            params![
                channel.id,
                channel.name,
                channel.description,
                event_key,
                timestamp_to_db(channel.starts_at),
                timestamp_to_db(channel.ends_at),
                serde_json::to_string(&channel.invited_account_ids)?,
                channel.archived,
            ],
        )?;
        transaction.commit()?;
        Ok(())
    }

    async fn update_channel(&self, channel: &Channel) -> StoreResult<()> {
        let mut connection = self.open_connection()?;
        let transaction = connection.transaction()?;
        let existing = transaction
            .query_row(
                &format!("SELECT {CHANNEL_COLUMNS} FROM channels WHERE id = ?1"),
                params![channel.id],
                ChannelRow::from_row,
            )
            .optional()?
            .map(ChannelRow::into_channel)
            .transpose()?
            .ok_or_else(|| RotaStoreError::ChannelNotFound(channel.id.clone()))?;
        check_channel_update(&existing, channel)?;

        transaction.execute(
            r#"
            UPDATE channels SET
                description = ?2,
                starts_at = ?3,
                ends_at = ?4,
                invited_json = ?5,
                archived = ?6
            WHERE id = ?1
            "#,
            params![
                channel.id,
                channel.description,
                timestamp_to_db(channel.starts_at),
                timestamp_to_db(channel.ends_at),
                serde_json::to_string(&channel.invited_account_ids)?,
                channel.archived,
            ],
        )?;
        transaction.commit()?;
        Ok(())
    }

    async fn list_channels_started_before(
        &self,
        before: DateTime<Utc>,
    ) -> StoreResult<Vec<Channel>> {
        let connection = self.open_connection()?;
        let mut statement = connection.prepare(&format!(
            "SELECT {CHANNEL_COLUMNS} FROM channels WHERE archived = 0 AND starts_at < ?1 \
             ORDER BY starts_at ASC, id ASC"
        ))?;
        let rows = statement.query_map(params![timestamp_to_db(before)], ChannelRow::from_row)?;
        let mut channels = Vec::new();
        for row in rows {
            channels.push(row?.into_channel()?);
        }
        Ok(channels)
    }

    async fn list_channels(&self, include_archived: bool) -> StoreResult<Vec<Channel>> {
        let connection = self.open_connection()?;
        let mut statement = connection.prepare(&format!(
            "SELECT {CHANNEL_COLUMNS} FROM channels WHERE (?1 OR archived = 0)"
        ))?;
        let rows = statement.query_map(params![include_archived], ChannelRow::from_row)?;
        let mut channels = Vec::new();
        for row in rows {
            channels.push(row?.into_channel()?);
        }
        channels.sort_by(channel_by_start_then_id);
        Ok(channels)
    }
}

struct EventRow {
    id: i64,
    service_type_id: i64,
    title: String,
    series_title: String,
    starts_at: String,
    ends_at: String,
    updated_at: Option<String>,
}

impl EventRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            service_type_id: row.get(1)?,
            title: row.get(2)?,
            series_title: row.get(3)?,
            starts_at: row.get(4)?,
            ends_at: row.get(5)?,
            updated_at: row.get(6)?,
        })
    }

    fn into_event(self) -> StoreResult<Event> {
        Ok(Event {
            id: i64_to_u64("events.id", self.id)?,
            service_type_id: i64_to_u64("events.service_type_id", self.service_type_id)?,
            title: self.title,
            series_title: self.series_title,
            starts_at: timestamp_from_db(&self.starts_at)?,
            ends_at: timestamp_from_db(&self.ends_at)?,
            updated_at: option_timestamp_from_db(self.updated_at)?,
        })
    }
}

struct AccountRow {
    id: String,
    display_name: String,
    real_name: String,
    first_name: String,
    last_name: String,
    deleted: bool,
    is_bot: bool,
    linked_roster_id: Option<i64>,
    match_distance: Option<i64>,
}

impl AccountRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            display_name: row.get(1)?,
            real_name: row.get(2)?,
            first_name: row.get(3)?,
            last_name: row.get(4)?,
            deleted: row.get(5)?,
            is_bot: row.get(6)?,
            linked_roster_id: row.get(7)?,
            match_distance: row.get(8)?,
        })
    }

    fn into_account(self) -> StoreResult<DirectoryAccount> {
        Ok(DirectoryAccount {
            id: self.id,
            display_name: self.display_name,
            real_name: self.real_name,
            first_name: self.first_name,
            last_name: self.last_name,
            deleted: self.deleted,
            is_bot: self.is_bot,
            linked_roster_id: self
                .linked_roster_id
                .map(|id| i64_to_u64("directory_accounts.linked_roster_id", id))
                .transpose()?,
            match_distance: self
                .match_distance
                .map(|distance| i64_to_u32("directory_accounts.match_distance", distance))
                .transpose()?,
        })
    }
}

struct ChannelRow {
    id: String,
    name: String,
    description: String,
    event_id: i64,
    starts_at: String,
    ends_at: String,
    invited_json: String,
    archived: bool,
}

impl ChannelRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            description: row.get(2)?,
            event_id: row.get(3)?,
            starts_at: row.get(4)?,
            ends_at: row.get(5)?,
            invited_json: row.get(6)?,
            archived: row.get(7)?,
        })
    }

    fn into_channel(self) -> StoreResult<Channel> {
        Ok(Channel {
            id: self.id,
            name: self.name,
            description: self.description,
            event_id: i64_to_u64("channels.event_id", self.event_id)?,
            starts_at: timestamp_from_db(&self.starts_at)?,
            ends_at: timestamp_from_db(&self.ends_at)?,
            invited_account_ids: serde_json::from_str(&self.invited_json)?,
            archived: self.archived,
        })
    }
}

// Fixed-width UTC text keeps lexicographic order equal to time order.
fn timestamp_to_db(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn option_timestamp_to_db(value: Option<DateTime<Utc>>) -> Option<String> {
    value.map(timestamp_to_db)
}

fn timestamp_from_db(value: &str) -> StoreResult<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(value)?.with_timezone(&Utc))
}

fn option_timestamp_from_db(value: Option<String>) -> StoreResult<Option<DateTime<Utc>>> {
    value.as_deref().map(timestamp_from_db).transpose()
}

fn u64_to_i64(field: &'static str, value: u64) -> StoreResult<i64> {
    i64::try_from(value).map_err(|_| RotaStoreError::InvalidPersistedValue {
        field,
        value: value.to_string(),
    })
}

fn i64_to_u64(field: &'static str, value: i64) -> StoreResult<u64> {
    u64::try_from(value).map_err(|_| RotaStoreError::InvalidPersistedValue {
        field,
        value: value.to_string(),
    })
}

fn i64_to_u32(field: &'static str, value: i64) -> StoreResult<u32> {
    u32::try_from(value).map_err(|_| RotaStoreError::InvalidPersistedValue {
        field,
        value: value.to_string(),
    })
}
