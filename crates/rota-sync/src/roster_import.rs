//! Pulls people, service types, events and assignments from the roster source into the store.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use rota_core::{EventAssignment, EventFilter, RosterSource};
use rota_store::RotaStore;
use serde::Serialize;

/// When an event starting within this many days back is already stored, the
/// import switches to incremental mode.
pub const INCREMENTAL_PROBE_DAYS: i64 = 14;
/// Incremental imports only refresh events updated or scheduled within this many days.
pub const INCREMENTAL_REFRESH_DAYS: i64 = 30;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RosterImportConfig {
    /// Service types to import events for. Empty imports every service type.
    pub service_type_ids: Vec<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RosterImportReport {
    pub incremental: bool,
    pub people: usize,
    pub service_types: usize,
    pub events: usize,
    pub assignments: usize,
}

/// Imports the roster. Every fetch completes before anything is written, so a
/// fetch failure leaves the store untouched.
#[tracing::instrument(name = "rota_sync.roster_import", skip_all, fields(now = %now))]
pub async fn import_roster(
    source: &dyn RosterSource,
    store: &dyn RotaStore,
    config: &RosterImportConfig,
    now: DateTime<Utc>,
) -> Result<RosterImportReport> {
    let changed_since = incremental_horizon(store, now).await?;
    let incremental = changed_since.is_some();

    let people = source
        .list_people()
        .await
        .context("failed to list roster people")?;
    let service_types = source
        .list_service_types()
        .await
        .context("failed to list roster service types")?;

    let service_type_ids = if config.service_type_ids.is_empty() {
        service_types.iter().map(|service_type| service_type.id).collect()
    } else {
        config.service_type_ids.clone()
    };
    let filter = EventFilter {
        service_type_ids,
        changed_since,
    };
    let events = source
        .list_events(&filter)
        .await
        .context("failed to list roster events")?;

    let mut assignments: Vec<(u64, Vec<EventAssignment>)> = Vec::with_capacity(events.len());
    for event in &events {
        let event_assignments = source
            .list_assignments(event)
            .await
            .with_context(|| format!("failed to list assignments for event {}", event.id))?;
        assignments.push((event.id, event_assignments));
    }

    store.upsert_people(&people).await?;
    store.upsert_service_types(&service_types).await?;
    store.upsert_events(&events).await?;
    let mut assignment_count = 0_usize;
    for (event_id, event_assignments) in &assignments {
        store
            .replace_event_assignments(*event_id, event_assignments)
            .await?;
        assignment_count = assignment_count.saturating_add(event_assignments.len());
    }

    let report = RosterImportReport {
        incremental,
        people: people.len(),
        service_types: service_types.len(),
        events: events.len(),
        assignments: assignment_count,
    };
    tracing::info!(
        incremental = report.incremental,
        people = report.people,
        service_types = report.service_types,
        events = report.events,
        assignments = report.assignments,
        "imported roster"
    );
    Ok(report)
}

async fn incremental_horizon(
    store: &dyn RotaStore,
    now: DateTime<Utc>,
) -> Result<Option<DateTime<Utc>>> {
    let probe_from = now - Duration::days(INCREMENTAL_PROBE_DAYS);
    if store.has_event_starting_since(probe_from).await? {
        Ok(Some(now - Duration::days(INCREMENTAL_REFRESH_DAYS)))
    } else {
        Ok(None)
    }
}
