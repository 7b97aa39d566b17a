//! Drives each due event's channel through create, refresh, invite and archive.
//!
//! Every event in the window is handled in start order. Platform failures on
//! optional steps are logged and counted; store failures abort the run.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use rota_core::{
    allocate_channel_name, base_channel_name, compose_channel_topic, invitee_delta, Channel,
    ChannelNameLookup, ChatPlatform, Event, EventAssignment, SyncWindow, MAX_CHANNEL_NAME_PROBES,
};
use rota_store::RotaStore;
use serde::Serialize;

/// Delay between creating a channel and setting its topic, so the platform
/// has registered the new channel.
pub const DEFAULT_PROPAGATION_DELAY_SECONDS: u64 = 120;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelLifecycleConfig {
    /// Accounts invited to every channel ahead of the assignees.
    pub sticky_account_ids: Vec<String>,
    pub propagation_delay: Duration,
    pub private_channels: bool,
    pub max_name_probes: u32,
}

impl Default for ChannelLifecycleConfig {
    fn default() -> Self {
        Self {
            sticky_account_ids: Vec::new(),
            propagation_delay: Duration::from_secs(DEFAULT_PROPAGATION_DELAY_SECONDS),
            private_channels: true,
            max_name_probes: MAX_CHANNEL_NAME_PROBES,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LifecycleReport {
    pub events_in_window: usize,
    pub channels_created: usize,
    pub descriptions_updated: usize,
    pub accounts_invited: usize,
    pub channels_archived: usize,
    pub skipped_missing_service_type: usize,
    pub skipped_unassigned: usize,
    pub skipped_archived: usize,
    pub skipped_name_allocation: usize,
    pub skipped_create_failed: usize,
    pub skipped_orphaned: usize,
    pub topic_failures: usize,
    pub invite_failures: usize,
    pub archive_failures: usize,
}

/// A name is taken when the store ever recorded it or the platform already has it.
struct ExistingChannelNames<'a> {
    store: &'a dyn RotaStore,
    platform: &'a dyn ChatPlatform,
}

#[async_trait]
impl ChannelNameLookup for ExistingChannelNames<'_> {
    async fn is_channel_name_taken(&self, name: &str) -> Result<bool> {
        if self.store.channel_name_exists(name).await? {
            return Ok(true);
        }
        self.platform.channel_exists_by_name(name).await
    }
}

pub struct ChannelLifecycleEngine {
    store: Arc<dyn RotaStore>,
    platform: Arc<dyn ChatPlatform>,
    config: ChannelLifecycleConfig,
}

impl ChannelLifecycleEngine {
    pub fn new(
        store: Arc<dyn RotaStore>,
        platform: Arc<dyn ChatPlatform>,
        config: ChannelLifecycleConfig,
    ) -> Self {
        Self {
            store,
            platform,
            config,
        }
    }

    #[tracing::instrument(
        name = "rota_sync.channel_lifecycle",
        skip_all,
        fields(window_start = %window.start, window_end = %window.end)
    )]
    pub async fn run(&self, window: &SyncWindow) -> Result<LifecycleReport> {
        let mut report = LifecycleReport::default();
        let events = self
            .store
            .list_events_starting_between(window.start, window.end)
            .await?;
        report.events_in_window = events.len();
        if events.is_empty() {
            tracing::info!("no events in window");
        }
        for event in &events {
            self.sync_event(event, &mut report).await?;
        }
        self.archive_passed_channels(window, &mut report).await?;

        tracing::info!(
            events = report.events_in_window,
            created = report.channels_created,
            updated = report.descriptions_updated,
            invited = report.accounts_invited,
            archived = report.channels_archived,
            "channel lifecycle pass complete"
        );
        Ok(report)
    }

    async fn sync_event(&self, event: &Event, report: &mut LifecycleReport) -> Result<()> {
        let Some(service_type) = self.store.get_service_type(event.service_type_id).await? else {
            tracing::warn!(
                event_id = event.id,
                service_type_id = event.service_type_id,
                "unknown service type; skipping event"
            );
            report.skipped_missing_service_type += 1;
            return Ok(());
        };
        let assignments = self.store.list_event_assignments(event.id).await?;
        if assignments.is_empty() {
            tracing::info!(event_id = event.id, "no one assigned; skipping event");
            report.skipped_unassigned += 1;
            return Ok(());
        }

        let topic = compose_channel_topic(&service_type.name, &event.series_title, &event.title);
        let mut channel = match self.store.get_channel_for_event(event.id).await? {
            Some(channel) if channel.archived => {
                tracing::debug!(
                    event_id = event.id,
                    channel_id = %channel.id,
                    "channel already archived; leaving untouched"
                );
                report.skipped_archived += 1;
                return Ok(());
            }
            Some(mut channel) => {
                self.refresh_description(&mut channel, &topic, report).await?;
                channel
            }
            None => match self.open_channel(event, &topic, report).await? {
                Some(channel) => channel,
                None => return Ok(()),
            },
        };
        self.invite_new_members(&mut channel, &assignments, report)
            .await
    }

    async fn open_channel(
        &self,
        event: &Event,
        topic: &str,
        report: &mut LifecycleReport,
    ) -> Result<Option<Channel>> {
        let lookup = ExistingChannelNames {
            store: self.store.as_ref(),
            platform: self.platform.as_ref(),
        };
        let base = base_channel_name(event.starts_at);
        let name = match allocate_channel_name(&base, &lookup, self.config.max_name_probes).await
        {
            Ok(name) => name,
            Err(error) => {
                tracing::warn!(event_id = event.id, %error, "channel name allocation failed");
                report.skipped_name_allocation += 1;
                return Ok(None);
            }
        };

        let channel_id = match self
            .platform
            .create_channel(&name, self.config.private_channels)
            .await
        {
            Ok(channel_id) => channel_id,
            Err(error) => {
                tracing::warn!(
                    event_id = event.id,
                    channel_name = %name,
                    error = %format!("{error:#}"),
                    "channel creation failed"
                );
                report.skipped_create_failed += 1;
                return Ok(None);
            }
        };
        tracing::info!(event_id = event.id, channel_id = %channel_id, channel_name = %name, "created channel");
        report.channels_created += 1;

        // Left empty when the description did not stick, so the refresh path retries it.
        let mut description = String::new();
        if !topic.is_empty() {
            if !self.config.propagation_delay.is_zero() {
                tokio::time::sleep(self.config.propagation_delay).await;
            }
            if self.apply_description(&channel_id, topic).await {
                description = topic.to_string();
            } else {
                report.topic_failures += 1;
            }
        }

        let channel = Channel::for_event(channel_id, name, event, description);
        self.store.insert_channel(&channel).await?;
        Ok(Some(channel))
    }

    async fn refresh_description(
        &self,
        channel: &mut Channel,
        topic: &str,
        report: &mut LifecycleReport,
    ) -> Result<()> {
        if channel.description == topic {
            return Ok(());
        }
        if !self.apply_description(&channel.id, topic).await {
            // Stored description stays stale so the next run retries.
            report.topic_failures += 1;
            return Ok(());
        }
        channel.description = topic.to_string();
        self.store.update_channel(channel).await?;
        report.descriptions_updated += 1;
        tracing::info!(channel_id = %channel.id, topic, "updated channel description");
        Ok(())
    }

    /// Sets both topic and purpose. Returns true only when both succeeded.
    async fn apply_description(&self, channel_id: &str, topic: &str) -> bool {
        let mut applied = true;
        if let Err(error) = self.platform.set_topic(channel_id, topic).await {
            tracing::warn!(channel_id, error = %format!("{error:#}"), "failed to set channel topic");
            applied = false;
        }
        if let Err(error) = self.platform.set_purpose(channel_id, topic).await {
            tracing::warn!(channel_id, error = %format!("{error:#}"), "failed to set channel purpose");
            applied = false;
        }
        applied
    }

    async fn invite_new_members(
        &self,
        channel: &mut Channel,
        assignments: &[EventAssignment],
        report: &mut LifecycleReport,
    ) -> Result<()> {
        let mut assignee_account_ids = Vec::with_capacity(assignments.len());
        for assignment in assignments {
            match self.store.find_account_for_person(assignment.person_id).await? {
                Some(account) => assignee_account_ids.push(account.id),
                None => tracing::debug!(
                    person_id = assignment.person_id,
                    "assignee has no linked account"
                ),
            }
        }
        let delta = invitee_delta(
            &channel.invited_account_ids,
            &self.config.sticky_account_ids,
            &assignee_account_ids,
        );
        if delta.is_empty() {
            return Ok(());
        }

        match self.platform.invite_accounts(&channel.id, &delta).await {
            Ok(()) => {
                let added = channel.record_invited(&delta);
                self.store.update_channel(channel).await?;
                report.accounts_invited += added;
                tracing::info!(channel_id = %channel.id, invited = added, "invited accounts");
            }
            Err(error) => {
                tracing::warn!(
                    channel_id = %channel.id,
                    pending = delta.len(),
                    error = %format!("{error:#}"),
                    "failed to invite accounts"
                );
                report.invite_failures += 1;
            }
        }
        Ok(())
    }

    async fn archive_passed_channels(
        &self,
        window: &SyncWindow,
        report: &mut LifecycleReport,
    ) -> Result<()> {
        let channels = self.store.list_channels_started_before(window.start).await?;
        for mut channel in channels {
            if self.store.get_event(channel.event_id).await?.is_none() {
                tracing::warn!(
                    channel_id = %channel.id,
                    event_id = channel.event_id,
                    "channel has no stored event; leaving it alone"
                );
                report.skipped_orphaned += 1;
                continue;
            }
            if let Err(error) = self.platform.archive_channel(&channel.id).await {
                tracing::warn!(
                    channel_id = %channel.id,
                    error = %format!("{error:#}"),
                    "failed to archive channel; marking archived locally"
                );
                report.archive_failures += 1;
            }
            if channel.mark_archived() {
                self.store.update_channel(&channel).await?;
                report.channels_archived += 1;
                tracing::info!(channel_id = %channel.id, channel_name = %channel.name, "archived channel");
            }
        }
        Ok(())
    }
}
