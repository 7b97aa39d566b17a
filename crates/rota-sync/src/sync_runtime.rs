//! Wires importers, window computation and the lifecycle engine into one run.

use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use rota_core::{
    AnchorWeekday, ChatPlatform, DirectorySource, IdentityMatcher, RosterSource, SyncWindow,
};
use rota_store::RotaStore;
use serde::Serialize;

use crate::channel_lifecycle::{ChannelLifecycleConfig, ChannelLifecycleEngine, LifecycleReport};
use crate::directory_import::{import_directory, DirectoryImportReport};
use crate::roster_import::{import_roster, RosterImportConfig, RosterImportReport};

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub roster: RosterImportConfig,
    pub lookahead: Duration,
    pub anchor: Option<AnchorWeekday>,
    pub matcher: IdentityMatcher,
    pub lifecycle: ChannelLifecycleConfig,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            roster: RosterImportConfig::default(),
            lookahead: Duration::hours(192),
            anchor: None,
            matcher: IdentityMatcher::default(),
            lifecycle: ChannelLifecycleConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncRunReport {
    pub started_at: DateTime<Utc>,
    pub roster: RosterImportReport,
    pub directory: DirectoryImportReport,
    pub window: SyncWindow,
    pub lifecycle: LifecycleReport,
}

pub struct SyncRuntime {
    roster: Arc<dyn RosterSource>,
    directory: Arc<dyn DirectorySource>,
    store: Arc<dyn RotaStore>,
    config: SyncConfig,
    lifecycle: ChannelLifecycleEngine,
}

impl SyncRuntime {
    pub fn new(
        roster: Arc<dyn RosterSource>,
        directory: Arc<dyn DirectorySource>,
        platform: Arc<dyn ChatPlatform>,
        store: Arc<dyn RotaStore>,
        config: SyncConfig,
    ) -> Self {
        let lifecycle =
            ChannelLifecycleEngine::new(store.clone(), platform, config.lifecycle.clone());
        Self {
            roster,
            directory,
            store,
            config,
            lifecycle,
        }
    }

    /// Performs one full synchronization pass as of `now`.
    #[tracing::instrument(name = "rota_sync.run_once", skip_all, fields(now = %now))]
    pub async fn run_once(&self, now: DateTime<Utc>) -> Result<SyncRunReport> {
        let roster = import_roster(
            self.roster.as_ref(),
            self.store.as_ref(),
            &self.config.roster,
            now,
        )
        .await?;
        let directory = import_directory(
            self.directory.as_ref(),
            self.store.as_ref(),
            &self.config.matcher,
        )
        .await?;

        let window = SyncWindow::compute(now, self.config.lookahead, self.config.anchor);
        tracing::info!(start = %window.start, end = %window.end, "computed sync window");
        let lifecycle = self.lifecycle.run(&window).await?;

        Ok(SyncRunReport {
            started_at: now,
            roster,
            directory,
            window,
            lifecycle,
        })
    }
}
