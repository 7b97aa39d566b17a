use std::io::Write;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use rota_core::Channel;
use rota_planning_center::PlanningCenterClient;
use rota_slack::SlackApiClient;
use rota_store::{RotaStore, SqliteRotaStore};
use rota_sync::SyncRuntime;

use crate::cli::{Cli, Command};
use crate::config::{load_config, RotaConfig};

pub(crate) async fn run_cli(cli: Cli) -> Result<()> {
    let (path, config) = load_config(cli.config.as_deref())?;
    tracing::info!(config = %path.display(), "using config file");
    match cli.command {
        Command::Sync => run_sync(&config).await,
        Command::Channels { all } => list_channels(&config, all).await,
    }
}

async fn run_sync(config: &RotaConfig) -> Result<()> {
    config.validate()?;
    let sync_config = config.sync_config()?;

    let store = open_store(config)?;
    let roster = PlanningCenterClient::new(config.planning_center_client_config())
        .context("failed to build planning center client")?;
    let slack = Arc::new(
        SlackApiClient::new(config.slack_client_config())
            .context("failed to build slack client")?,
    );
    let runtime = SyncRuntime::new(
        Arc::new(roster),
        slack.clone(),
        slack,
        store,
        sync_config,
    );

    let report = runtime.run_once(Utc::now()).await?;
    let rendered =
        serde_json::to_string_pretty(&report).context("failed to render sync report")?;
    println!("{rendered}");
    Ok(())
}

async fn list_channels(config: &RotaConfig, include_archived: bool) -> Result<()> {
    let store = open_store(config)?;
    let channels = store.list_channels(include_archived).await?;
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    write_channel_lines(&mut out, &channels)?;
    Ok(())
}

fn open_store(config: &RotaConfig) -> Result<Arc<dyn RotaStore>> {
    let store = SqliteRotaStore::new(&config.database.path).with_context(|| {
        format!(
            "failed to open database {}",
            config.database.path.display()
        )
    })?;
    Ok(Arc::new(store))
}

fn write_channel_lines(out: &mut impl Write, channels: &[Channel]) -> Result<()> {
    for channel in channels {
        let line = serde_json::to_string(channel).context("failed to render channel")?;
        writeln!(out, "{line}").context("failed to write channel line")?;
    }
    Ok(())
}
