//! Imports chat directory accounts and links each one to its best roster match.

use anyhow::{bail, Context, Result};
use rota_core::{DirectorySource, IdentityMatcher, LinkDecision};
use rota_store::RotaStore;
use serde::Serialize;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DirectoryImportReport {
    pub accounts: usize,
    pub linked: usize,
    pub unlinked: usize,
}

#[tracing::instrument(name = "rota_sync.directory_import", skip_all)]
pub async fn import_directory(
    source: &dyn DirectorySource,
    store: &dyn RotaStore,
    matcher: &IdentityMatcher,
) -> Result<DirectoryImportReport> {
    let mut accounts = source
        .list_accounts()
        .await
        .context("failed to list directory accounts")?;
    if accounts.is_empty() {
        bail!("directory listing returned no accounts");
    }

    let people = store.list_people().await?;
    let mut report = DirectoryImportReport {
        accounts: accounts.len(),
        ..DirectoryImportReport::default()
    };
    for account in &mut accounts {
        match matcher.link(account, &people) {
            LinkDecision::Linked(matched) => {
                report.linked += 1;
                tracing::debug!(
                    account_id = %account.id,
                    person_id = matched.person_id,
                    distance = matched.distance,
                    "linked directory account"
                );
            }
            LinkDecision::Unlinked { best } => {
                report.unlinked += 1;
                tracing::debug!(
                    account_id = %account.id,
                    best_distance = best.map(|matched| matched.distance),
                    "directory account left unlinked"
                );
            }
        }
    }
    store.upsert_accounts(&accounts).await?;

    tracing::info!(
        accounts = report.accounts,
        linked = report.linked,
        unlinked = report.unlinked,
        "imported directory"
    );
    Ok(report)
}
