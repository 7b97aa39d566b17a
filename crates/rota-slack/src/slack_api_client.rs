//! Slack Web API client used for directory import and channel management.

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use rota_core::{ChatPlatform, DirectoryAccount, DirectorySource};
use rota_transport::{build_http_client, request_json, truncate_for_error, RetryPolicy};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

pub const DEFAULT_SLACK_API_BASE: &str = "https://slack.com/api";

const USERS_PAGE_LIMIT: &str = "200";
const CONVERSATIONS_PAGE_LIMIT: &str = "1000";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlackClientConfig {
    pub api_base: String,
    pub bot_token: String,
    pub request_timeout_ms: u64,
    pub retry_max_attempts: usize,
    pub retry_base_delay_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
struct SlackResponseMetadata {
    #[serde(default)]
    next_cursor: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct SlackMemberProfile {
    #[serde(default)]
    first_name: String,
    #[serde(default)]
    last_name: String,
    #[serde(default)]
    real_name: String,
}

#[derive(Debug, Clone, Deserialize)]
struct SlackMember {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    real_name: Option<String>,
    #[serde(default)]
    deleted: bool,
    #[serde(default)]
    is_bot: bool,
    #[serde(default)]
    profile: SlackMemberProfile,
}

impl SlackMember {
    fn into_account(self) -> DirectoryAccount {
        let real_name = self
            .real_name
            .filter(|value| !value.trim().is_empty())
            .unwrap_or(self.profile.real_name);
        DirectoryAccount {
            id: self.id,
            display_name: self.name,
            real_name,
            first_name: self.profile.first_name,
            last_name: self.profile.last_name,
            deleted: self.deleted,
            is_bot: self.is_bot,
            linked_roster_id: None,
            match_distance: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
struct SlackUsersListResponse {
    ok: bool,
    #[serde(default)]
    members: Vec<SlackMember>,
    response_metadata: Option<SlackResponseMetadata>,
    error: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct SlackConversation {
    id: String,
    #[serde(default)]
    name: String,
}

#[derive(Debug, Clone, Deserialize)]
struct SlackConversationsListResponse {
    ok: bool,
    #[serde(default)]
    channels: Vec<SlackConversation>,
    response_metadata: Option<SlackResponseMetadata>,
    error: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct SlackConversationResponse {
    ok: bool,
    channel: Option<SlackConversation>,
    error: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct SlackAckResponse {
    ok: bool,
    error: Option<String>,
}

fn ensure_ok(operation: &str, ok: bool, error: Option<String>) -> Result<()> {
    if ok {
        return Ok(());
    }
    bail!(
        "slack {operation} failed: {}",
        error.unwrap_or_else(|| "unknown error".to_string())
    )
}

fn next_cursor(metadata: Option<SlackResponseMetadata>) -> Option<String> {
    metadata
        .map(|metadata| metadata.next_cursor)
        .filter(|cursor| !cursor.trim().is_empty())
}

fn describe_slack_error_body(body: &str) -> String {
    truncate_for_error(body, 800)
}

#[derive(Clone)]
pub struct SlackApiClient {
    http: reqwest::Client,
    api_base: String,
    bot_token: String,
    retry: RetryPolicy,
}

impl SlackApiClient {
    pub fn new(config: SlackClientConfig) -> Result<Self> {
        let bot_token = config.bot_token.trim().to_string();
        if bot_token.is_empty() {
            bail!("slack bot token must not be empty");
        }
        Ok(Self {
            http: build_http_client("rota-slack", config.request_timeout_ms)?,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            bot_token,
            retry: RetryPolicy::new(config.retry_max_attempts, config.retry_base_delay_ms),
        })
    }

    async fn get<T: DeserializeOwned>(&self, method: &str, query: &[(&str, &str)]) -> Result<T> {
        let url = format!("{}/{method}", self.api_base);
        request_json(
            "slack",
            method,
            self.retry,
            || self.http.get(&url).bearer_auth(&self.bot_token).query(query),
            describe_slack_error_body,
        )
        .await
    }

    /// Mutating calls go out exactly once; a failure is left for the next run.
    async fn post<T: DeserializeOwned>(&self, method: &str, payload: &Value) -> Result<T> {
        let url = format!("{}/{method}", self.api_base);
        request_json(
            "slack",
            method,
            RetryPolicy::new(1, self.retry.base_delay_ms),
            || self.http.post(&url).bearer_auth(&self.bot_token).json(payload),
            describe_slack_error_body,
        )
        .await
    }

    pub async fn list_users(&self) -> Result<Vec<DirectoryAccount>> {
        let mut cursor: Option<String> = None;
        let mut accounts = Vec::new();
        loop {
            let mut query = vec![("limit", USERS_PAGE_LIMIT)];
            if let Some(cursor) = cursor.as_deref() {
                query.push(("cursor", cursor));
            }
            let page: SlackUsersListResponse = self.get("users.list", &query).await?;
            ensure_ok("users.list", page.ok, page.error)?;
            accounts.extend(page.members.into_iter().map(SlackMember::into_account));
            match next_cursor(page.response_metadata) {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }
        tracing::debug!(accounts = accounts.len(), "listed slack users");
        Ok(accounts)
    }

    pub async fn find_channel_by_name(&self, name: &str) -> Result<Option<String>> {
        let mut cursor: Option<String> = None;
        loop {
            let mut query = vec![
                ("types", "public_channel,private_channel"),
                ("exclude_archived", "false"),
                ("limit", CONVERSATIONS_PAGE_LIMIT),
            ];
            if let Some(cursor) = cursor.as_deref() {
                query.push(("cursor", cursor));
            }
            let page: SlackConversationsListResponse =
                self.get("conversations.list", &query).await?;
            ensure_ok("conversations.list", page.ok, page.error)?;
            if let Some(channel) = page.channels.into_iter().find(|channel| channel.name == name) {
                return Ok(Some(channel.id));
            }
            match next_cursor(page.response_metadata) {
                Some(next) => cursor = Some(next),
                None => return Ok(None),
            }
        }
    }
}

#[async_trait]
impl DirectorySource for SlackApiClient {
    async fn list_accounts(&self) -> Result<Vec<DirectoryAccount>> {
        self.list_users().await
    }
}

#[async_trait]
impl ChatPlatform for SlackApiClient {
    async fn create_channel(&self, name: &str, private: bool) -> Result<String> {
        let response: SlackConversationResponse = self
            .post(
                "conversations.create",
                &json!({ "name": name, "is_private": private }),
            )
            .await?;
        ensure_ok("conversations.create", response.ok, response.error)?;
        response
            .channel
            .map(|channel| channel.id)
            .filter(|id| !id.trim().is_empty())
            .ok_or_else(|| anyhow!("slack conversations.create did not return a channel id"))
    }

    async fn set_topic(&self, channel_id: &str, topic: &str) -> Result<()> {
        let response: SlackAckResponse = self
            .post(
                "conversations.setTopic",
                &json!({ "channel": channel_id, "topic": topic }),
            )
            .await?;
        ensure_ok("conversations.setTopic", response.ok, response.error)
    }

    async fn set_purpose(&self, channel_id: &str, purpose: &str) -> Result<()> {
        let response: SlackAckResponse = self
            .post(
                "conversations.setPurpose",
                &json!({ "channel": channel_id, "purpose": purpose }),
            )
            .await?;
        ensure_ok("conversations.setPurpose", response.ok, response.error)
    }

    async fn invite_accounts(&self, channel_id: &str, account_ids: &[String]) -> Result<()> {
        if account_ids.is_empty() {
            return Ok(());
        }
        let response: SlackAckResponse = self
            .post(
                "conversations.invite",
                &json!({ "channel": channel_id, "users": account_ids.join(",") }),
            )
            .await?;
        ensure_ok("conversations.invite", response.ok, response.error)
    }

    async fn archive_channel(&self, channel_id: &str) -> Result<()> {
        let response: SlackAckResponse = self
            .post("conversations.archive", &json!({ "channel": channel_id }))
            .await?;
        ensure_ok("conversations.archive", response.ok, response.error)
    }

    async fn channel_exists_by_name(&self, name: &str) -> Result<bool> {
        Ok(self.find_channel_by_name(name).await?.is_some())
    }
}
