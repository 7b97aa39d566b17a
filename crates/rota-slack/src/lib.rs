//! Slack Web API adapter providing the workspace directory and channel operations.

mod slack_api_client;

pub use slack_api_client::{SlackApiClient, SlackClientConfig, DEFAULT_SLACK_API_BASE};
