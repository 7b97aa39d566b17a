//! JSON:API document shapes returned by Planning Center.

use anyhow::{anyhow, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde::de::IgnoredAny;
use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize)]
pub(crate) struct Links {
    pub(crate) next: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ApiError {
    #[serde(default)]
    pub(crate) title: Option<String>,
    #[serde(default)]
    pub(crate) detail: Option<String>,
}

impl ApiError {
    pub(crate) fn message(&self) -> String {
        self.detail
            .clone()
            .or_else(|| self.title.clone())
            .filter(|value| !value.trim().is_empty())
            .unwrap_or_else(|| "unknown error".to_string())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct Page<A, R = IgnoredAny> {
    pub(crate) data: Option<Vec<Resource<A, R>>>,
    #[serde(default)]
    pub(crate) links: Links,
    #[serde(default)]
    pub(crate) errors: Vec<ApiError>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct Resource<A, R = IgnoredAny> {
    pub(crate) id: String,
    pub(crate) attributes: A,
    pub(crate) relationships: Option<R>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ErrorDocument {
    #[serde(default)]
    pub(crate) errors: Vec<ApiError>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct PersonAttributes {
    #[serde(default)]
    pub(crate) first_name: Option<String>,
    #[serde(default)]
    pub(crate) last_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ServiceTypeAttributes {
    #[serde(default)]
    pub(crate) name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct PlanAttributes {
    #[serde(default)]
    pub(crate) title: Option<String>,
    #[serde(default)]
    pub(crate) series_title: Option<String>,
    #[serde(default)]
    pub(crate) sort_date: Option<String>,
    #[serde(default)]
    pub(crate) updated_at: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct PlanTimeAttributes {
    #[serde(default)]
    pub(crate) time_type: Option<String>,
    #[serde(default)]
    pub(crate) starts_at: Option<String>,
    #[serde(default)]
    pub(crate) ends_at: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct TeamMemberAttributes {
    #[serde(default)]
    pub(crate) status: Option<String>,
    #[serde(default)]
    pub(crate) team_position_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ResourceRef {
    pub(crate) id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct Relationship {
    #[serde(default)]
    pub(crate) data: Option<ResourceRef>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct TeamMemberRelationships {
    #[serde(default)]
    pub(crate) person: Option<Relationship>,
}

impl<A> Resource<A, TeamMemberRelationships> {
    pub(crate) fn person_id(&self) -> Option<&str> {
        self.relationships
            .as_ref()?
            .person
            .as_ref()?
            .data
            .as_ref()
            .map(|reference| reference.id.as_str())
    }
}

pub(crate) fn parse_id(kind: &str, raw: &str) -> Result<u64> {
    raw.trim()
        .parse::<u64>()
        .map_err(|_| anyhow!("planning center {kind} id '{raw}' is not numeric"))
}

/// Accepts full RFC3339 timestamps and bare `YYYY-MM-DD` dates (midnight UTC).
pub(crate) fn parse_timestamp(raw: Option<&str>) -> Option<DateTime<Utc>> {
    let raw = raw.map(str::trim).filter(|value| !value.is_empty())?;
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

pub(crate) fn text(value: Option<String>) -> String {
    value.map(|value| value.trim().to_string()).unwrap_or_default()
}
