//! Planning Center Services API client implementing the roster source port.

use anyhow::{bail, Result};
use async_trait::async_trait;
use rota_core::{Event, EventAssignment, EventFilter, RosterPerson, RosterSource, ServiceType};
use rota_transport::{build_http_client, request_json, truncate_for_error, RetryPolicy};
use serde::de::DeserializeOwned;

use crate::json_api::{
    parse_id, parse_timestamp, text, ErrorDocument, Page, PersonAttributes, PlanAttributes,
    PlanTimeAttributes, Resource, ServiceTypeAttributes, TeamMemberAttributes,
    TeamMemberRelationships,
};

pub const DEFAULT_PLANNING_CENTER_API_BASE: &str = "https://api.planningcenteronline.com";

const PAGE_SIZE: &str = "100";
const SERVICE_TIME_TYPE: &str = "service";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanningCenterConfig {
    pub api_base: String,
    pub app_id: String,
    pub secret: String,
    pub request_timeout_ms: u64,
    pub retry_max_attempts: usize,
    pub retry_base_delay_ms: u64,
}

fn describe_planning_center_error_body(body: &str) -> String {
    serde_json::from_str::<ErrorDocument>(body)
        .ok()
        .and_then(|document| document.errors.first().map(|error| error.message()))
        .unwrap_or_else(|| truncate_for_error(body, 800))
}

#[derive(Clone)]
pub struct PlanningCenterClient {
    http: reqwest::Client,
    api_base: String,
    app_id: String,
    secret: String,
    retry: RetryPolicy,
}

impl PlanningCenterClient {
    pub fn new(config: PlanningCenterConfig) -> Result<Self> {
        let app_id = config.app_id.trim().to_string();
        let secret = config.secret.trim().to_string();
        if app_id.is_empty() || secret.is_empty() {
            bail!("planning center app id and secret must not be empty");
        }
        Ok(Self {
            http: build_http_client("rota-planning-center", config.request_timeout_ms)?,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            app_id,
            secret,
            retry: RetryPolicy::new(config.retry_max_attempts, config.retry_base_delay_ms),
        })
    }

    fn resolve_url(&self, path_or_url: &str) -> String {
        if path_or_url.starts_with("http://") || path_or_url.starts_with("https://") {
            path_or_url.to_string()
        } else {
            format!("{}{path_or_url}", self.api_base)
        }
    }

    /// Fetches every page of a collection by following `links.next`.
    async fn get_all<A, R>(&self, path: &str) -> Result<Vec<Resource<A, R>>>
    where
        A: DeserializeOwned,
        R: DeserializeOwned,
    {
        let mut next_url = Some(format!(
            "{}?per_page={PAGE_SIZE}",
            self.resolve_url(path)
        ));
        let mut resources = Vec::new();
        while let Some(url) = next_url.take() {
            let page: Page<A, R> = request_json(
                "planning center",
                path,
                self.retry,
                || {
                    self.http
                        .get(&url)
                        .basic_auth(&self.app_id, Some(&self.secret))
                },
                describe_planning_center_error_body,
            )
            .await?;
            if let Some(error) = page.errors.first() {
                bail!("planning center {path} failed: {}", error.message());
            }
            let Some(data) = page.data else {
                bail!("planning center {path} returned no data");
            };
            resources.extend(data);
            next_url = page
                .links
                .next
                .filter(|next| !next.trim().is_empty())
                .map(|next| self.resolve_url(&next));
        }
        Ok(resources)
    }

    async fn list_plan_events(
        &self,
        service_type_id: u64,
        filter: &EventFilter,
    ) -> Result<Vec<Event>> {
        let plans: Vec<Resource<PlanAttributes>> = self
            .get_all(&format!("/services/v2/service_types/{service_type_id}/plans"))
            .await?;
        let mut events = Vec::new();
        for plan in plans {
            let plan_id = parse_id("plan", &plan.id)?;
            let attributes = plan.attributes;
            let updated_at = parse_timestamp(attributes.updated_at.as_deref());
            let sort_date = parse_timestamp(attributes.sort_date.as_deref());
            if !filter.admits(updated_at, sort_date) {
                continue;
            }

            let plan_times: Vec<Resource<PlanTimeAttributes>> = self
                .get_all(&format!(
                    "/services/v2/service_types/{service_type_id}/plans/{plan_id}/plan_times"
                ))
                .await?;
            let primary = plan_times
                .iter()
                .filter(|time| time.attributes.time_type.as_deref() == Some(SERVICE_TIME_TYPE))
                .filter_map(|time| {
                    let starts_at = parse_timestamp(time.attributes.starts_at.as_deref())?;
                    let ends_at =
                        parse_timestamp(time.attributes.ends_at.as_deref()).unwrap_or(starts_at);
                    Some((starts_at, ends_at))
                })
                .min_by_key(|(starts_at, _)| *starts_at);
            let Some((starts_at, ends_at)) = primary else {
                tracing::debug!(plan_id, service_type_id, "plan has no service time; skipping");
                continue;
            };

            events.push(Event {
                id: plan_id,
                service_type_id,
                title: text(attributes.title),
                series_title: text(attributes.series_title),
                starts_at,
                ends_at,
                updated_at,
            });
        }
        Ok(events)
    }
}

#[async_trait]
impl RosterSource for PlanningCenterClient {
    async fn list_people(&self) -> Result<Vec<RosterPerson>> {
        let people: Vec<Resource<PersonAttributes>> =
            self.get_all("/services/v2/people").await?;
        people
            .into_iter()
            .map(|person| {
                Ok(RosterPerson {
                    id: parse_id("person", &person.id)?,
                    first_name: text(person.attributes.first_name),
                    last_name: text(person.attributes.last_name),
                })
            })
            .collect()
    }

    async fn list_service_types(&self) -> Result<Vec<ServiceType>> {
        let service_types: Vec<Resource<ServiceTypeAttributes>> =
            self.get_all("/services/v2/service_types").await?;
        service_types
            .into_iter()
            .map(|service_type| {
                Ok(ServiceType {
                    id: parse_id("service type", &service_type.id)?,
                    name: text(service_type.attributes.name),
                })
            })
            .collect()
    }

    async fn list_events(&self, filter: &EventFilter) -> Result<Vec<Event>> {
        let mut events = Vec::new();
        for service_type_id in &filter.service_type_ids {
            events.extend(self.list_plan_events(*service_type_id, filter).await?);
        }
        Ok(events)
    }

    async fn list_assignments(&self, event: &Event) -> Result<Vec<EventAssignment>> {
        let members: Vec<Resource<TeamMemberAttributes, TeamMemberRelationships>> = self
            .get_all(&format!(
                "/services/v2/service_types/{}/plans/{}/team_members",
                event.service_type_id, event.id
            ))
            .await?;
        let mut assignments = Vec::new();
        for member in members {
            let Some(person_id) = member.person_id() else {
                tracing::warn!(
                    plan_id = event.id,
                    team_member_id = %member.id,
                    "team member has no linked person; skipping"
                );
                continue;
            };
            assignments.push(EventAssignment {
                id: parse_id("team member", &member.id)?,
                event_id: event.id,
                person_id: parse_id("person", person_id)?,
                role: text(member.attributes.team_position_name),
                status: text(member.attributes.status),
            });
        }
        Ok(assignments)
    }
}
