use std::path::Path;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, TimeZone, Utc};
use httpmock::prelude::*;
use rota_planning_center::{PlanningCenterClient, PlanningCenterConfig};
use rota_slack::{SlackApiClient, SlackClientConfig};
use rota_store::{RotaStore, SqliteRotaStore};
use rota_sync::{ChannelLifecycleConfig, SyncConfig, SyncRuntime};
use serde_json::json;
use tempfile::tempdir;

fn at(year: i32, month: u32, day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, hour, 0, 0)
        .single()
        .expect("valid timestamp")
}

fn mock_planning_center(server: &MockServer) {
    server.mock(|when, then| {
        when.method(GET).path("/services/v2/people");
        then.status(200).json_body(json!({
            "data": [
                {"type": "Person", "id": "1", "attributes": {"first_name": "Jonathan", "last_name": "Smith"}},
                {"type": "Person", "id": "2", "attributes": {"first_name": "Mary", "last_name": "Jones"}}
            ],
            "links": {}
        }));
    });
    server.mock(|when, then| {
        when.method(GET).path("/services/v2/service_types");
        then.status(200).json_body(json!({
            "data": [{"type": "ServiceType", "id": "10", "attributes": {"name": "Sunday AM"}}],
            "links": {}
        }));
    });
    server.mock(|when, then| {
        when.method(GET).path("/services/v2/service_types/10/plans");
        then.status(200).json_body(json!({
            "data": [{"type": "Plan", "id": "100", "attributes": {
                "title": "Easter", "series_title": null,
                "sort_date": "2024-05-05T09:00:00Z", "updated_at": "2024-04-20T12:00:00Z"
            }}],
            "links": {}
        }));
    });
    server.mock(|when, then| {
        when.method(GET)
            .path("/services/v2/service_types/10/plans/100/plan_times");
        then.status(200).json_body(json!({
            "data": [{"type": "PlanTime", "id": "1", "attributes": {
                "time_type": "service", "starts_at": "2024-05-05T09:00:00Z", "ends_at": "2024-05-05T10:30:00Z"
            }}],
            "links": {}
        }));
    });
    server.mock(|when, then| {
        when.method(GET)
            .path("/services/v2/service_types/10/plans/100/team_members");
        then.status(200).json_body(json!({
            "data": [
                {"type": "PlanPerson", "id": "900", "attributes": {"status": "C", "team_position_name": "Drums"},
                 "relationships": {"person": {"data": {"type": "Person", "id": "1"}}}},
                {"type": "PlanPerson", "id": "901", "attributes": {"status": "C", "team_position_name": "Vocals"},
                 "relationships": {"person": {"data": {"type": "Person", "id": "2"}}}}
            ],
            "links": {}
        }));
    });
}

fn mock_slack_directory(server: &MockServer) {
    server.mock(|when, then| {
        when.method(GET).path("/users.list");
        then.status(200).json_body(json!({
            "ok": true,
            "members": [
                {"id": "U1", "name": "jsmith", "real_name": "Jon Smith",
                 "profile": {"first_name": "Jon", "last_name": "Smith"}},
                {"id": "U2", "name": "mjones", "real_name": "Mary Jones",
                 "profile": {"first_name": "Mary", "last_name": "Jones"}},
                {"id": "UADMIN", "name": "admin", "real_name": "Worship Office",
                 "profile": {"first_name": "Worship", "last_name": "Office"}}
            ],
            "response_metadata": {"next_cursor": ""}
        }));
    });
    server.mock(|when, then| {
        when.method(GET).path("/conversations.list");
        then.status(200).json_body(json!({
            "ok": true,
            "channels": [{"id": "CGENERAL", "name": "general"}],
            "response_metadata": {"next_cursor": ""}
        }));
    });
}

fn runtime(
    db_path: &Path,
    planning_center: &MockServer,
    slack: &MockServer,
) -> (SyncRuntime, Arc<dyn RotaStore>) {
    let store: Arc<dyn RotaStore> =
        Arc::new(SqliteRotaStore::new(db_path).expect("open sqlite store"));
    let roster = PlanningCenterClient::new(PlanningCenterConfig {
        api_base: planning_center.base_url(),
        app_id: "app".to_string(),
        secret: "secret".to_string(),
        request_timeout_ms: 2_000,
        retry_max_attempts: 1,
        retry_base_delay_ms: 1,
    })
    .expect("planning center client");
    let chat = Arc::new(
        SlackApiClient::new(SlackClientConfig {
            api_base: slack.base_url(),
            bot_token: "xoxb-test".to_string(),
            request_timeout_ms: 2_000,
            retry_max_attempts: 1,
            retry_base_delay_ms: 1,
        })
        .expect("slack client"),
    );
    let config = SyncConfig {
        lifecycle: ChannelLifecycleConfig {
            sticky_account_ids: vec!["UADMIN".to_string()],
            propagation_delay: StdDuration::ZERO,
            ..ChannelLifecycleConfig::default()
        },
        ..SyncConfig::default()
    };
    let runtime = SyncRuntime::new(
        Arc::new(roster),
        chat.clone(),
        chat,
        store.clone(),
        config,
    );
    (runtime, store)
}

#[tokio::test]
async fn integration_channel_is_created_kept_quiet_then_archived_across_runs() {
    let planning_center = MockServer::start();
    let slack = MockServer::start();
    mock_planning_center(&planning_center);
    mock_slack_directory(&slack);

    let create = slack.mock(|when, then| {
        when.method(POST)
            .path("/conversations.create")
            .json_body(json!({"name": "2024-05-05", "is_private": true}));
        then.status(200)
            .json_body(json!({"ok": true, "channel": {"id": "C100", "name": "2024-05-05"}}));
    });
    let topic = slack.mock(|when, then| {
        when.method(POST)
            .path("/conversations.setTopic")
            .json_body(json!({"channel": "C100", "topic": "Sunday AM - Easter"}));
        then.status(200).json_body(json!({"ok": true}));
    });
    let purpose = slack.mock(|when, then| {
        when.method(POST)
            .path("/conversations.setPurpose")
            .json_body(json!({"channel": "C100", "purpose": "Sunday AM - Easter"}));
        then.status(200).json_body(json!({"ok": true}));
    });
    let invite = slack.mock(|when, then| {
        when.method(POST)
            .path("/conversations.invite")
            .json_body(json!({"channel": "C100", "users": "UADMIN,U1,U2"}));
        then.status(200).json_body(json!({"ok": true}));
    });
    let archive = slack.mock(|when, then| {
        when.method(POST)
            .path("/conversations.archive")
            .json_body(json!({"channel": "C100"}));
        then.status(200).json_body(json!({"ok": true}));
    });

    let dir = tempdir().expect("tempdir");
    let db_path = dir.path().join("rota.sqlite");

    let (first_runtime, store) = runtime(&db_path, &planning_center, &slack);
    let first = first_runtime
        .run_once(at(2024, 5, 1, 0))
        .await
        .expect("first run");
    assert!(!first.roster.incremental);
    assert_eq!(first.roster.events, 1);
    assert_eq!(first.directory.linked, 2);
    assert_eq!(first.lifecycle.channels_created, 1);
    assert_eq!(first.lifecycle.accounts_invited, 3);
    let channel = store
        .get_channel_for_event(100)
        .await
        .expect("lookup")
        .expect("channel stored");
    assert_eq!(channel.id, "C100");
    assert_eq!(channel.description, "Sunday AM - Easter");
    assert_eq!(channel.invited_account_ids, vec!["UADMIN", "U1", "U2"]);

    let second = first_runtime
        .run_once(at(2024, 5, 1, 0))
        .await
        .expect("second run");
    assert!(second.roster.incremental);
    assert_eq!(second.lifecycle.channels_created, 0);
    assert_eq!(second.lifecycle.accounts_invited, 0);
    assert_eq!(second.lifecycle.descriptions_updated, 0);

    // A fresh store handle over the same file sees everything the first one wrote.
    let (later_runtime, reopened) = runtime(&db_path, &planning_center, &slack);
    let third = later_runtime
        .run_once(at(2024, 5, 6, 0))
        .await
        .expect("third run");
    assert_eq!(third.lifecycle.events_in_window, 0);
    assert_eq!(third.lifecycle.channels_archived, 1);
    assert!(reopened
        .list_channels(false)
        .await
        .expect("active channels")
        .is_empty());
    assert!(reopened
        .get_channel_for_event(100)
        .await
        .expect("lookup")
        .expect("channel")
        .archived);

    create.assert_calls(1);
    topic.assert_calls(1);
    purpose.assert_calls(1);
    invite.assert_calls(1);
    archive.assert_calls(1);
}

#[tokio::test]
async fn integration_roster_outage_leaves_store_and_slack_untouched() {
    let planning_center = MockServer::start();
    let slack = MockServer::start();
    mock_slack_directory(&slack);
    planning_center.mock(|when, then| {
        when.method(GET).path("/services/v2/people");
        then.status(401).json_body(json!({
            "errors": [{"status": "401", "title": "Unauthorized", "detail": "credentials rejected"}]
        }));
    });
    let create = slack.mock(|when, then| {
        when.method(POST).path("/conversations.create");
        then.status(200)
            .json_body(json!({"ok": true, "channel": {"id": "C100", "name": "2024-05-05"}}));
    });

    let dir = tempdir().expect("tempdir");
    let (runtime, store) = runtime(&dir.path().join("rota.sqlite"), &planning_center, &slack);
    let error = runtime
        .run_once(at(2024, 5, 1, 0))
        .await
        .expect_err("roster outage");

    assert!(format!("{error:#}").contains("credentials rejected"));
    assert!(store.list_people().await.expect("people").is_empty());
    assert!(store.list_accounts().await.expect("accounts").is_empty());
    create.assert_calls(0);
}
