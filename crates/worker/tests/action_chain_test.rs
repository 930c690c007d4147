use std::collections::HashMap;

use chrono::{TimeZone, Utc};
use fleetcron_core::config::{HttpDefaults, RetryDefaults};
use fleetcron_core::{
    JobDefinition, JobExecutor, JobRunStatus, RuntimeSettings, SharedSettings, StepStatus, Tick,
};
use fleetcron_testing_utils::{ActionBuilder, JobDefinitionBuilder};
use fleetcron_worker::ActionChainExecutor;
use mockito::Matcher;
use serde_json::json;

fn executor(base_url: &str) -> ActionChainExecutor {
    let settings = RuntimeSettings {
        timezone: chrono_tz::UTC,
        secrets: HashMap::from([
            ("BASE_URL".to_string(), base_url.to_string()),
            ("TOKEN".to_string(), "t0k".to_string()),
        ]),
        http: HttpDefaults {
            timeout_seconds: 5,
            retry: RetryDefaults {
                retries: 0,
                delay_seconds: 0.0,
                backoff: 1.0,
                max_delay_seconds: 0.0,
            },
            response_sample_max: 2000,
        },
    };
    ActionChainExecutor::new(SharedSettings::new(settings))
}

fn tick_at_hour(hour: u32) -> Tick {
    Tick::at(
        Utc.with_ymd_and_hms(2024, 5, 1, hour, 0, 0).unwrap(),
        chrono_tz::UTC,
    )
}

fn job(actions: Vec<fleetcron_core::Action>) -> JobDefinition {
    let mut builder = JobDefinitionBuilder::new("chain").every_hour_at(0);
    for action in actions {
        builder = builder.action(action);
    }
    builder.build()
}

#[tokio::test]
async fn failed_action_with_continue_does_not_fail_the_chain() {
    let mut server = mockito::Server::new_async().await;
    let a = server.mock("GET", "/a").with_status(500).expect(1).create_async().await;
    let b = server.mock("GET", "/b").with_status(200).expect(1).create_async().await;

    let job = job(vec![
        ActionBuilder::get("{{BASE_URL}}/a")
            .named("A")
            .continue_on_failure()
            .build(),
        ActionBuilder::get("{{BASE_URL}}/b").named("B").build(),
    ]);
    let result = executor(&server.url()).run(&job, &tick_at_hour(3)).await;

    a.assert_async().await;
    b.assert_async().await;
    assert_eq!(result.status, JobRunStatus::Success);
    assert_eq!(result.steps[0].status, StepStatus::Error);
    assert_eq!(result.steps[0].status_code, Some(500));
    assert_eq!(result.steps[1].status, StepStatus::Ok);
    assert!(result.error_detail.is_none());
}

#[tokio::test]
async fn failed_action_without_continue_aborts_the_chain() {
    let mut server = mockito::Server::new_async().await;
    let a = server.mock("GET", "/a").with_status(503).expect(1).create_async().await;
    let b = server.mock("GET", "/b").with_status(200).expect(0).create_async().await;

    let job = job(vec![
        ActionBuilder::get("{{BASE_URL}}/a").named("A").build(),
        ActionBuilder::get("{{BASE_URL}}/b").named("B").build(),
    ]);
    let result = executor(&server.url()).run(&job, &tick_at_hour(3)).await;

    a.assert_async().await;
    b.assert_async().await;
    assert_eq!(result.status, JobRunStatus::Error);
    assert_eq!(result.steps.len(), 1);
    let detail = result.error_detail.unwrap();
    assert!(detail.contains("A"));
    assert!(detail.contains("HTTP 503"));
}

#[tokio::test]
async fn when_predicate_skips_outside_listed_hours() {
    let mut server = mockito::Server::new_async().await;
    let noon = server.mock("POST", "/noon").with_status(200).expect(1).create_async().await;

    let job = job(vec![ActionBuilder::post("{{BASE_URL}}/noon")
        .when_hour_in(&[0, 12])
        .build()]);
    let executor = executor(&server.url());

    let at_six = executor.run(&job, &tick_at_hour(6)).await;
    assert_eq!(at_six.status, JobRunStatus::Success);
    assert_eq!(at_six.steps[0].status, StepStatus::SkippedWhen);
    assert_eq!(at_six.attempts, 0);

    let at_noon = executor.run(&job, &tick_at_hour(12)).await;
    assert_eq!(at_noon.status, JobRunStatus::Success);
    assert_eq!(at_noon.steps[0].status, StepStatus::Ok);

    noon.assert_async().await;
}

#[tokio::test]
async fn unresolved_placeholder_fails_without_retrying() {
    let job = job(vec![ActionBuilder::get("{{MISSING}}/x")
        .retry(5, 0.0, 1.0)
        .build()]);
    let result = executor("http://127.0.0.1:9").run(&job, &tick_at_hour(3)).await;

    assert_eq!(result.status, JobRunStatus::Error);
    assert_eq!(result.steps[0].attempts, 0);
    assert!(result.steps[0].error.as_deref().unwrap().contains("MISSING"));
    assert!(result.error_detail.unwrap().contains("MISSING"));
}

#[tokio::test]
async fn failing_action_is_retried_up_to_the_limit() {
    let mut server = mockito::Server::new_async().await;
    let flaky = server.mock("GET", "/flaky").with_status(500).expect(3).create_async().await;

    let job = job(vec![ActionBuilder::get("{{BASE_URL}}/flaky")
        .retry(2, 0.0, 1.0)
        .build()]);
    let result = executor(&server.url()).run(&job, &tick_at_hour(3)).await;

    flaky.assert_async().await;
    assert_eq!(result.status, JobRunStatus::Error);
    assert_eq!(result.steps[0].attempts, 3);
    assert_eq!(result.attempts, 3);
}

#[tokio::test]
async fn job_level_retry_applies_to_actions_without_their_own() {
    let mut server = mockito::Server::new_async().await;
    let flaky = server.mock("GET", "/flaky").with_status(502).expect(2).create_async().await;

    let job = JobDefinitionBuilder::new("chain")
        .every_hour_at(0)
        .retry(1, 0.0)
        .action(ActionBuilder::get("{{BASE_URL}}/flaky").build())
        .build();
    let result = executor(&server.url()).run(&job, &tick_at_hour(3)).await;

    flaky.assert_async().await;
    assert_eq!(result.steps[0].attempts, 2);
}

#[tokio::test]
async fn sends_resolved_headers_params_and_json_body() {
    let mut server = mockito::Server::new_async().await;
    let hook = server
        .mock("POST", "/hook")
        .match_header("authorization", "Bearer t0k")
        .match_query(Matcher::UrlEncoded("token".into(), "t0k".into()))
        .match_body(Matcher::Json(json!({"token": "t0k", "n": 1})))
        .with_status(201)
        .with_body("created")
        .expect(1)
        .create_async()
        .await;

    let job = job(vec![ActionBuilder::post("{{BASE_URL}}/hook")
        .header("Authorization", "Bearer {{TOKEN}}")
        .param("token", "{{TOKEN}}")
        .body(json!({"token": "{{TOKEN}}", "n": 1}))
        .build()]);
    let result = executor(&server.url()).run(&job, &tick_at_hour(3)).await;

    hook.assert_async().await;
    assert_eq!(result.status, JobRunStatus::Success);
    assert_eq!(result.steps[0].status_code, Some(201));
    assert_eq!(result.steps[0].response_sample.as_deref(), Some("created"));
}

#[tokio::test]
async fn unsupported_action_type_is_skipped() {
    let mut server = mockito::Server::new_async().await;
    let after = server.mock("GET", "/after").with_status(200).expect(1).create_async().await;

    let job = job(vec![
        ActionBuilder::get("ignored").kind("shell").build(),
        ActionBuilder::get("{{BASE_URL}}/after").build(),
    ]);
    let result = executor(&server.url()).run(&job, &tick_at_hour(3)).await;

    after.assert_async().await;
    assert_eq!(result.status, JobRunStatus::Success);
    assert_eq!(result.steps[0].status, StepStatus::SkippedUnsupported);
}

#[tokio::test]
async fn transport_failure_is_reported() {
    let job = job(vec![ActionBuilder::get("http://127.0.0.1:9/unreachable")
        .timeout_sec(2)
        .build()]);
    let result = executor("http://unused").run(&job, &tick_at_hour(3)).await;

    assert_eq!(result.status, JobRunStatus::Error);
    assert_eq!(result.steps[0].status_code, None);
    assert_eq!(result.steps[0].attempts, 1);
    assert!(result.steps[0].error.is_some());
}

#[tokio::test]
async fn response_sample_is_truncated() {
    let mut server = mockito::Server::new_async().await;
    let _big = server
        .mock("GET", "/big")
        .with_status(200)
        .with_body("x".repeat(50))
        .create_async()
        .await;

    let mut settings = RuntimeSettings {
        timezone: chrono_tz::UTC,
        secrets: HashMap::from([("BASE_URL".to_string(), server.url())]),
        http: HttpDefaults::default(),
    };
    settings.http.response_sample_max = 10;
    let executor = ActionChainExecutor::new(SharedSettings::new(settings));

    let job = job(vec![ActionBuilder::get("{{BASE_URL}}/big").build()]);
    let result = executor.run(&job, &tick_at_hour(3)).await;

    assert_eq!(result.steps[0].response_sample.as_deref(), Some("xxxxxxxxxx"));
}
