mod common;

use relaylog::middleware::{wrap, Invocation};
use relaylog::{BoxError, CycleOutcome, ErrorTaxonomy, LogResult, MemoryTransport, Severity, TransportError};
use serde::Serialize;
use std::time::Duration;

#[derive(Debug, Clone, Serialize)]
struct Login {
    user: String,
    password: String,
    #[serde(skip)]
    outcome: Outcome,
}

#[derive(Debug, Clone, Copy, Default)]
enum Outcome {
    #[default]
    Ok,
    Offline,
    Rejected,
    Panic,
}

fn login(outcome: Outcome) -> Login {
    Login { user: "ann".into(), password: "hunter2".into(), outcome }
}

async fn handle(inv: Invocation<Login>) -> Result<Option<String>, BoxError> {
    let params = inv.into_params();
    tokio::time::sleep(Duration::from_millis(40)).await;
    match params.outcome {
        Outcome::Ok => Ok(Some(format!("session-for-{}", params.user))),
        Outcome::Offline => Err(TransportError::connectivity("https://api.test/login", "dns").into()),
        Outcome::Rejected => Err(TransportError::api("https://api.test/login", 401).into()),
        Outcome::Panic => panic!("login state corrupted"),
    }
}

#[tokio::test(start_paused = true)]
async fn full_chain_records_one_event_per_invocation() {
    let (pipeline, fatal) = common::pipeline(Some(common::config()));
    let action = pipeline.action(
        "login",
        wrap(
            tower::service_fn(handle),
            (pipeline.timing(), pipeline.suppress_connectivity(), pipeline.report()),
        ),
    );

    assert_eq!(action.invoke(login(Outcome::Ok)).await.unwrap().as_deref(), Some("session-for-ann"));
    assert_eq!(action.invoke(login(Outcome::Offline)).await.unwrap(), None);
    let rejected = action.invoke(login(Outcome::Rejected)).await.unwrap_err();
    assert_eq!(rejected.downcast_ref::<TransportError>().and_then(TransportError::status), Some(401));
    let panicked = action.invoke(login(Outcome::Panic)).await.unwrap_err();
    assert!(panicked.to_string().contains("login state corrupted"));

    let events = pipeline.store().snapshot(0).into_events();
    let summary: Vec<_> = events.iter().map(|e| (e.result(), e.error_code())).collect();
    assert_eq!(
        summary,
        vec![
            (LogResult::Ok, None),
            (LogResult::Warn, Some("CONNECTIVITY_ERROR")),
            (LogResult::Error, Some("API_ERROR_401")),
            (LogResult::Error, Some("RUNTIME_ERROR")),
        ]
    );
    assert!(events[0].elapsed_time() >= Duration::from_millis(40));
    assert_eq!(events[1].info().get("isSilent"), Some("true"));
    for event in &events {
        assert_eq!(event.action(), Some("login"));
        assert_eq!(event.info().get("password"), Some("***"));
        assert_eq!(event.info().get("user"), Some("ann"));
    }

    let reports = fatal.reports();
    assert_eq!(reports.len(), 2);
    assert!(matches!(reports[0], (ErrorTaxonomy::ApiFailure { status: 401, .. }, Severity::Error)));
    assert!(matches!(reports[1], (ErrorTaxonomy::RuntimeFailure { .. }, Severity::Fatal)));
}

#[tokio::test]
async fn masked_values_never_reach_the_wire() {
    let (pipeline, _) = common::pipeline(Some(common::config()));
    let action = pipeline.action(
        "login",
        wrap(tower::service_fn(handle), (pipeline.suppress_connectivity(), pipeline.report())),
    );
    action.invoke(login(Outcome::Rejected)).await.unwrap_err();

    let transport = MemoryTransport::new();
    let mut cycle = pipeline.delivery_cycle(transport.clone());
    assert_eq!(cycle.run().await, CycleOutcome::Delivered { count: 1 });

    let body = String::from_utf8(transport.requests()[0].body.clone()).unwrap();
    assert!(body.contains("\"password\":\"***\""));
    assert!(!body.contains("hunter2"));
}

#[tokio::test]
async fn suppression_order_decides_who_sees_the_failure() {
    let (pipeline, fatal) = common::pipeline(None);

    // Report inside suppress: the failure is reported first, then absorbed.
    let report_then_suppress = pipeline.action(
        "sync",
        wrap(tower::service_fn(handle), (pipeline.report(), pipeline.suppress_connectivity())),
    );
    assert_eq!(report_then_suppress.invoke(login(Outcome::Offline)).await.unwrap(), None);

    let results: Vec<_> =
        pipeline.store().snapshot(0).iter().map(|e| e.result()).collect();
    assert_eq!(results, vec![LogResult::Error, LogResult::Warn]);
    assert_eq!(fatal.reports()[0].1, Severity::Warning);
}
