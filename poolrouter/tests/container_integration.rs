//! Integration tests for the request container.
//!
//! These tests drive a [`Dispatcher`] end to end against fake cost, transport
//! and namespace services:
//! - request clumping and answer fan-out
//! - staging, pool-to-pool copies and liveness checks
//! - the retry ladder and the on-error policy
//! - pool status triggers and operator overrides

mod common;

use common::{
    eventually, held_by, held_unreadable, nowhere, read_request, request_name, staging_config,
    Harness,
};
use poolrouter::admin;
use poolrouter::config::ConfigFile;
use poolrouter::container::{OnError, State};
use poolrouter::error::{codes, SubmitError};
use poolrouter::location::{Direction, FileId, PoolManagerParameters, ProtocolInfo};
use poolrouter::messages::{CorrelationId, PoolReply, PoolRequest, PoolStatus};
use std::time::Duration;

fn fetch_failed(code: i32, message: &str) -> PoolReply {
    PoolReply::FetchFile {
        return_code: code,
        error: Some(message.to_string()),
    }
}

fn fetch_ok() -> PoolReply {
    PoolReply::FetchFile {
        return_code: 0,
        error: None,
    }
}

fn state_of(harness: &Harness, name: &str) -> Option<State> {
    harness
        .dispatcher
        .list(None)
        .into_iter()
        .find(|s| s.name == name)
        .map(|s| s.state)
}

// =============================================================================
// Read path
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_available_file_answers_without_pool_messages() {
    let h = Harness::new(ConfigFile::default());
    h.cost.set_location(held_by(&[("pool-a", 0.1), ("pool-b", 0.4)]));

    let selection = h
        .dispatcher
        .select_read_pool(read_request("0001", "client-1"))
        .await
        .unwrap();

    assert_eq!(selection.pool, "pool-a");
    assert!(h.transport.sent().is_empty());
    eventually(|| h.dispatcher.list(None).is_empty()).await;
}

#[tokio::test(start_paused = true)]
async fn test_cost_exceeded_without_fallback_fails() {
    let mut config = ConfigFile::default();
    config.partition.cost_cut = 0.5;
    let h = Harness::new(config);
    h.cost.set_location(held_by(&[("pool-a", 0.9)]));

    let err = h
        .dispatcher
        .select_read_pool(read_request("0001", "client-1"))
        .await
        .unwrap_err();

    assert_eq!(err.code, codes::COST_EXCEEDED);
    assert_eq!(err.message, "Cost exceeded (st,p2p not allowed)");
}

#[tokio::test(start_paused = true)]
async fn test_unknown_protocol_is_rejected() {
    let h = Harness::new(ConfigFile::default());
    let mut request = read_request("0001", "client-1");
    request.protocol_info = ProtocolInfo::new("Http", 1, "client-1");

    let result = h.dispatcher.submit(request);

    assert!(matches!(result, Err(SubmitError::UnknownProtocol(p)) if p == "Http/1"));
    assert!(h.dispatcher.list(None).is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_replicate_reply_is_rejected() {
    let h = Harness::new(ConfigFile::default());
    let mut request = read_request("0001", "client-1")
        .replicate(poolrouter::location::DestinationFileStatus::Cached);
    if let Some(replicate) = request.replicate.as_mut() {
        replicate.is_reply = true;
    }

    assert!(matches!(
        h.dispatcher.submit(request),
        Err(SubmitError::ReplicateIsReply(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn test_reply_without_waiter_is_dropped() {
    let h = Harness::new(ConfigFile::default());
    assert!(!h.dispatcher.route_reply(CorrelationId(999), fetch_ok()));
}

// =============================================================================
// Staging and clumping
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_clumped_requests_share_one_stage() {
    let h = Harness::new(staging_config());
    h.cost.set_location(nowhere());
    h.cost.set_matrix(Direction::Stage, &[("stage-1", 0.1)]);

    let answers: Vec<_> = ["client-1", "client-2", "client-3"]
        .iter()
        .map(|host| h.dispatcher.submit(read_request("0002", host)).unwrap())
        .collect();

    eventually(|| h.transport.sent_of("fetch").len() == 1).await;
    let stats = h.dispatcher.stats();
    assert_eq!(stats.submitted, 3);
    assert_eq!(stats.clumped, 2);
    assert_eq!(stats.actors_created, 1);
    assert_eq!(h.dispatcher.list(None).len(), 1);

    // The restored file is now readable for the clients answered later.
    h.cost.set_location(held_by(&[("stage-1", 0.1)]));
    let fetch = h.transport.sent_of("fetch")[0].clone();
    assert_eq!(fetch.destination, "stage-1");
    assert!(h.dispatcher.route_reply(fetch.correlation, fetch_ok()));

    for answer in answers {
        assert_eq!(answer.await.unwrap().unwrap().pool, "stage-1");
    }
    assert_eq!(h.transport.sent_of("fetch").len(), 1);
    eventually(|| h.dispatcher.list(None).is_empty()).await;
    assert_eq!(h.dispatcher.stats().answered, 3);
}

#[tokio::test(start_paused = true)]
async fn test_stage_delay_suspends_request() {
    let h = Harness::new(staging_config());
    h.cost.set_location(nowhere());
    h.cost.set_matrix(Direction::Stage, &[("stage-1", 0.1)]);
    let name = request_name("0003");

    let _answer = h.dispatcher.submit(read_request("0003", "client-1")).unwrap();
    eventually(|| h.transport.sent_of("fetch").len() == 1).await;
    let fetch = h.transport.sent_of("fetch")[0].clone();
    h.dispatcher
        .route_reply(fetch.correlation, fetch_failed(codes::HSM_DELAY, "tape busy"));

    eventually(|| state_of(&h, &name) == Some(State::Suspended)).await;
    let summary = h.dispatcher.list(None).remove(0);
    assert_eq!(summary.error_code, codes::HSM_DELAY);
    assert_eq!(summary.error_message, "Suspend by HSM request : tape busy");
    assert_eq!(summary.status, "Suspended By HSM request");
}

#[tokio::test(start_paused = true)]
async fn test_max_restore_limits_concurrent_stages() {
    let h = Harness::new(staging_config());
    h.cost.set_location(nowhere());
    h.cost.set_matrix(Direction::Stage, &[("stage-1", 0.1)]);
    admin::execute(&h.dispatcher, "rc set max restore 1")
        .await
        .unwrap();

    let _first = h.dispatcher.submit(read_request("0004", "client-1")).unwrap();
    eventually(|| h.transport.sent_of("fetch").len() == 1).await;

    let err = h
        .dispatcher
        .select_read_pool(read_request("0005", "client-1"))
        .await
        .unwrap_err();

    assert_eq!(err.code, codes::RESOURCE_UNAVAILABLE);
    assert_eq!(err.message, "Resource temporarily unavailable : Restore");
    assert_eq!(h.dispatcher.stats().restore_exceeded, 1);
    assert_eq!(h.transport.sent_of("fetch").len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_suspend_staging_parks_stage_attempts() {
    let h = Harness::new(staging_config());
    h.cost.set_location(nowhere());
    h.cost.set_matrix(Direction::Stage, &[("stage-1", 0.1)]);
    admin::execute(&h.dispatcher, "rc suspend on").await.unwrap();
    let name = request_name("0006");

    let _answer = h.dispatcher.submit(read_request("0006", "client-1")).unwrap();

    eventually(|| state_of(&h, &name) == Some(State::Suspended)).await;
    let summary = h.dispatcher.list(None).remove(0);
    assert_eq!(summary.error_code, codes::SUSPEND_ENFORCED);
    assert!(summary.status.starts_with("Suspended Stage (forced)"));
    assert!(h.transport.sent().is_empty());
}

// =============================================================================
// Retry ladder
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_retry_ladder_ends_suspended() {
    let mut config = staging_config();
    config.container.max_retries = 3;
    config.container.on_error = OnError::Suspend;
    let h = Harness::new(config);
    h.cost.set_location(nowhere());
    h.cost.set_matrix(Direction::Stage, &[("stage-1", 0.1)]);
    let name = request_name("0007");

    let answer = h.dispatcher.submit(read_request("0007", "client-1")).unwrap();

    // One immediate retry, then two after the retry timer.
    for attempt in 1..=4 {
        eventually(|| h.transport.sent_of("fetch").len() == attempt).await;
        let fetch = h.transport.sent_of("fetch")[attempt - 1].clone();
        assert!(h
            .dispatcher
            .route_reply(fetch.correlation, fetch_failed(42, "tape offline")));
    }

    eventually(|| state_of(&h, &name) == Some(State::Suspended)).await;
    let summary = h.dispatcher.list(None).remove(0);
    assert_eq!(summary.retry_count, 3);
    assert_eq!(summary.error_code, 42);
    assert_eq!(summary.error_message, "tape offline");
    assert!(summary.status.starts_with("Suspended"));
    assert!(h
        .transport
        .warnings()
        .iter()
        .any(|w| w == "Suspended tape offline"));
    assert_eq!(h.transport.sent_of("fetch").len(), 4);

    admin::execute(&h.dispatcher, &format!("rc failed {}", name))
        .await
        .unwrap();
    let err = answer.await.unwrap().unwrap_err();
    assert_eq!(err.code, 1);
    assert_eq!(err.message, admin::OPERATOR_INTERVENTION);
}

#[tokio::test(start_paused = true)]
async fn test_fail_policy_answers_after_last_retry() {
    let mut config = staging_config();
    config.container.max_retries = 1;
    config.container.on_error = OnError::Fail;
    let h = Harness::new(config);
    h.cost.set_location(nowhere());
    h.cost.set_matrix(Direction::Stage, &[("stage-1", 0.1)]);

    let answer = h.dispatcher.submit(read_request("0008", "client-1")).unwrap();

    for attempt in 1..=2 {
        eventually(|| h.transport.sent_of("fetch").len() == attempt).await;
        let fetch = h.transport.sent_of("fetch")[attempt - 1].clone();
        h.dispatcher
            .route_reply(fetch.correlation, fetch_failed(42, "tape offline"));
    }

    let err = answer.await.unwrap().unwrap_err();
    assert_eq!(err.code, 42);
    assert!(h
        .transport
        .warnings()
        .iter()
        .any(|w| w == "Failed tape offline"));
}

#[tokio::test(start_paused = true)]
async fn test_removed_file_ends_request() {
    let h = Harness::new(staging_config());
    h.cost.set_location(nowhere());
    h.cost.set_matrix(Direction::Stage, &[("stage-1", 0.1)]);

    let answer = h.dispatcher.submit(read_request("0009", "client-1")).unwrap();
    eventually(|| h.transport.sent_of("fetch").len() == 1).await;

    h.namespace.remove("0009");
    let fetch = h.transport.sent_of("fetch")[0].clone();
    h.dispatcher
        .route_reply(fetch.correlation, fetch_failed(42, "tape offline"));

    let err = answer.await.unwrap().unwrap_err();
    assert_eq!(err.code, codes::FILE_NOT_FOUND);
    assert_eq!(h.transport.sent_of("fetch").len(), 1);
    assert!(h.transport.warnings().iter().any(|w| w.starts_with("Failed")));
}

#[tokio::test(start_paused = true)]
async fn test_repeated_retry_does_not_accumulate() {
    let h = Harness::new(ConfigFile::default());
    h.cost.set_location(nowhere());
    let name = request_name("0010");

    let answer = h.dispatcher.submit(read_request("0010", "client-1")).unwrap();
    eventually(|| state_of(&h, &name) == Some(State::Suspended)).await;
    let summary = h.dispatcher.list(None).remove(0);
    assert_eq!(summary.error_code, codes::POOL_UNAVAILABLE);
    assert!(summary.status.starts_with("Suspended (pool unavailable)"));

    h.dispatcher.retry(&name, false).unwrap();
    h.dispatcher.retry(&name, false).unwrap();

    eventually(|| {
        h.cost.read_calls() == 3
            && h
                .dispatcher
                .list(None)
                .first()
                .is_some_and(|s| s.status.starts_with("Suspended"))
    })
    .await;
    assert_eq!(h.dispatcher.list(None)[0].retry_count, 1);

    h.cost.set_location(held_by(&[("pool-a", 0.1)]));
    h.dispatcher.retry(&name, false).unwrap();
    assert_eq!(answer.await.unwrap().unwrap().pool, "pool-a");
}

// =============================================================================
// Pool status
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_pool_up_retries_requests_without_candidate() {
    let h = Harness::new(ConfigFile::default());
    h.cost.set_location(nowhere());
    let name = request_name("0011");

    let answer = h.dispatcher.submit(read_request("0011", "client-1")).unwrap();
    eventually(|| state_of(&h, &name) == Some(State::Suspended)).await;

    h.cost.set_location(held_by(&[("pool-a", 0.1)]));
    assert_eq!(h.dispatcher.pool_status_changed("pool-a", PoolStatus::Up), 1);

    assert_eq!(answer.await.unwrap().unwrap().pool, "pool-a");
}

#[tokio::test(start_paused = true)]
async fn test_pool_down_restages_elsewhere() {
    let h = Harness::new(staging_config());
    h.cost.set_location(nowhere());
    h.cost
        .set_matrix(Direction::Stage, &[("stage-1", 0.1), ("stage-2", 0.2)]);
    let name = request_name("0012");

    let answer = h.dispatcher.submit(read_request("0012", "client-1")).unwrap();
    eventually(|| state_of(&h, &name) == Some(State::WaitingForStage)).await;
    let first = h.transport.sent_of("fetch")[0].clone();
    assert_eq!(first.destination, "stage-1");

    assert_eq!(h.dispatcher.pool_status_changed("stage-1", PoolStatus::Down), 1);
    eventually(|| h.transport.sent_of("fetch").len() == 2).await;
    let second = h.transport.sent_of("fetch")[1].clone();
    assert_eq!(second.destination, "stage-2");

    assert!(!h.dispatcher.route_reply(first.correlation, fetch_ok()));
    assert!(h.dispatcher.route_reply(second.correlation, fetch_ok()));
    assert_eq!(answer.await.unwrap().unwrap().pool, "stage-2");
}

#[tokio::test(start_paused = true)]
async fn test_pool_up_retries_request_suspended_on_that_pool_once() {
    let h = Harness::new(staging_config());
    h.cost.set_location(nowhere());
    h.cost.set_matrix(Direction::Stage, &[("stage-1", 0.1)]);
    let name = request_name("0019");

    let answer = h.dispatcher.submit(read_request("0019", "client-1")).unwrap();
    eventually(|| h.transport.sent_of("fetch").len() == 1).await;
    let fetch = h.transport.sent_of("fetch")[0].clone();
    h.dispatcher
        .route_reply(fetch.correlation, fetch_failed(codes::HSM_DELAY, "tape busy"));
    eventually(|| state_of(&h, &name) == Some(State::Suspended)).await;
    let reads_before = h.cost.read_calls();

    // The request still depends on stage-1, so another pool coming up is ignored.
    assert_eq!(h.dispatcher.pool_status_changed("stage-2", PoolStatus::Up), 0);

    h.cost.set_location(held_by(&[("stage-1", 0.1)]));
    assert_eq!(h.dispatcher.pool_status_changed("stage-1", PoolStatus::Up), 1);

    assert_eq!(answer.await.unwrap().unwrap().pool, "stage-1");
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(h.cost.read_calls(), reads_before + 1);
    assert_eq!(h.transport.sent_of("fetch").len(), 1);
    assert!(h.dispatcher.list(None).is_empty());
}

// =============================================================================
// Copies and pings
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_replicate_copies_to_cheapest_destination() {
    let h = Harness::new(ConfigFile::default());
    h.cost.set_location(held_by(&[("pool-a", 0.1)]));
    h.cost
        .set_matrix(Direction::PoolToPool, &[("pool-b", 0.2), ("pool-a", 0.3)]);

    let answer = h
        .dispatcher
        .replicate(FileId::new("0013"), "client-1")
        .await
        .unwrap();

    eventually(|| h.transport.sent_of("pool-to-pool").len() == 1).await;
    let copy = h.transport.sent_of("pool-to-pool")[0].clone();
    assert_eq!(copy.destination, "pool-b");
    assert!(matches!(
        &copy.request,
        PoolRequest::PoolToPool { source, .. } if source == "pool-a"
    ));
    let listing = h.dispatcher.list(None);
    assert_eq!(listing[0].name, "0013@lan-dcap-3-p2p");
    assert_eq!(listing[0].candidate, "pool-a->pool-b");

    h.dispatcher.route_reply(
        copy.correlation,
        PoolReply::PoolToPool {
            return_code: 0,
            error: None,
        },
    );
    assert_eq!(answer.await.unwrap().unwrap().pool, "pool-b");
}

#[tokio::test(start_paused = true)]
async fn test_refused_copy_stages_from_read_row_archive() {
    // The partition has no archive; only the read row knows about one.
    let h = Harness::new(ConfigFile::default());
    h.cost.set_location(held_unreadable(
        &[("pool-a", 0.1)],
        PoolManagerParameters {
            has_hsm_backend: true,
            ..PoolManagerParameters::default()
        },
    ));
    h.cost.set_matrix_with(
        Direction::PoolToPool,
        &[("pool-a", 0.2)],
        PoolManagerParameters::default(),
    );
    h.cost.set_matrix(Direction::Stage, &[("stage-1", 0.1)]);
    let name = request_name("0020");

    let answer = h.dispatcher.submit(read_request("0020", "client-1")).unwrap();

    eventually(|| state_of(&h, &name) == Some(State::WaitingForStage)).await;
    assert!(h.transport.sent_of("pool-to-pool").is_empty());
    let fetches = h.transport.sent_of("fetch");
    assert_eq!(fetches.len(), 1);
    assert_eq!(fetches[0].destination, "stage-1");

    h.cost.set_location(held_by(&[("stage-1", 0.1)]));
    assert!(h.dispatcher.route_reply(fetches[0].correlation, fetch_ok()));
    assert_eq!(answer.await.unwrap().unwrap().pool, "stage-1");
}

#[tokio::test(start_paused = true)]
async fn test_liveness_ping_keeps_stage_waiting() {
    let mut config = staging_config();
    config.container.ping_interval_secs = 1;
    let h = Harness::new(config);
    h.cost.set_location(nowhere());
    h.cost.set_matrix(Direction::Stage, &[("stage-1", 0.1)]);

    let answer = h.dispatcher.submit(read_request("0014", "client-1")).unwrap();
    eventually(|| h.transport.sent_of("fetch").len() == 1).await;

    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert_eq!(h.dispatcher.sweep(), 1);
    eventually(|| h.transport.sent_of("check-file").len() == 1).await;

    let ping = h.transport.sent_of("check-file")[0].clone();
    assert_eq!(ping.destination, "stage-1");
    assert!(h.dispatcher.route_reply(
        ping.correlation,
        PoolReply::CheckFile {
            waiting: true,
            have: false,
        },
    ));

    eventually(|| h.dispatcher.pending().len() == 1).await;
    let fetch = h.transport.sent_of("fetch")[0].clone();
    assert_eq!(h.dispatcher.pending()[0].correlation, fetch.correlation);

    h.dispatcher.route_reply(fetch.correlation, fetch_ok());
    assert_eq!(answer.await.unwrap().unwrap().pool, "stage-1");
}

// =============================================================================
// Operator overrides
// =============================================================================

#[tokio::test(start_paused = true)]
async fn test_suspend_incoming_then_resume() {
    let h = Harness::new(ConfigFile::default());
    h.cost.set_location(held_by(&[("pool-a", 0.1)]));
    admin::execute(&h.dispatcher, "rc suspend on -all")
        .await
        .unwrap();
    let name = request_name("0015");

    let answer = h.dispatcher.submit(read_request("0015", "client-1")).unwrap();
    eventually(|| state_of(&h, &name) == Some(State::Suspended)).await;
    assert_eq!(
        h.dispatcher.list(None)[0].error_code,
        codes::SUSPEND_ENFORCED
    );
    assert!(h
        .transport
        .warnings()
        .iter()
        .any(|w| w.starts_with("Suspended (forced)")));

    admin::execute(&h.dispatcher, "rc suspend off -all")
        .await
        .unwrap();
    let output = admin::execute(&h.dispatcher, "rc retry *").await.unwrap();
    assert_eq!(output.to_string(), "1 request(s) retried");

    assert_eq!(answer.await.unwrap().unwrap().pool, "pool-a");
}

#[tokio::test(start_paused = true)]
async fn test_forced_outcome_answers_immediately() {
    let h = Harness::new(ConfigFile::default());
    h.cost.set_location(held_by(&[("pool-a", 0.1)]));
    admin::execute(&h.dispatcher, r#"rc select 0016 33 "forced by operator""#)
        .await
        .unwrap();

    let err = h
        .dispatcher
        .select_read_pool(read_request("0016", "client-1"))
        .await
        .unwrap_err();
    assert_eq!(err.code, 33);
    assert_eq!(err.message, "forced by operator");

    admin::execute(&h.dispatcher, "rc select 0016 -remove")
        .await
        .unwrap();
    let selection = h
        .dispatcher
        .select_read_pool(read_request("0016", "client-1"))
        .await
        .unwrap();
    assert_eq!(selection.pool, "pool-a");
}

#[tokio::test(start_paused = true)]
async fn test_destroy_drops_request_unanswered() {
    let h = Harness::new(ConfigFile::default());
    h.cost.set_location(nowhere());
    let name = request_name("0017");

    let answer = h.dispatcher.submit(read_request("0017", "client-1")).unwrap();
    eventually(|| state_of(&h, &name) == Some(State::Suspended)).await;

    admin::execute(&h.dispatcher, &format!("rc destroy {}", name))
        .await
        .unwrap();

    assert!(h.dispatcher.list(None).is_empty());
    assert!(answer.await.is_err());
}

#[tokio::test(start_paused = true)]
async fn test_destroy_releases_restore_slot() {
    let h = Harness::new(staging_config());
    h.cost.set_location(nowhere());
    h.cost.set_matrix(Direction::Stage, &[("stage-1", 0.1)]);
    admin::execute(&h.dispatcher, "rc set max restore 1")
        .await
        .unwrap();

    let _first = h.dispatcher.submit(read_request("0021", "client-1")).unwrap();
    eventually(|| h.transport.sent_of("fetch").len() == 1).await;
    let stale = h.transport.sent_of("fetch")[0].clone();

    h.dispatcher.destroy(&request_name("0021")).unwrap();
    assert!(h.dispatcher.pending().is_empty());

    let _second = h.dispatcher.submit(read_request("0022", "client-1")).unwrap();
    eventually(|| h.transport.sent_of("fetch").len() == 2).await;

    let pending = h.dispatcher.pending();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].request, request_name("0022"));
    assert!(!h.dispatcher.route_reply(stale.correlation, fetch_ok()));
    assert_eq!(h.dispatcher.stats().restore_exceeded, 0);
}
