//! Request dispatch through the rotation.

mod common;

use common::{ep, Behavior, ScriptedTransport};
use http::{HeaderValue, Method, StatusCode};
use reqwest_proxy_rotator::{
    FailureReason, PoolError, ProxyPoolConfig, ProxySelectionStrategy, RequestOptions,
    RequestOutcome, RequestRouter,
};
use std::sync::Arc;
use std::time::Duration;
use tokio_test::assert_err;

const URL: &str = "http://target.test/resource";

#[tokio::test]
async fn success_returns_response_and_advances_cursor() {
    let transport = Arc::new(ScriptedTransport::new().on(&ep("a"), Behavior::Status(StatusCode::OK)));
    let router = RequestRouter::with_transport(vec![ep("a")], transport.clone(), ProxyPoolConfig::default());

    let outcome = router.request(Method::GET, URL, RequestOptions::default()).await.unwrap();

    let response = outcome.response().expect("expected a response");
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.text(), "via http://a.proxy.test:8080");
    assert_eq!(outcome.endpoint(), &ep("a"));
    assert_eq!(router.pool().cursor(), 0);
    assert_eq!(router.pool().usage(&ep("a")).success_count, 1);
    assert_eq!(transport.call_count(), 1);
}

#[tokio::test]
async fn failure_is_single_attempt_and_leaves_pool_alone() {
    let transport = Arc::new(
        ScriptedTransport::new()
            .on(&ep("a"), Behavior::Fail(FailureReason::Connect("refused".into())))
            .on(&ep("b"), Behavior::Status(StatusCode::OK)),
    );
    let router = RequestRouter::with_transport(vec![ep("a"), ep("b")], transport.clone(), ProxyPoolConfig::default());

    let outcome = router.get(URL).await.unwrap();

    match outcome {
        RequestOutcome::Failed(failed) => {
            assert_eq!(failed.endpoint, ep("a"));
            assert_eq!(failed.attempts, 1);
            assert_eq!(failed.reason, FailureReason::Connect("refused".into()));
        }
        other => panic!("expected failure, got {:?}", other),
    }
    assert_eq!(transport.call_count(), 1);
    assert_eq!(router.pool().endpoints(), vec![ep("a"), ep("b")]);
    assert_eq!(router.pool().usage(&ep("a")).failure_count, 1);
}

#[tokio::test]
async fn single_member_failure_makes_exactly_one_attempt() {
    let transport = Arc::new(ScriptedTransport::new().on(&ep("a"), Behavior::Fail(FailureReason::Timeout)));
    let router = RequestRouter::with_transport(vec![ep("a")], transport.clone(), ProxyPoolConfig::default());

    let outcome = router.get(URL).await.unwrap();

    assert!(!outcome.is_success());
    assert_eq!(transport.call_count(), 1);
    assert_eq!(router.pool().endpoints(), vec![ep("a")]);
}

#[tokio::test]
async fn error_status_is_a_failure() {
    let transport = Arc::new(ScriptedTransport::new().on(&ep("a"), Behavior::Status(StatusCode::BAD_GATEWAY)));
    let router = RequestRouter::with_transport(vec![ep("a")], transport, ProxyPoolConfig::default());

    let failed = router.get(URL).await.unwrap().into_result().unwrap_err();
    assert_eq!(failed.reason, FailureReason::Status(StatusCode::BAD_GATEWAY));
}

#[tokio::test]
async fn redirect_status_is_a_success() {
    let transport = Arc::new(ScriptedTransport::new().on(&ep("a"), Behavior::Status(StatusCode::MOVED_PERMANENTLY)));
    let router = RequestRouter::with_transport(vec![ep("a")], transport, ProxyPoolConfig::default());

    assert!(router.get(URL).await.unwrap().is_success());
}

#[tokio::test]
async fn empty_pool_propagates() {
    let transport = Arc::new(ScriptedTransport::new());
    let router = RequestRouter::with_transport(Vec::new(), transport.clone(), ProxyPoolConfig::default());

    let err = assert_err!(router.get(URL).await);
    assert_eq!(err, PoolError::EmptyPool);
    assert_eq!(transport.call_count(), 0);
}

#[tokio::test]
async fn requests_rotate_through_members() {
    let transport = Arc::new(
        ScriptedTransport::new()
            .on(&ep("a"), Behavior::Status(StatusCode::OK))
            .on(&ep("b"), Behavior::Status(StatusCode::OK))
            .on(&ep("c"), Behavior::Status(StatusCode::OK)),
    );
    let router = RequestRouter::with_transport(vec![ep("a"), ep("b"), ep("c")], transport.clone(), ProxyPoolConfig::default());

    for _ in 0..4 {
        router.get(URL).await.unwrap();
    }

    let used: Vec<_> = transport.calls().into_iter().map(|(e, _)| e).collect();
    assert_eq!(used, vec![ep("a"), ep("b"), ep("c"), ep("a")]);
}

#[tokio::test]
async fn options_pass_through_with_default_timeout() {
    let transport = Arc::new(ScriptedTransport::new().on(&ep("a"), Behavior::Status(StatusCode::OK)));
    let config = ProxyPoolConfig::builder()
        .request_timeout(Duration::from_secs(7))
        .build();
    let router = RequestRouter::with_transport(vec![ep("a")], transport.clone(), config);

    let options = RequestOptions::new()
        .header(http::header::USER_AGENT, HeaderValue::from_static("rotator-test"))
        .query("q", "1")
        .body("hello");
    router.request(Method::POST, URL, options).await.unwrap();
    router
        .request(Method::GET, URL, RequestOptions::new().timeout(Duration::from_secs(1)))
        .await
        .unwrap();

    let calls = transport.calls();
    let (_, first) = &calls[0];
    assert_eq!(first.method, Method::POST);
    assert_eq!(first.url, URL);
    assert_eq!(first.options.headers.get(http::header::USER_AGENT).unwrap(), "rotator-test");
    assert_eq!(first.options.query, vec![("q".to_string(), "1".to_string())]);
    assert_eq!(first.options.body.as_deref(), Some(&b"hello"[..]));
    assert_eq!(first.options.timeout, Some(Duration::from_secs(7)));

    let (_, second) = &calls[1];
    assert_eq!(second.options.timeout, Some(Duration::from_secs(1)));
}

#[tokio::test]
async fn retry_moves_to_next_proxy_when_enabled() {
    let transport = Arc::new(
        ScriptedTransport::new()
            .on(&ep("a"), Behavior::Fail(FailureReason::Connect("refused".into())))
            .on(&ep("b"), Behavior::Status(StatusCode::OK)),
    );
    let config = ProxyPoolConfig::builder().retry_count(2).build();
    let router = RequestRouter::with_transport(vec![ep("a"), ep("b")], transport.clone(), config);

    let outcome = router.get(URL).await.unwrap();

    assert_eq!(outcome.endpoint(), &ep("b"));
    assert!(outcome.is_success());
    assert_eq!(transport.call_count(), 2);
}

#[tokio::test]
async fn retry_gives_up_after_configured_attempts() {
    let transport = Arc::new(ScriptedTransport::new());
    let config = ProxyPoolConfig::builder().retry_count(2).build();
    let router = RequestRouter::with_transport(vec![ep("a"), ep("b")], transport.clone(), config);

    let failed = router.get(URL).await.unwrap().into_result().unwrap_err();

    assert_eq!(failed.attempts, 3);
    assert_eq!(failed.endpoint, ep("a"));
    assert_eq!(transport.call_count(), 3);
}

#[tokio::test]
async fn random_strategy_leaves_cursor() {
    let transport = Arc::new(
        ScriptedTransport::new()
            .on(&ep("a"), Behavior::Status(StatusCode::OK))
            .on(&ep("b"), Behavior::Status(StatusCode::OK)),
    );
    let config = ProxyPoolConfig::builder()
        .selection_strategy(ProxySelectionStrategy::Random)
        .build();
    let router = RequestRouter::with_transport(vec![ep("a"), ep("b")], transport, config);

    for _ in 0..5 {
        assert!(router.get(URL).await.unwrap().is_success());
    }
    assert_eq!(router.pool().cursor(), 0);
}

#[tokio::test]
async fn rate_limited_router_still_dispatches() {
    let transport = Arc::new(ScriptedTransport::new().on(&ep("a"), Behavior::Status(StatusCode::OK)));
    let config = ProxyPoolConfig::builder().max_requests_per_second(100.0).build();
    let router = RequestRouter::with_transport(vec![ep("a")], transport.clone(), config);

    for _ in 0..3 {
        assert!(router.get(URL).await.unwrap().is_success());
    }
    assert_eq!(transport.call_count(), 3);
}
