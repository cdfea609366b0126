mod support;

use std::time::Duration;

use futures::future::join_all;
use pharmadmin_core::api::RequestSpec;
use pharmadmin_core::{ApiError, CredentialPair, SessionStatus};
use support::{FakeBackend, Harness, ALWAYS_UNAUTHORIZED_PATH, FAILING_PATH, PASSWORD, PROTECTED_PATH};

fn bearers(harness: &Harness, path: &str) -> Vec<Option<String>> {
    harness
        .backend
        .requests_to(path)
        .into_iter()
        .map(|r| r.bearer)
        .collect()
}

#[tokio::test]
async fn expired_access_token_is_renewed_and_request_retried() {
    let harness = Harness::new(FakeBackend::new());
    harness.store.login("doc@x.com", PASSWORD).await.unwrap();
    assert_eq!(
        harness.store.credentials(),
        Some(CredentialPair {
            access: "a1".into(),
            refresh: "r1".into()
        })
    );

    harness.backend.expire_access_tokens();
    let response = harness.gateway.send(&RequestSpec::get(PROTECTED_PATH)).await.unwrap();

    assert_eq!(response.status(), 200);
    assert_eq!(harness.backend.refresh_calls(), 1);
    assert_eq!(harness.backend.refresh_tokens_seen(), vec!["r1".to_string()]);
    assert_eq!(
        bearers(&harness, PROTECTED_PATH),
        vec![Some("a1".to_string()), Some("a2".to_string())]
    );

    // Access replaced, refresh retained, in memory and on disk
    let expected = CredentialPair {
        access: "a2".into(),
        refresh: "r1".into(),
    };
    assert_eq!(harness.store.credentials(), Some(expected.clone()));
    let cached = pharmadmin_core::CacheManager::new(harness.cache.clone())
        .load_tokens()
        .unwrap()
        .unwrap();
    assert_eq!(cached.data, expected);
}

#[tokio::test]
async fn concurrent_unauthorized_requests_share_one_renewal() {
    let harness = Harness::new(FakeBackend::with_refresh_delay(Duration::from_millis(50)));
    harness.store.login("ph@x.com", PASSWORD).await.unwrap();
    harness.backend.expire_access_tokens();

    let request = RequestSpec::get(PROTECTED_PATH);
    let responses = join_all((0..8).map(|_| harness.gateway.send(&request))).await;

    for response in responses {
        assert_eq!(response.unwrap().status(), 200);
    }
    assert_eq!(harness.backend.refresh_calls(), 1);

    let sent = bearers(&harness, PROTECTED_PATH);
    assert_eq!(sent.len(), 16);
    assert_eq!(sent.iter().filter(|b| b.as_deref() == Some("a1")).count(), 8);
    assert_eq!(sent.iter().filter(|b| b.as_deref() == Some("a2")).count(), 8);
}

#[tokio::test]
async fn concurrent_requests_across_tasks_share_one_renewal() {
    let harness = Harness::new(FakeBackend::with_refresh_delay(Duration::from_millis(50)));
    harness.store.login("ph@x.com", PASSWORD).await.unwrap();
    harness.backend.expire_access_tokens();

    let handles: Vec<_> = (0..6)
        .map(|_| {
            let gateway = harness.gateway.clone();
            tokio::spawn(async move { gateway.send(&RequestSpec::get(PROTECTED_PATH)).await })
        })
        .collect();

    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap().status(), 200);
    }
    assert_eq!(harness.backend.refresh_calls(), 1);
}

#[tokio::test]
async fn each_expiry_triggers_its_own_renewal() {
    let harness = Harness::new(FakeBackend::new());
    harness.store.login("doc@x.com", PASSWORD).await.unwrap();

    harness.backend.expire_access_tokens();
    harness.gateway.send(&RequestSpec::get(PROTECTED_PATH)).await.unwrap();
    harness.backend.expire_access_tokens();
    let response = harness.gateway.send(&RequestSpec::get(PROTECTED_PATH)).await.unwrap();

    assert_eq!(response.status(), 200);
    assert_eq!(harness.backend.refresh_calls(), 2);
    assert_eq!(harness.store.access_token().as_deref(), Some("a3"));
}

#[tokio::test]
async fn rejected_refresh_token_logs_out_and_surfaces_original_401() {
    let harness = Harness::new(FakeBackend::new());
    harness.store.login("doc@x.com", PASSWORD).await.unwrap();
    harness.backend.expire_access_tokens();
    harness.backend.revoke_refresh_tokens();

    let response = harness.gateway.send(&RequestSpec::get(PROTECTED_PATH)).await.unwrap();

    assert_eq!(response.status(), 401);
    assert_eq!(harness.backend.refresh_calls(), 1);
    assert_eq!(harness.store.status(), SessionStatus::LoggedOut);
    assert!(harness.cache.is_empty());
    // The original request was not redispatched
    assert_eq!(bearers(&harness, PROTECTED_PATH), vec![Some("a1".to_string())]);
}

#[tokio::test]
async fn concurrent_requests_with_rejected_refresh_token_renew_once() {
    let harness = Harness::new(FakeBackend::with_refresh_delay(Duration::from_millis(30)));
    harness.store.login("doc@x.com", PASSWORD).await.unwrap();
    harness.backend.expire_access_tokens();
    harness.backend.revoke_refresh_tokens();

    let request = RequestSpec::get(PROTECTED_PATH);
    let responses = join_all((0..5).map(|_| harness.gateway.send(&request))).await;

    for response in responses {
        assert_eq!(response.unwrap().status(), 401);
    }
    assert_eq!(harness.backend.refresh_calls(), 1);
    assert!(!harness.store.is_logged_in());
}

#[tokio::test]
async fn logged_out_requests_carry_no_authorization() {
    let harness = Harness::new(FakeBackend::new());

    let response = harness.gateway.send(&RequestSpec::get(PROTECTED_PATH)).await.unwrap();

    assert_eq!(response.status(), 401);
    assert_eq!(bearers(&harness, PROTECTED_PATH), vec![None]);
    assert_eq!(harness.backend.refresh_calls(), 0);
}

#[tokio::test]
async fn requests_after_logout_carry_no_authorization() {
    let harness = Harness::new(FakeBackend::new());
    harness.store.login("doc@x.com", PASSWORD).await.unwrap();
    harness.store.logout();

    harness.gateway.send(&RequestSpec::get(PROTECTED_PATH)).await.unwrap();

    assert_eq!(bearers(&harness, PROTECTED_PATH), vec![None]);
    assert_eq!(harness.backend.refresh_calls(), 0);
}

#[tokio::test]
async fn retried_request_is_not_retried_again() {
    let harness = Harness::new(FakeBackend::new());
    harness.store.login("doc@x.com", PASSWORD).await.unwrap();

    let response = harness
        .gateway
        .send(&RequestSpec::get(ALWAYS_UNAUTHORIZED_PATH))
        .await
        .unwrap();

    assert_eq!(response.status(), 401);
    assert_eq!(harness.backend.refresh_calls(), 1);
    assert_eq!(harness.backend.requests_to(ALWAYS_UNAUTHORIZED_PATH).len(), 2);
    // Renewal itself succeeded, so the session survives
    assert!(harness.store.is_logged_in());
}

#[tokio::test]
async fn other_failures_pass_through_untouched() {
    let harness = Harness::new(FakeBackend::new());
    harness.store.login("doc@x.com", PASSWORD).await.unwrap();

    let response = harness.gateway.send(&RequestSpec::get(FAILING_PATH)).await.unwrap();

    assert_eq!(response.status(), 500);
    assert_eq!(response.text(), "Internal Server Error");
    assert_eq!(harness.backend.refresh_calls(), 0);
    assert!(matches!(response.error_for_status(), Err(ApiError::ServerError(_))));
}

#[tokio::test]
async fn renew_without_session_is_a_renewal_error() {
    let harness = Harness::new(FakeBackend::new());

    let result = harness.store.renew().await;

    assert!(matches!(result, Err(ApiError::Renewal(_))));
    assert_eq!(harness.backend.refresh_calls(), 0);
}

#[tokio::test]
async fn concurrent_requests_share_a_refresh_server_error() {
    let harness = Harness::new(FakeBackend::with_refresh_delay(Duration::from_millis(30)));
    harness.store.login("doc@x.com", PASSWORD).await.unwrap();
    harness.backend.expire_access_tokens();
    harness.backend.fail_refresh_with(503);

    let request = RequestSpec::get(PROTECTED_PATH);
    let responses = join_all((0..5).map(|_| harness.gateway.send(&request))).await;

    for response in responses {
        assert_eq!(response.unwrap().status(), 401);
    }
    assert_eq!(harness.backend.refresh_calls(), 1);
    assert_eq!(bearers(&harness, PROTECTED_PATH).len(), 5);
}

#[tokio::test]
async fn concurrent_requests_share_a_refresh_network_failure() {
    let harness = Harness::new(FakeBackend::with_refresh_delay(Duration::from_millis(30)));
    harness.store.login("ph@x.com", PASSWORD).await.unwrap();
    harness.backend.expire_access_tokens();
    harness.backend.drop_refresh_connections();

    let request = RequestSpec::get(PROTECTED_PATH);
    let responses = join_all((0..5).map(|_| harness.gateway.send(&request))).await;

    for response in responses {
        assert_eq!(response.unwrap().status(), 401);
    }
    assert_eq!(harness.backend.refresh_calls(), 1);
}

#[tokio::test]
async fn refresh_server_error_keeps_session_and_surfaces_401() {
    let harness = Harness::new(FakeBackend::new());
    harness.store.login("doc@x.com", PASSWORD).await.unwrap();
    harness.backend.expire_access_tokens();
    harness.backend.fail_refresh_with(502);

    let response = harness.gateway.send(&RequestSpec::get(PROTECTED_PATH)).await.unwrap();

    assert_eq!(response.status(), 401);
    assert_eq!(harness.store.status(), SessionStatus::LoggedIn);
    assert_eq!(harness.store.access_token().as_deref(), Some("a1"));
    assert_eq!(harness.cache.len(), 2);
    assert_eq!(bearers(&harness, PROTECTED_PATH), vec![Some("a1".to_string())]);
}

#[tokio::test]
async fn refresh_network_failure_keeps_session_and_surfaces_401() {
    let harness = Harness::new(FakeBackend::new());
    harness.store.login("doc@x.com", PASSWORD).await.unwrap();
    harness.backend.expire_access_tokens();
    harness.backend.drop_refresh_connections();

    let response = harness.gateway.send(&RequestSpec::get(PROTECTED_PATH)).await.unwrap();

    assert_eq!(response.status(), 401);
    assert!(harness.store.is_logged_in());
    assert!(matches!(harness.store.renew().await, Err(ApiError::NetworkError(_))));
    assert!(harness.store.is_logged_in());
}

#[tokio::test]
async fn failed_renewal_is_retried_by_the_next_batch() {
    let harness = Harness::new(FakeBackend::new());
    harness.store.login("doc@x.com", PASSWORD).await.unwrap();
    harness.backend.expire_access_tokens();
    harness.backend.fail_refresh_with(503);

    let first = harness.gateway.send(&RequestSpec::get(PROTECTED_PATH)).await.unwrap();
    assert_eq!(first.status(), 401);

    harness.backend.heal_refresh();
    let second = harness.gateway.send(&RequestSpec::get(PROTECTED_PATH)).await.unwrap();

    assert_eq!(second.status(), 200);
    assert_eq!(harness.backend.refresh_calls(), 2);
    assert_eq!(harness.store.access_token().as_deref(), Some("a2"));
}

#[tokio::test]
async fn logout_during_renewal_fails_the_request_closed() {
    let harness = Harness::new(FakeBackend::with_refresh_delay(Duration::from_millis(50)));
    harness.store.login("doc@x.com", PASSWORD).await.unwrap();
    harness.backend.expire_access_tokens();

    let gateway = harness.gateway.clone();
    let pending = tokio::spawn(async move { gateway.send(&RequestSpec::get(PROTECTED_PATH)).await });
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(harness.backend.refresh_calls(), 1);
    harness.store.logout();

    let response = pending.await.unwrap().unwrap();

    assert_eq!(response.status(), 401);
    assert_eq!(bearers(&harness, PROTECTED_PATH), vec![Some("a1".to_string())]);
    assert!(!harness.store.is_logged_in());
    assert!(harness.cache.is_empty());
}
