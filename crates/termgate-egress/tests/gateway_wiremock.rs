//! Integration tests for the terminology gateway using wiremock
//!
//! These tests mock the auth endpoint and the terminology server to verify
//! session reuse, the single forced refresh on 403, and header handling.

use futures::StreamExt;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use termgate_egress::{
    AuthError, EgressError, Method, StatusCode, TerminologyConfig, TerminologyGateway,
    language::DEFAULT_ACCEPT_LANGUAGE,
};
use termgate_observability::GatewayMetrics;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{body_json, header, method, path},
};

fn config(server: &MockServer) -> TerminologyConfig {
    TerminologyConfig::new(
        format!("{}/api", server.uri()),
        format!("{}/auth", server.uri()),
    )
    .with_credentials("svc-refset", "s3cret")
}

fn login_response(cookie: &str) -> ResponseTemplate {
    ResponseTemplate::new(200)
        .insert_header("set-cookie", format!("{}; Path=/; HttpOnly", cookie).as_str())
        .set_body_json(json!({"login": "svc-refset"}))
}

async fn mount_login(server: &MockServer, cookie: &str, expected_calls: u64) {
    Mock::given(method("POST"))
        .and(path("/auth/authenticate"))
        .respond_with(login_response(cookie))
        .expect(expected_calls)
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_login_posts_credentials_and_sends_cookie() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/auth/authenticate"))
        .and(body_json(json!({"login": "svc-refset", "password": "s3cret"})))
        .respond_with(
            ResponseTemplate::new(200)
                .append_header("set-cookie", "dev-ims=abc123; Path=/; HttpOnly")
                .append_header("set-cookie", "XSRF-TOKEN=xyz; Path=/"),
        )
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/api/refsets/123"))
        .and(header("cookie", "dev-ims=abc123;XSRF-TOKEN=xyz;"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "123"})))
        .expect(1)
        .mount(&server)
        .await;

    let gateway = TerminologyGateway::new(config(&server)).unwrap();
    let response = gateway.get("/refsets/123", None).await.unwrap();

    assert_eq!(response.status, StatusCode::OK);
    let body: serde_json::Value = response.json().unwrap();
    assert_eq!(body["id"], "123");
}

#[tokio::test]
async fn test_session_reused_across_calls() {
    let server = MockServer::start().await;
    mount_login(&server, "s=1", 1).await;

    Mock::given(method("GET"))
        .and(path("/api/concepts"))
        .and(header("cookie", "s=1;"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(3)
        .mount(&server)
        .await;

    let gateway = TerminologyGateway::new(config(&server)).unwrap();
    for _ in 0..3 {
        let response = gateway.get("/concepts", None).await.unwrap();
        assert!(response.is_success());
    }

    let sessions = gateway.sessions().unwrap();
    assert_eq!(sessions.generation(), 1);
}

#[tokio::test]
async fn test_forbidden_refreshes_session_and_retries_once() {
    let server = MockServer::start().await;

    // First login hands out a session the server will reject
    Mock::given(method("POST"))
        .and(path("/auth/authenticate"))
        .respond_with(login_response("s=stale"))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    mount_login(&server, "s=fresh", 1).await;

    Mock::given(method("GET"))
        .and(path("/api/refsets"))
        .and(header("cookie", "s=stale;"))
        .respond_with(ResponseTemplate::new(403))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/refsets"))
        .and(header("cookie", "s=fresh;"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"items": []})))
        .expect(1)
        .mount(&server)
        .await;

    let gateway = TerminologyGateway::new(config(&server)).unwrap();
    let response = gateway.get("/refsets", None).await.unwrap();

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(gateway.sessions().unwrap().generation(), 2);
}

#[tokio::test]
async fn test_second_forbidden_returned_to_caller() {
    let server = MockServer::start().await;
    mount_login(&server, "s=1", 2).await;

    Mock::given(method("DELETE"))
        .and(path("/api/refsets/9"))
        .respond_with(ResponseTemplate::new(403).set_body_string("no access"))
        .expect(2)
        .mount(&server)
        .await;

    let gateway = TerminologyGateway::new(config(&server)).unwrap();
    let response = gateway.delete("/refsets/9", None).await.unwrap();

    assert_eq!(response.status, StatusCode::FORBIDDEN);
    assert_eq!(response.text(), "no access");
}

#[tokio::test]
async fn test_other_error_statuses_not_retried() {
    let server = MockServer::start().await;
    mount_login(&server, "s=1", 1).await;

    for (resource, status) in [("unauthorized", 401), ("missing", 404), ("broken", 500)] {
        Mock::given(method("GET"))
            .and(path(format!("/api/{}", resource)))
            .respond_with(ResponseTemplate::new(status))
            .expect(1)
            .mount(&server)
            .await;
    }

    let gateway = TerminologyGateway::new(config(&server)).unwrap();
    for (resource, status) in [("unauthorized", 401), ("missing", 404), ("broken", 500)] {
        let response = gateway.get(resource, None).await.unwrap();
        assert_eq!(response.status.as_u16(), status);
    }
}

#[tokio::test]
async fn test_auth_disabled_sends_no_cookie() {
    let server = MockServer::start().await;
    mount_login(&server, "s=1", 0).await;

    Mock::given(method("GET"))
        .and(path("/api/editions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let gateway =
        TerminologyGateway::new(TerminologyConfig::new(format!("{}/api", server.uri()), "none"))
            .unwrap();
    let response = gateway.get("/editions", None).await.unwrap();
    assert!(response.is_success());

    let requests = server.received_requests().await.unwrap();
    let resource_call = requests
        .iter()
        .find(|request| request.url.path() == "/api/editions")
        .unwrap();
    assert!(resource_call.headers.get("cookie").is_none());
}

#[tokio::test]
async fn test_accept_language_default_and_override() {
    let server = MockServer::start().await;
    mount_login(&server, "s=1", 1).await;

    Mock::given(method("GET"))
        .and(path("/api/concepts/73211009"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .expect(2)
        .mount(&server)
        .await;

    let gateway = TerminologyGateway::new(config(&server)).unwrap();
    gateway.get("/concepts/73211009", None).await.unwrap();
    gateway.get("/concepts/73211009", Some("fr")).await.unwrap();

    let languages: Vec<String> = server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .filter(|request| request.url.path() == "/api/concepts/73211009")
        .map(|request| {
            request
                .headers
                .get("accept-language")
                .and_then(|value| value.to_str().ok())
                .unwrap_or_default()
                .to_string()
        })
        .collect();

    assert_eq!(languages, vec![DEFAULT_ACCEPT_LANGUAGE.to_string(), "fr".to_string()]);
}

#[tokio::test]
async fn test_post_json_sends_body() {
    let server = MockServer::start().await;
    mount_login(&server, "s=1", 1).await;

    Mock::given(method("POST"))
        .and(path("/api/refsets"))
        .and(header("content-type", "application/json"))
        .and(body_json(json!({"name": "Diabetes"})))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": "r-1"})))
        .expect(1)
        .mount(&server)
        .await;

    let gateway = TerminologyGateway::new(config(&server)).unwrap();
    let created: serde_json::Value = gateway
        .post_json("/refsets", &json!({"name": "Diabetes"}), None)
        .await
        .unwrap();
    assert_eq!(created["id"], "r-1");
}

#[tokio::test]
async fn test_get_json_fails_on_error_status() {
    let server = MockServer::start().await;
    mount_login(&server, "s=1", 1).await;

    Mock::given(method("GET"))
        .and(path("/api/refsets/404"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&server)
        .await;

    let gateway = TerminologyGateway::new(config(&server)).unwrap();
    let result: Result<serde_json::Value, _> = gateway.get_json("/refsets/404", None).await;
    assert!(matches!(result, Err(EgressError::Status { status: 404, .. })));
}

#[tokio::test]
async fn test_login_rejection_surfaces_auth_error() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/auth/authenticate"))
        .respond_with(ResponseTemplate::new(401))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/refsets"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let gateway = TerminologyGateway::new(config(&server)).unwrap();
    let err = gateway.get("/refsets", None).await.unwrap_err();

    assert!(matches!(
        err,
        EgressError::Auth(AuthError::Rejected { status: 401, .. })
    ));
}

#[tokio::test]
async fn test_concurrent_calls_share_one_login() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/auth/authenticate"))
        .respond_with(login_response("s=1").set_delay(Duration::from_millis(100)))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/projects"))
        .and(header("cookie", "s=1;"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(10)
        .mount(&server)
        .await;

    let gateway = Arc::new(TerminologyGateway::new(config(&server)).unwrap());
    let calls = (0..10).map(|_| {
        let gateway = gateway.clone();
        tokio::spawn(async move { gateway.get("/projects", None).await })
    });

    for result in futures::future::join_all(calls).await {
        assert!(result.unwrap().unwrap().is_success());
    }
}

#[tokio::test]
async fn test_download_streams_after_refresh() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/auth/authenticate"))
        .respond_with(login_response("s=stale"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    mount_login(&server, "s=fresh", 1).await;

    Mock::given(method("GET"))
        .and(path("/api/exports/7"))
        .and(header("cookie", "s=stale;"))
        .respond_with(ResponseTemplate::new(403))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/exports/7"))
        .and(header("cookie", "s=fresh;"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "application/zip")
                .set_body_bytes(b"PK\x03\x04payload".to_vec()),
        )
        .expect(1)
        .mount(&server)
        .await;

    let gateway = TerminologyGateway::new(config(&server)).unwrap();
    let download = gateway
        .download("/exports/7", None)
        .await
        .unwrap()
        .error_for_status()
        .unwrap();
    assert_eq!(download.content_type(), Some("application/zip"));

    let mut stream = download.into_stream();
    let mut bytes = Vec::new();
    while let Some(chunk) = stream.next().await {
        bytes.extend_from_slice(&chunk.unwrap());
    }
    assert_eq!(bytes, b"PK\x03\x04payload");

    let requests = server.received_requests().await.unwrap();
    let accept = requests
        .iter()
        .filter(|request| request.url.path() == "/api/exports/7")
        .map(|request| request.headers.get("accept").and_then(|v| v.to_str().ok()))
        .collect::<Vec<_>>();
    assert!(
        accept
            .iter()
            .all(|value| *value == Some("application/zip, application/octet-stream"))
    );
}

#[tokio::test]
async fn test_absolute_url_used_verbatim() {
    let server = MockServer::start().await;
    mount_login(&server, "s=1", 1).await;

    Mock::given(method("PUT"))
        .and(path("/elsewhere/refsets/1"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let gateway = TerminologyGateway::new(config(&server)).unwrap();
    let url = format!("{}/elsewhere/refsets/1", server.uri());
    let response = gateway.put(&url, &json!({"active": false}), None).await.unwrap();
    assert_eq!(response.status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn test_request_timeout() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/slow"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
        .mount(&server)
        .await;

    let gateway = TerminologyGateway::new(
        TerminologyConfig::new(format!("{}/api", server.uri()), "none").with_timeout_secs(1),
    )
    .unwrap();
    let err = gateway.call(Method::GET, "/slow", None, None).await.unwrap_err();

    assert!(matches!(err, EgressError::Timeout { secs: 1, .. }));
}

#[tokio::test]
async fn test_download_uses_its_own_timeout() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/exports/large"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "application/zip")
                .set_body_bytes(b"PK\x03\x04".to_vec())
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&server)
        .await;

    let gateway = TerminologyGateway::new(
        TerminologyConfig::new(format!("{}/api", server.uri()), "none")
            .with_timeout_secs(1)
            .with_download_timeout_secs(10),
    )
    .unwrap();

    let download = gateway
        .download("/exports/large", None)
        .await
        .unwrap()
        .error_for_status()
        .unwrap();
    let chunks: Vec<_> = download.into_stream().collect().await;
    let body: Vec<u8> = chunks
        .into_iter()
        .flat_map(|chunk| chunk.unwrap().to_vec())
        .collect();
    assert_eq!(body, b"PK\x03\x04");

    // Structured calls keep the shorter limit
    let err = gateway.get("/exports/large", None).await.unwrap_err();
    assert!(matches!(err, EgressError::Timeout { secs: 1, .. }));
}

#[tokio::test]
async fn test_download_timeout_reported() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/api/exports/stuck"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
        .mount(&server)
        .await;

    let gateway = TerminologyGateway::new(
        TerminologyConfig::new(format!("{}/api", server.uri()), "none")
            .with_timeout_secs(30)
            .with_download_timeout_secs(1),
    )
    .unwrap();

    let err = gateway.download("/exports/stuck", None).await.unwrap_err();
    assert!(matches!(err, EgressError::Timeout { secs: 1, .. }));
}

#[tokio::test]
async fn test_metrics_recorded() {
    let server = MockServer::start().await;
    mount_login(&server, "s=stale", 2).await;

    Mock::given(method("GET"))
        .and(path("/api/teams"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    let metrics = Arc::new(GatewayMetrics::new().unwrap());
    let gateway = TerminologyGateway::builder(config(&server))
        .metrics(metrics.clone())
        .build()
        .unwrap();
    gateway.get("/teams", None).await.unwrap();

    assert_eq!(
        metrics.logins_total.with_label_values(&["success"]).get(),
        2.0
    );
    assert_eq!(metrics.forced_refreshes_total.get(), 1.0);
    assert_eq!(
        metrics.requests_total.with_label_values(&["GET", "403"]).get(),
        1.0
    );
}
