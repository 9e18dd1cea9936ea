//! End-to-end flows against a local HMRC stand-in.

use integrations_hmrc_mtd::{
    connection_config, ApiId, ConnectionConfig, FlowOutcome, InMemoryRequestTrackerStore,
    InMemoryTokenStore, JsonFileTokenStore, MtdClient, RequestTrackerStore, ReqwestHttpTransport,
    TokenRecord, TokenStore,
};
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn config(server: &MockServer) -> ConnectionConfig {
    connection_config()
        .client_id("client-123")
        .client_secret("client-secret")
        .server_token("server-token")
        .redirect_url("https://erp.example.com")
        .hmrc_base_url(server.uri())
        .scope("hello read:vat")
        .build()
        .unwrap()
}

fn client() -> MtdClient<ReqwestHttpTransport, InMemoryTokenStore, InMemoryRequestTrackerStore> {
    MtdClient::with_components(
        ReqwestHttpTransport::new().unwrap(),
        InMemoryTokenStore::new(),
        InMemoryRequestTrackerStore::new(),
    )
}

fn seeded(access: &str, refresh: &str) -> TokenRecord {
    let mut record = TokenRecord::new(ApiId::from("hello"));
    record.access_token = Some(access.to_string());
    record.refresh_token = Some(refresh.to_string());
    record
}

async fn mount_authorize(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/oauth/authorize"))
        .and(query_param("response_type", "code"))
        .and(query_param("client_id", "client-123"))
        .and(query_param("scope", "hello read:vat"))
        .and(query_param("redirect_uri", "https://erp.example.com/auth-redirect"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>Sign in</html>"))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_user_flow_from_consent_to_success() {
    let server = MockServer::start().await;
    let config = config(&server);
    let client = client();
    let api = ApiId::from("hello");

    mount_authorize(&server).await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .and(header("content-type", "application/json"))
        .and(body_partial_json(json!({
            "grant_type": "authorization_code",
            "client_id": "client-123",
            "client_secret": "client-secret",
            "redirect_uri": "https://erp.example.com/auth-redirect",
            "code": "AUTHCODE123"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "AT1",
            "refresh_token": "RT1",
            "expires_in": 14400,
            "scope": "hello read:vat",
            "token_type": "bearer"
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/hello/user"))
        .and(header("authorization", "Bearer AT1"))
        .and(header("accept", "application/vnd.hmrc.1.0+json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"message": "Hello User"})))
        .expect(1)
        .mount(&server)
        .await;

    let outcome = client
        .action_connect("mtd_hello_user_endpoint", &api, Some(&config), None)
        .await;
    let url = match outcome {
        FlowOutcome::Redirect { url } => url,
        other => panic!("Expected redirect, got {:?}", other),
    };
    assert!(url.starts_with(&format!("{}/oauth/authorize?", server.uri())));
    assert!(url.contains("scope=hello+read%3Avat"));

    let outcome = client
        .auth_redirect(&api, "code=AUTHCODE123", Some(&config))
        .await;
    assert!(outcome.is_success(), "{:?}", outcome);
    assert!(outcome.message().unwrap().contains("Hello User"));

    let record = client.engine().tokens().get(&api).await.unwrap().unwrap();
    assert_eq!(record.access_token.as_deref(), Some("AT1"));
    assert_eq!(record.expires_in, Some(14400));
    assert!(client.engine().trackers().find_open(&api).await.unwrap().is_none());
}

#[tokio::test]
async fn test_expired_access_token_is_refreshed() {
    let server = MockServer::start().await;
    let config = config(&server);
    let client = client();
    client.engine().tokens().insert(seeded("AT1", "RT1"));

    Mock::given(method("GET"))
        .and(path("/hello/user"))
        .and(header("authorization", "Bearer AT1"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "code": "INVALID_CREDENTIALS",
            "message": "Invalid Authentication information provided"
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .and(body_partial_json(json!({
            "grant_type": "refresh_token",
            "refresh_token": "RT1"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "AT2",
            "refresh_token": "RT2",
            "expires_in": 14400
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/hello/user"))
        .and(header("authorization", "Bearer AT2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"message": "Hello User"})))
        .expect(1)
        .mount(&server)
        .await;

    let outcome = client
        .action_connect("user", &ApiId::from("hello"), Some(&config), None)
        .await;

    assert!(outcome.is_success(), "{:?}", outcome);
}

#[tokio::test]
async fn test_rejected_refresh_token_restarts_authorization() {
    let server = MockServer::start().await;
    let config = config(&server);
    let client = client();
    client.engine().tokens().insert(seeded("AT1", "RT1"));

    mount_authorize(&server).await;
    Mock::given(method("GET"))
        .and(path("/hello/user"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "code": "INVALID_CREDENTIALS",
            "message": "Invalid Authentication information provided"
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "code": "INVALID_REQUEST",
            "message": "Bad Request"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let outcome = client
        .action_connect("user", &ApiId::from("hello"), Some(&config), None)
        .await;

    assert!(outcome.is_redirect(), "{:?}", outcome);
}

#[tokio::test]
async fn test_application_endpoint_error_report() {
    let server = MockServer::start().await;
    let config = config(&server);
    let client = client();

    Mock::given(method("GET"))
        .and(path("/hello/application"))
        .and(header("authorization", "Bearer server-token"))
        .respond_with(ResponseTemplate::new(403).set_body_json(json!({
            "code": "UNAUTHORIZED",
            "message": "Bearer token is missing or not authorized"
        })))
        .mount(&server)
        .await;

    let outcome = client
        .action_connect("application", &ApiId::from("hello"), Some(&config), None)
        .await;

    let report = outcome.message().unwrap();
    assert!(outcome.is_error());
    assert!(report.contains("Sorry. The connection failed !"));
    assert!(report.contains(&format!("{}/hello/application", server.uri())));
    assert!(report.contains("Error Code:\n403"));
    assert!(report.contains("Bearer token is missing or not authorized"));
    assert!(!report.contains("server-token"));
}

#[tokio::test]
async fn test_slow_endpoint_times_out() {
    let server = MockServer::start().await;
    let config = connection_config()
        .client_id("client-123")
        .client_secret("client-secret")
        .server_token("server-token")
        .redirect_url("https://erp.example.com")
        .hmrc_base_url(server.uri())
        .scope("hello")
        .timeout(Duration::from_millis(200))
        .build()
        .unwrap();
    let client = client();

    Mock::given(method("GET"))
        .and(path("/hello/world"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"message": "Hello World"}))
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&server)
        .await;

    let outcome = client
        .action_connect("helloworld", &ApiId::from("hello"), Some(&config), None)
        .await;

    assert!(outcome.is_error());
    assert!(outcome.message().unwrap().contains("Error Code:\nNo response"));
}

#[tokio::test]
async fn test_tokens_persist_in_json_file() {
    let server = MockServer::start().await;
    let config = config(&server);
    let dir = tempfile::tempdir().unwrap();
    let store_path = dir.path().join("mtd-tokens.json");
    let api = ApiId::from("hello");

    mount_authorize(&server).await;
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "AT1",
            "refresh_token": "RT1",
            "expires_in": 14400
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/hello/user"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"message": "Hello User"})))
        .mount(&server)
        .await;

    let client = MtdClient::with_components(
        ReqwestHttpTransport::new().unwrap(),
        JsonFileTokenStore::new(&store_path),
        InMemoryRequestTrackerStore::new(),
    );
    assert!(client
        .action_connect("user", &api, Some(&config), None)
        .await
        .is_redirect());
    assert!(client
        .auth_redirect(&api, "code=AUTHCODE123", Some(&config))
        .await
        .is_success());

    let reopened = JsonFileTokenStore::new(&store_path);
    let record = reopened.get(&api).await.unwrap().unwrap();
    assert_eq!(record.refresh_token.as_deref(), Some("RT1"));
    assert_eq!(record.authorization_code.as_deref(), Some("AUTHCODE123"));
}
