mod common;

use common::mock_server::{FlitsmeisterMock, OBJECT_ID};
use flitsmeister::{Error, FlitsmeisterClient, DEFAULT_REQUEST_TIMEOUT};
use reqwest::Method;
use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

#[test]
fn test_default_request_timeout_is_ten_seconds() {
    let client = FlitsmeisterClient::new();
    assert_eq!(client.request_timeout(), Duration::from_secs(10));
    assert_eq!(DEFAULT_REQUEST_TIMEOUT, Duration::from_secs(10));
    assert!(!client.has_session());
}

#[tokio::test]
async fn test_lazily_created_session_is_owned_and_closed() {
    let mock = FlitsmeisterMock::start().await;
    mock.mount_json("GET", "/ping", &json!({ "ok": true }), 1).await;

    let mut client = mock.client();
    assert!(!client.has_session());

    client.request(Method::GET, "ping", None).await.unwrap();
    assert!(client.has_session());
    assert!(client.owns_session());

    client.close();
    assert!(!client.has_session());

    // Closing twice is a no-op.
    client.close();
    assert!(!client.has_session());
}

#[tokio::test]
async fn test_supplied_session_is_never_closed() {
    let mock = FlitsmeisterMock::start().await;
    mock.mount_json("GET", "/ping", &json!({ "ok": true }), 2).await;

    let http = reqwest::Client::new();
    let mut client = mock.client().with_session(http.clone());
    client.request(Method::GET, "ping", None).await.unwrap();

    client.close();
    client.close();
    assert!(client.has_session());
    assert!(!client.owns_session());
    drop(client);

    // The caller's session keeps working after the client is gone.
    let response = http
        .get(format!("{}ping", mock.base_url()))
        .send()
        .await
        .unwrap();
    assert!(response.status().is_success());
}

#[tokio::test]
async fn test_request_returns_text_for_non_json_content() {
    let mock = FlitsmeisterMock::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200).set_body_string("OK"))
        .mount(&mock.server)
        .await;

    let mut client = mock.client();
    let body = client.request(Method::GET, "health", None).await.unwrap();

    assert_eq!(body, flitsmeister::ResponseBody::Text("OK".to_string()));
}

#[tokio::test]
async fn test_slow_response_times_out() {
    let mock = FlitsmeisterMock::start().await;
    Mock::given(method("GET"))
        .and(path(format!("/parse/classes/_User/{OBJECT_ID}")))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "objectId": OBJECT_ID }))
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&mock.server)
        .await;

    let timeout = Duration::from_millis(100);
    let mut client = mock.authenticated_client().with_request_timeout(timeout);
    let err = client.user().await.unwrap_err();

    assert!(matches!(err, Error::Timeout(d) if d == timeout));
}

#[tokio::test]
async fn test_connection_refused_is_transport_error() {
    let mut client = FlitsmeisterClient::new()
        .with_base_url("http://127.0.0.1:1")
        .with_request_timeout(Duration::from_secs(5));
    let err = client
        .login("flits@example.com", "hunter2")
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Transport(_)));
    let source = std::error::Error::source(&err).expect("transport error keeps its cause");
    assert!(source.downcast_ref::<reqwest::Error>().is_some());
}

#[tokio::test]
async fn test_session_is_recreated_after_close() {
    let mock = FlitsmeisterMock::start().await;
    mock.mount_json("GET", "/ping", &json!({ "ok": true }), 2).await;

    let mut client = mock.client();
    client.request(Method::GET, "ping", None).await.unwrap();
    client.close();
    client.request(Method::GET, "ping", None).await.unwrap();

    assert!(client.owns_session());
}
