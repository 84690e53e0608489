use crest_contacts::{api, auth, CsrfStore, Error, Settings};
use serde_json::json;
use wiremock::{
    matchers::{header, method, path},
    Mock, MockServer, ResponseTemplate,
};

fn settings_for(server: &MockServer) -> Settings {
    Settings {
        server: server.uri(),
        ..Settings::default()
    }
}

#[tokio::test]
async fn csrf_mismatch_issues_no_api_calls() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;
    let dir = tempfile::tempdir().unwrap();
    let store = CsrfStore::new(dir.path(), "contactjs");
    store.save("S1").unwrap();

    let result = api::connect(
        &settings_for(&server),
        "https://app.test/#access_token=tok&state=S2",
        &store,
    )
    .await;

    assert!(matches!(result, Err(Error::CsrfMismatch)));
    assert_eq!(store.load().unwrap().as_deref(), Some("S1"));
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn login_then_discovery_walks_root_and_character() {
    let server = MockServer::start().await;
    let base = server.uri();
    Mock::given(method("GET"))
        .and(path("/"))
        .and(header("authorization", "Bearer tok"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "character": { "href": format!("{base}/characters/7/") },
            "search": { "href": format!("{base}/search/") }
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/characters/7/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "name": "Jim",
            "contacts": { "href": format!("{base}/characters/7/contacts/") },
            "notifications": { "href": format!("{base}/characters/7/notifications/") }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let store = CsrfStore::new(dir.path(), "contactjs");
    let settings = settings_for(&server);
    let request = auth::begin(&settings, &store).unwrap();

    let redirect = format!(
        "https://app.test/#access_token=tok&token_type=Bearer&expires_in=1200&state={}",
        request.state
    );
    let (client, endpoints) = api::connect(&settings, &redirect, &store).await.unwrap();

    assert_eq!(client.session().token(), "tok");
    assert_eq!(endpoints.contacts, format!("{base}/characters/7/contacts/"));
    assert_eq!(
        endpoints.notifications,
        format!("{base}/characters/7/notifications/")
    );
    assert_eq!(endpoints.search, Some(format!("{base}/search/")));
    // state is single use
    assert_eq!(store.load().unwrap(), None);

    let requests = server.received_requests().await.unwrap();
    let accept = requests[0].headers.get("accept").unwrap().to_str().unwrap();
    assert!(accept.starts_with("application/vnd.ccp.eve.Api-v1+json"));
}

#[tokio::test]
async fn missing_token_is_rejected_before_state_check() {
    let dir = tempfile::tempdir().unwrap();
    let store = CsrfStore::new(dir.path(), "contactjs");
    store.save("S1").unwrap();

    let result = api::connect(&Settings::default(), "#state=S1", &store).await;

    assert!(matches!(result, Err(Error::MissingToken)));
    assert_eq!(store.load().unwrap().as_deref(), Some("S1"));
}
