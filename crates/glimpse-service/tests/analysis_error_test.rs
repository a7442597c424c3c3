//! Vision API failures: never cached, logged, and the consumer keeps going.

mod helpers;

use glimpse_analysis::AnalysisError;
use glimpse_core::Location;
use glimpse_service::PipelineError;
use helpers::{fetch_url, reader, setup_test_app, ANALYZE_PATH, CAT_RESPONSE};
use mockito::Matcher;
use serde_json::json;

#[tokio::test]
async fn test_server_error_is_not_cached_and_consumer_continues() {
    let mut server = mockito::Server::new_async().await;
    // DEAD_LETTER_MAX_ATTEMPTS is 2 in the test config.
    let failing = server
        .mock("POST", ANALYZE_PATH)
        .match_query(Matcher::Any)
        .match_body(Matcher::Json(json!({ "url": fetch_url("images/cat.png") })))
        .with_status(500)
        .with_body("internal error")
        .expect(2)
        .create_async()
        .await;
    let succeeding = server
        .mock("POST", ANALYZE_PATH)
        .match_query(Matcher::Any)
        .match_body(Matcher::Json(json!({ "url": fetch_url("images/dog.png") })))
        .with_status(200)
        .with_body(CAT_RESPONSE)
        .expect(1)
        .create_async()
        .await;

    let test_app = setup_test_app(&server).await;
    let app = &test_app.app;

    app.ingest
        .ingest("blob://images/cat.png", reader(b"cat"))
        .await
        .unwrap();
    app.ingest
        .ingest("blob://images/dog.png", reader(b"dog"))
        .await
        .unwrap();
    test_app.settle().await;

    failing.assert_async().await;
    succeeding.assert_async().await;

    assert!(!app.cache.contains(&fetch_url("images/cat.png")));
    assert!(app.cache.contains(&fetch_url("images/dog.png")));

    let dead = app.channel.dead_letters();
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].notification.location.as_str(), "blob://images/cat.png");
    assert_eq!(dead[0].attempts, 2);
    assert!(dead[0].last_error.contains("500"), "{}", dead[0].last_error);
}

#[tokio::test]
async fn test_analyze_surfaces_status_error() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", ANALYZE_PATH)
        .match_query(Matcher::Any)
        .with_status(500)
        .with_body("internal error")
        .expect(1)
        .create_async()
        .await;

    let test_app = setup_test_app(&server).await;
    let app = &test_app.app;

    // Stored without publishing, so only the direct call reaches the API.
    let location = Location::parse("blob://images/cat.png").unwrap();
    app.store.store(&location, reader(b"cat")).await.unwrap();

    let err = app.handler.analyze(&location).await.unwrap_err();
    match err {
        PipelineError::Analysis(AnalysisError::Status { status, ref body }) => {
            assert_eq!(status, 500);
            assert_eq!(body, "internal error");
        }
        other => panic!("unexpected error: {:?}", other),
    }
    assert!(err.is_transient());
    assert!(app.cache.is_empty());

    mock.assert_async().await;
}

#[tokio::test]
async fn test_rejected_request_is_dead_lettered_without_retry() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", ANALYZE_PATH)
        .match_query(Matcher::Any)
        .with_status(400)
        .with_body(r#"{"error":{"code":"InvalidImageUrl"}}"#)
        .expect(1)
        .create_async()
        .await;

    let test_app = setup_test_app(&server).await;
    let app = &test_app.app;

    app.ingest
        .ingest("blob://images/cat.png", reader(b"cat"))
        .await
        .unwrap();
    test_app.settle().await;

    mock.assert_async().await;
    let dead = app.channel.dead_letters();
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].attempts, 1);
    assert!(app.cache.is_empty());
}

#[tokio::test]
async fn test_malformed_response_is_not_cached() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", ANALYZE_PATH)
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body(r#"{"categories": []}"#)
        .create_async()
        .await;

    let test_app = setup_test_app(&server).await;
    let app = &test_app.app;

    let location = Location::parse("blob://images/cat.png").unwrap();
    app.store.store(&location, reader(b"cat")).await.unwrap();

    let err = app.handler.analyze(&location).await.unwrap_err();
    assert!(matches!(
        err,
        PipelineError::Analysis(AnalysisError::Malformed(_))
    ));
    assert!(!err.is_transient());
    assert!(app.cache.is_empty());
}
