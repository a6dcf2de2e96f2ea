//! End-to-end tests for the ingestion endpoint, driven through the axum
//! router with an in-memory producer.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use chrono::DateTime;
use psstream_broker::{MemoryProducer, ProducerCall};
use psstream_collector::{router, AuthorizationPolicy, CollectorState, HeaderRule};
use psstream_core::TransactionEvent;
use tower::ServiceExt;

const SYNC_MESSAGE: &str = r#"<?xml version="1.0"?>
<SYNC_MESSAGE xmlns="http://peoplesoft.com/SYNC_MESSAGE">
  <FieldTypes>
    <FIELD1 type="char"/>
  </FieldTypes>
  <MsgData>
    <Transaction><FIELD1>first</FIELD1></Transaction>
    <Transaction><FIELD1>second</FIELD1></Transaction>
  </MsgData>
</SYNC_MESSAGE>"#;

const NO_FIELD_TYPES: &str = r#"<SYNC_MESSAGE>
  <MsgData><Transaction><FIELD1>x</FIELD1></Transaction></MsgData>
</SYNC_MESSAGE>"#;

const TOPIC: &str = "ps-events";

fn app(producer: &Arc<MemoryProducer>) -> Router {
    app_with_policy(producer, AuthorizationPolicy::open())
}

fn app_with_policy(producer: &Arc<MemoryProducer>, policy: AuthorizationPolicy) -> Router {
    let state = CollectorState::new(producer.clone(), TOPIC).with_authorizer(policy);
    router(state, 1024 * 1024)
}

fn post() -> axum::http::request::Builder {
    chunked_post("1", "1")
}

fn chunked_post(data_chunk: &str, data_chunk_count: &str) -> axum::http::request::Builder {
    Request::builder()
        .method("POST")
        .uri("/")
        .header("To", "PSFT_HR")
        .header("From", "HRPROD")
        .header("MessageName", "SYNC_MESSAGE")
        .header("TransactionID", "TX-0001")
        .header("OrigTimeStamp", "2026-10-19T08:15:00.000000-0500")
        .header("DataChunk", data_chunk)
        .header("DataChunkCount", data_chunk_count)
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, String) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, String::from_utf8(body.to_vec()).unwrap())
}

fn events(producer: &MemoryProducer) -> Vec<TransactionEvent> {
    producer
        .records()
        .iter()
        .map(|r| TransactionEvent::from_wire(&r.payload).unwrap())
        .collect()
}

#[tokio::test]
async fn sync_message_publishes_each_transaction_then_flushes() {
    let producer = Arc::new(MemoryProducer::new());
    let request = post().body(Body::from(SYNC_MESSAGE)).unwrap();

    let (status, body) = send(app(&producer), request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, r#"{"status":"POST ok"}"#);

    let calls = producer.calls();
    assert_eq!(calls.len(), 3);
    assert_eq!(calls.last(), Some(&ProducerCall::Flush));

    let records = producer.records();
    assert!(records.iter().all(|r| r.topic == TOPIC && r.key == "TX-0001"));

    let events = events(&producer);
    assert_eq!(
        events.iter().map(|e| e.transaction_index).collect::<Vec<_>>(),
        vec![1, 2]
    );
    assert!(events.iter().all(|e| e.transaction_id == "TX-0001"));
    assert!(events[0].transaction.contains("first"));
    assert!(events[1].transaction.contains("second"));

    let first = DateTime::parse_from_rfc3339(&events[0].collect_time_stamp).unwrap();
    let second = DateTime::parse_from_rfc3339(&events[1].collect_time_stamp).unwrap();
    assert!(first <= second);
}

#[tokio::test]
async fn unauthorized_recipient_never_touches_broker() {
    let producer = Arc::new(MemoryProducer::new());
    let policy = AuthorizationPolicy {
        recipients: HeaderRule::allowing(["PSFT_CS"]),
        ..Default::default()
    };
    let request = post().body(Body::from(SYNC_MESSAGE)).unwrap();

    let (status, body) = send(app_with_policy(&producer, policy), request).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body, "Message not accepted by collector.");
    assert!(producer.is_untouched());
}

#[tokio::test]
async fn multi_chunk_is_rejected_before_decoding() {
    let producer = Arc::new(MemoryProducer::new());
    // Not even XML: a decode attempt would fail differently.
    let request = chunked_post("2", "3").body(Body::from("not xml")).unwrap();

    let (status, body) = send(app(&producer), request).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body.contains("Protocol violation"), "{body}");
    assert!(producer.is_untouched());
}

#[tokio::test]
async fn missing_chunk_count_is_rejected() {
    let producer = Arc::new(MemoryProducer::new());
    let request = Request::builder()
        .method("POST")
        .uri("/")
        .header("TransactionID", "TX-0001")
        .header("OrigTimeStamp", "T0")
        .header("DataChunk", "1")
        .body(Body::from(SYNC_MESSAGE))
        .unwrap();

    let (status, body) = send(app(&producer), request).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body.contains("DataChunkCount"), "{body}");
    assert!(producer.is_untouched());
}

#[tokio::test]
async fn missing_field_types_publishes_nothing() {
    let producer = Arc::new(MemoryProducer::new());
    let request = post().body(Body::from(NO_FIELD_TYPES)).unwrap();

    let (status, body) = send(app(&producer), request).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body.contains("FieldTypes"), "{body}");
    assert!(producer.is_untouched());
}

#[tokio::test]
async fn malformed_tail_keeps_earlier_events_without_flush() {
    let producer = Arc::new(MemoryProducer::new());
    let truncated = &SYNC_MESSAGE[..SYNC_MESSAGE.find("</MsgData>").unwrap()];
    let request = post().body(Body::from(truncated.to_string())).unwrap();

    let (status, _) = send(app(&producer), request).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(producer.record_count(), 2);
    assert_eq!(producer.flush_count(), 0);
}

#[tokio::test]
async fn trailing_text_after_root_is_not_acknowledged() {
    let producer = Arc::new(MemoryProducer::new());
    let body = format!("{SYNC_MESSAGE}junk");
    let request = post().body(Body::from(body)).unwrap();

    let (status, body) = send(app(&producer), request).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body.contains("outside the root element"), "{body}");
    assert_eq!(producer.flush_count(), 0);
}

#[tokio::test]
async fn dispatch_failure_is_not_acknowledged() {
    let producer = Arc::new(MemoryProducer::new().fail_dispatch_at(2));
    let request = post().body(Body::from(SYNC_MESSAGE)).unwrap();

    let (status, body) = send(app(&producer), request).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(!body.contains("POST ok"));
    assert_eq!(producer.record_count(), 1);
    assert_eq!(producer.flush_count(), 0);
}

#[tokio::test]
async fn flush_failure_is_not_acknowledged() {
    let producer = Arc::new(MemoryProducer::new().fail_flush());
    let request = post().body(Body::from(SYNC_MESSAGE)).unwrap();

    let (status, body) = send(app(&producer), request).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body.contains("Flush failed"), "{body}");
    assert_eq!(producer.record_count(), 2);
}

#[tokio::test]
async fn missing_transaction_id_is_an_error() {
    let producer = Arc::new(MemoryProducer::new());
    let request = Request::builder()
        .method("POST")
        .uri("/")
        .header("OrigTimeStamp", "T0")
        .header("DataChunk", "1")
        .header("DataChunkCount", "1")
        .body(Body::from(SYNC_MESSAGE))
        .unwrap();

    let (status, body) = send(app(&producer), request).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body.contains("TransactionID"), "{body}");
    assert!(producer.is_untouched());
}

#[tokio::test]
async fn get_is_a_health_probe_on_any_path() {
    let producer = Arc::new(MemoryProducer::new());
    for uri in ["/", "/PSIGW/HttpListeningConnector"] {
        let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
        let (status, body) = send(app(&producer), request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, r#"{"status":"GET ok"}"#);
    }
    assert!(producer.is_untouched());
}

#[tokio::test]
async fn concurrent_requests_share_one_producer() {
    let producer = Arc::new(MemoryProducer::new());
    let app = app(&producer);

    let request = |id: &str| {
        Request::builder()
            .method("POST")
            .uri("/")
            .header("TransactionID", id)
            .header("OrigTimeStamp", "T0")
            .header("DataChunk", "1")
            .header("DataChunkCount", "1")
            .body(Body::from(SYNC_MESSAGE))
            .unwrap()
    };

    let (a, b) = futures::future::join(
        send(app.clone(), request("TX-A")),
        send(app.clone(), request("TX-B")),
    )
    .await;
    assert_eq!(a.0, StatusCode::OK);
    assert_eq!(b.0, StatusCode::OK);

    let events = events(&producer);
    assert_eq!(events.len(), 4);
    for id in ["TX-A", "TX-B"] {
        let indices: Vec<_> = events
            .iter()
            .filter(|e| e.transaction_id == id)
            .map(|e| e.transaction_index)
            .collect();
        assert_eq!(indices, vec![1, 2]);
    }
}
