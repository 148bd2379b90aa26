//! Integration tests for the HTTP delivery path.

mod test_utils;

use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use logship::{DeliveryService, JwtSigner, Level, LogRecord, Logger};

use test_utils::{ephemeral_listener, pending_envelopes, spawn_server, test_config};

fn start_service(
    endpoint: &str,
    root: &std::path::Path,
) -> Arc<DeliveryService> {
    let config = test_config(endpoint, root);
    let signer = Arc::new(JwtSigner::new(&config.signing_secret));
    DeliveryService::start(&config, signer).expect("start delivery service")
}

#[test]
fn delivers_record_with_bearer_token_and_json_body() {
    let root = TempDir::new().unwrap();
    let (addr, rx) = spawn_server(ephemeral_listener(), vec![200]);
    let service = start_service(&format!("http://{addr}/log"), root.path());

    let mut record = LogRecord::new("billing", "billing.api", Level::Info, "invoice created");
    record.user_id = Some("u-7".into());
    record.context.insert("invoice_id".into(), "inv-1".into());
    let request_id = record.request_id.clone();
    service.enqueue(record);

    let captured = rx.recv_timeout(Duration::from_secs(5)).expect("request");
    assert_eq!(captured.method, "POST");
    assert_eq!(captured.path, "/log");
    assert_eq!(captured.header("content-type"), Some("application/json"));
    let auth = captured.header("authorization").expect("auth header");
    assert!(auth.starts_with("Bearer "));
    assert_eq!(auth.trim_start_matches("Bearer ").split('.').count(), 3);

    let body = captured.body_json();
    assert_eq!(body["level"], "INFO");
    assert_eq!(body["service"], "billing");
    assert_eq!(body["logger_name"], "billing.api");
    assert_eq!(body["message"], "invoice created");
    assert_eq!(body["user_id"], "u-7");
    assert_eq!(body["request_id"], request_id.as_str());
    assert_eq!(body["context"]["invoice_id"], "inv-1");
    assert_eq!(body["retry_count"], 0);

    service.stop();
    // Delivered successfully: nothing buffered.
    assert!(pending_envelopes(&root.path().join("billing")).is_empty());
}

/// A record facing an endpoint that always returns 500 is attempted in
/// cycles of exactly three tries, re-buffered with an incremented
/// `retry_count` after each exhausted cycle, and permanently dropped
/// after exactly `max_retries` cycles.
#[test]
fn failing_record_cycles_three_attempts_then_drops_after_max_retries() {
    let root = TempDir::new().unwrap();
    let (addr, rx) = spawn_server(ephemeral_listener(), vec![500; 15]);
    let endpoint = format!("http://{addr}/log");
    let billing_dir = root.path().join("billing");

    let mut original_request_id = None;
    for cycle in 1u32..=5 {
        let service = start_service(&endpoint, root.path());
        if cycle == 1 {
            service.enqueue(LogRecord::new(
                "billing",
                "billing",
                Level::Error,
                "charge failed",
            ));
        }

        // Exactly three attempts per cycle, not one more.
        for _ in 0..3 {
            let captured = rx
                .recv_timeout(Duration::from_secs(5))
                .expect("delivery attempt");
            let body = captured.body_json();
            assert_eq!(body["retry_count"], u64::from(cycle - 1));
            let request_id = body["request_id"].as_str().unwrap().to_owned();
            match &original_request_id {
                None => original_request_id = Some(request_id),
                Some(original) => assert_eq!(&request_id, original),
            }
        }
        assert!(
            rx.recv_timeout(Duration::from_millis(300)).is_err(),
            "cycle {cycle} made a fourth attempt"
        );

        service.stop();
        let buffered = pending_envelopes(&billing_dir);
        if cycle < 5 {
            assert_eq!(buffered.len(), 1, "cycle {cycle} should re-buffer");
            assert_eq!(buffered[0].retry_count, cycle);
        } else {
            assert!(buffered.is_empty(), "record must be dropped, not re-buffered");
        }
    }

    // A fresh startup finds nothing to deliver: the record is gone.
    let service = start_service(&endpoint, root.path());
    assert!(rx.recv_timeout(Duration::from_millis(300)).is_err());
    service.stop();
}

#[test]
fn records_below_the_logger_level_never_reach_the_wire() {
    let root = TempDir::new().unwrap();
    let (addr, rx) = spawn_server(ephemeral_listener(), vec![200, 200]);
    let service = start_service(&format!("http://{addr}/log"), root.path());
    let logger = Logger::new("billing", None, Level::Warn, false, Arc::clone(&service));

    logger.debug("noisy detail");
    logger.info("routine note");
    logger.error("actual problem");

    let captured = rx.recv_timeout(Duration::from_secs(5)).expect("request");
    assert_eq!(captured.body_json()["message"], "actual problem");
    assert!(rx.recv_timeout(Duration::from_millis(300)).is_err());

    service.stop();
}
