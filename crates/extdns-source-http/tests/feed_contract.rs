//! Contract Test: HTTP Endpoint Source
//!
//! Constraints verified:
//! - Feed endpoints are returned with a resource attribution
//! - Feed failures surface as source errors naming the feed
//! - Polling notifies only when the feed content changes
//! - Polling stops on shutdown

use extdns_core::traits::Source;
use extdns_core::{Error, RecordType};
use extdns_source_http::HttpSource;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn feed(body: serde_json::Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(body)
}

#[tokio::test]
async fn endpoints_carry_resource_attribution() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/endpoints"))
        .respond_with(feed(serde_json::json!([
            { "dnsName": "web.example.com", "targets": ["1.2.3.4"], "recordType": "A" },
            { "dnsName": "api.example.com", "targets": ["lb.example.com"], "recordType": "CNAME",
              "labels": { "resource": "ingress/default/api" } }
        ])))
        .mount(&server)
        .await;

    let url = format!("{}/endpoints", server.uri());
    let source = HttpSource::new(url.clone(), Duration::from_secs(60)).unwrap();
    let endpoints = source.endpoints().await.unwrap();

    assert_eq!(endpoints.len(), 2);
    assert_eq!(endpoints[0].resource(), Some(format!("http/{url}").as_str()));
    assert_eq!(endpoints[1].record_type, RecordType::CNAME);
    assert_eq!(endpoints[1].resource(), Some("ingress/default/api"));
}

#[tokio::test]
async fn feed_errors_are_source_errors() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/down"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/garbage"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{not json"))
        .mount(&server)
        .await;

    for route in ["/down", "/garbage"] {
        let url = format!("{}{}", server.uri(), route);
        let source = HttpSource::new(url.clone(), Duration::from_secs(60)).unwrap();
        let err = source.endpoints().await.unwrap_err();
        match err {
            Error::Source { source_name, .. } => assert_eq!(source_name, format!("http/{url}")),
            other => panic!("{route}: expected source error, got {other}"),
        }
    }
}

#[tokio::test]
async fn polling_notifies_on_change_only() {
    let server = MockServer::start().await;
    let first = serde_json::json!([
        { "dnsName": "web.example.com", "targets": ["1.2.3.4"], "recordType": "A" }
    ]);
    let reordered_same = serde_json::json!([
        { "dnsName": "WEB.example.com.", "targets": ["1.2.3.4"], "recordType": "A" }
    ]);
    let changed = serde_json::json!([
        { "dnsName": "web.example.com", "targets": ["5.6.7.8"], "recordType": "A" }
    ]);

    Mock::given(method("GET"))
        .respond_with(feed(first))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(feed(reordered_same))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(feed(changed))
        .mount(&server)
        .await;

    let source = HttpSource::new(server.uri(), Duration::from_millis(50)).unwrap();
    let fired = Arc::new(AtomicUsize::new(0));
    let shutdown = CancellationToken::new();
    {
        let fired = fired.clone();
        source.add_event_handler(
            shutdown.clone(),
            Arc::new(move || {
                fired.fetch_add(1, Ordering::SeqCst);
            }),
        );
    }

    tokio::time::timeout(Duration::from_secs(5), async {
        while fired.load(Ordering::SeqCst) == 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("change notification");

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(fired.load(Ordering::SeqCst), 1, "unchanged feed must not notify");

    shutdown.cancel();
    tokio::time::sleep(Duration::from_millis(100)).await;
    let requests = server.received_requests().await.unwrap().len();
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(server.received_requests().await.unwrap().len(), requests);
}
