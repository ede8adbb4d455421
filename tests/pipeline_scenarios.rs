//! Pipeline behavior scenarios, driven without sockets.
//!
//! These tests feed complete frames straight into `ConnectionPipeline` and
//! assert on the write actions it emits, mirroring how the net layer uses it.

mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::Instant;

use kafka_proxy::filter::{Filter, FilterChain, FilterContext};
use kafka_proxy::net::connection::ConnectionId;
use kafka_proxy::pipeline::correlation::{ResponsePromise, SendRequestError};
use kafka_proxy::pipeline::{ConnectionContext, ConnectionPipeline, PipelineError, WriteAction};
use kafka_proxy::protocol::codec;
use kafka_proxy::protocol::frame::{ApiBody, ApiKey, MetadataRequest, RequestHeader, ResponseHeader};
use kafka_proxy::protocol::FrameError;

const TIMEOUT: Duration = Duration::from_secs(5);

fn pipeline_with(filters: Vec<Box<dyn Filter>>) -> ConnectionPipeline {
    ConnectionPipeline::new(
        ConnectionContext::new(ConnectionId::new(), None),
        FilterChain::new(filters),
        TIMEOUT,
    )
}

/// Counts invocations; interest limited to one request api key.
struct CountingFilter {
    interest: ApiKey,
    calls: Arc<Mutex<u32>>,
}

impl Filter for CountingFilter {
    fn name(&self) -> &'static str {
        "counting"
    }

    fn should_deserialize_request(&self, api_key: ApiKey, _v: i16) -> bool {
        api_key == self.interest
    }

    fn on_request(&mut self, _h: &RequestHeader, _b: &mut ApiBody, ctx: &mut FilterContext<'_>) {
        *self.calls.lock().unwrap() += 1;
        ctx.forward_request();
    }
}

/// Appends a topic to Metadata requests before forwarding.
struct TopicInjector;

impl Filter for TopicInjector {
    fn name(&self) -> &'static str {
        "topic-injector"
    }

    fn should_deserialize_request(&self, api_key: ApiKey, _v: i16) -> bool {
        api_key == ApiKey::Metadata
    }

    fn on_request(&mut self, _h: &RequestHeader, body: &mut ApiBody, ctx: &mut FilterContext<'_>) {
        if let ApiBody::MetadataRequest(req) = body {
            req.topics.push("injected".to_string());
        }
        ctx.forward_request();
    }
}

/// Drops everything it sees.
struct DropAll {
    requests: bool,
    responses: bool,
}

impl Filter for DropAll {
    fn name(&self) -> &'static str {
        "drop-all"
    }

    fn should_deserialize_request(&self, _k: ApiKey, _v: i16) -> bool {
        self.requests
    }

    fn should_deserialize_response(&self, _k: ApiKey, _v: i16) -> bool {
        self.responses
    }

    fn on_request(&mut self, _h: &RequestHeader, _b: &mut ApiBody, ctx: &mut FilterContext<'_>) {
        ctx.drop_request();
    }

    fn on_response(&mut self, _h: &ResponseHeader, _b: &mut ApiBody, ctx: &mut FilterContext<'_>) {
        ctx.drop_response();
    }
}

/// Violates the filter contract: neither forwards nor drops.
struct Negligent;

impl Filter for Negligent {
    fn name(&self) -> &'static str {
        "negligent"
    }

    fn should_deserialize_request(&self, _k: ApiKey, _v: i16) -> bool {
        true
    }

    fn on_request(&mut self, _h: &RequestHeader, _b: &mut ApiBody, _ctx: &mut FilterContext<'_>) {}
}

/// Issues originated requests from its request handler, parking the promises
/// where the test can reach them.
struct Originator {
    bodies: Vec<ApiBody>,
    timeout: Option<Duration>,
    promises: Arc<Mutex<Vec<ResponsePromise>>>,
}

impl Filter for Originator {
    fn name(&self) -> &'static str {
        "originator"
    }

    fn should_deserialize_request(&self, api_key: ApiKey, _v: i16) -> bool {
        api_key == ApiKey::ApiVersions
    }

    fn on_request(&mut self, _h: &RequestHeader, _b: &mut ApiBody, ctx: &mut FilterContext<'_>) {
        for body in self.bodies.drain(..) {
            let promise = ctx.send_request(0, body, self.timeout);
            self.promises.lock().unwrap().push(promise);
        }
        ctx.forward_request();
    }
}

/// Observes Metadata responses, counting invocations and tagging hosts.
struct HostTagger {
    calls: Arc<Mutex<u32>>,
}

impl Filter for HostTagger {
    fn name(&self) -> &'static str {
        "host-tagger"
    }

    fn should_deserialize_response(&self, api_key: ApiKey, _v: i16) -> bool {
        api_key == ApiKey::Metadata
    }

    fn on_response(&mut self, _h: &ResponseHeader, body: &mut ApiBody, ctx: &mut FilterContext<'_>) {
        *self.calls.lock().unwrap() += 1;
        if let ApiBody::MetadataResponse(resp) = body {
            for broker in &mut resp.brokers {
                broker.host = format!("seen-{}", broker.host);
            }
        }
        ctx.forward_response();
    }
}

fn upstream_bytes(action: &WriteAction) -> &bytes::Bytes {
    match action {
        WriteAction::Upstream(b) => b,
        WriteAction::Downstream(_) => panic!("expected an upstream write"),
    }
}

#[tokio::test]
async fn uninterested_traffic_passes_through_byte_identical() {
    let calls = Arc::new(Mutex::new(0));
    let mut pipeline = pipeline_with(vec![Box::new(CountingFilter {
        interest: ApiKey::Metadata,
        calls: Arc::clone(&calls),
    })]);

    // Type B traffic: the filter has no interest, the handler never runs,
    // and the exact inbound bytes go out.
    let frame = common::produce_request_frame(11, 1);
    let actions = pipeline.on_client_frame(frame.clone()).unwrap();
    assert_eq!(actions, vec![WriteAction::Upstream(frame)]);
    assert_eq!(*calls.lock().unwrap(), 0);
}

#[tokio::test]
async fn interested_traffic_is_decoded_and_mutated_bytes_hit_the_wire() {
    let mut pipeline = pipeline_with(vec![Box::new(TopicInjector)]);

    let frame = common::metadata_request_frame(3, &["orders"]);
    let actions = pipeline.on_client_frame(frame.clone()).unwrap();
    assert_eq!(actions.len(), 1);
    let out = upstream_bytes(&actions[0]);
    assert_ne!(out, &frame, "mutated frame must differ from the original");

    let decoded = codec::decode_request(out, true).unwrap();
    assert_eq!(decoded.header.correlation_id, 3);
    match decoded.body {
        kafka_proxy::protocol::FrameBody::Decoded(ApiBody::MetadataRequest(req)) => {
            assert_eq!(req.topics, vec!["orders".to_string(), "injected".to_string()]);
        }
        other => panic!("unexpected body: {:?}", other),
    }
}

#[tokio::test]
async fn dropped_request_writes_nothing_upstream() {
    let mut pipeline = pipeline_with(vec![Box::new(DropAll {
        requests: true,
        responses: false,
    })]);
    let actions = pipeline
        .on_client_frame(common::metadata_request_frame(1, &[]))
        .unwrap();
    assert!(actions.is_empty());
}

#[tokio::test]
async fn dropped_response_writes_nothing_downstream() {
    let mut pipeline = pipeline_with(vec![Box::new(DropAll {
        requests: false,
        responses: true,
    })]);

    // Forward the request first so the response can be correlated.
    let request = common::metadata_request_frame(8, &[]);
    let actions = pipeline.on_client_frame(request).unwrap();
    assert_eq!(actions.len(), 1);

    let response = common::metadata_response_frame(8, &[(0, "backend-0", 9092)]);
    let actions = pipeline.on_broker_frame(response).unwrap();
    assert!(actions.is_empty());
}

#[tokio::test]
async fn filter_returning_without_decision_is_a_contract_violation() {
    let mut pipeline = pipeline_with(vec![Box::new(Negligent)]);
    let err = pipeline
        .on_client_frame(common::metadata_request_frame(1, &[]))
        .unwrap_err();
    assert!(matches!(
        err,
        PipelineError::FilterContractViolation { .. }
    ));
}

#[tokio::test]
async fn originated_request_resolves_exactly_once_with_its_response() {
    let promises = Arc::new(Mutex::new(Vec::new()));
    let mut pipeline = pipeline_with(vec![Box::new(Originator {
        bodies: vec![ApiBody::MetadataRequest(MetadataRequest::default())],
        timeout: None,
        promises: Arc::clone(&promises),
    })]);

    let actions = pipeline
        .on_client_frame(common::api_versions_request_frame(5))
        .unwrap();
    // First the originated request, then the forwarded original.
    assert_eq!(actions.len(), 2);
    let originated = codec::decode_request(upstream_bytes(&actions[0]), true).unwrap();
    assert_eq!(originated.header.api_key, ApiKey::Metadata);
    assert_eq!(originated.header.correlation_id, -1);

    let mut promise = promises.lock().unwrap().pop().unwrap();
    assert!(promise.try_take().is_none(), "no response has arrived yet");

    // The matching response is intercepted, never forwarded downstream.
    let response = common::metadata_response_frame(-1, &[(0, "backend-0", 9092)]);
    let actions = pipeline.on_broker_frame(response.clone()).unwrap();
    assert!(actions.is_empty());
    assert!(matches!(
        promise.try_take(),
        Some(Ok(Some(ApiBody::MetadataResponse(_))))
    ));

    // A duplicate response finds no entry and is discarded quietly.
    let actions = pipeline.on_broker_frame(response).unwrap();
    assert!(actions.is_empty());
}

#[tokio::test]
async fn originated_responses_traverse_the_response_filters() {
    let promises = Arc::new(Mutex::new(Vec::new()));
    let calls = Arc::new(Mutex::new(0));
    let mut pipeline = pipeline_with(vec![
        Box::new(Originator {
            bodies: vec![ApiBody::MetadataRequest(MetadataRequest::default())],
            timeout: None,
            promises: Arc::clone(&promises),
        }),
        Box::new(HostTagger {
            calls: Arc::clone(&calls),
        }),
    ]);

    pipeline
        .on_client_frame(common::api_versions_request_frame(3))
        .unwrap();

    let actions = pipeline
        .on_broker_frame(common::metadata_response_frame(-1, &[(0, "backend-0", 9092)]))
        .unwrap();
    assert!(actions.is_empty(), "originated responses never go downstream");
    assert_eq!(
        *calls.lock().unwrap(),
        1,
        "response filters must see originated responses"
    );

    // The promise resolves with the body the filters left behind.
    let mut promise = promises.lock().unwrap().pop().unwrap();
    match promise.try_take() {
        Some(Ok(Some(ApiBody::MetadataResponse(resp)))) => {
            assert_eq!(resp.brokers[0].host, "seen-backend-0");
        }
        other => panic!("unexpected resolution: {:?}", other),
    }
}

#[tokio::test]
async fn client_supplied_negative_correlation_id_is_rejected() {
    let mut pipeline = pipeline_with(vec![]);
    let err = pipeline
        .on_client_frame(common::metadata_request_frame(-3, &[]))
        .unwrap_err();
    assert!(matches!(err, PipelineError::Frame(FrameError::Malformed(_))));
}

#[tokio::test]
async fn out_of_order_responses_resolve_their_own_promises() {
    let promises = Arc::new(Mutex::new(Vec::new()));
    let mut pipeline = pipeline_with(vec![Box::new(Originator {
        bodies: vec![
            ApiBody::MetadataRequest(MetadataRequest::default()),
            ApiBody::MetadataRequest(MetadataRequest {
                topics: vec!["second".to_string()],
            }),
        ],
        timeout: None,
        promises: Arc::clone(&promises),
    })]);

    let actions = pipeline
        .on_client_frame(common::api_versions_request_frame(1))
        .unwrap();
    assert_eq!(actions.len(), 3);

    // Respond to -2 (the second request) before -1.
    pipeline
        .on_broker_frame(common::metadata_response_frame(-2, &[(2, "late", 1)]))
        .unwrap();
    pipeline
        .on_broker_frame(common::metadata_response_frame(-1, &[(1, "early", 1)]))
        .unwrap();

    let mut taken = promises.lock().unwrap();
    let second = taken.pop().unwrap();
    let first = taken.pop().unwrap();
    drop(taken);

    let check = |mut p: ResponsePromise, host: &str| {
        match p.try_take() {
            Some(Ok(Some(ApiBody::MetadataResponse(resp)))) => {
                assert_eq!(resp.brokers[0].host, host);
            }
            other => panic!("unexpected resolution: {:?}", other),
        }
    };
    check(first, "early");
    check(second, "late");
}

#[tokio::test]
async fn fire_and_forget_resolves_immediately_without_a_deadline() {
    let promises = Arc::new(Mutex::new(Vec::new()));
    let mut pipeline = pipeline_with(vec![Box::new(Originator {
        bodies: vec![ApiBody::ProduceRequest(
            kafka_proxy::protocol::frame::ProduceRequest {
                acks: 0,
                timeout_ms: 1_000,
                topics: vec![],
            },
        )],
        timeout: None,
        promises: Arc::clone(&promises),
    })]);

    let actions = pipeline
        .on_client_frame(common::api_versions_request_frame(2))
        .unwrap();
    // The ackless produce still goes upstream, plus the forwarded original.
    assert_eq!(actions.len(), 2);

    let mut promise = promises.lock().unwrap().pop().unwrap();
    assert!(matches!(promise.try_take(), Some(Ok(None))));
    assert!(
        pipeline.next_deadline().is_none(),
        "fire-and-forget must not register a timeout"
    );
}

#[tokio::test]
async fn originated_request_times_out_and_frees_its_entry() {
    let promises = Arc::new(Mutex::new(Vec::new()));
    let mut pipeline = pipeline_with(vec![Box::new(Originator {
        bodies: vec![ApiBody::MetadataRequest(MetadataRequest::default())],
        timeout: Some(Duration::from_millis(50)),
        promises: Arc::clone(&promises),
    })]);

    pipeline
        .on_client_frame(common::api_versions_request_frame(9))
        .unwrap();
    let deadline = pipeline.next_deadline().expect("a deadline must be armed");

    // Just before the deadline nothing expires.
    pipeline.on_deadline(deadline - Duration::from_millis(1));
    let mut promise = promises.lock().unwrap().pop().unwrap();
    assert!(promise.try_take().is_none());

    pipeline.on_deadline(deadline);
    match promise.try_take() {
        Some(Err(SendRequestError::Timeout {
            api_key, elapsed, ..
        })) => {
            assert_eq!(api_key, ApiKey::Metadata);
            assert!(elapsed >= Duration::from_millis(50));
        }
        other => panic!("unexpected resolution: {:?}", other),
    }
    assert!(pipeline.next_deadline().is_none());

    // A late response for the timed-out id is discarded, not fatal.
    let actions = pipeline
        .on_broker_frame(common::metadata_response_frame(-1, &[(0, "late", 1)]))
        .unwrap();
    assert!(actions.is_empty());
}

#[tokio::test]
async fn close_rejects_all_outstanding_promises() {
    let promises = Arc::new(Mutex::new(Vec::new()));
    let mut pipeline = pipeline_with(vec![Box::new(Originator {
        bodies: vec![
            ApiBody::MetadataRequest(MetadataRequest::default()),
            ApiBody::MetadataRequest(MetadataRequest::default()),
        ],
        timeout: None,
        promises: Arc::clone(&promises),
    })]);

    pipeline
        .on_client_frame(common::api_versions_request_frame(4))
        .unwrap();
    pipeline.close();

    for mut promise in promises.lock().unwrap().drain(..) {
        assert!(matches!(
            promise.try_take(),
            Some(Err(SendRequestError::ConnectionClosed))
        ));
    }
}

#[tokio::test]
async fn unknown_client_correlation_response_is_dropped_not_fatal() {
    let mut pipeline = pipeline_with(vec![]);
    let actions = pipeline
        .on_broker_frame(common::metadata_response_frame(77, &[(0, "x", 1)]))
        .unwrap();
    assert!(actions.is_empty());

    // The connection keeps working afterwards.
    let frame = common::metadata_request_frame(78, &[]);
    let actions = pipeline.on_client_frame(frame.clone()).unwrap();
    assert_eq!(actions, vec![WriteAction::Upstream(frame)]);
}

#[tokio::test]
async fn malformed_frame_is_fatal() {
    let mut pipeline = pipeline_with(vec![]);
    // Declared length says 100, actual payload is 2 bytes.
    let mut raw = bytes::BytesMut::new();
    raw.extend_from_slice(&100i32.to_be_bytes());
    raw.extend_from_slice(&[0, 0]);
    let err = pipeline.on_client_frame(raw.freeze()).unwrap_err();
    assert!(matches!(err, PipelineError::Frame(_)));
}

#[tokio::test]
async fn deadline_ordering_survives_multiple_outstanding_requests() {
    let promises = Arc::new(Mutex::new(Vec::new()));
    let mut pipeline = pipeline_with(vec![Box::new(Originator {
        bodies: vec![
            ApiBody::MetadataRequest(MetadataRequest::default()),
            ApiBody::MetadataRequest(MetadataRequest::default()),
        ],
        timeout: Some(Duration::from_millis(80)),
        promises: Arc::clone(&promises),
    })]);

    let before = Instant::now();
    pipeline
        .on_client_frame(common::api_versions_request_frame(6))
        .unwrap();
    let deadline = pipeline.next_deadline().unwrap();
    assert!(deadline >= before + Duration::from_millis(80));

    // Resolve one; the other keeps its deadline armed.
    pipeline
        .on_broker_frame(common::metadata_response_frame(-1, &[(0, "a", 1)]))
        .unwrap();
    assert!(pipeline.next_deadline().is_some());

    pipeline
        .on_broker_frame(common::metadata_response_frame(-2, &[(0, "b", 1)]))
        .unwrap();
    assert!(pipeline.next_deadline().is_none());
}
