//! Shared utilities for integration testing: frame builders and a mock broker.

// Each test binary uses a different subset of these helpers.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::Bytes;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use kafka_proxy::protocol::codec::{encode_request, encode_response};
use kafka_proxy::protocol::frame::{
    ApiBody, ApiKey, ApiVersionsRequest, ApiVersionsResponse, BrokerMetadata, FrameBody,
    MetadataRequest, MetadataResponse, ProduceRequest, RequestHeader, ResponseHeader,
};
use kafka_proxy::protocol::FrameDecoder;

pub fn request_header(api_key: ApiKey, correlation_id: i32) -> RequestHeader {
    RequestHeader {
        api_key,
        api_version: 0,
        correlation_id,
        client_id: Some("it-client".to_string()),
    }
}

pub fn metadata_request_frame(correlation_id: i32, topics: &[&str]) -> Bytes {
    let body = ApiBody::MetadataRequest(MetadataRequest {
        topics: topics.iter().map(|t| t.to_string()).collect(),
    });
    encode_request(
        &request_header(ApiKey::Metadata, correlation_id),
        &FrameBody::Decoded(body),
    )
    .unwrap()
}

pub fn api_versions_request_frame(correlation_id: i32) -> Bytes {
    encode_request(
        &request_header(ApiKey::ApiVersions, correlation_id),
        &FrameBody::Decoded(ApiBody::ApiVersionsRequest(ApiVersionsRequest)),
    )
    .unwrap()
}

pub fn produce_request_frame(correlation_id: i32, acks: i16) -> Bytes {
    let body = ApiBody::ProduceRequest(ProduceRequest {
        acks,
        timeout_ms: 3_000,
        topics: vec![],
    });
    encode_request(
        &request_header(ApiKey::Produce, correlation_id),
        &FrameBody::Decoded(body),
    )
    .unwrap()
}

pub fn metadata_response_frame(correlation_id: i32, brokers: &[(i32, &str, i32)]) -> Bytes {
    let body = ApiBody::MetadataResponse(MetadataResponse {
        brokers: brokers
            .iter()
            .map(|(node_id, host, port)| BrokerMetadata {
                node_id: *node_id,
                host: host.to_string(),
                port: *port,
            })
            .collect(),
        topics: vec![],
    });
    encode_response(
        &ResponseHeader { correlation_id },
        &FrameBody::Decoded(body),
        ApiKey::Metadata,
        0,
    )
    .unwrap()
}

pub fn api_versions_response_frame(correlation_id: i32) -> Bytes {
    encode_response(
        &ResponseHeader { correlation_id },
        &FrameBody::Decoded(ApiBody::ApiVersionsResponse(ApiVersionsResponse {
            error_code: 0,
            api_keys: vec![],
        })),
        ApiKey::ApiVersions,
        0,
    )
    .unwrap()
}

/// Start a mock broker that answers every request through `make_response`.
///
/// The callback receives (api_key, api_version, correlation_id) from each
/// request header and returns a complete response frame, or None to stay
/// silent (useful for timeout scenarios).
#[allow(dead_code)]
pub async fn start_mock_broker<F>(make_response: F) -> SocketAddr
where
    F: Fn(i16, i16, i32) -> Option<Bytes> + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let make_response = Arc::new(make_response);

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let make_response = Arc::clone(&make_response);
                    tokio::spawn(async move {
                        let mut frames = FrameDecoder::new();
                        let mut buf = [0u8; 8 * 1024];
                        loop {
                            let n = match socket.read(&mut buf).await {
                                Ok(0) | Err(_) => break,
                                Ok(n) => n,
                            };
                            frames.push(&buf[..n]);
                            while let Ok(Some(frame)) = frames.next_frame() {
                                // Header layout: len(4) key(2) version(2) correlation(4)
                                let api_key = i16::from_be_bytes([frame[4], frame[5]]);
                                let version = i16::from_be_bytes([frame[6], frame[7]]);
                                let correlation =
                                    i32::from_be_bytes([frame[8], frame[9], frame[10], frame[11]]);
                                if let Some(response) = make_response(api_key, version, correlation)
                                {
                                    if socket.write_all(&response).await.is_err() {
                                        return;
                                    }
                                }
                            }
                        }
                    });
                }
                Err(_) => break,
            }
        }
    });

    addr
}

/// Read exactly one length-prefixed frame from a socket.
///
/// Reads exactly the bytes of one frame and no more, so back-to-back frames
/// (e.g. a pipelined burst coalesced into one TCP segment) survive for the
/// next call.
#[allow(dead_code)]
pub async fn read_frame(socket: &mut tokio::net::TcpStream) -> Bytes {
    let mut len_buf = [0u8; 4];
    socket
        .read_exact(&mut len_buf)
        .await
        .expect("socket closed before a full frame arrived");
    let len = i32::from_be_bytes(len_buf);
    assert!(len >= 0, "negative frame length: {len}");
    let mut frame = vec![0u8; 4 + len as usize];
    frame[..4].copy_from_slice(&len_buf);
    socket
        .read_exact(&mut frame[4..])
        .await
        .expect("socket closed before a full frame arrived");
    Bytes::from(frame)
}
