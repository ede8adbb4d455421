//! Length-prefixed frame splitting plus header/body encode and decode.
//!
//! # Responsibilities
//! - Split complete frames off a growing byte stream (4-byte BE length prefix)
//! - Decode request/response headers unconditionally
//! - Decode bodies only on request (filter interest), per the schema table
//! - Re-encode frames whose bodies were decoded and possibly mutated
//!
//! # Design Decisions
//! - A frame handed out by `FrameDecoder` keeps its length prefix, so a
//!   no-interest passthrough forwards the exact inbound `Bytes`
//! - The schema table is deliberately explicit: encode/decode of a version
//!   without a schema is `FrameError::UnsupportedVersion`, never best-effort

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::protocol::frame::{
    ApiBody, ApiKey, ApiVersionRange, ApiVersionsRequest, ApiVersionsResponse, BrokerMetadata,
    FrameBody, MetadataRequest, MetadataResponse, PartitionMetadata, ProducePartition,
    ProduceRequest, ProduceResponse, ProduceResponsePartition, ProduceResponseTopic, ProduceTopic,
    RequestFrame, RequestHeader, ResponseFrame, ResponseHeader, TopicMetadata,
};
use crate::protocol::{wire, FrameError};

/// Upper bound on a single frame; larger length prefixes are treated as
/// stream corruption.
pub const MAX_FRAME_BYTES: usize = 64 * 1024 * 1024;

/// Incremental splitter for length-prefixed frames.
///
/// Feed raw socket bytes in, pull complete frames out. Frames are returned
/// with their length prefix still attached.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buf: BytesMut,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self { buf: BytesMut::new() }
    }

    /// Append raw bytes read from the socket.
    pub fn push(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Pull the next complete frame, if one is buffered.
    pub fn next_frame(&mut self) -> Result<Option<Bytes>, FrameError> {
        if self.buf.len() < 4 {
            return Ok(None);
        }
        let declared = i32::from_be_bytes(self.buf[..4].try_into().expect("4 bytes checked"));
        if declared < 0 {
            return Err(FrameError::Malformed(format!(
                "negative frame length {}",
                declared
            )));
        }
        let declared = declared as usize;
        if declared > MAX_FRAME_BYTES {
            return Err(FrameError::Malformed(format!(
                "frame length {} exceeds cap {}",
                declared, MAX_FRAME_BYTES
            )));
        }
        if self.buf.len() < 4 + declared {
            return Ok(None);
        }
        Ok(Some(self.buf.split_to(4 + declared).freeze()))
    }

    /// Bytes currently buffered but not yet framed.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }
}

/// Whether the codec can decode/encode a request body for this api version.
pub fn has_request_schema(api_key: ApiKey, api_version: i16) -> bool {
    matches!(
        (api_key, api_version),
        (ApiKey::Produce, 0) | (ApiKey::Metadata, 0) | (ApiKey::ApiVersions, 0)
    )
}

/// Whether the codec can decode/encode a response body for this api version.
pub fn has_response_schema(api_key: ApiKey, api_version: i16) -> bool {
    has_request_schema(api_key, api_version)
}

/// Decode a request header from a full frame (prefix included).
pub fn decode_request_header(frame: &Bytes) -> Result<RequestHeader, FrameError> {
    let mut buf = payload(frame)?;
    read_request_header(&mut buf)
}

/// Decode a full request frame. The body is decoded only when `decode_body`
/// is set; otherwise it is kept as an opaque slice of the original frame.
pub fn decode_request(frame: &Bytes, decode_body: bool) -> Result<RequestFrame, FrameError> {
    let mut buf = payload(frame)?;
    let total = buf.remaining();
    let header = read_request_header(&mut buf)?;
    let body_offset = 4 + (total - buf.remaining());

    if !decode_body {
        return Ok(RequestFrame {
            header,
            body: FrameBody::Opaque(frame.slice(body_offset..)),
            // Without a decoded body the acks field is unknowable; assume a
            // response is coming. Stale route entries are overwritten on
            // correlation id reuse.
            expects_response: true,
        });
    }

    let body = decode_request_body(header.api_key, header.api_version, &mut buf)?;
    if buf.has_remaining() {
        return Err(FrameError::Malformed(format!(
            "{} bytes trailing after {} v{} request body",
            buf.remaining(),
            header.api_key,
            header.api_version
        )));
    }
    let expects_response = body.elicits_response();
    Ok(RequestFrame {
        header,
        body: FrameBody::Decoded(body),
        expects_response,
    })
}

/// Decode a response frame. Responses carry no api identity on the wire, so
/// the original request's (api key, version) must be supplied.
pub fn decode_response(
    frame: &Bytes,
    api_key: ApiKey,
    api_version: i16,
    decode_body: bool,
) -> Result<ResponseFrame, FrameError> {
    let mut buf = payload(frame)?;
    let correlation_id = wire::read_i32(&mut buf)?;
    let header = ResponseHeader { correlation_id };

    if !decode_body {
        return Ok(ResponseFrame {
            header,
            body: FrameBody::Opaque(frame.slice(8..)),
        });
    }

    let body = decode_response_body(api_key, api_version, &mut buf)?;
    if buf.has_remaining() {
        return Err(FrameError::Malformed(format!(
            "{} bytes trailing after {} v{} response body",
            buf.remaining(),
            api_key,
            api_version
        )));
    }
    Ok(ResponseFrame {
        header,
        body: FrameBody::Decoded(body),
    })
}

/// Read just the correlation id off a response frame.
pub fn peek_response_correlation_id(frame: &Bytes) -> Result<i32, FrameError> {
    let mut buf = payload(frame)?;
    wire::read_i32(&mut buf)
}

/// Encode a request frame, producing a complete length-prefixed buffer.
pub fn encode_request(header: &RequestHeader, body: &FrameBody) -> Result<Bytes, FrameError> {
    let mut buf = BytesMut::with_capacity(64);
    buf.put_i32(0);
    buf.put_i16(header.api_key.as_i16());
    buf.put_i16(header.api_version);
    buf.put_i32(header.correlation_id);
    wire::write_nullable_string(&mut buf, header.client_id.as_deref())?;
    match body {
        FrameBody::Opaque(raw) => buf.put_slice(raw),
        FrameBody::Decoded(body) => {
            encode_request_body(header.api_key, header.api_version, body, &mut buf)?
        }
    }
    Ok(finish_frame(buf))
}

/// Encode a response frame, producing a complete length-prefixed buffer.
pub fn encode_response(
    header: &ResponseHeader,
    body: &FrameBody,
    api_key: ApiKey,
    api_version: i16,
) -> Result<Bytes, FrameError> {
    let mut buf = BytesMut::with_capacity(64);
    buf.put_i32(0);
    buf.put_i32(header.correlation_id);
    match body {
        FrameBody::Opaque(raw) => buf.put_slice(raw),
        FrameBody::Decoded(body) => encode_response_body(api_key, api_version, body, &mut buf)?,
    }
    Ok(finish_frame(buf))
}

fn payload(frame: &Bytes) -> Result<Bytes, FrameError> {
    if frame.len() < 4 {
        return Err(FrameError::Malformed("frame shorter than length prefix".to_string()));
    }
    let declared = i32::from_be_bytes(frame[..4].try_into().expect("4 bytes checked"));
    if declared as usize != frame.len() - 4 {
        return Err(FrameError::Malformed(format!(
            "declared length {} does not match {} payload bytes",
            declared,
            frame.len() - 4
        )));
    }
    Ok(frame.slice(4..))
}

fn finish_frame(mut buf: BytesMut) -> Bytes {
    let len = (buf.len() - 4) as i32;
    buf[..4].copy_from_slice(&len.to_be_bytes());
    buf.freeze()
}

fn read_request_header(buf: &mut Bytes) -> Result<RequestHeader, FrameError> {
    let api_key = ApiKey::from_i16(wire::read_i16(buf)?);
    let api_version = wire::read_i16(buf)?;
    let correlation_id = wire::read_i32(buf)?;
    let client_id = wire::read_nullable_string(buf)?;
    Ok(RequestHeader {
        api_key,
        api_version,
        correlation_id,
        client_id,
    })
}

fn decode_request_body(
    api_key: ApiKey,
    api_version: i16,
    buf: &mut Bytes,
) -> Result<ApiBody, FrameError> {
    match (api_key, api_version) {
        (ApiKey::Produce, 0) => {
            let acks = wire::read_i16(buf)?;
            let timeout_ms = wire::read_i32(buf)?;
            let topics = wire::read_array(buf, |b| {
                let name = wire::read_string(b)?;
                let partitions = wire::read_array(b, |b| {
                    let index = wire::read_i32(b)?;
                    let records = wire::read_bytes(b)?;
                    Ok(ProducePartition { index, records })
                })?;
                Ok(ProduceTopic { name, partitions })
            })?;
            Ok(ApiBody::ProduceRequest(ProduceRequest {
                acks,
                timeout_ms,
                topics,
            }))
        }
        (ApiKey::Metadata, 0) => {
            let topics = wire::read_array(buf, |b| wire::read_string(b))?;
            Ok(ApiBody::MetadataRequest(MetadataRequest { topics }))
        }
        (ApiKey::ApiVersions, 0) => Ok(ApiBody::ApiVersionsRequest(ApiVersionsRequest)),
        _ => Err(FrameError::UnsupportedVersion {
            api_key,
            api_version,
        }),
    }
}

fn decode_response_body(
    api_key: ApiKey,
    api_version: i16,
    buf: &mut Bytes,
) -> Result<ApiBody, FrameError> {
    match (api_key, api_version) {
        (ApiKey::Produce, 0) => {
            let topics = wire::read_array(buf, |b| {
                let name = wire::read_string(b)?;
                let partitions = wire::read_array(b, |b| {
                    let index = wire::read_i32(b)?;
                    let error_code = wire::read_i16(b)?;
                    let base_offset = wire::read_i64(b)?;
                    Ok(ProduceResponsePartition {
                        index,
                        error_code,
                        base_offset,
                    })
                })?;
                Ok(ProduceResponseTopic { name, partitions })
            })?;
            Ok(ApiBody::ProduceResponse(ProduceResponse { topics }))
        }
        (ApiKey::Metadata, 0) => {
            let brokers = wire::read_array(buf, |b| {
                let node_id = wire::read_i32(b)?;
                let host = wire::read_string(b)?;
                let port = wire::read_i32(b)?;
                Ok(BrokerMetadata {
                    node_id,
                    host,
                    port,
                })
            })?;
            let topics = wire::read_array(buf, |b| {
                let error_code = wire::read_i16(b)?;
                let name = wire::read_string(b)?;
                let partitions = wire::read_array(b, |b| {
                    let error_code = wire::read_i16(b)?;
                    let partition_index = wire::read_i32(b)?;
                    let leader_id = wire::read_i32(b)?;
                    Ok(PartitionMetadata {
                        error_code,
                        partition_index,
                        leader_id,
                    })
                })?;
                Ok(TopicMetadata {
                    error_code,
                    name,
                    partitions,
                })
            })?;
            Ok(ApiBody::MetadataResponse(MetadataResponse { brokers, topics }))
        }
        (ApiKey::ApiVersions, 0) => {
            let error_code = wire::read_i16(buf)?;
            let api_keys = wire::read_array(buf, |b| {
                let api_key = wire::read_i16(b)?;
                let min_version = wire::read_i16(b)?;
                let max_version = wire::read_i16(b)?;
                Ok(ApiVersionRange {
                    api_key,
                    min_version,
                    max_version,
                })
            })?;
            Ok(ApiBody::ApiVersionsResponse(ApiVersionsResponse {
                error_code,
                api_keys,
            }))
        }
        _ => Err(FrameError::UnsupportedVersion {
            api_key,
            api_version,
        }),
    }
}

fn encode_request_body(
    api_key: ApiKey,
    api_version: i16,
    body: &ApiBody,
    buf: &mut BytesMut,
) -> Result<(), FrameError> {
    match (api_version, body) {
        (0, ApiBody::ProduceRequest(req)) => {
            buf.put_i16(req.acks);
            buf.put_i32(req.timeout_ms);
            wire::write_array(buf, &req.topics, |buf, topic| {
                wire::write_string(buf, &topic.name)?;
                wire::write_array(buf, &topic.partitions, |buf, p| {
                    buf.put_i32(p.index);
                    wire::write_bytes(buf, &p.records)
                })
            })
        }
        (0, ApiBody::MetadataRequest(req)) => {
            wire::write_array(buf, &req.topics, |buf, name| wire::write_string(buf, name))
        }
        (0, ApiBody::ApiVersionsRequest(_)) => Ok(()),
        _ => Err(FrameError::UnsupportedVersion {
            api_key,
            api_version,
        }),
    }
}

fn encode_response_body(
    api_key: ApiKey,
    api_version: i16,
    body: &ApiBody,
    buf: &mut BytesMut,
) -> Result<(), FrameError> {
    match (api_version, body) {
        (0, ApiBody::ProduceResponse(resp)) => {
            wire::write_array(buf, &resp.topics, |buf, topic| {
                wire::write_string(buf, &topic.name)?;
                wire::write_array(buf, &topic.partitions, |buf, p| {
                    buf.put_i32(p.index);
                    buf.put_i16(p.error_code);
                    buf.put_i64(p.base_offset);
                    Ok(())
                })
            })
        }
        (0, ApiBody::MetadataResponse(resp)) => {
            wire::write_array(buf, &resp.brokers, |buf, broker| {
                buf.put_i32(broker.node_id);
                wire::write_string(buf, &broker.host)?;
                buf.put_i32(broker.port);
                Ok(())
            })?;
            wire::write_array(buf, &resp.topics, |buf, topic| {
                buf.put_i16(topic.error_code);
                wire::write_string(buf, &topic.name)?;
                wire::write_array(buf, &topic.partitions, |buf, p| {
                    buf.put_i16(p.error_code);
                    buf.put_i32(p.partition_index);
                    buf.put_i32(p.leader_id);
                    Ok(())
                })
            })
        }
        (0, ApiBody::ApiVersionsResponse(resp)) => {
            buf.put_i16(resp.error_code);
            wire::write_array(buf, &resp.api_keys, |buf, range| {
                buf.put_i16(range.api_key);
                buf.put_i16(range.min_version);
                buf.put_i16(range.max_version);
                Ok(())
            })
        }
        _ => Err(FrameError::UnsupportedVersion {
            api_key,
            api_version,
        }),
    }
}
