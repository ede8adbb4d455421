//! Frame model: request/response headers, decoded bodies, opaque payloads.
//!
//! # Responsibilities
//! - Represent one wire message with its correlation id and api identity
//! - Enforce "decoded body XOR opaque payload" structurally (enum)
//! - Classify which requests elicit a broker response (fire-and-forget)

use bytes::Bytes;

/// Protocol operation identifier carried in every request header.
///
/// Unknown ids are preserved numerically so unrecognized traffic still
/// passes through the proxy untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApiKey {
    Produce,
    Fetch,
    ListOffsets,
    Metadata,
    ApiVersions,
    Other(i16),
}

impl ApiKey {
    pub fn from_i16(value: i16) -> Self {
        match value {
            0 => ApiKey::Produce,
            1 => ApiKey::Fetch,
            2 => ApiKey::ListOffsets,
            3 => ApiKey::Metadata,
            18 => ApiKey::ApiVersions,
            other => ApiKey::Other(other),
        }
    }

    pub fn as_i16(self) -> i16 {
        match self {
            ApiKey::Produce => 0,
            ApiKey::Fetch => 1,
            ApiKey::ListOffsets => 2,
            ApiKey::Metadata => 3,
            ApiKey::ApiVersions => 18,
            ApiKey::Other(v) => v,
        }
    }
}

impl std::fmt::Display for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiKey::Produce => write!(f, "Produce"),
            ApiKey::Fetch => write!(f, "Fetch"),
            ApiKey::ListOffsets => write!(f, "ListOffsets"),
            ApiKey::Metadata => write!(f, "Metadata"),
            ApiKey::ApiVersions => write!(f, "ApiVersions"),
            ApiKey::Other(v) => write!(f, "Api({})", v),
        }
    }
}

/// Request header: always decoded, even when the body stays opaque.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestHeader {
    pub api_key: ApiKey,
    pub api_version: i16,
    pub correlation_id: i32,
    pub client_id: Option<String>,
}

/// Response header: only the correlation id, matched against in-flight state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResponseHeader {
    pub correlation_id: i32,
}

/// A frame body is either fully decoded or an untouched byte payload.
#[derive(Debug, Clone, PartialEq)]
pub enum FrameBody {
    Decoded(ApiBody),
    Opaque(Bytes),
}

/// An inbound request as seen by the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestFrame {
    pub header: RequestHeader,
    pub body: FrameBody,
    /// False for request parameterizations known to elicit no broker response.
    pub expects_response: bool,
}

/// An inbound response as seen by the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseFrame {
    pub header: ResponseHeader,
    pub body: FrameBody,
}

/// Decoded message bodies for the apis the proxy has schemas for.
///
/// Apis without a variant here (Fetch, ListOffsets, anything unknown) can only
/// travel opaque; a filter declaring interest in them is a schema error.
#[derive(Debug, Clone, PartialEq)]
pub enum ApiBody {
    ProduceRequest(ProduceRequest),
    ProduceResponse(ProduceResponse),
    MetadataRequest(MetadataRequest),
    MetadataResponse(MetadataResponse),
    ApiVersionsRequest(ApiVersionsRequest),
    ApiVersionsResponse(ApiVersionsResponse),
}

impl ApiBody {
    /// The api key this body belongs to.
    pub fn api_key(&self) -> ApiKey {
        match self {
            ApiBody::ProduceRequest(_) | ApiBody::ProduceResponse(_) => ApiKey::Produce,
            ApiBody::MetadataRequest(_) | ApiBody::MetadataResponse(_) => ApiKey::Metadata,
            ApiBody::ApiVersionsRequest(_) | ApiBody::ApiVersionsResponse(_) => ApiKey::ApiVersions,
        }
    }

    /// Whether a request with this body elicits a broker response.
    ///
    /// Data-driven rather than keyed on api key alone: an acks=0 Produce is
    /// written without confirmation and must be completed locally.
    pub fn elicits_response(&self) -> bool {
        match self {
            ApiBody::ProduceRequest(req) => req.acks != 0,
            _ => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProduceRequest {
    pub acks: i16,
    pub timeout_ms: i32,
    pub topics: Vec<ProduceTopic>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProduceTopic {
    pub name: String,
    pub partitions: Vec<ProducePartition>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProducePartition {
    pub index: i32,
    pub records: Bytes,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProduceResponse {
    pub topics: Vec<ProduceResponseTopic>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProduceResponseTopic {
    pub name: String,
    pub partitions: Vec<ProduceResponsePartition>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProduceResponsePartition {
    pub index: i32,
    pub error_code: i16,
    pub base_offset: i64,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct MetadataRequest {
    /// Topic names to describe; empty means all topics.
    pub topics: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct MetadataResponse {
    pub brokers: Vec<BrokerMetadata>,
    pub topics: Vec<TopicMetadata>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BrokerMetadata {
    pub node_id: i32,
    pub host: String,
    pub port: i32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TopicMetadata {
    pub error_code: i16,
    pub name: String,
    pub partitions: Vec<PartitionMetadata>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PartitionMetadata {
    pub error_code: i16,
    pub partition_index: i32,
    pub leader_id: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ApiVersionsRequest;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ApiVersionsResponse {
    pub error_code: i16,
    pub api_keys: Vec<ApiVersionRange>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApiVersionRange {
    pub api_key: i16,
    pub min_version: i16,
    pub max_version: i16,
}
