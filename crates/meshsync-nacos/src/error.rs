//! Discovery stream error types

/// Error type for the ADS/MCP client
#[derive(Debug, thiserror::Error)]
pub enum AdsError {
    #[error("gRPC error: {0}")]
    Grpc(#[from] tonic::Status),

    #[error("transport error: {0}")]
    Transport(#[from] tonic::transport::Error),

    #[error("invalid discovery address: {0}")]
    InvalidAddress(String),

    #[error("decode error: {0}")]
    Decode(#[from] prost::DecodeError),

    #[error("invalid resource name {0}, expected namespace/name")]
    InvalidResourceName(String),

    #[error("unsupported resource type {0}")]
    UnsupportedType(String),

    #[error("resource without metadata")]
    MissingMetadata,

    #[error("discovery client closed")]
    Closed,

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, AdsError>;
