//! Consul client error types

#[derive(Debug, thiserror::Error)]
pub enum ConsulError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("consul returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("invalid consul endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("invalid X-Consul-Index header: {0}")]
    InvalidIndex(String),
}

pub type Result<T> = std::result::Result<T, ConsulError>;
