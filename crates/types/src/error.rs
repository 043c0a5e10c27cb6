//! Error types for the turnout gateway.

use derive_more::{Display, Error};

/// Why a single health probe failed.
///
/// Every variant collapses to `reachable = false` on the probed endpoint;
/// none of them is fatal or visible to clients. The [`reason`] string is the
/// label used by the `turnout_probe_errors_total` counter.
///
/// [`reason`]: ProbeFailure::reason
#[derive(Debug, Clone, PartialEq, Eq, Display, Error)]
#[error(ignore)]
pub enum ProbeFailure {
    /// The probe request body could not be encoded.
    #[display("failed to encode probe request: {_0}")]
    RequestCreation(String),

    /// The HTTP round-trip failed (connect error, timeout, broken transport).
    #[display("transport error: {_0}")]
    HttpDo(String),

    /// The endpoint answered with a non-200 status other than 429.
    #[display("unexpected HTTP status {_0}")]
    HttpStatus(u16),

    /// The response body could not be read.
    #[display("failed to read response body: {_0}")]
    ReadBody(String),

    /// The response body was not a well-formed JSON-RPC response.
    #[display("invalid JSON-RPC response: {_0}")]
    JsonParse(String),

    /// The endpoint returned a JSON-RPC level error.
    #[display("rpc error {code}: {message}")]
    RpcError {
        /// JSON-RPC error code.
        code: i64,
        /// JSON-RPC error message.
        message: String,
    },

    /// The `result` field did not parse as a non-negative block number.
    #[display("unparseable block number {_0:?}")]
    BlockParse(String),
}

impl ProbeFailure {
    /// The metric label for this failure category.
    #[must_use]
    pub const fn reason(&self) -> &'static str {
        match self {
            Self::RequestCreation(_) => "request_creation",
            Self::HttpDo(_) => "http_do",
            Self::HttpStatus(_) => "http_status",
            Self::ReadBody(_) => "read_body",
            Self::JsonParse(_) => "json_parse",
            Self::RpcError { .. } => "rpc_error",
            Self::BlockParse(_) => "block_parse",
        }
    }
}

/// Errors raised while assembling the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Display, Error)]
pub enum GatewayError {
    /// Every configured endpoint URL failed to parse.
    #[display("no valid RPC endpoints in configuration")]
    NoValidEndpoints,
}
