//! Error types for vmio operations.

use vmio_proto::{CommandRange, WireError};

/// Alias for `Result<T, vmio::Error>`.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by routing-table construction, decoding and configuration.
///
/// Outcomes of asynchronous operations are not reported here; they surface
/// as a [`ResultCode`](crate::ResultCode) on the job.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// A route already exists for exactly this key.
    #[error("duplicate route for {0}")]
    DuplicateRoute(CommandRange),

    /// A range route intersects an existing range route.
    #[error("route {new} overlaps existing route {existing}")]
    OverlappingRoute {
        /// The range being added.
        new: CommandRange,
        /// The range it collides with.
        existing: CommandRange,
    },

    /// A range whose start lies after its end.
    #[error("inverted route range {0}")]
    InvertedRange(CommandRange),

    /// The table already holds the maximum number of routes.
    #[error("routing table full ({max} routes)")]
    RoutingTableFull {
        /// Route limit.
        max: usize,
    },

    /// A serialized routing table failed validation.
    #[error("malformed routing table: {0}")]
    MalformedTable(&'static str),

    /// A configuration value failed validation.
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),

    /// A fixed-size wire record could not be decoded.
    #[error(transparent)]
    Wire(#[from] WireError),

    /// A configuration document could not be parsed.
    #[error("config: {0}")]
    Json(#[from] serde_json::Error),

    /// An I/O error reading configuration.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
