//! HaloError: Unified error type for grid-halo public APIs
//!
//! Setup and exchange routines return this error instead of panicking. In an MPI
//! program every variant is treated as fatal by the caller; the only non-error
//! degenerate case (a ghost point claimed by several regions) is resolved by a
//! first-match rule and never reported here.

use thiserror::Error;

/// Unified error type for grid-halo operations.
#[derive(Debug, Error)]
pub enum HaloError {
    /// Dimension count outside `1..=MAX_DIMS`.
    #[error("invalid dimension count {0} (expected 1..=3)")]
    InvalidDimension(usize),
    /// A range with `begin > end` in some dimension.
    #[error("inverted range: begin {begin:?} exceeds end {end:?}")]
    InvertedRange { begin: [i32; 3], end: [i32; 3] },
    /// A query referenced a rank that is not part of the neighbor set.
    #[error("rank {0} is not a known neighbor")]
    UnknownNeighbor(usize),
    /// Communication failure with a peer rank.
    #[error("communication error with rank {neighbor}: {source}")]
    CommError {
        neighbor: usize,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// Received payload does not have the size the protocol expects.
    #[error("wire size mismatch from rank {neighbor}: expected {expected} bytes, got {got}")]
    WireSizeMismatch {
        neighbor: usize,
        expected: usize,
        got: usize,
    },
    /// An exchange for this element type is still outstanding on the halo.
    #[error("halo exchange for {0:?} values is already in flight")]
    ExchangeInFlight(crate::halo::DataType),
    /// Field storage does not match the halo's extended range.
    #[error("field has {got} values but the extended range holds {expected}")]
    FieldSizeMismatch { expected: usize, got: usize },
    /// A ghost point is not covered by any registered region.
    #[error("ghost point {0:?} is not owned by any rank")]
    UncoveredPoint([i32; 3]),
    /// A requested bin index lies outside the bin grid.
    #[error("bin {bin} out of range (hash has {num_bins} bins)")]
    BinOutOfRange { bin: usize, num_bins: usize },
    /// Partition lookup failed in a partition pool.
    #[error("no partition matches the requested cart and ranges")]
    PartitionNotFound,
    /// Invariant check failed.
    #[error("invariant violated: {0}")]
    Invariant(String),
}

impl HaloError {
    /// Shorthand for a [`HaloError::CommError`] carrying a message.
    pub fn comm(neighbor: usize, msg: impl Into<String>) -> Self {
        HaloError::CommError {
            neighbor,
            source: msg.into().into(),
        }
    }
}
