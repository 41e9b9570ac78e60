//! Spatial bucketing of ownership regions.
//!
//! [`RegionHash`] buckets a local list of regions; [`DistributedRegionHash`] spreads the
//! bins over a communicator so each rank only registers its own regions.

pub mod distributed;
pub mod region;
pub mod region_hash;

pub use distributed::{DistributedRegionHash, HashCommTags, HashConfig, RetrievedBins};
pub use region::{BinGrid, HashCoord, HashableRegion, RegionData, bin_decomp};
pub use region_hash::RegionHash;
