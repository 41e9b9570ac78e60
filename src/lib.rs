#![cfg_attr(docsrs, feature(doc_cfg))]
//! # grid-halo
//!
//! grid-halo decides, once and cheaply, which rank owns and which rank needs every
//! point of a partitioned structured grid, and then moves ghost values between ranks
//! with non-blocking point-to-point messages.
//!
//! ## Layers
//! - [`hash`]: region hash and its distributed form, which spreads spatial bins over
//!   the ranks so ownership lookups never need a global table
//! - [`decomp`]: neighbor discovery on top of the distributed hash, ghost extension and
//!   the neighbor metadata exchange
//! - [`halo`]: per-neighbor send/receive index maps plus the type-generic,
//!   non-blocking ghost exchange
//! - [`data`]: partitions, the partition pool, distributed fields and mask operations
//! - [`sync`]: collective merging of entity lifecycle events
//!
//! ## Communication
//! Everything talks through the [`Communicator`](algs::communicator::Communicator)
//! trait. [`NoComm`](algs::communicator::NoComm) is the single-rank backend,
//! [`ThreadComm`](algs::communicator::ThreadComm) runs a whole universe of ranks as
//! threads of one process (the test suite uses it), and `MpiComm` is available with the
//! `mpi-support` feature:
//!
//! ```toml
//! [dependencies]
//! grid-halo = { version = "0.3", features = ["mpi-support"] }
//! ```
//!
//! Operations documented as *collective* must be called by every rank in the same
//! order.
//!
//! ## Example
//! ```
//! use grid_halo::prelude::*;
//! use std::sync::Arc;
//!
//! let cart = Cart::new(
//!     Range::new(&[0, 0], &[8, 8]).unwrap(),
//!     [true, false, false],
//!     PeriodicStorage::Unique,
//! )
//! .unwrap();
//! let sums = ThreadComm::run(2, |comm| {
//!     let local = cartesian_decomp(&cart, comm.rank(), [2, 1, 1]).unwrap();
//!     let p = Partition::discover(&comm, cart, local, PartitionConfig::default()).unwrap();
//!     let mut mask = DistributedField::new(Arc::new(p), false);
//!     mask.fill_range(&Range::new(&[3, 3], &[5, 5]).unwrap(), true).unwrap();
//!     dilate_mask(&mut mask, 1, MaskBc::False).unwrap();
//!     count_distributed_mask(&mask).unwrap()
//! });
//! assert_eq!(sums, vec![16, 16]);
//! ```

pub mod algs;
pub mod data;
pub mod debug_invariants;
pub mod decomp;
pub mod halo;
pub mod halo_error;
pub mod hash;
pub mod sync;
pub mod topology;

pub use debug_invariants::DebugInvariants;
pub use halo_error::HaloError;

/// A convenient prelude to import the most-used traits & types:
pub mod prelude {
    pub use crate::algs::communicator::{Communicator, NoComm, ReduceOp, ThreadComm, Wait};
    #[cfg(feature = "mpi-support")]
    pub use crate::algs::communicator::MpiComm;
    pub use crate::data::{
        DistributedField, EdgeType, Field, MaskBc, Partition, PartitionConfig, PartitionPool,
        count_distributed_mask, detect_edge, dilate_mask, erode_mask,
    };
    pub use crate::debug_invariants::DebugInvariants;
    pub use crate::decomp::{
        DecompInfo, cartesian_decomp, create_decomp_hash, detect_neighbors, extend_local_range,
    };
    pub use crate::halo::{DataType, Halo, HaloMap, HaloValue};
    pub use crate::halo_error::HaloError;
    pub use crate::hash::{DistributedRegionHash, RegionHash};
    pub use crate::sync::{ChangeLog, EventFlags, ListenerSet, synchronize};
    pub use crate::topology::{Cart, PeriodicStorage, Point, Range};
}
