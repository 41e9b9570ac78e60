//! Value types describing structured index spaces.
//!
//! This module provides:
//! - [`Range`]: integer index boxes with containment, union and intersection
//! - [`BBox`]: floating-point bounding boxes
//! - [`Cart`]: global range plus periodicity and periodic storage mode
//! - [`RangeIndexer`]: row- or column-major linearization of a range

pub mod bbox;
pub mod cart;
pub mod indexer;
pub mod range;

pub use bbox::BBox;
pub use cart::{Cart, PeriodicStorage};
pub use indexer::{Layout, RangeIndexer};
pub use range::{MAX_DIMS, Point, Range};
