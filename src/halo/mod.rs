//! Halo layer: the ghost-update plan and the non-blocking exchange built on it.

pub mod exchanger;
#[allow(clippy::module_inception)]
pub mod halo;
pub mod map;

pub use exchanger::{DataType, ExchangerSet, HaloExchanger, HaloValue};
pub use halo::{ExchangeRequest, Halo, HaloCommTags};
pub use map::{HaloMap, HaloNeighbor};
