//! Neighbor discovery through a distributed hash of local ranges.

use super::extend::extend_local_range;
use crate::algs::communicator::Communicator;
use crate::halo_error::HaloError;
use crate::hash::DistributedRegionHash;
use crate::topology::{Cart, Range};
use std::collections::BTreeSet;

/// Distributed hash of every rank's local range.
pub type DecompHash<'c, C> = DistributedRegionHash<'c, Range, C>;

/// Collective. Registers this rank's local range in a fresh decomposition hash.
pub fn create_decomp_hash<'c, C: Communicator>(
    comm: &'c C,
    num_dims: usize,
    local: &Range,
) -> Result<DecompHash<'c, C>, HaloError> {
    DistributedRegionHash::new(comm, num_dims, &[*local], &[1])
}

/// Collective. Ranks owning any ghost point of `local` extended by `width` (see
/// [`extend_local_range`]), after periodic wrap. The calling rank is never listed.
/// `width` must match the extension the halo is later built with.
///
/// When several ranges claim a ghost point the first record of its bin wins; records
/// are stored in ascending rank order.
pub fn detect_neighbors<C: Communicator>(
    cart: &Cart,
    comm: &C,
    local: &Range,
    width: i32,
    hash: &DecompHash<'_, C>,
) -> Result<BTreeSet<usize>, HaloError> {
    let ghosts: Vec<_> = extend_local_range(cart, local, width)
        .points()
        .filter(|&p| !local.contains(p))
        .map(|p| cart.canonical(p))
        .collect();

    let bins: BTreeSet<usize> = ghosts.iter().map(|&p| hash.map_to_bin(p)).collect();
    let retrieved = hash.retrieve_bins(&bins)?;

    let mut neighbors = BTreeSet::new();
    for &p in &ghosts {
        let owner = retrieved
            .find_first(p)
            .ok_or(HaloError::UncoveredPoint(p))?;
        if cfg!(debug_assertions) && retrieved.covering(p).nth(1).is_some() {
            log::warn!(
                "[decomp] point {p:?} is claimed by several ranks; using rank {}",
                owner.rank
            );
        }
        neighbors.insert(owner.rank);
    }
    neighbors.remove(&comm.rank());

    log::debug!(
        "[decomp] rank {} found {} neighbors: {:?}",
        comm.rank(),
        neighbors.len(),
        neighbors
    );
    Ok(neighbors)
}
