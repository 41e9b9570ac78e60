//! Precomputed ghost-update plan of one rank.
//!
//! A [`HaloMap`] lists, per neighbor, which values of the local extended array go out
//! (`send_indices`) and which ghost slots are filled from that neighbor
//! (`recv_indices`), plus the pairs filled by copying within the rank under periodic
//! self-overlap. All indices are column-major offsets into the extended range.
//!
//! Both ends of a link enumerate the receiver's ghost shell in the same order, so the
//! lists agree without ever being exchanged.

use crate::debug_invariants::DebugInvariants;
use crate::decomp::DecompInfo;
use crate::halo_error::HaloError;
use crate::topology::{Cart, Range, RangeIndexer};
use std::collections::BTreeMap;

/// Index lists for one neighbor rank.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HaloNeighbor {
    pub rank: usize,
    pub send_indices: Vec<usize>,
    pub recv_indices: Vec<usize>,
}

/// Immutable ghost-update plan over one extended range.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HaloMap {
    local_range: Range,
    extended_range: Range,
    neighbors: Vec<HaloNeighbor>,
    local_copies: Vec<(usize, usize)>,
}

impl HaloMap {
    /// Builds the plan of this rank from its ranges and its neighbors' ranges.
    ///
    /// Neighbors sharing no ghost points with this rank in either direction are dropped.
    /// Fails with `UncoveredPoint` when a ghost is owned neither by this rank nor by any
    /// listed neighbor.
    pub fn build(
        cart: &Cart,
        local: &Range,
        extended: &Range,
        neighbor_info: &BTreeMap<usize, DecompInfo>,
    ) -> Result<Self, HaloError> {
        if !extended.includes(local) {
            return Err(HaloError::Invariant(format!(
                "extended range {extended:?} does not include local range {local:?}"
            )));
        }
        let indexer = RangeIndexer::column_major(*extended);
        let ghosts = |r: &Range, owned: &Range| {
            let owned = *owned;
            r.points()
                .filter(move |&p| !owned.contains(p))
                .collect::<Vec<_>>()
        };
        let my_ghosts = ghosts(extended, local);
        let uncovered = my_ghosts.iter().map(|&p| cart.canonical(p)).find(|&q| {
            !local.contains(q) && !neighbor_info.values().any(|n| n.local_range.contains(q))
        });
        if let Some(q) = uncovered {
            return Err(HaloError::UncoveredPoint(q));
        }

        let mut neighbors = Vec::with_capacity(neighbor_info.len());
        for (&rank, info) in neighbor_info {
            let send_indices: Vec<usize> = ghosts(&info.extended_range, &info.local_range)
                .into_iter()
                .map(|p| cart.canonical(p))
                .filter(|&q| local.contains(q))
                .map(|q| indexer.to_index(q))
                .collect();
            let recv_indices: Vec<usize> = my_ghosts
                .iter()
                .filter(|&&p| info.local_range.contains(cart.canonical(p)))
                .map(|&p| indexer.to_index(p))
                .collect();
            if send_indices.is_empty() && recv_indices.is_empty() {
                log::trace!("[halo] neighbor {rank} shares no ghost points; dropped");
                continue;
            }
            neighbors.push(HaloNeighbor {
                rank,
                send_indices,
                recv_indices,
            });
        }

        let local_copies: Vec<(usize, usize)> = my_ghosts
            .iter()
            .filter_map(|&p| {
                let q = cart.canonical(p);
                local
                    .contains(q)
                    .then(|| (indexer.to_index(q), indexer.to_index(p)))
            })
            .collect();

        let map = Self {
            local_range: *local,
            extended_range: *extended,
            neighbors,
            local_copies,
        };
        crate::debug_invariants!(map.validate_invariants(), "HaloMap::build");
        log::debug!(
            "[halo] map over {:?}: {} neighbors, {} sends, {} receives, {} local copies",
            extended,
            map.neighbors.len(),
            map.neighbors.iter().map(|n| n.send_indices.len()).sum::<usize>(),
            map.neighbors.iter().map(|n| n.recv_indices.len()).sum::<usize>(),
            map.local_copies.len()
        );
        Ok(map)
    }

    /// Plan without neighbors: only periodic self-copies.
    pub fn local_only(cart: &Cart, local: &Range, extended: &Range) -> Result<Self, HaloError> {
        Self::build(cart, local, extended, &BTreeMap::new())
    }

    #[inline]
    pub fn local_range(&self) -> &Range {
        &self.local_range
    }

    #[inline]
    pub fn extended_range(&self) -> &Range {
        &self.extended_range
    }

    #[inline]
    pub fn neighbors(&self) -> &[HaloNeighbor] {
        &self.neighbors
    }

    pub fn neighbor(&self, rank: usize) -> Result<&HaloNeighbor, HaloError> {
        self.neighbors
            .iter()
            .find(|n| n.rank == rank)
            .ok_or(HaloError::UnknownNeighbor(rank))
    }

    pub fn neighbor_ranks(&self) -> impl Iterator<Item = usize> + '_ {
        self.neighbors.iter().map(|n| n.rank)
    }

    /// `(source, dest)` pairs copied within this rank.
    #[inline]
    pub fn local_copies(&self) -> &[(usize, usize)] {
        &self.local_copies
    }

    /// Whether any message traffic is needed.
    #[inline]
    pub fn is_active(&self) -> bool {
        !self.neighbors.is_empty()
    }
}

impl DebugInvariants for HaloMap {
    fn debug_assert_invariants(&self) {
        crate::debug_invariants!(self.validate_invariants(), "HaloMap");
    }

    fn validate_invariants(&self) -> Result<(), HaloError> {
        let n = self.extended_range.count();
        let indexer = RangeIndexer::column_major(self.extended_range);
        let mut filled = vec![false; n];
        let recvs = self.neighbors.iter().flat_map(|nb| nb.recv_indices.iter());
        for &i in recvs.chain(self.local_copies.iter().map(|(_, dst)| dst)) {
            if i >= n {
                return Err(HaloError::Invariant(format!("ghost index {i} out of bounds ({n})")));
            }
            if self.local_range.contains(indexer.to_point(i)) {
                return Err(HaloError::Invariant(format!("ghost index {i} lies in the local range")));
            }
            if std::mem::replace(&mut filled[i], true) {
                return Err(HaloError::Invariant(format!("ghost index {i} is filled twice")));
            }
        }
        for nb in &self.neighbors {
            if let Some(&i) = nb.send_indices.iter().find(|&&i| i >= n) {
                return Err(HaloError::Invariant(format!(
                    "send index {i} to rank {} out of bounds ({n})",
                    nb.rank
                )));
            }
        }
        Ok(())
    }
}
