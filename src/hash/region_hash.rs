//! Local spatial hash of axis-aligned regions over a uniform bin grid.
//!
//! Bin contents are stored CSR-style: `bin_starts[b]..bin_starts[b+1]` indexes into a
//! flat list of region indices, so a bin lookup is O(1) plus the length of the bin.

use super::region::{BinGrid, HashableRegion};
use crate::debug_invariants::DebugInvariants;
use crate::halo_error::HaloError;
use crate::topology::{MAX_DIMS, Range};

#[derive(Clone, Debug)]
pub struct RegionHash<R: HashableRegion> {
    grid: BinGrid<R::Coord>,
    extents: R,
    bin_starts: Vec<usize>,
    bin_regions: Vec<usize>,
}

impl<R: HashableRegion> RegionHash<R> {
    /// Buckets `regions` into `num_bins` bins laid over the union of their extents.
    pub fn new(
        num_dims: usize,
        num_bins: [i32; MAX_DIMS],
        regions: &[R],
    ) -> Result<Self, HaloError> {
        if num_dims == 0 || num_dims > MAX_DIMS {
            return Err(HaloError::InvalidDimension(num_dims));
        }
        let extents = regions
            .iter()
            .fold(R::empty_region(num_dims), |acc, r| acc.union_region(r));
        let grid = BinGrid::new(
            num_dims,
            num_bins,
            extents.lower_bound(),
            extents.upper_bound(),
        );
        let nbins = grid.num_bins();

        let overlapped: Vec<Range> = regions.iter().map(|r| grid.overlapped_bins(r)).collect();

        // count, prefix-sum, fill
        let mut counts = vec![0usize; nbins];
        for bins in &overlapped {
            for loc in bins.points() {
                counts[grid.bin_index(loc)] += 1;
            }
        }
        let mut bin_starts = Vec::with_capacity(nbins + 1);
        let mut total = 0;
        for &c in &counts {
            bin_starts.push(total);
            total += c;
        }
        bin_starts.push(total);

        let mut bin_regions = vec![0usize; total];
        counts.iter_mut().for_each(|c| *c = 0);
        for (i, bins) in overlapped.iter().enumerate() {
            for loc in bins.points() {
                let b = grid.bin_index(loc);
                bin_regions[bin_starts[b] + counts[b]] = i;
                counts[b] += 1;
            }
        }

        let hash = Self {
            grid,
            extents,
            bin_starts,
            bin_regions,
        };
        hash.debug_assert_invariants();
        log::debug!(
            "[region_hash] {} regions into {} bins ({} entries)",
            regions.len(),
            nbins,
            total
        );
        Ok(hash)
    }

    #[inline]
    pub fn grid(&self) -> &BinGrid<R::Coord> {
        &self.grid
    }

    /// Union of all registered regions.
    #[inline]
    pub fn extents(&self) -> &R {
        &self.extents
    }

    pub fn num_bins(&self) -> usize {
        self.grid.num_bins()
    }

    /// Bin containing `point`; points outside the extents map to the nearest bin.
    pub fn map_to_bin(&self, point: [R::Coord; MAX_DIMS]) -> usize {
        self.grid.map_to_bin(point)
    }

    /// Indices (into the construction slice) of the regions stored in `bin`.
    pub fn retrieve_bin(&self, bin: usize) -> Result<&[usize], HaloError> {
        if bin >= self.num_bins() {
            return Err(HaloError::BinOutOfRange {
                bin,
                num_bins: self.num_bins(),
            });
        }
        Ok(&self.bin_regions[self.bin_starts[bin]..self.bin_starts[bin + 1]])
    }
}

impl<R: HashableRegion> DebugInvariants for RegionHash<R> {
    fn debug_assert_invariants(&self) {
        crate::debug_invariants!(self.validate_invariants(), "RegionHash");
    }

    fn validate_invariants(&self) -> Result<(), HaloError> {
        if self.bin_starts.len() != self.num_bins() + 1 {
            return Err(HaloError::Invariant(format!(
                "bin_starts has {} entries for {} bins",
                self.bin_starts.len(),
                self.num_bins()
            )));
        }
        if self.bin_starts.windows(2).any(|w| w[0] > w[1])
            || self.bin_starts.last() != Some(&self.bin_regions.len())
        {
            return Err(HaloError::Invariant("bin_starts is not a prefix sum".into()));
        }
        Ok(())
    }
}
