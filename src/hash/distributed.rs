//! Region hash whose bins are spread over the ranks of a communicator.
//!
//! Each rank registers only its own regions. Bin `b` is owned by rank `b % size`, so any
//! rank can compute a bin's owner without communication. Construction ships every
//! `(bin, region, rank, tag)` record to the owner of the bin; queries fetch bin contents
//! from their owners point-to-point, never by broadcasting the global region list.
//!
//! Construction and [`DistributedRegionHash::retrieve_bins`] are collective.

use super::region::{BinGrid, HashCoord, HashableRegion, RegionData, bin_decomp};
use crate::algs::communicator::{CommTag, Communicator, ReduceOp, StagedCommTags};
use crate::algs::exchange::exchange_bytes;
use crate::algs::handshake::dynamic_handshake;
use crate::algs::wire::{WireBinId, WireRegionHead, cast_slice, read_records};
use crate::halo_error::HaloError;
use crate::topology::{MAX_DIMS, Range};
use num_traits::ToPrimitive;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Runtime knobs of the distributed hash.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HashConfig {
    /// Target number of bins per rank; the bin grid has about `size * bins_per_rank` bins.
    pub bins_per_rank: usize,
}

impl Default for HashConfig {
    fn default() -> Self {
        Self { bins_per_rank: 1 }
    }
}

/// Communication tags for building and querying a distributed hash.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct HashCommTags {
    pub build: StagedCommTags,
    pub request: StagedCommTags,
    pub reply: StagedCommTags,
}

impl HashCommTags {
    #[inline]
    pub const fn from_base(base: CommTag) -> Self {
        Self {
            build: StagedCommTags::from_base(base),
            request: StagedCommTags::from_base(base.offset(2)),
            reply: StagedCommTags::from_base(base.offset(4)),
        }
    }
}

impl Default for HashCommTags {
    fn default() -> Self {
        Self::from_base(CommTag::new(0x2100))
    }
}

pub struct DistributedRegionHash<'c, R: HashableRegion, C: Communicator> {
    comm: &'c C,
    tags: HashCommTags,
    global_extents: R,
    grid: BinGrid<R::Coord>,
    owned: BTreeMap<usize, Vec<RegionData<R>>>,
}

impl<'c, R: HashableRegion, C: Communicator> DistributedRegionHash<'c, R, C> {
    /// Collective. Builds the hash from this rank's `regions`, each with an aux `tag`.
    pub fn new(
        comm: &'c C,
        num_dims: usize,
        regions: &[R],
        region_tags: &[i32],
    ) -> Result<Self, HaloError> {
        Self::with_config(
            comm,
            num_dims,
            regions,
            region_tags,
            HashConfig::default(),
            HashCommTags::default(),
        )
    }

    pub fn with_config(
        comm: &'c C,
        num_dims: usize,
        regions: &[R],
        region_tags: &[i32],
        config: HashConfig,
        tags: HashCommTags,
    ) -> Result<Self, HaloError> {
        if num_dims == 0 || num_dims > MAX_DIMS {
            return Err(HaloError::InvalidDimension(num_dims));
        }
        if regions.len() != region_tags.len() {
            return Err(HaloError::Invariant(format!(
                "{} regions but {} tags",
                regions.len(),
                region_tags.len()
            )));
        }
        let (rank, size) = (comm.rank(), comm.size());

        let global_extents = global_extents(comm, num_dims, regions)?;
        let mut lengths = [0.0; MAX_DIMS];
        if !global_extents.is_empty_region() {
            let (lo, hi) = (global_extents.lower_bound(), global_extents.upper_bound());
            for d in 0..num_dims {
                let len = hi[d].sub(lo[d]);
                lengths[d] = len.to_f64().unwrap_or(0.0);
            }
        }
        let num_bins = bin_decomp(num_dims, lengths, size * config.bins_per_rank.max(1));
        let grid = BinGrid::new(
            num_dims,
            num_bins,
            global_extents.lower_bound(),
            global_extents.upper_bound(),
        );
        log::debug!(
            "[distributed_hash] rank {rank}: {num_bins:?} bins over {global_extents:?}"
        );

        // route records to bin owners
        let mut outgoing: BTreeMap<usize, Vec<u8>> = BTreeMap::new();
        let mut own_records = Vec::new();
        for (region, &tag) in regions.iter().zip(region_tags) {
            for loc in grid.overlapped_bins(region).points() {
                let bin = grid.bin_index(loc);
                let owner = bin % size;
                if owner == rank {
                    own_records.push((bin, RegionData { region: *region, rank, tag }));
                } else {
                    encode_record(outgoing.entry(owner).or_default(), bin, rank, tag, region);
                }
            }
        }

        let send_to: BTreeSet<usize> = outgoing.keys().copied().collect();
        let recv_from = dynamic_handshake(comm, &send_to)?;
        let incoming = exchange_bytes(comm, tags.build, &outgoing, &recv_from)?;

        // bins list records in ascending source rank
        let mut by_rank: BTreeMap<usize, Vec<(usize, RegionData<R>)>> = BTreeMap::new();
        by_rank.insert(rank, own_records);
        for (peer, bytes) in incoming {
            by_rank.insert(peer, decode_records(peer, &bytes)?);
        }
        let mut owned: BTreeMap<usize, Vec<RegionData<R>>> = BTreeMap::new();
        for records in by_rank.into_values() {
            for (bin, data) in records {
                if bin % size != rank {
                    return Err(HaloError::Invariant(format!(
                        "rank {rank} received bin {bin} owned by rank {}",
                        bin % size
                    )));
                }
                owned.entry(bin).or_default().push(data);
            }
        }

        Ok(Self {
            comm,
            tags,
            global_extents,
            grid,
            owned,
        })
    }

    #[inline]
    pub fn num_dims(&self) -> usize {
        self.grid.num_dims()
    }

    /// Union of every rank's regions.
    #[inline]
    pub fn global_extents(&self) -> &R {
        &self.global_extents
    }

    #[inline]
    pub fn grid(&self) -> &BinGrid<R::Coord> {
        &self.grid
    }

    pub fn num_bins(&self) -> usize {
        self.grid.num_bins()
    }

    /// Rank owning `bin`.
    #[inline]
    pub fn bin_owner(&self, bin: usize) -> usize {
        bin % self.comm.size()
    }

    /// Bin containing `point`; total, points outside the grid are clamped.
    pub fn map_to_bin(&self, point: [R::Coord; MAX_DIMS]) -> usize {
        self.grid.map_to_bin(point)
    }

    /// Bin locations overlapped by `extents`.
    pub fn bin_range_of(&self, extents: &R) -> Range {
        self.grid.overlapped_bins(extents)
    }

    /// Records stored on this rank for a bin it owns.
    pub fn owned_bin(&self, bin: usize) -> Option<&[RegionData<R>]> {
        self.owned.get(&bin).map(Vec::as_slice)
    }

    /// Collective. Fetches the records of every bin in `bins` from their owners. Ranks
    /// with nothing to ask must still call this with an empty set.
    pub fn retrieve_bins(&self, bins: &BTreeSet<usize>) -> Result<RetrievedBins<R>, HaloError> {
        let rank = self.comm.rank();
        let num_bins = self.num_bins();
        if let Some(&bad) = bins.iter().find(|&&b| b >= num_bins) {
            return Err(HaloError::BinOutOfRange { bin: bad, num_bins });
        }

        let mut result: BTreeMap<usize, Vec<RegionData<R>>> = BTreeMap::new();
        let mut requests: BTreeMap<usize, Vec<WireBinId>> = BTreeMap::new();
        for &bin in bins {
            let owner = self.bin_owner(bin);
            if owner == rank {
                result.insert(bin, self.owned.get(&bin).cloned().unwrap_or_default());
            } else {
                result.insert(bin, Vec::new());
                requests.entry(owner).or_default().push(WireBinId::new(bin));
            }
        }
        let requests: BTreeMap<usize, Vec<u8>> = requests
            .into_iter()
            .map(|(owner, ids)| (owner, cast_slice(&ids).to_vec()))
            .collect();

        let recv_from: BTreeSet<usize> = requests.keys().copied().collect();
        let serve = dynamic_handshake(self.comm, &recv_from)?;
        let asked = exchange_bytes(self.comm, self.tags.request, &requests, &serve)?;

        // A bad request is answered with what can be served; the error is reported once
        // every requester has its reply.
        let mut replies: BTreeMap<usize, Vec<u8>> = BTreeMap::new();
        let mut bad_request: Option<HaloError> = None;
        for (peer, bytes) in asked {
            let out = replies.entry(peer).or_default();
            if bytes.len() % std::mem::size_of::<WireBinId>() != 0 {
                bad_request.get_or_insert(HaloError::comm(peer, "truncated bin request"));
                continue;
            }
            for id in read_records::<WireBinId>(&bytes) {
                let bin = id.get();
                if bin >= num_bins || self.bin_owner(bin) != rank {
                    bad_request.get_or_insert(HaloError::BinOutOfRange { bin, num_bins });
                    continue;
                }
                for rec in self.owned.get(&bin).into_iter().flatten() {
                    encode_record(out, bin, rec.rank, rec.tag, &rec.region);
                }
            }
        }

        let answers = exchange_bytes(self.comm, self.tags.reply, &replies, &recv_from)?;
        if let Some(err) = bad_request {
            log::warn!("[distributed_hash] rank {rank} received an invalid bin request: {err}");
            return Err(err);
        }
        for (peer, bytes) in answers {
            for (bin, data) in decode_records::<R>(peer, &bytes)? {
                result.entry(bin).or_default().push(data);
            }
        }
        log::trace!(
            "[distributed_hash] rank {rank} retrieved {} bins ({} remote owners)",
            result.len(),
            recv_from.len()
        );

        Ok(RetrievedBins {
            grid: self.grid,
            bins: result,
        })
    }
}

/// Bin contents fetched by one query; dropped once the caller is done with them.
#[derive(Clone, Debug)]
pub struct RetrievedBins<R: HashableRegion> {
    grid: BinGrid<R::Coord>,
    bins: BTreeMap<usize, Vec<RegionData<R>>>,
}

impl<R: HashableRegion> RetrievedBins<R> {
    /// Records of `bin`, or `None` if it was not requested.
    pub fn bin(&self, bin: usize) -> Option<&[RegionData<R>]> {
        self.bins.get(&bin).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.bins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bins.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &[RegionData<R>])> {
        self.bins.iter().map(|(&b, v)| (b, v.as_slice()))
    }

    /// Every record in the bin of `point` whose region contains `point`, in bin order.
    pub fn covering(
        &self,
        point: [R::Coord; MAX_DIMS],
    ) -> impl Iterator<Item = &RegionData<R>> + '_ {
        self.bin(self.grid.map_to_bin(point))
            .unwrap_or(&[])
            .iter()
            .filter(move |r| r.region.contains_point(point))
    }

    /// First record (in bin order) whose region contains `point`.
    pub fn find_first(&self, point: [R::Coord; MAX_DIMS]) -> Option<&RegionData<R>> {
        self.covering(point).next()
    }
}

fn global_extents<R: HashableRegion, C: Communicator>(
    comm: &C,
    num_dims: usize,
    regions: &[R],
) -> Result<R, HaloError> {
    let local = regions
        .iter()
        .fold(R::empty_region(num_dims), |acc, r| acc.union_region(r));
    let mut mins = vec![i64::MAX; num_dims];
    let mut maxs = vec![i64::MIN; num_dims];
    if !local.is_empty_region() {
        let (lo, hi) = (local.lower_bound(), local.upper_bound());
        for d in 0..num_dims {
            mins[d] = lo[d].to_ordered();
            maxs[d] = hi[d].to_ordered();
        }
    }
    let mins = comm.all_reduce_i64(&mins, ReduceOp::Min)?;
    let maxs = comm.all_reduce_i64(&maxs, ReduceOp::Max)?;
    if mins.iter().zip(&maxs).any(|(a, b)| a > b) {
        return Ok(R::empty_region(num_dims));
    }
    let empty = R::empty_region(num_dims);
    let (mut lo, mut hi) = (empty.lower_bound(), empty.upper_bound());
    for d in 0..num_dims {
        lo[d] = R::Coord::from_ordered(mins[d]);
        hi[d] = R::Coord::from_ordered(maxs[d]);
    }
    Ok(R::from_bounds(num_dims, lo, hi))
}

fn encode_record<R: HashableRegion>(out: &mut Vec<u8>, bin: usize, rank: usize, tag: i32, region: &R) {
    out.extend_from_slice(cast_slice(&[WireRegionHead::new(bin, rank, tag)]));
    out.extend_from_slice(cast_slice(&[region.to_wire()]));
}

fn decode_records<R: HashableRegion>(
    peer: usize,
    bytes: &[u8],
) -> Result<Vec<(usize, RegionData<R>)>, HaloError> {
    let rec = WireRegionHead::SIZE + std::mem::size_of::<R::Wire>();
    if bytes.len() % rec != 0 {
        return Err(HaloError::WireSizeMismatch {
            neighbor: peer,
            expected: bytes.len() / rec * rec,
            got: bytes.len(),
        });
    }
    Ok(bytes
        .chunks_exact(rec)
        .map(|chunk| {
            let head: WireRegionHead =
                bytemuck::pod_read_unaligned(&chunk[..WireRegionHead::SIZE]);
            let wire: R::Wire = bytemuck::pod_read_unaligned(&chunk[WireRegionHead::SIZE..]);
            let (bin, rank, tag) = head.decode();
            (
                bin,
                RegionData {
                    region: R::from_wire(&wire),
                    rank,
                    tag,
                },
            )
        })
        .collect())
}
