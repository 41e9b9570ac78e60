//! Fixed-layout, little-endian wire types for hash, decomposition and halo traffic.

use crate::topology::{BBox, MAX_DIMS, Range};
use bytemuck::{Pod, Zeroable};
use std::mem::{align_of, size_of};

pub fn cast_slice<T: Pod>(v: &[T]) -> &[u8] {
    bytemuck::cast_slice(v)
}

/// Decodes a tightly packed array of `T` from a byte buffer of unknown alignment.
pub fn read_records<T: Pod>(bytes: &[u8]) -> Vec<T> {
    bytes
        .chunks_exact(size_of::<T>())
        .map(bytemuck::pod_read_unaligned)
        .collect()
}

/// All multi-byte integers in these structs are **little-endian** on the wire.
/// We store them pre-LE with `.to_le()` and decode with `.from_le()`.

// ===== Common records ======================================================

#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct WireCount {
    pub n_le: u32, // count of following records
}
impl WireCount {
    pub fn new(n: usize) -> Self {
        Self {
            n_le: (n as u32).to_le(),
        }
    }
    pub fn get(&self) -> usize {
        u32::from_le(self.n_le) as usize
    }
}

#[repr(transparent)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct WireI64 {
    pub v_le: i64,
}
impl WireI64 {
    pub fn new(v: i64) -> Self {
        Self { v_le: v.to_le() }
    }
    pub fn get(&self) -> i64 {
        i64::from_le(self.v_le)
    }
}

/// Linear bin index requested from a bin owner.
#[repr(transparent)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct WireBinId {
    pub bin_le: u64,
}
impl WireBinId {
    pub fn new(bin: usize) -> Self {
        Self {
            bin_le: (bin as u64).to_le(),
        }
    }
    pub fn get(&self) -> usize {
        u64::from_le(self.bin_le) as usize
    }
}

// ===== Geometry ============================================================

#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct WireRange {
    pub num_dims_le: u32,
    pub begin_le: [i32; MAX_DIMS],
    pub end_le: [i32; MAX_DIMS],
}
impl WireRange {
    pub fn new(r: &Range) -> Self {
        Self {
            num_dims_le: (r.num_dims() as u32).to_le(),
            begin_le: r.begin().map(i32::to_le),
            end_le: r.end().map(i32::to_le),
        }
    }
    pub fn get(&self) -> Range {
        let num_dims = (u32::from_le(self.num_dims_le) as usize).clamp(1, MAX_DIMS);
        Range::from_bounds(
            num_dims,
            self.begin_le.map(i32::from_le),
            self.end_le.map(i32::from_le),
        )
    }
}

/// Bounding box with coordinates carried as IEEE-754 bit patterns.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct WireBBox {
    pub num_dims_le: u32,
    pub _pad: u32,
    pub min_le: [u64; MAX_DIMS],
    pub max_le: [u64; MAX_DIMS],
}
impl WireBBox {
    pub fn new(b: &BBox) -> Self {
        Self {
            num_dims_le: (b.num_dims() as u32).to_le(),
            _pad: 0,
            min_le: b.min().map(|x| x.to_bits().to_le()),
            max_le: b.max().map(|x| x.to_bits().to_le()),
        }
    }
    pub fn get(&self) -> BBox {
        let num_dims = (u32::from_le(self.num_dims_le) as usize).clamp(1, MAX_DIMS);
        BBox::new(
            num_dims,
            self.min_le.map(|x| f64::from_bits(u64::from_le(x))),
            self.max_le.map(|x| f64::from_bits(u64::from_le(x))),
        )
    }
}

/// Header preceding each region record in a bin reply.
/// NOTE: `rank_le` is u32 (never usize) on the wire.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct WireRegionHead {
    pub bin_le: u64,
    pub rank_le: u32,
    pub tag_le: i32,
}
impl WireRegionHead {
    pub const SIZE: usize = 16;
    pub fn new(bin: usize, rank: usize, tag: i32) -> Self {
        Self {
            bin_le: (bin as u64).to_le(),
            rank_le: (rank as u32).to_le(),
            tag_le: tag.to_le(),
        }
    }
    pub fn decode(&self) -> (usize, usize, i32) {
        (
            u64::from_le(self.bin_le) as usize,
            u32::from_le(self.rank_le) as usize,
            i32::from_le(self.tag_le),
        )
    }
}

/// A neighbor's local and ghost-extended ranges.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct WireDecompInfo {
    pub local: WireRange,
    pub extended: WireRange,
}

// ===== Compile-time sanity checks =========================================

const _: () = {
    // Pod/Zeroable ensures no padding contains uninit when cast to bytes.
    assert!(size_of::<WireCount>() == 4);
    assert!(size_of::<WireI64>() == 8);
    assert!(size_of::<WireBinId>() == 8);
    assert!(size_of::<WireRange>() == 28);
    assert!(size_of::<WireBBox>() == 56);
    assert!(size_of::<WireRegionHead>() == WireRegionHead::SIZE);
    assert!(align_of::<WireRegionHead>() == 8);
    assert!(size_of::<WireDecompInfo>() == 2 * size_of::<WireRange>());
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn range_survives_the_wire() {
        let r = Range::new(&[-2, 0], &[5, 23]).unwrap();
        let bytes = cast_slice(&[WireRange::new(&r)]).to_vec();
        let back: Vec<WireRange> = read_records(&bytes);
        assert_eq!(back[0].get(), r);
    }

    #[test]
    fn bbox_keeps_exact_bits() {
        let b = BBox::new(3, [0.1, -2.5, 1e-300], [1.0 / 3.0, 7.0, 2.0]);
        let w = WireBBox::new(&b);
        assert_eq!(w.get(), b);
    }

    #[test]
    fn region_head_reads_from_unaligned_offset() {
        let mut bytes = vec![0u8; 3];
        bytes.extend_from_slice(cast_slice(&[WireRegionHead::new(42, 7, -1)]));
        let head: WireRegionHead = bytemuck::pod_read_unaligned(&bytes[3..]);
        assert_eq!(head.decode(), (42, 7, -1));
    }
}
