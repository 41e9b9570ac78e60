//! Mask operations on distributed boolean fields.
//!
//! Edge detection looks at the full `3^d` neighborhood of every local point, so
//! diagonal neighbors count. Points outside the mask's extended range take their value
//! from a [`MaskBc`]. All functions here are collective.

use super::distributed_field::DistributedField;
use super::partition::Partition;
use super::partition_pool::PartitionPool;
use crate::algs::communicator::{Communicator, ReduceOp};
use crate::decomp::{cart_include_exterior_point, range_include_exterior_point};
use crate::halo_error::HaloError;
use crate::topology::Point;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Which side of a mask boundary to mark.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EdgeType {
    /// True points with at least one false neighbor.
    Inner,
    /// False points with at least one true neighbor.
    Outer,
}

/// Value a mask takes outside its extended range.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MaskBc {
    #[default]
    False,
    True,
    /// The value at the nearest point of the global range, ignoring periodic dimensions.
    Mirror,
}

/// Number of true points over the whole grid.
pub fn count_distributed_mask<C: Communicator>(
    mask: &DistributedField<'_, bool, C>,
) -> Result<u64, HaloError> {
    let local = mask.local_range();
    let count = local.points().filter(|&p| mask[p]).count() as i64;
    let total = mask.comm().all_reduce_i64(&[count], ReduceOp::Sum)?;
    Ok(total[0] as u64)
}

/// Marks the edge points of `mask`.
///
/// With `include_exterior_point` the result lives on a partition grown by one point
/// past every non-periodic global face, so outer edges just outside the grid are
/// reported too. That partition comes from `pool` when one is given.
pub fn detect_edge<'c, C: Communicator>(
    mask: &DistributedField<'c, bool, C>,
    edge_type: EdgeType,
    bc: MaskBc,
    include_exterior_point: bool,
    pool: Option<&mut PartitionPool<'c, C>>,
) -> Result<DistributedField<'c, bool, C>, HaloError> {
    let partition = mask.partition();
    let edge_partition = if include_exterior_point {
        let cart = partition.cart();
        let edge_cart = cart_include_exterior_point(cart)?;
        let local = range_include_exterior_point(cart, partition.local_range());
        let extended = range_include_exterior_point(cart, partition.extended_range());
        match pool {
            Some(pool) => pool.fetch(&edge_cart, &local, &extended, partition.subregion_count())?,
            None => Arc::new(Partition::new(
                partition.comm(),
                edge_cart,
                local,
                extended,
                partition.subregion_count(),
                partition.neighbor_ranks().clone(),
            )?),
        }
    } else {
        partition.clone()
    };

    let num_dims = partition.cart().num_dims();
    let offsets: Vec<Point> = (0..num_dims)
        .map(|_| -1..=1)
        .multi_cartesian_product()
        .filter(|o| o.iter().any(|&d| d != 0))
        .map(|o| {
            let mut p = [0; 3];
            p[..num_dims].copy_from_slice(&o);
            p
        })
        .collect();

    let target = edge_type == EdgeType::Inner;
    let mut edge = DistributedField::new(edge_partition, false);
    let local = *edge.local_range();
    for p in local.points() {
        if mask_value(mask, bc, p) != target {
            continue;
        }
        let on_edge = offsets.iter().any(|o| {
            let mut q = p;
            for d in 0..num_dims {
                q[d] += o[d];
            }
            mask_value(mask, bc, q) != target
        });
        if on_edge {
            edge[p] = true;
        }
    }
    edge.exchange()?.wait()?;
    Ok(edge)
}

fn mask_value<C: Communicator>(mask: &DistributedField<'_, bool, C>, bc: MaskBc, p: Point) -> bool {
    if let Some(v) = mask.get(p) {
        return v;
    }
    match bc {
        MaskBc::False => false,
        MaskBc::True => true,
        MaskBc::Mirror => {
            let cart = mask.cart();
            let mut q = cart.range().clamp(p);
            for d in 0..cart.num_dims() {
                if cart.periodic(d) {
                    q[d] = p[d];
                }
            }
            mask.get(q).unwrap_or(false)
        }
    }
}

/// Grows the true region by `amount` points (diagonals included).
pub fn dilate_mask<C: Communicator>(
    mask: &mut DistributedField<'_, bool, C>,
    amount: u32,
    bc: MaskBc,
) -> Result<(), HaloError> {
    dilate_erode_mask(mask, amount as i32, bc)
}

/// Shrinks the true region by `amount` points (diagonals included).
pub fn erode_mask<C: Communicator>(
    mask: &mut DistributedField<'_, bool, C>,
    amount: u32,
    bc: MaskBc,
) -> Result<(), HaloError> {
    dilate_erode_mask(mask, -(amount as i32), bc)
}

/// Dilates for positive `amount`, erodes for negative, does nothing for zero.
pub fn dilate_erode_mask<C: Communicator>(
    mask: &mut DistributedField<'_, bool, C>,
    amount: i32,
    bc: MaskBc,
) -> Result<(), HaloError> {
    let (edge_type, fill) = match amount.signum() {
        0 => return Ok(()),
        1 => (EdgeType::Outer, true),
        _ => (EdgeType::Inner, false),
    };
    for _ in 0..amount.unsigned_abs() {
        let edge = detect_edge(mask, edge_type, bc, false, None)?;
        for l in 0..mask.count() {
            if edge[l] {
                mask[l] = fill;
            }
        }
    }
    Ok(())
}
