//! Local-range helpers: ghost extension, point/cell conversions and block splits.

use crate::halo_error::HaloError;
use crate::topology::{Cart, Layout, MAX_DIMS, PeriodicStorage, Range, RangeIndexer};

/// Expands `local` by `amount` on every face except those lying on a non-periodic
/// global boundary. Under unique periodic storage a face on the global end of a
/// periodic dimension gets one extra layer for the wrap-around point. Non-periodic
/// dimensions are clamped to the global range.
pub fn extend_local_range(cart: &Cart, local: &Range, amount: i32) -> Range {
    let global = cart.range();
    let mut extended = grow_range(cart, local, amount);
    if cart.periodic_storage() == PeriodicStorage::Unique {
        for d in 0..cart.num_dims() {
            if local.end_at(d) == global.end_at(d) && cart.periodic(d) {
                extended.set_end(d, extended.end_at(d) + 1);
            }
        }
    }
    extended
}

/// `local` grown by `amount` on every face that is not a non-periodic global boundary.
/// Along non-periodic dimensions the result never leaves the global range.
fn grow_range(cart: &Cart, local: &Range, amount: i32) -> Range {
    let global = cart.range();
    let mut grown = *local;
    for d in 0..cart.num_dims() {
        if cart.periodic(d) {
            grown.set_begin(d, local.begin_at(d) - amount);
            grown.set_end(d, local.end_at(d) + amount);
        } else {
            grown.set_begin(d, (local.begin_at(d) - amount).max(global.begin_at(d)));
            grown.set_end(d, (local.end_at(d) + amount).min(global.end_at(d)));
        }
    }
    grown
}

/// Cart of the cells of a point-based cart. Cells always use unique periodic storage.
pub fn cart_point_to_cell(cart: &Cart) -> Result<Cart, HaloError> {
    let global = cart.range();
    let mut cells = *global;
    for d in 0..cart.num_dims() {
        let keep_end = cart.periodic(d) && cart.periodic_storage() == PeriodicStorage::Unique;
        if !keep_end {
            cells.set_end(d, (global.end_at(d) - 1).max(global.begin_at(d)));
        }
    }
    Cart::new(cells, cart.periodic_flags(), PeriodicStorage::Unique)
}

/// Cell range corresponding to a point range of `cart`.
pub fn range_point_to_cell(cart: &Cart, range: &Range) -> Range {
    let global = cart.range();
    let mut cells = *range;
    for d in 0..cart.num_dims() {
        let unique_periodic =
            cart.periodic(d) && cart.periodic_storage() == PeriodicStorage::Unique;
        if range.end_at(d) == global.end_at(d) && !unique_periodic {
            cells.set_end(d, (range.end_at(d) - 1).max(range.begin_at(d)));
        }
    }
    cells
}

/// Cart grown by one exterior point on both ends of every non-periodic dimension.
pub fn cart_include_exterior_point(cart: &Cart) -> Result<Cart, HaloError> {
    let global = cart.range();
    let mut grown = *global;
    for d in 0..cart.num_dims() {
        if !cart.periodic(d) {
            grown.set_begin(d, global.begin_at(d) - 1);
            grown.set_end(d, global.end_at(d) + 1);
        }
    }
    Cart::new(grown, cart.periodic_flags(), cart.periodic_storage())
}

/// `range` grown by one point across each non-periodic global boundary it touches.
pub fn range_include_exterior_point(cart: &Cart, range: &Range) -> Range {
    let global = cart.range();
    let mut grown = *range;
    for d in 0..cart.num_dims() {
        if cart.periodic(d) {
            continue;
        }
        if range.begin_at(d) == global.begin_at(d) {
            grown.set_begin(d, range.begin_at(d) - 1);
        }
        if range.end_at(d) == global.end_at(d) {
            grown.set_end(d, range.end_at(d) + 1);
        }
    }
    grown
}

/// Block of the global range owned by `rank` on a row-major process grid of
/// `cart_dims`. Remainder points go to the lowest coordinates.
pub fn cartesian_decomp(
    cart: &Cart,
    rank: usize,
    cart_dims: [i32; MAX_DIMS],
) -> Result<Range, HaloError> {
    let num_dims = cart.num_dims();
    let procs = Range::from_size(num_dims, &cart_dims);
    if rank >= procs.count() {
        return Err(HaloError::Invariant(format!(
            "rank {rank} outside process grid {cart_dims:?}"
        )));
    }
    let coords = RangeIndexer::new(procs, Layout::RowMajor).to_point(rank);
    let global = cart.range();
    let mut local = *global;
    for d in 0..num_dims {
        let size = global.size(d);
        let per_rank = size / cart_dims[d];
        let remainder = size - cart_dims[d] * per_rank;
        let c = coords[d];
        local.set_begin(d, global.begin_at(d) + per_rank * c + remainder.min(c));
        local.set_end(d, global.begin_at(d) + per_rank * (c + 1) + remainder.min(c + 1));
    }
    Ok(local)
}

/// Balanced process-grid shape for `size` ranks in `num_dims` dimensions, in
/// non-increasing order.
pub fn cartesian_decomp_dims(size: usize, num_dims: usize) -> [i32; MAX_DIMS] {
    let mut dims = [1i32; MAX_DIMS];
    let mut factors = Vec::new();
    let mut n = size.max(1);
    let mut p = 2;
    while p * p <= n {
        while n % p == 0 {
            factors.push(p);
            n /= p;
        }
        p += 1;
    }
    if n > 1 {
        factors.push(n);
    }
    // largest factors first, each onto the currently smallest dimension
    for f in factors.into_iter().rev() {
        if let Some(d) = (0..num_dims).min_by_key(|&d| dims[d]) {
            dims[d] *= f as i32;
        }
    }
    dims[..num_dims].sort_unstable_by(|a, b| b.cmp(a));
    dims
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cart2(n: [i32; 2], periodic: [bool; 2], storage: PeriodicStorage) -> Cart {
        Cart::new(
            Range::new(&[0, 0], &n).unwrap(),
            [periodic[0], periodic[1], false],
            storage,
        )
        .unwrap()
    }

    #[test]
    fn interior_block_grows_on_all_faces() {
        let cart = cart2([20, 20], [false, false], PeriodicStorage::Unique);
        let local = Range::new(&[5, 5], &[10, 10]).unwrap();
        assert_eq!(
            extend_local_range(&cart, &local, 2),
            Range::new(&[3, 3], &[12, 12]).unwrap()
        );
    }

    #[test]
    fn non_periodic_global_faces_stay_put() {
        let cart = cart2([20, 20], [false, false], PeriodicStorage::Unique);
        let local = Range::new(&[0, 0], &[10, 20]).unwrap();
        assert_eq!(
            extend_local_range(&cart, &local, 1),
            Range::new(&[0, 0], &[11, 20]).unwrap()
        );
    }

    #[test]
    fn wide_halo_is_clamped_to_non_periodic_bounds() {
        let cart = cart2([8, 8], [false, true], PeriodicStorage::Duplicated);
        let local = Range::new(&[4, 2], &[6, 4]).unwrap();
        assert_eq!(
            extend_local_range(&cart, &local, 3),
            Range::new(&[1, -1], &[8, 7]).unwrap()
        );
    }

    #[test]
    fn unique_periodic_end_gets_extra_layer() {
        let cart = cart2([20, 20], [false, true], PeriodicStorage::Unique);
        let local = *cart.range();
        assert_eq!(
            extend_local_range(&cart, &local, 2),
            Range::new(&[0, -2], &[20, 23]).unwrap()
        );
        let dup = cart2([20, 20], [false, true], PeriodicStorage::Duplicated);
        assert_eq!(
            extend_local_range(&dup, &local, 2),
            Range::new(&[0, -2], &[20, 22]).unwrap()
        );
    }

    #[test]
    fn point_to_cell_conversions() {
        let cart = cart2([10, 8], [false, true], PeriodicStorage::Unique);
        let cells = cart_point_to_cell(&cart).unwrap();
        assert_eq!(*cells.range(), Range::new(&[0, 0], &[9, 8]).unwrap());
        let r = Range::new(&[4, 4], &[10, 8]).unwrap();
        assert_eq!(
            range_point_to_cell(&cart, &r),
            Range::new(&[4, 4], &[9, 8]).unwrap()
        );
        let dup = cart2([10, 8], [false, true], PeriodicStorage::Duplicated);
        let cells = cart_point_to_cell(&dup).unwrap();
        assert_eq!(*cells.range(), Range::new(&[0, 0], &[9, 7]).unwrap());
        assert_eq!(cells.periodic_storage(), PeriodicStorage::Unique);
    }

    #[test]
    fn exterior_point_only_on_non_periodic_faces() {
        let cart = cart2([6, 6], [false, true], PeriodicStorage::Unique);
        let grown = cart_include_exterior_point(&cart).unwrap();
        assert_eq!(*grown.range(), Range::new(&[-1, 0], &[7, 6]).unwrap());
        assert!(grown.periodic(1));

        let corner = Range::new(&[0, 0], &[3, 3]).unwrap();
        assert_eq!(
            range_include_exterior_point(&cart, &corner),
            Range::new(&[-1, 0], &[3, 3]).unwrap()
        );
        let inner = Range::new(&[2, 2], &[4, 4]).unwrap();
        assert_eq!(range_include_exterior_point(&cart, &inner), inner);
    }

    #[test]
    fn cartesian_blocks_tile_the_domain() {
        let cart = cart2([20, 20], [false, false], PeriodicStorage::Unique);
        let dims = [2, 3, 1];
        assert_eq!(
            cartesian_decomp(&cart, 0, dims).unwrap(),
            Range::new(&[0, 0], &[10, 7]).unwrap()
        );
        assert_eq!(
            cartesian_decomp(&cart, 1, dims).unwrap(),
            Range::new(&[0, 7], &[10, 14]).unwrap()
        );
        assert_eq!(
            cartesian_decomp(&cart, 5, dims).unwrap(),
            Range::new(&[10, 14], &[20, 20]).unwrap()
        );
        let total: usize = (0..6)
            .map(|r| cartesian_decomp(&cart, r, dims).unwrap().count())
            .sum();
        assert_eq!(total, 400);
        assert!(cartesian_decomp(&cart, 6, dims).is_err());
    }

    #[test]
    fn decomp_dims_are_balanced() {
        assert_eq!(cartesian_decomp_dims(6, 2), [3, 2, 1]);
        assert_eq!(cartesian_decomp_dims(4, 2), [2, 2, 1]);
        assert_eq!(cartesian_decomp_dims(8, 3), [2, 2, 2]);
        assert_eq!(cartesian_decomp_dims(7, 2), [7, 1, 1]);
        assert_eq!(cartesian_decomp_dims(12, 1), [12, 1, 1]);
    }
}
