#![allow(dead_code)]
use grid_halo::prelude::*;
use std::sync::Arc;

/// Cart over `[0, n)` in each dimension of `n`.
pub fn cart(n: &[i32], periodic: &[bool], storage: PeriodicStorage) -> Cart {
    let begin = vec![0; n.len()];
    let mut flags = [false; 3];
    flags[..periodic.len()].copy_from_slice(periodic);
    Cart::new(Range::new(&begin, n).unwrap(), flags, storage).unwrap()
}

/// Discovers this rank's partition on a `dims` process grid and wraps it in a field.
pub fn field_on<'c, T: HaloValue, C: Communicator>(
    comm: &'c C,
    cart: Cart,
    dims: [i32; 3],
    value: T,
) -> DistributedField<'c, T, C> {
    let local = cartesian_decomp(&cart, comm.rank(), dims).unwrap();
    let p = Partition::discover(comm, cart, local, PartitionConfig::default()).unwrap();
    DistributedField::new(Arc::new(p), value)
}

/// Owned `(point, value)` pairs of a field.
pub fn owned<T: HaloValue, C: Communicator>(f: &DistributedField<'_, T, C>) -> Vec<(Point, T)> {
    f.local_range().points().map(|p| (p, f[p])).collect()
}
