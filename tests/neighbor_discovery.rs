mod util;

use grid_halo::prelude::*;
use serial_test::serial;
use std::collections::BTreeSet;
use util::cart;

fn neighbors_on(size: usize, c: Cart, dims: [i32; 3]) -> Vec<BTreeSet<usize>> {
    ThreadComm::run(size, |comm| {
        let local = cartesian_decomp(&c, comm.rank(), dims).unwrap();
        let hash = create_decomp_hash(&comm, c.num_dims(), &local).unwrap();
        detect_neighbors(&c, &comm, &local, 1, &hash).unwrap()
    })
}

#[test]
#[serial]
fn two_by_three_grid_includes_diagonals() {
    let c = cart(&[20, 20], &[false, false], PeriodicStorage::Unique);
    let n = neighbors_on(6, c, [2, 3, 1]);
    assert_eq!(n[0], BTreeSet::from([1, 3, 4]));
    assert_eq!(n[1], BTreeSet::from([0, 2, 3, 4, 5]));
    assert_eq!(n[5], BTreeSet::from([1, 2, 4]));
}

#[test]
#[serial]
fn neighbor_relation_is_symmetric() {
    let cases = [
        (cart(&[17, 9], &[true, false], PeriodicStorage::Unique), 6, [3, 2, 1]),
        (cart(&[12, 12], &[true, true], PeriodicStorage::Duplicated), 4, [2, 2, 1]),
        (cart(&[8, 6, 5], &[false, true, false], PeriodicStorage::Unique), 8, [2, 2, 2]),
        (cart(&[30], &[false], PeriodicStorage::Unique), 5, [5, 1, 1]),
    ];
    for (c, size, dims) in cases {
        let n = neighbors_on(size, c, dims);
        for (r, set) in n.iter().enumerate() {
            assert!(!set.contains(&r), "rank {r} lists itself");
            for &s in set {
                assert!(n[s].contains(&r), "{r} -> {s} not mirrored in {c:?}");
            }
        }
    }
}

#[test]
#[serial]
fn periodic_ring_of_three_closes() {
    let c = cart(&[9], &[true], PeriodicStorage::Unique);
    let n = neighbors_on(3, c, [3, 1, 1]);
    assert_eq!(n[0], BTreeSet::from([1, 2]));
    assert_eq!(n[2], BTreeSet::from([0, 1]));
}

#[test]
#[serial]
fn decomp_info_reaches_every_neighbor() {
    let c = cart(&[10, 10], &[false, false], PeriodicStorage::Unique);
    let infos = ThreadComm::run(4, |comm| {
        let local = cartesian_decomp(&c, comm.rank(), [2, 2, 1]).unwrap();
        let hash = create_decomp_hash(&comm, 2, &local).unwrap();
        let nbrs = detect_neighbors(&c, &comm, &local, 1, &hash).unwrap();
        let ext = extend_local_range(&c, &local, 1);
        grid_halo::decomp::retrieve_decomp_info(&comm, &nbrs, &local, &ext).unwrap()
    });
    let own = |r: usize| cartesian_decomp(&c, r, [2, 2, 1]).unwrap();
    for (r, info) in infos.iter().enumerate() {
        assert_eq!(info.len(), 3);
        for (&s, d) in info {
            assert_ne!(r, s);
            assert_eq!(d.local_range, own(s));
            assert_eq!(d.extended_range, extend_local_range(&c, &own(s), 1));
        }
    }
}
