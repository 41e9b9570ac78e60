mod util;

use grid_halo::prelude::*;
use serial_test::serial;
use util::{cart, field_on};

fn label(p: Point) -> f64 {
    f64::from(p[0]) + 100.0 * f64::from(p[1])
}

/// Every extended point ends up holding the value of its canonical image.
fn assert_ghosts_follow_canonical(c: Cart, size: usize, dims: [i32; 3]) {
    let bad = ThreadComm::run(size, |comm| {
        let mut f = field_on(&comm, c, dims, f64::NAN);
        for p in f.local_range().points() {
            f[p] = label(p);
        }
        f.exchange().unwrap().wait().unwrap();
        let first = f.values().values().to_vec();
        f.exchange().unwrap().wait().unwrap();
        assert_eq!(first, f.values().values(), "second exchange changed values");

        let ext = *f.extended_range();
        ext.points()
            .filter(|&p| f[p] != label(c.canonical(p)))
            .collect::<Vec<_>>()
    });
    for (r, pts) in bad.iter().enumerate() {
        assert!(pts.is_empty(), "rank {r} stale ghosts {pts:?} on {c:?}");
    }
}

#[test]
#[serial]
fn ghosts_match_owners_non_periodic() {
    assert_ghosts_follow_canonical(
        cart(&[11, 7], &[false, false], PeriodicStorage::Unique),
        6,
        [3, 2, 1],
    );
}

#[test]
#[serial]
fn ghosts_match_owners_periodic_unique() {
    assert_ghosts_follow_canonical(
        cart(&[10, 8], &[true, true], PeriodicStorage::Unique),
        4,
        [2, 2, 1],
    );
}

#[test]
#[serial]
fn ghosts_match_owners_periodic_duplicated() {
    assert_ghosts_follow_canonical(
        cart(&[9, 9], &[true, false], PeriodicStorage::Duplicated),
        3,
        [3, 1, 1],
    );
}

#[test]
#[serial]
fn single_rank_periodic_uses_local_copies() {
    assert_ghosts_follow_canonical(
        cart(&[6, 5], &[true, true], PeriodicStorage::Unique),
        1,
        [1, 1, 1],
    );
}

#[test]
#[serial]
fn different_types_overlap_in_flight() {
    let c = cart(&[12], &[true], PeriodicStorage::Unique);
    let out = ThreadComm::run(3, |comm| {
        let ints = field_on(&comm, c, [3, 1, 1], 0i32);
        let p = ints.partition().clone();
        let ext = *p.extended_range();
        let idx = grid_halo::topology::RangeIndexer::column_major(ext);

        let mut a = vec![0i32; ext.count()];
        let mut b = vec![false; ext.count()];
        for q in p.local_range().points() {
            a[idx.to_index(q)] = q[0];
            b[idx.to_index(q)] = q[0] % 2 == 0;
        }
        let mut ra = p.exchange(&mut a).unwrap();
        let rb = p.exchange(&mut b).unwrap();
        while !ra.test() {
            std::thread::yield_now();
        }
        ra.wait().unwrap();
        rb.wait().unwrap();
        assert_eq!(p.halo().allocated_types(), vec![DataType::Bool, DataType::Int]);
        ext.points()
            .all(|q| {
                let owner = c.canonical(q);
                a[idx.to_index(q)] == owner[0] && b[idx.to_index(q)] == (owner[0] % 2 == 0)
            })
    });
    assert_eq!(out, vec![true; 3]);
}
