//! Dynamic handshake: derive who sends to me from who I receive from.

use crate::algs::communicator::Communicator;
use crate::halo_error::HaloError;
use std::collections::BTreeSet;

/// Collective. Given the ranks this process expects to receive from, returns the ranks
/// it must send to. Every rank must call this once per discovery round, including ranks
/// with nothing to receive. `self` appears in the result iff it appears in `recv_from`.
pub fn dynamic_handshake<C: Communicator>(
    comm: &C,
    recv_from: &BTreeSet<usize>,
) -> Result<BTreeSet<usize>, HaloError> {
    let size = comm.size();
    let mut interest = vec![0u8; size];
    for &r in recv_from {
        if r >= size {
            return Err(HaloError::UnknownNeighbor(r));
        }
        interest[r] = 1;
    }
    let wanted_by = comm.all_to_all_flags(&interest)?;
    let send_to: BTreeSet<usize> = wanted_by
        .iter()
        .enumerate()
        .filter(|&(_, &f)| f != 0)
        .map(|(r, _)| r)
        .collect();
    log::trace!(
        "[handshake] rank {} receives from {:?}, sends to {:?}",
        comm.rank(),
        recv_from,
        send_to
    );
    Ok(send_to)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algs::communicator::{NoComm, ThreadComm};

    #[test]
    fn ring_of_four_reverses_edges() {
        let out = ThreadComm::run(4, |comm| {
            let next = (comm.rank() + 1) % 4;
            dynamic_handshake(&comm, &BTreeSet::from([next])).unwrap()
        });
        for (rank, send_to) in out.into_iter().enumerate() {
            assert_eq!(send_to, BTreeSet::from([(rank + 3) % 4]));
        }
    }

    #[test]
    fn empty_interest_still_completes() {
        let out = ThreadComm::run(3, |comm| {
            let recv = if comm.rank() == 0 {
                BTreeSet::from([1, 2])
            } else {
                BTreeSet::new()
            };
            dynamic_handshake(&comm, &recv).unwrap()
        });
        assert!(out[0].is_empty());
        assert_eq!(out[1], BTreeSet::from([0]));
        assert_eq!(out[2], BTreeSet::from([0]));
    }

    #[test]
    fn self_interest_is_reflected() {
        let send_to = dynamic_handshake(&NoComm, &BTreeSet::from([0])).unwrap();
        assert_eq!(send_to, BTreeSet::from([0]));
        assert!(matches!(
            dynamic_handshake(&NoComm, &BTreeSet::from([3])),
            Err(HaloError::UnknownNeighbor(3))
        ));
    }
}
