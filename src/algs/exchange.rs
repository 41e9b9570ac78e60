//! Two-stage point-to-point exchange of variable-length byte payloads.
//!
//! Stage 1 posts a [`WireCount`] to every recipient so each receiver can size its
//! buffers; stage 2 moves the payloads. Completion of both stages is driven by a
//! [`RequestSet`], and every handle is drained before returning, even on error.

use crate::algs::communicator::{Communicator, StagedCommTags};
use crate::algs::request_set::{Completion, RequestSet};
use crate::algs::wire::{WireCount, cast_slice, read_records};
use crate::halo_error::HaloError;
use std::collections::{BTreeMap, BTreeSet};

/// Sends `outgoing[r]` to each `r` and receives one payload from each rank in
/// `recv_from`. Ranks in `recv_from` that have nothing to say still send an empty
/// payload, so both sides must agree on the pattern (e.g. via a handshake).
pub fn exchange_bytes<C: Communicator>(
    comm: &C,
    tags: StagedCommTags,
    outgoing: &BTreeMap<usize, Vec<u8>>,
    recv_from: &BTreeSet<usize>,
) -> Result<BTreeMap<usize, Vec<u8>>, HaloError> {
    let sizes = exchange_counts(comm, tags, outgoing, recv_from)?;

    let mut set: RequestSet<C> = RequestSet::with_capacity(outgoing.len() + recv_from.len());
    for (&peer, &n) in &sizes {
        let mut buf = vec![0u8; n];
        set.push_recv(peer, comm.irecv(peer, tags.data.as_u16(), &mut buf));
    }
    for (&peer, bytes) in outgoing {
        set.push_send(peer, comm.isend(peer, tags.data.as_u16(), bytes));
    }

    let mut received = BTreeMap::new();
    let mut maybe_err = None;
    while let Some(done) = set.wait_any() {
        if let Completion::Received { key, payload, .. } = done {
            match payload {
                Some(data) if data.len() == sizes[&key] => {
                    received.insert(key, data);
                }
                Some(data) if maybe_err.is_none() => {
                    maybe_err = Some(HaloError::WireSizeMismatch {
                        neighbor: key,
                        expected: sizes[&key],
                        got: data.len(),
                    });
                }
                None if maybe_err.is_none() => {
                    maybe_err = Some(HaloError::comm(key, "failed to receive payload"));
                }
                _ => {} // already have an error; just drain
            }
        }
    }

    match maybe_err {
        Some(err) => Err(err),
        None => Ok(received),
    }
}

fn exchange_counts<C: Communicator>(
    comm: &C,
    tags: StagedCommTags,
    outgoing: &BTreeMap<usize, Vec<u8>>,
    recv_from: &BTreeSet<usize>,
) -> Result<BTreeMap<usize, usize>, HaloError> {
    let mut set: RequestSet<C> = RequestSet::with_capacity(outgoing.len() + recv_from.len());
    for &peer in recv_from {
        let mut cnt = [0u8; std::mem::size_of::<WireCount>()];
        set.push_recv(peer, comm.irecv(peer, tags.sizes.as_u16(), &mut cnt));
    }
    for (&peer, bytes) in outgoing {
        let count = WireCount::new(bytes.len());
        set.push_send(
            peer,
            comm.isend(peer, tags.sizes.as_u16(), cast_slice(std::slice::from_ref(&count))),
        );
    }

    let mut sizes = BTreeMap::new();
    let mut maybe_err = None;
    while let Some(done) = set.wait_any() {
        if let Completion::Received { key, payload, .. } = done {
            match payload {
                Some(data) if data.len() == std::mem::size_of::<WireCount>() => {
                    sizes.insert(key, read_records::<WireCount>(&data)[0].get());
                }
                Some(data) if maybe_err.is_none() => {
                    maybe_err = Some(HaloError::WireSizeMismatch {
                        neighbor: key,
                        expected: std::mem::size_of::<WireCount>(),
                        got: data.len(),
                    });
                }
                None if maybe_err.is_none() => {
                    maybe_err = Some(HaloError::comm(
                        key,
                        format!("failed to receive size from rank {key}"),
                    ));
                }
                _ => {}
            }
        }
    }

    match maybe_err {
        Some(err) => Err(err),
        None => Ok(sizes),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algs::communicator::{CommTag, ThreadComm};

    #[test]
    fn variable_payloads_between_three_ranks() {
        let tags = StagedCommTags::from_base(CommTag::new(0x0300));
        let out = ThreadComm::run(3, |comm| {
            let me = comm.rank();
            // everyone sends `me+1` copies of its rank to every other rank
            let outgoing: BTreeMap<usize, Vec<u8>> = (0..3)
                .filter(|&p| p != me)
                .map(|p| (p, vec![me as u8; me + 1]))
                .collect();
            let recv_from: BTreeSet<usize> = (0..3).filter(|&p| p != me).collect();
            exchange_bytes(&comm, tags, &outgoing, &recv_from).unwrap()
        });
        assert_eq!(out[0][&1], vec![1, 1]);
        assert_eq!(out[0][&2], vec![2, 2, 2]);
        assert_eq!(out[2][&0], vec![0]);
        assert!(!out[1].contains_key(&1));
    }

    #[test]
    fn empty_payloads_are_delivered() {
        let tags = StagedCommTags::from_base(CommTag::new(0x0310));
        let out = ThreadComm::run(2, |comm| {
            let peer = 1 - comm.rank();
            let outgoing = BTreeMap::from([(peer, Vec::new())]);
            exchange_bytes(&comm, tags, &outgoing, &BTreeSet::from([peer])).unwrap()
        });
        assert_eq!(out[0][&1], Vec::<u8>::new());
        assert_eq!(out[1][&0], Vec::<u8>::new());
    }
}
