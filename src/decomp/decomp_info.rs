//! Exchange of local/extended range metadata with discovered neighbors.

use crate::algs::communicator::{CommTag, Communicator};
use crate::algs::handshake::dynamic_handshake;
use crate::algs::request_set::{Completion, RequestSet};
use crate::algs::wire::{WireDecompInfo, WireRange, cast_slice, read_records};
use crate::halo_error::HaloError;
use crate::topology::Range;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// A neighbor's own local and ghost-extended ranges.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecompInfo {
    pub local_range: Range,
    pub extended_range: Range,
}

/// Default tag of the metadata exchange.
pub const DECOMP_INFO_TAG: CommTag = CommTag::new(0x2200);

/// Collective. Sends this rank's ranges to every rank that lists it as a neighbor and
/// returns the ranges of each rank in `neighbors`, keyed by rank.
pub fn retrieve_decomp_info<C: Communicator>(
    comm: &C,
    neighbors: &BTreeSet<usize>,
    local: &Range,
    extended: &Range,
) -> Result<BTreeMap<usize, DecompInfo>, HaloError> {
    retrieve_decomp_info_with_tag(comm, DECOMP_INFO_TAG, neighbors, local, extended)
}

pub fn retrieve_decomp_info_with_tag<C: Communicator>(
    comm: &C,
    tag: CommTag,
    neighbors: &BTreeSet<usize>,
    local: &Range,
    extended: &Range,
) -> Result<BTreeMap<usize, DecompInfo>, HaloError> {
    let send_to = dynamic_handshake(comm, neighbors)?;
    let mine = WireDecompInfo {
        local: WireRange::new(local),
        extended: WireRange::new(extended),
    };
    let rec = std::mem::size_of::<WireDecompInfo>();

    let mut set: RequestSet<C> = RequestSet::with_capacity(neighbors.len() + send_to.len());
    for &peer in neighbors {
        let mut buf = vec![0u8; rec];
        set.push_recv(peer, comm.irecv(peer, tag.as_u16(), &mut buf));
    }
    for &peer in &send_to {
        set.push_send(peer, comm.isend(peer, tag.as_u16(), cast_slice(&[mine])));
    }

    let mut infos = BTreeMap::new();
    let mut maybe_err = None;
    while let Some(done) = set.wait_any() {
        let Completion::Received { key, payload, .. } = done else {
            continue;
        };
        match payload {
            Some(data) if data.len() == rec => {
                let w = read_records::<WireDecompInfo>(&data)[0];
                infos.insert(
                    key,
                    DecompInfo {
                        local_range: w.local.get(),
                        extended_range: w.extended.get(),
                    },
                );
            }
            Some(data) if maybe_err.is_none() => {
                maybe_err = Some(HaloError::WireSizeMismatch {
                    neighbor: key,
                    expected: rec,
                    got: data.len(),
                });
            }
            None if maybe_err.is_none() => {
                maybe_err = Some(HaloError::comm(key, "failed to receive decomposition info"));
            }
            _ => {}
        }
    }

    match maybe_err {
        Some(err) => Err(err),
        None => Ok(infos),
    }
}
