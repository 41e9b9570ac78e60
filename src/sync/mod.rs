//! Collective synchronization of entity lifecycle events.
//!
//! Ranks record what changed locally in a [`ChangeLog`]. [`synchronize`] merges every
//! rank's log, so each rank sees the union of all flags per entity, and then fires the
//! [`ListenerSet`]. Must be called by every rank in the same order.

pub mod changelog;
pub mod listeners;

pub use changelog::{ChangeLog, EventFlags};
pub use listeners::{Listener, ListenerId, ListenerSet};

use crate::algs::communicator::{Communicator, ReduceOp};
use crate::halo_error::HaloError;
use std::collections::BTreeMap;

/// Collective. Merges all ranks' change logs (bitwise OR per entity id), delivers the
/// merged events to `listeners`, clears `changes`, and returns the events in id order.
/// Returns without firing anything when no rank has pending changes.
///
/// Entity ids must be below `i64::MAX`.
pub fn synchronize<C: Communicator>(
    comm: &C,
    changes: &mut ChangeLog,
    listeners: &mut ListenerSet,
) -> Result<Vec<(u64, EventFlags)>, HaloError> {
    comm.barrier()?;
    let longest = comm.all_reduce_i64(&[changes.len() as i64], ReduceOp::Max)?[0] as usize;
    if longest == 0 {
        return Ok(Vec::new());
    }

    // every rank writes (id + 1, bits) pairs into its own block; the sum is an all-gather
    let rank = comm.rank();
    let mut slots = vec![0i64; comm.size() * longest * 2];
    for (i, (id, flags)) in changes.iter().enumerate() {
        let at = (rank * longest + i) * 2;
        slots[at] = id as i64 + 1;
        slots[at + 1] = i64::from(flags.bits());
    }
    let gathered = comm.all_reduce_i64(&slots, ReduceOp::Sum)?;

    let mut merged: BTreeMap<u64, EventFlags> = BTreeMap::new();
    for pair in gathered.chunks_exact(2) {
        if pair[0] != 0 {
            *merged.entry((pair[0] - 1) as u64).or_default() |= EventFlags::from_bits(pair[1] as u32);
        }
    }
    let events: Vec<_> = merged.into_iter().collect();
    log::debug!(
        "[sync] rank {} delivering {} merged events",
        rank,
        events.len()
    );
    listeners.dispatch(&events);
    changes.clear();
    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algs::communicator::{NoComm, ThreadComm};
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[test]
    fn quiet_synchronization_fires_nothing() {
        let mut changes = ChangeLog::new();
        let mut listeners = ListenerSet::new();
        listeners.subscribe(|_, _, _| panic!("no events expected"));
        assert!(synchronize(&NoComm, &mut changes, &mut listeners).unwrap().is_empty());
    }

    #[test]
    fn flags_are_merged_across_ranks() {
        let out = ThreadComm::run(3, |comm| {
            let mut changes = ChangeLog::new();
            let mut listeners = ListenerSet::new();
            let batches = Arc::new(Mutex::new(Vec::new()));
            let pending = Arc::new(Mutex::new(EventFlags::NONE));
            {
                let (batches, pending) = (batches.clone(), pending.clone());
                listeners.subscribe(move |_, flags, last| {
                    let mut acc = pending.lock();
                    *acc |= flags;
                    if last {
                        batches.lock().push(*acc);
                        *acc = EventFlags::NONE;
                    }
                });
            }
            match comm.rank() {
                0 => changes.record(4, EventFlags::CREATE),
                1 => {
                    changes.record(4, EventFlags::EDIT);
                    changes.record(9, EventFlags::DESTROY);
                }
                _ => {}
            }
            let events = synchronize(&comm, &mut changes, &mut listeners).unwrap();
            assert!(changes.is_empty());
            let again = synchronize(&comm, &mut changes, &mut listeners).unwrap();
            assert!(again.is_empty());
            let batches = batches.lock().clone();
            (events, batches)
        });
        for (events, batches) in out {
            assert_eq!(
                events,
                vec![
                    (4, EventFlags::CREATE | EventFlags::EDIT),
                    (9, EventFlags::DESTROY),
                ]
            );
            assert_eq!(
                batches,
                vec![EventFlags::CREATE | EventFlags::EDIT | EventFlags::DESTROY]
            );
        }
    }
}
