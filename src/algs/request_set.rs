//! Fixed set of outstanding point-to-point operations drained with wait-any.
//!
//! Every slot carries a caller-chosen key (typically a neighbor index) and a status.
//! [`RequestSet::wait_any`] blocks until some pending slot completes and reports it;
//! once every slot is done it returns `None`. This is the completion loop behind the
//! distributed hash queries, the decomposition metadata exchange and halo exchange.

use crate::algs::communicator::{Communicator, Wait};

enum Pending<C: Communicator> {
    Send(C::SendHandle),
    Recv(C::RecvHandle),
}

impl<C: Communicator> Pending<C> {
    fn is_ready(&mut self) -> bool {
        match self {
            Pending::Send(h) => h.is_ready(),
            Pending::Recv(h) => h.is_ready(),
        }
    }

    fn finish(self) -> Option<Vec<u8>> {
        match self {
            Pending::Send(h) => h.wait(),
            Pending::Recv(h) => h.wait(),
        }
    }
}

/// What a completed slot was.
#[derive(Debug, PartialEq, Eq)]
pub enum Completion {
    Sent { slot: usize, key: usize },
    /// `payload` is `None` if the transport failed to deliver.
    Received {
        slot: usize,
        key: usize,
        payload: Option<Vec<u8>>,
    },
}

/// Outstanding requests with a per-slot status (`Some` = pending).
pub struct RequestSet<C: Communicator> {
    slots: Vec<Option<(usize, Pending<C>)>>,
    remaining: usize,
}

impl<C: Communicator> Default for RequestSet<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Communicator> RequestSet<C> {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            remaining: 0,
        }
    }

    pub fn with_capacity(n: usize) -> Self {
        Self {
            slots: Vec::with_capacity(n),
            remaining: 0,
        }
    }

    /// Adds a send; returns its slot index.
    pub fn push_send(&mut self, key: usize, handle: C::SendHandle) -> usize {
        self.push(key, Pending::Send(handle))
    }

    /// Adds a receive; returns its slot index.
    pub fn push_recv(&mut self, key: usize, handle: C::RecvHandle) -> usize {
        self.push(key, Pending::Recv(handle))
    }

    fn push(&mut self, key: usize, p: Pending<C>) -> usize {
        self.slots.push(Some((key, p)));
        self.remaining += 1;
        self.slots.len() - 1
    }

    /// Number of slots still pending.
    pub fn pending(&self) -> usize {
        self.remaining
    }

    pub fn is_done(&self) -> bool {
        self.remaining == 0
    }

    /// Blocks until one pending slot completes and returns it, or `None` when drained.
    pub fn wait_any(&mut self) -> Option<Completion> {
        while self.remaining > 0 {
            if let Some(done) = self.test_any() {
                return Some(done);
            }
            std::thread::yield_now();
        }
        None
    }

    /// Non-blocking `wait_any`: completes the first ready slot, if any.
    pub fn test_any(&mut self) -> Option<Completion> {
        for slot in 0..self.slots.len() {
            let ready = match self.slots[slot].as_mut() {
                Some((_, p)) => p.is_ready(),
                None => false,
            };
            if ready {
                return self.complete(slot);
            }
        }
        None
    }

    fn complete(&mut self, slot: usize) -> Option<Completion> {
        let (key, p) = self.slots[slot].take()?;
        self.remaining -= 1;
        Some(match p {
            Pending::Send(_) => {
                let _ = p.finish();
                Completion::Sent { slot, key }
            }
            Pending::Recv(_) => Completion::Received {
                slot,
                key,
                payload: p.finish(),
            },
        })
    }

    /// Completes every remaining slot in slot order, discarding payloads.
    pub fn wait_all(&mut self) {
        for slot in 0..self.slots.len() {
            if let Some((_, p)) = self.slots[slot].take() {
                self.remaining -= 1;
                let _ = p.finish();
            }
        }
    }
}

impl<C: Communicator> Drop for RequestSet<C> {
    fn drop(&mut self) {
        self.wait_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algs::communicator::ThreadComm;

    #[test]
    fn wait_any_reports_receives_as_they_land() {
        let comms = ThreadComm::universe(3);
        let mut set: RequestSet<ThreadComm> = RequestSet::new();
        let mut b = [0u8; 1];
        set.push_recv(1, comms[0].irecv(1, 5, &mut b));
        set.push_recv(2, comms[0].irecv(2, 5, &mut b));
        comms[2].isend(0, 5, &[22]);
        assert_eq!(
            set.wait_any(),
            Some(Completion::Received {
                slot: 1,
                key: 2,
                payload: Some(vec![22])
            })
        );
        comms[1].isend(0, 5, &[11]);
        assert_eq!(
            set.wait_any(),
            Some(Completion::Received {
                slot: 0,
                key: 1,
                payload: Some(vec![11])
            })
        );
        assert!(set.wait_any().is_none());
    }

    #[test]
    fn sends_complete_immediately_on_threads() {
        let comms = ThreadComm::universe(2);
        let mut set: RequestSet<ThreadComm> = RequestSet::with_capacity(1);
        set.push_send(1, comms[0].isend(1, 9, &[1]));
        assert_eq!(set.pending(), 1);
        assert_eq!(set.wait_any(), Some(Completion::Sent { slot: 0, key: 1 }));
        assert!(set.is_done());
    }

    #[test]
    fn test_any_does_not_block() {
        let comms = ThreadComm::universe(2);
        let mut set: RequestSet<ThreadComm> = RequestSet::new();
        let mut b = [0u8; 2];
        set.push_recv(1, comms[0].irecv(1, 3, &mut b));
        assert!(set.test_any().is_none());
        comms[1].isend(0, 3, &[4, 2]);
        assert!(matches!(
            set.test_any(),
            Some(Completion::Received { key: 1, .. })
        ));
        assert!(set.is_done());
    }
}
