//! Thin façade over intra-process (threads) or inter-process (MPI) message passing.
//!
//! Messages are *contiguous byte slices* matched on `(source, dest, tag)` in posting
//! order. All handles are **waitable** but non-blocking: callers `.wait()` before they
//! trust that a receive buffer is ready. Collectives (`barrier`, `all_reduce_i64`,
//! `all_to_all_flags`) have default implementations on top of point-to-point messages;
//! the MPI backend overrides them with native calls.

use crate::algs::wire::{WireI64, cast_slice, read_records};
use crate::halo_error::HaloError;
use bytes::Bytes;
use dashmap::DashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Typed message tag.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct CommTag(u16);

impl CommTag {
    #[inline]
    pub const fn new(tag: u16) -> Self {
        Self(tag)
    }

    #[inline]
    pub const fn as_u16(self) -> u16 {
        self.0
    }

    /// Tag `n` steps past this one.
    #[inline]
    pub const fn offset(self, n: u16) -> Self {
        Self(self.0.wrapping_add(n))
    }
}

/// Tags for a two-stage (sizes, then payload) exchange.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct StagedCommTags {
    pub sizes: CommTag,
    pub data: CommTag,
}

impl StagedCommTags {
    #[inline]
    pub const fn from_base(base: CommTag) -> Self {
        Self {
            sizes: base,
            data: base.offset(1),
        }
    }
}

// Reserved for the default collectives; user tags stay below 0x8000.
const TAG_REDUCE_UP: u16 = 0xFFF0;
const TAG_REDUCE_DOWN: u16 = 0xFFF1;
const TAG_ALL_TO_ALL: u16 = 0xFFF2;

/// Element-wise reduction applied by [`Communicator::all_reduce_i64`].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ReduceOp {
    Sum,
    Min,
    Max,
    /// Non-zero is true; result is 0 or 1.
    LogicalAnd,
    /// Non-zero is true; result is 0 or 1.
    LogicalOr,
}

impl ReduceOp {
    #[inline]
    pub fn apply(self, a: i64, b: i64) -> i64 {
        match self {
            ReduceOp::Sum => a + b,
            ReduceOp::Min => a.min(b),
            ReduceOp::Max => a.max(b),
            ReduceOp::LogicalAnd => i64::from(a != 0 && b != 0),
            ReduceOp::LogicalOr => i64::from(a != 0 || b != 0),
        }
    }
}

/// Non-blocking communication interface.
pub trait Communicator: Send + Sync + 'static {
    /// Handle returned by `isend`.
    type SendHandle: Wait;
    /// Handle returned by `irecv`.
    type RecvHandle: Wait;

    fn rank(&self) -> usize;
    fn size(&self) -> usize;

    fn isend(&self, peer: usize, tag: u16, buf: &[u8]) -> Self::SendHandle;
    /// Posts a receive of `buf.len()` bytes; the payload is returned by `wait`.
    fn irecv(&self, peer: usize, tag: u16, buf: &mut [u8]) -> Self::RecvHandle;

    /// Blocks until every rank has entered the barrier.
    fn barrier(&self) -> Result<(), HaloError> {
        self.all_reduce_i64(&[0], ReduceOp::Sum).map(|_| ())
    }

    /// Element-wise reduction of `values` across all ranks; every rank gets the result.
    fn all_reduce_i64(&self, values: &[i64], op: ReduceOp) -> Result<Vec<i64>, HaloError> {
        let (rank, size) = (self.rank(), self.size());
        if size == 1 {
            return Ok(values.to_vec());
        }
        let nbytes = std::mem::size_of_val(values);
        let wire: Vec<WireI64> = values.iter().map(|&v| WireI64::new(v)).collect();

        if rank != 0 {
            let mut recv_buf = vec![0u8; nbytes];
            let recv = self.irecv(0, TAG_REDUCE_DOWN, &mut recv_buf);
            let send = self.isend(0, TAG_REDUCE_UP, cast_slice(&wire));
            let result = decode_i64s(0, recv.wait(), values.len());
            let _ = send.wait();
            return result;
        }

        // root: fold contributions in rank order, then fan the result out
        let mut pending = Vec::with_capacity(size - 1);
        for peer in 1..size {
            let mut buf = vec![0u8; nbytes];
            pending.push((peer, self.irecv(peer, TAG_REDUCE_UP, &mut buf)));
        }
        let mut acc = values.to_vec();
        let mut maybe_err = None;
        for (peer, h) in pending {
            match decode_i64s(peer, h.wait(), values.len()) {
                Ok(theirs) if maybe_err.is_none() => {
                    for (a, b) in acc.iter_mut().zip(theirs) {
                        *a = op.apply(*a, b);
                    }
                }
                Err(e) if maybe_err.is_none() => maybe_err = Some(e),
                _ => {}
            }
        }
        if let Some(err) = maybe_err {
            return Err(err);
        }
        let out: Vec<WireI64> = acc.iter().map(|&v| WireI64::new(v)).collect();
        let sends: Vec<_> = (1..size)
            .map(|peer| self.isend(peer, TAG_REDUCE_DOWN, cast_slice(&out)))
            .collect();
        for s in sends {
            let _ = s.wait();
        }
        Ok(acc)
    }

    /// Personalized all-to-all of one byte per rank: `out[p]` is what rank `p` put in
    /// its `flags[self.rank()]`.
    fn all_to_all_flags(&self, flags: &[u8]) -> Result<Vec<u8>, HaloError> {
        let (rank, size) = (self.rank(), self.size());
        debug_assert_eq!(flags.len(), size);
        let mut out = vec![0u8; size];
        out[rank] = flags[rank];
        if size == 1 {
            return Ok(out);
        }
        let mut recvs = Vec::with_capacity(size - 1);
        for peer in (0..size).filter(|&p| p != rank) {
            let mut b = [0u8; 1];
            recvs.push((peer, self.irecv(peer, TAG_ALL_TO_ALL, &mut b)));
        }
        let sends: Vec<_> = (0..size)
            .filter(|&p| p != rank)
            .map(|peer| self.isend(peer, TAG_ALL_TO_ALL, &flags[peer..peer + 1]))
            .collect();
        let mut maybe_err = None;
        for (peer, h) in recvs {
            match h.wait() {
                Some(data) if data.len() == 1 => out[peer] = data[0],
                Some(data) if maybe_err.is_none() => {
                    maybe_err = Some(HaloError::WireSizeMismatch {
                        neighbor: peer,
                        expected: 1,
                        got: data.len(),
                    })
                }
                None if maybe_err.is_none() => {
                    maybe_err = Some(HaloError::comm(peer, "all-to-all receive failed"))
                }
                _ => {}
            }
        }
        for s in sends {
            let _ = s.wait();
        }
        match maybe_err {
            Some(err) => Err(err),
            None => Ok(out),
        }
    }
}

fn decode_i64s(peer: usize, data: Option<Vec<u8>>, n: usize) -> Result<Vec<i64>, HaloError> {
    let data = data.ok_or_else(|| HaloError::comm(peer, "reduction receive failed"))?;
    let expected = n * std::mem::size_of::<WireI64>();
    if data.len() != expected {
        return Err(HaloError::WireSizeMismatch {
            neighbor: peer,
            expected,
            got: data.len(),
        });
    }
    Ok(read_records::<WireI64>(&data)
        .iter()
        .map(WireI64::get)
        .collect())
}

/// Anything that can be waited on.
pub trait Wait {
    /// Wait for completion and return the received data (if any).
    fn wait(self) -> Option<Vec<u8>>;

    /// Non-blocking completion test.
    fn is_ready(&mut self) -> bool {
        true
    }
}

impl Wait for () {
    fn wait(self) -> Option<Vec<u8>> {
        None
    }
}

/// Single-rank comm for pure serial use; never exchanges messages.
#[derive(Clone, Debug, Default)]
pub struct NoComm;

impl Communicator for NoComm {
    type SendHandle = ();
    type RecvHandle = ();

    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn isend(&self, _peer: usize, _tag: u16, _buf: &[u8]) {}

    fn irecv(&self, _peer: usize, _tag: u16, _buf: &mut [u8]) {}
}

// --- ThreadComm: in-process universe, one thread per rank ---
type Key = (usize, usize, u16); // (src, dst, tag)

#[derive(Default)]
struct Mailbox {
    slots: DashMap<(Key, u64), Bytes>,
    send_seq: DashMap<Key, u64>,
    recv_seq: DashMap<Key, u64>,
    aborted: AtomicBool,
}

impl Mailbox {
    fn next_seq(counters: &DashMap<Key, u64>, key: Key) -> u64 {
        let mut entry = counters.entry(key).or_insert(0);
        let seq = *entry;
        *entry += 1;
        seq
    }
}

/// Communicator for a simulated universe of ranks sharing one process.
///
/// Each rank is driven by its own thread; messages between the same pair of ranks with
/// the same tag are matched in posting order, as with MPI.
#[derive(Clone)]
pub struct ThreadComm {
    rank: usize,
    size: usize,
    mailbox: Arc<Mailbox>,
}

impl std::fmt::Debug for ThreadComm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadComm")
            .field("rank", &self.rank)
            .field("size", &self.size)
            .finish()
    }
}

impl ThreadComm {
    /// One communicator per rank of a fresh universe of `size` ranks.
    pub fn universe(size: usize) -> Vec<ThreadComm> {
        let mailbox = Arc::new(Mailbox::default());
        (0..size)
            .map(|rank| ThreadComm {
                rank,
                size,
                mailbox: mailbox.clone(),
            })
            .collect()
    }

    /// Runs `f` on every rank of a fresh universe, one scoped thread each, and returns
    /// the per-rank results in rank order. A panic on any rank is re-raised here after
    /// the remaining ranks have been released from pending receives.
    pub fn run<F, R>(size: usize, f: F) -> Vec<R>
    where
        F: Fn(ThreadComm) -> R + Sync,
        R: Send,
    {
        let comms = Self::universe(size);
        std::thread::scope(|s| {
            let handles: Vec<_> = comms
                .into_iter()
                .map(|comm| {
                    let f = &f;
                    s.spawn(move || {
                        let _guard = AbortOnPanic(comm.mailbox.clone());
                        f(comm)
                    })
                })
                .collect();
            let mut results = Vec::with_capacity(size);
            let mut first_panic = None;
            for h in handles {
                match h.join() {
                    Ok(r) => results.push(r),
                    Err(p) => {
                        first_panic.get_or_insert(p);
                    }
                }
            }
            if let Some(p) = first_panic {
                std::panic::resume_unwind(p);
            }
            results
        })
    }
}

struct AbortOnPanic(Arc<Mailbox>);

impl Drop for AbortOnPanic {
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.0.aborted.store(true, Ordering::SeqCst);
        }
    }
}

/// Receive handle of [`ThreadComm`].
pub struct ThreadRecv {
    mailbox: Arc<Mailbox>,
    slot: (Key, u64),
    data: Option<Bytes>,
}

impl Wait for ThreadRecv {
    fn wait(mut self) -> Option<Vec<u8>> {
        while !self.is_ready() {
            std::thread::yield_now();
        }
        self.data.take().map(|b| b.to_vec())
    }

    /// Also true once another rank of the universe has panicked; `wait` then yields `None`.
    fn is_ready(&mut self) -> bool {
        if self.data.is_none() {
            self.data = self.mailbox.slots.remove(&self.slot).map(|(_, v)| v);
        }
        self.data.is_some() || self.mailbox.aborted.load(Ordering::SeqCst)
    }
}

impl Communicator for ThreadComm {
    type SendHandle = ();
    type RecvHandle = ThreadRecv;

    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn isend(&self, peer: usize, tag: u16, buf: &[u8]) {
        let key = (self.rank, peer, tag);
        let seq = Mailbox::next_seq(&self.mailbox.send_seq, key);
        self.mailbox
            .slots
            .insert((key, seq), Bytes::copy_from_slice(buf));
    }

    fn irecv(&self, peer: usize, tag: u16, _buf: &mut [u8]) -> ThreadRecv {
        let key = (peer, self.rank, tag);
        let seq = Mailbox::next_seq(&self.mailbox.recv_seq, key);
        ThreadRecv {
            mailbox: self.mailbox.clone(),
            slot: (key, seq),
            data: None,
        }
    }
}

// --- MPI backend (feature = "mpi-support") ---
#[cfg(feature = "mpi-support")]
mod mpi_backend {
    use super::*;
    use mpi::collective::SystemOperation;
    use mpi::environment::Universe;
    use mpi::request::{Request, StaticScope};
    use mpi::topology::SimpleCommunicator;
    use mpi::traits::*;

    pub struct MpiComm {
        world: SimpleCommunicator,
        rank: usize,
        size: usize,
        _universe: Universe,
    }

    // SAFETY: requests are posted and completed by the thread that initialized MPI.
    unsafe impl Send for MpiComm {}
    unsafe impl Sync for MpiComm {}

    impl MpiComm {
        pub fn new() -> Result<Self, HaloError> {
            let universe =
                mpi::initialize().ok_or_else(|| HaloError::comm(0, "MPI already initialized"))?;
            let world = universe.world();
            Ok(Self {
                rank: world.rank() as usize,
                size: world.size() as usize,
                world,
                _universe: universe,
            })
        }

        pub fn world(&self) -> &SimpleCommunicator {
            &self.world
        }
    }

    /// Owns a leaked buffer for the lifetime of the request and reclaims it on completion.
    pub struct MpiHandle {
        request: Option<Request<'static, [u8], StaticScope>>,
        buf: Option<*mut [u8]>,
        is_recv: bool,
    }

    impl MpiHandle {
        fn reclaim(&mut self) -> Option<Box<[u8]>> {
            if let Some(req) = self.request.take() {
                req.wait();
            }
            // SAFETY: `buf` came from `Box::leak` and the request using it has completed.
            self.buf.take().map(|p| unsafe { Box::from_raw(p) })
        }
    }

    impl Wait for MpiHandle {
        fn wait(mut self) -> Option<Vec<u8>> {
            let data = self.reclaim();
            if self.is_recv {
                data.map(|b| b.into_vec())
            } else {
                None
            }
        }

        fn is_ready(&mut self) -> bool {
            if let Some(req) = self.request.take() {
                if let Err(req) = req.test() {
                    self.request = Some(req);
                }
            }
            self.request.is_none()
        }
    }

    impl Drop for MpiHandle {
        fn drop(&mut self) {
            let _ = self.reclaim();
        }
    }

    impl Communicator for MpiComm {
        type SendHandle = MpiHandle;
        type RecvHandle = MpiHandle;

        fn rank(&self) -> usize {
            self.rank
        }

        fn size(&self) -> usize {
            self.size
        }

        fn isend(&self, peer: usize, tag: u16, buf: &[u8]) -> MpiHandle {
            let leaked: &'static mut [u8] = Box::leak(buf.to_vec().into_boxed_slice());
            let ptr: *mut [u8] = leaked;
            // SAFETY: the buffer stays alive until `reclaim` has waited on the request.
            let send: &'static [u8] = unsafe { &*ptr };
            let req = self.world.process_at_rank(peer as i32).immediate_send_with_tag(
                StaticScope,
                send,
                i32::from(tag),
            );
            MpiHandle {
                request: Some(req),
                buf: Some(ptr),
                is_recv: false,
            }
        }

        fn irecv(&self, peer: usize, tag: u16, buf: &mut [u8]) -> MpiHandle {
            let leaked: &'static mut [u8] = Box::leak(vec![0u8; buf.len()].into_boxed_slice());
            let ptr: *mut [u8] = leaked;
            // SAFETY: as in `isend`; only the request touches the buffer until completion.
            let recv: &'static mut [u8] = unsafe { &mut *ptr };
            let req = self
                .world
                .process_at_rank(peer as i32)
                .immediate_receive_into_with_tag(StaticScope, recv, i32::from(tag));
            MpiHandle {
                request: Some(req),
                buf: Some(ptr),
                is_recv: true,
            }
        }

        fn barrier(&self) -> Result<(), HaloError> {
            self.world.barrier();
            Ok(())
        }

        fn all_reduce_i64(&self, values: &[i64], op: ReduceOp) -> Result<Vec<i64>, HaloError> {
            let mut out = vec![0i64; values.len()];
            let op = match op {
                ReduceOp::Sum => SystemOperation::sum(),
                ReduceOp::Min => SystemOperation::min(),
                ReduceOp::Max => SystemOperation::max(),
                ReduceOp::LogicalAnd => SystemOperation::logical_and(),
                ReduceOp::LogicalOr => SystemOperation::logical_or(),
            };
            self.world.all_reduce_into(values, &mut out[..], op);
            Ok(out)
        }

        fn all_to_all_flags(&self, flags: &[u8]) -> Result<Vec<u8>, HaloError> {
            let mut out = vec![0u8; self.size];
            self.world.all_to_all_into(flags, &mut out[..]);
            Ok(out)
        }
    }
}

#[cfg(feature = "mpi-support")]
pub use mpi_backend::{MpiComm, MpiHandle};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thread_roundtrip_two_ranks() {
        let comms = ThreadComm::universe(2);
        let mut recv_buf = [0u8; 4];
        let recv = comms[1].irecv(0, 7, &mut recv_buf);
        comms[0].isend(1, 7, &[1, 2, 3, 4]).wait();
        let data = recv.wait().expect("Expected to receive data from rank 0");
        assert_eq!(data, vec![1, 2, 3, 4]);
    }

    #[test]
    fn same_key_messages_match_in_post_order() {
        let comms = ThreadComm::universe(2);
        comms[0].isend(1, 3, &[10]);
        comms[0].isend(1, 3, &[20]);
        let mut b = [0u8; 1];
        let first = comms[1].irecv(0, 3, &mut b);
        let second = comms[1].irecv(0, 3, &mut b);
        assert_eq!(second.wait(), Some(vec![20]));
        assert_eq!(first.wait(), Some(vec![10]));
    }

    #[test]
    fn receive_is_not_ready_until_sent() {
        let comms = ThreadComm::universe(2);
        let mut b = [0u8; 1];
        let mut h = comms[0].irecv(1, 1, &mut b);
        assert!(!h.is_ready());
        comms[1].isend(0, 1, &[9]);
        assert!(h.is_ready());
        assert_eq!(h.wait(), Some(vec![9]));
    }

    #[test]
    fn default_collectives_on_threads() {
        let out = ThreadComm::run(4, |comm| {
            comm.barrier().unwrap();
            let r = comm.rank() as i64;
            let sum = comm.all_reduce_i64(&[r, 1], ReduceOp::Sum).unwrap();
            let max = comm.all_reduce_i64(&[r], ReduceOp::Max).unwrap();
            let and = comm
                .all_reduce_i64(&[i64::from(r != 2)], ReduceOp::LogicalAnd)
                .unwrap();
            let flags: Vec<u8> = (0..4).map(|p| (comm.rank() * 10 + p) as u8).collect();
            let a2a = comm.all_to_all_flags(&flags).unwrap();
            (sum, max, and, a2a)
        });
        for (rank, (sum, max, and, a2a)) in out.into_iter().enumerate() {
            assert_eq!(sum, vec![6, 4]);
            assert_eq!(max, vec![3]);
            assert_eq!(and, vec![0]);
            let expect: Vec<u8> = (0..4).map(|p| (p * 10 + rank) as u8).collect();
            assert_eq!(a2a, expect);
        }
    }

    #[test]
    fn no_comm_collectives_are_identity() {
        let comm = NoComm;
        assert_eq!(comm.all_reduce_i64(&[5], ReduceOp::Sum).unwrap(), vec![5]);
        assert_eq!(comm.all_to_all_flags(&[1]).unwrap(), vec![1]);
        comm.barrier().unwrap();
    }

    #[test]
    fn comm_tags_offset() {
        let tags = StagedCommTags::from_base(CommTag::new(0x2100));
        assert_eq!(tags.sizes.as_u16(), 0x2100);
        assert_eq!(tags.data.as_u16(), 0x2101);
    }
}
