//! Non-blocking ghost update over a [`HaloMap`].
//!
//! [`Halo::exchange`] packs and posts every neighbor message, applies the periodic
//! self-copies, and hands back an [`ExchangeRequest`] that borrows the field until the
//! messages have landed. Each element type has its own tag and buffers, so exchanges of
//! different types may overlap; a second exchange of the same type must wait for the
//! first to finish.

use super::exchanger::{DataType, ExchangerSet, HaloExchanger, HaloValue};
use super::map::HaloMap;
use crate::algs::communicator::{CommTag, Communicator};
use crate::algs::request_set::{Completion, RequestSet};
use crate::algs::wire::cast_slice;
use crate::halo_error::HaloError;
use parking_lot::Mutex;

/// Tag block of one halo; element type `t` uses `base + t.index()`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct HaloCommTags {
    pub base: CommTag,
}

impl HaloCommTags {
    #[inline]
    pub const fn from_base(base: CommTag) -> Self {
        Self { base }
    }

    #[inline]
    pub const fn for_type(self, data_type: DataType) -> CommTag {
        self.base.offset(data_type.index() as u16)
    }
}

impl Default for HaloCommTags {
    fn default() -> Self {
        Self::from_base(CommTag::new(0x2300))
    }
}

pub struct Halo<'c, C: Communicator> {
    comm: &'c C,
    map: HaloMap,
    tags: HaloCommTags,
    exchangers: Mutex<ExchangerSet>,
}

impl<'c, C: Communicator> Halo<'c, C> {
    pub fn new(comm: &'c C, map: HaloMap) -> Self {
        Self::with_tags(comm, map, HaloCommTags::default())
    }

    pub fn with_tags(comm: &'c C, map: HaloMap, tags: HaloCommTags) -> Self {
        Self {
            comm,
            map,
            tags,
            exchangers: Mutex::new(ExchangerSet::default()),
        }
    }

    #[inline]
    pub fn map(&self) -> &HaloMap {
        &self.map
    }

    #[inline]
    pub fn comm(&self) -> &'c C {
        self.comm
    }

    /// Whether exchanges send any messages.
    #[inline]
    pub fn is_active(&self) -> bool {
        self.map.is_active()
    }

    /// Element types whose exchange buffers exist.
    pub fn allocated_types(&self) -> Vec<DataType> {
        self.exchangers.lock().allocated()
    }

    /// Starts updating the ghost values of `values`, laid out column-major over the
    /// extended range. Local copies are already applied when this returns.
    pub fn exchange<'a, T: HaloValue>(
        &'a self,
        values: &'a mut [T],
    ) -> Result<ExchangeRequest<'a, 'c, T, C>, HaloError> {
        let expected = self.map.extended_range().count();
        if values.len() != expected {
            return Err(HaloError::FieldSizeMismatch {
                expected,
                got: values.len(),
            });
        }
        let mut exchanger = self
            .exchangers
            .lock()
            .acquire::<T>(&self.map)
            .ok_or(HaloError::ExchangeInFlight(T::DATA_TYPE))?;

        let tag = self.tags.for_type(T::DATA_TYPE).as_u16();
        let neighbors = self.map.neighbors();
        let mut requests: RequestSet<C> = RequestSet::with_capacity(2 * neighbors.len());
        for (n, nb) in neighbors.iter().enumerate() {
            if !nb.recv_indices.is_empty() {
                let mut buf = vec![0u8; exchanger.recv_len(n)];
                requests.push_recv(n, self.comm.irecv(nb.rank, tag, &mut buf));
            }
        }
        for (n, nb) in neighbors.iter().enumerate() {
            if !nb.send_indices.is_empty() {
                let packed = exchanger.pack(&self.map, n, values);
                requests.push_send(n, self.comm.isend(nb.rank, tag, cast_slice(packed)));
            }
        }
        log::trace!(
            "[halo] rank {} posted {} {:?} messages",
            self.comm.rank(),
            requests.pending(),
            T::DATA_TYPE
        );

        HaloExchanger::<T>::copy_local(&self.map, values);

        Ok(ExchangeRequest {
            halo: self,
            values,
            requests,
            exchanger: Some(exchanger),
            error: None,
        })
    }

    /// `exchange` followed by `wait`.
    pub fn exchange_blocking<T: HaloValue>(&self, values: &mut [T]) -> Result<(), HaloError> {
        self.exchange(values)?.wait()
    }
}

/// An exchange in flight. Holds the field borrow until every message has completed;
/// dropping it waits for completion.
pub struct ExchangeRequest<'a, 'c, T: HaloValue, C: Communicator> {
    halo: &'a Halo<'c, C>,
    values: &'a mut [T],
    requests: RequestSet<C>,
    exchanger: Option<HaloExchanger<T>>,
    error: Option<HaloError>,
}

impl<T: HaloValue, C: Communicator> ExchangeRequest<'_, '_, T, C> {
    /// Unpacks whatever has arrived without blocking; true once everything has.
    pub fn test(&mut self) -> bool {
        while let Some(done) = self.requests.test_any() {
            self.handle(done);
        }
        self.requests.is_done()
    }

    /// Blocks until all messages are complete and unpacked.
    pub fn wait(mut self) -> Result<(), HaloError> {
        self.drain();
        match self.error.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn drain(&mut self) {
        while let Some(done) = self.requests.wait_any() {
            self.handle(done);
        }
        if let Some(exchanger) = self.exchanger.take() {
            self.halo.exchangers.lock().release(exchanger);
        }
    }

    fn handle(&mut self, done: Completion) {
        let Completion::Received { key, payload, .. } = done else {
            return;
        };
        let map = &self.halo.map;
        let expected = self
            .exchanger
            .as_ref()
            .map_or(0, |ex| ex.recv_len(key));
        let rank = map.neighbors()[key].rank;
        match payload {
            Some(data) if data.len() == expected => {
                HaloExchanger::<T>::unpack(map, key, &data, self.values);
            }
            Some(data) if self.error.is_none() => {
                self.error = Some(HaloError::WireSizeMismatch {
                    neighbor: rank,
                    expected,
                    got: data.len(),
                });
            }
            None if self.error.is_none() => {
                self.error = Some(HaloError::comm(rank, "halo receive failed"));
            }
            _ => {}
        }
    }
}

impl<T: HaloValue, C: Communicator> Drop for ExchangeRequest<'_, '_, T, C> {
    fn drop(&mut self) {
        self.drain();
        if let Some(err) = self.error.take() {
            log::warn!("[halo] exchange dropped with error: {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algs::communicator::{NoComm, ThreadComm};
    use crate::decomp::{DecompInfo, extend_local_range};
    use crate::topology::{Cart, PeriodicStorage, Range, RangeIndexer};
    use std::collections::BTreeMap;

    fn ring(n: i32) -> Cart {
        Cart::new(
            Range::new(&[0], &[n]).unwrap(),
            [true, false, false],
            PeriodicStorage::Unique,
        )
        .unwrap()
    }

    #[test]
    fn inactive_halo_only_copies() {
        let cart = ring(4);
        let local = *cart.range();
        let ext = extend_local_range(&cart, &local, 1);
        let halo = Halo::new(&NoComm, HaloMap::local_only(&cart, &local, &ext).unwrap());
        assert!(!halo.is_active());

        let mut v = vec![0.0f64, 1.0, 2.0, 3.0, 4.0, 0.0, 0.0];
        let mut req = halo.exchange(&mut v).unwrap();
        assert!(req.test());
        req.wait().unwrap();
        assert_eq!(v, vec![4.0, 1.0, 2.0, 3.0, 4.0, 1.0, 2.0]);
        assert_eq!(halo.allocated_types(), vec![DataType::Double]);
    }

    #[test]
    fn wrong_field_length_is_rejected() {
        let cart = ring(4);
        let local = *cart.range();
        let halo = Halo::new(&NoComm, HaloMap::local_only(&cart, &local, &local).unwrap());
        let mut v = vec![0u8; 3];
        assert!(matches!(
            halo.exchange(&mut v),
            Err(HaloError::FieldSizeMismatch { expected: 4, got: 3 })
        ));
    }

    #[test]
    fn second_exchange_of_same_type_is_refused() {
        let cart = ring(4);
        let local = *cart.range();
        let ext = extend_local_range(&cart, &local, 1);
        let halo = Halo::new(&NoComm, HaloMap::local_only(&cart, &local, &ext).unwrap());
        let mut a = vec![0i32; 7];
        let mut b = vec![0i32; 7];
        let mut c = vec![false; 7];
        let first = halo.exchange(&mut a).unwrap();
        assert!(matches!(
            halo.exchange(&mut b),
            Err(HaloError::ExchangeInFlight(DataType::Int))
        ));
        halo.exchange_blocking(&mut c).unwrap();
        drop(first);
        halo.exchange_blocking(&mut b).unwrap();
    }

    #[test]
    fn two_ranks_on_a_ring_swap_ghosts() {
        let cart = ring(8);
        let results = ThreadComm::run(2, |comm| {
            let rank = comm.rank();
            let ranges = [
                Range::new(&[0], &[4]).unwrap(),
                Range::new(&[4], &[8]).unwrap(),
            ];
            let info = |r: usize| DecompInfo {
                local_range: ranges[r],
                extended_range: extend_local_range(&cart, &ranges[r], 1),
            };
            let mine = info(rank);
            let other = 1 - rank;
            let map = HaloMap::build(
                &cart,
                &mine.local_range,
                &mine.extended_range,
                &BTreeMap::from([(other, info(other))]),
            )
            .unwrap();
            let halo = Halo::new(&comm, map);

            let idx = RangeIndexer::column_major(mine.extended_range);
            let mut v = vec![-1i64; mine.extended_range.count()];
            for p in mine.local_range.points() {
                v[idx.to_index(p)] = i64::from(p[0]) * 10;
            }
            halo.exchange_blocking(&mut v).unwrap();
            let first = v.clone();
            halo.exchange_blocking(&mut v).unwrap();
            assert_eq!(first, v);
            v
        });
        // rank 0: extended [-1, 5); rank 1: extended [3, 10)
        assert_eq!(results[0], vec![70, 0, 10, 20, 30, 40]);
        assert_eq!(results[1], vec![30, 40, 50, 60, 70, 0, 10]);
    }
}
