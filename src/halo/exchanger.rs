//! Per-element-type exchange buffers.
//!
//! The set of exchangeable element types is closed: [`HaloValue`] is implemented for
//! `bool`, `u8`, `i32`, `i64`, `u32`, `u64`, `f32` and `f64`. Each type owns one
//! [`HaloExchanger`] per halo, created on first use and kept for later exchanges.

use super::map::HaloMap;
use bytemuck::Pod;
use serde::{Deserialize, Serialize};

/// Element type tag of an exchanger.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DataType {
    Bool,
    Byte,
    Int,
    Long,
    UnsignedInt,
    UnsignedLong,
    Float,
    Double,
}

impl DataType {
    pub const ALL: [DataType; 8] = [
        DataType::Bool,
        DataType::Byte,
        DataType::Int,
        DataType::Long,
        DataType::UnsignedInt,
        DataType::UnsignedLong,
        DataType::Float,
        DataType::Double,
    ];

    /// Dense index, also the tag offset of this type's messages.
    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }
}

/// An element type that can travel through a halo.
pub trait HaloValue: Copy + Send + Sync + 'static {
    const DATA_TYPE: DataType;
    /// Little-endian wire representation.
    type Wire: Pod;

    fn to_wire(self) -> Self::Wire;
    fn from_wire(wire: Self::Wire) -> Self;

    #[doc(hidden)]
    fn slot(set: &mut ExchangerSet) -> &mut Option<HaloExchanger<Self>>;
}

/// Pack buffers for one element type, sized for one halo map.
pub struct HaloExchanger<T: HaloValue> {
    send: Vec<Vec<T::Wire>>,
    recv_len: Vec<usize>,
}

impl<T: HaloValue> HaloExchanger<T> {
    pub fn new(map: &HaloMap) -> Self {
        let wire = std::mem::size_of::<T::Wire>();
        Self {
            send: map
                .neighbors()
                .iter()
                .map(|n| Vec::with_capacity(n.send_indices.len()))
                .collect(),
            recv_len: map
                .neighbors()
                .iter()
                .map(|n| n.recv_indices.len() * wire)
                .collect(),
        }
    }

    /// Gathers the outgoing values of neighbor `n` into its send buffer.
    pub fn pack(&mut self, map: &HaloMap, n: usize, values: &[T]) -> &[T::Wire] {
        let buf = &mut self.send[n];
        buf.clear();
        buf.extend(map.neighbors()[n].send_indices.iter().map(|&i| values[i].to_wire()));
        buf
    }

    /// Byte length of the message expected from neighbor `n`.
    #[inline]
    pub fn recv_len(&self, n: usize) -> usize {
        self.recv_len[n]
    }

    /// Scatters a received message of neighbor `n` into the ghost slots.
    pub fn unpack(map: &HaloMap, n: usize, payload: &[u8], values: &mut [T]) {
        let wire = std::mem::size_of::<T::Wire>();
        for (&i, chunk) in map.neighbors()[n]
            .recv_indices
            .iter()
            .zip(payload.chunks_exact(wire))
        {
            values[i] = T::from_wire(bytemuck::pod_read_unaligned(chunk));
        }
    }

    /// Applies the periodic self-copies of `map`.
    pub fn copy_local(map: &HaloMap, values: &mut [T]) {
        for &(src, dst) in map.local_copies() {
            values[dst] = values[src];
        }
    }
}

/// One optional exchanger per element type, plus the in-flight marks.
#[derive(Default)]
pub struct ExchangerSet {
    bool_: Option<HaloExchanger<bool>>,
    byte: Option<HaloExchanger<u8>>,
    int: Option<HaloExchanger<i32>>,
    long: Option<HaloExchanger<i64>>,
    uint: Option<HaloExchanger<u32>>,
    ulong: Option<HaloExchanger<u64>>,
    float: Option<HaloExchanger<f32>>,
    double: Option<HaloExchanger<f64>>,
    in_flight: u16,
}

impl ExchangerSet {
    /// Checks out the exchanger of `T`, creating it on first use.
    /// Returns `None` while an exchange of `T` is in flight.
    pub fn acquire<T: HaloValue>(&mut self, map: &HaloMap) -> Option<HaloExchanger<T>> {
        let bit = 1u16 << T::DATA_TYPE.index();
        if self.in_flight & bit != 0 {
            return None;
        }
        self.in_flight |= bit;
        Some(T::slot(self).take().unwrap_or_else(|| HaloExchanger::new(map)))
    }

    /// Returns a checked-out exchanger for reuse.
    pub fn release<T: HaloValue>(&mut self, exchanger: HaloExchanger<T>) {
        self.in_flight &= !(1u16 << T::DATA_TYPE.index());
        *T::slot(self) = Some(exchanger);
    }

    pub fn is_in_flight(&self, data_type: DataType) -> bool {
        self.in_flight & (1u16 << data_type.index()) != 0
    }

    /// Element types whose buffers have been allocated.
    pub fn allocated(&self) -> Vec<DataType> {
        let present = [
            self.bool_.is_some(),
            self.byte.is_some(),
            self.int.is_some(),
            self.long.is_some(),
            self.uint.is_some(),
            self.ulong.is_some(),
            self.float.is_some(),
            self.double.is_some(),
        ];
        DataType::ALL
            .into_iter()
            .zip(present)
            .filter_map(|(t, p)| (p || self.is_in_flight(t)).then_some(t))
            .collect()
    }
}

macro_rules! impl_halo_value {
    ($($t:ty => $dt:ident, $field:ident, $wire:ty, |$a:ident| $to:expr, |$b:ident| $from:expr;)*) => {
        $(
            impl HaloValue for $t {
                const DATA_TYPE: DataType = DataType::$dt;
                type Wire = $wire;

                #[inline]
                fn to_wire(self) -> $wire {
                    let $a = self;
                    $to
                }

                #[inline]
                fn from_wire(wire: $wire) -> $t {
                    let $b = wire;
                    $from
                }

                fn slot(set: &mut ExchangerSet) -> &mut Option<HaloExchanger<$t>> {
                    &mut set.$field
                }
            }
        )*
    };
}

impl_halo_value! {
    bool => Bool, bool_, u8, |v| u8::from(v), |w| w != 0;
    u8 => Byte, byte, u8, |v| v, |w| w;
    i32 => Int, int, i32, |v| v.to_le(), |w| i32::from_le(w);
    i64 => Long, long, i64, |v| v.to_le(), |w| i64::from_le(w);
    u32 => UnsignedInt, uint, u32, |v| v.to_le(), |w| u32::from_le(w);
    u64 => UnsignedLong, ulong, u64, |v| v.to_le(), |w| u64::from_le(w);
    f32 => Float, float, u32, |v| v.to_bits().to_le(), |w| f32::from_bits(u32::from_le(w));
    f64 => Double, double, u64, |v| v.to_bits().to_le(), |w| f64::from_bits(u64::from_le(w));
}

#[cfg(test)]
mod layout_tests {
    use super::*;
    use static_assertions::assert_eq_size;

    // wire forms are the natural width of each element type
    assert_eq_size!(<bool as HaloValue>::Wire, u8);
    assert_eq_size!(<i32 as HaloValue>::Wire, i32);
    assert_eq_size!(<f32 as HaloValue>::Wire, u32);
    assert_eq_size!(<f64 as HaloValue>::Wire, u64);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::{Cart, PeriodicStorage, Range};

    fn ring_map() -> HaloMap {
        let cart = Cart::new(
            Range::new(&[0], &[4]).unwrap(),
            [true, false, false],
            PeriodicStorage::Unique,
        )
        .unwrap();
        let local = *cart.range();
        let ext = crate::decomp::extend_local_range(&cart, &local, 1);
        HaloMap::local_only(&cart, &local, &ext).unwrap()
    }

    #[test]
    fn wire_forms_preserve_values() {
        assert!(bool::from_wire(true.to_wire()));
        assert!(bool::from_wire(2));
        assert_eq!(f64::from_wire((-0.5f64).to_wire()), -0.5);
        assert!(f32::from_wire(f32::NAN.to_wire()).is_nan());
        assert_eq!(i64::from_wire(i64::MIN.to_wire()), i64::MIN);
    }

    #[test]
    fn one_checkout_per_type() {
        let map = ring_map();
        let mut set = ExchangerSet::default();
        let ex = set.acquire::<f64>(&map).unwrap();
        assert!(set.acquire::<f64>(&map).is_none());
        assert!(set.is_in_flight(DataType::Double));
        let other = set.acquire::<i32>(&map).unwrap();
        set.release(ex);
        set.release(other);
        assert!(!set.is_in_flight(DataType::Double));
        assert_eq!(set.allocated(), vec![DataType::Int, DataType::Double]);
        assert!(set.acquire::<f64>(&map).is_some());
    }

    #[test]
    fn local_copy_wraps_ring() {
        let map = ring_map();
        // extended [-1, 6): ghosts at points -1, 4 and 5
        let mut v = vec![0i32, 10, 11, 12, 13, 0, 0];
        HaloExchanger::<i32>::copy_local(&map, &mut v);
        assert_eq!(v, vec![13, 10, 11, 12, 13, 10, 11]);
    }
}
