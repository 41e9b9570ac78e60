//! Communication primitives shared by the hash, decomposition and halo layers.

pub mod communicator;
pub mod exchange;
pub mod handshake;
pub mod request_set;
pub mod wire;

pub use communicator::{
    CommTag, Communicator, NoComm, ReduceOp, StagedCommTags, ThreadComm, Wait,
};
#[cfg(feature = "mpi-support")]
pub use communicator::MpiComm;
pub use exchange::exchange_bytes;
pub use handshake::dynamic_handshake;
pub use request_set::{Completion, RequestSet};
