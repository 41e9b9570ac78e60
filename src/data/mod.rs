//! Data module: fields, partitions and mask operations
#![warn(missing_docs)]

pub mod distributed_field;
pub mod field;
pub mod field_ops;
pub mod partition;
pub mod partition_pool;

pub use distributed_field::DistributedField;
pub use field::Field;
pub use field_ops::{
    EdgeType, MaskBc, count_distributed_mask, detect_edge, dilate_erode_mask, dilate_mask,
    erode_mask,
};
pub use partition::{Partition, PartitionConfig, create_subregions};
pub use partition_pool::PartitionPool;
