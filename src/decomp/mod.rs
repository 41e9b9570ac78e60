//! Decomposition layer: ghost extension, neighbor discovery and neighbor metadata.

pub mod decomp_info;
pub mod extend;
pub mod neighbors;

pub use decomp_info::{
    DECOMP_INFO_TAG, DecompInfo, retrieve_decomp_info, retrieve_decomp_info_with_tag,
};
pub use extend::{
    cart_include_exterior_point, cart_point_to_cell, cartesian_decomp, cartesian_decomp_dims,
    extend_local_range, range_include_exterior_point, range_point_to_cell,
};
pub use neighbors::{DecompHash, create_decomp_hash, detect_neighbors};
