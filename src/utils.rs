mod method_id_hash;
pub use method_id_hash::method_id_hash;
