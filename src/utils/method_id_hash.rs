use xxhash_rust::const_xxh3::xxh3_64 as const_xxh3_64;

/// Hashes a method qualifier into a stable `u64` identifier.
///
/// Usable in `const` contexts, so identifiers for fixed qualifiers can be
/// computed at compile time with [`crate::method_id!`].
pub const fn method_id_hash(qualifier: &str) -> u64 {
    const_xxh3_64(qualifier.as_bytes())
}

/// Compile-time method ID generator using xxHash3.
///
/// ```rust
/// use svcgate::method_id;
///
/// let echo = method_id!("greeting/echo");
/// let tail = method_id!("greeting/tail");
/// assert_ne!(echo, tail);
/// assert_eq!(echo, svcgate::utils::method_id_hash("greeting/echo"));
/// ```
#[macro_export]
macro_rules! method_id {
    ($qualifier:literal) => {{
        const ID: u64 = $crate::utils::method_id_hash($qualifier);
        ID
    }};
}
