//! All concrete stage implementations. Every module exposes plain constructor functions with the
//! signatures expected by the [`registry`](crate::registry), so a registry can be assembled from
//! them without any load time side effects.

/// Subprocess source, filter and sink.
pub mod command;
/// Container volume export source.
pub mod docker;
/// Plain file source and sink.
pub mod file;
/// Gzip compression and decompression filters.
pub mod gzip;
/// OpenPGP encryption and decryption filters.
pub mod pgp;
/// Byte substitution filter.
pub mod rot13;
/// Object store source and sink.
pub mod s3;
/// Snappy compression and decompression filters.
pub mod snappy;
/// Standard stream source and sinks.
pub mod stdio;
/// Archive pack source and unpack sink.
pub mod tar;
