//! Blob Storage Module
//!
//! The filesystem collaborator the command layer calls back into to
//! persist and retrieve encrypted blob bytes by identifier. The
//! database holds the descriptors; this module holds the bytes.

pub mod blobs;

// Re-export commonly used types
pub use blobs::BlobStore;
