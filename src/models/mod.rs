//! Core data models of the storage engine.
//!
//! Descriptors are the metadata of one stored object version, change events
//! are what replication peers consume, and bucket descriptors describe the
//! top-level containers. All of them serialize as JSON via `serde`.

pub mod bucket;
pub mod descriptor;
pub mod event;

pub use bucket::BucketDescriptor;
pub use descriptor::{FileDescriptor, NewObjectInfo, Operation};
pub use event::{EventKind, FileInfo};
