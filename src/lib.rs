//! Encrypted, versioned object store for health records.
//!
//! [`services::object_store::EncryptedObjectStore`] persists sealed payloads
//! with their metadata encoded into the storage key,
//! [`services::file_service::FileService`] layers file versioning, label
//! collections and change events on top, and
//! [`services::sync::SyncReconciler`] applies writes replicated from peers.

pub mod config;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;
