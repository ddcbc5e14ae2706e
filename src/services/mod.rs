pub mod backend;
pub mod checksum;
pub mod clock;
pub mod collection;
pub mod crypto;
pub mod file_service;
pub mod key_provider;
pub mod object_key;
pub mod object_store;
pub mod publisher;
pub mod sync;
