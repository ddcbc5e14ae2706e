//! Label collections: one object per label holding the latest descriptor of
//! every live file carrying that label.

use crate::errors::StorageResult;
use crate::models::FileDescriptor;
use bytes::Bytes;

pub const COLLECTION_CONTENT_TYPE: &str = "application/x-collection+json";

/// Label attached to every collection object.
pub const COLLECTION_LABEL: &str = "filesCollection";

pub fn decode(content: &[u8]) -> StorageResult<Vec<FileDescriptor>> {
    if content.iter().all(u8::is_ascii_whitespace) {
        return Ok(Vec::new());
    }
    Ok(serde_json::from_slice(content)?)
}

pub fn encode(entries: &[FileDescriptor]) -> StorageResult<Bytes> {
    Ok(Bytes::from(serde_json::to_vec(entries)?))
}

/// Replace the entry for `file.name` in place, or append it.
pub fn upsert(entries: &mut Vec<FileDescriptor>, file: FileDescriptor) {
    match entries.iter_mut().find(|e| e.name == file.name) {
        Some(existing) => *existing = file,
        None => entries.push(file),
    }
}

/// Drop every entry for `name`. Returns whether anything was removed.
pub fn remove(entries: &mut Vec<FileDescriptor>, name: &str) -> bool {
    let before = entries.len();
    entries.retain(|e| e.name != name);
    entries.len() != before
}
