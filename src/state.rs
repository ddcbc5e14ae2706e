use crate::services::backend::disk::DiskBackend;
use crate::services::file_service::FileService;
use std::sync::Arc;

/// Shared state handed to every axum handler.
#[derive(Clone)]
pub struct AppState {
    pub disk: DiskBackend,
    pub files: Arc<FileService>,
}
