//! Application state for the book cover server

use std::path::PathBuf;
use std::sync::Arc;

use bookcover_core::ComposeOptions;
use shopify_admin::{AdminApi, FileRegistrar};

use crate::registration::{RegistrationQueue, StatusRetention};

/// Settings resolved from the command line and environment
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Holds uploaded and composited PDFs, served under `/uploads`
    pub upload_dir: PathBuf,
    /// Holds `index.html` and any other static assets
    pub static_dir: PathBuf,
    pub compose: ComposeOptions,
    /// Variant whose price `/rate` updates
    pub variant_id: Option<u64>,
    pub delete_after_register: bool,
    pub max_upload_bytes: usize,
    /// How long finished registration statuses stay visible
    pub status_retention: StatusRetention,
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub admin: Arc<dyn AdminApi>,
    pub registrations: RegistrationQueue,
}

impl AppState {
    /// Build the state and start the registration worker
    pub fn new(config: ServerConfig, admin: Arc<dyn AdminApi>) -> Self {
        let registrar = FileRegistrar::new(admin.clone());
        let registrations = RegistrationQueue::start(
            registrar,
            config.delete_after_register,
            config.status_retention,
        );

        Self {
            config: Arc::new(config),
            admin,
            registrations,
        }
    }
}
