//! Shopify Admin API access
//!
//! - [`ShopifyClient`]: reqwest implementation of the [`AdminApi`] seam
//! - [`FileRegistrar`]: staged upload + `fileCreate` registration of local files
//! - variant price updates through the REST Admin API

pub mod client;
pub mod error;
pub mod files;
pub mod types;

pub use client::{AdminApi, ShopifyClient, ShopifyConfig};
pub use error::{AdminError, RegistrationError};
pub use files::FileRegistrar;
pub use types::{
    RegistrationStep, RemoteFileRecord, StagedUploadParameter, StagedUploadTarget, UserError,
};
