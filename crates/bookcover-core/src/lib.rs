//! Book cover compositing
//!
//! This crate inserts PNG cover images as new first and last pages of an
//! existing PDF using lopdf.
//!
//! - `compose_covers`: in-memory compositing
//! - `compose_file`: compositing from and to the upload directory
//! - `decode_cover_payload`: PNG / base64 / data-URL cover payloads

pub mod compose;
pub mod error;
pub mod image;
pub mod payload;

pub use compose::{compose_covers, compose_file, result_file_name, ComposeOptions, PageSize};
pub use error::CoverError;
pub use image::embed_png;
pub use payload::decode_cover_payload;
