//! Upload ceiling and image compression for Keel attachments.
//!
//! Attachments flow through [`UploadGuard`], then [`compress`], then the
//! guard again; [`prepare_attachment`] runs that pipeline.

pub mod compress;
pub mod error;
pub mod guard;
pub mod intake;

pub use compress::{
    CompressOptions, CompressedImage, DEFAULT_MAX_DIMENSION, DEFAULT_QUALITY, compress,
    compress_async,
};
pub use error::MediaError;
pub use guard::{MAX_UPLOAD_BYTES, UploadGuard, is_allowed};
pub use intake::{PreparedAttachment, prepare_attachment};
