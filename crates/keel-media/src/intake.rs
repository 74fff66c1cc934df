//! Attachment intake: guard, compress, guard again.

use crate::compress::{CompressOptions, CompressedImage, compress_async};
use crate::error::MediaError;
use crate::guard::UploadGuard;
use keel_types::AttachmentPayload;

/// An attachment ready to be stored or sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedAttachment {
    pub payload: AttachmentPayload,
    /// Pixel dimensions, for images.
    pub dimensions: Option<(u32, u32)>,
    /// Decoded size of `payload`.
    pub byte_size: u64,
    /// Whether the image was downscaled.
    pub compressed: bool,
}

/// Run an incoming attachment through the upload pipeline.
///
/// The raw payload is checked against `guard` first; images are then
/// downscaled to `options` and the result is checked again. Non-image
/// payloads skip compression. A decode failure rejects the attachment.
///
/// When no re-encoding of an oversized image is smaller than the original,
/// the original is kept at its source dimensions. It already passed the
/// guard, so the upload ceiling still holds.
pub async fn prepare_attachment(
    payload: AttachmentPayload,
    guard: &UploadGuard,
    options: &CompressOptions,
) -> Result<PreparedAttachment, MediaError> {
    guard.check_payload(&payload)?;

    if !payload.is_image() {
        let byte_size = payload.decoded_len();
        return Ok(PreparedAttachment {
            payload,
            dimensions: None,
            byte_size,
            compressed: false,
        });
    }

    let original_size = payload.decoded_len();
    let result = compress_async(
        payload.data.clone(),
        payload.mime_type.clone(),
        *options,
    )
    .await;
    let (payload, dimensions, compressed) = settle(payload, result)?;

    let prepared = finish(payload, dimensions, compressed, guard)?;
    if prepared.compressed {
        tracing::info!(
            "Attachment compressed from {} to {} bytes",
            original_size,
            prepared.byte_size
        );
    }
    Ok(prepared)
}

/// Pick the payload to keep from a compression result.
fn settle(
    original: AttachmentPayload,
    result: Result<CompressedImage, MediaError>,
) -> Result<(AttachmentPayload, (u32, u32), bool), MediaError> {
    match result {
        Ok(image) => {
            let dimensions = (image.width, image.height);
            let resized = image.resized;
            Ok((image.into_payload(), dimensions, resized))
        }
        Err(MediaError::NotReduced {
            width,
            height,
            input_bytes,
            output_bytes,
        }) => {
            tracing::warn!(
                "Re-encoding {}x{} {} gave {} bytes (original {}), keeping the original",
                width,
                height,
                original.mime_type,
                output_bytes,
                input_bytes
            );
            Ok((original, (width, height), false))
        }
        Err(e) => Err(e),
    }
}

/// Check the final payload against `guard` and describe it.
fn finish(
    payload: AttachmentPayload,
    dimensions: (u32, u32),
    compressed: bool,
    guard: &UploadGuard,
) -> Result<PreparedAttachment, MediaError> {
    guard.check_payload(&payload)?;
    let byte_size = payload.decoded_len();
    Ok(PreparedAttachment {
        payload,
        dimensions: Some(dimensions),
        byte_size,
        compressed,
    })
}
