//! Source image decoding for the original preview

use crate::{
    error::{Result, StudioError},
    types::PreviewInfo,
};
use image::{GenericImageView, ImageReader};
use std::{io::Cursor, sync::Arc};

/// Decode an encoded image and describe it
///
/// The container format is guessed from the content, not from the declared
/// media type, since the declaration is only a hint from the input source.
pub fn decode_preview(bytes: &[u8]) -> Result<PreviewInfo> {
    let reader = ImageReader::new(Cursor::new(bytes)).with_guessed_format()?;
    let format = reader.format();
    let image = reader.decode()?;
    let (width, height) = image.dimensions();

    if width == 0 || height == 0 {
        return Err(StudioError::processing(format!(
            "decoded image has empty dimensions {}x{}",
            width, height
        )));
    }

    Ok(PreviewInfo {
        width,
        height,
        format,
    })
}

/// Decode on the blocking pool so the event loop is never stalled
pub async fn decode_preview_async(bytes: Arc<[u8]>) -> Result<PreviewInfo> {
    tokio::task::spawn_blocking(move || decode_preview(&bytes))
        .await
        .map_err(|e| StudioError::internal(format!("preview decode task failed: {}", e)))?
}
