//! Upload checks applied by the gateway before anything reaches the backend.

use image::RgbImage;
use std::path::Path;

/// Maximum accepted upload size in bytes.
pub const MAX_IMAGE_SIZE: usize = 50 * 1024 * 1024;

/// Room for multipart boundaries and form fields on top of the file itself.
pub const MULTIPART_OVERHEAD: usize = 1024 * 1024;

/// File extensions accepted by the gateway, compared case-insensitively.
pub const SUPPORTED_FORMATS: [&str; 6] = ["jpg", "jpeg", "png", "webp", "gif", "bmp"];

/// Lowercased extension of `filename`, if it has one.
pub fn extension(filename: &str) -> Option<String> {
    Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
}

/// Whether the extension of `filename` is one of `supported`.
pub fn is_supported_format(filename: &str, supported: &[&str]) -> bool {
    extension(filename).is_some_and(|ext| supported.contains(&ext.as_str()))
}

/// Decodes an upload into an RGB image, sniffing the format from the bytes.
///
/// The extension is only used to filter uploads; a `.jpg` that holds PNG data
/// still decodes, while one holding text does not.
pub fn decode_image(bytes: &[u8]) -> Result<RgbImage, image::ImageError> {
    Ok(image::load_from_memory(bytes)?.to_rgb8())
}
