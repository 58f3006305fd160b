//! Symbol readers: one decode attempt on one prepared candidate

use crate::error::ReadError;
use crate::models::PixelBuffer;
use crate::utils::grayscale::luma_plane;

/// Reads at most one symbol from a buffer.
///
/// `Ok(None)` means no symbol was found; `Err` means one was found but could
/// not be parsed. The decode search treats both as a miss.
pub trait SymbolReader: Send + Sync {
    /// Attempt a read
    fn read(&self, buffer: &PixelBuffer) -> Result<Option<String>, ReadError>;
}

/// Reader backed by `rqrr` (grid detection plus Reed-Solomon decode)
#[derive(Debug, Clone, Copy, Default)]
pub struct RqrrReader;

impl SymbolReader for RqrrReader {
    fn read(&self, buffer: &PixelBuffer) -> Result<Option<String>, ReadError> {
        if buffer.is_empty() {
            return Ok(None);
        }
        let width = buffer.width();
        let plane = luma_plane(buffer);
        let mut prepared =
            rqrr::PreparedImage::prepare_from_greyscale(width, buffer.height(), |x, y| {
                plane[y * width + x]
            });

        let mut last_err = None;
        for grid in prepared.detect_grids() {
            match grid.decode() {
                Ok((_meta, content)) if !content.is_empty() => return Ok(Some(content)),
                Ok(_) => {}
                Err(err) => last_err = Some(format!("{:?}", err)),
            }
        }
        match last_err {
            Some(detail) => Err(ReadError::Parse(detail)),
            None => Ok(None),
        }
    }
}

impl<R: SymbolReader + ?Sized> SymbolReader for std::sync::Arc<R> {
    fn read(&self, buffer: &PixelBuffer) -> Result<Option<String>, ReadError> {
        (**self).read(buffer)
    }
}
