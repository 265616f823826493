#![forbid(unsafe_code)]

//! Module for working with PNG data.
//!
//! * [Portable Network Graphics Specification (Second Edition)][png-spec]
//!
//! [png-spec]: https://www.w3.org/TR/2003/REC-PNG-20031110/
//!
//! ## Library Design Assumptions
//!
//! Only 8-bit RGBA, non-interlaced images are handled. Everything else is
//! reported as [`Unsupported`](crate::Unsupported) so that you can fall back
//! to a general purpose decoder if you want.
//!
//! Unlike most PNG libraries, the whole image is never held in memory. The
//! datastream is processed in the order it's stored:
//!
//! * **Header** - The `IHDR` chunk must come first. It gives the dimensions
//!   and pixel format.
//! * **Ancillary chunks** - Anything that isn't critical is skipped over. The
//!   CRC of each skipped chunk is still checked.
//! * **Image Data** - One or more `IDAT` chunks, one right after the other.
//!   All of the `IDAT` payloads together are a single zlib stream, and the
//!   decoder reads them as one stream, crossing chunk boundaries as needed.
//! * **End** - A zero-length `IEND` chunk.
//!
//! The decompressed data is a series of scanlines, each starting with a byte
//! saying which filter was used on that line. Unfiltering a line only needs
//! the line above it, so the decoder keeps exactly two lines around.
//!
//! ## Parsing Errors
//!
//! Unlike the PNG spec's suggestion to ignore what you can, this decoder
//! checks everything: the signature, the chunk ordering rules, every chunk's
//! CRC, and the zlib Adler-32. Any problem is an error and the session should
//! not be used further.

mod crc32;
pub use crc32::*;

mod chunk;
pub use chunk::*;

mod ihdr;
pub use ihdr::*;

mod filtering;
pub use filtering::*;

mod idat;
pub(crate) use idat::*;

mod zlib;
pub(crate) use zlib::*;

mod decoder;
pub use decoder::*;

mod encoder;
pub use encoder::*;

#[cfg(test)]
mod tests;

/// The first eight bytes of a PNG datastream should match these bytes.
pub const PNG_SIGNATURE: [u8; 8] = [137, 80, 78, 71, 13, 10, 26, 10];

/// Checks if the PNG's initial 8 bytes are correct.
///
/// * If this is the case, the rest of the bytes are very likely PNG data.
/// * If this is *not* the case, the rest of the bytes are very likely *not* PNG
///   data.
#[inline]
#[must_use]
pub const fn is_png_header_correct(bytes: &[u8]) -> bool {
  matches!(bytes, [137, 80, 78, 71, 13, 10, 26, 10, ..])
}
