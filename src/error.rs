use core::fmt::{self, Display};

use crate::png::ChunkType;

/// Shorthand for results from this crate.
pub type PngResult<T> = Result<T, PngError>;

/// An error from the `rowpng` crate.
#[derive(Debug)]
pub enum PngError {
  /// The data is not a valid PNG datastream.
  Format(FormatError),

  /// The data is valid PNG, but uses something outside of the 8-bit RGBA
  /// non-interlaced profile.
  ///
  /// A general purpose decoder might still be able to handle the data.
  Unsupported(Unsupported),

  /// The stream ended in the middle of a required read.
  UnexpectedEof,

  /// The underlying stream failed.
  Io(std::io::Error),

  /// The pixel buffer given to the encoder doesn't match the dimensions.
  ImageSizeMismatch {
    /// bytes required by the dimensions
    expected: usize,
    /// bytes actually given
    actual: usize,
  },

  /// The encoder was asked to write a chunk with more than `0x7fff_ffff`
  /// bytes of data.
  ChunkTooLarge(usize),
}
impl PngError {
  /// If this error says the data was malformed.
  #[inline]
  #[must_use]
  pub const fn is_format(&self) -> bool {
    matches!(self, Self::Format(_))
  }

  /// If this error says the data needs a feature this crate lacks.
  #[inline]
  #[must_use]
  pub const fn is_unsupported(&self) -> bool {
    matches!(self, Self::Unsupported(_))
  }
}

/// Ways that a PNG datastream can be malformed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatError {
  /// The first 8 bytes are not the PNG signature.
  NotPng,
  /// A critical chunk appeared somewhere the format doesn't allow.
  ChunkOutOfOrder,
  /// A chunk declared a length above `0x7fff_ffff`.
  BadChunkLength(u32),
  /// The CRC stored after a chunk doesn't match the chunk's bytes.
  BadChecksum {
    /// the chunk that failed
    chunk: ChunkType,
    /// CRC stored in the stream
    declared: u32,
    /// CRC of the bytes actually read
    computed: u32,
  },
  /// The `IHDR` chunk is not exactly 13 bytes.
  BadIhdrLength(u32),
  /// Width or height is zero, or negative when read as `i32`.
  NonPositiveDimension,
  /// A scanline started with a filter byte outside of `0..=4`.
  BadFilterType(u8),
  /// The image data ran out before all rows were read.
  NotEnoughPixelData,
  /// The chunk after the image data is not `IEND`.
  NotIend(ChunkType),
  /// The `IEND` chunk has a payload.
  BadIendLength(u32),
  /// The zlib stream inside the `IDAT` chunks is corrupt.
  Compression,
}

/// Valid PNG features that this crate doesn't handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unsupported {
  /// Compression method other than 0 (deflate).
  CompressionMethod(u8),
  /// Filter method other than 0 (adaptive).
  FilterMethod(u8),
  /// The image dimensions overflow the platform's address arithmetic.
  DimensionOverflow,
  /// Any bit depth and color type other than 8-bit RGBA.
  PixelFormat {
    /// bits per channel
    bit_depth: u8,
    /// PNG color type code
    color_type: u8,
  },
  /// Interlaced images (method 1, Adam7) or an unknown interlace method.
  Interlace(u8),
  /// An `IDAT` chunk declared a length too large to handle.
  IdatLengthOverflow(u32),
}

impl Display for PngError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Format(e) => write!(f, "png: invalid format: {e}"),
      Self::Unsupported(u) => write!(f, "png: unsupported feature: {u}"),
      Self::UnexpectedEof => write!(f, "png: unexpected end of stream"),
      Self::Io(e) => write!(f, "png: io error: {e}"),
      Self::ImageSizeMismatch { expected, actual } => {
        write!(f, "png: image buffer is {actual} bytes, dimensions need {expected}")
      }
      Self::ChunkTooLarge(len) => write!(f, "png: {len} bytes is too much data for one chunk"),
    }
  }
}
impl Display for FormatError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::NotPng => write!(f, "not a PNG file"),
      Self::ChunkOutOfOrder => write!(f, "chunk out of order"),
      Self::BadChunkLength(len) => write!(f, "bad chunk length: {len}"),
      Self::BadChecksum { chunk, declared, computed } => {
        write!(f, "invalid checksum in {chunk}: declared {declared:08x}, computed {computed:08x}")
      }
      Self::BadIhdrLength(len) => write!(f, "bad IHDR length: {len}"),
      Self::NonPositiveDimension => write!(f, "non-positive dimension"),
      Self::BadFilterType(b) => write!(f, "bad filter type: {b}"),
      Self::NotEnoughPixelData => write!(f, "not enough pixel data"),
      Self::NotIend(ty) => write!(f, "not IEND: {ty}"),
      Self::BadIendLength(len) => write!(f, "bad IEND length: {len}"),
      Self::Compression => write!(f, "corrupt zlib data"),
    }
  }
}
impl Display for Unsupported {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::CompressionMethod(m) => write!(f, "compression method {m}"),
      Self::FilterMethod(m) => write!(f, "filter method {m}"),
      Self::DimensionOverflow => write!(f, "dimension overflow"),
      Self::PixelFormat { bit_depth, color_type } => {
        write!(f, "bit depth {bit_depth}, color type {color_type}")
      }
      Self::Interlace(m) => write!(f, "interlace method {m}"),
      Self::IdatLengthOverflow(len) => write!(f, "IDAT chunk length overflow: {len}"),
    }
  }
}

impl std::error::Error for PngError {
  fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
    match self {
      Self::Io(e) => Some(e),
      _ => None,
    }
  }
}

/// Enable using the `?` operator on io results.
impl From<std::io::Error> for PngError {
  #[inline]
  fn from(e: std::io::Error) -> Self {
    if e.kind() == std::io::ErrorKind::UnexpectedEof {
      Self::UnexpectedEof
    } else {
      Self::Io(e)
    }
  }
}
impl From<FormatError> for PngError {
  #[inline]
  fn from(e: FormatError) -> Self {
    Self::Format(e)
  }
}
impl From<Unsupported> for PngError {
  #[inline]
  fn from(u: Unsupported) -> Self {
    Self::Unsupported(u)
  }
}

#[test]
fn test_error_kinds() {
  let e = PngError::from(FormatError::ChunkOutOfOrder);
  assert!(e.is_format());
  assert!(!e.is_unsupported());
  assert_eq!(e.to_string(), "png: invalid format: chunk out of order");

  let u = PngError::from(Unsupported::PixelFormat { bit_depth: 16, color_type: 2 });
  assert!(u.is_unsupported());
  assert_eq!(u.to_string(), "png: unsupported feature: bit depth 16, color type 2");

  let eof = PngError::from(std::io::Error::from(std::io::ErrorKind::UnexpectedEof));
  assert!(matches!(eof, PngError::UnexpectedEof));
  let other = PngError::from(std::io::Error::from(std::io::ErrorKind::PermissionDenied));
  assert!(matches!(other, PngError::Io(_)));

  let big = PngError::ChunkTooLarge(1 << 31);
  assert!(!big.is_format());
  assert_eq!(big.to_string(), "png: 2147483648 bytes is too much data for one chunk");
}
