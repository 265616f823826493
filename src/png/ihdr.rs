use std::io::Read;

use crate::{FormatError, PngResult, Unsupported};

use super::ChunkReader;

/// Image Header
///
/// This is the data of the `IHDR` chunk, which must be the first chunk. Once
/// parsed it is known to describe a supported image: both dimensions fit in a
/// positive `i32`, and the format is 8-bit RGBA, not interlaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ImageHeader {
  /// width in pixels
  pub width: u32,
  /// height in pixels
  pub height: u32,
  /// bits per channel
  pub bit_depth: u8,
  /// pixel color type
  pub color_type: u8,
  /// always 0 (deflate)
  pub compression_method: u8,
  /// always 0 (adaptive filtering)
  pub filter_method: u8,
  /// always 0 (no interlacing)
  pub interlace_method: u8,
}
impl ImageHeader {
  /// Size of the `IHDR` chunk data.
  pub const LEN: u32 = 13;

  /// Color type code for RGB with an alpha channel.
  pub const COLOR_TYPE_RGBA: u8 = 6;

  /// The only supported bit depth.
  pub const BIT_DEPTH: u8 = 8;

  /// Each pixel is 4 bytes.
  pub const BYTES_PER_PIXEL: usize = 4;

  /// The header for an 8-bit RGBA image of the given size.
  ///
  /// ## Failure
  /// * [`FormatError::NonPositiveDimension`] when either dimension is 0.
  /// * [`Unsupported::DimensionOverflow`] when either dimension doesn't fit
  ///   in an `i32`, or the image is too large to address.
  pub fn rgba8(width: u32, height: u32) -> PngResult<Self> {
    let header = Self {
      width,
      height,
      bit_depth: Self::BIT_DEPTH,
      color_type: Self::COLOR_TYPE_RGBA,
      compression_method: 0,
      filter_method: 0,
      interlace_method: 0,
    };
    if width == 0 || height == 0 {
      return Err(FormatError::NonPositiveDimension.into());
    }
    if i32::try_from(width).is_err() || i32::try_from(height).is_err() {
      return Err(Unsupported::DimensionOverflow.into());
    }
    check_dimension_overflow(width as i32, height as i32)?;
    header.filterline_len()?;
    Ok(header)
  }

  /// Parses the `IHDR` data, given the chunk length just read from `chunks`.
  ///
  /// The chunk's CRC is checked as well, so after this returns the reader is
  /// positioned at the next chunk.
  pub fn parse<R: Read>(length: u32, chunks: &mut ChunkReader<R>) -> PngResult<Self> {
    if length != Self::LEN {
      return Err(FormatError::BadIhdrLength(length).into());
    }
    let mut data = [0_u8; Self::LEN as usize];
    chunks.read_payload(&mut data)?;
    let [
      w0, w1, w2, w3, h0, h1, h2, h3,
      bit_depth, color_type, compression_method, filter_method, interlace_method,
    ] = data;
    if compression_method != 0 {
      return Err(Unsupported::CompressionMethod(compression_method).into());
    }
    if filter_method != 0 {
      return Err(Unsupported::FilterMethod(filter_method).into());
    }
    let w = i32::from_be_bytes([w0, w1, w2, w3]);
    let h = i32::from_be_bytes([h0, h1, h2, h3]);
    if w <= 0 || h <= 0 {
      return Err(FormatError::NonPositiveDimension.into());
    }
    check_dimension_overflow(w, h)?;
    if (bit_depth, color_type) != (Self::BIT_DEPTH, Self::COLOR_TYPE_RGBA) {
      return Err(Unsupported::PixelFormat { bit_depth, color_type }.into());
    }
    if interlace_method != 0 {
      return Err(Unsupported::Interlace(interlace_method).into());
    }
    chunks.verify_checksum()?;
    Ok(Self {
      width: w as u32,
      height: h as u32,
      bit_depth,
      color_type,
      compression_method,
      filter_method,
      interlace_method,
    })
  }

  /// The 13 bytes of `IHDR` chunk data for this header.
  #[must_use]
  pub fn to_bytes(&self) -> [u8; 13] {
    let [w0, w1, w2, w3] = self.width.to_be_bytes();
    let [h0, h1, h2, h3] = self.height.to_be_bytes();
    [
      w0,
      w1,
      w2,
      w3,
      h0,
      h1,
      h2,
      h3,
      self.bit_depth,
      self.color_type,
      self.compression_method,
      self.filter_method,
      self.interlace_method,
    ]
  }

  /// Bytes of pixel data in one row.
  pub fn row_len(&self) -> PngResult<usize> {
    (self.width as usize)
      .checked_mul(Self::BYTES_PER_PIXEL)
      .ok_or_else(|| Unsupported::DimensionOverflow.into())
  }

  /// Bytes in one row of decompressed data: the filter byte, then the pixels.
  pub fn filterline_len(&self) -> PngResult<usize> {
    self.row_len()?.checked_add(1).ok_or_else(|| Unsupported::DimensionOverflow.into())
  }
}

/// The pixel count must be addressable even at 8 bytes per pixel (16-bit
/// RGBA), which is the widest any PNG gets.
fn check_dimension_overflow(w: i32, h: i32) -> PngResult<()> {
  let pixels = i64::from(w) * i64::from(h);
  match isize::try_from(pixels).ok().and_then(|p| p.checked_mul(8)) {
    Some(_) => Ok(()),
    None => Err(Unsupported::DimensionOverflow.into()),
  }
}

#[cfg(test)]
fn ihdr_chunk_bytes(data: &[u8]) -> Vec<u8> {
  let mut out = Vec::new();
  super::write_chunk(&mut out, super::ChunkType::IHDR, data).unwrap();
  out
}

#[cfg(test)]
fn parse_ihdr_bytes(data: &[u8]) -> PngResult<ImageHeader> {
  let bytes = ihdr_chunk_bytes(data);
  let mut r = ChunkReader::new(bytes.as_slice());
  let (len, _) = r.read_chunk_header()?;
  ImageHeader::parse(len, &mut r)
}

#[test]
fn test_header_round_trip() {
  let header = ImageHeader::rgba8(640, 480).unwrap();
  let parsed = parse_ihdr_bytes(&header.to_bytes()).unwrap();
  assert_eq!(parsed, header);
  assert_eq!(parsed.row_len().unwrap(), 640 * 4);
  assert_eq!(parsed.filterline_len().unwrap(), 640 * 4 + 1);
}

#[test]
fn test_header_validation_order() {
  use crate::PngError;
  let good = ImageHeader::rgba8(3, 5).unwrap().to_bytes();

  // compression is checked before the dimensions
  let mut data = good;
  data[10] = 1;
  data[0..4].copy_from_slice(&0_u32.to_be_bytes());
  assert!(matches!(
    parse_ihdr_bytes(&data),
    Err(PngError::Unsupported(Unsupported::CompressionMethod(1)))
  ));

  let mut data = good;
  data[11] = 2;
  assert!(matches!(
    parse_ihdr_bytes(&data),
    Err(PngError::Unsupported(Unsupported::FilterMethod(2)))
  ));

  // a negative i32 is not a positive dimension
  let mut data = good;
  data[4..8].copy_from_slice(&0x8000_0001_u32.to_be_bytes());
  assert!(matches!(
    parse_ihdr_bytes(&data),
    Err(PngError::Format(FormatError::NonPositiveDimension))
  ));

  // dimensions are checked before the pixel format
  let mut data = good;
  data[0..4].copy_from_slice(&0_u32.to_be_bytes());
  data[8] = 16;
  assert!(matches!(
    parse_ihdr_bytes(&data),
    Err(PngError::Format(FormatError::NonPositiveDimension))
  ));

  let mut data = good;
  data[8] = 16;
  assert!(matches!(
    parse_ihdr_bytes(&data),
    Err(PngError::Unsupported(Unsupported::PixelFormat { bit_depth: 16, color_type: 6 }))
  ));

  let mut data = good;
  data[9] = 3;
  assert!(matches!(
    parse_ihdr_bytes(&data),
    Err(PngError::Unsupported(Unsupported::PixelFormat { bit_depth: 8, color_type: 3 }))
  ));

  let mut data = good;
  data[12] = 1;
  assert!(matches!(
    parse_ihdr_bytes(&data),
    Err(PngError::Unsupported(Unsupported::Interlace(1)))
  ));
}

#[test]
fn test_header_bad_length() {
  use crate::PngError;
  let data = [0_u8; 12];
  assert!(matches!(
    parse_ihdr_bytes(&data),
    Err(PngError::Format(FormatError::BadIhdrLength(12)))
  ));
}

#[test]
#[cfg(target_pointer_width = "64")]
fn test_header_dimension_overflow() {
  use crate::PngError;
  let max = i32::MAX as u32;
  // wide and short is fine to describe
  assert!(ImageHeader::rgba8(max, 1).is_ok());
  // but the pixel count times 8 overflows
  assert!(matches!(
    ImageHeader::rgba8(max, max),
    Err(PngError::Unsupported(Unsupported::DimensionOverflow))
  ));
  let mut data = ImageHeader::rgba8(1, 1).unwrap().to_bytes();
  data[0..4].copy_from_slice(&max.to_be_bytes());
  data[4..8].copy_from_slice(&max.to_be_bytes());
  assert!(matches!(
    parse_ihdr_bytes(&data),
    Err(PngError::Unsupported(Unsupported::DimensionOverflow))
  ));
  assert!(matches!(
    ImageHeader::rgba8(max + 1, 1),
    Err(PngError::Unsupported(Unsupported::DimensionOverflow))
  ));
  assert!(matches!(
    ImageHeader::rgba8(0, 1),
    Err(PngError::Format(FormatError::NonPositiveDimension))
  ));
}
