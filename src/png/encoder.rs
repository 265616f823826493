use std::io::Write;

use log::debug;

use crate::{Bitmap, PngError, PngResult, Unsupported, RGBA8};

use super::{
  write_chunk, ChunkType, Deflater, FilterStrategy, FilterType, IdatWriter, ImageHeader, RowFilter,
  MAX_CHUNK_LEN, PNG_SIGNATURE,
};

/// The encoder splits its compressed data into `IDAT` chunks of this size by
/// default.
pub const DEFAULT_IDAT_LEN: usize = 32 * 1024;

/// How hard the encoder's deflate compressor works.
///
/// This only affects the output size and the encoding speed. Every level
/// decodes the same.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CompressionLevel {
  /// Stored deflate blocks, no compression at all.
  NoCompression,
  /// Fastest compression.
  BestSpeed,
  /// A balance of speed and size.
  #[default]
  Default,
  /// Smallest output.
  BestCompression,
}
impl CompressionLevel {
  /// The zlib level (`0..=9`) used for deflate.
  #[inline]
  #[must_use]
  pub const fn deflate_level(self) -> u8 {
    match self {
      Self::NoCompression => 0,
      Self::BestSpeed => 1,
      Self::Default => 6,
      Self::BestCompression => 9,
    }
  }

  /// The filter strategy an encoder at this level starts with.
  ///
  /// Trying every filter costs about five times the filtering work, which
  /// isn't worth it when the compressor isn't trying hard either.
  #[inline]
  #[must_use]
  pub const fn default_filter_strategy(self) -> FilterStrategy {
    match self {
      Self::NoCompression | Self::BestSpeed => FilterStrategy::Fixed(FilterType::None),
      Self::Default | Self::BestCompression => FilterStrategy::Adaptive,
    }
  }
}

/// Encodes 8-bit RGBA images as PNG.
///
/// The output is the signature, `IHDR`, one or more `IDAT`, and `IEND`.
/// Nothing else is written.
///
/// ```
/// use rowpng::{png::{CompressionLevel, Encoder}, Bitmap, RGBA8};
/// let mut image = Bitmap::<RGBA8>::new(2, 2);
/// image.pixels[3] = RGBA8::new(255, 0, 0, 255);
/// let mut out = Vec::new();
/// Encoder::new(CompressionLevel::BestSpeed).encode(&mut out, &image).unwrap();
/// assert!(rowpng::png::is_png_header_correct(&out));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Encoder {
  level: CompressionLevel,
  filter_strategy: FilterStrategy,
  idat_len: usize,
}
impl Default for Encoder {
  #[inline]
  fn default() -> Self {
    Self::new(CompressionLevel::Default)
  }
}
impl Encoder {
  /// An encoder using the level's default filter strategy and
  /// [`DEFAULT_IDAT_LEN`] sized `IDAT` chunks.
  #[inline]
  #[must_use]
  pub const fn new(level: CompressionLevel) -> Self {
    Self { level, filter_strategy: level.default_filter_strategy(), idat_len: DEFAULT_IDAT_LEN }
  }

  /// Sets how each row's filter is picked.
  #[inline]
  #[must_use]
  pub const fn with_filter_strategy(self, filter_strategy: FilterStrategy) -> Self {
    Self { filter_strategy, ..self }
  }

  /// Sets the largest `IDAT` chunk to write.
  ///
  /// The value is clamped to `1..=0x7fff_ffff`.
  #[inline]
  #[must_use]
  pub fn with_idat_len(self, idat_len: usize) -> Self {
    Self { idat_len: idat_len.clamp(1, MAX_CHUNK_LEN as usize), ..self }
  }

  /// The compression level.
  #[inline]
  #[must_use]
  pub const fn level(&self) -> CompressionLevel {
    self.level
  }

  /// The filter strategy.
  #[inline]
  #[must_use]
  pub const fn filter_strategy(&self) -> FilterStrategy {
    self.filter_strategy
  }

  /// The largest `IDAT` chunk this encoder writes.
  #[inline]
  #[must_use]
  pub const fn idat_len(&self) -> usize {
    self.idat_len
  }

  /// Writes a bitmap as a PNG.
  ///
  /// ## Failure
  /// Same as [`encode_rgba8`](Self::encode_rgba8).
  pub fn encode<W: Write>(&self, writer: W, image: &Bitmap<RGBA8>) -> PngResult<()> {
    self.encode_rgba8(writer, image.width, image.height, image.as_bytes())
  }

  /// Writes rows of RGBA bytes, top row first, as a PNG.
  ///
  /// ## Failure
  /// * [`FormatError::NonPositiveDimension`](crate::FormatError::NonPositiveDimension)
  ///   if either dimension is 0.
  /// * [`Unsupported::DimensionOverflow`] if either dimension is above
  ///   `i32::MAX`.
  /// * [`PngError::ImageSizeMismatch`] unless `data` is exactly
  ///   `width * height * 4` bytes.
  /// * [`PngError::Io`] if the writer fails.
  pub fn encode_rgba8<W: Write>(
    &self, mut writer: W, width: u32, height: u32, data: &[u8],
  ) -> PngResult<()> {
    let header = ImageHeader::rgba8(width, height)?;
    let row_len = header.row_len()?;
    let expected = row_len.checked_mul(height as usize).ok_or(Unsupported::DimensionOverflow)?;
    if data.len() != expected {
      return Err(PngError::ImageSizeMismatch { expected, actual: data.len() });
    }
    debug!(
      "encoding {width}x{height} at {:?}, filters {:?}, IDAT chunks up to {} bytes",
      self.level, self.filter_strategy, self.idat_len
    );

    writer.write_all(&PNG_SIGNATURE)?;
    write_chunk(&mut writer, ChunkType::IHDR, &header.to_bytes())?;

    let mut deflater =
      Deflater::new(IdatWriter::new(&mut writer, self.idat_len), self.level.deflate_level());
    let mut row_filter = RowFilter::new(self.filter_strategy, row_len);
    let zero_row = vec![0_u8; row_len];
    let mut prev: &[u8] = &zero_row;
    for row in data.chunks_exact(row_len) {
      let (filter, filtered) = row_filter.apply(row, prev);
      deflater.write(&[filter as u8])?;
      deflater.write(filtered)?;
      prev = row;
    }
    let writer = deflater.finish()?;

    write_chunk(writer, ChunkType::IEND, &[])?;
    writer.flush()?;
    debug!("finished encoding {width}x{height}");
    Ok(())
  }
}
