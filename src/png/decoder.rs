use std::io::Read;

use log::{debug, trace, warn};

use crate::{Bitmap, FormatError, PngResult, Unsupported, RGBA8};

use super::{reconstruct_row, ChunkReader, ChunkType, IdatReader, ImageHeader, Inflater};

/// How far through the datastream's required chunks a decoder has gotten.
///
/// `IHDR`, then one or more `IDAT`, then `IEND`. The stage only ever moves
/// forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DecodeStage {
  /// Nothing but the signature has been read.
  Start,
  /// The `IHDR` chunk was parsed.
  SeenHeader,
  /// The image data has started.
  SeenData,
  /// The `IEND` chunk was read and checked.
  SeenEnd,
}

/// Decodes a PNG one row at a time.
///
/// ```no_run
/// # fn main() -> rowpng::PngResult<()> {
/// let file = std::io::BufReader::new(std::fs::File::open("in.png")?);
/// let mut decoder = rowpng::png::Decoder::new(file)?;
/// let (width, height) = decoder.bounds();
/// while let Some(row) = decoder.decode_row()? {
///   assert_eq!(row.len(), width as usize * 4);
/// }
/// decoder.close()?;
/// # let _ = height;
/// # Ok(())
/// # }
/// ```
///
/// The slice given out by [`decode_row`](Self::decode_row) is the decoder's
/// own buffer, and it's needed to unfilter the row after it. Copy out whatever
/// you want to keep before asking for the next row.
pub struct Decoder<R> {
  header: ImageHeader,
  inflater: Inflater<R>,
  /// Two scanlines, filter byte included. `rows[current]` gets the next row,
  /// and the other one is the row above it.
  rows: [Vec<u8>; 2],
  current: usize,
  y: u32,
  stage: DecodeStage,
}
impl<R> core::fmt::Debug for Decoder<R> {
  fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
    f.debug_struct("Decoder")
      .field("header", &self.header)
      .field("y", &self.y)
      .field("stage", &self.stage)
      .finish_non_exhaustive()
  }
}
impl<R: Read> Decoder<R> {
  /// Reads the start of a PNG, up to the beginning of the image data.
  ///
  /// Ancillary chunks before the first `IDAT` are skipped, though their CRCs
  /// are still checked.
  ///
  /// ## Failure
  /// * [`FormatError::NotPng`] for a bad signature.
  /// * [`FormatError::ChunkOutOfOrder`] unless the chunks go `IHDR`, then
  ///   `IDAT`.
  /// * Any error from [`ImageHeader::parse`].
  /// * [`PngError::UnexpectedEof`](crate::PngError::UnexpectedEof) if the
  ///   stream ends before the image data.
  pub fn new(reader: R) -> PngResult<Self> {
    let mut chunks = ChunkReader::new(reader);
    chunks.read_signature()?;
    let mut stage = DecodeStage::Start;
    let mut header = None;
    let idat_len = loop {
      let (length, chunk_ty) = chunks.read_chunk_header()?;
      match (chunk_ty, stage) {
        (ChunkType::IHDR, DecodeStage::Start) => {
          let ihdr = ImageHeader::parse(length, &mut chunks)?;
          debug!("IHDR: {}x{}", ihdr.width, ihdr.height);
          header = Some(ihdr);
          stage = DecodeStage::SeenHeader;
        }
        (ChunkType::IDAT, DecodeStage::SeenHeader) => break length,
        (ChunkType::IHDR | ChunkType::IDAT | ChunkType::IEND, _) => {
          return Err(FormatError::ChunkOutOfOrder.into())
        }
        _ => {
          let kind = if chunk_ty.is_critical() { "unknown critical" } else { "ancillary" };
          trace!("skipping {kind} {chunk_ty} chunk: {length} bytes");
          chunks.skip_chunk(length)?;
        }
      }
    };
    let header = header.ok_or(FormatError::ChunkOutOfOrder)?;
    let line_len = header.filterline_len()?;
    let rows = [zeroed_line(line_len)?, zeroed_line(line_len)?];
    let inflater = Inflater::new(IdatReader::new(chunks, idat_len)?);
    Ok(Self { header, inflater, rows, current: 0, y: 0, stage: DecodeStage::SeenData })
  }

  /// The parsed `IHDR` chunk.
  #[inline]
  #[must_use]
  pub fn header(&self) -> &ImageHeader {
    &self.header
  }

  /// `(width, height)` of the image.
  #[inline]
  #[must_use]
  pub fn bounds(&self) -> (u32, u32) {
    (self.header.width, self.header.height)
  }

  /// How many rows have been given out so far.
  #[inline]
  #[must_use]
  pub fn rows_decoded(&self) -> u32 {
    self.y
  }

  /// Where the decoder is in the datastream.
  #[inline]
  #[must_use]
  pub fn stage(&self) -> DecodeStage {
    self.stage
  }

  /// Decodes the next row, top to bottom.
  ///
  /// The row is `4 * width` bytes of RGBA. Once every row has been given out
  /// this returns `Ok(None)`, and then you should call
  /// [`close`](Self::close).
  ///
  /// ## Failure
  /// * [`FormatError::NotEnoughPixelData`] if the image data runs out.
  /// * [`FormatError::BadFilterType`] if the row's filter byte is invalid.
  /// * [`FormatError::Compression`] if the zlib data is corrupt.
  /// * [`FormatError::BadChecksum`] if an `IDAT` chunk's CRC is wrong. This is
  ///   reported instead of the errors above when the chunk they came from
  ///   has a bad CRC.
  pub fn decode_row(&mut self) -> PngResult<Option<&[u8]>> {
    if self.y >= self.header.height {
      return Ok(None);
    }
    let [a, b] = &mut self.rows;
    let (cur, prev) = if self.current == 0 { (a, b) } else { (b, a) };
    self.inflater.read_exact(cur)?;
    let filter = cur[0];
    if let Err(e) = reconstruct_row(filter, &mut cur[1..], &prev[1..]) {
      return Err(self.inflater.checksum_first(e));
    }
    self.current ^= 1;
    self.y += 1;
    Ok(Some(&self.rows[self.current ^ 1][1..]))
  }

  /// Checks the rest of the datastream after the image data.
  ///
  /// This finishes the zlib stream (checking its Adler-32), checks the CRC
  /// of the last `IDAT` chunk, then requires an empty `IEND` chunk with a
  /// correct CRC. Closing again after a success does nothing.
  ///
  /// Closing before every row has been read is allowed. The rows that are
  /// left still get decompressed so that the checks above can run, but they
  /// aren't unfiltered and are thrown away.
  ///
  /// ## Failure
  /// * [`FormatError::NotIend`] if the next chunk is something else.
  /// * [`FormatError::BadIendLength`] if the `IEND` chunk isn't empty.
  /// * [`PngError::UnexpectedEof`](crate::PngError::UnexpectedEof) if the
  ///   `IEND` chunk is missing.
  pub fn close(&mut self) -> PngResult<()> {
    if self.stage == DecodeStage::SeenEnd {
      return Ok(());
    }
    let unread_rows = self.header.height - self.y;
    let discarded = self.inflater.finish()?;
    if unread_rows > 0 {
      debug!("closed with {unread_rows} rows unread, discarded {discarded} bytes of row data");
    } else if discarded > 0 {
      warn!("discarded {discarded} bytes of decompressed data after the last row");
    }
    let idat = self.inflater.source_mut();
    idat.finish_segment()?;
    read_iend(idat.chunks_mut())?;
    self.stage = DecodeStage::SeenEnd;
    Ok(())
  }
}

fn read_iend<R: Read>(chunks: &mut ChunkReader<R>) -> PngResult<()> {
  let (length, chunk_ty) = chunks.read_chunk_header()?;
  if chunk_ty != ChunkType::IEND {
    return Err(FormatError::NotIend(chunk_ty).into());
  }
  if length != 0 {
    return Err(FormatError::BadIendLength(length).into());
  }
  chunks.verify_checksum()
}

fn zeroed_line(len: usize) -> PngResult<Vec<u8>> {
  let mut line = Vec::new();
  line.try_reserve_exact(len).map_err(|_| Unsupported::DimensionOverflow)?;
  line.resize(len, 0);
  Ok(line)
}

/// Decodes an entire PNG into a [`Bitmap`].
///
/// This is just a [`Decoder`] run over every row and then closed.
pub fn decode_bitmap<R: Read>(reader: R) -> PngResult<Bitmap<RGBA8>> {
  let mut decoder = Decoder::new(reader)?;
  let (width, height) = decoder.bounds();
  let mut pixels: Vec<RGBA8> = Vec::new();
  pixels
    .try_reserve_exact((width as usize).saturating_mul(height as usize))
    .map_err(|_| Unsupported::DimensionOverflow)?;
  while let Some(row) = decoder.decode_row()? {
    pixels.extend_from_slice(bytemuck::cast_slice(row));
  }
  decoder.close()?;
  Ok(Bitmap { width, height, pixels })
}
