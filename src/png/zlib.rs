//! Streaming zlib on top of the `IDAT` adapters.
//!
//! Both directions use `miniz_oxide`'s stream API, which keeps its own window
//! and so never needs the whole compressed or decompressed data at once.

use std::io::{Read, Write};

use miniz_oxide::{
  deflate::{
    core::{create_comp_flags_from_zip_params, CompressorOxide},
    stream::deflate,
  },
  inflate::stream::{inflate, InflateState},
  DataFormat, MZError, MZFlush, MZStatus,
};

use crate::{FormatError, PngError, PngResult};

use super::{IdatReader, IdatWriter};

/// Compressed bytes are pulled from the `IDAT` chunks this many at a time.
const INFLATE_INPUT_LEN: usize = 8 * 1024;

/// Compressed bytes are pushed to the `IDAT` chunks this many at a time.
const DEFLATE_OUTPUT_LEN: usize = 16 * 1024;

/// zlib window size, as a power of two. Positive means "with zlib header".
const ZLIB_WINDOW_BITS: i32 = 15;

/// Decompresses the image data as one zlib stream.
pub(crate) struct Inflater<R> {
  source: IdatReader<R>,
  state: Box<InflateState>,
  input: Vec<u8>,
  pos: usize,
  end: usize,
  done: bool,
}
impl<R: Read> Inflater<R> {
  pub(crate) fn new(source: IdatReader<R>) -> Self {
    Self {
      source,
      state: InflateState::new_boxed(DataFormat::Zlib),
      input: vec![0; INFLATE_INPUT_LEN],
      pos: 0,
      end: 0,
      done: false,
    }
  }

  /// Fills all of `out` with decompressed bytes.
  ///
  /// If the zlib stream ends first that's
  /// [`FormatError::NotEnoughPixelData`].
  pub(crate) fn read_exact(&mut self, out: &mut [u8]) -> PngResult<()> {
    let mut filled = 0;
    while filled < out.len() {
      if self.done {
        return Err(self.checksum_first(FormatError::NotEnoughPixelData.into()));
      }
      filled += self.step(&mut out[filled..])?;
    }
    Ok(())
  }

  /// Runs the zlib stream to its end, which also checks the Adler-32.
  ///
  /// Any decompressed bytes not yet read are thrown away, and their count is
  /// returned.
  pub(crate) fn finish(&mut self) -> PngResult<usize> {
    let mut scratch = [0_u8; 512];
    let mut extra = 0_usize;
    while !self.done {
      extra += self.step(&mut scratch)?;
    }
    Ok(extra)
  }

  pub(crate) fn source_mut(&mut self) -> &mut IdatReader<R> {
    &mut self.source
  }

  /// Swaps a decoding error for the CRC error of the current `IDAT` chunk,
  /// if it has one.
  ///
  /// A damaged chunk usually trips up the decompressor before its CRC is
  /// reached, and the bad CRC is the more accurate report. The CRC of the
  /// chunk being read is never checked until its data runs out, so draining
  /// the rest of the chunk here checks it.
  pub(crate) fn checksum_first(&mut self, err: PngError) -> PngError {
    match self.source.finish_segment() {
      Err(crc_err @ PngError::Format(FormatError::BadChecksum { .. })) => crc_err,
      _ => err,
    }
  }

  /// One call into the decompressor.
  ///
  /// Input is only pulled from the `IDAT` chunks once the decompressor says
  /// it can't go on without more. It may be holding the final bytes of the
  /// stream internally, so reading ahead could run into the `IEND` chunk.
  fn step(&mut self, out: &mut [u8]) -> PngResult<usize> {
    let result = inflate(&mut self.state, &self.input[self.pos..self.end], out, MZFlush::None);
    self.pos += result.bytes_consumed;
    match result.status {
      Ok(MZStatus::Ok) => (),
      Ok(MZStatus::StreamEnd) => self.done = true,
      // only reported when called with no input at all
      Err(MZError::Buf) => self.refill()?,
      Ok(MZStatus::NeedDict) | Err(_) => {
        return Err(self.checksum_first(FormatError::Compression.into()))
      }
    }
    Ok(result.bytes_written)
  }

  fn refill(&mut self) -> PngResult<()> {
    self.input.copy_within(self.pos..self.end, 0);
    self.end -= self.pos;
    self.pos = 0;
    if self.end == self.input.len() {
      // a full buffer that still can't make progress
      return Err(self.checksum_first(FormatError::Compression.into()));
    }
    let n = self.source.read(&mut self.input[self.end..])?;
    self.end += n;
    Ok(())
  }
}

/// Compresses the filtered rows as one zlib stream into `IDAT` chunks.
pub(crate) struct Deflater<W> {
  sink: IdatWriter<W>,
  compressor: Box<CompressorOxide>,
  output: Vec<u8>,
}
impl<W: Write> Deflater<W> {
  /// `level` is a zlib compression level, `0..=9`.
  pub(crate) fn new(sink: IdatWriter<W>, level: u8) -> Self {
    let flags = create_comp_flags_from_zip_params(i32::from(level), ZLIB_WINDOW_BITS, 0);
    Self {
      sink,
      compressor: Box::new(CompressorOxide::new(flags)),
      output: vec![0; DEFLATE_OUTPUT_LEN],
    }
  }

  pub(crate) fn write(&mut self, mut input: &[u8]) -> PngResult<()> {
    while !input.is_empty() {
      let result = deflate(&mut self.compressor, input, &mut self.output, MZFlush::None);
      self.sink.write(&self.output[..result.bytes_written])?;
      input = &input[result.bytes_consumed..];
      match result.status {
        Ok(_) if result.bytes_consumed > 0 || result.bytes_written > 0 => (),
        Ok(_) => return Err(deflate_error(MZError::Buf)),
        Err(e) => return Err(deflate_error(e)),
      }
    }
    Ok(())
  }

  /// Ends the zlib stream, writes the last `IDAT` chunk, and gives back the
  /// writer.
  pub(crate) fn finish(mut self) -> PngResult<W> {
    loop {
      let result = deflate(&mut self.compressor, &[], &mut self.output, MZFlush::Finish);
      self.sink.write(&self.output[..result.bytes_written])?;
      match result.status {
        Ok(MZStatus::StreamEnd) => break,
        Ok(_) => (),
        Err(MZError::Buf) if result.bytes_written > 0 => (),
        Err(e) => return Err(deflate_error(e)),
      }
    }
    self.sink.finish()
  }
}

fn deflate_error(e: MZError) -> PngError {
  PngError::Io(std::io::Error::new(std::io::ErrorKind::Other, format!("deflate failed: {e:?}")))
}

#[cfg(test)]
fn idat_bytes(compressed: &[u8], split: usize) -> Vec<u8> {
  let mut out = Vec::new();
  for part in compressed.chunks(split) {
    super::write_chunk(&mut out, super::ChunkType::IDAT, part).unwrap();
  }
  super::write_chunk(&mut out, super::ChunkType::IEND, &[]).unwrap();
  out
}

#[cfg(test)]
fn inflater_over(bytes: &[u8]) -> Inflater<&[u8]> {
  let mut chunks = super::ChunkReader::new(bytes);
  let (len, _) = chunks.read_chunk_header().unwrap();
  Inflater::new(IdatReader::new(chunks, len).unwrap())
}

#[test]
fn test_inflater_across_tiny_chunks() {
  let data: Vec<u8> = (0..5000_u32).map(|i| (i % 251) as u8).collect();
  let compressed = miniz_oxide::deflate::compress_to_vec_zlib(&data, 6);
  let bytes = idat_bytes(&compressed, 7);
  let mut inflater = inflater_over(&bytes);
  let mut out = vec![0_u8; data.len()];
  for piece in out.chunks_mut(333) {
    inflater.read_exact(piece).unwrap();
  }
  assert_eq!(out, data);
  inflater.finish().unwrap();
  inflater.source_mut().finish_segment().unwrap();
}

#[test]
fn test_inflater_short_stream() {
  let compressed = miniz_oxide::deflate::compress_to_vec_zlib(b"only a little", 6);
  let bytes = idat_bytes(&compressed, 100);
  let mut inflater = inflater_over(&bytes);
  let mut out = [0_u8; 64];
  assert!(matches!(
    inflater.read_exact(&mut out),
    Err(PngError::Format(FormatError::NotEnoughPixelData))
  ));
}

#[test]
fn test_inflater_corrupt_stream() {
  // 0x78 0x01 is a valid zlib header, 0xff starts an invalid block type
  let bytes = idat_bytes(&[0x78, 0x01, 0xff, 0xff, 0xff, 0xff], 100);
  let mut inflater = inflater_over(&bytes);
  let mut out = [0_u8; 16];
  assert!(matches!(
    inflater.read_exact(&mut out),
    Err(PngError::Format(FormatError::Compression))
  ));
}

#[test]
fn test_inflater_damaged_chunk_reports_crc() {
  let data: Vec<u8> = (0..3000_u32).map(|i| (i % 97) as u8).collect();
  let compressed = miniz_oxide::deflate::compress_to_vec_zlib(&data, 6);
  let good = idat_bytes(&compressed, 100_000);
  let mut out = vec![0_u8; data.len()];
  // the zlib header byte, the middle of the deflate data, the Adler-32
  for byte in [8, 8 + compressed.len() / 2, 8 + compressed.len() - 1] {
    let mut bad = good.clone();
    bad[byte] ^= 0x01;
    let mut inflater = inflater_over(&bad);
    let err = match inflater.read_exact(&mut out) {
      Err(e) => e,
      Ok(()) => inflater.finish().unwrap_err(),
    };
    assert!(
      matches!(err, PngError::Format(FormatError::BadChecksum { chunk: super::ChunkType::IDAT, .. })),
      "byte {byte}: {err:?}"
    );
  }
}

#[test]
fn test_deflater_round_trip() {
  let data: Vec<u8> = (0..70_000_u32).map(|i| (i.wrapping_mul(i) % 253) as u8).collect();
  for level in [0, 1, 6, 9] {
    let mut out = Vec::new();
    let mut deflater = Deflater::new(IdatWriter::new(&mut out, 4096), level);
    for part in data.chunks(1000) {
      deflater.write(part).unwrap();
    }
    deflater.finish().unwrap();
    super::write_chunk(&mut out, super::ChunkType::IEND, &[]).unwrap();

    let mut inflater = inflater_over(&out);
    let mut back = vec![0_u8; data.len()];
    inflater.read_exact(&mut back).unwrap();
    assert_eq!(back, data, "level {level}");
    inflater.finish().unwrap();
  }
}
