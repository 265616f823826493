use std::io::{Read, Write};

use log::trace;

use crate::{FormatError, PngError, PngResult, Unsupported};

use super::{write_chunk, ChunkReader, ChunkType, MAX_CHUNK_LEN};

/// Presents the data of one or more `IDAT` chunks as one continuous stream.
///
/// If the PNG data looks like
/// ```text
/// ... len0 IDAT xxx crc0 len1 IDAT yy crc1 len2 IEND crc2
/// ```
/// then this reader gives out `xxxyy`. It starts positioned just after the
/// first `IDAT` header. When a chunk runs out its CRC is checked and the next
/// chunk must be another `IDAT`.
pub(crate) struct IdatReader<R> {
  chunks: ChunkReader<R>,
  remaining: u32,
}
impl<R: Read> IdatReader<R> {
  /// `first_len` is the length of the `IDAT` chunk whose header was just read.
  pub(crate) fn new(chunks: ChunkReader<R>, first_len: u32) -> PngResult<Self> {
    check_idat_len(first_len)?;
    trace!("IDAT segment: {first_len} bytes");
    Ok(Self { chunks, remaining: first_len })
  }

  /// Reads some image data, at least 1 byte unless `buf` is empty.
  ///
  /// Running out of stream here means the image data was cut short, so that's
  /// reported as [`FormatError::NotEnoughPixelData`].
  pub(crate) fn read(&mut self, buf: &mut [u8]) -> PngResult<usize> {
    if buf.is_empty() {
      return Ok(0);
    }
    while self.remaining == 0 {
      self.chunks.verify_checksum().map_err(eof_is_short_data)?;
      let (length, chunk_ty) = self.chunks.read_chunk_header().map_err(eof_is_short_data)?;
      if chunk_ty != ChunkType::IDAT {
        return Err(FormatError::NotEnoughPixelData.into());
      }
      check_idat_len(length)?;
      trace!("IDAT segment: {length} bytes");
      self.remaining = length;
    }
    let want = buf.len().min(self.remaining as usize);
    let n = self.chunks.read_payload_some(&mut buf[..want]).map_err(eof_is_short_data)?;
    if n == 0 {
      return Err(FormatError::NotEnoughPixelData.into());
    }
    self.remaining -= n as u32;
    Ok(n)
  }

  /// Consumes whatever is left of the current `IDAT` chunk and checks its CRC.
  pub(crate) fn finish_segment(&mut self) -> PngResult<()> {
    if self.remaining > 0 {
      trace!("IDAT segment: {} unread bytes after the zlib stream", self.remaining);
      self.chunks.discard(self.remaining as usize)?;
      self.remaining = 0;
    }
    self.chunks.verify_checksum()
  }

  pub(crate) fn chunks_mut(&mut self) -> &mut ChunkReader<R> {
    &mut self.chunks
  }
}

fn check_idat_len(length: u32) -> PngResult<()> {
  if length > MAX_CHUNK_LEN {
    Err(Unsupported::IdatLengthOverflow(length).into())
  } else {
    Ok(())
  }
}

fn eof_is_short_data(e: PngError) -> PngError {
  match e {
    PngError::UnexpectedEof => FormatError::NotEnoughPixelData.into(),
    other => other,
  }
}

/// Cuts a stream of compressed bytes into `IDAT` chunks of at most `max_len`
/// bytes each.
pub(crate) struct IdatWriter<W> {
  writer: W,
  buf: Vec<u8>,
  max_len: usize,
  chunks_written: usize,
}
impl<W: Write> IdatWriter<W> {
  pub(crate) fn new(writer: W, max_len: usize) -> Self {
    let max_len = max_len.clamp(1, MAX_CHUNK_LEN as usize);
    let buf = Vec::with_capacity(max_len.min(super::DEFAULT_IDAT_LEN));
    Self { writer, buf, max_len, chunks_written: 0 }
  }

  pub(crate) fn write(&mut self, mut data: &[u8]) -> PngResult<()> {
    while !data.is_empty() {
      let room = self.max_len - self.buf.len();
      let (now, later) = data.split_at(room.min(data.len()));
      self.buf.extend_from_slice(now);
      data = later;
      if self.buf.len() == self.max_len {
        self.emit()?;
      }
    }
    Ok(())
  }

  /// Writes out any buffered bytes as a final chunk and gives back the writer.
  pub(crate) fn finish(mut self) -> PngResult<W> {
    if !self.buf.is_empty() || self.chunks_written == 0 {
      self.emit()?;
    }
    Ok(self.writer)
  }

  fn emit(&mut self) -> PngResult<()> {
    write_chunk(&mut self.writer, ChunkType::IDAT, &self.buf)?;
    trace!("wrote IDAT chunk {}: {} bytes", self.chunks_written, self.buf.len());
    self.chunks_written += 1;
    self.buf.clear();
    Ok(())
  }
}

#[cfg(test)]
fn idat_stream(payloads: &[&[u8]], tail: ChunkType) -> Vec<u8> {
  let mut out = Vec::new();
  for p in payloads {
    write_chunk(&mut out, ChunkType::IDAT, p).unwrap();
  }
  write_chunk(&mut out, tail, &[]).unwrap();
  out
}

#[cfg(test)]
fn open_idat_reader(bytes: &[u8]) -> IdatReader<&[u8]> {
  let mut chunks = ChunkReader::new(bytes);
  let (len, ty) = chunks.read_chunk_header().unwrap();
  assert_eq!(ty, ChunkType::IDAT);
  IdatReader::new(chunks, len).unwrap()
}

#[test]
fn test_idat_reader_crosses_chunks() {
  let bytes = idat_stream(&[b"hello ", b"", b"wor", b"ld"], ChunkType::IEND);
  let mut r = open_idat_reader(&bytes);
  let mut out = Vec::new();
  let mut buf = [0_u8; 4];
  while out.len() < 11 {
    let n = r.read(&mut buf).unwrap();
    out.extend_from_slice(&buf[..n]);
  }
  assert_eq!(out, b"hello world");
  // the stream is at the end of the last IDAT, so asking for more hits IEND
  assert!(matches!(
    r.read(&mut buf),
    Err(PngError::Format(FormatError::NotEnoughPixelData))
  ));
}

#[test]
fn test_idat_reader_checks_crc_between_chunks() {
  let mut bytes = idat_stream(&[b"abc", b"def"], ChunkType::IEND);
  // corrupt the data of the first IDAT
  bytes[8] ^= 0x10;
  let mut r = open_idat_reader(&bytes);
  let mut buf = [0_u8; 8];
  assert_eq!(r.read(&mut buf).unwrap(), 3);
  assert!(matches!(r.read(&mut buf), Err(PngError::Format(FormatError::BadChecksum { .. }))));
}

#[test]
fn test_idat_reader_truncated() {
  let bytes = idat_stream(&[b"abcdef"], ChunkType::IEND);
  let mut r = open_idat_reader(&bytes[..10]);
  let mut buf = [0_u8; 8];
  assert_eq!(r.read(&mut buf).unwrap(), 2);
  assert!(matches!(
    r.read(&mut buf),
    Err(PngError::Format(FormatError::NotEnoughPixelData))
  ));
}

#[test]
fn test_idat_reader_finish_segment_drains() {
  let bytes = idat_stream(&[b"abcdef"], ChunkType::IEND);
  let mut r = open_idat_reader(&bytes);
  let mut buf = [0_u8; 2];
  r.read(&mut buf).unwrap();
  r.finish_segment().unwrap();
  let (len, ty) = r.chunks_mut().read_chunk_header().unwrap();
  assert_eq!((len, ty), (0, ChunkType::IEND));
}

#[test]
fn test_idat_writer_segments() {
  let data: Vec<u8> = (0..25_u8).collect();
  let mut out = Vec::new();
  let mut w = IdatWriter::new(&mut out, 10);
  w.write(&data[..3]).unwrap();
  w.write(&data[3..]).unwrap();
  w.finish().unwrap();
  write_chunk(&mut out, ChunkType::IEND, &[]).unwrap();

  let mut chunks = ChunkReader::new(out.as_slice());
  let mut lens = Vec::new();
  let mut joined = Vec::new();
  loop {
    let (len, ty) = chunks.read_chunk_header().unwrap();
    if ty == ChunkType::IEND {
      break;
    }
    let mut payload = vec![0; len as usize];
    chunks.read_payload(&mut payload).unwrap();
    chunks.verify_checksum().unwrap();
    lens.push(len);
    joined.extend_from_slice(&payload);
  }
  assert_eq!(lens, [10, 10, 5]);
  assert_eq!(joined, data);
}
