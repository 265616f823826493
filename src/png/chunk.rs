use std::io::{ErrorKind, Read, Write};

use crate::{FormatError, PngError, PngResult};

use super::{Crc32, PNG_SIGNATURE};

/// Chunk lengths above this are not allowed in PNG.
pub const MAX_CHUNK_LEN: u32 = 0x7fff_ffff;

/// Ancillary chunks are skipped through a scratch buffer of this size, so
/// that a huge declared length never turns into a huge allocation.
const SKIP_SCRATCH_LEN: usize = 4096;

/// The four byte type tag of a chunk.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChunkType(pub [u8; 4]);
#[allow(missing_docs)]
impl ChunkType {
  pub const IHDR: Self = Self(*b"IHDR");
  pub const IDAT: Self = Self(*b"IDAT");
  pub const IEND: Self = Self(*b"IEND");

  /// Critical chunks have an uppercase first letter.
  #[inline]
  #[must_use]
  pub const fn is_critical(self) -> bool {
    self.0[0].is_ascii_uppercase()
  }
}
impl core::fmt::Debug for ChunkType {
  fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
    core::fmt::Debug::fmt(core::str::from_utf8(self.0.as_slice()).unwrap_or("?"), f)
  }
}
impl core::fmt::Display for ChunkType {
  fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
    f.write_str(core::str::from_utf8(self.0.as_slice()).unwrap_or("?"))
  }
}

/// Reads the `[length][type][data][crc]` framing of PNG chunks from a stream.
///
/// A CRC accumulator runs over the type and data of the chunk currently being
/// read, and gets checked by [`verify_checksum`](Self::verify_checksum).
/// All buffers are owned by the reader and sized for their one use.
pub struct ChunkReader<R> {
  reader: R,
  crc: Crc32,
  chunk_ty: ChunkType,
  prologue: [u8; 8],
  crc_claim: [u8; 4],
  skip_scratch: Vec<u8>,
}
impl<R> core::fmt::Debug for ChunkReader<R> {
  fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
    f.debug_struct("ChunkReader")
      .field("chunk_ty", &self.chunk_ty)
      .field("crc", &self.crc.value())
      .finish_non_exhaustive()
  }
}
impl<R: Read> ChunkReader<R> {
  /// Wraps a stream positioned at the start of the PNG datastream.
  #[inline]
  pub fn new(reader: R) -> Self {
    Self {
      reader,
      crc: Crc32::new(),
      chunk_ty: ChunkType([0; 4]),
      prologue: [0; 8],
      crc_claim: [0; 4],
      skip_scratch: vec![0; SKIP_SCRATCH_LEN],
    }
  }

  /// Gives back the stream.
  #[inline]
  pub fn into_inner(self) -> R {
    self.reader
  }

  /// The type of the chunk most recently started.
  #[inline]
  #[must_use]
  pub fn chunk_ty(&self) -> ChunkType {
    self.chunk_ty
  }

  /// Checks the 8 byte PNG signature.
  ///
  /// ## Failure
  /// * [`PngError::UnexpectedEof`] if the stream is shorter than 8 bytes.
  /// * [`FormatError::NotPng`] if the bytes are wrong.
  pub fn read_signature(&mut self) -> PngResult<()> {
    let mut signature = [0_u8; 8];
    self.reader.read_exact(&mut signature)?;
    if signature != PNG_SIGNATURE {
      return Err(FormatError::NotPng.into());
    }
    Ok(())
  }

  /// Reads a chunk's length and type, and restarts the CRC with the type.
  pub fn read_chunk_header(&mut self) -> PngResult<(u32, ChunkType)> {
    self.reader.read_exact(&mut self.prologue)?;
    let [l0, l1, l2, l3, t0, t1, t2, t3] = self.prologue;
    let length = u32::from_be_bytes([l0, l1, l2, l3]);
    let chunk_ty = ChunkType([t0, t1, t2, t3]);
    self.crc.reset();
    self.crc.update(&chunk_ty.0);
    self.chunk_ty = chunk_ty;
    Ok((length, chunk_ty))
  }

  /// Fills `buf` from the chunk's data, feeding the CRC.
  pub fn read_payload(&mut self, buf: &mut [u8]) -> PngResult<()> {
    self.reader.read_exact(buf)?;
    self.crc.update(buf);
    Ok(())
  }

  /// Reads at most `buf.len()` bytes of chunk data, feeding the CRC.
  ///
  /// Returns 0 only at the end of the stream.
  pub(crate) fn read_payload_some(&mut self, buf: &mut [u8]) -> PngResult<usize> {
    loop {
      match self.reader.read(buf) {
        Ok(n) => {
          self.crc.update(&buf[..n]);
          return Ok(n);
        }
        Err(e) if e.kind() == ErrorKind::Interrupted => continue,
        Err(e) => return Err(e.into()),
      }
    }
  }

  /// Reads and throws away `count` bytes of chunk data, feeding the CRC.
  pub(crate) fn discard(&mut self, count: usize) -> PngResult<()> {
    let mut left = count;
    while left > 0 {
      let n = left.min(self.skip_scratch.len());
      let scratch = &mut self.skip_scratch[..n];
      self.reader.read_exact(scratch)?;
      self.crc.update(scratch);
      left -= n;
    }
    Ok(())
  }

  /// Skips the data of a chunk that we don't care about, then checks its CRC.
  ///
  /// Call this right after [`read_chunk_header`](Self::read_chunk_header).
  pub fn skip_chunk(&mut self, length: u32) -> PngResult<()> {
    if length > MAX_CHUNK_LEN {
      return Err(FormatError::BadChunkLength(length).into());
    }
    self.discard(length as usize)?;
    self.verify_checksum()
  }

  /// Reads the 4 byte CRC after a chunk's data and compares it to the CRC of
  /// everything read since the chunk header.
  pub fn verify_checksum(&mut self) -> PngResult<()> {
    self.reader.read_exact(&mut self.crc_claim)?;
    let declared = u32::from_be_bytes(self.crc_claim);
    let computed = self.crc.value();
    if declared != computed {
      return Err(
        FormatError::BadChecksum { chunk: self.chunk_ty, declared, computed }.into(),
      );
    }
    Ok(())
  }
}

/// Writes one complete chunk: length, type, data, and CRC.
///
/// ## Failure
/// * [`PngError::ChunkTooLarge`] if `data` is over `0x7fff_ffff` bytes.
/// * Any error from the writer.
pub fn write_chunk<W: Write>(w: &mut W, chunk_ty: ChunkType, data: &[u8]) -> PngResult<()> {
  let length = chunk_len(data.len())?;
  let mut crc = Crc32::new();
  crc.update(&chunk_ty.0);
  crc.update(data);
  w.write_all(&length.to_be_bytes())?;
  w.write_all(&chunk_ty.0)?;
  w.write_all(data)?;
  w.write_all(&crc.value().to_be_bytes())?;
  Ok(())
}

fn chunk_len(data_len: usize) -> PngResult<u32> {
  match u32::try_from(data_len) {
    Ok(len) if len <= MAX_CHUNK_LEN => Ok(len),
    _ => Err(PngError::ChunkTooLarge(data_len)),
  }
}

#[test]
fn test_write_then_read_chunk() {
  let mut out = Vec::new();
  write_chunk(&mut out, ChunkType(*b"tEXt"), b"Comment\0hi").unwrap();
  write_chunk(&mut out, ChunkType::IEND, &[]).unwrap();
  // the IEND chunk every PNG ends with
  assert_eq!(&out[out.len() - 12..], &[0, 0, 0, 0, 73, 69, 78, 68, 0xAE, 0x42, 0x60, 0x82]);

  let mut r = ChunkReader::new(out.as_slice());
  let (len, ty) = r.read_chunk_header().unwrap();
  assert_eq!((len, ty), (10, ChunkType(*b"tEXt")));
  assert!(!ty.is_critical());
  r.skip_chunk(len).unwrap();
  let (len, ty) = r.read_chunk_header().unwrap();
  assert_eq!((len, ty), (0, ChunkType::IEND));
  assert!(ty.is_critical());
  r.verify_checksum().unwrap();
}

#[test]
fn test_chunk_len_limit() {
  assert_eq!(chunk_len(0).unwrap(), 0);
  assert_eq!(chunk_len(MAX_CHUNK_LEN as usize).unwrap(), MAX_CHUNK_LEN);
  let too_big = MAX_CHUNK_LEN as usize + 1;
  assert!(matches!(chunk_len(too_big), Err(PngError::ChunkTooLarge(n)) if n == too_big));
}

#[test]
fn test_reader_tracks_chunk_and_gives_back_stream() {
  let mut out = Vec::new();
  write_chunk(&mut out, ChunkType::IHDR, &[0; 13]).unwrap();
  out.extend_from_slice(b"rest");
  let mut r = ChunkReader::new(out.as_slice());
  assert_eq!(r.chunk_ty(), ChunkType([0; 4]));
  let (len, ty) = r.read_chunk_header().unwrap();
  assert_eq!(r.chunk_ty(), ty);
  assert_eq!(ty, ChunkType::IHDR);
  r.skip_chunk(len).unwrap();
  assert_eq!(r.chunk_ty(), ChunkType::IHDR);
  assert_eq!(r.into_inner(), b"rest");
}

#[test]
fn test_skip_chunk_larger_than_scratch() {
  let data: Vec<u8> = (0..10_000_u32).map(|i| (i * 7) as u8).collect();
  let mut out = Vec::new();
  write_chunk(&mut out, ChunkType(*b"zTXt"), &data).unwrap();
  let mut r = ChunkReader::new(out.as_slice());
  let (len, _) = r.read_chunk_header().unwrap();
  r.skip_chunk(len).unwrap();
}

#[test]
fn test_skip_chunk_rejects_huge_length() {
  let bytes = [0x80_u8, 0, 0, 0, b'a', b'b', b'c', b'd'];
  let mut r = ChunkReader::new(&bytes[..]);
  let (len, _) = r.read_chunk_header().unwrap();
  assert!(matches!(
    r.skip_chunk(len),
    Err(PngError::Format(FormatError::BadChunkLength(0x8000_0000)))
  ));
}

#[test]
fn test_verify_checksum_mismatch() {
  let mut out = Vec::new();
  write_chunk(&mut out, ChunkType(*b"gAMA"), &[0, 0, 177, 143]).unwrap();
  let last = out.len() - 1;
  out[last] ^= 1;
  let mut r = ChunkReader::new(out.as_slice());
  let (len, _) = r.read_chunk_header().unwrap();
  match r.skip_chunk(len) {
    Err(PngError::Format(FormatError::BadChecksum { chunk, declared, computed })) => {
      assert_eq!(chunk, ChunkType(*b"gAMA"));
      assert_eq!(declared ^ 1, computed);
    }
    other => panic!("expected a checksum error, got {other:?}"),
  }
}

#[test]
fn test_read_signature() {
  let mut r = ChunkReader::new(&PNG_SIGNATURE[..]);
  r.read_signature().unwrap();
  let mut r = ChunkReader::new(&b"GIF89a\0\0"[..]);
  assert!(matches!(r.read_signature(), Err(PngError::Format(FormatError::NotPng))));
  let mut r = ChunkReader::new(&PNG_SIGNATURE[..5]);
  assert!(matches!(r.read_signature(), Err(PngError::UnexpectedEof)));
}
