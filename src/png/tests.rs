use super::*;
use crate::{Bitmap, FormatError, PngError, PngResult, Unsupported, RGBA8};

/// RGBA bytes with enough structure that every filter type has something to
/// do, and enough noise that none of them is trivially best.
fn pattern_image(width: u32, height: u32) -> Vec<u8> {
  let mut state = 0x2545_f491_u32 ^ width.wrapping_mul(31) ^ height;
  let mut out = Vec::with_capacity(width as usize * height as usize * 4);
  for y in 0..height {
    for x in 0..width {
      state ^= state << 13;
      state ^= state >> 17;
      state ^= state << 5;
      let noise = (state & 0x0f) as u8;
      out.push((x * 3) as u8 ^ noise);
      out.push((y * 5) as u8);
      out.push((x + y) as u8 ^ (noise << 2));
      out.push(if (x + y) % 7 == 0 { 255 } else { 128 + noise });
    }
  }
  out
}

fn encode_with(encoder: Encoder, width: u32, height: u32, data: &[u8]) -> Vec<u8> {
  let mut out = Vec::new();
  encoder.encode_rgba8(&mut out, width, height, data).unwrap();
  out
}

/// Every row, joined, after a successful close.
fn decode_all(bytes: &[u8]) -> PngResult<Vec<u8>> {
  let mut decoder = Decoder::new(bytes)?;
  let mut out = Vec::new();
  while let Some(row) = decoder.decode_row()? {
    out.extend_from_slice(row);
  }
  decoder.close()?;
  Ok(out)
}

/// A datastream from the signature and the given chunks, in order.
fn assemble(chunks: &[(ChunkType, &[u8])]) -> Vec<u8> {
  let mut out = PNG_SIGNATURE.to_vec();
  for (chunk_ty, data) in chunks {
    write_chunk(&mut out, *chunk_ty, data).unwrap();
  }
  out
}

/// The chunk types and byte ranges (whole chunk) of a datastream.
fn chunk_spans(bytes: &[u8]) -> Vec<(ChunkType, core::ops::Range<usize>)> {
  let mut spans = Vec::new();
  let mut pos = 8;
  while pos + 8 <= bytes.len() {
    let len = u32::from_be_bytes(bytes[pos..pos + 4].try_into().unwrap()) as usize;
    let ty = ChunkType(bytes[pos + 4..pos + 8].try_into().unwrap());
    spans.push((ty, pos..pos + 12 + len));
    pos += 12 + len;
  }
  spans
}

/// Row data for a 2x4 image that uses all five filter types, and what it
/// reconstructs to.
const HAND_FILTERED: [u8; 36] = [
  1, 1, 2, 3, 4, 10, 10, 10, 10, // Sub
  2, 1, 1, 1, 1, 0, 0, 0, 0, // Up
  3, 0, 0, 0, 0, 0, 0, 0, 0, // Average
  4, 0, 0, 0, 0, 0, 0, 0, 0, // Paeth
];
const HAND_EXPECTED: [u8; 32] = [
  1, 2, 3, 4, 11, 12, 13, 14, //
  2, 3, 4, 5, 11, 12, 13, 14, //
  1, 1, 2, 2, 6, 6, 7, 8, //
  1, 1, 2, 2, 6, 6, 7, 8, //
];

fn hand_built(filtered: &[u8], width: u32, height: u32) -> Vec<u8> {
  let ihdr = ImageHeader::rgba8(width, height).unwrap().to_bytes();
  let zlib = miniz_oxide::deflate::compress_to_vec_zlib(filtered, 6);
  assemble(&[(ChunkType::IHDR, &ihdr), (ChunkType::IDAT, &zlib), (ChunkType::IEND, &[])])
}

#[test]
fn test_round_trip_every_level() {
  for level in [
    CompressionLevel::NoCompression,
    CompressionLevel::BestSpeed,
    CompressionLevel::Default,
    CompressionLevel::BestCompression,
  ] {
    for (w, h) in [(1, 1), (3, 2), (17, 9), (64, 33)] {
      let data = pattern_image(w, h);
      let png = encode_with(Encoder::new(level), w, h, &data);
      assert_eq!(decode_all(&png).unwrap(), data, "level: {level:?}, {w}x{h}");
    }
  }
}

#[test]
fn test_round_trip_every_filter() {
  let (w, h) = (13, 7);
  let data = pattern_image(w, h);
  for ty in FilterType::ALL {
    let encoder = Encoder::default().with_filter_strategy(FilterStrategy::Fixed(ty));
    let png = encode_with(encoder, w, h, &data);
    assert_eq!(decode_all(&png).unwrap(), data, "filter: {ty:?}");
  }
}

#[test]
fn test_default_filter_strategy() {
  assert_eq!(
    Encoder::new(CompressionLevel::BestSpeed).filter_strategy(),
    FilterStrategy::Fixed(FilterType::None)
  );
  assert_eq!(Encoder::default().filter_strategy(), FilterStrategy::Adaptive);
  assert_eq!(Encoder::default().level(), CompressionLevel::Default);
  assert_eq!(Encoder::default().idat_len(), DEFAULT_IDAT_LEN);
  assert_eq!(Encoder::default().with_idat_len(0).idat_len(), 1);
}

#[test]
fn test_encoder_output_layout() {
  let data = pattern_image(40, 40);
  let png = encode_with(Encoder::default().with_idat_len(100), 40, 40, &data);
  assert!(is_png_header_correct(&png));
  let spans = chunk_spans(&png);
  let types: Vec<ChunkType> = spans.iter().map(|(ty, _)| *ty).collect();
  assert_eq!(types.first(), Some(&ChunkType::IHDR));
  assert_eq!(types.last(), Some(&ChunkType::IEND));
  let idats = &types[1..types.len() - 1];
  assert!(idats.len() > 1);
  assert!(idats.iter().all(|ty| *ty == ChunkType::IDAT));
  for (ty, range) in &spans {
    if *ty == ChunkType::IDAT {
      assert!(range.len() - 12 <= 100);
    }
  }
  let (_, iend) = &spans[spans.len() - 1];
  assert_eq!(iend.end, png.len());
  assert_eq!(decode_all(&png).unwrap(), data);
}

#[test]
fn test_wide_and_tall_images() {
  // A row just under the overflow limit needs gigabytes, so this one is only
  // very wide. The limit itself is checked against the header alone.
  for (w, h) in [(1 << 20, 1), (1, 3000)] {
    let data = pattern_image(w, h);
    let png = encode_with(Encoder::new(CompressionLevel::BestSpeed), w, h, &data);
    assert_eq!(decode_all(&png).unwrap(), data, "{w}x{h}");
  }
}

#[test]
fn test_encoder_rejects_bad_input() {
  let mut out = Vec::new();
  assert!(matches!(
    Encoder::default().encode_rgba8(&mut out, 0, 5, &[]),
    Err(PngError::Format(FormatError::NonPositiveDimension))
  ));
  assert!(matches!(
    Encoder::default().encode_rgba8(&mut out, 5, 0, &[]),
    Err(PngError::Format(FormatError::NonPositiveDimension))
  ));
  assert!(matches!(
    Encoder::default().encode_rgba8(&mut out, 2, 2, &[0; 15]),
    Err(PngError::ImageSizeMismatch { expected: 16, actual: 15 })
  ));
  assert!(matches!(
    Encoder::default().encode_rgba8(&mut out, u32::MAX, 1, &[]),
    Err(PngError::Unsupported(Unsupported::DimensionOverflow))
  ));
  // nothing is written for bad input
  assert!(out.is_empty());
}

#[test]
fn test_hand_filtered_rows() {
  let png = hand_built(&HAND_FILTERED, 2, 4);
  assert_eq!(decode_all(&png).unwrap(), HAND_EXPECTED);
}

#[test]
fn test_row_aliasing() {
  let (w, h) = (9, 6);
  let data = pattern_image(w, h);
  let png = encode_with(Encoder::default(), w, h, &data);
  let row_len = w as usize * 4;
  let mut decoder = Decoder::new(png.as_slice()).unwrap();
  assert_eq!(decoder.bounds(), (w, h));
  assert_eq!(decoder.stage(), DecodeStage::SeenData);
  let mut copies = Vec::new();
  for y in 0..h {
    assert_eq!(decoder.rows_decoded(), y);
    let row = decoder.decode_row().unwrap().unwrap();
    assert_eq!(row.len(), row_len);
    copies.push(row.to_vec());
  }
  assert!(decoder.decode_row().unwrap().is_none());
  assert!(decoder.decode_row().unwrap().is_none());
  assert_eq!(decoder.rows_decoded(), h);
  for (y, copy) in copies.iter().enumerate() {
    assert_eq!(copy.as_slice(), &data[y * row_len..(y + 1) * row_len], "row {y}");
  }
  decoder.close().unwrap();
}

#[test]
fn test_double_close() {
  let png = hand_built(&HAND_FILTERED, 2, 4);
  let mut decoder = Decoder::new(png.as_slice()).unwrap();
  while decoder.decode_row().unwrap().is_some() {}
  decoder.close().unwrap();
  assert_eq!(decoder.stage(), DecodeStage::SeenEnd);
  decoder.close().unwrap();
}

#[test]
fn test_close_before_last_row() {
  let png = hand_built(&HAND_FILTERED, 2, 4);
  let mut decoder = Decoder::new(png.as_slice()).unwrap();
  assert_eq!(decoder.decode_row().unwrap().unwrap(), &HAND_EXPECTED[..8]);
  decoder.close().unwrap();
  assert_eq!(decoder.stage(), DecodeStage::SeenEnd);
  assert_eq!(decoder.rows_decoded(), 1);

  // the rest of the datastream is still checked
  let mut bad = png;
  let (_, idat) = chunk_spans(&bad)[1].clone();
  bad[idat.end - 1] ^= 0x01;
  let mut decoder = Decoder::new(bad.as_slice()).unwrap();
  decoder.decode_row().unwrap();
  assert!(matches!(
    decoder.close(),
    Err(PngError::Format(FormatError::BadChecksum { chunk: ChunkType::IDAT, .. }))
  ));
}

#[test]
fn test_chunk_order() {
  let ihdr = ImageHeader::rgba8(2, 4).unwrap().to_bytes();
  let zlib = miniz_oxide::deflate::compress_to_vec_zlib(&HAND_FILTERED, 6);
  let order_error = |chunks: &[(ChunkType, &[u8])]| {
    matches!(
      Decoder::new(assemble(chunks).as_slice()),
      Err(PngError::Format(FormatError::ChunkOutOfOrder))
    )
  };
  // duplicate IHDR
  assert!(order_error(&[
    (ChunkType::IHDR, &ihdr),
    (ChunkType::IHDR, &ihdr),
    (ChunkType::IDAT, &zlib),
    (ChunkType::IEND, &[]),
  ]));
  // IDAT first
  assert!(order_error(&[
    (ChunkType::IDAT, &zlib),
    (ChunkType::IHDR, &ihdr),
    (ChunkType::IEND, &[]),
  ]));
  // IEND before any IDAT
  assert!(order_error(&[(ChunkType::IHDR, &ihdr), (ChunkType::IEND, &[]), (ChunkType::IDAT, &zlib)]));
  // no IHDR at all
  assert!(order_error(&[(ChunkType::IEND, &[])]));
}

#[test]
fn test_ancillary_chunks_are_skipped() {
  let ihdr = ImageHeader::rgba8(2, 4).unwrap().to_bytes();
  let zlib = miniz_oxide::deflate::compress_to_vec_zlib(&HAND_FILTERED, 6);
  let big_comment = vec![b'z'; 10_000];
  let png = assemble(&[
    (ChunkType(*b"tEXt"), b"Comment\0ignored"),
    (ChunkType::IHDR, &ihdr),
    (ChunkType(*b"gAMA"), &[0, 0, 177, 143]),
    (ChunkType(*b"zzZz"), &big_comment),
    (ChunkType::IDAT, &zlib),
    (ChunkType::IEND, &[]),
  ]);
  assert_eq!(decode_all(&png).unwrap(), HAND_EXPECTED);

  // a skipped chunk's CRC still counts
  let mut bad = png.clone();
  let (_, gama) = chunk_spans(&png).into_iter().find(|(ty, _)| *ty == ChunkType(*b"gAMA")).unwrap();
  bad[gama.end - 1] ^= 0x01;
  assert!(matches!(
    Decoder::new(bad.as_slice()),
    Err(PngError::Format(FormatError::BadChecksum { .. }))
  ));
}

#[test]
fn test_multiple_idat_chunks() {
  let ihdr = ImageHeader::rgba8(2, 4).unwrap().to_bytes();
  let zlib = miniz_oxide::deflate::compress_to_vec_zlib(&HAND_FILTERED, 0);
  let mut chunks: Vec<(ChunkType, &[u8])> = vec![(ChunkType::IHDR, &ihdr[..])];
  for (i, part) in zlib.chunks(3).enumerate() {
    if i > 0 {
      // empty IDAT chunks in between are fine too
      chunks.push((ChunkType::IDAT, &[]));
    }
    chunks.push((ChunkType::IDAT, part));
  }
  chunks.push((ChunkType::IEND, &[]));
  assert_eq!(decode_all(&assemble(&chunks)).unwrap(), HAND_EXPECTED);
}

#[test]
fn test_every_ihdr_bit_flip_is_rejected() {
  let data = pattern_image(2, 2);
  let png = encode_with(Encoder::default(), 2, 2, &data);
  let (_, ihdr) = chunk_spans(&png)[0].clone();
  for byte in ihdr {
    for bit in 0..8 {
      let mut bad = png.clone();
      bad[byte] ^= 1 << bit;
      assert!(decode_all(&bad).is_err(), "byte {byte}, bit {bit}");
    }
  }
}

#[test]
fn test_idat_corruption_is_rejected() {
  let data = pattern_image(20, 20);
  for level in [CompressionLevel::NoCompression, CompressionLevel::Default] {
    let png = encode_with(Encoder::new(level), 20, 20, &data);
    let spans = chunk_spans(&png);
    assert_eq!(spans.len(), 3);
    let (chunk_ty, idat) = spans[1].clone();
    assert_eq!(chunk_ty, ChunkType::IDAT);
    // every data byte and every CRC byte
    for byte in idat.start + 8..idat.end {
      let mut bad = png.clone();
      bad[byte] ^= 0x40;
      let result = decode_all(&bad);
      assert!(
        matches!(
          result,
          Err(PngError::Format(FormatError::BadChecksum { chunk: ChunkType::IDAT, .. }))
        ),
        "{level:?} byte {byte}: {result:?}"
      );
    }
  }
}

#[test]
fn test_iend_problems() {
  let ihdr = ImageHeader::rgba8(2, 4).unwrap().to_bytes();
  let zlib = miniz_oxide::deflate::compress_to_vec_zlib(&HAND_FILTERED, 6);
  let close_result = |tail: &[(ChunkType, &[u8])]| {
    let mut chunks: Vec<(ChunkType, &[u8])> = vec![(ChunkType::IHDR, &ihdr[..]), (ChunkType::IDAT, &zlib[..])];
    chunks.extend_from_slice(tail);
    let png = assemble(&chunks);
    let mut decoder = Decoder::new(png.as_slice()).unwrap();
    while decoder.decode_row().unwrap().is_some() {}
    decoder.close()
  };
  assert!(close_result(&[(ChunkType::IEND, &[])]).is_ok());
  assert!(matches!(
    close_result(&[(ChunkType::IEND, &[0])]),
    Err(PngError::Format(FormatError::BadIendLength(1)))
  ));
  assert!(matches!(
    close_result(&[(ChunkType(*b"tEXt"), b"a\0b"), (ChunkType::IEND, &[])]),
    Err(PngError::Format(FormatError::NotIend(ChunkType([b't', b'E', b'X', b't']))))
  ));
  // a leftover IDAT after the end of the zlib stream
  assert!(matches!(
    close_result(&[(ChunkType::IDAT, &[]), (ChunkType::IEND, &[])]),
    Err(PngError::Format(FormatError::NotIend(ChunkType::IDAT)))
  ));
  assert!(matches!(close_result(&[]), Err(PngError::UnexpectedEof)));
}

#[test]
fn test_bad_iend_checksum() {
  let png = hand_built(&HAND_FILTERED, 2, 4);
  let mut bad = png.clone();
  let last = bad.len() - 1;
  bad[last] ^= 0x80;
  assert!(matches!(
    decode_all(&bad),
    Err(PngError::Format(FormatError::BadChecksum { chunk: ChunkType::IEND, .. }))
  ));
}

#[test]
fn test_not_enough_pixel_data() {
  // two rows short
  let png = hand_built(&HAND_FILTERED[..18], 2, 4);
  let mut decoder = Decoder::new(png.as_slice()).unwrap();
  assert!(decoder.decode_row().unwrap().is_some());
  assert!(decoder.decode_row().unwrap().is_some());
  assert!(matches!(
    decoder.decode_row(),
    Err(PngError::Format(FormatError::NotEnoughPixelData))
  ));

  // the file stops in the middle of the only IDAT
  let png = hand_built(&HAND_FILTERED, 2, 4);
  let (_, idat) = chunk_spans(&png)[1].clone();
  let cut = &png[..idat.start + 10];
  let mut decoder = Decoder::new(cut).unwrap();
  assert!(matches!(
    decoder.decode_row(),
    Err(PngError::Format(FormatError::NotEnoughPixelData))
  ));
}

#[test]
fn test_extra_pixel_data_is_ignored() {
  let mut filtered = HAND_FILTERED.to_vec();
  filtered.extend_from_slice(&[0; 9]);
  let png = hand_built(&filtered, 2, 4);
  assert_eq!(decode_all(&png).unwrap(), HAND_EXPECTED);
}

#[test]
fn test_bad_filter_byte() {
  let mut filtered = HAND_FILTERED;
  filtered[9] = 5;
  let png = hand_built(&filtered, 2, 4);
  let mut decoder = Decoder::new(png.as_slice()).unwrap();
  assert!(decoder.decode_row().unwrap().is_some());
  assert!(matches!(
    decoder.decode_row(),
    Err(PngError::Format(FormatError::BadFilterType(5)))
  ));
}

#[test]
fn test_header_rejections() {
  assert!(matches!(
    Decoder::new(&b"\x89PNG\r\n\x1a\x00garbage"[..]),
    Err(PngError::Format(FormatError::NotPng))
  ));
  assert!(matches!(Decoder::new(&PNG_SIGNATURE[..]), Err(PngError::UnexpectedEof)));

  let mut ihdr = ImageHeader::rgba8(2, 4).unwrap().to_bytes();
  ihdr[8] = 16;
  let png = assemble(&[(ChunkType::IHDR, &ihdr), (ChunkType::IEND, &[])]);
  let err = Decoder::new(png.as_slice()).unwrap_err();
  assert!(err.is_unsupported());
  assert!(!err.is_format());

  let mut ihdr = ImageHeader::rgba8(2, 4).unwrap().to_bytes();
  ihdr[4..8].copy_from_slice(&0_u32.to_be_bytes());
  let png = assemble(&[(ChunkType::IHDR, &ihdr), (ChunkType::IEND, &[])]);
  assert!(matches!(
    Decoder::new(png.as_slice()),
    Err(PngError::Format(FormatError::NonPositiveDimension))
  ));
}

#[test]
fn test_decode_bitmap() {
  let mut image = Bitmap::<RGBA8>::new(5, 3);
  for (i, px) in image.pixels.iter_mut().enumerate() {
    *px = RGBA8::new(i as u8, (i * 20) as u8, 255 - i as u8, (i % 2) as u8 * 255);
  }
  let mut png = Vec::new();
  Encoder::default().encode(&mut png, &image).unwrap();
  let decoded = decode_bitmap(png.as_slice()).unwrap();
  assert_eq!(decoded, image);
  assert_eq!(decoded.get(4, 2), Some(&RGBA8::new(14, 24, 241, 0)));
}
