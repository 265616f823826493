use rowpng::{
  png::{
    decode_bitmap, ChunkType, CompressionLevel, Decoder, Encoder, FilterStrategy, FilterType,
    PNG_SIGNATURE,
  },
  FormatError, PngError, PngResult,
};
use walkdir::WalkDir;

const LEVELS: [CompressionLevel; 4] = [
  CompressionLevel::NoCompression,
  CompressionLevel::BestSpeed,
  CompressionLevel::Default,
  CompressionLevel::BestCompression,
];

fn rowpng_decode(bytes: &[u8]) -> PngResult<(u32, u32, Vec<u8>)> {
  let mut decoder = Decoder::new(bytes)?;
  let (width, height) = decoder.bounds();
  let mut pixels = Vec::new();
  while let Some(row) = decoder.decode_row()? {
    pixels.extend_from_slice(row);
  }
  decoder.close()?;
  Ok((width, height, pixels))
}

/// Decodes with the `png` crate, as 8-bit RGBA only.
fn reference_decode(bytes: &[u8]) -> Option<(u32, u32, Vec<u8>)> {
  let mut reader = ::png::Decoder::new(bytes).read_info().ok()?;
  let mut buf = vec![0; reader.output_buffer_size()];
  let info = reader.next_frame(&mut buf).ok()?;
  if info.color_type != ::png::ColorType::Rgba || info.bit_depth != ::png::BitDepth::Eight {
    return None;
  }
  buf.truncate(info.buffer_size());
  Some((info.width, info.height, buf))
}

fn reference_encode(
  width: u32, height: u32, data: &[u8], filter: ::png::FilterType,
  compression: ::png::Compression,
) -> Vec<u8> {
  let mut out = Vec::new();
  let mut encoder = ::png::Encoder::new(&mut out, width, height);
  encoder.set_color(::png::ColorType::Rgba);
  encoder.set_depth(::png::BitDepth::Eight);
  encoder.set_filter(filter);
  encoder.set_compression(compression);
  encoder.set_source_gamma(::png::ScaledFloat::new(1.0 / 2.2));
  let mut writer = encoder.write_header().unwrap();
  writer.write_image_data(data).unwrap();
  writer.finish().unwrap();
  out
}

fn random_dimensions() -> (u32, u32) {
  let b = super::rand_bytes(2);
  (u32::from(b[0] % 40) + 1, u32::from(b[1] % 40) + 1)
}

#[test]
fn test_decode_reference_encoder_output() {
  let filters = [
    ::png::FilterType::NoFilter,
    ::png::FilterType::Sub,
    ::png::FilterType::Up,
    ::png::FilterType::Avg,
    ::png::FilterType::Paeth,
  ];
  let compressions =
    [::png::Compression::Fast, ::png::Compression::Default, ::png::Compression::Best];
  for filter in filters {
    for compression in compressions {
      let (w, h) = random_dimensions();
      let data = super::rand_bytes(w as usize * h as usize * 4);
      let png = reference_encode(w, h, &data, filter, compression);
      let (dw, dh, pixels) = rowpng_decode(&png).unwrap();
      assert_eq!((dw, dh), (w, h));
      assert_eq!(pixels, data, "{filter:?} {compression:?} {w}x{h}");
    }
  }
}

#[test]
fn test_reference_decoder_reads_our_output() {
  for level in LEVELS {
    for strategy in [
      FilterStrategy::Adaptive,
      FilterStrategy::Fixed(FilterType::Sub),
      FilterStrategy::Fixed(FilterType::Paeth),
    ] {
      let (w, h) = random_dimensions();
      let data = super::rand_bytes(w as usize * h as usize * 4);
      let mut png = Vec::new();
      Encoder::new(level)
        .with_filter_strategy(strategy)
        .with_idat_len(64)
        .encode_rgba8(&mut png, w, h, &data)
        .unwrap();
      let (rw, rh, pixels) = reference_decode(&png).unwrap();
      assert_eq!((rw, rh), (w, h));
      assert_eq!(pixels, data, "{level:?} {strategy:?} {w}x{h}");
    }
  }
}

#[test]
fn test_random_images_round_trip() {
  for _ in 0..20 {
    let (w, h) = random_dimensions();
    let data = super::rand_bytes(w as usize * h as usize * 4);
    let level = LEVELS[super::rand_bytes(1)[0] as usize % LEVELS.len()];
    let mut png = Vec::new();
    Encoder::new(level).encode_rgba8(&mut png, w, h, &data).unwrap();
    let bitmap = decode_bitmap(png.as_slice()).unwrap();
    assert_eq!((bitmap.width, bitmap.height), (w, h));
    assert_eq!(bitmap.as_bytes(), data.as_slice());
  }
}

#[test]
fn test_image_files() {
  let mut checked = 0;
  for entry in WalkDir::new("tests/images/").into_iter().filter_map(|e| e.ok()) {
    let path = entry.path();
    if path.extension().and_then(|s| s.to_str()) != Some("png") {
      continue;
    }
    let name = path.file_name().and_then(|s| s.to_str()).unwrap_or_default().to_owned();
    println!("{}", path.display());
    let bytes = std::fs::read(path).unwrap();
    let ours = rowpng_decode(&bytes);
    if name.starts_with("rgba8_") {
      let (w, h, pixels) = ours.unwrap();
      let (rw, rh, expected) = reference_decode(&bytes).unwrap();
      assert_eq!((w, h), (rw, rh), "{name}");
      assert_eq!(pixels, expected, "{name}");
      checked += 1;
    } else if name.starts_with("unsupported_") {
      assert!(ours.unwrap_err().is_unsupported(), "{name}");
    } else if name == "bad_idat_crc.png" {
      assert!(
        matches!(
          ours,
          Err(PngError::Format(FormatError::BadChecksum { chunk: ChunkType::IDAT, .. }))
        ),
        "{name}: {ours:?}"
      );
    } else if name.starts_with("bad_") {
      assert!(ours.unwrap_err().is_format(), "{name}");
    }
  }
  assert!(checked > 0);
}

#[test]
fn test_random_data_never_panics() {
  // plain garbage
  for _ in 0..50 {
    let v = super::rand_bytes(1024);
    let _ = rowpng_decode(&v);
  }
  // a good start, then garbage where the image data should be
  let mut prefix = Vec::new();
  Encoder::default().encode_rgba8(&mut prefix, 8, 8, &[7; 8 * 8 * 4]).unwrap();
  let idat_data_start = PNG_SIGNATURE.len() + 25 + 8;
  for _ in 0..50 {
    let mut v = prefix[..idat_data_start].to_vec();
    v.extend_from_slice(&super::rand_bytes(512));
    assert!(rowpng_decode(&v).is_err());
  }
  // every truncation of a good file
  for len in 0..prefix.len() {
    assert!(rowpng_decode(&prefix[..len]).is_err(), "len {len}");
  }
}
