const CRC_TABLE: [u32; 256] = make_crc_table();

const fn make_crc_table() -> [u32; 256] {
  let mut out = [0; 256];
  let mut n = 0;
  while n < 256 {
    let mut c = n as u32;
    let mut k = 0;
    while k < 8 {
      if (c & 1) != 0 {
        c = 0xEDB8_8320_u32 ^ (c >> 1);
      } else {
        c >>= 1;
      }
      //
      k += 1;
    }
    out[n] = c;
    //
    n += 1;
  }
  out
}

/// A running CRC-32 (IEEE) over the bytes of one chunk.
///
/// PNG computes the CRC over the chunk type and the chunk data, not the
/// length. Call [`reset`](Self::reset) at the start of each chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Crc32 {
  state: u32,
}
impl Default for Crc32 {
  #[inline]
  fn default() -> Self {
    Self::new()
  }
}
impl Crc32 {
  /// A fresh accumulator.
  #[inline]
  #[must_use]
  pub const fn new() -> Self {
    Self { state: u32::MAX }
  }

  /// Forget everything fed in so far.
  #[inline]
  pub fn reset(&mut self) {
    self.state = u32::MAX;
  }

  /// Feed more bytes in.
  #[inline]
  pub fn update(&mut self, bytes: &[u8]) {
    let mut crc = self.state;
    for &byte in bytes {
      let i = (crc ^ u32::from(byte)) as u8 as usize;
      crc = CRC_TABLE[i] ^ (crc >> 8);
    }
    self.state = crc;
  }

  /// The CRC of all bytes fed in since the last reset.
  #[inline]
  #[must_use]
  pub const fn value(&self) -> u32 {
    self.state ^ u32::MAX
  }
}

/// Computes the CRC of some bytes all at once.
#[inline]
#[must_use]
pub fn png_crc(bytes: &[u8]) -> u32 {
  let mut crc = Crc32::new();
  crc.update(bytes);
  crc.value()
}

#[test]
fn test_png_crc_known_values() {
  // the standard check value for CRC-32/IEEE
  assert_eq!(png_crc(b"123456789"), 0xCBF4_3926);
  // every PNG ends with this exact IEND chunk
  assert_eq!(png_crc(b"IEND"), 0xAE42_6082);
  assert_eq!(png_crc(&[]), 0);
}

#[test]
fn test_crc32_running_matches_one_shot() {
  let data = b"IDATsome bytes split across calls";
  let mut crc = Crc32::new();
  crc.update(&data[..4]);
  crc.update(&data[4..10]);
  crc.update(&data[10..]);
  assert_eq!(crc.value(), png_crc(data));
  crc.reset();
  assert_eq!(crc, Crc32::default());
}
