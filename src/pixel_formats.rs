//! Module for pixel formats.
//!
//! PNG stores 8-bit RGBA as four bytes per pixel in `r, g, b, a` order, and
//! the alpha is straight (not premultiplied). [`RGBA8`] has exactly that
//! layout, so a slice of pixels can be cast to and from scanline bytes with
//! [`bytemuck`].

use bytemuck::{Pod, Zeroable};

/// An 8-bits per channel RGBA pixel.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[derive(Pod, Zeroable)]
#[repr(C)]
#[allow(missing_docs)]
pub struct RGBA8 {
  pub r: u8,
  pub g: u8,
  pub b: u8,
  pub a: u8,
}
impl RGBA8 {
  /// Makes a pixel from the four channel values.
  #[inline]
  #[must_use]
  pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
    Self { r, g, b, a }
  }
}
impl From<[u8; 4]> for RGBA8 {
  #[inline]
  fn from([r, g, b, a]: [u8; 4]) -> Self {
    Self { r, g, b, a }
  }
}
impl From<RGBA8> for [u8; 4] {
  #[inline]
  fn from(RGBA8 { r, g, b, a }: RGBA8) -> Self {
    [r, g, b, a]
  }
}

#[test]
fn test_rgba8_byte_layout() {
  let px = [RGBA8::new(1, 2, 3, 4), RGBA8::new(5, 6, 7, 8)];
  let bytes: &[u8] = bytemuck::cast_slice(&px);
  assert_eq!(bytes, &[1, 2, 3, 4, 5, 6, 7, 8]);
  assert_eq!(<[u8; 4]>::from(RGBA8::from([9, 8, 7, 6])), [9, 8, 7, 6]);
}
