#![forbid(unsafe_code)]

//! Provides a heap-allocated image type.
//!
//! The codec itself only ever sees scanlines, this is just a convenient place
//! to put whole images when you want them.

use crate::pixel_formats::RGBA8;

/// Converts an `(x,y)` position within a given `width` 2D space into a linear
/// index.
#[inline]
#[must_use]
pub const fn xy_width_to_index(x: u32, y: u32, width: u32) -> usize {
  (y as usize) * (width as usize) + (x as usize)
}

/// A direct-color image, stored top row first.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[allow(missing_docs)]
pub struct Bitmap<P> {
  pub width: u32,
  pub height: u32,
  pub pixels: Vec<P>,
}
impl<P: Clone + Default> Bitmap<P> {
  /// Makes a bitmap with every pixel set to the default value.
  #[inline]
  #[must_use]
  pub fn new(width: u32, height: u32) -> Self {
    let pixels = vec![P::default(); (width as usize) * (height as usize)];
    Self { width, height, pixels }
  }
}
impl<P> Bitmap<P> {
  /// Gets the pixel at the position, or `None` if the position is out of
  /// bounds.
  #[inline]
  #[must_use]
  pub fn get(&self, x: u32, y: u32) -> Option<&P> {
    if x < self.width && y < self.height {
      self.pixels.get(xy_width_to_index(x, y, self.width))
    } else {
      None
    }
  }

  /// Gets the pixel at the position, or `None` if the position is out of
  /// bounds.
  #[inline]
  #[must_use]
  pub fn get_mut(&mut self, x: u32, y: u32) -> Option<&mut P> {
    if x < self.width && y < self.height {
      self.pixels.get_mut(xy_width_to_index(x, y, self.width))
    } else {
      None
    }
  }

  /// Gets one row of pixels, or `None` if `y` is out of bounds.
  #[inline]
  #[must_use]
  pub fn row(&self, y: u32) -> Option<&[P]> {
    if y < self.height {
      let start = xy_width_to_index(0, y, self.width);
      self.pixels.get(start..start + self.width as usize)
    } else {
      None
    }
  }

  /// Gets one row of pixels, or `None` if `y` is out of bounds.
  #[inline]
  #[must_use]
  pub fn row_mut(&mut self, y: u32) -> Option<&mut [P]> {
    if y < self.height {
      let start = xy_width_to_index(0, y, self.width);
      self.pixels.get_mut(start..start + self.width as usize)
    } else {
      None
    }
  }
}
impl Bitmap<RGBA8> {
  /// The pixel data as bytes, 4 per pixel, in the order PNG stores them.
  #[inline]
  #[must_use]
  pub fn as_bytes(&self) -> &[u8] {
    bytemuck::cast_slice(&self.pixels)
  }
}

#[test]
fn test_bitmap_rows() {
  let mut bitmap: Bitmap<RGBA8> = Bitmap::new(3, 2);
  *bitmap.get_mut(2, 1).unwrap() = RGBA8::new(1, 2, 3, 4);
  assert_eq!(bitmap.get(2, 1), Some(&RGBA8::new(1, 2, 3, 4)));
  assert_eq!(bitmap.get(3, 1), None);
  assert_eq!(bitmap.row(1).unwrap()[2], RGBA8::new(1, 2, 3, 4));
  assert!(bitmap.row(2).is_none());
  bitmap.row_mut(0).unwrap().fill(RGBA8::new(9, 9, 9, 9));
  assert_eq!(bitmap.get(1, 0), Some(&RGBA8::new(9, 9, 9, 9)));
  assert_eq!(bitmap.get(2, 1), Some(&RGBA8::new(1, 2, 3, 4)));
  assert!(bitmap.row_mut(2).is_none());
  assert_eq!(bitmap.as_bytes().len(), 3 * 2 * 4);
  assert_eq!(&bitmap.as_bytes()[20..24], &[1, 2, 3, 4]);
  assert_eq!(&bitmap.as_bytes()[..4], &[9, 9, 9, 9]);
}
