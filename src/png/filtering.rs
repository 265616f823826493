//! From the PNG spec:
//!
//! > Filters are applied to **bytes**, not to pixels, regardless of the bit
//! > depth or color type of the image.
//!
//! With 8-bit RGBA, the "pixel to the left" of any byte is always 4 bytes
//! back, and for the leftmost pixel that neighbor is taken as 0. The row above
//! the first row is likewise all 0.

use crate::{FormatError, PngResult};

use super::ImageHeader;

const BPP: usize = ImageHeader::BYTES_PER_PIXEL;

/// The five filter types of PNG filter method 0.
///
/// Each scanline of decompressed data starts with one of these as a byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
#[allow(missing_docs)]
pub enum FilterType {
  None = 0,
  Sub = 1,
  Up = 2,
  Average = 3,
  Paeth = 4,
}
impl FilterType {
  /// Every filter type, in tag order.
  pub const ALL: [Self; 5] = [Self::None, Self::Sub, Self::Up, Self::Average, Self::Paeth];
}
impl TryFrom<u8> for FilterType {
  type Error = FormatError;
  #[inline]
  fn try_from(value: u8) -> Result<Self, Self::Error> {
    Ok(match value {
      0 => Self::None,
      1 => Self::Sub,
      2 => Self::Up,
      3 => Self::Average,
      4 => Self::Paeth,
      other => return Err(FormatError::BadFilterType(other)),
    })
  }
}

/// How the encoder picks a filter for each row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FilterStrategy {
  /// Always use this one filter.
  Fixed(FilterType),
  /// Try every filter on each row and keep the one whose output bytes, taken
  /// as signed values, have the smallest sum of absolute values.
  Adaptive,
}

/// Undoes the filter on one row, in place.
///
/// * `filter` is the row's filter byte.
/// * `cdat` is the row's data (after the filter byte).
/// * `pdat` is the already reconstructed row above, or all 0 for the first
///   row. It must be the same length as `cdat`.
///
/// ## Failure
/// * [`FormatError::BadFilterType`] if `filter` isn't `0..=4`. The row is left
///   untouched in that case.
pub fn reconstruct_row(filter: u8, cdat: &mut [u8], pdat: &[u8]) -> PngResult<()> {
  debug_assert_eq!(cdat.len(), pdat.len());
  let len = cdat.len().min(pdat.len());
  let head = BPP.min(len);
  match FilterType::try_from(filter)? {
    FilterType::None => (),
    FilterType::Sub => {
      for i in BPP..len {
        cdat[i] = reconstruct_sub(cdat[i], cdat[i - BPP]);
      }
    }
    FilterType::Up => {
      cdat.iter_mut().zip(pdat.iter()).for_each(|(x, b)| *x = reconstruct_up(*x, *b));
    }
    FilterType::Average => {
      // the first pixel has no left neighbor, so we use 0 there.
      for i in 0..head {
        cdat[i] = reconstruct_average(cdat[i], 0, pdat[i]);
      }
      for i in BPP..len {
        cdat[i] = reconstruct_average(cdat[i], cdat[i - BPP], pdat[i]);
      }
    }
    FilterType::Paeth => {
      for i in 0..head {
        cdat[i] = reconstruct_paeth(cdat[i], 0, pdat[i], 0);
      }
      for i in BPP..len {
        cdat[i] = reconstruct_paeth(cdat[i], cdat[i - BPP], pdat[i], pdat[i - BPP]);
      }
    }
  }
  Ok(())
}

/// Applies a filter to one row.
///
/// `cur` and `prev` are original (unfiltered) bytes of this row and the row
/// above (all 0 for the first row). The filtered bytes go into `out`. All
/// three slices must be the same length.
pub fn filter_row(filter: FilterType, cur: &[u8], prev: &[u8], out: &mut [u8]) {
  debug_assert_eq!(cur.len(), prev.len());
  debug_assert_eq!(cur.len(), out.len());
  let left = |i: usize| if i >= BPP { cur[i - BPP] } else { 0 };
  let up_left = |i: usize| if i >= BPP { prev[i - BPP] } else { 0 };
  let it = out.iter_mut().zip(cur.iter().zip(prev.iter())).enumerate();
  match filter {
    FilterType::None => it.for_each(|(_, (o, (x, _)))| *o = *x),
    FilterType::Sub => it.for_each(|(i, (o, (x, _)))| *o = x.wrapping_sub(left(i))),
    FilterType::Up => it.for_each(|(_, (o, (x, b)))| *o = x.wrapping_sub(*b)),
    FilterType::Average => it.for_each(|(i, (o, (x, b)))| {
      *o = x.wrapping_sub(average(left(i), *b));
    }),
    FilterType::Paeth => it.for_each(|(i, (o, (x, b)))| {
      *o = x.wrapping_sub(paeth_predictor(left(i), *b, up_left(i)));
    }),
  }
}

/// Picks and applies a filter to each row for the encoder.
///
/// Holds two row sized buffers so that the adaptive strategy can try every
/// filter without allocating.
#[derive(Debug, Clone)]
pub struct RowFilter {
  strategy: FilterStrategy,
  scratch: Vec<u8>,
  best: Vec<u8>,
}
impl RowFilter {
  /// A filter for rows of `row_len` bytes (not counting the filter byte).
  #[must_use]
  pub fn new(strategy: FilterStrategy, row_len: usize) -> Self {
    let scratch = match strategy {
      FilterStrategy::Fixed(_) => Vec::new(),
      FilterStrategy::Adaptive => vec![0; row_len],
    };
    Self { strategy, scratch, best: vec![0; row_len] }
  }

  /// Filters `cur` against `prev`, giving the filter used and the filtered
  /// bytes.
  pub fn apply(&mut self, cur: &[u8], prev: &[u8]) -> (FilterType, &[u8]) {
    match self.strategy {
      FilterStrategy::Fixed(ty) => {
        filter_row(ty, cur, prev, &mut self.best);
        (ty, &self.best)
      }
      FilterStrategy::Adaptive => {
        let mut best_ty = FilterType::None;
        let mut best_score = u64::MAX;
        for ty in FilterType::ALL {
          filter_row(ty, cur, prev, &mut self.scratch);
          let score = sum_of_abs(&self.scratch);
          if score < best_score {
            best_score = score;
            best_ty = ty;
            core::mem::swap(&mut self.scratch, &mut self.best);
          }
        }
        (best_ty, &self.best)
      }
    }
  }
}

fn sum_of_abs(bytes: &[u8]) -> u64 {
  bytes.iter().map(|&b| u64::from((b as i8).unsigned_abs())).sum()
}

/// Reconstruct Filter Type 1
///
/// * `fx` filtered X
/// * `ra` reconstructed `a`: the corresponding byte from the pixel to the left
///   of this pixel (or skip reconstruction if this is the leftmost pixel)
#[inline]
const fn reconstruct_sub(fx: u8, ra: u8) -> u8 {
  fx.wrapping_add(ra)
}

/// Reconstruct Filter Type 2
///
/// * `fx` filtered X
/// * `rb` reconstructed `b`: The byte corresponding to this byte within the
///   previous scanline.
#[inline]
const fn reconstruct_up(fx: u8, rb: u8) -> u8 {
  fx.wrapping_add(rb)
}

/// Reconstruct Filter Type 3
///
/// Same as Sub and Up for `a` and `b`, with `a` as 0 on the leftmost pixel.
#[inline]
const fn reconstruct_average(fx: u8, ra: u8, rb: u8) -> u8 {
  fx.wrapping_add(average(ra, rb))
}

/// Reconstruct Filter Type 4
///
/// * `rc` reconstructed `c`: the byte to the left of `b`, or 0 on the
///   leftmost pixel.
#[inline]
const fn reconstruct_paeth(fx: u8, ra: u8, rb: u8, rc: u8) -> u8 {
  fx.wrapping_add(paeth_predictor(ra, rb, rc))
}

/// The floor of the mean, computed without overflow.
#[inline]
const fn average(a: u8, b: u8) -> u8 {
  ((a as u16 + b as u16) / 2) as u8
}

/// The Paeth filter function computes a simple linear function of the three
/// neighboring pixels (left `a`, above `b`, upper left `c`).
///
/// The output is the "predictor" of the neighboring pixel closest to the
/// computed value.
///
/// A neighbor past the top or left edge of the image is 0.
#[inline]
#[must_use]
pub const fn paeth_predictor(a: u8, b: u8, c: u8) -> u8 {
  // The predictor math must be exact, and i32 holds any `a + b - c` of bytes.
  let a_ = a as i32;
  let b_ = b as i32;
  let c_ = c as i32;
  let p = a_ + b_ - c_;
  let pa = (p - a_).abs();
  let pb = (p - b_).abs();
  let pc = (p - c_).abs();
  // The order of these tests is part of the format: a, then b, then c.
  if pa <= pb && pa <= pc {
    a
  } else if pb <= pc {
    b
  } else {
    c
  }
}

#[test]
fn test_paeth_predictor_tie_break() {
  // |p-a| == |p-b| <= |p-c| picks a: p = 200, distances 100, 100, 200
  assert_eq!(paeth_predictor(100, 100, 0), 100);
  // |p-b| == |p-c| < |p-a| picks b: p = 30, distances 20, 10, 10
  assert_eq!(paeth_predictor(10, 40, 20), 40);
  // p = 190, distances 90, 100, 190
  assert_eq!(paeth_predictor(100, 90, 0), 100);
  // p = 100, distances 70, 30, 100
  assert_eq!(paeth_predictor(30, 70, 0), 70);
  // p = 40, distances 20, 20, 0
  assert_eq!(paeth_predictor(60, 20, 40), 40);
  // p = 15, distances 5, 5, 0: c wins outright
  assert_eq!(paeth_predictor(10, 20, 15), 15);
  // p = 5, distances 5, 15, 20
  assert_eq!(paeth_predictor(10, 20, 25), 10);
  // p = -50, distances 100, 50, 150
  assert_eq!(paeth_predictor(50, 0, 100), 0);
  // only edge neighbors present
  assert_eq!(paeth_predictor(0, 77, 0), 77);
  assert_eq!(paeth_predictor(77, 0, 0), 77);
}

#[test]
fn test_paeth_predictor_exhaustive_order() {
  // compare against a direct reading of the rule for a spread of inputs
  for a in (0..=255_u8).step_by(17) {
    for b in (0..=255_u8).step_by(15) {
      for c in (0..=255_u8).step_by(13) {
        let p = a as i32 + b as i32 - c as i32;
        let (pa, pb, pc) = ((p - a as i32).abs(), (p - b as i32).abs(), (p - c as i32).abs());
        let expected = if pa <= pb && pa <= pc {
          a
        } else if pb <= pc {
          b
        } else {
          c
        };
        assert_eq!(paeth_predictor(a, b, c), expected, "a:{a} b:{b} c:{c}");
      }
    }
  }
}

#[test]
fn test_every_filter_round_trips() {
  let prev: Vec<u8> = (0..40_u32).map(|i| (i * 37 + 11) as u8).collect();
  let cur: Vec<u8> = (0..40_u32).map(|i| (i * 91 + 200) as u8).collect();
  for ty in FilterType::ALL {
    let mut filtered = vec![0; cur.len()];
    filter_row(ty, &cur, &prev, &mut filtered);
    reconstruct_row(ty as u8, &mut filtered, &prev).unwrap();
    assert_eq!(filtered, cur, "filter {ty:?}");
  }
}

#[test]
fn test_first_row_uses_zero_above() {
  let zeros = [0_u8; 8];
  let cur = [200_u8, 201, 202, 203, 10, 20, 30, 40];
  for ty in FilterType::ALL {
    let mut filtered = [0_u8; 8];
    filter_row(ty, &cur, &zeros, &mut filtered);
    reconstruct_row(ty as u8, &mut filtered, &zeros).unwrap();
    assert_eq!(filtered, cur, "filter {ty:?}");
  }
}

#[test]
fn test_reconstruct_known_values() {
  let pdat = [10_u8, 20, 30, 40, 250, 250, 250, 250];
  // Sub: the first pixel is unchanged
  let mut cdat = [1_u8, 2, 3, 4, 255, 255, 255, 255];
  reconstruct_row(1, &mut cdat, &pdat).unwrap();
  assert_eq!(cdat, [1, 2, 3, 4, 0, 1, 2, 3]);
  // Up wraps around
  let mut cdat = [1_u8, 2, 3, 4, 10, 10, 10, 10];
  reconstruct_row(2, &mut cdat, &pdat).unwrap();
  assert_eq!(cdat, [11, 22, 33, 44, 4, 4, 4, 4]);
  // Average of 255 and 250 must not overflow before halving
  let mut cdat = [0_u8, 0, 0, 0, 0, 0, 0, 0];
  let pdat2 = [255_u8, 255, 255, 255, 250, 250, 250, 250];
  reconstruct_row(3, &mut cdat, &pdat2).unwrap();
  assert_eq!(cdat, [127, 127, 127, 127, 188, 188, 188, 188]);
}

#[test]
fn test_bad_filter_type() {
  let mut cdat = [1_u8, 2, 3, 4];
  let pdat = [0_u8; 4];
  assert!(matches!(
    reconstruct_row(5, &mut cdat, &pdat),
    Err(crate::PngError::Format(FormatError::BadFilterType(5)))
  ));
  assert_eq!(cdat, [1, 2, 3, 4]);
}

#[test]
fn test_adaptive_picks_a_decodable_filter() {
  // a smooth gradient: Sub should beat None by far.
  let cur: Vec<u8> = (0..64_u32).map(|i| (i * 2) as u8).collect();
  let prev = vec![0_u8; 64];
  let mut f = RowFilter::new(FilterStrategy::Adaptive, cur.len());
  let (ty, out) = f.apply(&cur, &prev);
  assert_ne!(ty, FilterType::None);
  let mut rebuilt = out.to_vec();
  reconstruct_row(ty as u8, &mut rebuilt, &prev).unwrap();
  assert_eq!(rebuilt, cur);
}
