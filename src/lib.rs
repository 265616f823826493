#![forbid(unsafe_code)]
#![cfg_attr(docs_rs, feature(doc_cfg))]
#![warn(missing_docs)]

//! A PNG codec that works one scanline at a time.
//!
//! Only one pixel layout is handled: 8 bits per channel RGBA, not interlaced.
//! In exchange, decoding never holds more than two scanlines of pixel data
//! (plus the zlib window), no matter how tall the image is.
//!
//! * Decoding is pull based: make a [`Decoder`](png::Decoder) over any
//!   [`Read`](std::io::Read), then call
//!   [`decode_row`](png::Decoder::decode_row) until it gives `None`, then
//!   [`close`](png::Decoder::close) it.
//! * Encoding is a single call: build an [`Encoder`](png::Encoder) with a
//!   [`CompressionLevel`](png::CompressionLevel) and hand it a
//!   [`Bitmap`] (or raw RGBA bytes) and a [`Write`](std::io::Write).
//!
//! ```no_run
//! use rowpng::png::Decoder;
//! # fn f() -> rowpng::PngResult<()> {
//! let file = std::fs::File::open("image.png")?;
//! let mut decoder = Decoder::new(std::io::BufReader::new(file))?;
//! let (width, height) = decoder.bounds();
//! while let Some(row) = decoder.decode_row()? {
//!   assert_eq!(row.len(), width as usize * 4);
//! }
//! decoder.close()?;
//! # Ok(())
//! # }
//! ```

mod error;
pub use error::*;

pub mod pixel_formats;
pub use pixel_formats::*;

pub mod image;
pub use image::*;

pub mod png;
