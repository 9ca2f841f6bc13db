//! Image to pixel buffer conversion.
//!
//! This crate turns in-memory images into freshly allocated, lockable pixel
//! buffers:
//!
//! - [`FilterImage::to_pixel_buffer`]: render a lazy filter graph into a
//!   32-bit BGRA buffer via a [`RenderContext`]
//! - [`Bitmap::to_pixel_buffer`]: draw a decoded bitmap into a buffer of the
//!   requested format via a [`BitmapContext`] (32-bit ARGB by default)
//! - [`PixelBuffer`]: shared, lockable pixel memory with scoped
//!   [`BaseAddress`] / [`BaseAddressMut`] guards
//! - [`PixelBufferAllocator`] / [`DefaultAllocator`]: allocation seam with
//!   optional [`ResourceLimits`]
//!
//! Conversions either return a fully drawn, unlocked buffer or `None`; the
//! `try_*` variants report the failing stage as a [`ConvertError`].
//!
//! ```
//! use zenpixbuf::{Bitmap, BitmapLayout, ConversionOptions, PixelFormat};
//!
//! let bitmap = Bitmap::new(vec![255u8; 4 * 4 * 4], 4, 4, 16, BitmapLayout::Rgba8).unwrap();
//! let buffer = bitmap.to_pixel_buffer(&ConversionOptions::default()).unwrap();
//! assert_eq!(buffer.pixel_format(), PixelFormat::ARGB32);
//! assert!(!buffer.is_locked());
//! ```

#![forbid(unsafe_code)]

mod allocator;
mod bitmap;
mod buffer;
mod color;
mod context;
mod convert;
mod filter;
mod format;
mod geometry;
mod limits;
mod render;

pub use allocator::{DefaultAllocator, PixelBufferAllocator};
pub use bitmap::{Bitmap, BitmapError, BitmapLayout};
pub use buffer::{
    BITMAP_CONTEXT_ROW_ALIGNMENT, BaseAddress, BaseAddressMut, BufferLayout, CvReturn,
    GPU_SURFACE_ROW_ALIGNMENT, PixelBuffer, PixelBufferAttributes,
};
pub use color::{ColorSpace, TransferFunction, convert_rgb, luminance};
pub use context::{AlphaLayout, BitmapContext, BitmapInfo, ByteOrder, ContextError};
pub use convert::{ConversionOptions, ConvertError, extent_pixel_size};
pub use filter::FilterImage;
pub use format::{ChannelOrder, PixelFormat};
pub use geometry::{AffineTransform, Point, Rect, Size};
pub use limits::{LimitExceeded, ResourceLimits};
pub use render::{RenderContext, RenderError};

// Re-exports for callers building bitmaps and cancellation tokens.
pub use enough::{Stop, Unstoppable};
pub use imgref::{Img, ImgRef, ImgVec};
pub use rgb;
pub use rgb::alt::BGRA as Bgra;
pub use rgb::{Rgb, Rgba};
