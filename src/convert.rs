//! Image → pixel buffer conversion.
//!
//! Two independent paths share only the allocate, draw, return shape:
//!
//! - [`FilterImage::to_pixel_buffer`] allocates a 32-bit BGRA buffer and lets
//!   a [`RenderContext`] draw into it; the context manages buffer access.
//! - [`Bitmap::to_pixel_buffer`] allocates a buffer of the requested format,
//!   locks it, binds a [`BitmapContext`] to the locked memory and draws.
//!
//! Either path yields a fully drawn, unlocked buffer or nothing. The `try_*`
//! variants report which stage failed.

use core::fmt;

use crate::allocator::{DefaultAllocator, PixelBufferAllocator};
use crate::bitmap::Bitmap;
use crate::buffer::{CvReturn, PixelBuffer, PixelBufferAttributes};
use crate::color::ColorSpace;
use crate::context::{AlphaLayout, BitmapContext, BitmapInfo, ByteOrder, ContextError};
use crate::filter::FilterImage;
use crate::format::PixelFormat;
use crate::geometry::Rect;
use crate::render::{RenderContext, RenderError};

/// Why a conversion produced no buffer.
#[derive(Clone, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConvertError {
    /// The buffer could not be created.
    Allocation(CvReturn),
    /// The buffer memory could not be locked for writing.
    Lock(CvReturn),
    /// No drawing context could be bound to the buffer.
    Context(ContextError),
    /// The filter image could not be rendered.
    Render(RenderError),
}

impl fmt::Display for ConvertError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Allocation(status) => write!(f, "buffer allocation failed: {status}"),
            Self::Lock(status) => write!(f, "buffer lock failed: {status}"),
            Self::Context(e) => write!(f, "drawing context failed: {e}"),
            Self::Render(e) => write!(f, "render failed: {e}"),
        }
    }
}

impl std::error::Error for ConvertError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Allocation(status) | Self::Lock(status) => Some(status),
            Self::Context(e) => Some(e),
            Self::Render(e) => Some(e),
        }
    }
}

/// Target format of a bitmap conversion.
///
/// Defaults: 32-bit ARGB, device RGB, `NoneSkipFirst`, default byte order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConversionOptions {
    pub pixel_format: PixelFormat,
    /// `None` draws without a color space (only valid with [`AlphaLayout::Only`]).
    pub color_space: Option<ColorSpace>,
    pub alpha_layout: AlphaLayout,
    pub byte_order: ByteOrder,
}

impl Default for ConversionOptions {
    fn default() -> Self {
        Self {
            pixel_format: PixelFormat::ARGB32,
            color_space: Some(ColorSpace::DeviceRgb),
            alpha_layout: AlphaLayout::NoneSkipFirst,
            byte_order: ByteOrder::Default,
        }
    }
}

impl ConversionOptions {
    /// Default options: ARGB32, device RGB, `NoneSkipFirst`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the pixel format of the allocated buffer.
    pub fn with_pixel_format(mut self, pixel_format: PixelFormat) -> Self {
        self.pixel_format = pixel_format;
        self
    }

    /// Set the color space of the drawing context. Pixels are converted
    /// into it from the bitmap's own color space.
    pub fn with_color_space(mut self, color_space: Option<ColorSpace>) -> Self {
        self.color_space = color_space;
        self
    }

    /// Set where alpha or padding sits in each pixel.
    pub fn with_alpha_layout(mut self, alpha_layout: AlphaLayout) -> Self {
        self.alpha_layout = alpha_layout;
        self
    }

    /// Set the byte order of 32-bit pixels.
    pub fn with_byte_order(mut self, byte_order: ByteOrder) -> Self {
        self.byte_order = byte_order;
        self
    }

    /// Options producing `B, G, R, A` premultiplied bytes in a BGRA buffer.
    pub fn bgra() -> Self {
        Self::default()
            .with_pixel_format(PixelFormat::BGRA32)
            .with_alpha_layout(AlphaLayout::PremultipliedFirst)
            .with_byte_order(ByteOrder::Little32)
    }

    fn bitmap_info(&self) -> BitmapInfo {
        BitmapInfo::new(self.alpha_layout, self.byte_order)
    }
}

/// Integer pixel size of an extent, truncating fractional parts.
///
/// Infinite, non-finite, negative and oversized extents have no pixel size.
pub fn extent_pixel_size(extent: &Rect) -> Result<(u32, u32), CvReturn> {
    if extent.is_infinite() {
        return Err(CvReturn::InvalidSize);
    }
    let to_px = |v: f64| {
        if v.is_finite() && v >= 0.0 && v < u32::MAX as f64 + 1.0 {
            Ok(v.trunc() as u32)
        } else {
            Err(CvReturn::InvalidSize)
        }
    };
    Ok((to_px(extent.size.width)?, to_px(extent.size.height)?))
}

impl FilterImage {
    /// Render into a new 32-bit BGRA buffer the size of the extent.
    ///
    /// Returns `None` if the buffer cannot be allocated (including empty or
    /// infinite extents) or the render fails.
    ///
    /// The default allocator has no size cap. For extents derived from
    /// untrusted input, use [`try_to_pixel_buffer_with`](Self::try_to_pixel_buffer_with)
    /// and a [`DefaultAllocator::with_limits`] allocator.
    pub fn to_pixel_buffer(&self) -> Option<PixelBuffer> {
        self.try_to_pixel_buffer().ok()
    }

    /// [`to_pixel_buffer`](Self::to_pixel_buffer) with the failure reason.
    pub fn try_to_pixel_buffer(&self) -> Result<PixelBuffer, ConvertError> {
        self.try_to_pixel_buffer_with(&RenderContext::new(), &DefaultAllocator::new())
    }

    /// Render with a caller-provided context and allocator.
    pub fn try_to_pixel_buffer_with(
        &self,
        context: &RenderContext<'_>,
        allocator: &dyn PixelBufferAllocator,
    ) -> Result<PixelBuffer, ConvertError> {
        let extent = self.extent();
        let (width, height) = extent_pixel_size(&extent).map_err(|status| {
            tracing::debug!(?extent, %status, "filter image has no pixel size");
            ConvertError::Allocation(status)
        })?;
        let buffer = allocator
            .create_pixel_buffer(
                width,
                height,
                PixelFormat::BGRA32,
                &PixelBufferAttributes::compatible(),
            )
            .map_err(|status| {
                tracing::debug!(width, height, %status, "pixel buffer allocation failed");
                ConvertError::Allocation(status)
            })?;
        context.render(self, &buffer).map_err(|e| {
            tracing::debug!(error = %e, "filter image render failed");
            ConvertError::Render(e)
        })?;
        Ok(buffer)
    }
}

impl Bitmap {
    /// Draw into a new buffer of `options.pixel_format`, the bitmap's size.
    ///
    /// Returns `None` if allocation, locking or context creation fails. The
    /// returned buffer is never left locked.
    ///
    /// Like [`FilterImage::to_pixel_buffer`], this uses an uncapped
    /// allocator; pass a limited one to
    /// [`try_to_pixel_buffer_with`](Self::try_to_pixel_buffer_with) for
    /// untrusted dimensions.
    pub fn to_pixel_buffer(&self, options: &ConversionOptions) -> Option<PixelBuffer> {
        self.try_to_pixel_buffer(options).ok()
    }

    /// [`to_pixel_buffer`](Self::to_pixel_buffer) with the failure reason.
    pub fn try_to_pixel_buffer(
        &self,
        options: &ConversionOptions,
    ) -> Result<PixelBuffer, ConvertError> {
        self.try_to_pixel_buffer_with(options, &DefaultAllocator::new())
    }

    /// Convert using a caller-provided allocator.
    pub fn try_to_pixel_buffer_with(
        &self,
        options: &ConversionOptions,
        allocator: &dyn PixelBufferAllocator,
    ) -> Result<PixelBuffer, ConvertError> {
        let (width, height) = (self.width(), self.height());
        let buffer = allocator
            .create_pixel_buffer(
                width,
                height,
                options.pixel_format,
                &PixelBufferAttributes::compatible(),
            )
            .map_err(|status| {
                tracing::debug!(
                    width,
                    height,
                    format = ?options.pixel_format,
                    %status,
                    "pixel buffer allocation failed"
                );
                ConvertError::Allocation(status)
            })?;
        {
            let mut base = buffer.lock_base_address().map_err(|status| {
                tracing::debug!(%status, "pixel buffer lock failed");
                ConvertError::Lock(status)
            })?;
            let mut context = BitmapContext::with_locked_buffer(
                &mut base,
                options.color_space,
                options.bitmap_info(),
            )
            .map_err(|e| {
                tracing::debug!(error = %e, ?options, "bitmap context creation failed");
                ConvertError::Context(e)
            })?;
            let bounds = context.bounds();
            context.draw(self, bounds);
        }
        Ok(buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitmap::BitmapLayout;
    use crate::limits::{LimitExceeded, ResourceLimits};
    use imgref::ImgVec;
    use rgb::Rgba;

    fn gradient_bitmap(w: u32, h: u32) -> Bitmap {
        let pixels: Vec<Rgba<u8>> = (0..w * h)
            .map(|i| Rgba {
                r: (i % 251) as u8,
                g: (i / w) as u8,
                b: 200,
                a: 255,
            })
            .collect();
        Bitmap::from(ImgVec::new(pixels, w as usize, h as usize))
    }

    fn compatible_buffer(width: u32, height: u32, format: PixelFormat) -> PixelBuffer {
        PixelBuffer::new(width, height, format, &PixelBufferAttributes::compatible()).unwrap()
    }

    /// Hands out a buffer whose memory is already locked through a clone.
    struct HeldAllocator {
        buffer: PixelBuffer,
    }

    impl PixelBufferAllocator for HeldAllocator {
        fn create_pixel_buffer(
            &self,
            _width: u32,
            _height: u32,
            _pixel_format: PixelFormat,
            _attributes: &PixelBufferAttributes,
        ) -> Result<PixelBuffer, CvReturn> {
            Ok(self.buffer.clone())
        }
    }

    // --- bitmap path ---

    #[test]
    fn bitmap_default_options() {
        let bmp = gradient_bitmap(100, 50);
        let buf = bmp.to_pixel_buffer(&ConversionOptions::default()).unwrap();
        assert_eq!(buf.width(), 100);
        assert_eq!(buf.height(), 50);
        assert_eq!(buf.pixel_format(), PixelFormat::ARGB32);
        assert!(buf.bytes_per_row() >= 400);
        assert!(!buf.is_locked());

        // NoneSkipFirst: padding byte first, then R, G, B.
        let base = buf.lock_base_address().unwrap();
        assert_eq!(&base.row(0)[..8], &[0xFF, 0, 0, 200, 0xFF, 1, 0, 200]);
        assert_eq!(&base.row(49)[..4], &[0xFF, (4900 % 251) as u8, 49, 200]);
    }

    #[test]
    fn default_options_match_contract() {
        let opts = ConversionOptions::default();
        assert_eq!(opts.pixel_format, PixelFormat::ARGB32);
        assert_eq!(opts.color_space, Some(ColorSpace::DeviceRgb));
        assert_eq!(opts.alpha_layout, AlphaLayout::NoneSkipFirst);
        assert_eq!(opts.byte_order, ByteOrder::Default);
    }

    #[test]
    fn bitmap_to_bgra() {
        let bmp = Bitmap::new(vec![10u8, 20, 30, 255], 1, 1, 4, BitmapLayout::Rgba8).unwrap();
        let buf = bmp.to_pixel_buffer(&ConversionOptions::bgra()).unwrap();
        assert_eq!(buf.pixel_format(), PixelFormat::BGRA32);
        let base = buf.lock_base_address_read_only().unwrap();
        assert_eq!(base.row(0), &[30, 20, 10, 255]);
    }

    #[test]
    fn bitmap_to_gray() {
        let bmp = Bitmap::new(vec![255u8, 255, 255], 1, 1, 3, BitmapLayout::Rgb8).unwrap();
        let opts = ConversionOptions::default()
            .with_pixel_format(PixelFormat::GRAY8)
            .with_color_space(Some(ColorSpace::DeviceGray))
            .with_alpha_layout(AlphaLayout::None);
        let buf = bmp.to_pixel_buffer(&opts).unwrap();
        assert_eq!(buf.lock_base_address().unwrap().row(0), &[255]);
    }

    #[test]
    fn invalid_format_fails_allocation() {
        let bmp = gradient_bitmap(4, 4);
        let opts =
            ConversionOptions::default().with_pixel_format(PixelFormat::from_code(0xDEAD_BEEF));
        assert!(bmp.to_pixel_buffer(&opts).is_none());
        assert_eq!(
            bmp.try_to_pixel_buffer(&opts).unwrap_err(),
            ConvertError::Allocation(CvReturn::InvalidPixelFormat)
        );
    }

    #[test]
    fn zero_sized_bitmap_fails_allocation() {
        let bmp = Bitmap::new(Vec::<u8>::new(), 0, 10, 0, BitmapLayout::Rgba8).unwrap();
        assert_eq!(
            bmp.try_to_pixel_buffer(&ConversionOptions::default()).unwrap_err(),
            ConvertError::Allocation(CvReturn::InvalidSize)
        );
    }

    #[test]
    fn unsupported_alpha_layout_fails_context() {
        let bmp = gradient_bitmap(4, 4);
        let opts = ConversionOptions::default().with_alpha_layout(AlphaLayout::Last);
        let err = bmp.try_to_pixel_buffer(&opts).unwrap_err();
        assert!(matches!(err, ConvertError::Context(ContextError::UnsupportedLayout { .. })));
    }

    #[test]
    fn context_pixel_size_must_match_format() {
        let bmp = gradient_bitmap(4, 4);
        let opts = ConversionOptions::default().with_pixel_format(PixelFormat::RGB24);
        assert_eq!(
            bmp.try_to_pixel_buffer(&opts).unwrap_err(),
            ConvertError::Context(ContextError::PixelSizeMismatch {
                context: 4,
                buffer: 3
            })
        );
    }

    #[test]
    fn context_failure_leaves_nothing_locked() {
        let target = compatible_buffer(4, 4, PixelFormat::ARGB32);
        let allocator = HeldAllocator {
            buffer: target.clone(),
        };
        let opts = ConversionOptions::default().with_alpha_layout(AlphaLayout::First);
        let err = gradient_bitmap(4, 4)
            .try_to_pixel_buffer_with(&opts, &allocator)
            .unwrap_err();
        assert!(matches!(err, ConvertError::Context(_)));
        assert!(!target.is_locked());
        assert!(target.lock_base_address().is_ok());
    }

    #[test]
    fn lock_failure_yields_nothing() {
        let target = compatible_buffer(4, 4, PixelFormat::ARGB32);
        let allocator = HeldAllocator {
            buffer: target.clone(),
        };
        {
            let _reader = target.lock_base_address_read_only().unwrap();
            let err = gradient_bitmap(4, 4)
                .try_to_pixel_buffer_with(&ConversionOptions::default(), &allocator)
                .unwrap_err();
            assert_eq!(err, ConvertError::Lock(CvReturn::Locked));
        }
        assert!(!target.is_locked());
    }

    #[test]
    fn allocator_limits_apply() {
        let allocator =
            DefaultAllocator::new().with_limits(ResourceLimits::none().with_max_pixels(100));
        let err = gradient_bitmap(20, 20)
            .try_to_pixel_buffer_with(&ConversionOptions::default(), &allocator)
            .unwrap_err();
        assert_eq!(
            err,
            ConvertError::Allocation(CvReturn::ResourceLimit(LimitExceeded::Pixels {
                actual: 400,
                max: 100
            }))
        );
    }

    #[test]
    fn bitmap_conversion_is_repeatable() {
        let bmp = gradient_bitmap(17, 9);
        let a = bmp.to_pixel_buffer(&ConversionOptions::default()).unwrap();
        let b = bmp.to_pixel_buffer(&ConversionOptions::default()).unwrap();
        assert!(!a.ptr_eq(&b));
        assert_eq!((a.width(), a.height()), (b.width(), b.height()));
        let la = a.lock_base_address_read_only().unwrap();
        let lb = b.lock_base_address_read_only().unwrap();
        assert_eq!(la.bytes(), lb.bytes());
    }

    // --- filter image path ---

    #[test]
    fn filter_image_to_bgra() {
        let img = FilterImage::color(Rgba {
            r: 0.0,
            g: 0.0,
            b: 1.0,
            a: 1.0,
        })
        .cropped(Rect::new(0.0, 0.0, 64.0, 32.0));
        let buf = img.to_pixel_buffer().unwrap();
        assert_eq!(buf.pixel_format(), PixelFormat::BGRA32);
        assert_eq!((buf.width(), buf.height()), (64, 32));
        assert!(buf.attributes().gpu_surface_compatible);
        assert!(!buf.is_locked());
        let base = buf.lock_base_address().unwrap();
        assert_eq!(&base.row(31)[..4], &[255, 0, 0, 255]);
    }

    #[test]
    fn fractional_extent_truncates() {
        let img = FilterImage::color(Rgba {
            r: 1.0,
            g: 1.0,
            b: 1.0,
            a: 1.0,
        })
        .cropped(Rect::new(0.25, 0.0, 10.9, 3.5));
        let buf = img.to_pixel_buffer().unwrap();
        assert_eq!((buf.width(), buf.height()), (10, 3));
    }

    #[test]
    fn unbounded_or_empty_extents_fail() {
        let infinite = FilterImage::color(Rgba {
            r: 1.0,
            g: 0.0,
            b: 0.0,
            a: 1.0,
        });
        assert_eq!(
            infinite.try_to_pixel_buffer().unwrap_err(),
            ConvertError::Allocation(CvReturn::InvalidSize)
        );
        let empty = infinite.cropped(Rect::new(0.0, 0.0, 0.0, 5.0));
        assert!(empty.to_pixel_buffer().is_none());
        let sub_pixel = infinite.cropped(Rect::new(0.0, 0.0, 0.5, 5.0));
        assert_eq!(
            sub_pixel.try_to_pixel_buffer().unwrap_err(),
            ConvertError::Allocation(CvReturn::InvalidSize)
        );
    }

    #[test]
    fn extent_pixel_size_rules() {
        assert_eq!(extent_pixel_size(&Rect::new(0.0, 0.0, 3.99, 2.0)), Ok((3, 2)));
        assert_eq!(
            extent_pixel_size(&Rect::new(0.0, 0.0, f64::NAN, 2.0)),
            Err(CvReturn::InvalidSize)
        );
        assert_eq!(
            extent_pixel_size(&Rect::new(0.0, 0.0, -1.0, 2.0)),
            Err(CvReturn::InvalidSize)
        );
        assert_eq!(
            extent_pixel_size(&Rect::new(0.0, 0.0, 1e12, 2.0)),
            Err(CvReturn::InvalidSize)
        );
    }

    #[test]
    fn filter_render_into_locked_buffer_fails() {
        let target = compatible_buffer(2, 2, PixelFormat::BGRA32);
        let allocator = HeldAllocator {
            buffer: target.clone(),
        };
        let img = FilterImage::from_bitmap(gradient_bitmap(2, 2));
        let guard = target.lock_base_address().unwrap();
        let err = img
            .try_to_pixel_buffer_with(&RenderContext::new(), &allocator)
            .unwrap_err();
        assert_eq!(err, ConvertError::Render(RenderError::Lock(CvReturn::Locked)));
        drop(guard);
        assert!(!target.is_locked());
    }

    #[test]
    fn bitmap_backed_filter_image_round_trips_pixels() {
        let bmp = Bitmap::new(
            vec![255u8, 0, 0, 255, 0, 255, 0, 255, 0, 0, 255, 255, 255, 255, 255, 255],
            2,
            2,
            8,
            BitmapLayout::Rgba8,
        )
        .unwrap();
        let buf = FilterImage::from(bmp).to_pixel_buffer().unwrap();
        let base = buf.lock_base_address_read_only().unwrap();
        assert_eq!(base.row(0), &[0, 0, 255, 255, 0, 255, 0, 255]);
        assert_eq!(base.row(1), &[255, 0, 0, 255, 255, 255, 255, 255]);
    }

    #[test]
    fn conversions_request_compatible_memory() {
        let img = FilterImage::color(Rgba {
            r: 1.0,
            g: 1.0,
            b: 1.0,
            a: 1.0,
        })
        .cropped(Rect::new(0.0, 0.0, 3.0, 2.0));
        let from_filter = img.to_pixel_buffer().unwrap();
        let from_bitmap = gradient_bitmap(3, 2)
            .to_pixel_buffer(&ConversionOptions::default())
            .unwrap();
        for buf in [from_filter, from_bitmap] {
            let attrs = buf.attributes();
            assert!(attrs.image_compatible);
            assert!(attrs.bitmap_context_compatible);
            assert!(attrs.gpu_surface_compatible);
            assert_eq!(buf.bytes_per_row(), 64);
        }
    }

    #[test]
    fn memory_cap_rejects_huge_extents_before_allocating() {
        let img = FilterImage::color(Rgba {
            r: 1.0,
            g: 0.0,
            b: 0.0,
            a: 1.0,
        })
        .cropped(Rect::new(0.0, 0.0, 100_000.0, 100_000.0));
        let allocator =
            DefaultAllocator::new().with_limits(ResourceLimits::none().with_max_memory(1 << 28));
        let err = img
            .try_to_pixel_buffer_with(&RenderContext::new(), &allocator)
            .unwrap_err();
        assert_eq!(
            err,
            ConvertError::Allocation(CvReturn::ResourceLimit(LimitExceeded::Memory {
                actual: 40_000_000_000,
                max: 1 << 28
            }))
        );
    }

    #[test]
    fn conversion_types_are_thread_safe() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<PixelBuffer>();
        assert_send_sync::<Bitmap>();
        assert_send_sync::<FilterImage>();
        assert_send_sync::<RenderContext<'static>>();
        assert_send_sync::<ConversionOptions>();
        assert_send_sync::<DefaultAllocator>();
    }

    #[test]
    fn one_render_context_serves_many_threads() {
        use rayon::prelude::*;

        let img = FilterImage::from_bitmap(gradient_bitmap(8, 8));
        let context = RenderContext::new();
        let sizes: Vec<(u32, u32)> = (0..4)
            .into_par_iter()
            .map(|_| {
                let buf = img
                    .try_to_pixel_buffer_with(&context, &DefaultAllocator::new())
                    .unwrap();
                (buf.width(), buf.height())
            })
            .collect();
        assert!(sizes.iter().all(|&s| s == (8, 8)));
    }

    #[test]
    fn concurrent_conversions_are_independent() {
        use rayon::prelude::*;

        let bmp = gradient_bitmap(32, 16);
        let img = FilterImage::from_bitmap(bmp.clone()).translated(3.0, 4.0);
        let buffers: Vec<(PixelBuffer, PixelBuffer)> = (0..8)
            .into_par_iter()
            .map(|_| {
                (
                    bmp.to_pixel_buffer(&ConversionOptions::default()).unwrap(),
                    img.to_pixel_buffer().unwrap(),
                )
            })
            .collect();
        let (first_bitmap, first_filter) = &buffers[0];
        let expected_bitmap = first_bitmap.lock_base_address_read_only().unwrap().bytes().to_vec();
        let expected_filter = first_filter.lock_base_address_read_only().unwrap().bytes().to_vec();
        for (a, b) in &buffers[1..] {
            assert!(!a.ptr_eq(first_bitmap));
            assert!(!b.ptr_eq(first_filter));
            assert_eq!(a.lock_base_address_read_only().unwrap().bytes(), &expected_bitmap[..]);
            assert_eq!(b.lock_base_address_read_only().unwrap().bytes(), &expected_filter[..]);
        }
    }
}
