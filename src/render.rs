//! Rendering filter images into pixel buffers.
//!
//! Unlike [`BitmapContext`](crate::BitmapContext), a [`RenderContext`]
//! manages buffer access itself: it takes the write lock, fills every row,
//! and releases the lock before returning.

use core::fmt;

use enough::{Stop, Unstoppable};

use crate::buffer::{CvReturn, PixelBuffer};
use crate::color::{ColorSpace, convert_rgb, to_u8};
use crate::filter::FilterImage;
use crate::format::{ChannelOrder, PixelFormat};
use crate::geometry::{Point, Rect};

/// Errors from [`RenderContext::render`].
#[derive(Clone, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum RenderError {
    /// The buffer's format cannot be rendered into.
    UnsupportedFormat(PixelFormat),
    /// The buffer could not be locked.
    Lock(CvReturn),
    /// The stop token fired between rows.
    Cancelled,
}

impl fmt::Display for RenderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnsupportedFormat(format) => write!(f, "cannot render into {format:?}"),
            Self::Lock(status) => write!(f, "render target unavailable: {status}"),
            Self::Cancelled => write!(f, "render cancelled"),
        }
    }
}

impl std::error::Error for RenderError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Lock(status) => Some(status),
            _ => None,
        }
    }
}

/// Renders [`FilterImage`]s into [`PixelBuffer`]s.
///
/// Output is premultiplied and sRGB-encoded, or luminance for gray buffers.
/// Supported formats: 32-bit BGRA, ARGB, ABGR, RGBA, 24-bit RGB and 8-bit gray.
pub struct RenderContext<'a> {
    stop: &'a (dyn Stop + Sync),
    output_color_space: ColorSpace,
}

impl Default for RenderContext<'static> {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderContext<'static> {
    /// Context with no cancellation and sRGB output.
    pub fn new() -> Self {
        Self {
            stop: &Unstoppable,
            output_color_space: ColorSpace::Srgb,
        }
    }
}

impl<'a> RenderContext<'a> {
    /// Set a cooperative cancellation token, checked before each row.
    ///
    /// The token must be shareable so one context can render on several
    /// threads.
    pub fn with_stop<'b>(self, stop: &'b (dyn Stop + Sync)) -> RenderContext<'b> {
        RenderContext {
            stop,
            output_color_space: self.output_color_space,
        }
    }

    /// Encode output in `color_space` instead of sRGB. Gray buffers always
    /// receive luminance.
    pub fn with_output_color_space(mut self, color_space: ColorSpace) -> Self {
        self.output_color_space = color_space;
        self
    }

    /// Whether `format` can be rendered into.
    pub fn supports(format: PixelFormat) -> bool {
        format.channel_order().is_some()
    }

    /// Render `image` into `buffer`.
    ///
    /// Buffer pixel `(col, row)` receives the sample at image point
    /// `(x0 + col + 0.5, y1 - row - 0.5)`, where `x0` is the extent's left
    /// edge and `y1` its top edge: row 0 is the top of the image. Images
    /// with an infinite extent are rendered from the origin.
    pub fn render(&self, image: &FilterImage, buffer: &PixelBuffer) -> Result<(), RenderError> {
        let format = buffer.pixel_format();
        let order = format
            .channel_order()
            .ok_or(RenderError::UnsupportedFormat(format))?;
        let extent = image.extent();
        let bounds = if extent.is_infinite() {
            Rect::new(0.0, 0.0, buffer.width() as f64, buffer.height() as f64)
        } else {
            Rect::new(
                extent.min_x(),
                extent.max_y() - buffer.height() as f64,
                buffer.width() as f64,
                buffer.height() as f64,
            )
        };
        let to_gray = order == ChannelOrder::Gray;
        let out_space = if to_gray {
            ColorSpace::DeviceGray
        } else {
            self.output_color_space
        };

        let mut base = buffer.lock_base_address().map_err(RenderError::Lock)?;
        let bpp = order.channels();
        for row in 0..buffer.height() {
            if self.stop.check().is_err() {
                tracing::debug!(row, "render cancelled");
                return Err(RenderError::Cancelled);
            }
            let y = bounds.max_y() - row as f64 - 0.5;
            let pixels = base.row_mut(row);
            for (col, px) in pixels.chunks_exact_mut(bpp).enumerate() {
                let p = Point::new(bounds.min_x() + col as f64 + 0.5, y);
                write_pixel(px, order, out_space, image.sample(p));
            }
        }
        Ok(())
    }
}

fn write_pixel(px: &mut [u8], order: ChannelOrder, space: ColorSpace, premul: [f32; 4]) {
    let a = premul[3];
    let rgb = if space == ColorSpace::Srgb || a <= 0.0 {
        [premul[0], premul[1], premul[2]]
    } else {
        let straight = [premul[0] / a, premul[1] / a, premul[2] / a];
        let c = convert_rgb(straight, ColorSpace::Srgb, space);
        [c[0] * a, c[1] * a, c[2] * a]
    };
    if let Some(idx) = order.rgb_indices() {
        px[idx[0]] = to_u8(rgb[0]);
        px[idx[1]] = to_u8(rgb[1]);
        px[idx[2]] = to_u8(rgb[2]);
    } else {
        // Gray buffers carry no alpha: composite over black.
        px[0] = to_u8(rgb[0]);
    }
    if let Some(i) = order.alpha_index() {
        px[i] = to_u8(a);
    }
}
