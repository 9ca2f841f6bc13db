//! Drawing into caller-locked memory.
//!
//! A [`BitmapContext`] binds to a mutable byte slice (typically a locked
//! [`PixelBuffer`](crate::PixelBuffer)) and draws [`Bitmap`]s into it with
//! source-over blending. Context space is y-up with the origin at the
//! bottom-left; memory row 0 is the top of the context.

use core::fmt;

use crate::bitmap::Bitmap;
use crate::buffer::BaseAddressMut;
use crate::color::{ColorSpace, convert_rgb, from_u8, to_u8};
use crate::geometry::Rect;

/// Where, and whether, alpha occupies space in each pixel.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum AlphaLayout {
    /// No alpha channel.
    None,
    /// Premultiplied alpha in the last component.
    PremultipliedLast,
    /// Premultiplied alpha in the first component.
    PremultipliedFirst,
    /// Straight alpha in the last component.
    Last,
    /// Straight alpha in the first component.
    First,
    /// Last component is padding.
    NoneSkipLast,
    /// First component is padding. The default for bitmap conversion.
    #[default]
    NoneSkipFirst,
    /// Alpha only, no color components.
    Only,
}

impl AlphaLayout {
    /// Whether this layout reserves a component for alpha or padding.
    #[inline]
    pub const fn has_extra_component(self) -> bool {
        !matches!(self, Self::None)
    }

    /// Whether the extra component comes before the color components.
    #[inline]
    pub const fn is_first(self) -> bool {
        matches!(
            self,
            Self::PremultipliedFirst | Self::First | Self::NoneSkipFirst
        )
    }

    /// Whether the extra component is padding rather than alpha.
    #[inline]
    pub const fn is_skip(self) -> bool {
        matches!(self, Self::NoneSkipFirst | Self::NoneSkipLast)
    }

    /// Whether color components are stored premultiplied by alpha.
    #[inline]
    pub const fn is_premultiplied(self) -> bool {
        matches!(self, Self::PremultipliedFirst | Self::PremultipliedLast)
    }
}

/// Component byte order of 32-bit pixels.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ByteOrder {
    /// Components in the order their layout names them.
    #[default]
    Default,
    /// 32-bit little-endian: the four bytes of each pixel are reversed.
    Little32,
}

/// Alpha layout and byte order of a context.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct BitmapInfo {
    pub alpha: AlphaLayout,
    pub byte_order: ByteOrder,
}

impl BitmapInfo {
    pub const fn new(alpha: AlphaLayout, byte_order: ByteOrder) -> Self {
        Self { alpha, byte_order }
    }
}

/// Reasons a context cannot be created over some memory.
#[derive(Clone, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum ContextError {
    /// Only 8 bits per component is supported.
    UnsupportedBitsPerComponent(usize),
    /// Color space / alpha layout pair that cannot be drawn into.
    UnsupportedLayout {
        color_space: Option<ColorSpace>,
        alpha: AlphaLayout,
    },
    /// `Little32` byte order on a pixel that is not 32 bits wide.
    UnsupportedByteOrder,
    /// The context's pixel size disagrees with the target buffer format.
    PixelSizeMismatch { context: usize, buffer: usize },
    /// Stride is smaller than `width * bytes_per_pixel`.
    StrideTooSmall,
    /// Memory does not cover `height` rows.
    InsufficientData,
}

impl fmt::Display for ContextError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnsupportedBitsPerComponent(bits) => {
                write!(f, "{bits} bits per component is not supported")
            }
            Self::UnsupportedLayout { color_space, alpha } => write!(
                f,
                "unsupported combination of {color_space:?} and {alpha:?}"
            ),
            Self::UnsupportedByteOrder => write!(f, "little-endian order needs 32-bit pixels"),
            Self::PixelSizeMismatch { context, buffer } => write!(
                f,
                "context pixels are {context} bytes but buffer pixels are {buffer} bytes"
            ),
            Self::StrideTooSmall => write!(f, "stride is smaller than width * bytes_per_pixel"),
            Self::InsufficientData => write!(f, "memory is too small for the given dimensions"),
        }
    }
}

impl std::error::Error for ContextError {}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Slot {
    R,
    G,
    B,
    A,
    Skip,
    Gray,
}

/// Per-pixel byte layout derived from the context parameters.
#[derive(Clone, Copy, Debug)]
struct PixelLayout {
    slots: [Slot; 4],
    len: usize,
    premultiplied: bool,
}

impl PixelLayout {
    fn resolve(
        color_space: Option<ColorSpace>,
        info: BitmapInfo,
    ) -> Result<Self, ContextError> {
        use AlphaLayout as A;
        let unsupported = || ContextError::UnsupportedLayout {
            color_space,
            alpha: info.alpha,
        };
        let mut layout = match (color_space, info.alpha) {
            (Some(cs), alpha) if cs.is_rgb() => {
                if !alpha.has_extra_component() {
                    return Err(unsupported());
                }
                let (extra, premultiplied) = if alpha.is_skip() {
                    (Slot::Skip, false)
                } else if alpha.is_premultiplied() {
                    (Slot::A, true)
                } else {
                    return Err(unsupported());
                };
                let slots = if alpha.is_first() {
                    [extra, Slot::R, Slot::G, Slot::B]
                } else {
                    [Slot::R, Slot::G, Slot::B, extra]
                };
                Self {
                    slots,
                    len: 4,
                    premultiplied,
                }
            }
            (Some(_), alpha) if !alpha.has_extra_component() => Self {
                slots: [Slot::Gray, Slot::Skip, Slot::Skip, Slot::Skip],
                len: 1,
                premultiplied: false,
            },
            (None, A::Only) => Self {
                slots: [Slot::A, Slot::Skip, Slot::Skip, Slot::Skip],
                len: 1,
                premultiplied: true,
            },
            _ => return Err(unsupported()),
        };
        if info.byte_order == ByteOrder::Little32 {
            if layout.len != 4 {
                return Err(ContextError::UnsupportedByteOrder);
            }
            layout.slots.reverse();
        }
        Ok(layout)
    }
}

/// Drawing target over borrowed, caller-locked memory.
pub struct BitmapContext<'a> {
    data: &'a mut [u8],
    width: u32,
    height: u32,
    bytes_per_row: usize,
    color_space: Option<ColorSpace>,
    info: BitmapInfo,
    pixel: PixelLayout,
}

impl<'a> BitmapContext<'a> {
    /// Bind a context to raw memory.
    ///
    /// Supported layouts, all at 8 bits per component:
    /// - RGB color spaces with `PremultipliedFirst`, `PremultipliedLast`,
    ///   `NoneSkipFirst` or `NoneSkipLast` (32 bits per pixel);
    /// - gray with `None` (8 bits per pixel);
    /// - no color space with `Only` (8 bits per pixel).
    ///
    /// # Errors
    ///
    /// Returns a [`ContextError`] for any other combination, a `Little32`
    /// byte order on 8-bit pixels, or memory that cannot hold the rows.
    pub fn new(
        data: &'a mut [u8],
        width: u32,
        height: u32,
        bits_per_component: usize,
        bytes_per_row: usize,
        color_space: Option<ColorSpace>,
        info: BitmapInfo,
    ) -> Result<Self, ContextError> {
        if bits_per_component != 8 {
            return Err(ContextError::UnsupportedBitsPerComponent(bits_per_component));
        }
        let pixel = PixelLayout::resolve(color_space, info)?;
        let min_stride = (width as usize)
            .checked_mul(pixel.len)
            .ok_or(ContextError::InsufficientData)?;
        if bytes_per_row < min_stride {
            return Err(ContextError::StrideTooSmall);
        }
        if height > 0 {
            let required = (height as usize - 1)
                .checked_mul(bytes_per_row)
                .and_then(|v| v.checked_add(min_stride))
                .ok_or(ContextError::InsufficientData)?;
            if data.len() < required {
                return Err(ContextError::InsufficientData);
            }
        }
        Ok(Self {
            data,
            width,
            height,
            bytes_per_row,
            color_space,
            info,
            pixel,
        })
    }

    /// Bind a context to a locked pixel buffer, using the buffer's own
    /// dimensions and stride.
    ///
    /// # Errors
    ///
    /// As [`BitmapContext::new`], plus [`ContextError::PixelSizeMismatch`]
    /// when the context's pixel size differs from the buffer format's.
    pub fn with_locked_buffer(
        base: &'a mut BaseAddressMut<'_>,
        color_space: Option<ColorSpace>,
        info: BitmapInfo,
    ) -> Result<Self, ContextError> {
        let layout = base.layout();
        let buffer_bpp = layout.pixel_format.bytes_per_pixel().unwrap_or(0);
        let pixel = PixelLayout::resolve(color_space, info)?;
        if pixel.len != buffer_bpp {
            return Err(ContextError::PixelSizeMismatch {
                context: pixel.len,
                buffer: buffer_bpp,
            });
        }
        Self::new(
            base.bytes_mut(),
            layout.width,
            layout.height,
            8,
            layout.bytes_per_row,
            color_space,
            info,
        )
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    pub fn bytes_per_row(&self) -> usize {
        self.bytes_per_row
    }

    /// Bytes per pixel of the context.
    #[inline]
    pub fn bytes_per_pixel(&self) -> usize {
        self.pixel.len
    }

    #[inline]
    pub fn color_space(&self) -> Option<ColorSpace> {
        self.color_space
    }

    #[inline]
    pub fn bitmap_info(&self) -> BitmapInfo {
        self.info
    }

    /// Full context bounds in context space.
    pub fn bounds(&self) -> Rect {
        Rect::new(0.0, 0.0, self.width as f64, self.height as f64)
    }

    /// Draw `image` scaled into `rect` (context space, y-up) with
    /// source-over blending. Sampling is nearest-neighbour.
    pub fn draw(&mut self, image: &Bitmap, rect: Rect) {
        if image.width() == 0 || image.height() == 0 || rect.is_empty() {
            return;
        }
        let sx = image.width() as f64 / rect.size.width;
        let sy = image.height() as f64 / rect.size.height;
        let from = image.color_space();
        let to = self.color_space.unwrap_or(from);
        let len = self.pixel.len;
        for row in 0..self.height {
            let cy = self.height as f64 - row as f64 - 0.5;
            if cy < rect.min_y() || cy >= rect.max_y() {
                continue;
            }
            // Bitmap rows run top-down.
            let src_y = (((rect.max_y() - cy) * sy) as u32).min(image.height() - 1);
            let row_start = row as usize * self.bytes_per_row;
            for col in 0..self.width {
                let cx = col as f64 + 0.5;
                if cx < rect.min_x() || cx >= rect.max_x() {
                    continue;
                }
                let src_x = (((cx - rect.min_x()) * sx) as u32).min(image.width() - 1);
                let src = image.pixel(src_x, src_y);
                let rgb = convert_rgb([src[0], src[1], src[2]], from, to);
                let at = row_start + col as usize * len;
                let dst = &mut self.data[at..at + len];
                blend_over(dst, &self.pixel, [rgb[0], rgb[1], rgb[2], src[3]]);
            }
        }
    }
}

/// Source-over composite of a straight RGBA color into one pixel.
fn blend_over(dst: &mut [u8], pixel: &PixelLayout, src: [f32; 4]) {
    let a = src[3];
    let inv = 1.0 - a;
    let opaque_target = !pixel.slots[..pixel.len].contains(&Slot::A);
    let dst_a = if opaque_target {
        1.0
    } else {
        read_slot(dst, pixel, Slot::A).unwrap_or(1.0)
    };
    let out_a = a + dst_a * inv;
    for (i, slot) in pixel.slots[..pixel.len].iter().enumerate() {
        let src_c = match slot {
            Slot::R => src[0],
            Slot::G => src[1],
            Slot::B => src[2],
            // Already converted into the gray space, so channels are equal.
            Slot::Gray => src[0],
            Slot::A => {
                dst[i] = to_u8(out_a);
                continue;
            }
            Slot::Skip => {
                dst[i] = 0xFF;
                continue;
            }
        };
        // Destination color is stored premultiplied when alpha is present,
        // and as an opaque value otherwise; both blend the same way.
        let dst_c = from_u8(dst[i]);
        let premul = src_c * a + dst_c * inv;
        dst[i] = to_u8(if pixel.premultiplied || opaque_target {
            premul
        } else if out_a > 0.0 {
            premul / out_a
        } else {
            0.0
        });
    }
}

fn read_slot(dst: &[u8], pixel: &PixelLayout, want: Slot) -> Option<f32> {
    pixel.slots[..pixel.len]
        .iter()
        .position(|s| *s == want)
        .map(|i| from_u8(dst[i]))
}
