//! Fixed-resolution bitmap images.
//!
//! A [`Bitmap`] is an immutable, already-decoded image: 8 bits per
//! component, row-major, top row first. It can be built from raw bytes or
//! from typed `imgref` images of `rgb` pixels.

use core::fmt;
use std::sync::Arc;

use imgref::{ImgRef, ImgVec};
use rgb::alt::BGRA;
use rgb::{Rgb, Rgba};

use crate::color::{ColorSpace, from_u8};

/// Pixel layout of a bitmap's source bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum BitmapLayout {
    /// Red, green, blue.
    Rgb8,
    /// Red, green, blue, straight alpha.
    Rgba8,
    /// Red, green, blue, premultiplied alpha.
    RgbaPremultiplied8,
    /// Blue, green, red, straight alpha.
    Bgra8,
    /// Luminance.
    Gray8,
    /// Luminance, straight alpha.
    GrayAlpha8,
}

impl BitmapLayout {
    /// Bytes per pixel.
    #[inline]
    pub const fn bytes_per_pixel(self) -> usize {
        match self {
            Self::Rgb8 => 3,
            Self::Rgba8 | Self::RgbaPremultiplied8 | Self::Bgra8 => 4,
            Self::Gray8 => 1,
            Self::GrayAlpha8 => 2,
        }
    }
}

/// Errors from bitmap construction.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum BitmapError {
    /// Data slice is too small for the given dimensions and stride.
    InsufficientData,
    /// Stride is smaller than `width * bytes_per_pixel`.
    StrideTooSmall,
    /// Dimensions overflow the address space.
    InvalidDimensions,
}

impl fmt::Display for BitmapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InsufficientData => {
                write!(f, "data slice is too small for the given dimensions")
            }
            Self::StrideTooSmall => write!(f, "stride is smaller than width * bytes_per_pixel"),
            Self::InvalidDimensions => write!(f, "width or height causes overflow"),
        }
    }
}

impl std::error::Error for BitmapError {}

/// Immutable decoded image with integer dimensions.
///
/// Cloning shares the pixel data.
#[derive(Clone)]
pub struct Bitmap {
    data: Arc<[u8]>,
    width: u32,
    height: u32,
    stride: usize,
    layout: BitmapLayout,
    color_space: ColorSpace,
}

impl Bitmap {
    /// Wrap raw bytes. The color space defaults to device RGB, or device
    /// gray for gray layouts.
    ///
    /// Zero-sized bitmaps are allowed; converting one fails at allocation.
    ///
    /// # Errors
    ///
    /// Returns an error if the stride is too small for the width or the
    /// data does not cover `height` rows.
    pub fn new(
        data: impl Into<Arc<[u8]>>,
        width: u32,
        height: u32,
        stride: usize,
        layout: BitmapLayout,
    ) -> Result<Self, BitmapError> {
        let data = data.into();
        let min_stride = (width as usize)
            .checked_mul(layout.bytes_per_pixel())
            .ok_or(BitmapError::InvalidDimensions)?;
        if stride < min_stride {
            return Err(BitmapError::StrideTooSmall);
        }
        if height > 0 {
            let required = (height as usize - 1)
                .checked_mul(stride)
                .and_then(|v| v.checked_add(min_stride))
                .ok_or(BitmapError::InvalidDimensions)?;
            if data.len() < required {
                return Err(BitmapError::InsufficientData);
            }
        }
        let color_space = match layout {
            BitmapLayout::Gray8 | BitmapLayout::GrayAlpha8 => ColorSpace::DeviceGray,
            _ => ColorSpace::DeviceRgb,
        };
        Ok(Self {
            data,
            width,
            height,
            stride,
            layout,
            color_space,
        })
    }

    /// Tag the pixel values with a color space.
    pub fn with_color_space(mut self, color_space: ColorSpace) -> Self {
        self.color_space = color_space;
        self
    }

    /// Width in pixels.
    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels.
    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Byte stride between row starts.
    #[inline]
    pub fn stride(&self) -> usize {
        self.stride
    }

    #[inline]
    pub fn layout(&self) -> BitmapLayout {
        self.layout
    }

    #[inline]
    pub fn color_space(&self) -> ColorSpace {
        self.color_space
    }

    /// Source bytes of row `y` (no padding).
    ///
    /// # Panics
    ///
    /// Panics if `y >= height`.
    pub fn row(&self, y: u32) -> &[u8] {
        assert!(
            y < self.height,
            "row index {y} out of bounds (height: {})",
            self.height
        );
        let start = y as usize * self.stride;
        &self.data[start..start + self.width as usize * self.layout.bytes_per_pixel()]
    }

    /// Straight RGBA of pixel `(x, y)` in `0.0..=1.0`, y counted from the
    /// top row. Gray values are replicated across RGB.
    pub(crate) fn pixel(&self, x: u32, y: u32) -> [f32; 4] {
        let bpp = self.layout.bytes_per_pixel();
        let at = y as usize * self.stride + x as usize * bpp;
        let p = &self.data[at..at + bpp];
        match self.layout {
            BitmapLayout::Rgb8 => [from_u8(p[0]), from_u8(p[1]), from_u8(p[2]), 1.0],
            BitmapLayout::Rgba8 => [from_u8(p[0]), from_u8(p[1]), from_u8(p[2]), from_u8(p[3])],
            BitmapLayout::RgbaPremultiplied8 => {
                let a = from_u8(p[3]);
                if a == 0.0 {
                    [0.0, 0.0, 0.0, 0.0]
                } else {
                    [
                        (from_u8(p[0]) / a).min(1.0),
                        (from_u8(p[1]) / a).min(1.0),
                        (from_u8(p[2]) / a).min(1.0),
                        a,
                    ]
                }
            }
            BitmapLayout::Bgra8 => [from_u8(p[2]), from_u8(p[1]), from_u8(p[0]), from_u8(p[3])],
            BitmapLayout::Gray8 => {
                let v = from_u8(p[0]);
                [v, v, v, 1.0]
            }
            BitmapLayout::GrayAlpha8 => {
                let v = from_u8(p[0]);
                [v, v, v, from_u8(p[1])]
            }
        }
    }
}

impl fmt::Debug for Bitmap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Bitmap({}x{}, {:?} {:?})",
            self.width, self.height, self.layout, self.color_space
        )
    }
}

// ---------------------------------------------------------------------------
// imgref → Bitmap (always copies into tightly packed rows)
// ---------------------------------------------------------------------------

macro_rules! impl_from_imgref {
    ($pixel:ty, $layout:expr, |$p:ident| $bytes:expr) => {
        impl From<ImgRef<'_, $pixel>> for Bitmap {
            fn from(img: ImgRef<'_, $pixel>) -> Self {
                let width = img.width() as u32;
                let height = img.height() as u32;
                let layout: BitmapLayout = $layout;
                let mut data =
                    Vec::with_capacity(img.width() * img.height() * layout.bytes_per_pixel());
                for row in img.rows() {
                    for $p in row {
                        data.extend_from_slice(&$bytes);
                    }
                }
                Self {
                    data: data.into(),
                    width,
                    height,
                    stride: width as usize * layout.bytes_per_pixel(),
                    layout,
                    color_space: if matches!(layout, BitmapLayout::Gray8) {
                        ColorSpace::DeviceGray
                    } else {
                        ColorSpace::DeviceRgb
                    },
                }
            }
        }

        impl From<ImgVec<$pixel>> for Bitmap {
            fn from(img: ImgVec<$pixel>) -> Self {
                Self::from(img.as_ref())
            }
        }
    };
}

impl_from_imgref!(Rgb<u8>, BitmapLayout::Rgb8, |p| [p.r, p.g, p.b]);
impl_from_imgref!(Rgba<u8>, BitmapLayout::Rgba8, |p| [p.r, p.g, p.b, p.a]);
impl_from_imgref!(BGRA<u8>, BitmapLayout::Bgra8, |p| [p.b, p.g, p.r, p.a]);
impl_from_imgref!(u8, BitmapLayout::Gray8, |p| [*p]);
