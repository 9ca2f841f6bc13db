//! Color spaces for drawing and rendering.
//!
//! All conversions operate on straight (unassociated) component values in
//! `0.0..=1.0`. Device RGB is treated as sRGB, which is what display
//! pipelines hand us in practice.

/// Color space of a bitmap or drawing target.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ColorSpace {
    /// Device-native RGB. The default target for bitmap conversion.
    #[default]
    DeviceRgb,
    /// sRGB (IEC 61966-2-1).
    Srgb,
    /// sRGB primaries with a linear (gamma 1.0) transfer.
    LinearSrgb,
    /// Device-native single-channel gray.
    DeviceGray,
}

/// Electro-optical transfer function of a color space.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum TransferFunction {
    /// Linear light (gamma 1.0).
    Linear,
    /// sRGB transfer curve.
    Srgb,
}

impl TransferFunction {
    /// Encoded value to linear light.
    #[inline]
    pub fn to_linear(self, v: f32) -> f32 {
        match self {
            Self::Linear => v,
            Self::Srgb => srgb_to_linear(v),
        }
    }

    /// Linear light to encoded value.
    #[inline]
    pub fn from_linear(self, v: f32) -> f32 {
        match self {
            Self::Linear => v,
            Self::Srgb => linear_to_srgb(v),
        }
    }
}

impl ColorSpace {
    /// Number of color components (alpha excluded).
    #[inline]
    pub const fn components(self) -> usize {
        match self {
            Self::DeviceGray => 1,
            Self::DeviceRgb | Self::Srgb | Self::LinearSrgb => 3,
        }
    }

    /// Whether this is an RGB model.
    #[inline]
    pub const fn is_rgb(self) -> bool {
        self.components() == 3
    }

    /// Transfer function of the encoded values.
    #[inline]
    pub const fn transfer(self) -> TransferFunction {
        match self {
            Self::LinearSrgb => TransferFunction::Linear,
            Self::DeviceRgb | Self::Srgb | Self::DeviceGray => TransferFunction::Srgb,
        }
    }
}

/// Convert a straight RGB triple between color spaces.
///
/// Gray spaces carry their value replicated across the triple: converting
/// into gray yields `[luma, luma, luma]`.
pub fn convert_rgb(rgb: [f32; 3], from: ColorSpace, to: ColorSpace) -> [f32; 3] {
    if from == to {
        return rgb;
    }
    let src = from.transfer();
    let mut linear = [
        src.to_linear(rgb[0]),
        src.to_linear(rgb[1]),
        src.to_linear(rgb[2]),
    ];
    if !to.is_rgb() && from.is_rgb() {
        let y = luminance(linear);
        linear = [y, y, y];
    }
    let dst = to.transfer();
    [
        dst.from_linear(linear[0]),
        dst.from_linear(linear[1]),
        dst.from_linear(linear[2]),
    ]
}

/// Rec. 709 relative luminance of linear RGB.
#[inline]
pub fn luminance(linear: [f32; 3]) -> f32 {
    0.2126 * linear[0] + 0.7152 * linear[1] + 0.0722 * linear[2]
}

pub(crate) fn srgb_to_linear(v: f32) -> f32 {
    if v <= 0.04045 {
        v / 12.92
    } else {
        ((v + 0.055) / 1.055).powf(2.4)
    }
}

pub(crate) fn linear_to_srgb(v: f32) -> f32 {
    if v <= 0.003_130_8 {
        v * 12.92
    } else {
        1.055 * v.powf(1.0 / 2.4) - 0.055
    }
}

/// Quantize a `0.0..=1.0` value to a byte.
#[inline]
pub(crate) fn to_u8(v: f32) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0).round() as u8
}

/// Expand a byte to `0.0..=1.0`.
#[inline]
pub(crate) fn from_u8(v: u8) -> f32 {
    v as f32 / 255.0
}
