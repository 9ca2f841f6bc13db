//! Pixel format tags.
//!
//! A [`PixelFormat`] is a 32-bit code in the four-character style used by
//! platform pixel-buffer APIs (`'BGRA'`, `'L008'`, and the legacy small
//! integer codes for 24-bit RGB and 32-bit ARGB). Unknown codes are
//! representable so that allocation can reject them with a status code
//! instead of a panic.

use core::fmt;

/// Order of the components inside one pixel, as laid out in memory.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ChannelOrder {
    /// Alpha, red, green, blue.
    Argb,
    /// Blue, green, red, alpha.
    Bgra,
    /// Alpha, blue, green, red.
    Abgr,
    /// Red, green, blue, alpha.
    Rgba,
    /// Red, green, blue (no alpha).
    Rgb,
    /// Single luminance channel.
    Gray,
}

impl ChannelOrder {
    /// Number of 8-bit components per pixel.
    #[inline]
    pub const fn channels(self) -> usize {
        match self {
            Self::Argb | Self::Bgra | Self::Abgr | Self::Rgba => 4,
            Self::Rgb => 3,
            Self::Gray => 1,
        }
    }

    /// Byte index of the alpha component, if any.
    #[inline]
    pub const fn alpha_index(self) -> Option<usize> {
        match self {
            Self::Argb | Self::Abgr => Some(0),
            Self::Bgra | Self::Rgba => Some(3),
            Self::Rgb | Self::Gray => None,
        }
    }

    /// Byte indices of the red, green and blue components, if any.
    #[inline]
    pub const fn rgb_indices(self) -> Option<[usize; 3]> {
        match self {
            Self::Argb => Some([1, 2, 3]),
            Self::Bgra => Some([2, 1, 0]),
            Self::Abgr => Some([3, 2, 1]),
            Self::Rgba | Self::Rgb => Some([0, 1, 2]),
            Self::Gray => None,
        }
    }
}

/// Pixel format code of a [`PixelBuffer`](crate::PixelBuffer).
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct PixelFormat(u32);

impl PixelFormat {
    /// 24-bit RGB, 8 bits per component.
    pub const RGB24: Self = Self(0x0000_0018);
    /// 32-bit ARGB, 8 bits per component. Default target for bitmaps.
    pub const ARGB32: Self = Self(0x0000_0020);
    /// 32-bit BGRA, 8 bits per component. Target for filter images.
    pub const BGRA32: Self = Self::from_four_cc(*b"BGRA");
    /// 32-bit ABGR, 8 bits per component.
    pub const ABGR32: Self = Self::from_four_cc(*b"ABGR");
    /// 32-bit RGBA, 8 bits per component.
    pub const RGBA32: Self = Self::from_four_cc(*b"RGBA");
    /// 8-bit single-component luminance.
    pub const GRAY8: Self = Self::from_four_cc(*b"L008");

    /// Wrap a raw format code. Unknown codes are accepted here and
    /// rejected at allocation time.
    #[inline]
    pub const fn from_code(code: u32) -> Self {
        Self(code)
    }

    /// Build a code from four ASCII characters, most significant first.
    #[inline]
    pub const fn from_four_cc(cc: [u8; 4]) -> Self {
        Self(u32::from_be_bytes(cc))
    }

    /// Raw format code.
    #[inline]
    pub const fn code(self) -> u32 {
        self.0
    }

    /// The code as four bytes, most significant first.
    #[inline]
    pub const fn four_cc(self) -> [u8; 4] {
        self.0.to_be_bytes()
    }

    /// Component order, or `None` if the code is not a known format.
    pub const fn channel_order(self) -> Option<ChannelOrder> {
        match self.0 {
            0x0000_0018 => Some(ChannelOrder::Rgb),
            0x0000_0020 => Some(ChannelOrder::Argb),
            c if c == Self::BGRA32.0 => Some(ChannelOrder::Bgra),
            c if c == Self::ABGR32.0 => Some(ChannelOrder::Abgr),
            c if c == Self::RGBA32.0 => Some(ChannelOrder::Rgba),
            c if c == Self::GRAY8.0 => Some(ChannelOrder::Gray),
            _ => None,
        }
    }

    /// Whether this crate can allocate buffers of this format.
    #[inline]
    pub const fn is_supported(self) -> bool {
        self.channel_order().is_some()
    }

    /// Bytes per pixel, or `None` for unknown codes.
    pub const fn bytes_per_pixel(self) -> Option<usize> {
        match self.channel_order() {
            Some(order) => Some(order.channels()),
            None => None,
        }
    }
}

impl fmt::Debug for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let cc = self.four_cc();
        if cc.iter().all(|b| b.is_ascii_graphic() || *b == b' ') {
            write!(
                f,
                "PixelFormat('{}{}{}{}')",
                cc[0] as char, cc[1] as char, cc[2] as char, cc[3] as char
            )
        } else {
            write!(f, "PixelFormat({:#010x})", self.0)
        }
    }
}
