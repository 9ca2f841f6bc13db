//! Resource limits for pixel buffer allocation.
//!
//! [`ResourceLimits`] caps what an allocator will hand out. [`LimitExceeded`]
//! is returned when a check fails, before any memory is reserved.

/// Resource limits for buffer allocation.
///
/// All fields are optional; `None` means no limit for that resource.
///
/// # Example
///
/// ```
/// use zenpixbuf::{DefaultAllocator, ResourceLimits};
///
/// let limits = ResourceLimits::none()
///     .with_max_pixels(16_000_000)
///     .with_max_memory(64 * 1024 * 1024);
/// let allocator = DefaultAllocator::new().with_limits(limits);
/// ```
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[non_exhaustive]
pub struct ResourceLimits {
    /// Maximum total pixels (width × height).
    pub max_pixels: Option<u64>,
    /// Maximum buffer memory in bytes, row padding included.
    pub max_memory_bytes: Option<u64>,
    /// Maximum buffer width in pixels.
    pub max_width: Option<u32>,
    /// Maximum buffer height in pixels.
    pub max_height: Option<u32>,
}

impl ResourceLimits {
    /// No limits (all fields `None`).
    pub fn none() -> Self {
        Self::default()
    }

    /// Set maximum total pixels.
    pub fn with_max_pixels(mut self, max: u64) -> Self {
        self.max_pixels = Some(max);
        self
    }

    /// Set maximum buffer memory in bytes.
    pub fn with_max_memory(mut self, bytes: u64) -> Self {
        self.max_memory_bytes = Some(bytes);
        self
    }

    /// Set maximum width in pixels.
    pub fn with_max_width(mut self, width: u32) -> Self {
        self.max_width = Some(width);
        self
    }

    /// Set maximum height in pixels.
    pub fn with_max_height(mut self, height: u32) -> Self {
        self.max_height = Some(height);
        self
    }

    /// Whether any limits are set.
    pub fn has_any(&self) -> bool {
        self.max_pixels.is_some()
            || self.max_memory_bytes.is_some()
            || self.max_width.is_some()
            || self.max_height.is_some()
    }

    /// Check dimensions against `max_width`, `max_height`, and `max_pixels`.
    pub fn check_dimensions(&self, width: u32, height: u32) -> Result<(), LimitExceeded> {
        if let Some(max) = self.max_width
            && width > max
        {
            return Err(LimitExceeded::Width { actual: width, max });
        }
        if let Some(max) = self.max_height
            && height > max
        {
            return Err(LimitExceeded::Height {
                actual: height,
                max,
            });
        }
        if let Some(max) = self.max_pixels {
            let pixels = width as u64 * height as u64;
            if pixels > max {
                return Err(LimitExceeded::Pixels {
                    actual: pixels,
                    max,
                });
            }
        }
        Ok(())
    }

    /// Check a memory size against `max_memory_bytes`.
    pub fn check_memory(&self, bytes: u64) -> Result<(), LimitExceeded> {
        if let Some(max) = self.max_memory_bytes
            && bytes > max
        {
            return Err(LimitExceeded::Memory { actual: bytes, max });
        }
        Ok(())
    }
}

/// A resource limit was exceeded.
///
/// Each variant carries the actual value and the limit that was exceeded.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LimitExceeded {
    /// Width exceeded `max_width`.
    Width { actual: u32, max: u32 },
    /// Height exceeded `max_height`.
    Height { actual: u32, max: u32 },
    /// Pixel count exceeded `max_pixels`.
    Pixels { actual: u64, max: u64 },
    /// Buffer size exceeded `max_memory_bytes`.
    Memory { actual: u64, max: u64 },
}

impl core::fmt::Display for LimitExceeded {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Width { actual, max } => write!(f, "width {actual} exceeds limit {max}"),
            Self::Height { actual, max } => write!(f, "height {actual} exceeds limit {max}"),
            Self::Pixels { actual, max } => {
                write!(f, "pixel count {actual} exceeds limit {max}")
            }
            Self::Memory { actual, max } => {
                write!(f, "buffer size {actual} bytes exceeds limit {max}")
            }
        }
    }
}

impl std::error::Error for LimitExceeded {}
