//! Pixel buffer allocation.
//!
//! Allocation is a status-or-buffer call: [`PixelBufferAllocator::create_pixel_buffer`]
//! returns the owned buffer or the [`CvReturn`] explaining why there is none.

use crate::buffer::{BufferLayout, CvReturn, PixelBuffer, PixelBufferAttributes};
use crate::format::PixelFormat;
use crate::limits::ResourceLimits;

/// Source of fresh pixel buffers.
///
/// Implementations must return a buffer that no other handle references
/// and that is not locked.
pub trait PixelBufferAllocator: Send + Sync {
    /// Create a buffer of the given size and format.
    fn create_pixel_buffer(
        &self,
        width: u32,
        height: u32,
        pixel_format: PixelFormat,
        attributes: &PixelBufferAttributes,
    ) -> Result<PixelBuffer, CvReturn>;
}

/// Heap allocator with optional [`ResourceLimits`].
///
/// Buffers are zero-filled, so every page of a successful allocation is
/// touched. Without limits a huge but valid request can pass the reservation
/// under memory overcommit and then exhaust physical memory while filling;
/// set [`ResourceLimits::with_max_memory`] when sizes come from untrusted
/// input.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DefaultAllocator {
    limits: ResourceLimits,
}

impl DefaultAllocator {
    /// Allocator without limits.
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject requests exceeding `limits` before reserving memory.
    pub fn with_limits(mut self, limits: ResourceLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Limits in effect.
    pub fn limits(&self) -> &ResourceLimits {
        &self.limits
    }
}

impl PixelBufferAllocator for DefaultAllocator {
    fn create_pixel_buffer(
        &self,
        width: u32,
        height: u32,
        pixel_format: PixelFormat,
        attributes: &PixelBufferAttributes,
    ) -> Result<PixelBuffer, CvReturn> {
        if self.limits.has_any() {
            self.limits
                .check_dimensions(width, height)
                .map_err(CvReturn::ResourceLimit)?;
            let layout = BufferLayout::compute(width, height, pixel_format, attributes)?;
            self.limits
                .check_memory(layout.data_size as u64)
                .map_err(CvReturn::ResourceLimit)?;
        }
        let buffer = PixelBuffer::new(width, height, pixel_format, attributes)?;
        tracing::trace!(
            width,
            height,
            format = ?pixel_format,
            bytes_per_row = buffer.bytes_per_row(),
            "allocated pixel buffer"
        );
        Ok(buffer)
    }
}
