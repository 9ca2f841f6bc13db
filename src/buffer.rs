//! Lockable, format-tagged pixel buffers.
//!
//! A [`PixelBuffer`] is a reference-counted handle to a fixed-size block of
//! row-major pixel memory. Memory is only reachable through a lock guard:
//! [`PixelBuffer::lock_base_address`] for exclusive read-write access and
//! [`PixelBuffer::lock_base_address_read_only`] for shared reads. Dropping
//! the guard unlocks, so no exit path can leave a buffer locked.

use core::fmt;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard, TryLockError};

use crate::format::PixelFormat;
use crate::limits::LimitExceeded;

// ---------------------------------------------------------------------------
// CvReturn
// ---------------------------------------------------------------------------

/// Status of a buffer operation that did not succeed.
#[derive(Clone, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum CvReturn {
    /// An attribute value is out of range (e.g. a non power-of-two alignment).
    InvalidArgument,
    /// Width or height is zero, non-finite, or overflows the address space.
    InvalidSize,
    /// The pixel format code is not one this crate can allocate.
    InvalidPixelFormat,
    /// The system allocator refused the request.
    AllocationFailed,
    /// The buffer is locked in a conflicting mode through another handle.
    Locked,
    /// An allocator's [`ResourceLimits`](crate::ResourceLimits) rejected the request.
    ResourceLimit(LimitExceeded),
}

impl fmt::Display for CvReturn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidArgument => write!(f, "invalid pixel buffer attribute"),
            Self::InvalidSize => write!(f, "invalid pixel buffer size"),
            Self::InvalidPixelFormat => write!(f, "unsupported pixel format"),
            Self::AllocationFailed => write!(f, "pixel buffer allocation failed"),
            Self::Locked => write!(f, "pixel buffer is locked"),
            Self::ResourceLimit(e) => write!(f, "resource limit: {e}"),
        }
    }
}

impl std::error::Error for CvReturn {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::ResourceLimit(e) => Some(e),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// PixelBufferAttributes
// ---------------------------------------------------------------------------

/// Row alignment used for bitmap-context compatible memory.
pub const BITMAP_CONTEXT_ROW_ALIGNMENT: usize = 16;
/// Row alignment used for GPU-surface compatible memory.
pub const GPU_SURFACE_ROW_ALIGNMENT: usize = 64;

/// Memory compatibility attributes requested at creation time.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
#[non_exhaustive]
pub struct PixelBufferAttributes {
    /// Memory can back an immutable bitmap image. Recorded for consumers of
    /// the buffer; it places no extra constraint on the layout.
    pub image_compatible: bool,
    /// Memory can be drawn into by a [`BitmapContext`](crate::BitmapContext).
    pub bitmap_context_compatible: bool,
    /// Memory can be shared with a GPU surface.
    pub gpu_surface_compatible: bool,
    /// Explicit row alignment in bytes (power of two). Overrides the
    /// alignment implied by the compatibility flags.
    pub bytes_per_row_alignment: Option<usize>,
}

impl PixelBufferAttributes {
    /// No compatibility requirements; rows are tightly packed.
    pub fn none() -> Self {
        Self::default()
    }

    /// Image, bitmap-context and GPU-surface compatible. This is what both
    /// conversion paths request.
    pub fn compatible() -> Self {
        Self {
            image_compatible: true,
            bitmap_context_compatible: true,
            gpu_surface_compatible: true,
            bytes_per_row_alignment: None,
        }
    }

    /// Request memory that can back an immutable bitmap image.
    pub fn with_image_compatibility(mut self, on: bool) -> Self {
        self.image_compatible = on;
        self
    }

    /// Request memory a bitmap context can draw into: rows align to
    /// [`BITMAP_CONTEXT_ROW_ALIGNMENT`] bytes.
    pub fn with_bitmap_context_compatibility(mut self, on: bool) -> Self {
        self.bitmap_context_compatible = on;
        self
    }

    /// Request memory shareable with a GPU surface: rows align to
    /// [`GPU_SURFACE_ROW_ALIGNMENT`] bytes.
    pub fn with_gpu_surface_compatibility(mut self, on: bool) -> Self {
        self.gpu_surface_compatible = on;
        self
    }

    /// Force a row alignment in bytes. Must be a power of two; checked at
    /// creation.
    pub fn with_bytes_per_row_alignment(mut self, alignment: usize) -> Self {
        self.bytes_per_row_alignment = Some(alignment);
        self
    }

    /// Effective row alignment.
    ///
    /// # Errors
    ///
    /// [`CvReturn::InvalidArgument`] if an explicit alignment is zero or not
    /// a power of two.
    pub fn row_alignment(&self) -> Result<usize, CvReturn> {
        if let Some(align) = self.bytes_per_row_alignment {
            if !align.is_power_of_two() {
                return Err(CvReturn::InvalidArgument);
            }
            return Ok(align);
        }
        Ok(if self.gpu_surface_compatible {
            GPU_SURFACE_ROW_ALIGNMENT
        } else if self.bitmap_context_compatible {
            BITMAP_CONTEXT_ROW_ALIGNMENT
        } else {
            1
        })
    }
}

// ---------------------------------------------------------------------------
// BufferLayout
// ---------------------------------------------------------------------------

/// Geometry of a buffer that would be created for a request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BufferLayout {
    pub width: u32,
    pub height: u32,
    pub pixel_format: PixelFormat,
    pub bytes_per_row: usize,
    pub data_size: usize,
}

impl BufferLayout {
    /// Validate a creation request and compute its stride and size.
    ///
    /// # Errors
    ///
    /// - [`CvReturn::InvalidSize`] for zero dimensions or overflow.
    /// - [`CvReturn::InvalidPixelFormat`] for unknown format codes.
    /// - [`CvReturn::InvalidArgument`] for a bad explicit row alignment.
    pub fn compute(
        width: u32,
        height: u32,
        pixel_format: PixelFormat,
        attributes: &PixelBufferAttributes,
    ) -> Result<Self, CvReturn> {
        if width == 0 || height == 0 {
            return Err(CvReturn::InvalidSize);
        }
        let bpp = pixel_format
            .bytes_per_pixel()
            .ok_or(CvReturn::InvalidPixelFormat)?;
        let align = attributes.row_alignment()?;
        let row = (width as usize)
            .checked_mul(bpp)
            .ok_or(CvReturn::InvalidSize)?;
        let bytes_per_row = row
            .checked_add(align - 1)
            .map(|v| v & !(align - 1))
            .ok_or(CvReturn::InvalidSize)?;
        let data_size = bytes_per_row
            .checked_mul(height as usize)
            .ok_or(CvReturn::InvalidSize)?;
        Ok(Self {
            width,
            height,
            pixel_format,
            bytes_per_row,
            data_size,
        })
    }
}

// ---------------------------------------------------------------------------
// PixelBuffer
// ---------------------------------------------------------------------------

struct Shared {
    layout: BufferLayout,
    attributes: PixelBufferAttributes,
    memory: RwLock<Vec<u8>>,
}

/// Reference-counted handle to pixel memory.
///
/// Cloning is cheap and shares the memory; use [`PixelBuffer::ptr_eq`] to
/// tell handles apart. Freshly created buffers are zero-filled.
#[derive(Clone)]
pub struct PixelBuffer {
    shared: Arc<Shared>,
}

impl PixelBuffer {
    /// Allocate a zero-filled buffer.
    ///
    /// Most callers go through a [`PixelBufferAllocator`](crate::PixelBufferAllocator),
    /// which applies resource limits first.
    ///
    /// # Errors
    ///
    /// See [`BufferLayout::compute`]; additionally
    /// [`CvReturn::AllocationFailed`] if the memory cannot be reserved.
    pub fn new(
        width: u32,
        height: u32,
        pixel_format: PixelFormat,
        attributes: &PixelBufferAttributes,
    ) -> Result<Self, CvReturn> {
        let layout = BufferLayout::compute(width, height, pixel_format, attributes)?;
        let mut memory = Vec::new();
        memory
            .try_reserve_exact(layout.data_size)
            .map_err(|_| CvReturn::AllocationFailed)?;
        memory.resize(layout.data_size, 0);
        Ok(Self {
            shared: Arc::new(Shared {
                layout,
                attributes: *attributes,
                memory: RwLock::new(memory),
            }),
        })
    }

    /// Width in pixels.
    #[inline]
    pub fn width(&self) -> u32 {
        self.shared.layout.width
    }

    /// Height in pixels.
    #[inline]
    pub fn height(&self) -> u32 {
        self.shared.layout.height
    }

    /// Pixel format tag.
    #[inline]
    pub fn pixel_format(&self) -> PixelFormat {
        self.shared.layout.pixel_format
    }

    /// Byte stride between row starts (may include padding).
    #[inline]
    pub fn bytes_per_row(&self) -> usize {
        self.shared.layout.bytes_per_row
    }

    /// Total size of the pixel memory in bytes.
    #[inline]
    pub fn data_size(&self) -> usize {
        self.shared.layout.data_size
    }

    /// Geometry of this buffer.
    #[inline]
    pub fn layout(&self) -> BufferLayout {
        self.shared.layout
    }

    /// Attributes the buffer was created with.
    #[inline]
    pub fn attributes(&self) -> PixelBufferAttributes {
        self.shared.attributes
    }

    /// Whether both handles refer to the same memory.
    #[inline]
    pub fn ptr_eq(&self, other: &PixelBuffer) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    /// Whether any lock is currently held on this buffer.
    pub fn is_locked(&self) -> bool {
        matches!(
            self.shared.memory.try_write(),
            Err(TryLockError::WouldBlock)
        )
    }

    /// Lock the memory for exclusive read-write access.
    ///
    /// Never blocks: a conflicting lock held through another handle fails
    /// with [`CvReturn::Locked`].
    pub fn lock_base_address(&self) -> Result<BaseAddressMut<'_>, CvReturn> {
        let guard = match self.shared.memory.try_write() {
            Ok(guard) => guard,
            Err(TryLockError::WouldBlock) => return Err(CvReturn::Locked),
            // A panic while drawing poisons the lock; the memory is still valid.
            Err(TryLockError::Poisoned(p)) => p.into_inner(),
        };
        Ok(BaseAddressMut {
            layout: self.shared.layout,
            memory: guard,
        })
    }

    /// Lock the memory for shared read-only access.
    ///
    /// Fails with [`CvReturn::Locked`] while a read-write lock is held.
    pub fn lock_base_address_read_only(&self) -> Result<BaseAddress<'_>, CvReturn> {
        let guard = match self.shared.memory.try_read() {
            Ok(guard) => guard,
            Err(TryLockError::WouldBlock) => return Err(CvReturn::Locked),
            Err(TryLockError::Poisoned(p)) => p.into_inner(),
        };
        Ok(BaseAddress {
            layout: self.shared.layout,
            memory: guard,
        })
    }
}

impl fmt::Debug for PixelBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "PixelBuffer({}x{}, {:?}, stride {})",
            self.width(),
            self.height(),
            self.pixel_format(),
            self.bytes_per_row()
        )
    }
}

// ---------------------------------------------------------------------------
// Lock guards
// ---------------------------------------------------------------------------

/// Shared read-only view of locked buffer memory. Unlocks on drop.
pub struct BaseAddress<'a> {
    layout: BufferLayout,
    memory: RwLockReadGuard<'a, Vec<u8>>,
}

impl BaseAddress<'_> {
    /// Geometry of the locked buffer.
    #[inline]
    pub fn layout(&self) -> BufferLayout {
        self.layout
    }

    /// All bytes, row padding included.
    #[inline]
    pub fn bytes(&self) -> &[u8] {
        &self.memory
    }

    /// Pixel bytes of row `y`, without padding.
    ///
    /// # Panics
    ///
    /// Panics if `y >= height`.
    pub fn row(&self, y: u32) -> &[u8] {
        let (start, len) = row_span(&self.layout, y);
        &self.memory[start..start + len]
    }
}

/// Exclusive read-write view of locked buffer memory. Unlocks on drop.
pub struct BaseAddressMut<'a> {
    layout: BufferLayout,
    memory: RwLockWriteGuard<'a, Vec<u8>>,
}

impl BaseAddressMut<'_> {
    /// Geometry of the locked buffer.
    #[inline]
    pub fn layout(&self) -> BufferLayout {
        self.layout
    }

    /// All bytes, row padding included.
    #[inline]
    pub fn bytes(&self) -> &[u8] {
        &self.memory
    }

    /// All bytes, mutable.
    #[inline]
    pub fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.memory
    }

    /// Pixel bytes of row `y`, without padding.
    ///
    /// # Panics
    ///
    /// Panics if `y >= height`.
    pub fn row(&self, y: u32) -> &[u8] {
        let (start, len) = row_span(&self.layout, y);
        &self.memory[start..start + len]
    }

    /// Mutable pixel bytes of row `y`, without padding.
    ///
    /// # Panics
    ///
    /// Panics if `y >= height`.
    pub fn row_mut(&mut self, y: u32) -> &mut [u8] {
        let (start, len) = row_span(&self.layout, y);
        &mut self.memory[start..start + len]
    }
}

impl fmt::Debug for BaseAddress<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BaseAddress({}x{})", self.layout.width, self.layout.height)
    }
}

impl fmt::Debug for BaseAddressMut<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "BaseAddressMut({}x{})",
            self.layout.width, self.layout.height
        )
    }
}

fn row_span(layout: &BufferLayout, y: u32) -> (usize, usize) {
    assert!(
        y < layout.height,
        "row index {y} out of bounds (height: {})",
        layout.height
    );
    // Known formats only: BufferLayout::compute rejected the rest.
    let bpp = layout.pixel_format.bytes_per_pixel().unwrap_or(0);
    (
        y as usize * layout.bytes_per_row,
        layout.width as usize * bpp,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_buffer_geometry() {
        let buf = PixelBuffer::new(10, 5, PixelFormat::ARGB32, &PixelBufferAttributes::none())
            .unwrap();
        assert_eq!(buf.width(), 10);
        assert_eq!(buf.height(), 5);
        assert_eq!(buf.bytes_per_row(), 40);
        assert_eq!(buf.data_size(), 200);
        assert_eq!(buf.pixel_format(), PixelFormat::ARGB32);
        assert!(!buf.is_locked());
    }

    #[test]
    fn compatible_rows_are_aligned() {
        let attrs = PixelBufferAttributes::compatible();
        let buf = PixelBuffer::new(10, 3, PixelFormat::BGRA32, &attrs).unwrap();
        assert_eq!(buf.bytes_per_row(), 64);
        let attrs = PixelBufferAttributes::none().with_bitmap_context_compatibility(true);
        let buf = PixelBuffer::new(5, 3, PixelFormat::RGB24, &attrs).unwrap();
        assert_eq!(buf.bytes_per_row(), 16);
        let attrs = PixelBufferAttributes::compatible().with_bytes_per_row_alignment(8);
        let buf = PixelBuffer::new(3, 1, PixelFormat::GRAY8, &attrs).unwrap();
        assert_eq!(buf.bytes_per_row(), 8);
    }

    #[test]
    fn attributes_are_recorded_on_the_buffer() {
        let attrs = PixelBufferAttributes::none()
            .with_image_compatibility(true)
            .with_gpu_surface_compatibility(true);
        assert!(attrs.image_compatible && attrs.gpu_surface_compatible);
        assert!(!attrs.bitmap_context_compatible);
        let buf = PixelBuffer::new(2, 2, PixelFormat::RGBA32, &attrs).unwrap();
        assert_eq!(buf.attributes(), attrs);
        assert_eq!(buf.bytes_per_row(), GPU_SURFACE_ROW_ALIGNMENT);

        // Image compatibility alone keeps rows tightly packed.
        let image_only = PixelBufferAttributes::none().with_image_compatibility(true);
        assert_eq!(image_only.row_alignment(), Ok(1));
        let buf = PixelBuffer::new(3, 1, PixelFormat::RGB24, &image_only).unwrap();
        assert_eq!(buf.bytes_per_row(), 9);
        assert!(buf.attributes().image_compatible);
        assert_eq!(
            PixelBufferAttributes::compatible().with_image_compatibility(false),
            PixelBufferAttributes::none()
                .with_bitmap_context_compatibility(true)
                .with_gpu_surface_compatibility(true)
        );
    }

    #[test]
    fn invalid_requests() {
        let none = PixelBufferAttributes::none();
        assert_eq!(
            PixelBuffer::new(0, 5, PixelFormat::ARGB32, &none).unwrap_err(),
            CvReturn::InvalidSize
        );
        assert_eq!(
            PixelBuffer::new(5, 0, PixelFormat::ARGB32, &none).unwrap_err(),
            CvReturn::InvalidSize
        );
        assert_eq!(
            PixelBuffer::new(5, 5, PixelFormat::from_code(0xDEAD_BEEF), &none).unwrap_err(),
            CvReturn::InvalidPixelFormat
        );
        let odd = PixelBufferAttributes::none().with_bytes_per_row_alignment(3);
        assert_eq!(
            PixelBuffer::new(5, 5, PixelFormat::ARGB32, &odd).unwrap_err(),
            CvReturn::InvalidArgument
        );
    }

    #[test]
    fn write_lock_is_exclusive() {
        let buf = PixelBuffer::new(2, 2, PixelFormat::BGRA32, &PixelBufferAttributes::none())
            .unwrap();
        let other = buf.clone();
        assert!(buf.ptr_eq(&other));
        {
            let mut base = buf.lock_base_address().unwrap();
            base.row_mut(1)[0] = 9;
            assert!(other.is_locked());
            assert_eq!(other.lock_base_address().unwrap_err(), CvReturn::Locked);
            assert_eq!(
                other.lock_base_address_read_only().unwrap_err(),
                CvReturn::Locked
            );
        }
        assert!(!buf.is_locked());
        let base = other.lock_base_address_read_only().unwrap();
        assert_eq!(base.row(1)[0], 9);
        assert_eq!(base.row(0), &[0u8; 8]);
    }

    #[test]
    fn read_locks_are_shared() {
        let buf = PixelBuffer::new(1, 1, PixelFormat::GRAY8, &PixelBufferAttributes::none())
            .unwrap();
        let a = buf.lock_base_address_read_only().unwrap();
        let b = buf.lock_base_address_read_only().unwrap();
        assert_eq!(a.bytes(), b.bytes());
        assert_eq!(buf.lock_base_address().unwrap_err(), CvReturn::Locked);
        drop(a);
        drop(b);
        assert!(buf.lock_base_address().is_ok());
    }

    #[test]
    fn panic_while_locked_does_not_wedge_the_buffer() {
        use std::panic::{AssertUnwindSafe, catch_unwind};

        let buf = PixelBuffer::new(1, 1, PixelFormat::GRAY8, &PixelBufferAttributes::none())
            .unwrap();
        let result = catch_unwind(AssertUnwindSafe(|| {
            let mut base = buf.lock_base_address().unwrap();
            base.row_mut(0)[0] = 42;
            panic!("draw failed");
        }));
        assert!(result.is_err());
        assert!(!buf.is_locked());
        let mut base = buf.lock_base_address().unwrap();
        assert_eq!(base.row(0), &[42]);
        base.row_mut(0)[0] = 7;
        drop(base);
        let read = buf.lock_base_address_read_only().unwrap();
        assert_eq!(read.row(0), &[7]);
    }

    #[test]
    fn rows_skip_padding() {
        let attrs = PixelBufferAttributes::none().with_bytes_per_row_alignment(16);
        let buf = PixelBuffer::new(3, 2, PixelFormat::ARGB32, &attrs).unwrap();
        let mut base = buf.lock_base_address().unwrap();
        assert_eq!(base.layout().bytes_per_row, 16);
        assert_eq!(base.row(0).len(), 12);
        base.row_mut(1).fill(7);
        assert_eq!(&base.bytes()[16..28], &[7u8; 12]);
        assert_eq!(&base.bytes()[28..32], &[0u8; 4]);
        assert_eq!(base.bytes_mut().len(), 32);
    }

    #[test]
    fn status_display() {
        assert_eq!(CvReturn::Locked.to_string(), "pixel buffer is locked");
        let limit = CvReturn::ResourceLimit(LimitExceeded::Width { actual: 2, max: 1 });
        assert_eq!(limit.to_string(), "resource limit: width 2 exceeds limit 1");
    }

    #[test]
    fn debug_format() {
        let buf = PixelBuffer::new(4, 2, PixelFormat::BGRA32, &PixelBufferAttributes::none())
            .unwrap();
        assert_eq!(
            format!("{buf:?}"),
            "PixelBuffer(4x2, PixelFormat('BGRA'), stride 16)"
        );
    }
}
