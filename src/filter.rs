//! Resolution-independent filter images.
//!
//! A [`FilterImage`] is a recipe, not pixels: a small immutable graph of
//! generators, sources and filters with a floating-point extent. Nothing is
//! computed until a [`RenderContext`](crate::RenderContext) samples it.
//!
//! Image space is y-up. Samples are premultiplied RGBA in `0.0..=1.0`,
//! sRGB-encoded.

use core::fmt;
use std::sync::Arc;

use rgb::Rgba;

use crate::bitmap::Bitmap;
use crate::color::{ColorSpace, convert_rgb};
use crate::geometry::{AffineTransform, Point, Rect};

enum Node {
    Color([f32; 4]),
    Bitmap(Bitmap),
    Crop {
        input: FilterImage,
        rect: Rect,
    },
    Transform {
        input: FilterImage,
        inverse: AffineTransform,
    },
    SourceOver {
        foreground: FilterImage,
        background: FilterImage,
    },
}

/// Deferred, resolution-independent image description.
///
/// Cloning is cheap; filter methods return new images that share their
/// inputs.
#[derive(Clone)]
pub struct FilterImage {
    node: Arc<Node>,
    extent: Rect,
}

impl FilterImage {
    fn with_node(node: Node, extent: Rect) -> Self {
        Self {
            node: Arc::new(node),
            extent,
        }
    }

    /// Infinite image of one straight-alpha sRGB color.
    pub fn color(color: Rgba<f32>) -> Self {
        Self::with_node(Node::Color(premultiply(color_to_array(color))), Rect::infinite())
    }

    /// Infinite empty image.
    pub fn empty() -> Self {
        Self::color(Rgba {
            r: 0.0,
            g: 0.0,
            b: 0.0,
            a: 0.0,
        })
    }

    /// Image backed by a bitmap, extent `(0, 0, width, height)`. The
    /// bitmap's top row ends up at the top of the extent.
    pub fn from_bitmap(bitmap: Bitmap) -> Self {
        let extent = Rect::new(0.0, 0.0, bitmap.width() as f64, bitmap.height() as f64);
        Self::with_node(Node::Bitmap(bitmap), extent)
    }

    /// Bounds of the non-transparent area. Infinite for uncropped generators.
    #[inline]
    pub fn extent(&self) -> Rect {
        self.extent
    }

    /// Restrict the image to `rect`.
    pub fn cropped(&self, rect: Rect) -> Self {
        let extent = self.extent.intersection(&rect);
        Self::with_node(
            Node::Crop {
                input: self.clone(),
                rect,
            },
            extent,
        )
    }

    /// Apply an affine transform. A singular transform yields an empty image.
    pub fn transformed(&self, transform: AffineTransform) -> Self {
        match transform.invert() {
            Some(inverse) => Self::with_node(
                Node::Transform {
                    input: self.clone(),
                    inverse,
                },
                transform.apply_to_rect(&self.extent),
            ),
            None => Self::empty().cropped(Rect::default()),
        }
    }

    /// Shorthand for a translation transform.
    pub fn translated(&self, dx: f64, dy: f64) -> Self {
        self.transformed(AffineTransform::translation(dx, dy))
    }

    /// Shorthand for a scale transform.
    pub fn scaled(&self, sx: f64, sy: f64) -> Self {
        self.transformed(AffineTransform::scale(sx, sy))
    }

    /// Composite `self` over `background`.
    pub fn composited_over(&self, background: &FilterImage) -> Self {
        Self::with_node(
            Node::SourceOver {
                foreground: self.clone(),
                background: background.clone(),
            },
            self.extent.union(&background.extent),
        )
    }

    /// Premultiplied RGBA at `p`. Transparent outside the extent.
    pub fn sample(&self, p: Point) -> [f32; 4] {
        if !self.extent.contains(p) {
            return [0.0; 4];
        }
        match &*self.node {
            Node::Color(c) => *c,
            Node::Bitmap(bitmap) => {
                let x = (p.x.floor() as i64).clamp(0, bitmap.width() as i64 - 1) as u32;
                let y_up = (p.y.floor() as i64).clamp(0, bitmap.height() as i64 - 1) as u32;
                let s = bitmap.pixel(x, bitmap.height() - 1 - y_up);
                let rgb = convert_rgb([s[0], s[1], s[2]], bitmap.color_space(), ColorSpace::Srgb);
                premultiply([rgb[0], rgb[1], rgb[2], s[3]])
            }
            Node::Crop { input, rect } => {
                if rect.contains(p) {
                    input.sample(p)
                } else {
                    [0.0; 4]
                }
            }
            Node::Transform { input, inverse } => input.sample(inverse.apply(p)),
            Node::SourceOver {
                foreground,
                background,
            } => {
                let fg = foreground.sample(p);
                let bg = background.sample(p);
                let inv = 1.0 - fg[3];
                [
                    fg[0] + bg[0] * inv,
                    fg[1] + bg[1] * inv,
                    fg[2] + bg[2] * inv,
                    fg[3] + bg[3] * inv,
                ]
            }
        }
    }
}

impl fmt::Debug for FilterImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match &*self.node {
            Node::Color(_) => "Color",
            Node::Bitmap(_) => "Bitmap",
            Node::Crop { .. } => "Crop",
            Node::Transform { .. } => "Transform",
            Node::SourceOver { .. } => "SourceOver",
        };
        write!(f, "FilterImage({kind}, extent {:?})", self.extent)
    }
}

impl From<Bitmap> for FilterImage {
    fn from(bitmap: Bitmap) -> Self {
        Self::from_bitmap(bitmap)
    }
}

fn color_to_array(c: Rgba<f32>) -> [f32; 4] {
    [
        c.r.clamp(0.0, 1.0),
        c.g.clamp(0.0, 1.0),
        c.b.clamp(0.0, 1.0),
        c.a.clamp(0.0, 1.0),
    ]
}

fn premultiply(c: [f32; 4]) -> [f32; 4] {
    [c[0] * c[3], c[1] * c[3], c[2] * c[3], c[3]]
}
