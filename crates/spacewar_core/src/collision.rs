//! Two-phase collision between a moving point and a structure's sprite.
//!
//! Phase one clips the tick's displacement segment against the target's
//! axis-aligned sprite bounds. Only if the segment crosses the box does
//! phase two sample fixed sub-steps along the clipped part and test them
//! against the alpha mask of the target's current rotation frame.

use crate::math::{Fixed, Vec2Fixed};
use crate::sprite::{AlphaMask, SpriteDef};

/// Axis-aligned bounding box.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Aabb {
    /// Top-left corner.
    pub min: Vec2Fixed,
    /// Bottom-right corner.
    pub max: Vec2Fixed,
}

impl Aabb {
    /// Box of the given size centered on `center`.
    #[must_use]
    pub fn centered(center: Vec2Fixed, width: Fixed, height: Fixed) -> Self {
        let half = Vec2Fixed::new(width / Fixed::from_num(2), height / Fixed::from_num(2));
        Self {
            min: center - half,
            max: center + half,
        }
    }

    /// Grow the box by `margin` on every side.
    #[must_use]
    pub fn expand(self, margin: Fixed) -> Self {
        let m = Vec2Fixed::new(margin, margin);
        Self {
            min: self.min - m,
            max: self.max + m,
        }
    }

    /// Whether a point lies inside the box (edges included).
    #[must_use]
    pub fn contains(&self, p: Vec2Fixed) -> bool {
        p.x >= self.min.x && p.x <= self.max.x && p.y >= self.min.y && p.y <= self.max.y
    }
}

/// Clip the segment `from → to` against `aabb` (Liang–Barsky).
///
/// Returns the entry and exit parameters in `[0, 1]`, or `None` if the
/// segment misses the box.
#[must_use]
pub fn clip_segment(from: Vec2Fixed, to: Vec2Fixed, aabb: &Aabb) -> Option<(Fixed, Fixed)> {
    let d = to - from;
    let mut t0 = Fixed::ZERO;
    let mut t1 = Fixed::ONE;

    let edges = [
        (-d.x, from.x - aabb.min.x),
        (d.x, aabb.max.x - from.x),
        (-d.y, from.y - aabb.min.y),
        (d.y, aabb.max.y - from.y),
    ];
    for (p, q) in edges {
        if p == Fixed::ZERO {
            if q < Fixed::ZERO {
                return None;
            }
            continue;
        }
        let r = q / p;
        if p < Fixed::ZERO {
            if r > t1 {
                return None;
            }
            t0 = t0.max(r);
        } else {
            if r < t0 {
                return None;
            }
            t1 = t1.min(r);
        }
    }
    Some((t0, t1))
}

/// Whether the battle-space point `p` hits an opaque pixel of `mask`,
/// drawn centered on `center` and stretched over `width × height` units.
#[must_use]
pub fn mask_hit(mask: &AlphaMask, center: Vec2Fixed, width: u32, height: u32, p: Vec2Fixed) -> bool {
    if width == 0 || height == 0 {
        return false;
    }
    let w = Fixed::from_num(width);
    let h = Fixed::from_num(height);
    let local_x = p.x - center.x + w / Fixed::from_num(2);
    let local_y = p.y - center.y + h / Fixed::from_num(2);
    if local_x < Fixed::ZERO || local_y < Fixed::ZERO || local_x > w || local_y > h {
        return false;
    }
    let px = (local_x * Fixed::from_num(mask.width()) / w)
        .floor()
        .to_num::<i32>()
        .min(mask.width() as i32 - 1);
    let py = (local_y * Fixed::from_num(mask.height()) / h)
        .floor()
        .to_num::<i32>()
        .min(mask.height() as i32 - 1);
    mask.is_opaque(px, py)
}

/// Target geometry for a sweep test.
#[derive(Debug, Clone, Copy)]
pub struct SweepTarget<'a> {
    /// Sprite center.
    pub center: Vec2Fixed,
    /// Facing angle, selects the rotation frame.
    pub angle: Fixed,
    /// Sprite definition; `None` treats the bounds as solid.
    pub sprite: Option<&'a SpriteDef>,
    /// Bounds used when no sprite definition is available.
    pub size: (u32, u32),
}

/// Sweep a point moving `from → to` against a target.
///
/// `radius` grows the target bounds to account for the mover's own size.
/// Returns the first sampled point that hits, if any.
#[must_use]
pub fn sweep(
    from: Vec2Fixed,
    to: Vec2Fixed,
    radius: Fixed,
    target: &SweepTarget<'_>,
    substeps: u32,
) -> Option<Vec2Fixed> {
    let (width, height) = target
        .sprite
        .map_or(target.size, |s| (s.width, s.height));
    let bounds = Aabb::centered(target.center, Fixed::from_num(width), Fixed::from_num(height))
        .expand(radius);
    let (t0, t1) = clip_segment(from, to, &bounds)?;

    let frame = target.sprite.and_then(|s| s.frame_for_angle(target.angle));
    let Some(mask) = frame else {
        // Solid bounds: the entry point is the hit
        return Some(from.lerp(to, t0));
    };

    let steps = substeps.max(1);
    for i in 0..=steps {
        let t = t0 + (t1 - t0) * Fixed::from_num(i) / Fixed::from_num(steps);
        let p = from.lerp(to, t);
        if mask_hit(mask, target.center, width, height, p) {
            return Some(p);
        }
    }
    // A mover with a body counts as touching once it reaches the center
    if radius > Fixed::ZERO && to.distance(target.center) <= radius {
        return Some(to);
    }
    None
}
