use serde::{Deserialize, Serialize};
use std::hash::Hash;

/// An axis-aligned rectangle in layer coordinates.
///
/// A `BoundingBox` is always normalized: `min_x <= max_x` and
/// `min_y <= max_y`. Constructors and setters swap bounds that arrive in the
/// wrong order, so a box can never be observed inverted.
///
/// Coordinates are passed in `(min_x, max_x, min_y, max_y)` order, one axis
/// after the other.
///
/// Equality and hashing treat `-0.0` as `0.0` and every NaN as the same
/// value, so boxes can be used as map keys.
///
/// # Examples
///
/// ```rust
/// use degate_spatial::BoundingBox;
///
/// let bbox = BoundingBox::new(100.0, 0.0, 0.0, 50.0);
/// assert_eq!(bbox.min_x(), 0.0);
/// assert_eq!(bbox.max_x(), 100.0);
/// assert!(bbox.intersects(&BoundingBox::new(90.0, 120.0, 40.0, 60.0)));
/// ```
#[derive(Clone, Copy, Default, Debug, Serialize, Deserialize)]
#[serde(from = "RawBoundingBox")]
pub struct BoundingBox {
    min_x: f64,
    max_x: f64,
    min_y: f64,
    max_y: f64,
}

#[derive(Deserialize)]
struct RawBoundingBox {
    min_x: f64,
    max_x: f64,
    min_y: f64,
    max_y: f64,
}

impl From<RawBoundingBox> for BoundingBox {
    fn from(raw: RawBoundingBox) -> Self {
        BoundingBox::new(raw.min_x, raw.max_x, raw.min_y, raw.max_y)
    }
}

#[inline]
fn canonical_bits(value: f64) -> u64 {
    if value == 0.0 {
        0.0f64.to_bits()
    } else if value.is_nan() {
        f64::NAN.to_bits()
    } else {
        value.to_bits()
    }
}

impl BoundingBox {
    fn key(&self) -> [u64; 4] {
        [
            canonical_bits(self.min_x),
            canonical_bits(self.max_x),
            canonical_bits(self.min_y),
            canonical_bits(self.max_y),
        ]
    }
}

impl PartialEq for BoundingBox {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for BoundingBox {}

impl Hash for BoundingBox {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

impl std::fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "BoundingBox(x: {}..{}, y: {}..{})",
            self.min_x, self.max_x, self.min_y, self.max_y
        )
    }
}

#[inline]
fn ordered(a: f64, b: f64) -> (f64, f64) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

impl BoundingBox {
    /// Creates a bounding box, swapping bounds given in the wrong order.
    pub fn new(min_x: f64, max_x: f64, min_y: f64, max_y: f64) -> BoundingBox {
        let (min_x, max_x) = ordered(min_x, max_x);
        let (min_y, max_y) = ordered(min_y, max_y);
        BoundingBox {
            min_x,
            max_x,
            min_y,
            max_y,
        }
    }

    /// Creates a box anchored at the origin: `(0, width) x (0, height)`.
    pub fn from_size(width: f64, height: f64) -> BoundingBox {
        BoundingBox::new(0.0, width, 0.0, height)
    }

    #[inline]
    pub fn min_x(&self) -> f64 {
        self.min_x
    }

    #[inline]
    pub fn max_x(&self) -> f64 {
        self.max_x
    }

    #[inline]
    pub fn min_y(&self) -> f64 {
        self.min_y
    }

    #[inline]
    pub fn max_y(&self) -> f64 {
        self.max_y
    }

    /// Sets the lower x bound.
    ///
    /// The x axis is re-normalized as a whole: if `min_x` exceeds the current
    /// `max_x`, the old `max_x` becomes the new lower bound and `min_x` the
    /// new upper bound. Setting one bound can therefore move the other.
    pub fn set_min_x(&mut self, min_x: f64) {
        (self.min_x, self.max_x) = ordered(min_x, self.max_x);
    }

    /// Sets the upper x bound, re-normalizing the x axis (see [`set_min_x`](Self::set_min_x)).
    pub fn set_max_x(&mut self, max_x: f64) {
        (self.min_x, self.max_x) = ordered(self.min_x, max_x);
    }

    /// Sets the lower y bound, re-normalizing the y axis (see [`set_min_x`](Self::set_min_x)).
    pub fn set_min_y(&mut self, min_y: f64) {
        (self.min_y, self.max_y) = ordered(min_y, self.max_y);
    }

    /// Sets the upper y bound, re-normalizing the y axis (see [`set_min_x`](Self::set_min_x)).
    pub fn set_max_y(&mut self, max_y: f64) {
        (self.min_y, self.max_y) = ordered(self.min_y, max_y);
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    pub fn area(&self) -> f64 {
        self.width() * self.height()
    }

    pub fn center_x(&self) -> f64 {
        (self.min_x + self.max_x) / 2.0
    }

    pub fn center_y(&self) -> f64 {
        (self.min_y + self.max_y) / 2.0
    }

    pub fn center(&self) -> (f64, f64) {
        (self.center_x(), self.center_y())
    }

    pub fn shift_x(&mut self, delta_x: f64) {
        self.min_x += delta_x;
        self.max_x += delta_x;
    }

    pub fn shift_y(&mut self, delta_y: f64) {
        self.min_y += delta_y;
        self.max_y += delta_y;
    }

    pub fn shift(&mut self, delta_x: f64, delta_y: f64) {
        self.shift_x(delta_x);
        self.shift_y(delta_y);
    }

    /// True unless the boxes are separated on some axis. Touching edges intersect.
    pub fn intersects(&self, other: &BoundingBox) -> bool {
        !(other.min_x > self.max_x
            || other.max_x < self.min_x
            || other.min_y > self.max_y
            || other.max_y < self.min_y)
    }

    /// True if `self` lies completely inside `other`.
    pub fn in_bounding_box(&self, other: &BoundingBox) -> bool {
        other.min_x <= self.min_x
            && other.max_x >= self.max_x
            && other.min_y <= self.min_y
            && other.max_y >= self.max_y
    }

    /// True if `rect` lies completely inside `self`.
    ///
    /// This is [`in_bounding_box`](Self::in_bounding_box) seen from the
    /// other side: `a.complete_within(&b) == b.in_bounding_box(&a)`.
    pub fn complete_within(&self, rect: &BoundingBox) -> bool {
        rect.in_bounding_box(self)
    }

    /// Point test with a tolerance band of `max_distance` around the box.
    pub fn in_shape(&self, x: f64, y: f64, max_distance: f64) -> bool {
        x >= self.min_x - max_distance
            && x <= self.max_x + max_distance
            && y >= self.min_y - max_distance
            && y <= self.max_y + max_distance
    }

    pub fn contains_point(&self, x: f64, y: f64) -> bool {
        self.in_shape(x, y, 0.0)
    }

    /// Smallest box covering both boxes.
    pub fn union(&self, other: &BoundingBox) -> BoundingBox {
        BoundingBox {
            min_x: self.min_x.min(other.min_x),
            max_x: self.max_x.max(other.max_x),
            min_y: self.min_y.min(other.min_y),
            max_y: self.max_y.max(other.max_y),
        }
    }

    /// Overlapping region of the two boxes, if they intersect.
    pub fn intersection(&self, other: &BoundingBox) -> Option<BoundingBox> {
        if !self.intersects(other) {
            return None;
        }
        Some(BoundingBox {
            min_x: self.min_x.max(other.min_x),
            max_x: self.max_x.min(other.max_x),
            min_y: self.min_y.max(other.min_y),
            max_y: self.max_y.min(other.max_y),
        })
    }

    /// True if any coordinate is NaN.
    pub fn has_nan(&self) -> bool {
        self.min_x.is_nan() || self.max_x.is_nan() || self.min_y.is_nan() || self.max_y.is_nan()
    }
}
