use super::{FloatType, WorldPoint, WorldVector};

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct AABB<Point> {
    pub min: Point,
    pub max: Point,
}

impl<Point> AABB<Point> {
    pub fn new(min: Point, max: Point) -> AABB<Point> {
        AABB { min, max }
    }

    pub fn map<Point2, F: FnMut(&Point) -> Point2>(&self, mut f: F) -> AABB<Point2> {
        AABB {
            min: f(&self.min),
            max: f(&self.max),
        }
    }

    pub fn zip_map<Point2, Point3, F: FnMut(&Point, &Point2) -> Point3>(
        &self,
        rhs: &AABB<Point2>,
        mut f: F,
    ) -> AABB<Point3> {
        AABB {
            min: f(&self.min, &rhs.min),
            max: f(&self.max, &rhs.max),
        }
    }
}

impl<Point> From<[Point; 2]> for AABB<Point> {
    fn from(value: [Point; 2]) -> Self {
        let [min, max] = value;
        AABB { min, max }
    }
}

impl<Point> From<(Point, Point)> for AABB<Point> {
    fn from(value: (Point, Point)) -> Self {
        let (min, max) = value;
        AABB { min, max }
    }
}

/// Componentwise min / max that ignore NaN components of `rhs`.
fn inf(lhs: &WorldPoint, rhs: &WorldPoint) -> WorldPoint {
    lhs.coords.zip_map(&rhs.coords, FloatType::min).into()
}

fn sup(lhs: &WorldPoint, rhs: &WorldPoint) -> WorldPoint {
    lhs.coords.zip_map(&rhs.coords, FloatType::max).into()
}

impl AABB<WorldPoint> {
    /// Box that contains nothing; identity for [`AABB::union`].
    pub fn empty() -> Self {
        AABB {
            min: WorldPoint::new(
                FloatType::INFINITY,
                FloatType::INFINITY,
                FloatType::INFINITY,
            ),
            max: WorldPoint::new(
                FloatType::NEG_INFINITY,
                FloatType::NEG_INFINITY,
                FloatType::NEG_INFINITY,
            ),
        }
    }

    pub fn from_point(p: &WorldPoint) -> Self {
        let mut ret = Self::empty();
        ret.enlarge_point(p);
        ret
    }

    pub fn from_points<'a>(points: impl IntoIterator<Item = &'a WorldPoint>) -> Self {
        points.into_iter().fold(Self::empty(), |mut acc, p| {
            acc.enlarge_point(p);
            acc
        })
    }

    pub fn is_empty(&self) -> bool {
        (0..3).any(|axis| !(self.min[axis] <= self.max[axis]))
    }

    pub fn enlarge_point(&mut self, p: &WorldPoint) {
        self.min = inf(&self.min, p);
        self.max = sup(&self.max, p);
    }

    pub fn enlarge_box(&mut self, other: &Self) {
        self.min = inf(&self.min, &other.min);
        self.max = sup(&self.max, &other.max);
    }

    pub fn union(&self, other: &Self) -> Self {
        let mut ret = *self;
        ret.enlarge_box(other);
        ret
    }

    /// True if every point of `other` lies within self. Empty boxes are contained everywhere.
    pub fn contains_box(&self, other: &Self) -> bool {
        other.is_empty()
            || (0..3).all(|axis| {
                self.min[axis] <= other.min[axis] && other.max[axis] <= self.max[axis]
            })
    }

    pub fn size(&self) -> WorldVector {
        self.max - self.min
    }

    pub fn axis_length(&self, axis: usize) -> FloatType {
        self.max[axis] - self.min[axis]
    }

    pub fn center(&self) -> WorldPoint {
        nalgebra::center(&self.min, &self.max)
    }

    /// Index of the longest axis; ties resolve to the lower index.
    pub fn longest_axis(&self) -> usize {
        let size = self.size();
        let mut best = 0;
        for axis in 1..3 {
            if size[axis] > size[best] {
                best = axis;
            }
        }
        best
    }

    pub fn surface_area(&self) -> FloatType {
        if self.is_empty() {
            return 0.0;
        }
        let size = self.size();
        2.0 * (size.x * size.y + size.y * size.z + size.z * size.x)
    }

    /// Splits the surface into the two caps perpendicular to `axis` and the mantle around it.
    /// Returns area of one cap and the circumference of the cap, so that
    /// `surface_area == 2 * cap + circumference * axis_length(axis)`.
    pub fn cap_area_and_circumference(&self, axis: usize) -> (FloatType, FloatType) {
        if self.is_empty() {
            return (0.0, 0.0);
        }
        let a = self.axis_length((axis + 1) % 3);
        let b = self.axis_length((axis + 2) % 3);
        (a * b, 2.0 * (a + b))
    }

    /// Surface area evaluated through the cap decomposition along `axis`.
    pub fn surface_area_along(&self, axis: usize) -> FloatType {
        let (cap, circumference) = self.cap_area_and_circumference(axis);
        2.0 * cap + circumference * self.axis_length(axis).max(0.0)
    }
}
