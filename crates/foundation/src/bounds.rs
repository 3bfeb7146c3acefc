/// Axis-aligned 2D bounding box in mesh space.
///
/// Serialized as `[minx, miny, maxx, maxy]`, the shape filter payloads use.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Aabb2 {
    pub min: [f64; 2],
    pub max: [f64; 2],
}

impl Aabb2 {
    pub fn new(min: [f64; 2], max: [f64; 2]) -> Self {
        Aabb2 { min, max }
    }

    pub fn from_array(b: [f64; 4]) -> Self {
        Aabb2::new([b[0], b[1]], [b[2], b[3]])
    }

    pub fn to_array(self) -> [f64; 4] {
        [self.min[0], self.min[1], self.max[0], self.max[1]]
    }

    /// Smallest box around `points`, or `None` for an empty iterator.
    pub fn from_points(points: impl IntoIterator<Item = [f64; 2]>) -> Option<Self> {
        let mut out: Option<Aabb2> = None;
        for p in points {
            out = Some(match out {
                None => Aabb2::new(p, p),
                Some(b) => b.expand(p),
            });
        }
        out
    }

    pub fn expand(self, p: [f64; 2]) -> Self {
        Aabb2::new(
            [self.min[0].min(p[0]), self.min[1].min(p[1])],
            [self.max[0].max(p[0]), self.max[1].max(p[1])],
        )
    }

    pub fn union(self, other: Aabb2) -> Self {
        self.expand(other.min).expand(other.max)
    }

    /// Inclusive on every edge.
    pub fn contains(&self, x: f64, y: f64) -> bool {
        x >= self.min[0] && x <= self.max[0] && y >= self.min[1] && y <= self.max[1]
    }
}
