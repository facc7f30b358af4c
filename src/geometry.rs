//! R-tree index over per-instruction route geometry.
//!
//! Each instruction contributes one entry: a single point when its path
//! interval is degenerate, otherwise the polyline slice of the route path.
//! All distances are planar in (lon, lat) degrees.

use geo::{Coord, LineInterpolatePoint, LineLocatePoint, LineString, Point};
use rstar::{PointDistance, RTree, RTreeObject, AABB};

use crate::route::Route;
use crate::GpsPoint;

/// Squared-distance slack within which two candidates count as tied.
const TIE_EPSILON_2: f64 = 1e-18;

/// Geometry of one instruction.
#[derive(Debug, Clone, PartialEq)]
pub enum LegGeometry {
    Point(Point<f64>),
    Line(LineString<f64>),
}

impl LegGeometry {
    fn from_points(points: &[GpsPoint]) -> Self {
        let coords: Vec<Coord> = points
            .iter()
            .map(|p| Coord {
                x: p.longitude,
                y: p.latitude,
            })
            .collect();
        match coords.as_slice() {
            [single] => LegGeometry::Point(Point::from(*single)),
            _ => LegGeometry::Line(LineString::new(coords)),
        }
    }

    /// Project a query point onto this geometry.
    ///
    /// Returns `(fraction, offset)`: the arc-length fraction of the closest
    /// point along the line (always 1.0 for a point geometry) and the distance
    /// from the query to that closest point.
    pub fn project(&self, query: Point<f64>) -> (f64, f64) {
        match self {
            LegGeometry::Point(p) => (1.0, planar_distance(*p, query)),
            LegGeometry::Line(line) => {
                let fraction = line
                    .line_locate_point(&query)
                    .filter(|f| f.is_finite())
                    .unwrap_or(0.0)
                    .clamp(0.0, 1.0);
                let closest = line
                    .line_interpolate_point(fraction)
                    .or_else(|| line.points().next());
                match closest {
                    Some(c) => (fraction, planar_distance(c, query)),
                    None => (fraction, f64::INFINITY),
                }
            }
        }
    }

    fn envelope(&self) -> AABB<[f64; 2]> {
        match self {
            LegGeometry::Point(p) => AABB::from_point([p.x(), p.y()]),
            LegGeometry::Line(line) => {
                let corners: Vec<[f64; 2]> = line.coords().map(|c| [c.x, c.y]).collect();
                AABB::from_points(&corners)
            }
        }
    }
}

fn planar_distance(a: Point<f64>, b: Point<f64>) -> f64 {
    (a.x() - b.x()).hypot(a.y() - b.y())
}

/// An instruction geometry stored in the R-tree.
#[derive(Debug, Clone)]
struct IndexedLeg {
    instruction_index: usize,
    geometry: LegGeometry,
    envelope: AABB<[f64; 2]>,
}

impl RTreeObject for IndexedLeg {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

impl PointDistance for IndexedLeg {
    fn distance_2(&self, point: &[f64; 2]) -> f64 {
        let (_, offset) = self.geometry.project(Point::new(point[0], point[1]));
        offset * offset
    }
}

/// Result of snapping a fix to the route.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Snap {
    /// Index of the nearest instruction
    pub instruction_index: usize,
    /// Arc-length fraction along the instruction's geometry, in [0, 1]
    pub fraction: f64,
    /// Distance from the fix to the geometry, in degrees
    pub offset: f64,
}

/// Immutable nearest-geometry index for one route revision.
///
/// Any route change requires a full rebuild.
#[derive(Debug)]
pub struct GeometryIndex {
    tree: RTree<IndexedLeg>,
    geometries: Vec<LegGeometry>,
}

impl GeometryIndex {
    /// Build the index over every instruction of `route`.
    pub fn build(route: &Route) -> Self {
        let geometries: Vec<LegGeometry> = (0..route.instructions.len())
            .map(|i| LegGeometry::from_points(route.leg_points(i)))
            .collect();

        let entries: Vec<IndexedLeg> = geometries
            .iter()
            .enumerate()
            .map(|(i, g)| IndexedLeg {
                instruction_index: i,
                envelope: g.envelope(),
                geometry: g.clone(),
            })
            .collect();

        Self {
            tree: RTree::bulk_load(entries),
            geometries,
        }
    }

    /// Find the instruction geometry nearest to `point`.
    ///
    /// Ties are broken by the lowest instruction index. Returns `None` only
    /// for an empty index.
    pub fn nearest(&self, point: GpsPoint) -> Option<Snap> {
        let query = [point.longitude, point.latitude];
        let mut candidates = self.tree.nearest_neighbor_iter_with_distance_2(&query);
        let (mut best, best_distance_2) = candidates.next()?;

        for (leg, distance_2) in candidates {
            if distance_2 > best_distance_2 + TIE_EPSILON_2 {
                break;
            }
            if leg.instruction_index < best.instruction_index {
                best = leg;
            }
        }

        let (fraction, offset) = best.geometry.project(Point::new(query[0], query[1]));
        Some(Snap {
            instruction_index: best.instruction_index,
            fraction,
            offset,
        })
    }

    /// Geometry of one instruction.
    pub fn geometry(&self, instruction_index: usize) -> Option<&LegGeometry> {
        self.geometries.get(instruction_index)
    }

    /// Number of indexed instructions.
    pub fn len(&self) -> usize {
        self.tree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }
}
