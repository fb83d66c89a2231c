//! Planar polygon geometry and the area-identical predicate
//!
//! Two polygon sets are area-identical when they cover exactly the same
//! area. Boundaries are compared after normalization, so vertex order,
//! starting vertex, ring orientation, closing vertices, repeated vertices and
//! collinear vertices do not affect the result.

pub mod wkb;

/// A 2D coordinate (x, y)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coord {
    pub x: f64,
    pub y: f64,
}

impl Coord {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    fn approx_eq(&self, other: &Coord, tolerance: f64) -> bool {
        (self.x - other.x).abs() <= tolerance && (self.y - other.y).abs() <= tolerance
    }
}

impl From<(f64, f64)> for Coord {
    fn from((x, y): (f64, f64)) -> Self {
        Self { x, y }
    }
}

/// Polygon with one exterior ring and any number of holes
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Polygon {
    pub exterior: Vec<Coord>,
    pub interiors: Vec<Vec<Coord>>,
}

impl Polygon {
    pub fn new(exterior: Vec<Coord>, interiors: Vec<Vec<Coord>>) -> Self {
        Self { exterior, interiors }
    }

    #[cfg(test)]
    pub fn area(&self) -> f64 {
        let holes: f64 = self.interiors.iter().map(|r| signed_area(r).abs()).sum();
        signed_area(&self.exterior).abs() - holes
    }
}

/// One feature's polygon parts
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MultiPolygon(pub Vec<Polygon>);

impl MultiPolygon {
    pub fn is_empty(&self) -> bool {
        self.0.iter().all(|p| p.exterior.len() < 3)
    }

    #[cfg(test)]
    pub fn area(&self) -> f64 {
        self.0.iter().map(Polygon::area).sum()
    }
}

impl From<Polygon> for MultiPolygon {
    fn from(polygon: Polygon) -> Self {
        MultiPolygon(vec![polygon])
    }
}

/// Shoelace area; positive for counter-clockwise rings
pub fn signed_area(ring: &[Coord]) -> f64 {
    if ring.len() < 3 {
        return 0.0;
    }
    let mut sum = 0.0;
    for i in 0..ring.len() {
        let a = ring[i];
        let b = ring[(i + 1) % ring.len()];
        sum += a.x * b.y - b.x * a.y;
    }
    sum / 2.0
}

/// Even-odd point in ring test
pub fn point_in_ring(point: Coord, ring: &[Coord]) -> bool {
    let mut inside = false;
    let n = ring.len();
    if n < 3 {
        return false;
    }
    let mut j = n - 1;
    for i in 0..n {
        let (a, b) = (ring[i], ring[j]);
        if (a.y > point.y) != (b.y > point.y)
            && point.x < (b.x - a.x) * (point.y - a.y) / (b.y - a.y) + a.x
        {
            inside = !inside;
        }
        j = i;
    }
    inside
}

/// Group a flat list of rings into polygons.
///
/// Rings wound clockwise (negative signed area) open a new polygon; the
/// others are holes assigned to the polygon whose exterior contains them.
/// A leading counter-clockwise ring with no polygon to attach to is taken as
/// an exterior.
pub fn polygons_from_rings(rings: Vec<Vec<Coord>>) -> Vec<Polygon> {
    let mut polygons: Vec<Polygon> = Vec::new();
    let mut orphan_holes: Vec<Vec<Coord>> = Vec::new();

    for ring in rings {
        if ring.len() < 3 {
            continue;
        }
        if signed_area(&ring) < 0.0 || polygons.is_empty() {
            polygons.push(Polygon::new(ring, Vec::new()));
        } else {
            orphan_holes.push(ring);
        }
    }

    for hole in orphan_holes {
        let probe = hole[0];
        match polygons.iter_mut().find(|p| point_in_ring(probe, &p.exterior)) {
            Some(polygon) => polygon.interiors.push(hole),
            // Counter-clockwise ring outside every exterior: a separate part
            None => polygons.push(Polygon::new(hole, Vec::new())),
        }
    }

    polygons
}

/// Normalize a ring for comparison.
///
/// Drops the closing vertex, repeated vertices and vertices lying on the
/// segment between their neighbours, orients the ring, and rotates it to
/// start at its lowest vertex. Returns `None` for degenerate rings.
pub fn normalize_ring(ring: &[Coord], counter_clockwise: bool, tolerance: f64) -> Option<Vec<Coord>> {
    let mut points: Vec<Coord> = Vec::with_capacity(ring.len());
    for &p in ring {
        if points.last().is_none_or(|last| !last.approx_eq(&p, tolerance)) {
            points.push(p);
        }
    }
    while points.len() > 1 && points[0].approx_eq(&points[points.len() - 1], tolerance) {
        points.pop();
    }

    loop {
        if points.len() < 3 {
            return None;
        }
        let n = points.len();
        let removable = (0..n).find(|&i| {
            let prev = points[(i + n - 1) % n];
            let next = points[(i + 1) % n];
            distance_to_line(points[i], prev, next) <= tolerance
        });
        match removable {
            Some(i) => {
                points.remove(i);
            }
            None => break,
        }
    }

    let area = signed_area(&points);
    if (area > 0.0) != counter_clockwise {
        points.reverse();
    }

    let start = points
        .iter()
        .enumerate()
        .min_by(|(_, a), (_, b)| {
            a.x.partial_cmp(&b.x)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.y.partial_cmp(&b.y).unwrap_or(std::cmp::Ordering::Equal))
        })
        .map(|(i, _)| i)
        .unwrap_or(0);
    points.rotate_left(start);

    Some(points)
}

fn distance_to_line(p: Coord, a: Coord, b: Coord) -> f64 {
    let dx = b.x - a.x;
    let dy = b.y - a.y;
    let len = (dx * dx + dy * dy).sqrt();
    if len == 0.0 {
        return ((p.x - a.x).powi(2) + (p.y - a.y).powi(2)).sqrt();
    }
    ((p.x - a.x) * dy - (p.y - a.y) * dx).abs() / len
}

/// Equal up to a cyclic shift; the normalized start vertex is not stable
/// when two candidates differ by less than the tolerance
fn rings_equal(a: &[Coord], b: &[Coord], tolerance: f64) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let n = b.len();
    n == 0
        || (0..n).any(|offset| {
            a.iter()
                .enumerate()
                .all(|(i, p)| p.approx_eq(&b[(i + offset) % n], tolerance))
        })
}

#[derive(Debug, Clone)]
struct NormalizedPolygon {
    exterior: Vec<Coord>,
    interiors: Vec<Vec<Coord>>,
}

fn normalize_polygon(polygon: &Polygon, tolerance: f64) -> Option<NormalizedPolygon> {
    let exterior = normalize_ring(&polygon.exterior, true, tolerance)?;
    let interiors = polygon
        .interiors
        .iter()
        .filter_map(|r| normalize_ring(r, false, tolerance))
        .collect();
    Some(NormalizedPolygon { exterior, interiors })
}

/// Match every ring of `a` with a distinct equal ring of `b`
fn ring_sets_equal(a: &[Vec<Coord>], b: &[Vec<Coord>], tolerance: f64) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut used = vec![false; b.len()];
    for ring in a {
        let found = b
            .iter()
            .enumerate()
            .find(|(j, other)| !used[*j] && rings_equal(ring, other, tolerance));
        match found {
            Some((j, _)) => used[j] = true,
            None => return false,
        }
    }
    true
}

/// Whether two polygon sets cover exactly the same area
pub fn area_identical(a: &MultiPolygon, b: &MultiPolygon, tolerance: f64) -> bool {
    let left: Vec<NormalizedPolygon> = a.0.iter().filter_map(|p| normalize_polygon(p, tolerance)).collect();
    let right: Vec<NormalizedPolygon> = b.0.iter().filter_map(|p| normalize_polygon(p, tolerance)).collect();

    if left.is_empty() || left.len() != right.len() {
        return false;
    }

    let mut used = vec![false; right.len()];
    for polygon in &left {
        let found = right.iter().enumerate().find(|(j, other)| {
            !used[*j]
                && rings_equal(&polygon.exterior, &other.exterior, tolerance)
                && ring_sets_equal(&polygon.interiors, &other.interiors, tolerance)
        });
        match found {
            Some((j, _)) => used[j] = true,
            None => return false,
        }
    }
    true
}

#[cfg(test)]
pub(crate) fn square(x0: f64, y0: f64, size: f64) -> Vec<Coord> {
    vec![
        Coord::new(x0, y0),
        Coord::new(x0 + size, y0),
        Coord::new(x0 + size, y0 + size),
        Coord::new(x0, y0 + size),
        Coord::new(x0, y0),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOL: f64 = 1e-9;

    #[test]
    fn test_signed_area_orientation() {
        let ccw = square(0.0, 0.0, 2.0);
        assert_eq!(signed_area(&ccw), 4.0);
        let mut cw = ccw.clone();
        cw.reverse();
        assert_eq!(signed_area(&cw), -4.0);
    }

    #[test]
    fn test_identical_with_different_start_and_orientation() {
        let a = MultiPolygon::from(Polygon::new(square(0.0, 0.0, 1.0), vec![]));

        let mut ring = vec![
            Coord::new(1.0, 1.0),
            Coord::new(1.0, 0.0),
            Coord::new(0.0, 0.0),
            Coord::new(0.0, 1.0),
        ];
        ring.push(ring[0]);
        let b = MultiPolygon::from(Polygon::new(ring, vec![]));

        assert!(area_identical(&a, &b, TOL));
    }

    #[test]
    fn test_identical_ignores_collinear_and_repeated_vertices() {
        let a = MultiPolygon::from(Polygon::new(square(0.0, 0.0, 2.0), vec![]));
        let b = MultiPolygon::from(Polygon::new(
            vec![
                Coord::new(0.0, 0.0),
                Coord::new(1.0, 0.0),
                Coord::new(1.0, 0.0),
                Coord::new(2.0, 0.0),
                Coord::new(2.0, 2.0),
                Coord::new(0.0, 2.0),
                Coord::new(0.0, 1.0),
            ],
            vec![],
        ));

        assert!(area_identical(&a, &b, TOL));
    }

    #[test]
    fn test_shifted_polygon_is_not_identical() {
        let a = MultiPolygon::from(Polygon::new(square(0.0, 0.0, 1.0), vec![]));
        let b = MultiPolygon::from(Polygon::new(square(0.001, 0.0, 1.0), vec![]));

        assert!(!area_identical(&a, &b, TOL));
        assert!(area_identical(&a, &b, 0.01));
    }

    #[test]
    fn test_hole_must_match() {
        let with_hole = MultiPolygon::from(Polygon::new(
            square(0.0, 0.0, 10.0),
            vec![square(2.0, 2.0, 1.0)],
        ));
        let without_hole = MultiPolygon::from(Polygon::new(square(0.0, 0.0, 10.0), vec![]));

        assert!(!area_identical(&with_hole, &without_hole, TOL));
        assert!(area_identical(&with_hole, &with_hole.clone(), TOL));
        assert!((with_hole.area() - 99.0).abs() < 1e-12);
    }

    #[test]
    fn test_multipart_order_does_not_matter() {
        let a = MultiPolygon(vec![
            Polygon::new(square(0.0, 0.0, 1.0), vec![]),
            Polygon::new(square(5.0, 5.0, 1.0), vec![]),
        ]);
        let b = MultiPolygon(vec![
            Polygon::new(square(5.0, 5.0, 1.0), vec![]),
            Polygon::new(square(0.0, 0.0, 1.0), vec![]),
        ]);
        assert!(area_identical(&a, &b, TOL));

        let single = MultiPolygon(vec![Polygon::new(square(0.0, 0.0, 1.0), vec![])]);
        assert!(!area_identical(&a, &single, TOL));
    }

    #[test]
    fn test_empty_is_never_identical() {
        let empty = MultiPolygon::default();
        assert!(!area_identical(&empty, &empty, TOL));
    }

    #[test]
    fn test_polygons_from_rings_assigns_holes() {
        let mut exterior = square(0.0, 0.0, 10.0);
        exterior.reverse(); // clockwise, as EsriJSON writes exteriors
        let hole = square(2.0, 2.0, 1.0);
        let mut second = square(20.0, 20.0, 1.0);
        second.reverse();

        let polygons = polygons_from_rings(vec![exterior, hole, second]);

        assert_eq!(polygons.len(), 2);
        assert_eq!(polygons[0].interiors.len(), 1);
        assert!(polygons[1].interiors.is_empty());
    }

    #[test]
    fn test_sub_tolerance_noise_on_vertical_edge() {
        let local = MultiPolygon::from(Polygon::new(square(-74.0, 4.0, 0.01), vec![]));
        let remote = MultiPolygon::from(Polygon::new(
            vec![
                Coord::new(-74.0000001, 4.0),
                Coord::new(-73.99, 4.0),
                Coord::new(-73.99, 4.01),
                Coord::new(-74.0000002, 4.01),
                Coord::new(-74.0000001, 4.0),
            ],
            vec![],
        ));

        assert!(area_identical(&local, &remote, 1e-6));
        assert!(area_identical(&remote, &local, 1e-6));
        assert!(!area_identical(&local, &remote, 1e-9));
    }

    #[test]
    fn test_point_in_ring() {
        let ring = square(0.0, 0.0, 4.0);
        assert!(point_in_ring(Coord::new(1.0, 1.0), &ring));
        assert!(!point_in_ring(Coord::new(5.0, 1.0), &ring));
    }
}
