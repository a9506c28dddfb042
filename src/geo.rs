use crate::error::{PanotourError, PanotourResult};

/// A WGS84 position in double-precision degrees.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Coordinate {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinate {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    pub fn validate(&self) -> PanotourResult<()> {
        if !self.lat.is_finite() || !(-90.0..=90.0).contains(&self.lat) {
            return Err(PanotourError::invalid_geometry(format!(
                "latitude {} out of range [-90, 90]",
                self.lat
            )));
        }
        if !self.lng.is_finite() || !(-180.0..=180.0).contains(&self.lng) {
            return Err(PanotourError::invalid_geometry(format!(
                "longitude {} out of range [-180, 180]",
                self.lng
            )));
        }
        Ok(())
    }
}

/// A closed boundary polygon.
///
/// The vertex list is implicitly closed (last connects back to first) and is
/// validated at construction, so containment queries are infallible. The
/// vertex shape matches the boundary store's JSON (`[{ "lat": .., "lng": .. }]`)
/// and deserializes into it directly.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "Vec<Coordinate>", into = "Vec<Coordinate>")]
pub struct Polygon {
    vertices: Vec<Coordinate>,
}

impl Polygon {
    pub fn new(vertices: Vec<Coordinate>) -> PanotourResult<Self> {
        if vertices.len() < 3 {
            return Err(PanotourError::invalid_geometry(format!(
                "polygon requires at least 3 vertices, got {}",
                vertices.len()
            )));
        }
        for v in &vertices {
            v.validate()?;
        }
        Ok(Self { vertices })
    }

    pub fn vertices(&self) -> &[Coordinate] {
        &self.vertices
    }

    /// Ray-casting containment test over the closed boundary.
    ///
    /// Points lying exactly on an edge (or vertex) are classified inside, so
    /// boundary-adjacent marker and endpoint placements are never rejected.
    pub fn contains(&self, point: Coordinate) -> bool {
        let n = self.vertices.len();
        let mut inside = false;

        for i in 0..n {
            let a = self.vertices[i];
            let b = self.vertices[(i + 1) % n];

            if on_segment(point, a, b) {
                return true;
            }

            // Horizontal ray toward +lng; half-open vertex rule avoids double
            // counting edges that meet at the ray's latitude.
            if (a.lat > point.lat) != (b.lat > point.lat) {
                let lng_at_ray =
                    a.lng + (point.lat - a.lat) / (b.lat - a.lat) * (b.lng - a.lng);
                if point.lng < lng_at_ray {
                    inside = !inside;
                }
            }
        }

        inside
    }
}

impl TryFrom<Vec<Coordinate>> for Polygon {
    type Error = PanotourError;

    fn try_from(vertices: Vec<Coordinate>) -> PanotourResult<Self> {
        Polygon::new(vertices)
    }
}

impl From<Polygon> for Vec<Coordinate> {
    fn from(polygon: Polygon) -> Self {
        polygon.vertices
    }
}

const EDGE_EPS: f64 = 1e-9;

fn on_segment(p: Coordinate, a: Coordinate, b: Coordinate) -> bool {
    let cross = (b.lng - a.lng) * (p.lat - a.lat) - (b.lat - a.lat) * (p.lng - a.lng);
    if cross.abs() > EDGE_EPS {
        return false;
    }
    p.lng >= a.lng.min(b.lng) - EDGE_EPS
        && p.lng <= a.lng.max(b.lng) + EDGE_EPS
        && p.lat >= a.lat.min(b.lat) - EDGE_EPS
        && p.lat <= a.lat.max(b.lat) + EDGE_EPS
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square() -> Polygon {
        Polygon::new(vec![
            Coordinate::new(0.0, 0.0),
            Coordinate::new(0.0, 4.0),
            Coordinate::new(4.0, 4.0),
            Coordinate::new(4.0, 0.0),
        ])
        .unwrap()
    }

    #[test]
    fn rejects_fewer_than_three_vertices() {
        let err = Polygon::new(vec![Coordinate::new(0.0, 0.0), Coordinate::new(1.0, 1.0)])
            .unwrap_err();
        assert!(matches!(err, PanotourError::InvalidGeometry(_)));
    }

    #[test]
    fn rejects_out_of_range_coordinates() {
        let err = Polygon::new(vec![
            Coordinate::new(0.0, 0.0),
            Coordinate::new(91.0, 1.0),
            Coordinate::new(1.0, 1.0),
        ])
        .unwrap_err();
        assert!(matches!(err, PanotourError::InvalidGeometry(_)));
    }

    #[test]
    fn centroid_is_inside_and_far_point_is_outside() {
        let sq = square();
        assert!(sq.contains(Coordinate::new(2.0, 2.0)));
        assert!(!sq.contains(Coordinate::new(50.0, 50.0)));
    }

    #[test]
    fn boundary_edges_and_vertices_are_inclusive() {
        let sq = square();
        // Edge midpoints.
        assert!(sq.contains(Coordinate::new(0.0, 2.0)));
        assert!(sq.contains(Coordinate::new(4.0, 2.0)));
        assert!(sq.contains(Coordinate::new(2.0, 0.0)));
        assert!(sq.contains(Coordinate::new(2.0, 4.0)));
        // Vertices.
        assert!(sq.contains(Coordinate::new(0.0, 0.0)));
        assert!(sq.contains(Coordinate::new(4.0, 4.0)));
    }

    #[test]
    fn concave_polygon_notch_is_outside() {
        // A square with a notch cut into the top edge.
        let poly = Polygon::new(vec![
            Coordinate::new(0.0, 0.0),
            Coordinate::new(0.0, 4.0),
            Coordinate::new(4.0, 4.0),
            Coordinate::new(4.0, 2.5),
            Coordinate::new(2.0, 2.5),
            Coordinate::new(2.0, 1.5),
            Coordinate::new(4.0, 1.5),
            Coordinate::new(4.0, 0.0),
        ])
        .unwrap();
        assert!(!poly.contains(Coordinate::new(3.0, 2.0)));
        assert!(poly.contains(Coordinate::new(1.0, 2.0)));
    }

    #[test]
    fn deserializes_directly_from_boundary_store_json() {
        let json = r#"[{"lat":0.0,"lng":0.0},{"lat":0.0,"lng":1.0},{"lat":1.0,"lng":0.5}]"#;
        let poly: Polygon = serde_json::from_str(json).unwrap();
        assert_eq!(poly.vertices().len(), 3);

        let too_few = r#"[{"lat":0.0,"lng":0.0},{"lat":0.0,"lng":1.0}]"#;
        assert!(serde_json::from_str::<Polygon>(too_few).is_err());
    }
}
