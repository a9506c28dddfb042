use crate::{
    error::{PanotourError, PanotourResult},
    geo::Coordinate,
};

/// One stop along the navigation order of a decoded route.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct RoutePoint {
    pub index: usize,
    pub coord: Coordinate,
}

/// Directions-service response shape: route -> legs -> steps.
///
/// Each step carries either an encoded polyline or an explicit coordinate
/// path. The shape deserializes straight from the directions collaborator's
/// JSON; unknown fields are ignored.
#[derive(Clone, Debug, serde::Deserialize)]
pub struct RouteResponse {
    pub status: String,
    #[serde(default)]
    pub routes: Vec<Route>,
}

#[derive(Clone, Debug, serde::Deserialize)]
pub struct Route {
    #[serde(default)]
    pub legs: Vec<Leg>,
}

#[derive(Clone, Debug, serde::Deserialize)]
pub struct Leg {
    #[serde(default)]
    pub steps: Vec<Step>,
}

#[derive(Clone, Debug, serde::Deserialize)]
pub struct Step {
    #[serde(default)]
    pub polyline: Option<EncodedPolyline>,
    #[serde(default)]
    pub path: Option<Vec<PathPoint>>,
}

#[derive(Clone, Debug, serde::Deserialize)]
pub struct EncodedPolyline {
    pub points: String,
}

/// Explicit path coordinate.
///
/// Upstream producers are inconsistent about representation: values arrive
/// either as JSON numbers or as numeric strings. Both normalize to plain
/// `f64` here, so nothing downstream ever branches on representation.
#[derive(Clone, Copy, Debug, serde::Deserialize)]
pub struct PathPoint {
    #[serde(deserialize_with = "degrees_lenient")]
    pub lat: f64,
    #[serde(deserialize_with = "degrees_lenient")]
    pub lng: f64,
}

fn degrees_lenient<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::Deserialize as _;

    #[derive(serde::Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Num(f64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Num(v) => Ok(v),
        Raw::Text(s) => s.trim().parse::<f64>().map_err(serde::de::Error::custom),
    }
}

/// Flatten a directions response into the ordered tour point sequence.
///
/// Points append in encounter order (leg, then step, then within-step point
/// order). Consecutive duplicates represent near-stationary segments and are
/// kept. Only the primary route is toured.
pub fn extract_route_points(response: &RouteResponse) -> PanotourResult<Vec<RoutePoint>> {
    if response.status != "OK" {
        return Err(PanotourError::empty_route(format!(
            "directions status '{}'",
            response.status
        )));
    }

    let Some(route) = response.routes.first() else {
        return Err(PanotourError::empty_route("response carries no routes"));
    };

    let mut points = Vec::new();
    for leg in &route.legs {
        for step in &leg.steps {
            if let Some(polyline) = &step.polyline {
                for coord in decode_polyline(&polyline.points)? {
                    points.push(RoutePoint {
                        index: points.len(),
                        coord,
                    });
                }
            } else if let Some(path) = &step.path {
                for p in path {
                    points.push(RoutePoint {
                        index: points.len(),
                        coord: Coordinate::new(p.lat, p.lng),
                    });
                }
            }
        }
    }

    if points.is_empty() {
        return Err(PanotourError::empty_route(
            "route contained no decodable points",
        ));
    }

    Ok(points)
}

/// Decode a Google encoded polyline (5-decimal fixed point, zig-zag signed
/// base-64 varint chunks).
pub fn decode_polyline(encoded: &str) -> PanotourResult<Vec<Coordinate>> {
    let bytes = encoded.as_bytes();
    let mut coords = Vec::new();
    let mut idx = 0usize;
    let mut lat = 0i64;
    let mut lng = 0i64;

    while idx < bytes.len() {
        lat += decode_chunk(bytes, &mut idx)?;
        lng += decode_chunk(bytes, &mut idx)?;
        coords.push(Coordinate::new(lat as f64 * 1e-5, lng as f64 * 1e-5));
    }

    Ok(coords)
}

fn decode_chunk(bytes: &[u8], idx: &mut usize) -> PanotourResult<i64> {
    let mut value = 0i64;
    let mut shift = 0u32;

    loop {
        let Some(&b) = bytes.get(*idx) else {
            return Err(PanotourError::validation(
                "polyline ends mid-chunk (truncated input)",
            ));
        };
        if !(63..=126).contains(&b) {
            return Err(PanotourError::validation(format!(
                "polyline byte {b:#x} outside encoded range"
            )));
        }
        *idx += 1;

        // Well-formed coordinate deltas fit in far fewer chunks; past this
        // point the shift would leave the 64-bit accumulator.
        if shift > 60 {
            return Err(PanotourError::validation(
                "polyline chunk is longer than any encodable coordinate delta",
            ));
        }

        let chunk = i64::from(b - 63);
        value |= (chunk & 0x1f) << shift;
        shift += 5;
        if chunk & 0x20 == 0 {
            break;
        }
    }

    // Zig-zag: LSB carries the sign.
    Ok(if value & 1 != 0 {
        !(value >> 1)
    } else {
        value >> 1
    })
}
