/// Survey geometry: transmitter loop, surface line and borehole GPS
use crate::error::{PemError, Result};
use crate::tools;

/// μ0 / 4π in nT·m/A
const MU0_OVER_4PI_NT: f64 = 100.;

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct GpsPoint {
    pub easting: f64,
    pub northing: f64,
    pub elevation: f64,
    /// 0: metres, 1: feet
    pub units: u8,
}

impl GpsPoint {
    pub fn xyz(&self) -> [f64; 3] {
        [self.easting, self.northing, self.elevation]
    }
}

/// A surveyed point of a surface line
#[derive(Debug, Clone, PartialEq)]
pub struct StationGps {
    pub point: GpsPoint,
    pub station: String,
    pub station_number: i64,
}

/// A straight section of a borehole
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Segment {
    pub azimuth: f64,
    pub dip: f64,
    pub length: f64,
    pub units: u8,
    /// The depth along the hole at the end of the segment
    pub depth: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoopGps {
    pub points: Vec<GpsPoint>,
}

impl LoopGps {
    /// A loop needs at least three corners to enclose anything
    pub fn is_complete(&self) -> bool {
        self.points.len() >= 3
    }

    /// The primary magnetic field (nT) of the closed loop at a point
    ///
    /// Biot–Savart law summed over the straight wires between consecutive corners, with the
    /// current flowing in the order of the points.
    pub fn field_at(&self, point: [f64; 3], current: f64) -> Result<[f64; 3]> {
        if !self.is_complete() {
            return Err(PemError::MissingGeometry(format!(
                "The loop has {} points; at least 3 are needed",
                self.points.len()
            )));
        }

        let mut field = [0_f64; 3];
        for i in 0..self.points.len() {
            let start = self.points[i].xyz();
            let end = self.points[(i + 1) % self.points.len()].xyz();

            let r1 = sub(point, start);
            let r2 = sub(point, end);
            let (n1, n2) = (norm(r1), norm(r2));
            let denominator = n1 * n2 * (n1 * n2 + dot(r1, r2));

            // The point lies on the wire (or its extension); that wire does not contribute.
            if denominator.abs() < 1e-12 {
                continue;
            }
            let factor = MU0_OVER_4PI_NT * current * (n1 + n2) / denominator;
            let c = cross(r1, r2);
            for k in 0..3 {
                field[k] += factor * c[k];
            }
        }
        Ok(field)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LineGps {
    pub points: Vec<StationGps>,
}

impl LineGps {
    /// Get the coordinate of a station by interp- or extrapolation
    ///
    /// If the station is lower than or equal to the first surveyed station, the first coordinate
    /// is given (bfill). If it is higher than or equal to the last, the last coordinate is given
    /// (ffill). Exact matches are given as is, and stations in between two surveyed stations
    /// are linearly interpolated.
    pub fn coord_at_station(&self, station_number: i64) -> Option<[f64; 3]> {
        let mut points = self.points.iter().collect::<Vec<&StationGps>>();
        points.sort_by_key(|p| p.station_number);

        let first = *points.first()?;
        let last = *points.last()?;

        if station_number <= first.station_number {
            return Some(first.point.xyz());
        }
        if station_number >= last.station_number {
            return Some(last.point.xyz());
        }

        let mut previous = first;
        for point in points {
            if point.station_number == station_number {
                return Some(point.point.xyz());
            }
            if station_number < point.station_number {
                let v = tools::interpolate_values(
                    previous.station_number as f64,
                    &previous.point.xyz(),
                    point.station_number as f64,
                    &point.point.xyz(),
                    station_number as f64,
                );
                return Some([v[0], v[1], v[2]]);
            }
            previous = point;
        }
        Some(last.point.xyz())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct HoleGeometry {
    pub collar: Option<GpsPoint>,
    pub segments: Vec<Segment>,
}

impl HoleGeometry {
    pub fn is_complete(&self) -> bool {
        self.collar.is_some() & !self.segments.is_empty()
    }

    fn require(&self) -> Result<(GpsPoint, &[Segment])> {
        match (self.collar, self.segments.is_empty()) {
            (Some(collar), false) => Ok((collar, &self.segments)),
            (None, _) => Err(PemError::MissingGeometry("No collar coordinate".into())),
            (_, true) => Err(PemError::MissingGeometry("No hole segments".into())),
        }
    }

    /// The coordinate at a depth along the hole, walking the segments from the collar
    ///
    /// Depths beyond the last segment are extrapolated along it.
    pub fn position_at(&self, depth: f64) -> Result<[f64; 3]> {
        let (collar, segments) = self.require()?;

        let mut position = collar.xyz();
        let mut remaining = depth.max(0.);
        for (i, segment) in segments.iter().enumerate() {
            let step = match (remaining <= segment.length) | (i == segments.len() - 1) {
                true => remaining,
                false => segment.length,
            };
            let direction = direction(segment.azimuth, segment.dip);
            for k in 0..3 {
                position[k] += direction[k] * step;
            }
            remaining -= step;
            if remaining <= 0. {
                break;
            }
        }
        Ok(position)
    }

    /// The azimuth and dip of the segment containing a depth
    pub fn orientation_at(&self, depth: f64) -> Result<(f64, f64)> {
        let (_, segments) = self.require()?;
        let segment = segments
            .iter()
            .find(|s| depth <= s.depth)
            .or(segments.last())
            .ok_or_else(|| PemError::MissingGeometry("No hole segments".into()))?;
        Ok((segment.azimuth, segment.dip))
    }
}

/// The unit vector of a direction given by azimuth (clockwise from north) and dip (negative
/// downwards), in (easting, northing, elevation)
pub fn direction(azimuth: f64, dip: f64) -> [f64; 3] {
    let (az, dip) = (azimuth.to_radians(), dip.to_radians());
    [az.sin() * dip.cos(), az.cos() * dip.cos(), dip.sin()]
}

/// The X, Y and Z axes of a borehole tool at zero roll
///
/// Z points down the hole. X points to the high side of the hole, perpendicular to Z in the
/// vertical plane (towards the azimuth for vertical holes). Y = Z × X.
pub fn tool_frame(azimuth: f64, dip: f64) -> [[f64; 3]; 3] {
    let z = direction(azimuth, dip);
    let up = [0., 0., 1.];
    let along = dot(up, z);
    let mut x = [up[0] - along * z[0], up[1] - along * z[1], up[2] - along * z[2]];
    if norm(x) < 1e-9 {
        let az = azimuth.to_radians();
        x = [az.sin(), az.cos(), 0.];
    }
    let length = norm(x);
    let x = [x[0] / length, x[1] / length, x[2] / length];
    let y = cross(z, x);
    [x, y, z]
}

/// Project a vector onto the axes of a tool frame
pub fn to_tool_frame(vector: [f64; 3], frame: &[[f64; 3]; 3]) -> [f64; 3] {
    [dot(vector, frame[0]), dot(vector, frame[1]), dot(vector, frame[2])]
}

fn sub(a: [f64; 3], b: [f64; 3]) -> [f64; 3] {
    [a[0] - b[0], a[1] - b[1], a[2] - b[2]]
}

fn dot(a: [f64; 3], b: [f64; 3]) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

fn cross(a: [f64; 3], b: [f64; 3]) -> [f64; 3] {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

fn norm(a: [f64; 3]) -> f64 {
    dot(a, a).sqrt()
}
