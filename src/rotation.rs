/// De-rotation of the X and Y components of borehole surveys
use std::collections::HashMap;
use std::str::FromStr;

use ndarray::Array1;
use tracing::{debug, warn};

use crate::data::{Component, Reading};
use crate::error::{PemError, Result};
use crate::geometry::{self, HoleGeometry, LoopGps};
use crate::pem::PemFile;
use crate::rad::{self, Orientation, RotationKind, RotationStamp};

/// The start of the provenance note left on rotated files
pub const ROTATION_NOTE_PREFIX: &str = "<GEN> XY de-rotated:";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PpSource {
    /// The PP channel as recorded
    Measured,
    /// The PP channel minus the first off-time channel
    Cleaned,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationMethod {
    Accelerometer,
    Magnetometer,
    PrimaryPulse(PpSource),
}

impl RotationMethod {
    pub fn kind(&self) -> RotationKind {
        match self {
            RotationMethod::Accelerometer => RotationKind::Accelerometer,
            RotationMethod::Magnetometer => RotationKind::Magnetometer,
            RotationMethod::PrimaryPulse(PpSource::Measured) => RotationKind::MeasuredPp,
            RotationMethod::PrimaryPulse(PpSource::Cleaned) => RotationKind::CleanedPp,
        }
    }

    /// The name used in step strings, e.g. "rotate(acc)"
    pub fn name(&self) -> &'static str {
        match self {
            RotationMethod::Accelerometer => "acc",
            RotationMethod::Magnetometer => "mag",
            RotationMethod::PrimaryPulse(PpSource::Measured) => "pp",
            RotationMethod::PrimaryPulse(PpSource::Cleaned) => "cleaned_pp",
        }
    }
}

impl FromStr for RotationMethod {
    type Err = PemError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "acc" | "accelerometer" => Ok(RotationMethod::Accelerometer),
            "mag" | "magnetometer" => Ok(RotationMethod::Magnetometer),
            "pp" | "measured_pp" => Ok(RotationMethod::PrimaryPulse(PpSource::Measured)),
            "cleaned_pp" => Ok(RotationMethod::PrimaryPulse(PpSource::Cleaned)),
            other => Err(PemError::Config(format!(
                "Unknown rotation method: {other:?}. Choices: acc, mag, pp, cleaned_pp"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RotationOptions {
    pub method: RotationMethod,
    /// Sensor offset angle in degrees, added to every derived roll
    pub soa: f64,
    /// Undo and redo the rotation of an already rotated file instead of failing
    pub allow_rerotation: bool,
}

impl RotationOptions {
    pub fn new(method: RotationMethod) -> Self {
        RotationOptions {
            method,
            soa: 0.,
            allow_rerotation: false,
        }
    }
}

/// A station that was left unrotated, and why
#[derive(Debug, Clone, PartialEq)]
pub struct IneligibleStation {
    pub station: String,
    pub station_number: i64,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct RotationOutcome {
    pub file: PemFile,
    pub ineligible: Vec<IneligibleStation>,
}

/// What primary pulse rotation needs to know about the survey
struct PpContext<'a> {
    loop_gps: &'a LoopGps,
    hole: &'a HoleGeometry,
    current: f64,
    first_offtime: Option<usize>,
}

/// Rotate a vector counter-clockwise by an angle in degrees
pub fn rotate_xy(x: f64, y: f64, angle: f64) -> (f64, f64) {
    let (sin, cos) = angle.to_radians().sin_cos();
    (x * cos - y * sin, x * sin + y * cos)
}

/// Rotate every channel of an X and Y reading pair counter-clockwise by an angle in degrees
pub fn rotate_values(x: &Array1<f64>, y: &Array1<f64>, angle: f64) -> (Array1<f64>, Array1<f64>) {
    let (sin, cos) = angle.to_radians().sin_cos();
    (x * cos - y * sin, x * sin + y * cos)
}

fn check_preconditions<'a>(pem: &'a PemFile, options: &RotationOptions) -> Result<Option<PpContext<'a>>> {
    if !pem.survey_type().is_borehole() {
        return Err(PemError::Config(format!(
            "Only borehole surveys can be rotated, not {}",
            pem.survey_type()
        )));
    }
    let components = pem.components();
    if !(components.contains(&Component::X) & components.contains(&Component::Y)) {
        return Err(PemError::Config("Rotation needs both X and Y readings".into()));
    }
    if !(pem.is_averaged() & pem.is_split()) {
        return Err(PemError::Unprocessed(format!(
            "The file must be averaged and split before rotation (averaged: {}, split: {})",
            pem.is_averaged(),
            pem.is_split()
        )));
    }
    if pem.is_rotated() & !options.allow_rerotation {
        return Err(PemError::AlreadyRotated);
    }

    match options.method {
        RotationMethod::Accelerometer => Ok(None),
        RotationMethod::Magnetometer => match pem.data.active().any(|r| r.rad.has_mag_values()) {
            true => Ok(None),
            false => Err(PemError::MissingSensorData("No reading has magnetometer data".into())),
        },
        RotationMethod::PrimaryPulse(source) => {
            if !pem.loop_gps.is_complete() {
                return Err(PemError::MissingGeometry("Loop GPS is missing or incomplete".into()));
            }
            if pem.hole.collar.is_none() {
                return Err(PemError::MissingGeometry("Collar GPS is missing".into()));
            }
            if pem.hole.segments.is_empty() {
                return Err(PemError::MissingGeometry("Hole segments are missing".into()));
            }
            if !(pem.header.ramp > 0.) {
                return Err(PemError::MissingGeometry(format!(
                    "A ramp is needed for primary pulse rotation, got {}",
                    pem.header.ramp
                )));
            }
            let first_offtime = pem.table.offtime_indices().first().copied();
            if (source == PpSource::Cleaned) & first_offtime.is_none() {
                return Err(PemError::Config("No off-time channel to clean the primary pulse with".into()));
            }
            let current = pem.current().unwrap_or_else(|| {
                debug!("No current in the file; assuming 1 A for the theoretical primary pulse");
                1.
            });

            Ok(Some(PpContext {
                loop_gps: &pem.loop_gps,
                hole: &pem.hole,
                current,
                first_offtime,
            }))
        }
    }
}

/// The value of one channel of an X and Y pair
fn channel_pair(x: &Array1<f64>, y: &Array1<f64>, channel: usize) -> Result<[f64; 2]> {
    match (x.get(channel), y.get(channel)) {
        (Some(x), Some(y)) => Ok([*x, *y]),
        _ => Err(PemError::MissingSensorData(format!("No channel {channel} in the readings"))),
    }
}

/// Derive the roll of the tool of an X and Y pair, from unrotated values
fn derive_roll(
    x: &Reading,
    x_values: &Array1<f64>,
    y_values: &Array1<f64>,
    method: RotationMethod,
    context: Option<&PpContext>,
) -> Result<(f64, Orientation)> {
    let mut orientation = Orientation {
        dip: x.rad.acc_dip().ok(),
        ..Default::default()
    };

    let roll = match method {
        RotationMethod::Accelerometer => {
            let roll = x.rad.acc_roll()?;
            orientation.acc_roll = Some(roll);
            roll
        }
        RotationMethod::Magnetometer => {
            let roll = x.rad.mag_roll()?;
            orientation.mag_roll = Some(roll);
            roll
        }
        RotationMethod::PrimaryPulse(source) => {
            let context = context.ok_or_else(|| PemError::MissingGeometry("No survey geometry".into()))?;

            let depth = x.station_number as f64;
            let (azimuth, dip) = context.hole.orientation_at(depth)?;
            let position = context.hole.position_at(depth)?;
            let field = context.loop_gps.field_at(position, context.current)?;
            let theory = geometry::to_tool_frame(field, &geometry::tool_frame(azimuth, dip));

            let measured = channel_pair(x_values, y_values, 0)?;
            orientation.azimuth = Some(azimuth);
            orientation.dip = Some(dip);
            orientation.position = Some(position);
            orientation.pp_theory = Some(theory);
            orientation.pp_measured = Some(measured);

            let reference = match (source, context.first_offtime) {
                (PpSource::Measured, _) => measured,
                (PpSource::Cleaned, Some(channel)) => {
                    let offtime = channel_pair(x_values, y_values, channel)?;
                    let cleaned = [measured[0] - offtime[0], measured[1] - offtime[1]];
                    orientation.pp_cleaned = Some(cleaned);
                    cleaned
                }
                (PpSource::Cleaned, None) => {
                    return Err(PemError::Config("No off-time channel to clean the primary pulse with".into()))
                }
            };
            if theory[0].hypot(theory[1]) < f64::EPSILON {
                return Err(PemError::MissingGeometry(
                    "The theoretical primary pulse has no XY component".into(),
                ));
            }
            if reference[0].hypot(reference[1]) < f64::EPSILON {
                return Err(PemError::MissingSensorData("The primary pulse has no XY component".into()));
            }

            let roll = rad::normalize_angle((theory[1].atan2(theory[0]) - reference[1].atan2(reference[0])).to_degrees());
            match source {
                PpSource::Measured => orientation.measured_pp_roll = Some(roll),
                PpSource::Cleaned => orientation.cleaned_pp_roll = Some(roll),
            };
            roll
        }
    };
    Ok((roll, orientation))
}

/// Rotate the X and Y pairs of one station
///
/// # Returns
/// The new readings with their indices in the table, or the first reason a pair could not be
/// rotated. A station is rotated completely or not at all.
fn rotate_station(
    readings: &[Reading],
    pairs: &[(usize, usize)],
    options: &RotationOptions,
    context: Option<&PpContext>,
) -> Result<Vec<(usize, Reading)>> {
    let mut rotated: Vec<(usize, Reading)> = Vec::new();

    for (xi, yi) in pairs {
        let (x, y) = (&readings[*xi], &readings[*yi]);

        // Previous rotations are undone before deriving a new roll.
        let (x_values, y_values) = match x.rad.rotation() {
            Some(stamp) => rotate_values(&x.values, &y.values, -stamp.angle_used),
            None => (x.values.clone(), y.values.clone()),
        };

        let (roll, orientation) = derive_roll(x, &x_values, &y_values, options.method, context)?;
        let stamp = RotationStamp {
            kind: options.method.kind(),
            angle_used: roll + options.soa,
        };
        let (new_x, new_y) = rotate_values(&x_values, &y_values, stamp.angle_used);

        let mut x_reading = x.clone();
        x_reading.values = new_x;
        x_reading.rad = x.rad.rotated(stamp, roll, orientation.clone());

        let mut y_reading = y.clone();
        y_reading.values = new_y;
        y_reading.rad = y.rad.rotated(stamp, roll, orientation);

        rotated.push((*xi, x_reading));
        rotated.push((*yi, y_reading));
    }
    Ok(rotated)
}

/// De-rotate the X and Y readings of a borehole file
///
/// The X and Y readings of each station are paired in (reading index, reading number) order and
/// rotated by the derived roll plus the sensor offset angle. Stations whose pairs cannot be
/// formed or rotated are left untouched and reported.
///
/// # Returns
/// The rotated file and the ineligible stations, or an error if the file as a whole cannot be
/// rotated.
pub fn rotate(pem: &PemFile, options: &RotationOptions) -> Result<RotationOutcome> {
    let context = check_preconditions(pem, options)?;
    let readings = pem.data.readings();

    // (station, X indices, Y indices) in order of first appearance
    let mut stations: Vec<(&str, Vec<usize>, Vec<usize>)> = Vec::new();
    let mut lookup: HashMap<&str, usize> = HashMap::new();
    for (i, reading) in readings.iter().enumerate().filter(|(_, r)| !r.deleted) {
        if reading.component == Component::Z {
            continue;
        }
        let position = *lookup.entry(reading.station.as_str()).or_insert_with(|| {
            stations.push((reading.station.as_str(), Vec::new(), Vec::new()));
            stations.len() - 1
        });
        match reading.component {
            Component::X => stations[position].1.push(i),
            _ => stations[position].2.push(i),
        };
    }

    let mut rotated = readings.to_vec();
    let mut ineligible: Vec<IneligibleStation> = Vec::new();
    let mut n_rotated = 0_usize;

    for (station, mut xs, mut ys) in stations {
        let station_number = readings[xs.first().or(ys.first()).copied().unwrap_or(0)].station_number;
        let mut skip = |reason: String| {
            warn!("Station {station} was not rotated: {reason}");
            ineligible.push(IneligibleStation {
                station: station.to_string(),
                station_number,
                reason,
            });
        };

        if xs.len() != ys.len() {
            skip(format!("{} X and {} Y readings", xs.len(), ys.len()));
            continue;
        }
        let order = |i: &usize| (readings[*i].reading_index, readings[*i].reading_number);
        xs.sort_by_key(order);
        ys.sort_by_key(order);
        let pairs = xs.into_iter().zip(ys).collect::<Vec<(usize, usize)>>();

        match rotate_station(readings, &pairs, options, context.as_ref()) {
            Ok(new_readings) => {
                for (i, reading) in new_readings {
                    rotated[i] = reading;
                }
                n_rotated += 1;
            }
            Err(e) => skip(e.to_string()),
        };
    }

    let mut file = pem.clone();
    file.data = pem.data.with_readings(rotated);
    if n_rotated > 0 {
        file.notes.retain(|note| !note.starts_with(ROTATION_NOTE_PREFIX));
        file.notes.push(format!(
            "{ROTATION_NOTE_PREFIX} {}, SOA {}",
            options.method.kind().description(),
            options.soa
        ));
    }
    debug!(
        "Rotated {n_rotated} stations with {}; {} ineligible",
        options.method.name(),
        ineligible.len()
    );

    Ok(RotationOutcome { file, ineligible })
}
