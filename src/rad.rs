/// The borehole orientation (RAD) tool record of a reading
use crate::error::{PemError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationKind {
    Accelerometer,
    Magnetometer,
    MeasuredPp,
    CleanedPp,
}

impl RotationKind {
    pub fn code(&self) -> &'static str {
        match self {
            RotationKind::Accelerometer => "R1",
            RotationKind::Magnetometer => "R2",
            RotationKind::MeasuredPp => "R3",
            RotationKind::CleanedPp => "R4",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "R1" => Some(RotationKind::Accelerometer),
            "R2" => Some(RotationKind::Magnetometer),
            "R3" => Some(RotationKind::MeasuredPp),
            "R4" => Some(RotationKind::CleanedPp),
            _ => None,
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            RotationKind::Accelerometer => "accelerometer",
            RotationKind::Magnetometer => "magnetometer",
            RotationKind::MeasuredPp => "measured PP",
            RotationKind::CleanedPp => "cleaned PP",
        }
    }
}

/// Which rotation was applied to a reading, and by how many degrees in total (roll + SOA)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RotationStamp {
    pub kind: RotationKind,
    pub angle_used: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RadValues {
    /// Raw magnetometer (H) and accelerometer (g) components, "D7" or "D6"
    Sensor {
        hx: f64,
        gx: f64,
        hy: f64,
        gy: f64,
        hz: f64,
        gz: f64,
        temperature: Option<f64>,
    },
    /// Accelerometer components with the derived roll and dip, "D5"
    Processed {
        x: f64,
        y: f64,
        z: f64,
        roll_angle: f64,
        dip: f64,
        rotation: Option<RotationStamp>,
    },
    /// Any other record (e.g. the placeholders of surface surveys), kept verbatim
    Other(Vec<String>),
}

/// Orientation values derived while preparing a rotation. Never written to file.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Orientation {
    pub azimuth: Option<f64>,
    pub dip: Option<f64>,
    pub position: Option<[f64; 3]>,
    pub pp_theory: Option<[f64; 3]>,
    pub pp_measured: Option<[f64; 2]>,
    pub pp_cleaned: Option<[f64; 2]>,
    pub acc_roll: Option<f64>,
    pub mag_roll: Option<f64>,
    pub measured_pp_roll: Option<f64>,
    pub cleaned_pp_roll: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RadTool {
    pub code: String,
    pub values: RadValues,
    pub orientation: Option<Orientation>,
}

/// Normalize an angle in degrees to [0, 360)
pub fn normalize_angle(degrees: f64) -> f64 {
    let angle = degrees.rem_euclid(360.);
    if angle >= 360. {
        0.
    } else {
        angle
    }
}

/// The roll (degrees) of a tool that measures the reference direction as (x, y)
///
/// At zero roll the reference lies along +X. A tool rolled by ρ sees it at (cos ρ, -sin ρ).
pub fn roll_from_components(x: f64, y: f64) -> f64 {
    normalize_angle((-y).atan2(x).to_degrees())
}

fn parse_numbers(tokens: &[&str]) -> Result<Vec<f64>> {
    tokens
        .iter()
        .map(|t| {
            t.parse::<f64>()
                .map_err(|_| PemError::Parse(format!("Invalid RAD tool value: {t:?}")))
        })
        .collect()
}

impl RadTool {
    /// Parse a RAD tool line, e.g. "D7 -0.1 0.2 0.3 0.4 0.5 -0.9 21.0"
    pub fn from_line(line: &str) -> Result<Self> {
        let tokens = line.split_whitespace().collect::<Vec<&str>>();

        let code = match tokens.first() {
            Some(code) => code.to_string(),
            None => return Err(PemError::Parse("Empty RAD tool line".into())),
        };

        let values = match code.as_str() {
            "D7" | "D6" => {
                let v = parse_numbers(&tokens[1..])?;
                if v.len() < 6 {
                    return Err(PemError::Parse(format!(
                        "{code} RAD tool needs at least 6 values, got {}",
                        v.len()
                    )));
                }
                RadValues::Sensor {
                    hx: v[0],
                    gx: v[1],
                    hy: v[2],
                    gy: v[3],
                    hz: v[4],
                    gz: v[5],
                    temperature: v.get(6).copied(),
                }
            }
            "D5" => {
                if tokens.len() < 6 {
                    return Err(PemError::Parse(format!(
                        "D5 RAD tool needs at least 5 values, got {}",
                        tokens.len() - 1
                    )));
                }
                let v = parse_numbers(&tokens[1..6])?;
                let rotation = match tokens.get(6) {
                    Some(stamp_code) => {
                        let kind = RotationKind::from_code(stamp_code).ok_or_else(|| {
                            PemError::Parse(format!("Unknown rotation code: {stamp_code:?}"))
                        })?;
                        let angle = tokens.get(7).ok_or_else(|| {
                            PemError::Parse(format!("Rotation code {stamp_code} without an angle"))
                        })?;
                        Some(RotationStamp {
                            kind,
                            angle_used: parse_numbers(&[angle])?[0],
                        })
                    }
                    None => None,
                };
                RadValues::Processed {
                    x: v[0],
                    y: v[1],
                    z: v[2],
                    roll_angle: v[3],
                    dip: v[4],
                    rotation,
                }
            }
            _ => RadValues::Other(tokens[1..].iter().map(|t| t.to_string()).collect()),
        };

        Ok(RadTool {
            code,
            values,
            orientation: None,
        })
    }

    pub fn to_line(&self) -> String {
        let mut parts = vec![self.code.clone()];
        match &self.values {
            RadValues::Sensor {
                hx,
                gx,
                hy,
                gy,
                hz,
                gz,
                temperature,
            } => {
                parts.extend([hx, gx, hy, gy, hz, gz].iter().map(|v| format!("{v:.6}")));
                if let Some(t) = temperature {
                    parts.push(format!("{t:.6}"));
                }
            }
            RadValues::Processed {
                x,
                y,
                z,
                roll_angle,
                dip,
                rotation,
            } => {
                parts.extend([x, y, z, roll_angle, dip].iter().map(|v| format!("{v:.6}")));
                if let Some(stamp) = rotation {
                    parts.push(stamp.kind.code().to_string());
                    parts.push(format!("{:.6}", stamp.angle_used));
                }
            }
            RadValues::Other(tokens) => parts.extend(tokens.iter().cloned()),
        };
        parts.join(" ")
    }

    pub fn accelerometer(&self) -> Option<[f64; 3]> {
        match self.values {
            RadValues::Sensor { gx, gy, gz, .. } => Some([gx, gy, gz]),
            RadValues::Processed { x, y, z, .. } => Some([x, y, z]),
            RadValues::Other(_) => None,
        }
        .filter(|g| g.iter().any(|v| *v != 0.))
    }

    pub fn magnetometer(&self) -> Option<[f64; 3]> {
        match self.values {
            RadValues::Sensor { hx, hy, hz, .. } => Some([hx, hy, hz]),
            _ => None,
        }
        .filter(|h| h.iter().any(|v| *v != 0.))
    }

    /// Whether the tool holds real (non-placeholder) accelerometer data
    pub fn has_tool_values(&self) -> bool {
        self.accelerometer().is_some()
    }

    pub fn has_mag_values(&self) -> bool {
        self.magnetometer().is_some()
    }

    pub fn rotation(&self) -> Option<RotationStamp> {
        match self.values {
            RadValues::Processed { rotation, .. } => rotation,
            _ => None,
        }
    }

    pub fn acc_roll(&self) -> Result<f64> {
        let [x, y, _] = self
            .accelerometer()
            .ok_or_else(|| PemError::MissingSensorData(format!("{} tool has no accelerometer data", self.code)))?;
        Ok(roll_from_components(x, y))
    }

    pub fn mag_roll(&self) -> Result<f64> {
        let [x, y, _] = self
            .magnetometer()
            .ok_or_else(|| PemError::MissingSensorData(format!("{} tool has no magnetometer data", self.code)))?;
        Ok(roll_from_components(x, y))
    }

    /// The tool dip in degrees (-90 is vertically down) from the accelerometer
    pub fn acc_dip(&self) -> Result<f64> {
        let [x, y, z] = self
            .accelerometer()
            .ok_or_else(|| PemError::MissingSensorData(format!("{} tool has no accelerometer data", self.code)))?;
        let magnitude = (x.powi(2) + y.powi(2) + z.powi(2)).sqrt();
        Ok((z / magnitude).clamp(-1., 1.).acos().to_degrees() - 90.)
    }

    /// A new "D5" tool recording a rotation of the reading it belongs to
    ///
    /// # Arguments
    /// - `stamp`: The rotation kind and the total angle applied
    /// - `roll_angle`: The derived roll (without the sensor offset angle)
    /// - `orientation`: The derived orientation values used for the rotation
    pub fn rotated(&self, stamp: RotationStamp, roll_angle: f64, orientation: Orientation) -> RadTool {
        let [x, y, z] = self.accelerometer().unwrap_or([0., 0., 0.]);
        let dip = self
            .acc_dip()
            .ok()
            .or(orientation.dip)
            .unwrap_or(0.);

        RadTool {
            code: "D5".to_string(),
            values: RadValues::Processed {
                x,
                y,
                z,
                roll_angle,
                dip,
                rotation: Some(stamp),
            },
            orientation: Some(orientation),
        }
    }

    /// The element-wise mean of tools of the same kind
    ///
    /// Tools of mixed kinds, or non-numeric tools, cannot be averaged and the first one is kept.
    /// Roll angles are averaged on the circle and temperatures only over the tools recording one.
    pub fn mean(tools: &[&RadTool]) -> Option<RadTool> {
        let first = *tools.first()?;

        let numeric = tools
            .iter()
            .map(|tool| match &tool.values {
                RadValues::Sensor {
                    hx,
                    gx,
                    hy,
                    gy,
                    hz,
                    gz,
                    ..
                } if tool.code == first.code => Some(vec![*hx, *gx, *hy, *gy, *hz, *gz]),
                RadValues::Processed {
                    x,
                    y,
                    z,
                    dip,
                    rotation: None,
                    ..
                } if tool.code == first.code => Some(vec![*x, *y, *z, *dip]),
                _ => None,
            })
            .collect::<Option<Vec<Vec<f64>>>>();

        let rows = match numeric {
            Some(rows) => rows,
            None => return Some(first.clone()),
        };
        let n = rows.len() as f64;
        let mean = (0..rows[0].len())
            .map(|i| rows.iter().map(|row| row[i]).sum::<f64>() / n)
            .collect::<Vec<f64>>();

        let values = match &first.values {
            RadValues::Sensor { .. } => {
                let temperatures = tools
                    .iter()
                    .filter_map(|tool| match tool.values {
                        RadValues::Sensor { temperature, .. } => temperature,
                        _ => None,
                    })
                    .collect::<Vec<f64>>();

                RadValues::Sensor {
                    hx: mean[0],
                    gx: mean[1],
                    hy: mean[2],
                    gy: mean[3],
                    hz: mean[4],
                    gz: mean[5],
                    temperature: match temperatures.is_empty() {
                        true => None,
                        false => Some(temperatures.iter().sum::<f64>() / temperatures.len() as f64),
                    },
                }
            }
            _ => {
                let (sin_sum, cos_sum) = tools.iter().fold((0., 0.), |(s, c), tool| match tool.values {
                    RadValues::Processed { roll_angle, .. } => {
                        (s + roll_angle.to_radians().sin(), c + roll_angle.to_radians().cos())
                    }
                    _ => (s, c),
                });
                RadValues::Processed {
                    x: mean[0],
                    y: mean[1],
                    z: mean[2],
                    roll_angle: normalize_angle(sin_sum.atan2(cos_sum).to_degrees()),
                    dip: mean[3],
                    rotation: None,
                }
            }
        };

        Some(RadTool {
            code: first.code.clone(),
            values,
            orientation: None,
        })
    }
}
