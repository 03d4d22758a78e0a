use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{anyhow, Context};
use rayon::prelude::*;
use tracing::{info, warn};

use crate::channels::{ChannelTimeTable, PLOT_GROUPS};
use crate::data::{Component, PemData, ProfileData};
use crate::error::{PemError, Result};
use crate::geometry::{HoleGeometry, LineGps, LoopGps};
use crate::rotation::{self, RotationMethod, RotationOptions, RotationOutcome};
use crate::{io, tools};

const DEFAULT_AUTO_CLEAN_THRESHOLD: f64 = 2.0;
const DEFAULT_AUTO_CLEAN_FRACTION: f64 = 0.5;
const DEFAULT_SOA: f64 = 0.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurveyType {
    SurfaceInduction,
    BoreholeInduction,
    SurfaceFluxgate,
    BoreholeFluxgate,
    Squid,
    Undefined,
}

impl SurveyType {
    /// Map the survey code of a file header. Unknown codes are not an error.
    pub fn from_code(code: &str) -> Self {
        match code.trim().to_lowercase().as_str() {
            "s-coil" => SurveyType::SurfaceInduction,
            "borehole" | "b-rad" => SurveyType::BoreholeInduction,
            "s-flux" => SurveyType::SurfaceFluxgate,
            "bh-flux" => SurveyType::BoreholeFluxgate,
            "s-squid" => SurveyType::Squid,
            _ => SurveyType::Undefined,
        }
    }

    pub fn is_borehole(&self) -> bool {
        matches!(self, SurveyType::BoreholeInduction | SurveyType::BoreholeFluxgate)
    }

    pub fn is_fluxgate(&self) -> bool {
        matches!(self, SurveyType::SurfaceFluxgate | SurveyType::BoreholeFluxgate | SurveyType::Squid)
    }
}

impl std::fmt::Display for SurveyType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SurveyType::SurfaceInduction => "Surface Induction",
            SurveyType::BoreholeInduction => "Borehole Induction",
            SurveyType::SurfaceFluxgate => "Surface Fluxgate",
            SurveyType::BoreholeFluxgate => "Borehole Fluxgate",
            SurveyType::Squid => "SQUID",
            SurveyType::Undefined => "UNDEF_SURV",
        };
        write!(f, "{name}")
    }
}

/// A "<TAG> value" line of the tag section
#[derive(Debug, Clone, PartialEq)]
pub struct Tag {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Header {
    pub client: String,
    pub grid: String,
    /// The line name of surface surveys or the hole name of borehole surveys
    pub line_name: String,
    pub loop_name: String,
    pub date: String,
    pub survey_code: String,
    pub units: String,
    pub sync: String,
    /// ms
    pub timebase: f64,
    /// µs
    pub ramp: f64,
    /// Excluding the PP channel
    pub number_of_channels: usize,
    pub number_of_readings: usize,
    pub receiver_number: String,
    pub software_version: String,
    pub software_date: String,
    pub file_name: String,
    pub normalized: String,
    pub primary_field_value: String,
    /// m²
    pub coil_area: f64,
    pub loop_polarity: Option<String>,
}

#[derive(Debug, Clone)]
pub struct PemFile {
    pub header: Header,
    pub tags: Vec<Tag>,
    /// Tag lines other than the known tags and the GPS, e.g. "<GEN> ..." comments
    pub notes: Vec<String>,
    pub loop_gps: LoopGps,
    pub line_gps: LineGps,
    pub hole: HoleGeometry,
    pub table: ChannelTimeTable,
    pub data: PemData,
    pub log: Vec<String>,
}

impl PemFile {
    pub fn process(&mut self, step_name: &str, allow_rerotation: bool) -> Result<()> {
        let name = step_name.split_once('(').map(|(name, _)| name).unwrap_or(step_name).trim();

        match name {
            "average" => {
                let (averaged, errors) = self.average();
                for e in &errors {
                    warn!("{e}");
                }
                *self = averaged;
            }
            "split" => *self = self.split()?,
            "auto_clean" => {
                let threshold = optional_argument::<f64>(step_name, 0)?.unwrap_or(DEFAULT_AUTO_CLEAN_THRESHOLD);
                let fraction = optional_argument::<f64>(step_name, 1)?.unwrap_or(DEFAULT_AUTO_CLEAN_FRACTION);
                *self = self.auto_clean(threshold, fraction)?;
            }
            "rename_repeats" => *self = self.rename_repeats()?,
            "rotate" => {
                let method = match tools::parse_option::<String>(step_name, 0).map_err(PemError::Config)? {
                    Some(method) => method.parse::<RotationMethod>()?,
                    None => {
                        return Err(PemError::Config(
                            "A method must be given when rotating, e.g. rotate(acc)".into(),
                        ))
                    }
                };
                let options = RotationOptions {
                    method,
                    soa: optional_argument::<f64>(step_name, 1)?.unwrap_or(DEFAULT_SOA),
                    allow_rerotation,
                };
                *self = self.rotate(&options)?.file;
            }
            "scale_current" => {
                let current = required_argument::<f64>(step_name, "scale_current(20.5)")?;
                *self = self.scale_current(current)?;
            }
            "scale_coil_area" => {
                let area = required_argument::<f64>(step_name, "scale_coil_area(1000)")?;
                *self = self.scale_coil_area(area)?;
            }
            "reverse_polarity" => {
                let component = required_argument::<Component>(step_name, "reverse_polarity(Z)")?;
                *self = self.reverse_polarity(component);
            }
            "shift_stations" => {
                let offset = required_argument::<i64>(step_name, "shift_stations(-50)")?;
                *self = self.shift_stations(offset)?;
            }
            _ => return Err(PemError::Config(format!("Step name not recognized: {step_name}"))),
        };
        Ok(())
    }

    fn log_event(&mut self, step_name: &str, event: &str, start_time: Instant) {
        info!("{step_name}: {event}");
        self.log.push(format!(
            "{} (duration: {:.2}s):\t{}",
            step_name,
            start_time.elapsed().as_secs_f32(),
            event
        ));
    }

    /// A copy of the file holding a new reading table
    fn with_data(&self, data: PemData) -> PemFile {
        let mut file = self.clone();
        file.header.number_of_readings = data.active().count();
        file.data = data;
        file
    }

    /// Average the repeated readings of every station and component
    ///
    /// # Returns
    /// The averaged file, and the groups that could not be averaged.
    pub fn average(&self) -> (PemFile, Vec<PemError>) {
        let start_time = Instant::now();
        if self.is_averaged() {
            return (self.clone(), Vec::new());
        }
        let n_before = self.data.active().count();
        let (data, errors) = self.data.average();

        let mut file = self.with_data(data);
        file.log_event(
            "average",
            &format!(
                "Averaged {} readings into {} ({} groups skipped)",
                n_before,
                file.data.active().count(),
                errors.len()
            ),
            start_time,
        );
        (file, errors)
    }

    /// Remove the on-time channels except the PP channel
    pub fn split(&self) -> Result<PemFile> {
        let start_time = Instant::now();
        if self.is_split() {
            return Ok(self.clone());
        }
        let removed = self.table.count_removable();

        let mut file = self.with_data(self.data.split(&self.table)?);
        file.table = self.table.without_removed();
        file.header.number_of_channels = file.table.len().saturating_sub(1);
        file.log_event("split", &format!("Removed {removed} on-time channels"), start_time);
        Ok(file)
    }

    pub fn auto_clean(&self, threshold_std: f64, max_removable_fraction: f64) -> Result<PemFile> {
        let start_time = Instant::now();
        let (data, n_deleted) = self.data.auto_clean(threshold_std, max_removable_fraction, &self.table)?;

        let mut file = self.with_data(data);
        file.log_event(
            "auto_clean",
            &format!("Deleted {n_deleted} readings (threshold: {threshold_std} std, max fraction: {max_removable_fraction})"),
            start_time,
        );
        Ok(file)
    }

    pub fn rename_repeats(&self) -> Result<PemFile> {
        let start_time = Instant::now();
        let (data, n_renamed) = self.data.rename_repeats()?;

        let mut file = self.with_data(data);
        file.log_event("rename_repeats", &format!("Renamed {n_renamed} repeat readings"), start_time);
        Ok(file)
    }

    /// De-rotate the X and Y components. See [`rotation::rotate`].
    pub fn rotate(&self, options: &RotationOptions) -> Result<RotationOutcome> {
        let start_time = Instant::now();
        let mut outcome = rotation::rotate(self, options)?;

        let ineligible = outcome
            .ineligible
            .iter()
            .map(|s| s.station.as_str())
            .collect::<Vec<&str>>();
        let event = format!(
            "Rotated with {} (SOA {}). Ineligible stations: {}",
            options.method.kind().description(),
            options.soa,
            match ineligible.is_empty() {
                true => "none".to_string(),
                false => ineligible.join(", "),
            }
        );
        outcome.file.log_event("rotate", &event, start_time);
        Ok(outcome)
    }

    fn check_scale(name: &str, old: f64, new: f64) -> Result<f64> {
        if !new.is_finite() | (new == 0.) {
            return Err(PemError::Config(format!("Invalid new {name}: {new}")));
        }
        if !old.is_finite() | (old == 0.) {
            return Err(PemError::Config(format!("Cannot scale from a {name} of {old}")));
        }
        Ok(old / new)
    }

    /// Rescale the data to a new transmitter current
    ///
    /// Every value is multiplied by `old / new`.
    pub fn scale_current(&self, new_current: f64) -> Result<PemFile> {
        let start_time = Instant::now();
        let old_current = self
            .current()
            .ok_or_else(|| PemError::Config("The file has no current (<CUR>) to scale from".into()))?;
        let factor = Self::check_scale("current", old_current, new_current)?;

        let mut file = self.with_data(self.data.scaled(factor));
        file.set_tag("CUR", &new_current.to_string());
        file.log_event(
            "scale_current",
            &format!("Scaled from {old_current} A to {new_current} A (factor {factor})"),
            start_time,
        );
        Ok(file)
    }

    /// Rescale the data to a new receiver coil area
    ///
    /// Every value is multiplied by `old / new`.
    pub fn scale_coil_area(&self, new_area: f64) -> Result<PemFile> {
        let start_time = Instant::now();
        let old_area = self.header.coil_area;
        let factor = Self::check_scale("coil area", old_area, new_area)?;

        let mut file = self.with_data(self.data.scaled(factor));
        file.header.coil_area = new_area;
        file.log_event(
            "scale_coil_area",
            &format!("Scaled from {old_area} m² to {new_area} m² (factor {factor})"),
            start_time,
        );
        Ok(file)
    }

    pub fn reverse_polarity(&self, component: Component) -> PemFile {
        let start_time = Instant::now();
        let mut file = self.with_data(self.data.reverse_polarity(component));
        file.log_event("reverse_polarity", &format!("Reversed the {component} component"), start_time);
        file
    }

    pub fn shift_stations(&self, offset: i64) -> Result<PemFile> {
        let start_time = Instant::now();
        let mut file = self.with_data(self.data.shift_stations(offset)?);
        file.log_event("shift_stations", &format!("Shifted stations by {offset}"), start_time);
        Ok(file)
    }

    pub fn survey_type(&self) -> SurveyType {
        SurveyType::from_code(&self.header.survey_code)
    }

    pub fn is_borehole(&self) -> bool {
        self.survey_type().is_borehole()
    }

    pub fn is_fluxgate(&self) -> bool {
        self.survey_type().is_fluxgate()
    }

    pub fn is_averaged(&self) -> bool {
        self.data.is_averaged()
    }

    pub fn is_split(&self) -> bool {
        self.data.is_split()
    }

    /// Whether any active reading carries a rotation stamp
    pub fn is_rotated(&self) -> bool {
        self.data.active().any(|r| r.rad.rotation().is_some())
    }

    pub fn data(&self) -> &PemData {
        &self.data
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn tags(&self) -> &[Tag] {
        &self.tags
    }

    pub fn notes(&self) -> &[String] {
        &self.notes
    }

    pub fn tag(&self, name: &str) -> Option<&str> {
        self.tags.iter().find(|t| t.name == name).map(|t| t.value.as_str())
    }

    fn set_tag(&mut self, name: &str, value: &str) {
        match self.tags.iter_mut().find(|t| t.name == name) {
            Some(tag) => tag.value = value.to_string(),
            None => self.tags.push(Tag {
                name: name.to_string(),
                value: value.to_string(),
            }),
        };
    }

    /// The transmitter current in A
    pub fn current(&self) -> Option<f64> {
        self.tag("CUR").and_then(|v| v.trim().parse().ok())
    }

    pub fn components(&self) -> Vec<Component> {
        self.data.components()
    }

    pub fn profile_data(&self, component: Component) -> Result<ProfileData> {
        self.data.profile_data(component)
    }

    /// The inclusive channel bounds of each of the off-time plot bands
    pub fn channel_bounds(&self) -> Result<Vec<(usize, usize)>> {
        (0..PLOT_GROUPS).map(|g| self.table.bounds_for_plot_group(g)).collect()
    }

    pub fn stations(&self) -> Vec<String> {
        self.data.stations()
    }

    pub fn station_numbers(&self) -> Vec<i64> {
        self.data.station_numbers()
    }
}

/// Parse an optional step argument that may also be left out entirely
fn optional_argument<T: std::str::FromStr>(step_name: &str, index: usize) -> Result<Option<T>> {
    match index < tools::count_options(step_name).map_err(PemError::Config)? {
        true => tools::parse_option::<T>(step_name, index).map_err(PemError::Config),
        false => Ok(None),
    }
}

fn required_argument<T: std::str::FromStr>(step_name: &str, example: &str) -> Result<T> {
    tools::parse_option::<T>(step_name, 0)
        .map_err(PemError::Config)?
        .ok_or_else(|| PemError::Config(format!("An argument must be given, e.g. {example}")))
}

impl std::fmt::Display for PemFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let date = chrono::NaiveDate::parse_from_str(self.header.date.trim(), "%B %d, %Y")
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|_| self.header.date.clone());
        let numbers = self.station_numbers();
        let components = self
            .components()
            .iter()
            .map(|c| c.to_string())
            .collect::<Vec<String>>()
            .join("");

        write!(
            f,
            "
PEM file
--------
Client:\t\t\t{}
Grid:\t\t\t{}
{}:\t\t\t{}
Loop:\t\t\t{}
Date:\t\t\t{}
Survey type:\t\t{}
Timebase:\t\t{} ms
Ramp:\t\t\t{} µs
Channels:\t\t{} ({} off-time)
Readings:\t\t{} ({} deleted)
Components:\t\t{}
Stations:\t\t{} ({} to {})
Coil area:\t\t{} m²
Current:\t\t{}
Loop points:\t\t{}
Averaged / split:\t{} / {}
Rotated:\t\t{}
",
            self.header.client,
            self.header.grid,
            match self.is_borehole() {
                true => "Hole",
                false => "Line",
            },
            self.header.line_name,
            self.header.loop_name,
            date,
            self.survey_type(),
            self.header.timebase,
            self.header.ramp,
            self.table.len(),
            self.table.count_offtime(),
            self.data.len(),
            self.data.len() - self.data.active().count(),
            components,
            numbers.len(),
            numbers.first().copied().unwrap_or(0),
            numbers.last().copied().unwrap_or(0),
            self.header.coil_area,
            self.current().map(|c| format!("{c} A")).unwrap_or_else(|| "unknown".into()),
            self.loop_gps.points.len(),
            self.is_averaged(),
            self.is_split(),
            self.is_rotated(),
        )
    }
}

pub fn all_available_steps() -> Vec<[&'static str; 2]> {
    vec![
        ["auto_clean", "Flag outlier readings as deleted. Readings of the same station and component are compared to the median of their off-time channels, first against 2x the threshold on all off-time channels, then against 1x the threshold on the last three. At least two readings per station and component always survive. The threshold (in standard deviations) and the largest fraction of readings that may be deleted can be given, e.g. 'auto_clean(2.0 0.5)'. Default: 2.0 0.5"],
        ["rename_repeats", "Rename repeat stations (ending in 1, 4, 6 or 9) to the station they repeat, e.g. 101N to 100N and 104N to 105N."],
        ["average", "Average the repeated readings of every station and component into one reading. Deleted readings are excluded and their stacks are not counted."],
        ["split", "Remove the on-time channels. The primary pulse channel is kept."],
        ["rotate", "De-rotate the X and Y components of a borehole survey. The method is one of 'acc' (accelerometer), 'mag' (magnetometer), 'pp' (measured primary pulse) or 'cleaned_pp' (primary pulse minus the first off-time channel), and a sensor offset angle in degrees may follow, e.g. 'rotate(acc 2.5)'. The file must be averaged and split first. Primary pulse rotation needs the loop, collar and segment GPS. Default SOA: 0"],
        ["scale_current", "Rescale the data to a new transmitter current in A. Every value is multiplied by the old current divided by the new. Example: scale_current(20.5). No default value."],
        ["scale_coil_area", "Rescale the data to a new receiver coil area in m². Every value is multiplied by the old area divided by the new. Example: scale_coil_area(1000). No default value."],
        ["reverse_polarity", "Negate every value of one component. Example: reverse_polarity(Z). No default value."],
        ["shift_stations", "Add an offset to every station number. Example: shift_stations(-50). No default value."],
    ]
}

pub fn default_processing_profile() -> Vec<String> {
    vec![
        format!("auto_clean({} {})", DEFAULT_AUTO_CLEAN_THRESHOLD, DEFAULT_AUTO_CLEAN_FRACTION),
        "average".to_string(),
        "split".to_string(),
    ]
}

pub struct RunParams {
    pub filepaths: Vec<PathBuf>,
    pub output_path: Option<PathBuf>,
    pub only_info: bool,
    pub xyz_path: Option<Option<PathBuf>>,
    pub steps: Vec<String>,
    pub no_export: bool,
    pub allow_rerotation: bool,
}

/// Find the output path of a processed file
///
/// A given directory (or any given path in batch mode) receives the input filename. Otherwise,
/// the given path is used as is, and without one, the processed file is put next to the input.
fn output_filepath(input: &Path, output: Option<&Path>, batch: bool, extension: &str) -> PathBuf {
    let stem = input.file_stem().and_then(|s| s.to_str()).unwrap_or("output");
    match output {
        Some(path) if path.is_dir() | batch => path.join(format!("{stem}_processed.{extension}")),
        Some(path) => path.with_extension(extension),
        None => input.with_file_name(format!("{stem}_processed.{extension}")),
    }
}

fn run_file(filepath: &Path, params: &RunParams, batch: bool) -> anyhow::Result<()> {
    let mut pem = io::load_pem(filepath)?;

    if params.only_info {
        println!("{filepath:?}{pem}");
        return Ok(());
    }

    for step in &params.steps {
        pem.process(step, params.allow_rerotation)
            .with_context(|| format!("Step {step:?} failed"))?;
    }

    let output = output_filepath(filepath, params.output_path.as_deref(), batch, "PEM");
    if !params.no_export {
        io::save_pem(&pem, &output)?;
        info!("Saved {output:?}");
    }

    if let Some(xyz_path) = &params.xyz_path {
        let xyz_path = match xyz_path {
            Some(path) => output_filepath(filepath, Some(path), batch, "xyz"),
            None => output.with_extension("xyz"),
        };
        std::fs::write(&xyz_path, io::export_xyz(&pem)?)?;
        info!("Exported XYZ to {xyz_path:?}");
    }

    Ok(())
}

/// Process every file of a batch in parallel
///
/// Failing files do not stop the others. All failures are reported at the end.
pub fn run(params: RunParams) -> anyhow::Result<()> {
    if params.filepaths.is_empty() {
        return Err(anyhow!("No files found"));
    }
    let batch = params.filepaths.len() > 1;

    let failures = params
        .filepaths
        .par_iter()
        .filter_map(|filepath| {
            run_file(filepath, &params, batch)
                .with_context(|| format!("Error processing {filepath:?}"))
                .err()
        })
        .collect::<Vec<anyhow::Error>>();

    for failure in &failures {
        warn!("{failure:#}");
    }
    match failures.len() {
        0 => Ok(()),
        n => Err(anyhow!("{n} of {} files failed", params.filepaths.len())),
    }
}
