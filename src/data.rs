/// The reading table of a PEM file and the operations on it
use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;

use ndarray::{Array1, Array2, Axis};
use ndarray_stats::{interpolate::Midpoint, QuantileExt};
use noisy_float::types::n64;
use tracing::{debug, warn};

use crate::channels::ChannelTimeTable;
use crate::error::{PemError, Result};
use crate::rad::RadTool;
use crate::station;

/// The number of last off-time channels checked in the second auto-clean pass
const AUTO_CLEAN_LATE_CHANNELS: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Component {
    X,
    Y,
    Z,
}

impl FromStr for Component {
    type Err = PemError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_uppercase().as_str() {
            "X" => Ok(Component::X),
            "Y" => Ok(Component::Y),
            "Z" => Ok(Component::Z),
            other => Err(PemError::Parse(format!("Unknown component: {other:?}"))),
        }
    }
}

impl std::fmt::Display for Component {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Component::X => "X",
            Component::Y => "Y",
            Component::Z => "Z",
        };
        write!(f, "{name}")
    }
}

/// One measurement of one component at one station
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    pub station: String,
    pub station_number: i64,
    pub component: Component,
    pub reading_index: u32,
    pub gain: i32,
    pub rx_type: String,
    pub zts: f64,
    pub coil_delay: i32,
    pub stacks: u32,
    pub readings_per_set: u32,
    pub reading_number: u32,
    pub rad: RadTool,
    pub deleted: bool,
    pub overload: bool,
    pub timestamp: Option<chrono::NaiveDateTime>,
    /// One value per channel, the primary pulse first
    pub values: Array1<f64>,
}

/// The per-station mean of one component, sorted by station number
#[derive(Debug, Clone, PartialEq)]
pub struct ProfileData {
    pub stations: Vec<i64>,
    /// Shape: (stations, channels)
    pub values: Array2<f64>,
}

/// The table of all readings of a file
///
/// Deletion is a flag on each reading. Every derived computation goes through `active()`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PemData {
    readings: Vec<Reading>,
    averaged: bool,
    split: bool,
}

type GroupKey = (String, Component);

/// The element-wise mean of the values of some readings
fn mean_values(readings: &[&Reading]) -> Option<Array1<f64>> {
    let views = readings.iter().map(|r| r.values.view()).collect::<Vec<_>>();
    ndarray::stack(Axis(0), &views).ok()?.mean_axis(Axis(0))
}

impl PemData {
    /// Create a table. It is considered averaged if no (station, component) pair has more than
    /// one active reading.
    pub fn new(readings: Vec<Reading>, split: bool) -> Self {
        let mut data = PemData {
            readings,
            averaged: false,
            split,
        };
        data.averaged = data.has_no_duplicates();
        data
    }

    /// A table with new readings and the same split state
    pub(crate) fn with_readings(&self, readings: Vec<Reading>) -> Self {
        PemData::new(readings, self.split)
    }

    fn has_no_duplicates(&self) -> bool {
        self.groups()
            .iter()
            .all(|(_, indices)| indices.iter().filter(|i| !self.readings[**i].deleted).count() <= 1)
    }

    pub fn readings(&self) -> &[Reading] {
        &self.readings
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    /// All readings that are not flagged as deleted
    pub fn active(&self) -> impl Iterator<Item = &Reading> {
        self.readings.iter().filter(|r| !r.deleted)
    }

    pub fn is_averaged(&self) -> bool {
        self.averaged
    }

    pub fn is_split(&self) -> bool {
        self.split
    }

    /// The reading indices of every (station, component) pair, in order of first appearance
    fn groups(&self) -> Vec<(GroupKey, Vec<usize>)> {
        let mut order: Vec<(GroupKey, Vec<usize>)> = Vec::new();
        let mut lookup: HashMap<GroupKey, usize> = HashMap::new();

        for (i, reading) in self.readings.iter().enumerate() {
            let key = (reading.station.clone(), reading.component);
            match lookup.get(&key) {
                Some(position) => order[*position].1.push(i),
                None => {
                    lookup.insert(key.clone(), order.len());
                    order.push((key, vec![i]));
                }
            };
        }
        order
    }

    /// Average the repeated readings of every (station, component) pair
    ///
    /// Each pair with active readings is replaced by one reading holding the mean of their
    /// values, the sum of their stacks and the mean of their RAD tools. Pairs without any active
    /// reading are left untouched and reported.
    ///
    /// # Returns
    /// The averaged table and the contained per-group errors.
    pub fn average(&self) -> (PemData, Vec<PemError>) {
        let mut errors: Vec<PemError> = Vec::new();
        if self.averaged {
            return (self.clone(), errors);
        }

        let mut readings: Vec<Reading> = Vec::new();
        for ((station, component), indices) in self.groups() {
            let active = indices
                .iter()
                .map(|i| &self.readings[*i])
                .filter(|r| !r.deleted)
                .collect::<Vec<&Reading>>();

            if active.is_empty() {
                warn!("No active readings to average at station {station} ({component})");
                readings.extend(indices.iter().map(|i| self.readings[*i].clone()));
                errors.push(PemError::InsufficientData { station, component });
                continue;
            }

            let values = match mean_values(&active) {
                Some(values) => values,
                None => {
                    warn!("Readings at station {station} ({component}) have different channel counts");
                    readings.extend(indices.iter().map(|i| self.readings[*i].clone()));
                    errors.push(PemError::Config(format!(
                        "Readings at station {station} ({component}) have different channel counts"
                    )));
                    continue;
                }
            };

            let mut averaged = active[0].clone();
            averaged.values = values;
            averaged.stacks = active.iter().map(|r| r.stacks).sum();
            averaged.overload = active.iter().any(|r| r.overload);
            if let Some(rad) = RadTool::mean(&active.iter().map(|r| &r.rad).collect::<Vec<&RadTool>>()) {
                averaged.rad = rad;
            }
            readings.push(averaged);
        }

        (
            PemData {
                readings,
                averaged: true,
                split: self.split,
            },
            errors,
        )
    }

    /// Drop the channels flagged for removal (the on-time channels except the PP) from every
    /// reading
    pub fn split(&self, table: &ChannelTimeTable) -> Result<PemData> {
        if self.split {
            return Ok(self.clone());
        }
        self.check_channel_counts(table)?;

        let keep = (0..table.len())
            .filter(|i| !table.channels()[*i].remove)
            .collect::<Vec<usize>>();

        let readings = self
            .readings
            .iter()
            .map(|r| {
                let mut reading = r.clone();
                reading.values = reading.values.select(Axis(0), &keep);
                reading
            })
            .collect::<Vec<Reading>>();

        Ok(PemData {
            readings,
            averaged: self.averaged,
            split: true,
        })
    }

    fn check_channel_counts(&self, table: &ChannelTimeTable) -> Result<()> {
        match self.readings.iter().find(|r| r.values.len() != table.len()) {
            Some(r) => Err(PemError::Config(format!(
                "Reading at station {} ({}) has {} values but the channel table has {} channels",
                r.station,
                r.component,
                r.values.len(),
                table.len()
            ))),
            None => Ok(()),
        }
    }

    /// The indices of the active readings at repeat stations
    pub fn get_repeats(&self) -> Vec<usize> {
        (0..self.readings.len())
            .filter(|i| !self.readings[*i].deleted & station::is_repeat(&self.readings[*i].station))
            .collect()
    }

    /// Rename the repeat stations to the stations they repeat
    ///
    /// # Returns
    /// The renamed table and the number of renamed readings.
    pub fn rename_repeats(&self) -> Result<(PemData, usize)> {
        let repeats = self.get_repeats();
        let mut readings = self.readings.clone();

        for i in &repeats {
            if let Some(renamed) = station::repeat_replacement(&readings[*i].station) {
                readings[*i].station_number = station::convert(&renamed)?;
                readings[*i].station = renamed;
            }
        }
        Ok((self.with_readings(readings), repeats.len()))
    }

    /// Flag outlier readings as deleted
    ///
    /// Every (station, component) pair with more than two active readings is checked in two
    /// passes against the per-channel median and standard deviation of its off-time channels:
    /// first outside `median ± 2·threshold·σ` on all off-time channels, then outside
    /// `median ± threshold·σ` on the last three. Readings are flagged in table order until the
    /// budget of the pair is spent, which always leaves at least two readings.
    ///
    /// # Arguments
    /// - `threshold_std`: The threshold in standard deviations
    /// - `max_removable_fraction`: The largest fraction of a pair that may be flagged
    /// - `table`: The channel times, to find the off-time channels
    ///
    /// # Returns
    /// The cleaned table and the number of newly deleted readings.
    pub fn auto_clean(
        &self,
        threshold_std: f64,
        max_removable_fraction: f64,
        table: &ChannelTimeTable,
    ) -> Result<(PemData, usize)> {
        if !(threshold_std >= 0.) {
            return Err(PemError::Config(format!("Invalid auto-clean threshold: {threshold_std}")));
        }
        if !(0. ..=1.).contains(&max_removable_fraction) {
            return Err(PemError::Config(format!(
                "The removable fraction must be between 0 and 1: {max_removable_fraction}"
            )));
        }
        self.check_channel_counts(table)?;

        let offtime = table.offtime_indices();
        if offtime.is_empty() {
            return Err(PemError::Config("No off-time channels to clean".into()));
        }
        let late_channels = offtime.len().saturating_sub(AUTO_CLEAN_LATE_CHANNELS)..offtime.len();

        let mut readings = self.readings.clone();
        let mut n_deleted = 0_usize;

        for ((station, component), indices) in self.groups() {
            let active = indices
                .into_iter()
                .filter(|i| !self.readings[*i].deleted)
                .collect::<Vec<usize>>();
            let n = active.len();
            if n <= 2 {
                continue;
            }
            let budget = ((max_removable_fraction * n as f64).floor() as usize).min(n - 2);
            if budget == 0 {
                continue;
            }

            let values = Array2::from_shape_fn((n, offtime.len()), |(r, c)| {
                self.readings[active[r]].values[offtime[c]]
            });
            let std = values.std_axis(Axis(0), 0.);
            let median = values
                .clone()
                .quantile_axis_skipnan_mut(Axis(0), n64(0.5), &Midpoint)
                .map_err(|e| PemError::Config(format!("Could not derive medians: {e}")))?;

            let mut flagged = vec![false; n];
            let mut spent = 0_usize;

            let passes = [(0..offtime.len(), 2.), (late_channels.clone(), 1.)];
            for (channels, multiplier) in passes {
                for r in 0..n {
                    if spent >= budget {
                        break;
                    }
                    if flagged[r] {
                        continue;
                    }
                    let outlier = channels.clone().any(|c| {
                        (values[[r, c]] - median[c]).abs() > multiplier * threshold_std * std[c]
                    });
                    if outlier {
                        flagged[r] = true;
                        spent += 1;
                    }
                }
            }

            for (r, is_flagged) in flagged.iter().enumerate() {
                if *is_flagged {
                    readings[active[r]].deleted = true;
                }
            }
            if spent > 0 {
                debug!("Auto-clean flagged {spent} of {n} readings at station {station} ({component})");
            }
            n_deleted += spent;
        }

        Ok((
            PemData {
                readings,
                averaged: self.averaged,
                split: self.split,
            },
            n_deleted,
        ))
    }

    fn check_index(&self, index: usize) -> Result<()> {
        match index < self.readings.len() {
            true => Ok(()),
            false => Err(PemError::Config(format!(
                "Reading index {index} out of bounds ({} readings)",
                self.readings.len()
            ))),
        }
    }

    pub fn set_deleted(&self, index: usize, deleted: bool) -> Result<PemData> {
        self.check_index(index)?;
        let mut readings = self.readings.clone();
        readings[index].deleted = deleted;
        Ok(self.with_readings(readings))
    }

    pub fn change_component(&self, index: usize, component: Component) -> Result<PemData> {
        self.check_index(index)?;
        let mut readings = self.readings.clone();
        readings[index].component = component;
        Ok(self.with_readings(readings))
    }

    /// Negate every value of a component
    pub fn reverse_polarity(&self, component: Component) -> PemData {
        let mut data = self.clone();
        for reading in data.readings.iter_mut().filter(|r| r.component == component) {
            reading.values.mapv_inplace(|v| -v);
        }
        data
    }

    /// Move every station by an offset
    pub fn shift_stations(&self, offset: i64) -> Result<PemData> {
        let mut readings = self.readings.clone();
        for reading in readings.iter_mut() {
            let (label, number) = station::shift(&reading.station, offset)?;
            reading.station = label;
            reading.station_number = number;
        }
        Ok(self.with_readings(readings))
    }

    /// Multiply every value of every reading
    pub fn scaled(&self, factor: f64) -> PemData {
        let mut data = self.clone();
        for reading in data.readings.iter_mut() {
            reading.values *= factor;
        }
        data
    }

    /// The components present among the active readings, in X, Y, Z order
    pub fn components(&self) -> Vec<Component> {
        let mut components = self.active().map(|r| r.component).collect::<Vec<Component>>();
        components.sort();
        components.dedup();
        components
    }

    /// The unique station labels of the active readings, sorted by station number
    pub fn stations(&self) -> Vec<String> {
        let mut stations = self
            .active()
            .map(|r| (r.station_number, r.station.clone()))
            .collect::<Vec<(i64, String)>>();
        stations.sort();
        stations.dedup();
        stations.into_iter().map(|(_, label)| label).collect()
    }

    /// The unique station numbers of the active readings, sorted
    pub fn station_numbers(&self) -> Vec<i64> {
        let mut numbers = self.active().map(|r| r.station_number).collect::<Vec<i64>>();
        numbers.sort();
        numbers.dedup();
        numbers
    }

    /// The mean values of one component per station, sorted by station number
    pub fn profile_data(&self, component: Component) -> Result<ProfileData> {
        let mut per_station: BTreeMap<i64, Vec<&Reading>> = BTreeMap::new();
        for reading in self.active().filter(|r| r.component == component) {
            per_station.entry(reading.station_number).or_default().push(reading);
        }

        let n_channels = per_station
            .values()
            .next()
            .map(|readings| readings[0].values.len())
            .unwrap_or(0);

        let mut values = Array2::<f64>::zeros((per_station.len(), n_channels));
        for (row, (number, readings)) in per_station.iter().enumerate() {
            let mean = mean_values(readings)
                .filter(|mean| mean.len() == n_channels)
                .ok_or_else(|| {
                    PemError::Config(format!("Inconsistent channel counts at station {number} ({component})"))
                })?;
            values.row_mut(row).assign(&mean);
        }

        Ok(ProfileData {
            stations: per_station.keys().copied().collect(),
            values,
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use ndarray::{arr1, Array1};

    use super::{Component, PemData, Reading};
    use crate::channels::{Channel, ChannelTimeTable};
    use crate::error::PemError;
    use crate::rad::RadTool;

    /// A reading with placeholder metadata
    pub(crate) fn reading(station: &str, component: Component, values: &[f64]) -> Reading {
        Reading {
            station: station.to_string(),
            station_number: crate::station::convert(station).unwrap(),
            component,
            reading_index: 1,
            gain: 0,
            rx_type: "A".to_string(),
            zts: 0.,
            coil_delay: 1600,
            stacks: 3,
            readings_per_set: 1,
            reading_number: 1,
            rad: RadTool::from_line("D4 0 0 0 0 0 0 0").unwrap(),
            deleted: false,
            overload: false,
            timestamp: None,
            values: Array1::from_vec(values.to_vec()),
        }
    }

    fn table(n_offtime: usize) -> ChannelTimeTable {
        let mut boundaries = vec![-1.0, 0.0];
        boundaries.extend((1..=n_offtime).map(|i| i as f64));
        ChannelTimeTable::from_boundaries(&boundaries).unwrap()
    }

    #[test]
    fn test_component() {
        assert_eq!("x".parse::<Component>().unwrap(), Component::X);
        assert_eq!(" Z ".parse::<Component>().unwrap(), Component::Z);
        assert!("Q".parse::<Component>().is_err());
        assert_eq!(Component::Y.to_string(), "Y");
    }

    #[test]
    fn test_average() {
        let data = PemData::new(
            vec![
                reading("10N", Component::X, &[1.0, 1.0]),
                reading("10N", Component::X, &[3.0, 3.0]),
                reading("10N", Component::Z, &[5.0, 6.0]),
            ],
            false,
        );
        assert!(!data.is_averaged());

        let (averaged, errors) = data.average();

        assert!(errors.is_empty());
        assert!(averaged.is_averaged());
        assert_eq!(averaged.len(), 2);
        assert_eq!(averaged.readings()[0].values, arr1(&[2.0, 2.0]));
        assert_eq!(averaged.readings()[0].stacks, 6);
        assert_eq!(averaged.readings()[1].values, arr1(&[5.0, 6.0]));
        assert_eq!(averaged.readings()[1].stacks, 3);
    }

    #[test]
    fn test_average_idempotent() {
        let data = PemData::new(
            vec![
                reading("10N", Component::X, &[1.0, 4.0]),
                reading("20N", Component::X, &[1.0, 1.0]),
                reading("10N", Component::X, &[3.0, 2.0]),
                reading("20N", Component::X, &[2.0, 2.0]),
                reading("20N", Component::Y, &[2.0, 2.0]),
            ],
            false,
        );
        let (once, _) = data.average();
        let (twice, errors) = once.average();

        assert!(errors.is_empty());
        assert_eq!(once, twice);
        assert_eq!(once.len(), 3);
    }

    #[test]
    fn test_average_skips_deleted() {
        let mut deleted = reading("10N", Component::X, &[100.0, 100.0]);
        deleted.deleted = true;
        let mut all_deleted = reading("20N", Component::X, &[7.0, 7.0]);
        all_deleted.deleted = true;

        let data = PemData::new(
            vec![
                reading("10N", Component::X, &[1.0, 1.0]),
                deleted,
                reading("10N", Component::X, &[3.0, 3.0]),
                all_deleted.clone(),
                all_deleted,
            ],
            false,
        );
        let (averaged, errors) = data.average();

        assert_eq!(averaged.readings()[0].values, arr1(&[2.0, 2.0]));
        assert_eq!(errors.len(), 1);
        match &errors[0] {
            PemError::InsufficientData { station, component } => {
                assert_eq!(station, "20N");
                assert_eq!(*component, Component::X);
            }
            other => panic!("Unexpected error: {other:?}"),
        };
        // The group without active readings is kept as it was
        assert_eq!(averaged.len(), 3);
        assert_eq!(averaged.active().count(), 1);
    }

    #[test]
    fn test_split() {
        // An explicit table flagging its only on-time gate for removal
        let table = ChannelTimeTable::from_channels(vec![
            Channel::new(-1.0, -0.5, true),
            Channel::new(0.0, 0.5, false),
            Channel::new(0.5, 1.0, false),
        ])
        .unwrap();
        let data = PemData::new(vec![reading("0", Component::Z, &[1.0, 2.0, 3.0])], false);

        let split = data.split(&table).unwrap();
        assert!(split.is_split());
        assert_eq!(split.readings()[0].values, arr1(&[2.0, 3.0]));
        assert_eq!(split.readings()[0].stacks, 3);

        // Splitting again changes nothing
        assert_eq!(split.split(&table).unwrap(), split);
    }

    #[test]
    fn test_split_channel_count() {
        let table = ChannelTimeTable::from_boundaries(&[-2.0, -1.0, -0.5, 0.0, 1.0, 2.0]).unwrap();
        let data = PemData::new(
            vec![
                reading("0", Component::Z, &[9.0, 8.0, 7.0, 6.0, 5.0]),
                reading("0", Component::X, &[1.0, 2.0, 3.0, 4.0, 5.0]),
            ],
            false,
        );
        let split = data.split(&table).unwrap();

        // Three channels are on-time, but the PP channel among them is kept
        let ontime = table.len() - table.count_offtime();
        assert_eq!(ontime, 3);
        assert_eq!(table.count_removable(), ontime - 1);
        for (before, after) in data.readings().iter().zip(split.readings()) {
            assert_eq!(after.values.len(), before.values.len() - (ontime - 1));
        }
        // The PP channel survives
        assert_eq!(split.readings()[0].values, arr1(&[9.0, 6.0, 5.0]));

        let short = PemData::new(vec![reading("0", Component::Z, &[1.0])], false);
        assert!(short.split(&table).is_err());
    }

    #[test]
    fn test_repeats() {
        let data = PemData::new(
            vec![
                reading("100N", Component::Z, &[1.0]),
                reading("104N", Component::Z, &[1.0]),
                reading("105N", Component::Z, &[1.0]),
                reading("111S", Component::Z, &[1.0]),
            ],
            false,
        );
        assert_eq!(data.get_repeats(), vec![1, 3]);

        let (renamed, count) = data.rename_repeats().unwrap();
        assert_eq!(count, 2);
        assert_eq!(renamed.readings()[1].station, "105N");
        assert_eq!(renamed.readings()[3].station, "110S");
        assert_eq!(renamed.readings()[3].station_number, -110);
        // 104N became a second reading of 105N
        assert!(!renamed.is_averaged());
        assert!(renamed.get_repeats().is_empty());
    }

    #[test]
    fn test_auto_clean() {
        let table = table(3);
        let data = PemData::new(
            vec![
                reading("10N", Component::Z, &[0.0, 10.0, 10.0, 10.0]),
                reading("10N", Component::Z, &[0.0, 10.0, 10.0, 10.0]),
                reading("10N", Component::Z, &[0.0, 10.0, 10.0, 50.0]),
                reading("10N", Component::Z, &[0.0, 10.0, 10.0, 10.0]),
                reading("10N", Component::Z, &[0.0, 10.0, 10.0, 10.0]),
                reading("20N", Component::Z, &[0.0, 1.0, 1.0, 1.0]),
                reading("20N", Component::Z, &[0.0, 1.0, 1.0, 900.0]),
            ],
            false,
        );
        let (cleaned, n_deleted) = data.auto_clean(1.0, 1.0, &table).unwrap();

        assert_eq!(n_deleted, 1);
        assert!(cleaned.readings()[2].deleted);
        // Groups of two readings are never cleaned
        assert!(!cleaned.readings()[6].deleted);
        assert_eq!(cleaned.active().count(), 6);
    }

    #[test]
    fn test_auto_clean_keeps_two() {
        let table = table(4);
        for group_size in 2..9 {
            let readings = (0..group_size)
                .map(|i| {
                    let v = (i * i * 7 % 13) as f64 * 10.0 - 40.0;
                    reading("5S", Component::X, &[0.0, v, -v, v * 2.0, 1.0 + v])
                })
                .collect();
            let data = PemData::new(readings, false);

            for threshold in [0.0, 0.1, 0.5, 1.0, 3.0] {
                let (cleaned, n_deleted) = data.auto_clean(threshold, 1.0, &table).unwrap();
                assert!(cleaned.active().count() >= 2, "size {group_size}, threshold {threshold}");
                assert_eq!(cleaned.active().count(), group_size - n_deleted);
            }
        }
    }

    #[test]
    fn test_auto_clean_budget() {
        let table = table(1);
        let data = PemData::new(
            vec![
                reading("1", Component::Z, &[0.0, 1.0]),
                reading("1", Component::Z, &[0.0, 5.0]),
                reading("1", Component::Z, &[0.0, 100.0]),
            ],
            false,
        );

        // With a zero threshold, both non-median readings are outliers, but only one may go.
        // The first in table order is flagged.
        let (cleaned, n_deleted) = data.auto_clean(0.0, 1.0, &table).unwrap();
        assert_eq!(n_deleted, 1);
        assert!(cleaned.readings()[0].deleted);

        let (_, n_deleted) = data.auto_clean(0.0, 0.0, &table).unwrap();
        assert_eq!(n_deleted, 0);

        assert!(data.auto_clean(-1.0, 0.5, &table).is_err());
        assert!(data.auto_clean(1.0, 1.5, &table).is_err());
    }

    #[test]
    fn test_editing() {
        let data = PemData::new(
            vec![
                reading("1", Component::Z, &[1.0, -2.0]),
                reading("1", Component::X, &[3.0, 4.0]),
            ],
            false,
        );

        let deleted = data.set_deleted(0, true).unwrap();
        assert_eq!(deleted.active().count(), 1);
        assert_eq!(deleted.set_deleted(0, false).unwrap(), data);
        assert!(data.set_deleted(5, true).is_err());

        let changed = data.change_component(1, Component::Z).unwrap();
        assert!(!changed.is_averaged());
        assert_eq!(changed.components(), vec![Component::Z]);

        let reversed = data.reverse_polarity(Component::Z);
        assert_eq!(reversed.readings()[0].values, arr1(&[-1.0, 2.0]));
        assert_eq!(reversed.readings()[1].values, arr1(&[3.0, 4.0]));

        assert_eq!(data.scaled(2.0).readings()[1].values, arr1(&[6.0, 8.0]));

        let shifted = data.shift_stations(-5).unwrap();
        assert_eq!(shifted.stations(), vec!["-4"]);
        assert_eq!(shifted.station_numbers(), vec![-4]);
    }

    #[test]
    fn test_profile_data() {
        let data = PemData::new(
            vec![
                reading("50N", Component::Z, &[1.0, 2.0]),
                reading("25S", Component::Z, &[3.0, 4.0]),
                reading("50N", Component::Z, &[3.0, 4.0]),
                reading("0", Component::X, &[9.0, 9.0]),
            ],
            false,
        );

        let profile = data.profile_data(Component::Z).unwrap();
        assert_eq!(profile.stations, vec![-25, 50]);
        assert_eq!(profile.values, ndarray::arr2(&[[3.0, 4.0], [2.0, 3.0]]));

        assert_eq!(data.stations(), vec!["25S", "0", "50N"]);
        assert_eq!(data.station_numbers(), vec![-25, 0, 50]);
        assert_eq!(data.components(), vec![Component::X, Component::Z]);

        let empty = data.profile_data(Component::Y).unwrap();
        assert!(empty.stations.is_empty());
    }
}
