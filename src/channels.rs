/// Channel (gate) timing of a PEM survey
use crate::error::{PemError, Result};

/// Timebases (ms) of the supported 50 and 60 Hz instrument configurations
const SUPPORTED_TIMEBASES: [f64; 13] = [
    8.3333, 10.0, 16.6667, 20.0, 33.3333, 40.0, 50.0, 100.0, 150.0, 200.0, 250.0, 300.0, 500.0,
];
const TIMEBASE_TOLERANCE: f64 = 1e-3;

/// The fraction of the timebase covered by synthesized off-time gates
const SYNTHESIZED_OFFTIME_FRACTION: f64 = 0.9;

/// Synthesized gate widths double every this many channels
const SYNTHESIZED_DOUBLING_CHANNELS: f64 = 3.0;

/// The number of bands the off-time channels are split into for profile plots
pub const PLOT_GROUPS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Channel {
    pub start: f64,
    pub end: f64,
    pub center: f64,
    pub width: f64,
    /// Whether the channel is dropped when the file is split
    pub remove: bool,
}

impl Channel {
    pub fn new(start: f64, end: f64, remove: bool) -> Self {
        Channel {
            start,
            end,
            center: (start + end) / 2.,
            width: end - start,
            remove,
        }
    }

    /// A channel is on-time if it closes before the transmitter turn-off
    pub fn is_ontime(&self) -> bool {
        self.end <= 0.
    }
}

/// The gate times of every channel in a survey, in ms relative to the ramp turn-off
///
/// Channel 0 is the primary pulse (PP) channel. It is on-time, but never flagged for removal.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelTimeTable {
    channels: Vec<Channel>,
}

impl ChannelTimeTable {
    /// Build a table from an explicit list of channels
    ///
    /// # Returns
    /// A config error if the list is empty or if the gate times are not strictly increasing.
    pub fn from_channels(channels: Vec<Channel>) -> Result<Self> {
        if channels.is_empty() {
            return Err(PemError::Config("Channel time table is empty".into()));
        }

        for (i, channel) in channels.iter().enumerate() {
            if channel.start >= channel.end {
                return Err(PemError::Config(format!(
                    "Channel {i} does not end after it starts ({} >= {})",
                    channel.start, channel.end
                )));
            }
            if let Some(next) = channels.get(i + 1) {
                if next.start < channel.end {
                    return Err(PemError::Config(format!(
                        "Channel {} starts before channel {i} ends ({} < {})",
                        i + 1,
                        next.start,
                        channel.end
                    )));
                }
            }
        }
        Ok(ChannelTimeTable { channels })
    }

    /// Build a table from gate boundaries as listed in a PEM file
    ///
    /// Channel `i` spans boundary `i` to boundary `i + 1`. On-time channels other than the PP
    /// channel are flagged for removal.
    pub fn from_boundaries(boundaries: &[f64]) -> Result<Self> {
        if boundaries.len() < 2 {
            return Err(PemError::Config(format!(
                "At least two channel boundaries are needed, got {}",
                boundaries.len()
            )));
        }

        let channels = boundaries
            .windows(2)
            .enumerate()
            .map(|(i, pair)| {
                let mut channel = Channel::new(pair[0], pair[1], false);
                channel.remove = (i > 0) & channel.is_ontime();
                channel
            })
            .collect::<Vec<Channel>>();

        Self::from_channels(channels)
    }

    /// Synthesize a table for files that carry no channel times
    ///
    /// The PP gate spans the ramp. The off-time gates cover 90% of the timebase with widths
    /// doubling every three channels.
    ///
    /// # Arguments
    /// - `timebase`: The timebase in ms. Must be one of the supported instrument timebases.
    /// - `number_of_channels`: The number of channels excluding the PP channel.
    /// - `ramp`: The ramp length in µs.
    pub fn synthesize(timebase: f64, number_of_channels: usize, ramp: f64) -> Result<Self> {
        if number_of_channels == 0 {
            return Err(PemError::Config("Cannot synthesize channel times for zero channels".into()));
        }
        if !(ramp > 0.) {
            return Err(PemError::Config(format!("Cannot synthesize channel times with a ramp of {ramp} µs")));
        }
        if !SUPPORTED_TIMEBASES
            .iter()
            .any(|supported| (supported - timebase).abs() < TIMEBASE_TOLERANCE)
        {
            return Err(PemError::Config(format!(
                "No channel time schedule for a timebase of {timebase} ms"
            )));
        }

        let last = SYNTHESIZED_OFFTIME_FRACTION * timebase;
        let ratio = 2_f64.powf(1. / SYNTHESIZED_DOUBLING_CHANNELS);
        let total_growth = ratio.powi(number_of_channels as i32) - 1.;

        let mut boundaries = vec![-ramp / 1000.];
        boundaries.extend(
            (0..=number_of_channels).map(|k| last * (ratio.powi(k as i32) - 1.) / total_growth),
        );

        Self::from_boundaries(&boundaries)
    }

    /// The gate boundaries to write back to a file: the start of every channel plus the end of
    /// the last one
    pub fn boundaries(&self) -> Vec<f64> {
        let mut boundaries = self.channels.iter().map(|c| c.start).collect::<Vec<f64>>();
        if let Some(last) = self.channels.last() {
            boundaries.push(last.end);
        }
        boundaries
    }

    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_ontime(&self, channel_index: usize) -> bool {
        self.channels
            .get(channel_index)
            .map(|c| c.is_ontime())
            .unwrap_or(false)
    }

    pub fn count_offtime(&self) -> usize {
        self.channels.iter().filter(|c| !c.is_ontime()).count()
    }

    pub fn count_removable(&self) -> usize {
        self.channels.iter().filter(|c| c.remove).count()
    }

    pub fn offtime_indices(&self) -> Vec<usize> {
        (0..self.channels.len()).filter(|i| !self.is_ontime(*i)).collect()
    }

    /// The table left after the removable channels have been dropped
    pub fn without_removed(&self) -> Self {
        ChannelTimeTable {
            channels: self.channels.iter().filter(|c| !c.remove).copied().collect(),
        }
    }

    /// The inclusive channel bounds of one of the four off-time plot bands
    ///
    /// If the number of off-time channels is not divisible by four, the remainder goes to the
    /// earliest bands.
    pub fn bounds_for_plot_group(&self, group_index: usize) -> Result<(usize, usize)> {
        if group_index >= PLOT_GROUPS {
            return Err(PemError::Config(format!(
                "Plot group {group_index} out of range (0-{})",
                PLOT_GROUPS - 1
            )));
        }
        let offtime = self.offtime_indices();

        let base = offtime.len() / PLOT_GROUPS;
        let extra = offtime.len() % PLOT_GROUPS;
        let start = group_index * base + group_index.min(extra);
        let size = base + usize::from(group_index < extra);

        if size == 0 {
            return Err(PemError::Config(format!(
                "Plot group {group_index} is empty with {} off-time channels",
                offtime.len()
            )));
        }
        Ok((offtime[start], offtime[start + size - 1]))
    }
}
