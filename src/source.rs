//! Access to raw station waveforms.
//!
//! [`WaveformSource`] is the interface of whatever reads raw antenna samples (files, databases,
//! a live buffer). [`StationWaveforms`] is an in-memory implementation for data that has already
//! been fetched, and [`AntennaBlockSet`] slices a source into the fixed-size blocks the RFI
//! analysis works on.

use crate::error::{Error, Result};
use ndarray::{s, Array1, Array2};

/// Read-only access to the raw samples of one station.
///
/// Implementations must be safe to read from several threads at once.
pub trait WaveformSource: Sync {
    /// Returns `length` raw samples of antenna `antenna_index` beginning at `start_sample`.
    fn samples(&self, antenna_index: usize, start_sample: usize, length: usize)
        -> Result<Array1<f64>>;

    /// Number of samples available per antenna.
    fn nominal_data_lengths(&self) -> Vec<usize>;

    /// Common sampling frequency of all antennas in Hz.
    fn sample_frequency(&self) -> f64;

    fn antenna_names(&self) -> Vec<String>;

    fn station_name(&self) -> String;

    fn timestamp(&self) -> i64;
}

/// Raw samples of one station held in memory, one row per antenna.
#[derive(Debug, Clone)]
pub struct StationWaveforms {
    pub station_name: String,
    pub antenna_names: Vec<String>,
    pub sample_frequency: f64,
    pub timestamp: i64,
    pub samples: Array2<f64>,
}

impl StationWaveforms {
    /// Creates a station with antennas named `"000"`, `"001"`, ...
    pub fn new(station_name: &str, sample_frequency: f64, samples: Array2<f64>) -> Self {
        let antenna_names = (0..samples.nrows()).map(|i| format!("{i:03}")).collect();
        StationWaveforms {
            station_name: station_name.to_string(),
            antenna_names,
            sample_frequency,
            timestamp: 0,
            samples,
        }
    }

    pub fn with_antenna_names(mut self, antenna_names: Vec<String>) -> Self {
        self.antenna_names = antenna_names;
        self
    }

    pub fn with_timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = timestamp;
        self
    }
}

impl WaveformSource for StationWaveforms {
    fn samples(
        &self,
        antenna_index: usize,
        start_sample: usize,
        length: usize,
    ) -> Result<Array1<f64>> {
        let (antennas, available) = self.samples.dim();
        if antenna_index >= antennas {
            return Err(Error::Source(format!(
                "antenna {antenna_index} out of range, station {} has {antennas} antennas",
                self.station_name
            )));
        }
        let end = start_sample + length;
        if end > available {
            return Err(Error::Source(format!(
                "requested samples {start_sample}..{end} of antenna {antenna_index}, only {available} available"
            )));
        }
        Ok(self
            .samples
            .slice(s![antenna_index, start_sample..end])
            .to_owned())
    }

    fn nominal_data_lengths(&self) -> Vec<usize> {
        vec![self.samples.ncols(); self.samples.nrows()]
    }

    fn sample_frequency(&self) -> f64 {
        self.sample_frequency
    }

    fn antenna_names(&self) -> Vec<String> {
        self.antenna_names.clone()
    }

    fn station_name(&self) -> String {
        self.station_name.clone()
    }

    fn timestamp(&self) -> i64 {
        self.timestamp
    }
}

/// A station's samples viewed as consecutive blocks of `block_size` samples, counted from
/// `initial_block`.
pub struct AntennaBlockSet<'a, S: WaveformSource + ?Sized> {
    source: &'a S,
    block_size: usize,
    initial_block: usize,
    num_antennas: usize,
}

impl<'a, S: WaveformSource + ?Sized> AntennaBlockSet<'a, S> {
    pub fn new(source: &'a S, block_size: usize, initial_block: usize) -> Self {
        let num_antennas = source.antenna_names().len();
        AntennaBlockSet {
            source,
            block_size,
            initial_block,
            num_antennas,
        }
    }

    pub fn num_antennas(&self) -> usize {
        self.num_antennas
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Raw samples of block `block_index` (relative to the initial block) of one antenna.
    pub fn block(&self, antenna_index: usize, block_index: usize) -> Result<Array1<f64>> {
        let block = self.initial_block + block_index;
        self.source
            .samples(antenna_index, block * self.block_size, self.block_size)
    }
}
