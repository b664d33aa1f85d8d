//! Parameters of the RFI analysis and of the station-level filter.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Block sizes outside this range are accepted but give poorer channel detection.
pub const RECOMMENDED_BLOCK_SIZES: [usize; 2] = [4096, 16384];

/// Parameters of one phase-variance RFI analysis.
///
/// # Fields
/// - `block_size`: Number of samples per spectral block.
/// - `initial_block`: First block to analyse, in units of `block_size`.
/// - `num_blocks`: Number of good blocks averaged per antenna.
/// - `max_blocks`: Maximum number of blocks scanned to find `num_blocks` good ones
///   (`None` means `num_blocks`).
/// - `lower_frequency`, `upper_frequency`: The analysed band in Hz.
/// - `max_double_zeros`: Blocks with this many double zeros or more are rejected.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RfiConfig {
    pub block_size: usize,
    pub initial_block: usize,
    pub num_blocks: usize,
    pub max_blocks: Option<usize>,
    pub lower_frequency: f64,
    pub upper_frequency: f64,
    pub max_double_zeros: usize,
}

impl Default for RfiConfig {
    fn default() -> Self {
        RfiConfig {
            block_size: 8192,
            initial_block: 0,
            num_blocks: 20,
            max_blocks: None,
            lower_frequency: 10e6,
            upper_frequency: 90e6,
            max_double_zeros: 100,
        }
    }
}

impl RfiConfig {
    pub fn new(block_size: usize, initial_block: usize, num_blocks: usize) -> Self {
        RfiConfig {
            block_size,
            initial_block,
            num_blocks,
            ..Default::default()
        }
    }

    pub fn with_max_blocks(mut self, max_blocks: usize) -> Self {
        self.max_blocks = Some(max_blocks);
        self
    }

    pub fn with_frequency_band(mut self, lower_frequency: f64, upper_frequency: f64) -> Self {
        self.lower_frequency = lower_frequency;
        self.upper_frequency = upper_frequency;
        self
    }

    pub fn with_max_double_zeros(mut self, max_double_zeros: usize) -> Self {
        self.max_double_zeros = max_double_zeros;
        self
    }

    /// Number of blocks scanned for quality.
    pub fn scanned_blocks(&self) -> usize {
        self.max_blocks.unwrap_or(self.num_blocks)
    }

    /// Checks the parameters and logs a warning for block sizes outside
    /// [`RECOMMENDED_BLOCK_SIZES`].
    pub fn validate(&self) -> Result<()> {
        if self.block_size == 0 || self.block_size % 2 != 0 {
            return Err(Error::InvalidConfiguration(format!(
                "block size must be a positive even number, got {}",
                self.block_size
            )));
        }
        if self.num_blocks == 0 {
            return Err(Error::InvalidConfiguration(
                "at least one block has to be analysed".to_string(),
            ));
        }
        if self.scanned_blocks() < self.num_blocks {
            return Err(Error::InvalidConfiguration(format!(
                "max_blocks ({}) is smaller than num_blocks ({})",
                self.scanned_blocks(),
                self.num_blocks
            )));
        }
        if !(self.lower_frequency < self.upper_frequency) {
            return Err(Error::InvalidConfiguration(format!(
                "empty frequency band [{}, {})",
                self.lower_frequency, self.upper_frequency
            )));
        }
        if self.block_size < RECOMMENDED_BLOCK_SIZES[0] || self.block_size > RECOMMENDED_BLOCK_SIZES[1]
        {
            log::warn!(
                "RFI cleaning may not work optimally at block sizes < {} or > {} (got {})",
                RECOMMENDED_BLOCK_SIZES[0],
                RECOMMENDED_BLOCK_SIZES[1],
                self.block_size
            );
        }
        Ok(())
    }
}

/// Parameters of the station-level filter, which derives the dirty channels from the full station
/// data and zeroes them in every channel trace.
///
/// The band, initial block and double-zero tolerance default to values that suit LOFAR stations.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StationFilterConfig {
    pub rfi_cleaning_trace_length: usize,
    pub initial_block: usize,
    pub lower_frequency: f64,
    pub upper_frequency: f64,
    pub max_double_zeros: usize,
}

impl Default for StationFilterConfig {
    fn default() -> Self {
        StationFilterConfig {
            rfi_cleaning_trace_length: 65536,
            initial_block: 0,
            lower_frequency: 0.0,
            upper_frequency: 100e6,
            max_double_zeros: 1000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        assert!(RfiConfig::default().validate().is_ok());
        assert_eq!(RfiConfig::default().scanned_blocks(), 20);
        assert_eq!(RfiConfig::new(8192, 0, 10).with_max_blocks(15).scanned_blocks(), 15);
    }

    #[test]
    fn test_invalid_parameters_are_rejected() {
        let odd = RfiConfig::new(8191, 0, 10);
        assert!(matches!(odd.validate(), Err(Error::InvalidConfiguration(_))));
        let no_blocks = RfiConfig::new(8192, 0, 0);
        assert!(matches!(no_blocks.validate(), Err(Error::InvalidConfiguration(_))));
        let too_few = RfiConfig::new(8192, 0, 10).with_max_blocks(5);
        assert!(matches!(too_few.validate(), Err(Error::InvalidConfiguration(_))));
        let band = RfiConfig::default().with_frequency_band(50e6, 50e6);
        assert!(matches!(band.validate(), Err(Error::InvalidConfiguration(_))));
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let config: RfiConfig =
            serde_json::from_str(r#"{"block_size": 4096, "max_blocks": 30}"#).unwrap();
        assert_eq!(config.block_size, 4096);
        assert_eq!(config.max_blocks, Some(30));
        assert_eq!(config.num_blocks, 20);
        assert_eq!(config.lower_frequency, 10e6);

        let filter: StationFilterConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(filter, StationFilterConfig::default());
    }
}
