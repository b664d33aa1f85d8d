use crate::config::RfiConfig;
use crate::error::{Error, Result};
use crate::math_tools::half_hann_window;
use crate::rfi::block_quality::{BlockQuality, BlockQualityScanner};
use crate::rfi::classifier::DirtyChannelClassifier;
use crate::rfi::phase_coherence::PhaseCoherenceAccumulator;
use crate::rfi::reference::select_reference_antenna;
use crate::rfi::{frequency_band_indices, WINDOW_TAPER_FRACTION};
use crate::source::{AntennaBlockSet, WaveformSource};
use ndarray::{Array1, Array2, Axis};
use serde::Serialize;

/// Result of a phase-variance RFI analysis of one station.
///
/// Per-bin arrays cover the analysed band `[lower_frequency_index, upper_frequency_index)` and
/// have one row per antenna.
#[derive(Clone, Debug, Serialize)]
pub struct RfiResult {
    pub station_name: String,
    pub timestamp: i64,
    pub antenna_names: Vec<String>,
    pub block_size: usize,
    pub reference_antenna: usize,
    pub lower_frequency_index: usize,
    pub upper_frequency_index: usize,
    /// Frequencies of the band bins in Hz.
    pub frequencies: Array1<f64>,
    /// Absolute FFT bin indices of the flagged channels, ascending.
    pub dirty_channels: Vec<usize>,
    /// Average `|X|^2` per antenna and bin.
    pub average_power_spectrum: Array2<f64>,
    /// Angle of the mean phasor relative to the reference antenna.
    pub average_phase_spectrum: Array2<f64>,
    /// `1 - |mean phasor|`, near zero for coherent channels.
    pub phase_variance: Array2<f64>,
    pub median_phase_spread_by_channel: Array1<f64>,
    pub median_spread: f64,
    pub noise: f64,
    /// Antennas that took part in the analysis; the reference is included.
    pub antennas_good: Vec<bool>,
    pub processed_blocks: Vec<usize>,
    /// `average_power_spectrum` with the dirty channels set to zero.
    pub cleaned_spectrum: Array2<f64>,
    /// Total power per antenna of the one-sided cleaned spectrum.
    pub cleaned_power: Array1<f64>,
    pub block_quality: BlockQuality,
}

impl RfiResult {
    /// Average power spectrum summed over all antennas.
    pub fn station_power_spectrum(&self) -> Array1<f64> {
        self.average_power_spectrum.sum_axis(Axis(0))
    }

    pub fn is_dirty(&self, channel: usize) -> bool {
        self.dirty_channels.binary_search(&channel).is_ok()
    }
}

/// Finds the channels of a station contaminated by narrowband RFI.
///
/// # Arguments
/// - `source`: The raw samples of the station.
/// - `config`: Block layout, band and quality parameters.
///
/// # Returns
/// The dirty channels together with the intermediate spectra.
///
/// # Errors
/// Invalid parameters, source read errors, and the reference selection failures
/// [`Error::InsufficientGoodBlocks`] and [`Error::NoReferenceAntenna`].
pub fn analyze<S: WaveformSource + ?Sized>(source: &S, config: &RfiConfig) -> Result<RfiResult> {
    config.validate()?;
    let station_name = source.station_name();
    let sample_frequency = source.sample_frequency();
    let block_size = config.block_size;

    let (lower_frequency_index, upper_frequency_index) = frequency_band_indices(
        block_size,
        sample_frequency,
        config.lower_frequency,
        config.upper_frequency,
    );
    if lower_frequency_index >= upper_frequency_index {
        return Err(Error::InvalidConfiguration(format!(
            "band [{}, {}) holds no bins at {sample_frequency} Hz and block size {block_size}",
            config.lower_frequency, config.upper_frequency
        )));
    }

    let blocks = AntennaBlockSet::new(source, block_size, config.initial_block);
    let window = half_hann_window(block_size, WINDOW_TAPER_FRACTION);

    log::info!(
        "station {station_name}: scanning {} blocks of {block_size} samples from block {}",
        config.scanned_blocks(),
        config.initial_block
    );
    let mut block_quality = BlockQualityScanner::new(window.clone(), config.max_double_zeros)
        .scan(&blocks, config.scanned_blocks())?;

    let selection = select_reference_antenna(&mut block_quality, config.num_blocks, &station_name)?;
    let reference_antenna = selection.reference_antenna;

    let coherence = PhaseCoherenceAccumulator::new(
        window,
        lower_frequency_index,
        upper_frequency_index,
        config.num_blocks,
    )
    .accumulate(&blocks, &block_quality, &selection)?;
    let phase_variance = coherence.phase_stability();
    let average_phase_spectrum = coherence.average_phase();

    // the reference is coherent with itself by construction
    let mut antennas_used = selection.antennas_good.clone();
    antennas_used[reference_antenna] = false;
    let classification = DirtyChannelClassifier::new(block_size, lower_frequency_index)
        .classify(&phase_variance, &antennas_used);

    let mut cleaned_spectrum = coherence.spectrum_mean.clone();
    for &channel in &classification.relative_dirty_channels {
        cleaned_spectrum.column_mut(channel).fill(0.0);
    }
    let cleaned_power = cleaned_spectrum.sum_axis(Axis(1)) * 2.0;

    let df = sample_frequency / block_size as f64;
    let frequencies = (lower_frequency_index..upper_frequency_index)
        .map(|k| k as f64 * df)
        .collect();

    log::info!(
        "station {station_name}: {} dirty channels in bins {lower_frequency_index}..{upper_frequency_index}",
        classification.dirty_channels.len()
    );

    Ok(RfiResult {
        station_name,
        timestamp: source.timestamp(),
        antenna_names: source.antenna_names(),
        block_size,
        reference_antenna,
        lower_frequency_index,
        upper_frequency_index,
        frequencies,
        dirty_channels: classification.dirty_channels,
        average_power_spectrum: coherence.spectrum_mean,
        average_phase_spectrum,
        phase_variance,
        median_phase_spread_by_channel: classification.median_phase_spread_by_channel,
        median_spread: classification.median_spread,
        noise: classification.noise,
        antennas_good: selection.antennas_good,
        processed_blocks: coherence.processed_blocks,
        cleaned_spectrum,
        cleaned_power,
        block_quality,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::source::StationWaveforms;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use rand_distr::{Distribution, Normal};
    use std::f64::consts::PI;

    pub(crate) const SAMPLE_FREQUENCY: f64 = 200e6;

    /// Gaussian noise in every antenna plus a tone at `tone_bin` (in units of `block_size` bins)
    /// received by all antennas with a fixed per-antenna phase.
    pub(crate) fn noisy_station(
        antennas: usize,
        block_size: usize,
        blocks: usize,
        tone_bin: f64,
        tone_amplitude: f64,
    ) -> StationWaveforms {
        let mut rng = StdRng::seed_from_u64(7);
        let normal = Normal::new(0.0, 1.0).unwrap();
        let samples = Array2::from_shape_fn((antennas, block_size * blocks), |(a, i)| {
            let phase = 2.0 * PI * tone_bin * i as f64 / block_size as f64 + 0.7 * a as f64;
            normal.sample(&mut rng) + tone_amplitude * phase.cos()
        });
        StationWaveforms::new("CS002", SAMPLE_FREQUENCY, samples).with_timestamp(1_300_000_000)
    }

    fn config() -> RfiConfig {
        RfiConfig::new(8192, 0, 20).with_frequency_band(0.0, 100e6)
    }

    #[test]
    fn test_narrowband_tone_is_flagged() {
        let _ = env_logger::builder().is_test(true).try_init();
        let station = noisy_station(8, 8192, 20, 50.0, 5.0);
        let result = analyze(&station, &config()).unwrap();

        assert_eq!(result.lower_frequency_index, 0);
        assert_eq!(result.upper_frequency_index, 4096);
        assert_eq!(result.average_power_spectrum.dim(), (8, 4096));
        assert_eq!(result.frequencies.len(), 4096);
        assert!(result.reference_antenna < 8);
        assert!(result.antennas_good.iter().all(|&g| g));
        assert_eq!(result.processed_blocks, vec![20; 8]);

        for channel in [49, 50, 51] {
            assert!(result.is_dirty(channel), "channel {channel} not flagged");
        }
        assert!(result.dirty_channels.len() < 200);
        let other = (result.reference_antenna + 1) % 8;
        assert!(result.phase_variance[[other, 50]] < 0.01);
        // the tone phase steps by 0.7 rad per antenna
        let expected_phase = 0.7 * (other as f64 - result.reference_antenna as f64);
        let phase_agreement = (result.average_phase_spectrum[[other, 50]] - expected_phase).cos();
        assert!(phase_agreement > 0.999);
        assert_eq!(result.average_phase_spectrum.dim(), (8, 4096));
        assert!(result.median_spread > 0.5);

        let station_power = result.station_power_spectrum();
        assert!(station_power[50] > 100.0 * station_power[1000]);
        for antenna in 0..8 {
            assert_eq!(result.cleaned_spectrum[[antenna, 50]], 0.0);
            assert!(result.cleaned_power[antenna] > 0.0);
        }
    }

    #[test]
    fn test_single_antenna_station_has_no_reference() {
        let station = noisy_station(1, 8192, 20, 50.0, 5.0);
        assert!(matches!(
            analyze(&station, &config()),
            Err(Error::NoReferenceAntenna { .. })
        ));
    }

    #[test]
    fn test_station_with_faulty_blocks_everywhere_fails() {
        let mut station = noisy_station(4, 4096, 6, 50.0, 5.0);
        // zero out the second half of block 1 in every antenna
        for mut row in station.samples.rows_mut() {
            for i in 6144..8192 {
                row[i] = 0.0;
            }
        }
        let config = RfiConfig::new(4096, 0, 6).with_frequency_band(0.0, 100e6);
        assert!(matches!(
            analyze(&station, &config),
            Err(Error::InsufficientGoodBlocks {
                required: 6,
                available: 5,
                ..
            })
        ));

        // scanning one extra block recovers
        let station = noisy_station(4, 4096, 7, 50.0, 5.0);
        let mut faulty = station.clone();
        for mut row in faulty.samples.rows_mut() {
            for i in 6144..8192 {
                row[i] = 0.0;
            }
        }
        let config = RfiConfig::new(4096, 0, 6)
            .with_max_blocks(7)
            .with_frequency_band(0.0, 100e6);
        let result = analyze(&faulty, &config).unwrap();
        assert!(!result.block_quality.is_good(0, 1));
        assert_eq!(result.processed_blocks, vec![6; 4]);
    }

    #[test]
    fn test_empty_band_is_rejected() {
        let station = noisy_station(3, 4096, 2, 10.0, 1.0);
        let config = RfiConfig::new(4096, 0, 2).with_frequency_band(150e6, 200e6);
        assert!(matches!(
            analyze(&station, &config),
            Err(Error::InvalidConfiguration(_))
        ));
    }
}
