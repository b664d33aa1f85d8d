use crate::config::{RfiConfig, StationFilterConfig, RECOMMENDED_BLOCK_SIZES};
use crate::error::{Error, Result};
use crate::math_tools::median;
use crate::rfi::analysis::analyze;
use crate::source::WaveformSource;
use crate::trace::Trace;
use ndarray::{Array1, Array2, Axis};

/// Dirty channels of a station, expressed for traces of a given length.
///
/// # Fields
/// - `average_power_spectrum`: Average power summed over all antennas, per analysed bin.
/// - `dirty_channels`: Positive-frequency bins of a `dirty_channels_block_size` sample FFT.
/// - `dirty_channels_block_size`: The trace length the channels refer to.
/// - `antenna_power`: Average power per antenna and analysed bin.
#[derive(Clone, Debug)]
pub struct StationRfiSummary {
    pub average_power_spectrum: Array1<f64>,
    pub dirty_channels: Vec<usize>,
    pub dirty_channels_block_size: usize,
    pub antenna_power: Array2<f64>,
}

/// Runs the analysis with blocks of `config.rfi_cleaning_trace_length` samples over all the data
/// of `source` and scales the dirty channels to traces of `target_trace_length` samples.
///
/// Every dirty channel `c` maps to the channels `c * m .. c * m + m` of the longer trace, where
/// `m = target_trace_length / block_size`.
///
/// # Errors
/// [`Error::BlockSizeMismatch`] if the target length is not a multiple of the block size, plus
/// every error of [`analyze`].
pub fn find_rfi_for_trace_length<S: WaveformSource + ?Sized>(
    source: &S,
    target_trace_length: usize,
    config: &StationFilterConfig,
) -> Result<StationRfiSummary> {
    let block_size = config.rfi_cleaning_trace_length;
    if block_size == 0 || target_trace_length % block_size != 0 {
        return Err(Error::BlockSizeMismatch {
            trace_length: target_trace_length,
            block_size,
        });
    }
    if block_size < RECOMMENDED_BLOCK_SIZES[0] || block_size > RECOMMENDED_BLOCK_SIZES[1] {
        log::warn!(
            "cleaning with a block size of {block_size}, channels may be missed outside {}..={}",
            RECOMMENDED_BLOCK_SIZES[0],
            RECOMMENDED_BLOCK_SIZES[1]
        );
    }

    let blocks_per_antenna: Vec<f64> = source
        .nominal_data_lengths()
        .iter()
        .map(|&length| (length / block_size) as f64)
        .collect();
    let available_blocks = median(&blocks_per_antenna);
    let num_blocks = if available_blocks.is_finite() {
        (available_blocks as usize).saturating_sub(config.initial_block)
    } else {
        0
    };
    log::debug!("using {num_blocks} blocks of {block_size} samples for RFI detection");

    let rfi_config = RfiConfig {
        block_size,
        initial_block: config.initial_block,
        num_blocks,
        max_blocks: None,
        lower_frequency: config.lower_frequency,
        upper_frequency: config.upper_frequency,
        max_double_zeros: config.max_double_zeros,
    };
    let result = analyze(source, &rfi_config)?;

    let multiplier = target_trace_length / block_size;
    let mut dirty_channels: Vec<usize> = result
        .dirty_channels
        .iter()
        .flat_map(|&channel| channel * multiplier..(channel + 1) * multiplier)
        .collect();
    dirty_channels.sort_unstable();

    Ok(StationRfiSummary {
        average_power_spectrum: result.average_power_spectrum.sum_axis(Axis(0)),
        dirty_channels,
        dirty_channels_block_size: target_trace_length,
        antenna_power: result.average_power_spectrum,
    })
}

/// Removes narrowband RFI from the channel traces of one station.
///
/// The dirty channels are derived from the raw waveforms of the whole station, then zeroed in the
/// spectrum of every trace.
pub struct StationRfiFilter {
    config: StationFilterConfig,
}

impl StationRfiFilter {
    pub fn new(config: StationFilterConfig) -> Self {
        StationRfiFilter { config }
    }

    pub fn config(&self) -> &StationFilterConfig {
        &self.config
    }

    /// Cleans `traces` in place.
    ///
    /// # Returns
    /// `None` if there are no traces, otherwise the summary used for cleaning.
    ///
    /// # Errors
    /// [`Error::BlockSizeMismatch`] if a trace is shorter than the cleaning length or not a
    /// multiple of it, plus every error of [`find_rfi_for_trace_length`].
    pub fn run<S: WaveformSource + ?Sized>(
        &self,
        traces: &mut [Trace],
        source: &S,
    ) -> Result<Option<StationRfiSummary>> {
        let Some(first) = traces.first() else {
            log::warn!(
                "no channel traces for station {}, skipping RFI cleaning",
                source.station_name()
            );
            return Ok(None);
        };
        let trace_length = first.number_of_samples();
        let block_size = self.config.rfi_cleaning_trace_length;
        for trace in traces.iter() {
            let length = trace.number_of_samples();
            if length != trace_length || length < block_size || length % block_size != 0 {
                return Err(Error::BlockSizeMismatch {
                    trace_length: length,
                    block_size,
                });
            }
        }

        let summary = find_rfi_for_trace_length(source, trace_length, &self.config)?;
        for trace in traces.iter_mut() {
            trace.zero_frequency_bins(&summary.dirty_channels)?;
        }
        log::info!(
            "zeroed {} channels in {} traces of station {}",
            summary.dirty_channels.len(),
            traces.len(),
            source.station_name()
        );
        Ok(Some(summary))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rfi::analysis::tests::noisy_station;
    use approx::assert_abs_diff_eq;

    fn config() -> StationFilterConfig {
        StationFilterConfig {
            rfi_cleaning_trace_length: 4096,
            ..Default::default()
        }
    }

    #[test]
    fn test_channels_are_scaled_to_the_trace_length() {
        let station = noisy_station(6, 4096, 16, 50.0, 5.0);
        let summary = find_rfi_for_trace_length(&station, 16384, &config()).unwrap();

        assert_eq!(summary.dirty_channels_block_size, 16384);
        assert_eq!(summary.antenna_power.nrows(), 6);
        assert_eq!(summary.average_power_spectrum.len(), 2048);
        for channel in 200..204 {
            assert!(summary.dirty_channels.binary_search(&channel).is_ok());
        }
        assert_eq!(summary.dirty_channels.len() % 4, 0);
        assert!(summary.dirty_channels.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_target_length_must_be_a_multiple_of_the_block_size() {
        let station = noisy_station(3, 4096, 4, 50.0, 5.0);
        assert!(matches!(
            find_rfi_for_trace_length(&station, 6000, &config()),
            Err(Error::BlockSizeMismatch {
                trace_length: 6000,
                block_size: 4096
            })
        ));
    }

    #[test]
    fn test_run_removes_the_tone_from_every_trace() {
        let _ = env_logger::builder().is_test(true).try_init();
        let station = noisy_station(6, 4096, 16, 50.0, 5.0);
        // one full-length trace per antenna
        let mut traces: Vec<Trace> = station
            .samples
            .rows()
            .into_iter()
            .map(|row| Trace::from_time_trace(row.to_owned(), station.sample_frequency).unwrap())
            .collect();

        let filter = StationRfiFilter::new(config());
        assert_eq!(filter.config().rfi_cleaning_trace_length, 4096);
        let summary = filter.run(&mut traces, &station).unwrap().unwrap();
        // bin 50 of 4096 samples is bin 800 of 65536 samples
        assert!(summary.dirty_channels.binary_search(&800).is_ok());
        for trace in traces.iter_mut() {
            let spectrum = trace.frequency_spectrum().unwrap();
            assert_abs_diff_eq!(spectrum[[0, 800]].norm(), 0.0);
            assert!(spectrum[[0, 3000]].norm() > 0.0);
        }
    }

    #[test]
    fn test_run_without_traces_is_skipped() {
        let station = noisy_station(3, 4096, 4, 50.0, 5.0);
        let result = StationRfiFilter::new(config()).run(&mut [], &station).unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_short_traces_are_rejected() {
        let station = noisy_station(3, 4096, 4, 50.0, 5.0);
        let mut traces = vec![Trace::from_time_trace(Array1::<f64>::zeros(2048), 200e6).unwrap()];
        assert!(matches!(
            StationRfiFilter::new(config()).run(&mut traces, &station),
            Err(Error::BlockSizeMismatch {
                trace_length: 2048,
                block_size: 4096
            })
        ));
    }
}
