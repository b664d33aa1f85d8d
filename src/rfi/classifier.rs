use crate::math_tools::{median, sort_floats, sorted_percentile};
use crate::rfi::FLAG_WIDTH_SAMPLES;
use ndarray::{Array1, Array2, Axis};

/// Flags channels falling this many noise widths below the median phase stability.
const NOISE_THRESHOLD: f64 = 3.0;

/// Outcome of the channel classification.
///
/// # Fields
/// - `median_phase_spread_by_channel`: Median phase stability over the used antennas, per bin of
///   the analysed band.
/// - `median_spread`: Median of `median_phase_spread_by_channel`.
/// - `noise`: Width of the stability distribution, 95th percentile minus median.
/// - `relative_dirty_channels`: Flagged bins relative to the start of the band, ascending.
/// - `dirty_channels`: The same bins as absolute FFT bin indices.
#[derive(Clone, Debug)]
pub struct ChannelClassification {
    pub median_phase_spread_by_channel: Array1<f64>,
    pub median_spread: f64,
    pub noise: f64,
    pub relative_dirty_channels: Vec<usize>,
    pub dirty_channels: Vec<usize>,
}

/// Flags channels whose phase is too stable across blocks to be noise.
pub struct DirtyChannelClassifier {
    half_flag_width: usize,
    lower_index: usize,
}

/// Expands every flagged bin `i` to `[i - half_width, i + half_width]`, clipped to `[0, n)`.
pub fn dilate(flagged: &[usize], n: usize, half_width: usize) -> Vec<usize> {
    let mut mask = vec![false; n];
    for &i in flagged {
        let start = i.saturating_sub(half_width);
        let end = (i + half_width + 1).min(n);
        for m in mask.iter_mut().take(end).skip(start) {
            *m = true;
        }
    }
    mask.iter()
        .enumerate()
        .filter_map(|(i, &m)| m.then_some(i))
        .collect()
}

impl DirtyChannelClassifier {
    /// The flag half width grows with the spectral resolution: one bin per 8192 samples of
    /// `block_size`.
    pub fn new(block_size: usize, lower_index: usize) -> Self {
        DirtyChannelClassifier {
            half_flag_width: block_size / FLAG_WIDTH_SAMPLES,
            lower_index,
        }
    }

    pub fn half_flag_width(&self) -> usize {
        self.half_flag_width
    }

    /// Classifies the bins of `phase_stability` (`antennas x bins`) using the rows marked in
    /// `antennas_used`.
    ///
    /// Without any used antenna all statistics are NaN and nothing is flagged.
    pub fn classify(
        &self,
        phase_stability: &Array2<f64>,
        antennas_used: &[bool],
    ) -> ChannelClassification {
        let median_phase_spread_by_channel: Array1<f64> = phase_stability
            .axis_iter(Axis(1))
            .map(|channel| {
                let values: Vec<f64> = channel
                    .iter()
                    .zip(antennas_used.iter())
                    .filter_map(|(&v, &used)| used.then_some(v))
                    .collect();
                median(&values)
            })
            .collect();

        let mut sorted = median_phase_spread_by_channel.to_vec();
        let median_spread = median(&sorted);
        sort_floats(&mut sorted);
        let noise = sorted_percentile(&sorted, 0.95) - sorted_percentile(&sorted, 0.5);
        let threshold = median_spread - NOISE_THRESHOLD * noise;

        let flagged: Vec<usize> = median_phase_spread_by_channel
            .iter()
            .enumerate()
            .filter_map(|(i, &v)| (v < threshold).then_some(i))
            .collect();
        let relative_dirty_channels = dilate(
            &flagged,
            median_phase_spread_by_channel.len(),
            self.half_flag_width,
        );
        let dirty_channels = relative_dirty_channels
            .iter()
            .map(|&i| i + self.lower_index)
            .collect();

        log::debug!(
            "median phase spread {median_spread:.4}, noise {noise:.4}, {} channels flagged before dilation",
            flagged.len()
        );

        ChannelClassification {
            median_phase_spread_by_channel,
            median_spread,
            noise,
            relative_dirty_channels,
            dirty_channels,
        }
    }
}
