use crate::error::Result;
use crate::math_tools::{apply_window, num_double_zeros};
use crate::source::{AntennaBlockSet, WaveformSource};
use ndarray::{Array1, Array2};
use rayon::prelude::*;
use serde::Serialize;

/// Validity of every (antenna, block) pair and the average power of each antenna over its good
/// blocks.
///
/// # Fields
/// - `good`: `antennas x blocks` flags, `true` if the block is usable.
/// - `good_block_counts`: Number of good blocks per antenna.
/// - `average_power`: Mean of `|FFT(windowed block)|^2`, summed over all bins, over the good
///   blocks of each antenna. Zero for antennas without good blocks.
#[derive(Clone, Debug, Serialize)]
pub struct BlockQuality {
    pub good: Array2<bool>,
    pub good_block_counts: Vec<usize>,
    pub average_power: Vec<f64>,
}

impl BlockQuality {
    pub fn num_antennas(&self) -> usize {
        self.good.nrows()
    }

    pub fn num_blocks(&self) -> usize {
        self.good.ncols()
    }

    pub fn is_good(&self, antenna: usize, block: usize) -> bool {
        self.good[[antenna, block]]
    }

    /// Number of blocks that are good in both antennas.
    pub fn joint_good_blocks(&self, a: usize, b: usize) -> usize {
        self.good
            .row(a)
            .iter()
            .zip(self.good.row(b).iter())
            .filter(|(&x, &y)| x && y)
            .count()
    }

    /// Ascending indices of the good blocks of one antenna.
    pub fn good_blocks(&self, antenna: usize) -> Vec<usize> {
        self.good
            .row(antenna)
            .iter()
            .enumerate()
            .filter_map(|(i, &good)| good.then_some(i))
            .collect()
    }

    /// Marks every block of an antenna as bad.
    pub fn clear_antenna(&mut self, antenna: usize) {
        self.good.row_mut(antenna).fill(false);
        self.good_block_counts[antenna] = 0;
    }
}

/// Rejects blocks with digitizer faults and measures the power of the remaining ones.
pub struct BlockQualityScanner {
    window: Array1<f64>,
    max_double_zeros: usize,
}

impl BlockQualityScanner {
    /// # Arguments
    /// - `window`: Taper applied to every block before the power is computed.
    /// - `max_double_zeros`: Blocks with at least this many double zeros are bad.
    pub fn new(window: Array1<f64>, max_double_zeros: usize) -> Self {
        BlockQualityScanner {
            window,
            max_double_zeros,
        }
    }

    /// Power of a windowed block in the frequency domain.
    ///
    /// By Parseval's theorem `sum |X_k|^2 = N * sum x_n^2` for the full complex FFT, which avoids
    /// a transform per block.
    fn block_power(&self, block: &mut Array1<f64>) -> f64 {
        apply_window(&mut block.view_mut(), &self.window);
        block.len() as f64 * block.iter().map(|v| v * v).sum::<f64>()
    }

    /// Scans the first `max_blocks` blocks of every antenna.
    ///
    /// Antennas are read in parallel for each block. Read errors of the source are propagated.
    pub fn scan<S: WaveformSource + ?Sized>(
        &self,
        blocks: &AntennaBlockSet<'_, S>,
        max_blocks: usize,
    ) -> Result<BlockQuality> {
        let num_antennas = blocks.num_antennas();
        let mut good = Array2::from_elem((num_antennas, max_blocks), false);
        let mut power_sum = vec![0.0; num_antennas];

        for block_index in 0..max_blocks {
            let powers = (0..num_antennas)
                .into_par_iter()
                .map(|antenna| -> Result<Option<f64>> {
                    let mut block = blocks.block(antenna, block_index)?;
                    let double_zeros = block
                        .as_slice()
                        .map_or_else(|| num_double_zeros(&block.to_vec()), num_double_zeros);
                    if double_zeros >= self.max_double_zeros {
                        return Ok(None);
                    }
                    Ok(Some(self.block_power(&mut block)))
                })
                .collect::<Result<Vec<_>>>()?;

            for (antenna, power) in powers.into_iter().enumerate() {
                if let Some(power) = power {
                    good[[antenna, block_index]] = true;
                    power_sum[antenna] += power;
                }
            }
        }

        let good_block_counts: Vec<usize> = good
            .rows()
            .into_iter()
            .map(|row| row.iter().filter(|&&g| g).count())
            .collect();
        let average_power = power_sum
            .iter()
            .zip(good_block_counts.iter())
            .map(|(&sum, &count)| if count > 0 { sum / count as f64 } else { 0.0 })
            .collect();

        log::debug!(
            "scanned {max_blocks} blocks of {num_antennas} antennas, good blocks per antenna: {good_block_counts:?}"
        );

        Ok(BlockQuality {
            good,
            good_block_counts,
            average_power,
        })
    }
}
