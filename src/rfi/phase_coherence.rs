use crate::error::Result;
use crate::math_tools::apply_window;
use crate::rfi::block_quality::BlockQuality;
use crate::rfi::reference::ReferenceSelection;
use crate::source::{AntennaBlockSet, WaveformSource};
use ndarray::{s, Array1, Array2, Zip};
use num_complex::Complex64;
use rayon::prelude::*;
use realfft::{RealFftPlanner, RealToComplex};
use std::sync::Arc;

/// Guards the phasor normalisation against empty bins.
const PHASOR_EPSILON: f64 = 1e-15;

/// Spectra of the analysed band averaged over the good blocks.
///
/// # Fields
/// - `phase_mean`: `antennas x bins` sum of the unit phasors relative to the reference antenna.
/// - `spectrum_mean`: `antennas x bins` average of `|X|^2` over `num_blocks` blocks.
/// - `processed_blocks`: Number of blocks accumulated per antenna.
/// - `num_blocks`: The requested number of blocks per antenna.
#[derive(Clone, Debug)]
pub struct PhaseCoherence {
    pub phase_mean: Array2<Complex64>,
    pub spectrum_mean: Array2<f64>,
    pub processed_blocks: Vec<usize>,
    pub num_blocks: usize,
}

impl PhaseCoherence {
    /// `1 - |phase_mean| / num_blocks`, near zero for channels with a fixed phase relation to the
    /// reference antenna and near one for noise.
    pub fn phase_stability(&self) -> Array2<f64> {
        let n = self.num_blocks as f64;
        self.phase_mean.mapv(|p| 1.0 - p.norm() / n)
    }

    /// Angle of the mean phasor of every antenna and bin.
    pub fn average_phase(&self) -> Array2<f64> {
        self.phase_mean.mapv(|p| p.arg())
    }
}

/// Accumulates the relative phasors and powers of the band `[lower_index, upper_index)`.
pub struct PhaseCoherenceAccumulator {
    window: Array1<f64>,
    lower_index: usize,
    upper_index: usize,
    num_blocks: usize,
    r2c: Arc<dyn RealToComplex<f64>>,
}

impl PhaseCoherenceAccumulator {
    /// # Arguments
    /// - `window`: Taper applied to every block before the FFT, its length is the block size.
    /// - `lower_index`, `upper_index`: The analysed band of FFT bins.
    /// - `num_blocks`: Number of blocks to accumulate per antenna.
    pub fn new(
        window: Array1<f64>,
        lower_index: usize,
        upper_index: usize,
        num_blocks: usize,
    ) -> Self {
        let mut real_planner = RealFftPlanner::<f64>::new();
        let r2c = real_planner.plan_fft_forward(window.len());
        PhaseCoherenceAccumulator {
            window,
            lower_index,
            upper_index,
            num_blocks,
            r2c,
        }
    }

    fn spectrum<S: WaveformSource + ?Sized>(
        &self,
        blocks: &AntennaBlockSet<'_, S>,
        antenna: usize,
        block: usize,
    ) -> Result<Array1<Complex64>> {
        let mut data = blocks.block(antenna, block)?;
        apply_window(&mut data.view_mut(), &self.window);
        let mut input = data.to_vec();
        let mut output = self.r2c.make_output_vec();
        self.r2c.process(&mut input, &mut output)?;
        Ok(Array1::from_vec(output).slice_move(s![self.lower_index..self.upper_index]))
    }

    /// Walks the good blocks of the reference antenna in ascending order and adds, for every good
    /// antenna that is also good in that block and still needs blocks, the unit phasor divided by
    /// the reference's unit phasor and the power of each bin.
    ///
    /// Stops as soon as every good antenna has `num_blocks` blocks. Antennas that run out of
    /// blocks earlier keep fewer, which lowers their phase stability values.
    pub fn accumulate<S: WaveformSource + ?Sized>(
        &self,
        blocks: &AntennaBlockSet<'_, S>,
        quality: &BlockQuality,
        selection: &ReferenceSelection,
    ) -> Result<PhaseCoherence> {
        let num_antennas = blocks.num_antennas();
        let reference = selection.reference_antenna;
        let num_bins = self.upper_index - self.lower_index;

        let mut phase_mean = Array2::<Complex64>::zeros((num_antennas, num_bins));
        let mut spectrum_mean = Array2::<f64>::zeros((num_antennas, num_bins));
        let mut processed_blocks = vec![0usize; num_antennas];

        for block in quality.good_blocks(reference) {
            let active: Vec<bool> = (0..num_antennas)
                .map(|antenna| {
                    processed_blocks[antenna] < self.num_blocks && quality.is_good(antenna, block)
                })
                .collect();
            if !active.iter().any(|&a| a) {
                continue;
            }
            log::debug!("accumulating block {block}");

            // the reference spectrum is needed even when the reference itself is complete
            let spectra = (0..num_antennas)
                .into_par_iter()
                .map(|antenna| {
                    if active[antenna] || antenna == reference {
                        self.spectrum(blocks, antenna, block).map(Some)
                    } else {
                        Ok(None)
                    }
                })
                .collect::<Result<Vec<_>>>()?;

            let Some(reference_phasor) = spectra[reference]
                .as_ref()
                .map(|spectrum| spectrum.mapv(|x| x / (x.norm() + PHASOR_EPSILON)))
            else {
                continue;
            };

            for (antenna, spectrum) in spectra.iter().enumerate() {
                let Some(spectrum) = spectrum else { continue };
                if !active[antenna] {
                    continue;
                }
                Zip::from(phase_mean.row_mut(antenna))
                    .and(spectrum_mean.row_mut(antenna))
                    .and(spectrum)
                    .and(&reference_phasor)
                    .for_each(|phase, power, &x, &reference_x| {
                        let phasor = x / (x.norm() + PHASOR_EPSILON);
                        *phase += phasor / reference_x;
                        *power += x.norm_sqr();
                    });
                processed_blocks[antenna] += 1;
            }

            let complete = selection
                .antennas_good
                .iter()
                .zip(processed_blocks.iter())
                .filter(|(&good, _)| good)
                .all(|(_, &processed)| processed >= self.num_blocks);
            if complete {
                break;
            }
        }

        spectrum_mean.mapv_inplace(|p| p / self.num_blocks as f64);

        for (antenna, &processed) in processed_blocks.iter().enumerate() {
            if selection.antennas_good[antenna] && processed < self.num_blocks {
                log::warn!(
                    "antenna {antenna} accumulated only {processed} of {} blocks",
                    self.num_blocks
                );
            }
        }

        Ok(PhaseCoherence {
            phase_mean,
            spectrum_mean,
            processed_blocks,
            num_blocks: self.num_blocks,
        })
    }
}
