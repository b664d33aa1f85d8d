use crate::error::{Error, Result};
use crate::rfi::block_quality::BlockQuality;

/// The reference antenna and the antennas taking part in the phase analysis.
///
/// # Fields
/// - `reference_antenna`: Index of the antenna all phases are measured against.
/// - `antennas_good`: `true` for antennas sharing enough good blocks with the reference
///   (including the reference itself).
/// - `allowed_antennas`: For every candidate, the number of other antennas sharing at least
///   `num_blocks` good blocks with it.
#[derive(Clone, Debug, PartialEq)]
pub struct ReferenceSelection {
    pub reference_antenna: usize,
    pub antennas_good: Vec<bool>,
    pub allowed_antennas: Vec<usize>,
}

/// Reorders values so that the median comes first, followed by its neighbours at increasing
/// distance, alternating above and below: `mid, mid+1, mid-1, mid+2, mid-2, ...`.
///
/// For an even length the lower of the two middle elements is taken as `mid`.
pub fn median_sorted_by_power<T: Copy>(sorted: &[T]) -> Vec<T> {
    let n = sorted.len();
    if n == 0 {
        return Vec::new();
    }
    let mid = if n % 2 == 0 { n / 2 - 1 } else { n / 2 };
    let mut ordered = Vec::with_capacity(n);
    ordered.push(sorted[mid]);
    for distance in 1..n {
        if mid + distance < n {
            ordered.push(sorted[mid + distance]);
        }
        if distance <= mid {
            ordered.push(sorted[mid - distance]);
        }
    }
    ordered
}

/// Chooses the reference antenna and the set of good antennas, clearing all block flags of
/// antennas that are not good.
///
/// Candidates are the antennas with the largest number of partner antennas sharing at least
/// `num_blocks` good blocks. Among them the one whose average power is closest to the station
/// median is taken, so neither a dead nor a noisy antenna becomes the reference.
///
/// # Errors
/// - [`Error::InsufficientGoodBlocks`] if no antenna has `num_blocks` good blocks.
/// - [`Error::NoReferenceAntenna`] if no candidate has at least two partner antennas.
pub fn select_reference_antenna(
    quality: &mut BlockQuality,
    num_blocks: usize,
    station: &str,
) -> Result<ReferenceSelection> {
    let num_antennas = quality.num_antennas();
    let available = quality.good_block_counts.iter().copied().max().unwrap_or(0);
    if available < num_blocks {
        return Err(Error::InsufficientGoodBlocks {
            station: station.to_string(),
            required: num_blocks,
            available,
        });
    }

    let allowed_antennas: Vec<usize> = (0..num_antennas)
        .map(|candidate| {
            (0..num_antennas)
                .filter(|&other| other != candidate)
                .filter(|&other| quality.joint_good_blocks(candidate, other) >= num_blocks)
                .count()
        })
        .collect();
    let max_allowed = allowed_antennas.iter().copied().max().unwrap_or(0);
    if max_allowed < 2 {
        return Err(Error::NoReferenceAntenna {
            station: station.to_string(),
            best: max_allowed,
        });
    }

    let mut by_power: Vec<usize> = (0..num_antennas).collect();
    by_power.sort_by(|&a, &b| quality.average_power[a].total_cmp(&quality.average_power[b]));

    let reference_antenna = median_sorted_by_power(&by_power)
        .into_iter()
        .find(|&antenna| allowed_antennas[antenna] == max_allowed)
        .ok_or_else(|| Error::NoReferenceAntenna {
            station: station.to_string(),
            best: max_allowed,
        })?;

    let antennas_good: Vec<bool> = (0..num_antennas)
        .map(|antenna| {
            quality.joint_good_blocks(antenna, reference_antenna) + 1 >= num_blocks
        })
        .collect();
    for (antenna, &good) in antennas_good.iter().enumerate() {
        if !good {
            quality.clear_antenna(antenna);
        }
    }

    log::info!(
        "station {station}: using antenna {reference_antenna} as phase reference, {} of {num_antennas} antennas are good",
        antennas_good.iter().filter(|&&g| g).count()
    );

    Ok(ReferenceSelection {
        reference_antenna,
        antennas_good,
        allowed_antennas,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn quality(good: Array2<bool>, average_power: Vec<f64>) -> BlockQuality {
        let good_block_counts = good
            .rows()
            .into_iter()
            .map(|row| row.iter().filter(|&&g| g).count())
            .collect();
        BlockQuality {
            good,
            good_block_counts,
            average_power,
        }
    }

    #[test]
    fn test_median_sorted_by_power() {
        assert_eq!(median_sorted_by_power(&[1, 2, 3, 4, 5]), vec![3, 4, 2, 5, 1]);
        assert_eq!(median_sorted_by_power(&[1, 2, 3, 4]), vec![2, 3, 1, 4]);
        assert_eq!(median_sorted_by_power(&[7]), vec![7]);
        assert!(median_sorted_by_power::<usize>(&[]).is_empty());
    }

    #[test]
    fn test_reference_is_the_median_power_antenna() {
        let good = Array2::from_elem((5, 4), true);
        let mut q = quality(good, vec![5.0, 1.0, 4.0, 2.0, 3.0]);
        let selection = select_reference_antenna(&mut q, 4, "CS001").unwrap();
        // powers sorted: 1, 3, 4, 2, 0 -> median antenna 4
        assert_eq!(selection.reference_antenna, 4);
        assert_eq!(selection.allowed_antennas, vec![4; 5]);
        assert!(selection.antennas_good.iter().all(|&g| g));
    }

    #[test]
    fn test_antennas_with_too_few_shared_blocks_are_dropped() {
        let mut good = Array2::from_elem((4, 6), true);
        // antenna 3 shares only 3 good blocks with everyone
        for block in 0..3 {
            good[[3, block]] = false;
        }
        let mut q = quality(good, vec![1.0, 2.0, 3.0, 4.0]);
        let selection = select_reference_antenna(&mut q, 5, "CS001").unwrap();

        assert_eq!(selection.allowed_antennas, vec![2, 2, 2, 0]);
        assert_eq!(selection.reference_antenna, 1);
        assert_eq!(selection.antennas_good, vec![true, true, true, false]);
        assert!(q.good_blocks(3).is_empty());
    }

    #[test]
    fn test_one_missing_shared_block_is_tolerated() {
        let mut good = Array2::from_elem((4, 6), true);
        good[[0, 5]] = false;
        let mut q = quality(good, vec![1.0, 2.0, 3.0, 4.0]);
        let selection = select_reference_antenna(&mut q, 6, "CS001").unwrap();
        // antenna 0 has 5 of 6 blocks and cannot be a reference, but stays good
        assert_eq!(selection.allowed_antennas, vec![0, 2, 2, 2]);
        assert_eq!(selection.reference_antenna, 1);
        assert!(selection.antennas_good.iter().all(|&g| g));
    }

    #[test]
    fn test_single_antenna_has_no_reference() {
        let mut q = quality(Array2::from_elem((1, 4), true), vec![1.0]);
        assert!(matches!(
            select_reference_antenna(&mut q, 4, "CS001"),
            Err(Error::NoReferenceAntenna { best: 0, .. })
        ));
    }

    #[test]
    fn test_insufficient_good_blocks() {
        let mut good = Array2::from_elem((3, 4), true);
        for antenna in 0..3 {
            good[[antenna, antenna]] = false;
        }
        let mut q = quality(good, vec![1.0; 3]);
        match select_reference_antenna(&mut q, 4, "CS001") {
            Err(Error::InsufficientGoodBlocks {
                required,
                available,
                ..
            }) => {
                assert_eq!(required, 4);
                assert_eq!(available, 3);
            }
            other => panic!("unexpected result {other:?}"),
        }
    }
}
