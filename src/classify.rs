use crate::error::{PerimeterError, Result};
use log::{debug, info};
use ndarray::Array2;
use rayon::prelude::*;

/// Binary hot-pixel mask: 1 where value >= threshold, else 0.
///
/// Nodata pixels are always background.
pub fn classify_binary(
    band: &Array2<u16>,
    threshold: u16,
    nodata: Option<u16>,
) -> Result<Array2<u8>> {
    let (nrows, ncols) = band.dim();

    // Process rows in parallel
    let rows: Vec<Vec<u8>> = (0..nrows)
        .into_par_iter()
        .map(|row| {
            band.row(row)
                .iter()
                .map(|&value| u8::from(value >= threshold && Some(value) != nodata))
                .collect()
        })
        .collect();

    let flat_data: Vec<u8> = rows.into_iter().flatten().collect();
    let classified = Array2::from_shape_vec((nrows, ncols), flat_data)?;

    let hot = classified.iter().filter(|&&v| v == 1).count();
    info!(
        "Classified {} of {} pixels as hot (threshold {})",
        hot,
        classified.len(),
        threshold
    );
    Ok(classified)
}

/// Heat intensity classes: each pixel gets the number of thresholds it reaches.
///
/// With `[33000, 39000, 53000]` this yields 0 = no heat, 1 = low, 2 = medium,
/// 3 = high. Nodata pixels get level 0.
pub fn classify_heat_levels(
    band: &Array2<u16>,
    thresholds: &[u16],
    nodata: Option<u16>,
) -> Result<Array2<u8>> {
    if thresholds.windows(2).any(|w| w[0] >= w[1]) || thresholds.len() > u8::MAX as usize {
        return Err(PerimeterError::InvalidHeatLevels(thresholds.to_vec()));
    }

    let levels = band.map(|&value| {
        if Some(value) == nodata {
            0
        } else {
            thresholds.partition_point(|&t| t <= value) as u8
        }
    });

    for level in 0..=thresholds.len() {
        let n = levels.iter().filter(|&&v| v as usize == level).count();
        debug!("Heat level {}: {} pixels", level, n);
    }
    Ok(levels)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr2;

    #[test]
    fn test_binary_boundary_inclusive() {
        let band = arr2(&[[19999u16, 20000, 20001], [0, 65535, 100]]);
        let classified = classify_binary(&band, 20000, None).unwrap();
        assert_eq!(classified, arr2(&[[0u8, 1, 1], [0, 1, 0]]));
    }

    #[test]
    fn test_binary_block() {
        let band = arr2(&[
            [100u16, 100, 100, 100],
            [100, 40000, 40000, 100],
            [100, 40000, 40000, 100],
            [100, 100, 100, 100],
        ]);
        let classified = classify_binary(&band, 20000, None).unwrap();
        assert_eq!(classified.iter().filter(|&&v| v == 1).count(), 4);
        assert_eq!(classified[[1, 1]], 1);
        assert_eq!(classified[[0, 0]], 0);
    }

    #[test]
    fn test_binary_all_values_for_small_threshold() {
        let band = Array2::from_shape_fn((16, 16), |(r, c)| (r * 16 + c) as u16);
        for threshold in [0u16, 1, 100, 255, 256] {
            let classified = classify_binary(&band, threshold, None).unwrap();
            for (&v, &class) in band.iter().zip(classified.iter()) {
                assert_eq!(class, u8::from(v >= threshold));
            }
        }
    }

    #[test]
    fn test_heat_levels() {
        let band = arr2(&[[32999u16, 33000, 39000], [52999, 53000, 65535]]);
        let levels = classify_heat_levels(&band, &[33000, 39000, 53000], None).unwrap();
        assert_eq!(levels, arr2(&[[0u8, 1, 2], [2, 3, 3]]));
    }

    #[test]
    fn test_heat_levels_reject_unsorted() {
        let band = arr2(&[[1u16]]);
        assert!(classify_heat_levels(&band, &[5, 5], None).is_err());
        assert!(classify_heat_levels(&band, &[9, 3], None).is_err());
    }

    #[test]
    fn test_nodata_is_never_hot() {
        let band = arr2(&[[65535u16, 40000], [100, 65535]]);
        let classified = classify_binary(&band, 20000, Some(65535)).unwrap();
        assert_eq!(classified, arr2(&[[0u8, 1], [0, 0]]));

        let levels = classify_heat_levels(&band, &[33000, 39000, 53000], Some(65535)).unwrap();
        assert_eq!(levels, arr2(&[[0u8, 2], [0, 0]]));
    }
}
