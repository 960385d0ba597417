use crate::error::{PerimeterError, Result};
use log::{info, warn};
use ndarray::Array2;

const HISTOGRAM_BINS: usize = u16::MAX as usize + 1;
const SUMMARY_BINS: usize = 16;

/// How the hot/background cut-off is chosen for a band
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ThresholdStrategy {
    /// Hand-picked value, e.g. 33332 for the Mills Fire mosaic
    Fixed(u16),
    /// Maximise between-class variance of the band histogram
    Otsu,
    /// Value at the given percentile (0..=100) of the band
    Percentile(f64),
}

/// Global statistics of a u16 band with a full-resolution histogram.
///
/// Nodata pixels are counted separately and kept out of the histogram.
#[derive(Debug, Clone)]
pub struct BandStatistics {
    pub count: u64,
    pub nodata: u64,
    pub min: u16,
    pub max: u16,
    pub mean: f64,
    histogram: Vec<u64>,
}

impl BandStatistics {
    pub fn compute(band: &Array2<u16>) -> Result<Self> {
        Self::compute_masked(band, None)
    }

    pub fn compute_masked(band: &Array2<u16>, nodata: Option<u16>) -> Result<Self> {
        let (height, width) = band.dim();
        if width == 0 || height == 0 {
            return Err(PerimeterError::InvalidDimensions(width, height));
        }

        let mut histogram = vec![0u64; HISTOGRAM_BINS];
        let mut sum = 0u128;
        let mut min = u16::MAX;
        let mut max = u16::MIN;
        let mut skipped = 0u64;
        for &value in band.iter() {
            if Some(value) == nodata {
                skipped += 1;
                continue;
            }
            histogram[value as usize] += 1;
            sum += value as u128;
            min = min.min(value);
            max = max.max(value);
        }

        let count = band.len() as u64 - skipped;
        if count == 0 {
            return Err(PerimeterError::NoValidPixels);
        }
        Ok(Self {
            count,
            nodata: skipped,
            min,
            max,
            mean: sum as f64 / count as f64,
            histogram,
        })
    }

    /// Number of pixels with exactly this value
    pub fn frequency(&self, value: u16) -> u64 {
        self.histogram[value as usize]
    }

    /// Number of pixels with value >= threshold
    pub fn count_at_or_above(&self, threshold: u16) -> u64 {
        self.histogram[threshold as usize..].iter().sum()
    }

    /// Coarse equal-width histogram between min and max, for log output
    pub fn summary(&self, bins: usize) -> Vec<(u16, u16, u64)> {
        let span = self.max as usize - self.min as usize + 1;
        let bins = bins.clamp(1, span);
        let width = span.div_ceil(bins);

        (0..bins)
            .map(|i| {
                let lo = self.min as usize + i * width;
                let hi = (lo + width).min(self.max as usize + 1);
                let count = if lo < hi { self.histogram[lo..hi].iter().sum() } else { 0 };
                (lo.min(u16::MAX as usize) as u16, (hi - 1).min(u16::MAX as usize) as u16, count)
            })
            .filter(|&(lo, hi, _)| lo <= hi)
            .collect()
    }

    pub fn log_summary(&self) {
        info!(
            "Band statistics: {} pixels, min={}, max={}, mean={:.2}",
            self.count, self.min, self.max, self.mean
        );
        if self.nodata > 0 {
            info!("  {} nodata pixels excluded", self.nodata);
        }
        let rows = self.summary(SUMMARY_BINS);
        let peak = rows.iter().map(|r| r.2).max().unwrap_or(0).max(1);
        for (lo, hi, count) in rows {
            let bar = "#".repeat((count * 40 / peak) as usize);
            info!("  [{:>5}..{:>5}] {:>10} {}", lo, hi, count, bar);
        }
    }

    fn percentile(&self, p: f64) -> Result<u16> {
        if !(0.0..=100.0).contains(&p) {
            return Err(PerimeterError::InvalidPercentile(p));
        }

        let rank = ((p / 100.0) * self.count as f64).ceil() as u64;
        let rank = rank.clamp(1, self.count);
        let mut cumulative = 0u64;
        for (value, &n) in self.histogram.iter().enumerate() {
            cumulative += n;
            if cumulative >= rank {
                return Ok(value as u16);
            }
        }
        Ok(self.max)
    }

    /// Pixels below the returned value form the background class
    fn otsu(&self) -> u16 {
        if self.min == self.max {
            warn!(
                "Constant band (all pixels = {}), Otsu threshold is degenerate",
                self.min
            );
            return self.min;
        }

        let total = self.count as f64;
        let total_sum: f64 = (self.min..=self.max)
            .map(|v| v as f64 * self.histogram[v as usize] as f64)
            .sum();

        let mut best_threshold = self.min + 1;
        let mut best_variance = -1.0;
        let mut background_weight = 0.0;
        let mut background_sum = 0.0;

        for t in (self.min + 1)..=self.max {
            let prev = (t - 1) as usize;
            background_weight += self.histogram[prev] as f64;
            background_sum += prev as f64 * self.histogram[prev] as f64;

            let foreground_weight = total - background_weight;
            if background_weight == 0.0 || foreground_weight == 0.0 {
                continue;
            }

            let background_mean = background_sum / background_weight;
            let foreground_mean = (total_sum - background_sum) / foreground_weight;
            let diff = background_mean - foreground_mean;
            let variance = background_weight * foreground_weight * diff * diff;

            if variance > best_variance {
                best_variance = variance;
                best_threshold = t;
            }
        }

        best_threshold
    }
}

impl ThresholdStrategy {
    pub fn select(&self, stats: &BandStatistics) -> Result<u16> {
        let threshold = match *self {
            ThresholdStrategy::Fixed(value) => value,
            ThresholdStrategy::Otsu => stats.otsu(),
            ThresholdStrategy::Percentile(p) => stats.percentile(p)?,
        };
        info!(
            "Selected threshold {} ({:?}); {} of {} pixels at or above",
            threshold,
            self,
            stats.count_at_or_above(threshold),
            stats.count
        );
        Ok(threshold)
    }
}

/// Compute band statistics over valid pixels, log them, and pick a threshold
pub fn select_threshold(
    band: &Array2<u16>,
    strategy: ThresholdStrategy,
    nodata: Option<u16>,
) -> Result<(u16, BandStatistics)> {
    let stats = BandStatistics::compute_masked(band, nodata)?;
    stats.log_summary();
    let threshold = strategy.select(&stats)?;
    Ok((threshold, stats))
}
