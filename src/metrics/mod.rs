//! Dataset-level accuracy aggregation.
//!
//! Per-pixel endpoint errors are pooled across the whole pass. Threshold
//! fractions are weighted over pixels, so the aggregator keeps every valid
//! pixel instead of a running mean.

use serde::{Deserialize, Serialize};

use crate::error::{EvalError, Result};
use crate::flow::{FlowField, ValidityMask};

/// Absolute thresholds for the `Npx` fractions.
pub const PX_THRESHOLDS: [f32; 3] = [1.0, 3.0, 5.0];
/// Outlier criterion: absolute error above this many pixels...
pub const OUTLIER_ABS: f32 = 3.0;
/// ...and relative error above this fraction of the ground-truth magnitude.
pub const OUTLIER_REL: f32 = 0.05;

/// How the headline endpoint error is averaged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AggregationStrategy {
    /// Mean over every valid pixel of every sample (Chairs, Sintel).
    PooledPixels,
    /// Mean over samples of each sample's mean over its valid pixels (KITTI).
    PerSampleMean,
}

/// Per-pixel errors of one evaluated sample.
#[derive(Debug, Clone)]
pub struct ErrorSample {
    epe: Vec<f32>,
    valid: Option<Vec<bool>>,
    magnitude: Option<Vec<f32>>,
}

impl ErrorSample {
    /// Build from flattened per-pixel vectors of equal length.
    pub fn new(
        epe: Vec<f32>,
        valid: Option<Vec<bool>>,
        magnitude: Option<Vec<f32>>,
    ) -> Result<Self> {
        let n = epe.len();
        if let Some(valid) = &valid {
            if valid.len() != n {
                return Err(EvalError::shape("validity mask", (n, 1), (valid.len(), 1)));
            }
        }
        if let Some(magnitude) = &magnitude {
            if magnitude.len() != n {
                return Err(EvalError::shape("flow magnitude", (n, 1), (magnitude.len(), 1)));
            }
        }
        Ok(Self {
            epe,
            valid,
            magnitude,
        })
    }

    /// Compare a prediction against ground truth of the same size.
    pub fn from_flows(
        prediction: &FlowField,
        ground_truth: &FlowField,
        valid: Option<&ValidityMask>,
    ) -> Result<Self> {
        if prediction.dims() != ground_truth.dims() {
            return Err(EvalError::shape("ground truth", ground_truth.dims(), prediction.dims()));
        }
        if let Some(mask) = valid {
            if mask.dims() != ground_truth.dims() {
                return Err(EvalError::shape("validity mask", ground_truth.dims(), mask.dims()));
            }
        }

        let (pu, pv) = (prediction.u(), prediction.v());
        let (gu, gv) = (ground_truth.u(), ground_truth.v());

        let epe = pu
            .iter()
            .zip(pv.iter())
            .zip(gu.iter().zip(gv.iter()))
            .map(|((pu, pv), (gu, gv))| ((pu - gu).powi(2) + (pv - gv).powi(2)).sqrt())
            .collect();
        let magnitude = gu
            .iter()
            .zip(gv.iter())
            .map(|(u, v)| (u * u + v * v).sqrt())
            .collect();
        let valid = valid.map(|mask| mask.data().iter().copied().collect());

        Ok(Self {
            epe,
            valid,
            magnitude: Some(magnitude),
        })
    }

    pub fn len(&self) -> usize {
        self.epe.len()
    }

    pub fn is_empty(&self) -> bool {
        self.epe.is_empty()
    }

    fn is_valid(&self, i: usize) -> bool {
        self.valid.as_ref().map_or(true, |v| v[i])
    }
}

/// Final statistics of one dataset pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccuracyReport {
    pub strategy: AggregationStrategy,
    /// Headline endpoint error under `strategy`.
    pub epe: f64,
    pub pooled_epe: f64,
    pub per_sample_epe: f64,
    pub px1: f64,
    pub px3: f64,
    pub px5: f64,
    /// Fraction of valid pixels that are outliers, when every sample carried
    /// a validity mask and ground-truth magnitude.
    pub outlier_rate: Option<f64>,
    /// Samples with at least one valid pixel.
    pub samples: usize,
    pub pixels: usize,
}

impl AccuracyReport {
    /// One-line summary written to the report side file.
    pub fn summary_line(&self) -> String {
        format!(
            "Validation EPE: {:.3}, 1px: {:.3}, 3px: {:.3}, 5px: {:.3}",
            self.epe, self.px1, self.px3, self.px5
        )
    }
}

impl std::fmt::Display for AccuracyReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.summary_line())?;
        if let Some(rate) = self.outlier_rate {
            write!(f, ", F1: {:.3}%", rate * 100.0)?;
        }
        Ok(())
    }
}

/// Collects [`ErrorSample`]s over a full pass.
#[derive(Debug)]
pub struct MetricAggregator {
    strategy: AggregationStrategy,
    epe: Vec<f32>,
    outliers: Vec<bool>,
    sample_means: Vec<f64>,
    outliers_available: bool,
}

impl MetricAggregator {
    pub fn new(strategy: AggregationStrategy) -> Self {
        Self {
            strategy,
            epe: Vec::new(),
            outliers: Vec::new(),
            sample_means: Vec::new(),
            outliers_available: true,
        }
    }

    /// Append the valid pixels of one sample.
    pub fn add_sample(&mut self, sample: ErrorSample) {
        let has_outlier_inputs = sample.valid.is_some() && sample.magnitude.is_some();
        self.outliers_available &= has_outlier_inputs;

        let start = self.epe.len();
        for i in 0..sample.len() {
            if !sample.is_valid(i) {
                continue;
            }
            let e = sample.epe[i];
            self.epe.push(e);
            if let Some(magnitude) = &sample.magnitude {
                self.outliers.push(e > OUTLIER_ABS && e / magnitude[i] > OUTLIER_REL);
            }
        }

        let added = &self.epe[start..];
        if !added.is_empty() {
            self.sample_means.push(mean(added.iter().map(|&e| e as f64), added.len()));
        }
    }

    /// Number of valid pixels collected so far.
    pub fn pixel_count(&self) -> usize {
        self.epe.len()
    }

    /// Compute the report. Fails when no valid pixel was collected.
    pub fn finalize(&self) -> Result<AccuracyReport> {
        let pixels = self.epe.len();
        if pixels == 0 {
            return Err(EvalError::EmptyPopulation);
        }

        let pooled_epe = mean(self.epe.iter().map(|&e| e as f64), pixels);
        let per_sample_epe = mean(self.sample_means.iter().copied(), self.sample_means.len());
        let fraction_below = |threshold: f32| {
            self.epe.iter().filter(|&&e| e < threshold).count() as f64 / pixels as f64
        };

        let outlier_rate = if self.outliers_available && self.outliers.len() == pixels {
            Some(self.outliers.iter().filter(|&&o| o).count() as f64 / pixels as f64)
        } else {
            None
        };

        let epe = match self.strategy {
            AggregationStrategy::PooledPixels => pooled_epe,
            AggregationStrategy::PerSampleMean => per_sample_epe,
        };

        Ok(AccuracyReport {
            strategy: self.strategy,
            epe,
            pooled_epe,
            per_sample_epe,
            px1: fraction_below(PX_THRESHOLDS[0]),
            px3: fraction_below(PX_THRESHOLDS[1]),
            px5: fraction_below(PX_THRESHOLDS[2]),
            outlier_rate,
            samples: self.sample_means.len(),
            pixels,
        })
    }
}

fn mean<I: Iterator<Item = f64>>(values: I, count: usize) -> f64 {
    values.sum::<f64>() / count as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;

    fn plain(epe: &[f32]) -> ErrorSample {
        ErrorSample::new(epe.to_vec(), None, None).unwrap()
    }

    #[test]
    fn test_pooled_statistics() {
        let mut agg = MetricAggregator::new(AggregationStrategy::PooledPixels);
        agg.add_sample(plain(&[0.0, 2.0, 4.0, 6.0]));
        agg.add_sample(plain(&[1.0, 3.0, 5.0, 7.0]));

        let report = agg.finalize().unwrap();
        assert_eq!(report.epe, 3.5);
        assert_eq!(report.px1, 1.0 / 8.0);
        assert_eq!(report.px3, 3.0 / 8.0);
        // Strict `<`: 0, 1, 2, 3, 4 are below 5.
        assert_eq!(report.px5, 5.0 / 8.0);
        assert_eq!(report.pixels, 8);
        assert_eq!(report.samples, 2);
        assert_eq!(report.outlier_rate, None);
    }

    #[test]
    fn test_finalize_is_repeatable() {
        let mut agg = MetricAggregator::new(AggregationStrategy::PerSampleMean);
        agg.add_sample(plain(&[0.1, 0.7, 2.9]));
        agg.add_sample(plain(&[5.3]));

        let first = agg.finalize().unwrap();
        let second = agg.finalize().unwrap();
        assert_eq!(first.epe.to_bits(), second.epe.to_bits());
        assert_eq!(first.pooled_epe.to_bits(), second.pooled_epe.to_bits());
        assert_eq!(first, second);
    }

    #[test]
    fn test_empty_population_fails() {
        let agg = MetricAggregator::new(AggregationStrategy::PooledPixels);
        assert!(matches!(agg.finalize(), Err(EvalError::EmptyPopulation)));

        let mut agg = MetricAggregator::new(AggregationStrategy::PerSampleMean);
        agg.add_sample(ErrorSample::new(vec![1.0, 2.0], Some(vec![false, false]), None).unwrap());
        assert!(matches!(agg.finalize(), Err(EvalError::EmptyPopulation)));
    }

    #[test]
    fn test_per_sample_mean_differs_from_pooled() {
        let mut agg = MetricAggregator::new(AggregationStrategy::PerSampleMean);
        agg.add_sample(plain(&[1.0, 1.0]));
        agg.add_sample(plain(&[3.0]));

        let report = agg.finalize().unwrap();
        assert_eq!(report.per_sample_epe, 2.0);
        assert_eq!(report.epe, 2.0);
        assert!((report.pooled_epe - 5.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_masked_sample_contributes_nothing() {
        let kept = [0.5, 1.5, 4.0];

        let mut masked = MetricAggregator::new(AggregationStrategy::PerSampleMean);
        let hidden = ErrorSample::new(vec![9.0, 9.0], Some(vec![false, false]), None).unwrap();
        masked.add_sample(hidden);
        masked.add_sample(ErrorSample::new(kept.to_vec(), Some(vec![true; 3]), None).unwrap());

        let mut alone = MetricAggregator::new(AggregationStrategy::PerSampleMean);
        alone.add_sample(ErrorSample::new(kept.to_vec(), Some(vec![true; 3]), None).unwrap());

        assert_eq!(masked.finalize().unwrap(), alone.finalize().unwrap());
    }

    #[test]
    fn test_outlier_rate() {
        let mut agg = MetricAggregator::new(AggregationStrategy::PerSampleMean);
        agg.add_sample(
            ErrorSample::new(
                vec![4.0, 4.0, 1.0, 50.0],
                Some(vec![true, true, true, false]),
                Some(vec![10.0, 100.0, 1.0, 1.0]),
            )
            .unwrap(),
        );

        let report = agg.finalize().unwrap();
        // Only the first pixel is both > 3px and > 5% of the magnitude.
        assert_eq!(report.outlier_rate, Some(1.0 / 3.0));
        assert_eq!(report.pixels, 3);
    }

    #[test]
    fn test_outlier_rate_needs_every_sample_masked() {
        let mut agg = MetricAggregator::new(AggregationStrategy::PooledPixels);
        agg.add_sample(ErrorSample::new(vec![4.0], Some(vec![true]), Some(vec![1.0])).unwrap());
        agg.add_sample(plain(&[4.0]));
        assert_eq!(agg.finalize().unwrap().outlier_rate, None);
    }

    #[test]
    fn test_from_flows() {
        let prediction = FlowField::constant(2, 2, 3.0, 4.0);
        let ground_truth = FlowField::zeros(2, 2);
        let mut mask = Array2::from_elem((2, 2), true);
        mask[[1, 1]] = false;

        let mask = ValidityMask::new(mask);
        let sample = ErrorSample::from_flows(&prediction, &ground_truth, Some(&mask)).unwrap();
        assert_eq!(sample.len(), 4);
        assert_eq!(sample.epe, vec![5.0; 4]);

        let mut agg = MetricAggregator::new(AggregationStrategy::PooledPixels);
        agg.add_sample(sample);
        let report = agg.finalize().unwrap();
        assert_eq!(report.pixels, 3);
        // Zero ground-truth magnitude makes every large error an outlier.
        assert_eq!(report.outlier_rate, Some(1.0));
    }

    #[test]
    fn test_from_flows_rejects_size_mismatch() {
        let err = ErrorSample::from_flows(&FlowField::zeros(2, 3), &FlowField::zeros(2, 2), None)
            .unwrap_err();
        assert!(matches!(err, EvalError::ShapeMismatch { .. }));
    }

    #[test]
    fn test_summary_line_format() {
        let mut agg = MetricAggregator::new(AggregationStrategy::PooledPixels);
        agg.add_sample(plain(&[0.0, 2.0, 4.0, 6.0]));
        assert_eq!(
            agg.finalize().unwrap().summary_line(),
            "Validation EPE: 3.000, 1px: 0.250, 3px: 0.500, 5px: 0.750"
        );
    }
}
