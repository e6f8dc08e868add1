//! Statistical summarization of TCAV results
//!
//! Groups TCAV scores per concept and bottleneck, then tests each concept's
//! scores against the random-vs-random baseline with a two-sample t-test.
//! Concepts whose scores are indistinguishable from random get a score of 0.

use std::collections::BTreeMap;

use statrs::distribution::{ContinuousCDF, StudentsT};
use tracing::{debug, warn};

use crate::context::RANDOM_FOLDER_PREFIX;
use crate::tcav::TcavResult;

/// Default significance threshold
pub const DEFAULT_MIN_P_VALUE: f64 = 0.05;

/// Summary of one concept at one bottleneck
#[derive(Debug, Clone, PartialEq)]
pub struct ConceptSummary {
    pub concept: String,
    pub bottleneck: String,
    /// Mean TCAV score over random experiments
    pub mean: f64,
    /// Population standard deviation of the TCAV scores
    pub std: f64,
    /// Scores contributing to the mean
    pub samples: usize,
    /// None when the test is undefined (too few samples, zero variance with equal means)
    pub p_value: Option<f64>,
    pub significant: bool,
}

impl ConceptSummary {
    /// Reported score: the mean when significant, 0 otherwise
    pub fn score(&self) -> f64 {
        if self.significant {
            self.mean
        } else {
            0.0
        }
    }
}

/// Turns raw results into per-concept summaries
pub trait Summarizer {
    fn summarize(&self, results: &[TcavResult], random_experiments: usize) -> Vec<ConceptSummary>;
}

/// t-test against random baselines, in the manner of TCAV's result plots
#[derive(Debug, Clone)]
pub struct SignificanceSummarizer {
    min_p_value: f64,
}

impl SignificanceSummarizer {
    pub fn new(min_p_value: f64) -> Self {
        Self { min_p_value }
    }

    pub fn min_p_value(&self) -> f64 {
        self.min_p_value
    }
}

impl Default for SignificanceSummarizer {
    fn default() -> Self {
        Self::new(DEFAULT_MIN_P_VALUE)
    }
}

fn is_random(concept: &str) -> bool {
    concept
        .strip_prefix(RANDOM_FOLDER_PREFIX)
        .is_some_and(|rest| rest.starts_with('_'))
}

impl Summarizer for SignificanceSummarizer {
    fn summarize(&self, results: &[TcavResult], random_experiments: usize) -> Vec<ConceptSummary> {
        let mut random_scores: BTreeMap<&str, Vec<f64>> = BTreeMap::new();
        // (concept, bottleneck) in first-seen order
        let mut order: Vec<(&str, &str)> = Vec::new();
        let mut concept_scores: BTreeMap<(&str, &str), Vec<f64>> = BTreeMap::new();

        for result in results {
            if is_random(&result.cav_concept) {
                random_scores
                    .entry(result.bottleneck.as_str())
                    .or_default()
                    .push(result.i_up);
            } else {
                let key = (result.cav_concept.as_str(), result.bottleneck.as_str());
                concept_scores
                    .entry(key)
                    .or_insert_with(|| {
                        order.push(key);
                        Vec::new()
                    })
                    .push(result.i_up);
            }
        }

        order
            .into_iter()
            .map(|(concept, bottleneck)| {
                let scores = &concept_scores[&(concept, bottleneck)];
                if scores.len() != random_experiments {
                    debug!(
                        "{} at {}: {} scores for {} random experiments",
                        concept,
                        bottleneck,
                        scores.len(),
                        random_experiments
                    );
                }
                let baseline = random_scores
                    .get(bottleneck)
                    .map(Vec::as_slice)
                    .unwrap_or_default();
                if baseline.is_empty() {
                    warn!("No random baseline for bottleneck {}", bottleneck);
                }

                let (mean, std) = mean_std(scores);
                let p_value = two_sample_t_test(scores, baseline);
                let significant = p_value.map_or(true, |p| p <= self.min_p_value);

                ConceptSummary {
                    concept: concept.to_string(),
                    bottleneck: bottleneck.to_string(),
                    mean,
                    std,
                    samples: scores.len(),
                    p_value,
                    significant,
                }
            })
            .collect()
    }
}

/// Mean and population standard deviation
pub fn mean_std(values: &[f64]) -> (f64, f64) {
    if values.is_empty() {
        return (0.0, 0.0);
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, var.sqrt())
}

/// Two-sided Student's t-test with pooled variance
///
/// Returns None when the statistic is undefined.
pub fn two_sample_t_test(a: &[f64], b: &[f64]) -> Option<f64> {
    if a.len() < 2 || b.len() < 2 {
        return None;
    }
    let n1 = a.len() as f64;
    let n2 = b.len() as f64;
    let (mean1, std1) = mean_std(a);
    let (mean2, std2) = mean_std(b);

    // Population variances back to sample variances
    let var1 = std1.powi(2) * n1 / (n1 - 1.0);
    let var2 = std2.powi(2) * n2 / (n2 - 1.0);

    let df = n1 + n2 - 2.0;
    let pooled = ((n1 - 1.0) * var1 + (n2 - 1.0) * var2) / df;
    let se = (pooled * (1.0 / n1 + 1.0 / n2)).sqrt();

    if se == 0.0 {
        return if (mean1 - mean2).abs() == 0.0 {
            None
        } else {
            Some(0.0)
        };
    }

    let t = (mean1 - mean2) / se;
    let t_dist = StudentsT::new(0.0, 1.0, df).ok()?;
    Some((2.0 * (1.0 - t_dist.cdf(t.abs()))).clamp(0.0, 1.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(concept: &str, i_up: f64) -> TcavResult {
        TcavResult {
            cav_key: String::new(),
            cav_concept: concept.to_string(),
            negative_concept: "random500_0".to_string(),
            target_class: None,
            i_up,
            val_directional_dirs_abs_mean: 0.0,
            val_directional_dirs_mean: 0.0,
            val_directional_dirs_std: 0.0,
            note: String::new(),
            alpha: 0.1,
            bottleneck: "mixed4c".to_string(),
            cav_accuracies: BTreeMap::new(),
        }
    }

    #[test]
    fn test_mean_std() {
        let (mean, std) = mean_std(&[1.0, 2.0, 3.0, 4.0]);
        assert!((mean - 2.5).abs() < 1e-12);
        assert!((std - 1.118_033_988_7).abs() < 1e-9);
    }

    #[test]
    fn test_t_test_known_value() {
        // scipy.stats.ttest_ind([1,2,3,4,5], [6,7,8,9,10]).pvalue
        let p = two_sample_t_test(&[1.0, 2.0, 3.0, 4.0, 5.0], &[6.0, 7.0, 8.0, 9.0, 10.0])
            .unwrap();
        assert!((p - 0.001_052_8).abs() < 1e-5, "p = {p}");
    }

    #[test]
    fn test_t_test_undefined_cases() {
        assert_eq!(two_sample_t_test(&[0.5], &[0.1, 0.2]), None);
        assert_eq!(two_sample_t_test(&[0.5, 0.5], &[0.5, 0.5]), None);
        assert_eq!(two_sample_t_test(&[0.9, 0.9], &[0.1, 0.1]), Some(0.0));
    }

    #[test]
    fn test_insignificant_concept_scores_zero() {
        let results = vec![
            result("dotted", 0.90),
            result("dotted", 0.95),
            result("dotted", 0.92),
            result("striped", 0.50),
            result("striped", 0.40),
            result("striped", 0.60),
            result("random500_0", 0.45),
            result("random500_1", 0.55),
            result("random500_2", 0.50),
        ];
        let summaries = SignificanceSummarizer::default().summarize(&results, 3);

        assert_eq!(summaries.len(), 2);
        assert_eq!(summaries[0].concept, "dotted");
        assert!(summaries[0].significant);
        assert!((summaries[0].score() - summaries[0].mean).abs() < 1e-12);

        assert_eq!(summaries[1].concept, "striped");
        assert!(!summaries[1].significant);
        assert_eq!(summaries[1].score(), 0.0);
        assert!(summaries[1].mean > 0.0);
    }

    #[test]
    fn test_random_prefix_detection() {
        assert!(is_random("random500_3"));
        assert!(!is_random("random500"));
        assert!(!is_random("striped"));
    }
}
