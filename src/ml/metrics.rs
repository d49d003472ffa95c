use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;

/// Holdout accuracy recorded when the trainer runs with an evaluation year.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationMetrics {
    pub r2: Option<f64>,
    pub mae: f64,
    pub rmse: f64,
    pub test_years: Vec<i32>,
}

impl EvaluationMetrics {
    pub fn compute(actual: &[f64], predicted: &[f64], test_years: Vec<i32>) -> Self {
        let n = actual.len().min(predicted.len()).max(1) as f64;

        let errors: Vec<f64> = actual.iter().zip(predicted).map(|(a, p)| a - p).collect();
        let mae = errors.iter().map(|e| e.abs()).sum::<f64>() / n;
        let rmse = (errors.iter().map(|e| e * e).sum::<f64>() / n).sqrt();

        Self {
            r2: r_squared(actual, &errors),
            mae,
            rmse,
            test_years,
        }
    }
}

// Undefined for fewer than two points or a constant target
fn r_squared(actual: &[f64], errors: &[f64]) -> Option<f64> {
    if actual.len() < 2 || actual.iter().all(|v| *v == actual[0]) {
        return None;
    }
    let mean = actual.iter().mean();
    let ss_tot: f64 = actual.iter().map(|v| (v - mean).powi(2)).sum();
    let ss_res: f64 = errors.iter().map(|e| e * e).sum();
    Some(1.0 - ss_res / ss_tot)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn perfect_predictions() {
        let m = EvaluationMetrics::compute(
            &[1.0, 2.0, 3.0],
            &[1.0, 2.0, 3.0],
            vec![2020, 2021, 2022],
        );
        assert_eq!(m.r2, Some(1.0));
        assert_eq!(m.mae, 0.0);
        assert_eq!(m.rmse, 0.0);
        assert_eq!(m.test_years, vec![2020, 2021, 2022]);
    }

    #[test]
    fn errors_are_averaged() {
        let m = EvaluationMetrics::compute(&[10.0, 20.0], &[12.0, 16.0], vec![2020, 2021]);
        assert_eq!(m.mae, 3.0);
        assert!((m.rmse - 10.0_f64.sqrt()).abs() < 1e-12);
        // ss_tot = 50, ss_res = 20
        assert!((m.r2.unwrap() - 0.6).abs() < 1e-12);
    }

    #[test]
    fn r2_undefined_for_constant_or_single_target() {
        assert_eq!(EvaluationMetrics::compute(&[5.0, 5.0], &[4.0, 6.0], vec![]).r2, None);
        assert_eq!(EvaluationMetrics::compute(&[5.0], &[4.0], vec![]).r2, None);
    }
}
