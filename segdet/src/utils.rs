//! Numeric helpers on logits.

use crate::common::*;

pub fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Index of the largest value. Ties go to the lower index.
pub fn argmax(values: ArrayView1<'_, f32>) -> Option<usize> {
    values
        .iter()
        .enumerate()
        .fold(None, |best: Option<(usize, f32)>, (index, &value)| match best {
            Some((_, best_value)) if best_value >= value => best,
            _ => Some((index, value)),
        })
        .map(|(index, _)| index)
}

pub fn log_sum_exp(values: ArrayView1<'_, f32>) -> f64 {
    let max = values
        .iter()
        .map(|&value| value as f64)
        .fold(f64::NEG_INFINITY, f64::max);
    if !max.is_finite() {
        return max;
    }
    let sum: f64 = values.iter().map(|&value| (value as f64 - max).exp()).sum();
    max + sum.ln()
}

/// Returns the argmax class and its softmax probability.
pub fn softmax_max(values: ArrayView1<'_, f32>) -> Option<(usize, f64)> {
    let index = argmax(values)?;
    let prob = (values[index] as f64 - log_sum_exp(values)).exp();
    Some((index, prob))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::{array, Array1};

    #[test]
    fn argmax_prefers_lower_index_on_ties() {
        assert_eq!(argmax(array![1.0f32, 3.0, 3.0].view()), Some(1));
        assert_eq!(argmax(Array1::<f32>::zeros(0).view()), None);
    }

    #[test]
    fn softmax_of_uniform_logits() {
        let (index, prob) = softmax_max(array![2.0f32, 2.0, 2.0, 2.0].view()).unwrap();
        assert_eq!(index, 0);
        assert_abs_diff_eq!(prob, 0.25, epsilon = 1e-9);
    }

    #[test]
    fn sigmoid_is_half_at_zero() {
        assert_abs_diff_eq!(sigmoid(0.0), 0.5);
    }
}
