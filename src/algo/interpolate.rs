//! Gap filling between known bucket values.
//!
//! A run of missing buckets is bridged with an eased curve from the value on
//! its left to the value on its right. The `t^5` easing stays close to the
//! earlier value for most of the run and only converges on the later one near
//! the end, which avoids overshoot on short gaps.

use crate::error::AnalyserError;

const EASING_EXPONENT: i32 = 5;

/// Easing curve over the normalized position `t` in `[0, 1]`.
pub fn ease(t: f64) -> f64 {
    t.powi(EASING_EXPONENT)
}

/// Fills every interior run of `None` values. Both ends must be present.
pub fn fill_gaps(values: &[Option<f64>]) -> Result<Vec<f64>, AnalyserError> {
    if values.is_empty() {
        return Ok(Vec::new());
    }
    if values[0].is_none() || values[values.len() - 1].is_none() {
        return Err(AnalyserError::InvalidObservation(
            "series must start and end with a known value".to_string(),
        ));
    }

    let mut filled = Vec::with_capacity(values.len());
    let mut left = 0usize;

    for (i, value) in values.iter().enumerate() {
        let Some(right_value) = *value else { continue };

        if i > left + 1 {
            let left_value = filled[left];
            let span = (i - left) as f64;
            for x in left + 1..i {
                let t = (x - left) as f64 / span;
                filled.push(left_value + (right_value - left_value) * ease(t));
            }
        }

        filled.push(right_value);
        left = i;
    }

    Ok(filled)
}

/// Number of missing entries.
pub fn gap_count(values: &[Option<f64>]) -> usize {
    values.iter().filter(|v| v.is_none()).count()
}
