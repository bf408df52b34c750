//! Strategy parameter extraction. Missing keys fall back to the strategy's
//! defaults; present-but-nonsensical values are rejected instead of being
//! clamped, so a bad grid point surfaces as a typed error.

use std::collections::HashMap;

use crate::errors::{EngineError, EngineResult};

/// Extract a positive integer parameter (periods, lookbacks).
pub fn usize_param(
    params: &HashMap<String, f64>,
    key: &str,
    default: usize,
) -> EngineResult<usize> {
    let raw = match params.get(key) {
        Some(&value) => value,
        None => return Ok(default),
    };
    if !raw.is_finite() || raw < 1.0 {
        return Err(EngineError::invalid_parameter(
            key,
            format!("must be a positive integer (got {})", raw),
        ));
    }
    if (raw - raw.round()).abs() > 1e-9 {
        return Err(EngineError::invalid_parameter(
            key,
            format!("must be a whole number (got {})", raw),
        ));
    }
    Ok(raw.round() as usize)
}

/// Extract a finite f64 parameter.
pub fn f64_param(params: &HashMap<String, f64>, key: &str, default: f64) -> EngineResult<f64> {
    let raw = params.get(key).copied().unwrap_or(default);
    if !raw.is_finite() {
        return Err(EngineError::invalid_parameter(
            key,
            format!("must be a finite number (got {})", raw),
        ));
    }
    Ok(raw)
}

/// Extract a finite f64 parameter constrained to an inclusive range.
pub fn f64_param_in(
    params: &HashMap<String, f64>,
    key: &str,
    default: f64,
    min: f64,
    max: f64,
) -> EngineResult<f64> {
    let value = f64_param(params, key, default)?;
    if value < min || value > max {
        return Err(EngineError::invalid_parameter(
            key,
            format!("must be between {} and {} (got {})", min, max, value),
        ));
    }
    Ok(value)
}

/// Extract a strictly positive f64 parameter.
pub fn positive_f64_param(
    params: &HashMap<String, f64>,
    key: &str,
    default: f64,
) -> EngineResult<f64> {
    let value = f64_param(params, key, default)?;
    if value <= 0.0 {
        return Err(EngineError::invalid_parameter(
            key,
            format!("must be positive (got {})", value),
        ));
    }
    Ok(value)
}

/// Fast/slow period pairs must keep `fast < slow` to mean anything.
pub fn require_ordered(
    fast_key: &str,
    fast: usize,
    slow_key: &str,
    slow: usize,
) -> EngineResult<()> {
    if fast >= slow {
        return Err(EngineError::invalid_parameter(
            fast_key,
            format!(
                "{} ({}) must be less than {} ({})",
                fast_key, fast, slow_key, slow
            ),
        ));
    }
    Ok(())
}

/// Threshold pairs like oversold/overbought must keep `lower < upper`.
pub fn require_below(
    lower_key: &str,
    lower: f64,
    upper_key: &str,
    upper: f64,
) -> EngineResult<()> {
    if lower >= upper {
        return Err(EngineError::invalid_parameter(
            lower_key,
            format!(
                "{} ({}) must be below {} ({})",
                lower_key, lower, upper_key, upper
            ),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_key_uses_default() {
        let params = HashMap::new();
        assert_eq!(usize_param(&params, "period", 14).unwrap(), 14);
        assert_eq!(f64_param(&params, "width", 2.0).unwrap(), 2.0);
    }

    #[test]
    fn rejects_fractional_period() {
        let mut params = HashMap::new();
        params.insert("period".to_string(), 10.5);
        assert!(usize_param(&params, "period", 14).is_err());
    }

    #[test]
    fn rejects_non_positive_period() {
        let mut params = HashMap::new();
        params.insert("period".to_string(), 0.0);
        assert!(usize_param(&params, "period", 14).is_err());
        params.insert("period".to_string(), -3.0);
        assert!(usize_param(&params, "period", 14).is_err());
    }

    #[test]
    fn rejects_unordered_pairs() {
        assert!(require_ordered("fast_period", 30, "slow_period", 10).is_err());
        assert!(require_ordered("fast_period", 10, "slow_period", 10).is_err());
        assert!(require_ordered("fast_period", 10, "slow_period", 30).is_ok());
        assert!(require_below("oversold", 70.0, "overbought", 30.0).is_err());
        assert!(require_below("oversold", 30.0, "overbought", 70.0).is_ok());
    }

    #[test]
    fn range_check_rejects_outside_values() {
        let mut params = HashMap::new();
        params.insert("oversold".to_string(), 130.0);
        assert!(f64_param_in(&params, "oversold", 30.0, 0.0, 100.0).is_err());
    }
}
