//! Guards for floating-point state loaded from disk.
//!
//! Persisted records may have been written by an older build or corrupted by
//! hand-editing; a NaN or Inf that sneaks into the affect state would poison
//! every subsequent inertia blend.

use serde::{Deserialize, Deserializer};

/// Replace NaN/Inf with the provided fallback.
#[inline]
pub fn sanitize_f32(v: f32, fallback: f32) -> f32 {
    if v.is_finite() {
        v
    } else {
        tracing::warn!("NaN/Inf detected in persisted state, resetting to {}", fallback);
        fallback
    }
}

/// Serde deserializer that maps non-finite values to 0.0.
pub fn deserialize_safe_f32<'de, D>(deserializer: D) -> Result<f32, D::Error>
where
    D: Deserializer<'de>,
{
    let v = f32::deserialize(deserializer)?;
    Ok(sanitize_f32(v, 0.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_finite_passthrough() {
        assert_eq!(sanitize_f32(0.7, 0.0), 0.7);
        assert_eq!(sanitize_f32(-1.0, 0.5), -1.0);
    }

    #[test]
    fn test_nan_and_inf_fall_back() {
        assert_eq!(sanitize_f32(f32::NAN, 0.3), 0.3);
        assert_eq!(sanitize_f32(f32::INFINITY, 0.3), 0.3);
        assert_eq!(sanitize_f32(f32::NEG_INFINITY, 0.3), 0.3);
    }
}
