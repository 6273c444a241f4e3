//! Sample types and gain conversion helpers

/// Type alias for audio samples (always f64 for maximum precision)
pub type Sample = f64;

/// Convert decibels to linear gain
#[inline]
pub fn db_to_gain(db: Sample) -> Sample {
    10.0_f64.powf(db / 20.0)
}

/// Convert linear gain to decibels (floored at -120 dB for silence)
#[inline]
pub fn gain_to_db(gain: Sample) -> Sample {
    if gain > 1e-6 {
        20.0 * gain.log10()
    } else {
        -120.0
    }
}

/// RMS of a sample slice (0.0 for empty input)
#[inline]
pub fn rms(buffer: &[Sample]) -> Sample {
    if buffer.is_empty() {
        return 0.0;
    }
    let sum_squares: Sample = buffer.iter().map(|x| x * x).sum();
    (sum_squares / buffer.len() as Sample).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_db_gain_round_trip() {
        for db in [-12.0, -6.0, 0.0, 6.0, 12.0] {
            assert_relative_eq!(gain_to_db(db_to_gain(db)), db, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_unity_gain() {
        assert_relative_eq!(db_to_gain(0.0), 1.0);
    }

    #[test]
    fn test_rms_of_dc() {
        let buffer = vec![0.5; 256];
        assert_relative_eq!(rms(&buffer), 0.5, epsilon = 1e-12);
    }

    #[test]
    fn test_rms_empty() {
        assert_eq!(rms(&[]), 0.0);
    }
}
