//! Microphone input level

/// Gain applied to the RMS before clamping; speech rarely exceeds 0.2 RMS
const LEVEL_GAIN: f32 = 5.0;

/// Level in `[0, 1]` for a buffer of PCM samples in `[-1, 1]`
pub fn input_level(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum: f32 = samples.iter().map(|s| s * s).sum();
    let rms = (sum / samples.len() as f32).sqrt();
    if rms.is_nan() {
        return 0.0;
    }
    (rms * LEVEL_GAIN).min(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_silence_and_empty_buffers() {
        assert_eq!(input_level(&[]), 0.0);
        assert_eq!(input_level(&[0.0; 64]), 0.0);
    }

    #[test]
    fn test_scaled_rms() {
        // constant 0.1 has RMS 0.1
        let level = input_level(&[0.1; 128]);
        assert!((level - 0.5).abs() < 1e-5);
    }

    #[test]
    fn test_clamped_to_one() {
        assert_eq!(input_level(&[0.9, -0.9, 0.9, -0.9]), 1.0);
    }
}
