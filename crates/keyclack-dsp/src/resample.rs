//! Rational resampling: the ratio is pinned to a small fraction, the filtering is rubato's
//! windowed sinc interpolator.

use crate::variation::DspError;
use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};

const SINC_LEN: usize = 128;

/// Closest fraction to `x` with denominator at most `max_den`, as `(numerator, denominator)`.
///
/// Runs the continued-fraction expansion of the exact binary value of `x` and picks between
/// the last convergent and the best semiconvergent. Returns `None` for non-positive or
/// non-finite input.
pub fn limit_denominator(x: f64, max_den: u64) -> Option<(u64, u64)> {
    if !x.is_finite() || x <= 0.0 || max_den == 0 {
        return None;
    }
    let (num, den) = exact_ratio(x)?;
    if den <= max_den as u128 {
        return Some((u64::try_from(num).ok()?, den as u64));
    }

    let max_den = max_den as u128;
    let (mut p0, mut q0, mut p1, mut q1) = (0u128, 1u128, 1u128, 0u128);
    let (mut n, mut d) = (num, den);
    while d != 0 {
        let a = n / d;
        let q2 = q0 + a * q1;
        if q2 > max_den {
            break;
        }
        let p2 = p0 + a * p1;
        (p0, q0, p1, q1) = (p1, q1, p2, q2);
        (n, d) = (d, n - a * d);
    }
    if q1 == 0 {
        return None;
    }
    let k = (max_den - q0) / q1;
    let (p, q) = if 2 * d * (q0 + k * q1) <= den {
        (p1, q1)
    } else {
        (p0 + k * p1, q0 + k * q1)
    };
    if p == 0 {
        return None;
    }
    Some((u64::try_from(p).ok()?, q as u64))
}

fn exact_ratio(x: f64) -> Option<(u128, u128)> {
    let bits = x.to_bits();
    let exp_bits = ((bits >> 52) & 0x7ff) as i32;
    let frac = bits & ((1u64 << 52) - 1);
    let (mantissa, exp) = if exp_bits == 0 {
        (frac, -1074)
    } else {
        (frac | (1u64 << 52), exp_bits - 1075)
    };
    if mantissa == 0 {
        return None;
    }
    let shift = mantissa.trailing_zeros() as i32;
    let mantissa = (mantissa >> shift) as u128;
    let exp = exp + shift;
    if exp >= 0 {
        if exp >= 75 {
            return None;
        }
        Some((mantissa << exp, 1))
    } else if -exp < 127 {
        Some((mantissa, 1u128 << (-exp)))
    } else {
        None
    }
}

fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}

fn sinc_params() -> SincInterpolationParameters {
    SincInterpolationParameters {
        sinc_len: SINC_LEN,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    }
}

/// Resamples equal-length channel lanes by `up / down` in one pass, each lane producing
/// exactly `ceil(len * up / down)` samples with the filter delay removed.
pub fn resample_lanes(lanes: &[Vec<f64>], up: u64, down: u64) -> Result<Vec<Vec<f64>>, DspError> {
    let n_in = lanes.iter().map(Vec::len).min().unwrap_or(0);
    if n_in == 0 || up == 0 || down == 0 {
        return Ok(vec![Vec::new(); lanes.len()]);
    }
    let g = gcd(up, down);
    let (up, down) = (up / g, down / g);
    if up == 1 && down == 1 {
        return Ok(lanes.iter().map(|l| l[..n_in].to_vec()).collect());
    }

    let ratio = up as f64 / down as f64;
    let n_out = (n_in as u64 * up).div_ceil(down) as usize;
    // Trailing silence flushes the filter so the delayed tail is still produced.
    let chunk = n_in + 2 * SINC_LEN + (SINC_LEN as f64 / ratio).ceil() as usize;
    let padded: Vec<Vec<f64>> = lanes
        .iter()
        .map(|l| {
            let mut lane = Vec::with_capacity(chunk);
            lane.extend_from_slice(&l[..n_in]);
            lane.resize(chunk, 0.0);
            lane
        })
        .collect();

    let mut resampler = SincFixedIn::<f64>::new(ratio, 1.0, sinc_params(), chunk, lanes.len())
        .map_err(|e| DspError::Resample(e.to_string()))?;
    let delay = resampler.output_delay();
    let out = resampler
        .process(&padded, None)
        .map_err(|e| DspError::Resample(e.to_string()))?;

    Ok(out
        .into_iter()
        .map(|lane| {
            let mut lane: Vec<f64> = lane.into_iter().skip(delay).take(n_out).collect();
            lane.resize(n_out, 0.0);
            lane
        })
        .collect())
}

/// Single-lane form of [`resample_lanes`].
pub fn resample_poly(input: &[f64], up: u64, down: u64) -> Result<Vec<f64>, DspError> {
    let mut lanes = resample_lanes(&[input.to_vec()], up, down)?;
    Ok(lanes.pop().unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limit_denominator_keeps_small_fractions() {
        assert_eq!(limit_denominator(0.5, 150), Some((1, 2)));
        assert_eq!(limit_denominator(1.25, 150), Some((5, 4)));
    }

    #[test]
    fn limit_denominator_approximates_pi() {
        assert_eq!(limit_denominator(std::f64::consts::PI, 100), Some((311, 99)));
        assert_eq!(limit_denominator(std::f64::consts::PI, 10), Some((22, 7)));
    }

    #[test]
    fn limit_denominator_rejects_non_positive() {
        assert_eq!(limit_denominator(0.0, 150), None);
        assert_eq!(limit_denominator(-1.0, 150), None);
        assert_eq!(limit_denominator(f64::NAN, 150), None);
    }

    #[test]
    fn output_length_is_ceil_of_ratio() {
        let x = vec![0.0; 1000];
        assert_eq!(resample_poly(&x, 3, 2).unwrap().len(), 1500);
        assert_eq!(resample_poly(&x, 10, 7).unwrap().len(), 1429);
        assert_eq!(resample_poly(&x, 7, 10).unwrap().len(), 700);
        assert_eq!(resample_poly(&x, 4, 4).unwrap(), x);
    }

    #[test]
    fn empty_input_stays_empty() {
        assert!(resample_poly(&[], 3, 2).unwrap().is_empty());
    }

    fn tone(freq: f64, rate: f64, len: usize) -> Vec<f64> {
        (0..len)
            .map(|n| 0.5 * (2.0 * std::f64::consts::PI * freq * n as f64 / rate).sin())
            .collect()
    }

    fn rms(x: &[f64]) -> f64 {
        (x.iter().map(|v| v * v).sum::<f64>() / x.len() as f64).sqrt()
    }

    #[test]
    fn low_tone_passes_and_stays_aligned() {
        // 200 Hz at 44.1 kHz, stretched by 5/4: the same tone read at 55.125 kHz.
        let x = tone(200.0, 44_100.0, 8000);
        let y = resample_poly(&x, 5, 4).unwrap();
        assert_eq!(y.len(), 10_000);

        let expected = tone(200.0, 55_125.0, 10_000);
        let mid = 1000..9000;
        let gain = rms(&y[mid.clone()]) / rms(&expected[mid.clone()]);
        assert!((gain - 1.0).abs() < 0.02, "passband gain {gain}");
        let err: Vec<f64> = y[mid.clone()]
            .iter()
            .zip(&expected[mid])
            .map(|(a, b)| a - b)
            .collect();
        assert!(rms(&err) < 0.1, "alignment error {}", rms(&err));
    }

    #[test]
    fn dc_is_preserved_away_from_edges() {
        let x = vec![0.5; 4000];
        let y = resample_poly(&x, 4, 5).unwrap();
        for v in &y[200..y.len() - 200] {
            assert!((v - 0.5).abs() < 1e-2, "{v}");
        }
    }
}
