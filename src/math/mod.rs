use half::f16;

pub mod quaternion;


/// Zeroth-order spherical harmonic basis constant.
pub const SH_C0: f32 = 0.282_094_8;
pub const SH_C0_F64: f64 = 0.28209479177387814;

/// DC scale used by spz color bytes, distinct from `SH_C0`.
pub const SH_C0_SPZ: f64 = 0.15;

pub const LOG_SCALE_SENTINEL: f32 = -10.0;
pub const LOGIT_EPSILON: f64 = 1e-6;

/// Higher-order coefficient count (all three channels) per sh degree.
pub const SH_REST_COUNTS: [usize; 4] = [0, 9, 24, 45];


pub fn sh_rest_count(degree: usize) -> Option<usize> {
    SH_REST_COUNTS.get(degree).copied()
}

pub fn sh_degree_for_rest_count(count: usize) -> Option<usize> {
    SH_REST_COUNTS.iter().position(|&c| c == count)
}

pub fn log_scale(linear: f32) -> f32 {
    if linear > 0.0 {
        linear.ln()
    } else {
        LOG_SCALE_SENTINEL
    }
}

pub fn logit(p: f32) -> f32 {
    let p = (p as f64).clamp(LOGIT_EPSILON, 1.0 - LOGIT_EPSILON);
    (p / (1.0 - p)).ln() as f32
}

pub fn sigmoid(logit: f32) -> f32 {
    1.0 / (1.0 + (-logit).exp())
}

pub fn half_to_f32(bits: u16) -> f32 {
    f16::from_bits(bits).to_f32()
}

/// Sign-extends a little-endian 24-bit integer and scales by `2^-fractional_bits`.
pub fn fixed24_to_f32(bytes: [u8; 3], fractional_bits: u8) -> f32 {
    let raw = u32::from_le_bytes([0, bytes[0], bytes[1], bytes[2]]);
    let value = (raw as i32) >> 8;

    (value as f64 * 2f64.powi(-(fractional_bits as i32))) as f32
}

/// Inverse of `sign(x) * ln(|x| + 1)`.
pub fn inv_log_transform(v: f32) -> f32 {
    let e = v.abs().exp() - 1.0;
    if v < 0.0 { -e } else { e }
}

pub fn dc_from_color_byte(byte: u8) -> f32 {
    ((byte as f64 / 255.0 - 0.5) / SH_C0_F64) as f32
}

pub fn dc_from_spz_color_byte(byte: u8) -> f32 {
    ((byte as f64 / 255.0 - 0.5) / SH_C0_SPZ) as f32
}

pub fn unit_to_byte(v: f32) -> u8 {
    (v * 255.0).clamp(0.0, 255.0).round() as u8
}

pub fn color_byte_from_dc(dc: f32) -> u8 {
    unit_to_byte(0.5 + SH_C0 * dc)
}

pub fn opacity_byte_from_logit(opacity: f32) -> u8 {
    unit_to_byte(sigmoid(opacity))
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_scale_round_trips_positive_values() {
        for v in [1e-6_f32, 0.01, 0.5, 1.0, 3.25, 1234.5] {
            let back = log_scale(v).exp();
            assert!((back - v).abs() <= v * f32::EPSILON * 8.0, "{v} -> {back}");
        }
    }

    #[test]
    fn log_scale_sentinel_for_non_positive() {
        assert_eq!(log_scale(0.0), LOG_SCALE_SENTINEL);
        assert_eq!(log_scale(-2.0), LOG_SCALE_SENTINEL);
    }

    #[test]
    fn sigmoid_inverts_logit() {
        let mut p = 0.0005_f32;
        while p < 1.0 {
            assert!((sigmoid(logit(p)) - p).abs() < 1e-5, "p = {p}");
            p += 0.0125;
        }
    }

    #[test]
    fn logit_clamps_saturated_input() {
        assert!(logit(1.0).is_finite());
        assert!(logit(0.0).is_finite());
        assert!((logit(1.0) - 13.815_51).abs() < 1e-3);
        assert!((logit(0.0) + 13.815_51).abs() < 1e-3);
    }

    #[test]
    fn half_decode_covers_special_values() {
        assert_eq!(half_to_f32(0x3c00), 1.0);
        assert_eq!(half_to_f32(0xc000), -2.0);
        assert_eq!(half_to_f32(0x0001), 2f32.powi(-24));
        assert_eq!(half_to_f32(0x7c00), f32::INFINITY);
        assert_eq!(half_to_f32(0xfc00), f32::NEG_INFINITY);
        assert!(half_to_f32(0x7e00).is_nan());
    }

    #[test]
    fn fixed24_sign_extends() {
        assert_eq!(fixed24_to_f32([0x00, 0x10, 0x00], 12), 1.0);
        assert_eq!(fixed24_to_f32([0x00, 0xf0, 0xff], 12), -1.0);
        assert_eq!(fixed24_to_f32([0xff, 0xff, 0x7f], 0), 8_388_607.0);
        assert_eq!(fixed24_to_f32([0x00, 0x00, 0x80], 0), -8_388_608.0);
    }

    #[test]
    fn inv_log_transform_is_odd() {
        assert_eq!(inv_log_transform(0.0), 0.0);
        let v = inv_log_transform(2.0_f32.ln());
        assert!((v - 1.0).abs() < 1e-6);
        assert!((inv_log_transform(-(2.0_f32.ln())) + 1.0).abs() < 1e-6);
    }

    #[test]
    fn color_bytes_survive_dc_round_trip() {
        for byte in 0..=255u8 {
            assert_eq!(color_byte_from_dc(dc_from_color_byte(byte)), byte);
        }
    }

    #[test]
    fn sh_counts() {
        assert_eq!(sh_rest_count(3), Some(45));
        assert_eq!(sh_rest_count(4), None);
        assert_eq!(sh_degree_for_rest_count(24), Some(2));
    }
}
