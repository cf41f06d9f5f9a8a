use std::f32::consts::{FRAC_1_SQRT_2, SQRT_2};


pub type Quat = [f32; 4];

pub const IDENTITY: Quat = [0.0, 0.0, 0.0, 1.0];

/// Smallest-three tags live in `[TAG_BASE, TAG_BASE + 3]`.
pub const TAG_BASE: u8 = 252;

const COMPONENT_MASK: u32 = (1 << 9) - 1;


pub fn length_squared(q: &Quat) -> f32 {
    q.iter().map(|v| v * v).sum()
}

/// Renormalizes to unit length, falling back to `IDENTITY` for a zero (or non-finite) input.
pub fn normalize(q: Quat) -> Quat {
    let length = length_squared(&q).sqrt();
    if length > 0.0 && length.is_finite() {
        q.map(|v| v / length)
    } else {
        IDENTITY
    }
}

pub fn reconstruct_largest(sum_squares: f32) -> f32 {
    (1.0 - sum_squares).max(0.0).sqrt()
}

/// Maps a byte in `[0, 255]` to `[-1, 1]`.
pub fn byte_to_unit(byte: u8) -> f32 {
    byte as f32 / 255.0 * 2.0 - 1.0
}

pub fn unit_to_byte(v: f32) -> u8 {
    (v * 128.0 + 128.0).clamp(0.0, 255.0).round() as u8
}

/// Unpacks a 32-bit word: top two bits index the dropped (largest) component,
/// the remaining three are 10-bit fields (9-bit magnitude, sign bit), lowest
/// field belonging to the highest remaining component index.
pub fn unpack_smallest_three(word: u32) -> Quat {
    let largest = (word >> 30) as usize;
    let mut comp = word;
    let mut rotation = [0.0; 4];
    let mut sum_squares = 0.0;

    for i in (0..4).rev() {
        if i == largest {
            continue;
        }

        let magnitude = comp & COMPONENT_MASK;
        let negative = (comp >> 9) & 1 == 1;
        comp >>= 10;

        let mut v = FRAC_1_SQRT_2 * (magnitude as f32 / COMPONENT_MASK as f32);
        if negative {
            v = -v;
        }

        rotation[i] = v;
        sum_squares += v * v;
    }

    rotation[largest] = reconstruct_largest(sum_squares);
    rotation
}

pub fn pack_smallest_three(q: Quat) -> u32 {
    let q = normalize(q);

    let largest = (0..4)
        .max_by(|&a, &b| q[a].abs().total_cmp(&q[b].abs()))
        .unwrap_or(3);
    let sign = if q[largest] < 0.0 { -1.0 } else { 1.0 };

    let mut comp = 0u32;
    for (i, v) in q.iter().enumerate() {
        if i == largest {
            continue;
        }

        let v = v * sign;
        let magnitude = ((v.abs() * SQRT_2) * COMPONENT_MASK as f32 + 0.5)
            .min(COMPONENT_MASK as f32) as u32;
        let negative = (v < 0.0) as u32;

        comp = (comp << 10) | (negative << 9) | magnitude;
    }

    comp | ((largest as u32) << 30)
}

/// Unpacks three byte-quantized components and a tag byte selecting the
/// dropped axis. Returns `None` when the tag is outside `[252, 255]`.
pub fn unpack_tagged(a: u8, b: u8, c: u8, tag: u8) -> Option<Quat> {
    if tag < TAG_BASE {
        return None;
    }

    let largest = (tag - TAG_BASE) as usize;
    let stored = [a, b, c].map(|v| byte_to_unit(v) / SQRT_2);

    let mut rotation = [0.0; 4];
    let mut stored_iter = stored.iter();
    for (i, slot) in rotation.iter_mut().enumerate() {
        if i != largest {
            *slot = stored_iter.next().copied().unwrap_or_default();
        }
    }

    rotation[largest] = reconstruct_largest(length_squared(&rotation));
    Some(rotation)
}


#[cfg(test)]
mod tests {
    use super::*;

    fn assert_unit(q: &Quat) {
        assert!((length_squared(q) - 1.0).abs() < 1e-4, "{q:?}");
    }

    #[test]
    fn normalize_falls_back_to_identity() {
        assert_eq!(normalize([0.0; 4]), IDENTITY);
        assert_unit(&normalize([1.0, 2.0, -3.0, 0.5]));
    }

    #[test]
    fn smallest_three_recovers_rotation() {
        let q = normalize([0.2, -0.4, 0.1, 0.85]);
        let unpacked = unpack_smallest_three(pack_smallest_three(q));

        assert_unit(&unpacked);
        for (a, b) in q.iter().zip(unpacked.iter()) {
            assert!((a - b).abs() < 5e-3, "{q:?} vs {unpacked:?}");
        }
    }

    #[test]
    fn smallest_three_canonicalizes_sign() {
        let q = normalize([0.1, 0.2, -0.9, 0.3]);
        let unpacked = unpack_smallest_three(pack_smallest_three(q));

        assert!(unpacked[2] > 0.0);
        for (a, b) in q.iter().zip(unpacked.iter()) {
            assert!((a + b).abs() < 5e-3);
        }
    }

    #[test]
    fn tagged_unpack_places_largest() {
        let q = unpack_tagged(128, 128, 128, 252).unwrap();
        assert!(q[0] > 0.999);
        assert_unit(&q);

        let q = unpack_tagged(128, 128, 128, 255).unwrap();
        assert!(q[3] > 0.999);

        assert!(unpack_tagged(128, 128, 128, 251).is_none());
    }
}
