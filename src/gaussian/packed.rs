use std::marker::Copy;

use bytemuck::{
    Pod,
    Zeroable,
};
use serde::{
    Deserialize,
    Serialize,
};
use static_assertions::assert_eq_size;

use crate::{
    error::DecodeError,
    gaussian::{
        columns::ColumnTable,
        splat::Splat,
    },
    math::{
        self,
        quaternion,
    },
};


pub const ROW_LENGTH: usize = 32;

/// One row of the `.splat` wire layout.
///
/// | offset | field                           |
/// |--------|---------------------------------|
/// | 0      | position, 3 x f32               |
/// | 12     | linear scale, 3 x f32           |
/// | 24     | rgba, 4 x u8                    |
/// | 28     | rotation, 4 x u8 (`v*128+128`)  |
#[derive(
    Clone,
    Debug,
    Default,
    Copy,
    PartialEq,
    Pod,
    Zeroable,
    Serialize,
    Deserialize,
)]
#[repr(C)]
pub struct SplatRow {
    pub position: [f32; 3],
    pub scale: [f32; 3],
    pub color: [u8; 4],
    pub rotation: [u8; 4],
}

assert_eq_size!(SplatRow, [u8; ROW_LENGTH]);

impl SplatRow {
    pub fn from_splat(splat: &Splat) -> Self {
        let rotation = quaternion::normalize(splat.rotation);

        Self {
            position: splat.position,
            scale: splat.linear_scale(),
            color: [
                math::color_byte_from_dc(splat.color[0]),
                math::color_byte_from_dc(splat.color[1]),
                math::color_byte_from_dc(splat.color[2]),
                math::opacity_byte_from_logit(splat.opacity),
            ],
            rotation: rotation.map(quaternion::unit_to_byte),
        }
    }

    pub fn to_splat(&self) -> Splat {
        Splat {
            position: self.position,
            scale: self.scale.map(math::log_scale),
            rotation: quaternion::normalize(self.rotation.map(quaternion::byte_to_unit)),
            color: [
                math::dc_from_color_byte(self.color[0]),
                math::dc_from_color_byte(self.color[1]),
                math::dc_from_color_byte(self.color[2]),
            ],
            opacity: math::logit(self.color[3] as f32 / 255.0),
        }
    }

    pub fn read_le(bytes: &[u8; ROW_LENGTH]) -> Self {
        let f32_at = |offset: usize| {
            f32::from_le_bytes([
                bytes[offset],
                bytes[offset + 1],
                bytes[offset + 2],
                bytes[offset + 3],
            ])
        };

        Self {
            position: [f32_at(0), f32_at(4), f32_at(8)],
            scale: [f32_at(12), f32_at(16), f32_at(20)],
            color: [bytes[24], bytes[25], bytes[26], bytes[27]],
            rotation: [bytes[28], bytes[29], bytes[30], bytes[31]],
        }
    }

    pub fn write_le(&self, out: &mut Vec<u8>) {
        for v in self.position.iter().chain(self.scale.iter()) {
            out.extend_from_slice(&v.to_le_bytes());
        }
        out.extend_from_slice(&self.color);
        out.extend_from_slice(&self.rotation);
    }
}


#[derive(
    Clone,
    Debug,
    Default,
    PartialEq,
    Serialize,
    Deserialize,
)]
pub struct SplatBuffer {
    rows: Vec<SplatRow>,
}

impl SplatBuffer {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DecodeError> {
        if bytes.len() % ROW_LENGTH != 0 {
            return Err(DecodeError::format(format!(
                "splat data length {} is not a multiple of {ROW_LENGTH}",
                bytes.len(),
            )));
        }

        Ok(bytes
            .chunks_exact(ROW_LENGTH)
            .filter_map(|chunk| chunk.try_into().ok())
            .map(SplatRow::read_le)
            .collect())
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[SplatRow] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<SplatRow> {
        self.rows
    }

    /// Zero-copy view in host byte order; use `to_bytes` for the wire format.
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(self.rows.as_slice())
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.rows.len() * ROW_LENGTH);
        for row in &self.rows {
            row.write_le(&mut out);
        }
        out
    }

    pub fn to_columns(&self) -> ColumnTable {
        let mut columns = ColumnTable::new(self.rows.len());
        for (index, row) in self.rows.iter().enumerate() {
            columns.set_splat(index, &row.to_splat());
        }
        columns
    }
}

impl From<Vec<SplatRow>> for SplatBuffer {
    fn from(rows: Vec<SplatRow>) -> Self {
        Self { rows }
    }
}

impl FromIterator<SplatRow> for SplatBuffer {
    fn from_iter<I: IntoIterator<Item = SplatRow>>(iter: I) -> Self {
        Self {
            rows: iter.into_iter().collect(),
        }
    }
}
