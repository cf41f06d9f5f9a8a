use serde::{
    Deserialize,
    Serialize,
};

use crate::{
    error::DecodeError,
    gaussian::{
        packed::{
            SplatBuffer,
            SplatRow,
        },
        splat::Splat,
    },
    math,
};


pub const BASE_ATTRIBUTES: [&str; 14] = [
    "x",
    "y",
    "z",
    "scale_0",
    "scale_1",
    "scale_2",
    "rot_0",
    "rot_1",
    "rot_2",
    "rot_3",
    "f_dc_0",
    "f_dc_1",
    "f_dc_2",
    "opacity",
];

pub const SH_REST_PREFIX: &str = "f_rest_";


/// Struct-of-arrays splat table. Every buffer holds one element per splat;
/// `sh_rest` is laid out per channel, then per coefficient.
#[derive(
    Clone,
    Debug,
    Default,
    PartialEq,
    Serialize,
    Deserialize,
)]
pub struct ColumnTable {
    pub position: [Vec<f32>; 3],
    pub scale: [Vec<f32>; 3],
    pub rotation: [Vec<f32>; 4],
    pub color: [Vec<f32>; 3],
    pub opacity: Vec<f32>,
    pub sh_rest: Vec<Vec<f32>>,
}

impl ColumnTable {
    pub fn new(num_splats: usize) -> Self {
        Self::with_sh_rest(num_splats, 0)
    }

    pub fn with_sh_rest(num_splats: usize, sh_rest_count: usize) -> Self {
        let column = || vec![0.0; num_splats];

        Self {
            position: std::array::from_fn(|_| column()),
            scale: std::array::from_fn(|_| column()),
            rotation: std::array::from_fn(|_| column()),
            color: std::array::from_fn(|_| column()),
            opacity: column(),
            sh_rest: (0..sh_rest_count).map(|_| column()).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.opacity.len()
    }

    pub fn is_empty(&self) -> bool {
        self.opacity.is_empty()
    }

    pub fn sh_rest_count(&self) -> usize {
        self.sh_rest.len()
    }

    pub fn sh_degree(&self) -> Option<usize> {
        math::sh_degree_for_rest_count(self.sh_rest.len())
    }

    pub fn set_splat(&mut self, index: usize, splat: &Splat) {
        for axis in 0..3 {
            self.position[axis][index] = splat.position[axis];
            self.scale[axis][index] = splat.scale[axis];
            self.color[axis][index] = splat.color[axis];
        }
        for axis in 0..4 {
            self.rotation[axis][index] = splat.rotation[axis];
        }
        self.opacity[index] = splat.opacity;
    }

    pub fn splat(&self, index: usize) -> Splat {
        Splat {
            position: std::array::from_fn(|axis| self.position[axis][index]),
            scale: std::array::from_fn(|axis| self.scale[axis][index]),
            rotation: std::array::from_fn(|axis| self.rotation[axis][index]),
            color: std::array::from_fn(|axis| self.color[axis][index]),
            opacity: self.opacity[index],
        }
    }

    pub fn column(&self, name: &str) -> Option<&[f32]> {
        let column = match name {
            "x" => &self.position[0],
            "y" => &self.position[1],
            "z" => &self.position[2],
            "scale_0" => &self.scale[0],
            "scale_1" => &self.scale[1],
            "scale_2" => &self.scale[2],
            "rot_0" => &self.rotation[0],
            "rot_1" => &self.rotation[1],
            "rot_2" => &self.rotation[2],
            "rot_3" => &self.rotation[3],
            "f_dc_0" => &self.color[0],
            "f_dc_1" => &self.color[1],
            "f_dc_2" => &self.color[2],
            "opacity" => &self.opacity,
            _ => self.sh_rest.get(parse_sh_rest_index(name)?)?,
        };

        Some(column.as_slice())
    }

    pub fn column_mut(&mut self, name: &str) -> Option<&mut Vec<f32>> {
        let column = match name {
            "x" => &mut self.position[0],
            "y" => &mut self.position[1],
            "z" => &mut self.position[2],
            "scale_0" => &mut self.scale[0],
            "scale_1" => &mut self.scale[1],
            "scale_2" => &mut self.scale[2],
            "rot_0" => &mut self.rotation[0],
            "rot_1" => &mut self.rotation[1],
            "rot_2" => &mut self.rotation[2],
            "rot_3" => &mut self.rotation[3],
            "f_dc_0" => &mut self.color[0],
            "f_dc_1" => &mut self.color[1],
            "f_dc_2" => &mut self.color[2],
            "opacity" => &mut self.opacity,
            _ => self.sh_rest.get_mut(parse_sh_rest_index(name)?)?,
        };

        Some(column)
    }

    pub fn names(&self) -> Vec<String> {
        BASE_ATTRIBUTES
            .iter()
            .map(|name| name.to_string())
            .chain((0..self.sh_rest.len()).map(|k| format!("{SH_REST_PREFIX}{k}")))
            .collect()
    }

    pub fn columns(&self) -> impl Iterator<Item = (String, &[f32])> + '_ {
        self.names()
            .into_iter()
            .filter_map(move |name| {
                let column = self.column(&name)?;
                Some((name, column))
            })
    }

    pub fn validate(&self) -> Result<(), DecodeError> {
        let expected = self.len();

        for (name, column) in self.columns() {
            if column.len() != expected {
                return Err(DecodeError::format(format!(
                    "column `{name}` holds {} values, expected {expected}",
                    column.len(),
                )));
            }
        }

        Ok(())
    }

    pub fn to_splat_buffer(&self) -> SplatBuffer {
        (0..self.len())
            .map(|index| SplatRow::from_splat(&self.splat(index)))
            .collect()
    }
}


pub fn parse_sh_rest_index(name: &str) -> Option<usize> {
    name.strip_prefix(SH_REST_PREFIX)?.parse().ok()
}
