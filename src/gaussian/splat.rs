use serde::{
    Deserialize,
    Serialize,
};

use crate::math::{
    self,
    quaternion::{
        self,
        Quat,
    },
};


pub type Position = [f32; 3];

/// One splat in canonical (column) space: log scale, logit opacity, sh dc color.
#[derive(
    Clone,
    Copy,
    Debug,
    PartialEq,
    Serialize,
    Deserialize,
)]
pub struct Splat {
    pub position: Position,
    pub scale: [f32; 3],
    pub rotation: Quat,
    pub color: [f32; 3],
    pub opacity: f32,
}

impl Default for Splat {
    fn default() -> Self {
        Self {
            position: [0.0; 3],
            scale: [0.0; 3],
            rotation: quaternion::IDENTITY,
            color: [0.0; 3],
            opacity: 0.0,
        }
    }
}

impl Splat {
    pub fn linear_scale(&self) -> [f32; 3] {
        self.scale.map(f32::exp)
    }

    pub fn alpha(&self) -> f32 {
        math::sigmoid(self.opacity)
    }

    pub fn rgb(&self) -> [f32; 3] {
        self.color.map(|dc| 0.5 + math::SH_C0 * dc)
    }
}
