use serde::{
    Deserialize,
    Serialize,
};

use crate::error::DecodeError;


pub const META_FILE: &str = "meta.json";
pub const SUPPORTED_VERSION: u32 = 2;

/// Higher-order coefficients per channel for `shN.bands`.
pub const SH_COEFFICIENTS_PER_BAND: [usize; 4] = [0, 3, 8, 15];


#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MeansMeta {
    pub mins: [f32; 3],
    pub maxs: [f32; 3],
    pub files: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CodebookMeta {
    pub codebook: Vec<f32>,
    pub files: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FilesMeta {
    pub files: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ShNMeta {
    /// Palette size; labels at or above it carry no coefficients.
    pub count: usize,
    pub bands: usize,
    pub codebook: Vec<f32>,
    /// Centroids, then labels.
    pub files: Vec<String>,
}

impl ShNMeta {
    pub fn coefficients(&self) -> Option<usize> {
        SH_COEFFICIENTS_PER_BAND.get(self.bands).copied()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SogMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u32>,
    pub count: usize,
    pub means: MeansMeta,
    pub scales: CodebookMeta,
    pub quats: FilesMeta,
    pub sh0: CodebookMeta,
    #[serde(default, rename = "shN", skip_serializing_if = "Option::is_none")]
    pub sh_n: Option<ShNMeta>,
}

impl SogMeta {
    pub fn parse(bytes: &[u8]) -> Result<Self, DecodeError> {
        let meta: SogMeta = serde_json::from_slice(bytes)
            .map_err(|err| DecodeError::format(format!("invalid sog {META_FILE}: {err}")))?;
        meta.validate()?;
        Ok(meta)
    }

    pub fn validate(&self) -> Result<(), DecodeError> {
        if let Some(version) = self.version {
            if version != SUPPORTED_VERSION {
                return Err(DecodeError::UnsupportedVersion {
                    container: "sog",
                    version: version.to_string(),
                });
            }
        }

        let expect_files = |section: &str, files: &[String], needed: usize| {
            if files.len() < needed {
                return Err(DecodeError::format(format!(
                    "sog {section} lists {} files, expected {needed}",
                    files.len(),
                )));
            }
            Ok(())
        };

        expect_files("means", &self.means.files, 2)?;
        expect_files("scales", &self.scales.files, 1)?;
        expect_files("quats", &self.quats.files, 1)?;
        expect_files("sh0", &self.sh0.files, 1)?;

        if let Some(sh_n) = &self.sh_n {
            expect_files("shN", &sh_n.files, 2)?;
            if sh_n.coefficients().is_none() {
                return Err(DecodeError::format(format!("invalid sog shN bands: {}", sh_n.bands)));
            }
        }

        Ok(())
    }

    /// Decoded range of one position axis; a flat axis spans 1.
    pub fn axis_range(&self, axis: usize) -> (f32, f32) {
        let min = self.means.mins[axis];
        let span = self.means.maxs[axis] - min;
        if span == 0.0 || span.is_nan() {
            (min, 1.0)
        } else {
            (min, span)
        }
    }
}
