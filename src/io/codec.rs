use serde::{
    Deserialize,
    Serialize,
};

use crate::{
    error::DecodeError,
    gaussian::{
        ColumnTable,
        SplatBuffer,
    },
};


// TODO: support streamed codecs
pub trait SplatCodec: Send + Sync {
    fn format(&self) -> SplatFormat;

    fn decode_to_columns(&self, data: &[u8]) -> Result<ColumnTable, DecodeError>;

    fn decode_to_splat_buffer(&self, data: &[u8]) -> Result<SplatBuffer, DecodeError>;
}


#[derive(
    Clone,
    Copy,
    Debug,
    Eq,
    Hash,
    PartialEq,
    Serialize,
    Deserialize,
    clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum SplatFormat {
    Splat,
    Ply,
    #[value(name = "ksplat")]
    KSplat,
    Spz,
    Sog,
}

const PLY_MAGIC: &[u8] = b"ply\n";
const GZIP_MAGIC: &[u8] = &[0x1f, 0x8b];
const SPZ_MAGIC: &[u8] = b"NGSP";
const ZIP_MAGIC: &[u8] = b"PK\x03\x04";

impl SplatFormat {
    pub const ALL: [SplatFormat; 5] = [
        SplatFormat::Splat,
        SplatFormat::Ply,
        SplatFormat::KSplat,
        SplatFormat::Spz,
        SplatFormat::Sog,
    ];

    pub fn extension(&self) -> &'static str {
        match self {
            SplatFormat::Splat => "splat",
            SplatFormat::Ply => "ply",
            SplatFormat::KSplat => "ksplat",
            SplatFormat::Spz => "spz",
            SplatFormat::Sog => "sog",
        }
    }

    pub fn from_extension(extension: &str) -> Option<Self> {
        let extension = extension.trim_start_matches('.').to_ascii_lowercase();
        match extension.as_str() {
            "json" => Some(SplatFormat::Sog),
            _ => Self::ALL
                .into_iter()
                .find(|format| format.extension() == extension),
        }
    }

    /// Sniffs magic bytes first, then falls back to the extension hint, then
    /// to the raw row layout when the length fits it.
    pub fn detect(data: &[u8], extension_hint: Option<&str>) -> Option<Self> {
        if data.starts_with(PLY_MAGIC) {
            return Some(SplatFormat::Ply);
        }
        if data.starts_with(GZIP_MAGIC) || data.starts_with(SPZ_MAGIC) {
            return Some(SplatFormat::Spz);
        }
        if data.starts_with(ZIP_MAGIC) {
            return Some(SplatFormat::Sog);
        }

        if let Some(format) = extension_hint.and_then(Self::from_extension) {
            return Some(format);
        }

        if data.first() == Some(&b'{') {
            return Some(SplatFormat::Sog);
        }

        if !data.is_empty() && data.len() % crate::gaussian::packed::ROW_LENGTH == 0 {
            return Some(SplatFormat::Splat);
        }

        None
    }
}
