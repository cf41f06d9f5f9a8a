use std::{
    io::{
        Cursor,
        Read,
    },
    sync::Arc,
};

use tracing::{
    debug,
    warn,
};
use zip::ZipArchive;

use crate::{
    error::DecodeError,
    gaussian::{
        ColumnTable,
        SplatBuffer,
    },
    io::{
        codec::{
            SplatCodec,
            SplatFormat,
        },
        fetch::Fetch,
    },
    math::{
        self,
        quaternion,
    },
};

pub mod channel;
pub mod meta;

pub use channel::{
    ChannelDecoder,
    ChannelImage,
    ImageChannelDecoder,
};
pub use meta::SogMeta;


const ZIP_MAGIC: &[u8] = b"PK\x03\x04";
const CENTROIDS_PER_ROW: usize = 64;


/// Where channel files come from: the archive itself, or a fetcher
/// resolving the names listed in a bare `meta.json`.
enum Source<'a> {
    Archive(ZipArchive<Cursor<&'a [u8]>>),
    Fetched(&'a dyn Fetch),
}

impl Source<'_> {
    fn read(&mut self, name: &str) -> Result<Vec<u8>, DecodeError> {
        match self {
            Source::Archive(archive) => {
                let mut file = archive
                    .by_name(name)
                    .map_err(|err| DecodeError::format(format!("sog archive entry {name}: {err}")))?;
                let mut buffer = Vec::with_capacity(file.size() as usize);
                file.read_to_end(&mut buffer)?;
                Ok(buffer)
            }
            Source::Fetched(fetcher) => fetcher.fetch(name, None),
        }
    }
}


/// Codebook compressed scenes: `meta.json` plus webp channel rasters.
#[derive(Clone)]
pub struct SogCodec {
    pub include_sh: bool,
    decoder: Arc<dyn ChannelDecoder>,
    fetcher: Option<Arc<dyn Fetch>>,
}

impl Default for SogCodec {
    fn default() -> Self {
        Self::new(Arc::new(ImageChannelDecoder))
    }
}

impl std::fmt::Debug for SogCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SogCodec")
            .field("include_sh", &self.include_sh)
            .field("fetcher", &self.fetcher.is_some())
            .finish()
    }
}

impl SogCodec {
    pub fn new(decoder: Arc<dyn ChannelDecoder>) -> Self {
        Self {
            include_sh: true,
            decoder,
            fetcher: None,
        }
    }

    pub fn with_fetcher(mut self, fetcher: Arc<dyn Fetch>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn with_include_sh(mut self, include_sh: bool) -> Self {
        self.include_sh = include_sh;
        self
    }

    /// One-time setup of the channel decoder.
    pub fn prepare(&self) -> Result<(), DecodeError> {
        self.decoder.prepare()
    }

    fn open<'a>(&'a self, data: &'a [u8]) -> Result<(SogMeta, Source<'a>), DecodeError> {
        if data.starts_with(ZIP_MAGIC) {
            let mut archive = ZipArchive::new(Cursor::new(data))
                .map_err(|err| DecodeError::format(format!("invalid sog archive: {err}")))?;

            let mut meta_bytes = Vec::new();
            archive
                .by_name(meta::META_FILE)
                .map_err(|err| DecodeError::format(format!("sog archive has no {}: {err}", meta::META_FILE)))?
                .read_to_end(&mut meta_bytes)?;

            return Ok((SogMeta::parse(&meta_bytes)?, Source::Archive(archive)));
        }

        let meta = SogMeta::parse(data)?;
        let fetcher = self.fetcher.as_deref().ok_or_else(|| {
            DecodeError::Collaborator("a bare sog meta.json needs a fetcher for its channel files".to_string())
        })?;

        Ok((meta, Source::Fetched(fetcher)))
    }

    fn channel(
        &self,
        source: &mut Source,
        name: &str,
        count: usize,
    ) -> Result<ChannelImage, DecodeError> {
        let image = self.decoder.decode_channel(&source.read(name)?)?;
        if image.pixel_count() < count {
            return Err(DecodeError::format(format!(
                "sog channel {name} holds {} pixels, expected at least {count}",
                image.pixel_count(),
            )));
        }
        Ok(image)
    }

    fn decode(&self, data: &[u8], include_sh: bool) -> Result<ColumnTable, DecodeError> {
        let (meta, mut source) = self.open(data)?;
        let count = meta.count;

        debug!(
            "sog: {count} splats, sh bands {:?}",
            meta.sh_n.as_ref().map(|sh_n| sh_n.bands),
        );

        let means_lo = self.channel(&mut source, &meta.means.files[0], count)?;
        let means_hi = self.channel(&mut source, &meta.means.files[1], count)?;
        let quats = self.channel(&mut source, &meta.quats.files[0], count)?;
        let scales = self.channel(&mut source, &meta.scales.files[0], count)?;
        let colors = self.channel(&mut source, &meta.sh0.files[0], count)?;

        let codebook_entry = |codebook: &[f32], index: u8, section: &str| {
            codebook.get(index as usize).copied().ok_or_else(|| {
                DecodeError::format(format!(
                    "sog {section} index {index} outside codebook of {}",
                    codebook.len(),
                ))
            })
        };

        let sh_coefficients = match (&meta.sh_n, include_sh) {
            (Some(sh_n), true) => sh_n.coefficients().unwrap_or_default(),
            _ => 0,
        };
        let mut columns = ColumnTable::with_sh_rest(count, sh_coefficients * 3);
        let ranges: [(f32, f32); 3] = std::array::from_fn(|axis| meta.axis_range(axis));

        for i in 0..count {
            let lo = texel(&means_lo, i)?;
            let hi = texel(&means_hi, i)?;
            let scale = texel(&scales, i)?;
            let color = texel(&colors, i)?;
            let quat = texel(&quats, i)?;

            for axis in 0..3 {
                let (min, span) = ranges[axis];
                let quantized = (lo[axis] as u16 | (hi[axis] as u16) << 8) as f32;
                columns.position[axis][i] = math::inv_log_transform(min + span * quantized / 65535.0);
                columns.scale[axis][i] = codebook_entry(&meta.scales.codebook, scale[axis], "scales")?;
                columns.color[axis][i] = codebook_entry(&meta.sh0.codebook, color[axis], "sh0")?;
            }
            columns.opacity[i] = math::logit(color[3] as f32 / 255.0);

            let rotation = quaternion::unpack_tagged(quat[0], quat[1], quat[2], quat[3])
                .map(quaternion::normalize)
                .unwrap_or(quaternion::IDENTITY);
            for (axis, value) in rotation.into_iter().enumerate() {
                columns.rotation[axis][i] = value;
            }
        }

        if let (Some(sh_n), true) = (&meta.sh_n, sh_coefficients > 0) {
            let centroids = self.decoder.decode_channel(&source.read(&sh_n.files[0])?)?;
            let labels = self.channel(&mut source, &sh_n.files[1], count)?;
            let palette = |index: u8| sh_n.codebook.get(index as usize).copied().unwrap_or_default();

            let mut skipped = 0;
            for i in 0..count {
                let [r, g, _, _] = texel(&labels, i)?;
                let label = r as usize | (g as usize) << 8;
                if label >= sh_n.count {
                    skipped += 1;
                    continue;
                }

                for j in 0..sh_coefficients {
                    let x = (label % CENTROIDS_PER_ROW) * sh_coefficients + j;
                    let y = label / CENTROIDS_PER_ROW;
                    let Some(pixel) = centroids.at(x, y) else {
                        continue;
                    };

                    for channel in 0..3 {
                        columns.sh_rest[j + sh_coefficients * channel][i] = palette(pixel[channel]);
                    }
                }
            }

            if skipped > 0 {
                warn!("sog: {skipped} splats reference sh labels outside the palette of {}", sh_n.count);
            }
        }

        Ok(columns)
    }
}

fn texel(image: &ChannelImage, index: usize) -> Result<[u8; 4], DecodeError> {
    image.rgba(index).ok_or_else(|| {
        DecodeError::format(format!("sog pixel {index} outside a raster of {}", image.pixel_count()))
    })
}


impl SplatCodec for SogCodec {
    fn format(&self) -> SplatFormat {
        SplatFormat::Sog
    }

    fn decode_to_columns(&self, data: &[u8]) -> Result<ColumnTable, DecodeError> {
        self.decode(data, self.include_sh)
    }

    fn decode_to_splat_buffer(&self, data: &[u8]) -> Result<SplatBuffer, DecodeError> {
        Ok(self.decode(data, false)?.to_splat_buffer())
    }
}
