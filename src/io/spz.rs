use std::io::Read;

use flate2::read::GzDecoder;
use tracing::debug;

use crate::{
    error::DecodeError,
    gaussian::{
        ColumnTable,
        SplatBuffer,
    },
    io::codec::{
        SplatCodec,
        SplatFormat,
    },
    math::{
        self,
        quaternion,
    },
};


pub const SPZ_MAGIC: u32 = 0x5053_474e;
pub const HEADER_SIZE: usize = 16;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];
const FLAG_ANTIALIASED: u8 = 0x1;


#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SpzHeader {
    pub version: u32,
    pub splat_count: usize,
    pub sh_degree: usize,
    pub fractional_bits: u8,
    pub antialiased: bool,
}

impl SpzHeader {
    pub fn parse(data: &[u8]) -> Result<Self, DecodeError> {
        if data.len() < HEADER_SIZE {
            return Err(DecodeError::truncated("spz header", HEADER_SIZE, data.len()));
        }

        let u32_at = |offset: usize| {
            u32::from_le_bytes([data[offset], data[offset + 1], data[offset + 2], data[offset + 3]])
        };

        if u32_at(0) != SPZ_MAGIC {
            return Err(DecodeError::format("invalid spz magic"));
        }

        let version = u32_at(4);
        if version != 2 && version != 3 {
            return Err(DecodeError::UnsupportedVersion {
                container: "spz",
                version: version.to_string(),
            });
        }

        let sh_degree = data[12] as usize;
        if sh_degree >= math::SH_REST_COUNTS.len() {
            return Err(DecodeError::format(format!("invalid spz sh degree: {sh_degree}")));
        }

        Ok(Self {
            version,
            splat_count: u32_at(8) as usize,
            sh_degree,
            fractional_bits: data[13],
            antialiased: data[14] & FLAG_ANTIALIASED != 0,
        })
    }

    pub fn rotation_bytes(&self) -> usize {
        if self.version == 3 { 4 } else { 3 }
    }

    pub fn sh_count(&self) -> usize {
        math::SH_REST_COUNTS[self.sh_degree]
    }

    /// Body size in bytes following the header.
    pub fn body_size(&self) -> Option<usize> {
        let per_splat = 9 + 1 + 3 + 3 + self.rotation_bytes() + self.sh_count();
        self.splat_count.checked_mul(per_splat)
    }
}


/// Inflates gzip input; anything else is returned as is.
pub fn decompress(data: &[u8]) -> Result<std::borrow::Cow<'_, [u8]>, DecodeError> {
    if !data.starts_with(&GZIP_MAGIC) {
        return Ok(std::borrow::Cow::Borrowed(data));
    }

    let mut inflated = Vec::with_capacity(data.len() * 4);
    GzDecoder::new(data)
        .read_to_end(&mut inflated)
        .map_err(|err| DecodeError::format(format!("invalid spz gzip stream: {err}")))?;

    Ok(std::borrow::Cow::Owned(inflated))
}


/// Section slices in file order.
struct Sections<'a> {
    positions: &'a [u8],
    alphas: &'a [u8],
    colors: &'a [u8],
    scales: &'a [u8],
    rotations: &'a [u8],
    sh: &'a [u8],
}

impl<'a> Sections<'a> {
    fn split(header: &SpzHeader, data: &'a [u8]) -> Result<Self, DecodeError> {
        let body_size = header
            .body_size()
            .ok_or_else(|| DecodeError::format("spz splat count overflows"))?;
        let needed = HEADER_SIZE + body_size;
        if data.len() < needed {
            return Err(DecodeError::truncated("spz", needed, data.len()));
        }

        let n = header.splat_count;
        let mut rest = &data[HEADER_SIZE..needed];
        let mut take = |size: usize| -> &'a [u8] {
            let current: &'a [u8] = rest;
            let (head, tail) = current.split_at(size);
            rest = tail;
            head
        };

        Ok(Self {
            positions: take(n * 9),
            alphas: take(n),
            colors: take(n * 3),
            scales: take(n * 3),
            rotations: take(n * header.rotation_bytes()),
            sh: take(n * header.sh_count()),
        })
    }
}


fn decode(data: &[u8], include_sh: bool) -> Result<ColumnTable, DecodeError> {
    let data = decompress(data)?;
    let header = SpzHeader::parse(&data)?;
    let sections = Sections::split(&header, &data)?;

    debug!(
        "spz v{}: {} splats, sh degree {}, {} fractional bits",
        header.version,
        header.splat_count,
        header.sh_degree,
        header.fractional_bits,
    );

    let sh_count = if include_sh { header.sh_count() } else { 0 };
    let per_channel = sh_count / 3;
    let mut columns = ColumnTable::with_sh_rest(header.splat_count, sh_count);

    for i in 0..header.splat_count {
        for axis in 0..3 {
            let p = i * 9 + axis * 3;
            let fixed = [sections.positions[p], sections.positions[p + 1], sections.positions[p + 2]];
            columns.position[axis][i] = math::fixed24_to_f32(fixed, header.fractional_bits);
            columns.scale[axis][i] = sections.scales[i * 3 + axis] as f32 / 16.0 - 10.0;
            columns.color[axis][i] = math::dc_from_spz_color_byte(sections.colors[i * 3 + axis]);
        }
        columns.opacity[i] = math::logit(sections.alphas[i] as f32 / 255.0);

        let rotation = match header.version {
            2 => {
                let r = &sections.rotations[i * 3..i * 3 + 3];
                let [x, y, z] = [r[0], r[1], r[2]].map(|b| b as f32 / 127.5 - 1.0);
                let w = quaternion::reconstruct_largest(x * x + y * y + z * z);
                [w, x, y, z]
            }
            _ => {
                let r = &sections.rotations[i * 4..i * 4 + 4];
                let [x, y, z, w] = quaternion::unpack_smallest_three(u32::from_le_bytes([r[0], r[1], r[2], r[3]]));
                [w, x, y, z]
            }
        };
        for (axis, value) in quaternion::normalize(rotation).into_iter().enumerate() {
            columns.rotation[axis][i] = value;
        }

        if sh_count == 0 {
            continue;
        }
        let coefficients = &sections.sh[i * sh_count..(i + 1) * sh_count];
        for (k, byte) in coefficients.iter().enumerate() {
            let column = (k % 3) * per_channel + k / 3;
            columns.sh_rest[column][i] = (*byte as f32 - 128.0) / 128.0;
        }
    }

    Ok(columns)
}


#[derive(Clone, Copy, Debug, Default)]
pub struct SpzCodec;

impl SpzCodec {
    pub fn header(&self, data: &[u8]) -> Result<SpzHeader, DecodeError> {
        SpzHeader::parse(&decompress(data)?)
    }
}

impl SplatCodec for SpzCodec {
    fn format(&self) -> SplatFormat {
        SplatFormat::Spz
    }

    fn decode_to_columns(&self, data: &[u8]) -> Result<ColumnTable, DecodeError> {
        decode(data, true)
    }

    fn decode_to_splat_buffer(&self, data: &[u8]) -> Result<SplatBuffer, DecodeError> {
        Ok(decode(data, false)?.to_splat_buffer())
    }
}
