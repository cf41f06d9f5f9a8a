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


pub const MAIN_HEADER_SIZE: usize = 4096;
pub const SECTION_HEADER_SIZE: usize = 1024;

const DEFAULT_MIN_SH: f32 = -1.5;
const DEFAULT_MAX_SH: f32 = 1.5;


#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompressionMode {
    Full,
    Half,
    Byte,
}

/// Per-splat record layout of a compression mode.
struct RecordLayout {
    scale_start: usize,
    rotation_start: usize,
    color_start: usize,
    sh_start: usize,
    sh_bytes: usize,
    /// Stride between scale and rotation components.
    component_bytes: usize,
    default_quantization_range: u32,
}

impl CompressionMode {
    pub fn from_u16(mode: u16) -> Option<Self> {
        match mode {
            0 => Some(CompressionMode::Full),
            1 => Some(CompressionMode::Half),
            2 => Some(CompressionMode::Byte),
            _ => None,
        }
    }

    fn layout(&self) -> RecordLayout {
        match self {
            CompressionMode::Full => RecordLayout {
                scale_start: 12,
                rotation_start: 24,
                color_start: 40,
                sh_start: 44,
                sh_bytes: 4,
                component_bytes: 4,
                default_quantization_range: 1,
            },
            CompressionMode::Half | CompressionMode::Byte => RecordLayout {
                scale_start: 6,
                rotation_start: 12,
                color_start: 20,
                sh_start: 24,
                sh_bytes: if *self == CompressionMode::Half { 2 } else { 1 },
                component_bytes: 2,
                default_quantization_range: 32767,
            },
        }
    }

    /// Bytes per splat record with `sh_count` stored coefficients.
    pub fn bytes_per_splat(&self, sh_count: usize) -> usize {
        let layout = self.layout();
        layout.sh_start + sh_count * layout.sh_bytes
    }
}


#[derive(Clone, Debug, PartialEq)]
pub struct KSplatHeader {
    pub section_count: usize,
    pub splat_count: usize,
    pub compression: CompressionMode,
    pub min_sh: f32,
    pub max_sh: f32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SectionHeader {
    pub splat_count: usize,
    pub max_splat_count: usize,
    pub bucket_capacity: usize,
    pub bucket_count: usize,
    pub block_size: f32,
    pub bucket_storage_size: usize,
    pub quantization_range: u32,
    pub full_buckets: usize,
    pub partial_buckets: usize,
    pub sh_degree: usize,
}

impl SectionHeader {
    fn sh_count(&self) -> usize {
        math::SH_REST_COUNTS[self.sh_degree]
    }

    fn partial_table_size(&self) -> usize {
        self.partial_buckets * 4
    }

    /// Bucket centers plus the partial bucket size table.
    fn bucket_storage(&self) -> usize {
        self.bucket_storage_size * self.bucket_count + self.partial_table_size()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct SectionEntry {
    pub header: SectionHeader,
    /// Absolute offset of the section storage (partial sizes, then centers, then records).
    pub offset: usize,
    /// Index of the section's first splat in the output.
    pub first_splat: usize,
}

/// Result of the header pass: everything needed to size the output and
/// decode any section by offset.
#[derive(Clone, Debug, PartialEq)]
pub struct KSplatIndex {
    pub header: KSplatHeader,
    pub sections: Vec<SectionEntry>,
    pub max_sh_degree: usize,
}


fn u16_at(data: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([data[offset], data[offset + 1]])
}

fn u32_at(data: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([data[offset], data[offset + 1], data[offset + 2], data[offset + 3]])
}

fn f32_at(data: &[u8], offset: usize) -> f32 {
    f32::from_le_bytes([data[offset], data[offset + 1], data[offset + 2], data[offset + 3]])
}

fn or_default_sh(value: f32, default: f32) -> f32 {
    if value == 0.0 || value.is_nan() {
        default
    } else {
        value
    }
}


pub fn parse_header(data: &[u8]) -> Result<KSplatHeader, DecodeError> {
    if data.len() < MAIN_HEADER_SIZE {
        return Err(DecodeError::truncated("ksplat header", MAIN_HEADER_SIZE, data.len()));
    }

    let section_count = u32_at(data, 4) as usize;
    let splat_count = u32_at(data, 16) as usize;
    let mode = u16_at(data, 20);

    if splat_count == 0 {
        return Err(DecodeError::format("empty ksplat file"));
    }
    let compression = CompressionMode::from_u16(mode)
        .ok_or_else(|| DecodeError::format(format!("invalid ksplat compression mode: {mode}")))?;

    Ok(KSplatHeader {
        section_count,
        splat_count,
        compression,
        min_sh: or_default_sh(f32_at(data, 36), DEFAULT_MIN_SH),
        max_sh: or_default_sh(f32_at(data, 40), DEFAULT_MAX_SH),
    })
}

fn parse_section_header(
    data: &[u8],
    compression: CompressionMode,
) -> Result<SectionHeader, DecodeError> {
    let sh_degree = u16_at(data, 40) as usize;
    if sh_degree >= math::SH_REST_COUNTS.len() {
        return Err(DecodeError::format(format!("invalid ksplat sh degree: {sh_degree}")));
    }

    let quantization_range = match u32_at(data, 24) {
        0 => compression.layout().default_quantization_range,
        range => range,
    };

    Ok(SectionHeader {
        splat_count: u32_at(data, 0) as usize,
        max_splat_count: u32_at(data, 4) as usize,
        bucket_capacity: u32_at(data, 8) as usize,
        bucket_count: u32_at(data, 12) as usize,
        block_size: f32_at(data, 16),
        bucket_storage_size: u16_at(data, 20) as usize,
        quantization_range,
        full_buckets: u32_at(data, 32) as usize,
        partial_buckets: u32_at(data, 36) as usize,
        sh_degree,
    })
}

/// Header pass over the main header and every section header.
pub fn index(data: &[u8]) -> Result<KSplatIndex, DecodeError> {
    let header = parse_header(data)?;
    let compression = header.compression;

    let headers_end = header
        .section_count
        .checked_mul(SECTION_HEADER_SIZE)
        .and_then(|size| size.checked_add(MAIN_HEADER_SIZE))
        .ok_or_else(|| DecodeError::format("ksplat section count overflows"))?;
    if data.len() < headers_end {
        return Err(DecodeError::truncated("ksplat section headers", headers_end, data.len()));
    }

    let mut sections = Vec::with_capacity(header.section_count);
    let mut max_sh_degree = 0;
    let mut offset = headers_end;
    let mut first_splat = 0;

    for section in 0..header.section_count {
        let start = MAIN_HEADER_SIZE + section * SECTION_HEADER_SIZE;
        let section_header = parse_section_header(&data[start..start + SECTION_HEADER_SIZE], compression)?;

        let record_size = compression.bytes_per_splat(section_header.sh_count());
        let storage = section_header.bucket_storage();
        let reserved = section_header
            .max_splat_count
            .max(section_header.splat_count)
            .checked_mul(record_size)
            .and_then(|size| size.checked_add(storage))
            .ok_or_else(|| DecodeError::format("ksplat section size overflows"))?;
        let next = offset
            .checked_add(reserved)
            .ok_or_else(|| DecodeError::format("ksplat section size overflows"))?;

        if section_header.splat_count > 0 {
            let needed = offset + storage + section_header.splat_count * record_size;
            if data.len() < needed {
                return Err(DecodeError::truncated("ksplat section", needed, data.len()));
            }

            max_sh_degree = max_sh_degree.max(section_header.sh_degree);

            let count = section_header.splat_count;
            sections.push(SectionEntry {
                header: section_header,
                offset,
                first_splat,
            });
            first_splat += count;
        }

        offset = next;
    }

    if first_splat != header.splat_count {
        return Err(DecodeError::format(format!(
            "ksplat sections hold {first_splat} splats, header declares {}",
            header.splat_count,
        )));
    }

    debug!(
        "ksplat: {} splats in {} sections, mode {:?}, sh degree {}",
        header.splat_count,
        sections.len(),
        compression,
        max_sh_degree,
    );

    Ok(KSplatIndex {
        header,
        sections,
        max_sh_degree,
    })
}


/// Tracks which bucket a splat falls in: direct division inside the full
/// buckets, then a running cursor over the partial bucket sizes.
struct BucketCursor<'a> {
    capacity: usize,
    full_buckets: usize,
    full_splats: usize,
    partial_sizes: &'a [u8],
    current: usize,
    base: usize,
}

impl<'a> BucketCursor<'a> {
    fn new(header: &SectionHeader, partial_sizes: &'a [u8]) -> Self {
        Self {
            capacity: header.bucket_capacity,
            full_buckets: header.full_buckets,
            full_splats: header.full_buckets * header.bucket_capacity,
            partial_sizes,
            current: header.full_buckets,
            base: header.full_buckets * header.bucket_capacity,
        }
    }

    fn partial_size(&self, bucket: usize) -> Option<usize> {
        let slot = (bucket - self.full_buckets) * 4;
        if slot + 4 > self.partial_sizes.len() {
            return None;
        }
        Some(u32_at(self.partial_sizes, slot) as usize)
    }

    fn bucket(&mut self, splat: usize) -> Result<usize, DecodeError> {
        if splat < self.full_splats {
            return Ok(splat / self.capacity);
        }

        loop {
            let size = self
                .partial_size(self.current)
                .ok_or_else(|| DecodeError::format(format!("ksplat splat {splat} lies outside every bucket")))?;
            if splat < self.base + size {
                return Ok(self.current);
            }
            self.base += size;
            self.current += 1;
        }
    }
}


/// Where `sh_rest` column a stored coefficient lands, given the number of
/// coefficients per channel in the output.
fn sh_column(k: usize, per_channel: usize) -> usize {
    let (channel, coefficient) = if k < 9 {
        (k / 3, k % 3)
    } else if k < 24 {
        ((k - 9) / 5, (k - 9) % 5 + 3)
    } else {
        ((k - 24) / 7, (k - 24) % 7 + 8)
    };

    channel * per_channel + coefficient
}


fn decode_section(
    data: &[u8],
    index: &KSplatIndex,
    section: &SectionEntry,
    columns: &mut ColumnTable,
    include_sh: bool,
) -> Result<(), DecodeError> {
    let header = &section.header;
    let compression = index.header.compression;
    let layout = compression.layout();

    let sh_count = header.sh_count();
    let record_size = compression.bytes_per_splat(sh_count);

    let partial_start = section.offset;
    let centers_start = partial_start + header.partial_table_size();
    let records_start = section.offset + header.bucket_storage();

    let partial_sizes = &data[partial_start..centers_start];
    let centers = &data[centers_start..records_start];
    let records = &data[records_start..records_start + header.splat_count * record_size];

    let position_scale = header.block_size as f64 / 2.0 / header.quantization_range as f64;
    let range = header.quantization_range as f64;
    let mut buckets = BucketCursor::new(header, partial_sizes);

    let per_channel = columns.sh_rest_count() / 3;
    let (min_sh, max_sh) = (index.header.min_sh, index.header.max_sh);

    let component = |record: &[u8], offset: usize| match compression {
        CompressionMode::Full => f32_at(record, offset),
        CompressionMode::Half | CompressionMode::Byte => math::half_to_f32(u16_at(record, offset)),
    };

    for (i, record) in records.chunks_exact(record_size).enumerate() {
        let row = section.first_splat + i;

        let position: [f32; 3] = match compression {
            CompressionMode::Full => std::array::from_fn(|axis| f32_at(record, axis * 4)),
            CompressionMode::Half | CompressionMode::Byte => {
                // full precision records carry absolute positions and may have no bucket tables
                let bucket = buckets.bucket(i)?;
                let center = bucket * 3 * 4;
                if center + 12 > centers.len() {
                    return Err(DecodeError::format(format!(
                        "ksplat bucket {bucket} outside {} bucket centers",
                        header.bucket_count,
                    )));
                }

                std::array::from_fn(|axis| {
                    let quantized = u16_at(record, axis * 2) as f64;
                    ((quantized - range) * position_scale + f32_at(centers, center + axis * 4) as f64) as f32
                })
            }
        };

        let stride = layout.component_bytes;
        let rotation = quaternion::normalize(std::array::from_fn(|axis| {
            component(record, layout.rotation_start + axis * stride)
        }));

        for axis in 0..3 {
            columns.position[axis][row] = position[axis];
            columns.scale[axis][row] = math::log_scale(component(record, layout.scale_start + axis * stride));
            columns.color[axis][row] = math::dc_from_color_byte(record[layout.color_start + axis]);
        }
        for (axis, value) in rotation.into_iter().enumerate() {
            columns.rotation[axis][row] = value;
        }
        columns.opacity[row] = math::logit(record[layout.color_start + 3] as f32 / 255.0);

        if !include_sh {
            continue;
        }

        for k in 0..sh_count {
            let offset = layout.sh_start + k * layout.sh_bytes;
            let value = match compression {
                CompressionMode::Full => f32_at(record, offset),
                CompressionMode::Half => math::half_to_f32(u16_at(record, offset)),
                CompressionMode::Byte => {
                    let t = record[offset] as f32 / 255.0;
                    min_sh + t * (max_sh - min_sh)
                }
            };
            columns.sh_rest[sh_column(k, per_channel)][row] = value;
        }
    }

    Ok(())
}

fn decode(data: &[u8], include_sh: bool) -> Result<ColumnTable, DecodeError> {
    let index = index(data)?;

    let sh_rest_count = if include_sh {
        math::SH_REST_COUNTS[index.max_sh_degree]
    } else {
        0
    };
    let mut columns = ColumnTable::with_sh_rest(index.header.splat_count, sh_rest_count);

    for section in &index.sections {
        decode_section(data, &index, section, &mut columns, include_sh)?;
    }

    Ok(columns)
}


#[derive(Clone, Copy, Debug, Default)]
pub struct KSplatCodec;

impl SplatCodec for KSplatCodec {
    fn format(&self) -> SplatFormat {
        SplatFormat::KSplat
    }

    fn decode_to_columns(&self, data: &[u8]) -> Result<ColumnTable, DecodeError> {
        decode(data, true)
    }

    fn decode_to_splat_buffer(&self, data: &[u8]) -> Result<SplatBuffer, DecodeError> {
        Ok(decode(data, false)?.to_splat_buffer())
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sh_columns_are_channel_major() {
        let per_channel = 15;
        let columns = (0..45)
            .map(|k| sh_column(k, per_channel))
            .collect::<std::collections::HashSet<_>>();

        assert_eq!(columns.len(), 45);
        assert_eq!(sh_column(0, per_channel), 0);
        assert_eq!(sh_column(3, per_channel), 15);
        assert_eq!(sh_column(9, per_channel), 3);
        assert_eq!(sh_column(24, per_channel), 8);
        assert_eq!(sh_column(44, per_channel), 44);
    }

    #[test]
    fn record_sizes_follow_mode() {
        assert_eq!(CompressionMode::Full.bytes_per_splat(0), 44);
        assert_eq!(CompressionMode::Half.bytes_per_splat(9), 24 + 18);
        assert_eq!(CompressionMode::Byte.bytes_per_splat(45), 24 + 45);
    }

    #[test]
    fn partial_buckets_advance_cursor() {
        let header = SectionHeader {
            splat_count: 7,
            max_splat_count: 7,
            bucket_capacity: 2,
            bucket_count: 4,
            block_size: 1.0,
            bucket_storage_size: 12,
            quantization_range: 1,
            full_buckets: 2,
            partial_buckets: 2,
            sh_degree: 0,
        };
        let sizes = [1u32, 2u32]
            .iter()
            .flat_map(|size| size.to_le_bytes())
            .collect::<Vec<_>>();
        let mut cursor = BucketCursor::new(&header, &sizes);

        let buckets = (0..7)
            .map(|splat| cursor.bucket(splat).unwrap())
            .collect::<Vec<_>>();
        assert_eq!(buckets, vec![0, 0, 1, 1, 2, 3, 3]);
    }
}
