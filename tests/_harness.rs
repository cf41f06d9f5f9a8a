#![allow(dead_code)]

use half::f16;

use splat_codecs::math::quaternion;


pub fn assert_close(a: f32, b: f32, tolerance: f32) {
    assert!((a - b).abs() <= tolerance, "{a} != {b} (tolerance {tolerance})");
}

pub fn assert_unit_rotations(columns: &splat_codecs::ColumnTable) {
    for i in 0..columns.len() {
        let q: [f32; 4] = std::array::from_fn(|axis| columns.rotation[axis][i]);
        assert!(
            (quaternion::length_squared(&q) - 1.0).abs() < 1e-4,
            "splat {i} rotation {q:?} is not unit length",
        );
    }
}

pub fn assert_column_lengths(columns: &splat_codecs::ColumnTable, expected: usize) {
    for (name, column) in columns.columns() {
        assert_eq!(column.len(), expected, "column {name}");
    }
}


pub fn raw_row(
    position: [f32; 3],
    scale: [f32; 3],
    rgba: [u8; 4],
    rotation: [u8; 4],
) -> Vec<u8> {
    let mut row = Vec::with_capacity(32);
    for v in position.iter().chain(scale.iter()) {
        row.extend_from_slice(&v.to_le_bytes());
    }
    row.extend_from_slice(&rgba);
    row.extend_from_slice(&rotation);
    row
}


/// Binary little-endian ply with a single `vertex` element.
pub fn ply_bytes(properties: &[(&str, &str)], rows: &[Vec<f64>]) -> Vec<u8> {
    let mut header = format!(
        "ply\nformat binary_little_endian 1.0\ncomment fixture\nelement vertex {}\n",
        rows.len(),
    );
    for (scalar_type, name) in properties {
        header.push_str(&format!("property {scalar_type} {name}\n"));
    }
    header.push_str("end_header\n");

    let mut out = header.into_bytes();
    for row in rows {
        assert_eq!(row.len(), properties.len());
        for ((scalar_type, _), value) in properties.iter().zip(row) {
            push_scalar(&mut out, scalar_type, *value);
        }
    }
    out
}

pub fn push_scalar(out: &mut Vec<u8>, scalar_type: &str, value: f64) {
    match scalar_type {
        "char" => out.extend_from_slice(&(value as i8).to_le_bytes()),
        "uchar" => out.push(value as u8),
        "short" => out.extend_from_slice(&(value as i16).to_le_bytes()),
        "ushort" => out.extend_from_slice(&(value as u16).to_le_bytes()),
        "int" => out.extend_from_slice(&(value as i32).to_le_bytes()),
        "uint" => out.extend_from_slice(&(value as u32).to_le_bytes()),
        "float" => out.extend_from_slice(&(value as f32).to_le_bytes()),
        "double" => out.extend_from_slice(&value.to_le_bytes()),
        other => panic!("unsupported fixture type {other}"),
    }
}


#[derive(Clone, Debug)]
pub struct KSplatRecord {
    /// Raw position, mode 0 only.
    pub position: [f32; 3],
    /// Quantized position, modes 1 and 2.
    pub quantized: [u16; 3],
    pub scale: [f32; 3],
    pub rotation: [f32; 4],
    pub rgba: [u8; 4],
    /// Stored coefficient order; byte values for mode 2.
    pub sh: Vec<f32>,
}

impl Default for KSplatRecord {
    fn default() -> Self {
        Self {
            position: [0.0; 3],
            quantized: [32767; 3],
            scale: [1.0; 3],
            rotation: [1.0, 0.0, 0.0, 0.0],
            rgba: [128, 128, 128, 255],
            sh: Vec::new(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct KSplatSection {
    pub sh_degree: u16,
    pub bucket_capacity: u32,
    pub block_size: f32,
    pub quantization_range: u32,
    pub centers: Vec<[f32; 3]>,
    pub full_buckets: u32,
    pub partial_sizes: Vec<u32>,
    /// Reserved but unused record slots.
    pub spare_capacity: usize,
    pub records: Vec<KSplatRecord>,
}

impl Default for KSplatSection {
    fn default() -> Self {
        Self {
            sh_degree: 0,
            bucket_capacity: 0,
            block_size: 2.0,
            quantization_range: 0,
            centers: Vec::new(),
            full_buckets: 0,
            partial_sizes: Vec::new(),
            spare_capacity: 0,
            records: Vec::new(),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct KSplatFixture {
    pub mode: u16,
    pub min_sh: f32,
    pub max_sh: f32,
    /// Overrides the summed section count when set.
    pub declared_count: Option<u32>,
    pub sections: Vec<KSplatSection>,
}

const SH_COUNTS: [usize; 4] = [0, 9, 24, 45];

impl KSplatFixture {
    fn record_size(&self, sh_degree: u16) -> usize {
        let sh = SH_COUNTS[sh_degree as usize];
        match self.mode {
            0 => 44 + sh * 4,
            1 => 24 + sh * 2,
            _ => 24 + sh,
        }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let total = self
            .declared_count
            .unwrap_or_else(|| self.sections.iter().map(|s| s.records.len() as u32).sum());

        let mut out = vec![0u8; 4096 + self.sections.len() * 1024];
        out[4..8].copy_from_slice(&(self.sections.len() as u32).to_le_bytes());
        out[16..20].copy_from_slice(&total.to_le_bytes());
        out[20..22].copy_from_slice(&self.mode.to_le_bytes());
        out[36..40].copy_from_slice(&self.min_sh.to_le_bytes());
        out[40..44].copy_from_slice(&self.max_sh.to_le_bytes());

        for (index, section) in self.sections.iter().enumerate() {
            let h = 4096 + index * 1024;
            let count = section.records.len() as u32;
            let max_count = count + section.spare_capacity as u32;

            out[h..h + 4].copy_from_slice(&count.to_le_bytes());
            out[h + 4..h + 8].copy_from_slice(&max_count.to_le_bytes());
            out[h + 8..h + 12].copy_from_slice(&section.bucket_capacity.to_le_bytes());
            out[h + 12..h + 16].copy_from_slice(&(section.centers.len() as u32).to_le_bytes());
            out[h + 16..h + 20].copy_from_slice(&section.block_size.to_le_bytes());
            out[h + 20..h + 22].copy_from_slice(&12u16.to_le_bytes());
            out[h + 24..h + 28].copy_from_slice(&section.quantization_range.to_le_bytes());
            out[h + 32..h + 36].copy_from_slice(&section.full_buckets.to_le_bytes());
            out[h + 36..h + 40].copy_from_slice(&(section.partial_sizes.len() as u32).to_le_bytes());
            out[h + 40..h + 42].copy_from_slice(&section.sh_degree.to_le_bytes());
        }

        for section in &self.sections {
            for size in &section.partial_sizes {
                out.extend_from_slice(&size.to_le_bytes());
            }
            for center in &section.centers {
                for v in center {
                    out.extend_from_slice(&v.to_le_bytes());
                }
            }

            let record_size = self.record_size(section.sh_degree);
            for record in &section.records {
                let start = out.len();
                self.push_record(&mut out, record);
                assert_eq!(out.len() - start, record_size, "record does not match sh degree");
            }
            out.extend(std::iter::repeat_n(0xAB, section.spare_capacity * record_size));
        }

        out
    }

    fn push_record(&self, out: &mut Vec<u8>, record: &KSplatRecord) {
        let push_half = |out: &mut Vec<u8>, v: f32| out.extend_from_slice(&f16::from_f32(v).to_le_bytes());

        if self.mode == 0 {
            for v in record.position.iter().chain(&record.scale).chain(&record.rotation) {
                out.extend_from_slice(&v.to_le_bytes());
            }
        } else {
            for q in record.quantized {
                out.extend_from_slice(&q.to_le_bytes());
            }
            for v in record.scale.iter().chain(&record.rotation) {
                push_half(out, *v);
            }
        }

        out.extend_from_slice(&record.rgba);

        for v in &record.sh {
            match self.mode {
                0 => out.extend_from_slice(&v.to_le_bytes()),
                1 => push_half(out, *v),
                _ => out.push(*v as u8),
            }
        }
    }
}


#[derive(Clone, Debug)]
pub struct SpzSplat {
    /// Raw 24-bit fixed point values.
    pub position: [i32; 3],
    pub alpha: u8,
    pub color: [u8; 3],
    pub scale: [u8; 3],
    /// Three bytes for version 2, four for version 3.
    pub rotation: Vec<u8>,
    pub sh: Vec<u8>,
}

pub fn spz_bytes(
    version: u32,
    sh_degree: u8,
    fractional_bits: u8,
    flags: u8,
    splats: &[SpzSplat],
) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&0x5053_474e_u32.to_le_bytes());
    out.extend_from_slice(&version.to_le_bytes());
    out.extend_from_slice(&(splats.len() as u32).to_le_bytes());
    out.extend_from_slice(&[sh_degree, fractional_bits, flags, 0]);

    for splat in splats {
        for v in splat.position {
            out.extend_from_slice(&v.to_le_bytes()[..3]);
        }
    }
    out.extend(splats.iter().map(|splat| splat.alpha));
    out.extend(splats.iter().flat_map(|splat| splat.color));
    out.extend(splats.iter().flat_map(|splat| splat.scale));
    out.extend(splats.iter().flat_map(|splat| splat.rotation.iter().copied()));
    out.extend(splats.iter().flat_map(|splat| splat.sh.iter().copied()));
    out
}

#[cfg(feature = "io_spz")]
pub fn gzip(bytes: &[u8]) -> Vec<u8> {
    use std::io::Write;

    let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(bytes).unwrap();
    encoder.finish().unwrap()
}


#[cfg(feature = "io_sog")]
pub mod sog {
    use std::{
        io::{
            Cursor,
            Write,
        },
        sync::atomic::{
            AtomicUsize,
            Ordering,
        },
    };

    use splat_codecs::{
        DecodeError,
        io::sog::{
            ChannelDecoder,
            ChannelImage,
        },
    };
    use zip::{
        CompressionMethod,
        ZipWriter,
        write::SimpleFileOptions,
    };

    const RAW_MAGIC: &[u8; 4] = b"RAW0";

    /// `RAW0`, width and height as u32, then rgba pixels.
    pub fn raw_channel(width: u32, height: u32, pixels: &[[u8; 4]]) -> Vec<u8> {
        assert_eq!(pixels.len(), (width * height) as usize);

        let mut out = RAW_MAGIC.to_vec();
        out.extend_from_slice(&width.to_le_bytes());
        out.extend_from_slice(&height.to_le_bytes());
        out.extend(pixels.iter().flatten());
        out
    }

    /// Channel of `pixels.len()` x 1.
    pub fn row_channel(pixels: &[[u8; 4]]) -> Vec<u8> {
        raw_channel(pixels.len() as u32, 1, pixels)
    }

    #[derive(Debug, Default)]
    pub struct RawChannelDecoder {
        pub prepared: AtomicUsize,
        pub decoded: AtomicUsize,
    }

    impl ChannelDecoder for RawChannelDecoder {
        fn prepare(&self) -> Result<(), DecodeError> {
            self.prepared.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn decode_channel(&self, bytes: &[u8]) -> Result<ChannelImage, DecodeError> {
            if bytes.len() < 12 || &bytes[..4] != RAW_MAGIC {
                return Err(DecodeError::Collaborator("not a raw channel".to_string()));
            }
            self.decoded.fetch_add(1, Ordering::SeqCst);

            let width = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]) as usize;
            let height = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]) as usize;
            Ok(ChannelImage {
                pixels: bytes[12..].to_vec(),
                width,
                height,
            })
        }
    }

    pub fn archive(files: &[(&str, Vec<u8>)]) -> Vec<u8> {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);

        for (name, bytes) in files {
            writer.start_file(*name, options).unwrap();
            writer.write_all(bytes).unwrap();
        }

        writer.finish().unwrap().into_inner()
    }
}
