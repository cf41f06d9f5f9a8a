use std::{
    path::Path,
    sync::Arc,
};

use serde::{
    Deserialize,
    Serialize,
};
use tracing::debug;

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
        fetch::{
            Fetch,
            FsFetcher,
            Progress,
        },
        ksplat::KSplatCodec,
        ply::PlyCodec,
        splat::RawSplatCodec,
    },
    pool::{
        PoolConfig,
        Worker,
        WorkerPool,
    },
};


#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum OutputKind {
    #[default]
    Columns,
    SplatBuffer,
}


#[derive(Clone, Debug, PartialEq)]
pub enum DecodeOutput {
    Columns(ColumnTable),
    SplatBuffer(SplatBuffer),
}

impl DecodeOutput {
    pub fn len(&self) -> usize {
        match self {
            DecodeOutput::Columns(columns) => columns.len(),
            DecodeOutput::SplatBuffer(buffer) => buffer.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn kind(&self) -> OutputKind {
        match self {
            DecodeOutput::Columns(_) => OutputKind::Columns,
            DecodeOutput::SplatBuffer(_) => OutputKind::SplatBuffer,
        }
    }

    pub fn into_columns(self) -> ColumnTable {
        match self {
            DecodeOutput::Columns(columns) => columns,
            DecodeOutput::SplatBuffer(buffer) => buffer.to_columns(),
        }
    }

    pub fn into_splat_buffer(self) -> SplatBuffer {
        match self {
            DecodeOutput::Columns(columns) => columns.to_splat_buffer(),
            DecodeOutput::SplatBuffer(buffer) => buffer,
        }
    }
}


/// One codec per format, picked by declared or detected format.
#[derive(Debug, Default)]
pub struct Decoder {
    splat: RawSplatCodec,
    ply: PlyCodec,
    ksplat: KSplatCodec,

    #[cfg(feature = "io_spz")]
    spz: crate::io::spz::SpzCodec,

    #[cfg(feature = "io_sog")]
    sog: crate::io::sog::SogCodec,
}

impl Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(feature = "io_sog")]
    pub fn with_sog(mut self, sog: crate::io::sog::SogCodec) -> Self {
        self.sog = sog;
        self
    }

    pub fn codec(&self, format: SplatFormat) -> Result<&dyn SplatCodec, DecodeError> {
        match format {
            SplatFormat::Splat => Ok(&self.splat),
            SplatFormat::Ply => Ok(&self.ply),
            SplatFormat::KSplat => Ok(&self.ksplat),
            SplatFormat::Spz => {
                #[cfg(feature = "io_spz")]
                {
                    Ok(&self.spz)
                }

                #[cfg(not(feature = "io_spz"))]
                {
                    Err(DecodeError::UnsupportedFormat(format))
                }
            }
            SplatFormat::Sog => {
                #[cfg(feature = "io_sog")]
                {
                    Ok(&self.sog)
                }

                #[cfg(not(feature = "io_sog"))]
                {
                    Err(DecodeError::UnsupportedFormat(format))
                }
            }
        }
    }

    /// Whether `prepare` has setup work to do before the first decode.
    pub fn requires_prepare(&self) -> bool {
        cfg!(feature = "io_sog")
    }

    pub fn prepare(&self) -> Result<(), DecodeError> {
        #[cfg(feature = "io_sog")]
        self.sog.prepare()?;

        Ok(())
    }

    pub fn decode_columns(&self, format: SplatFormat, data: &[u8]) -> Result<ColumnTable, DecodeError> {
        self.codec(format)?.decode_to_columns(data)
    }

    pub fn decode_splat_buffer(&self, format: SplatFormat, data: &[u8]) -> Result<SplatBuffer, DecodeError> {
        self.codec(format)?.decode_to_splat_buffer(data)
    }

    pub fn decode_as(
        &self,
        format: SplatFormat,
        data: &[u8],
        output: OutputKind,
    ) -> Result<DecodeOutput, DecodeError> {
        let codec = self.codec(format)?;
        let decoded = match output {
            OutputKind::Columns => DecodeOutput::Columns(codec.decode_to_columns(data)?),
            OutputKind::SplatBuffer => DecodeOutput::SplatBuffer(codec.decode_to_splat_buffer(data)?),
        };

        debug!("decoded {} splats from {format:?}", decoded.len());
        Ok(decoded)
    }

    /// Detects the format from magic bytes and the extension hint.
    pub fn decode(
        &self,
        data: &[u8],
        extension_hint: Option<&str>,
        output: OutputKind,
    ) -> Result<DecodeOutput, DecodeError> {
        let format = detect(data, extension_hint)?;
        self.decode_as(format, data, output)
    }

    pub fn decode_file(
        &self,
        path: &Path,
        output: OutputKind,
        on_progress: Option<Progress<'_>>,
    ) -> Result<DecodeOutput, DecodeError> {
        let location = path.to_string_lossy();
        let data = FsFetcher::default().fetch(&location, on_progress)?;
        let extension = path.extension().and_then(|extension| extension.to_str());

        self.decode(&data, extension, output)
    }
}

pub fn detect(data: &[u8], extension_hint: Option<&str>) -> Result<SplatFormat, DecodeError> {
    SplatFormat::detect(data, extension_hint)
        .ok_or_else(|| DecodeError::format("unable to detect splat format"))
}


#[derive(Clone, Debug, PartialEq)]
pub struct DecodeTask {
    pub format: SplatFormat,
    pub output: OutputKind,
    pub bytes: Vec<u8>,
}

impl DecodeTask {
    pub fn new(format: SplatFormat, output: OutputKind, bytes: Vec<u8>) -> Self {
        Self {
            format,
            output,
            bytes,
        }
    }

    pub fn detect(
        bytes: Vec<u8>,
        extension_hint: Option<&str>,
        output: OutputKind,
    ) -> Result<Self, DecodeError> {
        Ok(Self::new(detect(&bytes, extension_hint)?, output, bytes))
    }
}


/// Runs decode tasks on a pool thread; its setup prepares the channel
/// decoder so image backed formats are ready before the first task.
#[derive(Clone, Debug)]
pub struct DecodeWorker {
    decoder: Arc<Decoder>,
}

impl DecodeWorker {
    pub fn new(decoder: Arc<Decoder>) -> Self {
        Self { decoder }
    }
}

impl Worker for DecodeWorker {
    type Task = DecodeTask;
    type Output = DecodeOutput;
    type Error = DecodeError;

    fn requires_init(&self) -> bool {
        self.decoder.requires_prepare()
    }

    fn init(&mut self) -> Result<(), DecodeError> {
        self.decoder.prepare()
    }

    fn run(&mut self, task: DecodeTask) -> Result<DecodeOutput, DecodeError> {
        self.decoder.decode_as(task.format, &task.bytes, task.output)
    }
}

pub type DecodePool = WorkerPool<DecodeWorker>;

pub fn decode_pool(config: PoolConfig, decoder: Arc<Decoder>) -> Result<DecodePool, std::io::Error> {
    WorkerPool::new(config, |_| DecodeWorker::new(decoder.clone()))
}
