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
};


/// The raw 32-byte row `.splat` container.
#[derive(Clone, Copy, Debug, Default)]
pub struct RawSplatCodec;

impl SplatCodec for RawSplatCodec {
    fn format(&self) -> SplatFormat {
        SplatFormat::Splat
    }

    fn decode_to_columns(&self, data: &[u8]) -> Result<ColumnTable, DecodeError> {
        Ok(SplatBuffer::from_bytes(data)?.to_columns())
    }

    fn decode_to_splat_buffer(&self, data: &[u8]) -> Result<SplatBuffer, DecodeError> {
        SplatBuffer::from_bytes(data)
    }
}
