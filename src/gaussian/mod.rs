pub mod columns;
pub mod packed;
pub mod rand;
pub mod splat;

pub use columns::ColumnTable;
pub use packed::{
    SplatBuffer,
    SplatRow,
};
pub use splat::Splat;

// TODO: add a streaming column sink so codecs can emit rows without a full table
