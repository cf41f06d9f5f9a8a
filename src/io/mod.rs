pub mod codec;
pub mod fetch;
pub mod ksplat;
pub mod loader;
pub mod ply;
pub mod splat;
pub mod writer;

#[cfg(feature = "io_spz")]
pub mod spz;

#[cfg(feature = "io_sog")]
pub mod sog;
