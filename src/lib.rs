pub use error::{
    DecodeError,
    PoolError,
    TaskError,
};
pub use gaussian::{
    ColumnTable,
    Splat,
    SplatBuffer,
    SplatRow,
    rand::{
        random_splats,
        random_splats_seeded,
    },
};
pub use io::{
    codec::{
        SplatCodec,
        SplatFormat,
    },
    loader::{
        DecodeOutput,
        DecodePool,
        DecodeTask,
        DecodeWorker,
        Decoder,
        OutputKind,
    },
};
pub use pool::{
    PoolConfig,
    TaskHandle,
    Worker,
    WorkerPool,
};

pub mod error;
pub mod gaussian;
pub mod io;
pub mod math;
pub mod pool;
pub mod utils;
