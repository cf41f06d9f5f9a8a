use clap::Parser;
use serde::{
    Deserialize,
    Serialize,
};

use crate::{
    io::{
        codec::SplatFormat,
        loader::OutputKind,
    },
    pool::PoolConfig,
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
#[serde(rename_all = "lowercase")]
pub enum ConvertTarget {
    #[default]
    Splat,
    Ply,
}


#[derive(
    Debug,
    Clone,
    Serialize,
    Deserialize,
    Parser,
)]
#[command(about = "decode gaussian splat scenes and convert them to .splat or .ply", version, long_about = None)]
pub struct SplatConvertArgs {
    #[arg(long, default_value = "")]
    pub input_file: String,

    #[arg(long, default_value = "")]
    pub output_file: String,

    /// Skip detection and decode as this format.
    #[arg(long, value_enum)]
    pub format: Option<SplatFormat>,

    #[arg(long, value_enum, default_value_t = ConvertTarget::Splat)]
    pub target: ConvertTarget,

    #[arg(long, value_enum, default_value_t = OutputKind::Columns)]
    pub output: OutputKind,

    #[arg(long, default_value_t = true, action = clap::ArgAction::Set)]
    pub include_sh: bool,

    #[arg(long)]
    pub use_pool: bool,

    #[arg(long, default_value = "4")]
    pub worker_limit: usize,

    #[arg(long, default_value = "1024")]
    pub queue_limit: usize,

    /// Decode this many copies of the input through the pool.
    #[arg(long, default_value = "1")]
    pub repeat: usize,
}

impl Default for SplatConvertArgs {
    fn default() -> SplatConvertArgs {
        SplatConvertArgs {
            input_file: "".to_string(),
            output_file: "".to_string(),
            format: None,
            target: ConvertTarget::Splat,
            output: OutputKind::Columns,
            include_sh: true,
            use_pool: false,
            worker_limit: 4,
            queue_limit: 1024,
            repeat: 1,
        }
    }
}

impl SplatConvertArgs {
    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig::default()
            .with_worker_limit(self.worker_limit)
            .with_queue_limit(self.queue_limit)
    }
}


#[cfg(feature = "tooling")]
pub fn setup_logging() {
    use tracing_subscriber::{
        EnvFilter,
        fmt,
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    // a second call (tests, embedding binaries) keeps the first subscriber
    let _ = fmt().with_env_filter(filter).try_init();
}
