pub mod aggregator;
pub mod config;
pub mod dispatcher;
pub mod engine;
pub mod manifest;
pub mod metrics;
pub mod pipeline;
pub mod profile;
pub mod testing;

pub use config::{
    load_config, load_config_from_env, load_config_from_str, validate_config, Config, ConfigError,
    LogFormat, LoggingConfig,
};
pub use engine::{EncodingEngine, EngineConfig, EngineError, FfmpegEngine};
pub use pipeline::{
    PipelineConfig, PipelineError, PipelineProgress, RenditionOutput, StreamingPackage,
    StreamingPipeline,
};
pub use profile::{RenditionCatalog, RenditionProfile};
