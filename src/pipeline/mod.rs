//! Pipeline module - dataset loading, profiling and the relevance engine

pub mod cache;
pub mod calculation;
pub mod config;
pub mod distribution;
pub mod engine;
pub mod error;
pub mod loader;
pub mod profile;
pub mod sampler;
pub mod storage;
pub mod table;

pub use cache::{DatasetCache, DatasetSource, DirectorySource, EvictorHandle, FileMapSource};
pub use calculation::*;
pub use config::HicsConfig;
pub use distribution::*;
pub use engine::*;
pub use error::{HicsError, Result};
pub use loader::*;
pub use profile::*;
pub use sampler::*;
pub use storage::{
    FeatureCatalog, FeatureSubset, InMemoryStorage, JsonFileStorage, RedundancyMatrix, Relevancy,
    ResultStorage,
};
pub use table::{ColumnarTable, FeatureId};
