// crates/counsel-server/src/config/mod.rs
// Configuration surface and model registry

pub mod file;
pub mod registry;

pub use file::{
    AdapterConfig, ConvergenceDetectionConfig, CounselConfig, DecisionGraphConfig,
    DefaultsConfig, DeliberationConfig, EarlyStoppingConfig, EmbeddingsConfig, FileTreeConfig,
    ModelDefinition, StorageConfig, SummarizerConfig, ToolSecurityConfig,
};
pub use registry::{ModelRegistry, RegistryEntry};
