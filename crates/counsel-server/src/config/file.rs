// crates/counsel-server/src/config/file.rs
// YAML configuration surface: adapters, deliberation, decision graph

use crate::error::{CounselError, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Adapter configuration, discriminated by `type`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum AdapterConfig {
    Cli {
        command: String,
        /// Argument templates; `{model}`, `{prompt}`, and
        /// `{working_directory}` placeholders are substituted per call.
        args: Vec<String>,
        #[serde(default = "default_adapter_timeout")]
        timeout: u64,
    },
    Http {
        base_url: String,
        /// May reference `${ENV_VAR}`; missing vars degrade to None.
        #[serde(default)]
        api_key: Option<String>,
        #[serde(default)]
        headers: BTreeMap<String, String>,
        #[serde(default = "default_adapter_timeout")]
        timeout: u64,
        #[serde(default = "default_max_retries")]
        max_retries: u32,
    },
}

fn default_adapter_timeout() -> u64 {
    60
}

fn default_max_retries() -> u32 {
    3
}

/// Default settings for deliberations.
#[derive(Debug, Clone, Deserialize)]
pub struct DefaultsConfig {
    #[serde(default = "DefaultsConfig::default_mode")]
    pub mode: String,
    #[serde(default = "DefaultsConfig::default_rounds")]
    pub rounds: u32,
    #[serde(default = "DefaultsConfig::default_max_rounds")]
    pub max_rounds: u32,
    #[serde(default = "DefaultsConfig::default_timeout_per_round")]
    pub timeout_per_round: u64,
    /// Dedicated summarizer; falls back to the first participant.
    #[serde(default)]
    pub summarizer: Option<SummarizerConfig>,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            mode: Self::default_mode(),
            rounds: Self::default_rounds(),
            max_rounds: Self::default_max_rounds(),
            timeout_per_round: Self::default_timeout_per_round(),
            summarizer: None,
        }
    }
}

impl DefaultsConfig {
    fn default_mode() -> String {
        "conference".into()
    }
    fn default_rounds() -> u32 {
        2
    }
    fn default_max_rounds() -> u32 {
        5
    }
    fn default_timeout_per_round() -> u64 {
        120
    }
}

/// Adapter + model used for the summarizing invocation.
#[derive(Debug, Clone, Deserialize)]
pub struct SummarizerConfig {
    pub adapter: String,
    pub model: String,
}

/// Transcript storage settings.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "StorageConfig::default_transcripts_dir")]
    pub transcripts_dir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            transcripts_dir: Self::default_transcripts_dir(),
        }
    }
}

impl StorageConfig {
    fn default_transcripts_dir() -> String {
        "transcripts".into()
    }
}

/// Convergence detection thresholds.
#[derive(Debug, Clone, Deserialize)]
pub struct ConvergenceDetectionConfig {
    #[serde(default = "ConvergenceDetectionConfig::default_enabled")]
    pub enabled: bool,
    #[serde(default = "ConvergenceDetectionConfig::default_similarity_threshold")]
    pub semantic_similarity_threshold: f64,
    #[serde(default = "ConvergenceDetectionConfig::default_divergence_threshold")]
    pub divergence_threshold: f64,
    #[serde(default = "ConvergenceDetectionConfig::default_min_rounds")]
    pub min_rounds_before_check: u32,
    #[serde(default = "ConvergenceDetectionConfig::default_consecutive_stable")]
    pub consecutive_stable_rounds: u32,
    #[serde(default = "ConvergenceDetectionConfig::default_stance_stability")]
    pub stance_stability_threshold: f64,
    #[serde(default = "ConvergenceDetectionConfig::default_length_drop")]
    pub response_length_drop_threshold: f64,
}

impl Default for ConvergenceDetectionConfig {
    fn default() -> Self {
        Self {
            enabled: Self::default_enabled(),
            semantic_similarity_threshold: Self::default_similarity_threshold(),
            divergence_threshold: Self::default_divergence_threshold(),
            min_rounds_before_check: Self::default_min_rounds(),
            consecutive_stable_rounds: Self::default_consecutive_stable(),
            stance_stability_threshold: Self::default_stance_stability(),
            response_length_drop_threshold: Self::default_length_drop(),
        }
    }
}

impl ConvergenceDetectionConfig {
    fn default_enabled() -> bool {
        true
    }
    fn default_similarity_threshold() -> f64 {
        0.85
    }
    fn default_divergence_threshold() -> f64 {
        0.40
    }
    fn default_min_rounds() -> u32 {
        2
    }
    fn default_consecutive_stable() -> u32 {
        2
    }
    fn default_stance_stability() -> f64 {
        0.80
    }
    fn default_length_drop() -> f64 {
        0.40
    }
}

/// Model-controlled early stopping.
#[derive(Debug, Clone, Deserialize)]
pub struct EarlyStoppingConfig {
    #[serde(default = "EarlyStoppingConfig::default_enabled")]
    pub enabled: bool,
    /// Fraction of latest-round voters that must want to stop.
    #[serde(default = "EarlyStoppingConfig::default_threshold")]
    pub threshold: f64,
    /// Whether `defaults.rounds` acts as a floor before stopping.
    #[serde(default = "EarlyStoppingConfig::default_respect_min_rounds")]
    pub respect_min_rounds: bool,
}

impl Default for EarlyStoppingConfig {
    fn default() -> Self {
        Self {
            enabled: Self::default_enabled(),
            threshold: Self::default_threshold(),
            respect_min_rounds: Self::default_respect_min_rounds(),
        }
    }
}

impl EarlyStoppingConfig {
    fn default_enabled() -> bool {
        true
    }
    fn default_threshold() -> f64 {
        0.66
    }
    fn default_respect_min_rounds() -> bool {
        true
    }
}

/// File tree injection into round-1 prompts.
#[derive(Debug, Clone, Deserialize)]
pub struct FileTreeConfig {
    #[serde(default = "FileTreeConfig::default_enabled")]
    pub enabled: bool,
    #[serde(default = "FileTreeConfig::default_max_depth")]
    pub max_depth: usize,
    #[serde(default = "FileTreeConfig::default_max_files")]
    pub max_files: usize,
}

impl Default for FileTreeConfig {
    fn default() -> Self {
        Self {
            enabled: Self::default_enabled(),
            max_depth: Self::default_max_depth(),
            max_files: Self::default_max_files(),
        }
    }
}

impl FileTreeConfig {
    fn default_enabled() -> bool {
        true
    }
    fn default_max_depth() -> usize {
        3
    }
    fn default_max_files() -> usize {
        100
    }
}

/// Security settings for evidence-gathering tools.
#[derive(Debug, Clone, Deserialize)]
pub struct ToolSecurityConfig {
    #[serde(default = "ToolSecurityConfig::default_exclude_patterns")]
    pub exclude_patterns: Vec<String>,
    #[serde(default = "ToolSecurityConfig::default_max_file_size")]
    pub max_file_size_bytes: u64,
}

impl Default for ToolSecurityConfig {
    fn default() -> Self {
        Self {
            exclude_patterns: Self::default_exclude_patterns(),
            max_file_size_bytes: Self::default_max_file_size(),
        }
    }
}

impl ToolSecurityConfig {
    fn default_exclude_patterns() -> Vec<String> {
        [
            "transcripts/",
            ".git/",
            "node_modules/",
            ".venv/",
            "venv/",
            "target/",
            "__pycache__/",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect()
    }
    fn default_max_file_size() -> u64 {
        1_048_576
    }
}

/// Deliberation engine configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DeliberationConfig {
    #[serde(default)]
    pub convergence_detection: ConvergenceDetectionConfig,
    #[serde(default)]
    pub early_stopping: EarlyStoppingConfig,
    /// Recent rounds whose tool results are injected into the next round.
    #[serde(default = "DeliberationConfig::default_tool_context_max_rounds")]
    pub tool_context_max_rounds: u32,
    /// Per-execution character cap when injecting tool output.
    #[serde(default = "DeliberationConfig::default_tool_output_max_chars")]
    pub tool_output_max_chars: usize,
    #[serde(default)]
    pub file_tree: FileTreeConfig,
    #[serde(default)]
    pub tool_security: ToolSecurityConfig,
}

impl Default for DeliberationConfig {
    fn default() -> Self {
        Self {
            convergence_detection: ConvergenceDetectionConfig::default(),
            early_stopping: EarlyStoppingConfig::default(),
            tool_context_max_rounds: Self::default_tool_context_max_rounds(),
            tool_output_max_chars: Self::default_tool_output_max_chars(),
            file_tree: FileTreeConfig::default(),
            tool_security: ToolSecurityConfig::default(),
        }
    }
}

impl DeliberationConfig {
    fn default_tool_context_max_rounds() -> u32 {
        2
    }
    fn default_tool_output_max_chars() -> usize {
        1000
    }
}

/// Tier boundaries for context injection: 0 < moderate < strong <= 1.
#[derive(Debug, Clone, Deserialize)]
pub struct TierBoundaries {
    pub strong: f64,
    pub moderate: f64,
}

impl Default for TierBoundaries {
    fn default() -> Self {
        Self {
            strong: 0.75,
            moderate: 0.60,
        }
    }
}

/// Decision graph memory configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DecisionGraphConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "DecisionGraphConfig::default_db_path")]
    pub db_path: String,
    /// Deprecated: kept so old configs still parse. `tier_boundaries`
    /// is authoritative and this field is never consulted.
    #[serde(default)]
    pub similarity_threshold: Option<f64>,
    #[serde(default)]
    pub tier_boundaries: TierBoundaries,
    #[serde(default = "DecisionGraphConfig::default_max_context_decisions")]
    pub max_context_decisions: usize,
    #[serde(default = "DecisionGraphConfig::default_context_token_budget")]
    pub context_token_budget: usize,
    #[serde(default = "DecisionGraphConfig::default_query_window")]
    pub query_window: usize,
    #[serde(default = "DecisionGraphConfig::default_noise_floor")]
    pub noise_floor: f64,
    #[serde(default = "DecisionGraphConfig::default_compute_similarities")]
    pub compute_similarities: bool,
    #[serde(default = "DecisionGraphConfig::default_query_cache_size")]
    pub query_cache_size: usize,
    #[serde(default = "DecisionGraphConfig::default_embedding_cache_size")]
    pub embedding_cache_size: usize,
    #[serde(default = "DecisionGraphConfig::default_query_ttl_secs")]
    pub query_ttl_secs: u64,
    #[serde(default = "DecisionGraphConfig::default_adaptive_k_small_threshold")]
    pub adaptive_k_small_threshold: usize,
    #[serde(default = "DecisionGraphConfig::default_adaptive_k_medium_threshold")]
    pub adaptive_k_medium_threshold: usize,
    #[serde(default = "DecisionGraphConfig::default_adaptive_k_small")]
    pub adaptive_k_small: usize,
    #[serde(default = "DecisionGraphConfig::default_adaptive_k_medium")]
    pub adaptive_k_medium: usize,
    #[serde(default = "DecisionGraphConfig::default_adaptive_k_large")]
    pub adaptive_k_large: usize,
}

impl Default for DecisionGraphConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            db_path: Self::default_db_path(),
            similarity_threshold: None,
            tier_boundaries: TierBoundaries::default(),
            max_context_decisions: Self::default_max_context_decisions(),
            context_token_budget: Self::default_context_token_budget(),
            query_window: Self::default_query_window(),
            noise_floor: Self::default_noise_floor(),
            compute_similarities: Self::default_compute_similarities(),
            query_cache_size: Self::default_query_cache_size(),
            embedding_cache_size: Self::default_embedding_cache_size(),
            query_ttl_secs: Self::default_query_ttl_secs(),
            adaptive_k_small_threshold: Self::default_adaptive_k_small_threshold(),
            adaptive_k_medium_threshold: Self::default_adaptive_k_medium_threshold(),
            adaptive_k_small: Self::default_adaptive_k_small(),
            adaptive_k_medium: Self::default_adaptive_k_medium(),
            adaptive_k_large: Self::default_adaptive_k_large(),
        }
    }
}

impl DecisionGraphConfig {
    fn default_db_path() -> String {
        "decision_graph.db".into()
    }
    fn default_max_context_decisions() -> usize {
        3
    }
    fn default_context_token_budget() -> usize {
        1500
    }
    fn default_query_window() -> usize {
        1000
    }
    fn default_noise_floor() -> f64 {
        0.40
    }
    fn default_compute_similarities() -> bool {
        true
    }
    fn default_query_cache_size() -> usize {
        200
    }
    fn default_embedding_cache_size() -> usize {
        500
    }
    fn default_query_ttl_secs() -> u64 {
        300
    }
    fn default_adaptive_k_small_threshold() -> usize {
        100
    }
    fn default_adaptive_k_medium_threshold() -> usize {
        1000
    }
    fn default_adaptive_k_small() -> usize {
        5
    }
    fn default_adaptive_k_medium() -> usize {
        3
    }
    fn default_adaptive_k_large() -> usize {
        2
    }

    /// Validate the tier invariant: 0 < moderate < strong <= 1.
    pub fn validate(&self) -> Result<()> {
        let t = &self.tier_boundaries;
        if !(0.0 < t.moderate && t.moderate < t.strong && t.strong <= 1.0) {
            return Err(CounselError::Config(format!(
                "tier_boundaries must satisfy 0 < moderate ({}) < strong ({}) <= 1",
                t.moderate, t.strong
            )));
        }
        Ok(())
    }
}

/// Optional dense embeddings endpoint for the similarity backend.
#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingsConfig {
    pub base_url: String,
    pub model: String,
    #[serde(default = "EmbeddingsConfig::default_timeout")]
    pub timeout: u64,
}

impl EmbeddingsConfig {
    fn default_timeout() -> u64 {
        30
    }
}

/// One entry in the per-adapter model allowlist.
#[derive(Debug, Clone, Deserialize)]
pub struct ModelDefinition {
    pub id: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub tier: Option<String>,
    #[serde(default)]
    pub default: bool,
    #[serde(default)]
    pub note: Option<String>,
}

/// Top-level config structure, loaded from config.yaml.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CounselConfig {
    #[serde(default)]
    pub adapters: BTreeMap<String, AdapterConfig>,
    #[serde(default)]
    pub defaults: DefaultsConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub deliberation: DeliberationConfig,
    #[serde(default)]
    pub decision_graph: DecisionGraphConfig,
    #[serde(default)]
    pub model_registry: BTreeMap<String, Vec<ModelDefinition>>,
    #[serde(default)]
    pub embeddings: Option<EmbeddingsConfig>,
}

impl CounselConfig {
    /// Load configuration from a YAML file.
    ///
    /// Resolves `${ENV_VAR}` references in adapter fields and anchors
    /// relative storage paths at the config file's directory (the
    /// project root), not the process CWD.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            CounselError::Config(format!("failed to read {}: {}", path.display(), e))
        })?;
        let mut config: CounselConfig = serde_yaml::from_str(&contents)
            .map_err(|e| CounselError::Config(format!("failed to parse {}: {}", path.display(), e)))?;

        let root = path.parent().unwrap_or_else(|| Path::new("."));
        config.resolve(root)?;
        debug!(path = %path.display(), "Loaded config from file");
        Ok(config)
    }

    /// Finalize a config: env resolution, path anchoring, validation.
    /// Exposed separately so tests can build configs in memory.
    pub fn resolve(&mut self, project_root: &Path) -> Result<()> {
        for (name, adapter) in self.adapters.iter_mut() {
            if let AdapterConfig::Http {
                base_url, api_key, ..
            } = adapter
            {
                *base_url = resolve_env_refs(base_url).ok_or_else(|| {
                    CounselError::Config(format!(
                        "adapter '{name}': environment variable in base_url is not set"
                    ))
                })?;
                // Optional api_key degrades to None when the variable is
                // missing; the request then runs unauthenticated and the
                // server's rejection is observable.
                if let Some(key) = api_key.take() {
                    match resolve_env_refs(&key) {
                        Some(resolved) => *api_key = Some(resolved),
                        None => {
                            warn!(
                                adapter = %name,
                                "api_key references an unset environment variable; \
                                 continuing without authentication"
                            );
                        }
                    }
                }
            }
        }

        self.decision_graph.db_path =
            anchor_path(&self.decision_graph.db_path, project_root);
        self.storage.transcripts_dir =
            anchor_path(&self.storage.transcripts_dir, project_root);

        self.decision_graph.validate()?;
        if self.decision_graph.similarity_threshold.is_some() {
            warn!("decision_graph.similarity_threshold is deprecated; using tier_boundaries");
        }
        Ok(())
    }
}

/// Substitute `${VAR}` references with environment values.
/// Returns None when any referenced variable is unset.
fn resolve_env_refs(value: &str) -> Option<String> {
    let mut out = String::with_capacity(value.len());
    let mut rest = value;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let tail = &rest[start + 2..];
        let end = tail.find('}')?;
        let var = &tail[..end];
        out.push_str(&std::env::var(var).ok()?);
        rest = &tail[end + 1..];
    }
    out.push_str(rest);
    Some(out)
}

/// Anchor a relative path at the project root; absolute paths pass through.
fn anchor_path(value: &str, project_root: &Path) -> String {
    let path = PathBuf::from(value);
    if path.is_absolute() {
        value.to_string()
    } else {
        project_root.join(path).to_string_lossy().into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_config() {
        let yaml = r#"
adapters:
  claude:
    type: cli
    command: claude
    args: ["--model", "{model}", "-p", "{prompt}"]
"#;
        let config: CounselConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.adapters.len(), 1);
        match &config.adapters["claude"] {
            AdapterConfig::Cli { command, timeout, .. } => {
                assert_eq!(command, "claude");
                assert_eq!(*timeout, 60);
            }
            _ => panic!("expected cli adapter"),
        }
        assert_eq!(config.defaults.rounds, 2);
        assert_eq!(config.defaults.max_rounds, 5);
    }

    #[test]
    fn test_parse_http_adapter() {
        let yaml = r#"
adapters:
  ollama:
    type: http
    base_url: "http://localhost:11434"
    timeout: 120
    max_retries: 5
"#;
        let config: CounselConfig = serde_yaml::from_str(yaml).unwrap();
        match &config.adapters["ollama"] {
            AdapterConfig::Http {
                base_url,
                api_key,
                max_retries,
                ..
            } => {
                assert_eq!(base_url, "http://localhost:11434");
                assert!(api_key.is_none());
                assert_eq!(*max_retries, 5);
            }
            _ => panic!("expected http adapter"),
        }
    }

    #[test]
    fn test_missing_optional_api_key_degrades_to_none() {
        let mut config: CounselConfig = serde_yaml::from_str(
            r#"
adapters:
  openrouter:
    type: http
    base_url: "https://openrouter.ai/api/v1"
    api_key: "${COUNSEL_TEST_UNSET_KEY_XYZ}"
"#,
        )
        .unwrap();
        config.resolve(Path::new("/tmp")).unwrap();
        match &config.adapters["openrouter"] {
            AdapterConfig::Http { api_key, .. } => assert!(api_key.is_none()),
            _ => panic!("expected http adapter"),
        }
    }

    #[test]
    fn test_missing_required_base_url_env_is_fatal() {
        let mut config: CounselConfig = serde_yaml::from_str(
            r#"
adapters:
  custom:
    type: http
    base_url: "${COUNSEL_TEST_UNSET_URL_XYZ}"
"#,
        )
        .unwrap();
        assert!(config.resolve(Path::new("/tmp")).is_err());
    }

    #[test]
    fn test_resolve_env_refs_substitutes() {
        // SAFETY: test-only, variable name is unique to this test
        unsafe {
            std::env::set_var("COUNSEL_TEST_RESOLVE_VAR", "hunter2");
        }
        assert_eq!(
            resolve_env_refs("Bearer ${COUNSEL_TEST_RESOLVE_VAR}").as_deref(),
            Some("Bearer hunter2")
        );
        unsafe {
            std::env::remove_var("COUNSEL_TEST_RESOLVE_VAR");
        }
    }

    #[test]
    fn test_resolve_env_refs_passthrough_without_refs() {
        assert_eq!(resolve_env_refs("plain-key").as_deref(), Some("plain-key"));
    }

    #[test]
    fn test_db_path_anchored_at_project_root() {
        let mut config = CounselConfig::default();
        config.resolve(Path::new("/srv/counsel")).unwrap();
        assert_eq!(config.decision_graph.db_path, "/srv/counsel/decision_graph.db");
        assert_eq!(config.storage.transcripts_dir, "/srv/counsel/transcripts");
    }

    #[test]
    fn test_absolute_db_path_unchanged() {
        let mut config = CounselConfig::default();
        config.decision_graph.db_path = "/var/data/graph.db".into();
        config.resolve(Path::new("/srv/counsel")).unwrap();
        assert_eq!(config.decision_graph.db_path, "/var/data/graph.db");
    }

    #[test]
    fn test_tier_boundaries_invariant() {
        let mut config = CounselConfig::default();
        config.decision_graph.tier_boundaries = TierBoundaries {
            strong: 0.5,
            moderate: 0.7,
        };
        assert!(config.resolve(Path::new("/tmp")).is_err());
    }

    #[test]
    fn test_deprecated_similarity_threshold_still_parses() {
        let config: CounselConfig = serde_yaml::from_str(
            r#"
decision_graph:
  enabled: true
  similarity_threshold: 0.7
"#,
        )
        .unwrap();
        assert_eq!(config.decision_graph.similarity_threshold, Some(0.7));
        // tier boundaries keep their defaults
        assert_eq!(config.decision_graph.tier_boundaries.strong, 0.75);
    }

    #[test]
    fn test_deliberation_defaults() {
        let config = CounselConfig::default();
        let d = &config.deliberation;
        assert!(d.convergence_detection.enabled);
        assert_eq!(d.convergence_detection.semantic_similarity_threshold, 0.85);
        assert_eq!(d.early_stopping.threshold, 0.66);
        assert_eq!(d.tool_context_max_rounds, 2);
        assert_eq!(d.tool_output_max_chars, 1000);
        assert_eq!(d.tool_security.max_file_size_bytes, 1_048_576);
        assert!(d
            .tool_security
            .exclude_patterns
            .iter()
            .any(|p| p == ".git/"));
    }

    #[test]
    fn test_decision_graph_defaults() {
        let config = CounselConfig::default();
        let g = &config.decision_graph;
        assert!(!g.enabled);
        assert_eq!(g.max_context_decisions, 3);
        assert_eq!(g.context_token_budget, 1500);
        assert_eq!(g.query_window, 1000);
        assert_eq!(g.noise_floor, 0.40);
        assert_eq!(g.query_cache_size, 200);
        assert_eq!(g.embedding_cache_size, 500);
        assert_eq!(g.query_ttl_secs, 300);
        assert_eq!(g.adaptive_k_small, 5);
        assert_eq!(g.adaptive_k_medium, 3);
        assert_eq!(g.adaptive_k_large, 2);
    }

    #[test]
    fn test_model_registry_parses() {
        let config: CounselConfig = serde_yaml::from_str(
            r#"
model_registry:
  claude:
    - { id: sonnet, label: "Claude Sonnet", default: true }
    - { id: opus, tier: premium }
"#,
        )
        .unwrap();
        let models = &config.model_registry["claude"];
        assert_eq!(models.len(), 2);
        assert!(models[0].default);
        assert_eq!(models[1].tier.as_deref(), Some("premium"));
    }

    #[test]
    fn test_unknown_keys_ignored() {
        let yaml = r#"
defaults:
  rounds: 3
  unknown_key: true
"#;
        let config: CounselConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.defaults.rounds, 3);
    }
}
