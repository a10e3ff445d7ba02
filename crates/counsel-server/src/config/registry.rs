// crates/counsel-server/src/config/registry.rs
// Per-adapter model allowlist derived from configuration

use super::file::{CounselConfig, ModelDefinition};
use std::collections::BTreeMap;

/// Normalized model definition entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryEntry {
    pub id: String,
    pub label: String,
    pub tier: Option<String>,
    pub note: Option<String>,
    pub default: bool,
}

impl RegistryEntry {
    fn from_definition(def: &ModelDefinition) -> Self {
        Self {
            id: def.id.clone(),
            label: def.label.clone().unwrap_or_else(|| def.id.clone()),
            tier: def.tier.clone(),
            note: def.note.clone(),
            default: def.default,
        }
    }
}

/// In-memory view of configured model options per adapter.
///
/// Adapters with no registry section are unrestricted: any model id is
/// allowed for them.
#[derive(Debug, Default)]
pub struct ModelRegistry {
    entries: BTreeMap<String, Vec<RegistryEntry>>,
}

impl ModelRegistry {
    pub fn from_config(config: &CounselConfig) -> Self {
        let mut entries = BTreeMap::new();
        for (adapter, models) in &config.model_registry {
            let mut normalized: Vec<RegistryEntry> =
                models.iter().map(RegistryEntry::from_definition).collect();
            // Deterministic ordering: defaults first, then by label
            normalized.sort_by(|a, b| {
                (!a.default, a.label.to_lowercase()).cmp(&(!b.default, b.label.to_lowercase()))
            });
            entries.insert(adapter.clone(), normalized);
        }
        Self { entries }
    }

    /// Adapter names that carry a registry.
    pub fn adapters(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(|s| s.as_str())
    }

    /// Entries for the given adapter (empty if none configured).
    pub fn list_for_adapter(&self, adapter: &str) -> &[RegistryEntry] {
        self.entries.get(adapter).map(|v| v.as_slice()).unwrap_or(&[])
    }

    /// Default model id for an adapter, if a registry exists for it.
    pub fn get_default(&self, adapter: &str) -> Option<&str> {
        let entries = self.entries.get(adapter)?;
        entries
            .iter()
            .find(|e| e.default)
            .or_else(|| entries.first())
            .map(|e| e.id.as_str())
    }

    /// Whether the model id is allowlisted for the adapter.
    pub fn is_allowed(&self, adapter: &str, model_id: &str) -> bool {
        match self.entries.get(adapter) {
            Some(entries) => entries.iter().any(|e| e.id == model_id),
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> ModelRegistry {
        let config: CounselConfig = serde_yaml::from_str(
            r#"
model_registry:
  claude:
    - { id: opus, label: "Claude Opus", tier: premium }
    - { id: sonnet, label: "Claude Sonnet", default: true }
"#,
        )
        .unwrap();
        ModelRegistry::from_config(&config)
    }

    #[test]
    fn test_defaults_sort_first() {
        let reg = registry();
        let entries = reg.list_for_adapter("claude");
        assert_eq!(entries[0].id, "sonnet");
        assert_eq!(entries[1].id, "opus");
    }

    #[test]
    fn test_get_default() {
        assert_eq!(registry().get_default("claude"), Some("sonnet"));
        assert_eq!(registry().get_default("codex"), None);
    }

    #[test]
    fn test_is_allowed_with_registry() {
        let reg = registry();
        assert!(reg.is_allowed("claude", "opus"));
        assert!(!reg.is_allowed("claude", "haiku"));
    }

    #[test]
    fn test_unrestricted_adapter_allows_anything() {
        assert!(registry().is_allowed("openrouter", "anything/model"));
    }

    #[test]
    fn test_label_falls_back_to_id() {
        let config: CounselConfig = serde_yaml::from_str(
            r#"
model_registry:
  codex:
    - { id: gpt-5 }
"#,
        )
        .unwrap();
        let reg = ModelRegistry::from_config(&config);
        assert_eq!(reg.list_for_adapter("codex")[0].label, "gpt-5");
    }
}
