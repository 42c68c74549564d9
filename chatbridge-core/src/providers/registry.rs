//! Provider resolution and descriptor loading
//!
//! Descriptors live on disk under `<root>/<provider>/` as `metadata.json`,
//! `header.txt` and `payload.json`. They are read lazily on first use and
//! cached for the life of the process; a cached descriptor is never
//! replaced or mutated.

use super::descriptor::{HeaderBlock, ProviderDescriptor, ProviderMetadata};
use super::error::{RegistryError, RegistryResult};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};
use url::Url;

pub const METADATA_FILE: &str = "metadata.json";
pub const HEADER_FILE: &str = "header.txt";
pub const PAYLOAD_FILE: &str = "payload.json";

/// Model-name fragments that imply a provider, checked in order
pub const MODEL_PROVIDER_RULES: &[(&str, &str)] = &[("qwen", "qwen")];

/// Pick the provider for a request.
///
/// A non-empty explicit provider always wins. Otherwise the model name is
/// matched case-insensitively against [`MODEL_PROVIDER_RULES`].
pub fn resolve(model: &str, explicit_provider: Option<&str>) -> Option<String> {
    if let Some(provider) = explicit_provider.filter(|p| !p.is_empty()) {
        return Some(provider.to_string());
    }

    let model = model.to_lowercase();
    MODEL_PROVIDER_RULES
        .iter()
        .find(|(fragment, _)| model.contains(fragment))
        .map(|(_, provider)| provider.to_string())
}

/// Loads and caches provider descriptors from a directory tree
pub struct ProviderRegistry {
    root: PathBuf,
    cache: RwLock<HashMap<String, Arc<ProviderDescriptor>>>,
}

impl ProviderRegistry {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Return the descriptor for `name`, reading it from disk on first use
    pub async fn load(&self, name: &str) -> RegistryResult<Arc<ProviderDescriptor>> {
        let cached = self.cache.read().get(name).cloned();
        if let Some(descriptor) = cached {
            return Ok(descriptor);
        }

        validate_name(name)?;
        let descriptor = Arc::new(self.read_descriptor(name).await?);

        // Concurrent first loads race here; whoever inserts first wins and
        // every caller gets that instance.
        let mut cache = self.cache.write();
        let cached = cache
            .entry(name.to_string())
            .or_insert_with(|| {
                info!(provider = name, url = %descriptor.url(), stream = descriptor.stream, "loaded provider descriptor");
                descriptor
            });
        Ok(Arc::clone(cached))
    }

    /// Number of descriptors currently cached
    pub fn cached_count(&self) -> usize {
        self.cache.read().len()
    }

    /// Provider directories that carry a metadata record, sorted by name
    pub async fn available(&self) -> Vec<String> {
        let mut providers = Vec::new();
        let Ok(mut entries) = tokio::fs::read_dir(&self.root).await else {
            return providers;
        };

        while let Ok(Some(entry)) = entries.next_entry().await {
            let path = entry.path();
            if path.is_dir() && path.join(METADATA_FILE).is_file() {
                if let Some(name) = entry.file_name().to_str() {
                    providers.push(name.to_string());
                }
            }
        }

        providers.sort();
        providers
    }

    async fn read_descriptor(&self, name: &str) -> RegistryResult<ProviderDescriptor> {
        let dir = self.root.join(name);
        if !tokio::fs::metadata(&dir).await.map(|m| m.is_dir()).unwrap_or(false) {
            return Err(RegistryError::NotFound(name.to_string()));
        }
        debug!(provider = name, dir = %dir.display(), "reading provider descriptor");

        let metadata_text = read_artifact(name, &dir, METADATA_FILE).await?;
        let metadata: ProviderMetadata =
            serde_json::from_str(&metadata_text).map_err(|e| RegistryError::InvalidDescriptor {
                name: name.to_string(),
                artifact: METADATA_FILE,
                message: e.to_string(),
            })?;

        let header_text = read_artifact(name, &dir, HEADER_FILE).await?;
        let header_block = HeaderBlock::parse(name, &header_text)?;

        let payload_text = read_artifact(name, &dir, PAYLOAD_FILE).await?;
        let template: Value =
            serde_json::from_str(&payload_text).map_err(|e| RegistryError::InvalidDescriptor {
                name: name.to_string(),
                artifact: PAYLOAD_FILE,
                message: e.to_string(),
            })?;
        if !template.is_object() {
            return Err(RegistryError::InvalidDescriptor {
                name: name.to_string(),
                artifact: PAYLOAD_FILE,
                message: "payload template must be a JSON object".to_string(),
            });
        }

        let descriptor = ProviderDescriptor::new(name, metadata, header_block, template);
        Url::parse(&descriptor.url()).map_err(|e| RegistryError::InvalidDescriptor {
            name: name.to_string(),
            artifact: METADATA_FILE,
            message: format!("invalid upstream url {}: {}", descriptor.url(), e),
        })?;

        Ok(descriptor)
    }
}

async fn read_artifact(name: &str, dir: &Path, artifact: &'static str) -> RegistryResult<String> {
    match tokio::fs::read_to_string(dir.join(artifact)).await {
        Ok(text) => Ok(text),
        Err(e) if e.kind() == ErrorKind::NotFound => Err(RegistryError::Incomplete {
            name: name.to_string(),
            artifact,
        }),
        Err(e) => Err(RegistryError::InvalidDescriptor {
            name: name.to_string(),
            artifact,
            message: e.to_string(),
        }),
    }
}

/// Provider names come from callers and become path components
fn validate_name(name: &str) -> RegistryResult<()> {
    let valid = !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\', '\0']);
    if valid {
        Ok(())
    } else {
        Err(RegistryError::InvalidName(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("qwen-7b", None => Some("qwen".to_string()); "inferred from model")]
    #[test_case("Qwen2.5-Max", None => Some("qwen".to_string()); "case insensitive")]
    #[test_case("gpt-4", None => None; "no rule matches")]
    #[test_case("qwen-7b", Some("other") => Some("other".to_string()); "explicit wins over inference")]
    #[test_case("gpt-4", Some("custom") => Some("custom".to_string()); "explicit without rule")]
    #[test_case("qwen-7b", Some("") => Some("qwen".to_string()); "empty explicit ignored")]
    fn test_resolve(model: &str, explicit: Option<&str>) -> Option<String> {
        resolve(model, explicit)
    }

    #[test_case("../etc"; "parent traversal")]
    #[test_case("a/b"; "nested path")]
    #[test_case(".."; "parent dir")]
    #[test_case(""; "empty")]
    fn test_invalid_names_rejected(name: &str) {
        assert!(matches!(validate_name(name), Err(RegistryError::InvalidName(_))));
    }
}
