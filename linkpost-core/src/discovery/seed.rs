use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::Deserialize;

use crate::registry::{PlatformCandidate, PlatformCategory, PlatformTrust};

use super::error::{DiscoveryError, DiscoveryResult};
use super::CandidateSource;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeedFormat {
    Toml,
    Yaml,
    Json,
}

impl SeedFormat {
    pub fn from_path(path: &Path) -> DiscoveryResult<Self> {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase);
        match extension.as_deref() {
            Some("toml") => Ok(SeedFormat::Toml),
            Some("yaml") | Some("yml") => Ok(SeedFormat::Yaml),
            Some("json") => Ok(SeedFormat::Json),
            _ => Err(DiscoveryError::UnsupportedFormat(path.to_path_buf())),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SeedDocument {
    Wrapped { platforms: Vec<PlatformCandidate> },
    Bare(Vec<PlatformCandidate>),
}

impl SeedDocument {
    fn into_candidates(self) -> Vec<PlatformCandidate> {
        match self {
            SeedDocument::Wrapped { platforms } => platforms,
            SeedDocument::Bare(platforms) => platforms,
        }
    }
}

/// Parses a verified seed list. Accepts either a bare list of records or a
/// document with a `platforms` list; TOML only supports the latter.
pub fn parse_seed_list(
    content: &str,
    format: SeedFormat,
    path: &Path,
) -> DiscoveryResult<Vec<PlatformCandidate>> {
    let parse_error = |reason: String| DiscoveryError::Parse {
        path: path.to_path_buf(),
        reason,
    };
    let document: SeedDocument = match format {
        SeedFormat::Toml => toml::from_str(content).map_err(|err| parse_error(err.to_string()))?,
        SeedFormat::Yaml => {
            serde_yaml::from_str(content).map_err(|err| parse_error(err.to_string()))?
        }
        SeedFormat::Json => {
            serde_json::from_str(content).map_err(|err| parse_error(err.to_string()))?
        }
    };
    let source = path.display().to_string();
    Ok(document
        .into_candidates()
        .into_iter()
        .map(|mut candidate| {
            candidate.trust = PlatformTrust::Trusted;
            candidate.source.get_or_insert_with(|| source.clone());
            candidate
        })
        .collect())
}

pub fn load_seed_file(path: impl AsRef<Path>) -> DiscoveryResult<Vec<PlatformCandidate>> {
    let path = path.as_ref();
    let format = SeedFormat::from_path(path)?;
    let content = std::fs::read_to_string(path).map_err(|source| DiscoveryError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_seed_list(&content, format, path)
}

/// Trusted candidates read from a seed list file on every discovery pass.
#[derive(Debug, Clone)]
pub struct SeedListSource {
    path: PathBuf,
    name: String,
}

impl SeedListSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = format!("seed:{}", path.display());
        Self { path, name }
    }
}

#[async_trait]
impl CandidateSource for SeedListSource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn candidates(
        &self,
        category: PlatformCategory,
        limit: usize,
    ) -> DiscoveryResult<Vec<PlatformCandidate>> {
        let format = SeedFormat::from_path(&self.path)?;
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|source| DiscoveryError::Io {
                path: self.path.clone(),
                source,
            })?;
        Ok(parse_seed_list(&content, format, &self.path)?
            .into_iter()
            .filter(|candidate| candidate.category == category)
            .take(limit)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::AutomationMechanism;

    #[test]
    fn toml_yaml_and_json_lists_parse_as_trusted() {
        let toml = r#"
            [[platforms]]
            url = "https://blog.example.org/guestbook"
            category = "comment_form"
            authority_estimate = 55
        "#;
        let yaml = "- url: https://dir.example.net/submit\n  category: directory_listing\n  mechanism: api_key\n";
        let json = r#"{"platforms": [{"url": "https://write.example.com/", "category": "article_api"}]}"#;

        let from_toml = parse_seed_list(toml, SeedFormat::Toml, Path::new("seed.toml")).unwrap();
        assert_eq!(from_toml[0].authority_estimate, Some(55));
        assert_eq!(from_toml[0].trust, PlatformTrust::Trusted);
        assert_eq!(from_toml[0].source.as_deref(), Some("seed.toml"));

        let from_yaml = parse_seed_list(yaml, SeedFormat::Yaml, Path::new("seed.yaml")).unwrap();
        assert_eq!(from_yaml[0].mechanism, AutomationMechanism::ApiKey);
        assert_eq!(from_yaml[0].category, PlatformCategory::DirectoryListing);

        let from_json = parse_seed_list(json, SeedFormat::Json, Path::new("seed.json")).unwrap();
        assert_eq!(from_json[0].category, PlatformCategory::ArticleApi);
    }

    #[test]
    fn unknown_extension_is_rejected() {
        let err = SeedFormat::from_path(Path::new("seed.csv")).unwrap_err();
        assert!(matches!(err, DiscoveryError::UnsupportedFormat(_)));
    }
}
