use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};
use crate::registry::{AutomationMechanism, PlatformCategory};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct PipelineConfig {
    #[serde(default)]
    pub paths: PathsSection,
    #[serde(default)]
    pub registry: RegistrySection,
    #[serde(default)]
    pub session: SessionSection,
    #[serde(default)]
    pub actor: ActorSection,
    #[serde(default)]
    pub forms: FormsSection,
    #[serde(default)]
    pub content: ContentSection,
    #[serde(default)]
    pub browser: BrowserConfig,
    #[serde(default)]
    pub discovery: DiscoverySection,
}

impl PipelineConfig {
    pub fn resolve_path<P: AsRef<Path>>(&self, candidate: P) -> PathBuf {
        let path = candidate.as_ref();
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            Path::new(&self.paths.data_dir).join(path)
        }
    }

    pub fn database_path(&self) -> PathBuf {
        self.resolve_path(&self.paths.database)
    }

    pub fn evidence_dir(&self) -> PathBuf {
        self.resolve_path(&self.paths.evidence_dir)
    }

    pub fn profiles_dir(&self) -> PathBuf {
        self.resolve_path(&self.paths.profiles_dir)
    }

    pub fn validate(&self) -> Result<()> {
        if self.session.fan_out == 0 {
            return Err(ConfigError::Invalid {
                field: "session.fan_out",
                reason: "must be at least 1".into(),
            });
        }
        if self.session.max_concurrent_sessions == 0 {
            return Err(ConfigError::Invalid {
                field: "session.max_concurrent_sessions",
                reason: "must be at least 1".into(),
            });
        }
        if !(0.0..=100.0).contains(&self.registry.deactivation_floor) {
            return Err(ConfigError::Invalid {
                field: "registry.deactivation_floor",
                reason: format!("{} is outside 0..=100", self.registry.deactivation_floor),
            });
        }
        if self.content.min_chars > self.content.max_chars {
            return Err(ConfigError::Invalid {
                field: "content.min_chars",
                reason: "must not exceed content.max_chars".into(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PathsSection {
    pub data_dir: String,
    pub database: String,
    pub evidence_dir: String,
    pub profiles_dir: String,
}

impl Default for PathsSection {
    fn default() -> Self {
        Self {
            data_dir: "data".into(),
            database: "linkpost.sqlite".into(),
            evidence_dir: "evidence".into(),
            profiles_dir: "profiles".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RegistrySection {
    /// Success rate below which an outcome counts toward deactivation.
    pub deactivation_floor: f64,
    /// Consecutive below-floor outcomes before a platform is deactivated.
    pub deactivation_window: u32,
    pub provisional_success_rate: f64,
    pub provisional_authority_cap: u8,
    pub seed_success_rate: f64,
}

impl Default for RegistrySection {
    fn default() -> Self {
        Self {
            deactivation_floor: 15.0,
            deactivation_window: 5,
            provisional_success_rate: 30.0,
            provisional_authority_cap: 30,
            seed_success_rate: 50.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionSection {
    pub attempt_budget: u32,
    pub fan_out: usize,
    pub min_attempt_delay_ms: u64,
    pub max_concurrent_sessions: usize,
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            attempt_budget: 10,
            fan_out: 2,
            min_attempt_delay_ms: 5_000,
            max_concurrent_sessions: 4,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ActorSection {
    pub navigation_timeout_secs: u64,
    pub element_timeout_secs: u64,
    pub submit_idle_timeout_secs: u64,
    pub field_delay_ms: [u64; 2],
    pub keystroke_delay_ms: [u64; 2],
    pub success_phrases: Vec<String>,
    pub failure_phrases: Vec<String>,
    pub challenge_selectors: Vec<String>,
    pub challenge_markers: Vec<String>,
}

impl Default for ActorSection {
    fn default() -> Self {
        Self {
            navigation_timeout_secs: 30,
            element_timeout_secs: 10,
            submit_idle_timeout_secs: 15,
            field_delay_ms: [400, 1_500],
            keystroke_delay_ms: [25, 90],
            success_phrases: vec![
                "awaiting moderation".into(),
                "thank you".into(),
                "comment submitted".into(),
            ],
            failure_phrases: vec!["error".into(), "captcha".into(), "try again".into()],
            challenge_selectors: vec![
                "iframe[src*='recaptcha']".into(),
                ".g-recaptcha".into(),
                "iframe[src*='hcaptcha']".into(),
                ".h-captcha".into(),
                ".cf-turnstile".into(),
            ],
            challenge_markers: vec![
                "verify you are human".into(),
                "i'm not a robot".into(),
                "checking your browser".into(),
            ],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentityField {
    Name,
    Email,
    Website,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FormSignatureSection {
    pub content: Vec<String>,
    pub name: Vec<String>,
    pub email: Vec<String>,
    pub website: Vec<String>,
    pub submit: Vec<String>,
    pub required: Vec<IdentityField>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FormsSection {
    pub comment_form: FormSignatureSection,
    pub article_api: FormSignatureSection,
    pub profile_creation: FormSignatureSection,
    pub directory_listing: FormSignatureSection,
}

impl FormsSection {
    pub fn for_category(&self, category: PlatformCategory) -> &FormSignatureSection {
        match category {
            PlatformCategory::CommentForm => &self.comment_form,
            PlatformCategory::ArticleApi => &self.article_api,
            PlatformCategory::ProfileCreation => &self.profile_creation,
            PlatformCategory::DirectoryListing => &self.directory_listing,
        }
    }
}

fn selectors(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| value.to_string()).collect()
}

impl Default for FormsSection {
    fn default() -> Self {
        let submit = selectors(&[
            "#submit",
            "button[type='submit']",
            "input[type='submit']",
        ]);
        Self {
            comment_form: FormSignatureSection {
                content: selectors(&["textarea#comment", "textarea[name='comment']", "form textarea"]),
                name: selectors(&["input#author", "input[name='author']", "input[name='name']"]),
                email: selectors(&["input#email", "input[name='email']", "input[type='email']"]),
                website: selectors(&["input#url", "input[name='url']", "input[name='website']"]),
                submit: submit.clone(),
                required: vec![IdentityField::Name, IdentityField::Email],
            },
            article_api: FormSignatureSection {
                content: selectors(&[
                    "textarea[name='body']",
                    "textarea[name='content']",
                    "[contenteditable='true']",
                ]),
                name: Vec::new(),
                email: Vec::new(),
                website: Vec::new(),
                submit: submit.clone(),
                required: Vec::new(),
            },
            profile_creation: FormSignatureSection {
                content: selectors(&[
                    "textarea[name='bio']",
                    "textarea[name='about']",
                    "textarea[name='description']",
                ]),
                name: selectors(&["input[name='username']", "input[name='name']"]),
                email: selectors(&["input[name='email']", "input[type='email']"]),
                website: selectors(&["input[name='website']", "input[name='url']"]),
                submit: submit.clone(),
                required: vec![IdentityField::Name, IdentityField::Email],
            },
            directory_listing: FormSignatureSection {
                content: selectors(&["textarea[name='description']", "form textarea"]),
                name: selectors(&["input[name='title']", "input[name='name']"]),
                email: selectors(&["input[name='email']", "input[type='email']"]),
                website: selectors(&["input[name='url']", "input[name='website']"]),
                submit,
                required: vec![IdentityField::Website],
            },
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ContentSection {
    pub min_chars: usize,
    pub max_chars: usize,
    pub provider_timeout_secs: u64,
    pub providers: Vec<ProviderSection>,
}

impl Default for ContentSection {
    fn default() -> Self {
        Self {
            min_chars: 40,
            max_chars: 1_200,
            provider_timeout_secs: 20,
            providers: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderSection {
    pub name: String,
    pub endpoint: String,
    pub model: String,
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_max_tokens() -> u32 {
    400
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BrowserConfig {
    pub executable_path: Option<String>,
    pub headless: bool,
    pub sandbox: bool,
    pub disable_gpu: bool,
    pub request_timeout_secs: Option<u64>,
    pub user_agent: Option<String>,
    pub viewport: [u32; 2],
    pub lang: Option<String>,
    pub profile_ttl_hours: u64,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            executable_path: None,
            headless: true,
            sandbox: true,
            disable_gpu: true,
            request_timeout_secs: Some(30),
            user_agent: None,
            viewport: [1366, 768],
            lang: None,
            profile_ttl_hours: 24,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DiscoverySection {
    pub seed_files: Vec<String>,
    pub patterns: Vec<PatternSection>,
    pub probe: bool,
    pub probe_delay_ms: [u64; 2],
    pub stop_on_first_error: bool,
}

impl Default for DiscoverySection {
    fn default() -> Self {
        Self {
            seed_files: Vec::new(),
            patterns: Vec::new(),
            probe: false,
            probe_delay_ms: [1_000, 3_000],
            stop_on_first_error: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PatternSection {
    pub category: PlatformCategory,
    #[serde(default = "default_mechanism")]
    pub mechanism: AutomationMechanism,
    pub hosts: Vec<String>,
    pub paths: Vec<String>,
    #[serde(default)]
    pub authority_estimate: Option<u8>,
}

fn default_mechanism() -> AutomationMechanism {
    AutomationMechanism::FormSubmission
}

pub fn load_pipeline_config<P: AsRef<Path>>(path: P) -> Result<PipelineConfig> {
    let config: PipelineConfig = load_toml(path)?;
    config.validate()?;
    Ok(config)
}

fn load_toml<T, P>(path: P) -> Result<T>
where
    T: DeserializeOwned,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        source,
        path: path.to_path_buf(),
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        source,
        path: path.to_path_buf(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_fixture_config() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../configs/linkpost.toml");
        let config = load_pipeline_config(path).expect("config should parse");
        assert_eq!(config.session.fan_out, 2);
        assert_eq!(config.content.providers.len(), 2);
        assert_eq!(config.content.providers[0].name, "primary");
        assert!(config
            .actor
            .success_phrases
            .iter()
            .any(|phrase| phrase == "awaiting moderation"));
        assert_eq!(config.discovery.patterns[0].category, PlatformCategory::CommentForm);
    }

    #[test]
    fn empty_document_uses_defaults() {
        let config: PipelineConfig = toml::from_str("").unwrap();
        config.validate().unwrap();
        assert_eq!(config.registry.deactivation_window, 5);
        assert_eq!(config.actor.failure_phrases, vec!["error", "captcha", "try again"]);
        assert!(!config.forms.comment_form.content.is_empty());
    }

    #[test]
    fn zero_fan_out_is_rejected() {
        let config: PipelineConfig = toml::from_str("[session]\nfan_out = 0\n").unwrap();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "session.fan_out", .. }));
    }

    #[test]
    fn missing_file_reports_path() {
        let err = load_pipeline_config("/nonexistent/linkpost.toml").unwrap_err();
        match err {
            ConfigError::Io { path, .. } => assert!(path.ends_with("linkpost.toml")),
            other => panic!("unexpected error {other:?}"),
        }
    }
}
