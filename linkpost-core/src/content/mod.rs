pub mod breaker;
pub mod error;
pub mod generator;
pub mod models;
pub mod provider;
pub mod templates;
pub mod validate;

pub use breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use error::{ContentError, ContentResult, ProviderError, ProviderResult};
pub use generator::{build_prompt, ContentGenerator, TEMPLATE_PROVIDER};
pub use models::{ContentContext, ContentLimits, GeneratedContent, LinkStyle};
pub use provider::{GuardedProvider, HttpTextProvider, TextPrompt, TextProvider};
pub use templates::TemplateLibrary;
pub use validate::{validate, Rejection};
