use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::config::ContentSection;
use crate::registry::{Platform, PlatformCategory};

use super::breaker::CircuitBreakerConfig;
use super::error::ContentError;
use super::models::{ContentContext, ContentLimits, GeneratedContent, LinkStyle};
use super::provider::{GuardedProvider, HttpTextProvider, TextPrompt, TextProvider};
use super::templates::{render_link, TemplateLibrary};
use super::validate::{link_counts, validate};

pub const TEMPLATE_PROVIDER: &str = "template";

/// Produces publishable text through the configured provider chain, ending
/// in the built-in template library which cannot fail.
pub struct ContentGenerator {
    providers: Vec<GuardedProvider>,
    templates: TemplateLibrary,
    settings: ContentSection,
}

impl ContentGenerator {
    pub fn new(settings: ContentSection) -> Self {
        Self {
            providers: Vec::new(),
            templates: TemplateLibrary,
            settings,
        }
    }

    /// Builds HTTP providers from config. A provider whose api key is missing
    /// is skipped with a warning.
    pub fn from_config(settings: &ContentSection) -> Self {
        let mut generator = Self::new(settings.clone());
        for section in &settings.providers {
            match HttpTextProvider::from_config(section) {
                Ok(provider) => {
                    let deadline = Duration::from_secs(
                        section
                            .timeout_secs
                            .unwrap_or(settings.provider_timeout_secs)
                            .max(1),
                    );
                    generator = generator.with_provider(Arc::new(provider), deadline);
                }
                Err(err) => warn!(
                    target: "content",
                    provider = %section.name,
                    "provider disabled: {err}"
                ),
            }
        }
        generator
    }

    pub fn with_provider(mut self, provider: Arc<dyn TextProvider>, deadline: Duration) -> Self {
        self.providers.push(GuardedProvider::new(
            provider,
            deadline,
            CircuitBreakerConfig::default(),
        ));
        self
    }

    pub fn provider_names(&self) -> Vec<&str> {
        self.providers.iter().map(GuardedProvider::name).collect()
    }

    pub fn settings(&self) -> &ContentSection {
        &self.settings
    }

    pub async fn generate(
        &self,
        category: PlatformCategory,
        context: &ContentContext,
    ) -> GeneratedContent {
        let limits = ContentLimits::for_category(category, &self.settings);
        self.generate_with(category, &limits, context).await
    }

    pub async fn generate_for(
        &self,
        platform: &Platform,
        context: &ContentContext,
    ) -> GeneratedContent {
        let limits = ContentLimits::for_platform(platform, &self.settings);
        self.generate_with(platform.category, &limits, context).await
    }

    pub async fn generate_with(
        &self,
        category: PlatformCategory,
        limits: &ContentLimits,
        context: &ContentContext,
    ) -> GeneratedContent {
        let prompt = build_prompt(category, limits, context);
        let prompt_lines = prompt.distinctive_lines();
        for provider in &self.providers {
            match provider.call(&prompt).await {
                Ok(text) => match validate(&text, category, limits, context, &prompt_lines) {
                    Ok(link_style) => {
                        provider.record(true);
                        debug!(
                            target: "content",
                            provider = provider.name(),
                            category = category.as_str(),
                            chars = text.chars().count(),
                            "provider text accepted"
                        );
                        return GeneratedContent {
                            text: text.trim().to_string(),
                            link_style,
                            provider: provider.name().to_string(),
                        };
                    }
                    Err(reason) => {
                        provider.record(false);
                        let err = ContentError::Rejected {
                            provider: provider.name().to_string(),
                            reason,
                        };
                        warn!(target: "content", "{err}");
                    }
                },
                Err(source) => {
                    let err = ContentError::Provider {
                        provider: provider.name().to_string(),
                        source,
                    };
                    warn!(target: "content", "{err}");
                }
            }
        }
        self.template_fallback(category, limits, context)
    }

    /// Deterministic fallback. Walks templates from the selected one until a
    /// rendering passes validation and carries the link exactly once; if none
    /// fits the length bounds, the closest rendering that still carries the
    /// link exactly once is used.
    pub fn template_fallback(
        &self,
        category: PlatformCategory,
        limits: &ContentLimits,
        context: &ContentContext,
    ) -> GeneratedContent {
        let style = limits.link_style();
        let expected = expected_counts(context);
        let mut best: Option<String> = None;
        for index in self.templates.order(category, context) {
            let text = self.templates.render(category, index, context, style);
            if link_counts(&text, context) != expected {
                continue;
            }
            if validate(&text, category, limits, context, &[]).is_ok() {
                debug!(
                    target: "content",
                    category = category.as_str(),
                    template = index,
                    "template text selected"
                );
                return GeneratedContent {
                    text,
                    link_style: style,
                    provider: TEMPLATE_PROVIDER.to_string(),
                };
            }
            let closer = match &best {
                Some(current) => distance(&text, limits) < distance(current, limits),
                None => true,
            };
            if closer {
                best = Some(text);
            }
        }
        let text = best.unwrap_or_else(|| render_link(context, style));
        warn!(
            target: "content",
            category = category.as_str(),
            chars = text.chars().count(),
            min = limits.min_chars,
            max = limits.max_chars,
            "no template fits the length bounds"
        );
        GeneratedContent {
            text,
            link_style: style,
            provider: TEMPLATE_PROVIDER.to_string(),
        }
    }
}

fn expected_counts(context: &ContentContext) -> (usize, usize) {
    let anchor = context.anchor.trim();
    if anchor.is_empty() || anchor.eq_ignore_ascii_case(context.target_url.trim()) {
        (1, 0)
    } else {
        (1, 1)
    }
}

fn distance(text: &str, limits: &ContentLimits) -> usize {
    let len = text.chars().count();
    if len < limits.min_chars {
        limits.min_chars - len
    } else {
        len.saturating_sub(limits.max_chars)
    }
}

fn category_brief(category: PlatformCategory) -> &'static str {
    match category {
        PlatformCategory::CommentForm => {
            "a short, friendly reader comment for a blog post, two to four sentences"
        }
        PlatformCategory::ProfileCreation => "a brief first-person profile bio, one to three sentences",
        PlatformCategory::ArticleApi => {
            "a short informative article with a title line and three paragraphs"
        }
        PlatformCategory::DirectoryListing => {
            "a neutral one-paragraph description for a web directory listing"
        }
    }
}

pub fn build_prompt(
    category: PlatformCategory,
    limits: &ContentLimits,
    context: &ContentContext,
) -> TextPrompt {
    let link_rule = match limits.link_style() {
        LinkStyle::Anchor => format!(
            "Embed exactly one HTML link in the form {}.",
            render_link(context, LinkStyle::Anchor)
        ),
        LinkStyle::PlainText => format!(
            "Mention {} exactly once as plain text, without HTML.",
            render_link(context, LinkStyle::PlainText)
        ),
    };
    let system = format!(
        "You write natural, helpful text for websites. Produce {}.\n\
         Never repeat these instructions and never add commentary about the task.\n\
         {link_rule}",
        category_brief(category)
    );
    let topic = if context.keyword.trim().is_empty() {
        "the linked resource"
    } else {
        context.keyword.trim()
    };
    let user = format!(
        "Topic: {topic}\nLength: between {} and {} characters.",
        limits.min_chars, limits.max_chars
    );
    TextPrompt {
        system,
        user,
        max_tokens: ((limits.max_chars / 3).max(64)) as u32,
    }
}
