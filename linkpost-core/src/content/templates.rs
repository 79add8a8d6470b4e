use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use sha2::{Digest, Sha256};

use crate::registry::PlatformCategory;

use super::models::{ContentContext, LinkStyle};

const NEUTRAL_TOPIC: &str = "this topic";

const COMMENT_TEMPLATES: &[&str] = &[
    "Great write-up on {keyword}. I ran into the same questions a while ago and found {link} useful for filling in the gaps. Thanks for taking the time to share this.",
    "This is one of the clearer explanations of {keyword} I have read. For anyone who wants to go a bit deeper, {link} covers a few of the practical details.",
    "Really enjoyed this post. I have been working through {keyword} myself and kept notes along the way; {link} has some of them if they help anyone.",
    "Thanks for this. The section on {keyword} matched my experience closely. I put together a short follow-up at {link} with a couple of examples.",
    "Solid points throughout. When I was getting started with {keyword}, {link} helped me understand the basics, so passing it along.",
];

const PROFILE_TEMPLATES: &[&str] = &[
    "Writer and practitioner interested in {keyword}. I publish notes and guides at {link} and enjoy trading ideas with people working on similar problems.",
    "Curious about {keyword} and always learning. Most of what I work on ends up at {link}.",
    "I spend most of my time on {keyword}: reading, testing and writing about what works. You can find my work at {link}.",
    "Independent researcher focused on {keyword}. Projects, write-ups and occasional experiments live at {link}.",
];

const ARTICLE_TEMPLATES: &[&str] = &[
    "Getting started with {keyword}\n\nMost people approach {keyword} by collecting tips from many places at once, which tends to leave gaps. A better approach is to settle on a few fundamentals first and build from there.\n\nStart by writing down what you want to achieve and what you already know. Then work through one small, concrete step at a time, checking your results as you go. Mistakes made early are cheap to fix.\n\nFor a structured walkthrough with worked examples, {link} is a good companion to this approach. Whatever resources you use, consistency matters more than speed.",
    "Common mistakes with {keyword}\n\nAfter looking at a lot of projects, the same handful of problems shows up again and again. The first is skipping the planning stage. The second is trying to change too many things at once, which makes it impossible to tell what helped.\n\nThe fix for both is the same: make one change, measure it, and keep notes. It sounds slow, but it is usually the fastest path to a result you can trust.\n\nIf you want a checklist to work from, {link} keeps an up to date version along with explanations for each step.",
    "A practical guide to {keyword}\n\nThere is no shortage of advice about {keyword}, but much of it is either too general to act on or too specialised to apply. This short guide sits in the middle.\n\nFirst, understand the constraints you are working with. Second, pick the simplest method that fits them. Third, review the outcome honestly and adjust.\n\nMore detailed material, including examples and templates you can reuse, is available at {link}. Take what is useful and adapt the rest to your situation.",
];

const DIRECTORY_TEMPLATES: &[&str] = &[
    "{link}: a resource focused on {keyword}, with practical guides, worked examples and regularly updated reference material for beginners and experienced readers alike.",
    "Guides and reference material about {keyword}. Visit {link} for tutorials, checklists and answers to common questions.",
    "An independent site covering {keyword} in depth. {link} publishes how-to articles, reviews and resources that help readers make informed decisions.",
];

/// Built-in text variants per category. Rendering never fails; callers
/// validate the result and walk to the next variant when needed.
#[derive(Debug, Clone, Default)]
pub struct TemplateLibrary;

impl TemplateLibrary {
    pub fn templates(&self, category: PlatformCategory) -> &'static [&'static str] {
        match category {
            PlatformCategory::CommentForm => COMMENT_TEMPLATES,
            PlatformCategory::ProfileCreation => PROFILE_TEMPLATES,
            PlatformCategory::ArticleApi => ARTICLE_TEMPLATES,
            PlatformCategory::DirectoryListing => DIRECTORY_TEMPLATES,
        }
    }

    /// Template indices in the order they should be tried, starting at a
    /// position derived only from (category, campaign, variation).
    pub fn order(&self, category: PlatformCategory, context: &ContentContext) -> Vec<usize> {
        let templates = self.templates(category);
        let start = selection_rng(category, context).gen_range(0..templates.len());
        (0..templates.len())
            .map(|offset| (start + offset) % templates.len())
            .collect()
    }

    pub fn render(
        &self,
        category: PlatformCategory,
        index: usize,
        context: &ContentContext,
        style: LinkStyle,
    ) -> String {
        let templates = self.templates(category);
        let template = templates[index % templates.len()];
        template
            .replace("{keyword}", &safe_keyword(context))
            .replace("{link}", &render_link(context, style))
    }
}

pub fn selection_seed(category: PlatformCategory, context: &ContentContext) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(category.as_str().as_bytes());
    hasher.update([0u8]);
    hasher.update(context.campaign_id.as_bytes());
    hasher.update([0u8]);
    hasher.update(context.variation.to_le_bytes());
    hasher.finalize().into()
}

fn selection_rng(category: PlatformCategory, context: &ContentContext) -> ChaCha20Rng {
    ChaCha20Rng::from_seed(selection_seed(category, context))
}

pub fn render_link(context: &ContentContext, style: LinkStyle) -> String {
    let url = context.target_url.trim();
    let anchor = context.anchor.trim();
    let anchor = if anchor.is_empty() { url } else { anchor };
    match style {
        LinkStyle::Anchor => format!("<a href=\"{url}\">{anchor}</a>"),
        LinkStyle::PlainText if anchor == url => url.to_string(),
        LinkStyle::PlainText => format!("{anchor} ({url})"),
    }
}

/// The keyword is interpolated separately from the link, so a keyword that
/// overlaps the anchor or URL is swapped for a neutral phrase to keep the
/// link text unique.
fn safe_keyword(context: &ContentContext) -> String {
    let keyword = context.keyword.trim();
    if keyword.is_empty() {
        return NEUTRAL_TOPIC.to_string();
    }
    let lowered = keyword.to_lowercase();
    let anchor = context.anchor.trim().to_lowercase();
    let url = context.target_url.trim().to_lowercase();
    let overlaps_anchor =
        !anchor.is_empty() && (lowered.contains(&anchor) || anchor.contains(&lowered));
    if overlaps_anchor || lowered.contains(&url) || url.contains(&lowered) {
        NEUTRAL_TOPIC.to_string()
    } else {
        keyword.to_string()
    }
}
