#![allow(dead_code)]

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tempfile::TempDir;

use linkpost_core::browser::{
    BrowserContextFactory, BrowserError, BrowserPage, BrowserResult, HumanPacing, PageElement,
};
use linkpost_core::config::{
    ActorSection, ContentSection, FormsSection, RegistrySection, SessionSection,
};
use linkpost_core::content::ContentGenerator;
use linkpost_core::pipeline::{Pipeline, PlatformGate, SessionRunner};
use linkpost_core::posting::{FsEvidenceStore, PostingActor};
use linkpost_core::registry::{
    PlatformCandidate, PlatformCategory, PlatformRegistry, SqlitePlatformStore,
};
use linkpost_core::session::{SessionTracker, SqliteSessionStore};

/// How a fake site reacts to a posting attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Site {
    /// Comment form that confirms moderation after submit.
    Accepts,
    /// Comment form that reports an error after submit.
    Rejects,
    /// Comment form guarded by a reCAPTCHA widget.
    Challenge,
    /// Page without any form.
    NoForm,
    /// Registered platform whose host never resolves.
    Offline,
}

const COMMENT_FORM: [&str; 5] = [
    "textarea#comment",
    "input#author",
    "input#email",
    "input#url",
    "#submit",
];

/// In-memory web keyed by URL. Unknown URLs fail navigation.
#[derive(Debug, Default)]
pub struct FakeWeb {
    sites: HashMap<String, Site>,
    pub pages_opened: AtomicUsize,
    pub pages_closed: AtomicUsize,
    pub submissions: Mutex<Vec<String>>,
}

impl FakeWeb {
    pub fn new(sites: &[(&str, Site)]) -> Self {
        Self {
            sites: sites
                .iter()
                .filter(|(_, site)| *site != Site::Offline)
                .map(|(url, site)| (url.to_string(), *site))
                .collect(),
            ..Self::default()
        }
    }

    pub fn submissions(&self) -> Vec<String> {
        self.submissions.lock().unwrap().clone()
    }
}

pub struct FakeFactory(pub Arc<FakeWeb>);

#[async_trait]
impl BrowserContextFactory for FakeFactory {
    async fn open_page(&self) -> BrowserResult<Box<dyn BrowserPage>> {
        self.0.pages_opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakePage {
            web: Arc::clone(&self.0),
            url: Mutex::new(None),
            submitted: AtomicBool::new(false),
        }))
    }
}

pub struct FakePage {
    web: Arc<FakeWeb>,
    url: Mutex<Option<String>>,
    submitted: AtomicBool,
}

impl FakePage {
    fn site(&self) -> Option<Site> {
        let url = self.url.lock().unwrap().clone()?;
        self.web.sites.get(&url).copied()
    }
}

#[async_trait]
impl BrowserPage for FakePage {
    async fn navigate(&self, url: &str) -> BrowserResult<()> {
        if !self.web.sites.contains_key(url) {
            return Err(BrowserError::Page(format!("dns lookup failed for {url}")));
        }
        *self.url.lock().unwrap() = Some(url.to_string());
        Ok(())
    }

    async fn find(&self, selector: &str) -> BrowserResult<Option<PageElement>> {
        let present = match self.site() {
            Some(Site::Accepts) | Some(Site::Rejects) => COMMENT_FORM.contains(&selector),
            Some(Site::Challenge) => COMMENT_FORM.contains(&selector) || selector == ".g-recaptcha",
            Some(Site::NoForm) | Some(Site::Offline) | None => false,
        };
        Ok(present.then(|| PageElement::new(selector)))
    }

    async fn fill(&self, _element: &PageElement, _text: &str) -> BrowserResult<()> {
        Ok(())
    }

    async fn click(&self, _element: &PageElement) -> BrowserResult<()> {
        self.submitted.store(true, Ordering::SeqCst);
        if let Some(url) = self.url.lock().unwrap().clone() {
            self.web.submissions.lock().unwrap().push(url);
        }
        Ok(())
    }

    async fn wait_for_navigation(&self) -> BrowserResult<()> {
        Ok(())
    }

    async fn screenshot(&self) -> BrowserResult<Vec<u8>> {
        Ok(b"\x89PNG fake".to_vec())
    }

    async fn page_text(&self) -> BrowserResult<String> {
        let submitted = self.submitted.load(Ordering::SeqCst);
        Ok(match (self.site(), submitted) {
            (Some(Site::Accepts), true) => "Your comment is awaiting moderation.".into(),
            (Some(Site::Rejects), true) => "Error: please try again later".into(),
            (Some(Site::NoForm), _) => "Comments are closed.".into(),
            _ => "Leave a reply".into(),
        })
    }

    async fn current_url(&self) -> BrowserResult<Option<String>> {
        Ok(self.url.lock().unwrap().clone())
    }

    async fn close(&self) -> BrowserResult<()> {
        self.web.pages_closed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub struct Harness {
    pub dir: TempDir,
    pub registry: Arc<PlatformRegistry>,
    pub tracker: SessionTracker,
    pub pipeline: Pipeline,
    pub web: Arc<FakeWeb>,
    pub evidence_dir: PathBuf,
}

pub fn session_settings(fan_out: usize, attempt_budget: u32) -> SessionSection {
    SessionSection {
        attempt_budget,
        fan_out,
        min_attempt_delay_ms: 0,
        max_concurrent_sessions: 4,
    }
}

pub fn open_registry(dir: &TempDir) -> Arc<PlatformRegistry> {
    let store = SqlitePlatformStore::new(dir.path().join("linkpost.sqlite")).unwrap();
    store.initialize().unwrap();
    Arc::new(PlatformRegistry::new(store, RegistrySection::default()))
}

pub fn open_tracker(dir: &TempDir) -> SessionTracker {
    let store = SqliteSessionStore::new(dir.path().join("linkpost.sqlite")).unwrap();
    store.initialize().unwrap();
    SessionTracker::new(store)
}

/// Registers every site as a trusted comment form; earlier sites get a
/// higher authority so selection order is predictable.
pub fn harness(sites: &[(&str, Site)], settings: SessionSection) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let registry = open_registry(&dir);
    let tracker = open_tracker(&dir);
    let candidates: Vec<PlatformCandidate> = sites
        .iter()
        .enumerate()
        .map(|(index, (url, _))| {
            let mut candidate = PlatformCandidate::new(*url, PlatformCategory::CommentForm);
            candidate.authority_estimate = Some(90 - index as u8);
            candidate
        })
        .collect();
    registry.import_seed(&candidates).unwrap();

    let web = Arc::new(FakeWeb::new(sites));
    let evidence_dir = dir.path().join("evidence");
    let actor = PostingActor::new(
        Arc::new(FakeFactory(Arc::clone(&web))),
        Arc::new(FsEvidenceStore::new(&evidence_dir)),
        &ActorSection::default(),
        &FormsSection::default(),
    )
    .with_pacing(HumanPacing::instant());
    let max_concurrent = settings.max_concurrent_sessions;
    let runner = SessionRunner::new(
        Arc::clone(&registry),
        tracker.clone(),
        Arc::new(ContentGenerator::new(ContentSection::default())),
        Arc::new(actor),
        Arc::new(PlatformGate::new()),
        settings,
    );
    Harness {
        dir,
        registry,
        tracker,
        pipeline: Pipeline::new(runner, max_concurrent),
        web,
        evidence_dir,
    }
}
