use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::browser::{
    BrowserContextFactory, BrowserError, BrowserMetrics, BrowserPage, BrowserResult, HumanPacing,
};
use crate::config::{ActorSection, FormsSection};
use crate::content::GeneratedContent;
use crate::registry::{Platform, PlatformCategory};
use crate::session::{AttemptOutcome, PosterIdentity};

use super::challenge::{ChallengeDetector, ChallengeSignal};
use super::classify::PhraseSet;
use super::evidence::{inline_note_url, EvidenceKind, EvidenceStore};
use super::forms::{field_name, identity_value, FormSignature, LocatedForm, IDENTITY_FIELDS};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ActorStep {
    Navigate,
    LocateForm,
    FillFields,
    ChallengeCheck,
    Submit,
    Classify,
    CaptureEvidence,
}

impl ActorStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActorStep::Navigate => "navigate",
            ActorStep::LocateForm => "locate_form",
            ActorStep::FillFields => "fill_fields",
            ActorStep::ChallengeCheck => "challenge_check",
            ActorStep::Submit => "submit",
            ActorStep::Classify => "classify",
            ActorStep::CaptureEvidence => "capture_evidence",
        }
    }
}

impl fmt::Display for ActorStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Receives each state the actor enters.
pub trait StepObserver: Send + Sync {
    fn step(&self, step: ActorStep);
}

impl<F> StepObserver for F
where
    F: Fn(ActorStep) + Send + Sync,
{
    fn step(&self, step: ActorStep) {
        self(step)
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl StepObserver for NoopObserver {
    fn step(&self, _step: ActorStep) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActorTimeouts {
    pub navigation: Duration,
    pub element: Duration,
    pub submit_idle: Duration,
}

impl ActorTimeouts {
    pub fn from_config(config: &ActorSection) -> Self {
        Self {
            navigation: Duration::from_secs(config.navigation_timeout_secs.max(1)),
            element: Duration::from_secs(config.element_timeout_secs.max(1)),
            submit_idle: Duration::from_secs(config.submit_idle_timeout_secs.max(1)),
        }
    }
}

/// One attempt against one platform.
#[derive(Debug, Clone, Copy)]
pub struct AttemptRequest<'a> {
    pub session_id: &'a str,
    pub attempt_id: &'a str,
    pub platform: &'a Platform,
    pub content: &'a GeneratedContent,
    pub identity: &'a PosterIdentity,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptReport {
    pub outcome: AttemptOutcome,
    pub reason: String,
    pub evidence_url: String,
    pub evidence_kind: EvidenceKind,
}

/// Drives an isolated browser page through navigate, locate, fill,
/// challenge check, submit and classify. Every wait is bounded and every
/// attempt ends with stored evidence.
pub struct PostingActor {
    factory: Arc<dyn BrowserContextFactory>,
    evidence: Arc<dyn EvidenceStore>,
    phrases: PhraseSet,
    challenges: ChallengeDetector,
    signatures: HashMap<PlatformCategory, FormSignature>,
    pacing: HumanPacing,
    timeouts: ActorTimeouts,
    metrics: Arc<Mutex<BrowserMetrics>>,
}

impl PostingActor {
    pub fn new(
        factory: Arc<dyn BrowserContextFactory>,
        evidence: Arc<dyn EvidenceStore>,
        actor: &ActorSection,
        forms: &FormsSection,
    ) -> Self {
        let signatures = PlatformCategory::ALL
            .into_iter()
            .map(|category| (category, FormSignature::for_category(category, forms)))
            .collect();
        Self {
            factory,
            evidence,
            phrases: PhraseSet::from_config(actor),
            challenges: ChallengeDetector::from_config(actor),
            signatures,
            pacing: HumanPacing::from_config(actor),
            timeouts: ActorTimeouts::from_config(actor),
            metrics: Arc::new(Mutex::new(BrowserMetrics::default())),
        }
    }

    pub fn with_pacing(mut self, pacing: HumanPacing) -> Self {
        self.pacing = pacing;
        self
    }

    pub fn with_timeouts(mut self, timeouts: ActorTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn metrics(&self) -> BrowserMetrics {
        self.with_metrics(|metrics| metrics.clone())
    }

    fn with_metrics<R>(&self, f: impl FnOnce(&mut BrowserMetrics) -> R) -> R {
        let mut guard = self
            .metrics
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut guard)
    }

    pub async fn attempt(
        &self,
        request: &AttemptRequest<'_>,
        observer: &dyn StepObserver,
    ) -> AttemptReport {
        observer.step(ActorStep::Navigate);
        let page = match self.open_page().await {
            Ok(page) => page,
            Err(err) => {
                self.with_metrics(|metrics| metrics.record_navigation_failure());
                let reason = format!("browser unavailable: {err}");
                observer.step(ActorStep::CaptureEvidence);
                let (evidence_url, evidence_kind) = self.capture(None, request, &reason).await;
                return self.finish(request, AttemptOutcome::Failed, reason, evidence_url, evidence_kind);
            }
        };
        self.with_metrics(|metrics| metrics.record_page_open());

        let (outcome, reason) = self.drive(page.as_ref(), request, observer).await;

        observer.step(ActorStep::CaptureEvidence);
        let (evidence_url, evidence_kind) = self.capture(Some(page.as_ref()), request, &reason).await;
        if let Err(err) = bounded(self.timeouts.element, "page close", page.close()).await {
            warn!(platform = %request.platform.key, error = %err, "failed to close attempt page");
        }
        self.finish(request, outcome, reason, evidence_url, evidence_kind)
    }

    /// Opens a page within the navigation timeout. A page that arrives
    /// after the deadline is closed in the background.
    async fn open_page(&self) -> BrowserResult<Box<dyn BrowserPage>> {
        let factory = Arc::clone(&self.factory);
        let mut opening = tokio::spawn(async move { factory.open_page().await });
        match timeout(self.timeouts.navigation, &mut opening).await {
            Ok(joined) => joined?,
            Err(_) => {
                tokio::spawn(async move {
                    if let Ok(Ok(page)) = opening.await {
                        if let Err(err) = page.close().await {
                            warn!(error = %err, "failed to close late browser page");
                        }
                    }
                });
                Err(BrowserError::timeout("browser context", self.timeouts.navigation))
            }
        }
    }

    fn finish(
        &self,
        request: &AttemptRequest<'_>,
        outcome: AttemptOutcome,
        reason: String,
        evidence_url: String,
        evidence_kind: EvidenceKind,
    ) -> AttemptReport {
        info!(
            session = %request.session_id,
            attempt = %request.attempt_id,
            platform = %request.platform.key,
            outcome = %outcome,
            reason = %reason,
            "posting attempt finished"
        );
        AttemptReport {
            outcome,
            reason,
            evidence_url,
            evidence_kind,
        }
    }

    async fn drive(
        &self,
        page: &dyn BrowserPage,
        request: &AttemptRequest<'_>,
        observer: &dyn StepObserver,
    ) -> (AttemptOutcome, String) {
        let platform = request.platform;
        if let Err(err) = bounded(
            self.timeouts.navigation,
            "navigation",
            page.navigate(&platform.url),
        )
        .await
        {
            self.with_metrics(|metrics| metrics.record_navigation_failure());
            return (AttemptOutcome::Failed, format!("navigation failed: {err}"));
        }

        observer.step(ActorStep::LocateForm);
        let Some(signature) = self.signatures.get(&platform.category) else {
            return (AttemptOutcome::Failed, "form not found".into());
        };
        let form = match bounded(self.timeouts.element, "form lookup", signature.locate(page)).await
        {
            Ok(Some(form)) => form,
            Ok(None) => {
                // Interstitial verification pages carry no form at all.
                if let Some(signal) = self.challenge(page).await {
                    return (AttemptOutcome::NeedsReview, signal.to_string());
                }
                return (AttemptOutcome::Failed, "form not found".into());
            }
            Err(err) => return (AttemptOutcome::Failed, format!("form lookup failed: {err}")),
        };

        observer.step(ActorStep::FillFields);
        if let Err(reason) = self.fill(page, signature, &form, request).await {
            return (AttemptOutcome::Failed, reason);
        }

        observer.step(ActorStep::ChallengeCheck);
        if let Some(signal) = self.challenge(page).await {
            return (AttemptOutcome::NeedsReview, signal.to_string());
        }

        observer.step(ActorStep::Submit);
        if let Err(err) = bounded(self.timeouts.element, "submit", page.click(&form.submit)).await {
            return (AttemptOutcome::Failed, format!("submit failed: {err}"));
        }
        self.with_metrics(|metrics| metrics.record_submission());
        match timeout(self.timeouts.submit_idle, page.wait_for_navigation()).await {
            Ok(Ok(())) => debug!(platform = %platform.key, "navigated after submit"),
            Ok(Err(err)) => debug!(platform = %platform.key, error = %err, "no navigation after submit"),
            Err(_) => debug!(platform = %platform.key, "submit idle timeout reached"),
        }

        observer.step(ActorStep::Classify);
        let text = match bounded(self.timeouts.element, "result page", page.page_text()).await {
            Ok(text) => text,
            Err(err) => return (AttemptOutcome::Failed, format!("result page unreadable: {err}")),
        };
        let classification = self.phrases.classify(&text);
        if classification.is_success() {
            (AttemptOutcome::Posted, classification.reason())
        } else {
            (AttemptOutcome::Failed, classification.reason())
        }
    }

    async fn fill(
        &self,
        page: &dyn BrowserPage,
        signature: &FormSignature,
        form: &LocatedForm,
        request: &AttemptRequest<'_>,
    ) -> Result<(), String> {
        let mut filled = 0;
        for field in IDENTITY_FIELDS {
            let element = form
                .identity
                .iter()
                .find(|(candidate, _)| *candidate == field)
                .map(|(_, element)| element);
            match (element, identity_value(request.identity, field)) {
                (Some(element), Some(value)) => {
                    let limit = self.timeouts.element + self.pacing.typing_budget(value);
                    bounded(limit, field_name(field), page.fill(element, value))
                        .await
                        .map_err(|err| format!("fill failed: {err}"))?;
                    filled += 1;
                    self.pacing.between_fields().await;
                }
                (Some(_), None) if signature.is_required(field) => {
                    return Err(format!("missing required field: {}", field_name(field)));
                }
                _ => {}
            }
        }
        let text = &request.content.text;
        let limit = self.timeouts.element + self.pacing.typing_budget(text);
        bounded(limit, "content field", page.fill(&form.content, text))
            .await
            .map_err(|err| format!("fill failed: {err}"))?;
        filled += 1;
        self.with_metrics(|metrics| metrics.record_fields(filled));
        self.pacing.between_fields().await;
        Ok(())
    }

    async fn challenge(&self, page: &dyn BrowserPage) -> Option<ChallengeSignal> {
        match bounded(
            self.timeouts.element,
            "challenge check",
            self.challenges.detect(page),
        )
        .await
        {
            Ok(Some(signal)) => {
                self.with_metrics(|metrics| metrics.record_challenge());
                Some(signal)
            }
            Ok(None) => None,
            Err(err) => {
                debug!(error = %err, "challenge check inconclusive");
                None
            }
        }
    }

    /// Screenshot first, then page text, then a stored note; an inline note
    /// URL when storage itself fails.
    async fn capture(
        &self,
        page: Option<&dyn BrowserPage>,
        request: &AttemptRequest<'_>,
        reason: &str,
    ) -> (String, EvidenceKind) {
        let (session, attempt) = (request.session_id, request.attempt_id);
        if let Some(page) = page {
            match bounded(self.timeouts.element, "screenshot", page.screenshot()).await {
                Ok(bytes) if !bytes.is_empty() => {
                    match self
                        .evidence
                        .store(session, attempt, EvidenceKind::Screenshot, &bytes)
                        .await
                    {
                        Ok(url) => {
                            self.with_metrics(|metrics| metrics.record_screenshot());
                            return (url, EvidenceKind::Screenshot);
                        }
                        Err(err) => warn!(attempt, error = %err, "failed to store screenshot"),
                    }
                }
                Ok(_) => debug!(attempt, "empty screenshot"),
                Err(err) => debug!(attempt, error = %err, "screenshot unavailable"),
            }
            match bounded(self.timeouts.element, "page text", page.page_text()).await {
                Ok(text) => match self
                    .evidence
                    .store(session, attempt, EvidenceKind::PageText, text.as_bytes())
                    .await
                {
                    Ok(url) => return (url, EvidenceKind::PageText),
                    Err(err) => warn!(attempt, error = %err, "failed to store page text"),
                },
                Err(err) => debug!(attempt, error = %err, "page text unavailable"),
            }
        }
        let note = format!(
            "platform: {}\nurl: {}\nresult: {reason}\n",
            request.platform.key, request.platform.url
        );
        match self
            .evidence
            .store(session, attempt, EvidenceKind::Note, note.as_bytes())
            .await
        {
            Ok(url) => (url, EvidenceKind::Note),
            Err(err) => {
                warn!(attempt, error = %err, "evidence storage failed, keeping inline note");
                (inline_note_url(&note), EvidenceKind::Note)
            }
        }
    }
}

async fn bounded<T, F>(limit: Duration, what: &str, fut: F) -> BrowserResult<T>
where
    F: Future<Output = BrowserResult<T>>,
{
    match timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(BrowserError::timeout(what, limit)),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::browser::PageElement;
    use crate::content::LinkStyle;
    use crate::posting::{EvidenceError, EvidenceResult};
    use crate::registry::AutomationMechanism;

    #[derive(Default)]
    struct PageState {
        present: Vec<&'static str>,
        before_submit: &'static str,
        after_submit: &'static str,
        fail_navigation: bool,
        stall_navigation: bool,
        screenshot: Vec<u8>,
        submitted: AtomicBool,
        closed: AtomicBool,
        filled: Mutex<Vec<(String, String)>>,
    }

    struct FakePage(Arc<PageState>);

    #[async_trait]
    impl BrowserPage for FakePage {
        async fn navigate(&self, _url: &str) -> BrowserResult<()> {
            if self.0.stall_navigation {
                tokio::time::sleep(Duration::from_secs(3_600)).await;
            }
            if self.0.fail_navigation {
                return Err(BrowserError::Page("connection refused".into()));
            }
            Ok(())
        }

        async fn find(&self, selector: &str) -> BrowserResult<Option<PageElement>> {
            Ok(self
                .0
                .present
                .iter()
                .any(|present| *present == selector)
                .then(|| PageElement::new(selector)))
        }

        async fn fill(&self, element: &PageElement, text: &str) -> BrowserResult<()> {
            self.0
                .filled
                .lock()
                .unwrap()
                .push((element.selector.clone(), text.to_string()));
            Ok(())
        }

        async fn click(&self, _element: &PageElement) -> BrowserResult<()> {
            self.0.submitted.store(true, Ordering::SeqCst);
            Ok(())
        }

        async fn wait_for_navigation(&self) -> BrowserResult<()> {
            Ok(())
        }

        async fn screenshot(&self) -> BrowserResult<Vec<u8>> {
            Ok(self.0.screenshot.clone())
        }

        async fn page_text(&self) -> BrowserResult<String> {
            if self.0.submitted.load(Ordering::SeqCst) {
                Ok(self.0.after_submit.to_string())
            } else {
                Ok(self.0.before_submit.to_string())
            }
        }

        async fn current_url(&self) -> BrowserResult<Option<String>> {
            Ok(None)
        }

        async fn close(&self) -> BrowserResult<()> {
            self.0.closed.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    struct FakeFactory(Arc<PageState>);

    #[async_trait]
    impl BrowserContextFactory for FakeFactory {
        async fn open_page(&self) -> BrowserResult<Box<dyn BrowserPage>> {
            Ok(Box::new(FakePage(Arc::clone(&self.0))))
        }
    }

    #[derive(Default)]
    struct MemoryEvidence {
        broken: bool,
        stored: Mutex<Vec<(EvidenceKind, Vec<u8>)>>,
    }

    #[async_trait]
    impl EvidenceStore for MemoryEvidence {
        async fn store(
            &self,
            _session_id: &str,
            attempt_id: &str,
            kind: EvidenceKind,
            bytes: &[u8],
        ) -> EvidenceResult<String> {
            if self.broken {
                return Err(EvidenceError::Path("/dev/full".into()));
            }
            self.stored.lock().unwrap().push((kind, bytes.to_vec()));
            Ok(format!("mem://{attempt_id}/{}", kind.extension()))
        }
    }

    const COMMENT_FORM: [&str; 5] = [
        "textarea#comment",
        "input#author",
        "input#email",
        "input#url",
        "#submit",
    ];

    fn actor(state: &Arc<PageState>, evidence: &Arc<MemoryEvidence>) -> PostingActor {
        PostingActor::new(
            Arc::new(FakeFactory(Arc::clone(state))),
            Arc::clone(evidence) as Arc<dyn EvidenceStore>,
            &ActorSection::default(),
            &FormsSection::default(),
        )
        .with_pacing(HumanPacing::instant())
    }

    fn platform() -> Platform {
        Platform::new(
            "https://blog.example.org/post",
            PlatformCategory::CommentForm,
            AutomationMechanism::FormSubmission,
        )
        .unwrap()
    }

    fn content() -> GeneratedContent {
        GeneratedContent {
            text: "Useful notes on soil drainage, see garden beds (https://target.example)".into(),
            link_style: LinkStyle::PlainText,
            provider: "template".into(),
        }
    }

    fn identity() -> PosterIdentity {
        PosterIdentity {
            name: Some("Robin".into()),
            email: Some("robin@example.com".into()),
            website: None,
        }
    }

    async fn run(actor: &PostingActor, identity: &PosterIdentity) -> (AttemptReport, Vec<ActorStep>) {
        let platform = platform();
        let content = content();
        let request = AttemptRequest {
            session_id: "ses-1",
            attempt_id: "att-1",
            platform: &platform,
            content: &content,
            identity,
        };
        let steps = Mutex::new(Vec::new());
        let observer = |step: ActorStep| steps.lock().unwrap().push(step);
        let report = actor.attempt(&request, &observer).await;
        (report, steps.into_inner().unwrap())
    }

    #[tokio::test]
    async fn successful_submission_is_posted_with_screenshot() {
        let state = Arc::new(PageState {
            present: COMMENT_FORM.to_vec(),
            before_submit: "Leave a reply",
            after_submit: "Your comment is awaiting moderation.",
            screenshot: vec![0x89, b'P', b'N', b'G'],
            ..PageState::default()
        });
        let evidence = Arc::new(MemoryEvidence::default());
        let actor = actor(&state, &evidence);

        let (report, steps) = run(&actor, &identity()).await;

        assert_eq!(report.outcome, AttemptOutcome::Posted);
        assert_eq!(report.evidence_kind, EvidenceKind::Screenshot);
        assert_eq!(report.evidence_url, "mem://att-1/png");
        assert_eq!(
            steps,
            vec![
                ActorStep::Navigate,
                ActorStep::LocateForm,
                ActorStep::FillFields,
                ActorStep::ChallengeCheck,
                ActorStep::Submit,
                ActorStep::Classify,
                ActorStep::CaptureEvidence,
            ]
        );
        let filled = state.filled.lock().unwrap().clone();
        assert_eq!(filled.len(), 3);
        assert_eq!(filled[2].0, "textarea#comment");
        assert!(state.closed.load(Ordering::SeqCst));
        let metrics = actor.metrics();
        assert_eq!(metrics.submissions, 1);
        assert_eq!(metrics.fields_filled, 3);
    }

    #[tokio::test]
    async fn challenge_after_fill_needs_review_without_submitting() {
        let mut present = COMMENT_FORM.to_vec();
        present.push(".g-recaptcha");
        let state = Arc::new(PageState {
            present,
            before_submit: "Leave a reply",
            ..PageState::default()
        });
        let evidence = Arc::new(MemoryEvidence::default());
        let actor = actor(&state, &evidence);

        let (report, steps) = run(&actor, &identity()).await;

        assert_eq!(report.outcome, AttemptOutcome::NeedsReview);
        assert!(report.reason.contains(".g-recaptcha"));
        assert!(!state.submitted.load(Ordering::SeqCst));
        assert!(!steps.contains(&ActorStep::Submit));
        // empty screenshot falls back to page text
        assert_eq!(report.evidence_kind, EvidenceKind::PageText);
        assert_eq!(actor.metrics().challenges_seen, 1);
    }

    #[tokio::test]
    async fn missing_form_and_failed_navigation_are_failures() {
        let no_form = Arc::new(PageState {
            present: vec!["input#author"],
            before_submit: "Comments are closed",
            ..PageState::default()
        });
        let evidence = Arc::new(MemoryEvidence::default());
        let (report, _) = run(&actor(&no_form, &evidence), &identity()).await;
        assert_eq!(report.outcome, AttemptOutcome::Failed);
        assert_eq!(report.reason, "form not found");

        let offline = Arc::new(PageState {
            fail_navigation: true,
            ..PageState::default()
        });
        let actor = actor(&offline, &evidence);
        let (report, _) = run(&actor, &identity()).await;
        assert_eq!(report.outcome, AttemptOutcome::Failed);
        assert!(report.reason.starts_with("navigation failed"));
        assert_eq!(actor.metrics().navigation_failures, 1);
        assert!(offline.closed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn required_identity_field_without_value_fails() {
        let state = Arc::new(PageState {
            present: COMMENT_FORM.to_vec(),
            before_submit: "Leave a reply",
            ..PageState::default()
        });
        let evidence = Arc::new(MemoryEvidence::default());
        let anonymous = PosterIdentity::default();
        let (report, _) = run(&actor(&state, &evidence), &anonymous).await;
        assert_eq!(report.outcome, AttemptOutcome::Failed);
        assert_eq!(report.reason, "missing required field: name");
        assert!(!state.submitted.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn ambiguous_result_page_is_not_posted() {
        let state = Arc::new(PageState {
            present: COMMENT_FORM.to_vec(),
            before_submit: "Leave a reply",
            after_submit: "Thank you! Error: duplicate comment detected",
            ..PageState::default()
        });
        let evidence = Arc::new(MemoryEvidence::default());
        let (report, _) = run(&actor(&state, &evidence), &identity()).await;
        assert_eq!(report.outcome, AttemptOutcome::Failed);
        assert!(report.reason.starts_with("ambiguous page"));
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_navigation_times_out_and_keeps_inline_evidence() {
        let state = Arc::new(PageState {
            stall_navigation: true,
            ..PageState::default()
        });
        let evidence = Arc::new(MemoryEvidence {
            broken: true,
            ..MemoryEvidence::default()
        });
        let actor = actor(&state, &evidence);
        let (report, _) = run(&actor, &identity()).await;
        assert_eq!(report.outcome, AttemptOutcome::Failed);
        assert!(report.reason.contains("timed out"));
        assert!(report.evidence_url.starts_with("data:text/plain"));
        assert_eq!(report.evidence_kind, EvidenceKind::Note);
    }

    struct SlowFactory {
        state: Arc<PageState>,
        delay: Duration,
    }

    #[async_trait]
    impl BrowserContextFactory for SlowFactory {
        async fn open_page(&self) -> BrowserResult<Box<dyn BrowserPage>> {
            tokio::time::sleep(self.delay).await;
            Ok(Box::new(FakePage(Arc::clone(&self.state))))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn page_opened_after_deadline_is_closed() {
        let state = Arc::new(PageState {
            present: COMMENT_FORM.to_vec(),
            ..PageState::default()
        });
        let evidence = Arc::new(MemoryEvidence::default());
        let actor = PostingActor::new(
            Arc::new(SlowFactory {
                state: Arc::clone(&state),
                delay: Duration::from_secs(30),
            }),
            Arc::clone(&evidence) as Arc<dyn EvidenceStore>,
            &ActorSection::default(),
            &FormsSection::default(),
        )
        .with_pacing(HumanPacing::instant())
        .with_timeouts(ActorTimeouts {
            navigation: Duration::from_secs(5),
            element: Duration::from_secs(5),
            submit_idle: Duration::from_secs(5),
        });

        let (report, _) = run(&actor, &identity()).await;
        assert_eq!(report.outcome, AttemptOutcome::Failed);
        assert!(report.reason.starts_with("browser unavailable"), "{}", report.reason);
        assert!(report.reason.contains("timed out"));
        assert!(!state.closed.load(Ordering::SeqCst));

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(state.closed.load(Ordering::SeqCst));
        assert!(!state.submitted.load(Ordering::SeqCst));
    }
}
