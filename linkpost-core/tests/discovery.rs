mod common;

use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;

use common::{open_registry, FakeFactory, FakeWeb, Site};
use linkpost_core::config::{DiscoverySection, FormsSection, PatternSection};
use linkpost_core::discovery::{
    BrowserProbe, CandidateSource, DiscoveryConfig, DiscoveryEngine, DiscoveryError,
    DiscoveryResult, PatternSource, PlatformProbe, ProbeVerdict, SeedListSource,
};
use linkpost_core::registry::{
    AutomationMechanism, PlatformCandidate, PlatformCategory, PlatformFilter, PlatformTrust,
};
use linkpost_core::session::AttemptOutcome;

fn patterns() -> Vec<PatternSection> {
    vec![PatternSection {
        category: PlatformCategory::CommentForm,
        mechanism: AutomationMechanism::FormSubmission,
        hosts: vec!["blog.example.org".into()],
        paths: vec!["/guestbook/page-{1..4}".into()],
        authority_estimate: Some(85),
    }]
}

fn config() -> DiscoveryConfig {
    DiscoveryConfig {
        probe_delay_ms: (0, 0),
        stop_on_first_error: false,
        dry_run: false,
    }
}

#[tokio::test]
async fn provisional_candidates_are_capped_and_refreshed_not_reset() {
    let dir = tempfile::tempdir().unwrap();
    let registry = open_registry(&dir);
    let engine = DiscoveryEngine::new(Arc::clone(&registry), config())
        .with_source(PatternSource::new(patterns()).unwrap());

    let first = engine.discover(PlatformCategory::CommentForm, 3).await.unwrap();
    assert_eq!(first.seen, 3);
    assert_eq!(first.inserted, 3);

    let platform = registry.get("blog.example.org/guestbook/page-1").unwrap();
    assert_eq!(platform.trust, PlatformTrust::Provisional);
    assert_eq!(platform.authority, 30);
    assert!((platform.success_rate - 30.0).abs() < 1e-9);

    registry
        .record_outcome("blog.example.org/guestbook/page-1", AttemptOutcome::Posted)
        .await
        .unwrap();
    let second = engine.discover(PlatformCategory::CommentForm, 4).await.unwrap();
    assert_eq!(second.refreshed, 3);
    assert_eq!(second.inserted, 1);
    let kept = registry.get("blog.example.org/guestbook/page-1").unwrap();
    assert!((kept.success_rate - 44.0).abs() < 1e-9);
    assert_eq!(kept.times_used, 1);
}

#[tokio::test]
async fn seed_file_candidates_are_trusted_and_dry_run_writes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let seed = dir.path().join("seed.yaml");
    std::fs::write(
        &seed,
        "platforms:\n  - url: https://www.directory.example.net/submit/\n    category: directory_listing\n    authority_estimate: 70\n  - url: https://blog.example.org/post\n    category: comment_form\n",
    )
    .unwrap();
    let registry = open_registry(&dir);

    let dry = DiscoveryEngine::new(Arc::clone(&registry), config())
        .with_source(SeedListSource::new(&seed))
        .dry_run(true);
    let planned = dry
        .discover(PlatformCategory::DirectoryListing, 10)
        .await
        .unwrap();
    assert!(planned.dry_run);
    assert_eq!(planned.inserted, 1);
    assert!(registry.list(&PlatformFilter::default()).unwrap().is_empty());

    let engine = DiscoveryEngine::new(Arc::clone(&registry), config())
        .with_source(SeedListSource::new(&seed));
    engine
        .discover(PlatformCategory::DirectoryListing, 10)
        .await
        .unwrap();
    let platform = registry.get("directory.example.net/submit").unwrap();
    assert_eq!(platform.trust, PlatformTrust::Trusted);
    assert_eq!(platform.authority, 70);
    assert_eq!(registry.list(&PlatformFilter::default()).unwrap().len(), 1);
}

struct Broken;

#[async_trait]
impl CandidateSource for Broken {
    fn name(&self) -> &str {
        "broken"
    }

    async fn candidates(
        &self,
        _category: PlatformCategory,
        _limit: usize,
    ) -> DiscoveryResult<Vec<PlatformCandidate>> {
        Err(DiscoveryError::UnsupportedFormat("feed.csv".into()))
    }
}

#[tokio::test]
async fn candidate_stream_is_lazy_and_bounded_by_depth() {
    let dir = tempfile::tempdir().unwrap();
    let registry = open_registry(&dir);
    let engine = DiscoveryEngine::new(Arc::clone(&registry), config())
        .with_source(PatternSource::new(patterns()).unwrap())
        .with_source(Broken);

    // depth satisfied by the first source; the broken one is never asked
    let urls: Vec<_> = engine
        .candidates(PlatformCategory::CommentForm, 2)
        .map(|candidate| candidate.unwrap().url)
        .collect()
        .await;
    assert_eq!(urls.len(), 2);

    let stats = engine.discover(PlatformCategory::CommentForm, 10).await.unwrap();
    assert_eq!(stats.inserted, 4);
    assert_eq!(stats.errors.len(), 1);

    let strict = DiscoveryEngine::from_config(
        Arc::clone(&registry),
        &DiscoverySection {
            stop_on_first_error: true,
            ..DiscoverySection::default()
        },
    )
    .unwrap()
    .with_source(Broken);
    assert!(strict
        .discover(PlatformCategory::CommentForm, 10)
        .await
        .is_err());
}

#[tokio::test]
async fn browser_probe_rejects_pages_without_a_form() {
    let dir = tempfile::tempdir().unwrap();
    let registry = open_registry(&dir);
    let web = Arc::new(FakeWeb::new(&[
        ("https://blog.example.org/guestbook/page-1", Site::Accepts),
        ("https://blog.example.org/guestbook/page-2", Site::NoForm),
    ]));
    let probe = BrowserProbe::new(
        Arc::new(FakeFactory(Arc::clone(&web))),
        FormsSection::default(),
        std::time::Duration::from_secs(5),
    );
    let verdict = probe
        .check(&PlatformCandidate::new(
            "https://blog.example.org/guestbook/page-2",
            PlatformCategory::CommentForm,
        ))
        .await
        .unwrap();
    assert_eq!(verdict, ProbeVerdict::Incompatible("form not found".into()));

    let engine = DiscoveryEngine::new(Arc::clone(&registry), config())
        .with_source(PatternSource::new(patterns()).unwrap())
        .with_probe(Arc::new(probe));
    let stats = engine.discover(PlatformCategory::CommentForm, 4).await.unwrap();
    assert_eq!(stats.inserted, 1);
    assert_eq!(stats.rejected, 1);
    // page-3 and page-4 are not served at all
    assert_eq!(stats.errors.len(), 2);
    assert!(registry.get("blog.example.org/guestbook/page-1").is_ok());
    assert_eq!(
        web.pages_opened.load(std::sync::atomic::Ordering::SeqCst),
        web.pages_closed.load(std::sync::atomic::Ordering::SeqCst)
    );
}
