mod common;

use std::collections::HashSet;

use url::Url;

use common::{harness, session_settings, Harness, Site};
use linkpost_core::registry::PlatformCategory;
use linkpost_core::session::{
    AttemptOutcome, Campaign, PlatformCriteria, PosterIdentity, SessionStatus, Termination,
};

fn campaign(h: &Harness, quota: u32) -> Campaign {
    let mut campaign = Campaign::new("https://garden-supply.test/raised-beds", quota);
    campaign.keywords = vec!["raised garden beds".into(), "soil drainage".into()];
    campaign.anchors = vec!["cedar raised beds".into()];
    campaign.identity = Some(PosterIdentity {
        name: Some("Robin Hale".into()),
        email: Some("robin@garden-supply.test".into()),
        website: Some("https://garden-supply.test".into()),
    });
    h.tracker.create_campaign(&campaign).unwrap()
}

async fn run(h: &Harness, campaign: &Campaign) -> linkpost_core::session::Session {
    let session_id = h
        .pipeline
        .start_session(&campaign.campaign_id, PlatformCriteria::default())
        .unwrap();
    let started = h.pipeline.get_session(&session_id).unwrap();
    assert_eq!(started.campaign_id, campaign.campaign_id);
    h.pipeline.wait(&session_id).await.unwrap()
}

#[tokio::test]
async fn quota_two_with_five_working_platforms_posts_exactly_twice() {
    let h = harness(
        &[
            ("https://a.blog.test/post", Site::Accepts),
            ("https://b.blog.test/post", Site::Accepts),
            ("https://c.blog.test/post", Site::Accepts),
            ("https://d.blog.test/post", Site::Accepts),
            ("https://e.blog.test/post", Site::Accepts),
        ],
        session_settings(2, 10),
    );
    let campaign = campaign(&h, 2);

    let session = run(&h, &campaign).await;

    assert_eq!(session.status, SessionStatus::Completed);
    assert_eq!(session.progress, 100);
    let report = session.result.expect("completed session carries a report");
    assert_eq!(report.termination, Termination::TargetReached);
    assert_eq!(report.posts_posted, 2);
    let attempts = h.tracker.attempts(&session.session_id).unwrap();
    assert_eq!(attempts.len(), 2);
    assert!(attempts.iter().all(|a| a.outcome == AttemptOutcome::Posted));
    assert_eq!(
        attempts.iter().map(|a| a.sequence).collect::<Vec<_>>(),
        vec![1, 2]
    );

    let stored = h.tracker.campaign(&campaign.campaign_id).unwrap();
    assert_eq!(stored.links_posted, 2);
    assert_eq!(stored.links_found, 2);
    assert_eq!(h.web.submissions().len(), 2);
}

#[tokio::test]
async fn daily_quota_caps_posts_across_sessions_on_the_same_day() {
    let h = harness(
        &[
            ("https://a.blog.test/post", Site::Accepts),
            ("https://b.blog.test/post", Site::Accepts),
            ("https://c.blog.test/post", Site::Accepts),
        ],
        session_settings(2, 10),
    );
    let mut capped = Campaign::new("https://garden-supply.test/raised-beds", 10);
    capped.anchors = vec!["cedar raised beds".into()];
    capped.daily_quota = Some(1);
    let campaign = h.tracker.create_campaign(&capped).unwrap();

    let first = run(&h, &campaign).await;
    assert_eq!(first.status, SessionStatus::Completed);
    assert_eq!(first.result.unwrap().posts_posted, 1);

    for _ in 0..2 {
        let later = run(&h, &campaign).await;
        assert_eq!(later.status, SessionStatus::Completed);
        let report = later.result.unwrap();
        assert_eq!(report.posts_target, 0);
        assert_eq!(report.posts_posted, 0);
        assert!(h.tracker.attempts(&later.session_id).unwrap().is_empty());
    }

    assert_eq!(h.tracker.posted_today(&campaign.campaign_id).unwrap(), 1);
    assert_eq!(h.tracker.campaign(&campaign.campaign_id).unwrap().links_posted, 1);
    assert_eq!(h.web.submissions().len(), 1);
}

#[tokio::test]
async fn default_criteria_follow_the_campaign_category_mix() {
    let h = harness(
        &[("https://a.blog.test/post", Site::Accepts)],
        session_settings(1, 10),
    );
    let mut articles = Campaign::new("https://garden-supply.test/raised-beds", 1);
    articles.categories = vec![PlatformCategory::ArticleApi];
    let campaign = h.tracker.create_campaign(&articles).unwrap();

    let session = run(&h, &campaign).await;

    assert_eq!(session.criteria.categories, vec![PlatformCategory::ArticleApi]);
    assert_eq!(session.status, SessionStatus::Failed);
    assert!(session.error.unwrap().starts_with("exhausted"));
    assert!(h.tracker.attempts(&session.session_id).unwrap().is_empty());
    assert!(h.web.submissions().is_empty());
}

#[tokio::test]
async fn single_platform_exhausts_before_quota() {
    let h = harness(
        &[("https://only.blog.test/post", Site::Accepts)],
        session_settings(2, 10),
    );
    let campaign = campaign(&h, 2);

    let session = run(&h, &campaign).await;

    assert_eq!(session.status, SessionStatus::Failed);
    let error = session.error.expect("failed session carries an error");
    assert!(error.starts_with("exhausted"), "{error}");
    let report = session.result.unwrap();
    assert_eq!(report.termination, Termination::Exhausted);
    assert!(report.posts_posted <= 1);
    assert_eq!(h.tracker.attempts(&session.session_id).unwrap().len(), 1);
}

#[tokio::test]
async fn challenge_on_only_platform_completes_with_review_entry() {
    let h = harness(
        &[("https://guarded.blog.test/post", Site::Challenge)],
        session_settings(2, 10),
    );
    let campaign = campaign(&h, 2);

    let session = run(&h, &campaign).await;

    assert_eq!(session.status, SessionStatus::Completed);
    assert!(session.error.is_none());
    let report = session.result.unwrap();
    assert_eq!(report.posts_posted, 0);
    assert_eq!(report.needs_review, 1);
    assert_eq!(report.review_queue, vec!["https://guarded.blog.test/post"]);
    assert!(h.web.submissions().is_empty());

    let attempts = h.tracker.attempts(&session.session_id).unwrap();
    assert_eq!(attempts.len(), 1);
    assert_eq!(attempts[0].outcome, AttemptOutcome::NeedsReview);
    // needs-review counts against the platform's success rate
    let platform = h.registry.get("guarded.blog.test/post").unwrap();
    assert!((platform.success_rate - 40.0).abs() < 1e-9);
    assert_eq!(platform.times_used, 1);
}

#[tokio::test]
async fn failing_platforms_rotate_without_repeats_until_exhausted() {
    let h = harness(
        &[
            ("https://a.blog.test/post", Site::Rejects),
            ("https://b.blog.test/post", Site::NoForm),
            ("https://c.blog.test/post", Site::Rejects),
            ("https://offline.blog.test/post", Site::Offline),
        ],
        session_settings(2, 10),
    );
    let campaign = campaign(&h, 1);

    let session = run(&h, &campaign).await;

    assert_eq!(session.status, SessionStatus::Failed);
    assert!(session.error.unwrap().starts_with("exhausted"));
    let attempts = h.tracker.attempts(&session.session_id).unwrap();
    assert_eq!(attempts.len(), 4);
    let keys: HashSet<_> = attempts.iter().map(|a| a.platform_key.clone()).collect();
    assert_eq!(keys.len(), attempts.len());
    let no_form = attempts
        .iter()
        .find(|a| a.platform_key == "b.blog.test/post")
        .unwrap();
    assert_eq!(no_form.reason.as_deref(), Some("form not found"));
    let offline = attempts
        .iter()
        .find(|a| a.platform_key == "offline.blog.test/post")
        .unwrap();
    assert_eq!(offline.outcome, AttemptOutcome::Failed);
    assert!(offline
        .reason
        .as_deref()
        .is_some_and(|reason| reason.starts_with("navigation failed")));
    assert_eq!(h.web.pages_opened.load(std::sync::atomic::Ordering::SeqCst), 4);
    assert_eq!(h.web.pages_closed.load(std::sync::atomic::Ordering::SeqCst), 4);
}

#[tokio::test]
async fn attempt_budget_ends_session_as_budget_failure() {
    let h = harness(
        &[
            ("https://a.blog.test/post", Site::Rejects),
            ("https://b.blog.test/post", Site::Rejects),
            ("https://c.blog.test/post", Site::Rejects),
            ("https://d.blog.test/post", Site::Rejects),
        ],
        session_settings(1, 2),
    );
    let campaign = campaign(&h, 1);

    let session = run(&h, &campaign).await;

    assert_eq!(session.status, SessionStatus::Failed);
    assert!(session.error.unwrap().starts_with("budget"));
    let report = session.result.unwrap();
    assert_eq!(report.termination, Termination::Budget);
    assert_eq!(report.attempts_failed, 2);
    assert_eq!(h.tracker.attempts(&session.session_id).unwrap().len(), 2);
}

#[tokio::test]
async fn every_attempt_has_stored_evidence() {
    let h = harness(
        &[
            ("https://a.blog.test/post", Site::Rejects),
            ("https://b.blog.test/post", Site::Accepts),
        ],
        session_settings(1, 10),
    );
    let campaign = campaign(&h, 1);

    let session = run(&h, &campaign).await;

    assert_eq!(session.status, SessionStatus::Completed);
    for attempt in h.tracker.attempts(&session.session_id).unwrap() {
        let path = Url::parse(&attempt.evidence_url)
            .unwrap()
            .to_file_path()
            .unwrap();
        assert!(path.starts_with(&h.evidence_dir));
        assert!(path.exists(), "missing evidence for {}", attempt.platform_key);
        assert!(attempt.content.contains("https://garden-supply.test/raised-beds"));
    }
}

#[tokio::test]
async fn stop_request_pauses_session_without_new_launches() {
    let mut settings = session_settings(1, 10);
    settings.min_attempt_delay_ms = 60_000;
    let h = harness(
        &[
            ("https://a.blog.test/post", Site::Accepts),
            ("https://b.blog.test/post", Site::Accepts),
            ("https://c.blog.test/post", Site::Accepts),
        ],
        settings,
    );
    let campaign = campaign(&h, 3);
    let session_id = h
        .pipeline
        .start_session(&campaign.campaign_id, PlatformCriteria::default())
        .unwrap();
    h.pipeline.stop(&session_id).unwrap();

    let session = h.pipeline.wait(&session_id).await.unwrap();

    assert_eq!(session.status, SessionStatus::Paused);
    assert_eq!(session.result.unwrap().termination, Termination::Stopped);
    assert!(h.tracker.attempts(&session_id).unwrap().len() <= 1);
}

#[tokio::test]
async fn concurrent_sessions_never_share_a_platform_at_the_same_time() {
    let sites = [
        ("https://a.blog.test/post", Site::Accepts),
        ("https://b.blog.test/post", Site::Accepts),
        ("https://c.blog.test/post", Site::Accepts),
    ];
    let h = harness(&sites, session_settings(3, 10));
    let first = campaign(&h, 3);
    let second = campaign(&h, 3);

    let a = h
        .pipeline
        .start_session(&first.campaign_id, PlatformCriteria::default())
        .unwrap();
    let b = h
        .pipeline
        .start_session(&second.campaign_id, PlatformCriteria::default())
        .unwrap();
    let (a, b) = tokio::join!(h.pipeline.wait(&a), h.pipeline.wait(&b));

    for session in [a.unwrap(), b.unwrap()] {
        assert_eq!(session.status, SessionStatus::Completed);
        assert_eq!(session.result.unwrap().posts_posted, 3);
    }
    for (url, _) in sites {
        let key = url.trim_start_matches("https://");
        let platform = h.registry.get(key).unwrap();
        assert_eq!(platform.times_used, 2);
        // two successes from the trusted seed rate of 50
        assert!((platform.success_rate - 68.0).abs() < 1e-9);
    }
}
