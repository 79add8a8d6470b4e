use std::collections::HashSet;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::SessionSection;
use crate::content::{ContentContext, ContentGenerator};
use crate::posting::{ActorStep, AttemptRequest, PostingActor};
use crate::registry::{Platform, PlatformRegistry, SelectionOutcome};
use crate::session::{
    AttemptOutcome, Campaign, PosterIdentity, PostingAttempt, Session, SessionError,
    SessionReport, SessionTracker, Termination,
};

use super::error::{PipelineError, PipelineResult};
use super::gate::PlatformGate;

/// Drives one session: selects platforms, fans attempts out, folds their
/// outcomes into the registry and the session record. Cheap to clone; every
/// clone shares the same registry, actor and gate.
#[derive(Clone)]
pub struct SessionRunner {
    registry: Arc<PlatformRegistry>,
    tracker: SessionTracker,
    generator: Arc<ContentGenerator>,
    actor: Arc<PostingActor>,
    gate: Arc<PlatformGate>,
    settings: SessionSection,
}

/// Per-session state shared with the attempt tasks.
struct AttemptScope {
    session_id: String,
    campaign: Campaign,
    identity: PosterIdentity,
    progress: ProgressReporter,
}

impl SessionRunner {
    pub fn new(
        registry: Arc<PlatformRegistry>,
        tracker: SessionTracker,
        generator: Arc<ContentGenerator>,
        actor: Arc<PostingActor>,
        gate: Arc<PlatformGate>,
        settings: SessionSection,
    ) -> Self {
        Self {
            registry,
            tracker,
            generator,
            actor,
            gate,
            settings,
        }
    }

    pub fn tracker(&self) -> &SessionTracker {
        &self.tracker
    }

    pub fn registry(&self) -> &Arc<PlatformRegistry> {
        &self.registry
    }

    /// Runs the session to a terminal state and returns the final snapshot.
    /// A stop request prevents new launches; attempts already in flight
    /// finish normally.
    pub async fn run(
        &self,
        session: Session,
        campaign: Campaign,
        mut stop: watch::Receiver<bool>,
    ) -> PipelineResult<Session> {
        let session_id = session.session_id.clone();
        let (campaign, posted_today) = match self.refresh_quota(&campaign.campaign_id) {
            Ok(current) => current,
            Err(err) => {
                if let Err(fail_err) = self.tracker.fail(&session_id, &err.to_string()) {
                    warn!(session = %session_id, error = %fail_err, "failed to mark session failed");
                }
                return Err(err);
            }
        };
        let target = campaign.remaining_quota(posted_today);
        let budget = self.settings.attempt_budget;
        let fan_out = self.settings.fan_out.max(1);
        let spacing = Duration::from_millis(self.settings.min_attempt_delay_ms);
        let scope = Arc::new(AttemptScope {
            session_id: session_id.clone(),
            identity: campaign.identity.clone().unwrap_or_default(),
            progress: ProgressReporter::new(self.tracker.clone(), &session_id, session.progress),
            campaign,
        });
        info!(
            session = %session_id,
            campaign = %scope.campaign.campaign_id,
            target,
            posted_today,
            budget,
            fan_out,
            providers = ?self.generator.provider_names(),
            "session run started"
        );

        let mut exclude: HashSet<String> = HashSet::new();
        let mut tally = Tally::default();
        let mut in_flight: JoinSet<PipelineResult<PostingAttempt>> = JoinSet::new();
        let mut halted: Option<Termination> = None;
        let mut fatal: Option<PipelineError> = None;
        let mut next_launch = Instant::now();

        loop {
            while halted.is_none()
                && fatal.is_none()
                && tally.posted as usize + in_flight.len() < target as usize
                && in_flight.len() < fan_out
            {
                if *stop.borrow() {
                    halted = Some(Termination::Stopped);
                    break;
                }
                if tally.launched >= budget {
                    halted = Some(Termination::Budget);
                    break;
                }
                let criteria = session.criteria.to_selection(exclude.clone());
                let platform = match self.registry.select_platform(&criteria).await {
                    Ok(SelectionOutcome::Selected(platform)) => platform,
                    Ok(SelectionOutcome::Exhausted) => {
                        halted = Some(Termination::Exhausted);
                        break;
                    }
                    Ok(SelectionOutcome::NoneAvailable) => {
                        halted = Some(Termination::NoneAvailable);
                        break;
                    }
                    Err(err) => {
                        fatal = Some(err.into());
                        break;
                    }
                };
                tokio::select! {
                    _ = sleep_until(next_launch) => {}
                    Ok(()) = stop.changed() => {}
                }
                if *stop.borrow() {
                    halted = Some(Termination::Stopped);
                    break;
                }
                next_launch = Instant::now() + spacing;
                exclude.insert(platform.key.clone());
                let variation = tally.launched;
                tally.launched += 1;
                scope.progress.step(&format!("selected {}", platform.key));
                debug!(
                    session = %session_id,
                    platform = %platform.key,
                    launched = tally.launched,
                    in_flight = in_flight.len(),
                    "launching attempt"
                );
                in_flight.spawn(self.clone().attempt(Arc::clone(&scope), platform, variation));
            }

            let Some(joined) = in_flight.join_next().await else {
                break;
            };
            match joined {
                Ok(Ok(attempt)) => {
                    tally.absorb(&attempt);
                    scope.progress.advance(
                        tally.percent(target, budget),
                        &format!("{}: {}", attempt.platform_key, attempt.outcome),
                    );
                }
                Ok(Err(err)) => {
                    warn!(session = %session_id, error = %err, "attempt could not be recorded");
                    if fatal.is_none() {
                        fatal = Some(err);
                    }
                }
                Err(err) => {
                    warn!(session = %session_id, error = %err, "attempt task aborted");
                    tally.failed += 1;
                }
            }
        }

        if let Some(err) = fatal {
            let report = tally.report(halted.unwrap_or(Termination::Stopped), target);
            if let Err(fail_err) = self
                .tracker
                .fail_with_report(&session_id, &err.to_string(), &report)
            {
                warn!(session = %session_id, error = %fail_err, "failed to mark session failed");
            }
            return Err(err);
        }

        let termination = match halted {
            _ if tally.posted >= target => Termination::TargetReached,
            Some(reason) => reason,
            None => Termination::TargetReached,
        };
        let report = tally.report(termination, target);
        self.tracker
            .record_session_totals(&scope.campaign.campaign_id, &report)?;
        let finished = self.finish(&session_id, &report)?;
        info!(
            session = %session_id,
            status = %finished.status,
            termination = %termination,
            posted = report.posts_posted,
            needs_review = report.needs_review,
            failed = report.attempts_failed,
            "session run finished"
        );
        Ok(finished)
    }

    /// Current campaign totals and the posts already made today.
    fn refresh_quota(&self, campaign_id: &str) -> PipelineResult<(Campaign, u32)> {
        let campaign = self.tracker.campaign(campaign_id)?;
        let posted_today = self.tracker.posted_today(campaign_id)?;
        Ok((campaign, posted_today))
    }

    /// Only posted attempts count toward the target. Running out of
    /// platforms or budget completes the session when work is waiting in
    /// the review queue, and fails it otherwise.
    fn finish(&self, session_id: &str, report: &SessionReport) -> PipelineResult<Session> {
        let session = match report.termination {
            Termination::TargetReached => self.tracker.complete(session_id, report)?,
            Termination::Stopped => self.tracker.pause(session_id, report)?,
            Termination::Exhausted | Termination::NoneAvailable | Termination::Budget
                if report.needs_review > 0 =>
            {
                self.tracker.complete(session_id, report)?
            }
            Termination::Exhausted => self.tracker.fail_with_report(
                session_id,
                &format!(
                    "exhausted: no unused eligible platform left after {} attempts ({} of {} posted)",
                    report.posts_found, report.posts_posted, report.posts_target
                ),
                report,
            )?,
            Termination::NoneAvailable => self.tracker.fail_with_report(
                session_id,
                "exhausted: no active platform matches the session criteria",
                report,
            )?,
            Termination::Budget => self.tracker.fail_with_report(
                session_id,
                &format!(
                    "budget: {} attempts used, {} of {} posted",
                    report.posts_found, report.posts_posted, report.posts_target
                ),
                report,
            )?,
        };
        Ok(session)
    }

    async fn attempt(
        self,
        scope: Arc<AttemptScope>,
        platform: Platform,
        variation: u32,
    ) -> PipelineResult<PostingAttempt> {
        let _turn = self.gate.enter(&platform.key).await;

        let context = ContentContext::from_campaign(&scope.campaign, variation);
        let content = self.generator.generate_for(&platform, &context).await;
        let attempt_id = format!("att-{}", Uuid::new_v4().simple());
        let request = AttemptRequest {
            session_id: &scope.session_id,
            attempt_id: &attempt_id,
            platform: &platform,
            content: &content,
            identity: &scope.identity,
        };
        let progress = &scope.progress;
        let key = platform.key.as_str();
        let observer = |step: ActorStep| progress.step(&format!("{key}: {step}"));
        let report = self.actor.attempt(&request, &observer).await;

        self.registry
            .record_outcome(&platform.key, report.outcome)
            .await?;
        let attempt = PostingAttempt {
            attempt_id,
            session_id: scope.session_id.clone(),
            sequence: 0,
            platform_key: platform.key.clone(),
            target_url: platform.url.clone(),
            content: content.text,
            content_provider: content.provider,
            outcome: report.outcome,
            reason: Some(report.reason),
            evidence_url: report.evidence_url,
            recorded_at: Utc::now(),
        };
        Ok(self.tracker.append_attempt(&attempt)?)
    }
}

#[derive(Debug, Default)]
struct Tally {
    launched: u32,
    posted: u32,
    needs_review: u32,
    failed: u32,
    review_queue: Vec<String>,
    posted_urls: Vec<String>,
}

impl Tally {
    fn absorb(&mut self, attempt: &PostingAttempt) {
        match attempt.outcome {
            AttemptOutcome::Posted => {
                self.posted += 1;
                self.posted_urls.push(attempt.target_url.clone());
            }
            AttemptOutcome::NeedsReview => {
                self.needs_review += 1;
                self.review_queue.push(attempt.target_url.clone());
            }
            AttemptOutcome::Failed => self.failed += 1,
        }
    }

    fn completed(&self) -> u32 {
        self.posted + self.needs_review + self.failed
    }

    fn percent(&self, target: u32, budget: u32) -> u8 {
        let by_target = if target == 0 {
            100
        } else {
            self.posted as u64 * 100 / target as u64
        };
        let by_budget = if budget == 0 {
            100
        } else {
            self.completed() as u64 * 100 / budget as u64
        };
        by_target.max(by_budget).min(99) as u8
    }

    fn report(&self, termination: Termination, target: u32) -> SessionReport {
        SessionReport {
            termination,
            posts_target: target,
            posts_found: self.launched,
            posts_posted: self.posted,
            needs_review: self.needs_review,
            attempts_failed: self.failed,
            review_queue: self.review_queue.clone(),
            posted_urls: self.posted_urls.clone(),
        }
    }
}

/// Keeps reported progress monotonic while attempts report concurrently.
/// Terminal transitions set 100; running sessions stay at 99 or below.
struct ProgressReporter {
    tracker: SessionTracker,
    session_id: String,
    percent: AtomicU8,
}

impl ProgressReporter {
    fn new(tracker: SessionTracker, session_id: &str, start: u8) -> Self {
        Self {
            tracker,
            session_id: session_id.to_string(),
            percent: AtomicU8::new(start.min(99)),
        }
    }

    fn advance(&self, percent: u8, label: &str) {
        let percent = percent.min(99);
        let current = self.percent.fetch_max(percent, Ordering::SeqCst).max(percent);
        match self
            .tracker
            .report_progress(&self.session_id, current, label)
        {
            Ok(_) => {}
            // A concurrent attempt already reported a later value.
            Err(SessionError::ProgressRegression { .. }) => {}
            Err(err) => warn!(session = %self.session_id, error = %err, "progress update failed"),
        }
    }

    fn step(&self, label: &str) {
        self.advance(self.percent.load(Ordering::SeqCst), label);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attempt(outcome: AttemptOutcome, url: &str) -> PostingAttempt {
        PostingAttempt {
            attempt_id: "att-1".into(),
            session_id: "ses-1".into(),
            sequence: 1,
            platform_key: "blog.test".into(),
            target_url: url.into(),
            content: "text".into(),
            content_provider: "template".into(),
            outcome,
            reason: None,
            evidence_url: "file:///tmp/e.png".into(),
            recorded_at: Utc::now(),
        }
    }

    #[test]
    fn tally_routes_outcomes_into_report() {
        let mut tally = Tally {
            launched: 3,
            ..Tally::default()
        };
        tally.absorb(&attempt(AttemptOutcome::Posted, "https://a.test/"));
        tally.absorb(&attempt(AttemptOutcome::NeedsReview, "https://b.test/"));
        tally.absorb(&attempt(AttemptOutcome::Failed, "https://c.test/"));
        let report = tally.report(Termination::Exhausted, 2);
        assert_eq!(report.posts_found, 3);
        assert_eq!(report.posts_posted, 1);
        assert_eq!(report.needs_review, 1);
        assert_eq!(report.attempts_failed, 1);
        assert_eq!(report.review_queue, vec!["https://b.test/"]);
        assert_eq!(report.posted_urls, vec!["https://a.test/"]);
    }

    #[test]
    fn percent_stays_below_terminal_value() {
        let mut tally = Tally::default();
        assert_eq!(tally.percent(2, 10), 0);
        tally.absorb(&attempt(AttemptOutcome::Posted, "https://a.test/"));
        assert_eq!(tally.percent(2, 10), 50);
        tally.absorb(&attempt(AttemptOutcome::Posted, "https://b.test/"));
        assert_eq!(tally.percent(2, 10), 99);
        assert_eq!(Tally::default().percent(0, 0), 99);
    }
}
