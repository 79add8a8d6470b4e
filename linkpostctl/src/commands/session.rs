use clap::{Args, Subcommand};
use linkpost_core::registry::PlatformCategory;
use linkpost_core::session::{PlatformCriteria, PostingAttempt, Session};

use super::platform::parse_category;
use crate::{format_timestamp, DisplayFallback};

#[derive(Subcommand, Debug)]
pub enum SessionCommands {
    /// Start a posting session and wait for it to finish
    Run(SessionRunArgs),
    /// Show the stored state of a session
    Show { session_id: String },
    /// List the attempts recorded for a session
    Attempts { session_id: String },
    /// List sessions, optionally for one campaign
    List {
        #[arg(long)]
        campaign: Option<String>,
    },
}

#[derive(Args, Debug)]
pub struct SessionRunArgs {
    #[arg(long)]
    pub campaign: String,
    /// Restrict selection to these categories; defaults to the campaign's
    #[arg(long = "category", value_parser = parse_category)]
    pub categories: Vec<PlatformCategory>,
    #[arg(long, default_value_t = 0)]
    pub min_authority: u8,
}

impl SessionRunArgs {
    pub fn criteria(&self) -> PlatformCriteria {
        PlatformCriteria {
            min_authority: self.min_authority,
            categories: self.categories.clone(),
        }
    }
}

impl DisplayFallback for Session {
    fn display(&self) -> String {
        let mut lines = vec![
            format!(
                "{} [{}] {}% ({})",
                self.session_id, self.status, self.progress, self.current_step
            ),
            format!("  campaign: {}", self.campaign_id),
            format!(
                "  started: {} | completed: {}",
                format_timestamp(Some(self.started_at)),
                format_timestamp(self.completed_at)
            ),
        ];
        if let Some(report) = &self.result {
            lines.push(format!(
                "  {}: posted {}/{} from {} attempts ({} failed, {} for review)",
                report.termination,
                report.posts_posted,
                report.posts_target,
                report.posts_found,
                report.attempts_failed,
                report.needs_review
            ));
            for url in &report.posted_urls {
                lines.push(format!("  posted: {url}"));
            }
            for url in &report.review_queue {
                lines.push(format!("  review: {url}"));
            }
        }
        if let Some(error) = &self.error {
            lines.push(format!("  error: {error}"));
        }
        lines.join("\n")
    }
}

impl DisplayFallback for Vec<Session> {
    fn display(&self) -> String {
        if self.is_empty() {
            return "No sessions".to_string();
        }
        self.iter()
            .map(|session| {
                format!(
                    "{} | {} | {} | {}%",
                    session.session_id, session.campaign_id, session.status, session.progress
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl DisplayFallback for Vec<PostingAttempt> {
    fn display(&self) -> String {
        if self.is_empty() {
            return "No attempts recorded".to_string();
        }
        self.iter()
            .map(|attempt| {
                let reason = attempt.reason.as_deref().unwrap_or("-");
                format!(
                    "#{} {} | {} | {} | via {} | {}",
                    attempt.sequence,
                    attempt.platform_key,
                    attempt.outcome,
                    reason,
                    attempt.content_provider,
                    attempt.evidence_url
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}
