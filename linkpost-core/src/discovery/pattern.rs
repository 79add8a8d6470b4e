use std::collections::HashSet;

use async_trait::async_trait;
use regex::Regex;

use crate::config::PatternSection;
use crate::registry::{PlatformCandidate, PlatformCategory, PlatformTrust};

use super::error::DiscoveryResult;
use super::CandidateSource;

/// Enumerates host × path combinations configured per category. Paths may
/// carry numeric ranges such as `/guestbook/page-{1..20}`. Every candidate
/// is provisional.
#[derive(Debug, Clone)]
pub struct PatternSource {
    patterns: Vec<PatternSection>,
    range: Regex,
}

impl PatternSource {
    pub fn new(patterns: Vec<PatternSection>) -> DiscoveryResult<Self> {
        Ok(Self {
            patterns,
            range: Regex::new(r"\{(\d+)\.\.(\d+)\}")?,
        })
    }

    pub fn enumerate(&self, category: PlatformCategory, limit: usize) -> Vec<PlatformCandidate> {
        let mut seen = HashSet::new();
        let mut candidates = Vec::new();
        for pattern in self.patterns.iter().filter(|p| p.category == category) {
            for host in &pattern.hosts {
                for path in &pattern.paths {
                    let mut paths = Vec::new();
                    self.expand(path, limit.saturating_sub(candidates.len()), &mut paths);
                    for path in paths {
                        if candidates.len() >= limit {
                            return candidates;
                        }
                        let url = join_url(host, &path);
                        if !seen.insert(url.clone()) {
                            continue;
                        }
                        let mut candidate = PlatformCandidate::new(url, category);
                        candidate.mechanism = pattern.mechanism;
                        candidate.authority_estimate = pattern.authority_estimate;
                        candidate.trust = PlatformTrust::Provisional;
                        candidate.source = Some("pattern".into());
                        candidates.push(candidate);
                    }
                }
            }
        }
        candidates
    }

    fn expand(&self, path: &str, limit: usize, out: &mut Vec<String>) {
        if out.len() >= limit {
            return;
        }
        let Some(caps) = self.range.captures(path) else {
            out.push(path.to_string());
            return;
        };
        let (Some(whole), Some(start), Some(end)) = (caps.get(0), caps.get(1), caps.get(2)) else {
            out.push(path.to_string());
            return;
        };
        let (Ok(start), Ok(end)) = (start.as_str().parse::<u64>(), end.as_str().parse::<u64>())
        else {
            out.push(path.to_string());
            return;
        };
        let (low, high) = (start.min(end), start.max(end));
        for n in low..=high {
            if out.len() >= limit {
                break;
            }
            let next = format!("{}{n}{}", &path[..whole.start()], &path[whole.end()..]);
            self.expand(&next, limit, out);
        }
    }
}

fn join_url(host: &str, path: &str) -> String {
    let host = host.trim().trim_end_matches('/');
    let base = if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("https://{host}")
    };
    if path.is_empty() || path.starts_with('/') {
        format!("{base}{path}")
    } else {
        format!("{base}/{path}")
    }
}

#[async_trait]
impl CandidateSource for PatternSource {
    fn name(&self) -> &str {
        "pattern"
    }

    async fn candidates(
        &self,
        category: PlatformCategory,
        limit: usize,
    ) -> DiscoveryResult<Vec<PlatformCandidate>> {
        Ok(self.enumerate(category, limit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::AutomationMechanism;

    fn pattern(hosts: &[&str], paths: &[&str]) -> PatternSection {
        PatternSection {
            category: PlatformCategory::CommentForm,
            mechanism: AutomationMechanism::FormSubmission,
            hosts: hosts.iter().map(|h| h.to_string()).collect(),
            paths: paths.iter().map(|p| p.to_string()).collect(),
            authority_estimate: Some(80),
        }
    }

    #[test]
    fn expands_hosts_paths_and_ranges_up_to_limit() {
        let source = PatternSource::new(vec![pattern(
            &["blog.example.org", "https://notes.example.net/"],
            &["/guestbook/page-{1..3}"],
        )])
        .unwrap();
        let all = source.enumerate(PlatformCategory::CommentForm, 100);
        let urls: Vec<_> = all.iter().map(|c| c.url.as_str()).collect();
        assert_eq!(
            urls,
            vec![
                "https://blog.example.org/guestbook/page-1",
                "https://blog.example.org/guestbook/page-2",
                "https://blog.example.org/guestbook/page-3",
                "https://notes.example.net/guestbook/page-1",
                "https://notes.example.net/guestbook/page-2",
                "https://notes.example.net/guestbook/page-3",
            ]
        );
        assert!(all.iter().all(|c| c.trust == PlatformTrust::Provisional));

        assert_eq!(source.enumerate(PlatformCategory::CommentForm, 4).len(), 4);
        assert!(source.enumerate(PlatformCategory::ArticleApi, 10).is_empty());
    }

    #[test]
    fn huge_ranges_stop_at_limit() {
        let source =
            PatternSource::new(vec![pattern(&["forum.test"], &["t/{1..1000000}"])]).unwrap();
        let urls = source.enumerate(PlatformCategory::CommentForm, 2);
        assert_eq!(urls.len(), 2);
        assert_eq!(urls[1].url, "https://forum.test/t/2");
    }
}
