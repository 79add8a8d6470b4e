use crate::config::ActorSection;

/// Result of matching page text against the configured phrase lists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub success_phrase: Option<String>,
    pub failure_phrase: Option<String>,
}

impl Classification {
    /// Success needs a success phrase and no failure phrase.
    pub fn is_success(&self) -> bool {
        self.success_phrase.is_some() && self.failure_phrase.is_none()
    }

    pub fn reason(&self) -> String {
        match (&self.success_phrase, &self.failure_phrase) {
            (Some(success), None) => format!("matched \"{success}\""),
            (Some(success), Some(failure)) => {
                format!("ambiguous page: matched \"{success}\" and \"{failure}\"")
            }
            (None, Some(failure)) => format!("failure phrase \"{failure}\""),
            (None, None) => "no success phrase on result page".to_string(),
        }
    }
}

/// Success and failure phrase lists, matched case-insensitively as
/// substrings of the page text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhraseSet {
    success: Vec<String>,
    failure: Vec<String>,
}

impl PhraseSet {
    pub fn new<S, F>(success: S, failure: F) -> Self
    where
        S: IntoIterator,
        S::Item: AsRef<str>,
        F: IntoIterator,
        F::Item: AsRef<str>,
    {
        Self {
            success: normalise(success),
            failure: normalise(failure),
        }
    }

    pub fn from_config(config: &ActorSection) -> Self {
        Self::new(&config.success_phrases, &config.failure_phrases)
    }

    pub fn classify(&self, page_text: &str) -> Classification {
        let text = page_text.to_lowercase();
        Classification {
            success_phrase: first_match(&self.success, &text),
            failure_phrase: first_match(&self.failure, &text),
        }
    }
}

impl Default for PhraseSet {
    fn default() -> Self {
        Self::from_config(&ActorSection::default())
    }
}

fn normalise<I>(phrases: I) -> Vec<String>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    phrases
        .into_iter()
        .map(|phrase| phrase.as_ref().trim().to_lowercase())
        .filter(|phrase| !phrase.is_empty())
        .collect()
}

fn first_match(phrases: &[String], text: &str) -> Option<String> {
    phrases
        .iter()
        .find(|phrase| text.contains(phrase.as_str()))
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_phrase_alone_is_success() {
        let phrases = PhraseSet::default();
        let result = phrases.classify("Your comment is Awaiting Moderation.");
        assert!(result.is_success());
        assert_eq!(result.success_phrase.as_deref(), Some("awaiting moderation"));
    }

    #[test]
    fn both_signals_mean_failure() {
        let phrases = PhraseSet::default();
        let result = phrases.classify("Thank you! An error occurred, please try again.");
        assert!(!result.is_success());
        assert!(result.reason().starts_with("ambiguous page"));
    }

    #[test]
    fn no_signal_is_failure() {
        let phrases = PhraseSet::default();
        let result = phrases.classify("Welcome to the blog");
        assert!(!result.is_success());
        assert_eq!(result.reason(), "no success phrase on result page");
    }

    #[test]
    fn lists_are_injectable() {
        let phrases = PhraseSet::new(["Beitrag gespeichert"], ["Fehler"]);
        assert!(phrases.classify("beitrag gespeichert").is_success());
        assert!(!phrases.classify("Thank you").is_success());
        assert!(!phrases
            .classify("Beitrag gespeichert, Fehler beim Senden")
            .is_success());
    }
}
