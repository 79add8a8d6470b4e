use std::time::Duration;

use rand::{thread_rng, Rng};
use tokio::time::sleep;

use crate::config::ActorSection;

/// Randomised delays between form interactions.
#[derive(Debug, Clone)]
pub struct HumanPacing {
    field_delay_ms: [u64; 2],
    keystroke_delay_ms: [u64; 2],
    chunk_chars: [usize; 2],
}

impl HumanPacing {
    pub fn new(field_delay_ms: [u64; 2], keystroke_delay_ms: [u64; 2]) -> Self {
        Self {
            field_delay_ms: ordered(field_delay_ms),
            keystroke_delay_ms: ordered(keystroke_delay_ms),
            chunk_chars: [6, 18],
        }
    }

    pub fn from_config(config: &ActorSection) -> Self {
        Self::new(config.field_delay_ms, config.keystroke_delay_ms)
    }

    /// No delays at all; used by tests and dry runs.
    pub fn instant() -> Self {
        Self::new([0, 0], [0, 0])
    }

    pub fn field_delay(&self) -> Duration {
        random_duration(self.field_delay_ms)
    }

    pub async fn between_fields(&self) {
        let delay = self.field_delay();
        if !delay.is_zero() {
            sleep(delay).await;
        }
    }

    /// Upper bound on the pauses `typing_plan` can add for this text.
    pub fn typing_budget(&self, text: &str) -> Duration {
        let chars = text.chars().count();
        let min_chunk = self.chunk_chars[0].max(1);
        let chunks = (chars + min_chunk - 1) / min_chunk;
        Duration::from_millis(chunks as u64 * self.keystroke_delay_ms[1])
    }

    /// Splits text into typing bursts, each followed by a short pause.
    pub fn typing_plan(&self, text: &str) -> Vec<(String, Duration)> {
        let chars: Vec<char> = text.chars().collect();
        let mut rng = thread_rng();
        let mut plan = Vec::new();
        let mut start = 0;
        while start < chars.len() {
            let size = rng.gen_range(self.chunk_chars[0]..=self.chunk_chars[1]);
            let end = (start + size).min(chars.len());
            let chunk: String = chars[start..end].iter().collect();
            let pause = rng.gen_range(self.keystroke_delay_ms[0]..=self.keystroke_delay_ms[1]);
            plan.push((chunk, Duration::from_millis(pause)));
            start = end;
        }
        plan
    }
}

impl Default for HumanPacing {
    fn default() -> Self {
        Self::from_config(&ActorSection::default())
    }
}

fn ordered(bounds: [u64; 2]) -> [u64; 2] {
    [bounds[0].min(bounds[1]), bounds[0].max(bounds[1])]
}

fn random_duration(bounds: [u64; 2]) -> Duration {
    let ms = thread_rng().gen_range(bounds[0]..=bounds[1]);
    Duration::from_millis(ms)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typing_plan_preserves_text() {
        let pacing = HumanPacing::new([10, 20], [5, 9]);
        let text = "Great post about löwenzahn tea, thanks!";
        let plan = pacing.typing_plan(text);
        let joined: String = plan.iter().map(|(chunk, _)| chunk.as_str()).collect();
        assert_eq!(joined, text);
        assert!(plan
            .iter()
            .all(|(_, pause)| (5..=9).contains(&(pause.as_millis() as u64))));
    }

    #[test]
    fn reversed_bounds_are_normalised() {
        let pacing = HumanPacing::new([900, 100], [0, 0]);
        let delay = pacing.field_delay().as_millis() as u64;
        assert!((100..=900).contains(&delay));
        assert!(HumanPacing::instant().field_delay().is_zero());
    }
}
