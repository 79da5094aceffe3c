//! Stop-sequence detection over streamed text.
//!
//! Only generated text is scanned. Text that could still grow into a stop
//! sequence is held back until it either completes a match or cannot.

use aho_corasick::{AhoCorasick, MatchKind};

use super::error::GenerationError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopOutcome {
    /// Text safe to yield; may be empty while a partial match is pending.
    Emit(String),
    /// A stop sequence matched; carries the text before it.
    Stop(String),
}

pub struct StopMatcher {
    automaton: Option<AhoCorasick>,
    stops: Vec<String>,
    pending: String,
}

impl StopMatcher {
    pub fn new(stops: &[String]) -> Result<Self, GenerationError> {
        let automaton = if stops.is_empty() {
            None
        } else {
            let ac = AhoCorasick::builder()
                .match_kind(MatchKind::LeftmostFirst)
                .build(stops)
                .map_err(|e| GenerationError::InvalidRequest(format!("stop sequences: {e}")))?;
            Some(ac)
        };
        Ok(Self { automaton, stops: stops.to_vec(), pending: String::new() })
    }

    pub fn push(&mut self, text: &str) -> StopOutcome {
        self.pending.push_str(text);
        let Some(ac) = &self.automaton else {
            return StopOutcome::Emit(std::mem::take(&mut self.pending));
        };

        if let Some(m) = ac.find(&self.pending) {
            let before = self.pending[..m.start()].to_string();
            self.pending.clear();
            return StopOutcome::Stop(before);
        }

        let hold = self.partial_suffix_len();
        let ready = self.pending.len() - hold;
        let emit = self.pending[..ready].to_string();
        self.pending.drain(..ready);
        StopOutcome::Emit(emit)
    }

    /// Longest suffix of the pending text that is a proper prefix of a stop
    /// sequence.
    fn partial_suffix_len(&self) -> usize {
        self.stops
            .iter()
            .flat_map(|stop| {
                stop.char_indices()
                    .skip(1)
                    .map(|(i, _)| &stop[..i])
                    .filter(|prefix| self.pending.ends_with(prefix))
                    .map(str::len)
            })
            .max()
            .unwrap_or(0)
    }

    /// Release held-back text at a natural end of generation.
    pub fn flush(&mut self) -> String {
        std::mem::take(&mut self.pending)
    }

    /// Drop held-back text when generation is interrupted.
    pub fn discard(&mut self) {
        self.pending.clear();
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matcher(stops: &[&str]) -> StopMatcher {
        let stops: Vec<String> = stops.iter().map(|s| s.to_string()).collect();
        StopMatcher::new(&stops).unwrap()
    }

    #[test]
    fn passes_through_without_stops() {
        let mut m = matcher(&[]);
        assert_eq!(m.push("abc"), StopOutcome::Emit("abc".into()));
        assert!(!m.has_pending());
    }

    #[test]
    fn matches_across_fragments() {
        let mut m = matcher(&["END"]);
        assert_eq!(m.push("hello E"), StopOutcome::Emit("hello ".into()));
        assert_eq!(m.push("N"), StopOutcome::Emit(String::new()));
        assert_eq!(m.push("D tail"), StopOutcome::Stop(String::new()));
    }

    #[test]
    fn releases_false_prefix() {
        let mut m = matcher(&["END"]);
        assert_eq!(m.push("E"), StopOutcome::Emit(String::new()));
        assert_eq!(m.push("x"), StopOutcome::Emit("Ex".into()));
    }

    #[test]
    fn text_before_match_is_returned() {
        let mut m = matcher(&["\n\n", "###"]);
        assert_eq!(m.push("answer###more"), StopOutcome::Stop("answer".into()));
    }

    #[test]
    fn flush_and_discard() {
        let mut m = matcher(&["stop"]);
        m.push("st");
        assert!(m.has_pending());
        assert_eq!(m.flush(), "st");

        m.push("sto");
        m.discard();
        assert!(!m.has_pending());
    }

    #[test]
    fn multibyte_prefixes_hold_on_char_boundaries() {
        let mut m = matcher(&["éé"]);
        assert_eq!(m.push("aé"), StopOutcome::Emit("a".into()));
        assert_eq!(m.push("é"), StopOutcome::Stop(String::new()));
    }
}
