//! Selection/termination request and result types.

use std::collections::BTreeSet;

/// Per-turn context the scoring function and termination check consult.
#[derive(Debug, Clone, Default)]
pub struct SelectionContext {
    /// Terms extracted from the task/last message, for expertise matching.
    pub task_terms: BTreeSet<String>,
    /// Tools the task is expected to need.
    pub required_tools: BTreeSet<String>,
    /// Whether this turn counts as a "complex" task for admission purposes —
    /// when true, the designated master coordinator is always included and
    /// selected first.
    pub is_complex: bool,
}

/// Why the conversation was marked complete.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationReason {
    /// `max_turns` was reached.
    MaxTurns,
    /// The last turn contained an explicit completion marker.
    CompletionMarker,
    /// The circuit breaker opened.
    CircuitOpen,
    /// No candidate scored above zero.
    NoCandidate,
}

/// Keywords that mark a turn as an explicit completion signal.
pub const COMPLETION_KEYWORDS: &[&str] = &["complete", "done", "finished", "ready"];

/// `true` if `text` contains one of [`COMPLETION_KEYWORDS`] as a whole word
/// (case-insensitive).
pub fn contains_completion_marker(text: &str) -> bool {
    let lower = text.to_lowercase();
    lower
        .split(|c: char| !c.is_alphanumeric())
        .any(|word| COMPLETION_KEYWORDS.contains(&word))
}
