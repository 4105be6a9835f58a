//! Markdown report generation.
//!
//! The document has a summary table, the answer timeline and a footer.

use std::fmt::Write;

use chrono::{DateTime, Utc};
use quiz_engine::{EndReason, SessionStatus};

use crate::{AttemptEntry, RoundReport};

/// Longest answer shown in the timeline table.
const MAX_ANSWER_DISPLAY_LENGTH: usize = 60;

/// Generates a Markdown document from a [`RoundReport`].
pub struct MarkdownGenerator<'a> {
    report: &'a RoundReport,
}

impl<'a> MarkdownGenerator<'a> {
    /// Creates a new Markdown generator for the given report.
    #[must_use]
    pub const fn new(report: &'a RoundReport) -> Self {
        Self { report }
    }

    /// Generates the complete Markdown report.
    #[must_use]
    pub fn generate(&self) -> String {
        let mut output = String::new();

        self.write_title(&mut output);
        self.write_summary(&mut output);
        self.write_timeline(&mut output);
        Self::write_footer(&mut output);

        output
    }

    fn write_title(&self, output: &mut String) {
        let _ = writeln!(
            output,
            "# Quiz Round Report: {}\n",
            capitalize(self.report.difficulty.as_str())
        );
    }

    fn write_summary(&self, output: &mut String) {
        let summary = &self.report.summary;

        let _ = writeln!(output, "## Summary\n");
        let _ = writeln!(output, "| Metric | Value |");
        let _ = writeln!(output, "|--------|-------|");
        let _ = writeln!(
            output,
            "| Outcome | {} |",
            outcome(self.report.status, self.report.end_reason)
        );
        let _ = writeln!(
            output,
            "| Questions | {} answered of {} |",
            summary.correct,
            summary.total_questions
        );
        let _ = writeln!(
            output,
            "| Answers | {} correct, {} incorrect, {} unverified |",
            summary.correct, summary.incorrect, summary.unverified
        );
        let _ = writeln!(output, "| Accuracy | {:.1}% |", summary.accuracy_percent);
        let _ = writeln!(output, "| XP Earned | {} |", summary.xp_earned);
        let _ = writeln!(
            output,
            "| Time Left | {}s of {}s |",
            summary.seconds_remaining, summary.countdown_total
        );
        let _ = writeln!(
            output,
            "| Duration | {} |",
            format_duration(summary.duration_seconds)
        );
        let _ = writeln!(
            output,
            "| Started | {} |",
            format_timestamp(&summary.started_at)
        );
        let _ = writeln!(output);
    }

    fn write_timeline(&self, output: &mut String) {
        let _ = writeln!(output, "## Answers\n");

        if self.report.timeline.is_empty() {
            let _ = writeln!(output, "*No answers were graded.*\n");
            return;
        }

        let _ = writeln!(output, "| # | Question | Answer | Result | Time Left | XP |");
        let _ = writeln!(output, "|---|----------|--------|--------|-----------|----|");
        for entry in &self.report.timeline {
            Self::write_entry(output, entry);
        }
        let _ = writeln!(output);
    }

    fn write_entry(output: &mut String, entry: &AttemptEntry) {
        let result = if entry.is_correct {
            "✅ Correct"
        } else {
            "❌ Incorrect"
        };
        let _ = writeln!(
            output,
            "| {} | {} | {} | {} | {}s | {} |",
            entry.question_index + 1,
            escape_markdown(&entry.prompt),
            escape_markdown(&truncate(&entry.answer, MAX_ANSWER_DISPLAY_LENGTH)),
            result,
            entry.seconds_remaining,
            entry.xp_awarded
        );
    }

    fn write_footer(output: &mut String) {
        let _ = writeln!(output, "---");
        let timestamp = format_timestamp(&Utc::now());
        let _ = writeln!(output, "*Generated by quiz at {timestamp}*");
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

fn outcome(status: SessionStatus, end_reason: Option<EndReason>) -> String {
    match (status, end_reason) {
        (SessionStatus::Over, Some(EndReason::QuestionsExhausted)) => {
            "🏁 All questions answered".to_string()
        }
        (SessionStatus::Over, Some(EndReason::TimeExpired)) => "⏰ Time expired".to_string(),
        (SessionStatus::Over, Some(EndReason::StrictMiss)) => {
            "💥 Ended on a missed question".to_string()
        }
        (status, _) => format!("In progress ({status})"),
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    chars.next().map_or_else(String::new, |first| {
        first.to_uppercase().chain(chars).collect()
    })
}

/// Formats a duration in seconds, e.g. 65 -> "1m 5s".
fn format_duration(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;

    let mut parts = Vec::new();

    if hours > 0 {
        parts.push(format!("{hours}h"));
    }
    if minutes > 0 {
        parts.push(format!("{minutes}m"));
    }
    if secs > 0 || parts.is_empty() {
        parts.push(format!("{secs}s"));
    }

    parts.join(" ")
}

fn format_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

/// Escapes characters that would break Markdown tables or formatting.
fn escape_markdown(text: &str) -> String {
    let mut result = String::with_capacity(text.len());

    for ch in text.chars() {
        match ch {
            '*' | '_' | '`' | '#' | '[' | ']' | '(' | ')' | '!' | '\\' | '<' | '>' | '|' => {
                result.push('\\');
                result.push(ch);
            }
            '\n' => result.push_str("<br>"),
            _ => result.push(ch),
        }
    }

    result
}

/// Truncates on a character boundary, adding an ellipsis if needed.
fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        let kept: String = text.chars().take(max_chars).collect();
        format!("{kept}...")
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::tests::{played_session, sample_report};
    use crate::RoundReport;

    #[test]
    fn test_markdown_sections() {
        let report = sample_report();
        let markdown = MarkdownGenerator::new(&report).generate();

        assert!(markdown.starts_with("# Quiz Round Report: Basic\n"));
        assert!(markdown.contains("## Summary"));
        assert!(markdown.contains("| Outcome | In progress (running) |"));
        assert!(markdown.contains("| Answers | 2 correct, 1 incorrect, 0 unverified |"));
        assert!(markdown.contains("| Accuracy | 66.7% |"));
        assert!(markdown.contains("| XP Earned | 3750 |"));
        assert!(markdown.contains("| Time Left | 35s of 60s |"));
        assert!(markdown.contains("## Answers"));
        assert!(markdown.contains("*Generated by quiz at"));
    }

    #[test]
    fn test_markdown_timeline_rows() {
        let report = sample_report();
        let markdown = MarkdownGenerator::new(&report).generate();

        assert!(markdown.contains("| 1 | Capital of France? | Lyon | ❌ Incorrect | 40s | 0 |"));
        assert!(markdown.contains("| 1 | Capital of France? | Paris | ✅ Correct | 40s | 2000 |"));
        assert!(markdown.contains("| 2 | Capital of Italy? | Rome | ✅ Correct | 35s | 1750 |"));
    }

    #[test]
    fn test_markdown_finished_round() {
        let mut session = played_session();
        let pending = session.begin_submission().unwrap();
        session.record_verdict(&pending, "Madrid", quiz_engine::AnswerVerdict::CORRECT);

        let report = RoundReport::from_session(&session);
        let markdown = MarkdownGenerator::new(&report).generate();
        assert!(markdown.contains("| Outcome | 🏁 All questions answered |"));
    }

    #[test]
    fn test_markdown_empty_timeline() {
        let mut report = sample_report();
        report.timeline.clear();
        let markdown = MarkdownGenerator::new(&report).generate();
        assert!(markdown.contains("*No answers were graded.*"));
    }

    #[test]
    fn test_outcome_labels() {
        assert_eq!(
            outcome(SessionStatus::Over, Some(EndReason::TimeExpired)),
            "⏰ Time expired"
        );
        assert_eq!(
            outcome(SessionStatus::Over, Some(EndReason::StrictMiss)),
            "💥 Ended on a missed question"
        );
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(0), "0s");
        assert_eq!(format_duration(45), "45s");
        assert_eq!(format_duration(65), "1m 5s");
        assert_eq!(format_duration(3661), "1h 1m 1s");
    }

    #[test]
    fn test_escape_markdown() {
        assert_eq!(escape_markdown("a|b"), "a\\|b");
        assert_eq!(escape_markdown("`&mut T`"), "\\`&mut T\\`");
        assert_eq!(escape_markdown("line1\nline2"), "line1<br>line2");
    }

    #[test]
    fn test_truncate_multibyte() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("ééééé", 3), "ééé...");
    }
}
