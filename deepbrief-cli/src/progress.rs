//! Stderr progress reporting for a research run.

use deepbrief_core::ResearchCallback;
use deepbrief_core::types::SynthesisTier;
use std::io::Write;

/// Prints pipeline progress to stderr. Silent when `quiet` is set.
pub struct StderrProgress {
    quiet: bool,
}

impl StderrProgress {
    pub fn new(quiet: bool) -> Self {
        Self { quiet }
    }

    fn line(&self, text: &str) {
        if self.quiet {
            return;
        }
        let mut stderr = std::io::stderr().lock();
        let _ = writeln!(stderr, "{text}");
    }
}

pub(crate) fn phase_line(phase: &str, progress: f32) -> String {
    let percent = (progress.clamp(0.0, 1.0) * 100.0).round() as u32;
    format!("[{percent:>3}%] {phase}")
}

pub(crate) fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let cut: String = text.chars().take(max_chars.saturating_sub(3)).collect();
    format!("{cut}...")
}

impl ResearchCallback for StderrProgress {
    fn on_phase_change(&self, phase: &str, progress: f32) {
        self.line(&phase_line(phase, progress));
    }

    fn on_theme_complete(&self, question: &str, evidence_found: usize) {
        self.line(&format!(
            "       theme done ({evidence_found} sources): {}",
            truncate(question, 70)
        ));
    }

    fn on_contradiction_found(&self, statement: &str) {
        self.line(&format!("       tension: {}", truncate(statement, 90)));
    }

    fn on_synthesis_tier(&self, tier: SynthesisTier, succeeded: bool) {
        let status = if succeeded { "ok" } else { "unavailable" };
        self.line(&format!("       synthesis {tier}: {status}"));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_line_formats_percent() {
        assert_eq!(phase_line("gather", 0.15), "[ 15%] gather");
        assert_eq!(phase_line("done", 1.0), "[100%] done");
        assert_eq!(phase_line("odd", 7.0), "[100%] odd");
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("ééééééééééé", 6), "ééé...");
    }
}
