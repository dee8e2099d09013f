//! Run-level state machine and progress reporting.
//!
//! A run moves through the phases in order. From any phase before rendering it
//! may jump straight to [`ResearchPhase::Render`] once the deadline passes.

use crate::types::{ResearchMode, SynthesisTier};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

/// Current phase of a research run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResearchPhase {
    Decompose,
    Gather,
    Dedup,
    Cluster,
    Contradict,
    Synthesize,
    Render,
    Done,
}

impl ResearchPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            ResearchPhase::Decompose => "decompose",
            ResearchPhase::Gather => "gather",
            ResearchPhase::Dedup => "dedup",
            ResearchPhase::Cluster => "cluster",
            ResearchPhase::Contradict => "contradict",
            ResearchPhase::Synthesize => "synthesize",
            ResearchPhase::Render => "render",
            ResearchPhase::Done => "done",
        }
    }

    /// Fraction of the run completed on entering this phase.
    pub fn progress(self) -> f32 {
        match self {
            ResearchPhase::Decompose => 0.05,
            ResearchPhase::Gather => 0.15,
            ResearchPhase::Dedup => 0.45,
            ResearchPhase::Cluster => 0.5,
            ResearchPhase::Contradict => 0.6,
            ResearchPhase::Synthesize => 0.7,
            ResearchPhase::Render => 0.95,
            ResearchPhase::Done => 1.0,
        }
    }
}

impl fmt::Display for ResearchPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Callback trait for progressive research updates.
pub trait ResearchCallback: Send + Sync {
    /// Called when the research phase changes.
    fn on_phase_change(&self, phase: &str, progress: f32);
    /// Called when one theme's evidence gathering finishes.
    fn on_theme_complete(&self, question: &str, evidence_found: usize);
    /// Called for each contradiction statement kept.
    fn on_contradiction_found(&self, statement: &str);
    /// Called after each synthesis tier is attempted.
    fn on_synthesis_tier(&self, tier: SynthesisTier, succeeded: bool);
}

/// Ignores every update.
pub struct NoOpResearchCallback;

impl ResearchCallback for NoOpResearchCallback {
    fn on_phase_change(&self, _phase: &str, _progress: f32) {}
    fn on_theme_complete(&self, _question: &str, _evidence_found: usize) {}
    fn on_contradiction_found(&self, _statement: &str) {}
    fn on_synthesis_tier(&self, _tier: SynthesisTier, _succeeded: bool) {}
}

/// Tracks one run through its phases.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchSession {
    pub id: Uuid,
    pub question: String,
    pub mode: ResearchMode,
    pub phase: ResearchPhase,
    pub progress: f32,
    /// Set when the run jumped to rendering because of the deadline.
    pub terminated_early: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ResearchSession {
    pub fn new(question: impl Into<String>, mode: ResearchMode) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            question: question.into(),
            mode,
            phase: ResearchPhase::Decompose,
            progress: ResearchPhase::Decompose.progress(),
            terminated_early: false,
            created_at: now,
            updated_at: now,
        }
    }

    /// Move to `phase` and notify the callback. Backward moves are ignored.
    pub fn transition(&mut self, phase: ResearchPhase, callback: &dyn ResearchCallback) {
        if phase < self.phase {
            return;
        }
        self.phase = phase;
        self.progress = phase.progress();
        self.updated_at = Utc::now();
        info!(run = %self.id, phase = %phase, progress = self.progress, "Research phase");
        callback.on_phase_change(phase.as_str(), self.progress);
    }

    /// Jump to rendering because the deadline passed.
    pub fn terminate_early(&mut self, callback: &dyn ResearchCallback) {
        info!(run = %self.id, from = %self.phase, "Run deadline exceeded, skipping to render");
        self.terminated_early = true;
        self.transition(ResearchPhase::Render, callback);
    }

    pub fn is_active(&self) -> bool {
        self.phase != ResearchPhase::Done
    }
}

/// Shared handle the engine falls back to when no callback is supplied.
pub fn noop_callback() -> Arc<dyn ResearchCallback> {
    Arc::new(NoOpResearchCallback)
}
