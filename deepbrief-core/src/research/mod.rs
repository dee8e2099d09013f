//! The evidence research pipeline.
//!
//! A run moves through these stages:
//! 1. **Decompose** the query into themes
//! 2. **Gather** evidence per theme, concurrently
//! 3. **Dedup** evidence by canonical URL
//! 4. **Cluster** evidence into named groups
//! 5. **Contradict** the strongest clusters
//! 6. **Synthesize** a report through a fallback chain
//! 7. **Render** the report as Markdown
//!
//! Every provider call goes through a per-run [`context::RunContext`] that
//! enforces the call budget and deadline and consults the shared cache.

pub mod clustering;
pub mod context;
pub mod contradiction;
pub mod decomposition;
pub mod dedup;
pub mod engine;
pub mod extract;
pub mod gather;
pub mod output;
pub mod prompts;
pub mod session;
pub mod synthesis;
pub mod text;

pub use context::{CallTimeouts, RunContext};
pub use dedup::{canonicalize_url, dedup};
pub use engine::{ResearchEngine, ResearchOutcome};
pub use extract::{extract_json_array, extract_json_object};
pub use output::{RenderedReport, ReportRenderer};
pub use session::{NoOpResearchCallback, ResearchCallback, ResearchPhase, ResearchSession};
pub use synthesis::{SynthesisStrategy, Synthesizer};
