//! Per-run call budgets and the wall-clock deadline.
//!
//! A [`RunBudget`] is created for exactly one pipeline run. Counters are
//! atomics so the concurrent gatherer tasks of that run can share it by
//! reference; it is never shared between runs.

use crate::config::BudgetProfile;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// The three classes of external provider a run may call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderClass {
    /// Web search (URL, title, snippet, date results).
    Search,
    /// Answer engine returning prose plus citation URLs.
    Answer,
    /// General language-model call, optionally with structured output.
    LanguageModel,
}

impl ProviderClass {
    pub const ALL: [ProviderClass; 3] = [Self::Search, Self::Answer, Self::LanguageModel];

    fn index(self) -> usize {
        match self {
            Self::Search => 0,
            Self::Answer => 1,
            Self::LanguageModel => 2,
        }
    }

    /// Stable lowercase name, also used as the cache category directory.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Search => "search",
            Self::Answer => "answer",
            Self::LanguageModel => "language_model",
        }
    }
}

impl fmt::Display for ProviderClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Call counts per provider class.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallCounts {
    pub search: usize,
    pub answer: usize,
    pub language_model: usize,
}

impl CallCounts {
    pub fn get(&self, class: ProviderClass) -> usize {
        match class {
            ProviderClass::Search => self.search,
            ProviderClass::Answer => self.answer,
            ProviderClass::LanguageModel => self.language_model,
        }
    }

    pub fn total(&self) -> usize {
        self.search + self.answer + self.language_model
    }
}

/// Hard call ceilings plus deadline for a single run.
pub struct RunBudget {
    ceilings: [usize; 3],
    used: [AtomicUsize; 3],
    started_at: Instant,
    deadline: Instant,
    premium_tier: bool,
}

impl RunBudget {
    /// Create a budget from a mode profile, starting the deadline clock now.
    pub fn new(profile: &BudgetProfile) -> Self {
        Self::with_deadline(profile, Duration::from_secs(profile.deadline_secs))
    }

    /// Create a budget with an explicit runtime cap instead of the profile's.
    pub fn with_deadline(profile: &BudgetProfile, cap: Duration) -> Self {
        let started_at = Instant::now();
        Self {
            ceilings: [
                profile.max_search_calls,
                profile.max_answer_calls,
                profile.max_language_model_calls,
            ],
            used: [AtomicUsize::new(0), AtomicUsize::new(0), AtomicUsize::new(0)],
            started_at,
            deadline: started_at + cap,
            premium_tier: profile.allow_premium_tier,
        }
    }

    /// Atomically claim one call of `class`. Returns `false` when the ceiling
    /// has been reached; the counter is left untouched in that case.
    pub fn try_consume(&self, class: ProviderClass) -> bool {
        let ceiling = self.ceilings[class.index()];
        self.used[class.index()]
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |used| {
                (used < ceiling).then_some(used + 1)
            })
            .is_ok()
    }

    /// Calls of `class` still available. Does not consume anything.
    pub fn remaining(&self, class: ProviderClass) -> usize {
        self.ceilings[class.index()].saturating_sub(self.used[class.index()].load(Ordering::Acquire))
    }

    pub fn has_remaining(&self, class: ProviderClass) -> bool {
        self.remaining(class) > 0
    }

    pub fn ceiling(&self, class: ProviderClass) -> usize {
        self.ceilings[class.index()]
    }

    pub fn deadline_exceeded(&self) -> bool {
        Instant::now() >= self.deadline
    }

    /// Time left before the deadline, zero once it has passed.
    pub fn time_remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Whether the higher-cost answer tier may be used in this run.
    pub fn allows_premium_tier(&self) -> bool {
        self.premium_tier
    }

    /// Snapshot of the calls made so far.
    pub fn usage(&self) -> CallCounts {
        CallCounts {
            search: self.used[0].load(Ordering::Acquire),
            answer: self.used[1].load(Ordering::Acquire),
            language_model: self.used[2].load(Ordering::Acquire),
        }
    }
}

impl fmt::Debug for RunBudget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunBudget")
            .field("ceilings", &self.ceilings)
            .field("usage", &self.usage())
            .field("time_remaining", &self.time_remaining())
            .field("premium_tier", &self.premium_tier)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BudgetConfig;
    use std::sync::Arc;

    fn profile(search: usize, answer: usize, llm: usize) -> BudgetProfile {
        BudgetProfile {
            max_search_calls: search,
            max_answer_calls: answer,
            max_language_model_calls: llm,
            deadline_secs: 60,
            allow_premium_tier: false,
        }
    }

    #[test]
    fn test_try_consume_stops_at_ceiling() {
        let budget = RunBudget::new(&profile(2, 1, 0));
        assert!(budget.try_consume(ProviderClass::Search));
        assert!(budget.try_consume(ProviderClass::Search));
        assert!(!budget.try_consume(ProviderClass::Search));
        assert_eq!(budget.usage().search, 2);

        assert!(budget.try_consume(ProviderClass::Answer));
        assert!(!budget.try_consume(ProviderClass::Answer));
        assert!(!budget.try_consume(ProviderClass::LanguageModel));
        assert_eq!(budget.usage().language_model, 0);
    }

    #[test]
    fn test_remaining_is_a_peek() {
        let budget = RunBudget::new(&profile(3, 0, 0));
        assert_eq!(budget.remaining(ProviderClass::Search), 3);
        assert_eq!(budget.remaining(ProviderClass::Search), 3);
        budget.try_consume(ProviderClass::Search);
        assert_eq!(budget.remaining(ProviderClass::Search), 2);
        assert!(!budget.has_remaining(ProviderClass::Answer));
    }

    #[test]
    fn test_zero_deadline_is_exceeded() {
        let budget = RunBudget::with_deadline(&profile(1, 1, 1), Duration::ZERO);
        assert!(budget.deadline_exceeded());
        assert_eq!(budget.time_remaining(), Duration::ZERO);
    }

    #[test]
    fn test_fresh_budget_not_exceeded() {
        let budget = RunBudget::new(&profile(1, 1, 1));
        assert!(!budget.deadline_exceeded());
        assert!(budget.time_remaining() > Duration::from_secs(50));
    }

    #[test]
    fn test_deep_profile_doubles_provider_calls() {
        let config = BudgetConfig::default();
        let standard = RunBudget::new(&config.standard);
        let deep = RunBudget::new(&config.deep);
        assert_eq!(
            deep.ceiling(ProviderClass::Search),
            standard.ceiling(ProviderClass::Search) * 2
        );
        assert_eq!(
            deep.ceiling(ProviderClass::Answer),
            standard.ceiling(ProviderClass::Answer) * 2
        );
        assert!(deep.allows_premium_tier());
        assert!(!standard.allows_premium_tier());
    }

    #[test]
    fn test_concurrent_consumers_never_exceed_ceiling() {
        let budget = Arc::new(RunBudget::new(&profile(50, 0, 0)));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let budget = Arc::clone(&budget);
                std::thread::spawn(move || {
                    (0..20)
                        .filter(|_| budget.try_consume(ProviderClass::Search))
                        .count()
                })
            })
            .collect();

        let granted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(granted, 50);
        assert_eq!(budget.usage().search, 50);
    }

    #[test]
    fn test_provider_class_display() {
        assert_eq!(ProviderClass::Search.to_string(), "search");
        assert_eq!(ProviderClass::LanguageModel.to_string(), "language_model");
    }
}
