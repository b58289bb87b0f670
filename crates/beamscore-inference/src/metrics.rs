//! Counters collected while searching.

/// Search statistics for one batch, or summed over many.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchMetrics {
    /// Lockstep decoding steps.
    pub steps: usize,
    /// Batched calls into inference ports.
    pub port_calls: usize,
    /// Candidate extensions considered.
    pub expansions: usize,
    /// Candidates discarded by pruning.
    pub pruned: usize,
    /// Examples stopped because no live hypothesis could beat the finished set.
    pub early_stops: usize,
    /// Hypotheses finished at the length limit without an end token.
    pub forced_finishes: usize,
    /// Examples that failed with a decoding error.
    pub failures: usize,
    /// Wall-clock search time in milliseconds.
    pub search_time_ms: f64,
}

impl SearchMetrics {
    pub fn merge(&mut self, other: &Self) {
        self.steps += other.steps;
        self.port_calls += other.port_calls;
        self.expansions += other.expansions;
        self.pruned += other.pruned;
        self.early_stops += other.early_stops;
        self.forced_finishes += other.forced_finishes;
        self.failures += other.failures;
        self.search_time_ms += other.search_time_ms;
    }
}
