use serde::{Deserialize, Serialize};

/// Default limit on the structural complexity of generated plans.
pub const DEFAULT_COMPLEXITY_THRESHOLD: usize = 3000;

/// Default budget for disjunctive-normal-form expansion, in terms.
pub const DEFAULT_DNF_TERM_BUDGET: usize = 1000;

/// Default width bound for single-step AND-over-OR distribution.
pub const DEFAULT_OR_DISTRIBUTION_LIMIT: usize = 32;

/// Default bound on per-source IN-union width.
pub const DEFAULT_IN_UNION_MAX_SIZE: usize = 10;

///
/// IndexScanPreference
///
/// Tie-break between a record scan and an index scan that satisfies no
/// additional conditions. Scanning without an index is cheaper but must skip
/// over unrelated record types, so multi-type stores prefer an index.
///

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub enum IndexScanPreference {
    PreferIndex,
    #[default]
    PreferScan,
    /// Prefer an index only when it is on exactly the primary key.
    PreferPrimaryKeyIndex,
}

///
/// PlannerConfiguration
///
/// Immutable per-planner options. Passed by value; no process-wide state.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct PlannerConfiguration {
    pub index_scan_preference: IndexScanPreference,
    pub complexity_threshold: usize,
    /// On a sort-incompatible IN, rewrite the IN back into an explicit OR.
    pub attempt_failed_in_join_as_or: bool,
    /// On a sort-incompatible IN, build an IN-union instead.
    pub attempt_failed_in_join_as_union: bool,
    pub attempt_failed_in_union_max_size: usize,
    /// Enable the substitution visitors that defer record fetches above
    /// unions and intersections of covering scans.
    pub defer_fetch_after_union_and_intersection: bool,
    /// Partition residuals into index-covered filters vs record filters.
    pub optimize_for_index_filters: bool,
    /// Give special (non-value, non-rank, non-text) indexes a chance to
    /// claim the whole filter before normal matching.
    pub plan_other_attempt_whole_filter: bool,
    /// Append primary-key columns to value-index keys for matching.
    pub use_full_key_for_value_index: bool,
    /// Permit an in-memory sort operator when no index realizes the sort.
    pub allow_in_memory_sort: bool,
    pub dnf_term_budget: usize,
    pub or_distribution_limit: usize,
}

impl Default for PlannerConfiguration {
    fn default() -> Self {
        Self {
            index_scan_preference: IndexScanPreference::PreferScan,
            complexity_threshold: DEFAULT_COMPLEXITY_THRESHOLD,
            attempt_failed_in_join_as_or: true,
            attempt_failed_in_join_as_union: false,
            attempt_failed_in_union_max_size: DEFAULT_IN_UNION_MAX_SIZE,
            defer_fetch_after_union_and_intersection: false,
            optimize_for_index_filters: false,
            plan_other_attempt_whole_filter: false,
            use_full_key_for_value_index: true,
            allow_in_memory_sort: false,
            dnf_term_budget: DEFAULT_DNF_TERM_BUDGET,
            or_distribution_limit: DEFAULT_OR_DISTRIBUTION_LIMIT,
        }
    }
}

impl PlannerConfiguration {
    #[must_use]
    pub const fn with_index_scan_preference(mut self, preference: IndexScanPreference) -> Self {
        self.index_scan_preference = preference;
        self
    }

    #[must_use]
    pub const fn with_complexity_threshold(mut self, threshold: usize) -> Self {
        self.complexity_threshold = threshold;
        self
    }

    #[must_use]
    pub const fn with_attempt_failed_in_join_as_or(mut self, attempt: bool) -> Self {
        self.attempt_failed_in_join_as_or = attempt;
        self
    }

    #[must_use]
    pub const fn with_attempt_failed_in_join_as_union(mut self, attempt: bool) -> Self {
        self.attempt_failed_in_join_as_union = attempt;
        self
    }

    #[must_use]
    pub const fn with_in_union_max_size(mut self, max_size: usize) -> Self {
        self.attempt_failed_in_union_max_size = max_size;
        self
    }

    #[must_use]
    pub const fn with_defer_fetch_after_union_and_intersection(mut self, defer: bool) -> Self {
        self.defer_fetch_after_union_and_intersection = defer;
        self
    }

    #[must_use]
    pub const fn with_optimize_for_index_filters(mut self, optimize: bool) -> Self {
        self.optimize_for_index_filters = optimize;
        self
    }

    #[must_use]
    pub const fn with_plan_other_attempt_whole_filter(mut self, attempt: bool) -> Self {
        self.plan_other_attempt_whole_filter = attempt;
        self
    }

    #[must_use]
    pub const fn with_use_full_key_for_value_index(mut self, use_full_key: bool) -> Self {
        self.use_full_key_for_value_index = use_full_key;
        self
    }

    #[must_use]
    pub const fn with_allow_in_memory_sort(mut self, allow: bool) -> Self {
        self.allow_in_memory_sort = allow;
        self
    }

    #[must_use]
    pub const fn with_dnf_term_budget(mut self, budget: usize) -> Self {
        self.dnf_term_budget = budget;
        self
    }

    #[must_use]
    pub const fn with_or_distribution_limit(mut self, limit: usize) -> Self {
        self.or_distribution_limit = limit;
        self
    }
}
