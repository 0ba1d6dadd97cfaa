use crate::{
    expr::KeyExpression,
    model::IndexModel,
    planner::rank::RankComparisons,
    query::RecordQuery,
};

///
/// PlanContext
///
/// Immutable per-call context: the query, the candidate indexes (readable,
/// allowed, sorted by name), and the common primary key of the targeted
/// record types.
///

#[derive(Debug)]
pub(crate) struct PlanContext<'a> {
    pub(crate) query: &'a RecordQuery,
    pub(crate) indexes: Vec<&'a IndexModel>,
    pub(crate) common_primary_key: Option<KeyExpression>,
    /// Grouped-aggregate planning scans repeated entries one at a time, so
    /// fan-out does not count as duplication there.
    pub(crate) allow_duplicates: bool,
}

///
/// CandidateScan
///
/// One matching attempt: the context, the rank comparisons extracted from
/// the filter being planned, the candidate index (or none for a record
/// scan), and the scan direction.
///

#[derive(Clone, Copy, Debug)]
pub(crate) struct CandidateScan<'a> {
    pub(crate) context: &'a PlanContext<'a>,
    pub(crate) rank_comparisons: &'a RankComparisons,
    pub(crate) index: Option<&'a IndexModel>,
    pub(crate) reverse: bool,
}

impl<'a> CandidateScan<'a> {
    pub(crate) const fn new(
        context: &'a PlanContext<'a>,
        rank_comparisons: &'a RankComparisons,
        index: Option<&'a IndexModel>,
        reverse: bool,
    ) -> Self {
        Self {
            context,
            rank_comparisons,
            index,
            reverse,
        }
    }
}
