//! Module: scan
//! Responsibility: scan-bound algebra shared by plans and the matcher.
//! Does not own: key encoding or scan execution.

mod comparisons;

pub use comparisons::ScanComparisons;
