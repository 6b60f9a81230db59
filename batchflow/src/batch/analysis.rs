//! Salary statistics and the branching predicate.

use super::Employee;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Salary above which an employee counts as a high earner.
pub const HIGH_EARNER_THRESHOLD: f64 = 60_000.0;

/// More high earners than this sends the run down the high-earner branch.
pub const PROCESSING_MIN_HIGH_EARNERS: usize = 3;

/// Returns true for salaries strictly above [`HIGH_EARNER_THRESHOLD`].
#[must_use]
pub fn is_high_earner(employee: &Employee) -> bool {
    employee.salary > HIGH_EARNER_THRESHOLD
}

/// Statistics over the whole dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisSummary {
    /// Number of rows.
    pub total_records: usize,
    /// Mean salary.
    pub avg_salary: f64,
    /// Highest salary.
    pub max_salary: f64,
    /// Lowest salary.
    pub min_salary: f64,
    /// Employees per department.
    pub departments: BTreeMap<String, usize>,
    /// Employees per city.
    pub cities: BTreeMap<String, usize>,
    /// Number of high earners.
    pub high_earners: usize,
    /// Whether the high-earner branch should run.
    pub needs_processing: bool,
}

impl AnalysisSummary {
    /// Computes the summary. An empty slice yields zeroed statistics.
    #[must_use]
    pub fn from_rows(rows: &[Employee]) -> Self {
        let high_earners = rows.iter().filter(|e| is_high_earner(e)).count();
        Self {
            total_records: rows.len(),
            avg_salary: mean_salary(rows).unwrap_or_default(),
            max_salary: rows.iter().map(|e| e.salary).reduce(f64::max).unwrap_or_default(),
            min_salary: rows.iter().map(|e| e.salary).reduce(f64::min).unwrap_or_default(),
            departments: count_by(rows, |e| &e.department),
            cities: count_by(rows, |e| &e.city),
            high_earners,
            needs_processing: high_earners > PROCESSING_MIN_HIGH_EARNERS,
        }
    }
}

/// Mean salary, or `None` for no rows.
#[must_use]
pub fn mean_salary(rows: &[Employee]) -> Option<f64> {
    if rows.is_empty() {
        return None;
    }
    #[allow(clippy::cast_precision_loss)]
    let count = rows.len() as f64;
    Some(rows.iter().map(|e| e.salary).sum::<f64>() / count)
}

/// Counts rows per value of `key`.
pub fn count_by<F>(rows: &[Employee], key: F) -> BTreeMap<String, usize>
where
    F: Fn(&Employee) -> &String,
{
    let mut counts = BTreeMap::new();
    for row in rows {
        *counts.entry(key(row).clone()).or_insert(0) += 1;
    }
    counts
}
