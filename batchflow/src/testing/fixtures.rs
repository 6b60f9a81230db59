//! Employee datasets for pipeline tests.

use crate::batch::{write_rows, Employee};
use crate::errors::BatchflowError;
use std::path::{Path, PathBuf};

/// Header line of every employee CSV.
pub const EMPLOYEE_HEADER: &str = "id,name,age,city,salary,department";

const DEPARTMENTS: [&str; 3] = ["IT", "Sales", "HR"];
const CITIES: [&str; 4] = ["Moscow", "Kazan", "Perm", "Omsk"];

/// Builds `total` employees, the first `high_earners` of them above the
/// high-earner threshold.
#[must_use]
pub fn employees(total: usize, high_earners: usize) -> Vec<Employee> {
    (0..total)
        .map(|i| {
            let salary = if i < high_earners {
                75_000.0 + 1_000.0 * f64::from(u32::try_from(i).unwrap_or(0))
            } else {
                45_000.0
            };
            Employee {
                id: u64::try_from(i + 1).unwrap_or(u64::MAX),
                name: format!("Employee {}", i + 1),
                age: 25 + u32::try_from(i % 30).unwrap_or(0),
                city: CITIES[i % CITIES.len()].to_string(),
                salary,
                department: DEPARTMENTS[i % DEPARTMENTS.len()].to_string(),
            }
        })
        .collect()
}

/// Ten employees, four of them high earners.
#[must_use]
pub fn sample_employees() -> Vec<Employee> {
    employees(10, 4)
}

/// Writes `rows` to `dir/name` and returns the path.
///
/// # Errors
///
/// Returns an error if the file cannot be written.
pub fn write_employee_csv(
    dir: &Path,
    name: &str,
    rows: &[Employee],
) -> Result<PathBuf, BatchflowError> {
    let path = dir.join(name);
    write_rows(&path, rows)?;
    Ok(path)
}

/// Writes raw CSV text to `dir/name` and returns the path.
///
/// # Errors
///
/// Returns an error if the file cannot be written.
pub fn write_raw_csv(dir: &Path, name: &str, content: &str) -> Result<PathBuf, BatchflowError> {
    let path = dir.join(name);
    std::fs::write(&path, content)?;
    Ok(path)
}
