//! Cron expression shape check
//!
//! Only the field count is checked. Range and syntax checks for the
//! individual fields belong to the execution engine that interprets them.

use crate::error::{Error, Result};

/// Schedule assigned to sites created from the definition catalog
pub const DEFAULT_CRON: &str = "*/30 * * * *";

/// Number of whitespace-separated fields in an accepted expression
pub const CRON_FIELDS: usize = 5;

/// The five fields of a cron expression, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CronFields<'a> {
    pub minute: &'a str,
    pub hour: &'a str,
    pub day_of_month: &'a str,
    pub month: &'a str,
    pub day_of_week: &'a str,
}

/// Split an expression into its five fields
pub fn parse(expr: &str) -> Result<CronFields<'_>> {
    let fields: Vec<&str> = expr.split_whitespace().collect();

    match fields[..] {
        [minute, hour, day_of_month, month, day_of_week] => Ok(CronFields {
            minute,
            hour,
            day_of_month,
            month,
            day_of_week,
        }),
        _ => Err(Error::validation(
            "cron",
            format!(
                "expected {CRON_FIELDS} fields, found {} in '{expr}'",
                fields.len()
            ),
        )),
    }
}

/// Accept an expression iff it has exactly five fields
pub fn validate(expr: &str) -> Result<()> {
    parse(expr).map(|_| ())
}
