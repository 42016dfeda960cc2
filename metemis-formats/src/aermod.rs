//! Rewriter for aermod hourly emission records.
//!
//! Records are whitespace separated: two keyword fields, the two-digit
//! year, month, day and 1-24 hour, the source id and then the emission
//! rate. Governed records have the rate rescaled with the factor of the
//! source's first configured species, looked up at the closing stamp of
//! the emission hour. The file, a DOS artifact, keeps carriage return
//! line endings on every output line.

use chrono::{DateTime, Duration, NaiveDate, Utc};

use metemis_core::config::{find_source, Source};
use metemis_core::errors::{MetemisError, MetemisResult};
use metemis_core::factor::factor_column;
use metemis_core::met::MetTable;

use crate::cursor::parse_float;
use crate::rewriter::{format_exponential, EmissionRewriter};

/// Token index of the source id.
const SOURCE_FIELD: usize = 6;
/// Token index of the emission rate.
const RATE_FIELD: usize = 7;

pub struct Aermod;

impl EmissionRewriter for Aermod {
    fn rewrite(
        &self,
        lines: &[String],
        table: &MetTable,
        sources: &[Source],
    ) -> MetemisResult<Vec<String>> {
        let mut out = Vec::with_capacity(lines.len());
        for (i, line) in lines.iter().enumerate() {
            let lineno = i + 1;
            let tokens: Vec<&str> = line.split_whitespace().collect();
            if tokens.len() <= RATE_FIELD {
                out.push(line.clone());
                continue;
            }
            let Some(source) = find_source(sources, tokens[SOURCE_FIELD]) else {
                out.push(line.clone());
                continue;
            };
            let stamp = hour_end(&tokens, lineno)?;
            let factor = table.factor_at(stamp, &factor_column(&source.id, &source.species[0]))?;
            let mass = if source.scheme.is_ratio() {
                parse_float(tokens[RATE_FIELD], lineno, "emission rate")? * factor
            } else {
                factor
            };
            let mut rebuilt: Vec<String> = tokens.iter().map(|token| token.to_string()).collect();
            rebuilt[RATE_FIELD] = format_exponential(mass, 7);
            out.push(rebuilt.join(" "));
        }
        Ok(out)
    }

    fn line_ending(&self) -> &'static str {
        "\r\n"
    }
}

/// Closing timestamp of the emission hour: the record carries the hour
/// as 1-24, so the start is hour minus one and the stamp one hour on.
fn hour_end(tokens: &[&str], lineno: usize) -> MetemisResult<DateTime<Utc>> {
    let number = |pos: usize, what: &str| -> MetemisResult<u32> {
        tokens[pos].parse().map_err(|_| MetemisError::BadRecord {
            line: lineno,
            details: format!("invalid {what} field '{}'", tokens[pos]),
        })
    };
    let (year, month, day) = (number(2, "year")?, number(3, "month")?, number(4, "day")?);
    let hour = number(5, "hour")?;
    if !(1..=24).contains(&hour) {
        return Err(MetemisError::BadRecord {
            line: lineno,
            details: format!("hour field {hour} outside 1-24"),
        });
    }
    let start = NaiveDate::from_ymd_opt(2000 + year as i32, month, day)
        .and_then(|d| d.and_hms_opt(hour - 1, 0, 0))
        .ok_or_else(|| MetemisError::BadRecord {
            line: lineno,
            details: format!("invalid date fields {year:02} {month:02} {day:02}"),
        })?;
    Ok(start.and_utc() + Duration::hours(1))
}
