//! Rewriter for the calpuff time-variant emission file.
//!
//! The static header spans a comment block whose length the second line
//! declares, one extra line when the projection needs a datum record,
//! then grid and species metadata. The time-variant section is located
//! by counting quote-opened lines: the first `nsou` of them declare the
//! constant source data, so the next one is the first source record and
//! the line before it the first date record. Every block holds one date
//! record and one fixed-column line per source.

use chrono::{DateTime, NaiveDate, Utc};
use log::debug;

use metemis_core::config::{find_source, Source};
use metemis_core::errors::{MetemisError, MetemisResult};
use metemis_core::factor::factor_column;
use metemis_core::met::MetTable;

use crate::cursor::{digit_tokens, parse_float, parse_usize};
use crate::rewriter::{format_exponential, EmissionRewriter};

/// Projections followed by a datum record in the header.
const DATUM_PROJECTIONS: [&str; 3] = ["TTM", "LCC", "LAZA"];

/// Width of the quoted source name field opening every source record.
const NAME_WIDTH: usize = 15;

pub struct Calpuff;

#[derive(Debug)]
struct Layout {
    /// Index of the first date record.
    start: usize,
    nsou: usize,
    species: Vec<String>,
}

impl Calpuff {
    /// Resolve the header geometry and the species list.
    fn layout(lines: &[String]) -> MetemisResult<Layout> {
        let count = lines.get(1).ok_or_else(|| MetemisError::UnexpectedEof {
            line: 2,
            expected: "comment count record".to_string(),
        })?;
        let mut ncomm = parse_usize(count, 2, "comment count")?;
        let projection = lines.get(ncomm).ok_or_else(|| MetemisError::UnexpectedEof {
            line: ncomm + 1,
            expected: "projection record".to_string(),
        })?;
        let proj = projection.split_whitespace().next().unwrap_or("");
        if DATUM_PROJECTIONS.contains(&proj) {
            debug!("projection {proj} carries a datum record");
            ncomm += 1;
        }

        let lineno = ncomm + 9;
        let counts = lines
            .get(ncomm + 8)
            .ok_or_else(|| MetemisError::UnexpectedEof {
                line: lineno,
                expected: "source and species counts".to_string(),
            })?;
        let mut tokens = counts.split_whitespace();
        let nsou = parse_usize(tokens.next().unwrap_or(""), lineno, "source count")?;
        let nspe = parse_usize(tokens.next().unwrap_or(""), lineno, "species count")?;

        let lineno = ncomm + 10;
        let names = lines
            .get(ncomm + 9)
            .ok_or_else(|| MetemisError::UnexpectedEof {
                line: lineno,
                expected: "species name record".to_string(),
            })?;
        let mut species: Vec<String> = names
            .split_whitespace()
            .map(|name| name.replace('\'', ""))
            .collect();
        if species.len() < nspe {
            return Err(MetemisError::BadRecord {
                line: lineno,
                details: format!(
                    "species record lists {} names, expected {nspe}",
                    species.len()
                ),
            });
        }
        species.truncate(nspe);
        debug!("calpuff lists {nsou} sources and species {}", species.join(", "));

        // the (nsou + 1)-th quoted line after the species record is the
        // first time-variant source record
        let mut quoted = 0;
        let mut start = None;
        for (i, line) in lines.iter().enumerate().skip(ncomm + 10) {
            if line.starts_with('\'') {
                quoted += 1;
                if quoted == nsou + 1 {
                    start = Some(i);
                    break;
                }
            }
        }
        let start = start.ok_or_else(|| MetemisError::BadRecord {
            line: lines.len(),
            details: format!(
                "no time-variant section: found {quoted} quoted records, expected {}",
                nsou + 1
            ),
        })?;
        Ok(Layout {
            start: start - 1,
            nsou,
            species,
        })
    }
}

impl EmissionRewriter for Calpuff {
    fn rewrite(
        &self,
        lines: &[String],
        table: &MetTable,
        sources: &[Source],
    ) -> MetemisResult<Vec<String>> {
        let layout = Self::layout(lines)?;
        let mut out: Vec<String> = Vec::with_capacity(lines.len());
        out.extend(lines[..layout.start].iter().cloned());

        let mut pos = layout.start;
        while pos < lines.len() {
            let stamp = block_date(&lines[pos], pos + 1)?;
            out.push(lines[pos].clone());
            pos += 1;
            for _ in 0..layout.nsou {
                let lineno = pos + 1;
                let line = lines.get(pos).ok_or_else(|| MetemisError::UnexpectedEof {
                    line: lineno,
                    expected: "calpuff source record".to_string(),
                })?;
                out.push(rewrite_source_line(
                    line,
                    lineno,
                    stamp,
                    &layout.species,
                    table,
                    sources,
                )?);
                pos += 1;
            }
        }
        Ok(out)
    }
}

/// Date record of a time-variant block: year, day of year, hour and
/// minute as bare digit tokens.
fn block_date(line: &str, lineno: usize) -> MetemisResult<DateTime<Utc>> {
    let tokens = digit_tokens(line);
    if tokens.len() < 4 {
        return Err(MetemisError::BadRecord {
            line: lineno,
            details: format!("expected 4 date tokens in '{line}'"),
        });
    }
    let date = NaiveDate::from_yo_opt(tokens[0] as i32, tokens[1] as u32)
        .and_then(|d| d.and_hms_opt(tokens[2] as u32, tokens[3] as u32, 0))
        .ok_or_else(|| MetemisError::BadRecord {
            line: lineno,
            details: format!("invalid block date in '{line}'"),
        })?;
    Ok(date.and_utc())
}

fn rewrite_source_line(
    line: &str,
    lineno: usize,
    stamp: DateTime<Utc>,
    species: &[String],
    table: &MetTable,
    sources: &[Source],
) -> MetemisResult<String> {
    let name_field = line.get(..NAME_WIDTH).ok_or_else(|| MetemisError::BadRecord {
        line: lineno,
        details: format!("source record shorter than the {NAME_WIDTH} character name field"),
    })?;
    let name = name_field
        .split('\'')
        .nth(1)
        .ok_or_else(|| MetemisError::BadRecord {
            line: lineno,
            details: format!("no quoted source name in '{name_field}'"),
        })?;
    let Some(source) = find_source(sources, name) else {
        return Ok(line.to_string());
    };

    let tokens: Vec<&str> = line
        .get(NAME_WIDTH + 1..)
        .unwrap_or("")
        .split_whitespace()
        .collect();
    if tokens.len() != species.len() + 4 {
        return Err(MetemisError::BadRecord {
            line: lineno,
            details: format!(
                "expected {} numeric fields, found {}",
                species.len() + 4,
                tokens.len()
            ),
        });
    }
    let (leading, masses) = tokens.split_at(4);

    let mut rewritten = format!(
        "{:<15} {:3.2} {:1.2} {:1.1} {:1.1}",
        name_field,
        parse_float(leading[0], lineno, "source field")?,
        parse_float(leading[1], lineno, "source field")?,
        parse_float(leading[2], lineno, "source field")?,
        parse_float(leading[3], lineno, "source field")?,
    );
    for (spe, baseline) in species.iter().zip(masses) {
        let factor = table.factor_at(stamp, &factor_column(&source.id, spe))?;
        let mass = if source.scheme.is_ratio() {
            parse_float(baseline, lineno, "species mass")? * factor
        } else {
            factor
        };
        rewritten.push(' ');
        rewritten.push_str(&format_exponential(mass, 7));
    }
    Ok(rewritten)
}
