//! Rewriter for the impact semicolon-separated emission table.
//!
//! The single header row names a `DATEDEB` timestamp column, a `SRCEID`
//! source column and one `Q_{species}` column per emitted species. Rows
//! of governed sources get the quantity cells of their governed species
//! rewritten in place; every other cell, row and the column order are
//! preserved untouched.

use chrono::{DateTime, NaiveDateTime, Utc};

use metemis_core::config::{find_source, Source};
use metemis_core::errors::{MetemisError, MetemisResult};
use metemis_core::factor::factor_column;
use metemis_core::met::MetTable;

use crate::cursor::parse_float;
use crate::rewriter::{format_exponential, EmissionRewriter};

const DATE_FORMAT: &str = "%d-%m-%Y %H:%M:%S";

pub struct Impact;

impl EmissionRewriter for Impact {
    fn rewrite(
        &self,
        lines: &[String],
        table: &MetTable,
        sources: &[Source],
    ) -> MetemisResult<Vec<String>> {
        let header = lines.first().ok_or_else(|| MetemisError::UnexpectedEof {
            line: 1,
            expected: "impact header row".to_string(),
        })?;
        let columns: Vec<&str> = header.split(';').collect();
        let position = |wanted: &str| {
            columns
                .iter()
                .position(|name| name.trim() == wanted)
                .ok_or_else(|| MetemisError::BadRecord {
                    line: 1,
                    details: format!("impact header has no '{wanted}' column"),
                })
        };
        let date_col = position("DATEDEB")?;
        let source_col = position("SRCEID")?;
        let quantity_cols: Vec<(usize, String)> = columns
            .iter()
            .enumerate()
            .filter_map(|(i, name)| {
                name.trim()
                    .strip_prefix("Q_")
                    .map(|species| (i, species.to_string()))
            })
            .collect();

        let mut out = Vec::with_capacity(lines.len());
        out.push(header.clone());
        for (i, line) in lines.iter().enumerate().skip(1) {
            let lineno = i + 1;
            if line.trim().is_empty() {
                out.push(line.clone());
                continue;
            }
            let cells: Vec<&str> = line.split(';').collect();
            if cells.len() != columns.len() {
                return Err(MetemisError::BadRecord {
                    line: lineno,
                    details: format!(
                        "expected {} semicolon separated cells, found {}",
                        columns.len(),
                        cells.len()
                    ),
                });
            }
            let Some(source) = find_source(sources, cells[source_col].trim()) else {
                out.push(line.clone());
                continue;
            };
            let stamp = row_date(cells[date_col], lineno)?;
            let mut rebuilt: Vec<String> = cells.iter().map(|cell| cell.to_string()).collect();
            for (col, species) in &quantity_cols {
                if !source.species.contains(species) {
                    continue;
                }
                let factor = table.factor_at(stamp, &factor_column(&source.id, species))?;
                let mass = if source.scheme.is_ratio() {
                    parse_float(cells[*col], lineno, "emission quantity")? * factor
                } else {
                    factor
                };
                rebuilt[*col] = format_exponential(mass, 7);
            }
            out.push(rebuilt.join(";"));
        }
        Ok(out)
    }
}

fn row_date(cell: &str, lineno: usize) -> MetemisResult<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(cell.trim(), DATE_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|_| MetemisError::BadRecord {
            line: lineno,
            details: format!("invalid DATEDEB value '{}'", cell.trim()),
        })
}
