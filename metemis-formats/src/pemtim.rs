//! Rewriter for the pemtim emission file of the spray model.
//!
//! A pemtim starts with a six line header whose second line counts the
//! sources and whose sixth carries the reference date. Each source
//! block then holds a header line with the source id, a period count
//! line, and per period a time record advancing the running date plus
//! one '#'-delimited record per species. The first period additionally
//! carries two or three description lines, selected by a flag on the
//! first of them. The species records of governed sources are rewritten
//! with the factor looked up at the period start; everything else,
//! including the blocks of sources the configuration does not mention,
//! is copied through byte for byte.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use log::debug;

use metemis_core::config::{find_source, Source};
use metemis_core::errors::{MetemisError, MetemisResult};
use metemis_core::factor::factor_column;
use metemis_core::met::MetTable;

use crate::cursor::{digit_tokens, hash_field, parse_float, parse_int, parse_usize, LineCursor};
use crate::rewriter::{format_exponential, EmissionRewriter};

const HEADER_LINES: usize = 6;

/// The pemtim rewriter, carrying the species list of the pemspe
/// reference file.
#[derive(Debug)]
pub struct Pemtim {
    species: Vec<String>,
}

impl Pemtim {
    /// Parse the pemspe sidecar and check every configured species
    /// against its reference list.
    pub fn from_pemspe(pemspe: &str, sources: &[Source]) -> MetemisResult<Self> {
        let lines: Vec<&str> = pemspe.lines().collect();
        let count = lines.get(1).ok_or_else(|| MetemisError::UnexpectedEof {
            line: 2,
            expected: "pemspe species count".to_string(),
        })?;
        let nspe = parse_usize(count, 2, "species count")?;
        let mut species = Vec::with_capacity(nspe);
        for k in 0..nspe {
            let lineno = 4 + k;
            let line = lines
                .get(3 + k)
                .ok_or_else(|| MetemisError::UnexpectedEof {
                    line: lineno,
                    expected: "pemspe species record".to_string(),
                })?;
            let name = line
                .split('*')
                .nth(1)
                .ok_or_else(|| MetemisError::BadRecord {
                    line: lineno,
                    details: format!("no '*' delimited species name in '{line}'"),
                })?;
            species.push(name.replace(' ', ""));
        }
        debug!("pemspe lists {} species: {}", species.len(), species.join(", "));
        for source in sources {
            for spe in &source.species {
                if !species.contains(spe) {
                    return Err(MetemisError::SpeciesNotInReference {
                        source_id: source.id.clone(),
                        species: spe.clone(),
                    });
                }
            }
        }
        Ok(Pemtim { species })
    }
}

impl EmissionRewriter for Pemtim {
    fn rewrite(
        &self,
        lines: &[String],
        table: &MetTable,
        sources: &[Source],
    ) -> MetemisResult<Vec<String>> {
        let mut cursor = LineCursor::new(lines);
        let mut out = Vec::with_capacity(lines.len());

        let mut header = Vec::with_capacity(HEADER_LINES);
        for _ in 0..HEADER_LINES {
            header.push(cursor.take("pemtim header line")?);
        }
        let nsou = parse_usize(
            header[1].split_whitespace().next().unwrap_or(""),
            2,
            "source count",
        )?;
        let refdate = reference_date(header[5])?;
        debug!("pemtim has {nsou} sources, reference date {refdate}");
        out.extend(header.iter().map(|line| line.to_string()));

        for _ in 0..nsou {
            self.rewrite_source_block(&mut cursor, &mut out, refdate, table, sources)?;
        }
        // content after the last source block is preserved
        out.extend(cursor.rest().iter().cloned());
        Ok(out)
    }
}

impl Pemtim {
    fn rewrite_source_block(
        &self,
        cursor: &mut LineCursor<'_>,
        out: &mut Vec<String>,
        refdate: DateTime<Utc>,
        table: &MetTable,
        sources: &[Source],
    ) -> MetemisResult<()> {
        let lineno = cursor.lineno();
        let header = cursor.take("source header")?;
        let id = hash_field(header, 2, lineno)?.trim().to_string();
        out.push(header.to_string());

        let lineno = cursor.lineno();
        let periods = cursor.take("period count record")?;
        let nper = parse_usize(hash_field(periods, 0, lineno)?, lineno, "period count")?;
        out.push(periods.to_string());

        let source = find_source(sources, &id);
        if source.is_none() {
            debug!("source {id} not configured, copying its block");
        }
        let mut date = refdate;

        for period in 1..=nper {
            let lineno = cursor.lineno();
            let time = cursor.take("period time record")?;
            let hours = parse_int(hash_field(time, 2, lineno)?, lineno, "period hour offset")?;
            out.push(time.to_string());
            // factors are keyed on the period start, before the advance
            let stamp = date;
            date += Duration::hours(hours);

            if period == 1 {
                let lineno = cursor.lineno();
                let flagged = cursor.peek("source description")?;
                let flag = parse_int(hash_field(flagged, 5, lineno)?, lineno, "description flag")?;
                let extra = if flag == 2 { 3 } else { 2 };
                for _ in 0..extra {
                    out.push(cursor.take("source description")?.to_string());
                }
            }

            for ispe in 1..=self.species.len() {
                let lineno = cursor.lineno();
                let record = cursor.take("species record")?;
                let species = hash_field(record, 1, lineno)?.replace(' ', "");
                match source.filter(|s| s.species.contains(&species)) {
                    Some(source) => {
                        if period == 1 {
                            debug!("source {id}: rescaling species {species}");
                        }
                        let factor = table.factor_at(stamp, &factor_column(&source.id, &species))?;
                        let mass = if source.scheme.is_ratio() {
                            let baseline =
                                parse_float(hash_field(record, 2, lineno)?, lineno, "emission mass")?;
                            baseline * factor
                        } else {
                            factor
                        };
                        let dummy =
                            parse_int(hash_field(record, 3, lineno)?, lineno, "record tail")?;
                        out.push(format!(
                            "{ispe:3}#{species:<8}#{}#{dummy:4}#",
                            format_exponential(mass, 3)
                        ));
                    }
                    None => out.push(record.to_string()),
                }
            }
        }
        Ok(())
    }
}

/// Reference date of the header: day, month, two-digit year, hour,
/// minute and second as bare digit tokens on the sixth line.
fn reference_date(line: &str) -> MetemisResult<DateTime<Utc>> {
    let tokens = digit_tokens(line);
    if tokens.len() < 6 {
        return Err(MetemisError::BadRecord {
            line: HEADER_LINES,
            details: format!("expected 6 reference date tokens in '{line}'"),
        });
    }
    let date = NaiveDate::from_ymd_opt(2000 + tokens[2] as i32, tokens[1] as u32, tokens[0] as u32)
        .and_then(|d| d.and_hms_opt(tokens[3] as u32, tokens[4] as u32, tokens[5] as u32))
        .ok_or_else(|| MetemisError::BadRecord {
            line: HEADER_LINES,
            details: format!("invalid reference date in '{line}'"),
        })?;
    Ok(date.and_utc())
}
