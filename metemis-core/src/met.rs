//! Meteorology table and factor columns.
//!
//! The table is loaded once from a csv or postbin meteorology file and
//! then enriched by the factor engine with one column per (source,
//! species) pair. Rows are keyed by their exact timestamp; duplicates are
//! rejected at build time so a lookup can only succeed on exactly one
//! row.

use std::collections::HashMap;
use std::fmt;
use std::io::{self, Write};

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use log::{debug, warn};
use ndarray::Array1;

use crate::errors::{MetemisError, MetemisResult};

/// Canonical timestamp form used for lookups and csv output.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

pub fn format_timestamp(stamp: DateTime<Utc>) -> String {
    stamp.format(TIMESTAMP_FORMAT).to_string()
}

/// Pasquill stability class.
///
/// Meteorology files may carry it as 1-6 or as letters in either case;
/// everything normalizes to A-F.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StabilityClass {
    A,
    B,
    C,
    D,
    E,
    F,
}

impl StabilityClass {
    pub fn parse(token: &str) -> Option<Self> {
        match token.trim() {
            "1" | "a" | "A" => Some(StabilityClass::A),
            "2" | "b" | "B" => Some(StabilityClass::B),
            "3" | "c" | "C" => Some(StabilityClass::C),
            "4" | "d" | "D" => Some(StabilityClass::D),
            "5" | "e" | "E" => Some(StabilityClass::E),
            "6" | "f" | "F" => Some(StabilityClass::F),
            _ => None,
        }
    }

    /// Row index in the odour beta table.
    pub fn index(&self) -> usize {
        *self as usize
    }
}

impl fmt::Display for StabilityClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let letter = match self {
            StabilityClass::A => 'A',
            StabilityClass::B => 'B',
            StabilityClass::C => 'C',
            StabilityClass::D => 'D',
            StabilityClass::E => 'E',
            StabilityClass::F => 'F',
        };
        write!(f, "{letter}")
    }
}

/// One row of the meteorology input.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeteoRecord {
    pub date: DateTime<Utc>,
    pub ws: f64,
    pub wd: f64,
    pub z: f64,
    pub stabclass: Option<StabilityClass>,
}

#[derive(Debug, Clone)]
struct FactorColumn {
    name: String,
    values: Array1<f64>,
}

/// Timestamp-indexed meteorology plus appended factor columns.
#[derive(Debug, Clone)]
pub struct MetTable {
    records: Vec<MeteoRecord>,
    columns: Vec<FactorColumn>,
    index: HashMap<DateTime<Utc>, usize>,
}

impl MetTable {
    /// Build the table, rejecting duplicate timestamps.
    pub fn from_records(records: Vec<MeteoRecord>) -> MetemisResult<Self> {
        let mut index = HashMap::with_capacity(records.len());
        for (row, record) in records.iter().enumerate() {
            if index.insert(record.date, row).is_some() {
                return Err(MetemisError::DuplicateTimestamp {
                    timestamp: format_timestamp(record.date),
                });
            }
        }
        Ok(MetTable {
            records,
            columns: Vec::new(),
            index,
        })
    }

    /// Read a csv meteorology file.
    ///
    /// Columns `date`, `ws`, `wd` and `z` are required, `stabclass` is
    /// optional; anything else is ignored with a warning. Order does not
    /// matter.
    pub fn read_csv(text: &str) -> MetemisResult<Self> {
        let mut lines = text.lines().enumerate();
        let (_, header) = lines.next().ok_or_else(|| MetemisError::UnexpectedEof {
            line: 1,
            expected: "meteorology csv header".to_string(),
        })?;
        let names: Vec<&str> = header.split(',').map(str::trim).collect();
        let position = |wanted: &str| names.iter().position(|name| *name == wanted);
        let require = |wanted: &'static str| {
            position(wanted).ok_or_else(|| MetemisError::BadRecord {
                line: 1,
                details: format!("meteorology csv is missing the '{wanted}' column"),
            })
        };
        let date_col = require("date")?;
        let ws_col = require("ws")?;
        let wd_col = require("wd")?;
        let z_col = require("z")?;
        let stab_col = position("stabclass");
        for name in &names {
            if !matches!(*name, "date" | "ws" | "wd" | "z" | "stabclass") {
                warn!("ignoring meteorology column '{name}'");
            }
        }

        let mut records = Vec::new();
        for (i, line) in lines {
            if line.trim().is_empty() {
                continue;
            }
            let lineno = i + 1;
            let cells: Vec<&str> = line.split(',').collect();
            if cells.len() != names.len() {
                return Err(MetemisError::BadRecord {
                    line: lineno,
                    details: format!(
                        "expected {} comma separated fields, found {}",
                        names.len(),
                        cells.len()
                    ),
                });
            }
            let stabclass = match stab_col {
                Some(col) => Some(StabilityClass::parse(cells[col]).ok_or_else(|| {
                    MetemisError::BadRecord {
                        line: lineno,
                        details: format!("invalid stability class '{}'", cells[col].trim()),
                    }
                })?),
                None => None,
            };
            records.push(MeteoRecord {
                date: parse_timestamp(cells[date_col], lineno)?,
                ws: parse_float(cells[ws_col], lineno, "ws")?,
                wd: parse_float(cells[wd_col], lineno, "wd")?,
                z: parse_float(cells[z_col], lineno, "z")?,
                stabclass,
            });
        }
        debug!("read {} csv meteorology records", records.len());
        Self::from_records(records)
    }

    /// Read a fixed-column postbin meteorology file.
    ///
    /// Tokens 2-7 carry day, month, 2-digit year, hour, minute and
    /// second (stray dots tolerated), token 8 the reference height,
    /// 9 the wind speed and 10 the wind direction.
    pub fn read_postbin(text: &str) -> MetemisResult<Self> {
        let mut records = Vec::new();
        for (i, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            let lineno = i + 1;
            let tokens: Vec<&str> = line.split_whitespace().collect();
            if tokens.len() < 11 {
                return Err(MetemisError::BadRecord {
                    line: lineno,
                    details: format!(
                        "postbin record needs at least 11 fields, found {}",
                        tokens.len()
                    ),
                });
            }
            let digit = |pos: usize, what: &str| -> MetemisResult<u32> {
                let cleaned: String = tokens[pos].chars().filter(|c| *c != '.').collect();
                cleaned.parse().map_err(|_| MetemisError::BadRecord {
                    line: lineno,
                    details: format!("invalid {what} field '{}'", tokens[pos]),
                })
            };
            let (day, month, year) = (digit(2, "day")?, digit(3, "month")?, digit(4, "year")?);
            let (hour, minute, second) =
                (digit(5, "hour")?, digit(6, "minute")?, digit(7, "second")?);
            let date = NaiveDate::from_ymd_opt(2000 + year as i32, month, day)
                .and_then(|d| d.and_hms_opt(hour, minute, second))
                .ok_or_else(|| MetemisError::BadRecord {
                    line: lineno,
                    details: format!("invalid date {day:02}/{month:02}/{year:02} {hour:02}:{minute:02}:{second:02}"),
                })?
                .and_utc();
            records.push(MeteoRecord {
                date,
                ws: parse_float(tokens[9], lineno, "ws")?,
                wd: parse_float(tokens[10], lineno, "wd")?,
                z: parse_float(tokens[8], lineno, "z")?,
                stabclass: None,
            });
        }
        debug!("read {} postbin meteorology records", records.len());
        Self::from_records(records)
    }

    pub fn records(&self) -> &[MeteoRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// True when every record carries a stability class.
    pub fn has_stability(&self) -> bool {
        !self.records.is_empty() && self.records.iter().all(|r| r.stabclass.is_some())
    }

    /// Append one factor column; the name must be new.
    pub fn append_column(&mut self, name: &str, values: Array1<f64>) -> MetemisResult<()> {
        if self.columns.iter().any(|column| column.name == name) {
            return Err(MetemisError::DuplicateColumn {
                column: name.to_string(),
            });
        }
        debug_assert_eq!(values.len(), self.records.len());
        self.columns.push(FactorColumn {
            name: name.to_string(),
            values,
        });
        Ok(())
    }

    pub fn column(&self, name: &str) -> Option<&Array1<f64>> {
        self.columns
            .iter()
            .find(|column| column.name == name)
            .map(|column| &column.values)
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|column| column.name.as_str())
    }

    /// Index of the single row holding `stamp`.
    pub fn row_at(&self, stamp: DateTime<Utc>) -> MetemisResult<usize> {
        self.index
            .get(&stamp)
            .copied()
            .ok_or_else(|| MetemisError::TimestampNotFound {
                timestamp: format_timestamp(stamp),
            })
    }

    /// Single-value factor lookup by timestamp and column name.
    pub fn factor_at(&self, stamp: DateTime<Utc>, column: &str) -> MetemisResult<f64> {
        let row = self.row_at(stamp)?;
        let values = self
            .column(column)
            .ok_or_else(|| MetemisError::ColumnNotFound {
                column: column.to_string(),
            })?;
        Ok(values[row])
    }

    /// Write the enriched table as csv, mirroring the meteorology
    /// columns and appending the factor columns in insertion order.
    pub fn write_csv<W: Write>(&self, w: &mut W) -> io::Result<()> {
        let with_stability = self.has_stability();
        write!(w, "date,ws,wd,z")?;
        if with_stability {
            write!(w, ",stabclass")?;
        }
        for column in &self.columns {
            write!(w, ",{}", column.name)?;
        }
        writeln!(w)?;
        for (row, record) in self.records.iter().enumerate() {
            write!(
                w,
                "{},{},{},{}",
                format_timestamp(record.date),
                display_float(record.ws),
                display_float(record.wd),
                display_float(record.z)
            )?;
            if with_stability {
                match record.stabclass {
                    Some(class) => write!(w, ",{class}")?,
                    None => write!(w, ",")?,
                }
            }
            for column in &self.columns {
                write!(w, ",{}", display_float(column.values[row]))?;
            }
            writeln!(w)?;
        }
        Ok(())
    }
}

fn parse_timestamp(cell: &str, lineno: usize) -> MetemisResult<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(cell.trim(), TIMESTAMP_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|_| MetemisError::BadRecord {
            line: lineno,
            details: format!(
                "invalid timestamp '{}': expected YYYY-MM-DDTHH:MM:SSZ",
                cell.trim()
            ),
        })
}

fn parse_float(cell: &str, lineno: usize, what: &str) -> MetemisResult<f64> {
    cell.trim().parse().map_err(|_| MetemisError::BadRecord {
        line: lineno,
        details: format!("invalid {what} value '{}'", cell.trim()),
    })
}

/// Shortest roundtrip form, keeping a `.0` on integral values.
fn display_float(value: f64) -> String {
    if value.is_finite() && value == value.trunc() {
        format!("{value:.1}")
    } else {
        format!("{value}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stamp(text: &str) -> DateTime<Utc> {
        parse_timestamp(text, 0).unwrap()
    }

    #[test]
    fn test_read_csv_normalizes_stability() {
        let table = MetTable::read_csv(
            "date,ws,wd,z,stabclass\n\
             2019-01-01T00:00:00Z,2.0,180.0,10.0,3\n\
             2019-01-01T01:00:00Z,3.5,90.0,10.0,f\n",
        )
        .unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.records()[0].stabclass, Some(StabilityClass::C));
        assert_eq!(table.records()[1].stabclass, Some(StabilityClass::F));
        assert!(table.has_stability());
    }

    #[test]
    fn test_read_csv_requires_wind_columns() {
        let err = MetTable::read_csv("date,wd,z\n2019-01-01T00:00:00Z,180.0,10.0\n").unwrap_err();
        assert!(matches!(err, MetemisError::BadRecord { line: 1, .. }));
    }

    #[test]
    fn test_read_csv_rejects_bad_timestamp() {
        let err =
            MetTable::read_csv("date,ws,wd,z\n01/01/2019 00:00,2.0,180.0,10.0\n").unwrap_err();
        assert!(matches!(err, MetemisError::BadRecord { line: 2, .. }));
    }

    #[test]
    fn test_duplicate_timestamp_rejected() {
        let err = MetTable::read_csv(
            "date,ws,wd,z\n\
             2019-01-01T00:00:00Z,2.0,180.0,10.0\n\
             2019-01-01T00:00:00Z,2.5,170.0,10.0\n",
        )
        .unwrap_err();
        assert!(matches!(err, MetemisError::DuplicateTimestamp { .. }));
    }

    #[test]
    fn test_read_postbin() {
        let table = MetTable::read_postbin(
            "0 1 01. 02. 19. 10. 00. 00. 10.0 3.5 270.0\n\
             0 1 01. 02. 19. 11. 00. 00. 10.0 4.0 265.0\n",
        )
        .unwrap();
        assert_eq!(table.len(), 2);
        let first = table.records()[0];
        assert_eq!(first.date, stamp("2019-02-01T10:00:00Z"));
        assert_eq!(first.ws, 3.5);
        assert_eq!(first.wd, 270.0);
        assert_eq!(first.z, 10.0);
        assert!(!table.has_stability());
    }

    #[test]
    fn test_single_row_lookup() {
        let mut table = MetTable::read_csv(
            "date,ws,wd,z\n\
             2019-01-01T00:00:00Z,2.0,180.0,10.0\n",
        )
        .unwrap();
        table
            .append_column("5_SO2", Array1::from(vec![2.58]))
            .unwrap();
        assert_eq!(
            table.factor_at(stamp("2019-01-01T00:00:00Z"), "5_SO2").unwrap(),
            2.58
        );
        assert!(matches!(
            table.factor_at(stamp("2019-01-01T01:00:00Z"), "5_SO2"),
            Err(MetemisError::TimestampNotFound { .. })
        ));
        assert!(matches!(
            table.factor_at(stamp("2019-01-01T00:00:00Z"), "9_SO2"),
            Err(MetemisError::ColumnNotFound { .. })
        ));
    }

    #[test]
    fn test_append_column_rejects_duplicate() {
        let mut table =
            MetTable::read_csv("date,ws,wd,z\n2019-01-01T00:00:00Z,2.0,180.0,10.0\n").unwrap();
        table.append_column("5_SO2", Array1::from(vec![1.0])).unwrap();
        let err = table
            .append_column("5_SO2", Array1::from(vec![2.0]))
            .unwrap_err();
        assert!(matches!(err, MetemisError::DuplicateColumn { .. }));
    }

    #[test]
    fn test_write_csv_mirrors_table() {
        let mut table = MetTable::read_csv(
            "date,ws,wd,z,stabclass\n\
             2019-01-01T00:00:00Z,2.0,180.0,10.0,4\n",
        )
        .unwrap();
        table
            .append_column("5_SO2", Array1::from(vec![2.58]))
            .unwrap();
        let mut out = Vec::new();
        table.write_csv(&mut out).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "date,ws,wd,z,stabclass,5_SO2\n\
             2019-01-01T00:00:00Z,2.0,180.0,10.0,D,2.58\n"
        );
    }
}
