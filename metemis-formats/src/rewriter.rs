//! Common contract of the emission file rewriters.

use metemis_core::config::Source;
use metemis_core::errors::MetemisResult;
use metemis_core::met::MetTable;

/// A baseline emission file rewriter.
///
/// Implementations replay the baseline lines one record at a time,
/// substituting rescaled masses for the (source, species, timestamp)
/// triples governed by the configuration and copying every other byte
/// unchanged. Ratio schemes multiply the baseline mass, absolute
/// schemes replace it.
pub trait EmissionRewriter {
    /// Rewrite the baseline lines against the enriched factor table.
    fn rewrite(
        &self,
        lines: &[String],
        table: &MetTable,
        sources: &[Source],
    ) -> MetemisResult<Vec<String>>;

    /// Terminator appended to every serialized output line.
    fn line_ending(&self) -> &'static str {
        "\n"
    }
}

/// Exponential float form with a signed, zero-padded two-digit
/// exponent, `2.580E+01` style, as the emission formats write masses.
pub fn format_exponential(value: f64, precision: usize) -> String {
    let formatted = format!("{:.*E}", precision, value);
    match formatted.split_once('E') {
        Some((mantissa, exponent)) => {
            let (sign, digits) = match exponent.strip_prefix('-') {
                Some(rest) => ('-', rest),
                None => ('+', exponent),
            };
            format!("{mantissa}E{sign}{digits:0>2}")
        }
        None => formatted,
    }
}
