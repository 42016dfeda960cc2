//! Rescaling factor engine.
//!
//! Every scheme turns the meteorology table into one factor column per
//! governed species, named `{id}_{species}`:
//!
//! * [odour]: multiplicative factors from the wind profile power law,
//!   $f = (w_s \cdot (h/z)^\beta / v_{ref})^\gamma$
//! * [wind_erosion]: absolute hourly dust emissions of an eroding pile
//!   following the AP-42 fastest mile / friction velocity model
//! * [static_erosion]: absolute hourly dust emissions of an undisturbed
//!   pile from fixed per-movement emission factors
//!
//! Columns are appended in source order, and PM columns always in the
//! order PM25, PM10, PTS whatever order the configuration lists them.

use log::{debug, info};
use ndarray::Array1;

use crate::config::{Scheme, Source, Terrain};
use crate::errors::MetemisResult;
use crate::geometry::{conical_surface, Stockpile};
use crate::met::{MetTable, StabilityClass};

/// Wind profile exponent of the odour factor law.
const GAMMA: f64 = 0.5;
/// Odour beta by stability class A-F over rural terrain.
const BETA_RURAL: [f64; 6] = [0.07, 0.07, 0.1, 0.15, 0.35, 0.55];
/// Odour beta by stability class A-F over urban terrain.
const BETA_URBAN: [f64; 6] = [0.15, 0.15, 0.2, 0.25, 0.3, 0.3];
/// Beta fallback when terrain or stability information is missing.
const BETA_DEFAULT: f64 = 0.55;

/// Fastest mile linear fit on the 10 m wind speed.
const FASTEST_MILE_SLOPE: f64 = 1.6;
const FASTEST_MILE_OFFSET: f64 = 0.43;
/// Friction velocity multipliers per pile sector, flat and elevated.
const SECTOR_SPEEDUP_FLAT: [f64; 4] = [1.0, 1.0, 1.0, 1.0];
const SECTOR_SPEEDUP_TALL: [f64; 4] = [0.2, 0.6, 0.9, 1.1];
/// Mass fractions of the eroded potential.
const K_PM25: f64 = 0.075;
const K_PM10: f64 = 0.5;
const K_PTS: f64 = 1.0;

/// Per-movement emission factors (g per m2 and movement), high mounds.
const EF_HIGH: [f64; 3] = [1.26e-06, 7.9e-06, 1.6e-05];
/// Per-movement emission factors, low mounds.
const EF_LOW: [f64; 3] = [3.8e-05, 2.5e-04, 5.1e-04];

/// Factor column name for a (source, species) pair.
pub fn factor_column(id: &str, species: &str) -> String {
    format!("{id}_{species}")
}

/// Round to two decimals, half away from zero.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Compute and append the factor columns of every source.
pub fn compute_factors(table: &mut MetTable, sources: &[Source]) -> MetemisResult<()> {
    for source in sources {
        let kind = match &source.scheme {
            Scheme::Odour { .. } => "odour",
            Scheme::WindErosion { .. } => "wind erosion",
            Scheme::StaticErosion { .. } => "static erosion",
        };
        info!("source {}: computing {kind} factors", source.id);
        match &source.scheme {
            Scheme::Odour {
                height,
                terrain,
                vref,
            } => odour(table, source, *height, *terrain, *vref)?,
            Scheme::WindErosion { shape, z0, tfv } => {
                wind_erosion(table, source, shape, *z0, *tfv)?
            }
            Scheme::StaticErosion {
                radius,
                height,
                movh,
            } => static_erosion(table, source, *radius, *height, *movh)?,
        }
    }
    Ok(())
}

fn beta(terrain: Terrain, class: StabilityClass) -> f64 {
    match terrain {
        Terrain::Rural => BETA_RURAL[class.index()],
        Terrain::Urban => BETA_URBAN[class.index()],
    }
}

/// Multiplicative odour factors.
///
/// The wind speed measured at height `z` is referred to the source
/// height through the power law profile with exponent beta, which
/// depends on terrain type and stability class when both are known.
fn odour(
    table: &mut MetTable,
    source: &Source,
    height: f64,
    terrain: Option<Terrain>,
    vref: f64,
) -> MetemisResult<()> {
    if terrain.is_none() {
        debug!("source {}: no terrain configured, beta fixed at {BETA_DEFAULT}", source.id);
    }
    let factors: Array1<f64> = table
        .records()
        .iter()
        .map(|record| {
            let beta = match (terrain, record.stabclass) {
                (Some(terrain), Some(class)) => beta(terrain, class),
                _ => BETA_DEFAULT,
            };
            let rat = height / record.z;
            round2((record.ws * rat.powf(beta) / vref).powf(GAMMA))
        })
        .collect();
    table.append_column(&factor_column(&source.id, &source.species[0]), factors)
}

/// Absolute hourly emissions of a wind-eroded pile.
///
/// For each record the wind speed is scaled to 10 m over the local
/// roughness, converted to a fastest mile estimate and then to one
/// friction velocity per pile sector. The erosion potential
/// $58 (u_* - u_t)^2 + 25 (u_* - u_t)$ is weighted by the per-sector
/// surface fractions selected from the wind incidence on the pile, so
/// records below the threshold friction velocity emit exactly zero.
fn wind_erosion(
    table: &mut MetTable,
    source: &Source,
    shape: &Stockpile,
    z0: f64,
    tfv: f64,
) -> MetemisResult<()> {
    let surface = shape.surface();
    let speedup = if shape.height() / shape.base() <= 0.2 {
        SECTOR_SPEEDUP_FLAT
    } else {
        SECTOR_SPEEDUP_TALL
    };
    let mut totals = Vec::with_capacity(table.len());
    for record in table.records() {
        let weights = shape.sector_weights(record.wd);
        let ws10 = record.ws * (10.0 / z0).ln() / (record.z / z0).ln();
        let fastest_mile = FASTEST_MILE_SLOPE * ws10 + FASTEST_MILE_OFFSET;
        let mut eroded = 0.0;
        for (weight, scale) in weights.into_iter().zip(speedup) {
            let ustar = (0.4 * fastest_mile / (0.25 / z0).ln() * scale).max(tfv);
            let excess = ustar - tfv;
            eroded += (58.0 * excess * excess + 25.0 * excess) * weight;
        }
        // percent weights, and grams to micrograms
        totals.push(eroded * surface / 100.0 * 1e6);
    }
    for (species, fraction) in [("PM25", K_PM25), ("PM10", K_PM10), ("PTS", K_PTS)] {
        let values: Array1<f64> = totals.iter().map(|total| round2(fraction * total)).collect();
        table.append_column(&factor_column(&source.id, species), values)?;
    }
    Ok(())
}

/// Absolute hourly emissions of an undisturbed conical pile.
///
/// Fixed emission factors per unit surface and movement, in the high
/// mounds regime when the height to diameter ratio exceeds 0.2.
fn static_erosion(
    table: &mut MetTable,
    source: &Source,
    radius: f64,
    height: f64,
    movh: f64,
) -> MetemisResult<()> {
    let surface = conical_surface(radius, height);
    let high_mound = height / (2.0 * radius) > 0.2;
    let factors = if high_mound { EF_HIGH } else { EF_LOW };
    debug!(
        "source {}: {} mounds emission factors",
        source.id,
        if high_mound { "high" } else { "low" }
    );
    let rows = table.len();
    for (species, ef) in [("PM25", factors[0]), ("PM10", factors[1]), ("PTS", factors[2])] {
        let rate = round2(1e9 * ef * surface * movh);
        table.append_column(&factor_column(&source.id, species), Array1::from_elem(rows, rate))?;
    }
    Ok(())
}
