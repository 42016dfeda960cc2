//! Run configuration.
//!
//! A run is described by a TOML document with a handful of global keys
//! (target model, meteorology type, file paths) and a `[[sources]]` array.
//! Raw sources are expanded (list ids become one source per element) and
//! validated into [`Source`] values whose rescaling scheme is a closed
//! enum; every configuration error surfaces here, before any meteorology
//! is read.

use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;

use log::{debug, warn};
use serde::Deserialize;

use crate::errors::{MetemisError, MetemisResult};
use crate::geometry::Stockpile;

/// Dispersion model whose emission input gets rewritten.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmissionModel {
    Spray,
    Calpuff,
    Impact,
    Aermod,
}

impl fmt::Display for EmissionModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EmissionModel::Spray => "spray",
            EmissionModel::Calpuff => "calpuff",
            EmissionModel::Impact => "impact",
            EmissionModel::Aermod => "aermod",
        };
        write!(f, "{name}")
    }
}

/// Layout of the meteorology input file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetFormat {
    Csv,
    Postbin,
}

/// The `mode` key accepts a model name or its legacy integer tag.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ModeTag {
    Number(i64),
    Name(String),
}

impl ModeTag {
    fn resolve(&self) -> MetemisResult<EmissionModel> {
        let parsed = match self {
            ModeTag::Number(n) => Self::from_number(*n),
            ModeTag::Name(name) => match name.trim().parse::<i64>() {
                Ok(n) => Self::from_number(n),
                Err(_) => match name.trim().to_lowercase().as_str() {
                    "spray" => Some(EmissionModel::Spray),
                    "calpuff" => Some(EmissionModel::Calpuff),
                    "impact" => Some(EmissionModel::Impact),
                    "aermod" => Some(EmissionModel::Aermod),
                    _ => None,
                },
            },
        };
        parsed.ok_or_else(|| MetemisError::UnknownModel {
            value: match self {
                ModeTag::Number(n) => n.to_string(),
                ModeTag::Name(name) => name.clone(),
            },
        })
    }

    fn from_number(n: i64) -> Option<EmissionModel> {
        match n {
            0 => Some(EmissionModel::Spray),
            1 => Some(EmissionModel::Calpuff),
            2 => Some(EmissionModel::Impact),
            3 => Some(EmissionModel::Aermod),
            _ => None,
        }
    }
}

/// A source id: a bare scalar or a list that expands to many sources.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum IdValue {
    Number(i64),
    Text(String),
    Many(Vec<IdScalar>),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum IdScalar {
    Number(i64),
    Text(String),
}

/// Terrain class for the odour scheme beta table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Terrain {
    Rural,
    Urban,
}

/// One raw `[[sources]]` table, prior to validation.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    pub id: IdValue,
    pub scheme: i64,
    pub species: Vec<String>,
    pub height: Option<f64>,
    pub terrain: Option<Terrain>,
    pub vref: Option<f64>,
    pub roughness: Option<f64>,
    pub tfv: Option<f64>,
    pub major: Option<f64>,
    pub minor: Option<f64>,
    pub angle: Option<f64>,
    pub radius: Option<f64>,
    pub movh: Option<f64>,
}

#[cfg(test)]
impl SourceConfig {
    pub(crate) fn for_tests(id: &str, scheme: i64, species: &[&str]) -> Self {
        SourceConfig {
            id: IdValue::Text(id.to_string()),
            scheme,
            species: species.iter().map(|s| s.to_string()).collect(),
            height: None,
            terrain: None,
            vref: None,
            roughness: None,
            tfv: None,
            major: None,
            minor: None,
            angle: None,
            radius: None,
            movh: None,
        }
    }
}

/// The whole TOML run configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RunConfig {
    pub mode: ModeTag,
    pub mettype: Option<String>,
    #[serde(rename = "windInputFile")]
    pub wind_input_file: PathBuf,
    #[serde(rename = "windOutputFile")]
    pub wind_output_file: PathBuf,
    pub input: PathBuf,
    pub output: PathBuf,
    pub pemspe: Option<PathBuf>,
    pub sources: Vec<SourceConfig>,
}

impl RunConfig {
    /// Parse a TOML document.
    pub fn from_toml(text: &str) -> MetemisResult<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Resolve the target model from the `mode` key.
    pub fn model(&self) -> MetemisResult<EmissionModel> {
        self.mode.resolve()
    }

    /// Resolve the meteorology file layout; a missing key falls back to
    /// csv, anything other than csv/postbin is rejected.
    pub fn met_format(&self) -> MetemisResult<MetFormat> {
        match &self.mettype {
            None => {
                warn!("meteorology type not configured, assuming csv");
                Ok(MetFormat::Csv)
            }
            Some(value) => match value.trim().to_lowercase().as_str() {
                "csv" => Ok(MetFormat::Csv),
                "postbin" => Ok(MetFormat::Postbin),
                _ => Err(MetemisError::UnknownMetType {
                    value: value.clone(),
                }),
            },
        }
    }

    /// Flatten list-id sources into one raw source per id.
    ///
    /// Scalar-id sources keep their file order and come first; expanded
    /// elements follow, in file order too.
    pub fn expanded_sources(&self) -> Vec<SourceConfig> {
        let mut flat: Vec<SourceConfig> = Vec::new();
        for source in &self.sources {
            if !matches!(source.id, IdValue::Many(_)) {
                flat.push(source.clone());
            }
        }
        for source in &self.sources {
            if let IdValue::Many(ids) = &source.id {
                for id in ids {
                    let mut copy = source.clone();
                    copy.id = match id {
                        IdScalar::Number(n) => IdValue::Number(*n),
                        IdScalar::Text(s) => IdValue::Text(s.clone()),
                    };
                    flat.push(copy);
                }
            }
        }
        flat
    }

    /// Expand and validate every source.
    pub fn validated_sources(&self) -> MetemisResult<Vec<Source>> {
        self.expanded_sources().iter().map(Source::validate).collect()
    }
}

/// Rescaling scheme with its validated parameters.
#[derive(Debug, Clone, PartialEq)]
pub enum Scheme {
    /// Ratio scaling of odour emissions on the wind profile.
    Odour {
        height: f64,
        terrain: Option<Terrain>,
        vref: f64,
    },
    /// Wind-driven erosion of a stockpile (EPA AP-42 sector scheme).
    WindErosion {
        shape: Stockpile,
        z0: f64,
        tfv: f64,
    },
    /// Material-movement erosion of a conical stockpile, wind independent.
    StaticErosion {
        radius: f64,
        height: f64,
        movh: f64,
    },
}

impl Scheme {
    /// Scheme 1 factors multiply the baseline mass; the erosion schemes
    /// replace it with an absolute rate.
    pub fn is_ratio(&self) -> bool {
        matches!(self, Scheme::Odour { .. })
    }
}

/// A validated emission source.
#[derive(Debug, Clone, PartialEq)]
pub struct Source {
    pub id: String,
    pub species: Vec<String>,
    pub scheme: Scheme,
}

impl Source {
    /// Validate one expanded raw source.
    pub fn validate(cfg: &SourceConfig) -> MetemisResult<Source> {
        let id = match &cfg.id {
            IdValue::Number(n) => n.to_string(),
            IdValue::Text(s) => s.clone(),
            // expansion happens before validation
            IdValue::Many(ids) => {
                return Err(MetemisError::UnexpandedIdList {
                    ids: ids
                        .iter()
                        .map(|id| match id {
                            IdScalar::Number(n) => n.to_string(),
                            IdScalar::Text(s) => s.clone(),
                        })
                        .collect(),
                })
            }
        };
        let scheme = match cfg.scheme {
            1 => {
                if cfg.species.is_empty() {
                    return Err(MetemisError::EmptySpecies { source_id: id });
                }
                let height = cfg.height.ok_or(MetemisError::MissingParameter {
                    source_id: id.clone(),
                    parameter: "height",
                })?;
                let vref = cfg.vref.unwrap_or_else(|| {
                    debug!("source {id}: reference velocity not configured, default 0.3");
                    0.3
                });
                Scheme::Odour {
                    height,
                    terrain: cfg.terrain,
                    vref,
                }
            }
            2 => {
                check_erosion_species(&id, &cfg.species)?;
                let shape = Stockpile::classify(&id, cfg)?;
                let z0 = match cfg.roughness {
                    Some(cm) => cm / 100.0,
                    None => {
                        debug!("source {id}: roughness not configured, default z0 = 0.005 m");
                        0.005
                    }
                };
                let tfv = cfg.tfv.ok_or(MetemisError::MissingParameter {
                    source_id: id.clone(),
                    parameter: "tfv",
                })?;
                Scheme::WindErosion { shape, z0, tfv }
            }
            3 => {
                check_erosion_species(&id, &cfg.species)?;
                let radius = cfg.radius.ok_or(MetemisError::MissingParameter {
                    source_id: id.clone(),
                    parameter: "radius",
                })?;
                let height = cfg.height.ok_or(MetemisError::MissingParameter {
                    source_id: id.clone(),
                    parameter: "height",
                })?;
                let movh = cfg.movh.ok_or(MetemisError::MissingParameter {
                    source_id: id.clone(),
                    parameter: "movh",
                })?;
                Scheme::StaticErosion {
                    radius,
                    height,
                    movh,
                }
            }
            other => {
                return Err(MetemisError::UnknownScheme {
                    source_id: id,
                    scheme: other,
                })
            }
        };
        Ok(Source {
            id,
            species: cfg.species.clone(),
            scheme,
        })
    }
}

/// The erosion schemes emit the full particulate split and nothing else.
fn check_erosion_species(id: &str, species: &[String]) -> MetemisResult<()> {
    let have: BTreeSet<&str> = species.iter().map(String::as_str).collect();
    let want: BTreeSet<&str> = ["PM25", "PM10", "PTS"].into_iter().collect();
    if have != want {
        return Err(MetemisError::InvalidSpeciesSet {
            source_id: id.to_string(),
            species: species.to_vec(),
        });
    }
    Ok(())
}

/// Find the configured source governing `id`, if any.
pub fn find_source<'a>(sources: &'a [Source], id: &str) -> Option<&'a Source> {
    sources.iter().find(|source| source.id == id)
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = r#"
mode = "spray"
mettype = "csv"
windInputFile = "met.csv"
windOutputFile = "metout.csv"
input = "pemtim"
output = "pemtim.out"
pemspe = "pemspe"
"#;

    fn config(sources: &str) -> RunConfig {
        RunConfig::from_toml(&format!("{BASE}{sources}")).unwrap()
    }

    #[test]
    fn test_mode_accepts_names_and_numbers() {
        for (text, model) in [
            ("\"spray\"", EmissionModel::Spray),
            ("\"CALPUFF\"", EmissionModel::Calpuff),
            ("2", EmissionModel::Impact),
            ("\"3\"", EmissionModel::Aermod),
            ("0", EmissionModel::Spray),
        ] {
            let conf = RunConfig::from_toml(&format!(
                "mode = {text}\nmettype = \"csv\"\nwindInputFile = \"a\"\nwindOutputFile = \"b\"\ninput = \"c\"\noutput = \"d\"\nsources = []\n"
            ))
            .unwrap();
            assert_eq!(conf.model().unwrap(), model);
        }
    }

    #[test]
    fn test_mode_rejects_unknown() {
        let conf = RunConfig::from_toml(
            "mode = 7\nwindInputFile = \"a\"\nwindOutputFile = \"b\"\ninput = \"c\"\noutput = \"d\"\nsources = []\n",
        )
        .unwrap();
        assert!(matches!(
            conf.model().unwrap_err(),
            MetemisError::UnknownModel { .. }
        ));
    }

    #[test]
    fn test_met_format() {
        let conf = config("sources = []\n");
        assert_eq!(conf.met_format().unwrap(), MetFormat::Csv);

        let mut postbin = conf.clone();
        postbin.mettype = Some("Postbin".into());
        assert_eq!(postbin.met_format().unwrap(), MetFormat::Postbin);

        let mut missing = conf.clone();
        missing.mettype = None;
        assert_eq!(missing.met_format().unwrap(), MetFormat::Csv);

        let mut bad = conf;
        bad.mettype = Some("grib".into());
        assert!(matches!(
            bad.met_format().unwrap_err(),
            MetemisError::UnknownMetType { .. }
        ));
    }

    #[test]
    fn test_id_list_expansion_order() {
        let conf = config(
            r#"
[[sources]]
id = [7, 8]
scheme = 1
species = ["SO2"]
height = 10.0

[[sources]]
id = 5
scheme = 1
species = ["SO2"]
height = 10.0
"#,
        );
        let ids: Vec<String> = conf
            .validated_sources()
            .unwrap()
            .into_iter()
            .map(|s| s.id)
            .collect();
        assert_eq!(ids, ["5", "7", "8"]);
    }

    #[test]
    fn test_validate_rejects_unexpanded_id_list() {
        let mut cfg = SourceConfig::for_tests("5", 1, &["SO2"]);
        cfg.id = IdValue::Many(vec![IdScalar::Number(7), IdScalar::Text("8".into())]);
        cfg.height = Some(10.0);
        let err = Source::validate(&cfg).unwrap_err();
        match err {
            MetemisError::UnexpandedIdList { ids } => assert_eq!(ids, ["7", "8"]),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_unknown_scheme_rejected() {
        let conf = config(
            r#"
[[sources]]
id = 5
scheme = 4
species = ["SO2"]
"#,
        );
        assert!(matches!(
            conf.validated_sources().unwrap_err(),
            MetemisError::UnknownScheme { scheme: 4, .. }
        ));
    }

    #[test]
    fn test_odour_defaults() {
        let conf = config(
            r#"
[[sources]]
id = 5
scheme = 1
species = ["SO2", "NOX"]
height = 10.0
terrain = "rural"
"#,
        );
        let sources = conf.validated_sources().unwrap();
        assert_eq!(
            sources[0].scheme,
            Scheme::Odour {
                height: 10.0,
                terrain: Some(Terrain::Rural),
                vref: 0.3
            }
        );
    }

    #[test]
    fn test_scheme2_requires_full_particulate_split() {
        let conf = config(
            r#"
[[sources]]
id = "PILE"
scheme = 2
species = ["PM10"]
radius = 5.0
height = 2.0
tfv = 0.05
"#,
        );
        assert!(matches!(
            conf.validated_sources().unwrap_err(),
            MetemisError::InvalidSpeciesSet { .. }
        ));
    }

    #[test]
    fn test_scheme2_major_not_above_minor_fails_at_validation() {
        let conf = config(
            r#"
[[sources]]
id = "PILE"
scheme = 2
species = ["PM25", "PM10", "PTS"]
major = 10.0
minor = 12.0
angle = 0.0
height = 2.0
tfv = 0.05
"#,
        );
        assert!(matches!(
            conf.validated_sources().unwrap_err(),
            MetemisError::MajorNotAboveMinor { .. }
        ));
    }

    #[test]
    fn test_scheme2_requires_tfv() {
        let conf = config(
            r#"
[[sources]]
id = "PILE"
scheme = 2
species = ["PTS", "PM10", "PM25"]
radius = 5.0
height = 2.0
"#,
        );
        assert!(matches!(
            conf.validated_sources().unwrap_err(),
            MetemisError::MissingParameter {
                parameter: "tfv",
                ..
            }
        ));
    }

    #[test]
    fn test_scheme3_requires_movh() {
        let conf = config(
            r#"
[[sources]]
id = 9
scheme = 3
species = ["PM25", "PM10", "PTS"]
radius = 5.0
height = 2.0
"#,
        );
        assert!(matches!(
            conf.validated_sources().unwrap_err(),
            MetemisError::MissingParameter {
                parameter: "movh",
                ..
            }
        ));
    }
}
