use thiserror::Error;

/// Error type for failed runs.
///
/// Variants group into four families: configuration (bad or conflicting
/// source parameters), geometry (physically impossible stockpile shapes),
/// lookup (timestamps or factor columns missing from the table) and format
/// (an emission file record that does not match the grammar expected at its
/// position). All of them are fatal; the engine never degrades to partial
/// output.
#[derive(Error, Debug)]
pub enum MetemisError {
    // configuration
    #[error("invalid configuration file: {0}")]
    ConfigParse(#[from] toml::de::Error),
    #[error("invalid model '{value}': allowed models are spray, calpuff, impact, aermod (or 0-3)")]
    UnknownModel { value: String },
    #[error("invalid meteorology type '{value}': allowed types are csv, postbin")]
    UnknownMetType { value: String },
    #[error("invalid scheme {scheme} for source {source_id}: allowed schemes are 1, 2, 3")]
    UnknownScheme { source_id: String, scheme: i64 },
    #[error("source {source_id} has no species configured")]
    EmptySpecies { source_id: String },
    #[error("source id list {ids:?} was not expanded into scalar ids before validation")]
    UnexpandedIdList { ids: Vec<String> },
    #[error("invalid species {species:?} in source {source_id}: PM25, PM10 and PTS are all required")]
    InvalidSpeciesSet { source_id: String, species: Vec<String> },
    #[error("missing parameter '{parameter}' in source {source_id}")]
    MissingParameter {
        source_id: String,
        parameter: &'static str,
    },
    #[error("undefined shape of source {source_id}: exactly one of the asymmetric (major, minor, angle, height) or conical (radius, height) parameter sets is required")]
    UndefinedShape { source_id: String },
    #[error("bad definition of angle {angle} in source {source_id}: must lie within [-90, 90]")]
    InvalidAngle { source_id: String, angle: f64 },
    #[error("bad definition of geometry in source {source_id}: major side {major} must be greater than minor side {minor}")]
    MajorNotAboveMinor {
        source_id: String,
        major: f64,
        minor: f64,
    },
    #[error("species {species} of source {source_id} is not present in the reference species list")]
    SpeciesNotInReference { source_id: String, species: String },
    #[error("factor column {column} already exists: duplicated source id and species pair")]
    DuplicateColumn { column: String },

    // geometry
    #[error("invalid geometry of source {source_id}: height {height} >= {limit} (half the minor side) makes the lateral slope exceed 45 degrees")]
    SlopeTooSteep {
        source_id: String,
        height: f64,
        limit: f64,
    },

    // lookup
    #[error("timestamp {timestamp} is required but absent from the meteorology table")]
    TimestampNotFound { timestamp: String },
    #[error("duplicate timestamp {timestamp} in the meteorology input")]
    DuplicateTimestamp { timestamp: String },
    #[error("factor column {column} does not exist")]
    ColumnNotFound { column: String },

    // format
    #[error("line {line}: unexpected end of file, expected {expected}")]
    UnexpectedEof { line: usize, expected: String },
    #[error("line {line}: {details}")]
    BadRecord { line: usize, details: String },
}

/// Convenience type for `Result<T, MetemisError>`.
pub type MetemisResult<T> = Result<T, MetemisError>;
