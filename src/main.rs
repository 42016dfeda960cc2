//! metemis command line interface
//!
//! Rescales the emissions of an existing dispersion model input file
//! with meteorology-driven factors: the configured sources are turned
//! into factor columns over the meteorology, then the baseline emission
//! file is replayed through the rewriter of the target model.
//!
//! # Usage
//!
//! ```bash
//! metemis config.toml
//! ```

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use log::info;

use metemis_core::config::{EmissionModel, MetFormat, RunConfig};
use metemis_core::factor::compute_factors;
use metemis_core::met::MetTable;
use metemis_formats::aermod::Aermod;
use metemis_formats::calpuff::Calpuff;
use metemis_formats::impact::Impact;
use metemis_formats::pemtim::Pemtim;
use metemis_formats::EmissionRewriter;

/// Meteorology-driven rescaling of dispersion model emissions
#[derive(Parser, Debug)]
#[command(name = "metemis", version)]
struct Args {
    /// TOML run configuration
    config: PathBuf,

    /// Log at debug level
    #[arg(short, long)]
    debug: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let level = if args.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
    info!("metemis {}", env!("CARGO_PKG_VERSION"));

    let text = fs::read_to_string(&args.config)
        .with_context(|| format!("reading configuration {}", args.config.display()))?;
    let config = RunConfig::from_toml(&text).context("parsing the run configuration")?;
    let model = config.model()?;
    let sources = config.validated_sources()?;
    info!("rescaling {model} emissions for {} configured sources", sources.len());

    let met_text = fs::read_to_string(&config.wind_input_file)
        .with_context(|| format!("reading meteorology {}", config.wind_input_file.display()))?;
    let mut table = match config.met_format()? {
        MetFormat::Csv => MetTable::read_csv(&met_text)?,
        MetFormat::Postbin => MetTable::read_postbin(&met_text)?,
    };
    info!("meteorology has {} records", table.len());

    compute_factors(&mut table, &sources)?;
    let mut factors = Vec::new();
    table
        .write_csv(&mut factors)
        .context("serializing the factor table")?;
    fs::write(&config.wind_output_file, factors)
        .with_context(|| format!("writing factors {}", config.wind_output_file.display()))?;
    info!("factor table written to {}", config.wind_output_file.display());

    let rewriter: Box<dyn EmissionRewriter> = match model {
        EmissionModel::Spray => {
            let path = config
                .pemspe
                .as_ref()
                .context("the spray model needs a pemspe file")?;
            let pemspe = fs::read_to_string(path)
                .with_context(|| format!("reading pemspe {}", path.display()))?;
            Box::new(Pemtim::from_pemspe(&pemspe, &sources)?)
        }
        EmissionModel::Calpuff => Box::new(Calpuff),
        EmissionModel::Impact => Box::new(Impact),
        EmissionModel::Aermod => Box::new(Aermod),
    };

    let baseline = fs::read_to_string(&config.input)
        .with_context(|| format!("reading baseline emissions {}", config.input.display()))?;
    let lines: Vec<String> = baseline.lines().map(|line| line.to_string()).collect();
    let rescaled = rewriter.rewrite(&lines, &table, &sources)?;

    let mut out = String::with_capacity(baseline.len());
    for line in &rescaled {
        out.push_str(line);
        out.push_str(rewriter.line_ending());
    }
    fs::write(&config.output, out)
        .with_context(|| format!("writing emissions {}", config.output.display()))?;
    info!(
        "wrote {} rescaled emission lines to {}",
        rescaled.len(),
        config.output.display()
    );
    Ok(())
}
