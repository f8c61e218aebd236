//! decontam - contaminant identification CLI
//!
//! Scores features of a microbiome feature table, removes contaminants and
//! summarizes score distributions.

use clap::{Parser, Subcommand, ValueEnum};
use decontam::config::{
    CombineRule, DeconMethod, IdentifyParams, PrevalenceTest, Threshold, DEFAULT_THRESHOLD,
};
use decontam::data::{ColumnRef, CountMatrix, Metadata, ScoreTable};
use decontam::error::Result;
use decontam::filter::remove;
use decontam::pipeline::identify;
use decontam::registry::MethodRegistry;
use decontam::summary::summarize;
use env_logger::Env;
use log::info;
use std::path::{Path, PathBuf};

/// CLI-friendly prevalence test enum
#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliPrevalenceTest {
    /// One-sided mid-p Fisher exact test
    Fisher,
    /// One-sided Pearson chi-squared test
    ChiSquared,
}

impl From<CliPrevalenceTest> for PrevalenceTest {
    fn from(test: CliPrevalenceTest) -> Self {
        match test {
            CliPrevalenceTest::Fisher => PrevalenceTest::Fisher,
            CliPrevalenceTest::ChiSquared => PrevalenceTest::ChiSquared,
        }
    }
}

/// CLI-friendly combine rule enum
#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliCombineRule {
    /// Minimum of the two scores
    Minimum,
    /// Fisher's method
    Fisher,
}

impl From<CliCombineRule> for CombineRule {
    fn from(rule: CliCombineRule) -> Self {
        match rule {
            CliCombineRule::Minimum => CombineRule::Minimum,
            CliCombineRule::Fisher => CombineRule::Fisher,
        }
    }
}

/// Summary output format
#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
    Yaml,
}

/// Contaminant identification for microbiome feature tables
#[derive(Parser)]
#[command(name = "decontam")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Score every feature and write a score table
    Identify {
        /// Path to feature table TSV
        #[arg(short = 't', long)]
        table: PathBuf,

        /// Path to sample metadata TSV
        #[arg(short, long)]
        metadata: PathBuf,

        /// Output path for the score table TSV
        #[arg(short, long)]
        output: PathBuf,

        /// Parameter file (YAML); flags below override its values
        #[arg(long)]
        config: Option<PathBuf>,

        /// Scoring method: frequency, prevalence or combined
        #[arg(long)]
        method: Option<String>,

        /// Score threshold in (0, 1]
        #[arg(long)]
        threshold: Option<f64>,

        /// Metadata column with DNA concentrations (name or #index)
        #[arg(long)]
        freq_concentration_column: Option<String>,

        /// Metadata column marking control samples (name or #index)
        #[arg(long)]
        prev_control_or_exp_sample_column: Option<String>,

        /// Value in the control column that marks controls
        #[arg(long)]
        prev_control_sample_indicator: Option<String>,

        /// Prevalence test
        #[arg(long, value_enum)]
        prev_test: Option<CliPrevalenceTest>,

        /// Rule merging scores for the combined method
        #[arg(long, value_enum)]
        combine_rule: Option<CliCombineRule>,

        /// Feature table has samples as rows
        #[arg(long)]
        samples_as_rows: bool,
    },

    /// Remove contaminants from a feature table using a score table
    Remove {
        /// Path to feature table TSV
        #[arg(short = 't', long)]
        table: PathBuf,

        /// Path to score table TSV
        #[arg(short, long)]
        scores: PathBuf,

        /// Output path for the cleaned feature table TSV
        #[arg(short, long)]
        output: PathBuf,

        /// Score threshold in (0, 1]
        #[arg(long, default_value_t = DEFAULT_THRESHOLD)]
        threshold: f64,

        /// Feature table has samples as rows
        #[arg(long)]
        samples_as_rows: bool,
    },

    /// Summarize a score table at a threshold
    Summarize {
        /// Path to score table TSV
        #[arg(short, long)]
        scores: PathBuf,

        /// Score threshold in (0, 1]
        #[arg(long, default_value_t = DEFAULT_THRESHOLD)]
        threshold: f64,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// List scoring methods and file formats
    Methods,

    /// Write an example parameter file
    ExampleConfig {
        /// Output path for the YAML file
        #[arg(short, long)]
        output: PathBuf,
    },
}

fn main() {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();
    let registry = MethodRegistry::new();

    let result = match cli.command {
        Commands::Identify {
            table,
            metadata,
            output,
            config,
            method,
            threshold,
            freq_concentration_column,
            prev_control_or_exp_sample_column,
            prev_control_sample_indicator,
            prev_test,
            combine_rule,
            samples_as_rows,
        } => load_params(config.as_deref()).and_then(|mut params| {
            if let Some(name) = method {
                params.decon_method = registry.get(&name)?.method;
            }
            if let Some(t) = threshold {
                params.threshold = t;
            }
            if let Some(column) = freq_concentration_column {
                params.freq_concentration_column = Some(ColumnRef::parse(&column));
            }
            if let Some(column) = prev_control_or_exp_sample_column {
                params.prev_control_or_exp_sample_column = Some(ColumnRef::parse(&column));
            }
            if prev_control_sample_indicator.is_some() {
                params.prev_control_sample_indicator = prev_control_sample_indicator;
            }
            if let Some(test) = prev_test {
                params.prev_test = test.into();
            }
            if let Some(rule) = combine_rule {
                params.combine_rule = rule.into();
            }
            cmd_identify(&registry, &params, &table, &metadata, &output, samples_as_rows)
        }),

        Commands::Remove {
            table,
            scores,
            output,
            threshold,
            samples_as_rows,
        } => cmd_remove(&table, &scores, &output, threshold, samples_as_rows),

        Commands::Summarize {
            scores,
            threshold,
            format,
        } => cmd_summarize(&scores, threshold, format),

        Commands::Methods => {
            print!("{}", registry);
            Ok(())
        }

        Commands::ExampleConfig { output } => cmd_example_config(&output),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn load_params(path: Option<&Path>) -> Result<IdentifyParams> {
    match path {
        Some(path) => {
            info!("Loading parameters from {:?}", path);
            let yaml = std::fs::read_to_string(path)?;
            IdentifyParams::from_yaml(&yaml)
        }
        None => Ok(IdentifyParams::default()),
    }
}

fn load_table(path: &Path, samples_as_rows: bool) -> Result<CountMatrix> {
    let counts = if samples_as_rows {
        CountMatrix::from_tsv_samples_as_rows(path)?
    } else {
        CountMatrix::from_tsv(path)?
    };
    info!(
        "Loaded {} features x {} samples from {:?}",
        counts.n_features(),
        counts.n_samples(),
        path
    );
    Ok(counts)
}

/// Score features and write the score table
fn cmd_identify(
    registry: &MethodRegistry,
    params: &IdentifyParams,
    table_path: &Path,
    metadata_path: &Path,
    output_path: &Path,
    samples_as_rows: bool,
) -> Result<()> {
    let config = params.validate()?;
    let method = registry.get(config.plan.method().name())?;
    info!("Method: {} ({})", method.method, method.description);

    let counts = load_table(table_path, samples_as_rows)?;
    let metadata = Metadata::from_tsv(metadata_path)?;

    let scores = identify(&counts, &metadata, &config)?;
    scores.to_tsv(output_path)?;
    info!("Wrote {} scores to {:?}", scores.len(), output_path);
    Ok(())
}

/// Remove contaminants and write the cleaned table
fn cmd_remove(
    table_path: &Path,
    scores_path: &Path,
    output_path: &Path,
    threshold: f64,
    samples_as_rows: bool,
) -> Result<()> {
    let threshold = Threshold::new(threshold)?;
    let counts = load_table(table_path, samples_as_rows)?;
    let scores = ScoreTable::from_tsv(scores_path)?;

    let (cleaned, summary) = remove(&scores, &counts, threshold)?;
    cleaned.to_tsv(output_path)?;
    info!("Wrote cleaned table to {:?}", output_path);
    print!("{}", summary);
    Ok(())
}

/// Print a score summary
fn cmd_summarize(scores_path: &Path, threshold: f64, format: OutputFormat) -> Result<()> {
    let threshold = Threshold::new(threshold)?;
    let scores = ScoreTable::from_tsv(scores_path)?;
    let summary = summarize(&scores, threshold)?;

    match format {
        OutputFormat::Text => print!("{}", summary),
        OutputFormat::Json => println!("{}", summary.to_json()?),
        OutputFormat::Yaml => print!("{}", summary.to_yaml()?),
    }
    Ok(())
}

/// Generate example parameter file
fn cmd_example_config(output_path: &Path) -> Result<()> {
    let params = IdentifyParams {
        decon_method: DeconMethod::Combined,
        freq_concentration_column: Some(ColumnRef::parse("dna_concentration")),
        prev_control_or_exp_sample_column: Some(ColumnRef::parse("sample_type")),
        prev_control_sample_indicator: Some("control".to_string()),
        ..IdentifyParams::default()
    };
    let yaml = params.to_yaml()?;

    params.to_yaml_file(output_path)?;
    eprintln!("Wrote example parameters to {:?}", output_path);
    eprintln!();
    eprintln!("Contents:");
    println!("{}", yaml);
    Ok(())
}
