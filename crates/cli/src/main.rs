use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};

use maihda_core as core;
use core::bootstrap::BootstrapConfig;
use core::data::DataFrame;
use core::fit::{FitOptions, FittedModel};
use core::pvc::{calculate_pvc, PvcOptions};
use core::report::{compare, summarize};
use core::strata::{build_strata, StrataOptions, StrataTable};

#[derive(Parser)]
#[command(name = "maihda")]
#[command(version)]
#[command(about = "Intersectional MAIHDA analyses: strata, variance partitioning and PVC")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Assign observations to intersectional strata
    Strata {
        /// Path to data CSV file
        #[arg(short, long)]
        data: String,

        /// Stratum variables (comma separated, e.g. "gender,race,education")
        #[arg(short, long, value_delimiter = ',', required = true)]
        vars: Vec<String>,

        #[command(flatten)]
        strata: StrataArgs,

        /// Write the data with its stratum column to this CSV file
        #[arg(short, long)]
        output: Option<String>,

        /// Write the stratum metadata (id, label, n, values) to this CSV file
        #[arg(long)]
        table: Option<String>,

        /// Output format: "text" (default) or "json"
        #[arg(long, default_value = "text")]
        format: String,
    },

    /// Fit a MAIHDA model and report its variance partition
    Fit {
        /// Path to data CSV file
        #[arg(short, long)]
        data: String,

        /// Model formula (e.g. "y ~ 1 + (1 | stratum)")
        #[arg(short = 'F', long)]
        formula: String,

        /// Build strata from these variables before fitting (comma separated)
        #[arg(short, long, value_delimiter = ',')]
        vars: Vec<String>,

        #[command(flatten)]
        strata: StrataArgs,

        #[command(flatten)]
        model: ModelArgs,

        #[command(flatten)]
        boot: BootArgs,

        /// Output format: "text" (default) or "json"
        #[arg(long, default_value = "text")]
        format: String,
    },

    /// Proportional change in between-stratum variance between two models
    Pvc {
        /// Path to data CSV file
        #[arg(short, long)]
        data: String,

        /// Reference (null) model formula
        #[arg(long)]
        null: String,

        /// Adjusted model formula
        #[arg(long)]
        adjusted: String,

        /// Build strata from these variables before fitting (comma separated)
        #[arg(short, long, value_delimiter = ',')]
        vars: Vec<String>,

        #[command(flatten)]
        strata: StrataArgs,

        #[command(flatten)]
        model: ModelArgs,

        #[command(flatten)]
        boot: BootArgs,

        /// Output format: "text" (default) or "json"
        #[arg(long, default_value = "text")]
        format: String,
    },

    /// Compare several models fit to the same data
    Compare {
        /// Path to data CSV file
        #[arg(short, long)]
        data: String,

        /// Model formulas (repeatable); PVC is reported against the first
        #[arg(short = 'F', long = "formula", required = true)]
        formulas: Vec<String>,

        /// Build strata from these variables before fitting (comma separated)
        #[arg(short, long, value_delimiter = ',')]
        vars: Vec<String>,

        #[command(flatten)]
        strata: StrataArgs,

        #[command(flatten)]
        model: ModelArgs,

        /// Output format: "text" (default) or "json"
        #[arg(long, default_value = "text")]
        format: String,
    },
}

#[derive(Args)]
struct StrataArgs {
    /// Separator joining variable values in stratum labels
    #[arg(long, default_value = "_")]
    separator: String,

    /// Minimum number of complete rows a combination needs to form a stratum
    #[arg(long, default_value = "1")]
    min_count: usize,
}

#[derive(Args)]
struct ModelArgs {
    /// Response family: gaussian, binomial or poisson
    #[arg(long, default_value = "gaussian")]
    family: String,

    /// Estimation engine
    #[arg(long, default_value = "reml")]
    engine: String,

    /// Maximum number of REML iterations
    #[arg(long, default_value = "1000")]
    max_iter: usize,

    /// Convergence tolerance
    #[arg(long, default_value = "1e-8")]
    tolerance: f64,
}

#[derive(Args)]
struct BootArgs {
    /// Number of bootstrap replicates (0 disables the bootstrap)
    #[arg(long, default_value = "0")]
    bootstrap: usize,

    /// Confidence level of bootstrap intervals
    #[arg(long, default_value = "0.95")]
    conf_level: f64,

    /// Seed for reproducible bootstrap resampling
    #[arg(long)]
    seed: Option<u64>,

    /// Run bootstrap replicates in parallel
    #[arg(long)]
    parallel: bool,
}

impl BootArgs {
    fn config(&self) -> Option<BootstrapConfig> {
        if self.bootstrap == 0 {
            return None;
        }
        let mut config = BootstrapConfig::new()
            .n_boot(self.bootstrap)
            .conf_level(self.conf_level)
            .parallel(self.parallel);
        if let Some(seed) = self.seed {
            config = config.seed(seed);
        }
        Some(config)
    }
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Strata {
            data,
            vars,
            strata,
            output,
            table,
            format,
        } => cmd_strata(
            &data,
            &vars,
            &strata,
            output.as_deref(),
            table.as_deref(),
            &format,
        ),
        Commands::Fit {
            data,
            formula,
            vars,
            strata,
            model,
            boot,
            format,
        } => cmd_fit(&data, &formula, &vars, &strata, &model, &boot, &format),
        Commands::Pvc {
            data,
            null,
            adjusted,
            vars,
            strata,
            model,
            boot,
            format,
        } => cmd_pvc(&data, &null, &adjusted, &vars, &strata, &model, &boot, &format),
        Commands::Compare {
            data,
            formulas,
            vars,
            strata,
            model,
            format,
        } => cmd_compare(&data, &formulas, &vars, &strata, &model, &format),
    }
}

fn load_data(path: &str) -> Result<DataFrame> {
    let df = DataFrame::from_csv(path)
        .with_context(|| format!("Failed to load data from '{}'", path))?;
    eprintln!(
        "Loaded {} observations, {} columns from '{}'",
        df.nrows(),
        df.ncols(),
        path
    );
    Ok(df)
}

/// Load the data and, when stratum variables are given, add the stratum
/// column. Every model fit afterwards shares the returned frame.
fn prepare(
    path: &str,
    vars: &[String],
    args: &StrataArgs,
) -> Result<(Arc<DataFrame>, Option<Arc<StrataTable>>)> {
    let df = load_data(path)?;
    if vars.is_empty() {
        return Ok((Arc::new(df), None));
    }
    let names: Vec<&str> = vars.iter().map(String::as_str).collect();
    let options = StrataOptions::new()
        .separator(&args.separator)
        .min_count(args.min_count);
    log::debug!(
        "building strata with separator {:?}, min_count {}",
        args.separator,
        args.min_count
    );
    let (df, table) = build_strata(&df, &names, &options).context("Failed to build strata")?;
    eprintln!(
        "Built {} strata from {} covering {} rows",
        table.len(),
        vars.join(", "),
        table.total_count()
    );
    Ok((Arc::new(df), Some(Arc::new(table))))
}

fn fit_model(
    formula: &str,
    df: &Arc<DataFrame>,
    table: Option<&Arc<StrataTable>>,
    args: &ModelArgs,
) -> Result<FittedModel> {
    let mut builder = FittedModel::builder()
        .formula(formula)
        .data(Arc::clone(df))
        .family_name(&args.family)
        .engine_name(&args.engine)
        .options(
            FitOptions::new()
                .max_iter(args.max_iter)
                .tolerance(args.tolerance),
        );
    if let Some(table) = table {
        builder = builder.strata(Arc::clone(table));
    }
    let model = builder
        .fit()
        .with_context(|| format!("Failed to fit '{}'", formula))?;
    eprintln!(
        "Fitted '{}' ({} family, {} engine) on {} observations",
        formula,
        model.family(),
        model.engine(),
        model.n_obs()
    );
    Ok(model)
}

fn cmd_strata(
    data_path: &str,
    vars: &[String],
    args: &StrataArgs,
    output: Option<&str>,
    table_path: Option<&str>,
    output_format: &str,
) -> Result<()> {
    let (df, table) = prepare(data_path, vars, args)?;
    let table = table.context("No stratum variables given")?;

    if let Some(path) = output {
        df.to_csv(path)
            .with_context(|| format!("Failed to write '{}'", path))?;
        eprintln!("Wrote stratified data to '{}'", path);
    }
    if let Some(path) = table_path {
        table
            .to_dataframe()
            .and_then(|meta| meta.to_csv(path))
            .with_context(|| format!("Failed to write '{}'", path))?;
        eprintln!("Wrote stratum metadata to '{}'", path);
    }

    match output_format.to_lowercase().as_str() {
        "json" => println!("{}", serde_json::to_string_pretty(&*table)?),
        _ => {
            println!("{:<8} {:<32} {:>8}", "stratum", "label", "n");
            for s in &table.strata {
                println!("{:<8} {:<32} {:>8}", s.stratum, s.label, s.n);
            }
            let dropped = df.nrows() - table.total_count();
            if dropped > 0 {
                println!("{} rows not assigned to a stratum", dropped);
            }
        }
    }
    Ok(())
}

fn cmd_fit(
    data_path: &str,
    formula: &str,
    vars: &[String],
    strata: &StrataArgs,
    model_args: &ModelArgs,
    boot: &BootArgs,
    output_format: &str,
) -> Result<()> {
    let (df, table) = prepare(data_path, vars, strata)?;
    let model = fit_model(formula, &df, table.as_ref(), model_args)?;

    let config = boot.config();
    if let Some(config) = &config {
        eprintln!("Bootstrapping the VPC with {} replicates", config.get_n_boot());
    }
    let summary = summarize(&model, config.as_ref()).context("Failed to summarize model")?;

    match output_format.to_lowercase().as_str() {
        "json" => println!("{}", serde_json::to_string_pretty(&summary)?),
        _ => println!("{}", summary),
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn cmd_pvc(
    data_path: &str,
    null_formula: &str,
    adjusted_formula: &str,
    vars: &[String],
    strata: &StrataArgs,
    model_args: &ModelArgs,
    boot: &BootArgs,
    output_format: &str,
) -> Result<()> {
    let (df, table) = prepare(data_path, vars, strata)?;
    let null = fit_model(null_formula, &df, table.as_ref(), model_args)?;
    let adjusted = fit_model(adjusted_formula, &df, table.as_ref(), model_args)?;

    let mut options = PvcOptions::new();
    if let Some(config) = boot.config() {
        eprintln!("Bootstrapping the PVC with {} replicates", config.get_n_boot());
        options = options.bootstrap(true).config(config);
    }
    let result = calculate_pvc(&null, &adjusted, &options).context("Failed to compute PVC")?;

    match output_format.to_lowercase().as_str() {
        "json" => println!("{}", serde_json::to_string_pretty(&result)?),
        _ => println!("{}", result),
    }
    Ok(())
}

fn cmd_compare(
    data_path: &str,
    formulas: &[String],
    vars: &[String],
    strata: &StrataArgs,
    model_args: &ModelArgs,
    output_format: &str,
) -> Result<()> {
    let (df, table) = prepare(data_path, vars, strata)?;
    let models = formulas
        .iter()
        .map(|f| fit_model(f, &df, table.as_ref(), model_args))
        .collect::<Result<Vec<_>>>()?;
    let named: Vec<(&str, &FittedModel)> = formulas
        .iter()
        .map(String::as_str)
        .zip(models.iter())
        .collect();
    let comparison = compare(&named).context("Failed to compare models")?;

    match output_format.to_lowercase().as_str() {
        "json" => println!("{}", serde_json::to_string_pretty(&comparison)?),
        _ => print!("{}", comparison),
    }
    Ok(())
}
