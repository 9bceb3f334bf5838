use actcraft_core::flavors::registry::{all_flavor_ids, create_all_flavors};
use actcraft_core::{ActGenerator, GeneratorConfig, OutputMode};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod formatter;

#[derive(Parser)]
#[command(name = "actgen")]
#[command(about = "Generate hidden-works acts from an XLSX register and an act template", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to configuration file (TOML)
    #[arg(short, long, value_name = "CONFIG")]
    config: Option<PathBuf>,

    /// Act flavor (see `actgen flavors`)
    #[arg(long)]
    flavor: Option<String>,

    /// Workbook with one record per row
    #[arg(short, long, value_name = "FILE")]
    source: Option<PathBuf>,

    /// Workbook holding the act template sheet
    #[arg(short, long, value_name = "FILE")]
    template: Option<PathBuf>,

    /// Output directory, or workbook file with --mode workbook
    #[arg(short, long, value_name = "PATH")]
    output: Option<PathBuf>,

    /// One file per act or one workbook with a sheet per act
    #[arg(short, long, value_enum)]
    mode: Option<Mode>,

    /// First data row of the source sheet (1-based)
    #[arg(long, value_name = "N")]
    start_row: Option<u32>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "human")]
    format: OutputFormat,

    /// Assemble every act without writing files
    #[arg(long)]
    dry_run: bool,

    /// Log every act and skipped row
    #[arg(short, long, conflicts_with = "quiet")]
    verbose: bool,

    /// Log warnings and errors only
    #[arg(short, long)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Command {
    /// List the available act flavors
    Flavors,
}

#[derive(Clone, Copy, ValueEnum)]
enum Mode {
    PerRecord,
    Workbook,
}

impl From<Mode> for OutputMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::PerRecord => OutputMode::PerRecord,
            Mode::Workbook => OutputMode::Workbook,
        }
    }
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    /// Human-readable colored output
    Human,
    /// JSON output for scripting
    Json,
}

fn init_logging(cli: &Cli) {
    let default_level = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "warn"
    } else {
        "info"
    };
    let filter = if cli.verbose || cli.quiet {
        EnvFilter::new(default_level)
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn load_config(cli: &Cli) -> Result<GeneratorConfig> {
    let mut config = if let Some(config_path) = &cli.config {
        GeneratorConfig::from_file(config_path)
            .with_context(|| format!("Failed to load config from {}", config_path.display()))?
    } else {
        // Try to load default config from current directory if it exists
        let default_config_path = PathBuf::from("actgen.toml");
        if default_config_path.exists() {
            GeneratorConfig::from_file(&default_config_path).with_context(|| {
                format!(
                    "Failed to load config from {}",
                    default_config_path.display()
                )
            })?
        } else {
            GeneratorConfig::default()
        }
    };

    // Command line wins over the file
    if let Some(flavor) = &cli.flavor {
        config.flavor = flavor.clone();
    }
    if let Some(source) = &cli.source {
        config.source_path = source.clone();
    }
    if let Some(template) = &cli.template {
        config.template_path = template.clone();
    }
    if let Some(output) = &cli.output {
        config.output_path = output.clone();
    }
    if let Some(mode) = cli.mode {
        config.output_mode = mode.into();
    }
    if let Some(start_row) = cli.start_row {
        config.start_row = start_row;
    }
    config.dry_run = cli.dry_run;

    config
        .validate(&all_flavor_ids())
        .context("Invalid configuration")?;
    Ok(config)
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Some(Command::Flavors) = cli.command {
        let flavors = create_all_flavors();
        match cli.format {
            OutputFormat::Human => formatter::print_flavors_human(&flavors),
            OutputFormat::Json => formatter::print_flavors_json(&flavors)?,
        }
        return Ok(());
    }

    init_logging(&cli);

    let config = load_config(&cli)?;
    let generator = ActGenerator::new(config)?;

    let report = match generator.run() {
        Ok(report) => report,
        Err(e) => {
            tracing::error!("{:#}", e);
            std::process::exit(1);
        }
    };

    match cli.format {
        OutputFormat::Human => formatter::print_human(&report),
        OutputFormat::Json => formatter::print_json(&report)?,
    }

    // Failed records are reported, not fatal
    Ok(())
}
