//! Command-line interface for the SLO burn rate rules generator.
//!
//! The CLI exposes a `generate` subcommand that compiles SLO spec files into
//! Prometheus rules and a `validate` subcommand that runs the same pipeline
//! without writing rules, reporting a per-file summary instead.

use std::{
    collections::BTreeMap,
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
    process,
    time::Duration,
};

use clap::{Args, Parser, Subcommand};
use isbg::{
    io_error, kubernetes_document, prometheus_document, validate_group, Dialect, Error,
    GeneratorInfo, RulesGenerator, SliPluginRegistry, SloFailure, SpecLoader, DAY,
    MODE_CLI_GEN_K8S, MODE_CLI_GEN_PROM, SUPPORTED_WINDOW_DAYS,
};

/// Command line interface for generating Prometheus SLO rules.
#[derive(Debug, Parser)]
#[command(
    name = "isbg",
    version,
    about = "Generate Prometheus SLO burn rate rules from declarative specifications"
)]
struct Cli {
    #[command(subcommand)]
    command: Command
}

#[derive(Debug, Subcommand)]
/// Supported commands exposed by the CLI.
enum Command {
    /// Generate Prometheus rules from SLO spec files.
    Generate(GenerateArgs),
    /// Validate SLO spec files and report a per-file summary.
    Validate(ValidateArgs)
}

/// Flags shared by every subcommand.
#[derive(Debug, Args)]
struct CommonArgs {
    /// SLO spec file to load (repeatable).
    #[arg(long = "input", short = 'i', value_name = "PATH", required = true)]
    input: Vec<PathBuf>,

    /// Extra labels added to every generated rule ('key=value' form, can be
    /// repeated).
    #[arg(long = "extra-labels", short = 'l', value_name = "KEY=VALUE")]
    extra_labels: Vec<String>,

    /// Path to SLI plugin manifests (repeatable); plugins are disabled when
    /// not set.
    #[arg(long = "plugins-path", short = 'p', value_name = "DIR")]
    plugins_path: Vec<PathBuf>,

    /// Number of days of the default SLO period.
    #[arg(long = "window-days", short = 'w', value_name = "DAYS", default_value_t = 30)]
    window_days: u64,

    /// Default SLO period as a day based duration (for example '30d'); takes
    /// precedence over --window-days.
    #[arg(long = "default-slo-period", value_name = "DURATION")]
    default_slo_period: Option<String>
}

#[derive(Debug, Args)]
/// Arguments accepted by the `generate` subcommand.
struct GenerateArgs {
    #[command(flatten)]
    common: CommonArgs,

    /// Output file for the generated rules; stdout when omitted.
    #[arg(long = "out", short = 'o', value_name = "PATH")]
    out: Option<PathBuf>
}

#[derive(Debug, Args)]
/// Arguments accepted by the `validate` subcommand.
struct ValidateArgs {
    #[command(flatten)]
    common: CommonArgs
}

/// Entry point that reports errors and sets the appropriate exit status.
fn main() {
    if let Err(error) = run() {
        eprintln!("{}", error.to_display_string());
        process::exit(1);
    }
}

/// Executes the CLI using parsed arguments.
///
/// # Errors
///
/// Propagates errors originating from spec loading, validation, rule
/// generation and output encoding.
fn run() -> Result<(), Error> {
    let cli = Cli::parse();

    match cli.command {
        Command::Generate(args) => run_generate(&args),
        Command::Validate(args) => {
            let stdout = io::stdout();
            let mut handle = stdout.lock();
            run_validate(&args, &mut handle)
        }
    }
}

fn run_generate(args: &GenerateArgs) -> Result<(), Error> {
    let extra_labels = parse_extra_labels(&args.common.extra_labels)?;
    let period = resolve_period(&args.common)?;
    let registry = build_registry(&args.common.plugins_path)?;
    let loader = SpecLoader::new(period);
    let generator = RulesGenerator::new();

    let mut documents = Vec::new();
    let mut failures: Vec<SloFailure> = Vec::new();

    for path in &args.common.input {
        let contents = fs::read_to_string(path).map_err(|source| io_error(path, source))?;

        for spec in loader.load_all(&contents)? {
            validate_group(&spec.group)?;

            let mode = match spec.dialect {
                Dialect::Kubernetes => MODE_CLI_GEN_K8S,
                Dialect::Native | Dialect::OpenSlo => MODE_CLI_GEN_PROM
            };
            let info = GeneratorInfo::new(mode, spec.dialect.api_version());
            let generated = generator.generate_group(&spec.group, &registry, &info, &extra_labels)?;

            let document = match spec.dialect {
                Dialect::Kubernetes => kubernetes_document(
                    &spec.kubernetes_meta.clone().unwrap_or_default(),
                    &generated.slos
                )?,
                Dialect::Native | Dialect::OpenSlo => prometheus_document(&generated.slos)?
            };
            documents.push(document);
            failures.extend(generated.failures);
        }
    }

    let output = documents.concat();
    match &args.out {
        Some(path) => {
            fs::write(path, output).map_err(|source| io_error(path, source))?;
        }
        None => {
            let stdout = io::stdout();
            let mut handle = stdout.lock();
            handle
                .write_all(output.as_bytes())
                .map_err(|source| io_error(Path::new("<stdout>"), source))?;
        }
    }

    if failures.is_empty() {
        Ok(())
    } else {
        Err(Error::group(failures))
    }
}

fn run_validate<W: Write>(args: &ValidateArgs, writer: &mut W) -> Result<(), Error> {
    let extra_labels = parse_extra_labels(&args.common.extra_labels)?;
    let period = resolve_period(&args.common)?;
    let registry = build_registry(&args.common.plugins_path)?;
    let loader = SpecLoader::new(period);
    let generator = RulesGenerator::new();

    let mut failed_files = 0usize;
    for path in &args.common.input {
        let result = validate_file(path, &loader, &generator, &registry, &extra_labels);
        let line = match result {
            Ok(slo_count) => format!("{}: OK ({slo_count} SLOs)", path.display()),
            Err(error) => {
                failed_files += 1;
                format!("{}: FAIL: {}", path.display(), error.to_display_string())
            }
        };
        writeln!(writer, "{line}").map_err(|source| io_error(path, source))?;
    }

    if failed_files == 0 {
        Ok(())
    } else {
        Err(Error::validation(format!(
            "validation failed for {failed_files} of {} file(s)",
            args.common.input.len()
        )))
    }
}

/// Runs the full load, validate and generate pipeline for one file and
/// returns how many SLOs it declares.
fn validate_file(
    path: &Path,
    loader: &SpecLoader,
    generator: &RulesGenerator,
    registry: &SliPluginRegistry,
    extra_labels: &BTreeMap<String, String>
) -> Result<usize, Error> {
    let contents = fs::read_to_string(path).map_err(|source| io_error(path, source))?;

    let mut slo_count = 0;
    for spec in loader.load_all(&contents)? {
        validate_group(&spec.group)?;
        slo_count += spec.group.slos.len();

        let info = GeneratorInfo::new(MODE_CLI_GEN_PROM, spec.dialect.api_version());
        let generated = generator.generate_group(&spec.group, registry, &info, extra_labels)?;
        let (_, error) = generated.into_parts();
        if let Some(error) = error {
            return Err(error);
        }
    }

    Ok(slo_count)
}

fn parse_extra_labels(raw: &[String]) -> Result<BTreeMap<String, String>, Error> {
    let mut labels = BTreeMap::new();
    for entry in raw {
        let (key, value) = entry.split_once('=').ok_or_else(|| {
            Error::validation(format!("extra label {entry:?} must use the 'key=value' form"))
        })?;
        labels.insert(key.to_owned(), value.to_owned());
    }

    Ok(labels)
}

fn resolve_period(args: &CommonArgs) -> Result<Duration, Error> {
    let days = match args.default_slo_period.as_deref() {
        Some(period) => period
            .strip_suffix('d')
            .and_then(|days| days.parse::<u64>().ok())
            .ok_or_else(|| {
                Error::validation(format!(
                    "default SLO period {period:?} must be a day based duration such as '30d'"
                ))
            })?,
        None => args.window_days
    };

    if !SUPPORTED_WINDOW_DAYS.contains(&days) {
        return Err(Error::validation(format!(
            "{days}d is not a supported SLO period (supported: 7, 14, 28, 30, 90)"
        )));
    }

    Ok(days as u32 * DAY)
}

fn build_registry(paths: &[PathBuf]) -> Result<SliPluginRegistry, Error> {
    let mut registry = SliPluginRegistry::new();
    if !paths.is_empty() {
        registry.discover(paths)?;
    }

    Ok(registry)
}
