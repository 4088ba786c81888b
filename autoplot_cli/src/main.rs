use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{anyhow, Context, Result};
use autoplot::{
    load_config_files, prepare_output_dir, AutoPlotter, AxisSpec, Catalogue, Dispatcher,
    FigureMetadata, OutputFormat, PlotDescriptor, RenderReport,
};
use chrono::Utc;
use clap::{ArgAction, Parser, Subcommand, ValueEnum, ValueHint};
use rayon::prelude::*;
use serde::Serialize;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod render;

use render::PlottersRenderer;

#[derive(Parser, Debug)]
#[command(author, version, about = "Declarative plotting for halo catalogues", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Render every plot described by the configuration files
    Plot(PlotArgs),
    /// Validate configuration files without touching a catalogue
    Check(CheckArgs),
}

#[derive(Parser, Debug)]
struct PlotArgs {
    /// Plot configuration files (YAML), read in order
    #[arg(short = 'c', long = "config", required = true, num_args = 1.., value_hint = ValueHint::FilePath)]
    config: Vec<PathBuf>,

    /// Catalogue properties file (JSON)
    #[arg(short = 'p', long = "properties", value_hint = ValueHint::FilePath)]
    properties: PathBuf,

    /// Output directory for figures
    #[arg(short, long, default_value = ".", value_hint = ValueHint::DirPath)]
    output: PathBuf,

    /// Figure file type
    #[arg(short = 'f', long = "file-type", value_enum, default_value_t = FileType::Png)]
    file_type: FileType,

    /// Debug logging
    #[arg(short, long, action = ArgAction::SetTrue)]
    debug: bool,

    /// Write a YAML summary of every rendered figure here
    #[arg(short, long, value_hint = ValueHint::FilePath)]
    metadata: Option<PathBuf>,

    /// Render figures on all cores
    #[arg(long, action = ArgAction::SetTrue)]
    parallel: bool,

    /// Figure width in pixels
    #[arg(long, default_value_t = 1024)]
    width: u32,

    /// Figure height in pixels
    #[arg(long, default_value_t = 768)]
    height: u32,
}

#[derive(Parser, Debug)]
struct CheckArgs {
    /// Plot configuration files (YAML), read in order
    #[arg(short = 'c', long = "config", required = true, num_args = 1.., value_hint = ValueHint::FilePath)]
    config: Vec<PathBuf>,

    /// Debug logging
    #[arg(short, long, action = ArgAction::SetTrue)]
    debug: bool,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum FileType {
    Png,
    Svg,
}

impl From<FileType> for OutputFormat {
    fn from(value: FileType) -> Self {
        match value {
            FileType::Png => OutputFormat::Png,
            FileType::Svg => OutputFormat::Svg,
        }
    }
}

#[derive(Serialize)]
struct RunMetadata<'a> {
    generated: String,
    catalogue: String,
    output_directory: String,
    figures: Vec<&'a FigureMetadata>,
    failures: Vec<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let debug = match &cli.command {
        Command::Plot(args) => args.debug,
        Command::Check(args) => args.debug,
    };
    let default_level = if debug { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();

    match cli.command {
        Command::Plot(args) => handle_plot(args),
        Command::Check(args) => handle_check(args),
    }
}

fn handle_plot(args: PlotArgs) -> Result<()> {
    let plotter = AutoPlotter::from_outcome(load_config_files(&args.config))
        .context("invalid plot configuration")?;
    info!(
        "Loaded {} plot definitions from {} file(s)",
        plotter.len(),
        args.config.len()
    );

    let catalogue = Catalogue::load(&args.properties)
        .with_context(|| format!("failed to load catalogue {}", args.properties.display()))?;
    prepare_output_dir(&args.output)
        .with_context(|| format!("failed to prepare {}", args.output.display()))?;

    let renderer = PlottersRenderer::new(args.width, args.height);
    let dispatcher = Dispatcher::new(&catalogue, &renderer);
    let extension = OutputFormat::from(args.file_type).extension();

    let t_render = Instant::now();
    let report: RenderReport = if args.parallel {
        plotter
            .plots()
            .par_iter()
            .map(|plot| dispatcher.render(plot, &args.output, extension))
            .collect::<Vec<_>>()
            .into_iter()
            .collect()
    } else {
        plotter.create_plots(&dispatcher, &args.output, extension)?
    };

    for failure in &report.failures {
        warn!("Skipping plot: {}", failure);
    }
    info!(
        "Rendered {} of {} plots into {} in {:.1} ms",
        report.rendered.len(),
        plotter.len(),
        args.output.display(),
        t_render.elapsed().as_secs_f64() * 1000.0
    );

    if let Some(path) = args.metadata.as_ref() {
        write_metadata(path, &args, &report)?;
        info!("Metadata written to {}", path.display());
    }

    if !report.is_success() {
        return Err(anyhow!(
            "{} of {} plots failed to render",
            report.failures.len(),
            plotter.len()
        ));
    }
    Ok(())
}

fn write_metadata(path: &Path, args: &PlotArgs, report: &RenderReport) -> Result<()> {
    let metadata = RunMetadata {
        generated: Utc::now().to_rfc3339(),
        catalogue: args.properties.display().to_string(),
        output_directory: args.output.display().to_string(),
        figures: report.rendered.iter().map(|plot| &plot.metadata).collect(),
        failures: report.failures.iter().map(|e| e.to_string()).collect(),
    };
    let text = serde_yaml::to_string(&metadata)?;
    fs::write(path, text).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(())
}

fn handle_check(args: CheckArgs) -> Result<()> {
    let outcome = load_config_files(&args.config);
    for plot in &outcome.plots {
        println!("{}", describe(plot));
    }
    for error in &outcome.errors {
        println!("error: {}", error);
    }
    info!(
        "{} valid, {} invalid plot entries",
        outcome.plots.len(),
        outcome.errors.len()
    );
    if !outcome.is_ok() {
        return Err(anyhow!(
            "{} invalid plot entries",
            outcome.errors.len()
        ));
    }
    Ok(())
}

fn describe_axis(axis: &AxisSpec) -> String {
    let quantity = axis.quantity_name().unwrap_or_else(|| "-".to_string());
    let scale = if axis.log_scale { "log" } else { "linear" };
    let bound = |q: Option<&autoplot::Quantity>| {
        q.map(|q| q.value.to_string()).unwrap_or_else(|| "auto".to_string())
    };
    format!(
        "{} [{}] {} {}..{}",
        quantity,
        axis.unit,
        scale,
        bound(axis.limit_lower.as_ref()),
        bound(axis.limit_upper.as_ref())
    )
}

fn describe(plot: &PlotDescriptor) -> String {
    let mut text = format!(
        "{} ({})\n  x: {}\n  y: {}",
        plot.name(),
        plot.plot_type(),
        describe_axis(plot.x()),
        describe_axis(plot.y())
    );
    if let Some(count) = plot.bin_count() {
        text.push_str(&format!("\n  bins: {}", count));
    }
    if !plot.overlays().is_empty() {
        let kinds: Vec<&str> = plot.overlays().iter().map(|o| o.kind.key()).collect();
        text.push_str(&format!("\n  lines: {}", kinds.join(", ")));
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use tempfile::TempDir;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_plot_arguments() {
        let cli = Cli::try_parse_from([
            "autoplot", "plot", "-c", "a.yml", "b.yml", "-p", "halos.json", "-f", "svg", "-o",
            "figures", "--parallel",
        ])
        .unwrap();
        match cli.command {
            Command::Plot(args) => {
                assert_eq!(args.config, vec![PathBuf::from("a.yml"), PathBuf::from("b.yml")]);
                assert_eq!(args.properties, PathBuf::from("halos.json"));
                assert_eq!(args.file_type, FileType::Svg);
                assert_eq!(args.output, PathBuf::from("figures"));
                assert!(args.parallel);
                assert!(!args.debug);
                assert_eq!((args.width, args.height), (1024, 768));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_plot_defaults_and_rejections() {
        let cli = Cli::try_parse_from(["autoplot", "plot", "-c", "a.yml", "-p", "h.json"]).unwrap();
        match cli.command {
            Command::Plot(args) => {
                assert_eq!(args.output, PathBuf::from("."));
                assert_eq!(args.file_type, FileType::Png);
                assert!(args.metadata.is_none());
            }
            other => panic!("unexpected command {other:?}"),
        }
        assert!(Cli::try_parse_from(["autoplot", "plot", "-c", "a.yml", "-p", "h.json", "-f", "pdf"]).is_err());
        assert!(Cli::try_parse_from(["autoplot", "plot", "-p", "h.json"]).is_err());
    }

    #[test]
    fn test_describe_lists_bins_and_lines() {
        let plotter = AutoPlotter::from_yaml_str(
            "hmf:\n  type: massfunction\n  number_of_bins: 32\n  x: {quantity: masses.m200, units: Solar_Mass, start: 1e10, end: 1e15}\nsmhm:\n  x: {quantity: masses.m200, units: Solar_Mass}\n  y: {quantity: masses.mstar, units: Solar_Mass, log: false}\n  median:\n",
        )
        .unwrap();
        let hmf = describe(&plotter.plots()[0]);
        assert!(hmf.starts_with("hmf (massfunction)"));
        assert!(hmf.contains("bins: 32"));
        assert!(hmf.contains("y: - [dimensionless] log auto..auto"));
        let smhm = describe(&plotter.plots()[1]);
        assert!(smhm.contains("masses.mstar [Solar_Mass] linear auto..auto"));
        assert!(smhm.contains("lines: median"));
    }

    #[test]
    fn test_metadata_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("meta.yml");
        let cli = Cli::try_parse_from(["autoplot", "plot", "-c", "a.yml", "-p", "h.json"]).unwrap();
        let args = match cli.command {
            Command::Plot(args) => args,
            other => panic!("unexpected command {other:?}"),
        };
        let report = RenderReport {
            rendered: Vec::new(),
            failures: vec![autoplot::AutoplotError::MissingNormalization {
                plot: "hmf".to_string(),
            }],
        };
        write_metadata(&path, &args, &report).unwrap();
        let text = fs::read_to_string(&path).unwrap();
        assert!(text.contains("catalogue: h.json"));
        assert!(text.contains("plot `hmf`"));
        assert!(text.contains("generated:"));
    }
}
