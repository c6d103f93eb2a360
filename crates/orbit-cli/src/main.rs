use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use orbit_edit::{ChartEditor, EditorConfig};
use orbit_model::format;
use orbit_model::{Chart, ChartFormat, LoadReport, SCROLL_LAYER_COUNT};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "orbit", about = "Inspect, check and convert ring rhythm-game charts")]
struct Cli {
    /// Show debug logs.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to the editor config JSON file.
    #[arg(long, global = true, env = "ORBIT_CONFIG", default_value = "orbit.json")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print metadata and counts.
    Info { file: PathBuf },
    /// Verify chains and start anchors; fails on the first problem.
    Check { file: PathBuf },
    /// Re-encode a chart, optionally in the other dialect.
    Convert {
        input: PathBuf,
        output: PathBuf,
        /// Output dialect; defaults to the output extension, then the config.
        #[arg(long)]
        format: Option<ChartFormat>,
    },
    /// Convert between measures and milliseconds.
    Timing(TimingArgs),
}

#[derive(Args, Debug)]
struct TimingArgs {
    file: PathBuf,
    #[arg(long, conflicts_with = "time", required_unless_present = "time")]
    measure: Option<f64>,
    /// Milliseconds from the start of the chart.
    #[arg(long)]
    time: Option<f64>,
    /// Scroll layer for the scaled position.
    #[arg(long, default_value_t = 0)]
    layer: usize,
    /// Apply hi-speed and stops to the scaled position.
    #[arg(long)]
    hi_speed: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let default_filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .init();

    let config = EditorConfig::read(&cli.config)
        .with_context(|| format!("Failed to read config {}", cli.config.display()))?;

    match cli.command {
        Command::Info { file } => info_command(&file),
        Command::Check { file } => check_command(&file),
        Command::Convert { input, output, format } => convert_command(config, &input, &output, format),
        Command::Timing(args) => timing_command(&args),
    }
}

fn load(path: &Path) -> Result<(Chart, LoadReport)> {
    let mut chart = Chart::new();
    let report =
        format::load_file(&mut chart, path).with_context(|| format!("Failed to load {}", path.display()))?;
    for line in &report.skipped_lines {
        warn!(path = %path.display(), line, "skipped line");
    }
    Ok((chart, report))
}

fn info_command(path: &Path) -> Result<()> {
    let (chart, report) = load(path)?;
    let meta = &chart.metadata;
    let chains = chart.notes().filter(|n| n.prev.is_none() && n.next.is_some()).count();

    println!("file:      {}", path.display());
    if let Some(format) = report.format {
        println!("format:    {format}");
    }
    println!("title:     {}", meta.title);
    println!("artist:    {}", meta.artist);
    println!("author:    {}", meta.author);
    println!("level:     {} (difficulty {})", meta.level, meta.difficulty);
    println!("notes:     {}", chart.note_count());
    println!("chains:    {chains}");
    println!("gimmicks:  {}", chart.gimmicks().len());
    match (chart.start_bpm(), chart.start_time_sig()) {
        (Some(bpm), Some(sig)) => println!("start:     {bpm} bpm, {}/{}", sig.upper, sig.lower),
        _ => println!("start:     missing tempo or time signature"),
    }
    if let Some(last) = chart.last_beat() {
        let ms = chart.beat_to_timestamp(&last);
        println!("last:      measure {} tick {} ({:.0} ms)", last.measure(), last.tick(), ms);
    }
    if !report.is_clean() {
        println!(
            "skipped:   {} lines, {} dropped links",
            report.skipped_lines.len(),
            report.dropped_links
        );
    }
    Ok(())
}

fn check_command(path: &Path) -> Result<()> {
    let (chart, report) = load(path)?;
    if chart.start_bpm().is_none() {
        bail!("{}: no tempo at tick 0", path.display());
    }
    if chart.start_time_sig().is_none() {
        bail!("{}: no time signature at tick 0", path.display());
    }
    chart
        .verify_chains()
        .with_context(|| format!("{}: broken chain", path.display()))?;
    if report.is_clean() {
        println!("{}: ok", path.display());
    } else {
        println!(
            "{}: ok ({} lines skipped, {} links dropped)",
            path.display(),
            report.skipped_lines.len(),
            report.dropped_links
        );
    }
    Ok(())
}

fn convert_command(config: EditorConfig, input: &Path, output: &Path, format: Option<ChartFormat>) -> Result<()> {
    let mut editor = ChartEditor::new(config);
    editor
        .load_file(input)
        .with_context(|| format!("Failed to load {}", input.display()))?;
    editor
        .save_file(output, format)
        .with_context(|| format!("Failed to write {}", output.display()))?;
    info!(input = %input.display(), output = %output.display(), "converted");
    Ok(())
}

fn timing_command(args: &TimingArgs) -> Result<()> {
    if args.layer >= SCROLL_LAYER_COUNT {
        bail!("layer must be below {SCROLL_LAYER_COUNT}, got {}", args.layer);
    }
    let (chart, _) = load(&args.file)?;
    if chart.metre().is_empty() {
        bail!("{}: no tempo and time signature at tick 0", args.file.display());
    }

    let (measure, time) = match (args.measure, args.time) {
        (Some(measure), _) => (measure, chart.measure_decimal_to_timestamp(measure)),
        (None, Some(time)) => (chart.timestamp_to_measure_decimal(time), time),
        (None, None) => bail!("either --measure or --time is required"),
    };
    let scaled = chart.scaled_measure_decimal(measure, args.hi_speed, args.layer);
    println!("measure: {measure:.6}");
    println!("time:    {time:.3} ms");
    println!("scaled:  {scaled:.6} (layer {})", args.layer);
    Ok(())
}
