use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use codec::{CodecLimits, CodecRegistry};
use glob::Pattern;
use tools::{format_report, inspect_packet, run_simulation, SimulationConfig, SimulationReport};

#[derive(Parser)]
#[command(
    name = "ghostsync-tools",
    version,
    about = "ghostsync packet inspection and link simulation"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Inspect packet structure, slices and sizes.
    Inspect {
        /// Packet file, or a directory of packet files.
        packet_path: PathBuf,
        /// Schema JSON; enables field values of full slices and ack contents.
        #[arg(long)]
        schema: Option<PathBuf>,
        /// Optional glob filter when inspecting a directory.
        #[arg(long)]
        glob: Option<String>,
        /// Sort inspected packets.
        #[arg(long, value_enum)]
        sort: Option<InspectSort>,
        /// Limit the number of inspected packets (after sorting).
        #[arg(long)]
        limit: Option<usize>,
        #[arg(long, value_enum, default_value_t = OutputFormat::Pretty)]
        format: OutputFormat,
    },
    /// Run a server and a client over a seeded lossy link.
    Simulate {
        /// Simulation config JSON; missing keys take their defaults.
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long)]
        seed: Option<u64>,
        #[arg(long)]
        ticks: Option<u32>,
        /// Snapshot packet loss probability.
        #[arg(long)]
        loss: Option<f64>,
        #[arg(long, value_enum, default_value_t = OutputFormat::Pretty)]
        format: OutputFormat,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum InspectSort {
    Size,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Json,
    Pretty,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Inspect {
            packet_path,
            schema,
            glob,
            sort,
            limit,
            format,
        } => {
            let registry = schema
                .as_deref()
                .map(load_registry)
                .transpose()
                .context("load schema")?;
            if packet_path.is_dir() {
                let entries = collect_packet_entries(&packet_path, glob.as_deref())?;
                let mut entries = maybe_sort_entries(entries, sort);
                let limit = limit.or(sort.map(|InspectSort::Size| 10));
                if let Some(limit) = limit {
                    entries.truncate(limit);
                }
                for entry in entries {
                    if format == OutputFormat::Pretty {
                        println!("== {} ({} bytes) ==", entry.path.display(), entry.size);
                    }
                    inspect_file(&entry.path, registry.as_ref(), format)?;
                }
            } else {
                inspect_file(&packet_path, registry.as_ref(), format)?;
            }
        }
        Command::Simulate {
            config,
            seed,
            ticks,
            loss,
            format,
        } => {
            let mut config = match config {
                Some(path) => {
                    let contents = fs::read_to_string(&path)
                        .with_context(|| format!("read config {}", path.display()))?;
                    serde_json::from_str(&contents).context("parse config json")?
                }
                None => SimulationConfig::default(),
            };
            if let Some(seed) = seed {
                config.seed = seed;
            }
            if let Some(ticks) = ticks {
                config.ticks = ticks;
            }
            if let Some(loss) = loss {
                config.snapshot_loss = loss;
            }
            let report = run_simulation(&config)?;
            match format {
                OutputFormat::Json => {
                    let json = serde_json::to_string_pretty(&report).context("serialize json")?;
                    println!("{json}");
                }
                OutputFormat::Pretty => print_simulation_report(&report),
            }
        }
    }
    Ok(())
}

fn load_registry(path: &Path) -> Result<CodecRegistry> {
    let contents =
        fs::read_to_string(path).with_context(|| format!("read schema {}", path.display()))?;
    let schema: schema::Schema = serde_json::from_str(&contents).context("parse schema json")?;
    schema.validate().context("schema validation failed")?;
    Ok(CodecRegistry::new(&schema)?)
}

fn inspect_file(path: &Path, registry: Option<&CodecRegistry>, format: OutputFormat) -> Result<()> {
    let bytes = fs::read(path).with_context(|| format!("read packet {}", path.display()))?;
    let report = inspect_packet(
        &bytes,
        registry,
        &wire::Limits::default(),
        &CodecLimits::default(),
    )
    .with_context(|| format!("inspect {}", path.display()))?;
    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&report).context("serialize json")?;
            println!("{json}");
        }
        OutputFormat::Pretty => print!("{}", format_report(&report)),
    }
    Ok(())
}

struct PacketEntry {
    path: PathBuf,
    size: u64,
}

fn collect_packet_entries(dir: &Path, glob: Option<&str>) -> Result<Vec<PacketEntry>> {
    let mut entries = Vec::new();
    let pattern = match glob {
        Some(value) => Some(Pattern::new(value).context("invalid glob pattern")?),
        None => None,
    };

    for entry in fs::read_dir(dir).with_context(|| format!("read dir {}", dir.display()))? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        if let Some(pattern) = &pattern {
            let matches_path = pattern.matches_path(&path);
            let matches_name = path
                .file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| pattern.matches(name));
            if !matches_path && !matches_name {
                continue;
            }
        }
        let size = entry.metadata()?.len();
        entries.push(PacketEntry { path, size });
    }
    entries.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(entries)
}

fn maybe_sort_entries(
    mut entries: Vec<PacketEntry>,
    sort: Option<InspectSort>,
) -> Vec<PacketEntry> {
    match sort {
        Some(InspectSort::Size) => {
            entries.sort_by(|a, b| b.size.cmp(&a.size).then_with(|| a.path.cmp(&b.path)));
        }
        None => {}
    }
    entries
}

fn print_simulation_report(report: &SimulationReport) {
    println!("ticks: {} entities: {}", report.ticks, report.entities);
    println!(
        "snapshots: {} sent, {} lost; acks lost: {}",
        report.packets_sent, report.packets_lost, report.acks_lost
    );
    println!(
        "bytes: {} total, {:.1} mean, {} max per packet",
        report.bytes_sent, report.mean_packet_bytes, report.max_packet_bytes
    );
    println!(
        "slices: {} sent, {} deferred, {} encode failures",
        report.slices_sent, report.deferred, report.encode_failures
    );
    println!(
        "client: {} mismatches, {} resync requests, {} despawns",
        report.mismatches, report.resync_requests, report.despawns
    );
    println!("server: {} full resyncs", report.resyncs);
    println!("in sync: {}/{}", report.in_sync, report.entities);
}
