//! The `orfdb` command line tool.
//!
//! ```shell
//! cargo run --release --bin=orfdb --features=binaries -- profile.toml merge
//! ```
//!
//! Every command takes a TOML configuration profile (see [`orfdb::config`]).

use std::io::Write as _;
use std::path::Path;
use std::path::PathBuf;

use anyhow::bail;
use anyhow::Context;
use anyhow::Result;
use clap::Parser;
use clap::Subcommand;
use clap_verbosity_flag::Verbosity;
use orfdb::annotation;
use orfdb::config::Config;
use orfdb::driver;
use orfdb::driver::Cancellation;
use orfdb::driver::Driver;
use orfdb::driver::Run;
use orfdb::driver::RunState;
use orfdb::export;
use orfdb::filter;
use orfdb::liftover::chain::Chains;
use orfdb::merge::Services;
use orfdb::orf::SourceId;
use orfdb::pipeline;
use orfdb::sequence::Fasta;
use orfdb::source::Registry;
use orfdb::stats::Summary;
use orfdb::store::snapshot;
use orfdb::store::Memory;
use orfdb::store::Store as _;
use orfdb::workers::Workers;
use tracing::info;
use tracing::warn;
use tracing_log::AsTrace as _;
use tracing_subscriber::EnvFilter;

////////////////////////////////////////////////////////////////////////////////////////
// Arguments
////////////////////////////////////////////////////////////////////////////////////////

/// The export format.
#[derive(Clone, Copy, Debug)]
enum Format {
    /// BED12.
    Bed,
    /// GFF3.
    Gff,
    /// Amino-acid FASTA.
    Fasta,
}

/// Where and what to export.
#[derive(Debug, clap::Args)]
struct ExportArgs {
    /// The output file (gzip-compressed if it ends in `.gz`).
    output: PathBuf,

    /// Only export the canonical ORFs selected by the last `filter`.
    #[arg(short, long, default_value_t = false)]
    filtered: bool,
}

/// A command.
#[derive(Debug, Subcommand)]
enum Command {
    /// Inserts the raw ORFs of the configured sources.
    Insert {
        /// Only insert these sources.
        #[arg(short, long = "source")]
        sources: Vec<String>,
    },

    /// Lifts pending and failed raw ORFs onto the current assembly.
    Liftover,

    /// Starts a new merge run.
    Merge {
        /// Overrides the configured batch size.
        #[arg(short, long)]
        batch_size: Option<usize>,
    },

    /// Resumes a failed or paused merge run.
    ResumeMerge {
        /// Overrides the configured batch size.
        #[arg(short, long)]
        batch_size: Option<usize>,
    },

    /// Shows the last merge run and a summary of the store.
    Status,

    /// Lists the gene conflicts awaiting review.
    Conflicts,

    /// Removes every raw ORF of a source.
    RemoveSource {
        /// The source.
        source: String,
    },

    /// Selects canonical ORFs with the configured filter rules.
    Filter,

    /// Writes canonical ORFs as BED12.
    ExportBed(ExportArgs),

    /// Writes canonical ORFs as GFF3.
    ExportGff(ExportArgs),

    /// Writes the amino-acid sequences of canonical ORFs as FASTA.
    ExportFasta(ExportArgs),

    /// Copies the store to a snapshot file.
    Backup {
        /// The snapshot file.
        path: PathBuf,
    },

    /// Replaces the store with a snapshot file.
    Restore {
        /// The snapshot file.
        path: PathBuf,
    },
}

/// Curates a database of open reading frames.
#[derive(Debug, Parser)]
#[command(version)]
struct Args {
    /// The configuration profile.
    profile: PathBuf,

    /// The command to run.
    #[command(subcommand)]
    command: Command,

    /// The verbosity.
    #[command(flatten)]
    verbose: Verbosity,
}

////////////////////////////////////////////////////////////////////////////////////////
// Commands
////////////////////////////////////////////////////////////////////////////////////////

/// Opens the configured store.
fn open_store(config: &Config) -> Result<Memory> {
    Memory::open(&config.store)
        .with_context(|| format!("opening store {}", config.store.display()))
}

/// Inserts the configured sources (or the selected ones).
fn insert(config: &Config, registry: &Registry, selected: &[String]) -> Result<()> {
    for id in selected {
        if config.source(id).is_none() {
            bail!("unknown source: {id}");
        }
    }

    let mut store = open_store(config)?;

    for source in &config.sources {
        if !selected.is_empty() && !selected.iter().any(|id| id == source.id.as_str()) {
            continue;
        }

        let parser = registry
            .get(&source.kind)
            .with_context(|| format!("getting the parser of {}", source.id))?;
        let mut reader = orfdb::io::open(&source.path)
            .with_context(|| format!("opening {}", source.path.display()))?;

        pipeline::insert(&mut store, parser, &source.id, &source.assembly, &mut reader)
            .with_context(|| format!("inserting {}", source.id))?;
    }

    Ok(())
}

/// Lifts pending raw ORFs.
fn liftover(config: &Config) -> Result<()> {
    let current = &config.assemblies.current;
    let mut chains = Chains::default();

    for (from, path) in &config.liftover.chains {
        chains
            .load(from.clone(), current.clone(), path)
            .with_context(|| format!("loading chain file {}", path.display()))?;
    }

    let workers = Workers::new(config.merge.workers).context("starting worker threads")?;
    let mut store = open_store(config)?;

    pipeline::lift_pending(
        &mut store,
        &chains,
        &config.retry,
        &workers,
        current,
        pipeline::DEFAULT_PAGE_SIZE,
    )
    .context("lifting raw ORFs")?;

    Ok(())
}

/// Starts or resumes a merge run.
fn merge(config: &Config, batch_size: Option<usize>, resume: bool) -> Result<()> {
    let annotation = annotation::Index::open(
        &config.annotation.gtf,
        config.annotation.aliases.as_deref(),
    )
    .context("loading the annotation")?;
    let reference = Fasta::open(&config.sequence.fasta).context("loading the reference")?;
    let workers = Workers::new(config.merge.workers).context("starting worker threads")?;
    let mut store = open_store(config)?;

    info!("merging on {} worker threads", workers.threads());

    let services = Services {
        annotation: &annotation,
        sequence: &reference,
        policy: &config.retry,
    };

    // An interrupt pauses the run once the batch in flight is committed.
    let cancellation = Cancellation::default();
    let handle = cancellation.clone();
    ctrlc::set_handler(move || {
        warn!("interrupted: pausing after the current batch");
        handle.cancel();
    })
    .context("installing the interrupt handler")?;

    let mut driver = Driver::new(&mut store, services, &workers)
        .with_batch_size(batch_size.unwrap_or(config.merge.batch_size))
        .with_cancellation(cancellation);

    let result = match resume {
        true => driver.resume(),
        false => driver.run(),
    };

    match result {
        Ok(Run { checkpoint, report }) => {
            println!("{checkpoint}");
            println!("{report}");

            if checkpoint.state == RunState::Paused {
                warn!("the merge run is paused: run `resume-merge` to continue");
            }

            Ok(())
        }
        Err(err) if err.is_retryable() => {
            Err(err).context("merging (run `resume-merge` to continue)")
        }
        Err(err) => Err(err).context("merging"),
    }
}

/// Shows the state of the store.
fn status(config: &Config) -> Result<()> {
    let store = open_store(config)?;
    let checkpoint = driver::status(&store).context("reading the checkpoint")?;
    let summary = Summary::collect(&store).context("summarizing the store")?;

    println!("last merge run: {checkpoint}");
    println!();
    println!("{summary}");

    Ok(())
}

/// Lists the gene conflicts.
fn conflicts(config: &Config) -> Result<()> {
    let store = open_store(config)?;
    let mut stdout = std::io::stdout().lock();

    writeln!(stdout, "raw\tlocus\tgenes\ttranscripts")?;

    for conflict in store.conflicts().context("reading the conflicts")? {
        let genes = conflict.genes.iter().cloned().collect::<Vec<_>>();
        let transcripts = conflict
            .transcripts
            .iter()
            .map(|t| t.to_string())
            .collect::<Vec<_>>();

        writeln!(
            stdout,
            "{}\t{}\t{}\t{}",
            conflict.raw,
            conflict.locus,
            genes.join(","),
            transcripts.join(",")
        )?;
    }

    Ok(())
}

/// Exports canonical ORFs.
fn export(config: &Config, format: Format, args: &ExportArgs) -> Result<()> {
    let store = open_store(config)?;
    let orfs = export::collect(&store, args.filtered).context("reading canonical ORFs")?;

    if args.filtered && orfs.is_empty() {
        warn!("no canonical ORFs are selected: run `filter` first");
    }

    let mut writer = orfdb::io::create(&args.output)
        .with_context(|| format!("creating {}", args.output.display()))?;

    match format {
        Format::Bed => export::write_bed(&mut writer, &orfs),
        Format::Gff => export::write_gff(&mut writer, &orfs),
        Format::Fasta => export::write_fasta(&mut writer, &orfs),
    }
    .with_context(|| format!("writing {}", args.output.display()))?;

    writer
        .finish()
        .with_context(|| format!("writing {}", args.output.display()))?;

    info!("wrote {} canonical ORFs to {}", orfs.len(), args.output.display());

    Ok(())
}

/// Replaces the store with a snapshot.
fn restore(config: &Config, path: &Path) -> Result<()> {
    let store = snapshot::load(path).with_context(|| format!("reading {}", path.display()))?;
    snapshot::save(&store, &config.store)
        .with_context(|| format!("writing {}", config.store.display()))?;

    info!("restored {} into {}", path.display(), config.store.display());

    Ok(())
}

/// Runs the command.
fn throw(args: Args) -> Result<()> {
    let registry = Registry::default();
    let config = Config::load(&args.profile, &registry)
        .with_context(|| format!("loading profile {}", args.profile.display()))?;

    match args.command {
        Command::Insert { sources } => insert(&config, &registry, &sources),
        Command::Liftover => liftover(&config),
        Command::Merge { batch_size } => merge(&config, batch_size, false),
        Command::ResumeMerge { batch_size } => merge(&config, batch_size, true),
        Command::Status => status(&config),
        Command::Conflicts => conflicts(&config),
        Command::RemoveSource { source } => {
            let mut store = open_store(&config)?;
            let removed = store
                .remove_source(&SourceId::new(source.as_str()))
                .with_context(|| format!("removing {source}"))?;
            info!("removed {removed} raw ORFs of {source}");
            Ok(())
        }
        Command::Filter => {
            let mut store = open_store(&config)?;
            let selection = filter::apply(&mut store, &config.filter).context("filtering")?;
            println!("selected {} of {}", selection.selected, selection.total);
            Ok(())
        }
        Command::ExportBed(export_args) => export(&config, Format::Bed, &export_args),
        Command::ExportGff(export_args) => export(&config, Format::Gff, &export_args),
        Command::ExportFasta(export_args) => export(&config, Format::Fasta, &export_args),
        Command::Backup { path } => {
            let store = open_store(&config)?;
            snapshot::save(&store, &path)
                .with_context(|| format!("writing {}", path.display()))?;
            info!("backed up {} to {}", config.store.display(), path.display());
            Ok(())
        }
        Command::Restore { path } => restore(&config, &path),
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    match std::env::var("RUST_LOG") {
        Ok(_) => tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .init(),
        Err(_) => tracing_subscriber::fmt()
            .with_max_level(args.verbose.log_level_filter().as_trace())
            .init(),
    };

    throw(args)
}
