use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tokio::signal;
use tracing::{Instrument, error, info, info_span, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use uuid::Uuid;

use tutanak::models::MergeReason;
use tutanak::{
    DedupConfig, DedupPaths, DiscoveryFilter, ElasticsearchConfig, ElasticsearchSink, EmitterConfig,
    IdentityCache, IdentityLookup, IdentityResolver, JsonLinesSink, MemorySink, NoLookup,
    PipelineConfig, ResolverConfig, RunOutcome, RunStats, SpeechSink, WikipediaConfig, WikipediaLookup,
    deduplicate_file, parse_session, read_session, run_with_shutdown, session_file_for_path,
    write_failed_records,
};

#[derive(Parser)]
#[command(name = "tutanak")]
#[command(author, version, about = "Parliamentary transcript parsing and speaker identity pipeline", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse every session under a transcript root and index the speeches
    Process(ProcessArgs),

    /// Parse a single transcript and report what was found, without emitting
    Analyze {
        /// Transcript file (result.mmd or session .txt)
        #[arg(short, long)]
        input: PathBuf,

        /// Term, when the file is not inside a d{T}-y{Y}_txts directory
        #[arg(long)]
        term: Option<u32>,

        /// Legislative year
        #[arg(long)]
        year: Option<u32>,

        /// Verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Merge duplicate and variant names in the identity table
    Dedupe {
        /// Identity table (CSV)
        #[arg(short, long, default_value = "mp_lookup.csv")]
        input: PathBuf,

        /// Where to write the deduplicated table (defaults to the input)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Merge audit log (CSV)
        #[arg(long)]
        log: Option<PathBuf>,

        /// Similarity of the leading words needed to merge two names
        #[arg(long, default_value = "0.9")]
        threshold: f64,

        /// Names longer than this are flagged for review
        #[arg(long, default_value = "45")]
        max_name_length: usize,

        /// Verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Look a speaker up on Wikipedia without touching the identity table
    Lookup {
        /// Speaker name
        name: String,

        /// Verbose output
        #[arg(short, long)]
        verbose: bool,
    },
}

#[derive(Args)]
struct ProcessArgs {
    /// Directory containing the d{T}-y{Y}_txts folders
    #[arg(short, long)]
    root: PathBuf,

    /// Only process this term
    #[arg(long)]
    term: Option<u32>,

    /// Only process this legislative year of the term
    #[arg(long, requires = "term")]
    year: Option<u32>,

    /// Identity table (CSV), created if missing
    #[arg(long, default_value = "mp_lookup.csv")]
    cache: PathBuf,

    /// Write records to a JSON Lines file instead of Elasticsearch
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Elasticsearch URL (overrides ELASTICSEARCH_HOST)
    #[arg(long)]
    es_url: Option<String>,

    /// Elasticsearch index (overrides ELASTICSEARCH_INDEX)
    #[arg(long)]
    index: Option<String>,

    /// Parse and resolve without writing records anywhere
    #[arg(long)]
    dry_run: bool,

    /// Leave records the store already holds untouched
    #[arg(long)]
    skip_existing: bool,

    /// Records per upsert request
    #[arg(long, default_value = "500")]
    batch_size: usize,

    /// Resolve identities from the table only, without Wikipedia lookups
    #[arg(long)]
    offline: bool,

    /// Where to report records the store rejected (defaults to
    /// failed_docs.json beside the identity table)
    #[arg(long)]
    failed_docs: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Process(args) => {
            setup_logging(args.verbose);
            process_sessions(args).await
        }
        Commands::Analyze {
            input,
            term,
            year,
            verbose,
        } => {
            setup_logging(verbose);
            analyze_transcript(input, term, year)
        }
        Commands::Dedupe {
            input,
            output,
            log,
            threshold,
            max_name_length,
            verbose,
        } => {
            setup_logging(verbose);
            dedupe_table(input, output, log, threshold, max_name_length)
        }
        Commands::Lookup { name, verbose } => {
            setup_logging(verbose);
            lookup_name(name).await
        }
    }
}

fn setup_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber).ok();
}

async fn process_sessions(args: ProcessArgs) -> Result<()> {
    let run_id = Uuid::new_v4().to_string();
    let span = info_span!("run", run_id = %run_id);

    let config = PipelineConfig {
        root: args.root.clone(),
        filter: DiscoveryFilter {
            term: args.term,
            year: args.year,
        },
        emitter: EmitterConfig {
            batch_size: args.batch_size,
            skip_existing: args.skip_existing,
            ..Default::default()
        },
        ..Default::default()
    };

    let cache = IdentityCache::load(&args.cache).context("Failed to load identity table")?;

    if args.offline {
        info!("Offline mode: identities come from the table only");
        let resolver = IdentityResolver::new(cache, NoLookup, ResolverConfig::default());
        with_sink(&args, &config, resolver, run_id).instrument(span).await
    } else {
        let lookup = WikipediaLookup::new(WikipediaConfig::from_env())
            .context("Failed to build Wikipedia client")?;
        let resolver = IdentityResolver::new(cache, lookup, ResolverConfig::default());
        with_sink(&args, &config, resolver, run_id).instrument(span).await
    }
}

async fn with_sink<L: IdentityLookup>(
    args: &ProcessArgs,
    config: &PipelineConfig,
    resolver: IdentityResolver<L>,
    run_id: String,
) -> Result<()> {
    let failed_docs = args
        .failed_docs
        .clone()
        .unwrap_or_else(|| args.cache.with_file_name("failed_docs.json"));

    if args.dry_run {
        info!("Dry run: records are kept in memory only");
        let sink = MemorySink::new();
        return run_until_shutdown(config, resolver, &sink, run_id, &failed_docs).await;
    }

    if let Some(path) = &args.output {
        info!("Writing records to {:?}", path);
        let sink = JsonLinesSink::open(path).context("Failed to open output file")?;
        return run_until_shutdown(config, resolver, &sink, run_id, &failed_docs).await;
    }

    let mut es_config = ElasticsearchConfig::from_env();
    if let Some(url) = &args.es_url {
        es_config.url = url.clone();
    }
    if let Some(index) = &args.index {
        es_config.index = index.clone();
    }
    info!("Indexing records into {}/{}", es_config.url, es_config.index);
    let sink = ElasticsearchSink::new(es_config);
    run_until_shutdown(config, resolver, &sink, run_id, &failed_docs).await
}

/// Run the pipeline until it finishes or a shutdown signal arrives. Failed
/// records are reported and the summary printed either way.
async fn run_until_shutdown<L: IdentityLookup, S: SpeechSink>(
    config: &PipelineConfig,
    mut resolver: IdentityResolver<L>,
    sink: &S,
    run_id: String,
    failed_docs: &Path,
) -> Result<()> {
    let mut stats = RunStats::new(run_id);

    let outcome = run_with_shutdown(config, &mut resolver, sink, &mut stats, shutdown_signal()).await;

    if !stats.failures.is_empty() {
        match write_failed_records(failed_docs, &stats.failures) {
            Ok(()) => warn!("{} failed records written to {:?}", stats.failures.len(), failed_docs),
            Err(e) => error!("Failed to write {:?}: {}", failed_docs, e),
        }
    }

    print_run_summary(&stats, matches!(outcome, Ok(RunOutcome::Interrupted)));

    outcome.map(|_| ())
}

fn print_run_summary(stats: &RunStats, interrupted: bool) {
    println!();
    if interrupted {
        println!("Run Summary (interrupted)");
    } else {
        println!("Run Summary");
    }
    println!("===========");
    println!("Run id: {}", stats.run_id);
    println!(
        "Sessions: {} discovered, {} processed, {} skipped, {} unreadable",
        stats.sessions_discovered,
        stats.sessions_processed,
        stats.sessions_skipped,
        stats.sessions_unreadable
    );
    println!(
        "Sessions without index: {}, without transcript: {}, numbering breaks: {}",
        stats.sessions_without_index, stats.sessions_without_transcript, stats.sequence_breaks
    );
    println!("Summaries found: {}", stats.summaries_found);
    println!("Speeches extracted: {}", stats.speeches_extracted);
    println!("Summaries without speech: {}", stats.summaries_without_speech);
    println!();

    println!("Identities");
    println!("----------");
    println!(
        "Exact: {}, fuzzy: {}, external: {}, not found: {}, lookup failures: {}",
        stats.identity.exact_hits,
        stats.identity.fuzzy_hits,
        stats.identity.external_hits,
        stats.identity.negative_results,
        stats.identity.lookup_failures
    );
    println!();

    println!("Records");
    println!("-------");
    println!(
        "Emitted: {}, skipped existing: {}, failed: {}",
        stats.emit.emitted, stats.emit.skipped_existing, stats.emit.failed
    );
}

fn analyze_transcript(input: PathBuf, term: Option<u32>, year: Option<u32>) -> Result<()> {
    info!("Analyzing transcript from {:?}", input);
    let file = session_file_for_path(&input, term, year)?;
    let session = read_session(&file)?
        .with_context(|| format!("Cannot derive a session number from {:?}", file.session_name))?;

    let dialect = session.dialect();
    let session_id = session.session_id.clone();
    let parsed = parse_session(session);

    println!("Transcript Analysis");
    println!("==================");
    println!("Session: {}", session_id);
    println!("Dialect: {:?}", dialect);
    println!("Index found: {}", parsed.summaries.index_found);
    println!("Summaries: {}", parsed.summaries.summaries.len());
    if let Some(brk) = parsed.summaries.sequence_break {
        println!("Numbering break: expected {}, found {}", brk.expected, brk.found);
    }
    println!("Transcript section found: {}", parsed.boundaries.transcript_found);
    println!();

    println!("Speeches");
    println!("--------");
    for summary in &parsed.summaries.summaries {
        let located = parsed
            .boundaries
            .speeches
            .iter()
            .find(|s| s.summary.speech_no == summary.speech_no);
        let status = match located {
            Some(speech) => format!("{} chars", speech.content.chars().count()),
            None => "not found".to_string(),
        };
        println!(
            "{}. {} ({}): {} [{}]",
            summary.speech_no, summary.speech_giver, summary.province, summary.speech_title, status
        );
    }

    Ok(())
}

fn dedupe_table(
    input: PathBuf,
    output: Option<PathBuf>,
    log: Option<PathBuf>,
    threshold: f64,
    max_name_length: usize,
) -> Result<()> {
    let mut paths = DedupPaths::for_input(&input);
    if let Some(output) = output {
        paths.output = output;
    }
    if let Some(log) = log {
        paths.log = log;
    }

    let config = DedupConfig {
        similarity_threshold: threshold,
        max_name_length,
        ..Default::default()
    };

    let report = deduplicate_file(&paths, &config).context("Deduplication failed")?;

    println!("Deduplication Summary");
    println!("=====================");
    println!("Original entries: {}", report.original_count);
    println!("After normalization: {}", report.normalized_count);
    println!("Final entries: {}", report.table.len());
    let removed = report.original_count - report.table.len();
    let reduction = if report.original_count > 0 {
        removed as f64 / report.original_count as f64 * 100.0
    } else {
        0.0
    };
    println!("Removed: {} ({:.1}%)", removed, reduction);
    println!(
        "Merges: {} by normalization, {} by similarity",
        report.count(MergeReason::DirectNormalization),
        report.count(MergeReason::FuzzyMatch)
    );
    println!("Audit log: {:?}", paths.log);

    if !report.problematic.is_empty() {
        println!();
        println!("Names to review");
        println!("---------------");
        for entry in &report.problematic {
            println!("{}: {}", entry.name, entry.reasons.join("; "));
        }
    }

    Ok(())
}

async fn lookup_name(name: String) -> Result<()> {
    let lookup = WikipediaLookup::new(WikipediaConfig::from_env()).context("Failed to build Wikipedia client")?;

    match lookup.lookup(&name).await? {
        Some(identity) => {
            println!("Name: {}", name);
            println!("Party: {}", identity.party.as_deref().unwrap_or("-"));
            println!("Terms: {:?}", identity.terms);
        }
        None => println!("No Wikipedia entry found for {}", name),
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down...");
        },
        _ = terminate => {
            info!("Received SIGTERM, shutting down...");
        },
    }
}
