use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde::Serialize;
use sieve_core::{Category, ClassificationInput, FilterAction, Thresholds, split_words};
use sieve_store::{
    AppendMode, FilterConfig, FilterExtension, SpamLog, SpamRecord, channel_dir,
    resolve_container_dir,
};

#[derive(Parser)]
#[command(name = "sieve", about = "On-device message filter and shared spam log")]
struct Cli {
    /// Shared container directory (default: $SIEVE_CONTAINER_DIR or ~/.sieve/group.sieve.shared)
    #[arg(long, global = true)]
    container: Option<PathBuf>,

    /// Config file to use instead of <container>/sieve.toml
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose debug output
    #[arg(long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one message through the filter, as the extension runtime would
    Classify {
        /// Message body
        text: String,

        /// Sender recorded alongside spam
        #[arg(long)]
        sender: Option<String>,

        /// Decide without appending to the log or signalling observers
        #[arg(long)]
        dry_run: bool,

        /// Print the decision as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the normalized words and token ids for a message
    Tokenize {
        /// Message body
        text: String,
    },

    /// Print the shared spam log
    Log {
        /// Print the raw record list as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print the spam log, then re-read it each time it changes
    Watch {
        /// Exit after this many change signals
        #[arg(long)]
        count: Option<usize>,

        /// Exit after this many seconds
        #[arg(long)]
        timeout: Option<u64>,
    },

    /// Show container, config and model statistics
    Stats,
}

struct Session {
    container: PathBuf,
    config: FilterConfig,
}

fn open_session(cli: &Cli) -> Result<Session> {
    let container = resolve_container_dir(cli.container.as_deref());
    let config = match &cli.config {
        Some(path) => FilterConfig::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => FilterConfig::load_from_container(&container)
            .with_context(|| format!("failed to load config in {}", container.display()))?,
    };
    tracing::debug!("container: {}", container.display());
    Ok(Session { container, config })
}

fn spam_log(ctx: &Session) -> SpamLog {
    SpamLog::new(&ctx.container)
        .with_mode(ctx.config.store.append_mode)
        .with_busy_timeout(ctx.config.store.busy_timeout_ms)
}

fn init_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into())
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match &cli.command {
        Commands::Classify {
            text,
            sender,
            dry_run,
            json,
        } => cmd_classify(&cli, text, sender.as_deref(), *dry_run, *json),
        Commands::Tokenize { text } => cmd_tokenize(&cli, text),
        Commands::Log { json } => cmd_log(&cli, *json),
        Commands::Watch { count, timeout } => cmd_watch(&cli, *count, *timeout).await,
        Commands::Stats => cmd_stats(&cli),
    }
}

#[derive(Serialize)]
struct ClassifyReport<'a> {
    category: Category,
    action: FilterAction,
    spam: Option<f64>,
    ham: Option<f64>,
    evidence: usize,
    logged: Option<usize>,
    sender: Option<&'a str>,
}

fn cmd_classify(
    cli: &Cli,
    text: &str,
    sender: Option<&str>,
    dry_run: bool,
    json: bool,
) -> Result<()> {
    let ctx = open_session(cli)?;
    let mut config = ctx.config.clone();
    if dry_run {
        config.store.enabled = false;
    }

    let filter = FilterExtension::from_config(&ctx.container, &config);
    if filter.model().is_none() {
        tracing::warn!("no model loaded; every message gets no action");
    }
    let outcome = filter.process(&ClassificationInput::new(Some(text), sender));

    let report = ClassifyReport {
        category: outcome.verdict.category,
        action: outcome.verdict.decision.action,
        spam: outcome.result.as_ref().map(|r| r.spam_probability()),
        ham: outcome.result.as_ref().map(|r| r.ham_probability()),
        evidence: outcome.result.as_ref().map_or(0, |r| r.evidence),
        logged: outcome.logged,
        sender,
    };

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("failed to serialize decision")?
        );
        return Ok(());
    }

    println!("category: {}", report.category);
    println!("action:   {}", report.action);
    if let (Some(spam), Some(ham)) = (report.spam, report.ham) {
        println!("p(spam):  {spam:.4}");
        println!("p(ham):   {ham:.4}");
    }
    println!("evidence: {}", report.evidence);
    if let Some(len) = report.logged {
        println!("logged:   record {len}");
    }
    Ok(())
}

fn cmd_tokenize(cli: &Cli, text: &str) -> Result<()> {
    let ctx = open_session(cli)?;
    let filter = FilterExtension::from_config(&ctx.container, &ctx.config);
    let Some(model) = filter.model() else {
        bail!("no usable model; check [model] in the config");
    };

    let words = split_words(text);
    let vector = model.tokenize(text);
    let vocab = model.vocabulary();

    println!("words:  {}", words.join(" "));
    println!(
        "ids:    {}",
        vector
            .ids()
            .iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join(" ")
    );
    let known = words
        .iter()
        .take(model.sequence_length())
        .filter(|w| vocab.id_of(w) != vocab.oov_id())
        .count();
    let kept = words.len().min(model.sequence_length());
    println!("known:  {known}/{kept} (length {})", vector.len());
    Ok(())
}

fn print_record(r: &SpamRecord) {
    let sender = if r.sender.is_empty() { "-" } else { &r.sender };
    println!("{}  {}  {}", r.date, sender, r.message);
}

fn cmd_log(cli: &Cli, json: bool) -> Result<()> {
    let ctx = open_session(cli)?;
    let records = spam_log(&ctx)
        .load()
        .context("failed to read spam log")?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&records).context("failed to serialize spam log")?
        );
        return Ok(());
    }

    if records.is_empty() {
        println!("(no spam recorded)");
    }
    for r in &records {
        print_record(r);
    }
    Ok(())
}

/// Print records beyond `seen`; a shorter list means the host rewrote it, so
/// everything is printed again.
fn print_changes(records: &[SpamRecord], seen: usize) -> usize {
    let start = if records.len() < seen {
        println!("(spam log was reset)");
        0
    } else {
        seen
    };
    for r in &records[start..] {
        print_record(r);
    }
    records.len()
}

#[cfg(unix)]
async fn cmd_watch(cli: &Cli, count: Option<usize>, timeout: Option<u64>) -> Result<()> {
    use sieve_store::ChangeObserver;
    use tokio::net::UnixDatagram;

    let ctx = open_session(cli)?;
    let log = spam_log(&ctx);

    // Subscribe before the initial read so no append falls in between.
    let observer = ChangeObserver::subscribe(&ctx.container, &ctx.config.notify.channel)
        .context("failed to subscribe to change channel")?;
    let std_socket = observer
        .socket()
        .try_clone()
        .context("failed to clone observer socket")?;
    std_socket
        .set_nonblocking(true)
        .context("failed to configure observer socket")?;
    let socket = UnixDatagram::from_std(std_socket).context("failed to register observer socket")?;

    let records = log.load().context("failed to read spam log")?;
    println!("watching {} ({} record(s))", ctx.container.display(), records.len());
    let mut seen = print_changes(&records, 0);

    let deadline = timeout.map(|s| tokio::time::Instant::now() + Duration::from_secs(s));
    let mut signals = 0usize;
    let mut buf = [0u8; 16];

    loop {
        if let Some(limit) = count
            && signals >= limit
        {
            break;
        }

        tokio::select! {
            received = socket.recv(&mut buf) => {
                received.context("change channel failed")?;
                // Coalesce a burst into one re-read.
                while socket.try_recv(&mut buf).is_ok() {}
                signals += 1;
                match log.load() {
                    Ok(records) => seen = print_changes(&records, seen),
                    Err(e) => tracing::warn!("re-read after change failed: {e}"),
                }
            }
            _ = sleep_until(deadline) => {
                tracing::debug!("watch timeout reached");
                break;
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupted");
                break;
            }
        }
    }

    drop(observer);
    Ok(())
}

#[cfg(unix)]
async fn sleep_until(deadline: Option<tokio::time::Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

#[cfg(not(unix))]
async fn cmd_watch(_cli: &Cli, _count: Option<usize>, _timeout: Option<u64>) -> Result<()> {
    bail!("watch requires Unix domain sockets")
}

fn observer_count(container: &Path, channel: &str) -> usize {
    std::fs::read_dir(channel_dir(container, channel))
        .map(|entries| {
            entries
                .flatten()
                .filter(|e| e.path().extension().and_then(|x| x.to_str()) == Some("sock"))
                .count()
        })
        .unwrap_or(0)
}

fn cmd_stats(cli: &Cli) -> Result<()> {
    let ctx = open_session(cli)?;
    let log = spam_log(&ctx);
    let records = log.load().context("failed to read spam log")?;
    let filter = FilterExtension::from_config(&ctx.container, &ctx.config);
    let Thresholds { spam, ham } = *filter.thresholds();

    let mode = match ctx.config.store.append_mode {
        AppendMode::BestEffort => "best_effort",
        AppendMode::Serialized => "serialized",
    };

    println!("container:  {}", ctx.container.display());
    println!("records:    {}", records.len());
    if let Some(last) = records.last() {
        println!("last:       {}", last.date);
    }
    println!("thresholds: spam>={spam} ham>={ham}");
    println!(
        "store:      {} ({mode}, busy_timeout={}ms)",
        if ctx.config.store.enabled { "enabled" } else { "disabled" },
        ctx.config.store.busy_timeout_ms
    );
    println!(
        "channel:    {} ({} observer(s))",
        ctx.config.notify.channel,
        observer_count(&ctx.container, &ctx.config.notify.channel)
    );
    match filter.model() {
        Some(model) => println!(
            "model:      {} words, length {}, classes {}",
            model.vocabulary().len(),
            model.sequence_length(),
            model.classes().join(",")
        ),
        None => println!("model:      (unavailable)"),
    }
    Ok(())
}
