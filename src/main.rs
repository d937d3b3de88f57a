//! CLI entry point for `mlcache`.

use std::path::{Path, PathBuf};
use std::time::Instant;

use clap::{CommandFactory, Parser, Subcommand};
use humansize::{format_size, BINARY};
use indicatif::{ProgressBar, ProgressStyle};

use mlcache::cache::{self, TieredCache};
use mlcache::config::{self, CacheConfig, Config};
use mlcache::model::mail::Mail;
use mlcache::parser::mbox;
use mlcache::source::{ProcessSource, RawSource};
use mlcache::tags::{bracket_message_id, TagStore};

#[derive(Parser)]
#[command(
    name = "mlcache",
    version,
    about = "Mail metadata cache of a mailing-list archive browser"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Metadata directory holding the cache and tag files
    #[arg(short, long, global = true, value_name = "DIR")]
    dir: Option<PathBuf>,

    /// Verbose logging (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Inspect the mail cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
    /// Add the mails of an mbox file (or a JSON list of records) to the cache
    Import {
        #[arg(value_name = "FILE")]
        path: PathBuf,
    },
    /// Print a cached mail
    Show {
        /// Message id, or `<object id>/<archive root>` for archive blobs
        key: String,
    },
    /// Manage mail tags
    Tag {
        #[command(subcommand)]
        action: TagAction,
    },
    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
    /// Generate a man page
    Manpage,
}

#[derive(Subcommand)]
enum CacheAction {
    /// Show cache limits and per-file statistics
    Status {
        /// Print only the cache limits
        #[arg(long)]
        config_only: bool,
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum TagAction {
    /// Add tags to a mail
    Add {
        msgid: String,
        #[arg(required = true)]
        tags: Vec<String>,
    },
    /// Remove tags from a mail
    Remove {
        msgid: String,
        #[arg(required = true)]
        tags: Vec<String>,
    },
    /// List tags with their mail counts
    List,
    /// List the mails carrying a tag
    Mails { tag: String },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = config::load_config();

    let log_level = match cli.verbose {
        0 => config.general.log_level.as_str(),
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    // Completions and man pages work without a metadata directory
    let root = config::resolve_root_dir(cli.dir.as_deref(), &config);
    setup_logging(log_level, root.as_ref().ok().map(PathBuf::as_path));

    match cli.command {
        Commands::Completions { shell } => cmd_completions(shell),
        Commands::Manpage => cmd_manpage(),
        Commands::Cache {
            action: CacheAction::Status { config_only, json },
        } => cmd_cache_status(&root?, config_only, json),
        Commands::Import { path } => cmd_import(&root?, &config, &path),
        Commands::Show { key } => cmd_show(&root?, &config, &key),
        Commands::Tag { action } => cmd_tag(&root?, &config, action),
    }
}

/// Set up tracing with stderr output and, when a metadata directory is
/// known, a log file inside it.
fn setup_logging(level: &str, root: Option<&Path>) {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    if let Some(root) = root {
        let file_appender = tracing_appender::rolling::never(root, config::LOG_FILE);
        let file_layer = tracing_subscriber::fmt::layer()
            .with_ansi(false)
            .with_writer(file_appender);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .with(file_layer)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .init();
    }
}

/// Generate shell completions and print to stdout.
fn cmd_completions(shell: clap_complete::Shell) -> anyhow::Result<()> {
    let mut cmd = Cli::command();
    clap_complete::generate(shell, &mut cmd, "mlcache", &mut std::io::stdout());
    Ok(())
}

/// Generate a man page and print to stdout.
fn cmd_manpage() -> anyhow::Result<()> {
    let cmd = Cli::command();
    let man = clap_mangen::Man::new(cmd);
    let mut buf = Vec::new();
    man.render(&mut buf)?;
    std::io::Write::write_all(&mut std::io::stdout(), &buf)?;
    Ok(())
}

/// Print cache limits and, unless `config_only`, per-file statistics.
fn cmd_cache_status(root: &Path, config_only: bool, json: bool) -> anyhow::Result<()> {
    let limits = config::load_cache_config(root);
    let stats = if config_only {
        Vec::new()
    } else {
        cache::stats(root)?
    };

    if json {
        print_status_json(&limits, &stats, config_only)
    } else {
        print_status_table(&limits, &stats, config_only);
        Ok(())
    }
}

fn print_status_table(limits: &CacheConfig, stats: &[cache::SegmentStat], config_only: bool) {
    println!();
    println!(
        "  {:<22} {}",
        "Max active cache size",
        format_size(limits.max_active_cache_sz, BINARY)
    );
    println!("  {:<22} {}", "Max archived caches", limits.max_archived_caches);
    if config_only {
        println!();
        return;
    }

    println!();
    if stats.is_empty() {
        println!("  No cache files.");
        println!();
        return;
    }
    println!(
        "  {:<40} {:>10} {:>8} {:>8} {:>10} {:>10}",
        "File", "Size", "Mails", "Broken", "Load", "Parse"
    );
    println!("  {}", "-".repeat(91));
    for stat in stats {
        let name = stat
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        println!(
            "  {:<40} {:>10} {:>8} {:>8} {:>10.2?} {:>10.2?}",
            name,
            format_size(stat.size, BINARY),
            stat.entries,
            stat.broken,
            stat.load_time,
            stat.parse_time
        );
    }
    println!();
}

fn print_status_json(
    limits: &CacheConfig,
    stats: &[cache::SegmentStat],
    config_only: bool,
) -> anyhow::Result<()> {
    let files: Vec<serde_json::Value> = stats
        .iter()
        .map(|s| {
            serde_json::json!({
                "file": s.path.to_string_lossy(),
                "size": s.size,
                "entries": s.entries,
                "broken": s.broken,
                "load_time_ms": s.load_time.as_millis(),
                "parse_time_ms": s.parse_time.as_millis(),
            })
        })
        .collect();

    let mut output = serde_json::json!({ "config": limits });
    if !config_only {
        output["files"] = serde_json::Value::Array(files);
    }
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

/// Read a mail file and insert every complete mail into the cache.
fn cmd_import(root: &Path, config: &Config, path: &Path) -> anyhow::Result<()> {
    if !path.exists() {
        anyhow::bail!("File not found: {}", path.display());
    }
    let source = ProcessSource::new(&config.fetch);
    let mut cache = TieredCache::open(root, config::load_cache_config(root));

    let file_size = std::fs::metadata(path)?.len();
    let pb = ProgressBar::new(file_size);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} Reading [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})")?
            .progress_chars("#>-"),
    );

    let start = Instant::now();
    let mut mails = mbox::read_mails(
        path,
        Some(&|current, total| {
            pb.set_length(total);
            pb.set_position(current);
        }),
    )?;
    pb.finish_and_clear();

    let mut added = 0usize;
    for mail in &mut mails {
        if cache.insert(mail, &source)? {
            added += 1;
        }
    }
    cache.flush()?;

    println!();
    println!("  {:<20} {}", "File", path.display());
    println!("  {:<20} {}", "File size", format_size(file_size, BINARY));
    println!("  {:<20} {}", "Mails read", mails.len());
    println!("  {:<20} {}", "Newly cached", added);
    println!("  {:<20} {:.2?}", "Time", start.elapsed());
    println!();
    Ok(())
}

/// Print a cached mail.
fn cmd_show(root: &Path, config: &Config, key: &str) -> anyhow::Result<()> {
    let source = ProcessSource::new(&config.fetch);
    let mut cache = TieredCache::open(root, config::load_cache_config(root));
    let Some(mut mail) = cache.get(key)? else {
        anyhow::bail!("No cached mail for {key}");
    };
    println!("{}", mail.display_text(&source));
    Ok(())
}

fn cmd_tag(root: &Path, config: &Config, action: TagAction) -> anyhow::Result<()> {
    let mut store = TagStore::open(root)?;
    match action {
        TagAction::Add { msgid, tags } => {
            let source = ProcessSource::new(&config.fetch);
            let mut mail = find_mail(root, &msgid, &source)?;
            store.tag_mail(&mut mail, &tags, &source)?;
            store.save()?;
        }
        TagAction::Remove { msgid, tags } => {
            store.remove(&msgid, &tags)?;
            store.save()?;
        }
        TagAction::List => {
            for (tag, count) in store.counts() {
                println!("{tag}: {count} mails");
            }
        }
        TagAction::Mails { tag } => {
            for mail in store.mails_of_tag(&tag) {
                let date = mail
                    .date()
                    .map(|d| d.format("%Y-%m-%d %H:%M").to_string())
                    .unwrap_or_default();
                println!("  {:<17} {}", date, mail.subject().unwrap_or_default());
            }
        }
    }
    Ok(())
}

/// Mail with the given message id, from the cache or the public-inbox server.
fn find_mail(root: &Path, msgid: &str, source: &dyn RawSource) -> anyhow::Result<Mail> {
    let msgid = bracket_message_id(msgid);
    let msgid = msgid.as_str();
    let mut cache = TieredCache::open(root, config::load_cache_config(root));
    if let Some(mail) = cache.get(msgid)? {
        return Ok(mail);
    }
    let mut mail = Mail::from_raw_text(source.fetch_message(msgid)?);
    if mail.is_broken() {
        anyhow::bail!("Cannot get a complete mail for {msgid}");
    }
    cache.insert(&mut mail, source)?;
    cache.flush()?;
    Ok(mail)
}
