use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::fs::OpenOptions;
use std::path::PathBuf;
use waxcat::db::Database;
use waxcat::db::models::{TrackFilter, TrackInfo};

#[derive(Parser)]
#[command(name = "waxcat", version, about = "Personal music catalog")]
struct Cli {
    /// Path to the SQLite database
    #[arg(long, global = true)]
    db_path: Option<PathBuf>,

    /// Verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

/// Filter flags shared by the query and facet commands.
#[derive(Args, Debug, Default)]
struct FilterArgs {
    /// Match artist (substring)
    #[arg(long)]
    artist: Option<String>,

    /// Match album (substring)
    #[arg(long)]
    album: Option<String>,

    /// Match year exactly
    #[arg(long)]
    year: Option<String>,

    /// Match tracks carrying this facet
    #[arg(long)]
    facet: Option<String>,
}

impl From<FilterArgs> for TrackFilter {
    fn from(a: FilterArgs) -> Self {
        TrackFilter {
            artist: a.artist,
            album: a.album,
            year: a.year,
            facet: a.facet,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create the catalog schema in a new database
    Init,

    /// Scan the music directory for new tracks
    Scan {
        /// Music directory to scan (defaults to config file music_dir)
        root: Option<PathBuf>,

        /// Force processing of all directories, clean or not
        #[arg(long)]
        force: bool,
    },

    /// Query the catalog and print matching tracks
    Query {
        #[command(flatten)]
        filter: FilterArgs,

        /// Comma-separated list of columns to order by
        #[arg(long)]
        order: Option<String>,

        /// Maximum number of results (0 = all)
        #[arg(short, long, default_value = "0")]
        limit: usize,

        /// Result offset
        #[arg(short, long, default_value = "0")]
        offset: usize,

        /// Print track details instead of paths
        #[arg(long)]
        details: bool,

        /// Prefix to strip from printed paths
        #[arg(long)]
        trim: Option<String>,
    },

    /// Print tracks on recently added albums
    Recent {
        /// Look-back window in days
        #[arg(long, default_value = "30")]
        days: i64,
    },

    /// Add or remove a facet on filtered tracks
    Facet {
        #[command(subcommand)]
        action: FacetAction,
    },

    /// Show library statistics
    Stats,
}

#[derive(Subcommand)]
enum FacetAction {
    /// Add a facet to every track matching the filter
    Add {
        name: String,
        #[command(flatten)]
        filter: FilterArgs,
    },
    /// Remove a facet from every track matching the filter
    Remove {
        name: String,
        #[command(flatten)]
        filter: FilterArgs,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp(None)
        .init();

    let config = waxcat::config::AppConfig::load();

    // Resolve database path: CLI > config > XDG default
    let db_path = cli
        .db_path
        .or(config.db_path.clone())
        .unwrap_or_else(waxcat::config::default_db_path);
    log::info!("Database: {}", db_path.display());

    let db = Database::open(&db_path).context("Failed to open database")?;

    match cli.command {
        Commands::Init => {
            db.create_schema().context("Failed to create schema")?;
            println!("database initialized in {}", db_path.display());
        }

        Commands::Scan { root, force } => {
            let root = root
                .or(config.music_dir.clone())
                .context("No music directory. Pass a path or set music_dir in config.")?;
            let meta = std::fs::metadata(&root)
                .with_context(|| format!("can't access music dir '{}'", root.display()))?;
            anyhow::ensure!(meta.is_dir(), "{} is not a directory", root.display());

            let mut scanlog = OpenOptions::new()
                .create(true)
                .append(true)
                .open("scanlog")
                .context("error opening scanlog")?;

            waxcat::scanner::scan(&db, &db_path, &root, force, &mut scanlog)
                .context("error during scan")?;
        }

        Commands::Query {
            filter,
            order,
            limit,
            offset,
            details,
            trim,
        } => {
            let filter: TrackFilter = filter.into();
            if filter.is_empty() {
                anyhow::bail!("running a query requires at least one filter flag");
            }
            let paths = db
                .query_paths(&filter, order.as_deref(), limit, offset)
                .context("error querying catalog")?;

            for path in &paths {
                if details {
                    if let Some(info) = db.track_info(path)? {
                        print_track_detail(&info);
                    }
                } else {
                    println!("{}", trimmed(path, trim.as_deref()));
                }
            }
        }

        Commands::Recent { days } => {
            let cutoff = chrono::Utc::now().timestamp() - days * 86_400;
            let paths = db
                .query_recent(cutoff)
                .context("error getting recent tracks")?;
            for path in &paths {
                println!("{path}");
            }
        }

        Commands::Facet { action } => {
            let (verb, name, filter, changed) = match action {
                FacetAction::Add { name, filter } => {
                    let filter: TrackFilter = filter.into();
                    let n = db.facet_add(&filter, &name).context("facet add failed")?;
                    ("added to", name, filter, n)
                }
                FacetAction::Remove { name, filter } => {
                    let filter: TrackFilter = filter.into();
                    let n = db
                        .facet_remove(&filter, &name)
                        .context("facet remove failed")?;
                    ("removed from", name, filter, n)
                }
            };
            if filter.is_empty() {
                log::warn!("no filter flags given; facet '{name}' applied library-wide");
            }
            println!("facet '{name}' {verb} {changed} tracks");
        }

        Commands::Stats => {
            let stats = db.stats().context("Failed to get stats")?;
            println!("Library Statistics");
            println!("==================");
            println!("Tracks:   {}", stats.total_tracks);
            println!("Artists:  {}", stats.artists);
            println!("Albums:   {}", stats.albums);
            println!("Lastscan: {}", stats.lastscan);
        }
    }

    Ok(())
}

fn trimmed<'a>(path: &'a str, prefix: Option<&str>) -> &'a str {
    match prefix {
        Some(p) => path.strip_prefix(p).unwrap_or(path),
        None => path,
    }
}

/// Fixed-width detail row, artist/title/album truncated at 30/50/30.
fn print_track_detail(info: &TrackInfo) {
    println!(
        "{:>3} | {:<30} | {:<50} | {:<30} | {} |\t{}",
        info.track_number,
        ellipsize(&info.artist, 30),
        ellipsize(&info.title, 50),
        ellipsize(&info.album, 30),
        info.year,
        info.facets
    );
}

fn ellipsize(s: &str, max: usize) -> String {
    if s.chars().count() > max {
        let cut: String = s.chars().take(max - 1).collect();
        format!("{cut}…")
    } else {
        s.to_string()
    }
}
