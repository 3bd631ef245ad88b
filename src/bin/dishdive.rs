//! DishDive CLI: normalize stored extracts and curate alias proposals.
//!
//! Usage:
//!   dishdive normalize [--source-type web] [--offset N] [--limit N] [--reset]
//!   dishdive normalize-one --source-type user --source-id 42 [--restaurant R] [--dish D] [--review TEXT]
//!   dishdive recompute
//!   dishdive salvage [FILE]
//!   dishdive aliases <generate|list|accept|apply> --kind dish
//!   dishdive stats

use clap::{Args, Parser, Subcommand};
use dishdive::alias::{self, ApplyOptions};
use dishdive::{
    normalize_all, normalize_single, recompute, salvage, AliasKind, BulkOptions, Config,
    DomainStore, ExtractFilter, Hints, OpenStore, SingleOutcome, SourceRef, SqliteStore,
};
use serde::Serialize;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "dishdive",
    version,
    about = "Normalize model-extracted restaurant review data"
)]
struct Cli {
    /// Path to SQLite database file
    #[arg(long, global = true)]
    db: Option<PathBuf>,
    /// Path to YAML config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Normalize stored extracts in bulk
    Normalize {
        /// Only extracts of this source type
        #[arg(long)]
        source_type: Option<String>,
        #[arg(long, default_value_t = 0)]
        offset: usize,
        #[arg(long)]
        limit: Option<usize>,
        /// Delete dish-derived tables before normalizing
        #[arg(long)]
        reset: bool,
        /// Progress interval in rows (0 disables)
        #[arg(long)]
        progress_every: Option<usize>,
    },
    /// Normalize the latest extract of one review
    NormalizeOne {
        #[arg(long)]
        source_type: String,
        #[arg(long)]
        source_id: i64,
        /// Restaurant name for records that lack one
        #[arg(long)]
        restaurant: Option<String>,
        /// Dish the review was written for
        #[arg(long)]
        dish: Option<String>,
        /// Review text for rule-based detection
        #[arg(long)]
        review: Option<String>,
    },
    /// Recompute dish scores and restaurant summaries
    Recompute,
    /// Run the salvage parser over a file (or stdin) and print the records
    Salvage {
        file: Option<PathBuf>,
    },
    /// Alias proposals
    Aliases {
        #[command(subcommand)]
        action: AliasAction,
    },
    /// Print row counts
    Stats,
}

#[derive(Args)]
struct KindArg {
    /// dish, keyword or restaurant
    #[arg(long, value_parser = parse_kind)]
    kind: AliasKind,
}

#[derive(Subcommand)]
enum AliasAction {
    /// Cluster near-duplicates and replace the proposals
    Generate {
        /// dish, keyword, restaurant, or all
        #[arg(long, default_value = "all")]
        kind: String,
    },
    /// Print proposals
    List {
        #[command(flatten)]
        kind: KindArg,
        /// Only this cluster
        #[arg(long)]
        cluster: Option<i64>,
    },
    /// Accept (or reject) a cluster or one member
    Accept {
        #[command(flatten)]
        kind: KindArg,
        #[arg(long)]
        cluster: i64,
        #[arg(long)]
        member: Option<String>,
        /// Clear the accept flag instead
        #[arg(long)]
        reject: bool,
    },
    /// Merge accepted proposals into the live alias table
    Apply {
        #[command(flatten)]
        kind: KindArg,
        #[arg(long)]
        dry_run: bool,
        #[arg(long)]
        include_rejected: bool,
        /// Do not add a default location for restaurants without one
        #[arg(long)]
        no_default_locations: bool,
    },
}

fn parse_kind(s: &str) -> Result<AliasKind, String> {
    AliasKind::from_str(s).ok_or_else(|| format!("unknown alias kind '{}'", s))
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn open_store(path: &Path) -> Result<SqliteStore, String> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create {}: {}", parent.display(), e))?;
    }
    SqliteStore::open(path).map_err(|e| format!("Failed to open database: {}", e))
}

fn print_json<T: Serialize>(value: &T) -> i32 {
    match serde_json::to_string_pretty(value) {
        Ok(text) => {
            println!("{}", text);
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

fn cmd_normalize(store: &SqliteStore, options: BulkOptions) -> i32 {
    match normalize_all(store, &options) {
        Ok(report) => print_json(&report),
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

fn cmd_normalize_one(
    store: &SqliteStore,
    source: SourceRef,
    hints: Hints<'_>,
    fallback_cuisine: Option<&str>,
) -> i32 {
    match normalize_single(store, &source, hints, fallback_cuisine) {
        Ok(SingleOutcome::AlreadyNormalized) => {
            println!("{} already normalized", source);
            0
        }
        Ok(SingleOutcome::Normalized { stats, synthesized }) => {
            if synthesized {
                println!("{} normalized from hints", source);
            }
            print_json(&stats)
        }
        Ok(SingleOutcome::Empty) => {
            println!("{} produced no dishes", source);
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

fn cmd_recompute(store: &SqliteStore) -> i32 {
    match recompute(store) {
        Ok(aggregates) => {
            println!(
                "Recomputed {} dishes across {} restaurants",
                aggregates.dishes.len(),
                aggregates.restaurants.len()
            );
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

fn cmd_salvage(file: Option<&Path>) -> i32 {
    let read = match file {
        Some(path) => std::fs::read_to_string(path),
        None => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf).map(|_| buf)
        }
    };
    let text = match read {
        Ok(t) => t,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };
    let result = salvage(&text);
    match result.strategy {
        Some(strategy) => eprintln!("strategy: {}", strategy),
        None => eprintln!("strategy: none"),
    }
    print_json(&result.records)
}

fn cmd_aliases_generate(store: &SqliteStore, kind: &str, config: &Config) -> i32 {
    let kinds: Vec<AliasKind> = if kind.eq_ignore_ascii_case("all") {
        AliasKind::ALL.to_vec()
    } else {
        match parse_kind(kind) {
            Ok(k) => vec![k],
            Err(e) => {
                eprintln!("Error: {}", e);
                return 1;
            }
        }
    };
    let mut reports = Vec::new();
    for kind in kinds {
        match alias::generate(store, kind, &config.aliases) {
            Ok(report) => reports.push(report),
            Err(e) => {
                eprintln!("Error: {}", e);
                return 1;
            }
        }
    }
    print_json(&reports)
}

fn cmd_aliases_list(store: &SqliteStore, kind: AliasKind, cluster: Option<i64>) -> i32 {
    let candidates = match store.list_alias_candidates(kind) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {}", e);
            return 1;
        }
    };
    let rows: Vec<_> = candidates
        .into_iter()
        .filter(|c| cluster.map_or(true, |id| c.cluster_id == id))
        .collect();
    if rows.is_empty() {
        println!("No {} proposals.", kind);
        return 0;
    }
    println!(
        "{:>7}  {:<24}  {:<24}  {:>7}  {:<12}  {:>6}",
        "CLUSTER", "CANONICAL", "MEMBER", "SUPPORT", "LOCATION", "ACCEPT"
    );
    println!("{}", "-".repeat(90));
    for c in rows {
        println!(
            "{:>7}  {:<24}  {:<24}  {:>7}  {:<12}  {:>6}",
            c.cluster_id,
            c.canonical,
            c.member,
            c.support,
            c.location_name.as_deref().unwrap_or(""),
            if c.accept { "yes" } else { "no" }
        );
    }
    0
}

fn cmd_aliases_accept(
    store: &SqliteStore,
    kind: AliasKind,
    cluster: i64,
    member: Option<&str>,
    accept: bool,
) -> i32 {
    match alias::set_accept(store, kind, cluster, member, accept) {
        Ok(0) => {
            eprintln!("Error: no {} proposal matches cluster {}", kind, cluster);
            1
        }
        Ok(n) => {
            println!(
                "{} {} row(s) in cluster {}",
                if accept { "Accepted" } else { "Rejected" },
                n,
                cluster
            );
            0
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

fn cmd_aliases_apply(store: &SqliteStore, kind: AliasKind, options: ApplyOptions) -> i32 {
    match alias::apply_accepted(store, kind, options) {
        Ok(report) => print_json(&report),
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

fn cmd_stats(store: &SqliteStore) -> i32 {
    match store.counts() {
        Ok(counts) => print_json(&counts),
        Err(e) => {
            eprintln!("Error: {}", e);
            1
        }
    }
}

fn main() {
    let cli = Cli::parse();

    let config = match Config::load_or_default(cli.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(2);
        }
    };
    init_logging(&config.logging.level);

    if let Commands::Salvage { file } = &cli.command {
        std::process::exit(cmd_salvage(file.as_deref()));
    }

    let db_path = cli.db.clone().unwrap_or_else(|| config.database_path());
    let store = match open_store(&db_path) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    };

    let fallback_cuisine = config.normalize.fallback_cuisine.as_deref();
    let code = match cli.command {
        Commands::Normalize {
            source_type,
            offset,
            limit,
            reset,
            progress_every,
        } => {
            let mut filter = ExtractFilter::new().with_offset(offset);
            if let Some(source_type) = source_type {
                filter = filter.with_source_type(source_type);
            }
            if let Some(limit) = limit {
                filter = filter.with_limit(limit);
            }
            let options = BulkOptions {
                filter,
                reset,
                progress_every: progress_every.unwrap_or(config.normalize.progress_every),
            };
            cmd_normalize(&store, options)
        }
        Commands::NormalizeOne {
            source_type,
            source_id,
            restaurant,
            dish,
            review,
        } => {
            let hints = Hints {
                restaurant: restaurant.as_deref(),
                dish: dish.as_deref(),
                review_text: review.as_deref(),
            };
            cmd_normalize_one(&store, SourceRef::new(source_type, source_id), hints, fallback_cuisine)
        }
        Commands::Recompute => cmd_recompute(&store),
        Commands::Salvage { .. } => 0,
        Commands::Aliases { action } => match action {
            AliasAction::Generate { kind } => cmd_aliases_generate(&store, &kind, &config),
            AliasAction::List { kind, cluster } => cmd_aliases_list(&store, kind.kind, cluster),
            AliasAction::Accept {
                kind,
                cluster,
                member,
                reject,
            } => cmd_aliases_accept(&store, kind.kind, cluster, member.as_deref(), !reject),
            AliasAction::Apply {
                kind,
                dry_run,
                include_rejected,
                no_default_locations,
            } => cmd_aliases_apply(
                &store,
                kind.kind,
                ApplyOptions {
                    dry_run,
                    include_rejected,
                    default_locations: !no_default_locations,
                },
            ),
        },
        Commands::Stats => cmd_stats(&store),
    };
    std::process::exit(code);
}
