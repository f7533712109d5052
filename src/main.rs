use std::error::Error;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use serde_json::{json, Value};
use tracing_subscriber::EnvFilter;

use media_warehouse::batch::{self, BatchController, Progress};
use media_warehouse::error::CatalogError;
use media_warehouse::util::paths;
use media_warehouse::{Catalog, Config, Store, Warehouse};

type CliResult<T> = Result<T, Box<dyn Error>>;

/// Content-addressed media warehouse
#[derive(Parser, Debug)]
#[command(name = "media-warehouse", version, about)]
struct Cli {
    /// Catalog database file
    #[arg(long, global = true)]
    catalog: Option<PathBuf>,

    /// Bytes hashed between cancellation checks
    #[arg(long, global = true)]
    hash_block: Option<usize>,

    /// Log filter, e.g. "debug" or "media_warehouse=trace"
    #[arg(long, global = true)]
    log: Option<String>,

    /// Print listings as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a new, empty catalog
    Init,
    /// Manage stores
    Store {
        #[command(subcommand)]
        command: StoreCommand,
    },
    /// Import files and folders into a store
    Import(ImportArgs),
}

#[derive(Subcommand, Debug)]
enum StoreCommand {
    /// Create a store in a new folder
    Create {
        label: String,
        path: PathBuf,
        /// Make this the default store
        #[arg(long)]
        default: bool,
    },
    /// List all stores with their status
    List,
    /// Rename, move or promote a store
    Edit {
        id: i64,
        #[arg(long)]
        label: Option<String>,
        /// New folder; the store's content is moved there
        #[arg(long)]
        path: Option<PathBuf>,
        /// Make this the default store
        #[arg(long)]
        default: bool,
    },
    /// Delete an empty store and its folder
    Delete { id: i64 },
    /// Recount a store's files and used space
    Stats { id: i64 },
}

#[derive(Args, Debug)]
struct ImportArgs {
    /// Target store (the default store if omitted)
    #[arg(long)]
    store: Option<i64>,

    /// Files and folders to import
    #[arg(required = true)]
    paths: Vec<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ {e}");
            return ExitCode::FAILURE;
        }
    };
    init_tracing(&config.log);

    match run(cli, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("❌ {e}");
            ExitCode::FAILURE
        }
    }
}

fn load_config(cli: &Cli) -> CliResult<Config> {
    let mut config = Config::load()?;
    if let Some(catalog) = &cli.catalog {
        config.catalog = catalog.clone();
    }
    if let Some(size) = cli.hash_block {
        config.hash_block_size = size;
    }
    if let Some(log) = &cli.log {
        config.log = log.clone();
    }
    Ok(config)
}

fn init_tracing(filter: &str) {
    let filter = EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();

    let _ = tracing::subscriber::set_global_default(subscriber);
}

async fn run(cli: Cli, config: Config) -> CliResult<()> {
    let catalog = Catalog::new();

    if let Command::Init = cli.command {
        catalog.create(&config.catalog)?;
        println!("📁 Catalog created at {}", config.catalog.display());
        return Ok(());
    }

    catalog.open(&config.catalog)?;
    let warehouse = Warehouse::new(Arc::new(catalog)).with_hash_block_size(config.hash_block_size);

    match cli.command {
        Command::Init => Ok(()),
        Command::Store { command } => run_store(&warehouse, command, cli.json),
        Command::Import(args) => run_import(&warehouse, args).await,
    }
}

fn run_store(warehouse: &Warehouse, command: StoreCommand, json: bool) -> CliResult<()> {
    match command {
        StoreCommand::Create { label, path, default } => {
            let path = catalog_relative(warehouse, &path)?;
            let store = warehouse.create_store(&label, &path, default)?;
            println!("✅ Created store #{} \"{}\" at {}", store.id, store.label, store.path);
        }
        StoreCommand::List => {
            let stores = warehouse.stores()?;
            if json {
                let listing = stores.iter().map(store_json).collect::<Result<Vec<_>, _>>()?;
                println!("{}", serde_json::to_string_pretty(&listing)?);
            } else if stores.is_empty() {
                println!("No stores yet. Create one with `media-warehouse store create`.");
            } else {
                for store in &stores {
                    print_store(store);
                }
            }
        }
        StoreCommand::Edit { id, label, path, default } => {
            let mut store = find_store(warehouse, id)?;
            if let Some(label) = label {
                store.label = label;
            }
            if let Some(path) = path {
                store.path = catalog_relative(warehouse, &path)?;
            }
            store.is_default = default;

            warehouse.edit_store(&mut store)?;
            println!("✅ Updated store #{}", store.id);
            print_store(&store);
        }
        StoreCommand::Delete { id } => {
            let store = find_store(warehouse, id)?;
            warehouse.delete_store(&store)?;
            println!("🗑️  Deleted store #{} \"{}\"", store.id, store.label);
        }
        StoreCommand::Stats { id } => {
            let mut store = find_store(warehouse, id)?;
            warehouse.update_store_statistics(&mut store)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&store_json(&store)?)?);
            } else {
                print_store(&store);
            }
        }
    }
    Ok(())
}

async fn run_import(warehouse: &Warehouse, args: ImportArgs) -> CliResult<()> {
    let stores = warehouse.stores()?;
    let mut store = match args.store {
        Some(id) => stores.into_iter().find(|s| s.id == id).ok_or_else(|| format!("no store with id {id}"))?,
        None => stores
            .into_iter()
            .find(|s| s.is_default)
            .ok_or("no default store, pass --store")?,
    };

    let controller = Arc::new(BatchController::new());
    let batch = controller.begin()?;

    // Ctrl-C cancels the running batch
    {
        let controller = Arc::clone(&controller);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                println!("⏹️  Cancelling import...");
                controller.cancel();
            }
        });
    }

    println!("🔍 Scanning {} path(s)", args.paths.len());
    let staged = batch::stage(warehouse, &batch, &args.paths, report).await;
    let skipped = staged.skipped.len();
    if staged.cancelled {
        println!("⚠️  Import cancelled while scanning");
        return Ok(());
    }

    println!("📥 Importing {} file(s) into \"{}\"", staged.items.len(), store.label);
    let outcome = batch::commit_all(warehouse, &batch, &mut store, staged.items, report).await;

    let mut imported = 0;
    for result in &outcome.results {
        match result {
            Ok(_) => imported += 1,
            Err(e) => eprintln!("⚠️  {e}"),
        }
    }

    println!(
        "📊 Import summary: {} new, {} skipped, {} failed",
        imported,
        skipped,
        outcome.completed() - imported
    );
    if outcome.cancelled {
        println!("⚠️  Import cancelled after {} of {} files", outcome.completed(), outcome.total);
    }
    println!("   Store now holds {} files ({} bytes)", store.total_files, store.used_space);
    Ok(())
}

fn report(progress: Progress) {
    if let Progress::Unit { completed, total } = progress {
        if completed % 100 == 0 || completed == total {
            println!("⏳ {completed}/{total}");
        }
    }
}

fn find_store(warehouse: &Warehouse, id: i64) -> CliResult<Store> {
    let store = warehouse
        .stores()?
        .into_iter()
        .find(|s| s.id == id)
        .ok_or_else(|| format!("no store with id {id}"))?;
    Ok(store)
}

/// Store paths under the catalog's folder are kept relative to it, so the
/// catalog and its stores can be moved together.
fn catalog_relative(warehouse: &Warehouse, path: &Path) -> CliResult<String> {
    let base = warehouse.catalog().directory().ok_or(CatalogError::Closed)?;
    let absolute = paths::normalize(&std::env::current_dir()?.join(path));

    let stored = if paths::can_be_relative(&absolute, &base) {
        paths::try_make_relative(&absolute, &base)
    } else {
        absolute
    };
    Ok(stored.to_string_lossy().into_owned())
}

fn store_json(store: &Store) -> serde_json::Result<Value> {
    let mut value = serde_json::to_value(store)?;
    value["status"] = json!(store.status);
    Ok(value)
}

fn print_store(store: &Store) {
    let marker = if store.is_default { "⭐" } else { "  " };
    println!(
        "{marker} #{} {} ({}) {} files, {} bytes [{:?}]",
        store.id, store.label, store.path, store.total_files, store.used_space, store.status
    );
}
