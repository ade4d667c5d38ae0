use clap::Parser;
use miette::{IntoDiagnostic, Result};
use rentmesh::application::{Marketplace, Ports};
use rentmesh::config::Settings;
use rentmesh::domain::ports::{
    CartStore, CatalogReader, Directory, DirectoryRef, IdentityReader, OrderStore,
};
use rentmesh::infrastructure::clock::ManualClock;
use rentmesh::infrastructure::in_memory::InMemoryMarketStore;
use rentmesh::infrastructure::recording::{
    InMemoryMailer, InMemoryNotificationSink, InMemoryPaymentGateway,
};
use rentmesh::interfaces::csv::action_reader::ActionReader;
use rentmesh::interfaces::csv::order_writer::OrderWriter;
use rentmesh::interfaces::replay::Replayer;
use rentmesh::telemetry;
use std::fs::File;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Input actions CSV file
    input: PathBuf,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Settings file (TOML, JSON or YAML). `RENTMESH__*` variables override it.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Keep the overdue sweeper running on the wall clock until Ctrl-C.
    #[arg(long)]
    serve: bool,
}

fn engine_over<S>(store: S, clock: &ManualClock, settings: &Settings) -> Replayer
where
    S: CatalogReader + IdentityReader + CartStore + OrderStore + Directory + Clone + 'static,
{
    let directory: DirectoryRef = Arc::new(store.clone());
    let ports = Ports::with_store(
        store,
        Arc::new(InMemoryPaymentGateway::new()),
        Arc::new(InMemoryNotificationSink::new()),
        Arc::new(InMemoryMailer::new()),
        Arc::new(clock.clone()),
    );
    let orders = ports.orders.clone();
    let market = Marketplace::new(ports, settings);
    Replayer::new(market, directory, orders, clock.clone())
}

#[cfg(feature = "storage-rocksdb")]
fn open_engine(cli: &Cli, clock: &ManualClock, settings: &Settings) -> Result<Replayer> {
    use rentmesh::infrastructure::rocksdb::RocksDBStore;

    if let Some(db_path) = &cli.db_path {
        let store = RocksDBStore::open(db_path).into_diagnostic()?;
        return Ok(engine_over(store, clock, settings));
    }
    Ok(engine_over(InMemoryMarketStore::new(), clock, settings))
}

#[cfg(not(feature = "storage-rocksdb"))]
fn open_engine(cli: &Cli, clock: &ManualClock, settings: &Settings) -> Result<Replayer> {
    if cli.db_path.is_some() {
        tracing::warn!(
            "Persistent storage requested via --db-path, but the 'storage-rocksdb' feature is not enabled. Falling back to in-memory storage."
        );
    }
    Ok(engine_over(InMemoryMarketStore::new(), clock, settings))
}

#[tokio::main]
async fn main() -> Result<()> {
    telemetry::init();
    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref()).into_diagnostic()?;

    let clock = ManualClock::new();
    let replayer = open_engine(&cli, &clock, &settings)?;

    // Replay actions
    let file = File::open(&cli.input).into_diagnostic()?;
    let reader = ActionReader::new(file);
    for action in reader.actions() {
        match action {
            Ok(action) => {
                if let Err(e) = replayer.apply(action).await {
                    tracing::error!("Error processing action: {e}");
                }
            }
            Err(e) => {
                tracing::error!("Error reading action: {e}");
            }
        }
    }

    if cli.serve {
        clock.release();
        let sweeper = Arc::clone(&replayer.market().sweeper);
        let handle = sweeper.spawn(settings.sweeper.interval());
        tokio::signal::ctrl_c().await.into_diagnostic()?;
        handle.shutdown().await;
    }

    let rows = replayer.summary().await.into_diagnostic()?;
    let stdout = io::stdout();
    let mut writer = OrderWriter::new(stdout.lock());
    writer.write_orders(rows).into_diagnostic()?;

    Ok(())
}
