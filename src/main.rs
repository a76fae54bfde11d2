use anyhow::{Context, Result, bail};
use clap::{Parser, ValueEnum};
use std::collections::BTreeMap;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use stocklock::{
    LocalMutexStockService, MemoryStockStore, ProductId, StockConfig, StockFacade, StockId,
    StockStore, UnguardedStockService,
};
use tokio::sync::Barrier;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "stocklock")]
#[command(about = "Fire concurrent stock decrements through one locking strategy")]
struct Cli {
    #[arg(long, value_enum, default_value_t = Strategy::Pessimistic)]
    strategy: Strategy,
    #[arg(long, default_value_t = 100)]
    workers: usize,
    /// Initial quantity of the seeded stock.
    #[arg(long, default_value_t = 100)]
    quantity: u64,
    /// Amount each worker decrements.
    #[arg(long, default_value_t = 1)]
    amount: u64,
    /// Simulated store round trip; overrides the config file.
    #[arg(long)]
    latency_ms: Option<u64>,
    /// JSON configuration file.
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Strategy {
    Unguarded,
    LocalMutex,
    Pessimistic,
    OptimisticOnce,
    OptimisticRetry,
    NamedLock,
}

struct Runner {
    strategy: Strategy,
    facade: StockFacade<MemoryStockStore>,
    unguarded: UnguardedStockService<MemoryStockStore>,
    local_mutex: LocalMutexStockService<MemoryStockStore>,
}

impl Runner {
    fn new(strategy: Strategy, store: Arc<MemoryStockStore>, config: StockConfig) -> Self {
        Self {
            strategy,
            unguarded: UnguardedStockService::new(Arc::clone(&store)),
            local_mutex: LocalMutexStockService::new(Arc::clone(&store)),
            facade: StockFacade::new(store, config),
        }
    }

    async fn decrease(&self, id: StockId, amount: u64) -> stocklock::Result<()> {
        match self.strategy {
            Strategy::Unguarded => self.unguarded.decrease(id, amount).await,
            Strategy::LocalMutex => self.local_mutex.decrease(id, amount).await,
            Strategy::Pessimistic => self.facade.decrease_pessimistic(id, amount).await,
            Strategy::OptimisticOnce => self.facade.decrease_optimistic_once(id, amount).await,
            Strategy::OptimisticRetry => {
                self.facade.decrease_with_optimistic_retry(id, amount).await
            }
            Strategy::NamedLock => self.facade.decrease_with_named_lock(id, amount).await,
        }
    }
}

fn setup_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(std::io::stdout().is_terminal())
        .compact()
        .init();
}

fn load_config(cli: &Cli) -> Result<StockConfig> {
    let mut config = match &cli.config {
        Some(path) => StockConfig::load(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => StockConfig::default(),
    };

    if let Some(latency_ms) = cli.latency_ms {
        config.store = config.store.io_latency_ms(latency_ms);
    }
    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_tracing();
    let cli = Cli::parse();

    if cli.workers == 0 {
        bail!("--workers must be at least 1");
    }
    let config = load_config(&cli)?;

    let store = Arc::new(MemoryStockStore::new(config.store.clone()));
    let id = store.create_stock(ProductId(1), cli.quantity).await?.id();
    let runner = Arc::new(Runner::new(cli.strategy, Arc::clone(&store), config));
    let barrier = Arc::new(Barrier::new(cli.workers));

    info!(
        strategy = ?cli.strategy,
        workers = cli.workers,
        quantity = cli.quantity,
        amount = cli.amount,
        "Starting scenario"
    );
    let started = Instant::now();

    let handles: Vec<_> = (0..cli.workers)
        .map(|_| {
            let runner = Arc::clone(&runner);
            let barrier = Arc::clone(&barrier);
            let amount = cli.amount;
            tokio::spawn(async move {
                barrier.wait().await;
                runner.decrease(id, amount).await
            })
        })
        .collect();

    let mut succeeded = 0usize;
    let mut failures: BTreeMap<&'static str, usize> = BTreeMap::new();
    for handle in handles {
        match handle.await.context("worker task panicked")? {
            Ok(()) => succeeded += 1,
            Err(err) => *failures.entry(err.kind()).or_default() += 1,
        }
    }

    let row = store
        .snapshot(id)
        .await
        .context("seeded stock is missing")?;
    let expected = cli
        .quantity
        .saturating_sub(cli.amount.saturating_mul(succeeded as u64));

    info!(
        strategy = ?cli.strategy,
        succeeded,
        final_quantity = row.quantity,
        expected_quantity = expected,
        version = row.version,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Scenario finished"
    );
    for (kind, count) in &failures {
        info!(kind, count, "Failed decrements");
    }
    if row.quantity > expected {
        info!(
            lost = row.quantity - expected,
            "Committed decrements were overwritten"
        );
    }

    Ok(())
}
