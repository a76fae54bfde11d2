#![allow(dead_code)]

use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;
use stocklock::{
    MemoryStockStore, NamedLockLease, ProductId, Result, Stock, StockId, StockStore,
    StoreConfig, TransactionId,
};
use tokio::sync::Barrier;

pub fn store_with_latency(io_latency_ms: u64) -> Arc<MemoryStockStore> {
    Arc::new(MemoryStockStore::new(
        StoreConfig::default().io_latency_ms(io_latency_ms),
    ))
}

pub async fn seed<S: StockStore + ?Sized>(store: &S, quantity: u64) -> StockId {
    store
        .create_stock(ProductId(1), quantity)
        .await
        .expect("seed stock")
        .id()
}

/// Spawns `workers` tasks that start together and returns their results in
/// spawn order.
pub async fn run_concurrently<F, Fut>(workers: usize, make: F) -> Vec<Result<()>>
where
    F: Fn() -> Fut,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    let barrier = Arc::new(Barrier::new(workers));
    let handles: Vec<_> = (0..workers)
        .map(|_| {
            let work = make();
            let barrier = Arc::clone(&barrier);
            tokio::spawn(async move {
                barrier.wait().await;
                work.await
            })
        })
        .collect();

    let mut results = Vec::with_capacity(workers);
    for handle in handles {
        results.push(handle.await.expect("worker panicked"));
    }
    results
}

pub fn count_ok(results: &[Result<()>]) -> usize {
    results.iter().filter(|r| r.is_ok()).count()
}

/// Waits until `check` holds, polling for at most one second.
pub async fn eventually(check: impl Fn() -> bool) -> bool {
    for _ in 0..100 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}

/// Waits up to one second for every open transaction to end and returns how
/// many are left.
pub async fn settled_transactions(store: &MemoryStockStore) -> usize {
    for _ in 0..100 {
        if store.active_transactions().await == 0 {
            return 0;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    store.active_transactions().await
}

/// Store wrapper that records named-lock traffic and transaction starts.
pub struct TrackingStore {
    inner: MemoryStockStore,
    holders: AtomicUsize,
    max_holders: AtomicUsize,
    acquisitions: AtomicUsize,
    releases: AtomicUsize,
    begins: AtomicUsize,
    panic_on_versioned_fetch: AtomicBool,
}

impl TrackingStore {
    pub fn new(config: StoreConfig) -> Arc<Self> {
        Arc::new(Self {
            inner: MemoryStockStore::new(config),
            holders: AtomicUsize::new(0),
            max_holders: AtomicUsize::new(0),
            acquisitions: AtomicUsize::new(0),
            releases: AtomicUsize::new(0),
            begins: AtomicUsize::new(0),
            panic_on_versioned_fetch: AtomicBool::new(false),
        })
    }

    pub fn inner(&self) -> &MemoryStockStore {
        &self.inner
    }

    pub fn max_holders(&self) -> usize {
        self.max_holders.load(Ordering::SeqCst)
    }

    pub fn acquisitions(&self) -> usize {
        self.acquisitions.load(Ordering::SeqCst)
    }

    pub fn releases(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }

    pub fn begins(&self) -> usize {
        self.begins.load(Ordering::SeqCst)
    }

    pub fn panic_on_versioned_fetch(&self, enabled: bool) {
        self.panic_on_versioned_fetch.store(enabled, Ordering::SeqCst);
    }
}

#[async_trait]
impl StockStore for TrackingStore {
    async fn begin(&self) -> Result<TransactionId> {
        self.begins.fetch_add(1, Ordering::SeqCst);
        self.inner.begin().await
    }

    async fn commit(&self, tx: TransactionId) -> Result<()> {
        self.inner.commit(tx).await
    }

    async fn rollback(&self, tx: TransactionId) -> Result<()> {
        self.inner.rollback(tx).await
    }

    async fn create_stock(&self, product_id: ProductId, quantity: u64) -> Result<Stock> {
        self.inner.create_stock(product_id, quantity).await
    }

    async fn fetch_by_id(&self, tx: TransactionId, id: StockId) -> Result<Stock> {
        self.inner.fetch_by_id(tx, id).await
    }

    async fn fetch_with_pessimistic_lock(&self, tx: TransactionId, id: StockId) -> Result<Stock> {
        self.inner.fetch_with_pessimistic_lock(tx, id).await
    }

    async fn fetch_with_version(&self, tx: TransactionId, id: StockId) -> Result<Stock> {
        if self.panic_on_versioned_fetch.load(Ordering::SeqCst) {
            panic!("injected fault while reading stock {}", id);
        }
        self.inner.fetch_with_version(tx, id).await
    }

    async fn persist(&self, tx: TransactionId, stock: &Stock) -> Result<()> {
        self.inner.persist(tx, stock).await
    }

    async fn acquire_named_lock(&self, key: &str, wait: Duration) -> Result<NamedLockLease> {
        let lease = self.inner.acquire_named_lock(key, wait).await?;
        self.acquisitions.fetch_add(1, Ordering::SeqCst);
        let now = self.holders.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_holders.fetch_max(now, Ordering::SeqCst);
        Ok(lease)
    }

    async fn release_named_lock(&self, lease: NamedLockLease) -> Result<()> {
        self.holders.fetch_sub(1, Ordering::SeqCst);
        self.releases.fetch_add(1, Ordering::SeqCst);
        self.inner.release_named_lock(lease).await
    }
}
