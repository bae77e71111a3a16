//! Fetch Worker Pool
//!
//! Worker threads that execute fetch requests off the render thread and
//! write the results back into the texture cache and the pyramid's
//! resource-absent table.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use ahash::AHashSet;
use crossbeam::channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use parking_lot::Mutex;

use crate::config::FetchConfig;
use crate::error::{FetchError, TileResult};
use crate::fetch::{FetchRequest, TaskService};
use crate::pyramid::LevelPyramid;
use crate::residency::{ForceLoad, TextureCache};
use crate::tile::TileKey;

/// What a fetcher found for a tile
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    /// Imagery was retrieved and decoded
    Loaded,
    /// The source has no imagery for this tile
    NoContent,
}

/// Retrieves and decodes one tile's imagery
pub trait TileFetcher: Send + Sync {
    fn fetch(&self, key: &TileKey) -> Result<FetchOutcome, FetchError>;
}

impl<F> TileFetcher for F
where
    F: Fn(&TileKey) -> Result<FetchOutcome, FetchError> + Send + Sync,
{
    fn fetch(&self, key: &TileKey) -> Result<FetchOutcome, FetchError> {
        self(key)
    }
}

/// State shared between the pool handle and its workers
struct Shared {
    fetcher: Arc<dyn TileFetcher>,
    cache: Arc<TextureCache>,
    pyramid: Arc<LevelPyramid>,
    in_flight: Mutex<AHashSet<TileKey>>,
    completed: AtomicUsize,
    failed: AtomicUsize,
    retain_level_zero: AtomicBool,
}

impl Shared {
    /// Run the fetcher, turning a panic into a failed fetch
    fn fetch(&self, key: &TileKey) -> Result<FetchOutcome, FetchError> {
        panic::catch_unwind(AssertUnwindSafe(|| self.fetcher.fetch(key)))
            .unwrap_or_else(|_| Err(FetchError::Failed(*key, "fetcher panicked".into())))
    }

    /// Run the fetcher and record the result
    fn execute(&self, key: &TileKey) {
        match self.fetch(key) {
            Ok(FetchOutcome::Loaded) => {
                if key.level == 0 && self.retain_level_zero.load(Ordering::Relaxed) {
                    self.cache.insert_pinned(*key);
                } else {
                    self.cache.insert(*key);
                }
                self.pyramid.unmark_key_absent(key);
                self.completed.fetch_add(1, Ordering::Relaxed);
                log::trace!("Loaded tile {key}");
            }
            Ok(FetchOutcome::NoContent) => {
                self.pyramid.mark_key_absent(key);
                self.completed.fetch_add(1, Ordering::Relaxed);
                log::debug!("No imagery for tile {key}");
            }
            Err(err) => {
                self.pyramid.mark_key_absent(key);
                self.failed.fetch_add(1, Ordering::Relaxed);
                log::warn!("{err}");
            }
        }
    }
}

/// Task service backed by a fixed set of fetch threads
pub struct FetchWorkerPool {
    workers: Vec<Worker>,
    sender: Option<Sender<FetchRequest>>,
    shutdown: Arc<AtomicBool>,
    shared: Arc<Shared>,
    max_in_flight: usize,
}

struct Worker {
    id: usize,
    thread: Option<JoinHandle<()>>,
}

impl Worker {
    fn spawn(
        id: usize,
        receiver: Receiver<FetchRequest>,
        shutdown: Arc<AtomicBool>,
        shared: Arc<Shared>,
    ) -> TileResult<Self> {
        let thread = thread::Builder::new()
            .name(format!("tile-fetch-{id}"))
            .spawn(move || {
                while !shutdown.load(Ordering::Relaxed) {
                    match receiver.recv_timeout(Duration::from_millis(100)) {
                        Ok(request) => {
                            shared.execute(&request.key);
                            shared.in_flight.lock().remove(&request.key);
                        }
                        Err(RecvTimeoutError::Timeout) => continue,
                        Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
            })?;

        Ok(Self {
            id,
            thread: Some(thread),
        })
    }
}

impl FetchWorkerPool {
    /// Start the pool
    pub fn new(
        config: &FetchConfig,
        fetcher: Arc<dyn TileFetcher>,
        cache: Arc<TextureCache>,
        pyramid: Arc<LevelPyramid>,
    ) -> TileResult<Self> {
        config.validate()?;

        let (sender, receiver) = bounded(config.queue_depth);
        let shutdown = Arc::new(AtomicBool::new(false));
        let shared = Arc::new(Shared {
            fetcher,
            cache,
            pyramid,
            in_flight: Mutex::new(AHashSet::new()),
            completed: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
            retain_level_zero: AtomicBool::new(false),
        });

        let workers = (0..config.workers)
            .map(|id| Worker::spawn(id, receiver.clone(), shutdown.clone(), shared.clone()))
            .collect::<TileResult<Vec<_>>>()?;

        log::info!(
            "Started {} fetch workers (max {} in flight)",
            workers.len(),
            config.max_in_flight
        );

        Ok(Self {
            workers,
            sender: Some(sender),
            shutdown,
            shared,
            max_in_flight: config.max_in_flight,
        })
    }

    /// Pin level-zero tiles in the cache as they load
    pub fn set_retain_level_zero_tiles(&self, retain: bool) {
        self.shared.retain_level_zero.store(retain, Ordering::Relaxed);
    }

    /// Number of worker threads
    pub fn num_workers(&self) -> usize {
        self.workers.len()
    }

    /// Tiles submitted but not yet finished
    pub fn in_flight(&self) -> usize {
        self.shared.in_flight.lock().len()
    }

    /// Check whether a tile is being fetched
    pub fn is_in_flight(&self, key: &TileKey) -> bool {
        self.shared.in_flight.lock().contains(key)
    }

    /// Fetches that finished, with or without content
    pub fn completed(&self) -> usize {
        self.shared.completed.load(Ordering::Relaxed)
    }

    /// Fetches that failed
    pub fn failed(&self) -> usize {
        self.shared.failed.load(Ordering::Relaxed)
    }

    /// Block until nothing is in flight
    pub fn wait_idle(&self) {
        while self.in_flight() > 0 {
            thread::yield_now();
        }
    }

    /// Check if the pool is idle
    pub fn is_idle(&self) -> bool {
        self.in_flight() == 0
    }
}

impl TaskService for FetchWorkerPool {
    fn has_capacity(&self) -> bool {
        self.in_flight() < self.max_in_flight
    }

    fn submit(&self, request: FetchRequest) -> bool {
        let Some(sender) = &self.sender else {
            return false;
        };

        if !self.shared.in_flight.lock().insert(request.key) {
            log::trace!("Tile {} already in flight", request.key);
            return false;
        }

        match sender.try_send(request) {
            Ok(()) => true,
            Err(err) => {
                self.shared.in_flight.lock().remove(&request.key);
                match err {
                    TrySendError::Full(_) => log::trace!("Fetch channel full, dropping {}", request.key),
                    TrySendError::Disconnected(_) => {
                        log::warn!("Fetch workers gone, dropping {}", request.key)
                    }
                }
                false
            }
        }
    }
}

impl ForceLoad for FetchWorkerPool {
    fn force_load(&self, key: &TileKey) {
        log::debug!("Forcing load of tile {key}");
        self.shared.execute(key);
    }
}

impl Drop for FetchWorkerPool {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        drop(self.sender.take());

        for worker in &mut self.workers {
            if let Some(thread) = worker.thread.take() {
                if thread.join().is_err() {
                    log::warn!("Fetch worker {} panicked", worker.id);
                }
            }
        }
        log::info!("Stopped fetch workers");
    }
}
