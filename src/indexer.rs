// FILE: src/indexer.rs
//! Indexer: initial walk of the root, then live filesystem notifications.
//!
//! Both sources feed one ordered sink of `IndexerEvent`s, so whoever applies
//! them never needs to know whether an event came from the walk or the
//! watcher. Failures on individual entries are logged and skipped.
//!
//! Watch notifications are collected per path and only acted on once the
//! path has been quiet for `SETTLE`. A single write usually arrives as a
//! create followed by several modifies; it still yields one discovery.

use crate::error::Result;
use crate::identity::{identify, is_hidden, FileId};
use crate::record::FileRecord;
use chrono::{DateTime, Utc};
use notify::event::ModifyKind;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tokio_util::sync::CancellationToken;

/// How often the watch thread wakes up to check for cancellation.
const WATCH_POLL: Duration = Duration::from_millis(50);

/// Quiet period a path needs before its notifications are acted on.
const SETTLE: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, PartialEq)]
pub enum IndexerEvent {
    Discovered(FileRecord),
    Removed { id: FileId, path: PathBuf },
    ScanComplete(DateTime<Utc>),
}

pub type EventSink = UnboundedSender<IndexerEvent>;
pub type EventSource = UnboundedReceiver<IndexerEvent>;

pub fn event_channel() -> (EventSink, EventSource) {
    tokio::sync::mpsc::unbounded_channel()
}

/// What happened to one traversal entry.
#[derive(Debug)]
pub enum EntryOutcome {
    Indexed(FileRecord),
    Skipped { path: PathBuf, reason: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScanReport {
    pub indexed: usize,
    pub skipped: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

struct Inner {
    sink: EventSink,
    scanning: AtomicBool,
    include_hidden: bool,
}

/// Releases the scan flag however the scan ends.
struct ScanGuard<'a>(&'a AtomicBool);

impl Drop for ScanGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

#[derive(Clone)]
pub struct Indexer {
    inner: Arc<Inner>,
}

impl Indexer {
    pub fn new(sink: EventSink, include_hidden: bool) -> Self {
        Self {
            inner: Arc::new(Inner {
                sink,
                scanning: AtomicBool::new(false),
                include_hidden,
            }),
        }
    }

    pub fn is_scanning(&self) -> bool {
        self.inner.scanning.load(Ordering::Acquire)
    }

    /// Walk `root` once. Returns `None` without doing anything when another
    /// scan is already running.
    pub async fn scan(&self, root: &Path) -> Option<ScanReport> {
        self.scan_until(root, CancellationToken::new()).await
    }

    async fn scan_until(&self, root: &Path, cancel: CancellationToken) -> Option<ScanReport> {
        if self
            .inner
            .scanning
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::debug!("[Indexer] Scan already in progress, ignoring request for {}", root.display());
            return None;
        }
        let _guard = ScanGuard(&self.inner.scanning);

        let inner = Arc::clone(&self.inner);
        let root = root.to_path_buf();
        let result = tokio::task::spawn_blocking(move || {
            scan_tree(&root, &root, inner.include_hidden, &inner.sink, &cancel)
        })
        .await;

        match result {
            Ok(report) => report,
            Err(e) => {
                tracing::error!("[Indexer] Scan task failed: {}", e);
                None
            }
        }
    }

    /// Subscribe to changes under `root`. The OS watch is registered before
    /// this returns.
    pub fn watch(&self, root: &Path) -> Result<WatchHandle> {
        self.watch_until(root, CancellationToken::new())
    }

    fn watch_until(&self, root: &Path, cancel: CancellationToken) -> Result<WatchHandle> {
        let (tx, rx) = mpsc::channel();
        let mut watcher = RecommendedWatcher::new(tx, notify::Config::default())?;
        watcher.watch(root, RecursiveMode::Recursive)?;

        let inner = Arc::clone(&self.inner);
        let root = root.to_path_buf();
        let loop_cancel = cancel.clone();
        let thread = thread::Builder::new()
            .name("filecloud-watch".into())
            .spawn(move || {
                tracing::info!("[Indexer] Watching {}", root.display());
                watch_loop(&rx, &root, &inner, &loop_cancel);
                // Dropping the watcher here releases the OS watch
                drop(watcher);
                tracing::info!("[Indexer] Watch on {} stopped", root.display());
            })?;

        Ok(WatchHandle { cancel, thread: Some(thread) })
    }

    /// Register the watch, then run the initial scan in the background.
    /// Changes racing the scan are reported by both; the store ignores a
    /// rediscovery that changes nothing.
    pub fn start(&self, root: &Path) -> Result<IndexerHandle> {
        let cancel = CancellationToken::new();
        let watch = self.watch_until(root, cancel.clone())?;

        let indexer = self.clone();
        let root = root.to_path_buf();
        let scan_cancel = cancel.clone();
        let scan = tokio::spawn(async move { indexer.scan_until(&root, scan_cancel).await });

        Ok(IndexerHandle { cancel, watch, scan: Some(scan) })
    }
}

/// A running watch. `stop` returns only after the watch thread has exited.
pub struct WatchHandle {
    cancel: CancellationToken,
    thread: Option<thread::JoinHandle<()>>,
}

impl WatchHandle {
    pub fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

    pub async fn stop(mut self) {
        self.cancel.cancel();
        if let Some(thread) = self.thread.take() {
            if tokio::task::spawn_blocking(move || thread.join()).await.is_err() {
                tracing::error!("[Indexer] Watch thread did not shut down cleanly");
            }
        }
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Initial scan plus live watch, sharing one cancellation token.
pub struct IndexerHandle {
    cancel: CancellationToken,
    watch: WatchHandle,
    scan: Option<tokio::task::JoinHandle<Option<ScanReport>>>,
}

impl IndexerHandle {
    /// Wait for the initial scan. Only the first call yields the report.
    pub async fn scan_finished(&mut self) -> Option<ScanReport> {
        let task = self.scan.take()?;
        task.await.ok().flatten()
    }

    /// Cancel both activities and wait until neither can emit again.
    pub async fn stop(mut self) {
        self.cancel.cancel();
        if let Some(scan) = self.scan.take() {
            let _ = scan.await;
        }
        self.watch.stop().await;
    }
}

/// Classify one walk entry. Directories and symlinks produce nothing.
fn entry_outcome(entry: walkdir::Result<walkdir::DirEntry>) -> Option<EntryOutcome> {
    match entry {
        Ok(entry) => {
            if !entry.file_type().is_file() {
                return None;
            }
            let outcome = match entry.metadata() {
                Ok(metadata) => EntryOutcome::Indexed(FileRecord::from_metadata(entry.path(), &metadata)),
                Err(e) => EntryOutcome::Skipped { path: entry.path().to_path_buf(), reason: e.to_string() },
            };
            Some(outcome)
        }
        Err(e) => Some(EntryOutcome::Skipped {
            path: e.path().map(Path::to_path_buf).unwrap_or_default(),
            reason: e.to_string(),
        }),
    }
}

/// Walk `dir` (inside `root`) and emit a discovery for every regular file.
/// Emits `ScanComplete` only when `dir` is the root and the walk was not
/// cancelled. Returns `None` if cancelled, if the sink closed, or if the root
/// itself cannot be read.
fn scan_tree(
    root: &Path,
    dir: &Path,
    include_hidden: bool,
    sink: &EventSink,
    cancel: &CancellationToken,
) -> Option<ScanReport> {
    let started_at = Utc::now();
    let full_scan = root == dir;
    if full_scan {
        if let Err(e) = std::fs::read_dir(root) {
            tracing::error!("[Indexer] Cannot scan {}: {}", root.display(), e);
            return None;
        }
        tracing::info!("[Indexer] 🚀 Starting scan of {}", root.display());
    }

    let mut indexed = 0;
    let mut skipped = 0;

    let walker = walkdir::WalkDir::new(dir)
        .follow_links(false)
        .into_iter()
        .filter_entry(|e| include_hidden || e.depth() == 0 || !is_hidden(e.path(), root));

    for entry in walker {
        if cancel.is_cancelled() {
            tracing::info!("[Indexer] Scan of {} cancelled after {} files", dir.display(), indexed);
            return None;
        }

        match entry_outcome(entry) {
            Some(EntryOutcome::Indexed(record)) => {
                if sink.send(IndexerEvent::Discovered(record)).is_err() {
                    tracing::warn!("[Indexer] Event sink closed, abandoning scan of {}", dir.display());
                    return None;
                }
                indexed += 1;
            }
            Some(EntryOutcome::Skipped { path, reason }) => {
                tracing::warn!("[Indexer] Skipping {}: {}", path.display(), reason);
                skipped += 1;
            }
            None => {}
        }
    }

    let finished_at = Utc::now();
    if full_scan {
        if sink.send(IndexerEvent::ScanComplete(finished_at)).is_err() {
            return None;
        }
        tracing::info!("[Indexer] Scan complete: {} files indexed, {} skipped", indexed, skipped);
    }

    Some(ScanReport { indexed, skipped, started_at, finished_at })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Change {
    /// Created, removed or renamed.
    Structural,
    /// Written in place.
    Content,
}

#[derive(Debug)]
struct PendingChange {
    change: Change,
    last_event: Instant,
}

impl PendingChange {
    fn new(change: Change, now: Instant) -> Self {
        Self { change, last_event: now }
    }

    fn update(&mut self, change: Change, now: Instant) {
        if change == Change::Structural {
            self.change = Change::Structural;
        }
        self.last_event = now;
    }
}

/// Notifications waiting for their path to go quiet.
#[derive(Debug, Default)]
struct PendingChanges {
    paths: HashMap<PathBuf, PendingChange>,
}

impl PendingChanges {
    fn record(&mut self, path: PathBuf, change: Change, now: Instant) {
        self.paths
            .entry(path)
            .and_modify(|pending| pending.update(change, now))
            .or_insert_with(|| PendingChange::new(change, now));
    }

    /// Remove and return every path quiet for at least `SETTLE`, oldest first.
    fn take_settled(&mut self, now: Instant) -> Vec<(PathBuf, Change)> {
        let mut settled: Vec<_> = self
            .paths
            .iter()
            .filter(|(_, pending)| now.saturating_duration_since(pending.last_event) >= SETTLE)
            .map(|(path, pending)| (pending.last_event, path.clone()))
            .collect();
        settled.sort();

        settled
            .into_iter()
            .filter_map(|(_, path)| self.paths.remove(&path).map(|pending| (path, pending.change)))
            .collect()
    }

    fn len(&self) -> usize {
        self.paths.len()
    }

    fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

fn watch_loop(
    rx: &mpsc::Receiver<notify::Result<Event>>,
    root: &Path,
    inner: &Inner,
    cancel: &CancellationToken,
) {
    let mut pending = PendingChanges::default();

    while !cancel.is_cancelled() {
        match rx.recv_timeout(WATCH_POLL) {
            Ok(Ok(event)) => queue_event(&event, root, inner.include_hidden, &mut pending, Instant::now()),
            Ok(Err(e)) => tracing::warn!("[Indexer] Watch error: {}", e),
            Err(mpsc::RecvTimeoutError::Timeout) => {}
            Err(mpsc::RecvTimeoutError::Disconnected) => return,
        }

        for (path, change) in pending.take_settled(Instant::now()) {
            if cancel.is_cancelled() {
                break;
            }
            if !settle(&path, change, root, inner, cancel) {
                tracing::warn!("[Indexer] Event sink closed, ending watch");
                return;
            }
        }
    }

    if !pending.is_empty() {
        tracing::debug!("[Indexer] Dropping {} unsettled changes", pending.len());
    }
}

/// Note which paths a notification touched. Nothing is emitted here.
fn queue_event(event: &Event, root: &Path, include_hidden: bool, pending: &mut PendingChanges, now: Instant) {
    let change = match event.kind {
        EventKind::Create(_) | EventKind::Remove(_) | EventKind::Modify(ModifyKind::Name(_)) => Change::Structural,
        EventKind::Modify(ModifyKind::Data(_)) | EventKind::Modify(ModifyKind::Any) => Change::Content,
        _ => return,
    };
    for path in &event.paths {
        if include_hidden || !is_hidden(path, root) {
            pending.record(path.clone(), change, now);
        }
    }
}

/// Act on a path that has gone quiet, going by what is on disk now rather
/// than by the notifications that led here. Returns false once the sink is
/// gone.
fn settle(path: &Path, change: Change, root: &Path, inner: &Inner, cancel: &CancellationToken) -> bool {
    let metadata = match std::fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return removed(path, &inner.sink),
        Err(e) => {
            tracing::warn!("[Indexer] Error watching file {}: {}", path.display(), e);
            return true;
        }
    };

    if metadata.file_type().is_symlink() {
        return true;
    }
    if metadata.is_dir() {
        if change == Change::Content {
            return true;
        }
        // Files moved in along with a directory get no events of their own
        return scan_tree(root, path, inner.include_hidden, &inner.sink, cancel).is_some() || cancel.is_cancelled();
    }

    let record = FileRecord::from_metadata(path, &metadata);
    tracing::debug!("[Indexer] Discovered {}", record);
    inner.sink.send(IndexerEvent::Discovered(record)).is_ok()
}

fn removed(path: &Path, sink: &EventSink) -> bool {
    let id = identify(path);
    tracing::debug!("[Indexer] Removed {} ({})", path.display(), id);
    sink.send(IndexerEvent::Removed { id, path: path.to_path_buf() }).is_ok()
}
