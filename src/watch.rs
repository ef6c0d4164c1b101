//! Filesystem watcher with debounced, batched re-index scheduling.
//!
//! One producer (the notify backend) feeds a bounded drop-oldest queue; one
//! worker thread consumes it, applies the ignore and extension filters,
//! debounces per path, and invokes the re-index callback once per quiet
//! batch. The callback runs on the worker thread, so a batch that arrives
//! while it is still running simply waits. Directory-level watch failures
//! unregister that directory and continue; a vanished root is terminal.

use crate::config::WatchConfig;
use crate::error::{IndexError, Result};
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

/// Queue capacity; on overflow the oldest pending event is dropped.
const EVENT_QUEUE_CAP: usize = 1024;

/// Worker wake-up granularity for timer checks.
const TICK_MS: u64 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchEventKind {
    Add,
    Change,
    Delete,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchEvent {
    pub kind: WatchEventKind,
    pub path: PathBuf,
}

// ---------------------------------------------------------------------------
// Ignore set
// ---------------------------------------------------------------------------

/// Combined ignore patterns: configured ones plus `.gitignore` lines.
/// Wildcard patterns are compiled as globs; plain ones match as path
/// substrings. Negations (`!`) are not supported and are dropped.
pub struct IgnoreSet {
    globs: GlobSet,
    literals: Vec<String>,
}

impl IgnoreSet {
    pub fn new(patterns: &[String]) -> IgnoreSet {
        let mut builder = GlobSetBuilder::new();
        let mut literals = Vec::new();
        for pattern in patterns {
            let trimmed = pattern.trim().trim_matches('/');
            if trimmed.is_empty() {
                continue;
            }
            if trimmed.contains(&['*', '?', '['][..]) {
                match GlobBuilder::new(trimmed).literal_separator(false).build() {
                    Ok(glob) => {
                        builder.add(glob);
                    }
                    Err(e) => {
                        warn!(pattern = trimmed, error = %e, "unusable ignore pattern");
                    }
                }
            } else {
                literals.push(trimmed.to_string());
            }
        }
        let globs = builder.build().unwrap_or_else(|_| GlobSet::empty());
        IgnoreSet { globs, literals }
    }

    /// Load `.gitignore` from the root, skipping comments, blank lines, and
    /// negations, and merge with the configured patterns.
    pub fn with_gitignore(root: &Path, configured: &[String]) -> IgnoreSet {
        let mut patterns: Vec<String> = configured.to_vec();
        if let Ok(content) = std::fs::read_to_string(root.join(".gitignore")) {
            for line in content.lines() {
                let line = line.trim();
                if line.is_empty() || line.starts_with('#') || line.starts_with('!') {
                    continue;
                }
                patterns.push(line.to_string());
            }
        }
        IgnoreSet::new(&patterns)
    }

    pub fn is_ignored(&self, rel_path: &str) -> bool {
        if self.globs.is_match(rel_path) {
            return true;
        }
        self.literals.iter().any(|lit| {
            rel_path == lit
                || rel_path.starts_with(&format!("{lit}/"))
                || rel_path.contains(&format!("/{lit}/"))
                || rel_path.ends_with(&format!("/{lit}"))
        })
    }
}

// ---------------------------------------------------------------------------
// Bounded event queue (single producer, single consumer, drop-oldest)
// ---------------------------------------------------------------------------

enum QueueItem {
    Fs(Event),
    Failure { message: String, paths: Vec<PathBuf> },
}

struct EventQueue {
    inner: Mutex<VecDeque<QueueItem>>,
    ready: Condvar,
}

impl EventQueue {
    fn new() -> Self {
        EventQueue { inner: Mutex::new(VecDeque::new()), ready: Condvar::new() }
    }

    fn push(&self, item: QueueItem) {
        let mut q = self.inner.lock().unwrap();
        if q.len() >= EVENT_QUEUE_CAP {
            q.pop_front();
            debug!("event queue full, dropped oldest");
        }
        q.push_back(item);
        self.ready.notify_one();
    }

    fn pop_timeout(&self, timeout: Duration) -> Option<QueueItem> {
        let mut q = self.inner.lock().unwrap();
        if q.is_empty() {
            let (guard, _) = self.ready.wait_timeout(q, timeout).unwrap();
            q = guard;
        }
        q.pop_front()
    }
}

// ---------------------------------------------------------------------------
// Event classification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Classified {
    File(WatchEventKind),
    /// A directory we may need to start watching.
    NewDir,
    Drop,
}

/// Map a raw notification to an engine-facing event. `exists`/`is_dir`
/// reflect the path at notification time.
fn classify(kind: &EventKind, exists: bool, is_dir: bool) -> Classified {
    if !exists {
        return Classified::File(WatchEventKind::Delete);
    }
    if is_dir {
        return match kind {
            EventKind::Create(_) => Classified::NewDir,
            _ => Classified::Drop,
        };
    }
    match kind {
        EventKind::Create(_) | EventKind::Modify(notify::event::ModifyKind::Name(_)) => {
            Classified::File(WatchEventKind::Add)
        }
        EventKind::Modify(_) => Classified::File(WatchEventKind::Change),
        EventKind::Remove(_) => Classified::File(WatchEventKind::Delete),
        _ => Classified::Drop,
    }
}

// ---------------------------------------------------------------------------
// Watcher
// ---------------------------------------------------------------------------

pub type ReindexCallback = Box<dyn FnMut(&[WatchEvent]) + Send>;

pub struct RepoWatcher {
    stop: Arc<AtomicBool>,
    queue: Arc<EventQueue>,
    worker: Option<std::thread::JoinHandle<()>>,
    terminal_error: Arc<Mutex<Option<String>>>,
    /// Kept so the notify backend stays registered; shared with the worker
    /// for re-registering newly created directories.
    _watcher: Arc<Mutex<RecommendedWatcher>>,
}

impl RepoWatcher {
    /// Start watching `root`. The callback fires on the worker thread, once
    /// per settled batch of debounced events.
    pub fn start(root: &Path, config: WatchConfig, callback: ReindexCallback) -> Result<RepoWatcher> {
        let root = root
            .canonicalize()
            .map_err(|e| IndexError::RootUnavailable { path: root.to_path_buf(), source: e })?;

        let queue = Arc::new(EventQueue::new());
        let producer = Arc::clone(&queue);
        let watcher = RecommendedWatcher::new(
            move |res: std::result::Result<Event, notify::Error>| match res {
                Ok(event) => producer.push(QueueItem::Fs(event)),
                Err(e) => producer.push(QueueItem::Failure {
                    message: e.to_string(),
                    paths: e.paths.clone(),
                }),
            },
            notify::Config::default(),
        )
        .map_err(|e| IndexError::Watch(e.to_string()))?;

        let watcher = Arc::new(Mutex::new(watcher));
        let mode = if config.recursive {
            RecursiveMode::Recursive
        } else {
            RecursiveMode::NonRecursive
        };
        watcher
            .lock()
            .unwrap()
            .watch(&root, mode)
            .map_err(|e| IndexError::Watch(e.to_string()))?;

        let stop = Arc::new(AtomicBool::new(false));
        let terminal_error = Arc::new(Mutex::new(None));

        let worker = {
            let queue = Arc::clone(&queue);
            let stop = Arc::clone(&stop);
            let terminal_error = Arc::clone(&terminal_error);
            let watcher = Arc::clone(&watcher);
            std::thread::spawn(move || {
                let mut loop_state = WorkerState::new(root, config, callback, watcher);
                loop_state.run(&queue, &stop, &terminal_error);
            })
        };

        Ok(RepoWatcher {
            stop,
            queue,
            worker: Some(worker),
            terminal_error,
            _watcher: watcher,
        })
    }

    /// The terminal failure, if the watcher has died.
    pub fn take_error(&self) -> Option<IndexError> {
        self.terminal_error.lock().unwrap().take().map(IndexError::Watch)
    }

    /// Stop the worker, cancelling all pending debounce timers first.
    pub fn shutdown(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        // Wake the worker if it is blocked on the queue.
        self.queue.push(QueueItem::Failure { message: String::new(), paths: vec![] });
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for RepoWatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// ---------------------------------------------------------------------------
// Worker
// ---------------------------------------------------------------------------

struct WorkerState {
    root: PathBuf,
    config: WatchConfig,
    callback: ReindexCallback,
    watcher: Arc<Mutex<RecommendedWatcher>>,
    ignores: IgnoreSet,
    extensions: HashSet<String>,
    watched_dirs: HashSet<PathBuf>,
    /// path -> (latest event time, latest classification)
    pending: HashMap<PathBuf, (Instant, WatchEventKind)>,
    batch: Vec<WatchEvent>,
    last_batch_activity: Option<Instant>,
}

impl WorkerState {
    fn new(
        root: PathBuf,
        config: WatchConfig,
        callback: ReindexCallback,
        watcher: Arc<Mutex<RecommendedWatcher>>,
    ) -> WorkerState {
        let ignores = IgnoreSet::with_gitignore(&root, &config.ignore_patterns);
        let extensions: HashSet<String> =
            config.watch_extensions.iter().map(|e| e.to_ascii_lowercase()).collect();
        WorkerState {
            root,
            config,
            callback,
            watcher,
            ignores,
            extensions,
            watched_dirs: HashSet::new(),
            pending: HashMap::new(),
            batch: Vec::new(),
            last_batch_activity: None,
        }
    }

    fn run(
        &mut self,
        queue: &EventQueue,
        stop: &AtomicBool,
        terminal_error: &Mutex<Option<String>>,
    ) {
        loop {
            if stop.load(Ordering::SeqCst) {
                break;
            }
            match queue.pop_timeout(Duration::from_millis(TICK_MS)) {
                Some(QueueItem::Fs(event)) => self.ingest(&event),
                Some(QueueItem::Failure { message, paths }) => {
                    if message.is_empty() {
                        continue; // shutdown wake-up marker
                    }
                    if !self.root.exists() {
                        error!(root = %self.root.display(), "watch root vanished, stopping");
                        *terminal_error.lock().unwrap() =
                            Some(format!("watch root inaccessible: {message}"));
                        break;
                    }
                    for dir in paths {
                        warn!(dir = %dir.display(), error = %message, "unwatching failed directory");
                        let _ = self.watcher.lock().unwrap().unwatch(&dir);
                        self.watched_dirs.remove(&dir);
                    }
                }
                None => {}
            }
            self.flush_debounced();
            self.flush_batch();
        }
        // Shutdown cancels every pending debounce timer before the backend
        // handles close.
        self.pending.clear();
        self.batch.clear();
    }

    fn ingest(&mut self, event: &Event) {
        for path in &event.paths {
            let exists = path.exists();
            let is_dir = exists && path.is_dir();

            let rel = path
                .strip_prefix(&self.root)
                .unwrap_or(path)
                .to_string_lossy()
                .replace('\\', "/");
            if rel.is_empty() || self.ignores.is_ignored(&rel) {
                continue;
            }

            match classify(&event.kind, exists, is_dir) {
                Classified::Drop => {}
                Classified::NewDir => {
                    if !self.config.recursive && self.watched_dirs.insert(path.clone()) {
                        if let Err(e) =
                            self.watcher.lock().unwrap().watch(path, RecursiveMode::NonRecursive)
                        {
                            warn!(dir = %path.display(), error = %e, "failed to watch new dir");
                            self.watched_dirs.remove(path);
                        }
                    }
                }
                Classified::File(kind) => {
                    if !self.extension_allowed(&rel) {
                        continue;
                    }
                    // New events reset the path's debounce timer; only the
                    // latest classification survives the window.
                    self.pending.insert(path.clone(), (Instant::now(), kind));
                }
            }
        }
    }

    fn extension_allowed(&self, rel: &str) -> bool {
        if self.extensions.is_empty() {
            return true;
        }
        rel.rsplit_once('.')
            .map(|(_, ext)| self.extensions.contains(&ext.to_ascii_lowercase()))
            .unwrap_or(false)
    }

    /// Move pending paths whose debounce window elapsed into the batch.
    fn flush_debounced(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        let debounce = Duration::from_millis(self.config.debounce_ms);
        let now = Instant::now();
        let ready: Vec<PathBuf> = self
            .pending
            .iter()
            .filter(|(_, (t, _))| now.duration_since(*t) >= debounce)
            .map(|(p, _)| p.clone())
            .collect();
        for path in ready {
            if let Some((_, kind)) = self.pending.remove(&path) {
                self.batch.push(WatchEvent { kind, path });
                self.last_batch_activity = Some(now);
            }
        }
    }

    /// Invoke the callback once the batch has been quiet long enough. The
    /// callback may panic; the scheduler logs and keeps accepting batches.
    fn flush_batch(&mut self) {
        let Some(last) = self.last_batch_activity else {
            return;
        };
        if self.batch.is_empty() {
            return;
        }
        if last.elapsed() < Duration::from_millis(self.config.batch_delay_ms) {
            return;
        }

        let events = std::mem::take(&mut self.batch);
        self.last_batch_activity = None;
        debug!(events = events.len(), "dispatching reindex batch");

        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            (self.callback)(&events);
        }));
        if outcome.is_err() {
            warn!("reindex callback panicked; continuing to accept batches");
        }
    }
}
