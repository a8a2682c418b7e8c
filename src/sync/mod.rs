//! Sequential page-by-page post retrieval.
//!
//! A [`Syncer`] drives one [`Fetcher`] request at a time:
//!
//! ```text
//! fetch() → page 1 → decode → posts → page 2 → ... → empty page → completed
//! ```
//!
//! Results are reported through a [`SyncDelegate`]. Every run ends with
//! exactly one of `on_sync_completed`, `on_sync_stopped` or `on_sync_failed`.

mod delegate;

pub use delegate::{ChannelDelegate, SyncDelegate, SyncEvent};

use std::sync::{Arc, Mutex, MutexGuard};

use tokio_util::sync::CancellationToken;
use url::Url;

use crate::app::{Result, SyncError};
use crate::fetcher::{FetchRequest, Fetcher};
use crate::normalizer::Normalizer;

pub const FIRST_PAGE: u32 = 1;

/// Server addressing and credentials for a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    pub server_path: String,
    pub category_id: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub category_param: String,
    pub page_param: String,
    pub item_element: String,
}

impl SyncConfig {
    pub fn new(server_path: impl Into<String>) -> Self {
        Self {
            server_path: server_path.into(),
            category_id: String::new(),
            username: None,
            password: None,
            category_param: "category".to_string(),
            page_param: "paged".to_string(),
            item_element: "post".to_string(),
        }
    }

    /// Build the request for `page`, keeping any query already on the path.
    pub fn page_request(&self, page: u32) -> Result<FetchRequest> {
        let mut url = Url::parse(&self.server_path)?;
        {
            let mut query = url.query_pairs_mut();
            if !self.category_id.is_empty() {
                query.append_pair(&self.category_param, &self.category_id);
            }
            query.append_pair(&self.page_param, &page.to_string());
        }

        Ok(FetchRequest::new(url).with_credentials(self.username.clone(), self.password.clone()))
    }
}

/// How the most recent run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    Completed,
    Stopped,
    Failed,
}

/// Counters of the current or most recent run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncStats {
    /// Requests issued, including one that failed
    pub requests: u64,
    /// Body bytes received from successful requests
    pub bytes: u64,
    pub page: u32,
}

impl Default for SyncStats {
    fn default() -> Self {
        Self {
            requests: 0,
            bytes: 0,
            page: FIRST_PAGE,
        }
    }
}

#[derive(Default)]
struct Session {
    running: bool,
    /// Set while the terminal callback of a run is being delivered
    finishing: bool,
    /// A `fetch()` arrived while finishing; the ending task starts it
    restart: bool,
    cancel: CancellationToken,
    stats: SyncStats,
    last_outcome: Option<SyncOutcome>,
}

impl Session {
    fn begin(&mut self) -> CancellationToken {
        self.running = true;
        self.finishing = false;
        self.restart = false;
        self.cancel = CancellationToken::new();
        self.stats = SyncStats::default();
        self.last_outcome = None;
        self.cancel.clone()
    }
}

struct Inner {
    config: SyncConfig,
    fetcher: Arc<dyn Fetcher>,
    delegate: Arc<dyn SyncDelegate>,
    normalizer: Normalizer,
    session: Mutex<Session>,
}

impl Inner {
    fn session(&self) -> MutexGuard<'_, Session> {
        // A poisoned lock still holds consistent counters.
        self.session.lock().unwrap_or_else(|e| e.into_inner())
    }
}

enum Step {
    Continue,
    Done(Termination),
}

enum Termination {
    Completed,
    Stopped,
    Failed(SyncError),
}

/// Cloneable handle to one sync session.
#[derive(Clone)]
pub struct Syncer {
    inner: Arc<Inner>,
}

impl Syncer {
    pub fn new(
        config: SyncConfig,
        fetcher: Arc<dyn Fetcher>,
        delegate: Arc<dyn SyncDelegate>,
    ) -> Self {
        let normalizer = Normalizer::new(config.item_element.clone());
        Self {
            inner: Arc::new(Inner {
                config,
                fetcher,
                delegate,
                normalizer,
                session: Mutex::new(Session::default()),
            }),
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.inner.config
    }

    /// Start a run in the background and return immediately.
    ///
    /// Returns `false` without side effects if a run is already in progress.
    /// A call made while a run is delivering its terminal callback (including
    /// from inside that callback) is queued: the new run starts right after
    /// the terminal callback returns. Must be called from within a tokio
    /// runtime.
    pub fn fetch(&self) -> bool {
        let cancel = {
            let mut session = self.inner.session();
            if session.running {
                if session.finishing && !session.restart {
                    tracing::debug!("Sync finishing, queueing next run");
                    session.restart = true;
                    return true;
                }
                tracing::debug!("Sync already running, ignoring fetch");
                return false;
            }
            session.begin()
        };

        tracing::info!("Starting sync from {}", self.inner.config.server_path);
        tokio::spawn(run(self.inner.clone(), cancel));
        true
    }

    /// Ask the current run to end before its next page request.
    ///
    /// A request already in flight is allowed to finish; its result is
    /// discarded. A run queued by `fetch()` during the terminal callback is
    /// dropped.
    pub fn stop(&self) {
        let mut session = self.inner.session();
        if session.finishing {
            session.restart = false;
        } else if session.running {
            tracing::info!("Stop requested on page {}", session.stats.page);
            session.cancel.cancel();
        }
    }

    /// True from `fetch()` until the run's terminal callback has returned.
    pub fn is_running(&self) -> bool {
        self.inner.session().running
    }

    pub fn stats(&self) -> SyncStats {
        self.inner.session().stats
    }

    pub fn count_req(&self) -> u64 {
        self.stats().requests
    }

    pub fn bytes(&self) -> u64 {
        self.stats().bytes
    }

    pub fn page(&self) -> u32 {
        self.stats().page
    }

    pub fn last_outcome(&self) -> Option<SyncOutcome> {
        self.inner.session().last_outcome
    }
}

async fn run(inner: Arc<Inner>, mut cancel: CancellationToken) {
    loop {
        let termination = loop {
            match next_page(&inner, &cancel).await {
                Step::Continue => continue,
                Step::Done(termination) => break termination,
            }
        };

        let stats = {
            let mut session = inner.session();
            session.finishing = true;
            session.last_outcome = Some(match termination {
                Termination::Completed => SyncOutcome::Completed,
                Termination::Stopped => SyncOutcome::Stopped,
                Termination::Failed(_) => SyncOutcome::Failed,
            });
            session.stats
        };

        notify_terminal(&inner, termination, stats);

        let next = {
            let mut session = inner.session();
            if session.restart {
                Some(session.begin())
            } else {
                session.running = false;
                session.finishing = false;
                None
            }
        };

        match next {
            Some(token) => {
                tracing::info!("Starting sync from {}", inner.config.server_path);
                cancel = token;
            }
            None => return,
        }
    }
}

fn notify_terminal(inner: &Inner, termination: Termination, stats: SyncStats) {
    match termination {
        Termination::Completed => {
            tracing::info!(
                "Sync completed: {} requests, {} bytes",
                stats.requests,
                stats.bytes
            );
            inner.delegate.on_sync_completed();
        }
        Termination::Stopped => {
            tracing::info!("Sync stopped on page {}", stats.page);
            inner.delegate.on_sync_stopped();
        }
        Termination::Failed(error) => {
            tracing::warn!("Sync failed on page {}: {}", stats.page, error);
            inner.delegate.on_sync_failed(error);
        }
    }
}

async fn next_page(inner: &Inner, cancel: &CancellationToken) -> Step {
    let page = {
        let session = inner.session();
        if cancel.is_cancelled() {
            return Step::Done(Termination::Stopped);
        }
        session.stats.page
    };

    let request = match inner.config.page_request(page) {
        Ok(request) => request,
        Err(e) => return Step::Done(Termination::Failed(e)),
    };

    inner.session().stats.requests += 1;

    let result = match inner.fetcher.fetch(&request).await {
        Ok(result) => result,
        Err(e) => return Step::Done(Termination::Failed(e)),
    };

    inner.session().stats.bytes += result.len() as u64;

    if cancel.is_cancelled() {
        tracing::debug!("Discarding page {} after stop", page);
        return Step::Done(Termination::Stopped);
    }

    let dictionary = match result.dictionary_from_xml() {
        Ok(dictionary) => dictionary,
        Err(e) => return Step::Done(Termination::Failed(e)),
    };

    let posts = inner
        .normalizer
        .normalize(&inner.config.server_path, &dictionary);

    if posts.is_empty() {
        tracing::debug!("Page {} is empty, end of data", page);
        return Step::Done(Termination::Completed);
    }

    tracing::info!("Page {}: {} posts", page, posts.len());
    for post in posts {
        inner.delegate.on_post_fetched(post);
    }

    inner.session().stats.page += 1;
    Step::Continue
}

#[cfg(test)]
mod tests;
