use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, Notify};
use tokio_test::{assert_err, assert_ok};

use super::*;
use crate::domain::Post;
use crate::fetcher::FetchResult;

const SERVER: &str = "https://blog.example.com/wp-xml?feed=posts";

enum Response {
    Page(FetchResult),
    /// Waits for `release` before answering
    Held(FetchResult),
    Fail(SyncError),
}

#[derive(Default)]
struct ScriptedFetcher {
    responses: Mutex<VecDeque<Response>>,
    requests: Mutex<Vec<FetchRequest>>,
    started: Notify,
    release: Notify,
}

impl ScriptedFetcher {
    fn new(responses: Vec<Response>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into()),
            ..Default::default()
        })
    }

    fn requests(&self) -> Vec<FetchRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Fetcher for ScriptedFetcher {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResult> {
        self.requests.lock().unwrap().push(request.clone());
        let response = self.responses.lock().unwrap().pop_front();
        self.started.notify_one();

        match response {
            Some(Response::Page(result)) => Ok(result),
            Some(Response::Held(result)) => {
                self.release.notified().await;
                Ok(result)
            }
            Some(Response::Fail(error)) => Err(error),
            None => Err(SyncError::Other("no more pages scripted".into())),
        }
    }
}

/// Channel delegate that calls `stop()` once it has seen `stop_after` posts.
struct StoppingDelegate {
    events: ChannelDelegate,
    syncer: OnceLock<Syncer>,
    stop_after: usize,
    seen: AtomicUsize,
}

impl SyncDelegate for StoppingDelegate {
    fn on_post_fetched(&self, post: Post) {
        if self.seen.fetch_add(1, Ordering::SeqCst) + 1 == self.stop_after {
            if let Some(syncer) = self.syncer.get() {
                syncer.stop();
            }
        }
        self.events.on_post_fetched(post);
    }

    fn on_sync_completed(&self) {
        self.events.on_sync_completed();
    }

    fn on_sync_stopped(&self) {
        self.events.on_sync_stopped();
    }

    fn on_sync_failed(&self, error: SyncError) {
        self.events.on_sync_failed(error);
    }
}

fn page(first_id: usize, count: usize) -> FetchResult {
    let mut body = String::from("<?xml version=\"1.0\"?><posts>");
    for id in first_id..first_id + count {
        body.push_str(&format!(
            "<post><id>{id}</id><title>Post {id}</title></post>"
        ));
    }
    body.push_str("</posts>");
    FetchResult::new(body.into_bytes(), 200, Some("text/xml".into()))
}

/// Delegate that queues a new run from another thread inside
/// `on_sync_completed`, the first time it is called, and optionally stops
/// right after queueing it.
struct RestartingDelegate {
    events: ChannelDelegate,
    syncer: OnceLock<Syncer>,
    stop_after_queue: bool,
    restarted: AtomicUsize,
    accepted: Mutex<Vec<bool>>,
}

impl RestartingDelegate {
    fn new(stop_after_queue: bool) -> (Arc<Self>, mpsc::UnboundedReceiver<SyncEvent>) {
        let (events, rx) = ChannelDelegate::new();
        let delegate = Arc::new(Self {
            events,
            syncer: OnceLock::new(),
            stop_after_queue,
            restarted: AtomicUsize::new(0),
            accepted: Mutex::new(Vec::new()),
        });
        (delegate, rx)
    }
}

impl SyncDelegate for RestartingDelegate {
    fn on_post_fetched(&self, post: Post) {
        self.events.on_post_fetched(post);
    }

    fn on_sync_completed(&self) {
        self.events.on_sync_completed();
        if self.restarted.fetch_add(1, Ordering::SeqCst) > 0 {
            return;
        }
        if let Some(syncer) = self.syncer.get().cloned() {
            let still_running = syncer.is_running();
            let remote = syncer.clone();
            let accepted = std::thread::spawn(move || remote.fetch())
                .join()
                .unwrap();
            self.accepted.lock().unwrap().extend([still_running, accepted]);
            if self.stop_after_queue {
                syncer.stop();
            }
        }
    }

    fn on_sync_stopped(&self) {
        self.events.on_sync_stopped();
    }

    fn on_sync_failed(&self, error: SyncError) {
        self.events.on_sync_failed(error);
    }
}

fn config() -> SyncConfig {
    let mut config = SyncConfig::new(SERVER);
    config.category_id = "7".into();
    config
}

fn syncer_with(fetcher: Arc<ScriptedFetcher>) -> (Syncer, mpsc::UnboundedReceiver<SyncEvent>) {
    let (delegate, rx) = ChannelDelegate::new();
    (Syncer::new(config(), fetcher, Arc::new(delegate)), rx)
}

/// Drain events until the run's terminal notification.
async fn finish(rx: &mut mpsc::UnboundedReceiver<SyncEvent>) -> (Vec<Post>, SyncEvent) {
    let mut posts = Vec::new();
    loop {
        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("sync run did not finish")
            .expect("event channel closed");
        if event.is_terminal() {
            return (posts, event);
        }
        if let SyncEvent::PostFetched(post) = event {
            posts.push(post);
        }
    }
}

fn titles(posts: &[Post]) -> Vec<String> {
    posts.iter().map(|p| p.display_title().to_string()).collect()
}

#[test]
fn test_page_request_appends_category_and_page() {
    let request = assert_ok!(config().page_request(3));
    assert_eq!(
        request.url.as_str(),
        "https://blog.example.com/wp-xml?feed=posts&category=7&paged=3"
    );
    assert_eq!(request.username, None);
}

#[test]
fn test_page_request_without_category() {
    let config = SyncConfig::new("https://blog.example.com/wp-xml");
    let request = assert_ok!(config.page_request(1));
    assert_eq!(request.url.as_str(), "https://blog.example.com/wp-xml?paged=1");
}

#[test]
fn test_page_request_uses_configured_names_and_credentials() {
    let mut config = config();
    config.category_param = "cat".into();
    config.page_param = "page".into();
    config.username = Some("editor".into());
    config.password = Some("secret".into());

    let request = assert_ok!(config.page_request(2));
    assert_eq!(request.url.query(), Some("feed=posts&cat=7&page=2"));
    assert_eq!(request.username.as_deref(), Some("editor"));
    assert_eq!(request.password.as_deref(), Some("secret"));
}

#[test]
fn test_page_request_rejects_malformed_path() {
    let config = SyncConfig::new("blog.example.com/no-scheme");
    assert!(matches!(
        assert_err!(config.page_request(1)),
        SyncError::InvalidUrl(_)
    ));
}

#[tokio::test]
async fn test_sync_runs_until_empty_page() {
    let pages = [page(1, 5), page(6, 5), page(0, 0)];
    let expected_bytes: u64 = pages.iter().map(|p| p.len() as u64).sum();
    let fetcher = ScriptedFetcher::new(pages.into_iter().map(Response::Page).collect());
    let (syncer, mut rx) = syncer_with(fetcher.clone());

    assert!(syncer.fetch());
    let (posts, terminal) = finish(&mut rx).await;

    assert!(matches!(terminal, SyncEvent::Completed));
    assert_eq!(posts.len(), 10);
    assert_eq!(titles(&posts)[0], "Post 1");
    assert_eq!(titles(&posts)[9], "Post 10");
    assert_eq!(syncer.count_req(), 3);
    assert_eq!(syncer.page(), 3);
    assert_eq!(syncer.bytes(), expected_bytes);
    assert_eq!(syncer.last_outcome(), Some(SyncOutcome::Completed));
    assert!(!syncer.is_running());

    let paged: Vec<String> = fetcher
        .requests()
        .iter()
        .map(|r| r.url.query().unwrap_or_default().to_string())
        .collect();
    assert_eq!(
        paged,
        vec![
            "feed=posts&category=7&paged=1",
            "feed=posts&category=7&paged=2",
            "feed=posts&category=7&paged=3",
        ]
    );
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_stop_before_first_page_completes() {
    let fetcher = ScriptedFetcher::new(vec![
        Response::Held(page(1, 5)),
        Response::Page(page(6, 5)),
    ]);
    let (syncer, mut rx) = syncer_with(fetcher.clone());

    assert!(syncer.fetch());
    fetcher.started.notified().await;
    syncer.stop();
    fetcher.release.notify_one();

    let (posts, terminal) = finish(&mut rx).await;

    assert!(matches!(terminal, SyncEvent::Stopped));
    assert!(posts.is_empty());
    assert_eq!(fetcher.requests().len(), 1);
    assert_eq!(syncer.count_req(), 1);
    assert_eq!(syncer.page(), 1);
    assert_eq!(syncer.last_outcome(), Some(SyncOutcome::Stopped));
}

#[tokio::test]
async fn test_stop_right_after_fetch_issues_no_request() {
    let fetcher = ScriptedFetcher::new(vec![Response::Page(page(1, 5))]);
    let (syncer, mut rx) = syncer_with(fetcher.clone());

    assert!(syncer.fetch());
    syncer.stop();

    let (posts, terminal) = finish(&mut rx).await;

    assert!(matches!(terminal, SyncEvent::Stopped));
    assert!(posts.is_empty());
    assert!(fetcher.requests().is_empty());
    assert_eq!(syncer.count_req(), 0);
}

#[tokio::test]
async fn test_stop_from_callback_finishes_current_page() {
    let fetcher = ScriptedFetcher::new(vec![
        Response::Page(page(1, 5)),
        Response::Page(page(6, 5)),
        Response::Page(page(0, 0)),
    ]);
    let (events, mut rx) = ChannelDelegate::new();
    let delegate = Arc::new(StoppingDelegate {
        events,
        syncer: OnceLock::new(),
        stop_after: 3,
        seen: AtomicUsize::new(0),
    });
    let syncer = Syncer::new(config(), fetcher.clone(), delegate.clone());
    assert!(delegate.syncer.set(syncer.clone()).is_ok());

    assert!(syncer.fetch());
    let (posts, terminal) = finish(&mut rx).await;

    assert!(matches!(terminal, SyncEvent::Stopped));
    assert_eq!(
        titles(&posts),
        vec!["Post 1", "Post 2", "Post 3", "Post 4", "Post 5"]
    );
    assert_eq!(fetcher.requests().len(), 1);
    assert_eq!(syncer.count_req(), 1);
}

#[tokio::test]
async fn test_transport_error_fails_run() {
    let first = page(1, 5);
    let first_len = first.len() as u64;
    let fetcher = ScriptedFetcher::new(vec![
        Response::Page(first),
        Response::Fail(SyncError::Other("connection reset".into())),
        Response::Page(page(6, 5)),
    ]);
    let (syncer, mut rx) = syncer_with(fetcher.clone());

    assert!(syncer.fetch());
    let (posts, terminal) = finish(&mut rx).await;

    match terminal {
        SyncEvent::Failed(SyncError::Other(message)) => assert_eq!(message, "connection reset"),
        other => panic!("expected failure, got {:?}", other),
    }
    assert_eq!(posts.len(), 5);
    // The failed attempt counts as a request but contributes no bytes.
    assert_eq!(syncer.count_req(), 2);
    assert_eq!(syncer.bytes(), first_len);
    assert_eq!(syncer.page(), 2);
    assert_eq!(fetcher.requests().len(), 2);
    assert_eq!(syncer.last_outcome(), Some(SyncOutcome::Failed));
}

#[tokio::test]
async fn test_parse_error_fails_run_like_transport_error() {
    let broken = FetchResult::new(b"<posts><post><id>1</id>".to_vec(), 200, None);
    let fetcher = ScriptedFetcher::new(vec![
        Response::Page(broken),
        Response::Page(page(1, 5)),
    ]);
    let (syncer, mut rx) = syncer_with(fetcher.clone());

    assert!(syncer.fetch());
    let (posts, terminal) = finish(&mut rx).await;

    assert!(matches!(terminal, SyncEvent::Failed(SyncError::Parse(_))));
    assert!(posts.is_empty());
    assert_eq!(fetcher.requests().len(), 1);
    assert_eq!(syncer.count_req(), 1);
    assert_eq!(syncer.page(), 1);
}

#[tokio::test]
async fn test_fetch_while_running_is_noop() {
    let fetcher = ScriptedFetcher::new(vec![
        Response::Held(page(1, 2)),
        Response::Page(page(0, 0)),
        Response::Page(page(0, 0)),
    ]);
    let (syncer, mut rx) = syncer_with(fetcher.clone());

    assert!(syncer.fetch());
    fetcher.started.notified().await;

    assert!(syncer.is_running());
    assert!(!syncer.fetch());
    assert_eq!(syncer.count_req(), 1);

    fetcher.release.notify_one();
    let (posts, terminal) = finish(&mut rx).await;

    assert!(matches!(terminal, SyncEvent::Completed));
    assert_eq!(posts.len(), 2);
    assert_eq!(fetcher.requests().len(), 2);
    assert_eq!(syncer.count_req(), 2);
}

#[tokio::test]
async fn test_new_run_resets_counters() {
    let fetcher = ScriptedFetcher::new(vec![
        Response::Page(page(1, 3)),
        Response::Page(page(0, 0)),
        Response::Page(page(0, 0)),
    ]);
    let (syncer, mut rx) = syncer_with(fetcher.clone());

    assert!(syncer.fetch());
    finish(&mut rx).await;
    assert_eq!(syncer.count_req(), 2);
    assert_eq!(syncer.page(), 2);

    assert!(syncer.fetch());
    let (posts, terminal) = finish(&mut rx).await;

    assert!(matches!(terminal, SyncEvent::Completed));
    assert!(posts.is_empty());
    assert_eq!(syncer.count_req(), 1);
    assert_eq!(syncer.page(), 1);

    let last = fetcher.requests().pop().unwrap();
    assert_eq!(last.url.query(), Some("feed=posts&category=7&paged=1"));
}

#[tokio::test]
async fn test_stop_when_idle_has_no_effect() {
    let fetcher = ScriptedFetcher::new(vec![Response::Page(page(0, 0))]);
    let (syncer, mut rx) = syncer_with(fetcher);

    syncer.stop();
    assert!(syncer.fetch());
    let (_, terminal) = finish(&mut rx).await;

    assert!(matches!(terminal, SyncEvent::Completed));
    assert_eq!(syncer.last_outcome(), Some(SyncOutcome::Completed));
}

#[tokio::test]
async fn test_latin1_page_is_decoded() {
    let mut body =
        b"<?xml version=\"1.0\" encoding=\"ISO-8859-1\"?><posts><post><id>1</id><title>Caf".to_vec();
    body.push(0xE9);
    body.extend_from_slice(b"</title></post></posts>");
    let latin1 = FetchResult::new(body, 200, Some("text/xml; charset=ISO-8859-1".into()));
    let fetcher = ScriptedFetcher::new(vec![
        Response::Page(latin1),
        Response::Page(page(0, 0)),
    ]);
    let (syncer, mut rx) = syncer_with(fetcher);

    assert!(syncer.fetch());
    let (posts, terminal) = finish(&mut rx).await;

    assert!(matches!(terminal, SyncEvent::Completed));
    assert_eq!(titles(&posts), vec!["Café"]);
    assert_eq!(syncer.count_req(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_stop_from_another_thread() {
    let fetcher = ScriptedFetcher::new(vec![
        Response::Held(page(1, 5)),
        Response::Page(page(6, 5)),
        Response::Page(page(0, 0)),
    ]);
    let (syncer, mut rx) = syncer_with(fetcher.clone());

    assert!(syncer.fetch());
    fetcher.started.notified().await;

    let remote = syncer.clone();
    std::thread::spawn(move || remote.stop()).join().unwrap();
    fetcher.release.notify_one();

    let (posts, terminal) = finish(&mut rx).await;

    assert!(matches!(terminal, SyncEvent::Stopped));
    assert!(posts.is_empty());
    assert_eq!(syncer.count_req(), 1);
    assert_eq!(fetcher.requests().len(), 1);
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_fetch_during_terminal_callback_starts_after_it() {
    let fetcher = ScriptedFetcher::new(vec![
        Response::Page(page(1, 2)),
        Response::Page(page(0, 0)),
        Response::Page(page(3, 1)),
        Response::Page(page(0, 0)),
    ]);
    let (delegate, mut rx) = RestartingDelegate::new(false);
    let syncer = Syncer::new(config(), fetcher.clone(), delegate.clone());
    assert!(delegate.syncer.set(syncer.clone()).is_ok());

    assert!(syncer.fetch());
    let (first, terminal) = finish(&mut rx).await;
    assert!(matches!(terminal, SyncEvent::Completed));
    assert_eq!(titles(&first), vec!["Post 1", "Post 2"]);

    let (second, terminal) = finish(&mut rx).await;
    assert!(matches!(terminal, SyncEvent::Completed));
    assert_eq!(titles(&second), vec!["Post 3"]);

    // Still running inside the callback, and the queued fetch was accepted.
    assert_eq!(*delegate.accepted.lock().unwrap(), vec![true, true]);
    assert_eq!(syncer.count_req(), 2);
    assert_eq!(syncer.page(), 2);
    assert_eq!(fetcher.requests().len(), 4);
    assert!(!syncer.is_running());
}

#[tokio::test]
async fn test_stop_during_terminal_callback_drops_queued_run() {
    let fetcher = ScriptedFetcher::new(vec![
        Response::Page(page(0, 0)),
        Response::Page(page(1, 5)),
    ]);
    let (delegate, mut rx) = RestartingDelegate::new(true);
    let syncer = Syncer::new(config(), fetcher.clone(), delegate.clone());
    assert!(delegate.syncer.set(syncer.clone()).is_ok());

    assert!(syncer.fetch());
    let (_, terminal) = finish(&mut rx).await;
    assert!(matches!(terminal, SyncEvent::Completed));

    tokio::task::yield_now().await;
    assert!(rx.try_recv().is_err());
    assert!(!syncer.is_running());
    assert_eq!(fetcher.requests().len(), 1);
}
