// Tests for dynamic call observation

use apiward_scanner::{
    Direction, NetworkEvent, ObservedCall, ObserverConfig, PageObserver, ResourceKind, ScanError,
    Settle, observe_pages, observe_with_browser, resolve, wait_for_network_idle,
};
use futures::{Stream, StreamExt, stream};
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{method, path},
};

/// Replays canned calls per page and records the order pages were visited in.
#[derive(Default)]
struct ScriptedObserver {
    pages: HashMap<String, Result<Vec<ObservedCall>, String>>,
    visited: Vec<String>,
}

impl ScriptedObserver {
    fn page(mut self, url: &str, calls: Vec<ObservedCall>) -> Self {
        self.pages.insert(url.to_string(), Ok(calls));
        self
    }

    fn failing(mut self, url: &str, reason: &str) -> Self {
        self.pages.insert(url.to_string(), Err(reason.to_string()));
        self
    }
}

impl PageObserver for ScriptedObserver {
    async fn observe_page(&mut self, url: &str) -> apiward_scanner::error::Result<Vec<ObservedCall>> {
        self.visited.push(url.to_string());
        match self.pages.get(url) {
            Some(Ok(calls)) => Ok(calls.clone()),
            Some(Err(reason)) => Err(ScanError::BrowserError(reason.clone())),
            None => Ok(Vec::new()),
        }
    }
}

fn call(origin: &str, direction: Direction, kind: ResourceKind, url: &str) -> ObservedCall {
    ObservedCall::new(origin, direction, kind, url)
}

#[tokio::test]
async fn test_observed_calls_are_grouped_per_page() {
    let home = "https://example.com";
    let mut observer = ScriptedObserver::default().page(
        home,
        vec![
            call(home, Direction::Request, ResourceKind::Fetch, "https://example.com/api/me"),
            call(home, Direction::Response, ResourceKind::Fetch, "https://example.com/api/me"),
            call(home, Direction::Request, ResourceKind::Xhr, "https://example.com/api/feed"),
        ],
    );

    let calls = observe_pages(&mut observer, &[home.to_string()]).await;

    let page = &calls[home];
    assert_eq!(page.requests.len(), 2);
    assert_eq!(page.responses.len(), 1);
    assert!(page.responses.contains("https://example.com/api/me"));
}

#[tokio::test]
async fn test_non_data_calls_are_discarded() {
    let home = "https://example.com";
    let mut observer = ScriptedObserver::default().page(
        home,
        vec![
            call(home, Direction::Response, ResourceKind::Other, "https://example.com/logo.png"),
            call(home, Direction::Response, ResourceKind::Xhr, "https://example.com/api/data"),
        ],
    );

    let calls = observe_pages(&mut observer, &[home.to_string()]).await;

    assert_eq!(calls[home].responses.len(), 1);
    assert!(calls[home].responses.contains("https://example.com/api/data"));
}

#[tokio::test]
async fn test_failing_page_does_not_abort_batch() {
    let pages = vec![
        "https://example.com/a".to_string(),
        "https://example.com/broken".to_string(),
        "https://example.com/b".to_string(),
    ];
    let mut observer = ScriptedObserver::default()
        .page(
            &pages[0],
            vec![call(&pages[0], Direction::Response, ResourceKind::Fetch, "https://example.com/api/a")],
        )
        .failing(&pages[1], "navigation timed out")
        .page(
            &pages[2],
            vec![call(&pages[2], Direction::Response, ResourceKind::Fetch, "https://example.com/api/b")],
        );

    let calls = observe_pages(&mut observer, &pages).await;

    assert_eq!(observer.visited, pages);
    assert_eq!(calls.len(), 2);
    assert!(!calls.contains_key("https://example.com/broken"));
}

#[tokio::test]
async fn test_observation_feeds_resolver() {
    let pages = vec!["https://example.com".to_string(), "https://example.com/x".to_string()];
    let mut observer = ScriptedObserver::default()
        .page(
            &pages[0],
            vec![
                call(&pages[0], Direction::Response, ResourceKind::Fetch, "https://example.com/api/v2"),
                call(&pages[0], Direction::Response, ResourceKind::Fetch, "https://example.com/api/v1"),
            ],
        )
        .page(
            &pages[1],
            vec![call(&pages[1], Direction::Response, ResourceKind::Xhr, "https://example.com/other")],
        );

    let calls = observe_pages(&mut observer, &pages).await;
    let endpoints = resolve(&calls, "https://example.com");

    assert_eq!(endpoints, vec!["https://example.com/api/v2", "https://example.com/other"]);
}

// ============================================================================
// Network-idle settling
// ============================================================================

const PAGE: &str = "https://example.com";
const IDLE: Duration = Duration::from_millis(500);

fn sent(id: &str, kind: ResourceKind, url: &str) -> NetworkEvent {
    NetworkEvent::RequestSent {
        request_id: id.to_string(),
        call: call(PAGE, Direction::Request, kind, url),
    }
}

fn received(kind: ResourceKind, url: &str) -> NetworkEvent {
    NetworkEvent::ResponseReceived {
        call: call(PAGE, Direction::Response, kind, url),
    }
}

fn finished(id: &str) -> NetworkEvent {
    NetworkEvent::Finished {
        request_id: id.to_string(),
    }
}

/// Emit each event after its delay (in ms since the previous one), then stay
/// open without emitting anything, like a listener on a live tab.
fn timed(script: Vec<(u64, NetworkEvent)>) -> impl Stream<Item = NetworkEvent> + Unpin {
    let events = stream::unfold(script.into_iter(), |mut script| async move {
        let (delay, event) = script.next()?;
        tokio::time::sleep(Duration::from_millis(delay)).await;
        Some((event, script))
    });
    Box::pin(events.chain(stream::pending()))
}

#[tokio::test(start_paused = true)]
async fn test_slow_response_is_captured() {
    let api = "https://example.com/api/slow";
    let mut events = timed(vec![
        (100, sent("7", ResourceKind::Xhr, api)),
        (800, received(ResourceKind::Xhr, api)),
        (0, finished("7")),
    ]);

    let start = Instant::now();
    let settle =
        wait_for_network_idle(&mut events, IDLE, start + Duration::from_secs(30)).await;

    let calls = match settle {
        Settle::Idle(calls) => calls,
        other => panic!("expected the page to settle, got {:?}", other),
    };
    assert!(calls.contains(&call(PAGE, Direction::Response, ResourceKind::Xhr, api)));
    assert_eq!(start.elapsed(), Duration::from_millis(900) + IDLE);
}

#[tokio::test(start_paused = true)]
async fn test_quiet_page_settles_after_idle_window() {
    let api = "https://example.com/api/me";
    let mut events = timed(vec![
        (10, sent("1", ResourceKind::Other, "https://example.com/")),
        (20, sent("2", ResourceKind::Fetch, api)),
        (30, received(ResourceKind::Fetch, api)),
        (0, finished("2")),
        (40, finished("1")),
    ]);

    let start = Instant::now();
    let settle =
        wait_for_network_idle(&mut events, IDLE, start + Duration::from_secs(30)).await;

    assert_eq!(
        settle,
        Settle::Idle(vec![
            call(PAGE, Direction::Request, ResourceKind::Fetch, api),
            call(PAGE, Direction::Response, ResourceKind::Fetch, api),
        ])
    );
    assert_eq!(start.elapsed(), Duration::from_millis(100) + IDLE);
}

#[tokio::test(start_paused = true)]
async fn test_steady_polling_hits_render_timeout() {
    let api = "https://example.com/api/poll";
    let polling = stream::unfold(0u32, move |n| async move {
        let event = if n % 2 == 0 {
            tokio::time::sleep(Duration::from_millis(200)).await;
            sent(&n.to_string(), ResourceKind::Xhr, api)
        } else {
            tokio::time::sleep(Duration::from_millis(50)).await;
            finished(&(n - 1).to_string())
        };
        Some((event, n + 1))
    });
    let mut events = Box::pin(polling);

    let start = Instant::now();
    let settle = wait_for_network_idle(&mut events, IDLE, start + Duration::from_secs(3)).await;

    assert!(matches!(settle, Settle::TimedOut { .. }), "{:?}", settle);
    assert_eq!(start.elapsed(), Duration::from_secs(3));
}

#[tokio::test(start_paused = true)]
async fn test_hanging_request_is_a_timeout_not_idle() {
    let mut events = timed(vec![(50, sent("9", ResourceKind::Fetch, "https://example.com/api/hang"))]);

    let start = Instant::now();
    let settle = wait_for_network_idle(&mut events, IDLE, start + Duration::from_secs(2)).await;

    match settle {
        Settle::TimedOut { calls, in_flight } => {
            assert_eq!(in_flight, 1);
            assert_eq!(calls.len(), 1);
        }
        other => panic!("expected a timeout, got {:?}", other),
    }
}

#[tokio::test]
#[ignore = "needs a local Chromium install"]
async fn test_browser_observes_fetch_calls() {
    let mock_server = MockServer::start().await;

    let page = r#"<html><body><script>
        fetch('/api/items').then(r => r.json());
    </script></body></html>"#;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/html")
                .set_body_string(page),
        )
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/items"))
        .respond_with(ResponseTemplate::new(200).set_body_string("[]"))
        .mount(&mock_server)
        .await;

    let config = ObserverConfig::default()
        .with_render_timeout(Duration::from_secs(20))
        .with_idle_window(Duration::from_millis(250));
    let root = format!("{}/", mock_server.uri());
    let calls = observe_with_browser(&[root.clone()], config).await.unwrap();

    let expected = format!("{}/api/items", mock_server.uri());
    assert!(calls[&root].responses.contains(&expected));
}
