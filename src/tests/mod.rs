
use std::sync::Arc;
use std::time::{Duration, Instant};

use reqwest::Method;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::detector::calibration::FixedPathSource;
use crate::detector::response::{build_client, fetch_outcome, ProbeError, RequestSettings};
use crate::detector::{DirOptions, DirPlugin};
use crate::plugin::ScanPlugin;
use crate::progress::{Finding, MessageLevel, Progress, ProgressEvent};
use crate::runner::{normalize_target, Options, Runner, ScanError, WordlistSource};
use crate::scheduler::{ScanState, Scheduler};
use crate::utils::IntSet;

use server::{closed_port_url, Reply, TestServer};

const SEGMENT: &str = "calibration-segment";

fn options_for(url: &str) -> Options {
    Options {
        targets: vec![url.to_string()],
        threads: 4,
        timeout: Duration::from_secs(2),
        retry_attempts: 0,
        ..Options::default()
    }
}

fn plugin_with(options: &Options, dir: DirOptions) -> DirPlugin {
    let target = normalize_target(&options.targets[0]).unwrap();
    let client = build_client(options).unwrap();
    DirPlugin::new(options, dir, target, client)
        .unwrap()
        .with_path_source(FixedPathSource::new([SEGMENT]))
}

fn plugin_for(url: &str, dir: DirOptions) -> DirPlugin {
    plugin_with(&options_for(url), dir)
}

fn drain(rx: &mut mpsc::Receiver<ProgressEvent>) -> Vec<ProgressEvent> {
    let mut out = Vec::new();
    while let Ok(event) = rx.try_recv() {
        out.push(event);
    }
    out
}

fn findings(events: &[ProgressEvent]) -> Vec<Finding> {
    let mut out: Vec<Finding> = events
        .iter()
        .filter_map(|e| match e {
            ProgressEvent::Result(f) => Some(f.clone()),
            _ => None,
        })
        .collect();
    out.sort_by(|a, b| a.entity.cmp(&b.entity));
    out
}

fn site(path: &str) -> Reply {
    match path {
        "/" => Reply::ok("home"),
        "/admin" => Reply::redirect("/admin/", ""),
        "/login.php" => Reply::ok("login form"),
        "/backup" => Reply::ok("b"),
        "/backup.bak" => Reply::ok("old backup"),
        "/.backup.swp" => Reply::ok("swap"),
        "/index.php" => Reply::ok("index"),
        "/index.php.bak" => Reply::ok("index backup"),
        _ => Reply::not_found(),
    }
}

fn words(items: &[&str]) -> Vec<String> {
    items.iter().map(|w| w.to_string()).collect()
}

#[tokio::test]
async fn scan_reports_only_existing_paths() {
    let server = TestServer::start(site).await;
    let dir = DirOptions {
        extensions: vec!["php".to_string()],
        ..DirOptions::default()
    };
    let plugin = plugin_for(&server.url(), dir);
    let (progress, mut rx) = Progress::channel(1024);
    let progress = Arc::new(progress);
    let scheduler = Scheduler::new(4, None);

    let state = scheduler
        .run(
            plugin,
            words(&["admin", "login", "backup", "missing"]),
            progress.clone(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
    assert_eq!(state, ScanState::Completed);

    let found = findings(&drain(&mut rx));
    let entities: Vec<_> = found.iter().map(|f| f.entity.as_str()).collect();
    assert_eq!(entities, vec!["/admin", "/backup", "/login.php"]);

    let admin = &found[0];
    assert_eq!(admin.status, Some(301));
    assert_eq!(admin.redirect.as_deref(), Some("/admin/"));
    assert_eq!(found[2].length, Some("login form".len() as u64));

    // liveness + calibration of both forms + 4 words * 2 candidates
    assert_eq!(progress.requests_issued(), 1 + 2 + 8);
    assert!(server.paths().contains(&format!("/{SEGMENT}.php")));
    assert_eq!(progress.words_done(), 4);
}

#[tokio::test]
async fn wildcard_target_is_never_scanned() {
    let server = TestServer::start(|_| Reply::ok("same")).await;
    let plugin = plugin_for(&server.url(), DirOptions::default());
    let (progress, _rx) = Progress::channel(64);
    let scheduler = Scheduler::new(2, None);

    let err = scheduler
        .run(
            plugin,
            words(&["admin", "login"]),
            Arc::new(progress),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

    let wildcard = match err {
        ScanError::Wildcard(wildcard) => wildcard,
        other => panic!("expected a wildcard error, got {other:?}"),
    };
    assert_eq!(wildcard.status, 200);
    assert_eq!(wildcard.length, 4);
    assert!(wildcard.url.ends_with(SEGMENT));
    assert_eq!(scheduler.state(), ScanState::Failed);
    assert_eq!(server.paths(), vec!["/".to_string(), format!("/{SEGMENT}")]);
}

#[tokio::test]
async fn autocalibrate_excludes_wildcard_length() {
    let server = TestServer::start(|path| match path {
        "/admin" => Reply::redirect("/admin/", "moved to admin/"),
        _ => Reply::redirect("/", "redirecting..."),
    })
    .await;
    let dir = DirOptions {
        autocalibrate: true,
        ..DirOptions::default()
    };
    let mut plugin = plugin_for(&server.url(), dir);
    let (progress, mut rx) = Progress::channel(64);
    let cancel = CancellationToken::new();

    plugin.pre_run(&cancel, &progress).await.unwrap();
    assert!(plugin.filter().excluded_lengths().contains(14));
    assert!(!plugin.filter().admits(301, 14));

    let calibration_hits = server
        .paths()
        .iter()
        .filter(|p| p.as_str() == format!("/{SEGMENT}"))
        .count();
    assert_eq!(calibration_hits, 3);

    let events = drain(&mut rx);
    assert!(events.iter().any(|e| matches!(
        e,
        ProgressEvent::Message(MessageLevel::Info, text) if text.contains("excluding length 14")
    )));

    assert!(plugin
        .process_word(&cancel, "anyword", &progress)
        .await
        .unwrap()
        .is_empty());
    let found = plugin
        .process_word(&cancel, "admin", &progress)
        .await
        .unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].length, Some(15));
}

#[tokio::test]
async fn force_continues_past_wildcard() {
    let server = TestServer::start(|_| Reply::ok("same")).await;
    let dir = DirOptions {
        force: true,
        ..DirOptions::default()
    };
    let mut plugin = plugin_for(&server.url(), dir);
    let (progress, mut rx) = Progress::channel(64);
    let cancel = CancellationToken::new();

    plugin.pre_run(&cancel, &progress).await.unwrap();
    assert!(plugin.filter().excluded_lengths().is_empty());
    assert!(drain(&mut rx)
        .iter()
        .any(|e| matches!(e, ProgressEvent::Message(MessageLevel::Warn, _))));

    let found = plugin.process_word(&cancel, "x", &progress).await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].entity, "/x");
}

#[tokio::test]
async fn unreachable_target_fails_unless_forced() {
    let url = closed_port_url().await;
    let cancel = CancellationToken::new();

    let mut plugin = plugin_for(&url, DirOptions::default());
    let (progress, _rx) = Progress::channel(64);
    let err = plugin.pre_run(&cancel, &progress).await.unwrap_err();
    assert!(matches!(err, ScanError::Unreachable { .. }), "{err:?}");
    assert!(err.is_fatal());

    let forced = DirOptions {
        force: true,
        ..DirOptions::default()
    };
    let mut plugin = plugin_for(&url, forced);
    let (progress, mut rx) = Progress::channel(64);
    plugin.pre_run(&cancel, &progress).await.unwrap();
    drain(&mut rx);

    // a failing candidate is reported as an event, the word itself succeeds
    let found = plugin
        .process_word(&cancel, "admin", &progress)
        .await
        .unwrap();
    assert!(found.is_empty());
    let errors: Vec<_> = drain(&mut rx)
        .into_iter()
        .filter_map(|e| match e {
            ProgressEvent::Error(err) => Some(err),
            _ => None,
        })
        .collect();
    assert_eq!(errors.len(), 1);
    assert!(!errors[0].is_fatal());
}

#[tokio::test]
async fn failed_candidate_keeps_the_other_findings() {
    let server = TestServer::start(|path| match path {
        "/admin" => Reply::ok("admin"),
        "/admin.php" => Reply::hang_up(),
        "/admin.txt" => Reply::ok("notes"),
        "/backup" => Reply::ok("b"),
        "/backup~" => Reply::hang_up(),
        "/backup.bak" => Reply::ok("old backup"),
        _ => Reply::not_found(),
    })
    .await;
    let dir = DirOptions {
        extensions: vec!["php".to_string(), "txt".to_string()],
        discover_backup: true,
        ..DirOptions::default()
    };
    let mut plugin = plugin_for(&server.url(), dir);
    let (progress, mut rx) = Progress::channel(64);
    let cancel = CancellationToken::new();
    plugin.pre_run(&cancel, &progress).await.unwrap();
    drain(&mut rx);

    let found = plugin
        .process_word(&cancel, "admin", &progress)
        .await
        .unwrap();
    let entities: Vec<_> = found.iter().map(|f| f.entity.as_str()).collect();
    assert_eq!(entities, vec!["/admin", "/admin.txt"]);

    let found = plugin
        .process_word(&cancel, "backup", &progress)
        .await
        .unwrap();
    let entities: Vec<_> = found.iter().map(|f| f.entity.as_str()).collect();
    assert_eq!(entities, vec!["/backup", "/backup.bak"]);

    let errors = drain(&mut rx)
        .iter()
        .filter(|e| matches!(e, ProgressEvent::Error(err) if !err.is_fatal()))
        .count();
    assert_eq!(errors, 2);
}

#[tokio::test]
async fn wildcard_on_extension_form_is_detected() {
    let route = |path: &str| {
        if path == "/index.php" {
            Reply::ok("real index page")
        } else if path.ends_with(".php") {
            Reply::ok("front controller")
        } else {
            Reply::not_found()
        }
    };
    let server = TestServer::start(route).await;
    let dir = DirOptions {
        extensions: vec!["php".to_string()],
        ..DirOptions::default()
    };
    let (progress, _rx) = Progress::channel(64);
    let cancel = CancellationToken::new();

    let mut plugin = plugin_for(&server.url(), dir.clone());
    let err = plugin.pre_run(&cancel, &progress).await.unwrap_err();
    let wildcard = match err {
        ScanError::Wildcard(wildcard) => wildcard,
        other => panic!("expected a wildcard error, got {other:?}"),
    };
    assert!(wildcard.url.ends_with(&format!("{SEGMENT}.php")));
    assert_eq!(wildcard.length, "front controller".len() as u64);

    let calibrated = DirOptions {
        autocalibrate: true,
        ..dir
    };
    let mut plugin = plugin_for(&server.url(), calibrated);
    plugin.pre_run(&cancel, &progress).await.unwrap();
    assert!(plugin
        .filter()
        .excluded_lengths()
        .contains("front controller".len() as u64));

    assert!(plugin
        .process_word(&cancel, "definitely-not-here", &progress)
        .await
        .unwrap()
        .is_empty());
    let found = plugin
        .process_word(&cancel, "index", &progress)
        .await
        .unwrap();
    let entities: Vec<_> = found.iter().map(|f| f.entity.as_str()).collect();
    assert_eq!(entities, vec!["/index.php"]);
}

fn slow_site(path: &str) -> Reply {
    match path {
        "/slow" => Reply::stall(Duration::from_secs(10)),
        other => site(other),
    }
}

fn cancel_after(cancel: &CancellationToken, after: Duration) {
    let cancel = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(after).await;
        cancel.cancel();
    });
}

#[tokio::test]
async fn cancellation_aborts_an_in_flight_request() {
    let server = TestServer::start(slow_site).await;
    let options = Options {
        timeout: Duration::from_secs(30),
        ..options_for(&server.url())
    };
    let client = build_client(&options).unwrap();
    let settings = RequestSettings::from_options(&options);
    let url = normalize_target(&server.url()).unwrap().join("slow").unwrap();
    let cancel = CancellationToken::new();
    cancel_after(&cancel, Duration::from_millis(100));

    let started = Instant::now();
    let outcome = fetch_outcome(&client, &settings, &url, &cancel).await;
    assert!(matches!(outcome, Err(ProbeError::Cancelled)), "{outcome:?}");
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(server.paths(), vec!["/slow".to_string()]);
}

#[tokio::test]
async fn cancelled_scan_stops_while_a_request_stalls() {
    let server = TestServer::start(slow_site).await;
    let options = Options {
        timeout: Duration::from_secs(30),
        ..options_for(&server.url())
    };
    let plugin = plugin_with(&options, DirOptions::default());
    let (progress, _rx) = Progress::channel(64);
    let progress = Arc::new(progress);
    let scheduler = Scheduler::new(1, None);
    let cancel = CancellationToken::new();
    cancel_after(&cancel, Duration::from_millis(300));

    let started = Instant::now();
    let state = scheduler
        .run(
            plugin,
            words(&["slow", "admin"]),
            progress.clone(),
            &cancel,
        )
        .await
        .unwrap();
    assert_eq!(state, ScanState::Cancelled);
    assert!(started.elapsed() < Duration::from_secs(3));
    assert_eq!(progress.words_done(), 0);
    assert!(!server.paths().contains(&"/admin".to_string()));
}

#[tokio::test]
async fn backups_are_only_requested_after_a_hit() {
    let server = TestServer::start(site).await;
    let dir = DirOptions {
        discover_backup: true,
        ..DirOptions::default()
    };
    let mut plugin = plugin_for(&server.url(), dir);
    let (progress, _rx) = Progress::channel(64);
    let cancel = CancellationToken::new();
    plugin.pre_run(&cancel, &progress).await.unwrap();

    let found = plugin
        .process_word(&cancel, "backup", &progress)
        .await
        .unwrap();
    let entities: Vec<_> = found.iter().map(|f| f.entity.as_str()).collect();
    assert_eq!(entities, vec!["/backup", "/backup.bak", "/.backup.swp"]);

    assert!(plugin
        .process_word(&cancel, "missing", &progress)
        .await
        .unwrap()
        .is_empty());
    assert!(!server.paths().iter().any(|p| p.starts_with("/missing")
        && p.as_str() != "/missing"));

    // words that already carry an extension get no backup candidates
    let found = plugin
        .process_word(&cancel, "index.php", &progress)
        .await
        .unwrap();
    assert_eq!(found.len(), 1);
    assert!(!server.paths().contains(&"/index.php.bak".to_string()));
}

#[tokio::test]
async fn excluded_length_overrides_allowed_status() {
    let server = TestServer::start(|path| match path {
        "/a" => Reply::ok("abcd"),
        "/b" => Reply::ok("abcde"),
        "/c" => Reply::status(500, "oops"),
        _ => Reply::not_found(),
    })
    .await;
    let dir = DirOptions {
        status_codes: IntSet::parse("200").unwrap(),
        status_codes_blacklist: IntSet::new(),
        exclude_length: IntSet::parse("4").unwrap(),
        ..DirOptions::default()
    };
    let mut plugin = plugin_for(&server.url(), dir);
    let (progress, _rx) = Progress::channel(64);
    let cancel = CancellationToken::new();
    plugin.pre_run(&cancel, &progress).await.unwrap();

    let mut found = Vec::new();
    for word in ["a", "b", "c"] {
        found.extend(plugin.process_word(&cancel, word, &progress).await.unwrap());
    }
    let entities: Vec<_> = found.iter().map(|f| f.entity.as_str()).collect();
    assert_eq!(entities, vec!["/b"]);
}

#[tokio::test]
async fn add_slash_and_expanded_output() {
    let server = TestServer::start(|path| match path {
        "/admin/" => Reply::status(403, "forbidden"),
        _ => Reply::not_found(),
    })
    .await;
    let dir = DirOptions {
        add_slash: true,
        expanded: true,
        ..DirOptions::default()
    };
    let mut plugin = plugin_for(&server.url(), dir);
    assert_eq!(plugin.requests_per_word(), 2);
    let (progress, _rx) = Progress::channel(64);
    let cancel = CancellationToken::new();
    plugin.pre_run(&cancel, &progress).await.unwrap();
    assert!(server.paths().contains(&format!("/{SEGMENT}/")));

    let found = plugin
        .process_word(&cancel, "admin", &progress)
        .await
        .unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].entity, format!("{}admin/", server.url()));
    assert_eq!(found[0].status, Some(403));
}

#[tokio::test]
async fn request_options_reach_the_server() {
    let server = TestServer::start(site).await;
    let options = Options {
        headers: vec![("X-Test".to_string(), "1".to_string())],
        cookies: Some("session=abc".to_string()),
        username: Some("admin".to_string()),
        password: Some("pw".to_string()),
        method: Method::HEAD,
        ..options_for(&server.url())
    };
    let plugin = plugin_with(&options, DirOptions::default());
    let (progress, _rx) = Progress::channel(64);

    let found = plugin
        .process_word(&CancellationToken::new(), "login.php", &progress)
        .await
        .unwrap();
    assert_eq!(found.len(), 1);
    // HEAD responses are measured by their Content-Length
    assert_eq!(found[0].length, Some("login form".len() as u64));

    let hit = server.hits().pop().unwrap();
    let head = hit.head.to_ascii_lowercase();
    assert_eq!(hit.method, "HEAD");
    assert!(head.contains("x-test: 1"));
    assert!(head.contains("cookie: session=abc"));
    assert!(head.contains("authorization: basic ywrtaw46chc="));
    assert!(head.contains("user-agent: dirbust/"));
}

#[tokio::test]
async fn runner_continues_across_targets() {
    let first = TestServer::start(site).await;
    let second = TestServer::start(site).await;
    let dead = closed_port_url().await;
    let options = Options {
        targets: vec![first.url(), dead.clone(), second.url()],
        wordlist: WordlistSource::Inline(words(&["admin", "nothing"])),
        ..options_for(&first.url())
    };
    let runner = Runner::new(options, DirOptions::default()).unwrap();
    assert!(runner.dir_options().expanded);

    let (tx, mut rx) = mpsc::channel(1024);
    let summary = runner.run(tx, &CancellationToken::new()).await.unwrap();
    assert_eq!(summary.reports.len(), 3);
    assert_eq!(summary.failures(), 1);
    assert!(!summary.cancelled());
    assert!(matches!(
        summary.reports[1].outcome,
        Err(ScanError::Unreachable { .. })
    ));

    let events = drain(&mut rx);
    let started = events
        .iter()
        .filter(|e| matches!(e, ProgressEvent::Started { words: 2, .. }))
        .count();
    assert_eq!(started, 3);

    let entities: Vec<_> = findings(&events).into_iter().map(|f| f.entity).collect();
    let mut expected = vec![format!("{}admin", first.url()), format!("{}admin", second.url())];
    expected.sort();
    assert_eq!(entities, expected);
}

#[tokio::test]
async fn runner_returns_single_target_errors() {
    let server = TestServer::start(|_| Reply::ok("same")).await;
    let options = Options {
        wordlist: WordlistSource::Inline(words(&["admin"])),
        ..options_for(&server.url())
    };
    let runner = Runner::new(options, DirOptions::default()).unwrap();
    let (tx, _rx) = mpsc::channel(64);

    let err = runner
        .run(tx, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, ScanError::Wildcard(_)), "{err:?}");
}

#[tokio::test]
async fn cancelled_run_stops_early() {
    let server = TestServer::start(site).await;
    let options = Options {
        wordlist: WordlistSource::Inline(words(&["admin"])),
        ..options_for(&server.url())
    };
    let runner = Runner::new(options, DirOptions::default()).unwrap();
    let (tx, _rx) = mpsc::channel(64);
    let cancel = CancellationToken::new();
    cancel.cancel();

    let summary = runner.run(tx, &cancel).await.unwrap();
    assert!(summary.reports.is_empty());
    assert!(server.hits().is_empty());
}
