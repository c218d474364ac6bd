// tests/checker_tests.rs
use service_health::health::{
    check_fn, notifier_fn, AtomicStatus, Check, CheckContext, Checker, ParallelMode,
    StaticCheck, Status,
};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, OnceLock};
use tokio::time::{sleep, Duration, Instant};

type Calls = Arc<Mutex<Vec<(Status, Status)>>>;

fn recording_checker(mode: ParallelMode, timeout: Duration) -> (Checker, Calls) {
    let calls: Calls = Arc::new(Mutex::new(Vec::new()));
    let sink = calls.clone();
    let checker = Checker::builder()
        .parallel(mode)
        .timeout(timeout)
        .notifier(Arc::new(notifier_fn(
            move |status, old, _: &BTreeMap<String, Status>| {
                sink.lock().unwrap().push((status, old));
            },
        )))
        .build()
        .unwrap();
    (checker, calls)
}

fn delayed(status: Status, delay: Duration) -> Arc<dyn Check> {
    Arc::new(check_fn(move |_ctx: CheckContext| async move {
        sleep(delay).await;
        status
    }))
}

#[tokio::test]
async fn test_empty_checker_is_healthy() {
    let (checker, calls) = recording_checker(ParallelMode::Auto, Duration::from_secs(1));

    let (status, details) = checker.evaluate(None).await;
    assert_eq!(status, Status::Healthy);
    assert!(details.is_empty());
    assert_eq!(checker.status(), Status::Healthy);
    // initial Unknown differs from the first result
    assert_eq!(*calls.lock().unwrap(), vec![(Status::Healthy, Status::Unknown)]);
}

#[tokio::test]
async fn test_single_check_transition_notifies_once() {
    let (checker, calls) = recording_checker(ParallelMode::Auto, Duration::from_secs(1));
    let state = Arc::new(AtomicStatus::new(Status::Healthy));
    let probe = state.clone();
    checker.register(
        "db",
        Arc::new(check_fn(move |_ctx: CheckContext| {
            let probe = probe.clone();
            async move { probe.load() }
        })),
    );

    assert_eq!(checker.evaluate(None).await.0, Status::Healthy);
    calls.lock().unwrap().clear();

    state.store(Status::Unhealthy);
    let (status, details) = checker.evaluate(None).await;
    assert_eq!(status, Status::Unhealthy);
    assert_eq!(details["db"], Status::Unhealthy);
    assert_eq!(*calls.lock().unwrap(), vec![(Status::Unhealthy, Status::Healthy)]);

    // no change, no notification
    checker.evaluate(None).await;
    assert_eq!(calls.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_parallel_result_is_order_independent() {
    let delays = [
        (Duration::from_millis(50), Duration::from_millis(5)),
        (Duration::from_millis(5), Duration::from_millis(50)),
    ];
    for (healthy_delay, unhealthy_delay) in delays {
        let checker = Checker::builder()
            .parallel(ParallelMode::Always)
            .check("a", delayed(Status::Healthy, healthy_delay))
            .check("b", delayed(Status::Unhealthy, unhealthy_delay))
            .build()
            .unwrap();

        let (status, details) = checker.evaluate(None).await;
        assert_eq!(status, Status::Unhealthy);
        assert_eq!(details.len(), 2);
    }
}

#[tokio::test]
async fn test_healthy_then_unknown_is_unhealthy_in_any_order() {
    let delays = [
        (Duration::from_millis(40), Duration::from_millis(5)),
        (Duration::from_millis(5), Duration::from_millis(40)),
    ];
    for (healthy_delay, unknown_delay) in delays {
        let checker = Checker::builder()
            .parallel(ParallelMode::Always)
            .check("healthy", delayed(Status::Healthy, healthy_delay))
            .check("unknown", delayed(Status::Unknown, unknown_delay))
            .build()
            .unwrap();
        assert_eq!(checker.evaluate(None).await.0, Status::Unhealthy);
    }
}

#[tokio::test]
async fn test_all_unknown_is_unknown() {
    let checker = Checker::builder()
        .parallel(ParallelMode::Never)
        .check("a", Arc::new(StaticCheck(Status::Unknown)))
        .check("b", Arc::new(StaticCheck(Status::Unknown)))
        .build()
        .unwrap();
    assert_eq!(checker.evaluate(None).await.0, Status::Unknown);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_check_ignoring_deadline_counts_as_unknown() {
    let checker = Checker::builder()
        .parallel(ParallelMode::Always)
        .timeout(Duration::from_millis(100))
        .check("fast", Arc::new(StaticCheck(Status::Healthy)))
        .check(
            "stuck",
            Arc::new(check_fn(|_ctx: CheckContext| async {
                // blocks the worker, never yields to the timer
                std::thread::sleep(std::time::Duration::from_millis(1500));
                Status::Healthy
            })),
        )
        .build()
        .unwrap();

    let start = Instant::now();
    let (status, details) = checker.evaluate(None).await;
    assert!(start.elapsed() < Duration::from_secs(1));
    assert_eq!(details["stuck"], Status::Unknown);
    assert_eq!(details["fast"], Status::Healthy);
    assert_eq!(status, Status::Unhealthy);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_single_blocking_check_counts_as_unknown() {
    let checker = Checker::builder()
        .timeout(Duration::from_millis(100))
        .check(
            "stuck",
            Arc::new(check_fn(|_ctx: CheckContext| async {
                std::thread::sleep(std::time::Duration::from_millis(1500));
                Status::Healthy
            })),
        )
        .build()
        .unwrap();

    let start = Instant::now();
    let (status, details) = checker.evaluate(None).await;
    assert!(start.elapsed() < Duration::from_secs(1));
    assert_eq!(details["stuck"], Status::Unknown);
    assert_eq!(status, Status::Unknown);
    assert_eq!(checker.status(), Status::Unknown);
}

#[tokio::test]
async fn test_sequential_slow_check_is_unknown() {
    let checker = Checker::builder()
        .parallel(ParallelMode::Never)
        .timeout(Duration::from_millis(50))
        .check("slow", delayed(Status::Healthy, Duration::from_secs(5)))
        .build()
        .unwrap();

    let start = Instant::now();
    let (status, details) = checker.evaluate(None).await;
    assert!(start.elapsed() < Duration::from_secs(1));
    assert_eq!(status, Status::Unknown);
    assert_eq!(details["slow"], Status::Unknown);
}

#[tokio::test]
async fn test_caller_deadline_is_never_loosened() {
    let checker = Checker::builder()
        .timeout(Duration::from_secs(3))
        .check("slow", delayed(Status::Healthy, Duration::from_secs(1)))
        .build()
        .unwrap();

    let start = Instant::now();
    let deadline = start + Duration::from_millis(50);
    let (status, _) = checker.evaluate(Some(deadline)).await;
    assert!(start.elapsed() < Duration::from_millis(500));
    assert_eq!(status, Status::Unknown);
}

#[tokio::test]
async fn test_deadline_is_passed_to_checks() {
    let seen = Arc::new(Mutex::new(None));
    let sink = seen.clone();
    let checker = Checker::builder()
        .timeout(Duration::from_millis(200))
        .check(
            "ctx",
            Arc::new(check_fn(move |ctx: CheckContext| {
                *sink.lock().unwrap() = Some(ctx.remaining());
                async { Status::Healthy }
            })),
        )
        .build()
        .unwrap();

    checker.evaluate(None).await;
    let remaining = seen.lock().unwrap().unwrap();
    assert!(remaining <= Duration::from_millis(200));
    assert!(remaining > Duration::ZERO);
}

#[tokio::test]
async fn test_reregister_replaces_check() {
    let checker = Checker::new();
    checker.register("db", Arc::new(StaticCheck(Status::Unhealthy)));
    checker.register("db", Arc::new(StaticCheck(Status::Healthy)));

    let (status, details) = checker.evaluate(None).await;
    assert_eq!(status, Status::Healthy);
    assert_eq!(details.len(), 1);

    assert!(checker.unregister("db"));
    let (status, details) = checker.evaluate(None).await;
    assert_eq!(status, Status::Healthy);
    assert!(details.is_empty());
}

#[tokio::test]
async fn test_returned_details_are_a_copy() {
    let checker = Checker::builder()
        .check("db", Arc::new(StaticCheck(Status::Unhealthy)))
        .build()
        .unwrap();

    let (_, mut details) = checker.evaluate(None).await;
    details.insert("db".to_string(), Status::Healthy);
    details.insert("extra".to_string(), Status::Healthy);

    let published = checker.details();
    assert_eq!(published.len(), 1);
    assert_eq!(published["db"], Status::Unhealthy);

    let snapshot = checker.snapshot();
    assert_eq!(snapshot.status, Status::Unhealthy);
    assert!(snapshot.checked_at.is_some());
}

#[tokio::test]
async fn test_notifier_sees_published_status() {
    let handle: Arc<OnceLock<Arc<Checker>>> = Arc::new(OnceLock::new());
    let observed = Arc::new(Mutex::new(Vec::new()));

    let lookup = handle.clone();
    let sink = observed.clone();
    let checker = Arc::new(
        Checker::builder()
            .check("db", Arc::new(StaticCheck(Status::Unhealthy)))
            .notifier(Arc::new(notifier_fn(
                move |status, _old, _: &BTreeMap<String, Status>| {
                    let current = lookup.get().map(|c| c.status());
                    sink.lock().unwrap().push((status, current));
                },
            )))
            .build()
            .unwrap(),
    );
    handle.set(checker.clone()).unwrap();

    checker.evaluate(None).await;
    assert_eq!(
        *observed.lock().unwrap(),
        vec![(Status::Unhealthy, Some(Status::Unhealthy))]
    );
}

#[tokio::test]
async fn test_auto_mode_with_many_checks() {
    let checker = Checker::builder()
        .timeout(Duration::from_secs(1))
        .check("a", delayed(Status::Healthy, Duration::from_millis(100)))
        .check("b", delayed(Status::Healthy, Duration::from_millis(100)))
        .check("c", delayed(Status::Healthy, Duration::from_millis(100)))
        .check("d", delayed(Status::Healthy, Duration::from_millis(100)))
        .build()
        .unwrap();

    let start = Instant::now();
    let (status, details) = checker.evaluate(None).await;
    // fanned out, so well below the sequential 400ms
    assert!(start.elapsed() < Duration::from_millis(350));
    assert_eq!(status, Status::Healthy);
    assert_eq!(details.len(), 4);
}

#[tokio::test]
#[allow(unreachable_code)]
async fn test_panicking_check_is_unhealthy() {
    let checker = Checker::builder()
        .parallel(ParallelMode::Always)
        .check("ok", Arc::new(StaticCheck(Status::Healthy)))
        .check(
            "boom",
            Arc::new(check_fn(|_ctx: CheckContext| async {
                panic!("check exploded");
                Status::Healthy
            })),
        )
        .build()
        .unwrap();

    let (status, details) = checker.evaluate(None).await;
    assert_eq!(details["boom"], Status::Unhealthy);
    assert_eq!(status, Status::Unhealthy);
}

#[tokio::test]
#[allow(unreachable_code)]
async fn test_panicking_check_is_unhealthy_sequentially() {
    let checker = Checker::builder()
        .parallel(ParallelMode::Never)
        .check("ok", Arc::new(StaticCheck(Status::Healthy)))
        .check(
            "boom",
            Arc::new(check_fn(|_ctx: CheckContext| async {
                panic!("check exploded");
                Status::Healthy
            })),
        )
        .build()
        .unwrap();

    let (status, details) = checker.evaluate(None).await;
    assert_eq!(details["ok"], Status::Healthy);
    assert_eq!(details["boom"], Status::Unhealthy);
    assert_eq!(status, Status::Unhealthy);
    assert_eq!(checker.status(), Status::Unhealthy);
}

#[tokio::test]
async fn test_superseded_round_does_not_publish() {
    let calls = Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let counter = calls.clone();
    let checker = Arc::new(
        Checker::builder()
            .check(
                "flaky",
                Arc::new(check_fn(move |_ctx: CheckContext| {
                    let first = counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst) == 0;
                    async move {
                        if first {
                            sleep(Duration::from_millis(300)).await;
                            Status::Unhealthy
                        } else {
                            Status::Healthy
                        }
                    }
                })),
            )
            .build()
            .unwrap(),
    );

    let slow = {
        let checker = checker.clone();
        tokio::spawn(async move { checker.evaluate(None).await })
    };
    sleep(Duration::from_millis(50)).await;

    let (fast, _) = checker.evaluate(None).await;
    assert_eq!(fast, Status::Healthy);

    let (stale, _) = slow.await.unwrap();
    assert_eq!(stale, Status::Unhealthy);
    assert_eq!(checker.status(), Status::Healthy);
    let snapshot = checker.snapshot();
    assert_eq!(snapshot.status, Status::Healthy);
    assert_eq!(snapshot.details["flaky"], Status::Healthy);
}

#[tokio::test]
async fn test_nested_checker() {
    let inner = Checker::builder()
        .check("disk", Arc::new(StaticCheck(Status::Unhealthy)))
        .build()
        .unwrap();
    let outer = Checker::builder()
        .check("inner", Arc::new(inner))
        .check("cpu", Arc::new(StaticCheck(Status::Healthy)))
        .build()
        .unwrap();

    let (status, details) = outer.evaluate(None).await;
    assert_eq!(status, Status::Unhealthy);
    assert_eq!(details["inner"], Status::Unhealthy);
}
