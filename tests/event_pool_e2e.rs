use std::fs::OpenOptions;
use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};

use nodeharness::{
    Event, ListenerConfig, NotificationEngine, PoolConfig, RejectReason, RequestPool, Tailer, TailerConfig,
};

fn ev(pattern: &str) -> Event {
    Event::new(pattern).unwrap()
}

fn wait_for_pending(pool: &RequestPool, n: usize) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while pool.len() < n {
        assert!(Instant::now() < deadline, "requests never reached the pool");
        thread::sleep(Duration::from_millis(2));
    }
}

#[test]
fn log_file_line_resolves_listener_through_tailer() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out.log");
    std::fs::write(&path, "booting\n").unwrap();

    let engine = Arc::new(NotificationEngine::default());
    let future = engine.listen_for_event(Event::rpc_server_started(), Duration::from_secs(20));
    wait_for_pending(engine.pool(), 1);

    let cfg = TailerConfig {
        poll_interval: Duration::from_millis(10),
        ..TailerConfig::default()
    };
    let mut tailer = Tailer::start(&path, engine.clone(), cfg).unwrap();

    let written = Instant::now();
    let mut file = OpenOptions::new().append(true).open(&path).unwrap();
    writeln!(file, "12:00:01 INFO rpc-server - (UNDERTOW) started on 8545").unwrap();

    let result = future.get_timeout(Duration::from_secs(5)).expect("listener never resolved");
    assert!(result.is_observed(), "{result}");
    assert!(result.observed_at().unwrap() >= written);

    tailer.stop();
    let stats = engine.stats();
    assert_eq!(stats.lines, 2);
    assert_eq!(stats.resolved, 1);
}

#[test]
fn listeners_for_the_same_event_share_one_timestamp() {
    let engine = NotificationEngine::default();
    let futures: Vec<_> = (0..4)
        .map(|_| engine.listen_for_event(ev("Block sealed"), Duration::from_secs(20)))
        .collect();
    wait_for_pending(engine.pool(), 4);
    let other = engine.listen_for_event(ev("sealed"), Duration::from_millis(300));
    wait_for_pending(engine.pool(), 5);

    engine.pool().process_line("Block sealed #42");

    let stamps: Vec<_> = futures
        .into_iter()
        .map(|f| f.get().observed_at().expect("observed"))
        .collect();
    assert!(stamps.windows(2).all(|w| w[0] == w[1]));

    // "sealed" was also in the line, but only one event is acted on per line.
    assert_eq!(other.get().reject_reason(), Some(RejectReason::WaitTimeout));
}

#[test]
fn full_pool_rejects_after_timeout_and_admits_after_resolution() {
    let pool = Arc::new(RequestPool::with_capacity(1).unwrap());
    let first = pool.submit(ev("alpha"), Duration::ZERO).unwrap();

    let started = Instant::now();
    let err = pool.submit(ev("beta"), Duration::from_millis(100)).unwrap_err();
    assert_eq!(err, RejectReason::PoolFullTimeout);
    assert!(started.elapsed() >= Duration::from_millis(100));

    let waiter = {
        let pool = Arc::clone(&pool);
        thread::spawn(move || pool.submit(ev("beta"), Duration::from_secs(5)))
    };
    thread::sleep(Duration::from_millis(20));
    pool.process_line("alpha");

    let second = waiter.join().unwrap().expect("admitted once capacity freed");
    assert!(first.result().unwrap().is_observed());
    assert!(!second.has_result());
    assert_eq!(pool.len(), 1);
}

#[test]
fn capacity_holds_under_concurrent_submitters() {
    const CAPACITY: usize = 3;
    const SUBMITTERS: usize = 12;

    let pool = Arc::new(RequestPool::new(PoolConfig { capacity: CAPACITY }));
    let barrier = Arc::new(Barrier::new(SUBMITTERS + 1));
    let done = Arc::new(AtomicBool::new(false));
    let observed = Arc::new(AtomicUsize::new(0));

    let submitters: Vec<_> = (0..SUBMITTERS)
        .map(|i| {
            let pool = Arc::clone(&pool);
            let barrier = Arc::clone(&barrier);
            let observed = Arc::clone(&observed);
            thread::spawn(move || {
                barrier.wait();
                let request = pool
                    .submit(ev(&format!("event-{i}")), Duration::from_secs(10))
                    .expect("admitted");
                let result = pool.await_result(&request, Duration::from_secs(10));
                if result.is_observed() {
                    observed.fetch_add(1, Ordering::SeqCst);
                }
            })
        })
        .collect();

    let feeder = {
        let pool = Arc::clone(&pool);
        let done = Arc::clone(&done);
        thread::spawn(move || {
            let mut max_seen = 0;
            while !done.load(Ordering::SeqCst) {
                max_seen = max_seen.max(pool.len());
                for i in 0..SUBMITTERS {
                    pool.process_line(&format!("tick event-{i} done"));
                }
                thread::sleep(Duration::from_millis(1));
            }
            max_seen
        })
    };

    barrier.wait();
    for handle in submitters {
        handle.join().unwrap();
    }
    done.store(true, Ordering::SeqCst);

    let max_seen = feeder.join().unwrap();
    assert!(max_seen <= CAPACITY);
    assert_eq!(observed.load(Ordering::SeqCst), SUBMITTERS);
    assert!(pool.is_empty());
}

#[test]
fn observation_never_precedes_submission() {
    let engine = NotificationEngine::new(ListenerConfig {
        pool: PoolConfig { capacity: 2 },
        ..ListenerConfig::default()
    });
    let future = engine.listen_for_event(ev("ready"), Duration::from_secs(20));
    wait_for_pending(engine.pool(), 1);
    engine.pool().process_line("node ready");

    let submitted = future.request().submitted_at();
    let result = future.get();
    assert!(result.observed_at().unwrap() >= submitted);
}

#[test]
fn closing_the_pool_interrupts_blocked_submitters_and_waiters() {
    let pool = Arc::new(RequestPool::with_capacity(1).unwrap());
    let pending = pool.submit(ev("a"), Duration::ZERO).unwrap();

    let blocked = {
        let pool = Arc::clone(&pool);
        thread::spawn(move || pool.submit(ev("b"), Duration::from_secs(30)))
    };
    let waiting = {
        let pool = Arc::clone(&pool);
        let pending = Arc::clone(&pending);
        thread::spawn(move || pool.await_result(&pending, Duration::from_secs(30)))
    };
    thread::sleep(Duration::from_millis(50));
    pool.close();

    assert_eq!(blocked.join().unwrap().unwrap_err(), RejectReason::Interrupted);
    assert_eq!(waiting.join().unwrap().reject_reason(), Some(RejectReason::Interrupted));
    assert_eq!(pool.submit(ev("c"), Duration::ZERO).unwrap_err(), RejectReason::Interrupted);
}
