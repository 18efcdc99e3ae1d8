use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use nodeharness::{LineHandler, TailError, Tailer, TailerConfig};

#[derive(Default)]
struct Collector {
    lines: Mutex<Vec<String>>,
    errors: Mutex<Vec<TailError>>,
    missing: AtomicU64,
    rotations: AtomicU64,
}

impl Collector {
    fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap().clone()
    }
}

impl LineHandler for Collector {
    fn on_line(&self, line: &str) {
        self.lines.lock().unwrap().push(line.to_string());
    }

    fn on_file_missing(&self) {
        self.missing.fetch_add(1, Ordering::Relaxed);
    }

    fn on_rotated(&self) {
        self.rotations.fetch_add(1, Ordering::Relaxed);
    }

    fn on_error(&self, err: TailError) {
        self.errors.lock().unwrap().push(err);
    }
}

fn fast() -> TailerConfig {
    TailerConfig {
        poll_interval: Duration::from_millis(10),
        missing_file_retries: 500,
        ..TailerConfig::default()
    }
}

fn eventually(what: &str, mut cond: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if cond() {
            return;
        }
        thread::sleep(Duration::from_millis(10));
    }
    panic!("timed out waiting for {what}");
}

fn append(path: &Path, text: &str) {
    let mut file = OpenOptions::new().append(true).create(true).open(path).unwrap();
    file.write_all(text.as_bytes()).unwrap();
    file.flush().unwrap();
}

#[test]
fn reads_existing_content_then_follows_appends() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out.log");
    fs::write(&path, "first\nsecond\r\n").unwrap();

    let collector = Arc::new(Collector::default());
    let mut tailer = Tailer::start(&path, collector.clone(), fast()).unwrap();
    assert_eq!(tailer.path(), path.as_path());

    eventually("existing lines", || collector.lines().len() == 2);
    append(&path, "third\n");
    eventually("appended line", || collector.lines().len() == 3);

    tailer.stop();
    assert_eq!(collector.lines(), vec!["first", "second", "third"]);
    assert!(collector.errors.lock().unwrap().is_empty());
}

#[test]
fn partial_line_is_held_until_terminated() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out.log");
    fs::write(&path, "par").unwrap();

    let collector = Arc::new(Collector::default());
    let _tailer = Tailer::start(&path, collector.clone(), fast()).unwrap();

    thread::sleep(Duration::from_millis(100));
    assert!(collector.lines().is_empty());

    append(&path, "tial\n");
    eventually("joined line", || collector.lines() == vec!["partial".to_string()]);
}

#[test]
fn waits_for_missing_file_to_appear() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("late.log");

    let collector = Arc::new(Collector::default());
    let _tailer = Tailer::start(&path, collector.clone(), fast()).unwrap();

    eventually("missing-file report", || collector.missing.load(Ordering::Relaxed) > 0);
    fs::write(&path, "hello\n").unwrap();
    eventually("line from late file", || collector.lines() == vec!["hello".to_string()]);
    assert!(collector.errors.lock().unwrap().is_empty());
}

#[test]
fn reports_not_found_after_retries() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("never.log");

    let collector = Arc::new(Collector::default());
    let cfg = TailerConfig {
        poll_interval: Duration::from_millis(5),
        missing_file_retries: 3,
        ..TailerConfig::default()
    };
    let mut tailer = Tailer::start(&path, collector.clone(), cfg).unwrap();

    eventually("not-found error", || !collector.errors.lock().unwrap().is_empty());
    tailer.stop();

    let errors = collector.errors.lock().unwrap();
    assert_eq!(errors.len(), 1, "reported once per missing streak");
    assert!(matches!(errors[0], TailError::NotFound { attempts: 3, .. }));
    assert!(errors[0].to_string().contains("never.log"));
}

#[test]
fn truncation_restarts_from_the_beginning() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out.log");
    fs::write(&path, "one\ntwo\n").unwrap();

    let collector = Arc::new(Collector::default());
    let _tailer = Tailer::start(&path, collector.clone(), fast()).unwrap();
    eventually("initial lines", || collector.lines().len() == 2);

    File::create(&path).unwrap().write_all(b"3\n").unwrap();
    eventually("line after truncation", || collector.lines().len() == 3);

    assert_eq!(collector.lines(), vec!["one", "two", "3"]);
    assert!(collector.rotations.load(Ordering::Relaxed) >= 1);
}

#[test]
fn rename_rotation_follows_the_new_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out.log");
    fs::write(&path, "before\n").unwrap();

    let collector = Arc::new(Collector::default());
    let _tailer = Tailer::start(&path, collector.clone(), fast()).unwrap();
    eventually("line before rotation", || collector.lines().len() == 1);

    fs::rename(&path, dir.path().join("out.log.1")).unwrap();
    fs::write(&path, "after rotation, a longer line than before\n").unwrap();

    eventually("line after rotation", || collector.lines().len() == 2);
    assert_eq!(collector.lines()[1], "after rotation, a longer line than before");
    assert!(collector.rotations.load(Ordering::Relaxed) >= 1);
}

#[test]
fn nothing_is_delivered_after_stop() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out.log");
    fs::write(&path, "kept\n").unwrap();

    let collector = Arc::new(Collector::default());
    let mut tailer = Tailer::start(&path, collector.clone(), fast()).unwrap();
    eventually("first line", || collector.lines().len() == 1);

    tailer.stop();
    assert!(!tailer.is_running());
    tailer.stop();

    append(&path, "ignored\n");
    thread::sleep(Duration::from_millis(100));
    assert_eq!(collector.lines(), vec!["kept"]);
}

#[test]
fn unterminated_output_is_split_at_the_line_limit() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out.log");
    fs::write(&path, format!("{}\n", "a".repeat(40))).unwrap();

    let collector = Arc::new(Collector::default());
    let cfg = TailerConfig {
        max_line_bytes: 16,
        ..fast()
    };
    let _tailer = Tailer::start(&path, collector.clone(), cfg).unwrap();

    eventually("split pieces", || collector.lines().len() == 3);
    assert_eq!(collector.lines(), vec!["a".repeat(16), "a".repeat(16), "a".repeat(8)]);

    let errors = collector.errors.lock().unwrap();
    assert_eq!(errors.len(), 2);
    assert!(errors
        .iter()
        .all(|e| matches!(e, TailError::LineTooLong { limit: 16, .. })));
}
