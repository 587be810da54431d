//! Integration tests for rebroadcast

mod cache_tests {
    use async_trait::async_trait;
    use rebroadcast::{CacheStatus, Producer, ProducerExt, ReplayCache, ReplayError};
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[derive(Debug, PartialEq, thiserror::Error)]
    #[error("scripted failure")]
    struct ScriptedError;

    /// Producer that counts pulls and refuses to be pulled past its end
    struct Scripted<T> {
        items: VecDeque<T>,
        fail: bool,
        delay: Option<Duration>,
        pulls: Arc<AtomicUsize>,
        done: bool,
    }

    impl<T> Scripted<T> {
        fn new(items: impl IntoIterator<Item = T>) -> (Self, Arc<AtomicUsize>) {
            let pulls = Arc::new(AtomicUsize::new(0));
            let producer = Self {
                items: items.into_iter().collect(),
                fail: false,
                delay: None,
                pulls: Arc::clone(&pulls),
                done: false,
            };
            (producer, pulls)
        }

        fn failing(mut self) -> Self {
            self.fail = true;
            self
        }

        fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = Some(delay);
            self
        }
    }

    #[async_trait]
    impl<T: Send> Producer for Scripted<T> {
        type Item = T;
        type Error = ScriptedError;

        async fn pull(&mut self) -> Result<Option<T>, ScriptedError> {
            assert!(!self.done, "producer pulled after it finished");
            self.pulls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }

            match self.items.pop_front() {
                Some(item) => Ok(Some(item)),
                None => {
                    self.done = true;
                    if self.fail {
                        Err(ScriptedError)
                    } else {
                        Ok(None)
                    }
                }
            }
        }
    }

    struct Exploding;

    #[async_trait]
    impl Producer for Exploding {
        type Item = i32;
        type Error = ScriptedError;

        async fn pull(&mut self) -> Result<Option<i32>, ScriptedError> {
            panic!("producer exploded");
        }
    }

    async fn collect<T, E>(cache: &ReplayCache<T, E>) -> Result<Vec<T>, ReplayError<E>>
    where
        T: Clone + Send + 'static,
        E: Send + Sync + 'static,
    {
        let mut cursor = cache.attach();
        let mut out = Vec::new();
        while let Some(item) = cursor.next().await? {
            out.push(item);
        }
        Ok(out)
    }

    #[tokio::test]
    async fn sequence_replays_without_driving_again() {
        let (producer, pulls) = Scripted::new(1..=5);
        let cache = producer.replay();

        assert_eq!(collect(&cache).await.unwrap(), vec![1, 2, 3, 4, 5]);
        assert_eq!(collect(&cache).await.unwrap(), vec![1, 2, 3, 4, 5]);
        assert_eq!(pulls.load(Ordering::SeqCst), 6);
        assert_eq!(cache.status(), CacheStatus::Finished);
    }

    #[tokio::test]
    async fn empty_producer_ends_immediately() {
        let (producer, pulls) = Scripted::<i32>::new([]);
        let cache = producer.replay();

        for _ in 0..3 {
            let mut cursor = cache.attach();
            assert_eq!(cursor.next().await.unwrap(), None);
        }
        assert_eq!(cache.buffered_len(), 0);
        assert_eq!(pulls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn lockstep_cursors_see_identical_values() {
        let (producer, _pulls) = Scripted::new(1..=100);
        let cache = producer.with_delay(Duration::from_millis(1)).replay();

        let mut a = cache.attach();
        let mut b = cache.attach();
        for expected in 1..=100 {
            let x = a.next().await.unwrap();
            let y = b.next().await.unwrap();
            assert_eq!(x, Some(expected));
            assert_eq!(x, y);
        }
        assert_eq!(a.next().await.unwrap(), None);
        assert_eq!(b.next().await.unwrap(), None);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_consumers_drive_once() {
        let (producer, pulls) = Scripted::new(1..=100);
        let cache = producer.with_delay(Duration::from_millis(1)).replay();

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let cache = cache.clone();
                tokio::spawn(async move { collect(&cache).await })
            })
            .collect();

        let expected: Vec<i32> = (1..=100).collect();
        for task in tasks {
            assert_eq!(task.await.unwrap().unwrap(), expected);
        }
        assert_eq!(pulls.load(Ordering::SeqCst), 101);
    }

    #[tokio::test]
    async fn late_cursor_catches_up_mid_production() {
        let (producer, _pulls) = Scripted::new(1..=20);
        let cache = producer.with_delay(Duration::from_millis(1)).replay();

        let mut early = cache.attach();
        for expected in 1..=10 {
            assert_eq!(early.next().await.unwrap(), Some(expected));
        }
        assert_eq!(cache.status(), CacheStatus::Buffering);

        let late = collect(&cache).await.unwrap();
        assert_eq!(late, (1..=20).collect::<Vec<_>>());
        assert_eq!(early.next().await.unwrap(), Some(11));
    }

    #[tokio::test]
    async fn failure_is_cached_and_rethrown() {
        let (producer, pulls) = Scripted::new([1, 2]);
        let cache = producer.failing().replay();

        let first = collect(&cache).await.unwrap_err();
        assert_eq!(first.producer_error(), Some(&ScriptedError));

        let second = collect(&cache).await.unwrap_err();
        assert!(second.is_producer_failure());
        assert_eq!(pulls.load(Ordering::SeqCst), 3);
        assert_eq!(cache.status(), CacheStatus::Failed);
    }

    #[tokio::test]
    async fn failure_hides_previously_delivered_indices() {
        let (producer, _pulls) = Scripted::new([1, 2]);
        let cache = producer
            .failing()
            .with_delay(Duration::from_millis(1))
            .replay();

        let mut cursor = cache.attach();
        assert_eq!(cursor.next().await.unwrap(), Some(1));
        assert_eq!(cursor.next().await.unwrap(), Some(2));
        assert!(cursor.next().await.is_err());
        assert!(cursor.next().await.is_err());

        let mut fresh = cache.attach();
        let err = fresh.next().await.unwrap_err();
        assert_eq!(err.producer_error(), Some(&ScriptedError));
        assert_eq!(fresh.position(), 0);
    }

    #[tokio::test]
    async fn single_element_sequence() {
        let (producer, _pulls) = Scripted::new(["single".to_string()]);
        let cache = producer.replay();

        assert_eq!(collect(&cache).await.unwrap(), vec!["single".to_string()]);
    }

    #[tokio::test]
    async fn large_sequence_served_from_buffer() {
        let (producer, pulls) = Scripted::new(1..=10_000);
        let cache = producer.replay();

        let first = collect(&cache).await.unwrap();
        assert_eq!(first.len(), 10_000);
        assert!(first.windows(2).all(|w| w[0] + 1 == w[1]));

        let second = collect(&cache).await.unwrap();
        assert_eq!(second, first);
        assert_eq!(pulls.load(Ordering::SeqCst), 10_001);
    }

    #[tokio::test]
    async fn panicking_producer_reports_driver_lost() {
        let cache = Exploding.replay();

        let mut cursor = cache.attach();
        assert!(matches!(cursor.next().await, Err(ReplayError::DriverLost)));
        assert!(matches!(
            cache.attach().next().await,
            Err(ReplayError::DriverLost)
        ));
        assert_eq!(cache.status(), CacheStatus::Failed);
    }

    #[tokio::test]
    async fn producer_keeps_running_without_cursors() {
        let (producer, pulls) = Scripted::new(1..=5);
        let cache = producer.with_delay(Duration::from_millis(1)).replay();

        let mut cursor = cache.attach();
        assert_eq!(cursor.next().await.unwrap(), Some(1));
        drop(cursor);

        let probe = cache.clone();
        drop(cache);
        tokio::time::timeout(Duration::from_secs(5), async {
            while probe.status() != CacheStatus::Finished {
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        })
        .await
        .unwrap();
        assert_eq!(pulls.load(Ordering::SeqCst), 6);
    }
}

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use std::path::Path;
    use tempfile::TempDir;

    const EVENTS: &str = "event: greet\ndata: hello\n\n: comment\nid: 42\ndata: line one\ndata: line two\n\n";

    fn rebroadcast(config_dir: &Path) -> Command {
        let mut cmd = cargo_bin_cmd!("rebroadcast");
        cmd.arg("--config").arg(config_dir.join("config.toml"));
        cmd
    }

    fn events_file(dir: &TempDir) -> std::path::PathBuf {
        let path = dir.path().join("events.sse");
        std::fs::write(&path, EVENTS).unwrap();
        path
    }

    #[test]
    fn help_displays() {
        let temp = TempDir::new().unwrap();
        rebroadcast(temp.path())
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("replay one event stream"));
    }

    #[test]
    fn version_displays() {
        let temp = TempDir::new().unwrap();
        rebroadcast(temp.path())
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("rebroadcast"));
    }

    #[test]
    fn replay_file_as_table() {
        let temp = TempDir::new().unwrap();
        let file = events_file(&temp);

        rebroadcast(temp.path())
            .args(["replay", "-n", "3"])
            .arg(&file)
            .assert()
            .success()
            .stdout(predicate::str::contains("greet"))
            .stdout(predicate::str::contains("line one\\nline two"))
            .stdout(predicate::str::contains("2 event(s) replayed to 3 consumer(s)"));
    }

    #[test]
    fn replay_stdin_as_json() {
        let temp = TempDir::new().unwrap();
        let output = rebroadcast(temp.path())
            .args(["replay", "--format", "json"])
            .write_stdin(EVENTS)
            .assert()
            .success()
            .get_output()
            .stdout
            .clone();

        let events: serde_json::Value = serde_json::from_slice(&output).unwrap();
        assert_eq!(events.as_array().map(Vec::len), Some(2));
        assert_eq!(events[1]["id"], "42");
        assert_eq!(events[1]["data"], "line one\nline two");
    }

    #[test]
    fn replay_plain() {
        let temp = TempDir::new().unwrap();
        let file = events_file(&temp);

        rebroadcast(temp.path())
            .args(["replay", "--format", "plain"])
            .arg(&file)
            .assert()
            .success()
            .stdout("hello\nline one\nline two\n");
    }

    #[test]
    fn replay_missing_file() {
        let temp = TempDir::new().unwrap();
        rebroadcast(temp.path())
            .args(["replay", "/nonexistent/events.sse"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Path not found"));
    }

    #[test]
    fn config_path() {
        let temp = TempDir::new().unwrap();
        rebroadcast(temp.path())
            .args(["config", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains("config.toml"));
    }

    #[test]
    fn config_show() {
        let temp = TempDir::new().unwrap();
        rebroadcast(temp.path())
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[replay]"));
    }

    #[test]
    fn config_init_then_invalid_edit() {
        let temp = TempDir::new().unwrap();
        rebroadcast(temp.path())
            .args(["config", "init"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Configuration initialized"));

        std::fs::write(temp.path().join("config.toml"), "[replay\n").unwrap();
        rebroadcast(temp.path())
            .args(["config", "show"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid configuration"));
    }
}
