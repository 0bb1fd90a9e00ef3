//! Soft failures, timeouts and total failure

use parley_core::{
    Backend, BackendDescriptor, BackendRegistry, BackendResult, DetectOptions, Error,
    LanguageDetector, Result,
};
use std::sync::Arc;
use std::time::{Duration, Instant};

struct Answer(&'static str, &'static str);

impl Backend for Answer {
    fn name(&self) -> &str {
        self.0
    }

    fn detect(&self, _text: &str) -> Result<BackendResult> {
        Ok(BackendResult::new(self.0, self.1, 0.9))
    }
}

struct Failing(&'static str);

impl Backend for Failing {
    fn name(&self) -> &str {
        self.0
    }

    fn detect(&self, _text: &str) -> Result<BackendResult> {
        Err(Error::backend(self.0, "inference failed"))
    }
}

struct Panicking;

impl Backend for Panicking {
    fn name(&self) -> &str {
        "panicking"
    }

    fn detect(&self, _text: &str) -> Result<BackendResult> {
        panic!("model exploded")
    }
}

struct Slow(Duration);

impl Backend for Slow {
    fn name(&self) -> &str {
        "slow"
    }

    fn detect(&self, _text: &str) -> Result<BackendResult> {
        std::thread::sleep(self.0);
        Ok(BackendResult::new("slow", "de", 0.99))
    }
}

fn detector(backends: Vec<Arc<dyn Backend>>, timeout_ms: u64) -> LanguageDetector {
    let registry = Arc::new(BackendRegistry::new());
    for backend in backends {
        registry
            .register(BackendDescriptor::from_backend(backend))
            .unwrap();
    }
    LanguageDetector::builder()
        .registry(registry)
        .timeout_ms(timeout_ms)
        .max_workers(4)
        .build()
        .unwrap()
}

#[test]
fn test_failures_are_excluded() {
    let detector = detector(
        vec![
            Arc::new(Answer("good", "nl")),
            Arc::new(Failing("bad")),
            Arc::new(Panicking),
        ],
        2000,
    );
    let result = detector.detect("hallo allemaal").unwrap();
    assert_eq!(result.language, "nl");
    assert_eq!(result.backends, vec!["good"]);
}

#[test]
fn test_all_backends_failing_is_an_error() {
    let detector = detector(vec![Arc::new(Failing("a")), Arc::new(Failing("b"))], 2000);
    assert!(matches!(detector.detect("text"), Err(Error::Detection(_))));
}

#[test]
fn test_no_backends_is_an_error() {
    let detector = detector(Vec::new(), 2000);
    assert!(matches!(detector.detect("text"), Err(Error::Detection(_))));
}

#[test]
fn test_slow_backend_dropped_sequentially() {
    let detector = detector(
        vec![
            Arc::new(Answer("fast", "fr")),
            Arc::new(Slow(Duration::from_millis(1500))),
        ],
        100,
    );
    let start = Instant::now();
    let result = detector.detect("short").unwrap();
    assert!(start.elapsed() < Duration::from_millis(1000));
    assert_eq!(result.language, "fr");
    assert_eq!(result.backends, vec!["fast"]);
}

#[test]
fn test_slow_backend_dropped_in_parallel() {
    let detector = detector(
        vec![
            Arc::new(Answer("a", "fr")),
            Arc::new(Answer("b", "fr")),
            Arc::new(Slow(Duration::from_millis(400))),
        ],
        100,
    );
    // Long enough to fan out across three backends
    let text = "une phrase suffisamment longue pour passer en mode parallèle sans hésiter";
    let result = detector.detect(text).unwrap();
    assert_eq!(result.language, "fr");
    assert!(!result.backends.contains(&"slow".to_string()));
}

#[test]
fn test_hung_backend_does_not_block_later_detections() {
    let registry = Arc::new(BackendRegistry::new());
    let backends: Vec<Arc<dyn Backend>> = vec![
        Arc::new(Answer("a", "fr")),
        Arc::new(Answer("b", "fr")),
        Arc::new(Slow(Duration::from_millis(1500))),
    ];
    for backend in backends {
        registry
            .register(BackendDescriptor::from_backend(backend))
            .unwrap();
    }
    let detector = LanguageDetector::builder()
        .registry(registry)
        .timeout_ms(100)
        .max_workers(2)
        .cache_capacity(0)
        .build()
        .unwrap();

    let text = "une phrase suffisamment longue pour passer en mode parallèle sans hésiter";
    for _ in 0..4 {
        let start = Instant::now();
        let result = detector.detect(text).unwrap();
        assert!(start.elapsed() < Duration::from_millis(1000));
        assert_eq!(result.language, "fr");
        assert_eq!(result.backends, vec!["a", "b"]);
    }
}

#[test]
fn test_only_unknown_backends_requested() {
    let detector = detector(vec![Arc::new(Answer("a", "fr"))], 2000);
    let options = DetectOptions::new().backends(["nope"]);
    assert!(matches!(
        detector.detect_with("texte", &options),
        Err(Error::Detection(_))
    ));
}
