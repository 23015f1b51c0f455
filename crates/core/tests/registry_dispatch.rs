use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use containerdiff_core::model::{ComparatorResult, ImageContext};
use containerdiff_core::services::dispatch::{
    default_comparator_registry, Comparator, ComparatorError, ComparatorRegistry, DispatchError,
};
use serde_json::{json, Value};

/// Emits a fixed result, optionally after a delay.
struct Fixed {
    name: &'static str,
    result: Value,
    delay_ms: u64,
    calls: Arc<AtomicUsize>,
}

impl Fixed {
    fn new(name: &'static str, result: Value) -> Self {
        Self { name, result, delay_ms: 0, calls: Arc::new(AtomicUsize::new(0)) }
    }
}

impl Comparator for Fixed {
    fn name(&self) -> &'static str {
        self.name
    }

    fn run(
        &self,
        _first: &ImageContext,
        _second: &ImageContext,
        _silent: bool,
    ) -> Result<ComparatorResult, ComparatorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        thread::sleep(Duration::from_millis(self.delay_ms));
        Ok(self.result.as_object().cloned().unwrap_or_default())
    }
}

struct Failing(&'static str, fn() -> ComparatorError);

impl Comparator for Failing {
    fn name(&self) -> &'static str {
        self.0
    }

    fn run(
        &self,
        _first: &ImageContext,
        _second: &ImageContext,
        _silent: bool,
    ) -> Result<ComparatorResult, ComparatorError> {
        Err((self.1)())
    }
}

struct Panicking;

impl Comparator for Panicking {
    fn name(&self) -> &'static str {
        "panicking"
    }

    fn run(
        &self,
        _first: &ImageContext,
        _second: &ImageContext,
        _silent: bool,
    ) -> Result<ComparatorResult, ComparatorError> {
        panic!("comparator bug");
    }
}

/// Echoes the silent flag so tests can see it arrived.
struct SilentEcho;

impl Comparator for SilentEcho {
    fn name(&self) -> &'static str {
        "echo"
    }

    fn run(
        &self,
        first: &ImageContext,
        second: &ImageContext,
        silent: bool,
    ) -> Result<ComparatorResult, ComparatorError> {
        let mut result = ComparatorResult::new();
        result.insert("silent".into(), json!(silent));
        result.insert("ids".into(), json!([first.id, second.id]));
        Ok(result)
    }
}

fn contexts() -> (ImageContext, ImageContext) {
    (
        ImageContext::new("sha256:aaaa", json!({}), "/nonexistent/a"),
        ImageContext::new("sha256:bbbb", json!({}), "/nonexistent/b"),
    )
}

#[test]
fn registry_registers_and_resolves() {
    let mut registry = ComparatorRegistry::new();
    assert!(registry.is_empty());
    registry.register(Fixed::new("noop", json!({})));
    assert!(registry.get("noop").is_some());
    assert!(registry.get("other").is_none());
    assert_eq!(registry.len(), 1);
}

#[test]
fn enumeration_order_is_lexicographic_not_registration_order() {
    let mut registry = ComparatorRegistry::new();
    registry
        .register(Fixed::new("zeta", json!({})))
        .register(Fixed::new("alpha", json!({})))
        .register(Fixed::new("mu", json!({})));
    assert_eq!(registry.names(), vec!["alpha", "mu", "zeta"]);

    let (a, b) = contexts();
    let order: Vec<String> =
        registry.dispatch(&a, &b, false).unwrap().into_iter().map(|r| r.comparator).collect();
    assert_eq!(order, vec!["alpha", "mu", "zeta"]);
}

#[test]
fn each_comparator_runs_exactly_once() {
    let first = Fixed::new("first", json!({"a": 1}));
    let second = Fixed::new("second", json!({"b": 2}));
    let (first_calls, second_calls) = (first.calls.clone(), second.calls.clone());
    let mut registry = ComparatorRegistry::new();
    registry.register(first).register(second);

    let (a, b) = contexts();
    registry.dispatch(&a, &b, false).unwrap();
    assert_eq!(first_calls.load(Ordering::SeqCst), 1);
    assert_eq!(second_calls.load(Ordering::SeqCst), 1);
}

#[test]
fn silent_flag_and_contexts_reach_comparators() {
    let mut registry = ComparatorRegistry::new();
    registry.register(SilentEcho);
    let (a, b) = contexts();
    let results = registry.dispatch(&a, &b, true).unwrap();
    assert_eq!(results[0].result["silent"], json!(true));
    assert_eq!(results[0].result["ids"], json!(["sha256:aaaa", "sha256:bbbb"]));
}

#[test]
fn failing_comparators_are_omitted_and_siblings_still_run() {
    let after = Fixed::new("zz-after", json!({"after": true}));
    let after_calls = after.calls.clone();
    let mut registry = ComparatorRegistry::new();
    registry
        .register(Fixed::new("aa-before", json!({"before": true})))
        .register(Failing("contract", || ComparatorError::Contract("no history".into())))
        .register(Failing("runtime", || ComparatorError::Runtime("boom".into())))
        .register(Panicking)
        .register(after);

    let (a, b) = contexts();
    let results = registry.dispatch(&a, &b, false).unwrap();
    let names: Vec<&str> = results.iter().map(|r| r.comparator.as_str()).collect();
    assert_eq!(names, vec!["aa-before", "zz-after"]);
    assert_eq!(after_calls.load(Ordering::SeqCst), 1);
}

#[test]
fn fatal_comparator_aborts_dispatch() {
    let mut registry = ComparatorRegistry::new();
    registry
        .register(Fixed::new("aa", json!({"a": 1})))
        .register(Failing("fatal", || ComparatorError::Fatal("daemon went away".into())));

    let (a, b) = contexts();
    let err = registry.dispatch(&a, &b, false).unwrap_err();
    match err {
        DispatchError::Aborted { comparator, reason } => {
            assert_eq!(comparator, "fatal");
            assert_eq!(reason, "daemon went away");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn concurrent_dispatch_keeps_enumeration_order() {
    let mut slow = Fixed::new("a-slow", json!({"x": "slow"}));
    slow.delay_ms = 150;
    let mut registry = ComparatorRegistry::new();
    registry
        .register(slow)
        .register(Fixed::new("b-fast", json!({"x": "fast"})))
        .register(Panicking)
        .register(Failing("c-broken", || ComparatorError::Runtime("nope".into())));

    let (a, b) = contexts();
    let concurrent = registry.dispatch_concurrent(&a, &b, false).unwrap();
    let sequential = registry.dispatch(&a, &b, false).unwrap();
    assert_eq!(concurrent, sequential);

    let names: Vec<&str> = concurrent.iter().map(|r| r.comparator.as_str()).collect();
    assert_eq!(names, vec!["a-slow", "b-fast"]);
}

#[test]
fn concurrent_dispatch_propagates_fatal() {
    let mut registry = ComparatorRegistry::new();
    registry
        .register(Fixed::new("aa", json!({"a": 1})))
        .register(Failing("fatal", || ComparatorError::Fatal("stop".into())));
    let (a, b) = contexts();
    assert!(matches!(
        registry.dispatch_concurrent(&a, &b, false),
        Err(DispatchError::Aborted { .. })
    ));
}

#[test]
fn retain_only_selects_known_comparators() {
    let mut registry = default_comparator_registry();
    registry.retain_only(&["history".to_string()]).unwrap();
    assert_eq!(registry.names(), vec!["history"]);

    let mut registry = default_comparator_registry();
    let err = registry.retain_only(&["packages".to_string()]).unwrap_err();
    assert!(err.to_string().contains("Unknown comparator 'packages'"), "unexpected error: {err}");
    assert!(err.to_string().contains("files, history, metadata"), "unexpected error: {err}");
    assert_eq!(registry.len(), 3);
}

#[test]
fn default_registry_describes_builtins() {
    let registry = default_comparator_registry();
    let descriptions = registry.descriptions();
    let names: Vec<&str> = descriptions.iter().map(|(name, _)| *name).collect();
    assert_eq!(names, vec!["files", "history", "metadata"]);
    assert!(descriptions.iter().all(|(_, desc)| !desc.is_empty()));
}
