use std::any::Any;
use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::thread;

use thiserror::Error;
use tracing::{debug, error, info};

use crate::model::{ComparatorResult, ImageContext, NamedResult};

#[derive(Debug, Error)]
pub enum ComparatorError {
    /// The comparator cannot honor its contract for these inputs
    /// (e.g. metadata it depends on is missing or has the wrong shape).
    #[error("contract violation: {0}")]
    Contract(String),
    #[error("{0}")]
    Runtime(String),
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// Abort the whole comparison instead of omitting this comparator.
    #[error("fatal: {0}")]
    Fatal(String),
}

impl ComparatorError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ComparatorError::Io { path: path.into(), source }
    }
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Comparator '{comparator}' aborted the comparison: {reason}")]
    Aborted { comparator: String, reason: String },
    #[error("Unknown comparator '{name}'. Available: {available}")]
    UnknownComparator { name: String, available: String },
}

/// Trait implemented by comparators (history, files, metadata, ...).
///
/// A comparator looks at two prepared images and returns a mapping of result
/// keys to structured values. It must not assume anything about other
/// comparators; if two of them emit the same key, the one dispatched later
/// wins.
pub trait Comparator: Send + Sync {
    fn name(&self) -> &'static str;

    fn description(&self) -> &'static str {
        ""
    }

    /// `silent` lowers the verbosity of the output; each comparator decides
    /// what that means for its own keys.
    fn run(
        &self,
        first: &ImageContext,
        second: &ImageContext,
        silent: bool,
    ) -> Result<ComparatorResult, ComparatorError>;
}

/// Explicit table of comparators, enumerated in lexicographic name order.
#[derive(Default)]
pub struct ComparatorRegistry {
    comparators: BTreeMap<String, Box<dyn Comparator>>,
}

impl ComparatorRegistry {
    pub fn new() -> Self {
        Self { comparators: BTreeMap::new() }
    }

    pub fn register<C: Comparator + 'static>(&mut self, comparator: C) -> &mut Self {
        self.comparators.insert(comparator.name().to_string(), Box::new(comparator));
        self
    }

    pub fn get(&self, name: &str) -> Option<&dyn Comparator> {
        self.comparators.get(name).map(|c| &**c)
    }

    /// Registered comparator names in dispatch order.
    pub fn names(&self) -> Vec<String> {
        self.comparators.keys().cloned().collect()
    }

    /// (name, description) pairs in dispatch order.
    pub fn descriptions(&self) -> Vec<(&'static str, &'static str)> {
        self.comparators.values().map(|c| (c.name(), c.description())).collect()
    }

    pub fn len(&self) -> usize {
        self.comparators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.comparators.is_empty()
    }

    /// Keep only the named comparators. Every name must be registered.
    pub fn retain_only(&mut self, names: &[String]) -> Result<(), DispatchError> {
        if let Some(unknown) = names.iter().find(|n| !self.comparators.contains_key(n.as_str())) {
            return Err(DispatchError::UnknownComparator {
                name: unknown.clone(),
                available: self.names().join(", "),
            });
        }
        self.comparators.retain(|name, _| names.contains(name));
        Ok(())
    }

    /// Run every comparator once, one after another.
    ///
    /// Failing comparators are logged and left out of the returned results;
    /// only [`ComparatorError::Fatal`] stops the dispatch.
    pub fn dispatch(
        &self,
        first: &ImageContext,
        second: &ImageContext,
        silent: bool,
    ) -> Result<Vec<NamedResult>, DispatchError> {
        let mut results = Vec::with_capacity(self.comparators.len());
        for (name, comparator) in &self.comparators {
            if let Some(result) = guarded_run(comparator.as_ref(), first, second, silent)? {
                results.push(NamedResult::new(name.clone(), result));
            }
        }
        info!(succeeded = results.len(), registered = self.comparators.len(), "comparators finished");
        Ok(results)
    }

    /// Run every comparator on its own thread.
    ///
    /// Results come back in the same order as [`ComparatorRegistry::dispatch`]
    /// regardless of which comparator finishes first, and one failure never
    /// cancels the others.
    pub fn dispatch_concurrent(
        &self,
        first: &ImageContext,
        second: &ImageContext,
        silent: bool,
    ) -> Result<Vec<NamedResult>, DispatchError> {
        let outcomes: Vec<(String, Result<Option<ComparatorResult>, DispatchError>)> =
            thread::scope(|scope| {
                let handles: Vec<_> = self
                    .comparators
                    .iter()
                    .map(|(name, comparator)| {
                        let comparator: &dyn Comparator = comparator.as_ref();
                        let handle =
                            scope.spawn(move || guarded_run(comparator, first, second, silent));
                        (name.clone(), handle)
                    })
                    .collect();
                handles
                    .into_iter()
                    .map(|(name, handle)| {
                        let outcome = handle.join().unwrap_or_else(|payload| {
                            error!(comparator = %name, panic = %panic_message(payload.as_ref()), "comparator thread panicked");
                            Ok(None)
                        });
                        (name, outcome)
                    })
                    .collect()
            });

        let mut results = Vec::with_capacity(outcomes.len());
        for (name, outcome) in outcomes {
            if let Some(result) = outcome? {
                results.push(NamedResult::new(name, result));
            }
        }
        info!(succeeded = results.len(), registered = self.comparators.len(), "comparators finished");
        Ok(results)
    }
}

/// Run one comparator behind an isolation boundary.
///
/// `Ok(None)` means the comparator failed and its output is omitted.
fn guarded_run(
    comparator: &dyn Comparator,
    first: &ImageContext,
    second: &ImageContext,
    silent: bool,
) -> Result<Option<ComparatorResult>, DispatchError> {
    let name = comparator.name();
    info!(comparator = name, "running comparator");

    match panic::catch_unwind(AssertUnwindSafe(|| comparator.run(first, second, silent))) {
        Ok(Ok(result)) => {
            debug!(comparator = name, keys = result.len(), "comparator produced result");
            Ok(Some(result))
        }
        Ok(Err(ComparatorError::Fatal(reason))) => {
            error!(comparator = name, reason = %reason, "comparator aborted the comparison");
            Err(DispatchError::Aborted { comparator: name.to_string(), reason })
        }
        Ok(Err(err @ ComparatorError::Contract(_))) => {
            error!(comparator = name, error = %err, "comparator does not satisfy its contract; output omitted");
            Ok(None)
        }
        Ok(Err(err)) => {
            error!(comparator = name, error = %err, "comparator failed; output omitted");
            Ok(None)
        }
        Err(payload) => {
            error!(comparator = name, panic = %panic_message(payload.as_ref()), "comparator panicked; output omitted");
            Ok(None)
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Registry populated with the built-in comparators.
pub fn default_comparator_registry() -> ComparatorRegistry {
    let mut registry = ComparatorRegistry::new();
    registry
        .register(crate::services::comparators::FilesComparator)
        .register(crate::services::comparators::HistoryComparator)
        .register(crate::services::comparators::MetadataComparator);
    registry
}
