use tracing::{debug, info};

use crate::filter::FilterConfig;
use crate::model::{NamedResult, Report};

/// Folds comparator results into one report, filtering each result first when
/// a filter config is present.
///
/// Merging is shallow: a key emitted by a later comparator replaces the whole
/// value stored by an earlier one.
#[derive(Debug)]
pub struct Aggregator<'a> {
    filters: Option<&'a FilterConfig>,
    report: Report,
}

impl<'a> Aggregator<'a> {
    /// `filters: None` disables filtering entirely.
    pub fn new(filters: Option<&'a FilterConfig>) -> Self {
        Self { filters, report: Report::new() }
    }

    pub fn add(&mut self, named: NamedResult) -> &mut Self {
        let NamedResult { comparator, mut result } = named;

        if let Some(filters) = self.filters {
            for (key, value) in result.iter_mut() {
                if let Some(rule) = filters.rule(key) {
                    info!(comparator = %comparator, key = %key, "filtering key in output");
                    *value = crate::filter::apply_filter(value.take(), rule);
                }
            }
        }

        for (key, value) in result {
            if self.report.contains_key(&key) {
                debug!(comparator = %comparator, key = %key, "overwriting key from an earlier comparator");
            }
            self.report.insert(key, value);
        }
        self
    }

    pub fn finish(self) -> Report {
        self.report
    }
}

/// Merge `results` in order into one report.
pub fn aggregate(results: Vec<NamedResult>, filters: Option<&FilterConfig>) -> Report {
    let mut aggregator = Aggregator::new(filters);
    for named in results {
        aggregator.add(named);
    }
    aggregator.finish()
}
