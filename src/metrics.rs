use crate::error::RepositoryError;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Repository operations reported to a [`RepositoryMetrics`] observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Add,
    Get,
    GetField,
    Update,
    UpdateField,
    Delete,
    Search,
    Find,
}

impl Operation {
    pub fn as_str(self) -> &'static str {
        match self {
            Operation::Add => "add",
            Operation::Get => "get",
            Operation::GetField => "get_field",
            Operation::Update => "update",
            Operation::UpdateField => "update_field",
            Operation::Delete => "delete",
            Operation::Search => "search",
            Operation::Find => "find",
        }
    }
}

/// Metrics observer for repository operations.
///
/// `result` is `Ok` for both found and not-found outcomes; only validation
/// and store failures are errors.
pub trait RepositoryMetrics: Send + Sync {
    fn record(&self, operation: Operation, latency: Duration, result: Result<(), RepositoryError>);
}

pub(crate) struct MetricsSpan {
    recorder: Arc<dyn RepositoryMetrics>,
    operation: Operation,
    start: Instant,
}

impl MetricsSpan {
    pub(crate) fn start(
        recorder: Option<&Arc<dyn RepositoryMetrics>>,
        operation: Operation,
    ) -> Option<Self> {
        recorder.map(|recorder| Self {
            recorder: Arc::clone(recorder),
            operation,
            start: Instant::now(),
        })
    }

    pub(crate) fn finish<T>(self, result: &Result<T, RepositoryError>) {
        let outcome = match result {
            Ok(_) => Ok(()),
            Err(err) => Err(err.clone()),
        };
        self.recorder
            .record(self.operation, self.start.elapsed(), outcome);
    }
}
