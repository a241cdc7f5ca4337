use std::{future::Future, sync::Arc};

use common::error::AppError;
use futures::stream::{FuturesUnordered, StreamExt};
use tokio::{sync::Semaphore, task::JoinHandle};
use tracing::debug;

/// Terminal state of one pooled task.
#[derive(Debug)]
pub enum TaskOutcome<T> {
    Success(T),
    Failure(AppError),
}

impl<T> TaskOutcome<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub fn success(self) -> Option<T> {
        match self {
            Self::Success(value) => Some(value),
            Self::Failure(_) => None,
        }
    }
}

/// Outcome tagged with the label the task was submitted under.
#[derive(Debug)]
pub struct TaskReport<T> {
    pub label: String,
    pub outcome: TaskOutcome<T>,
}

pub struct TaskHandle<T> {
    label: String,
    handle: JoinHandle<Result<T, AppError>>,
}

/// Fixed-capacity executor shared by the upload and transform stages.
///
/// `submit` waits for a free slot before spawning, so admission is FIFO in
/// submission order once the pool is saturated.
#[derive(Clone)]
pub struct TaskPool {
    semaphore: Arc<Semaphore>,
    capacity: usize,
}

impl TaskPool {
    pub fn new(capacity: usize) -> Result<Self, AppError> {
        if capacity == 0 {
            return Err(AppError::Validation(
                "task pool capacity must be greater than zero".to_string(),
            ));
        }

        Ok(Self {
            semaphore: Arc::new(Semaphore::new(capacity)),
            capacity,
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub async fn submit<F, T>(&self, label: impl Into<String>, task: F) -> TaskHandle<T>
    where
        F: Future<Output = Result<T, AppError>> + Send + 'static,
        T: Send + 'static,
    {
        let label = label.into();
        let handle = match Arc::clone(&self.semaphore).acquire_owned().await {
            Ok(permit) => tokio::spawn(async move {
                // Held until the task reaches a terminal state.
                let _permit = permit;
                task.await
            }),
            Err(_) => tokio::spawn(async {
                Err(AppError::InternalError("task pool is closed".into()))
            }),
        };
        debug!(task = %label, "task admitted to pool");

        TaskHandle { label, handle }
    }

    /// Waits for every handle to finish. Failures, including panics, never
    /// cancel siblings. Reports come back in completion order.
    pub async fn wait_all<T>(handles: Vec<TaskHandle<T>>) -> Vec<TaskReport<T>> {
        let mut pending: FuturesUnordered<_> = handles
            .into_iter()
            .map(|TaskHandle { label, handle }| async move {
                let outcome = match handle.await {
                    Ok(Ok(value)) => TaskOutcome::Success(value),
                    Ok(Err(err)) => TaskOutcome::Failure(err),
                    Err(join_err) => TaskOutcome::Failure(AppError::Join(join_err)),
                };
                TaskReport { label, outcome }
            })
            .collect();

        let mut reports = Vec::with_capacity(pending.len());
        while let Some(report) = pending.next().await {
            reports.push(report);
        }
        reports
    }
}
