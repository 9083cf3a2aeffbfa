#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Bounded-concurrency batch driver.
//!
//! Lists items from a paginated [`PageSource`], dispatches one independent
//! [`Operation`] per item with at most `parallelism` operations executing
//! at any instant, and returns a [`BatchSummary`] once every dispatched
//! operation has settled.
//!
//! ## Guarantees
//!
//! - Only one page of items is held by the driver at a time.
//! - Items are dispatched in listing order; completion order is unordered.
//! - A failing (or panicking) operation is recorded in the summary and never
//!   stops the batch.
//! - A failing listing call stops the batch: in-flight work is drained and
//!   the partial summary travels with [`BatchError::Listing`].
//! - [`BatchDriver::run`] never returns while an operation is still running.
//!
//! ## Sharing convention
//!
//! The operation is wrapped in an `Arc` and shared by every task, so any
//! client it holds must be safe for concurrent use. Build the client once
//! and hand it to the operation by value (SDK clients such as
//! `aws_sdk_s3::Client` are cheap handles over shared state).

pub mod progress;

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::{Id, JoinError, JoinSet};

use crate::progress::ProgressCallback;

/// Errors that abort a batch run.
#[derive(Debug, thiserror::Error)]
pub enum BatchError<E, I>
where
    E: std::error::Error + 'static,
    I: fmt::Debug,
{
    /// The driver was configured with an unusable parallelism.
    #[error("Invalid parallelism {parallelism}: must be between 1 and {max}")]
    Configuration {
        /// The rejected value.
        parallelism: usize,
        /// Largest value the permit pool supports.
        max: usize,
    },

    /// The listing source failed. Operations dispatched before the failure
    /// were drained and their outcomes are in `summary`.
    #[error("Listing failed after {} item(s) were submitted: {source}", .summary.submitted)]
    Listing {
        /// Underlying listing error.
        source: E,
        /// Outcomes of the items that were dispatched before the failure.
        summary: BatchSummary<I>,
    },
}

/// One page of a paginated listing.
#[derive(Debug, Clone)]
pub struct Page<I, C> {
    /// Items on this page, in listing order.
    pub items: Vec<I>,
    /// Continuation token for the next page; `None` ends the listing.
    pub next: Option<C>,
}

impl<I, C> Page<I, C> {
    /// A page followed by more pages.
    #[must_use]
    pub const fn more(items: Vec<I>, next: C) -> Self {
        Self {
            items,
            next: Some(next),
        }
    }

    /// The final page of a listing.
    #[must_use]
    pub const fn last(items: Vec<I>) -> Self {
        Self { items, next: None }
    }
}

/// A paginated enumeration of items.
///
/// Each call must be independent of driver state. The cursor is moved into
/// the call, so a token can only ever be used once. The source must
/// eventually return a page without a cursor.
pub trait PageSource: Send + Sync {
    /// The unit of work yielded by the listing.
    type Item: Clone + fmt::Debug + Send + Sync + 'static;
    /// Opaque continuation token.
    type Cursor: Send;
    /// Listing failure.
    type Error: std::error::Error + 'static;

    /// Fetches the page that follows `cursor` (`None` for the first page).
    ///
    /// # Errors
    ///
    /// Returns [`Self::Error`] if the page cannot be listed. The driver
    /// treats this as fatal.
    fn list_page(
        &self,
        cursor: Option<Self::Cursor>,
    ) -> impl Future<Output = Result<Page<Self::Item, Self::Cursor>, Self::Error>> + Send;
}

/// A single-item side-effecting action.
///
/// Shared across tasks through an `Arc`, so implementations must tolerate
/// concurrent calls. Retries and timeouts, if wanted, belong here.
pub trait Operation<I>: Send + Sync + 'static {
    /// Per-item failure. Only its `Display` output is kept.
    type Error: fmt::Display;

    /// Performs the operation for `item`.
    ///
    /// # Errors
    ///
    /// Returns [`Self::Error`] if the operation failed for this item. The
    /// failure is recorded and the batch continues.
    fn run(&self, item: &I) -> impl Future<Output = Result<(), Self::Error>> + Send;
}

/// [`Operation`] built from a closure. See [`from_fn`].
pub struct FnOperation<F> {
    f: F,
}

/// Wraps a closure taking an owned item as an [`Operation`].
pub const fn from_fn<F>(f: F) -> FnOperation<F> {
    FnOperation { f }
}

impl<I, F, Fut, E> Operation<I> for FnOperation<F>
where
    I: Clone,
    F: Fn(I) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), E>> + Send,
    E: fmt::Display,
{
    type Error = E;

    fn run(&self, item: &I) -> impl Future<Output = Result<(), E>> + Send {
        (self.f)(item.clone())
    }
}

/// How an operation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The operation returned an error.
    Failed,
    /// The operation panicked.
    Panicked,
    /// The task was cancelled by the runtime before it settled.
    Cancelled,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Failed => "failed",
            Self::Panicked => "panicked",
            Self::Cancelled => "cancelled",
        })
    }
}

/// Description of a single failed operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorDescription {
    /// Failure category.
    pub kind: FailureKind,
    /// Human-readable message.
    pub message: String,
}

/// An item whose operation failed.
#[derive(Debug, Clone)]
pub struct OperationFailure<I> {
    /// The item the operation was bound to.
    pub item: I,
    /// What went wrong.
    pub error: ErrorDescription,
}

/// Aggregate result of a batch run.
#[derive(Debug, Clone)]
pub struct BatchSummary<I> {
    /// Operations dispatched.
    pub submitted: u64,
    /// Operations that completed successfully.
    pub succeeded: u64,
    /// Operations that failed or panicked.
    pub failed: u64,
    /// One entry per failed operation, in completion order.
    pub failures: Vec<OperationFailure<I>>,
}

impl<I> Default for BatchSummary<I> {
    fn default() -> Self {
        Self {
            submitted: 0,
            succeeded: 0,
            failed: 0,
            failures: Vec::new(),
        }
    }
}

impl<I> BatchSummary<I> {
    /// Returns `true` if no operation failed.
    #[must_use]
    pub const fn is_clean(&self) -> bool {
        self.failed == 0
    }

    /// Returns the `(item, message)` pairs of every failure.
    pub fn failure_messages(&self) -> impl Iterator<Item = (&I, &str)> {
        self.failures
            .iter()
            .map(|f| (&f.item, f.error.message.as_str()))
    }
}

impl<I> fmt::Display for BatchSummary<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} submitted, {} succeeded, {} failed",
            self.submitted, self.succeeded, self.failed
        )
    }
}

/// Drives paginated listings through a bounded pool of concurrent
/// operations.
pub struct BatchDriver {
    parallelism: usize,
    progress: Arc<dyn ProgressCallback>,
}

impl BatchDriver {
    /// Creates a driver that runs at most `parallelism` operations at once.
    ///
    /// The value is validated when [`Self::run`] is called.
    #[must_use]
    pub fn new(parallelism: usize) -> Self {
        Self {
            parallelism,
            progress: progress::null_progress(),
        }
    }

    /// Reports progress to `progress`: the total grows by each page's
    /// length and every settled operation advances it by one.
    #[must_use]
    pub fn with_progress(mut self, progress: Arc<dyn ProgressCallback>) -> Self {
        self.progress = progress;
        self
    }

    /// Lists every page of `source` and runs `operation` once per item.
    ///
    /// Returns only after every dispatched operation has settled.
    ///
    /// # Errors
    ///
    /// * [`BatchError::Configuration`] if the parallelism is zero or too
    ///   large; nothing is listed.
    /// * [`BatchError::Listing`] if a listing call fails; no further pages
    ///   are requested and already-dispatched work is drained first.
    pub async fn run<S, O>(
        &self,
        source: &S,
        operation: O,
    ) -> Result<BatchSummary<S::Item>, BatchError<S::Error, S::Item>>
    where
        S: PageSource,
        O: Operation<S::Item>,
    {
        if self.parallelism == 0 || self.parallelism > Semaphore::MAX_PERMITS {
            return Err(BatchError::Configuration {
                parallelism: self.parallelism,
                max: Semaphore::MAX_PERMITS,
            });
        }

        let operation = Arc::new(operation);
        let permits = Arc::new(Semaphore::new(self.parallelism));
        let mut batch = InFlight::new(Arc::clone(&self.progress));
        let mut cursor: Option<S::Cursor> = None;
        let mut pages = 0u64;

        loop {
            let page = match source.list_page(cursor.take()).await {
                Ok(page) => page,
                Err(e) => {
                    log::debug!("Listing failed after {pages} page(s), draining in-flight work");
                    let summary = batch.drain().await;
                    return Err(BatchError::Listing { source: e, summary });
                }
            };
            pages += 1;
            log::debug!(
                "Page {pages}: {} item(s), more={}",
                page.items.len(),
                page.next.is_some()
            );
            self.progress
                .set_total(batch.summary.submitted + page.items.len() as u64);

            for item in page.items {
                // Backpressure: blocks while `parallelism` operations run.
                let Ok(permit) = Arc::clone(&permits).acquire_owned().await else {
                    unreachable!("permit pool is owned by this run and never closed")
                };
                batch.reap();

                let operation = Arc::clone(&operation);
                let task_item = item.clone();
                let handle = batch.tasks.spawn(async move {
                    let _permit = permit;
                    operation
                        .run(&task_item)
                        .await
                        .map_err(|e| e.to_string())
                });
                batch.items.insert(handle.id(), item);
                batch.summary.submitted += 1;
            }

            match page.next {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        log::debug!(
            "Listing complete ({pages} page(s), {} item(s)), waiting for {} operation(s)",
            batch.summary.submitted,
            batch.tasks.len()
        );

        Ok(batch.drain().await)
    }
}

/// Dispatched tasks and the summary they settle into.
///
/// Only the driver's control flow touches this, so the summary has a
/// single writer.
struct InFlight<I> {
    tasks: JoinSet<Result<(), String>>,
    items: HashMap<Id, I>,
    summary: BatchSummary<I>,
    progress: Arc<dyn ProgressCallback>,
}

impl<I> InFlight<I> {
    fn new(progress: Arc<dyn ProgressCallback>) -> Self {
        Self {
            tasks: JoinSet::new(),
            items: HashMap::new(),
            summary: BatchSummary::default(),
            progress,
        }
    }

    /// Records every task that has already finished, without waiting.
    fn reap(&mut self) {
        while let Some(joined) = self.tasks.try_join_next_with_id() {
            self.record(joined);
        }
    }

    /// Waits for every remaining task and returns the final summary.
    async fn drain(mut self) -> BatchSummary<I> {
        while let Some(joined) = self.tasks.join_next_with_id().await {
            self.record(joined);
        }
        self.summary
    }

    fn record(&mut self, joined: Result<(Id, Result<(), String>), JoinError>) {
        let (id, outcome) = match joined {
            Ok((id, Ok(()))) => (id, None),
            Ok((id, Err(message))) => (
                id,
                Some(ErrorDescription {
                    kind: FailureKind::Failed,
                    message,
                }),
            ),
            Err(e) => {
                let id = e.id();
                let error = if e.is_panic() {
                    ErrorDescription {
                        kind: FailureKind::Panicked,
                        message: panic_message(&*e.into_panic()),
                    }
                } else {
                    ErrorDescription {
                        kind: FailureKind::Cancelled,
                        message: e.to_string(),
                    }
                };
                (id, Some(error))
            }
        };

        let item = self.items.remove(&id);
        self.progress.inc(1);

        match outcome {
            None => self.summary.succeeded += 1,
            Some(error) => {
                self.summary.failed += 1;
                log::trace!("Operation {}: {}", error.kind, error.message);
                if let Some(item) = item {
                    self.summary.failures.push(OperationFailure { item, error });
                }
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "operation panicked".to_string())
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::{Duration, Instant};

    use super::*;

    #[derive(Debug, thiserror::Error)]
    #[error("{0}")]
    struct TestError(String);

    /// Serves fixed pages; the cursor is the index of the next page.
    struct VecSource {
        pages: Vec<Vec<&'static str>>,
        fail_on_call: Option<usize>,
        calls: Mutex<Vec<Option<usize>>>,
    }

    impl VecSource {
        fn new(pages: Vec<Vec<&'static str>>) -> Self {
            Self {
                pages,
                fail_on_call: None,
                calls: Mutex::new(Vec::new()),
            }
        }

        fn failing_on(mut self, call: usize) -> Self {
            self.fail_on_call = Some(call);
            self
        }
    }

    impl PageSource for VecSource {
        type Item = String;
        type Cursor = usize;
        type Error = TestError;

        async fn list_page(
            &self,
            cursor: Option<usize>,
        ) -> Result<Page<String, usize>, TestError> {
            let call = {
                let mut calls = self.calls.lock().unwrap();
                calls.push(cursor);
                calls.len()
            };
            if self.fail_on_call == Some(call) {
                return Err(TestError("listing unavailable".to_string()));
            }

            let index = cursor.unwrap_or(0);
            let items = self.pages[index].iter().map(ToString::to_string).collect();
            if index + 1 < self.pages.len() {
                Ok(Page::more(items, index + 1))
            } else {
                Ok(Page::last(items))
            }
        }
    }

    /// Shared instrumentation for an operation.
    #[derive(Default)]
    struct Tracker {
        current: AtomicUsize,
        max: AtomicUsize,
        calls: Mutex<Vec<String>>,
    }

    impl Tracker {
        fn enter(&self, item: &str) {
            self.calls.lock().unwrap().push(item.to_string());
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.max.fetch_max(now, Ordering::SeqCst);
        }

        fn exit(&self) {
            self.current.fetch_sub(1, Ordering::SeqCst);
        }

        fn sorted_calls(&self) -> Vec<String> {
            let mut calls = self.calls.lock().unwrap().clone();
            calls.sort();
            calls
        }
    }

    fn tracked(
        tracker: &Arc<Tracker>,
        delay: Duration,
        failing: &[&str],
    ) -> impl Operation<String, Error = TestError> {
        let tracker = Arc::clone(tracker);
        let failing: Arc<HashSet<String>> =
            Arc::new(failing.iter().map(ToString::to_string).collect());
        from_fn(move |item: String| {
            let tracker = Arc::clone(&tracker);
            let failing = Arc::clone(&failing);
            async move {
                tracker.enter(&item);
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                tracker.exit();
                if failing.contains(&item) {
                    Err(TestError("boom".to_string()))
                } else {
                    Ok(())
                }
            }
        })
    }

    #[tokio::test]
    async fn runs_every_item_across_pages_exactly_once() {
        let source = VecSource::new(vec![vec!["A", "B", "C"], vec!["D", "E"]]);
        let tracker = Arc::new(Tracker::default());

        let summary = BatchDriver::new(3)
            .run(&source, tracked(&tracker, Duration::ZERO, &[]))
            .await
            .unwrap();

        assert_eq!(summary.submitted, 5);
        assert_eq!(summary.succeeded, 5);
        assert_eq!(summary.failed, 0);
        assert!(summary.is_clean());
        assert_eq!(tracker.sorted_calls(), vec!["A", "B", "C", "D", "E"]);
    }

    #[tokio::test]
    async fn passes_each_cursor_to_the_following_call() {
        let source = VecSource::new(vec![vec!["A"], vec!["B"], vec!["C"]]);
        let tracker = Arc::new(Tracker::default());

        BatchDriver::new(1)
            .run(&source, tracked(&tracker, Duration::ZERO, &[]))
            .await
            .unwrap();

        assert_eq!(*source.calls.lock().unwrap(), vec![None, Some(1), Some(2)]);
    }

    #[tokio::test]
    async fn records_failure_and_keeps_going() {
        let source = VecSource::new(vec![vec!["A", "B", "C", "D"]]);
        let tracker = Arc::new(Tracker::default());

        let summary = BatchDriver::new(2)
            .run(&source, tracked(&tracker, Duration::from_millis(5), &["B"]))
            .await
            .unwrap();

        assert_eq!(summary.submitted, 4);
        assert_eq!(summary.succeeded, 3);
        assert_eq!(summary.failed, 1);
        let failures: Vec<_> = summary
            .failure_messages()
            .map(|(item, msg)| (item.clone(), msg.to_string()))
            .collect();
        assert_eq!(failures, vec![("B".to_string(), "boom".to_string())]);
        assert_eq!(summary.failures[0].error.kind, FailureKind::Failed);
    }

    #[tokio::test]
    async fn every_item_failing_still_processes_whole_listing() {
        let source = VecSource::new(vec![vec!["A", "B"], vec!["C"], vec!["D", "E", "F"]]);
        let tracker = Arc::new(Tracker::default());
        let all = ["A", "B", "C", "D", "E", "F"];

        let summary = BatchDriver::new(4)
            .run(&source, tracked(&tracker, Duration::ZERO, &all))
            .await
            .unwrap();

        assert_eq!(summary.submitted, 6);
        assert_eq!(summary.failed, summary.submitted);
        assert_eq!(summary.succeeded, 0);
        assert_eq!(summary.failures.len(), 6);
        assert_eq!(tracker.sorted_calls(), all);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn never_exceeds_parallelism() {
        let pages = vec![
            vec!["a", "b", "c", "d", "e", "f", "g"],
            vec!["h", "i", "j", "k", "l"],
            vec!["m", "n", "o", "p", "q", "r", "s", "t"],
        ];
        let source = VecSource::new(pages);
        let tracker = Arc::new(Tracker::default());

        let summary = BatchDriver::new(3)
            .run(&source, tracked(&tracker, Duration::from_millis(20), &[]))
            .await
            .unwrap();

        assert_eq!(summary.succeeded, 20);
        let max = tracker.max.load(Ordering::SeqCst);
        assert!(max <= 3, "observed {max} concurrent operations");
        assert!(max >= 2, "operations never overlapped (max {max})");
        assert_eq!(tracker.current.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn returns_only_after_slow_operation_settles() {
        let source = VecSource::new(vec![vec!["fast", "slow"]]);
        let finished = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&finished);

        let operation = from_fn(move |item: String| {
            let flag = Arc::clone(&flag);
            async move {
                if item == "slow" {
                    tokio::time::sleep(Duration::from_millis(200)).await;
                    flag.store(true, Ordering::SeqCst);
                }
                Ok::<(), TestError>(())
            }
        });

        let start = Instant::now();
        let summary = BatchDriver::new(2).run(&source, operation).await.unwrap();

        assert!(finished.load(Ordering::SeqCst));
        assert!(start.elapsed() >= Duration::from_millis(200));
        assert_eq!(summary.succeeded, 2);
    }

    #[tokio::test]
    async fn listing_error_propagates_with_first_page_outcomes() {
        let source = VecSource::new(vec![vec!["A", "B", "C"], vec!["D", "E"]]).failing_on(2);
        let tracker = Arc::new(Tracker::default());

        let err = BatchDriver::new(2)
            .run(&source, tracked(&tracker, Duration::from_millis(5), &["C"]))
            .await
            .unwrap_err();

        let BatchError::Listing { source: e, summary } = err else {
            panic!("expected a listing error");
        };
        assert_eq!(e.to_string(), "listing unavailable");
        assert_eq!(summary.submitted, 3);
        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(tracker.sorted_calls(), vec!["A", "B", "C"]);
        assert_eq!(tracker.current.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn listing_error_on_first_call_runs_nothing() {
        let source = VecSource::new(vec![vec!["A"]]).failing_on(1);
        let tracker = Arc::new(Tracker::default());

        let err = BatchDriver::new(1)
            .run(&source, tracked(&tracker, Duration::ZERO, &[]))
            .await
            .unwrap_err();

        assert!(matches!(err, BatchError::Listing { ref summary, .. } if summary.submitted == 0));
        assert!(tracker.sorted_calls().is_empty());
    }

    #[tokio::test]
    async fn zero_parallelism_is_rejected_before_listing() {
        let source = VecSource::new(vec![vec!["A"]]);
        let tracker = Arc::new(Tracker::default());

        let err = BatchDriver::new(0)
            .run(&source, tracked(&tracker, Duration::ZERO, &[]))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            BatchError::Configuration { parallelism: 0, .. }
        ));
        assert!(source.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn panicking_operation_is_recorded() {
        let source = VecSource::new(vec![vec!["ok", "bad"]]);
        let operation = from_fn(|item: String| async move {
            assert!(item != "bad", "cannot handle {item}");
            Ok::<(), TestError>(())
        });

        let summary = BatchDriver::new(2).run(&source, operation).await.unwrap();

        assert_eq!(summary.succeeded, 1);
        assert_eq!(summary.failed, 1);
        let failure = &summary.failures[0];
        assert_eq!(failure.item, "bad");
        assert_eq!(failure.error.kind, FailureKind::Panicked);
        assert_eq!(failure.error.message, "cannot handle bad");
    }

    #[tokio::test]
    async fn duplicate_items_run_twice() {
        let source = VecSource::new(vec![vec!["A", "B"], vec!["B"]]);
        let tracker = Arc::new(Tracker::default());

        let summary = BatchDriver::new(2)
            .run(&source, tracked(&tracker, Duration::ZERO, &[]))
            .await
            .unwrap();

        assert_eq!(summary.submitted, 3);
        assert_eq!(tracker.sorted_calls(), vec!["A", "B", "B"]);
    }

    #[tokio::test]
    async fn empty_listing_yields_empty_summary() {
        let source = VecSource::new(vec![vec![]]);
        let tracker = Arc::new(Tracker::default());

        let summary = BatchDriver::new(5)
            .run(&source, tracked(&tracker, Duration::ZERO, &[]))
            .await
            .unwrap();

        assert_eq!(summary.submitted, 0);
        assert_eq!(summary.to_string(), "0 submitted, 0 succeeded, 0 failed");
    }

    #[tokio::test]
    async fn reports_progress_per_settled_operation() {
        #[derive(Default)]
        struct Counting {
            total: AtomicUsize,
            done: AtomicUsize,
        }

        impl ProgressCallback for Counting {
            fn set_total(&self, total: u64) {
                self.total.store(usize::try_from(total).unwrap(), Ordering::SeqCst);
            }
            fn inc(&self, delta: u64) {
                self.done
                    .fetch_add(usize::try_from(delta).unwrap(), Ordering::SeqCst);
            }
            fn set_message(&self, _msg: String) {}
            fn finish(&self, _msg: String) {}
            fn finish_and_clear(&self) {}
        }

        let source = VecSource::new(vec![vec!["A", "B"], vec!["C"]]);
        let tracker = Arc::new(Tracker::default());
        let progress = Arc::new(Counting::default());

        BatchDriver::new(2)
            .with_progress(progress.clone())
            .run(&source, tracked(&tracker, Duration::ZERO, &["C"]))
            .await
            .unwrap();

        assert_eq!(progress.total.load(Ordering::SeqCst), 3);
        assert_eq!(progress.done.load(Ordering::SeqCst), 3);
    }
}
