//! Runs a listing through the batch driver with a progress bar and logs the
//! outcome.

use std::error::Error;
use std::fmt::Display;
use std::sync::Arc;

use oss_batch::{BatchDriver, BatchError, BatchSummary, Operation, PageSource};
use oss_batch_cli_utils::{IndicatifProgress, MultiProgress};

/// Runs `operation` over every item of `listing` with at most `parallelism`
/// operations at once.
///
/// Returns the number of failed items.
///
/// # Errors
///
/// Returns an error for an invalid parallelism or a failed listing. In the
/// latter case the outcomes of the items dispatched before the failure are
/// logged first.
pub async fn run_batch<S, O>(
    multi: &MultiProgress,
    label: &str,
    parallelism: usize,
    listing: &S,
    operation: O,
) -> Result<u64, Box<dyn Error>>
where
    S: PageSource,
    S::Item: Display,
    O: Operation<S::Item>,
{
    let progress = IndicatifProgress::batch_bar(multi, label);
    let driver = BatchDriver::new(parallelism).with_progress(Arc::clone(&progress));

    match driver.run(listing, operation).await {
        Ok(summary) => {
            progress.finish(format!("{label}: {summary}"));
            log_summary(label, &summary);
            Ok(summary.failed)
        }
        Err(BatchError::Listing { source, summary }) => {
            progress.finish_and_clear();
            log_summary(label, &summary);
            Err(format!("{label}: listing failed: {source}").into())
        }
        Err(e @ BatchError::Configuration { .. }) => {
            progress.finish_and_clear();
            Err(e.to_string().into())
        }
    }
}

fn log_summary<I: Display>(label: &str, summary: &BatchSummary<I>) {
    if summary.is_clean() {
        log::info!("{label}: {summary}");
        return;
    }

    log::error!("{label}: {summary}");
    for failure in &summary.failures {
        log::error!(
            "  {} {}: {}",
            failure.item,
            failure.error.kind,
            failure.error.message
        );
    }
}

#[cfg(test)]
mod tests {
    use oss_batch::Page;

    use super::*;

    struct Letters {
        fail_listing: bool,
    }

    #[derive(Debug)]
    struct ListingDown;

    impl Display for ListingDown {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.write_str("listing down")
        }
    }

    impl Error for ListingDown {}

    impl PageSource for Letters {
        type Item = String;
        type Cursor = ();
        type Error = ListingDown;

        async fn list_page(&self, cursor: Option<()>) -> Result<Page<String, ()>, ListingDown> {
            match cursor {
                None => Ok(Page::more(vec!["a".to_string(), "b".to_string()], ())),
                Some(()) if self.fail_listing => Err(ListingDown),
                Some(()) => Ok(Page::last(vec!["c".to_string()])),
            }
        }
    }

    fn fail_on_b() -> impl Operation<String> {
        oss_batch::from_fn(|item: String| async move {
            if item == "b" {
                Err(format!("cannot process {item}"))
            } else {
                Ok(())
            }
        })
    }

    #[tokio::test]
    async fn returns_failed_count() {
        let multi = MultiProgress::new();
        let listing = Letters {
            fail_listing: false,
        };

        let failed = run_batch(&multi, "test", 2, &listing, fail_on_b())
            .await
            .unwrap();

        assert_eq!(failed, 1);
    }

    #[tokio::test]
    async fn listing_failure_is_an_error() {
        let multi = MultiProgress::new();
        let listing = Letters { fail_listing: true };

        let err = run_batch(&multi, "test", 2, &listing, fail_on_b())
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "test: listing failed: listing down");
    }

    #[tokio::test]
    async fn zero_parallelism_is_an_error() {
        let multi = MultiProgress::new();
        let listing = Letters {
            fail_listing: false,
        };

        let err = run_batch(&multi, "test", 0, &listing, fail_on_b())
            .await
            .unwrap_err();

        assert!(err.to_string().starts_with("Invalid parallelism 0"));
    }
}
