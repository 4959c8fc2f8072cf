//! Batch execution engine.
//!
//! A run turns a list of identifiers into one [`BatchJob`] each, spawns one
//! task per job behind a [`ConcurrencyGate`], and consumes the results from
//! a fan-in channel in the order they finish. Every completion is appended
//! to the [`ResultTable`] and reported to the [`ProgressSink`] before the
//! next one is taken, so rows and progress updates follow completion order.

use futures::FutureExt;
use std::num::NonZeroUsize;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{info, warn};

use crate::address::{AddressRotator, AddressSource};
use crate::error::KnowMeError;
use crate::gate::ConcurrencyGate;
use crate::services::Classifier;
use crate::types::{
    BatchJob, Identifier, OutcomeKind, ProgressSink, ProgressState, ResultRow, ResultTable,
};

/// Runs batches of lookups against one service.
///
/// # Example
///
/// ```rust,no_run
/// use knowme_lib::{BatchRunner, DeudoresConfig, DeudoresService};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let service = DeudoresService::new(DeudoresConfig::new("https://example.test/consulta"))?;
///     let mut runner = BatchRunner::new(service);
///     let ids = vec!["1020304050".to_string(), "99887766".to_string()];
///
///     let table = runner
///         .run(&ids, |p: knowme_lib::ProgressState| eprintln!("{}", p))
///         .await?;
///     println!("{} rows", table.len());
///     Ok(())
/// }
/// ```
pub struct BatchRunner<C, A = AddressRotator> {
    classifier: Arc<C>,
    addresses: A,
}

impl<C: Classifier> BatchRunner<C> {
    /// Create a runner that draws synthetic addresses at random.
    pub fn new(classifier: C) -> Self {
        Self::with_address_source(classifier, AddressRotator::new())
    }
}

impl<C: Classifier, A: AddressSource> BatchRunner<C, A> {
    /// Create a runner with a custom address source.
    pub fn with_address_source(classifier: C, addresses: A) -> Self {
        Self {
            classifier: Arc::new(classifier),
            addresses,
        }
    }

    pub fn classifier(&self) -> &C {
        &self.classifier
    }

    /// Look up every identifier and return the rows in completion order.
    ///
    /// The returned table always has one row per input identifier. The
    /// only error is a failure to open the shared HTTP session, in which
    /// case nothing is looked up and no rows are returned.
    pub async fn run<P: ProgressSink>(
        &mut self,
        identifiers: &[Identifier],
        mut progress: P,
    ) -> Result<ResultTable<C::Row>, KnowMeError> {
        let total = identifiers.len();
        if total == 0 {
            return Ok(ResultTable::new());
        }

        let session = self.classifier.open_session()?;
        let gate = ConcurrencyGate::new(self.classifier.max_concurrent());
        let jobs = plan_jobs(
            identifiers,
            self.classifier.rotation_interval(),
            &mut self.addresses,
        );

        info!(
            service = self.classifier.name(),
            total,
            max_concurrent = gate.max_concurrent(),
            "starting batch"
        );
        let started = Instant::now();

        // Tasks are owned by the run; dropping the run aborts them.
        let mut tasks = JoinSet::new();
        let (tx, mut rx) = mpsc::unbounded_channel::<C::Row>();
        for job in jobs {
            let tx = tx.clone();
            let gate = gate.clone();
            let classifier = Arc::clone(&self.classifier);
            let session = session.clone();

            tasks.spawn(async move {
                let row = execute_job(classifier.as_ref(), &session, &gate, job).await;
                let _ = tx.send(row);
            });
        }
        drop(tx);

        let mut table = ResultTable::with_capacity(total);
        let mut completed = 0;
        while let Some(row) = rx.recv().await {
            table.push(row);
            completed += 1;
            progress.on_progress(ProgressState { completed, total });
        }
        while tasks.join_next().await.is_some() {}

        if completed != total {
            return Err(KnowMeError::internal(format!(
                "batch ended with {} of {} lookups completed",
                completed, total
            )));
        }

        info!(
            service = self.classifier.name(),
            total,
            success = table.count(OutcomeKind::Success),
            unavailable = table.count(OutcomeKind::Unavailable),
            errors = table.count(OutcomeKind::Error),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "batch finished"
        );

        Ok(table)
    }
}

/// Admit, classify, release. Never fails: a panicking classifier still
/// yields an error row for its identifier.
async fn execute_job<C: Classifier>(
    classifier: &C,
    session: &reqwest::Client,
    gate: &ConcurrencyGate,
    job: BatchJob,
) -> C::Row {
    let identifier = job.identifier.clone();

    let _admission = match gate.admit().await {
        Ok(admission) => admission,
        Err(e) => {
            warn!(identifier = %identifier, error = %e, "lookup not admitted");
            return C::Row::failed(identifier);
        }
    };

    match AssertUnwindSafe(classifier.classify(session, job))
        .catch_unwind()
        .await
    {
        Ok(row) => row,
        Err(_) => {
            warn!(
                service = classifier.name(),
                identifier = %identifier,
                "classifier panicked"
            );
            C::Row::failed(identifier)
        }
    }
}

/// Pair every identifier with its synthetic address.
///
/// With an interval of `k`, a new address is drawn at positions 0, k, 2k, …
/// and shared by the whole block. Without an interval no address is drawn.
pub fn plan_jobs<S: AddressSource + ?Sized>(
    identifiers: &[Identifier],
    interval: Option<NonZeroUsize>,
    addresses: &mut S,
) -> Vec<BatchJob> {
    let mut current = None;
    identifiers
        .iter()
        .enumerate()
        .map(|(idx, identifier)| {
            if let Some(interval) = interval {
                if idx % interval.get() == 0 {
                    current = Some(addresses.next_address());
                }
            }
            BatchJob::new(identifier.clone(), current)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SyntheticAddress;

    fn ids(n: usize) -> Vec<Identifier> {
        (0..n).map(|i| format!("doc-{}", i)).collect()
    }

    fn counting_source() -> impl AddressSource {
        let mut n: u32 = 0;
        move || {
            n += 1;
            SyntheticAddress::new(n.to_be_bytes())
        }
    }

    #[test]
    fn test_plan_jobs_rotates_per_block() {
        let mut source = counting_source();
        let jobs = plan_jobs(&ids(7), NonZeroUsize::new(3), &mut source);

        let addrs: Vec<_> = jobs.iter().map(|j| j.address.unwrap()).collect();
        assert_eq!(addrs[0], addrs[1]);
        assert_eq!(addrs[1], addrs[2]);
        assert_ne!(addrs[2], addrs[3]);
        assert_eq!(addrs[3], addrs[5]);
        assert_ne!(addrs[5], addrs[6]);
        assert_eq!(addrs[6], SyntheticAddress::new([0, 0, 0, 3]));
    }

    #[test]
    fn test_plan_jobs_without_rotation() {
        let mut source = counting_source();
        let jobs = plan_jobs(&ids(4), None, &mut source);
        assert!(jobs.iter().all(|j| j.address.is_none()));
        assert_eq!(source.next_address(), SyntheticAddress::new([0, 0, 0, 1]));
    }

    #[test]
    fn test_plan_jobs_keeps_input_order_and_duplicates() {
        let input = vec!["a".to_string(), "b".to_string(), "a".to_string()];
        let jobs = plan_jobs(&input, NonZeroUsize::new(1), &mut counting_source());
        let order: Vec<_> = jobs.iter().map(|j| j.identifier.as_str()).collect();
        assert_eq!(order, vec!["a", "b", "a"]);
        // Interval of one draws a new address for every job.
        assert_ne!(jobs[0].address, jobs[2].address);
    }
}
