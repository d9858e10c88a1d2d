//! The resumable merge driver.
//!
//! A merge run moves through the following states:
//!
//! ```text
//! NotStarted ──▶ Running ──▶ Completed
//!                  │  ▲
//!                  ▼  │ resume
//!           Failed / Paused
//! ```
//!
//! The driver merges the raw ORFs that are not part of any association yet,
//! in batches of ascending identifiers. Each batch is committed on its own
//! together with a [`Checkpoint`] recording the last raw ORF of the batch, so
//! a failure in one batch keeps every earlier batch. Cancellation is only
//! checked between batches.

use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use serde::Deserialize;
use serde::Serialize;
use tracing::error;
use tracing::info;
use tracing::warn;

use crate::merge;
use crate::merge::Engine;
use crate::merge::Report;
use crate::merge::Services;
use crate::orf::RawOrfId;
use crate::store;
use crate::store::Store;
use crate::workers::Workers;

/// The default number of raw ORFs per batch.
pub const DEFAULT_BATCH_SIZE: usize = 500;

/// The state of a merge run.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunState {
    /// No run has been started.
    #[default]
    NotStarted,

    /// A run is in progress (or the process running it died).
    Running,

    /// The last run merged everything it set out to.
    Completed,

    /// The last run stopped on a storage error.
    Failed,

    /// The last run was cancelled between batches.
    Paused,
}

impl RunState {
    /// Whether or not a run in this state can be resumed.
    pub fn is_resumable(&self) -> bool {
        matches!(self, RunState::Failed | RunState::Paused)
    }
}

impl std::fmt::Display for RunState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunState::NotStarted => write!(f, "NOT_STARTED"),
            RunState::Running => write!(f, "RUNNING"),
            RunState::Completed => write!(f, "COMPLETED"),
            RunState::Failed => write!(f, "FAILED"),
            RunState::Paused => write!(f, "PAUSED"),
        }
    }
}

/// The recorded progress of a merge run.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct Checkpoint {
    /// The state of the run.
    pub state: RunState,

    /// The last raw ORF of the last committed batch.
    pub last_committed: Option<RawOrfId>,

    /// The number of batches committed.
    pub batches: u64,

    /// The number of raw ORFs merged.
    pub merged: u64,

    /// The error that failed the run.
    #[serde(default)]
    pub error: Option<String>,
}

impl std::fmt::Display for Checkpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} after {} batches ({} raw ORFs merged",
            self.state, self.batches, self.merged
        )?;

        if let Some(last) = self.last_committed {
            write!(f, ", last committed {last}")?;
        }

        write!(f, ")")?;

        if let Some(err) = &self.error {
            write!(f, ": {err}")?;
        }

        Ok(())
    }
}

/// A handle for cancelling a run between batches.
///
/// Clones share the same flag, so one clone can be handed to a signal
/// handler while the driver holds another.
#[derive(Clone, Debug, Default)]
pub struct Cancellation(Arc<AtomicBool>);

impl Cancellation {
    /// Requests cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether or not cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Clears a cancellation request.
    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// An error related to a merge run.
#[derive(Debug)]
pub enum Error {
    /// The requested transition is not allowed from the recorded state.
    InvalidTransition(RunState, &'static str),

    /// The batch size is zero.
    InvalidBatchSize,

    /// A storage error stopped the run. The run is left [`RunState::Failed`]
    /// and can be resumed.
    Storage(store::Error),
}

impl Error {
    /// Whether or not the run can be resumed after this error.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Storage(_))
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::InvalidTransition(state, hint) => {
                write!(f, "the last merge run is {state}: {hint}")
            }
            Error::InvalidBatchSize => write!(f, "the batch size must be at least one"),
            Error::Storage(err) => write!(f, "merge run failed (resumable): {err}"),
        }
    }
}

impl std::error::Error for Error {}

/// A [`Result`](std::result::Result) with an [`Error`].
type Result<T> = std::result::Result<T, Error>;

/// The result of a merge run that did not fail.
#[derive(Clone, Debug, PartialEq)]
pub struct Run {
    /// The final checkpoint (either completed or paused).
    pub checkpoint: Checkpoint,

    /// The tallies of the run.
    pub report: Report,
}

/// Gets the checkpoint recorded in the store.
pub fn status<S>(store: &S) -> store::Result<Checkpoint>
where
    S: Store + ?Sized,
{
    Ok(store.checkpoint()?.unwrap_or_default())
}

/// Drives merge runs over a store.
pub struct Driver<'a, S>
where
    S: Store,
{
    /// The store.
    store: &'a mut S,

    /// The external services.
    services: Services<'a>,

    /// The worker pool.
    workers: &'a Workers,

    /// The number of raw ORFs per batch.
    batch_size: usize,

    /// The cancellation handle.
    cancellation: Cancellation,
}

impl<S> std::fmt::Debug for Driver<'_, S>
where
    S: Store,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Driver")
            .field("batch_size", &self.batch_size)
            .field("cancellation", &self.cancellation)
            .finish_non_exhaustive()
    }
}

impl<'a, S> Driver<'a, S>
where
    S: Store,
{
    /// Creates a new [`Driver`] with the default batch size.
    pub fn new(store: &'a mut S, services: Services<'a>, workers: &'a Workers) -> Self {
        Self {
            store,
            services,
            workers,
            batch_size: DEFAULT_BATCH_SIZE,
            cancellation: Cancellation::default(),
        }
    }

    /// Sets the batch size.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    /// Sets the cancellation handle.
    pub fn with_cancellation(mut self, cancellation: Cancellation) -> Self {
        self.cancellation = cancellation;
        self
    }

    /// Gets the checkpoint recorded in the store.
    pub fn status(&self) -> Result<Checkpoint> {
        status(&*self.store).map_err(Error::Storage)
    }

    /// Starts a new run over every unmerged raw ORF.
    ///
    /// A run can only be started when no run is pending: a failed, paused, or
    /// interrupted run must be resumed first.
    pub fn run(&mut self) -> Result<Run> {
        let previous = self.status()?;

        match previous.state {
            RunState::NotStarted | RunState::Completed => {}
            state => {
                return Err(Error::InvalidTransition(
                    state,
                    "resume it before starting a new run",
                ))
            }
        }

        let pending = self.store.unmerged().map_err(Error::Storage)?;
        info!("starting a merge run over {} unmerged raw ORFs", pending.len());

        self.drive(Checkpoint::default(), pending)
    }

    /// Resumes a failed or paused run after its last committed batch.
    ///
    /// A run left [`RunState::Running`] belongs to a process that died and is
    /// treated as failed.
    pub fn resume(&mut self) -> Result<Run> {
        let mut previous = self.status()?;

        if previous.state == RunState::Running {
            warn!("the last merge run did not finish; treating it as failed");
            previous.state = RunState::Failed;
        }

        if !previous.state.is_resumable() {
            return Err(Error::InvalidTransition(
                previous.state,
                "there is nothing to resume",
            ));
        }

        let pending = self
            .store
            .unmerged()
            .map_err(Error::Storage)?
            .into_iter()
            .filter(|id| previous.last_committed.map_or(true, |last| *id > last))
            .collect::<Vec<_>>();

        info!(
            "resuming the merge run after {} batches with {} raw ORFs left",
            previous.batches,
            pending.len()
        );

        self.drive(previous, pending)
    }

    /// Merges `pending` in batches, starting from `checkpoint`.
    fn drive(&mut self, mut checkpoint: Checkpoint, pending: Vec<RawOrfId>) -> Result<Run> {
        if self.batch_size == 0 {
            return Err(Error::InvalidBatchSize);
        }

        checkpoint.state = RunState::Running;
        checkpoint.error = None;
        self.store
            .save_checkpoint(checkpoint.clone())
            .map_err(Error::Storage)?;

        let mut engine = Engine::new();
        let mut report = Report::default();

        for batch in pending.chunks(self.batch_size) {
            if self.cancellation.is_cancelled() {
                checkpoint.state = RunState::Paused;
                self.store
                    .save_checkpoint(checkpoint.clone())
                    .map_err(Error::Storage)?;

                info!("merge run paused: {checkpoint}");
                report.add(engine.report());
                return Ok(Run { checkpoint, report });
            }

            match self.merge_batch(&mut engine, &checkpoint, batch) {
                Ok((next, committed)) => {
                    report.record(&committed);
                    checkpoint = next;

                    info!(
                        "committed batch {} ({} merged, {} new ORFs)",
                        checkpoint.batches, committed.merged, committed.created
                    );
                }
                Err(err) => {
                    checkpoint.state = RunState::Failed;
                    checkpoint.error = Some(err.to_string());
                    error!("merge run failed: {checkpoint}");

                    if let Err(save) = self.store.save_checkpoint(checkpoint.clone()) {
                        error!("could not record the failed run: {save}");
                    }

                    return Err(Error::Storage(err));
                }
            }
        }

        checkpoint.state = RunState::Completed;
        self.store
            .save_checkpoint(checkpoint.clone())
            .map_err(Error::Storage)?;

        report.add(engine.report());
        info!("merge run completed: {report}");

        Ok(Run { checkpoint, report })
    }

    /// Prepares, stages, and commits one batch. Returns the checkpoint that
    /// was committed with it.
    fn merge_batch(
        &mut self,
        engine: &mut Engine,
        checkpoint: &Checkpoint,
        batch: &[RawOrfId],
    ) -> store::Result<(Checkpoint, store::Committed)> {
        let mut raws = Vec::with_capacity(batch.len());

        for id in batch {
            match self.store.raw(*id)? {
                Some(raw) => raws.push(raw),
                None => warn!("{id} disappeared before it could be merged"),
            }
        }

        let store = &*self.store;
        let services = &self.services;
        let prepared = self
            .workers
            .install(|| merge::prepare(store, services, &raws))?;

        let mut changes = engine.stage(prepared);

        // Raw ORFs merged by an earlier commit are skipped by this one.
        let mut merging = 0;
        for contribution in &changes.contributions {
            if self.store.merged_into(contribution.raw)?.is_none() {
                merging += 1;
            }
        }

        let next = Checkpoint {
            state: RunState::Running,
            last_committed: batch.last().copied().or(checkpoint.last_committed),
            batches: checkpoint.batches + 1,
            merged: checkpoint.merged + merging,
            error: None,
        };
        changes.checkpoint = Some(next.clone());

        let policy = self.services.policy;
        let committed = policy.run("commit", || self.store.commit(changes.clone()))?;

        Ok((next, committed))
    }
}
