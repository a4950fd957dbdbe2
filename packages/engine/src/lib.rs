#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Concurrent resolve-and-write scheduler.
//!
//! Owns the pending-identifier set for a run. Each pass dispatches one task
//! per pending identifier — resolve, expand to partition keys, flatten,
//! append — through a [`buffer_unordered`] stream capped at the worker
//! budget. Completions arrive back in this module's single driving loop,
//! which is the only place the pending set is mutated, so no concurrent
//! set type is needed.
//!
//! An identifier leaves the pending set when its record has been written
//! (to state partitions, or to the `failed` partition after the resolver
//! exhausted its retries). A task that fails unexpectedly — resolver
//! error, malformed payload, write error — is logged and leaves its
//! identifier pending, to be retried on the next pass when loop-until-done
//! is enabled.
//!
//! [`buffer_unordered`]: futures::stream::StreamExt::buffer_unordered

use std::collections::BTreeSet;

use futures::stream::{self, StreamExt as _};
use npi_harvest_record::{FAILED_PARTITION, FlatRecord, flatten, partition_keys};
use npi_harvest_resolve::{ResolveError, ResolveOutcome, Resolver};
use npi_harvest_writer::{PartitionWriter, WriteError};

/// Scheduler configuration for one run.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Maximum number of simultaneously in-flight tasks.
    pub workers: usize,
    /// Whether to keep re-dispatching until the pending set is empty,
    /// or stop after a single pass.
    pub loop_until_done: bool,
}

impl EngineConfig {
    /// Creates a config with the default worker budget (200) and
    /// single-pass mode.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            workers: 200,
            loop_until_done: false,
        }
    }

    /// Sets the worker budget.
    #[must_use]
    pub const fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Enables or disables loop-until-done mode.
    #[must_use]
    pub const fn with_loop_until_done(mut self, enabled: bool) -> Self {
        self.loop_until_done = enabled;
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Counters and leftovers from a completed run.
#[derive(Debug, Default)]
pub struct RunStats {
    /// Identifiers resolved and written to state partitions.
    pub completed: u64,
    /// Identifiers that exhausted their retries and were recorded in the
    /// failed partition.
    pub routed_to_failed: u64,
    /// Number of dispatch/collect passes performed.
    pub passes: u64,
    /// Identifiers still pending when the run stopped. Empty in
    /// loop-until-done mode; in single-pass mode, exactly the identifiers
    /// whose task did not complete.
    pub pending: BTreeSet<String>,
}

impl std::fmt::Display for RunStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} resolved, {} routed to failed, {} still pending after {} pass(es)",
            self.completed,
            self.routed_to_failed,
            self.pending.len(),
            self.passes
        )
    }
}

/// How one task ended, when it ended in a modeled way.
enum TaskStatus {
    /// Payload resolved and written to every matching partition.
    Written,
    /// Retries exhausted; identifier recorded in the failed partition.
    RoutedToFailed,
}

/// Unexpected task failures. These never abort the run — the identifier
/// simply stays pending.
#[derive(Debug, thiserror::Error)]
enum TaskError {
    /// The resolver failed outside its modeled retry loop.
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    /// A successful response was not a JSON object.
    #[error("payload is not a JSON object")]
    MalformedPayload,

    /// Appending to a partition file failed.
    #[error(transparent)]
    Write(#[from] WriteError),
}

/// Runs the full dispatch/collect loop over the given identifiers.
///
/// The input is deduplicated into the pending set before the first pass.
/// Concurrency is capped at `config.workers` regardless of how many
/// identifiers are pending.
pub async fn run(
    resolver: &impl Resolver,
    writer: &PartitionWriter,
    config: &EngineConfig,
    identifiers: impl IntoIterator<Item = String>,
) -> RunStats {
    let mut pending: BTreeSet<String> = identifiers.into_iter().collect();
    let mut stats = RunStats::default();

    log::info!(
        "Dispatching {} identifier(s) across {} worker(s)",
        pending.len(),
        config.workers
    );

    while !pending.is_empty() {
        stats.passes += 1;

        let batch: Vec<String> = pending.iter().cloned().collect();
        let mut completions = stream::iter(batch.into_iter().map(|identifier| async move {
            let result = process_one(resolver, writer, &identifier).await;
            (identifier, result)
        }))
        .buffer_unordered(config.workers);

        // Sole collection point: completions are applied to the pending
        // set here, one at a time, as tasks finish.
        while let Some((identifier, result)) = completions.next().await {
            match result {
                Ok(TaskStatus::Written) => {
                    pending.remove(&identifier);
                    stats.completed += 1;
                }
                Ok(TaskStatus::RoutedToFailed) => {
                    pending.remove(&identifier);
                    stats.routed_to_failed += 1;
                }
                Err(e) => {
                    log::error!("Task for {identifier} failed: {e} (left pending)");
                }
            }
        }

        if !config.loop_until_done {
            break;
        }
        if !pending.is_empty() {
            log::info!(
                "Pass {} left {} identifier(s) pending, re-dispatching",
                stats.passes,
                pending.len()
            );
        }
    }

    stats.pending = pending;
    stats
}

/// One task: resolve the identifier, then write its record once per
/// distinct partition key — or record it in the failed partition if the
/// resolver exhausted its retries.
async fn process_one(
    resolver: &impl Resolver,
    writer: &PartitionWriter,
    identifier: &str,
) -> Result<TaskStatus, TaskError> {
    match resolver.resolve(identifier).await? {
        ResolveOutcome::Resolved(payload) => {
            let object = payload.as_object().ok_or(TaskError::MalformedPayload)?;
            let record = flatten(object);
            for key in partition_keys(object) {
                writer.append(&key, &record).await?;
            }
            Ok(TaskStatus::Written)
        }
        ResolveOutcome::Exhausted => {
            writer
                .append(FAILED_PARTITION, &FlatRecord::single("npi", identifier))
                .await?;
            Ok(TaskStatus::RoutedToFailed)
        }
    }
}
