//! Query to canonical form, through the labeling pool.

use super::colored::ColoredGraph;
use super::form::CanonForm;
use super::labeler::{CanonicalLabeler, RefinementLabeler};
use super::pool::{LabelingPool, LabelingPoolConfig, LabelingTask};
use crate::cpq::{Cpq, QueryGraph};
use crate::primitives::LABELING_QUEUE_PER_WORKER;
use crate::IndexError;
use std::sync::Arc;
use std::time::Duration;

/// A canonicalization request in flight.
pub struct PendingCanon {
    graph: ColoredGraph,
    task: LabelingTask,
}

impl PendingCanon {
    /// Ask the pool to drop the request.
    pub fn cancel(&self) {
        self.task.cancel();
    }

    /// True once the labeling has finished.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.task.is_done()
    }

    /// Wait for the labeling and build the form.
    pub fn resolve(self, timeout: Option<Duration>) -> Result<CanonForm, IndexError> {
        let relabeling = match timeout {
            Some(timeout) => {
                let result = self.task.wait_timeout(timeout);
                if result.is_err() {
                    self.task.cancel();
                }
                result?
            }
            None => self.task.wait()?,
        };
        CanonForm::from_labeling(&self.graph, &relabeling)
    }
}

/// Computes canonical forms of queries.
pub struct CanonEngine {
    pool: LabelingPool,
    timeout: Option<Duration>,
}

impl CanonEngine {
    /// Engine over an existing pool; `timeout` bounds every wait.
    #[must_use]
    pub fn new(pool: LabelingPool, timeout: Option<Duration>) -> Self {
        Self { pool, timeout }
    }

    /// Engine with the built-in labeler on `threads` workers (`0` = all CPUs).
    pub fn with_threads(threads: usize, timeout: Option<Duration>) -> Result<Self, IndexError> {
        let labeler: Arc<dyn CanonicalLabeler> = Arc::new(RefinementLabeler);
        let pool = LabelingPool::new(LabelingPoolConfig::with_threads(threads), labeler)?;
        Ok(Self::new(pool, timeout))
    }

    /// The underlying pool.
    #[must_use]
    pub fn pool(&self) -> &LabelingPool {
        &self.pool
    }

    /// Start canonicalizing `cpq`.
    ///
    /// The query graph is retracted to its core first unless `is_core` says
    /// it already is one.
    pub fn submit(&self, cpq: &Cpq, is_core: bool) -> Result<PendingCanon, IndexError> {
        let query = cpq.to_query_graph();
        if is_core {
            self.submit_core(&query)
        } else {
            self.submit_core(&query.core())
        }
    }

    /// Start canonicalizing a query graph that is already a core.
    pub fn submit_core(&self, core: &QueryGraph) -> Result<PendingCanon, IndexError> {
        let graph = ColoredGraph::from_query_graph(core);
        let task = self
            .pool
            .submit(graph.adjacency().to_vec(), graph.color_encoding())?;
        Ok(PendingCanon { graph, task })
    }

    /// Canonicalize one query and wait for it.
    pub fn canonicalize(&self, cpq: &Cpq, is_core: bool) -> Result<CanonForm, IndexError> {
        self.submit(cpq, is_core)?.resolve(self.timeout)
    }

    /// Canonicalize a batch concurrently; results keep the input order.
    ///
    /// On the first failure the rest of the current window is cancelled and
    /// the error returned.
    pub fn canonicalize_all(
        &self,
        cpqs: &[Cpq],
        is_core: bool,
    ) -> Result<Vec<CanonForm>, IndexError> {
        self.resolve_windowed(cpqs, |cpq| self.submit(cpq, is_core))
    }

    /// Canonicalize a batch of retracted query graphs, in input order.
    pub fn canonicalize_cores(&self, cores: &[QueryGraph]) -> Result<Vec<CanonForm>, IndexError> {
        self.resolve_windowed(cores, |core| self.submit_core(core))
    }

    fn resolve_windowed<T, F>(&self, items: &[T], submit: F) -> Result<Vec<CanonForm>, IndexError>
    where
        F: Fn(&T) -> Result<PendingCanon, IndexError>,
    {
        let window = self
            .pool
            .threads()
            .saturating_mul(LABELING_QUEUE_PER_WORKER)
            .max(1);
        let mut forms = Vec::with_capacity(items.len());

        for chunk in items.chunks(window) {
            let mut pending = Vec::with_capacity(chunk.len());
            for item in chunk {
                match submit(item) {
                    Ok(request) => pending.push(request),
                    Err(e) => {
                        pending.iter().for_each(PendingCanon::cancel);
                        return Err(e);
                    }
                }
            }

            let mut requests = pending.into_iter();
            while let Some(request) = requests.next() {
                match request.resolve(self.timeout) {
                    Ok(form) => forms.push(form),
                    Err(e) => {
                        requests.for_each(|rest| rest.cancel());
                        return Err(e);
                    }
                }
            }
        }

        Ok(forms)
    }
}

// =============================================================================
// TESTS
// =============================================================================
