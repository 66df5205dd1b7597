//! # Progress Reporting
//!
//! Lifecycle notifications emitted during index construction.
//!
//! Listeners are pure observers: nothing they do can change the result.
//! Layer numbers are 1-based (layer `k` holds paths of length `k`).

/// Receives construction progress. Every method defaults to a no-op.
pub trait ProgressListener {
    /// Partitioning of layer `k` started.
    fn partition_start(&self, _k: usize) {}

    /// Partitioning of layer `k` finished.
    fn partition_end(&self, _k: usize) {}

    /// Joining segments of layers `k1` and `k2` started.
    fn combination_start(&self, _k1: usize, _k2: usize) {}

    /// Joining segments of layers `k1` and `k2` finished.
    fn combination_end(&self, _k1: usize, _k2: usize) {}

    /// Block construction for layer `k` started.
    fn blocks_start(&self, _k: usize) {}

    /// Block construction for layer `k` finished.
    fn blocks_end(&self, _k: usize) {}

    /// Core computation for layer `k` started.
    fn cores_start(&self, _k: usize) {}

    /// Core computation for layer `k` finished.
    fn cores_end(&self, _k: usize) {}

    /// `done` of `total` blocks in the current layer have their cores.
    fn cores_blocks_done(&self, _done: usize, _total: usize) {}

    /// Building the core to block map started.
    fn map_start(&self) {}

    /// Building the core to block map finished.
    fn map_end(&self) {}
}

/// Ignores all progress.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressListener for NoProgress {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[derive(Default)]
    struct Recorder {
        events: RefCell<Vec<String>>,
    }

    impl ProgressListener for Recorder {
        fn partition_start(&self, k: usize) {
            self.events.borrow_mut().push(format!("start {}", k));
        }
    }

    #[test]
    fn unimplemented_events_are_ignored() {
        let recorder = Recorder::default();
        let listener: &dyn ProgressListener = &recorder;
        listener.partition_start(1);
        listener.partition_end(1);
        listener.map_start();
        assert_eq!(*recorder.events.borrow(), vec!["start 1".to_string()]);

        NoProgress.cores_blocks_done(1, 2);
    }
}
