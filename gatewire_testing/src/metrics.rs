//! Capture of metrics emitted while a closure runs.
//!
//! The engine's pumps run as tokio tasks, so [`MetricsCapture::run`] drives
//! the future on a current-thread runtime created inside the local-recorder
//! scope. Every task spawned by the future then reports to the capture.

use std::future::Future;

use metrics_util::debugging::{DebugValue, DebuggingRecorder, Snapshotter};

/// A debugging recorder paired with its snapshotter.
pub struct MetricsCapture {
    recorder: DebuggingRecorder,
    snapshotter: Snapshotter,
}

impl MetricsCapture {
    /// Create an empty capture.
    #[must_use]
    pub fn new() -> Self {
        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();
        Self {
            recorder,
            snapshotter,
        }
    }

    /// Run `fut` to completion with this capture as the thread's recorder.
    ///
    /// # Panics
    ///
    /// Panics if the runtime cannot be built.
    pub fn run<F: Future>(&self, fut: F) -> F::Output {
        metrics::with_local_recorder(&self.recorder, || {
            tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .expect("failed to build test runtime")
                .block_on(fut)
        })
    }

    /// Sum of every counter named `name` whose labels include all of
    /// `labels`.
    #[must_use]
    pub fn counter(&self, name: &str, labels: &[(&str, &str)]) -> u64 {
        counter_value(&self.snapshotter, name, labels)
    }

    /// Last value of the gauge named `name`, if recorded.
    #[must_use]
    pub fn gauge(&self, name: &str) -> Option<f64> {
        self.snapshotter
            .snapshot()
            .into_vec()
            .into_iter()
            .find_map(|(key, _, _, value)| match value {
                DebugValue::Gauge(g) if key.key().name() == name => Some(g.into_inner()),
                _ => None,
            })
    }

    /// Every sample recorded into the histogram named `name`.
    #[must_use]
    pub fn histogram(&self, name: &str) -> Vec<f64> {
        self.snapshotter
            .snapshot()
            .into_vec()
            .into_iter()
            .filter(|(key, _, _, _)| key.key().name() == name)
            .flat_map(|(_, _, _, value)| match value {
                DebugValue::Histogram(samples) => {
                    samples.into_iter().map(|s| s.into_inner()).collect()
                }
                _ => Vec::new(),
            })
            .collect()
    }
}

impl Default for MetricsCapture {
    fn default() -> Self { Self::new() }
}

/// Sum of the counters matching `name` and `labels` in a fresh snapshot.
#[must_use]
pub fn counter_value(snapshotter: &Snapshotter, name: &str, labels: &[(&str, &str)]) -> u64 {
    snapshotter
        .snapshot()
        .into_vec()
        .into_iter()
        .filter(|(key, _, _, _)| {
            key.key().name() == name
                && labels.iter().all(|(k, v)| {
                    key.key()
                        .labels()
                        .any(|l| l.key() == *k && l.value() == *v)
                })
        })
        .map(|(_, _, _, value)| match value {
            DebugValue::Counter(c) => c,
            _ => 0,
        })
        .sum()
}
