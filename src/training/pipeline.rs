//! Training pipeline orchestration
//!
//! Assembles and shuffles the training set, hands it to the backend, forwards
//! per-epoch progress and installs the trained classifier. Only one run can
//! be in flight; the previous classifier stays live until the new one has
//! finished training.

use super::classifier::{ClassifierBackend, ClassifierSlot, TrainedClassifier};
use super::dataset::TrainingSet;
use super::types::{EpochProgress, Hyperparameters, TrainingError, TrainingEvent, TrainingSummary};
use crate::samples::SampleStore;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// A training run executing in the background
///
/// `next_event` yields the run's progress events; the stream ends after the
/// terminal `Completed` or `Failed` event.
pub struct TrainingRun {
    events: mpsc::UnboundedReceiver<TrainingEvent>,
    handle: JoinHandle<Result<TrainingSummary, TrainingError>>,
}

impl TrainingRun {
    pub async fn next_event(&mut self) -> Option<TrainingEvent> {
        self.events.recv().await
    }

    /// Wait for the run to end
    pub async fn finish(self) -> Result<TrainingSummary, TrainingError> {
        match self.handle.await {
            Ok(result) => result,
            Err(e) => Err(TrainingError::BackendFailure(format!(
                "training task panicked: {e}"
            ))),
        }
    }
}

/// Clears the in-flight flag when a run ends, however it ends
struct InFlightGuard(Arc<AtomicBool>);

impl InFlightGuard {
    fn acquire(flag: &Arc<AtomicBool>) -> Result<Self, TrainingError> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| TrainingError::TrainingInProgress)?;
        Ok(Self(flag.clone()))
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Drives classifier training against a backend
#[derive(Clone)]
pub struct TrainingPipeline {
    backend: Arc<dyn ClassifierBackend>,
    slot: ClassifierSlot,
    in_flight: Arc<AtomicBool>,
}

impl TrainingPipeline {
    pub fn new(backend: Arc<dyn ClassifierBackend>, slot: ClassifierSlot) -> Self {
        Self {
            backend,
            slot,
            in_flight: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn backend(&self) -> &Arc<dyn ClassifierBackend> {
        &self.backend
    }

    pub fn is_training(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Validate, flatten and shuffle the store's samples
    pub fn prepare(
        &self,
        store: &SampleStore,
        hyperparameters: &Hyperparameters,
    ) -> Result<TrainingSet, TrainingError> {
        hyperparameters.validate()?;
        let mut set = TrainingSet::assemble(store)?;

        let mut rng = match hyperparameters.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        set.shuffle(&mut rng);

        tracing::info!(
            "Prepared {} examples across {} labels",
            set.len(),
            set.num_classes()
        );
        Ok(set)
    }

    /// Train in place, forwarding progress into `events`
    pub async fn train(
        &self,
        store: &SampleStore,
        hyperparameters: Hyperparameters,
        events: mpsc::UnboundedSender<TrainingEvent>,
    ) -> Result<TrainingSummary, TrainingError> {
        let guard = InFlightGuard::acquire(&self.in_flight)?;
        let set = self.prepare(store, &hyperparameters)?;
        let result = run_prepared(self.backend.clone(), self.slot.clone(), set, hyperparameters, events).await;
        drop(guard);
        result
    }

    /// Start training in a background task
    ///
    /// Precondition and validation failures are returned immediately,
    /// before any task is spawned or the backend is called.
    pub fn start(
        &self,
        store: &SampleStore,
        hyperparameters: Hyperparameters,
    ) -> Result<TrainingRun, TrainingError> {
        let guard = InFlightGuard::acquire(&self.in_flight)?;
        let set = self.prepare(store, &hyperparameters)?;

        let (tx, rx) = mpsc::unbounded_channel();
        let backend = self.backend.clone();
        let slot = self.slot.clone();
        let handle = tokio::spawn(async move {
            let result = run_prepared(backend, slot, set, hyperparameters, tx).await;
            drop(guard);
            result
        });

        Ok(TrainingRun { events: rx, handle })
    }
}

async fn run_prepared(
    backend: Arc<dyn ClassifierBackend>,
    slot: ClassifierSlot,
    set: TrainingSet,
    hyperparameters: Hyperparameters,
    events: mpsc::UnboundedSender<TrainingEvent>,
) -> Result<TrainingSummary, TrainingError> {
    let example_count = set.len();
    let (request, labels, layout) = set.into_request(hyperparameters);

    tracing::info!(
        "Training {} backend: {} examples, {} classes, {} epochs",
        backend.name(),
        example_count,
        labels.len(),
        hyperparameters.epochs
    );

    // Forward epoch progress unmodified, remembering the last one
    let (progress_tx, mut progress_rx) = mpsc::unbounded_channel::<EpochProgress>();
    let forward_tx = events.clone();
    let forwarder = tokio::spawn(async move {
        let mut last = None;
        while let Some(progress) = progress_rx.recv().await {
            tracing::debug!(
                "Epoch {}/{}: accuracy {:?}",
                progress.epoch_index + 1,
                progress.total_epochs,
                progress.headline_accuracy()
            );
            let _ = forward_tx.send(TrainingEvent::Epoch(progress.clone()));
            last = Some(progress);
        }
        last
    });

    let fitted = backend.fit(request, progress_tx).await;
    let last_progress = forwarder.await.ok().flatten();

    let model = match fitted {
        Ok(model) if model.num_classes() == labels.len() => model,
        Ok(model) => {
            let message = format!(
                "backend produced {} classes, expected {}",
                model.num_classes(),
                labels.len()
            );
            return Err(fail(&events, message));
        }
        Err(e) => return Err(fail(&events, e.to_string())),
    };

    let classifier = TrainedClassifier::new(labels.clone(), layout, model);
    let summary = TrainingSummary {
        classifier_id: classifier.id,
        labels,
        example_count,
        epochs: hyperparameters.epochs,
        final_validation_accuracy: last_progress.and_then(|p| p.validation_accuracy),
    };
    slot.install(classifier);

    tracing::info!(
        "Training complete, validation accuracy: {:?}",
        summary.final_validation_accuracy
    );
    let _ = events.send(TrainingEvent::Completed(summary.clone()));
    Ok(summary)
}

fn fail(events: &mpsc::UnboundedSender<TrainingEvent>, message: String) -> TrainingError {
    tracing::error!("Training failed: {}", message);
    let _ = events.send(TrainingEvent::Failed {
        message: message.clone(),
    });
    TrainingError::BackendFailure(message)
}
