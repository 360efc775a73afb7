//! Gesture workbench
//!
//! Owns the sample store, recording controller, recognition state and the
//! live classifier. A host drives it with one `process_frame` call per
//! detector frame; every mutation goes through `&mut self`, so sample
//! appends are serialized with frame processing.

use crate::capture::FrameObservation;
use crate::config::{AppConfig, ConfigError};
use crate::features::{FeatureLayout, FeatureVector, HandSelection, Vectorizer};
use crate::recognition::{ConfirmedSymbol, RecognitionEngine, SymbolSink, TextBuffer};
use crate::recorder::{
    RecorderState, RecordingController, RecordingError, RecordingEvent, SessionSummary, TickReport,
};
use crate::samples::{LabelSummary, SampleStore, StoreError};
use crate::storage::{self, PersistError, SampleRepository};
use crate::training::{
    ClassifierBackend, ClassifierSlot, Hyperparameters, TrainedClassifier, TrainingError,
    TrainingPipeline, TrainingRun,
};
use crate::utils::{AppError, AppResult};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use uuid::Uuid;

/// What one processed frame produced
#[derive(Debug, Clone, PartialEq)]
pub struct FrameReport {
    /// Whether a hand accepted by the selection mode was present
    pub hand_present: bool,
    pub tick: TickReport,
    pub symbol: Option<ConfirmedSymbol>,
}

/// Owning context for capture, training and recognition
pub struct Workbench<S: SymbolSink = TextBuffer> {
    config: AppConfig,
    vectorizer: Vectorizer,
    hand_selection: HandSelection,
    store: SampleStore,
    recorder: RecordingController,
    recognition: RecognitionEngine,
    recognizing: bool,
    hold_threshold: Duration,
    slot: ClassifierSlot,
    pipeline: TrainingPipeline,
    repository: Arc<dyn SampleRepository>,
    sink: S,

    /// Most recent frame, kept so a hand-selection change applies immediately
    last_frame: Option<FrameObservation>,

    /// Qualifying features of the most recent frame
    latest: Option<FeatureVector>,
}

impl<S: SymbolSink> Workbench<S> {
    pub fn new(
        config: AppConfig,
        backend: Arc<dyn ClassifierBackend>,
        repository: Arc<dyn SampleRepository>,
        sink: S,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let slot = ClassifierSlot::new();
        let vision = config.vision;
        Ok(Self {
            vectorizer: Vectorizer::new(vision.layout, vision.mirror_input),
            hand_selection: vision.hand_selection,
            store: SampleStore::new(vision.layout),
            recorder: RecordingController::new(repository.clone()),
            recognition: RecognitionEngine::new(),
            recognizing: false,
            hold_threshold: config.recognition.hold_threshold(),
            pipeline: TrainingPipeline::new(backend, slot.clone()),
            slot,
            repository,
            sink,
            last_frame: None,
            latest: None,
            config,
        })
    }

    /// Load previously persisted samples
    ///
    /// Returns `false` when nothing usable was stored. A stored set with a
    /// different feature layout is ignored.
    pub fn restore(&mut self) -> Result<bool, PersistError> {
        let Some(snapshot) = self.repository.restore()? else {
            return Ok(false);
        };

        if snapshot.layout != self.store.layout() {
            tracing::warn!(
                "Ignoring stored samples with layout {:?} (configured {:?})",
                snapshot.layout,
                self.store.layout()
            );
            return Ok(false);
        }

        let store = SampleStore::from_snapshot(snapshot)
            .map_err(|e| PersistError::InvalidData(e.to_string()))?;
        tracing::info!(
            "Restored {} labels / {} samples",
            store.label_count(),
            store.total_sample_count()
        );
        self.recorder.stop();
        self.store = store;
        Ok(true)
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn store(&self) -> &SampleStore {
        &self.store
    }

    pub fn summaries(&self) -> Vec<LabelSummary> {
        self.store.summaries()
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    // Labels and samples

    pub fn add_label(&mut self, name: &str) -> Result<(), StoreError> {
        self.store.add_label(name)?;
        tracing::info!("Added label '{}'", name.trim());
        self.persist();
        Ok(())
    }

    /// Delete a label with its samples, stopping a session recording into it
    pub fn remove_label(&mut self, name: &str) -> Result<(), StoreError> {
        self.store.remove_label(name)?;
        self.recorder.label_removed(name);
        tracing::info!("Removed label '{}'", name);
        self.persist();
        Ok(())
    }

    pub fn clear_samples(&mut self, name: &str) -> Result<(), StoreError> {
        self.store.clear_samples(name)?;
        self.persist();
        Ok(())
    }

    /// Change the feature layout; `wipe` must be set when samples exist
    pub fn reconfigure_layout(&mut self, layout: FeatureLayout, wipe: bool) -> AppResult<()> {
        if !layout.supports(self.hand_selection) {
            return Err(ConfigError::Invalid(format!(
                "hand selection {:?} needs a two-hand layout",
                self.hand_selection
            ))
            .into());
        }
        self.store.reconfigure_layout(layout, wipe)?;

        self.recorder.stop();
        self.recognition.reset();
        self.vectorizer = Vectorizer::new(layout, self.vectorizer.mirror_input());
        self.config.vision.layout = layout;
        self.refresh_latest();
        if self
            .slot
            .current()
            .is_some_and(|classifier| classifier.layout != layout)
        {
            tracing::warn!("Live classifier was trained for another layout; retrain before recognizing");
        }

        tracing::info!("Feature layout set to {:?}", layout);
        self.persist();
        Ok(())
    }

    pub fn hand_selection(&self) -> HandSelection {
        self.hand_selection
    }

    pub fn set_hand_selection(&mut self, selection: HandSelection) -> Result<(), ConfigError> {
        if !self.vectorizer.layout().supports(selection) {
            return Err(ConfigError::Invalid(format!(
                "hand selection {:?} needs a two-hand layout",
                selection
            )));
        }
        self.hand_selection = selection;
        self.config.vision.hand_selection = selection;
        self.refresh_latest();
        tracing::debug!("Hand selection set to {:?}", selection);
        Ok(())
    }

    // Recording

    pub fn recording_state(&self) -> RecorderState {
        self.recorder.state()
    }

    pub fn subscribe_recording(&self) -> broadcast::Receiver<RecordingEvent> {
        self.recorder.subscribe()
    }

    /// Record into `label` for the configured duration
    pub fn start_timed_recording(&mut self, label: &str, now: Instant) -> Result<Uuid, RecordingError> {
        let recording = self.config.recording;
        self.recorder
            .start_timed(&self.store, label, &recording, self.latest.as_ref(), now)
    }

    /// Record into `label` until `stop_recording`
    pub fn start_held_recording(&mut self, label: &str, now: Instant) -> Result<Uuid, RecordingError> {
        let cadence = self.config.recording.cadence();
        self.recorder
            .start_held(&self.store, label, cadence, self.latest.as_ref(), now)
    }

    pub fn stop_recording(&mut self) -> Option<SessionSummary> {
        self.recorder.stop()
    }

    /// Append the current frame's features to `label`
    pub fn capture_one(&mut self, label: &str) -> Result<usize, RecordingError> {
        self.recorder
            .capture_one(&mut self.store, label, self.latest.as_ref())
    }

    // Frame loop

    /// Feed one detector frame: recording tick first, then recognition
    pub fn process_frame(&mut self, frame: FrameObservation, now: Instant) -> FrameReport {
        self.latest = self
            .vectorizer
            .qualifying_features(&frame, self.hand_selection);
        self.last_frame = Some(frame);

        let tick = self.recorder.tick(&mut self.store, self.latest.as_ref(), now);
        let symbol = self.recognize(now);

        FrameReport {
            hand_present: self.latest.is_some(),
            tick,
            symbol,
        }
    }

    fn recognize(&mut self, now: Instant) -> Option<ConfirmedSymbol> {
        if !self.recognizing {
            return None;
        }
        let classifier = self.slot.current()?;
        let symbol = self.recognition.observe(
            self.latest.as_ref(),
            &classifier,
            self.hold_threshold,
            now,
        )?;

        if let Err(e) = self.sink.emit(&symbol.label) {
            tracing::warn!("Failed to write symbol '{}': {}", symbol.label, e);
        }
        Some(symbol)
    }

    fn refresh_latest(&mut self) {
        self.latest = self
            .last_frame
            .as_ref()
            .and_then(|frame| self.vectorizer.qualifying_features(frame, self.hand_selection));
    }

    // Recognition

    pub fn is_recognizing(&self) -> bool {
        self.recognizing
    }

    pub fn start_recognition(&mut self) -> AppResult<()> {
        if !self.slot.is_loaded() {
            return Err(AppError::NoClassifier);
        }
        self.recognition.reset();
        self.recognizing = true;
        tracing::info!("Recognition started");
        Ok(())
    }

    pub fn stop_recognition(&mut self) {
        if self.recognizing {
            tracing::info!("Recognition stopped");
        }
        self.recognizing = false;
        self.recognition.reset();
    }

    pub fn hold_threshold(&self) -> Duration {
        self.hold_threshold
    }

    pub fn set_hold_threshold(&mut self, hold: Duration) {
        self.hold_threshold = hold;
    }

    // Training and models

    pub fn classifier(&self) -> Option<Arc<TrainedClassifier>> {
        self.slot.current()
    }

    pub fn is_training(&self) -> bool {
        self.pipeline.is_training()
    }

    /// Train in the background with the configured hyperparameters
    pub fn start_training(&self) -> Result<TrainingRun, TrainingError> {
        self.start_training_with(self.config.training)
    }

    pub fn start_training_with(&self, hyperparameters: Hyperparameters) -> Result<TrainingRun, TrainingError> {
        self.pipeline.start(&self.store, hyperparameters)
    }

    /// Save the live classifier to a model bundle directory
    pub fn save_model(&self, path: &Path) -> AppResult<()> {
        let classifier = self.slot.current().ok_or(AppError::NoClassifier)?;
        storage::write_model(&classifier, self.pipeline.backend().name(), path)?;
        tracing::info!("Saved classifier {} to {:?}", classifier.id, path);
        Ok(())
    }

    /// Load a model bundle and make it the live classifier
    pub fn load_model(&mut self, path: &Path) -> AppResult<Uuid> {
        let classifier = storage::read_model(self.pipeline.backend().as_ref(), path)?;
        if classifier.layout != self.store.layout() {
            return Err(PersistError::InvalidData(format!(
                "model expects layout {:?}, workbench uses {:?}",
                classifier.layout,
                self.store.layout()
            ))
            .into());
        }

        let id = classifier.id;
        self.slot.install(classifier);
        self.recognition.reset();
        Ok(id)
    }

    fn persist(&self) {
        if let Err(e) = self.repository.persist(&self.store.snapshot()) {
            tracing::warn!("Failed to persist samples: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{HandObservation, Handedness, Keypoint};
    use crate::recorder::{StopReason, TickOutcome};
    use crate::storage::MemoryRepository;
    use crate::training::classifier::testing::ScriptedBackend;
    use crate::training::TrainingEvent;

    fn workbench() -> (Workbench, Arc<MemoryRepository>) {
        let repository = Arc::new(MemoryRepository::new());
        let workbench = Workbench::new(
            AppConfig::default(),
            Arc::new(ScriptedBackend::default()),
            repository.clone(),
            TextBuffer::new(),
        )
        .unwrap();
        (workbench, repository)
    }

    /// Frame with one hand as the detector reports it (un-mirrored)
    fn hand_frame(reported: Handedness) -> FrameObservation {
        FrameObservation::new(vec![HandObservation::filled(
            reported,
            Keypoint::new(0.4, 0.5, 0.0),
        )])
    }

    fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }

    #[test]
    fn test_labels_are_persisted() {
        let (mut workbench, repository) = workbench();
        workbench.add_label("hello").unwrap();
        workbench.add_label("bye").unwrap();
        workbench.remove_label("bye").unwrap();

        assert_eq!(repository.persist_count(), 3);
        assert_eq!(repository.last_snapshot().unwrap().labels.len(), 1);
    }

    #[test]
    fn test_restore_reloads_samples() {
        let (mut workbench, repository) = workbench();
        workbench.add_label("hello").unwrap();
        workbench.process_frame(hand_frame(Handedness::Left), Instant::now());
        workbench.capture_one("hello").unwrap();

        let mut fresh = Workbench::new(
            AppConfig::default(),
            Arc::new(ScriptedBackend::default()),
            repository.clone(),
            TextBuffer::new(),
        )
        .unwrap();
        assert!(fresh.restore().unwrap());
        assert_eq!(fresh.store().sample_count("hello").unwrap(), 1);
    }

    #[test]
    fn test_restore_ignores_other_layout() {
        let repository = Arc::new(MemoryRepository::new());
        repository
            .persist(&SampleStore::new(FeatureLayout::OneHand).snapshot())
            .unwrap();
        let mut workbench = Workbench::new(
            AppConfig::default(),
            Arc::new(ScriptedBackend::default()),
            repository,
            TextBuffer::new(),
        )
        .unwrap();

        assert!(!workbench.restore().unwrap());
    }

    #[test]
    fn test_recording_needs_a_hand() {
        let (mut workbench, _) = workbench();
        workbench.add_label("A").unwrap();
        let now = Instant::now();

        assert_eq!(
            workbench.start_timed_recording("A", now),
            Err(RecordingError::NoActiveFrame)
        );
        workbench.process_frame(FrameObservation::empty(), now);
        assert_eq!(workbench.capture_one("A"), Err(RecordingError::NoActiveFrame));
    }

    #[test]
    fn test_hand_selection_filters_valid_frames() {
        let (mut workbench, _) = workbench();
        workbench.add_label("A").unwrap();
        // Reported Right becomes Left in the mirrored view
        let report = workbench.process_frame(hand_frame(Handedness::Right), Instant::now());
        assert!(report.hand_present);

        workbench.set_hand_selection(HandSelection::Right).unwrap();
        assert_eq!(workbench.capture_one("A"), Err(RecordingError::NoActiveFrame));

        workbench.set_hand_selection(HandSelection::Left).unwrap();
        assert_eq!(workbench.capture_one("A"), Ok(1));
    }

    #[test]
    fn test_frame_loop_drives_timed_recording() {
        let (mut workbench, _) = workbench();
        workbench.add_label("A").unwrap();
        let start = Instant::now();
        workbench.process_frame(hand_frame(Handedness::Left), start);
        workbench.start_timed_recording("A", start).unwrap();
        assert_eq!(workbench.recording_state(), RecorderState::ArmedTimed);

        let mut stopped = None;
        for step in 1..=60 {
            let report = workbench.process_frame(hand_frame(Handedness::Left), start + ms(step * 100));
            if let Some(summary) = report.tick.finished {
                stopped = Some(summary);
                break;
            }
        }

        let summary = stopped.unwrap();
        assert_eq!(summary.reason, StopReason::DeadlineReached);
        assert_eq!(workbench.store().sample_count("A").unwrap(), 50);
        assert_eq!(workbench.recording_state(), RecorderState::Idle);
    }

    #[test]
    fn test_removing_recorded_label_stops_session() {
        let (mut workbench, _) = workbench();
        workbench.add_label("A").unwrap();
        let start = Instant::now();
        workbench.process_frame(hand_frame(Handedness::Left), start);
        workbench.start_held_recording("A", start).unwrap();

        workbench.remove_label("A").unwrap();
        assert_eq!(workbench.recording_state(), RecorderState::Idle);
        let report = workbench.process_frame(hand_frame(Handedness::Left), start + ms(100));
        assert_eq!(report.tick.outcome, TickOutcome::Idle);
    }

    #[test]
    fn test_layout_change_requires_wipe() {
        let (mut workbench, _) = workbench();
        workbench.add_label("A").unwrap();
        workbench.process_frame(hand_frame(Handedness::Left), Instant::now());
        workbench.capture_one("A").unwrap();
        // The reported Left hand is the view's Right hand
        workbench.set_hand_selection(HandSelection::Right).unwrap();

        assert!(matches!(
            workbench.reconfigure_layout(FeatureLayout::OneHand, false),
            Err(AppError::Store(StoreError::LayoutLocked { samples: 1 }))
        ));
        workbench.reconfigure_layout(FeatureLayout::OneHand, true).unwrap();
        assert_eq!(workbench.store().total_sample_count(), 0);
        assert_eq!(workbench.store().vector_len(), 63);
        assert_eq!(workbench.capture_one("A"), Ok(1));
    }

    #[test]
    fn test_recognition_requires_classifier() {
        let (mut workbench, _) = workbench();
        assert!(matches!(
            workbench.start_recognition(),
            Err(AppError::NoClassifier)
        ));
        assert!(matches!(
            workbench.save_model(Path::new("unused")),
            Err(AppError::NoClassifier)
        ));
    }

    #[tokio::test]
    async fn test_train_then_recognize_writes_symbols() {
        let (mut workbench, _) = workbench();
        workbench.add_label("A").unwrap();
        workbench.add_label("B").unwrap();
        workbench.process_frame(hand_frame(Handedness::Left), Instant::now());
        for _ in 0..10 {
            workbench.capture_one("A").unwrap();
            workbench.capture_one("B").unwrap();
        }

        let mut run = workbench.start_training().unwrap();
        let mut terminal = None;
        while let Some(event) = run.next_event().await {
            if event.is_terminal() {
                terminal = Some(event);
            }
        }
        assert!(matches!(terminal, Some(TrainingEvent::Completed(_))));
        run.finish().await.unwrap();

        // The scripted model always scores the first label highest
        workbench.set_hold_threshold(ms(300));
        workbench.start_recognition().unwrap();
        let start = Instant::now();
        let mut symbols = Vec::new();
        for step in 0..=3 {
            let report = workbench.process_frame(hand_frame(Handedness::Left), start + ms(step * 100));
            symbols.extend(report.symbol);
        }

        assert_eq!(symbols.len(), 1);
        assert_eq!(workbench.sink().contents(), "A ");

        workbench.stop_recognition();
        let report = workbench.process_frame(hand_frame(Handedness::Left), start + ms(2000));
        assert!(report.symbol.is_none());
    }
}
