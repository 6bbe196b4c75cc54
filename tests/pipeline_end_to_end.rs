//! Trigger → capture → infer → route → speak → log, with scripted collaborators.

use drishti::backend::MockBackend;
use drishti::evidence::{FileEvidenceLogger, LogLine, MemoryEvidenceLogger, Modality};
use drishti::frame::{Frame, MockFrameSource};
use drishti::pipeline::{Mode, PipelineContext, PipelineController, PipelineState, TriggerOutcome};
use drishti::router::{MockTranslator, OutputRouter};
use drishti::speech::{RecordingEngine, Synthesizer};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;

fn red_frame() -> Frame {
    Frame::filled(32, 24, [220, 20, 20]).unwrap()
}

fn translator() -> Arc<MockTranslator> {
    Arc::new(
        MockTranslator::new()
            .with_translation("hi", "एक लाल गेंद")
            .with_translation("kn", "ಒಂದು ಕೆಂಪು ಚೆಂಡು"),
    )
}

#[tokio::test]
async fn red_ball_is_described_in_three_languages_and_logged() {
    let dir = TempDir::new().unwrap();
    let resident = RecordingEngine::new("espeak");
    let generated = RecordingEngine::new("generated").with_log(resident.shared_log());
    let logger = FileEvidenceLogger::new(
        dir.path().join("captured_evidence"),
        dir.path().join("session_log.txt"),
        dir.path().join("history_logs"),
    );

    let context = PipelineContext::new(
        Box::new(MockFrameSource::new().with_frame(red_frame())),
        Arc::new(MockBackend::new("vlm").with_response("a red ball")),
        Synthesizer::new(Arc::new(resident.clone()), Arc::new(generated.clone())),
    )
    .with_router(OutputRouter::new(translator()))
    .with_evidence(Arc::new(logger));
    let controller = PipelineController::new(context);

    let outcome = controller.handle(Mode::DescribeOnce).await;
    assert!(matches!(outcome, TriggerOutcome::Completed { .. }));
    assert_eq!(controller.state(), PipelineState::Idle);

    // Six utterances, strictly ordered, Indic text on the generated-audio voice.
    assert_eq!(
        resident.spoken(),
        vec![
            ("English description".to_string(), None),
            ("a red ball".to_string(), None),
            ("Hindi description".to_string(), None),
            ("एक लाल गेंद".to_string(), Some("hi".to_string())),
            ("Kannada description".to_string(), None),
            ("ಒಂದು ಕೆಂಪು ಚೆಂಡು".to_string(), Some("kn".to_string())),
        ]
    );

    // Logging is in the background; give it a moment.
    let history = dir.path().join("history_logs");
    let mut lines = Vec::new();
    for _ in 0..50 {
        if let Ok(entries) = std::fs::read_dir(&history) {
            for entry in entries.flatten() {
                let contents = std::fs::read_to_string(entry.path()).unwrap();
                lines = contents.lines().map(str::to_string).collect();
            }
        }
        if !lines.is_empty() && dir.path().join("session_log.txt").exists() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    assert_eq!(lines.len(), 1);
    let record: LogLine = serde_json::from_str(&lines[0]).unwrap();
    assert_eq!(record.modality, Modality::SceneDescription);
    assert_eq!(record.text, "a red ball");
    let image = std::path::PathBuf::from(&record.image_path);
    assert!(image.exists());
    assert!(
        image
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("capture_")
    );
}

#[tokio::test]
async fn slow_logger_does_not_delay_speech() {
    let resident = RecordingEngine::new("espeak");
    let logger = MemoryEvidenceLogger::new().with_delay(Duration::from_millis(400));

    let context = PipelineContext::new(
        Box::new(MockFrameSource::new().with_frame(red_frame())),
        Arc::new(MockBackend::new("vlm").with_response("It is a 100 rupee note")),
        Synthesizer::new(Arc::new(resident.clone()), Arc::new(resident.clone())),
    )
    .with_evidence(Arc::new(logger.clone()));
    let controller = PipelineController::new(context);

    for _ in 0..10 {
        let started = Instant::now();
        let outcome = controller.handle(Mode::IdentifyCurrency).await;
        assert!(matches!(outcome, TriggerOutcome::Completed { .. }));
        assert!(
            started.elapsed() < Duration::from_millis(300),
            "trigger took {:?}",
            started.elapsed()
        );
    }

    assert_eq!(resident.texts().len(), 10);
    assert_eq!(
        resident.texts()[0],
        "It is a 100 rupee note. The color is lavender"
    );

    // The records still land eventually.
    let deadline = Instant::now() + Duration::from_secs(10);
    while logger.entries().len() < 10 && Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert_eq!(logger.entries().len(), 10);
}

#[tokio::test]
async fn no_currency_note_speaks_unknown_colour() {
    let resident = RecordingEngine::new("espeak");
    let context = PipelineContext::new(
        Box::new(MockFrameSource::new()),
        Arc::new(MockBackend::new("vlm").with_response("No currency note detected")),
        Synthesizer::new(Arc::new(resident.clone()), Arc::new(resident.clone())),
    );
    let controller = PipelineController::new(context);

    controller.handle(Mode::IdentifyCurrency).await;
    assert_eq!(resident.texts(), vec!["This is unknown color."]);
}

#[tokio::test]
async fn failed_speech_does_not_abort_the_sequence() {
    let resident = RecordingEngine::new("espeak");
    let broken = RecordingEngine::new("generated").with_failure();
    let context = PipelineContext::new(
        Box::new(MockFrameSource::new()),
        Arc::new(MockBackend::new("vlm").with_response("a red ball")),
        Synthesizer::new(Arc::new(resident.clone()), Arc::new(broken.clone())),
    )
    .with_router(OutputRouter::new(translator()));
    let controller = PipelineController::new(context);

    let outcome = controller.handle(Mode::DescribeTrilingual).await;

    assert!(matches!(outcome, TriggerOutcome::Completed { .. }));
    assert_eq!(broken.attempts(), 2);
    assert_eq!(
        resident.texts(),
        vec![
            "English description",
            "a red ball",
            "Hindi description",
            "Kannada description",
        ]
    );
}

#[tokio::test]
async fn camera_error_then_recovery() {
    let resident = RecordingEngine::new("espeak");
    let context = PipelineContext::new(
        Box::new(MockFrameSource::new().with_failure()),
        Arc::new(MockBackend::new("vlm")),
        Synthesizer::new(Arc::new(resident.clone()), Arc::new(resident.clone())),
    );
    let controller = PipelineController::new(context);

    for _ in 0..3 {
        let outcome = controller.handle(Mode::ReadText).await;
        assert!(matches!(outcome, TriggerOutcome::Failed { .. }));
        assert_eq!(controller.state(), PipelineState::Idle);
    }
    assert_eq!(resident.texts(), vec!["Camera error"; 3]);
}
