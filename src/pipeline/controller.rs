//! One user trigger, start to finish.
//!
//! `Idle → Capturing → Inferring → Speaking → Idle`. Evidence logging forks
//! off when speaking starts and never gates the return to `Idle`. A trigger
//! arriving while another is in flight is dropped, not queued.

use crate::backend::InferenceBackend;
use crate::defaults::{
    self, CURRENCY_PROMPT, DESCRIBE_PROMPT, ENGLISH_LANGUAGE, PHRASE_BACKEND_ERROR,
    PHRASE_CAMERA_ERROR, PHRASE_PROTOCOL_ERROR, PHRASE_READY, PHRASE_SCANNING, READ_TEXT_PROMPT,
};
use crate::error::{DrishtiError, ErrorKind, Result};
use crate::evidence::{EvidenceLogger, InteractionRecord, Modality, spawn_log};
use crate::frame::{Frame, FrameSource};
use crate::ocr::{OcrEngine, recognize_frame};
use crate::output::{PipelineEvent, render_event};
use crate::pipeline::trigger::Mode;
use crate::router::{Classified, OutputRouter, ResponseClassifier, Utterance, detect_script};
use crate::speech::Synthesizer;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

/// Where the controller is in its per-trigger state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Idle,
    Capturing,
    Inferring,
    Speaking,
}

/// How a trigger ended.
#[derive(Debug, Clone, PartialEq)]
pub enum TriggerOutcome {
    Completed {
        modality: Modality,
        /// English text (or OCR text) that was logged
        text: String,
        utterances: Vec<Utterance>,
    },
    /// Another trigger was in flight; this one was dropped.
    Busy,
    /// The trigger was aborted; the user heard the phrase for `kind`.
    Failed { kind: ErrorKind },
    Quit,
}

/// Phrase spoken when a trigger fails with an error of `kind`.
pub fn failure_phrase(kind: ErrorKind) -> &'static str {
    match kind {
        ErrorKind::Camera => PHRASE_CAMERA_ERROR,
        ErrorKind::Protocol => PHRASE_PROTOCOL_ERROR,
        _ => PHRASE_BACKEND_ERROR,
    }
}

/// Everything one trigger needs, built once at startup.
pub struct PipelineContext {
    frames: Arc<Mutex<Box<dyn FrameSource>>>,
    backend: Arc<dyn InferenceBackend>,
    router: OutputRouter,
    synthesizer: Synthesizer,
    evidence: Option<Arc<dyn EvidenceLogger>>,
    ocr: Option<Arc<dyn OcrEngine>>,
    /// Languages after English for the describe-once mode
    describe_languages: Vec<String>,
    announce: bool,
    echo: bool,
    interactions: AtomicU64,
}

impl PipelineContext {
    pub fn new(
        frames: Box<dyn FrameSource>,
        backend: Arc<dyn InferenceBackend>,
        synthesizer: Synthesizer,
    ) -> Self {
        Self {
            frames: Arc::new(Mutex::new(frames)),
            backend,
            router: OutputRouter::untranslated(),
            synthesizer,
            evidence: None,
            ocr: None,
            describe_languages: defaults::DESCRIBE_LANGUAGES
                .iter()
                .map(|l| l.to_string())
                .collect(),
            announce: false,
            echo: false,
            interactions: AtomicU64::new(0),
        }
    }

    pub fn with_router(mut self, router: OutputRouter) -> Self {
        self.router = router;
        self
    }

    pub fn with_evidence(mut self, logger: Arc<dyn EvidenceLogger>) -> Self {
        self.evidence = Some(logger);
        self
    }

    /// Try OCR before the model in read-text mode.
    pub fn with_ocr(mut self, ocr: Arc<dyn OcrEngine>) -> Self {
        self.ocr = Some(ocr);
        self
    }

    pub fn with_describe_languages(mut self, languages: Vec<String>) -> Self {
        self.describe_languages = languages;
        self
    }

    /// Speak the ready greeting and the scanning cue.
    pub fn with_announcements(mut self, announce: bool) -> Self {
        self.announce = announce;
        self
    }

    /// Echo events to the terminal.
    pub fn with_echo(mut self, echo: bool) -> Self {
        self.echo = echo;
        self
    }

    pub fn backend(&self) -> &Arc<dyn InferenceBackend> {
        &self.backend
    }

    /// Number of triggers that reached the backend.
    pub fn interactions(&self) -> u64 {
        self.interactions.load(Ordering::SeqCst)
    }

    /// Target languages for a describe mode, English first, no repeats.
    fn describe_targets(&self, mode: Mode) -> Vec<String> {
        if !self.router.translates() {
            return vec![ENGLISH_LANGUAGE.to_string()];
        }
        let extra: Vec<String> = match mode {
            Mode::DescribeTrilingual => defaults::TRILINGUAL_LANGUAGES
                .iter()
                .map(|l| l.to_string())
                .collect(),
            _ => self.describe_languages.clone(),
        };
        let mut targets = vec![ENGLISH_LANGUAGE.to_string()];
        for language in extra {
            if !targets.contains(&language) {
                targets.push(language);
            }
        }
        targets
    }
}

/// What a mode produced before speaking.
struct Answer {
    modality: Modality,
    prompt: String,
    text: String,
    plan: Vec<Utterance>,
}

/// Runs triggers against a [`PipelineContext`], one at a time.
pub struct PipelineController {
    context: PipelineContext,
    busy: AtomicBool,
    state: Mutex<PipelineState>,
}

/// Returns the controller to `Idle` however the trigger ends.
struct IdleOnDrop<'a>(&'a PipelineController);

impl Drop for IdleOnDrop<'_> {
    fn drop(&mut self) {
        self.0.set_state(PipelineState::Idle);
        self.0.busy.store(false, Ordering::SeqCst);
    }
}

impl PipelineController {
    pub fn new(context: PipelineContext) -> Self {
        Self {
            context,
            busy: AtomicBool::new(false),
            state: Mutex::new(PipelineState::Idle),
        }
    }

    pub fn context(&self) -> &PipelineContext {
        &self.context
    }

    pub fn state(&self) -> PipelineState {
        *self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::SeqCst)
    }

    fn set_state(&self, state: PipelineState) {
        *self.state.lock().unwrap_or_else(|e| e.into_inner()) = state;
    }

    fn emit(&self, event: PipelineEvent) {
        if self.context.echo {
            render_event(&event);
        }
    }

    /// Say "System Ready." when announcements are on.
    pub async fn greet(&self) {
        if self.context.announce {
            self.context
                .synthesizer
                .say(vec![Utterance::cue(PHRASE_READY)])
                .await;
        }
    }

    /// Run one trigger to completion.
    ///
    /// Every failure is recovered here: the user hears a phrase for the error
    /// class and the controller returns to `Idle`.
    pub async fn handle(&self, mode: Mode) -> TriggerOutcome {
        if mode == Mode::Quit {
            return TriggerOutcome::Quit;
        }
        if self
            .busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::debug!(%mode, "Trigger ignored, pipeline busy");
            self.emit(PipelineEvent::Ignored { mode });
            return TriggerOutcome::Busy;
        }
        let _idle = IdleOnDrop(self);

        self.emit(PipelineEvent::Triggered { mode });
        let started = Instant::now();

        match self.run(mode).await {
            Ok(outcome) => {
                if let TriggerOutcome::Completed { modality, .. } = &outcome {
                    self.emit(PipelineEvent::Completed {
                        modality: *modality,
                        elapsed_ms: started.elapsed().as_millis(),
                    });
                }
                outcome
            }
            Err(e) => {
                let kind = e.kind();
                let phrase = failure_phrase(kind);
                tracing::warn!(%mode, ?kind, "Trigger failed: {}", e);
                self.emit(PipelineEvent::Failed { kind, phrase });
                self.set_state(PipelineState::Speaking);
                self.context
                    .synthesizer
                    .say(vec![Utterance::cue(phrase)])
                    .await;
                TriggerOutcome::Failed { kind }
            }
        }
    }

    async fn run(&self, mode: Mode) -> Result<TriggerOutcome> {
        if self.context.announce {
            self.context
                .synthesizer
                .say(vec![Utterance::cue(PHRASE_SCANNING)])
                .await;
        }

        self.set_state(PipelineState::Capturing);
        let frame = self.capture().await?;

        self.set_state(PipelineState::Inferring);
        let answer = match mode {
            Mode::DescribeOnce | Mode::DescribeTrilingual => self.describe(mode, &frame).await?,
            Mode::ReadText => self.read_text(&frame).await?,
            Mode::IdentifyCurrency => self.identify_currency(&frame).await?,
            Mode::Quit => return Ok(TriggerOutcome::Quit),
        };
        let sequence = self.context.interactions.fetch_add(1, Ordering::SeqCst) + 1;
        tracing::info!(sequence, modality = answer.modality.tag(), "Answer ready");

        self.set_state(PipelineState::Speaking);
        if let Some(logger) = &self.context.evidence {
            let record = InteractionRecord {
                timestamp: frame.timestamp(),
                modality: answer.modality,
                prompt: answer.prompt.clone(),
                text: answer.text.clone(),
            };
            spawn_log(Arc::clone(logger), frame.clone(), record);
        }

        for utterance in &answer.plan {
            self.emit(PipelineEvent::Spoken {
                utterance: utterance.clone(),
            });
        }
        self.context.synthesizer.say(answer.plan.clone()).await;

        Ok(TriggerOutcome::Completed {
            modality: answer.modality,
            text: answer.text,
            utterances: answer.plan,
        })
    }

    async fn capture(&self) -> Result<Frame> {
        let frames = Arc::clone(&self.context.frames);
        tokio::task::spawn_blocking(move || {
            frames.lock().unwrap_or_else(|e| e.into_inner()).capture()
        })
        .await
        .map_err(|e| DrishtiError::CameraCapture {
            message: format!("capture task failed: {}", e),
        })?
    }

    async fn describe(&self, mode: Mode, frame: &Frame) -> Result<Answer> {
        let raw = self.context.backend.infer(frame, DESCRIBE_PROMPT).await?;
        let (text, plan) = match ResponseClassifier::SceneDescription.classify(&raw) {
            Classified::Answer(english) => {
                let targets = self.context.describe_targets(mode);
                let outputs = self.context.router.route(&english, &targets).await;
                (english, OutputRouter::labelled_plan(&outputs))
            }
            Classified::Fallback(phrase) => (phrase.to_string(), vec![Utterance::cue(phrase)]),
        };
        Ok(Answer {
            modality: Modality::SceneDescription,
            prompt: DESCRIBE_PROMPT.to_string(),
            text,
            plan,
        })
    }

    async fn read_text(&self, frame: &Frame) -> Result<Answer> {
        let mut modality = Modality::TextRead;
        if let Some(ocr) = &self.context.ocr {
            match recognize_frame(Arc::clone(ocr), frame).await {
                Ok(Some(text)) => {
                    return Ok(Answer {
                        modality: Modality::Ocr,
                        prompt: ocr.name().to_string(),
                        plan: vec![spoken_text(&text)],
                        text,
                    });
                }
                Ok(None) => tracing::debug!("OCR found no text, asking the model"),
                Err(e) => tracing::warn!("OCR failed, asking the model: {}", e),
            }
            modality = Modality::VlmFallback;
        }

        let raw = self.context.backend.infer(frame, READ_TEXT_PROMPT).await?;
        let (text, plan) = match ResponseClassifier::TextRead.classify(&raw) {
            Classified::Answer(text) => {
                let plan = vec![spoken_text(&text)];
                (text, plan)
            }
            Classified::Fallback(phrase) => (phrase.to_string(), vec![Utterance::cue(phrase)]),
        };
        Ok(Answer {
            modality,
            prompt: READ_TEXT_PROMPT.to_string(),
            text,
            plan,
        })
    }

    async fn identify_currency(&self, frame: &Frame) -> Result<Answer> {
        let raw = self.context.backend.infer(frame, CURRENCY_PROMPT).await?;
        let utterance = match ResponseClassifier::Currency.classify(&raw) {
            Classified::Answer(text) => text,
            Classified::Fallback(phrase) => phrase.to_string(),
        };
        Ok(Answer {
            modality: Modality::CurrencyId,
            prompt: CURRENCY_PROMPT.to_string(),
            plan: vec![Utterance::content(ENGLISH_LANGUAGE, &utterance)],
            text: utterance,
        })
    }
}

/// Read-back text, tagged with the language its script implies.
fn spoken_text(text: &str) -> Utterance {
    let language = detect_script(text)
        .voice_language()
        .unwrap_or(ENGLISH_LANGUAGE);
    Utterance::content(language, text)
}
