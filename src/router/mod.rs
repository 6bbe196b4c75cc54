//! Output routing: one English answer in, per-language texts and an ordered
//! utterance plan out.

pub mod classifier;
pub mod script;
pub mod translate;

pub use classifier::{Classified, CurrencyReading, ResponseClassifier, parse_currency};
pub use script::{Script, detect_script};
pub use translate::{MockTranslator, Translator, translate_with_fallback};

use crate::defaults::{ENGLISH_LANGUAGE, language_name};
use std::sync::Arc;

/// Text for one output language.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LanguageOutput {
    pub language: String,
    pub text: String,
    /// True when the text contains a script with a dedicated voice
    pub script_detected: bool,
}

impl LanguageOutput {
    fn new(language: &str, text: String) -> Self {
        let script_detected = detect_script(&text) != Script::Default;
        Self {
            language: language.to_string(),
            text,
            script_detected,
        }
    }
}

/// One thing to say, in playback order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Utterance {
    pub text: String,
    /// Language of the content, `None` for spoken labels and cues
    pub language: Option<String>,
}

impl Utterance {
    /// A label or cue, always English.
    pub fn cue(text: &str) -> Self {
        Self {
            text: text.to_string(),
            language: None,
        }
    }

    pub fn content(language: &str, text: &str) -> Self {
        Self {
            text: text.to_string(),
            language: Some(language.to_string()),
        }
    }
}

/// Turns English answers into per-language outputs.
pub struct OutputRouter {
    translator: Option<Arc<dyn Translator>>,
}

impl OutputRouter {
    /// Router that translates through `translator`.
    pub fn new(translator: Arc<dyn Translator>) -> Self {
        Self {
            translator: Some(translator),
        }
    }

    /// Router that passes text through untranslated.
    pub fn untranslated() -> Self {
        Self { translator: None }
    }

    pub fn translates(&self) -> bool {
        self.translator.is_some()
    }

    /// Produce one output per target language, in the given order.
    ///
    /// English targets get the source text. Translation never fails: a
    /// failing service yields the source text for that language.
    pub async fn route(&self, source: &str, targets: &[String]) -> Vec<LanguageOutput> {
        let mut outputs = Vec::with_capacity(targets.len());
        for target in targets {
            let text = match &self.translator {
                Some(translator) if target != ENGLISH_LANGUAGE => {
                    translate_with_fallback(translator.as_ref(), source, target).await
                }
                _ => source.to_string(),
            };
            outputs.push(LanguageOutput::new(target, text));
        }
        outputs
    }

    /// Labelled sequence: "English description", text, "Hindi description", ...
    pub fn labelled_plan(outputs: &[LanguageOutput]) -> Vec<Utterance> {
        outputs
            .iter()
            .flat_map(|output| {
                [
                    Utterance::cue(&format!("{} description", language_name(&output.language))),
                    Utterance::content(&output.language, &output.text),
                ]
            })
            .collect()
    }
}
