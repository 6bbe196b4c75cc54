//! Per-mode interpretation of free-text backend answers.
//!
//! Everything here is best-effort text scraping over model output. The
//! currency reader looks for a bare number token; it does not understand
//! the sentence.

use crate::backend::is_usable_answer;
use crate::defaults::{CURRENCY_COLORS, PHRASE_NO_DESCRIPTION, PHRASE_NO_TEXT, UNKNOWN_COLOR};

/// What the user should hear for one backend answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classified {
    /// English text to route (and possibly translate)
    Answer(String),
    /// The answer was unusable; speak this phrase instead
    Fallback(&'static str),
}

/// Result of scraping a currency answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrencyReading {
    pub denomination: Option<u32>,
    pub color: &'static str,
    pub utterance: String,
}

/// Look up the colour of a denomination.
pub fn note_color(denomination: u32) -> Option<&'static str> {
    CURRENCY_COLORS
        .iter()
        .find(|(value, _)| *value == denomination)
        .map(|(_, color)| *color)
}

/// Read a denomination out of free text.
///
/// The first whitespace-separated token that is spelled exactly like a known
/// note wins. Tokens with attached punctuation (`500.`) or leading zeros
/// (`0500`) do not count.
/// When the answer mentions "rupee" it is repeated with the colour appended,
/// otherwise only the colour is spoken.
pub fn parse_currency(raw: &str) -> CurrencyReading {
    let denomination = raw
        .split_whitespace()
        .filter(|token| token.bytes().all(|b| b.is_ascii_digit()))
        .find_map(|token| {
            CURRENCY_COLORS
                .iter()
                .find(|(value, _)| value.to_string() == token)
                .map(|(value, _)| *value)
        });

    let color = denomination.and_then(note_color).unwrap_or(UNKNOWN_COLOR);

    let utterance = if !raw.trim().is_empty() && raw.to_lowercase().contains("rupee") {
        format!("{}. The color is {}", raw, color)
    } else {
        format!("This is {} color.", color)
    };

    CurrencyReading {
        denomination,
        color,
        utterance,
    }
}

/// Narrow interpretation step between backend and router, one variant per mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseClassifier {
    SceneDescription,
    TextRead,
    Currency,
}

impl ResponseClassifier {
    pub fn classify(self, raw: &str) -> Classified {
        match self {
            ResponseClassifier::SceneDescription => {
                if is_usable_answer(raw) {
                    Classified::Answer(raw.trim().to_string())
                } else {
                    Classified::Fallback(PHRASE_NO_DESCRIPTION)
                }
            }
            ResponseClassifier::TextRead => {
                if is_usable_answer(raw) {
                    Classified::Answer(raw.trim().to_string())
                } else {
                    Classified::Fallback(PHRASE_NO_TEXT)
                }
            }
            ResponseClassifier::Currency => Classified::Answer(parse_currency(raw).utterance),
        }
    }
}
