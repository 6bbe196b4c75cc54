//! Script detection by Unicode block.

/// Writing system that selects a speech voice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Script {
    /// U+0900–U+097F, spoken with the Hindi voice
    Devanagari,
    /// U+0C80–U+0CFF, spoken with the Kannada voice
    Kannada,
    /// Anything else goes to the default voice
    Default,
}

impl Script {
    /// Voice language for scripts with a dedicated voice.
    pub fn voice_language(self) -> Option<&'static str> {
        match self {
            Script::Devanagari => Some("hi"),
            Script::Kannada => Some("kn"),
            Script::Default => None,
        }
    }
}

fn is_devanagari(c: char) -> bool {
    ('\u{0900}'..='\u{097F}').contains(&c)
}

fn is_kannada(c: char) -> bool {
    ('\u{0C80}'..='\u{0CFF}').contains(&c)
}

/// Classify `text` by the presence of any qualifying code point.
///
/// Devanagari is checked first, so text mixing both scripts is Devanagari.
pub fn detect_script(text: &str) -> Script {
    if text.chars().any(is_devanagari) {
        Script::Devanagari
    } else if text.chars().any(is_kannada) {
        Script::Kannada
    } else {
        Script::Default
    }
}
