//! Terminal rendering of what the assistant is doing and saying.
//!
//! Everything goes to stderr; spoken text is echoed so a sighted helper can
//! follow along.

use crate::error::ErrorKind;
use crate::evidence::Modality;
use crate::pipeline::trigger::Mode;
use crate::router::Utterance;
use std::io::{self, Write};

const DIM: &str = "\x1b[2m";
const BOLD: &str = "\x1b[1m";
const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const RED: &str = "\x1b[31m";
const RESET: &str = "\x1b[0m";

/// Something worth showing on the console.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineEvent {
    Triggered { mode: Mode },
    Ignored { mode: Mode },
    Spoken { utterance: Utterance },
    Completed { modality: Modality, elapsed_ms: u128 },
    Failed { kind: ErrorKind, phrase: &'static str },
}

/// Format an event as one console line, with or without ANSI styling.
pub fn format_event(event: &PipelineEvent, color: bool) -> String {
    let (dim, bold, green, yellow, red, reset) = if color {
        (DIM, BOLD, GREEN, YELLOW, RED, RESET)
    } else {
        ("", "", "", "", "", "")
    };

    match event {
        PipelineEvent::Triggered { mode } => format!("{dim}> {mode}{reset}"),
        PipelineEvent::Ignored { mode } => {
            format!("{yellow}busy{reset} {dim}(ignored {mode}){reset}")
        }
        PipelineEvent::Spoken { utterance } => match &utterance.language {
            Some(language) => format!("{green}[{language}]{reset} {bold}{}{reset}", utterance.text),
            None => format!("{dim}{}{reset}", utterance.text),
        },
        PipelineEvent::Completed {
            modality,
            elapsed_ms,
        } => format!("{dim}{} ({elapsed_ms}ms){reset}", modality.tag()),
        PipelineEvent::Failed { kind, phrase } => {
            format!("{red}{phrase}{reset} {dim}({kind:?}){reset}")
        }
    }
}

/// Print an event to stderr.
pub fn render_event(event: &PipelineEvent) {
    eprintln!("{}", format_event(event, true));
    io::stderr().flush().ok();
}

/// Print the key map shown when the assistant starts.
pub fn print_key_help() {
    for mode in Mode::ALL {
        eprintln!("  {BOLD}{:<12}{RESET} {DIM}{}{RESET}", mode.key_hint(), mode);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_content_carries_language_tag() {
        let line = format_event(
            &PipelineEvent::Spoken {
                utterance: Utterance::content("hi", "एक लाल गेंद"),
            },
            false,
        );
        assert_eq!(line, "[hi] एक लाल गेंद");
    }

    #[test]
    fn plain_cue_is_bare_text() {
        let line = format_event(
            &PipelineEvent::Spoken {
                utterance: Utterance::cue("Hindi description"),
            },
            false,
        );
        assert_eq!(line, "Hindi description");
    }

    #[test]
    fn colored_failure_is_red() {
        let line = format_event(
            &PipelineEvent::Failed {
                kind: ErrorKind::Camera,
                phrase: "Camera error",
            },
            true,
        );
        assert!(line.starts_with(RED));
        assert!(line.contains("Camera error"));
        assert!(line.contains("(Camera)"));
    }

    #[test]
    fn completed_shows_modality_tag() {
        let line = format_event(
            &PipelineEvent::Completed {
                modality: Modality::CurrencyId,
                elapsed_ms: 1200,
            },
            false,
        );
        assert_eq!(line, "currency-id (1200ms)");
    }

    #[test]
    fn ignored_names_mode() {
        let line = format_event(
            &PipelineEvent::Ignored {
                mode: Mode::ReadText,
            },
            false,
        );
        assert_eq!(line, "busy (ignored read_text)");
    }
}
