//! User triggers: the fixed key map and the stdin key reader.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;

/// What a trigger asks the assistant to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Describe the scene in English, then the configured languages.
    DescribeOnce,
    /// Describe the scene in English, Hindi and Kannada.
    DescribeTrilingual,
    ReadText,
    IdentifyCurrency,
    Quit,
}

impl Mode {
    pub const ALL: [Mode; 5] = [
        Mode::DescribeOnce,
        Mode::DescribeTrilingual,
        Mode::ReadText,
        Mode::IdentifyCurrency,
        Mode::Quit,
    ];

    /// Mode bound to a single key, if any.
    pub fn from_key(key: char) -> Option<Mode> {
        match key {
            ' ' | '\n' | '\r' => Some(Mode::DescribeOnce),
            'a' | 'A' => Some(Mode::DescribeTrilingual),
            't' | 'T' => Some(Mode::ReadText),
            'c' | 'C' => Some(Mode::IdentifyCurrency),
            'q' | 'Q' => Some(Mode::Quit),
            _ => None,
        }
    }

    /// Interpret one line of keyboard input.
    ///
    /// An empty line is a bare Enter. Otherwise the first character decides;
    /// a line starting with a space is the space key.
    pub fn from_line(line: &str) -> Option<Mode> {
        let line = line.trim_end_matches(['\n', '\r']);
        match line.chars().next() {
            None => Some(Mode::DescribeOnce),
            Some(first) => Mode::from_key(first),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Mode::DescribeOnce => "describe_once",
            Mode::DescribeTrilingual => "describe_trilingual",
            Mode::ReadText => "read_text",
            Mode::IdentifyCurrency => "identify_currency",
            Mode::Quit => "quit",
        }
    }

    /// Key hint shown at startup.
    pub fn key_hint(self) -> &'static str {
        match self {
            Mode::DescribeOnce => "Space/Enter",
            Mode::DescribeTrilingual => "a",
            Mode::ReadText => "t",
            Mode::IdentifyCurrency => "c",
            Mode::Quit => "q",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = String;

    /// Accepts `read_text`, `read-text` and `readtext` spellings.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .to_ascii_lowercase()
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .collect();
        Mode::ALL
            .into_iter()
            .find(|mode| mode.as_str().replace('_', "") == normalized)
            .ok_or_else(|| {
                let known: Vec<&str> = Mode::ALL.iter().map(|m| m.as_str()).collect();
                format!("unknown mode '{}' (expected one of: {})", s, known.join(", "))
            })
    }
}

/// Forward key presses from `reader` until EOF, `q`, or the receiver goes away.
///
/// Unbound keys are ignored. EOF is reported as [`Mode::Quit`].
pub async fn read_triggers<R>(reader: R, tx: mpsc::Sender<Mode>)
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    loop {
        let mode = match lines.next_line().await {
            Ok(Some(line)) => match Mode::from_line(&line) {
                Some(mode) => mode,
                None => {
                    tracing::debug!(key = %line.trim(), "Unbound key ignored");
                    continue;
                }
            },
            Ok(None) => Mode::Quit,
            Err(e) => {
                tracing::warn!("Keyboard input failed: {}", e);
                Mode::Quit
            }
        };
        if tx.send(mode).await.is_err() || mode == Mode::Quit {
            return;
        }
    }
}

/// Read triggers from the process's stdin on a background task.
pub fn spawn_stdin_reader(tx: mpsc::Sender<Mode>) -> tokio::task::JoinHandle<()> {
    tokio::spawn(read_triggers(tokio::io::BufReader::new(tokio::io::stdin()), tx))
}
