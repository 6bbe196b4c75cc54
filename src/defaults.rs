//! Default configuration constants for drishti.
//!
//! Shared constants used across configuration types, prompts and the
//! phrases spoken back to the user.

/// Default camera device index.
pub const CAMERA_INDEX: u32 = 0;

/// Frames discarded after opening the camera so auto-exposure can settle.
pub const WARMUP_FRAMES: u32 = 5;

/// Frames grabbed and dropped before each capture. V4L2 queues four buffers
/// by default, and an idle camera keeps serving them oldest first.
pub const STALE_FRAMES: u32 = 4;

/// Consecutive failed reads tolerated before a capture is reported as timed out.
pub const CAMERA_READ_ATTEMPTS: u32 = 3;

/// Well-known socket path of the inference server.
pub const INFERENCE_SOCKET: &str = "/tmp/vision.sock";

/// Model path sent with `init` when none is configured.
pub const MODEL_PATH: &str = "dummy";

/// Upper bound on generated tokens for a remote inference.
pub const N_PREDICT: u32 = 64;

/// Sampling temperature for backends that accept one.
pub const TEMPERATURE: f32 = 0.2;

/// Bounded wait for a single remote inference, in seconds.
pub const INFERENCE_TIMEOUT_SECS: u64 = 60;

/// Receive buffer of the reference server; a legacy response must fit in one read.
pub const LEGACY_READ_BUFFER: usize = 65536;

/// Largest frame accepted with length-prefixed framing.
pub const MAX_FRAME_BYTES: u32 = 16 * 1024 * 1024;

/// HTTP completion endpoint of a local llama.cpp style server.
pub const COMPLETION_URL: &str = "http://localhost:8080/completion";

/// Default translation endpoint (LibreTranslate compatible).
pub const TRANSLATE_URL: &str = "http://localhost:5000/translate";

/// Source language used when automatic detection fails.
pub const FALLBACK_SOURCE_LANGUAGE: &str = "en";

/// Source language of every backend answer.
pub const ENGLISH_LANGUAGE: &str = "en";

/// Words per minute for the resident voice.
pub const SPEECH_RATE: u32 = 180;

/// Dash rule closing each session log block.
pub const SESSION_RULE_WIDTH: usize = 40;

/// Prompt for a one-sentence scene description.
pub const DESCRIBE_PROMPT: &str = "Briefly describe the image in one short sentence in English.";

/// Prompt for reading visible text.
pub const READ_TEXT_PROMPT: &str = "Read ONLY the visible text exactly as written. \
    If the text is Hindi, return it ONLY in Devanagari script (हिंदी अक्षरों में). \
    Do NOT use English letters for Hindi. Do not repeat words.";

/// Prompt for Indian currency identification.
pub const CURRENCY_PROMPT: &str = "Identify the Indian currency note in the image. \
    If it is an Indian rupee note, say ONLY the denomination like \
    'It is a 10 rupee note', 'It is a 20 rupee note', \
    'It is a 50 rupee note', 'It is a 100 rupee note', \
    'It is a 200 rupee note', or 'It is a 500 rupee note'. \
    If no Indian currency note is visible, say 'No currency note detected'.";

/// Denomination to note colour, for currently issued Indian rupee notes.
pub const CURRENCY_COLORS: &[(u32, &str)] = &[
    (10, "brown"),
    (20, "greenish yellow"),
    (50, "fluorescent blue"),
    (100, "lavender"),
    (200, "bright yellow"),
    (500, "stone grey"),
];

/// Colour reported when no denomination could be read.
pub const UNKNOWN_COLOR: &str = "unknown";

/// Spoken at startup.
pub const PHRASE_READY: &str = "System Ready.";

/// Spoken before every capture.
pub const PHRASE_SCANNING: &str = "Scanning.";

/// Spoken when the camera fails.
pub const PHRASE_CAMERA_ERROR: &str = "Camera error";

/// Spoken when the backend returns a failure or times out.
pub const PHRASE_BACKEND_ERROR: &str = "Sorry, I could not analyze the image";

/// Spoken when the inference server cannot be reached or answers garbage.
pub const PHRASE_PROTOCOL_ERROR: &str = "Error connecting to AI";

/// Spoken when the read-text mode finds nothing.
pub const PHRASE_NO_TEXT: &str = "No text detected.";

/// Spoken when a description comes back empty.
pub const PHRASE_NO_DESCRIPTION: &str = "No description available.";

/// Language codes spoken by the single-press describe mode, after English.
pub const DESCRIBE_LANGUAGES: &[&str] = &["hi", "kn"];

/// Language codes spoken by the trilingual describe mode.
pub const TRILINGUAL_LANGUAGES: &[&str] = &["en", "hi", "kn"];

/// Human-readable name for a language code, used in spoken labels.
pub fn language_name(code: &str) -> &str {
    match code {
        "en" => "English",
        "hi" => "Hindi",
        "kn" => "Kannada",
        "ta" => "Tamil",
        "te" => "Telugu",
        "mr" => "Marathi",
        "bn" => "Bengali",
        other => other,
    }
}
