// config.rs — Simulation configuration and initializer-file loading
//
// `SimConfig` is plain serde-derived data so a JSON file can override any
// field. The hex loader reads the classic line-per-word memory format:
// `//` comments, `@addr` directives, `_` digit separators.
//
// Preconditions: none.
// Postconditions: `load_hex_file` fills the slice in address order and
//   leaves untouched entries at zero.
// Failure modes: io, malformed JSON, malformed hex lines, addresses past
//   the end of the slice.
// Side effects: file reads only.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

// ── SimConfig ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Hard stop after this many cycles.
    pub max_cycles: usize,
    /// Exit early after this many consecutive cycles with no unit
    /// triggered. `None` disables idle detection.
    pub idle_threshold: Option<usize>,
    /// Shuffle sequential-unit execution order every cycle.
    pub random_order: bool,
    /// Seed for the order shuffle; fixed so runs stay reproducible.
    pub seed: u64,
    /// Depth hint for hardware port queues. The simulator's queues are
    /// unbounded; this only flows through to generated artifacts.
    pub fifo_capacity: usize,
    /// Directory hex initializer files are resolved against.
    pub resource_base: PathBuf,
    /// Print log lines as they are produced, not just in the report.
    pub echo_log: bool,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            max_cycles: 100,
            idle_threshold: None,
            random_order: false,
            seed: 0,
            fifo_capacity: 8,
            resource_base: PathBuf::from("."),
            echo_log: false,
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io(io::Error),
    Parse(serde_json::Error),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "cannot read config: {}", e),
            ConfigError::Parse(e) => write!(f, "malformed config: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

impl SimConfig {
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(ConfigError::Io)?;
        serde_json::from_str(&text).map_err(ConfigError::Parse)
    }
}

// ── Hex initializer files ────────────────────────────────────────────────

#[derive(Debug)]
pub enum HexError {
    Io(io::Error),
    Parse { line: usize, text: String },
    Range { line: usize, addr: usize },
}

impl fmt::Display for HexError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HexError::Io(e) => write!(f, "cannot read hex file: {}", e),
            HexError::Parse { line, text } => {
                write!(f, "line {}: not a hex word: '{}'", line, text)
            }
            HexError::Range { line, addr } => {
                write!(f, "line {}: address {:#x} past end of array", line, addr)
            }
        }
    }
}

impl std::error::Error for HexError {}

impl From<io::Error> for HexError {
    fn from(e: io::Error) -> Self {
        HexError::Io(e)
    }
}

/// Fill `words` from a hex initializer file. One word per line; `@addr`
/// moves the cursor; `_` separators and `//` comments are stripped.
pub fn load_hex_file(words: &mut [u64], path: &Path) -> Result<(), HexError> {
    let text = fs::read_to_string(path)?;
    parse_hex(words, &text)
}

fn parse_hex(words: &mut [u64], text: &str) -> Result<(), HexError> {
    let mut cursor = 0usize;
    for (i, raw) in text.lines().enumerate() {
        let line = i + 1;
        let body = raw.split("//").next().unwrap_or("").trim();
        if body.is_empty() {
            continue;
        }
        if let Some(addr) = body.strip_prefix('@') {
            let cleaned = addr.replace('_', "");
            cursor = usize::from_str_radix(&cleaned, 16).map_err(|_| HexError::Parse {
                line,
                text: body.to_string(),
            })?;
            continue;
        }
        let cleaned = body.replace('_', "");
        let word = u64::from_str_radix(&cleaned, 16).map_err(|_| HexError::Parse {
            line,
            text: body.to_string(),
        })?;
        if cursor >= words.len() {
            return Err(HexError::Range { line, addr: cursor });
        }
        words[cursor] = word;
        cursor += 1;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let c = SimConfig::default();
        assert_eq!(c.max_cycles, 100);
        assert!(c.idle_threshold.is_none());
        assert!(!c.random_order);
    }

    #[test]
    fn config_json_overrides_subset() {
        let c: SimConfig =
            serde_json::from_str(r#"{"max_cycles": 7, "idle_threshold": 3}"#).unwrap();
        assert_eq!(c.max_cycles, 7);
        assert_eq!(c.idle_threshold, Some(3));
        assert_eq!(c.fifo_capacity, 8);
    }

    #[test]
    fn hex_basic_words_and_comments() {
        let mut words = [0u64; 4];
        parse_hex(
            &mut words,
            "// header\ndead_beef\n01\n\n// tail\nff\n",
        )
        .unwrap();
        assert_eq!(words, [0xdead_beef, 0x01, 0xff, 0]);
    }

    #[test]
    fn hex_addr_directive_moves_cursor() {
        let mut words = [0u64; 8];
        parse_hex(&mut words, "@4\naa\nbb\n@1\ncc\n").unwrap();
        assert_eq!(words[4], 0xaa);
        assert_eq!(words[5], 0xbb);
        assert_eq!(words[1], 0xcc);
    }

    #[test]
    fn hex_rejects_garbage_and_overflow() {
        let mut words = [0u64; 2];
        assert!(matches!(
            parse_hex(&mut words, "xyz\n"),
            Err(HexError::Parse { line: 1, .. })
        ));
        assert!(matches!(
            parse_hex(&mut words, "@2\n11\n"),
            Err(HexError::Range { line: 2, addr: 2 })
        ));
    }
}
