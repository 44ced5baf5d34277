// Placeholder scanning for question markup
//
// Widgets are declared inline in the question text as [[name:type:duration]],
// e.g. [[greeting:audio:1m30s]]. The scanner extracts well-formed placeholders
// in document order; anything between double brackets that does not match the
// grammar is left alone and renders as literal text.

use crate::media::MediaKind;
use anyhow::{Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Duration;
use thiserror::Error;

/// One parsed placeholder, before site settings are applied
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WidgetSpec {
    /// Widget name, also the filename stem of the eventual recording
    pub name: String,
    pub kind: MediaKind,
    /// Requested duration; None means "use the configured limit"
    pub duration: Option<Duration>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlaceholderError {
    #[error("placeholder name '{0}' is used more than once")]
    DuplicateName(String),
    #[error("placeholder '{0}' has a zero duration")]
    ZeroDuration(String),
}

/// Scans question markup for recording placeholders.
pub struct PlaceholderScanner {
    pattern: Regex,
}

impl PlaceholderScanner {
    pub fn new() -> Result<Self> {
        // Names longer than 32 characters fail the match and stay literal text
        let pattern = Regex::new(
            r"\[\[([a-z0-9_-]{1,32}):(audio|video|screen)(?::([0-9]+m[0-9]+s|[0-9]+s))?\]\]",
        )
        .context("Failed to compile placeholder pattern")?;

        Ok(Self { pattern })
    }

    /// Extract all well-formed placeholders from `markup`, in document order.
    pub fn scan(&self, markup: &str) -> Result<Vec<WidgetSpec>, PlaceholderError> {
        let mut specs = Vec::new();
        let mut seen = HashSet::new();

        for caps in self.pattern.captures_iter(markup) {
            let name = caps[1].to_string();
            let Some(kind) = MediaKind::from_tag(&caps[2]) else {
                continue;
            };

            if !seen.insert(name.clone()) {
                return Err(PlaceholderError::DuplicateName(name));
            }

            let duration = match caps.get(3) {
                Some(text) => {
                    let duration = parse_duration(text.as_str());
                    if duration.is_zero() {
                        return Err(PlaceholderError::ZeroDuration(name));
                    }
                    Some(duration)
                }
                None => None,
            };

            specs.push(WidgetSpec {
                name,
                kind,
                duration,
            });
        }

        Ok(specs)
    }
}

/// Parse a duration suffix: "1m30s" or "45s". The pattern guarantees the shape.
fn parse_duration(text: &str) -> Duration {
    let digits = text.trim_end_matches('s');
    let (minutes, seconds) = match digits.split_once('m') {
        Some((m, s)) => (
            m.parse::<u64>().unwrap_or(0),
            s.parse::<u64>().unwrap_or(0),
        ),
        None => (0, digits.parse::<u64>().unwrap_or(0)),
    };

    Duration::from_secs(minutes * 60 + seconds)
}
