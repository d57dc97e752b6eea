// Manifest parsing: encryption declaration and ordered segment references.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::DownloadError;

const KEY_TAG: &str = "#EXT-X-KEY:";
const SEGMENT_SUFFIX: &str = ".ts";
const AUTHORIZED_SEGMENT_MARKER: &str = "ts?";
const AUTH_PARAM: &str = "auth_key=";

static KEY_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    // attributes between METHOD and URI (IV, KEYFORMAT) are skipped
    Regex::new(r#"#EXT-X-KEY:METHOD=([^,]*),(?:[^,]*,)*?URI="([^"]*)""#)
        .expect("static key pattern is valid")
});

/// Encryption declared by the manifest's key tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EncryptionInfo {
    pub method: String,
    /// Absolute key URL
    pub key_url: String,
}

/// A parsed playlist. `segments` is in playback order and is never
/// reordered after parsing.
#[derive(Debug, Clone)]
pub struct Manifest {
    pub source_url: String,
    pub text: String,
    pub encryption: Option<EncryptionInfo>,
    pub segments: Vec<String>,
}

impl Manifest {
    pub fn parse(text: impl Into<String>, source_url: &str) -> Result<Self, DownloadError> {
        let text = text.into();
        let base = base_path(source_url);
        let lines: Vec<&str> = text.lines().map(str::trim).collect();

        let encryption = match lines.iter().find(|line| line.starts_with(KEY_TAG)) {
            Some(line) => {
                let caps = KEY_PATTERN.captures(line).ok_or_else(|| {
                    DownloadError::Manifest(format!("failed to parse encryption tag: {line}"))
                })?;
                Some(EncryptionInfo {
                    method: caps[1].to_string(),
                    key_url: resolve(base, &caps[2]),
                })
            }
            None => None,
        };

        let segments: Vec<String> = lines
            .iter()
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .filter(|line| is_segment_reference(line))
            .map(|line| resolve(base, line))
            .collect();

        if segments.is_empty() {
            return Err(DownloadError::Manifest(
                "no segment references found".to_string(),
            ));
        }

        Ok(Self {
            source_url: source_url.to_string(),
            text,
            encryption,
            segments,
        })
    }
}

fn is_segment_reference(line: &str) -> bool {
    line.ends_with(SEGMENT_SUFFIX)
        || (line.contains(AUTHORIZED_SEGMENT_MARKER) && line.contains(AUTH_PARAM))
}

/// Everything in `source_url` up to and including its last `/`.
pub fn base_path(source_url: &str) -> &str {
    match source_url.rfind('/') {
        Some(pos) => &source_url[..=pos],
        None => "",
    }
}

fn resolve(base: &str, reference: &str) -> String {
    if reference.starts_with("http://") || reference.starts_with("https://") {
        reference.to_string()
    } else {
        format!("{base}{reference}")
    }
}
