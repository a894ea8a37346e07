use std::collections::HashSet;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::ConfigError;

/// Brand voice handed to the planner, writer, and reviewer.
///
/// The `voice` text is passed through verbatim; nothing in the pipeline
/// interprets it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StyleProfile {
    pub brand_name: String,
    pub voice: String,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default)]
    pub hashtags: Vec<String>,
    /// Fallback posting time, `HH:MM`.
    #[serde(default = "default_post_time")]
    pub default_post_time: String,
    #[serde(default)]
    pub notes: Option<String>,
}

fn default_language() -> String {
    "nl".to_string()
}

fn default_post_time() -> String {
    "12:00".to_string()
}

#[derive(Debug, Deserialize)]
struct StyleFile {
    style: StyleProfile,
}

/// Load and validate the style profile from a YAML file.
///
/// # Errors
///
/// Returns `ConfigError` if the file cannot be read, parsed, or fails validation.
pub fn load_style(path: &Path) -> Result<StyleProfile, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::StyleFileIo {
        path: path.display().to_string(),
        source: e,
    })?;
    parse_style(&content)
}

fn parse_style(content: &str) -> Result<StyleProfile, ConfigError> {
    let file: StyleFile = serde_yaml::from_str(content)?;
    validate_style(&file.style)?;
    Ok(file.style)
}

fn validate_style(style: &StyleProfile) -> Result<(), ConfigError> {
    if style.brand_name.trim().is_empty() {
        return Err(ConfigError::Validation(
            "brand_name must be non-empty".to_string(),
        ));
    }

    if style.voice.trim().is_empty() {
        return Err(ConfigError::Validation(format!(
            "style for '{}' has an empty voice",
            style.brand_name
        )));
    }

    if !is_clock_time(&style.default_post_time) {
        return Err(ConfigError::Validation(format!(
            "default_post_time '{}' is not HH:MM",
            style.default_post_time
        )));
    }

    let mut seen = HashSet::new();
    for tag in &style.hashtags {
        let normalized = tag.trim_start_matches('#').to_lowercase();
        if normalized.is_empty() {
            return Err(ConfigError::Validation("empty hashtag".to_string()));
        }
        if !seen.insert(normalized) {
            return Err(ConfigError::Validation(format!("duplicate hashtag: '{tag}'")));
        }
    }

    Ok(())
}

/// `HH:MM` with a 24-hour clock.
#[must_use]
pub fn is_clock_time(value: &str) -> bool {
    let Some((h, m)) = value.split_once(':') else {
        return false;
    };
    if h.len() != 2 || m.len() != 2 {
        return false;
    }
    matches!((h.parse::<u8>(), m.parse::<u8>()), (Ok(h), Ok(m)) if h < 24 && m < 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = r"
style:
  brand_name: Koffiebar Noord
  voice: Warm, informal, speaks to regulars by name.
  hashtags: ['#koffie', '#noord']
  default_post_time: '08:15'
";

    #[test]
    fn parses_valid_style() {
        let style = parse_style(VALID).unwrap();
        assert_eq!(style.brand_name, "Koffiebar Noord");
        assert_eq!(style.language, "nl");
        assert_eq!(style.hashtags.len(), 2);
        assert_eq!(style.default_post_time, "08:15");
    }

    #[test]
    fn rejects_empty_voice() {
        let yaml = "style:\n  brand_name: X\n  voice: '  '\n";
        let err = parse_style(yaml).unwrap_err();
        assert!(err.to_string().contains("empty voice"));
    }

    #[test]
    fn rejects_duplicate_hashtags_case_insensitively() {
        let yaml = "style:\n  brand_name: X\n  voice: calm\n  hashtags: ['#Koffie', 'koffie']\n";
        let err = parse_style(yaml).unwrap_err();
        assert!(err.to_string().contains("duplicate hashtag"));
    }

    #[test]
    fn rejects_bad_post_time() {
        let yaml = "style:\n  brand_name: X\n  voice: calm\n  default_post_time: '25:00'\n";
        assert!(parse_style(yaml).is_err());
    }

    #[test]
    fn clock_time_checks() {
        assert!(is_clock_time("00:00"));
        assert!(is_clock_time("23:59"));
        assert!(!is_clock_time("9:30"));
        assert!(!is_clock_time("12:60"));
        assert!(!is_clock_time("noon"));
    }

    #[test]
    fn repo_style_file_is_valid() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("..")
            .join("..")
            .join("config")
            .join("style.yaml");
        let style = load_style(&path).expect("failed to load config/style.yaml");
        assert!(!style.brand_name.is_empty());
        assert!(is_clock_time(&style.default_post_time));
    }

    #[test]
    fn missing_file_reports_path() {
        let err = load_style(Path::new("/nonexistent/style.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::StyleFileIo { ref path, .. } if path.contains("nonexistent")));
    }
}
