//! Format Validator (§4.8): a structural, parse-only sanity check of the
//! staged bytes before they're swapped into place.

use crate::error::{ConfdError, Result};
use std::path::Path;

/// Parse-check `content` as `format`. An empty/unknown format is always a
/// no-op success — `output_format` is optional in resource config.
pub fn validate_content(format: &str, content: &[u8]) -> Result<()> {
    if format.is_empty() {
        return Ok(());
    }

    match format.to_ascii_lowercase().as_str() {
        "json" => serde_json::from_slice::<serde_json::Value>(content)
            .map(|_| ())
            .map_err(|e| ConfdError::validation("json", e.to_string())),
        "yaml" | "yml" => serde_yaml::from_slice::<serde_yaml::Value>(content)
            .map(|_| ())
            .map_err(|e| ConfdError::validation("yaml", e.to_string())),
        "toml" => {
            let text = std::str::from_utf8(content)
                .map_err(|e| ConfdError::validation("toml", e.to_string()))?;
            text.parse::<toml::Value>()
                .map(|_| ())
                .map_err(|e| ConfdError::validation("toml", e.to_string()))
        }
        "xml" => {
            let mut reader = quick_xml::Reader::from_reader(content);
            let mut buf = Vec::new();
            loop {
                match reader.read_event_into(&mut buf) {
                    Ok(quick_xml::events::Event::Eof) => break,
                    Ok(_) => {}
                    Err(e) => return Err(ConfdError::validation("xml", e.to_string())),
                }
                buf.clear();
            }
            Ok(())
        }
        other => Err(ConfdError::configuration(
            "output_format",
            format!("unsupported output_format '{}'", other),
        )),
    }
}

/// Read `path` and run [`validate_content`] with the format inferred from
/// the caller-supplied `output_format`, not the file extension.
pub fn validate(format: &str, path: &Path) -> Result<()> {
    if format.is_empty() {
        return Ok(());
    }
    let content = std::fs::read(path)?;
    validate_content(format, &content)
}
