//! Human-readable source citations.

use crate::models::{meta, Chunk, SourceType};

/// Format the citation for a chunk according to its source type.
///
/// | Source type | Format |
/// |-------------|--------|
/// | document | `[path, p.N]` (`p.?` without a page) |
/// | repository | `[github:repo/file]` |
/// | webpage | `[title - url]`, or `[url]` without a title |
pub fn format_citation(chunk: &Chunk) -> String {
    let location = chunk
        .location
        .as_deref()
        .map(str::trim)
        .filter(|l| !l.is_empty());

    match chunk.source_type {
        SourceType::Document => {
            format!("[{}, p.{}]", chunk.source, location.unwrap_or("?"))
        }
        SourceType::Repository => match location {
            Some(file) => format!(
                "[github:{}/{}]",
                chunk.source.trim_end_matches('/'),
                file.trim_start_matches('/')
            ),
            None => format!("[github:{}]", chunk.source),
        },
        SourceType::Webpage => match chunk
            .metadata_str(meta::TITLE)
            .map(str::trim)
            .filter(|t| !t.is_empty())
        {
            Some(title) => format!("[{} - {}]", title, chunk.source),
            None => format!("[{}]", chunk.source),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ContentCategory;
    use chrono::Utc;
    use serde_json::{Map, Value};

    fn chunk(source_type: SourceType, source: &str, location: Option<&str>) -> Chunk {
        Chunk {
            id: "c".to_string(),
            content: String::new(),
            source: source.to_string(),
            source_type,
            category: ContentCategory::Text,
            location: location.map(String::from),
            metadata: Map::new(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_document() {
        let c = chunk(SourceType::Document, "nano-r4.pdf", Some("7"));
        assert_eq!(format_citation(&c), "[nano-r4.pdf, p.7]");
        let c = chunk(SourceType::Document, "nano-r4.pdf", None);
        assert_eq!(format_citation(&c), "[nano-r4.pdf, p.?]");
    }

    #[test]
    fn test_repository() {
        let c = chunk(SourceType::Repository, "arduino/ArduinoCore-renesas", Some("variants/pins.h"));
        assert_eq!(
            format_citation(&c),
            "[github:arduino/ArduinoCore-renesas/variants/pins.h]"
        );
    }

    #[test]
    fn test_webpage() {
        let mut c = chunk(SourceType::Webpage, "https://docs.arduino.cc/nano", None);
        assert_eq!(format_citation(&c), "[https://docs.arduino.cc/nano]");
        c.metadata
            .insert(meta::TITLE.to_string(), Value::from("Nano R4 Guide"));
        assert_eq!(
            format_citation(&c),
            "[Nano R4 Guide - https://docs.arduino.cc/nano]"
        );
    }
}
