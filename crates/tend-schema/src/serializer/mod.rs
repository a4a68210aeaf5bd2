//! Text renderings of configuration records.
//!
//! Serializers are presentational only: external tooling uses them to show
//! or export a CONFIG payload. The reconciliation engine never calls them.

mod config;
mod json;
mod properties;

pub use config::ConfigFormatSerializer;
pub use json::JsonSerializer;
pub use properties::PropertiesSerializer;

use crate::value::ConfigMap;
use std::io::Write;
use std::str::FromStr;

/// Supported output formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
    /// A JSON object.
    Json,
    /// Typed `key=value` lines (`port=L"5432"`).
    Config,
    /// Flat `key=value` properties.
    Properties,
    /// The XML properties document.
    PropertiesXml,
}

impl Format {
    /// Conventional file extension for the format.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Config => "config",
            Self::Properties => "cfg",
            Self::PropertiesXml => "xml",
        }
    }
}

impl FromStr for Format {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "config" => Ok(Self::Config),
            "properties" | "cfg" => Ok(Self::Properties),
            "xml" | "properties-xml" => Ok(Self::PropertiesXml),
            other => Err(format!("Unknown format '{other}'")),
        }
    }
}

impl std::fmt::Display for Format {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Json => "json",
            Self::Config => "config",
            Self::Properties => "properties",
            Self::PropertiesXml => "properties-xml",
        })
    }
}

/// Writes a configuration map in one format.
pub trait ConfigSerializer: Send + Sync {
    /// Write `map` to `out`. The writer is flushed but not closed.
    ///
    /// # Errors
    ///
    /// Returns any I/O error from `out`, or an `InvalidData` error if a
    /// value cannot be represented in the format.
    fn serialize(&self, map: &ConfigMap, out: &mut dyn Write) -> std::io::Result<()>;

    /// Render `map` into a fresh buffer.
    ///
    /// # Errors
    ///
    /// See [`ConfigSerializer::serialize`].
    fn to_bytes(&self, map: &ConfigMap) -> std::io::Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.serialize(map, &mut buf)?;
        Ok(buf)
    }
}

/// Create the serializer for `format`.
pub fn serializer(format: Format) -> Box<dyn ConfigSerializer> {
    match format {
        Format::Json => Box::new(JsonSerializer),
        Format::Config => Box::new(ConfigFormatSerializer),
        Format::Properties => Box::new(PropertiesSerializer::plain()),
        Format::PropertiesXml => Box::new(PropertiesSerializer::xml()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::ConfigValue;

    fn sample() -> ConfigMap {
        let mut map = ConfigMap::new();
        map.insert("String-value".to_string(), ConfigValue::from("test"));
        map
    }

    #[test]
    fn every_format_renders_the_sample() {
        let expected = [
            (Format::Json, "{\n  \"String-value\": \"test\"\n}"),
            (Format::Config, "String-value=\"test\"\n"),
            (Format::Properties, "String-value=test\n"),
        ];
        for (format, text) in expected {
            let bytes = serializer(format).to_bytes(&sample()).unwrap();
            assert_eq!(String::from_utf8(bytes).unwrap(), text, "format {format}");
        }

        let xml = serializer(Format::PropertiesXml).to_bytes(&sample()).unwrap();
        let xml = String::from_utf8(xml).unwrap();
        assert!(xml.contains("<entry key=\"String-value\">test</entry>"));
    }

    #[test]
    fn format_names_parse() {
        assert_eq!("JSON".parse::<Format>(), Ok(Format::Json));
        assert_eq!("cfg".parse::<Format>(), Ok(Format::Properties));
        assert_eq!("xml".parse::<Format>(), Ok(Format::PropertiesXml));
        assert!("yaml".parse::<Format>().is_err());
    }
}
