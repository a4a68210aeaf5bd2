use super::ConfigSerializer;
use crate::value::ConfigMap;
use std::fmt::Write as _;
use std::io::Write;

const XML_HEADER: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"no\"?>\n\
<!DOCTYPE properties SYSTEM \"http://java.sun.com/dtd/properties.dtd\">\n";

/// Flat properties, either as `key=value` lines or as the XML document.
///
/// Every value is flattened to text; lists are joined with `,`.
#[derive(Debug, Clone, Copy)]
pub struct PropertiesSerializer {
    xml: bool,
}

impl PropertiesSerializer {
    /// `key=value` lines with properties escaping.
    pub fn plain() -> Self {
        Self { xml: false }
    }

    /// The `<properties>` XML document.
    pub fn xml() -> Self {
        Self { xml: true }
    }
}

impl ConfigSerializer for PropertiesSerializer {
    fn serialize(&self, map: &ConfigMap, out: &mut dyn Write) -> std::io::Result<()> {
        if self.xml {
            out.write_all(XML_HEADER.as_bytes())?;
            writeln!(out, "<properties>")?;
            for (key, value) in map {
                writeln!(
                    out,
                    "<entry key=\"{}\">{}</entry>",
                    escape_xml(key),
                    escape_xml(&value.to_plain_string())
                )?;
            }
            writeln!(out, "</properties>")?;
        } else {
            for (key, value) in map {
                writeln!(
                    out,
                    "{}={}",
                    escape_properties(key, true),
                    escape_properties(&value.to_plain_string(), false)
                )?;
            }
        }
        out.flush()
    }
}

fn escape_properties(s: &str, is_key: bool) -> String {
    let mut out = String::with_capacity(s.len());
    for (i, c) in s.chars().enumerate() {
        match c {
            ' ' if is_key || i == 0 => out.push_str("\\ "),
            '\\' => out.push_str("\\\\"),
            '\t' => out.push_str("\\t"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\x0c' => out.push_str("\\f"),
            '=' | ':' | '#' | '!' => {
                out.push('\\');
                out.push(c);
            }
            c if (c as u32) < 0x20 || (c as u32) > 0x7e => {
                let mut units = [0u16; 2];
                for unit in c.encode_utf16(&mut units) {
                    let _ = write!(out, "\\u{unit:04X}");
                }
            }
            c => out.push(c),
        }
    }
    out
}

fn escape_xml(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::ConfigValue;

    fn one(key: &str, value: ConfigValue) -> ConfigMap {
        let mut map = ConfigMap::new();
        map.insert(key.to_string(), value);
        map
    }

    #[test]
    fn plain_escapes_separators_and_unicode() {
        let map = one("a key", ConfigValue::from("x=y:é"));
        let text = String::from_utf8(PropertiesSerializer::plain().to_bytes(&map).unwrap()).unwrap();
        assert_eq!(text, "a\\ key=x\\=y\\:\\u00E9\n");
    }

    #[test]
    fn plain_joins_lists() {
        let map = one("hosts", ConfigValue::from(vec!["a", "b"]));
        let text = String::from_utf8(PropertiesSerializer::plain().to_bytes(&map).unwrap()).unwrap();
        assert_eq!(text, "hosts=a,b\n");
    }

    #[test]
    fn xml_escapes_markup() {
        let map = one("q", ConfigValue::from("<a & b>"));
        let text = String::from_utf8(PropertiesSerializer::xml().to_bytes(&map).unwrap()).unwrap();
        assert!(text.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\""));
        assert!(text.contains("<entry key=\"q\">&lt;a &amp; b&gt;</entry>"));
        assert!(text.ends_with("</properties>\n"));
    }
}
