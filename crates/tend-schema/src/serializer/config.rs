use super::ConfigSerializer;
use crate::value::{ConfigMap, ConfigValue};
use std::io::Write;

/// Typed `key=value` lines.
///
/// ```text
/// name="db"
/// port=L"5432"
/// ratio=D"0.5"
/// debug=B"true"
/// hosts=["a","b"]
/// ports=L["1","2"]
/// ```
///
/// Strings carry no type prefix. A list is prefixed with its element type
/// when every element shares one, otherwise its elements are written as
/// strings.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConfigFormatSerializer;

impl ConfigSerializer for ConfigFormatSerializer {
    fn serialize(&self, map: &ConfigMap, out: &mut dyn Write) -> std::io::Result<()> {
        for (key, value) in map {
            writeln!(out, "{}={}", escape_key(key), render(value))?;
        }
        out.flush()
    }
}

fn type_code(value: &ConfigValue) -> Option<char> {
    match value {
        ConfigValue::Integer(_) => Some('L'),
        ConfigValue::Float(_) => Some('D'),
        ConfigValue::Boolean(_) => Some('B'),
        ConfigValue::String(_) | ConfigValue::List(_) => None,
    }
}

fn render(value: &ConfigValue) -> String {
    match value {
        ConfigValue::List(items) => {
            let first = items.first().and_then(type_code);
            let code = first.filter(|c| items.iter().all(|v| type_code(v) == Some(*c)));
            let body: Vec<String> = items
                .iter()
                .map(|v| quote(&v.to_plain_string()))
                .collect();
            format!(
                "{}[{}]",
                code.map(String::from).unwrap_or_default(),
                body.join(",")
            )
        }
        scalar => format!(
            "{}{}",
            type_code(scalar).map(String::from).unwrap_or_default(),
            quote(&scalar.to_plain_string())
        ),
    }
}

fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

fn escape_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for c in key.chars() {
        if matches!(c, ' ' | '=' | '\\' | '"') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
