use super::ConfigSerializer;
use crate::value::ConfigMap;
use std::io::Write;

/// Pretty-printed JSON object, keys in map order.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer;

impl ConfigSerializer for JsonSerializer {
    fn serialize(&self, map: &ConfigMap, out: &mut dyn Write) -> std::io::Result<()> {
        serde_json::to_writer_pretty(&mut *out, map)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        out.flush()
    }
}
