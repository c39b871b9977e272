use std::io::Write;
use serde::ser::{Serialize, SerializeMap, Serializer};
use shared::types::ResolvedServiceRecord;
use crate::error::ReportError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    /// Single line terminated by '\n', for a continuous stream
    Compact,
    /// Indented, one document per destination
    Pretty,
}

/// Fixed-order view of a record. `name` is written twice, first from the
/// event envelope and then from the service info, so the emitted object
/// carries a duplicate key.
struct ReportDocument<'a>(&'a ResolvedServiceRecord);

impl Serialize for ReportDocument<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let record = self.0;
        let info = &record.info;

        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("name", &record.name)?;
        map.serialize_entry("type", record.service_type.as_str())?;
        map.serialize_entry("application", &info.application)?;
        map.serialize_entry("domain", &info.domain)?;
        map.serialize_entry("key", &info.key)?;
        map.serialize_entry("protocol", &info.protocol)?;
        map.serialize_entry("name", &info.name)?;
        map.serialize_entry("port", &info.port)?;
        map.serialize_entry("priority", &info.priority)?;
        map.serialize_entry("qn", &info.qualified_name)?;
        if !info.urls.is_empty() {
            map.serialize_entry("urls", &info.urls)?;
        }
        if !info.host_addresses.is_empty() {
            map.serialize_entry("hostAddresses", &info.host_addresses)?;
        }
        map.end()
    }
}

/// Writes one record as a JSON document. The writer is flushed but not closed,
/// so a stream can keep receiving documents.
pub fn write_report<W: Write>(
    writer: &mut W,
    record: &ResolvedServiceRecord,
    format: ReportFormat,
) -> Result<(), ReportError> {
    let document = ReportDocument(record);

    match format {
        ReportFormat::Compact => {
            serde_json::to_writer(&mut *writer, &document)?;
            writer.write_all(b"\n")?;
        }
        ReportFormat::Pretty => {
            serde_json::to_writer_pretty(&mut *writer, &document)?;
        }
    }

    writer.flush()?;
    Ok(())
}
