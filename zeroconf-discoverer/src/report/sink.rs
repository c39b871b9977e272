use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use shared::protocol::REPORT_FILE_EXTENSION;
use shared::types::ResolvedServiceRecord;
use crate::error::ReportError;
use crate::report::serializer::{write_report, ReportFormat};

/// Destination for drained records.
pub trait ReportSink {
    fn emit(&mut self, record: &ResolvedServiceRecord) -> Result<(), ReportError>;
}

/// Compact documents, one per line, on a shared stream such as stdout.
pub struct StreamSink<W: Write> {
    writer: W,
}

impl<W: Write> StreamSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    #[cfg(test)]
    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> ReportSink for StreamSink<W> {
    fn emit(&mut self, record: &ResolvedServiceRecord) -> Result<(), ReportError> {
        write_report(&mut self.writer, record, ReportFormat::Compact)
    }
}

/// One pretty-printed file per record, named after the record key.
pub struct DirectorySink {
    directory: PathBuf,
    prefix: String,
}

impl DirectorySink {
    pub fn new(directory: impl Into<PathBuf>, prefix: impl Into<String>) -> Self {
        Self {
            directory: directory.into(),
            prefix: prefix.into(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Path separators in the key would escape the directory, so they are replaced.
    pub fn path_for(&self, key: &str) -> PathBuf {
        let file_key: String = key
            .chars()
            .map(|c| if matches!(c, '/' | '\\' | '\0') { '_' } else { c })
            .collect();
        self.directory
            .join(format!("{}{}.{}", self.prefix, file_key, REPORT_FILE_EXTENSION))
    }
}

impl ReportSink for DirectorySink {
    fn emit(&mut self, record: &ResolvedServiceRecord) -> Result<(), ReportError> {
        let path = self.path_for(record.key());
        tracing::debug!("Write file for key: {}", record.key());

        let file = File::create(&path).map_err(|source| ReportError::File {
            path: path.clone(),
            source,
        })?;
        let mut writer = BufWriter::new(file);

        write_report(&mut writer, record, ReportFormat::Pretty)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainSummary {
    pub written: usize,
    pub failed: usize,
}

/// Emits every record in order. A failing record is logged and skipped.
pub fn drain(records: &[ResolvedServiceRecord], sink: &mut dyn ReportSink) -> DrainSummary {
    let mut summary = DrainSummary::default();

    for record in records {
        tracing::debug!("Writing {} (resolved at {})", record.key(), record.resolved_at);
        match sink.emit(record) {
            Ok(()) => summary.written += 1,
            Err(e) => {
                tracing::error!("Failed to write report for {}: {}", record.key(), e);
                summary.failed += 1;
            }
        }
    }

    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared::types::ServiceEvent;
    use crate::engine::mock::test_info;

    fn record(name: &str) -> ResolvedServiceRecord {
        let event = ServiceEvent::resolved(
            name,
            "_http._tcp.local.".into(),
            test_info(name, "_http._tcp.local.", 80),
        );
        ResolvedServiceRecord::from_event(&event).unwrap()
    }

    /// Fails for one key, accepts everything else
    struct FlakySink {
        fail_key: String,
        emitted: Vec<String>,
    }

    impl ReportSink for FlakySink {
        fn emit(&mut self, record: &ResolvedServiceRecord) -> Result<(), ReportError> {
            if record.key() == self.fail_key {
                return Err(std::io::Error::new(std::io::ErrorKind::Other, "disk full").into());
            }
            self.emitted.push(record.name.clone());
            Ok(())
        }
    }

    #[test]
    fn test_stream_sink_one_line_per_record() {
        let mut sink = StreamSink::new(Vec::new());

        let summary = drain(&[record("a"), record("b")], &mut sink);
        assert_eq!(summary, DrainSummary { written: 2, failed: 0 });

        let output = String::from_utf8(sink.into_inner()).unwrap();
        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with(r#"{"name":"a","#));
        assert!(lines[1].starts_with(r#"{"name":"b","#));
    }

    #[test]
    fn test_directory_sink_writes_pretty_file_per_key() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = DirectorySink::new(dir.path(), "zeroconf_");

        let summary = drain(&[record("printer")], &mut sink);
        assert_eq!(summary.written, 1);

        let path = dir.path().join("zeroconf_printer._http._tcp.local..json");
        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.starts_with("{\n  \"name\": \"printer\""));
    }

    #[test]
    fn test_path_for_replaces_separators() {
        let sink = DirectorySink::new("/reports", "zeroconf_");
        assert_eq!(
            sink.path_for("a/b._http._tcp.local."),
            PathBuf::from("/reports/zeroconf_a_b._http._tcp.local..json")
        );
    }

    #[test]
    fn test_missing_directory_fails_per_record() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = DirectorySink::new(dir.path().join("missing"), "zeroconf_");

        let summary = drain(&[record("a"), record("b")], &mut sink);
        assert_eq!(summary, DrainSummary { written: 0, failed: 2 });
    }

    #[test]
    fn test_failed_record_skipped_drain_continues() {
        let mut sink = FlakySink {
            fail_key: "b._http._tcp.local.".to_string(),
            emitted: Vec::new(),
        };

        let summary = drain(&[record("a"), record("b"), record("c")], &mut sink);

        assert_eq!(summary, DrainSummary { written: 2, failed: 1 });
        assert_eq!(sink.emitted, ["a", "c"]);
    }
}
