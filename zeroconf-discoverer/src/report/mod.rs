//! JSON reports for resolved services.

pub mod serializer;
pub mod sink;

pub use sink::{drain, DirectorySink, ReportSink, StreamSink};
