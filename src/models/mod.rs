//! Data records, windowed views, queries and report artifacts shared by the
//! worker and the caller-side store.

pub mod datum;
pub mod query;
pub mod report;
pub mod window;

// Re-export core models for easy access
pub use datum::{Datum, MetaData};
pub use query::DataQuery;
pub use report::{ReportArtifact, ReportRequest, ReportSection};
pub use window::{combine_unique, AggregationsByDate, DataWindow, Endpoints};
