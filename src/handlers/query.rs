//! Windowed views over the accumulated records.

use crate::error::{Result, WorkerError};
use crate::constants::methods;
use crate::models::{DataQuery, DataWindow, Datum, Endpoints};

/// Previous, current and next partitions answering one query
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryWindows {
    pub prev: DataWindow,
    pub current: DataWindow,
    pub next: DataWindow,
}

/// Partition `records` around the query's endpoints
///
/// `prev` and `next` are the adjacent ranges of the same span. Without
/// endpoints every record lands in `current`. A stats-only query keeps the
/// per-date aggregations but carries no records.
pub fn build_windows(records: &[Datum], query: &DataQuery) -> Result<QueryWindows> {
    let types = query.requested_types();
    let wanted = |datum: &&Datum| types.map_or(true, |t| t.contains(&datum.datum_type));

    let mut windows = match query.endpoints {
        Some(range) if !range.is_valid() => {
            return Err(WorkerError::data_processing(
                methods::QUERY_DATA,
                format!("endpoints are inverted: {} > {}", range.start(), range.end()),
            ))
        }
        Some(range) => {
            let (Some(previous), Some(next)) = (range.previous(), range.next()) else {
                return Err(WorkerError::data_processing(
                    methods::QUERY_DATA,
                    format!(
                        "endpoints {} to {} leave no room for adjacent windows",
                        range.start(),
                        range.end()
                    ),
                ));
            };
            let window = |bounds: Endpoints| {
                DataWindow::from_records(
                    records
                        .iter()
                        .filter(wanted)
                        .filter(|d| d.time.is_some_and(|t| bounds.contains(t))),
                    Some(bounds),
                )
            };
            QueryWindows {
                prev: window(previous),
                current: window(range),
                next: window(next),
            }
        }
        None => QueryWindows {
            current: DataWindow::from_records(records.iter().filter(wanted), None),
            ..QueryWindows::default()
        },
    };

    if query.is_stats_only() {
        for window in [&mut windows.prev, &mut windows.current, &mut windows.next] {
            window.data.clear();
        }
    }

    Ok(windows)
}
