//! # Report Handler
//!
//! Produces a report artifact from a read-only snapshot of the dataset.
//! Rendering is delegated to a [`ReportRenderer`] so the layout engine can be
//! swapped without touching dispatch.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use super::{MessageHandler, SharedDataset};
use crate::error::{Result, WorkerError};
use crate::messaging::{HandlerKind, WorkMessage, WorkerResult};
use crate::models::{Datum, ReportArtifact, ReportRequest, ReportSection};

/// Turns a validated request and its records into an artifact
pub trait ReportRenderer: Send + Sync {
    fn render(&self, request: &ReportRequest, records: &[Datum]) -> Result<ReportArtifact>;

    fn renderer_name(&self) -> &str;
}

/// Summarises the selected records per requested record type
#[derive(Debug, Clone, Copy, Default)]
pub struct SummaryReportRenderer;

impl ReportRenderer for SummaryReportRenderer {
    fn render(&self, request: &ReportRequest, records: &[Datum]) -> Result<ReportArtifact> {
        let sections = request
            .report_types
            .iter()
            .map(|report_type| {
                let matching: Vec<&Datum> = records
                    .iter()
                    .filter(|d| &d.datum_type == report_type)
                    .collect();
                let devices: BTreeSet<String> = matching
                    .iter()
                    .filter_map(|d| d.device_id.clone())
                    .collect();

                ReportSection {
                    section_type: report_type.clone(),
                    record_count: matching.len(),
                    devices: devices.into_iter().collect(),
                    first_time: matching.iter().filter_map(|d| d.time).min(),
                    last_time: matching.iter().filter_map(|d| d.time).max(),
                }
            })
            .collect();

        Ok(ReportArtifact {
            report_id: Uuid::new_v4(),
            generated_at: Utc::now(),
            patient_id: request.patient_id.clone(),
            endpoints: request.endpoints,
            sections,
        })
    }

    fn renderer_name(&self) -> &str {
        "summary"
    }
}

pub struct ReportHandler {
    dataset: SharedDataset,
    renderer: Arc<dyn ReportRenderer>,
}

impl ReportHandler {
    pub fn new(dataset: SharedDataset) -> Self {
        Self::with_renderer(dataset, Arc::new(SummaryReportRenderer))
    }

    pub fn with_renderer(dataset: SharedDataset, renderer: Arc<dyn ReportRenderer>) -> Self {
        Self { dataset, renderer }
    }

    fn parse_request(message: &WorkMessage) -> Result<ReportRequest> {
        let request: ReportRequest = serde_json::from_value(message.payload().clone())
            .map_err(|e| WorkerError::report_generation(format!("invalid request: {e}")))?;

        if request.report_types.is_empty() {
            return Err(WorkerError::report_generation("no report types requested"));
        }
        if let Some(range) = request.endpoints {
            if !range.is_valid() {
                return Err(WorkerError::report_generation(format!(
                    "report range is inverted: {} > {}",
                    range.start(),
                    range.end()
                )));
            }
        }
        Ok(request)
    }

    /// Copy out the records the request selects, then release the lock
    fn snapshot(&self, request: &mut ReportRequest) -> Vec<Datum> {
        let dataset = self.dataset.read();
        if request.patient_id.is_none() {
            request.patient_id = dataset.patient_id().map(String::from);
        }

        dataset
            .records()
            .iter()
            .filter(|d| {
                request
                    .endpoints
                    .map_or(true, |range| d.time.is_some_and(|t| range.contains(t)))
            })
            .filter(|d| {
                request.devices.is_empty()
                    || d.device_id
                        .as_ref()
                        .is_some_and(|device| request.devices.contains(device))
            })
            .cloned()
            .collect()
    }
}

#[async_trait]
impl MessageHandler for ReportHandler {
    async fn handle(&self, message: WorkMessage) -> Result<WorkerResult> {
        let mut request = Self::parse_request(&message)?;
        let records = self.snapshot(&mut request);

        debug!(
            request_id = %message.request_id(),
            renderer = self.renderer.renderer_name(),
            records = records.len(),
            "Report handler: rendering"
        );

        let report = self.renderer.render(&request, &records).map_err(|e| match e {
            WorkerError::ReportGeneration { .. } => e,
            other => WorkerError::report_generation(other.to_string()),
        })?;

        Ok(WorkerResult {
            report: Some(report),
            ..WorkerResult::default()
        })
    }

    fn handler_name(&self) -> &str {
        "report_handler"
    }

    fn kind(&self) -> HandlerKind {
        HandlerKind::Report
    }
}
