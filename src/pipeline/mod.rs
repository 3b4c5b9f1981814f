//! Two-stage generation pipeline: outline first, then a queued prose job.
//!
//! The outline call runs inline; only prose generation competes for the
//! shared rate budget, so it is handed to the queue and picked up by the
//! promotion loop like any other job.

use std::sync::Arc;

use crate::error::Result;
use crate::llm::GenerateClient;
use crate::queue::JobQueue;

/// Character-length window for a target volume tag. Unknown tags fall
/// through to the largest preset.
pub fn volume_bounds(target_volume: &str) -> (usize, usize) {
    match target_volume {
        "15k" => (15_000, 20_000),
        "30k" => (28_000, 34_000),
        "40k" => (40_000, 50_000),
        _ => (56_000, 68_000),
    }
}

/// A pipeline run request.
#[derive(Debug, Clone)]
pub struct PipelineRequest {
    pub owner_id: i64,
    pub source_text: String,
    /// Instructions for the outline stage
    pub outline_instructions: String,
    /// Optional outline included as a formatting reference
    pub sample_outline: Option<String>,
    /// Instructions for the prose stage
    pub prose_instructions: String,
    pub target_volume: String,
}

/// What the synchronous part of a run produces: the outline itself and
/// the id of the queued prose job.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub job_id: String,
    pub outline: String,
}

/// Drives outline generation and hands the prose stage to the queue.
pub struct Pipeline {
    client: Arc<dyn GenerateClient>,
    queue: Arc<JobQueue>,
}

impl Pipeline {
    pub fn new(client: Arc<dyn GenerateClient>, queue: Arc<JobQueue>) -> Self {
        Self { client, queue }
    }

    /// Generate an outline from the source text, then submit the prose job.
    ///
    /// Returns once the job is queued; completion is observed through the
    /// queue or the notification dispatcher.
    pub async fn run(&self, request: PipelineRequest) -> Result<PipelineOutput> {
        tracing::info!(
            owner_id = request.owner_id,
            volume = %request.target_volume,
            model = self.client.model(),
            "Starting pipeline run"
        );

        let outline = self
            .client
            .generate_outline(
                &request.source_text,
                &request.outline_instructions,
                request.sample_outline.as_deref(),
            )
            .await?;
        tracing::info!(outline_chars = outline.chars().count(), "Outline generated");

        let (min_length, max_length) = volume_bounds(&request.target_volume);
        let job_id = self.queue.submit(
            request.owner_id,
            outline.clone(),
            request.prose_instructions,
            request.target_volume,
            min_length,
            max_length,
        )?;

        Ok(PipelineOutput { job_id, outline })
    }
}
