//! Job runner for image transforms
//!
//! Transforms are synchronous and slow, so each job runs on the blocking pool,
//! never on the event loop. A semaphore bounds how many run at once. The
//! outcome goes back to the submitting user's runtime as an
//! `Event::JobFinished`.

mod command;

pub use command::CommandTransform;

use crate::runtime::Inbound;
use crate::state_machine::{ChatId, Event, Flow, JobOutcome, UserId};
use image::codecs::jpeg::JpegEncoder;
use image::DynamicImage;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::sync::{mpsc, Semaphore};

/// JPEG quality for delivered results
const JPEG_QUALITY: u8 = 90;

/// Everything a job needs, captured at submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRequest {
    pub job_id: String,
    pub flow: Flow,
    pub user_id: UserId,
    /// Where the result is delivered
    pub chat_id: ChatId,
    pub content_path: PathBuf,
    /// Required for stylization, ignored for painting
    pub style_path: Option<PathBuf>,
}

#[derive(Debug, Error)]
pub enum JobError {
    #[error("Content image missing: {0}")]
    MissingContent(String),
    #[error("Stylization job submitted without a style")]
    MissingStyle,
    #[error("Transform failed: {0}")]
    Transform(String),
    #[error("Failed to encode result: {0}")]
    Encode(String),
    #[error("Transform panicked: {0}")]
    Panicked(String),
}

/// A transformed image and how long the transform took
pub struct Rendered {
    pub image: DynamicImage,
    pub elapsed_secs: f64,
}

/// External image transform boundary
pub trait ImageTransform: Send + Sync {
    /// Transform `content`, optionally guided by `style`; blocks until done.
    /// `job_id` keeps scratch files of concurrent jobs on the same content apart.
    fn transform(
        &self,
        job_id: &str,
        content: &Path,
        style: Option<&Path>,
    ) -> Result<Rendered, JobError>;
}

/// One transform per flow
#[derive(Clone)]
pub struct Transforms {
    pub stylization: Arc<dyn ImageTransform>,
    pub painting: Arc<dyn ImageTransform>,
}

impl Transforms {
    fn for_flow(&self, flow: Flow) -> Arc<dyn ImageTransform> {
        match flow {
            Flow::Stylization => self.stylization.clone(),
            Flow::Painting => self.painting.clone(),
        }
    }
}

/// Offloads jobs onto the blocking pool
#[derive(Clone)]
pub struct JobRunner {
    transforms: Transforms,
    permits: Arc<Semaphore>,
}

impl JobRunner {
    pub fn new(transforms: Transforms, max_concurrent: usize) -> Self {
        Self {
            transforms,
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
        }
    }

    /// Start a job; returns immediately. `reply` receives exactly one
    /// `JobFinished` for this job unless the receiver is gone.
    pub fn submit(&self, request: JobRequest, reply: mpsc::Sender<Inbound>) {
        let transform = self.transforms.for_flow(request.flow);
        let permits = self.permits.clone();

        tokio::spawn(async move {
            let job_id = request.job_id.clone();
            let (user_id, chat_id, flow) = (request.user_id, request.chat_id, request.flow);

            // Closed semaphore never happens; treat it as a failed job anyway
            let Ok(permit) = permits.acquire_owned().await else {
                let outcome = JobOutcome::Failed {
                    error: "job runner shut down".to_string(),
                };
                let _ = reply
                    .send(Inbound::new(user_id, chat_id, Event::JobFinished { job_id, outcome }))
                    .await;
                return;
            };

            tracing::info!(job_id = %job_id, user_id, flow = %flow, "Running job");
            let result = tokio::task::spawn_blocking(move || run_job(transform.as_ref(), &request))
                .await
                .map_err(|e| JobError::Panicked(e.to_string()))
                .and_then(|r| r);
            drop(permit);

            let outcome = match result {
                Ok((jpeg, elapsed_secs)) => {
                    tracing::info!(job_id = %job_id, user_id, flow = %flow, elapsed_secs, "Job completed");
                    JobOutcome::Rendered { jpeg, elapsed_secs }
                }
                Err(e) => {
                    tracing::error!(job_id = %job_id, user_id, flow = %flow, error = %e, "Job failed");
                    JobOutcome::Failed {
                        error: e.to_string(),
                    }
                }
            };

            if reply
                .send(Inbound::new(user_id, chat_id, Event::JobFinished { job_id, outcome }))
                .await
                .is_err()
            {
                tracing::info!(user_id, "User runtime gone, dropping job result");
            }
        });
    }
}

/// Run the transform and encode its result; called on the blocking pool
fn run_job(transform: &dyn ImageTransform, request: &JobRequest) -> Result<(Vec<u8>, f64), JobError> {
    if !request.content_path.is_file() {
        return Err(JobError::MissingContent(
            request.content_path.display().to_string(),
        ));
    }
    let style = match request.flow {
        Flow::Stylization => Some(request.style_path.as_deref().ok_or(JobError::MissingStyle)?),
        Flow::Painting => None,
    };

    let started = Instant::now();
    let rendered = transform.transform(&request.job_id, &request.content_path, style)?;
    tracing::debug!(
        job_id = %request.job_id,
        wall_secs = started.elapsed().as_secs_f64(),
        "Transform returned"
    );

    let jpeg = encode_jpeg(&rendered.image)?;
    let elapsed_secs = rendered.elapsed_secs;
    // Release the bitmap before the (possibly slow) delivery
    drop(rendered);
    Ok((jpeg, elapsed_secs))
}

/// Encode as baseline RGB JPEG
pub fn encode_jpeg(image: &DynamicImage) -> Result<Vec<u8>, JobError> {
    let rgb = image.to_rgb8();
    let mut bytes = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut bytes, JPEG_QUALITY);
    rgb.write_with_encoder(encoder)
        .map_err(|e| JobError::Encode(e.to_string()))?;
    Ok(bytes)
}
