//! Batched LLM enrichment of canonical records.
//!
//! Partitions the record sequence into contiguous batches, submits each as
//! one chat-completions request demanding a JSON array with exactly one
//! enriched text per record in stable order, and merges results back by
//! position. A failed batch passes its records through unchanged with an
//! error annotation — one bad batch never aborts the run.

use serde_json::{Value, json};
use tracing::{info, instrument, warn};

use zenrag_client::ApiClient;
use zenrag_shared::{CanonicalRecord, ZenragError};
use zenrag_shared::config::EnrichmentApiConfig;

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Generation parameters for one enrichment run. `temperature` is forwarded
/// opaquely to the API.
#[derive(Debug, Clone)]
pub struct EnrichmentOptions {
    pub model: String,
    pub batch_size: usize,
    /// Batch-level resubmission budget for unusable (but well-formed)
    /// responses. Transport retries live in the API client's own policy.
    pub max_retries: u32,
    pub temperature: f64,
}

impl From<&EnrichmentApiConfig> for EnrichmentOptions {
    fn from(config: &EnrichmentApiConfig) -> Self {
        Self {
            model: config.default_model.clone(),
            batch_size: config.batch_size.max(1),
            max_retries: config.max_retries,
            temperature: config.temperature,
        }
    }
}

// ---------------------------------------------------------------------------
// Batch lifecycle
// ---------------------------------------------------------------------------

/// Lifecycle of one batch: `Pending → Submitted → {Merged | Failed}`, with
/// `Submitted → Submitted` on each resubmission. Terminal states have no
/// further transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchState {
    Pending,
    Submitted,
    Merged,
    Failed,
}

/// One batch in flight: a contiguous slice of the record sequence plus its
/// index and retry counter.
#[derive(Debug)]
struct BatchJob {
    index: usize,
    state: BatchState,
    retries: u32,
}

impl BatchJob {
    fn new(index: usize) -> Self {
        Self {
            index,
            state: BatchState::Pending,
            retries: 0,
        }
    }

    fn submit(&mut self) {
        debug_assert!(matches!(
            self.state,
            BatchState::Pending | BatchState::Submitted
        ));
        if self.state == BatchState::Submitted {
            self.retries += 1;
        }
        self.state = BatchState::Submitted;
    }

    fn finish(&mut self, merged: bool) {
        debug_assert_eq!(self.state, BatchState::Submitted);
        self.state = if merged {
            BatchState::Merged
        } else {
            BatchState::Failed
        };
    }
}

// ---------------------------------------------------------------------------
// Progress reporting
// ---------------------------------------------------------------------------

/// Per-batch progress events; a pure sink with no feedback into processing.
pub trait EnrichProgress: Send + Sync {
    fn batch_started(&self, index: usize, total: usize, size: usize);
    fn batch_finished(&self, index: usize, merged: bool);
}

/// No-op progress for headless/test usage.
pub struct SilentEnrich;

impl EnrichProgress for SilentEnrich {
    fn batch_started(&self, _index: usize, _total: usize, _size: usize) {}
    fn batch_finished(&self, _index: usize, _merged: bool) {}
}

// ---------------------------------------------------------------------------
// Processor
// ---------------------------------------------------------------------------

/// Outcome of one enrichment run. `records` keeps the input order and
/// identity; only `content` (and failure annotations) differ.
#[derive(Debug)]
pub struct ProcessOutcome {
    pub records: Vec<CanonicalRecord>,
    pub batches_merged: usize,
    pub batches_failed: usize,
}

/// Batched enrichment processor over one enrichment API client.
///
/// The client's retry policy governs transport-level retries (429, 5xx,
/// timeouts); callers configure it from the same budget as
/// [`EnrichmentOptions::max_retries`].
pub struct BatchProcessor {
    client: ApiClient,
    options: EnrichmentOptions,
}

impl BatchProcessor {
    pub fn new(client: ApiClient, options: EnrichmentOptions) -> Self {
        Self { client, options }
    }

    /// Enrich `records` in contiguous batches. Never fails as a whole:
    /// enrichment-phase failures are isolated per batch.
    #[instrument(skip_all, fields(records = records.len(), batch_size = self.options.batch_size))]
    pub async fn process(
        &self,
        mut records: Vec<CanonicalRecord>,
        progress: &dyn EnrichProgress,
    ) -> ProcessOutcome {
        let batch_size = self.options.batch_size.max(1);
        let total_batches = records.len().div_ceil(batch_size);
        let mut batches_merged = 0;
        let mut batches_failed = 0;

        for (index, chunk) in records.chunks_mut(batch_size).enumerate() {
            progress.batch_started(index, total_batches, chunk.len());
            let mut job = BatchJob::new(index);

            match self.run_batch(&mut job, chunk).await {
                Ok(texts) => {
                    // Positional merge; counts were already verified.
                    for (record, text) in chunk.iter_mut().zip(texts) {
                        record.content = text;
                    }
                    job.finish(true);
                    batches_merged += 1;
                }
                Err(error) => {
                    warn!(batch = index, retries = job.retries, %error, "batch enrichment failed");
                    for record in chunk.iter_mut() {
                        record.metadata.enrichment_error = Some(error.to_string());
                    }
                    job.finish(false);
                    batches_failed += 1;
                }
            }

            progress.batch_finished(index, job.state == BatchState::Merged);
        }

        info!(batches_merged, batches_failed, "enrichment run complete");

        ProcessOutcome {
            records,
            batches_merged,
            batches_failed,
        }
    }

    /// Submit one batch until it yields a usable response or the budget runs
    /// out. A response-count mismatch is terminal: resubmitting cannot fix a
    /// model that ignored the count constraint, and partial merges are never
    /// performed.
    async fn run_batch(
        &self,
        job: &mut BatchJob,
        chunk: &[CanonicalRecord],
    ) -> Result<Vec<String>, ZenragError> {
        let body = self.request_body(chunk);

        loop {
            job.submit();

            let texts = match self.client.post("chat/completions", &body).await {
                Ok(payload) => parse_batch_response(&payload),
                Err(error) => Err(error),
            };

            match texts {
                Ok(texts) if texts.len() == chunk.len() => return Ok(texts),
                Ok(texts) => {
                    return Err(ZenragError::EnrichmentMismatch {
                        expected: chunk.len(),
                        got: texts.len(),
                    });
                }
                Err(error @ ZenragError::Enrichment(_)) if job.retries < self.options.max_retries => {
                    warn!(
                        batch = job.index,
                        retry = job.retries + 1,
                        %error,
                        "unusable enrichment response, resubmitting batch"
                    );
                }
                Err(error) => return Err(error),
            }
        }
    }

    /// One chat-completions request covering the whole batch.
    fn request_body(&self, chunk: &[CanonicalRecord]) -> Value {
        let contents: Vec<&str> = chunk.iter().map(|r| r.content.as_str()).collect();
        let user_prompt = format!(
            "Below is a JSON array of {n} project-management records. Rewrite each \
             one as clear, self-contained documentation prose, preserving every \
             factual detail (identifiers, pipeline, epic, sprint, estimates, \
             labels, assignees, dependencies). Respond with only a JSON array of \
             exactly {n} strings, one rewritten text per input record, in the \
             same order.\n\n{records}",
            n = chunk.len(),
            records = serde_json::to_string_pretty(&contents).unwrap_or_default(),
        );

        json!({
            "model": self.options.model,
            "temperature": self.options.temperature,
            "messages": [
                {
                    "role": "system",
                    "content": "You rewrite project-tracker records into retrieval-ready documentation.",
                },
                {"role": "user", "content": user_prompt},
            ],
        })
    }
}

/// Extract the enriched texts from a chat-completions payload.
///
/// The message content must itself be a JSON array of strings (code fences
/// tolerated). Anything else is an unusable response, eligible for
/// batch-level resubmission.
fn parse_batch_response(payload: &Value) -> Result<Vec<String>, ZenragError> {
    let content = payload["choices"][0]["message"]["content"]
        .as_str()
        .ok_or_else(|| {
            ZenragError::Enrichment("response has no message content".into())
        })?;

    serde_json::from_str::<Vec<String>>(strip_code_fences(content))
        .map_err(|e| ZenragError::Enrichment(format!("message content is not a string array: {e}")))
}

/// Strip a surrounding markdown code fence, if present.
fn strip_code_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    inner.strip_suffix("```").unwrap_or(inner).trim()
}
