// Session Runner
// Drives a document's segments through one or more stages in index order

use crate::models::{Message, ProcessingMode, Segment, Stage};
use crate::services::composer::{PromptComposer, StageOutput};
use crate::services::history::{compact_history, compress, history_length, CompressionPolicy};
use crate::services::observer::{CompletionObserver, TracingObserver};
use crate::services::prompts::StagePrompts;
use crate::services::providers::{CompletionBackend, ProviderError, DEFAULT_TEMPERATURE};
use crate::services::text_processor::effective_length;
use futures_util::StreamExt;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

/// Progress callbacks emitted while a session runs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Progress<'a> {
    SegmentStarted { stage: Stage, index: usize, total: usize },
    Chunk { stage: Stage, index: usize, text: &'a str },
    SegmentFinished { stage: Stage, index: usize, output: &'a str },
    HistoryCompressed { stage: Stage, before: usize, after: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentResult {
    pub index: usize,
    pub source_text: String,
    pub output_text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StageReport {
    pub stage: Stage,
    pub segments: Vec<SegmentResult>,
    pub compressions: usize,
}

impl StageReport {
    /// Outputs as the next stage's input, keeping source indices.
    pub fn output_segments(&self) -> Vec<Segment> {
        self.segments
            .iter()
            .map(|s| Segment {
                index: s.index,
                source_text: s.output_text.clone(),
                effective_length: effective_length(&s.output_text),
            })
            .collect()
    }

    pub fn text(&self) -> String {
        join_outputs(self.segments.iter().map(|s| s.output_text.as_str()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub run_id: String,
    pub mode: ProcessingMode,
    pub stages: Vec<StageReport>,
}

impl RunReport {
    /// Text produced by the last stage, segments separated by blank lines.
    pub fn final_text(&self) -> String {
        self.stages.last().map(StageReport::text).unwrap_or_default()
    }
}

fn join_outputs<'a>(outputs: impl Iterator<Item = &'a str>) -> String {
    outputs
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

pub type BackendFactory<'a> = dyn Fn(Stage) -> Result<Arc<dyn CompletionBackend>, ProviderError> + Send + Sync + 'a;

pub struct SessionRunner {
    run_id: Uuid,
    prompts: StagePrompts,
    policy: CompressionPolicy,
    streaming: bool,
    sampling: HashMap<Stage, (f32, Option<u32>)>,
    observer: Arc<dyn CompletionObserver>,
}

impl Default for SessionRunner {
    fn default() -> Self {
        Self::new(StagePrompts::default(), CompressionPolicy::default())
    }
}

impl SessionRunner {
    pub fn new(prompts: StagePrompts, policy: CompressionPolicy) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            prompts,
            policy,
            streaming: false,
            sampling: HashMap::new(),
            observer: Arc::new(TracingObserver),
        }
    }

    pub fn streaming(mut self, streaming: bool) -> Self {
        self.streaming = streaming;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn CompletionObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn with_sampling(mut self, stage: Stage, temperature: f32, max_tokens: Option<u32>) -> Self {
        self.sampling.insert(stage, (temperature, max_tokens));
        self
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    fn composer(&self, stage: Stage) -> PromptComposer {
        let (temperature, max_tokens) = self
            .sampling
            .get(&stage)
            .copied()
            .unwrap_or((DEFAULT_TEMPERATURE, None));
        PromptComposer::new(self.prompts.clone())
            .with_observer(Arc::clone(&self.observer))
            .with_sampling(temperature, max_tokens)
    }

    /// Process every segment through `stage`, strictly in index order.
    ///
    /// Each call sees the outputs of earlier segments as assistant turns.
    /// Before a segment is composed, history that outgrew the policy threshold
    /// is summarized and replaced by one system record. Nothing is compressed
    /// after the last segment.
    pub async fn run_stage<B, F>(
        &self,
        backend: &B,
        stage: Stage,
        segments: &[Segment],
        on_progress: &mut F,
    ) -> Result<StageReport, ProviderError>
    where
        B: CompletionBackend + ?Sized,
        F: FnMut(Progress<'_>),
    {
        let composer = self.composer(stage);
        let mut ordered: Vec<&Segment> = segments.iter().collect();
        ordered.sort_by_key(|s| s.index);

        let total = ordered.len();
        let started = Instant::now();
        info!(
            run_id = %self.run_id,
            stage = %stage,
            segments = total,
            streaming = self.streaming,
            "session.stage_started"
        );

        let mut history: Vec<Message> = Vec::new();
        let mut results = Vec::with_capacity(total);
        let mut compressions = 0usize;

        for segment in ordered {
            // Only history that a following segment will read is compacted.
            if self.policy.should_compress(&history) {
                let before = history_length(&history);
                let summary = compress(backend, &history, self.prompts.compression()).await?;
                history = compact_history(summary);
                compressions += 1;
                let after = history_length(&history);
                info!(run_id = %self.run_id, stage = %stage, before, after, "session.history_compacted");
                on_progress(Progress::HistoryCompressed { stage, before, after });
            }

            on_progress(Progress::SegmentStarted {
                stage,
                index: segment.index,
                total,
            });

            let output = composer
                .process(backend, stage, &segment.source_text, &history, self.streaming)
                .await;
            let text = match output {
                Ok(StageOutput::Text(text)) => text,
                Ok(StageOutput::Stream(mut stream)) => {
                    let mut text = String::new();
                    while let Some(chunk) = stream.next().await {
                        let chunk = chunk.map_err(|e| self.segment_failed(stage, segment.index, e))?;
                        on_progress(Progress::Chunk {
                            stage,
                            index: segment.index,
                            text: &chunk,
                        });
                        text.push_str(&chunk);
                    }
                    text
                }
                Err(e) => return Err(self.segment_failed(stage, segment.index, e)),
            };

            on_progress(Progress::SegmentFinished {
                stage,
                index: segment.index,
                output: &text,
            });
            history.push(Message::assistant(text.clone()));
            results.push(SegmentResult {
                index: segment.index,
                source_text: segment.source_text.clone(),
                output_text: text,
            });
        }

        info!(
            run_id = %self.run_id,
            stage = %stage,
            segments = total,
            compressions,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "session.stage_finished"
        );

        Ok(StageReport {
            stage,
            segments: results,
            compressions,
        })
    }

    /// Chain the stages of `mode`. Each stage starts with empty history and
    /// consumes the previous stage's outputs segment by segment.
    pub async fn run_mode<F>(
        &self,
        backend_for: &BackendFactory<'_>,
        mode: ProcessingMode,
        segments: &[Segment],
        on_progress: &mut F,
    ) -> Result<RunReport, ProviderError>
    where
        F: FnMut(Progress<'_>),
    {
        info!(run_id = %self.run_id, mode = mode.as_str(), segments = segments.len(), "session.started");

        let mut stages = Vec::with_capacity(mode.stages().len());
        let mut input: Vec<Segment> = segments.to_vec();
        for &stage in mode.stages() {
            let backend = backend_for(stage)?;
            let report = self.run_stage(backend.as_ref(), stage, &input, on_progress).await?;
            input = report.output_segments();
            stages.push(report);
        }

        Ok(RunReport {
            run_id: self.run_id.to_string(),
            mode,
            stages,
        })
    }

    fn segment_failed(&self, stage: Stage, index: usize, error: ProviderError) -> ProviderError {
        warn!(run_id = %self.run_id, stage = %stage, index, error = %error, "session.segment_failed");
        error
    }
}
