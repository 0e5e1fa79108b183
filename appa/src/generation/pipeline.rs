use std::sync::Arc;
use std::time::Duration;

use async_stream::try_stream;
use futures::stream::BoxStream;
use futures::StreamExt;
use tracing::{debug, info};

use crate::cache::CacheManager;
use crate::config::GenerationConfig;
use crate::error::Result;
use crate::models::{AnalyticsRecord, AnswerRequest};
use crate::recovery::{normalize_plain_text, recover, RecoveryRoute};
use crate::retrieval::RetrievalOutcome;
use crate::traits::{AnalyticsSink, LanguageModel};

use super::prompts;

/// Turns a request plus its retrieval outcome into final answer text.
/// Owns the response cache consult/admit cycle, output recovery, and
/// fire-and-forget analytics.
#[derive(Clone)]
pub struct GenerationPipeline {
    model: Arc<dyn LanguageModel>,
    caches: Arc<CacheManager>,
    analytics: Option<Arc<dyn AnalyticsSink>>,
    config: GenerationConfig,
}

#[derive(Debug, Clone)]
pub struct GeneratedAnswer {
    pub text: String,
    pub route: RecoveryRoute,
    pub from_cache: bool,
}

impl GenerationPipeline {
    pub fn new(
        model: Arc<dyn LanguageModel>,
        caches: Arc<CacheManager>,
        analytics: Option<Arc<dyn AnalyticsSink>>,
        config: GenerationConfig,
    ) -> Self {
        Self {
            model,
            caches,
            analytics,
            config,
        }
    }

    pub fn prompts_for(&self, request: &AnswerRequest, retrieval: &RetrievalOutcome) -> (String, &'static str) {
        let system = prompts::system_prompt_for(&request.query, request.use_rag);
        let user = if request.use_rag {
            prompts::build_user_prompt(
                &request.query,
                &retrieval.context,
                &request.conversation_history,
                self.config.history_turns,
                retrieval.insufficient,
            )
        } else {
            prompts::build_direct_prompt(
                &request.query,
                &request.conversation_history,
                self.config.history_turns,
            )
        };
        (user, system)
    }

    /// Whole-response path. The cache stores raw model output, so cached
    /// and fresh responses go through the same recovery decoding.
    pub async fn generate(
        &self,
        request: &AnswerRequest,
        retrieval: &RetrievalOutcome,
    ) -> Result<GeneratedAnswer> {
        let (user_prompt, system_prompt) = self.prompts_for(request, retrieval);

        if let Some(raw) = self.caches.response.get(
            &user_prompt,
            &request.model,
            Some(system_prompt),
            &request.parameters,
        ) {
            debug!(model = %request.model, "Response cache hit");
            let recovered = recover(&raw);
            return Ok(GeneratedAnswer {
                text: recovered.text,
                route: recovered.route,
                from_cache: true,
            });
        }

        let raw = self
            .model
            .generate(
                &user_prompt,
                &request.model,
                Some(system_prompt),
                &request.parameters,
            )
            .await?;

        self.caches.response.put(
            &user_prompt,
            &request.model,
            Some(system_prompt),
            &request.parameters,
            &raw,
            false,
        );

        let recovered = recover(&raw);
        info!(
            model = %request.model,
            route = recovered.route.as_str(),
            "Generated answer"
        );
        Ok(GeneratedAnswer {
            text: recovered.text,
            route: recovered.route,
            from_cache: false,
        })
    }

    /// Streaming path. Bypasses the response cache and emits text in
    /// sentence-sized pieces: deltas accumulate in a buffer that is flushed
    /// through normalization at sentence punctuation or a newline, with the
    /// remainder flushed when the model stops. Fenced code passes through
    /// unnormalized, tracked across flushes.
    pub async fn generate_stream(
        &self,
        request: &AnswerRequest,
        retrieval: &RetrievalOutcome,
    ) -> Result<BoxStream<'static, Result<String>>> {
        let (user_prompt, system_prompt) = self.prompts_for(request, retrieval);

        let upstream = self
            .model
            .generate_stream(
                &user_prompt,
                &request.model,
                Some(system_prompt),
                &request.parameters,
            )
            .await?;

        let stream = try_stream! {
            let mut upstream = upstream;
            let mut buffer = String::new();
            let mut in_code = false;
            while let Some(delta) = upstream.next().await {
                let delta = delta?;
                buffer.push_str(&delta);
                if buffer.ends_with(['.', '!', '?', ':', '\n']) {
                    let piece = flush_piece(&mut buffer, &mut in_code);
                    if !piece.is_empty() {
                        yield piece;
                    }
                }
            }
            if !buffer.is_empty() {
                yield flush_piece(&mut buffer, &mut in_code);
            }
        };
        Ok(Box::pin(stream))
    }

    /// Records a usage event off the request path. Retries a few times with
    /// a linear backoff; a record that still fails is dropped with a log
    /// line and never affects the answer.
    pub fn record_analytics(&self, record: AnalyticsRecord) {
        let Some(sink) = self.analytics.clone() else {
            return;
        };
        let max_retries = self.config.analytics_max_retries;
        let backoff_ms = self.config.analytics_backoff_ms;
        tokio::spawn(async move {
            for attempt in 1..=max_retries {
                match sink.record(record.clone()).await {
                    Ok(()) => return,
                    Err(e) => {
                        debug!(attempt, error = %e, "Analytics record failed");
                        if attempt < max_retries {
                            tokio::time::sleep(Duration::from_millis(backoff_ms * attempt as u64))
                                .await;
                        }
                    }
                }
            }
            debug!(record_id = %record.id, "Analytics record dropped after retries");
        });
    }
}

/// Drains the buffer, normalizing any prose in it. `in_code` carries the
/// fence parity across flushes so code lines are not reflowed.
fn flush_piece(buffer: &mut String, in_code: &mut bool) -> String {
    let piece = std::mem::take(buffer);
    let fences = piece.matches("```").count();
    // A piece that starts inside a fence passes through untouched, even if
    // the fence closes partway in; guessing where code ends is worse than
    // skipping one normalization.
    let piece = if *in_code {
        piece
    } else {
        normalize_plain_text(&piece)
    };
    if fences % 2 == 1 {
        *in_code = !*in_code;
    }
    piece
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheManager;
    use crate::config::{CacheSettings, GenerationConfig};
    use crate::error::AppaError;
    use crate::models::GenerationParameters;
    use crate::traits::LanguageModel;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ScriptedModel {
        responses: Vec<String>,
        calls: AtomicUsize,
        stream_deltas: Vec<String>,
    }

    impl ScriptedModel {
        fn with_response(text: &str) -> Self {
            Self {
                responses: vec![text.to_string()],
                calls: AtomicUsize::new(0),
                stream_deltas: Vec::new(),
            }
        }

        fn with_deltas(deltas: &[&str]) -> Self {
            Self {
                responses: Vec::new(),
                calls: AtomicUsize::new(0),
                stream_deltas: deltas.iter().map(|s| s.to_string()).collect(),
            }
        }
    }

    #[async_trait]
    impl LanguageModel for ScriptedModel {
        async fn generate(
            &self,
            _prompt: &str,
            _model: &str,
            _system_prompt: Option<&str>,
            _parameters: &GenerationParameters,
        ) -> Result<String> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            self.responses
                .get(n.min(self.responses.len().saturating_sub(1)))
                .cloned()
                .ok_or_else(|| AppaError::Llm("no scripted response".to_string()))
        }

        async fn generate_stream(
            &self,
            _prompt: &str,
            _model: &str,
            _system_prompt: Option<&str>,
            _parameters: &GenerationParameters,
        ) -> Result<BoxStream<'static, Result<String>>> {
            let deltas = self.stream_deltas.clone();
            Ok(Box::pin(futures::stream::iter(
                deltas.into_iter().map(Ok),
            )))
        }
    }

    struct FlakySink {
        failures_before_success: usize,
        attempts: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl AnalyticsSink for FlakySink {
        async fn record(&self, _record: AnalyticsRecord) -> Result<()> {
            let n = self.attempts.fetch_add(1, Ordering::SeqCst);
            if n < self.failures_before_success {
                Err(AppaError::Internal("sink down".to_string()))
            } else {
                Ok(())
            }
        }
    }

    fn enabled_caches() -> Arc<CacheManager> {
        let settings = CacheSettings {
            enabled: true,
            ..CacheSettings::default()
        };
        Arc::new(CacheManager::new(&settings, &GenerationConfig::default()))
    }

    fn no_retrieval() -> RetrievalOutcome {
        RetrievalOutcome {
            context: String::new(),
            citations: Vec::new(),
            chunks: Vec::new(),
            insufficient: false,
            warnings: Vec::new(),
        }
    }

    fn pipeline_with(model: ScriptedModel) -> GenerationPipeline {
        GenerationPipeline::new(
            Arc::new(model),
            enabled_caches(),
            None,
            GenerationConfig::default(),
        )
    }

    fn cacheable_request() -> AnswerRequest {
        let mut request = AnswerRequest::new("what is in the report", "test-model");
        request.use_rag = false;
        request.parameters.temperature = Some(0.1);
        request
    }

    #[tokio::test]
    async fn test_second_identical_request_served_from_cache() {
        let model = ScriptedModel::with_response(
            "The report covers quarterly revenue and headcount changes.",
        );
        let pipeline = pipeline_with(model);
        let request = cacheable_request();
        let retrieval = no_retrieval();

        let first = pipeline.generate(&request, &retrieval).await.unwrap();
        assert!(!first.from_cache);
        let second = pipeline.generate(&request, &retrieval).await.unwrap();
        assert!(second.from_cache);
        assert_eq!(first.text, second.text);
    }

    #[tokio::test]
    async fn test_high_temperature_response_not_cached() {
        let model = ScriptedModel::with_response(
            "A long enough answer that would otherwise be admitted to the cache.",
        );
        let pipeline = pipeline_with(model);
        let mut request = cacheable_request();
        request.parameters.temperature = Some(0.9);
        let retrieval = no_retrieval();

        pipeline.generate(&request, &retrieval).await.unwrap();
        let second = pipeline.generate(&request, &retrieval).await.unwrap();
        assert!(!second.from_cache);
    }

    #[tokio::test]
    async fn test_structured_output_is_recovered() {
        let model = ScriptedModel::with_response(
            r#"{"text": "Use this: {CODE_BLOCK_0}", "codeBlocks": [{"language": "bash", "code": "cargo run"}]}"#,
        );
        let pipeline = pipeline_with(model);
        let answer = pipeline
            .generate(&cacheable_request(), &no_retrieval())
            .await
            .unwrap();
        assert_eq!(answer.route, RecoveryRoute::Structured);
        assert!(answer.text.contains("```bash\ncargo run\n```"));
    }

    #[tokio::test]
    async fn test_stream_flushes_at_sentence_boundaries() {
        let model = ScriptedModel::with_deltas(&[
            "First part",
            " of a sentence.",
            "Second",
            " sentence!",
            "tail without punctuation",
        ]);
        let pipeline = pipeline_with(model);
        let stream = pipeline
            .generate_stream(&cacheable_request(), &no_retrieval())
            .await
            .unwrap();
        let pieces: Vec<String> = stream.map(|r| r.unwrap()).collect().await;
        assert_eq!(
            pieces,
            vec![
                "First part of a sentence.".to_string(),
                "Second sentence!".to_string(),
                "tail without punctuation".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_stream_leaves_code_lines_alone() {
        let model = ScriptedModel::with_deltas(&[
            "Here:\n",
            "```python\n",
            "call(1,2)\n",
            "```\n",
            "done.",
        ]);
        let pipeline = pipeline_with(model);
        let stream = pipeline
            .generate_stream(&cacheable_request(), &no_retrieval())
            .await
            .unwrap();
        let joined: String = stream.map(|r| r.unwrap()).collect::<Vec<_>>().await.join("");
        assert!(joined.contains("call(1,2)"), "got: {}", joined);
    }

    #[tokio::test]
    async fn test_analytics_retries_until_success() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let sink = FlakySink {
            failures_before_success: 2,
            attempts: Arc::clone(&attempts),
        };
        let config = GenerationConfig {
            analytics_backoff_ms: 1,
            ..GenerationConfig::default()
        };
        let pipeline = GenerationPipeline::new(
            Arc::new(ScriptedModel::with_response("unused")),
            enabled_caches(),
            Some(Arc::new(sink)),
            config,
        );
        pipeline.record_analytics(AnalyticsRecord::new(
            "q",
            "m",
            true,
            12,
            vec!["doc-1".to_string()],
            5,
        ));
        for _ in 0..50 {
            if attempts.load(Ordering::SeqCst) >= 3 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_model_error_propagates() {
        let model = ScriptedModel {
            responses: Vec::new(),
            calls: AtomicUsize::new(0),
            stream_deltas: Vec::new(),
        };
        let pipeline = pipeline_with(model);
        let result = pipeline.generate(&cacheable_request(), &no_retrieval()).await;
        assert!(result.is_err());
    }
}
