//! Top-level state machine (spec.md §4.10): dedupe → fetch → chapterize →
//! refine → persist → publish. Bundles every collaborator behind `Arc<dyn
//! Trait>`, mirroring the facade shape of `querymt_agent::agent::handle::AgentHandle`.

use std::sync::Arc;
use tracing::{info, warn};

use crate::captions::{pick_preferred_language, CaptionSource};
use crate::chapterizer::Chapterizer;
use crate::config::OrchestratorConfig;
use crate::error::CoreError;
use crate::events::EventBus;
use crate::feedback::FeedbackReader;
use crate::model::{Chapter, ChapterHint, EventBusMessage, SummaryPayload, SummaryState};
use crate::refiner::Refiner;
use crate::registry::{no_captions_key, summarizing_key, JobRegistry};
use crate::store::ChapterStore;
use crate::token_counter::TokenCounter;

/// The response to a `summarize` request, before the caller translates it
/// into a concrete HTTP shape (spec.md §4.10).
pub enum SummarizeResponse {
    /// `DONE_RETURN`: synchronous result, already published to the channel.
    Done(Vec<Chapter>),
    /// `NOTHING_RETURN`: no captions available.
    Nothing,
    /// `SUBSCRIBE_RETURN`: caller should subscribe to `vid`'s channel.
    Subscribe,
}

/// A single summarize job's inputs, supplied by the out-of-scope HTTP
/// dispatcher (spec.md §6).
pub struct SummarizeRequest<'a> {
    pub vid: &'a str,
    pub trigger: &'a str,
    pub hints: Vec<ChapterHint>,
    pub no_transcript: bool,
    pub api_key: Option<String>,
}

/// Bundles every collaborator the orchestrator needs. Each is injected as a
/// trait object so tests can substitute fakes (spec.md §9: "the core must
/// accept [configuration] by injection to permit tests").
pub struct Orchestrator {
    pub registry: Arc<dyn JobRegistry>,
    pub store: Arc<dyn ChapterStore>,
    pub feedback: Arc<dyn FeedbackReader>,
    pub captions: Arc<dyn CaptionSource>,
    pub llm: Arc<dyn crate::llm::LlmClient>,
    pub counter: Arc<dyn TokenCounter>,
    pub bus: Arc<dyn EventBus>,
    pub config: OrchestratorConfig,
}

impl Orchestrator {
    /// Handles one `POST /summarize/{vid}`-shaped request end to end.
    pub async fn summarize(&self, req: SummarizeRequest<'_>) -> Result<SummarizeResponse, CoreError> {
        let vid = req.vid;
        let found = self.store.find_by_vid(vid, None).await?;

        if !found.is_empty() {
            let hint_forces_resummarize = !req.hints.is_empty()
                && found[0].slicer != crate::model::Slicer::Youtube;
            let feedback_forces_resummarize = self.needs_resummarize(vid, &found).await;

            if hint_forces_resummarize || feedback_forces_resummarize {
                info!(vid, "orchestrator: forced re-summarization, clearing cached state");
                self.store.delete_by_vid(vid).await?;
                self.registry.clear(&no_captions_key(vid)).await.ok();
                self.registry.clear(&summarizing_key(vid)).await.ok();
            } else {
                info!(vid, "orchestrator: serving cached chapters");
                self.registry.clear(&no_captions_key(vid)).await.ok();
                self.registry.clear(&summarizing_key(vid)).await.ok();
                self.publish_done(vid, &found);
                return Ok(SummarizeResponse::Done(found));
            }
        }

        let no_captions_known = self.registry.exists(&no_captions_key(vid)).await.unwrap_or(false);
        if no_captions_known || req.no_transcript {
            info!(vid, "orchestrator: negative-cached or explicit no_transcript, returning nothing");
            return Ok(SummarizeResponse::Nothing);
        }

        let already_running = self.registry.exists(&summarizing_key(vid)).await.unwrap_or(false);
        if already_running {
            info!(vid, "orchestrator: run already in flight, subscribing");
            return Ok(SummarizeResponse::Subscribe);
        }

        // Acquire the flag before fetching captions, to avoid a herd of
        // concurrent caption fetches racing the same video.
        self.registry
            .try_set(&summarizing_key(vid), self.config.summarizing_ttl)
            .await
            .ok();

        let (captions, lang) = match self.captions.fetch(vid).await {
            Ok((captions, lang)) if !captions.is_empty() => (captions, lang),
            Ok(_) => {
                warn!(vid, "orchestrator: caption source returned no lines");
                self.registry
                    .try_set(&no_captions_key(vid), self.config.no_captions_ttl)
                    .await
                    .ok();
                self.registry.clear(&summarizing_key(vid)).await.ok();
                return Ok(SummarizeResponse::Nothing);
            }
            Err(e) if e.is_terminal_negative() => {
                warn!(vid, error = %e, "orchestrator: captions unavailable, negative-caching");
                self.registry
                    .try_set(&no_captions_key(vid), self.config.no_captions_ttl)
                    .await
                    .ok();
                self.registry.clear(&summarizing_key(vid)).await.ok();
                return Ok(SummarizeResponse::Nothing);
            }
            Err(e) => {
                self.registry.clear(&summarizing_key(vid)).await.ok();
                return Err(CoreError::Captions(e));
            }
        };

        self.run_job(vid, req.trigger, &req.hints, captions, lang, req.api_key.as_deref())
            .await?;

        Ok(SummarizeResponse::Subscribe)
    }

    /// `RunChapterizer → Publish(DOING) → RunRefiner → Persist →
    /// Publish(DONE+CLOSE) → ClearFlag`.
    async fn run_job(
        &self,
        vid: &str,
        trigger: &str,
        hints: &[ChapterHint],
        captions: Vec<crate::model::TimedText>,
        lang: String,
        api_key: Option<&str>,
    ) -> Result<(), CoreError> {
        let chapterizer = Chapterizer {
            llm: self.llm.as_ref(),
            counter: self.counter.as_ref(),
            config: &self.config,
        };
        let chapters = chapterizer
            .chapterize(vid, trigger, &lang, &captions, hints, api_key, self.bus.as_ref())
            .await?;

        if chapters.is_empty() {
            warn!(vid, "orchestrator: chapterizer produced zero chapters, fatal");
            self.registry.clear(&summarizing_key(vid)).await.ok();
            self.bus.publish(vid, EventBusMessage::Close);
            return Err(CoreError::FatalSummarize);
        }

        self.publish_doing(vid, &chapters);

        let refiner = Refiner {
            llm: self.llm.as_ref(),
            counter: self.counter.as_ref(),
            config: &self.config,
        };
        let outcome = refiner.refine_all(&captions, chapters, api_key).await;
        if outcome.has_exception {
            warn!(vid, "orchestrator: one or more chapters failed to refine, continuing");
        }

        self.store.replace(vid, outcome.chapters.clone()).await?;
        self.publish_done(vid, &outcome.chapters);
        self.registry.clear(&summarizing_key(vid)).await.ok();

        Ok(())
    }

    async fn needs_resummarize(&self, vid: &str, found: &[Chapter]) -> bool {
        if found.iter().any(|c| c.summary.is_empty()) {
            return true;
        }
        match self.feedback.read(vid).await {
            Ok(feedback) => feedback.needs_resummarize(),
            Err(_) => false,
        }
    }

    fn publish_doing(&self, vid: &str, chapters: &[Chapter]) {
        self.bus.publish(
            vid,
            EventBusMessage::Summary(SummaryPayload {
                state: SummaryState::Doing,
                chapters: chapters.to_vec(),
            }),
        );
    }

    /// Publishes `SUMMARY(done)` then `CLOSE`, in that order (spec.md §9:
    /// "implementations must emit both in that order").
    fn publish_done(&self, vid: &str, chapters: &[Chapter]) {
        self.bus.publish(
            vid,
            EventBusMessage::Summary(SummaryPayload {
                state: SummaryState::Done,
                chapters: chapters.to_vec(),
            }),
        );
        self.bus.publish(vid, EventBusMessage::Close);
    }

    /// Subscribes to `vid`'s channel using the configured idle timeout.
    pub fn subscribe(&self, vid: &str) -> std::pin::Pin<Box<dyn futures::Stream<Item = EventBusMessage> + Send>> {
        self.bus.subscribe(vid, self.config.subscribe_idle_timeout)
    }
}

/// Convenience used by a [`CaptionSource`] implementation to pick a
/// language from what it reports is available, applying the orchestrator's
/// configured preference order rather than the crate-wide default.
pub fn select_language(config: &OrchestratorConfig, available: &[String]) -> Option<String> {
    pick_preferred_language(available, &config.language_preference).map(|s| s.to_string())
}
