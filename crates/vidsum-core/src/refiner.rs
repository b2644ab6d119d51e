//! Per-chapter iterative bullet-list refinement (spec.md §4.9), run with
//! cooperative parallelism bounded by `refine_concurrency`. Prompts grounded
//! in `examples/original_source/prompt.py`'s `SUMMARIZE_FIRST_CHAPTER_*` /
//! `SUMMARIZE_NEXT_CHAPTER_*` templates.

use futures::stream::{self, StreamExt};
use tracing::{debug, warn};

use crate::chunker::{pack_under_budget, ChunkRenderer};
use crate::config::{top_p, ModelTier, OrchestratorConfig};
use crate::llm::{ChatMessage, LlmClient};
use crate::model::{Chapter, Style, TimedText};
use crate::token_counter::TokenCounter;

/// `SUMMARIZE_FIRST_CHAPTER_TOKEN_LIMIT`: `GPT_3_5_TURBO - 512`.
const FIRST_PASS_BUDGET: usize = 3584;
/// `SUMMARIZE_NEXT_CHAPTER_TOKEN_LIMIT`: `GPT_3_5_TURBO * 5 / 8`.
const NEXT_PASS_BUDGET: usize = 2560;

const FIRST_SYSTEM_TEMPLATE: &str = r#"Given a part of video subtitles about "{chapter}".
Please summarize and list the most important points of the subtitles.

The subtitles consists of many lines.
The format of each line is like `[text...]`, for example `[hello, world]`.

The output format should be a markdown bullet list, and each bullet point should end with a period.
The output language should be "{lang}" in ISO 639-1.

Please exclude line like "[Music]", "[Applause]", "[Laughter]" and so on.
Please merge similar viewpoints before the final output.
Please keep the output clear and accurate.

Do not output any redundant or irrelevant points.
Do not output any redundant explanation or information."#;

const NEXT_SYSTEM_TEMPLATE: &str = r#"We have provided an existing bullet list summary up to a certain point:

```
{summary}
```

We have the opportunity to refine the existing summary (only if needed) with some more content.

The content is a part of video subtitles about "{chapter}", consists of many lines.
The format of each line is like `[text...]`, for example `[hello, world]`.

Please refine the existing bullet list summary (only if needed) with the given content.
If the the given content isn't useful or doesn't make sense, don't refine the the existing summary.

The output format should be a markdown bullet list, and each bullet point should end with a period.
The output language should be "{lang}" in BCP 47.

Please exclude line like "[Music]", "[Applause]", "[Laughter]" and so on.
Please merge similar viewpoints before the final output.
Please keep the output clear and accurate.

Do not output any redundant or irrelevant points.
Do not output any redundant explanation or information."#;

/// Outcome of refining one run's whole chapter set.
pub struct RefineOutcome {
    pub chapters: Vec<Chapter>,
    /// Set if at least one chapter's refinement raised (spec.md §4.9:
    /// "mark the overall run as having exceptions but do not prevent other
    /// chapters from completing").
    pub has_exception: bool,
}

pub struct Refiner<'a> {
    pub llm: &'a dyn LlmClient,
    pub counter: &'a dyn TokenCounter,
    pub config: &'a OrchestratorConfig,
}

impl<'a> Refiner<'a> {
    /// Refines every chapter concurrently, bounded by
    /// `config.refine_concurrency`, and returns the updated set in `start`
    /// order together with an aggregate exception flag.
    pub async fn refine_all(&self, captions: &[TimedText], chapters: Vec<Chapter>, api_key: Option<&str>) -> RefineOutcome {
        let boundaries = next_starts(&chapters);
        let results: Vec<(Chapter, bool)> = stream::iter(chapters.into_iter().zip(boundaries))
            .map(|(chapter, next_start)| async move {
                let slice = slice_for(captions, chapter.start, next_start);
                match self.refine_one(&chapter, slice, api_key).await {
                    Ok(refined) => (refined, false),
                    Err(e) => {
                        warn!(vid = %chapter.vid, cid = %chapter.cid, error = %e, "refine failed for chapter");
                        (chapter, true)
                    }
                }
            })
            .buffer_unordered(self.config.refine_concurrency.max(1))
            .collect()
            .await;

        let has_exception = results.iter().any(|(_, failed)| *failed);
        let mut chapters: Vec<Chapter> = results.into_iter().map(|(c, _)| c).collect();
        chapters.sort_by_key(|c| c.start);

        RefineOutcome { chapters, has_exception }
    }

    /// Iteratively refines a single chapter's summary until a packing pass
    /// produces no new content (spec.md §4.9 step 4).
    async fn refine_one(
        &self,
        chapter: &Chapter,
        slice: &[TimedText],
        api_key: Option<&str>,
    ) -> Result<Chapter, crate::error::LlmError> {
        let mut chapter = chapter.clone();
        let mut offset = 0usize;
        let mut passes = 0u32;

        loop {
            let is_first = chapter.summary.is_empty();
            let renderer = RefineRenderer {
                lang: chapter.lang.clone(),
                chapter_title: chapter.chapter.clone(),
                existing_summary: chapter.summary.clone(),
                is_first,
            };
            let budget = if is_first { FIRST_PASS_BUDGET } else { NEXT_PASS_BUDGET };

            let remaining = &slice[offset.min(slice.len())..];
            if remaining.is_empty() {
                break;
            }
            let packed = pack_under_budget(remaining, &renderer, self.counter, budget);
            if packed.is_empty() {
                debug!(cid = %chapter.cid, "refine: packing pass produced no content, stopping");
                break;
            }

            let messages = renderer_messages(&renderer, &packed);
            let content = self
                .llm
                .chat(&messages, ModelTier::Small, top_p::FREE_FORM, self.config.call_timeout, api_key)
                .await?;

            chapter.summary = content.trim().to_string();
            offset += packed.len();
            passes += 1;

            if offset >= slice.len() {
                break;
            }
        }

        chapter.style = Style::Markdown;
        chapter.refined = passes.saturating_sub(1);
        Ok(chapter)
    }
}

/// For each chapter in `start`-sorted order, the `start` of the chapter
/// after it, or `f64::MAX` for the last one (spec.md §4.9 step 1: `slice =
/// caption lines with start ∈ [chapter.start, nextChapter.start)`).
fn next_starts(chapters: &[Chapter]) -> Vec<f64> {
    let mut sorted_starts: Vec<i64> = chapters.iter().map(|c| c.start).collect();
    sorted_starts.sort_unstable();

    chapters
        .iter()
        .map(|c| {
            sorted_starts
                .iter()
                .find(|&&s| s > c.start)
                .map(|&s| s as f64)
                .unwrap_or(f64::MAX)
        })
        .collect()
}

fn slice_for(captions: &[TimedText], start: i64, next_start: f64) -> &[TimedText] {
    let start = start as f64;
    let begin = captions.partition_point(|t| t.start < start);
    let end = captions.partition_point(|t| t.start < next_start);
    &captions[begin..end.max(begin)]
}

struct RefineRenderer {
    lang: String,
    chapter_title: String,
    existing_summary: String,
    is_first: bool,
}

impl ChunkRenderer for RefineRenderer {
    fn render(&self, prefix: &[TimedText]) -> Vec<(String, String)> {
        renderer_tuples(self, prefix)
    }
}

fn renderer_tuples(renderer: &RefineRenderer, prefix: &[TimedText]) -> Vec<(String, String)> {
    let system = if renderer.is_first {
        FIRST_SYSTEM_TEMPLATE
            .replace("{chapter}", &renderer.chapter_title)
            .replace("{lang}", &renderer.lang)
    } else {
        NEXT_SYSTEM_TEMPLATE
            .replace("{summary}", &renderer.existing_summary)
            .replace("{chapter}", &renderer.chapter_title)
            .replace("{lang}", &renderer.lang)
    };
    let body: String = prefix.iter().map(|t| format!("[{}]", t.text)).collect::<Vec<_>>().join("\n");
    vec![("system".to_string(), system), ("user".to_string(), body)]
}

fn renderer_messages(renderer: &RefineRenderer, prefix: &[TimedText]) -> Vec<ChatMessage> {
    renderer_tuples(renderer, prefix)
        .into_iter()
        .map(|(role, content)| match role.as_str() {
            "system" => ChatMessage::system(content),
            _ => ChatMessage::user(content),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Slicer;

    fn chapter(vid: &str, start: i64) -> Chapter {
        let mut c = Chapter::new(vid, "trigger1", Slicer::Llm);
        c.start = start;
        c
    }

    #[test]
    fn next_starts_uses_max_for_the_last_chapter() {
        let chapters = vec![chapter("v", 0), chapter("v", 10), chapter("v", 30)];
        let bounds = next_starts(&chapters);
        assert_eq!(bounds, vec![10.0, 30.0, f64::MAX]);
    }

    #[test]
    fn slice_for_selects_half_open_interval() {
        let captions = vec![
            TimedText { start: 0.0, duration: 1.0, lang: "en".into(), text: "a".into() },
            TimedText { start: 10.0, duration: 1.0, lang: "en".into(), text: "b".into() },
            TimedText { start: 20.0, duration: 1.0, lang: "en".into(), text: "c".into() },
        ];
        let slice = slice_for(&captions, 0, 20.0);
        assert_eq!(slice.len(), 2);
        assert_eq!(slice[1].text, "b");
    }
}
