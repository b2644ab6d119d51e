//! The three-tier fallback cascade producing chapter boundaries (spec.md
//! §4.8): HintParse → MultiShot-4k → MultiShot-16k → OneByOne. Prompts and
//! budgets are grounded in `examples/original_source/prompt.py`.

use serde_json::Value;
use tracing::{info, warn};

use crate::chunker::{pack_under_budget, ChunkRenderer};
use crate::config::{top_p, ModelTier, OrchestratorConfig};
use crate::error::CoreError;
use crate::events::EventBus;
use crate::llm::{ChatMessage, LlmClient};
use crate::model::{Chapter, ChapterHint, EventBusMessage, Slicer, Style, SummaryPayload, SummaryState, TimedText};
use crate::token_counter::{CountableMessage, TokenCounter};

/// `GENERATE_MULTI_CHAPTERS_TOKEN_LIMIT` (`prompt.py`): `GPT_3_5_TURBO - 512`.
const MULTISHOT_SMALL_BUDGET: usize = 3584;
/// `GENERATE_ONE_CHAPTER_TOKEN_LIMIT`: `GPT_3_5_TURBO - 160`.
const ONE_BY_ONE_BUDGET: usize = 3936;
/// Same shape as the small budget, scaled to the large model's window.
const MULTISHOT_LARGE_MARGIN: u32 = 512;

const MULTISHOT_SYSTEM_TEMPLATE: &str = r#"Given the following video subtitles represented as a JSON array as shown below:

```json
[
  {
    "start": int field, the subtitle start time in seconds.
    "text": string field, the subtitle text itself.
  }
]
```

Please generate the subtitles' outlines from top to bottom,
and extract an useful information from each outline context;
each useful information should end with a period;
exclude the introduction at the beginning and the conclusion at the end;
exclude text like "[Music]", "[Applause]", "[Laughter]" and so on.

Return a JSON array as shown below:

```json
[
  {
    "outline": string field, a brief outline title in language "{lang}".
    "information": string field, an useful information in the outline context in language "{lang}".
    "start": int field, the start time of the outline in seconds.
    "timestamp": string field, the start time of the outline in "HH:mm:ss" format.
  }
]
```

Please output JSON only.
Do not output any redundant explanation."#;

const ONE_BY_ONE_SYSTEM_TEMPLATE: &str = r#"Given a part of video subtitles JSON array as shown below:

```json
[
  {
    "index": int field, the subtitle line index.
    "start": int field, the subtitle start time in seconds.
    "text": string field, the subtitle text itself.
  }
]
```

Your job is trying to generate the subtitles' outline with follow steps:

1. Extract an useful information as the outline context,
2. exclude out-of-context parts and irrelevant parts,
3. exclude text like "[Music]", "[Applause]", "[Laughter]" and so on,
4. summarize the useful information to one-word as the outline title.

Please return a JSON object as shown below:

```json
{
  "end_at": int field, the outline context end at which subtitle index.
  "start": int field, the start time of the outline context in seconds, must >= {start_time}.
  "timestamp": string field, the start time of the outline context in "HH:mm:ss" format.
  "outline": string field, the outline title in language "{lang}".
}
```

Please output JSON only.
Do not output any redundant explanation."#;

pub struct Chapterizer<'a> {
    pub llm: &'a dyn LlmClient,
    pub counter: &'a dyn TokenCounter,
    pub config: &'a OrchestratorConfig,
}

impl<'a> Chapterizer<'a> {
    /// Runs the cascade and returns the resulting chapter list. Never
    /// returns an empty `Vec` on `Ok` without having actually tried every
    /// tier; the caller is responsible for surfacing a fatal error to the
    /// orchestrator if the result is empty.
    pub async fn chapterize(
        &self,
        vid: &str,
        trigger: &str,
        lang: &str,
        captions: &[TimedText],
        hints: &[ChapterHint],
        api_key: Option<&str>,
        bus: &dyn EventBus,
    ) -> Result<Vec<Chapter>, CoreError> {
        if captions.is_empty() {
            return Ok(Vec::new());
        }

        if let Some(chapters) = self.hint_parse(vid, trigger, lang, hints) {
            info!(vid, count = chapters.len(), "chapterizer: hints parsed");
            return Ok(chapters);
        }

        if let Some(chapters) = self
            .multi_shot(vid, trigger, lang, captions, ModelTier::Small, MULTISHOT_SMALL_BUDGET, api_key)
            .await?
        {
            info!(vid, count = chapters.len(), "chapterizer: multishot-4k succeeded");
            return Ok(chapters);
        }

        let large_budget = (self.config.large_model_window.saturating_sub(MULTISHOT_LARGE_MARGIN)) as usize;
        if let Some(chapters) = self
            .multi_shot(vid, trigger, lang, captions, ModelTier::Large, large_budget, api_key)
            .await?
        {
            info!(vid, count = chapters.len(), "chapterizer: multishot-16k succeeded");
            return Ok(chapters);
        }

        let chapters = self.one_by_one(vid, trigger, lang, captions, api_key, bus).await?;
        info!(vid, count = chapters.len(), "chapterizer: one-by-one drained");
        Ok(chapters)
    }

    /// State A. Discards every hint if any timestamp fails to decode.
    fn hint_parse(&self, vid: &str, trigger: &str, lang: &str, hints: &[ChapterHint]) -> Option<Vec<Chapter>> {
        if hints.is_empty() {
            return None;
        }

        let mut chapters = Vec::with_capacity(hints.len());
        for hint in hints {
            let start = match decode_timestamp(&hint.timestamp) {
                Some(s) => s,
                None => {
                    warn!(vid, timestamp = %hint.timestamp, "chapterizer: hint timestamp undecodable, discarding all hints");
                    return None;
                }
            };
            let mut chapter = Chapter::new(vid, trigger, Slicer::Youtube);
            chapter.style = Style::Markdown;
            chapter.start = start;
            chapter.lang = lang.to_string();
            chapter.chapter = hint.title.clone();
            chapters.push(chapter);
        }
        chapters.sort_by_key(|c| c.start);
        Some(chapters)
    }

    /// States B/C. `None` means "over budget or unparseable, try the next tier".
    async fn multi_shot(
        &self,
        vid: &str,
        trigger: &str,
        lang: &str,
        captions: &[TimedText],
        tier: ModelTier,
        budget: usize,
        api_key: Option<&str>,
    ) -> Result<Option<Vec<Chapter>>, CoreError> {
        let system = MULTISHOT_SYSTEM_TEMPLATE.replace("{lang}", lang);
        let body = render_multishot_body(captions);
        let messages = vec![ChatMessage::system(system.clone()), ChatMessage::user(body.clone())];

        let countable: Vec<CountableMessage<'_>> = messages
            .iter()
            .map(|m| CountableMessage::new(m.role.as_str(), &m.content))
            .collect();
        if self.counter.count(&countable) >= budget {
            info!(vid, tier = ?tier, "chapterizer: multishot over budget, falling through");
            return Ok(None);
        }

        let content = self
            .llm
            .chat(&messages, tier, top_p::DETERMINISTIC, self.config.call_timeout, api_key)
            .await?;

        let entries: Vec<Value> = match serde_json::from_str(content.trim()) {
            Ok(Value::Array(items)) => items,
            _ => {
                warn!(vid, tier = ?tier, "chapterizer: multishot response unparseable, falling through");
                return Ok(None);
            }
        };
        if entries.is_empty() {
            return Ok(None);
        }

        let mut chapters = Vec::with_capacity(entries.len());
        for entry in &entries {
            let outline = entry.get("outline").and_then(Value::as_str);
            let information = entry.get("information").and_then(Value::as_str).unwrap_or("");
            let start = entry.get("start").and_then(Value::as_i64);
            let (Some(outline), Some(start)) = (outline, start) else {
                warn!(vid, tier = ?tier, "chapterizer: multishot entry missing required field, falling through");
                return Ok(None);
            };
            let mut chapter = Chapter::new(vid, trigger, Slicer::Llm);
            chapter.style = Style::Text;
            chapter.start = start.max(0);
            chapter.lang = lang.to_string();
            chapter.chapter = outline.to_string();
            chapter.summary = information.to_string();
            chapters.push(chapter);
        }
        chapters.sort_by_key(|c| c.start);
        Ok(Some(chapters))
    }

    /// State D. Publishes incremental `DOING` updates on `bus` as each
    /// chapter is produced.
    async fn one_by_one(
        &self,
        vid: &str,
        trigger: &str,
        lang: &str,
        captions: &[TimedText],
        api_key: Option<&str>,
        bus: &dyn EventBus,
    ) -> Result<Vec<Chapter>, CoreError> {
        let mut chapters: Vec<Chapter> = Vec::new();
        let mut idx: i64 = 0;
        let mut latest_end: i64 = -1;
        let len = captions.len() as i64;

        while idx < len {
            let start_time = captions[idx as usize].start as i64;
            let renderer = OneByOneRenderer {
                lang: lang.to_string(),
                start_time,
                base_idx: idx as usize,
            };
            let prefix = pack_under_budget(&captions[idx as usize..], &renderer, self.counter, ONE_BY_ONE_BUDGET);
            if prefix.is_empty() {
                warn!(vid, idx, "chapterizer: one-by-one chunk empty, terminating loop");
                break;
            }
            let messages = renderer_messages(&renderer, &prefix);

            let content = self
                .llm
                .chat(&messages, ModelTier::Small, top_p::DETERMINISTIC, self.config.call_timeout, api_key)
                .await?;

            let parsed: Value = match serde_json::from_str(content.trim()) {
                Ok(v) => v,
                Err(_) => {
                    warn!(vid, idx, "chapterizer: one-by-one response unparseable, terminating loop");
                    break;
                }
            };

            let Some(end_at) = parsed.get("end_at").and_then(Value::as_i64) else {
                // "If `end_at` is not an integer, terminate (treat as end-of-content)."
                break;
            };

            let outline = parsed.get("outline").and_then(Value::as_str);
            let start = parsed.get("start").and_then(Value::as_i64);
            if let (Some(outline), Some(start)) = (outline, start) {
                if start >= 0 {
                    let mut chapter = Chapter::new(vid, trigger, Slicer::Llm);
                    chapter.style = Style::Markdown;
                    chapter.start = start;
                    chapter.lang = lang.to_string();
                    chapter.chapter = outline.to_string();
                    chapters.push(chapter);
                    chapters.sort_by_key(|c| c.start);

                    bus.publish(
                        vid,
                        EventBusMessage::Summary(SummaryPayload {
                            state: SummaryState::Doing,
                            chapters: chapters.clone(),
                        }),
                    );
                }
            }

            if end_at <= latest_end {
                latest_end += 5;
                idx = latest_end;
            } else if end_at > idx {
                latest_end = idx;
                idx = latest_end + 1;
            } else {
                latest_end = end_at;
                idx = end_at + 1;
            }
        }

        Ok(chapters)
    }
}

/// `"1:02:03" → 3723`, `"02:03" → 123`, `"0:00" → 0`.
fn decode_timestamp(ts: &str) -> Option<i64> {
    let parts: Vec<&str> = ts.split(':').collect();
    let nums: Option<Vec<i64>> = parts.iter().map(|p| p.parse::<i64>().ok()).collect();
    let nums = nums?;
    match nums.as_slice() {
        [m, s] => Some(m * 60 + s),
        [h, m, s] => Some(h * 3600 + m * 60 + s),
        _ => None,
    }
}

fn render_multishot_body(captions: &[TimedText]) -> String {
    let array: Vec<Value> = captions
        .iter()
        .map(|t| serde_json::json!({"start": t.start as i64, "text": t.text}))
        .collect();
    serde_json::to_string(&array).unwrap_or_default()
}

struct OneByOneRenderer {
    lang: String,
    start_time: i64,
    base_idx: usize,
}

impl ChunkRenderer for OneByOneRenderer {
    fn render(&self, prefix: &[TimedText]) -> Vec<(String, String)> {
        renderer_tuples(self, prefix)
    }
}

fn renderer_tuples(renderer: &OneByOneRenderer, prefix: &[TimedText]) -> Vec<(String, String)> {
    let system = ONE_BY_ONE_SYSTEM_TEMPLATE
        .replace("{lang}", &renderer.lang)
        .replace("{start_time}", &renderer.start_time.to_string());
    let array: Vec<Value> = prefix
        .iter()
        .enumerate()
        .map(|(i, t)| serde_json::json!({"index": renderer.base_idx + i, "start": t.start as i64, "text": t.text}))
        .collect();
    let body = serde_json::to_string(&array).unwrap_or_default();
    vec![("system".to_string(), system), ("user".to_string(), body)]
}

fn renderer_messages(renderer: &OneByOneRenderer, prefix: &[TimedText]) -> Vec<ChatMessage> {
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

    #[test]
    fn decode_timestamp_matches_spec_examples() {
        assert_eq!(decode_timestamp("1:02:03"), Some(3723));
        assert_eq!(decode_timestamp("02:03"), Some(123));
        assert_eq!(decode_timestamp("0:00"), Some(0));
        assert_eq!(decode_timestamp("garbage"), None);
        assert_eq!(decode_timestamp("1:2:3:4"), None);
    }
}
