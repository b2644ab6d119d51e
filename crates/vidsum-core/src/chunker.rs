//! Pack caption lines into chat messages under a token budget (spec.md
//! §4.7). Deterministic and greedy: the returned prefix `P` satisfies
//! `tokens(render(P)) < limit`, and either `P` is the full input or
//! `tokens(render(P ++ [next])) >= limit`.

use crate::model::TimedText;
use crate::token_counter::{CountableMessage, TokenCounter};

/// Renders a prefix of captions into the message list that will actually be
/// sent to the LLM. Implementations own the prompt template; the chunker
/// only needs to know how a given prefix renders so it can measure it.
pub trait ChunkRenderer {
    /// Render `prefix` (a contiguous slice of the original caption array,
    /// always starting at index 0 of the slice passed to
    /// [`pack_under_budget`]) into the messages that would be sent.
    fn render(&self, prefix: &[TimedText]) -> Vec<(String, String)>;
}

/// A renderer that joins each caption line as `[text]`, one per line, inside
/// a single user message body built from a template with a `{lines}`
/// placeholder — the shape used by the Refiner's "first"/"next" prompts and
/// the Chapterizer's per-line JSON array (spec.md §4.9, §4.8 state D).
pub struct TemplateRenderer<'a> {
    pub system_prompt: &'a str,
    pub line_fmt: fn(&TimedText) -> String,
}

impl<'a> ChunkRenderer for TemplateRenderer<'a> {
    fn render(&self, prefix: &[TimedText]) -> Vec<(String, String)> {
        let body: String = prefix
            .iter()
            .map(|t| (self.line_fmt)(t))
            .collect::<Vec<_>>()
            .join("\n");
        vec![
            ("system".to_string(), self.system_prompt.to_string()),
            ("user".to_string(), body),
        ]
    }
}

/// Packs the largest caption prefix whose rendered message list stays
/// strictly under `limit` tokens.
pub fn pack_under_budget(
    captions: &[TimedText],
    renderer: &dyn ChunkRenderer,
    counter: &dyn TokenCounter,
    limit: usize,
) -> Vec<TimedText> {
    if captions.is_empty() {
        return Vec::new();
    }

    // Greedy expansion: grow the prefix one caption at a time, stopping the
    // moment the next addition would reach the limit.
    let mut end = 0usize;
    while end < captions.len() {
        let candidate = &captions[..end + 1];
        let rendered = renderer.render(candidate);
        let messages: Vec<CountableMessage<'_>> = rendered
            .iter()
            .map(|(role, content)| CountableMessage::new(role, content))
            .collect();
        if counter.count(&messages) >= limit {
            break;
        }
        end += 1;
    }

    captions[..end].to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::token_counter::ApproxTokenCounter;

    fn caption(start: f64, text: &str) -> TimedText {
        TimedText {
            start,
            duration: 1.0,
            lang: "en".to_string(),
            text: text.to_string(),
        }
    }

    fn renderer() -> TemplateRenderer<'static> {
        TemplateRenderer {
            system_prompt: "summarize",
            line_fmt: |t| format!("[{}]", t.text),
        }
    }

    #[test]
    fn empty_input_yields_empty_prefix() {
        let counter = ApproxTokenCounter;
        let r = renderer();
        let out = pack_under_budget(&[], &r, &counter, 100);
        assert!(out.is_empty());
    }

    #[test]
    fn prefix_stays_under_limit_and_is_maximal() {
        let captions: Vec<TimedText> = (0..50)
            .map(|i| caption(i as f64, "some reasonably long caption line of text"))
            .collect();
        let counter = ApproxTokenCounter;
        let r = renderer();
        let limit = 60;

        let prefix = pack_under_budget(&captions, &r, &counter, limit);

        let messages: Vec<(String, String)> = r.render(&prefix);
        let countable: Vec<CountableMessage<'_>> = messages
            .iter()
            .map(|(role, content)| CountableMessage::new(role, content))
            .collect();
        assert!(counter.count(&countable) < limit);

        if prefix.len() < captions.len() {
            let next = &captions[..prefix.len() + 1];
            let next_rendered = r.render(next);
            let next_countable: Vec<CountableMessage<'_>> = next_rendered
                .iter()
                .map(|(role, content)| CountableMessage::new(role, content))
                .collect();
            assert!(counter.count(&next_countable) >= limit);
        }
    }

    #[test]
    fn huge_limit_returns_the_full_array() {
        let captions: Vec<TimedText> = (0..5).map(|i| caption(i as f64, "hi")).collect();
        let counter = ApproxTokenCounter;
        let r = renderer();
        let prefix = pack_under_budget(&captions, &r, &counter, 100_000);
        assert_eq!(prefix.len(), captions.len());
    }
}
