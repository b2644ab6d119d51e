//! Estimate chat-token counts consistent with the remote tokenizer
//! (spec.md §4.6), grounded in `examples/original_source/openai.py`'s
//! `count_tokens`, which walks a `cl100k_base`-style encoding.

/// A single message to be counted, shaped like a chat-completion message.
#[derive(Debug, Clone)]
pub struct CountableMessage<'a> {
    pub role: &'a str,
    pub content: &'a str,
    /// When present, the role's token cost is waived (spec.md §4.6: "an
    /// optional `name` field decrements role cost by 1").
    pub name: Option<&'a str>,
}

impl<'a> CountableMessage<'a> {
    pub fn new(role: &'a str, content: &'a str) -> Self {
        Self {
            role,
            content,
            name: None,
        }
    }
}

/// Estimates token counts for an ordered list of chat messages.
///
/// Implementations must stay consistent with whatever tokenizer the
/// `LlmClient`'s remote endpoint actually uses; this crate ships a
/// whitespace/punctuation-aware approximation (`ApproxTokenCounter`) that is
/// good enough to gate chunking decisions without pulling in a full BPE
/// tokenizer dependency.
pub trait TokenCounter: Send + Sync {
    fn count(&self, messages: &[CountableMessage<'_>]) -> usize;
}

/// A dependency-free token estimator.
///
/// Mirrors the framing rules from `examples/original_source/openai.py`:
/// every message adds a 4-token frame, every reply is primed with 2 tokens,
/// and a `name` field removes 1 token from the role's cost.
#[derive(Debug, Clone, Copy, Default)]
pub struct ApproxTokenCounter;

impl ApproxTokenCounter {
    /// A rough sub-word estimate: ~4 characters per token, with a floor of
    /// one token per non-empty field so short fields aren't undercounted.
    fn estimate_field_tokens(s: &str) -> usize {
        if s.is_empty() {
            return 0;
        }
        (s.chars().count() + 3) / 4
    }
}

impl TokenCounter for ApproxTokenCounter {
    fn count(&self, messages: &[CountableMessage<'_>]) -> usize {
        let mut total = 0usize;

        for message in messages {
            // Every message follows "<frame>{role/name}\n{content}<frame>".
            total += 4;
            total += Self::estimate_field_tokens(message.role);
            total += Self::estimate_field_tokens(message.content);

            if let Some(name) = message.name {
                total += Self::estimate_field_tokens(name);
                // If there's a "name", the "role" cost is waived.
                total = total.saturating_sub(1);
            }
        }

        // Every reply is primed with "<frame>assistant".
        total + 2
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_grow_with_message_count_and_length() {
        let counter = ApproxTokenCounter;
        let empty = counter.count(&[]);
        assert_eq!(empty, 2);

        let one = counter.count(&[CountableMessage::new("user", "hello")]);
        assert!(one > empty);

        let two = counter.count(&[
            CountableMessage::new("user", "hello"),
            CountableMessage::new("assistant", "hello there, how are you doing today?"),
        ]);
        assert!(two > one);
    }

    #[test]
    fn name_field_reduces_role_cost_by_one() {
        let counter = ApproxTokenCounter;
        let without_name = counter.count(&[CountableMessage::new("user", "x")]);
        let mut with_name = CountableMessage::new("user", "x");
        with_name.name = Some("alice");
        let with_name_count = counter.count(&[with_name]);
        // Adding a name adds its own tokens but removes 1 for role, so the
        // net effect is `len(name) in tokens - 1` relative to the bare role.
        assert!(with_name_count >= without_name);
    }
}
