//! Data types shared across the orchestrator: [`Chapter`], [`TimedText`],
//! [`ChapterHint`] and the small enums that tag them.

use serde::{Deserialize, Serialize};

/// Origin of a chapter's boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Slicer {
    /// User-supplied outline (a `ChapterHint`).
    Youtube,
    /// Model-inferred boundary.
    Llm,
}

/// Representation of a chapter's summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Style {
    /// Compact prose, produced in a single pass.
    Text,
    /// Iteratively refined bullet list.
    Markdown,
}

/// A single logical section of a video.
///
/// Invariants: within one video, chapters are ordered by `start` ascending;
/// `cid` is unique; `style = Text` implies `summary` was produced in a
/// single pass, `style = Markdown` implies it was iteratively refined.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chapter {
    /// Opaque unique id.
    pub cid: String,
    /// Video id this chapter belongs to.
    pub vid: String,
    /// Opaque user id that initiated the run that produced this chapter.
    pub trigger: String,
    pub slicer: Slicer,
    pub style: Style,
    /// Start time, in seconds, inclusive. Always `>= 0`.
    pub start: i64,
    /// BCP-47 language code.
    pub lang: String,
    /// Chapter title.
    pub chapter: String,
    /// Bulleted or prose summary; empty while pending refinement.
    #[serde(default)]
    pub summary: String,
    /// Number of refine passes beyond the first.
    #[serde(default)]
    pub refined: u32,
}

impl Chapter {
    pub fn new(vid: impl Into<String>, trigger: impl Into<String>, slicer: Slicer) -> Self {
        Self {
            cid: uuid::Uuid::new_v4().to_string(),
            vid: vid.into(),
            trigger: trigger.into(),
            slicer,
            style: Style::Markdown,
            start: 0,
            lang: String::new(),
            chapter: String::new(),
            summary: String::new(),
            refined: 0,
        }
    }
}

/// A single caption segment, as returned by a [`crate::captions::CaptionSource`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimedText {
    /// Start time, in seconds.
    pub start: f64,
    /// Duration, in seconds.
    pub duration: f64,
    /// BCP-47 language code.
    pub lang: String,
    pub text: String,
}

impl TimedText {
    /// Exclusive end time, in seconds.
    pub fn end(&self) -> f64 {
        self.start + self.duration
    }
}

/// An optional user-supplied outline entry, parsed by
/// [`crate::chapterizer::Chapterizer`]'s HintParse state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChapterHint {
    pub title: String,
    /// `H:MM:SS` or `MM:SS`.
    pub timestamp: String,
}

/// High-level progress of a summarize run, as observed by a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SummaryState {
    Nothing,
    Doing,
    Done,
}

/// Good/bad feedback counters for a video, as read via
/// [`crate::feedback::FeedbackReader`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Feedback {
    pub good: u32,
    pub bad: u32,
}

impl Feedback {
    /// Whether accumulated feedback is enough to judge, and if so, whether
    /// it crosses the re-summarize threshold (bad ratio >= 20%, with a
    /// minimum sample size of 10).
    pub fn needs_resummarize(&self) -> bool {
        let total = self.good + self.bad;
        if total < 10 {
            return false;
        }
        (self.bad as f64) / (total as f64) >= 0.20
    }
}

/// Payload of a `summary` event on the [`crate::events::EventBus`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryPayload {
    pub state: SummaryState,
    pub chapters: Vec<Chapter>,
}

/// A single `{event, data}` message delivered on an event bus channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "lowercase")]
pub enum EventBusMessage {
    Summary(SummaryPayload),
    Close,
}
