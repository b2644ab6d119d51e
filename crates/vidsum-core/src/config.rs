//! Process-wide configuration, injected into every component (spec.md §9:
//! "Global mutable state" — the preference list and TTLs are process-wide
//! but must be accepted by injection so tests can vary them).

use std::time::Duration;

/// Chat-token window recognized for a model tier (spec.md §4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelTier {
    /// ~4k-token window, used for MultiShot-4k, OneByOne and the Refiner.
    Small,
    /// ~16k-token window, used for MultiShot-16k.
    Large,
}

/// Default top_p for a class of call (spec.md §6).
pub mod top_p {
    /// Used for structured/cascade calls where strict JSON parsing matters.
    pub const DETERMINISTIC: f32 = 0.1;
    /// Used for free-form refine calls.
    pub const FREE_FORM: f32 = 0.8;
}

/// The preference order used to pick a caption translation (spec.md §4.4).
pub const DEFAULT_LANGUAGE_PREFERENCE: &[&str] = &[
    "en", "es", "pt", "hi", "ko", "zh-Hans", "zh-Hant", "zh-CN", "zh-HK", "zh-TW", "zh", "ar",
    "id", "fr", "ja", "ru", "de",
];

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub llm_endpoint: String,
    pub small_model: String,
    pub large_model: String,
    /// Token window of the small model (spec.md SPEC_FULL §B: budgets are
    /// derived from this, e.g. `small_model_window - 512`).
    pub small_model_window: u32,
    pub large_model_window: u32,
    pub control_timeout: Duration,
    pub call_timeout: Duration,
    pub retry_count: u32,
    pub retry_wait: Duration,
    pub summarizing_ttl: Duration,
    pub no_captions_ttl: Duration,
    pub subscribe_idle_timeout: Duration,
    pub language_preference: Vec<String>,
    /// Upper bound on concurrently-running per-chapter refine tasks.
    pub refine_concurrency: usize,
}

impl OrchestratorConfig {
    pub fn builder() -> OrchestratorConfigBuilder {
        OrchestratorConfigBuilder::default()
    }

    pub fn token_window(&self, tier: ModelTier) -> u32 {
        match tier {
            ModelTier::Small => self.small_model_window,
            ModelTier::Large => self.large_model_window,
        }
    }

    pub fn model_name(&self, tier: ModelTier) -> &str {
        match tier {
            ModelTier::Small => &self.small_model,
            ModelTier::Large => &self.large_model,
        }
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            llm_endpoint: "https://api.openai.com/v1/chat/completions".to_string(),
            small_model: "gpt-3.5-turbo".to_string(),
            large_model: "gpt-4-32k".to_string(),
            small_model_window: 4096,
            large_model_window: 16384,
            control_timeout: Duration::from_secs(10),
            call_timeout: Duration::from_secs(90),
            retry_count: 5,
            retry_wait: Duration::from_secs(1),
            summarizing_ttl: Duration::from_secs(300),
            no_captions_ttl: Duration::from_secs(24 * 60 * 60),
            subscribe_idle_timeout: Duration::from_secs(300),
            language_preference: DEFAULT_LANGUAGE_PREFERENCE
                .iter()
                .map(|s| s.to_string())
                .collect(),
            refine_concurrency: 8,
        }
    }
}

/// Builder for [`OrchestratorConfig`], mirroring the construction style of
/// `querymt::builder::LLMBuilder`.
#[derive(Debug, Default)]
pub struct OrchestratorConfigBuilder {
    inner: PartialConfig,
}

#[derive(Debug, Default)]
struct PartialConfig {
    llm_endpoint: Option<String>,
    small_model: Option<String>,
    large_model: Option<String>,
    small_model_window: Option<u32>,
    large_model_window: Option<u32>,
    retry_count: Option<u32>,
    retry_wait: Option<Duration>,
    summarizing_ttl: Option<Duration>,
    no_captions_ttl: Option<Duration>,
    subscribe_idle_timeout: Option<Duration>,
    language_preference: Option<Vec<String>>,
    refine_concurrency: Option<usize>,
}

impl OrchestratorConfigBuilder {
    pub fn llm_endpoint(mut self, v: impl Into<String>) -> Self {
        self.inner.llm_endpoint = Some(v.into());
        self
    }

    pub fn models(mut self, small: impl Into<String>, large: impl Into<String>) -> Self {
        self.inner.small_model = Some(small.into());
        self.inner.large_model = Some(large.into());
        self
    }

    pub fn model_windows(mut self, small: u32, large: u32) -> Self {
        self.inner.small_model_window = Some(small);
        self.inner.large_model_window = Some(large);
        self
    }

    pub fn retry(mut self, count: u32, wait: Duration) -> Self {
        self.inner.retry_count = Some(count);
        self.inner.retry_wait = Some(wait);
        self
    }

    pub fn ttls(mut self, summarizing: Duration, no_captions: Duration) -> Self {
        self.inner.summarizing_ttl = Some(summarizing);
        self.inner.no_captions_ttl = Some(no_captions);
        self
    }

    pub fn subscribe_idle_timeout(mut self, v: Duration) -> Self {
        self.inner.subscribe_idle_timeout = Some(v);
        self
    }

    pub fn language_preference(mut self, v: Vec<String>) -> Self {
        self.inner.language_preference = Some(v);
        self
    }

    pub fn refine_concurrency(mut self, v: usize) -> Self {
        self.inner.refine_concurrency = Some(v);
        self
    }

    pub fn build(self) -> OrchestratorConfig {
        let default = OrchestratorConfig::default();
        OrchestratorConfig {
            llm_endpoint: self.inner.llm_endpoint.unwrap_or(default.llm_endpoint),
            small_model: self.inner.small_model.unwrap_or(default.small_model),
            large_model: self.inner.large_model.unwrap_or(default.large_model),
            small_model_window: self
                .inner
                .small_model_window
                .unwrap_or(default.small_model_window),
            large_model_window: self
                .inner
                .large_model_window
                .unwrap_or(default.large_model_window),
            control_timeout: default.control_timeout,
            call_timeout: default.call_timeout,
            retry_count: self.inner.retry_count.unwrap_or(default.retry_count),
            retry_wait: self.inner.retry_wait.unwrap_or(default.retry_wait),
            summarizing_ttl: self.inner.summarizing_ttl.unwrap_or(default.summarizing_ttl),
            no_captions_ttl: self.inner.no_captions_ttl.unwrap_or(default.no_captions_ttl),
            subscribe_idle_timeout: self
                .inner
                .subscribe_idle_timeout
                .unwrap_or(default.subscribe_idle_timeout),
            language_preference: self
                .inner
                .language_preference
                .unwrap_or(default.language_preference),
            refine_concurrency: self
                .inner
                .refine_concurrency
                .unwrap_or(default.refine_concurrency),
        }
    }
}
