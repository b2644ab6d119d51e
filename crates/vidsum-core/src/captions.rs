//! Fetches timed captions and picks a language (spec.md §4.4).

use async_trait::async_trait;

use crate::config::DEFAULT_LANGUAGE_PREFERENCE;
use crate::error::CaptionError;
use crate::model::TimedText;

/// Fetches a video's timed captions and the language they were fetched in.
#[async_trait]
pub trait CaptionSource: Send + Sync {
    async fn fetch(&self, vid: &str) -> Result<(Vec<TimedText>, String), CaptionError>;
}

/// Picks the first available translation from `preference`, falling back to
/// whatever single language is present if the source only exposes one
/// un-negotiated track. Returns the index into `available` and the chosen
/// code, or `None` if `available` is empty.
///
/// `available` lists the language codes a caption provider can translate
/// into; this helper doesn't fetch anything itself, it only implements the
/// selection policy so a concrete `CaptionSource` can call it after listing
/// what languages it supports for a given video.
pub fn pick_preferred_language<'a>(
    available: &'a [String],
    preference: &[String],
) -> Option<&'a str> {
    if available.is_empty() {
        return None;
    }
    for candidate in preference {
        if let Some(found) = available.iter().find(|a| a.as_str() == candidate.as_str()) {
            return Some(found.as_str());
        }
    }
    // None of the preferred languages are available; fall back to whatever
    // is first, recording its actual code as the chapter lang (spec.md
    // §4.4: "Record its actual code as the chapter lang").
    available.first().map(|s| s.as_str())
}

/// Convenience wrapper over [`pick_preferred_language`] using the default
/// preference list from spec.md §4.4.
pub fn pick_default_preferred_language(available: &[String]) -> Option<&str> {
    let preference: Vec<String> = DEFAULT_LANGUAGE_PREFERENCE.iter().map(|s| s.to_string()).collect();
    pick_preferred_language(available, &preference)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn picks_first_matching_preference() {
        let available = vec!["fr".to_string(), "es".to_string(), "en".to_string()];
        let pref = vec!["en".to_string(), "es".to_string()];
        assert_eq!(pick_preferred_language(&available, &pref), Some("en"));
    }

    #[test]
    fn falls_back_to_first_available_when_no_preference_matches() {
        let available = vec!["xx".to_string(), "yy".to_string()];
        let pref = vec!["en".to_string(), "es".to_string()];
        assert_eq!(pick_preferred_language(&available, &pref), Some("xx"));
    }

    #[test]
    fn empty_available_yields_none() {
        let pref = vec!["en".to_string()];
        assert_eq!(pick_preferred_language(&[], &pref), None);
    }
}
