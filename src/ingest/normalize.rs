use chrono::{DateTime, Utc};

use crate::models::{Segment, Transcript, TranscriptQuality};
use crate::telephony::DialogueItem;

/// What a naive `speaker: text` rendering produces when both fields are missing.
/// Rows written by older ingestion code may still contain it.
pub const MISSING_FIELD_MARKER: &str = "undefined: undefined";

pub const UNKNOWN_SPEAKER: &str = "Unknown";

/// Result of normalizing one dialogue list
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedTranscript {
    /// Valid segments in provider order
    pub segments: Vec<Segment>,
    /// `speaker: text` lines joined with newlines
    pub text: String,
    pub quality: TranscriptQuality,
    /// Items dropped for missing content or speaker
    pub dropped: usize,
}

impl NormalizedTranscript {
    pub fn into_transcript(
        self,
        call_id: &str,
        duration_secs: Option<u32>,
        status: Option<String>,
        now: DateTime<Utc>,
    ) -> Transcript {
        Transcript {
            call_id: call_id.to_string(),
            text: self.text,
            segments: self.segments,
            duration_secs,
            status,
            quality: self.quality,
            updated_at: now,
        }
    }
}

/// Speaker label: internal user id, then external identifier, then `Unknown`
pub fn resolve_speaker(item: &DialogueItem) -> &str {
    non_blank(&item.user_id)
        .or_else(|| non_blank(&item.identifier))
        .unwrap_or(UNKNOWN_SPEAKER)
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn has_speaker(item: &DialogueItem) -> bool {
    non_blank(&item.user_id).is_some() || non_blank(&item.identifier).is_some()
}

fn has_content(item: &DialogueItem) -> bool {
    non_blank(&item.content).is_some()
}

/// Convert raw dialogue into canonical segments and classify the result.
///
/// Pure: the same input always yields the same output.
pub fn normalize_dialogue(items: &[DialogueItem]) -> NormalizedTranscript {
    let segments: Vec<Segment> = items
        .iter()
        .filter(|item| has_content(item) && has_speaker(item))
        .map(|item| Segment {
            start: item.start.unwrap_or(0.0),
            end: item.end.or(item.start).unwrap_or(0.0),
            speaker: resolve_speaker(item).to_string(),
            text: item.content.as_deref().unwrap_or_default().trim().to_string(),
        })
        .collect();
    let dropped = items.len() - segments.len();

    if segments.is_empty() {
        return NormalizedTranscript {
            segments,
            text: String::new(),
            quality: classify_unusable(items),
            dropped,
        };
    }

    let text = render_text(&segments);
    let quality = classify_text(&text);

    NormalizedTranscript {
        segments: if quality == TranscriptQuality::Broken {
            Vec::new()
        } else {
            segments
        },
        text: if quality == TranscriptQuality::Broken {
            String::new()
        } else {
            text
        },
        quality,
        dropped,
    }
}

/// Zero valid items: decide between "nothing was said" and "malformed structure"
fn classify_unusable(items: &[DialogueItem]) -> TranscriptQuality {
    if items.is_empty() {
        return TranscriptQuality::Empty;
    }
    let any_speaker = items.iter().any(has_speaker);
    let any_content = items.iter().any(has_content);
    if !any_speaker || any_content {
        TranscriptQuality::Broken
    } else {
        TranscriptQuality::Empty
    }
}

pub fn render_text(segments: &[Segment]) -> String {
    segments
        .iter()
        .map(|s| format!("{}: {}", s.speaker, s.text))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Classify already-rendered transcript text (stored rows or caller-supplied text)
pub fn classify_text(text: &str) -> TranscriptQuality {
    if text.trim().is_empty() {
        TranscriptQuality::Empty
    } else if text.contains(MISSING_FIELD_MARKER) {
        TranscriptQuality::Broken
    } else {
        TranscriptQuality::Valid
    }
}
