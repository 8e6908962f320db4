use serde::{Deserialize, Serialize};

use crate::models::Direction;

pub const DEFAULT_MIN_INBOUND_DURATION_SECS: u32 = 30;

/// Which configured line a call belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineKind {
    Main,
    Outbound,
    Unknown,
}

/// Whether a call qualifies for automatic analysis, and why
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingDecision {
    pub should_analyze: bool,
    pub line: LineKind,
    pub reason: String,
}

impl RoutingDecision {
    pub fn to_metadata(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

/// Business rules per configured line
#[derive(Debug, Clone)]
pub struct LinePolicy {
    pub main_line_id: Option<String>,
    pub outbound_line_id: Option<String>,
    /// Main-line inbound calls must be strictly longer than this
    pub min_inbound_duration_secs: u32,
}

impl LinePolicy {
    pub fn new(main_line_id: Option<String>, outbound_line_id: Option<String>) -> Self {
        Self {
            main_line_id,
            outbound_line_id,
            min_inbound_duration_secs: DEFAULT_MIN_INBOUND_DURATION_SECS,
        }
    }

    pub fn line_kind(&self, line_id: Option<&str>) -> LineKind {
        let Some(line_id) = line_id else {
            return LineKind::Unknown;
        };
        if self.main_line_id.as_deref() == Some(line_id) {
            LineKind::Main
        } else if self.outbound_line_id.as_deref() == Some(line_id) {
            LineKind::Outbound
        } else {
            LineKind::Unknown
        }
    }

    /// Decide whether a call should be analyzed. No I/O, no side effects.
    pub fn evaluate(
        &self,
        line_id: Option<&str>,
        direction: Option<Direction>,
        duration_secs: u32,
    ) -> RoutingDecision {
        let line = self.line_kind(line_id);
        let direction_label = direction.map(|d| d.as_str()).unwrap_or("unknown");

        let (should_analyze, reason) = match line {
            LineKind::Main => {
                let min = self.min_inbound_duration_secs;
                if direction != Some(Direction::Inbound) {
                    (
                        false,
                        format!("main line only analyzes inbound calls (got {direction_label})"),
                    )
                } else if duration_secs <= min {
                    (
                        false,
                        format!("main line inbound call too short ({duration_secs}s <= {min}s)"),
                    )
                } else {
                    (
                        true,
                        format!("main line inbound call longer than {min}s ({duration_secs}s)"),
                    )
                }
            }
            LineKind::Outbound => {
                if direction == Some(Direction::Outbound) {
                    (true, "outbound line outbound call".to_string())
                } else {
                    (
                        false,
                        format!("outbound line only analyzes outbound calls (got {direction_label})"),
                    )
                }
            }
            LineKind::Unknown => (
                false,
                format!(
                    "unknown phone number: {}",
                    line_id.unwrap_or("<none>")
                ),
            ),
        };

        RoutingDecision {
            should_analyze,
            line,
            reason,
        }
    }
}
