pub mod config;
pub mod dispatch;
pub mod ingest;
pub mod llm;
pub mod models;
pub mod routing;
pub mod server;
pub mod store;
pub mod telephony;

#[cfg(test)]
mod testing;

pub use config::Config;
pub use dispatch::{AnalysisDispatcher, AnalyzeOutcome, AnalyzeRequest, DispatchConfig};
pub use ingest::{PollPipeline, SyncOptions, SyncReport, SyncScheduler, WebhookProcessor};
pub use llm::{AnthropicConfig, AnthropicScorer, Scorer};
pub use models::{Analysis, Call, CallUpdate, Direction, Transcript, TranscriptQuality};
pub use routing::{LinePolicy, RoutingDecision};
pub use server::{AppState, router};
pub use store::{CallStore, MemoryStore, SqliteStore};
pub use telephony::{OpenPhoneClient, OpenPhoneConfig, TelephonyApi};
