pub mod normalize;
pub mod poll;
pub mod scheduler;
pub mod webhook;

pub use normalize::{NormalizedTranscript, classify_text, normalize_dialogue};
pub use poll::{PollPipeline, SyncOptions, SyncReport};
pub use scheduler::SyncScheduler;
pub use webhook::{WebhookAck, WebhookEvent, WebhookProcessor};

use serde_json::Map;
use tracing::warn;

use crate::models::{CallUpdate, IngestSource};
use crate::routing::RoutingDecision;
use crate::store::CallStore;

/// Keep the latest routing decision with the call. Failures are logged only.
pub(crate) async fn record_routing(
    store: &dyn CallStore,
    call_id: &str,
    source: IngestSource,
    routing: &RoutingDecision,
) {
    let mut metadata = Map::new();
    metadata.insert("routing".to_string(), routing.to_metadata());
    let update = CallUpdate {
        metadata,
        ..CallUpdate::new(call_id, source)
    };
    if let Err(e) = store.upsert_call(&update).await {
        warn!(call_id = %call_id, "failed to record routing decision: {}", e);
    }
}
