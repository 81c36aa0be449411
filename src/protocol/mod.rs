// Protocol Module - HOW SETS MOVE
// Reassembly of gossiped sets, root computation, broadcasting and ingestion

mod broadcast;
mod pending;
mod processor;
mod streamer;

pub use broadcast::Broadcaster;
pub use pending::{AggregatorConfig, AggregatorConfigError, Completion, PendingSetAggregator};
pub use processor::{Processor, SetCompleted};
pub use streamer::{StreamOutcome, Streamer, StreamerConfig, StreamerConfigError};
