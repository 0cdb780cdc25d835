//! Configuration types for ChainIntel.
//!
//! These types represent the validated runtime configuration used by the
//! core components. Every option has a default; the actual file parsing and
//! validation is handled by the server crate.

mod chain;
mod notifier;
mod processor;
mod queue;
mod router;
mod scheduler;
mod scorer;

pub use chain::ChainEndpoint;
pub use notifier::{DiscordConfig, NotifierConfig, TelegramConfig};
pub use processor::ProcessorConfig;
pub use queue::QueueConfig;
pub use router::{RouterConfig, TRANSFER_METHOD};
pub use scheduler::ReplaySchedulerConfig;
pub use scorer::ScorerConfig;
