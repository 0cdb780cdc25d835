//! Collaborators the processors talk to, as traits with production
//! implementations.

pub mod chain;
pub mod metrics;
pub mod notifier;
pub mod rpc;
pub mod scorer;

pub use chain::{ChainProvider, ProviderError, ReplayCounts};
pub use metrics::{FacadeMetrics, MetricsSink};
pub use notifier::{HttpNotifier, NotificationChannel, Notifier, TransportError};
pub use rpc::RpcChainProvider;
pub use scorer::{AnalysisError, HeuristicScorer, Scorer};
