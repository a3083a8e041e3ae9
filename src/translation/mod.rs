/*!
 * Translation of protected segments.
 *
 * This module turns segments into translated, restored text:
 *
 * - `placeholders`: Masking of markup, URLs, e-mail addresses and numbers,
 *   restoration and quality checks
 * - `batch`: Grouping of segments under backend limits
 * - `rate_limiter`: Process-wide RPM/TPM limiter registry
 * - `routing`: Language to provider routing table
 * - `orchestrator`: Retry, backoff and failover state machine
 */

pub use self::batch::{Batcher, ProtectedSegment, TranslationBatch};
pub use self::orchestrator::{
    OrchestratorSettings, TranslationOrchestrator, TranslationOutcome, TranslationResult,
    TranslationStats,
};
pub use self::placeholders::{PlaceholderGuard, PlaceholderKind, PlaceholderMap, PlaceholderToken};
pub use self::rate_limiter::{RateLimiter, RateLimiterRegistry};
pub use self::routing::RoutingTable;

pub mod batch;
pub mod orchestrator;
pub mod placeholders;
pub mod rate_limiter;
pub mod routing;
