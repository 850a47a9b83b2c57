//! Lectio Resolver - Tiered Commentary Resolution
//!
//! Turns a passage into commentary text through three tiers of increasing
//! cost, and writes results back up the chain:
//!
//! 1. the private local cache
//! 2. the shared remote store
//! 3. the generative commentary service
//!
//! [`CommentaryResolver`] owns the tier walk and single-flight table.
//! [`PassageSession`] tracks which passage is on screen and discards results
//! for passages the user has moved away from. [`RandomPassageSelector`] feeds
//! the "surprise me" flow.
//!
//! # Example
//! ```ignore
//! let resolver = Arc::new(CommentaryResolver::from_config(&LectioConfig::from_env())?);
//! let session = PassageSession::new(resolver);
//! let anchor = RandomPassageSelector::new().select_anchor();
//! match session.select(anchor).await {
//!     SessionOutcome::Applied(record) => render(&record),
//!     SessionOutcome::Failed(message) => show_error(&message),
//!     SessionOutcome::Superseded => {}
//! }
//! ```

pub mod error;
pub mod resolver;
pub mod selector;
pub mod session;
pub mod telemetry;

pub use error::ResolveError;
pub use resolver::{CommentaryResolver, Resolution, ResolutionObserver, ResolutionPhase};
pub use selector::{PassageSelection, RandomPassageSelector};
pub use session::{PassageSession, SessionOutcome, SessionState};
pub use telemetry::{init_tracing, LogFormat, TelemetryConfig};
