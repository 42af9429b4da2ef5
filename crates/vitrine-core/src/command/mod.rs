//! Inbound command routing.
//!
//! - `normalize` -- text extraction and cleanup
//! - `handler` -- `CommandHandler` port and its object-safe wrapper
//! - `table` -- ordered (matcher, handler) routes and the storefront table
//! - `readiness` -- per-group warm-up cache
//! - `router` -- `CommandRouter`, the per-message entry point

pub mod handler;
pub mod normalize;
pub mod readiness;
pub mod router;
pub mod table;

pub use handler::{BoxCommandHandler, CommandContext, CommandHandler};
pub use normalize::NormalizedText;
pub use readiness::{GroupReadinessCache, WarmUp};
pub use router::{CommandRouter, RouteOutcome};
pub use table::{
    CommandRoute, CommandTable, CommandWeight, Matcher, StorefrontCommand, storefront_table,
};
