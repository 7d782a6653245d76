//! State machines for the Snapfig client core
//!
//! Two process-wide containers live here: the auth-session lifecycle and the
//! credit-reconciliation ledger. Both are modeled as tagged phases with pure
//! transition functions, driven by async managers that talk to the backend
//! through the port traits in [`ports`]. The managers never render anything;
//! the presentation layer observes phases and calls operations.

pub mod credits;
pub mod ports;
pub mod session;

pub use credits::{CreditEvent, CreditManager, CreditPhase};
pub use ports::{CreditsApi, SessionApi, TransformApi};
pub use session::{SessionEvent, SessionManager, SessionPhase};
