//! Header and method policy subsystem.
//!
//! # Data Flow
//! ```text
//! Outbound request:
//!     → spoofing.rs (pick wire method, signed method, override header)
//!     → headers.rs (strip unmanaged before signing)
//!     → [envelope sealed]
//!     → headers.rs (wire filter: overridden ∪ visible ∪ unmanaged)
//!
//! Validated response:
//!     → spoofing.rs (suppress after 3xx + Location)
//! ```
//!
//! # Design Decisions
//! - Pure classification logic, no I/O
//! - Fail closed: anything not explicitly visible only travels signed

pub mod headers;
pub mod spoofing;

pub use headers::{HeaderClass, HeaderPolicy, DEFAULT_VISIBLE_HEADERS, OVERRIDDEN_HEADERS};
pub use spoofing::{MethodSpoofing, SpoofDecision, SpoofingState, METHOD_OVERRIDE_HEADER};
