//! # Settlement Protocol
//!
//! The order lifecycle. Four actors' worth of steps, one state machine,
//! and a final gate where every claim made along the way is checked again
//! before a single balance moves.
//!
//! ```text
//! propose ──► seller_decide ─┬─► buyer_commit ─► buyer_submit ─► settle
//!                            └─► (rejected)
//! cancel: from any state that isn't terminal
//! ```
//!
//! ## Module Layout
//!
//! - [`protocol`] -- [`SettlementProtocol`], the steps and queries
//! - [`messages`] -- the exact byte strings each signature covers
//! - [`error`] -- [`SettlementError`] and its flat [`ErrorKind`]

pub mod error;
pub mod messages;
pub mod protocol;

pub use error::{ErrorKind, SettlementError, SettlementResult};
pub use protocol::{AuditRecord, SettlementProtocol};
