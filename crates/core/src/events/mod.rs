//! Change events module.
//!
//! Provides the row-change event delivered by a change stream and the
//! filters a subscription uses to narrow which events it receives.

mod change_event;
mod filter;

pub use change_event::*;
pub use filter::*;
