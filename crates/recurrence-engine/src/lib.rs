//! # recurrence-engine
//!
//! Recurring availability expansion for schedule builders.
//!
//! A compact rule (frequency, day selectors, a date fence) is expanded into
//! the concrete dates it selects; each date carries one or more time-of-day
//! windows; the whole state round-trips through one JSON payload so a saved
//! schedule can be reopened and edited without loss.
//!
//! Everything is pure and deterministic. Nothing reads the system clock: past
//! dates are excluded only against an explicitly supplied `today`.
//!
//! ## Modules
//!
//! - [`fence`]: raw boundary strings to an inclusive [`DateFence`]
//! - [`rule`]: the [`RecurrenceRule`] tagged union and weekday numbering
//! - [`expander`]: rule + fence to ordered dates, plus quick-select helpers
//! - [`window`]: [`TimeWindow`]s attached to selected dates
//! - [`payload`]: the persisted JSON shapes and their round trip
//! - [`builder`]: one editing session composing all of the above
//! - [`ticket`]: declarative ticket frequencies expanded through RRULE
//! - [`occurrence`]: dated windows to absolute intervals in a timezone
//! - [`error`]: error types

pub mod builder;
pub mod error;
pub mod expander;
pub mod fence;
pub mod occurrence;
pub mod payload;
pub mod rule;
pub mod ticket;
pub mod window;

pub use builder::{BuilderInput, BuilderOptions, BuilderVariant, QuickSelect, ScheduleBuilder};
pub use error::{EngineError, Result};
pub use expander::{
    expand, expand_iter, expand_with_options, select_all, select_weekdays, select_weekends,
    ExpandOptions,
};
pub use fence::{resolve_fence, resolve_fence_with_order, DateFence, DateOrder, FenceResolver};
pub use occurrence::{materialize, Occurrence};
pub use payload::{
    deserialize, deserialize_str, deserialize_value, serialize, try_deserialize,
    try_deserialize_str, InfoField, Payload, Schedule,
};
pub use rule::{Frequency, RecurrenceRule};
pub use ticket::{expand_ticket, Ticket, TicketFrequency};
pub use window::{DateWindowMap, TimeWindow, WindowId};
