//! Formatting of panic payloads recovered from pump tasks.

use std::{any::Any, fmt};

use tokio::task::JoinError;

/// Human-readable text of a recovered panic.
///
/// `String` and `&'static str` payloads are shown as-is; anything else is
/// reported by its `Debug` form.
///
/// ```
/// use gatewire::panic::format_panic;
/// assert_eq!(format_panic(&"boom").to_string(), "boom");
/// assert_eq!(format_panic(&String::from("boom")).to_string(), "boom");
/// assert!(format_panic(&5_u32).to_string().contains("Any"));
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
#[must_use]
pub struct PanicMessage(String);

impl fmt::Display for PanicMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

/// Create a [`PanicMessage`] for the given payload.
pub fn format_panic(payload: &(dyn Any + Send)) -> PanicMessage {
    if let Some(s) = payload.downcast_ref::<String>() {
        PanicMessage(s.clone())
    } else if let Some(s) = payload.downcast_ref::<&'static str>() {
        PanicMessage((*s).to_string())
    } else {
        PanicMessage(format!("{payload:?}"))
    }
}

/// Describe a task that did not return normally.
///
/// Panics yield their message; cancelled tasks yield the join error text.
pub fn describe_join_error(err: JoinError) -> PanicMessage {
    match err.try_into_panic() {
        Ok(payload) => format_panic(payload.as_ref()),
        Err(err) => PanicMessage(err.to_string()),
    }
}
