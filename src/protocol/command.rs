//! Inbound control line decoding.
//!
//! Every line is checked twice, independently: once for observer membership
//! (`START` / `STOP`) and once for a directive (register, unregister or
//! reply delivery). Both outcomes are returned together so the caller can
//! apply each one; neither check short-circuits the other.

use super::reply::InterceptionReply;
use super::ProtocolError;

/// Joins the sender to the observer set.
pub const START: &str = "START";
/// Removes the sender from the observer set.
pub const STOP: &str = "STOP";
/// Adds a method to the interceptor set.
pub const REGISTER_INTERCEPTOR: &str = "REGISTER_INTERCEPTOR:";
/// Removes a method from the interceptor set.
pub const UNREGISTER_INTERCEPTOR: &str = "UNREGISTER_INTERCEPTOR:";
/// Delivers the reply to the pending blocking interception.
pub const INTERCEPTION_RESULT: &str = "INTERCEPTION_RESULT:";

/// Observer membership change requested by a line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Membership {
    /// Join the observer set.
    Start,
    /// Leave the observer set.
    Stop,
}

/// Interceptor or reply directive carried by a line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    /// Add a method identifier to the interceptor set.
    Register(String),
    /// Remove a method identifier from the interceptor set.
    Unregister(String),
    /// Deliver a reply. `None` is an explicit veto.
    Reply(Option<InterceptionReply>),
}

/// Everything one control line asks for.
#[derive(Debug, Default)]
pub struct ControlMessage {
    /// Result of the `START`/`STOP` check.
    pub membership: Option<Membership>,
    /// Result of the directive check; `Some(Err(_))` when a directive prefix
    /// matched but its payload was unusable.
    pub directive: Option<Result<Directive, ProtocolError>>,
}

impl ControlMessage {
    /// True if the line matched no known prefix.
    pub fn is_empty(&self) -> bool {
        self.membership.is_none() && self.directive.is_none()
    }
}

/// Decode one inbound control line.
///
/// Prefixes are case-sensitive. A trailing `\r` is ignored.
pub fn decode_line(line: &str) -> ControlMessage {
    let line = line.strip_suffix('\r').unwrap_or(line);

    ControlMessage {
        membership: decode_membership(line),
        directive: decode_directive(line),
    }
}

fn decode_membership(line: &str) -> Option<Membership> {
    if line.starts_with(START) {
        Some(Membership::Start)
    } else if line.starts_with(STOP) {
        Some(Membership::Stop)
    } else {
        None
    }
}

fn decode_directive(line: &str) -> Option<Result<Directive, ProtocolError>> {
    if let Some(payload) = line.strip_prefix(INTERCEPTION_RESULT) {
        Some(InterceptionReply::parse_payload(payload).map(Directive::Reply))
    } else if let Some(payload) = line.strip_prefix(REGISTER_INTERCEPTOR) {
        Some(method_name(payload, "REGISTER_INTERCEPTOR").map(Directive::Register))
    } else if let Some(payload) = line.strip_prefix(UNREGISTER_INTERCEPTOR) {
        Some(method_name(payload, "UNREGISTER_INTERCEPTOR").map(Directive::Unregister))
    } else {
        None
    }
}

fn method_name(payload: &str, command: &'static str) -> Result<String, ProtocolError> {
    let name = payload.trim();
    if name.is_empty() {
        return Err(ProtocolError::EmptyMethodName { command });
    }
    Ok(name.to_string())
}
