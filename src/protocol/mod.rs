//! Wire protocol for the control channel.
//!
//! The channel is plain UTF-8 text in both directions.
//!
//! # Inbound (observer → engine)
//!
//! One command per line:
//!
//! ```text
//! START
//! STOP
//! REGISTER_INTERCEPTOR:<method>
//! UNREGISTER_INTERCEPTOR:<method>
//! INTERCEPTION_RESULT:<json reply document>
//! ```
//!
//! See [`command`] for decoding and [`reply`] for the reply document.
//!
//! # Outbound (engine → observer)
//!
//! ```text
//! Event: <name>
//! <key>: <value>
//! ---
//! ```
//!
//! See [`event`].

pub mod command;
pub mod event;
pub mod reply;

pub use command::{decode_line, ControlMessage, Directive, Membership};
pub use event::EventRecord;
pub use reply::InterceptionReply;

/// Errors raised while decoding inbound control lines.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// A register/unregister command carried no method identifier.
    #[error("{command} requires a method identifier")]
    EmptyMethodName {
        /// The command prefix, without the trailing colon.
        command: &'static str,
    },

    /// The `INTERCEPTION_RESULT:` payload was not a valid reply document.
    #[error("malformed interception reply: {0}")]
    MalformedReply(#[from] serde_json::Error),

    /// The line exceeded the configured maximum length.
    #[error("control line exceeds {max} bytes")]
    LineTooLong {
        /// Maximum accepted line length.
        max: usize,
    },
}
