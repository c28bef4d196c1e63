//! Applies decoded control lines to engine state.
//!
//! Membership changes go to the [`ObserverSet`], register/unregister to the
//! [`InterceptorSet`], and replies to the [`InterceptionCoordinator`]. Both
//! halves of a [`ControlMessage`] are applied independently.

use std::sync::Arc;

use crate::intercept::{InterceptionCoordinator, InterceptorSet};
use crate::protocol::{ControlMessage, Directive, Membership, ProtocolError};
use crate::session::{CommandHandler, ObserverId, ObserverSet};

/// The engine's [`CommandHandler`].
#[derive(Debug)]
pub struct ControlPlane {
    observers: Arc<ObserverSet>,
    interceptors: Arc<InterceptorSet>,
    coordinator: Arc<InterceptionCoordinator>,
}

impl ControlPlane {
    /// Control plane over the engine's shared state.
    pub fn new(
        observers: Arc<ObserverSet>,
        interceptors: Arc<InterceptorSet>,
        coordinator: Arc<InterceptionCoordinator>,
    ) -> Self {
        Self {
            observers,
            interceptors,
            coordinator,
        }
    }

    fn apply_directive(&self, observer: &ObserverId, directive: Result<Directive, ProtocolError>) {
        match directive {
            Ok(Directive::Register(method)) => {
                self.interceptors.register(&method);
            }
            Ok(Directive::Unregister(method)) => {
                self.interceptors.unregister(&method);
            }
            Ok(Directive::Reply(reply)) => {
                if !self.coordinator.deliver(reply) {
                    log::debug!("[Control] Reply from {observer} not consumed");
                }
            }
            Err(e) => {
                log::warn!("[Control] Ignoring command from {observer}: {e}");
            }
        }
    }
}

impl CommandHandler for ControlPlane {
    fn handle(&self, observer: &ObserverId, message: ControlMessage) {
        if let Some(directive) = message.directive {
            self.apply_directive(observer, directive);
        }
        match message.membership {
            Some(Membership::Start) => {
                if !self.observers.join(observer) {
                    log::warn!("[Control] START from closed connection {observer}");
                }
            }
            Some(Membership::Stop) => {
                self.observers.leave(observer);
            }
            None => {}
        }
    }
}
