//! Host functions callable from Forth with `SCALL`.
//!
//! The core pushes the name of the function (address and length) and calls
//! the `shell.call` import. A synchronous handler runs right away with access
//! to the stack. An asynchronous handler additionally expects an execution
//! token below the name; once its future settles the host pushes the results,
//! a success flag and the token, and interprets `EXECUTE`.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use wasmi::{AsContextMut, Caller};

use crate::error::{BoxError, RuntimeError};
use crate::shell::HostState;
use crate::stack::{Stack, StackValue};

/// Synchronous host function.
pub type Handler = Arc<dyn Fn(&mut Stack<'_>) -> Result<(), BoxError> + Send + Sync>;

/// Asynchronous host function. The synchronous part may pop arguments; the
/// returned future produces the values to push before the success flag.
pub type AsyncHandler =
    Arc<dyn Fn(&mut Stack<'_>) -> Result<PendingFuture, BoxError> + Send + Sync>;

/// Future of an async host function.
pub type PendingFuture = BoxFuture<'static, Result<Vec<StackValue>, BoxError>>;

#[derive(Clone)]
pub(crate) enum Binding {
    Sync(Handler),
    Async(AsyncHandler),
}

/// Name → handler registry.
#[derive(Default, Clone)]
pub(crate) struct Bridge {
    bindings: HashMap<String, Binding>,
}

impl Bridge {
    /// Bind `name`, replacing any previous binding.
    pub(crate) fn bind(&mut self, name: impl Into<String>, binding: Binding) {
        let name = name.into();
        if self.bindings.insert(name.clone(), binding).is_some() {
            tracing::debug!(%name, "rebound SCALL");
        }
    }

    pub(crate) fn unbind(&mut self, name: &str) -> bool {
        self.bindings.remove(name).is_some()
    }

    pub(crate) fn is_bound(&self, name: &str) -> bool {
        self.bindings.contains_key(name)
    }

    pub(crate) fn get(&self, name: &str) -> Option<Binding> {
        self.bindings.get(name).cloned()
    }
}

/// An async call whose future has not settled yet.
pub(crate) struct PendingCall {
    pub name: String,
    /// Token to execute once the future settles.
    pub xt: i32,
    pub future: PendingFuture,
}

impl fmt::Debug for PendingCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingCall")
            .field("name", &self.name)
            .field("xt", &self.xt)
            .finish_non_exhaustive()
    }
}

// ── shell.call ───────────────────────────────────────────────────────────

/// Implementation of the `shell.call` import.
pub(crate) fn dispatch(mut caller: Caller<'_, HostState>) -> Result<(), wasmi::Error> {
    let (core, pad_offset) = caller.data().core_and_pad()?;
    let name = Stack::new(caller.as_context_mut(), core, pad_offset)
        .pop_string()
        .map_err(trap)?;

    let Some(binding) = caller.data().bridge.get(&name) else {
        tracing::warn!("{}", RuntimeError::UnboundCall(name));
        return Ok(());
    };

    match binding {
        Binding::Sync(handler) => {
            let result = handler(&mut Stack::new(caller.as_context_mut(), core, pad_offset));
            if let Err(err) = result {
                tracing::error!(%name, "SCALL failed: {err}");
                caller.data_mut().host_failure = true;
                return Err(wasmi::Error::new(format!("SCALL {name} failed: {err}")));
            }
        }
        Binding::Async(handler) => {
            let (xt, started) = {
                let mut stack = Stack::new(caller.as_context_mut(), core, pad_offset);
                let xt = stack.pop().map_err(trap)?;
                (xt, handler(&mut stack))
            };
            let future: PendingFuture = match started {
                Ok(future) => future,
                Err(err) => {
                    // Still owed exactly one callback.
                    tracing::error!(%name, "async SCALL failed to start: {err}");
                    futures::future::ready(Err(err)).boxed()
                }
            };
            tracing::debug!(%name, xt, "queued async SCALL");
            caller
                .data_mut()
                .pending
                .push_back(PendingCall { name, xt, future });
        }
    }
    Ok(())
}

fn trap(err: RuntimeError) -> wasmi::Error {
    wasmi::Error::new(err.to_string())
}
