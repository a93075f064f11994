//! The embedder-facing VM.
//!
//! ```text
//! Vm::interpret ─▶ core.run ─▶ shell.read / emit / key
//!                            ├▶ shell.load ─▶ loader (grow table, link module)
//!                            └▶ shell.call ─▶ bridge (sync now, async queued)
//! Vm::settle ─▶ pending futures ─▶ push results, flag, xt ─▶ interpret "EXECUTE"
//! ```

use std::panic::AssertUnwindSafe;

use futures::FutureExt;
use wasmi::{AsContext, AsContextMut, Engine, Linker, Module, Store};

use crate::bridge::{AsyncHandler, Binding, Handler, PendingCall, PendingFuture};
use crate::error::{BoxError, RuntimeResult};
use crate::loader::LoadedModule;
use crate::shell::{self, HostState, Keys, Output};
use crate::stack::{CoreExports, Stack, StackValue};
use crate::table::CallTable;

/// Distance between `here` and the scratch pad used by `push_string`.
pub const PAD_OFFSET: u32 = 400;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VmOptions {
    /// Passed to the core's `run`; suppresses the `ok` prompt.
    pub silent: bool,
    pub pad_offset: u32,
}

impl Default for VmOptions {
    fn default() -> Self {
        Self {
            silent: false,
            pad_offset: PAD_OFFSET,
        }
    }
}

/// How a run of the interpreter ended, as reported by the core's `error()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResultCode {
    /// The core trapped for a reason of its own.
    Unknown = 1,
    Quit = 2,
    Abort = 3,
    /// All input was consumed.
    EndOfInput = 4,
    Bye = 5,
}

impl ResultCode {
    pub fn from_raw(code: i32) -> Self {
        match code {
            2 => Self::Quit,
            3 => Self::Abort,
            4 => Self::EndOfInput,
            5 => Self::Bye,
            _ => Self::Unknown,
        }
    }

    pub fn is_success(self) -> bool {
        !matches!(self, Self::Unknown | Self::Abort)
    }
}

/// A running interpreter core.
pub struct Vm {
    store: Store<HostState>,
    core: CoreExports,
}

impl Vm {
    /// Instantiate the interpreter core from its binary.
    pub fn new(core_wasm: &[u8]) -> RuntimeResult<Self> {
        Self::with_options(core_wasm, VmOptions::default())
    }

    pub fn with_options(core_wasm: &[u8], options: VmOptions) -> RuntimeResult<Self> {
        let engine = Engine::default();
        let module = Module::new(&engine, core_wasm)?;
        let mut store = Store::new(&engine, HostState::new(options));
        let mut linker = Linker::<HostState>::new(&engine);
        shell::define_imports(&mut linker)?;

        let instance = linker.instantiate(&mut store, &module)?.start(&mut store)?;
        let core = CoreExports::from_instance(&instance, &store)?;
        store.data_mut().core = Some(core);
        tracing::debug!(options = ?options, "core instantiated");

        Ok(Self { store, core })
    }

    fn stack(&mut self) -> Stack<'_> {
        let pad_offset = self.store.data().options.pad_offset;
        Stack::new(self.store.as_context_mut(), self.core, pad_offset)
    }

    // ── input / output ──────────────────────────────────────────────────

    /// Append `input` to the input buffer without running the core.
    pub fn read(&mut self, input: &str) {
        self.store.data_mut().input.extend(input.bytes());
    }

    /// Feed `input` to the interpreter and run it until it stops.
    ///
    /// The core always stops by trapping; the outcome is read back from its
    /// `error()` export. A failed module load is returned as an error.
    pub fn interpret(&mut self, input: &str) -> RuntimeResult<ResultCode> {
        self.read(input);
        if !input.ends_with('\n') {
            self.read("\n");
        }
        let state = self.store.data_mut();
        state.load_error = None;
        state.host_failure = false;

        let silent = i32::from(self.store.data().options.silent);
        let run = self.core.run.typed::<i32, ()>(&self.store)?;
        let trapped = run.call(&mut self.store, silent).err();

        if let Some(err) = self.store.data_mut().load_error.take() {
            return Err(err.into());
        }
        if self.store.data().host_failure {
            return Ok(ResultCode::Unknown);
        }
        let error = self.core.error.typed::<(), i32>(&self.store)?;
        let code = ResultCode::from_raw(error.call(&mut self.store, ())?);
        match trapped {
            Some(trap) if code == ResultCode::Unknown => tracing::error!("core trapped: {trap}"),
            Some(trap) => tracing::trace!(?code, "run ended: {trap}"),
            None => {}
        }
        Ok(code)
    }

    /// Take everything emitted since the last call. Empty when an emit
    /// callback is installed.
    pub fn take_output(&mut self) -> String {
        match &mut self.store.data_mut().output {
            Output::Buffer(buf) => std::mem::take(buf),
            Output::Callback(_) => String::new(),
        }
    }

    /// Send emitted characters to `f` instead of the output buffer.
    pub fn on_emit(&mut self, f: impl FnMut(char) + Send + 'static) {
        self.store.data_mut().output = Output::Callback(Box::new(f));
    }

    /// Queue characters for `KEY`. Ignored when a key callback is installed.
    pub fn feed_keys(&mut self, keys: &str) {
        if let Keys::Queue(queue) = &mut self.store.data_mut().keys {
            queue.extend(keys.bytes().map(i32::from));
        }
    }

    /// Answer `KEY` with `f`.
    pub fn on_key(&mut self, f: impl FnMut() -> i32 + Send + 'static) {
        self.store.data_mut().keys = Keys::Callback(Box::new(f));
    }

    // ── inspection ──────────────────────────────────────────────────────

    pub fn here(&mut self) -> RuntimeResult<u32> {
        self.stack().here()
    }

    /// Size of the core's linear memory in bytes.
    pub fn memory_len(&self) -> usize {
        self.core.memory.data(&self.store).len()
    }

    pub fn table(&self) -> CallTable<'_> {
        CallTable::new(self.core.table, self.store.as_context())
    }

    /// Modules linked in so far, in load order.
    pub fn loaded_modules(&self) -> &[LoadedModule] {
        &self.store.data().modules
    }

    // ── stack ───────────────────────────────────────────────────────────

    pub fn push(&mut self, n: i32) -> RuntimeResult<()> {
        self.stack().push(n)
    }

    pub fn pop(&mut self) -> RuntimeResult<i32> {
        self.stack().pop()
    }

    /// Copy `s` to the scratch pad and push its address and length.
    /// Returns the address.
    pub fn push_string(&mut self, s: &str) -> RuntimeResult<u32> {
        self.stack().push_string(s)
    }

    pub fn push_bytes(&mut self, bytes: &[u8]) -> RuntimeResult<u32> {
        self.stack().push_bytes(bytes)
    }

    pub fn pop_string(&mut self) -> RuntimeResult<String> {
        self.stack().pop_string()
    }

    // ── host functions ──────────────────────────────────────────────────

    /// Bind `name` to a synchronous host function.
    ///
    /// The function runs with the name already popped. An error traps the
    /// core, and the running `interpret` reports [`ResultCode::Unknown`].
    pub fn bind<F>(&mut self, name: impl Into<String>, f: F)
    where
        F: Fn(&mut Stack<'_>) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        let handler: Handler = std::sync::Arc::new(f);
        self.store.data_mut().bridge.bind(name, Binding::Sync(handler));
    }

    /// Bind `name` to an asynchronous host function.
    ///
    /// `SCALL` expects an execution token below the name. `f` runs right
    /// away and may pop arguments; the future it returns is driven by
    /// [`Vm::settle`]. When it settles, its values (on success), the flag
    /// (`-1` success, `0` failure) and the token are pushed and `EXECUTE`
    /// is interpreted, exactly once per call.
    pub fn bind_async<F>(&mut self, name: impl Into<String>, f: F)
    where
        F: Fn(&mut Stack<'_>) -> Result<PendingFuture, BoxError> + Send + Sync + 'static,
    {
        let handler: AsyncHandler = std::sync::Arc::new(f);
        self.store.data_mut().bridge.bind(name, Binding::Async(handler));
    }

    pub fn is_bound(&self, name: &str) -> bool {
        self.store.data().bridge.is_bound(name)
    }

    /// Remove a binding. Returns `false` if `name` was not bound.
    pub fn unbind(&mut self, name: &str) -> bool {
        self.store.data_mut().bridge.unbind(name)
    }

    /// Number of async calls whose callback has not run yet.
    pub fn pending_calls(&self) -> usize {
        self.store.data().pending.len()
    }

    /// Drive outstanding async calls to completion, one at a time, resuming
    /// the interpreter after each. Calls started by a resumed callback are
    /// settled too. Returns the result of each resumption in order.
    pub async fn settle(&mut self) -> RuntimeResult<Vec<ResultCode>> {
        let mut codes = Vec::new();
        while let Some(call) = self.store.data_mut().pending.pop_front() {
            codes.push(self.resume(call).await?);
        }
        Ok(codes)
    }

    /// [`Vm::settle`] on the current thread.
    pub fn block_on_pending(&mut self) -> RuntimeResult<Vec<ResultCode>> {
        futures::executor::block_on(self.settle())
    }

    async fn resume(&mut self, call: PendingCall) -> RuntimeResult<ResultCode> {
        let PendingCall { name, xt, future } = call;
        let outcome = match AssertUnwindSafe(future).catch_unwind().await {
            Ok(Ok(values)) => Ok(values),
            Ok(Err(err)) => Err(err.to_string()),
            Err(_) => Err("handler panicked".to_string()),
        };

        let outcome = match outcome {
            Ok(values) => push_results(&mut self.stack(), &values)
                .map(|()| values.len())
                .map_err(|err| format!("result could not be pushed: {err}")),
            Err(reason) => Err(reason),
        };
        let flag = match outcome {
            Ok(count) => {
                tracing::debug!(%name, xt, values = count, "async SCALL settled");
                -1
            }
            Err(reason) => {
                tracing::error!(%name, xt, "async SCALL failed: {reason}");
                0
            }
        };
        let mut stack = self.stack();
        stack.push(flag)?;
        stack.push(xt)?;
        self.interpret("EXECUTE")
    }
}

/// Push every result, or none: cells pushed before a failing value are
/// popped again.
fn push_results(stack: &mut Stack<'_>, values: &[StackValue]) -> RuntimeResult<()> {
    let mut cells = 0;
    for value in values {
        if let Err(err) = stack.push_value(value) {
            for _ in 0..cells {
                stack.pop()?;
            }
            return Err(err);
        }
        cells += match value {
            StackValue::Int(_) => 1,
            StackValue::Str(_) => 2,
        };
    }
    Ok(())
}

impl std::fmt::Debug for Vm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vm")
            .field("state", self.store.data())
            .finish_non_exhaustive()
    }
}
