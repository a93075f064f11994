//! Host side of the core: the `shell` imports and the state they share.

use std::collections::VecDeque;
use std::fmt;

use wasmi::{Caller, Linker};

use crate::bridge::{self, Bridge, PendingCall};
use crate::error::{LoadError, RuntimeError, RuntimeResult};
use crate::loader::{self, LoadedModule};
use crate::stack::CoreExports;
use crate::vm::VmOptions;

/// Where emitted characters go.
pub(crate) enum Output {
    Buffer(String),
    Callback(Box<dyn FnMut(char) + Send>),
}

/// Where `KEY` reads from.
pub(crate) enum Keys {
    Queue(VecDeque<i32>),
    Callback(Box<dyn FnMut() -> i32 + Send>),
}

/// Store data of the core instance.
pub struct HostState {
    pub(crate) options: VmOptions,
    /// Input not yet handed to the core.
    pub(crate) input: VecDeque<u8>,
    pub(crate) output: Output,
    pub(crate) keys: Keys,
    pub(crate) bridge: Bridge,
    pub(crate) pending: VecDeque<PendingCall>,
    /// Set by a failed load; taken by `interpret`.
    pub(crate) load_error: Option<LoadError>,
    /// Set when a synchronous handler failed during the current run.
    pub(crate) host_failure: bool,
    pub(crate) modules: Vec<LoadedModule>,
    pub(crate) core: Option<CoreExports>,
}

impl fmt::Debug for HostState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostState")
            .field("options", &self.options)
            .field("input", &self.input.len())
            .field("pending", &self.pending)
            .field("load_error", &self.load_error)
            .field("modules", &self.modules.len())
            .finish_non_exhaustive()
    }
}

impl HostState {
    pub(crate) fn new(options: VmOptions) -> Self {
        Self {
            options,
            input: VecDeque::new(),
            output: Output::Buffer(String::new()),
            keys: Keys::Queue(VecDeque::new()),
            bridge: Bridge::default(),
            pending: VecDeque::new(),
            load_error: None,
            host_failure: false,
            modules: Vec::new(),
            core: None,
        }
    }

    pub(crate) fn core_and_pad(&self) -> Result<(CoreExports, u32), wasmi::Error> {
        self.core
            .map(|core| (core, self.options.pad_offset))
            .ok_or_else(|| wasmi::Error::new("core called the shell during instantiation"))
    }

    fn emit(&mut self, c: char) {
        match &mut self.output {
            Output::Buffer(buf) => buf.push(c),
            Output::Callback(f) => f(c),
        }
    }

    fn key(&mut self) -> i32 {
        match &mut self.keys {
            Keys::Queue(queue) => queue.pop_front().unwrap_or(-1),
            Keys::Callback(f) => f(),
        }
    }

    /// Take the next line of input, newline included, capped at `max`
    /// bytes. The rest stays buffered.
    fn next_line(&mut self, max: usize) -> Vec<u8> {
        let line_len = self
            .input
            .iter()
            .position(|&b| b == b'\n')
            .map_or(self.input.len(), |i| i + 1);
        self.input.drain(..line_len.min(max)).collect()
    }
}

// ── imports ──────────────────────────────────────────────────────────────

/// Register the `shell` imports the core expects.
pub(crate) fn define_imports(linker: &mut Linker<HostState>) -> RuntimeResult<()> {
    linker
        .func_wrap("shell", "emit", |mut caller: Caller<'_, HostState>, c: i32| {
            // Characters are single bytes.
            caller.data_mut().emit(char::from(c as u8));
        })
        .map_err(link_err)?;

    linker
        .func_wrap(
            "shell",
            "read",
            |mut caller: Caller<'_, HostState>, addr: i32, len: i32| -> Result<i32, wasmi::Error> {
                let (core, _) = caller.data().core_and_pad()?;
                let line = caller.data_mut().next_line(len.max(0) as usize);
                core.memory
                    .write(&mut caller, addr as u32 as usize, &line)
                    .map_err(|e| wasmi::Error::new(format!("read into 0x{addr:x}: {e}")))?;
                Ok(line.len() as i32)
            },
        )
        .map_err(link_err)?;

    linker
        .func_wrap("shell", "key", |mut caller: Caller<'_, HostState>| -> i32 {
            caller.data_mut().key()
        })
        .map_err(link_err)?;

    linker
        .func_wrap(
            "shell",
            "load",
            |mut caller: Caller<'_, HostState>, offset: i32, length: i32| -> Result<(), wasmi::Error> {
                let (core, _) = caller.data().core_and_pad()?;
                match loader::load(&mut caller, core, offset as u32, length as u32) {
                    Ok(module) => {
                        caller.data_mut().modules.push(module);
                        Ok(())
                    }
                    Err(err) => {
                        tracing::error!("{err}");
                        let trap = wasmi::Error::new(err.to_string());
                        caller.data_mut().load_error = Some(err);
                        Err(trap)
                    }
                }
            },
        )
        .map_err(link_err)?;

    linker
        .func_wrap("shell", "call", bridge::dispatch)
        .map_err(link_err)?;

    Ok(())
}

fn link_err(e: impl fmt::Display) -> RuntimeError {
    RuntimeError::Link(e.to_string())
}
