//! Access to the core's data stack.
//!
//! The core owns the stack; the host only reaches it through the exported
//! `push`/`pop` functions. Strings travel as an `(address, length)` pair
//! with the length on top.

use std::fmt;

use wasmi::{Func, Instance, Memory, StoreContextMut, Table};

use crate::error::{RuntimeError, RuntimeResult};
use crate::shell::HostState;

/// Exports the host needs from the interpreter core.
#[derive(Debug, Clone, Copy)]
pub(crate) struct CoreExports {
    pub memory: Memory,
    pub table: Table,
    pub push: Func,
    pub pop: Func,
    pub here: Func,
    pub run: Func,
    pub error: Func,
}

impl CoreExports {
    pub(crate) fn from_instance(
        instance: &Instance,
        ctx: &wasmi::Store<HostState>,
    ) -> RuntimeResult<Self> {
        let func = |name: &'static str| {
            instance
                .get_func(ctx, name)
                .ok_or(RuntimeError::MissingExport(name))
        };
        Ok(Self {
            memory: instance
                .get_memory(ctx, "memory")
                .ok_or(RuntimeError::MissingExport("memory"))?,
            table: instance
                .get_table(ctx, "table")
                .ok_or(RuntimeError::MissingExport("table"))?,
            push: func("push")?,
            pop: func("pop")?,
            here: func("here")?,
            run: func("run")?,
            error: func("error")?,
        })
    }
}

/// A value returned by an async handler, pushed when its future settles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StackValue {
    Int(i32),
    /// Pushed as address and length with [`Stack::push_string`].
    Str(String),
}

impl From<i32> for StackValue {
    fn from(n: i32) -> Self {
        Self::Int(n)
    }
}

impl From<&str> for StackValue {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

impl fmt::Display for StackValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(n) => write!(f, "{n}"),
            Self::Str(s) => write!(f, "{s:?}"),
        }
    }
}

/// Handle on the data stack, valid for the duration of one host call.
pub struct Stack<'a> {
    ctx: StoreContextMut<'a, HostState>,
    core: CoreExports,
    pad_offset: u32,
}

impl<'a> Stack<'a> {
    pub(crate) fn new(
        ctx: StoreContextMut<'a, HostState>,
        core: CoreExports,
        pad_offset: u32,
    ) -> Self {
        Self {
            ctx,
            core,
            pad_offset,
        }
    }

    pub fn push(&mut self, n: i32) -> RuntimeResult<()> {
        let push = self.core.push.typed::<i32, ()>(&self.ctx)?;
        push.call(&mut self.ctx, n)?;
        Ok(())
    }

    pub fn pop(&mut self) -> RuntimeResult<i32> {
        let pop = self.core.pop.typed::<(), i32>(&self.ctx)?;
        Ok(pop.call(&mut self.ctx, ())?)
    }

    /// First free address of the data space.
    pub fn here(&mut self) -> RuntimeResult<u32> {
        let here = self.core.here.typed::<(), i32>(&self.ctx)?;
        Ok(here.call(&mut self.ctx, ())? as u32)
    }

    /// Write `s` to the scratch pad above `here`, then push its address and
    /// length. Returns the address.
    ///
    /// The pad is not reserved: the next allocation in the data space
    /// overwrites it.
    pub fn push_string(&mut self, s: &str) -> RuntimeResult<u32> {
        self.push_bytes(s.as_bytes())
    }

    /// [`Stack::push_string`] for arbitrary bytes, such as a compiled module
    /// to hand to the loader.
    pub fn push_bytes(&mut self, bytes: &[u8]) -> RuntimeResult<u32> {
        let addr = self
            .here()?
            .checked_add(self.pad_offset)
            .ok_or_else(|| RuntimeError::Memory("scratch pad past 4 GiB".to_string()))?;
        let len = i32::try_from(bytes.len())
            .map_err(|_| RuntimeError::Memory(format!("{} bytes", bytes.len())))?;
        self.core
            .memory
            .write(&mut self.ctx, addr as usize, bytes)
            .map_err(|e| RuntimeError::Memory(format!("{len} bytes at 0x{addr:x}: {e}")))?;
        self.push(addr as i32)?;
        self.push(len)?;
        Ok(addr)
    }

    /// Pop a length, then an address, and decode the bytes between them.
    /// Invalid UTF-8 is replaced rather than rejected.
    pub fn pop_string(&mut self) -> RuntimeResult<String> {
        let len = self.pop()? as u32 as usize;
        let addr = self.pop()? as u32 as usize;
        let data = self.core.memory.data(&self.ctx);
        addr.checked_add(len)
            .and_then(|end| data.get(addr..end))
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
            .ok_or_else(|| RuntimeError::Memory(format!("{len} bytes at 0x{addr:x}")))
    }

    /// Push a handler result.
    pub fn push_value(&mut self, value: &StackValue) -> RuntimeResult<()> {
        match value {
            StackValue::Int(n) => self.push(*n),
            StackValue::Str(s) => self.push_string(s).map(|_| ()),
        }
    }
}
