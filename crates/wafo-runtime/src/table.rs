//! The core's indirect call table.
//!
//! Every compiled word occupies one slot; the dictionary entry of the word
//! records the slot number as its execution token. Embedders get a
//! read-only view; only the loader grows the table, and only by doubling.

use wasmi::{AsContextMut, FuncRef, StoreContext, Table, Val};

use crate::shell::HostState;

/// Read-only view of the call table.
pub struct CallTable<'a> {
    table: Table,
    ctx: StoreContext<'a, HostState>,
}

impl<'a> CallTable<'a> {
    pub(crate) fn new(table: Table, ctx: StoreContext<'a, HostState>) -> Self {
        Self { table, ctx }
    }

    /// Current number of slots.
    pub fn size(&self) -> u64 {
        u64::from(self.table.size(&self.ctx))
    }

    /// `true` if `slot` holds a function.
    pub fn is_set(&self, slot: u32) -> bool {
        match self.table.get(&self.ctx, slot.into()) {
            Some(Val::FuncRef(func)) => !func.is_null(),
            _ => false,
        }
    }

    /// Indices of all occupied slots.
    pub fn occupied(&self) -> Vec<u32> {
        let size = u32::try_from(self.size()).unwrap_or(u32::MAX);
        (0..size).filter(|&slot| self.is_set(slot)).collect()
    }
}

/// Double `table` until it has at least `needed` slots. Returns the new
/// size. Existing slots are never touched.
pub(crate) fn ensure_capacity(
    table: Table,
    mut ctx: impl AsContextMut,
    needed: u64,
) -> Result<u64, String> {
    let mut size = u64::from(table.size(&ctx));
    while size < needed {
        // An empty table has nothing to double.
        let delta = u32::try_from(size.max(1))
            .map_err(|_| format!("call table cannot grow past {size} slots"))?;
        table
            .grow(&mut ctx, delta.into(), Val::FuncRef(FuncRef::null()))
            .map_err(|e| e.to_string())?;
        size += u64::from(delta);
        tracing::debug!(size, needed, "grew call table");
    }
    Ok(size)
}
