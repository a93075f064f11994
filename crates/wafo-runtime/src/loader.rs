//! Runtime module loader.
//!
//! When the core finishes compiling a word it hands the host the bytes of a
//! complete module. The module imports the core's `env.table` and
//! `env.memory` and installs its entry point through an active element
//! segment at the slot the dictionary entry designates. The loader never
//! picks slots; it only makes sure the table is large enough.

use std::fmt;

use sha2::{Digest, Sha256};
use wasmi::{AsContextMut, Caller, Linker, Module};
use wasmparser::{ElementItems, ElementKind, Operator, Parser, Payload};

use crate::error::LoadError;
use crate::shell::HostState;
use crate::stack::CoreExports;
use crate::table;

/// A module linked into the running core.
#[derive(Clone, PartialEq, Eq)]
pub struct LoadedModule {
    /// Call table slots the module filled.
    pub slots: Vec<u32>,
    pub bytes: Vec<u8>,
    /// Hex SHA-256 of `bytes`.
    pub digest: String,
}

impl fmt::Debug for LoadedModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadedModule")
            .field("slots", &self.slots)
            .field("len", &self.bytes.len())
            .field("digest", &self.digest)
            .finish()
    }
}

impl LoadedModule {
    fn new(slots: Vec<u32>, bytes: Vec<u8>) -> Self {
        let digest = Sha256::digest(&bytes)
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect();
        Self {
            slots,
            bytes,
            digest,
        }
    }
}

/// Load the module stored at `offset..offset + length` in the core's memory.
pub(crate) fn load(
    caller: &mut Caller<'_, HostState>,
    core: CoreExports,
    offset: u32,
    length: u32,
) -> Result<LoadedModule, LoadError> {
    let err = |reason: String| LoadError::new(offset, length, reason);

    // The module outlives this call; never hand out a view into memory.
    let bytes = {
        let data = core.memory.data(&*caller);
        let start = offset as usize;
        start
            .checked_add(length as usize)
            .and_then(|end| data.get(start..end))
            .map(<[u8]>::to_vec)
            .ok_or_else(|| err(format!("outside memory of {} bytes", data.len())))?
    };

    let slots = element_slots(&bytes).map_err(err)?;
    if let Some(last) = slots.iter().max() {
        table::ensure_capacity(core.table, caller.as_context_mut(), u64::from(*last) + 1)
            .map_err(err)?;
    }

    let engine = caller.engine().clone();
    let module = Module::new(&engine, &bytes[..]).map_err(|e| err(e.to_string()))?;
    let mut linker = Linker::<HostState>::new(&engine);
    linker
        .define("env", "table", core.table)
        .and_then(|l| l.define("env", "memory", core.memory))
        .map_err(|e| err(e.to_string()))?;
    linker
        .instantiate(caller.as_context_mut(), &module)
        .and_then(|pre| pre.start(caller.as_context_mut()))
        .map_err(|e| err(e.to_string()))?;

    tracing::debug!(offset, length, ?slots, "loaded module");
    Ok(LoadedModule::new(slots, bytes))
}

/// Table slots written by the active element segments of `bytes`.
fn element_slots(bytes: &[u8]) -> Result<Vec<u32>, String> {
    let mut slots = Vec::new();
    for payload in Parser::new(0).parse_all(bytes) {
        let Payload::ElementSection(reader) = payload.map_err(|e| e.to_string())? else {
            continue;
        };
        for element in reader {
            let element = element.map_err(|e| e.to_string())?;
            let ElementKind::Active { offset_expr, .. } = element.kind else {
                continue;
            };
            let count = match element.items {
                ElementItems::Functions(funcs) => funcs.count(),
                ElementItems::Expressions(_, exprs) => exprs.count(),
            };
            let mut ops = offset_expr.get_operators_reader();
            let start = match ops.read().map_err(|e| e.to_string())? {
                Operator::I32Const { value } => value as u32,
                other => return Err(format!("unsupported element offset {other:?}")),
            };
            let end = start
                .checked_add(count)
                .ok_or_else(|| format!("element segment at {start} overflows"))?;
            slots.extend(start..end);
        }
    }
    Ok(slots)
}
