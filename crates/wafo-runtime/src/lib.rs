//! wafo runtime.
//!
//! Hosts the Forth interpreter core on `wasmi`. The core compiles each new
//! word into a small WebAssembly module and asks the host to load it; the
//! loader links the module against the core's own memory and call table so
//! the word becomes callable through its table slot. Forth code reaches host
//! functions with `SCALL`, and host code reaches the Forth data stack through
//! [`Stack`].

mod bridge;
mod error;
mod loader;
mod shell;
mod stack;
mod table;
mod vm;

pub use bridge::{AsyncHandler, Handler, PendingFuture};
pub use error::{BoxError, LoadError, RuntimeError, RuntimeResult};
pub use loader::LoadedModule;
pub use stack::{Stack, StackValue};
pub use table::CallTable;
pub use vm::{ResultCode, Vm, VmOptions, PAD_OFFSET};
