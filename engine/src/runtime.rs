//! Process-wide async runtime the boundary blocks on.
//!
//! Every boundary call is synchronous from the caller's perspective: the
//! calling thread parks on this runtime until the kernel operation
//! completes. Background replica sync tasks are spawned onto the same
//! runtime, so they outlive individual boundary calls.

use once_cell::sync::OnceCell;
use tokio::runtime::Runtime;

/// Returns the shared runtime, creating it on first use.
pub fn runtime() -> &'static Runtime {
    static RUNTIME: OnceCell<Runtime> = OnceCell::new();

    RUNTIME.get_or_init(|| Runtime::new().expect("failed to start tokio runtime"))
}
