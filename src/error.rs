//! Errors reported by fallible allocation paths.

use core::alloc::Layout;

/// The allocator could not satisfy a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("memory allocation failed")]
pub struct AllocError;

/// Error returned by the `try_*` constructors and insertion methods when the
/// table cannot obtain the memory it needs.
///
/// When growth fails the table keeps its previous arrays and contents.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TryReserveError {
    /// The requested capacity does not fit in the address space.
    #[error("capacity overflow")]
    CapacityOverflow,

    /// The allocator returned an error for this layout.
    #[error("memory allocation of {} bytes failed", .layout.size())]
    AllocError {
        /// Layout of the allocation that failed.
        layout: Layout,
    },
}
