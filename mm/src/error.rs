//! Error type for the page allocator.
//!
//! Only [`MmError::OutOfMemory`] ever reaches callers as a value: it is the
//! ordinary "no page available" outcome of an acquire. The other variants
//! describe broken caller contracts. The allocator produces them from its
//! validation helpers and then panics with their `Display` text, because a
//! misaligned, foreign or doubly released page means the caller's view of
//! memory ownership is already corrupt.

use core::fmt;

use kmem_lib::PhysAddr;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MmError {
    OutOfMemory,
    NotAligned {
        address: PhysAddr,
        required: u64,
    },
    OutOfRange {
        address: PhysAddr,
        start: PhysAddr,
        end: PhysAddr,
    },
    DoubleFree {
        address: PhysAddr,
    },
    NotFree {
        address: PhysAddr,
    },
    NotInitialized,
}

impl fmt::Display for MmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfMemory => write!(f, "out of physical pages"),
            Self::NotAligned { address, required } => {
                write!(f, "address {:#x} not aligned to {:#x}", address, required)
            }
            Self::OutOfRange {
                address,
                start,
                end,
            } => write!(
                f,
                "address {:#x} outside managed range [{:#x}, {:#x})",
                address, start, end
            ),
            Self::DoubleFree { address } => {
                write!(f, "page {:#x} released while already free", address)
            }
            Self::NotFree { address } => {
                write!(f, "page {:#x} on a free list but not marked free", address)
            }
            Self::NotInitialized => write!(f, "page pools not initialized"),
        }
    }
}

/// Convenience result type for allocator operations.
pub type MmResult<T = ()> = Result<T, MmError>;
