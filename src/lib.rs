//! A library of concurrent in-memory data structures backed by a
//! contiguous shared-memory arena (spec.md §1).
//!
//! One cooperating party produces entries and another consumes them
//! through one of the seven container families in [`containers`], with
//! no data copied across the boundary: every container's nodes and head
//! record live inside an [`arena::Arena`], referenced only by
//! [`arena::ArenaOffset`] so the same layout works whether the arena is a
//! private heap allocation or a region mapped at different base addresses
//! in two address spaces.
//!
//! Logging in this crate ([`tracing`]) is confined to construction and
//! `verify` — the insert/pop/search hot paths never touch it, since a
//! lock-free algorithm that logs on its fast path has stopped being
//! lock-free in any practical sense.

pub mod arena;
pub mod atomics;
pub mod constants;
pub mod containers;
pub mod error;
pub mod result;
pub mod types;

pub use arena::{Arena, ArenaOffset};
pub use containers::{BstEfrb, CkSpsc, FollySpsc, List, MsQueue, VyukovMpmc, VyukovMpsc};
pub use error::{FluxCellError, Result};
pub use result::OpResult;
pub use types::{ContainerHandle, ContainerMetadata, Kv};
