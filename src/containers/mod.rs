//! The seven concurrent container families (spec.md §4.D-J), each built
//! directly on [`crate::arena::Arena`] and [`crate::atomics`].

pub mod bst_efrb;
pub mod common;
pub mod list;
pub mod ms_queue;
pub mod spsc_ck;
pub mod spsc_folly;
pub mod vyukov_mpmc;
pub mod vyukov_mpsc;

pub use bst_efrb::BstEfrb;
pub use list::List;
pub use ms_queue::MsQueue;
pub use spsc_ck::CkSpsc;
pub use spsc_folly::FollySpsc;
pub use vyukov_mpmc::VyukovMpmc;
pub use vyukov_mpsc::VyukovMpsc;
