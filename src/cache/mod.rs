//! Rendered view cache.
//!
//! Every servable page lives here as a fully rendered [`Snapshot`]. Readers
//! clone the current snapshot under a shared guard; the update coordinator
//! renders off-lock and then swaps the stored snapshot under an exclusive
//! guard held only for the assignment. Readers therefore see either the old
//! or the new page in full, never a mix.

mod keys;
mod lock;
mod store;

pub use keys::View;
pub use store::{ContentCache, Snapshot};
