//! Paged lists and the infinite-scroll controller.

mod controller;
mod list;
mod source;
mod state;

pub use controller::{LoadOutcome, PaginationConfig, PaginationController};
pub use list::PaginatedList;
pub use source::{PageSource, RepositoryPageSource};
pub use state::PaginationState;
