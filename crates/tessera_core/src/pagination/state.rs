//! Observable states of the pagination controller.

use super::PaginatedList;
use crate::error::Failure;

/// What the controller is doing and what data it holds.
#[derive(Debug, Clone, PartialEq)]
pub enum PaginationState<T> {
    /// The first page is being fetched and nothing is shown yet.
    InitialLoading,
    /// Data is loaded and no fetch is running.
    Idle(PaginatedList<T>),
    /// The next page is being fetched; the current data stays visible.
    LoadingMore(PaginatedList<T>),
    /// Page 1 is being re-fetched; the current data stays visible.
    Refreshing(PaginatedList<T>),
    /// The last fetch failed. Data loaded before the failure is kept.
    Error {
        /// Data loaded before the failure, if any.
        data: Option<PaginatedList<T>>,
        /// What went wrong.
        failure: Failure,
    },
}

impl<T> PaginationState<T> {
    /// The data currently shown, if any.
    pub fn data(&self) -> Option<&PaginatedList<T>> {
        match self {
            PaginationState::InitialLoading => None,
            PaginationState::Idle(data)
            | PaginationState::LoadingMore(data)
            | PaginationState::Refreshing(data) => Some(data),
            PaginationState::Error { data, .. } => data.as_ref(),
        }
    }

    /// Items currently shown (empty while nothing is loaded).
    pub fn items(&self) -> &[T] {
        match self.data() {
            Some(data) => data.items(),
            None => &[],
        }
    }

    /// Returns true while a fetch is running.
    pub fn is_loading(&self) -> bool {
        matches!(
            self,
            PaginationState::InitialLoading
                | PaginationState::LoadingMore(_)
                | PaginationState::Refreshing(_)
        )
    }

    /// The user-facing error message, in the error state.
    pub fn message(&self) -> Option<String> {
        match self {
            PaginationState::Error { failure, .. } => Some(failure.user_message()),
            _ => None,
        }
    }

    /// The failure, in the error state.
    pub fn failure(&self) -> Option<&Failure> {
        match self {
            PaginationState::Error { failure, .. } => Some(failure),
            _ => None,
        }
    }
}
