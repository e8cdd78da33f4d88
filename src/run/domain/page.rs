//! Pagination and filtering for ledger listings.

use super::{RunId, RunStatus, TaskName, TaskResultState};

/// Requested page of a listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    page: u32,
    limit: u32,
}

impl PageRequest {
    /// Items per page when none is requested.
    pub const DEFAULT_LIMIT: u32 = 20;
    /// Largest accepted page size.
    pub const MAX_LIMIT: u32 = 50;

    /// Creates a page request, normalising out-of-range values.
    ///
    /// Page numbers start at 1; a zero page selects the first page. A zero
    /// limit selects [`Self::DEFAULT_LIMIT`] and larger limits are clamped to
    /// [`Self::MAX_LIMIT`].
    #[must_use]
    pub const fn new(page: u32, limit: u32) -> Self {
        let normalized_limit = if limit == 0 {
            Self::DEFAULT_LIMIT
        } else if limit > Self::MAX_LIMIT {
            Self::MAX_LIMIT
        } else {
            limit
        };
        Self {
            page: if page == 0 { 1 } else { page },
            limit: normalized_limit,
        }
    }

    /// Returns the 1-based page number.
    #[must_use]
    pub const fn page(self) -> u32 {
        self.page
    }

    /// Returns the page size.
    #[must_use]
    pub const fn limit(self) -> u32 {
        self.limit
    }

    /// Returns the number of items preceding this page.
    #[must_use]
    pub const fn offset(self) -> u64 {
        (self.page as u64 - 1) * self.limit as u64
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self::new(1, Self::DEFAULT_LIMIT)
    }
}

/// One page of listing results.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    /// Items on this page.
    pub items: Vec<T>,
    /// Request the page answers.
    pub request: PageRequest,
    /// Number of items across all pages.
    pub total_items: u64,
}

impl<T> Page<T> {
    /// Returns the previous page number, or 0 on the first page.
    #[must_use]
    pub const fn previous_page(&self) -> u32 {
        self.request.page - 1
    }

    /// Returns the next page number, or 0 on the last page.
    #[must_use]
    pub const fn next_page(&self) -> u32 {
        let seen = self.request.page as u64 * self.request.limit as u64;
        if seen < self.total_items {
            self.request.page + 1
        } else {
            0
        }
    }

    /// Returns the number of pages needed for all items.
    #[must_use]
    pub const fn total_pages(&self) -> u64 {
        self.total_items.div_ceil(self.request.limit as u64)
    }
}

/// Filter for run listings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunFilter {
    /// Statuses to include; empty includes all.
    pub statuses: Vec<RunStatus>,
    /// Restricts results to one task.
    pub task_name: Option<TaskName>,
}

impl RunFilter {
    /// Returns `true` when the run passes the filter.
    #[must_use]
    pub fn matches(&self, status: RunStatus, task_name: &TaskName) -> bool {
        (self.statuses.is_empty() || self.statuses.contains(&status))
            && self.task_name.as_ref().is_none_or(|name| name == task_name)
    }
}

/// Filter for task result listings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskResultFilter {
    /// Restricts results to one run.
    pub run_id: Option<RunId>,
    /// Restricts results to one repository.
    pub repository_name: Option<String>,
    /// States to include; empty includes all.
    pub states: Vec<TaskResultState>,
}

impl TaskResultFilter {
    /// Returns `true` when a result with these attributes passes the filter.
    #[must_use]
    pub fn matches(&self, run_id: RunId, repository_name: &str, state: TaskResultState) -> bool {
        self.run_id.is_none_or(|id| id == run_id)
            && self
                .repository_name
                .as_deref()
                .is_none_or(|name| name == repository_name)
            && (self.states.is_empty() || self.states.contains(&state))
    }
}
