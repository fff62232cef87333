//! Shared DTO types used across multiple endpoints.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::domain::{RobotId, RobotStatus};

/// Pagination query parameters for list endpoints.
#[derive(Debug, Clone, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PaginationParams {
    /// Page number (1-indexed). Defaults to 1.
    #[serde(default = "default_page")]
    pub page: u32,
    /// Items per page (max 100). Defaults to 20.
    #[serde(default = "default_per_page")]
    pub per_page: u32,
}

/// Pagination metadata included in list responses.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PaginationMeta {
    /// Current page number.
    pub page: u32,
    /// Items per page.
    pub per_page: u32,
    /// Total number of items.
    pub total: u32,
    /// Total number of pages.
    pub total_pages: u32,
}

fn default_page() -> u32 {
    1
}

fn default_per_page() -> u32 {
    20
}

impl PaginationParams {
    /// Clamps `per_page` to the allowed maximum of 100.
    #[must_use]
    pub fn clamped(&self) -> Self {
        Self {
            page: self.page.max(1),
            per_page: self.per_page.clamp(1, 100),
        }
    }

    /// Slices `items` to the requested page and builds the metadata.
    #[must_use]
    pub fn paginate<T>(&self, items: Vec<T>) -> (Vec<T>, PaginationMeta) {
        let params = self.clamped();
        let total = u32::try_from(items.len()).unwrap_or(u32::MAX);
        let total_pages = if total == 0 {
            0
        } else {
            total.div_ceil(params.per_page)
        };
        let per_page = usize::try_from(params.per_page).unwrap_or(usize::MAX);
        let start = usize::try_from(params.page.saturating_sub(1))
            .unwrap_or(usize::MAX)
            .saturating_mul(per_page);
        let data = items.into_iter().skip(start).take(per_page).collect();
        (
            data,
            PaginationMeta {
                page: params.page,
                per_page: params.per_page,
                total,
                total_pages,
            },
        )
    }
}

/// Robot status after an administrative transition.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RobotStatusResponse {
    /// Robot identifier.
    pub robot_id: RobotId,
    /// Resulting status.
    pub status: RobotStatus,
    /// Server timestamp.
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
#[allow(clippy::panic)]
mod tests {
    use super::*;

    #[test]
    fn paginate_slices_and_counts() {
        let params = PaginationParams {
            page: 2,
            per_page: 2,
        };
        let (data, meta) = params.paginate(vec![1, 2, 3, 4, 5]);
        assert_eq!(data, vec![3, 4]);
        assert_eq!(meta.total, 5);
        assert_eq!(meta.total_pages, 3);
    }

    #[test]
    fn paginate_past_the_end_is_empty() {
        let params = PaginationParams {
            page: u32::MAX,
            per_page: 100,
        };
        let (data, meta) = params.paginate(vec![1, 2, 3]);
        assert!(data.is_empty());
        assert_eq!(meta.page, u32::MAX);
        assert_eq!(meta.total_pages, 1);
    }

    #[test]
    fn paginate_clamps_page_size() {
        let params = PaginationParams {
            page: 0,
            per_page: 500,
        };
        let (data, meta) = params.paginate((0..150).collect::<Vec<u32>>());
        assert_eq!(meta.page, 1);
        assert_eq!(meta.per_page, 100);
        assert_eq!(data.len(), 100);
    }

    #[test]
    fn empty_list_has_no_pages() {
        let (data, meta) = PaginationParams {
            page: 1,
            per_page: 20,
        }
        .paginate(Vec::<u8>::new());
        assert!(data.is_empty());
        assert_eq!(meta.total_pages, 0);
    }
}
