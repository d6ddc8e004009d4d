//! Page metadata shared by every inventory message.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Status message attached to pages built from a successful collection.
pub const STATUS_RETRIEVED: &str = "Successfully retrieved from Site Controller";
/// Status message attached to the single page of an empty inventory.
pub const STATUS_NO_ITEMS: &str = "No items reported by Site Controller";

/// Outcome of an inventory collection, as reported to the cloud.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InventoryStatus {
    Success,
    Failed,
}

/// Pagination block of a published inventory message.
///
/// `item_ids` is always the complete ID list of the run, not just the
/// IDs on this page, so the receiver can reconcile deletions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryPage {
    pub total_pages: usize,
    pub current_page: usize,
    pub page_size: usize,
    pub total_items: usize,
    pub item_ids: Vec<String>,
}

/// Paging parameters handed to a resource's page builder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PagedInventoryInput {
    pub total_items: usize,
    pub total_pages: usize,
    pub page_size: usize,
    pub page_number: usize,
    pub status: InventoryStatus,
    pub status_message: String,
}

impl PagedInventoryInput {
    /// Parameters for page `page_number` of a successful collection.
    pub fn success(
        total_items: usize,
        page_size: usize,
        page_number: usize,
        status_message: impl Into<String>,
    ) -> Self {
        Self {
            total_items,
            total_pages: total_pages(total_items, page_size),
            page_size,
            page_number,
            status: InventoryStatus::Success,
            status_message: status_message.into(),
        }
    }

    /// Parameters for the page that reports a failed collection.
    pub fn failed(page_size: usize, status_message: impl Into<String>) -> Self {
        Self {
            total_items: 0,
            total_pages: 0,
            page_size,
            page_number: 0,
            status: InventoryStatus::Failed,
            status_message: status_message.into(),
        }
    }

    /// Pagination block for this page. Failed collections carry none.
    pub fn build_page(&self, item_ids: Vec<String>) -> Option<InventoryPage> {
        if self.status != InventoryStatus::Success {
            return None;
        }
        Some(InventoryPage {
            total_pages: self.total_pages,
            current_page: self.page_number,
            page_size: self.page_size,
            total_items: self.total_items,
            item_ids,
        })
    }
}

/// Number of pages needed for `total_items` at `page_size` per page.
pub fn total_pages(total_items: usize, page_size: usize) -> usize {
    if page_size == 0 {
        return 0;
    }
    total_items.div_ceil(page_size)
}

/// Current time in unix seconds, stamped on every published message.
pub(crate) fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn total_pages_rounds_up() {
        assert_eq!(total_pages(195, 25), 8);
        assert_eq!(total_pages(200, 25), 8);
        assert_eq!(total_pages(1, 25), 1);
        assert_eq!(total_pages(0, 25), 0);
        assert_eq!(total_pages(10, 0), 0);
    }

    #[test]
    fn success_builds_page() {
        let input = PagedInventoryInput::success(195, 25, 3, STATUS_RETRIEVED);
        let page = input.build_page(vec!["a".into()]).unwrap();
        assert_eq!(page.total_pages, 8);
        assert_eq!(page.current_page, 3);
        assert_eq!(page.page_size, 25);
        assert_eq!(page.total_items, 195);
        assert_eq!(page.item_ids, vec!["a".to_string()]);
    }

    #[test]
    fn failed_has_no_page() {
        let input = PagedInventoryInput::failed(25, "boom");
        assert_eq!(input.status, InventoryStatus::Failed);
        assert!(input.build_page(vec![]).is_none());
    }

    #[test]
    fn status_serializes_upper_case() {
        assert_eq!(
            serde_json::to_string(&InventoryStatus::Success).unwrap(),
            "\"SUCCESS\""
        );
        assert_eq!(
            serde_json::to_string(&InventoryStatus::Failed).unwrap(),
            "\"FAILED\""
        );
    }
}
