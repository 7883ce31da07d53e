/// Fixed public listings window
pub const PAGE_SIZE: i64 = 27;

#[derive(Serialize, Clone, Debug, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// 1-based
    pub page: i64,
    pub has_next: bool,
}

/// Normalizes a requested page number, anything below 1 is the first page
pub fn page_number(page: Option<i64>) -> i64 {
    match page {
        Some(page) if page > 1 => page,
        _ => 1,
    }
}

pub fn page_offset(page: i64) -> i64 {
    (page - 1) * PAGE_SIZE
}
