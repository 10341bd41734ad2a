use crate::error::Error;

pub const MAX_PAGE_SIZE: i64 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    limit: i64,
    offset: Option<i64>,
}

impl Pagination {
    pub fn new(limit: i64, offset: Option<i64>) -> Self {
        Self { limit, offset }
    }

    /// Pages are 1-based; anything below 1 is clamped. `size` may not exceed
    /// [`MAX_PAGE_SIZE`].
    pub fn from_page(page: i64, size: i64) -> Result<Self, Error> {
        if size > MAX_PAGE_SIZE {
            return Err(Error::ValidationError(format!("page size must be at most {}", MAX_PAGE_SIZE)));
        }
        let page = page.max(1);
        let size = size.max(1);
        let offset = (page - 1).checked_mul(size).ok_or_else(|| Error::ValidationError(format!("page {} is out of range", page)))?;
        Ok(Self::new(size, Some(offset)))
    }

    pub fn limit(&self) -> i64 {
        self.limit
    }

    pub fn offset(&self) -> i64 {
        self.offset.unwrap_or(0)
    }
}
