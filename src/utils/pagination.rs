use serde_json::{json, Value};

pub const MAX_LIMIT: i64 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub page: i64,
    pub limit: i64,
}

impl Pagination {
    /// Page defaults to 1; limit falls back to `default_limit` and is clamped to `1..=100`.
    pub fn new(page: Option<i64>, limit: Option<i64>, default_limit: i64) -> Self {
        Self {
            page: page.filter(|p| *p > 0).unwrap_or(1),
            limit: limit.unwrap_or(default_limit).clamp(1, MAX_LIMIT),
        }
    }

    pub fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.limit)
    }

    pub fn meta(&self, total: i64) -> Value {
        json!({
            "page": self.page,
            "limit": self.limit,
            "total": total,
            "totalPages": (total + self.limit - 1) / self.limit,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_and_clamping() {
        let p = Pagination::new(None, None, 20);
        assert_eq!((p.page, p.limit, p.offset()), (1, 20, 0));

        let p = Pagination::new(Some(3), Some(500), 20);
        assert_eq!((p.page, p.limit, p.offset()), (3, 100, 200));

        let p = Pagination::new(Some(0), Some(0), 50);
        assert_eq!((p.page, p.limit), (1, 1));
    }

    #[test]
    fn total_pages_rounds_up() {
        let p = Pagination::new(Some(1), Some(20), 20);
        assert_eq!(p.meta(41)["totalPages"], 3);
        assert_eq!(p.meta(0)["totalPages"], 0);
        assert_eq!(p.meta(40)["totalPages"], 2);
    }
}
