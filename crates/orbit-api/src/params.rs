use serde::{Deserialize, Deserializer};
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};

/// `?page=&limit=` with 1-based pages.
#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    #[serde(default, deserialize_with = "lenient_u32")]
    pub page: Option<u32>,
    #[serde(default, deserialize_with = "lenient_u32")]
    pub limit: Option<u32>,
}

impl PageQuery {
    /// (limit, offset).
    pub fn resolve(&self, default_limit: u32, max_limit: u32) -> (u32, u32) {
        let limit = self.limit.filter(|l| *l > 0).unwrap_or(default_limit).min(max_limit);
        let page = self.page.filter(|p| *p > 0).unwrap_or(1);
        (limit, (page - 1).saturating_mul(limit))
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct LimitQuery {
    #[serde(default, deserialize_with = "lenient_u32")]
    pub limit: Option<u32>,
}

impl LimitQuery {
    pub fn resolve(&self, default_limit: u32, max_limit: u32) -> u32 {
        self.limit.filter(|l| *l > 0).unwrap_or(default_limit).min(max_limit)
    }
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
}

/// Numbers that fail to parse (`abc`, `-1`) count as absent.
fn lenient_u32<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.and_then(|v| v.trim().parse().ok()))
}

/// Id taken from the URL. A malformed id cannot name an existing record,
/// so it gets the same 404 as a missing one.
pub fn path_id(raw: &str, missing: &str) -> ApiResult<Uuid> {
    Uuid::parse_str(raw.trim()).map_err(|_| ApiError::not_found(missing))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_query_resolves_limit_and_offset() {
        let q = PageQuery { page: None, limit: None };
        assert_eq!(q.resolve(20, 100), (20, 0));

        let q = PageQuery { page: Some(3), limit: Some(10) };
        assert_eq!(q.resolve(20, 100), (10, 20));

        let q = PageQuery { page: Some(0), limit: Some(500) };
        assert_eq!(q.resolve(20, 100), (100, 0));
    }

    #[test]
    fn garbage_numbers_fall_back_to_defaults() {
        let q: PageQuery = serde_json::from_value(serde_json::json!({ "page": "two", "limit": "-1" })).unwrap();
        assert_eq!(q.resolve(20, 100), (20, 0));

        let q: LimitQuery = serde_json::from_value(serde_json::json!({ "limit": " 7 " })).unwrap();
        assert_eq!(q.resolve(10, 50), 7);

        let q: LimitQuery = serde_json::from_value(serde_json::json!({})).unwrap();
        assert_eq!(q.resolve(10, 50), 10);
    }

    #[test]
    fn malformed_path_ids_are_not_found() {
        let err = path_id("123", "Post not found").unwrap_err();
        assert!(matches!(err, ApiError::NotFound(ref msg) if msg == "Post not found"));

        let id = Uuid::new_v4();
        assert_eq!(path_id(&id.to_string(), "Post not found").unwrap(), id);
    }
}
