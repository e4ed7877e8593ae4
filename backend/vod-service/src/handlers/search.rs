/// Search handlers - public video search
use actix_web::web;
use serde::Deserialize;
use std::sync::Arc;

use crate::error::Result;
use crate::services::ElasticsearchIndex;

const DEFAULT_PAGE_SIZE: u64 = 20;
const MAX_PAGE_SIZE: u64 = 100;

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
    pub page: Option<u64>,
    #[serde(rename = "pageSize")]
    pub page_size: Option<u64>,
}

/// Query publicly visible, ready videos.
pub async fn search(
    index: web::Data<Arc<ElasticsearchIndex>>,
    query: web::Query<SearchQuery>,
) -> Result<actix_web::HttpResponse> {
    let (page, page_size) = clamp_paging(query.page, query.page_size);
    let results = index.search(&query.q, page, page_size).await?;

    Ok(actix_web::HttpResponse::Ok().json(results))
}

fn clamp_paging(page: Option<u64>, page_size: Option<u64>) -> (u64, u64) {
    let page = page.unwrap_or(1).max(1);
    let page_size = page_size.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
    (page, page_size)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paging_defaults_and_bounds() {
        assert_eq!(clamp_paging(None, None), (1, 20));
        assert_eq!(clamp_paging(Some(0), Some(0)), (1, 1));
        assert_eq!(clamp_paging(Some(3), Some(50)), (3, 50));
        assert_eq!(clamp_paging(Some(1), Some(1000)), (1, 100));
    }
}
