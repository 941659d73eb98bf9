//! Article content backed by the hosted CMS.
//!
//! The CMS query engine is an external collaborator behind the
//! [`ContentClient`] seam. [`ContentService`] owns the site's degradation
//! policy: a content fetch that fails renders an empty page, never a 500 —
//! the cause is logged for operators.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::error;

/// Reference to a CMS-hosted image with its alt text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageRef {
    pub asset: String,
    pub alt: Option<String>,
}

/// Article author as projected by the CMS.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Author {
    pub id: String,
    pub name: String,
    pub slug: String,
    pub title: Option<String>,
    pub bio: Option<String>,
    pub linkedin: Option<String>,
    pub github: Option<String>,
    pub image: Option<ImageRef>,
}

/// Search-engine metadata attached to an article.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Seo {
    pub meta_title: Option<String>,
    pub meta_description: Option<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    pub open_graph_image: Option<ImageRef>,
    #[serde(default)]
    pub no_index: bool,
    pub canonical: Option<String>,
}

/// A published article in the projection the site renders.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Article {
    pub id: String,
    pub title: String,
    pub slug: String,
    pub author: Option<Author>,
    pub main_image: Option<ImageRef>,
    #[serde(default)]
    pub categories: Vec<String>,
    pub published_at: DateTime<Utc>,
    #[serde(default)]
    pub is_featured: bool,
    pub reading_time: Option<u32>,
    pub body: String,
    pub seo: Option<Seo>,
}

/// Errors from the CMS collaborator.
#[derive(Debug, Error)]
pub enum ContentError {
    #[error("content transport error: {0}")]
    Transport(String),

    #[error("content payload could not be decoded: {0}")]
    Decode(#[from] serde_json::Error),
}

/// CMS query seam.
///
/// `all_posts` returns articles ordered by `published_at` descending, matching
/// the projection the hosted CMS serves.
#[async_trait]
pub trait ContentClient: Send + Sync {
    async fn all_posts(&self) -> Result<Vec<Article>, ContentError>;
    async fn post_by_slug(&self, slug: &str) -> Result<Option<Article>, ContentError>;
}

/// Article access with the site's degradation policy applied.
#[derive(Clone)]
pub struct ContentService {
    client: Arc<dyn ContentClient>,
}

impl ContentService {
    pub fn new(client: Arc<dyn ContentClient>) -> Self {
        Self { client }
    }

    /// All published articles, newest first. Degrades to an empty list on
    /// fetch failure.
    pub async fn all_posts(&self) -> Vec<Article> {
        match self.client.all_posts().await {
            Ok(posts) => posts,
            Err(err) => {
                error!(error = %err, "error fetching all posts");
                Vec::new()
            }
        }
    }

    /// A single article by slug. Degrades to `None` on fetch failure.
    pub async fn post_by_slug(&self, slug: &str) -> Option<Article> {
        match self.client.post_by_slug(slug).await {
            Ok(post) => post,
            Err(err) => {
                error!(slug, error = %err, "error fetching post by slug");
                None
            }
        }
    }
}

/// In-memory content source with a fixed article set. Serves local runs and
/// tests; production deployments wire a hosted-CMS client in its place.
#[derive(Debug, Clone, Default)]
pub struct StaticContent {
    articles: Vec<Article>,
}

impl StaticContent {
    pub fn new(mut articles: Vec<Article>) -> Self {
        articles.sort_by(|a, b| b.published_at.cmp(&a.published_at));
        Self { articles }
    }

    /// A small built-in article set for local runs.
    pub fn sample() -> Self {
        fn article(id: &str, title: &str, slug: &str, published_at: &str, body: &str) -> Article {
            Article {
                id: id.to_owned(),
                title: title.to_owned(),
                slug: slug.to_owned(),
                author: None,
                main_image: None,
                categories: vec!["markets".to_owned()],
                published_at: published_at
                    .parse()
                    .unwrap_or_else(|_| DateTime::<Utc>::MIN_UTC),
                is_featured: false,
                reading_time: Some(4),
                body: body.to_owned(),
                seo: None,
            }
        }

        Self::new(vec![
            article(
                "post-rate-cycles",
                "What rate cycles mean for your watchlist",
                "rate-cycles-watchlist",
                "2025-10-02T09:00:00Z",
                "Central-bank rate paths ripple through every sector differently.",
            ),
            article(
                "post-etf-basics",
                "ETF basics for long-horizon investors",
                "etf-basics",
                "2025-09-14T09:00:00Z",
                "Broad-market funds remain the simplest diversification tool available.",
            ),
            article(
                "post-earnings-season",
                "Reading an earnings season without the noise",
                "reading-earnings-season",
                "2025-10-20T09:00:00Z",
                "Guidance revisions move prices more than the headline beat.",
            ),
        ])
    }
}

#[async_trait]
impl ContentClient for StaticContent {
    async fn all_posts(&self) -> Result<Vec<Article>, ContentError> {
        Ok(self.articles.clone())
    }

    async fn post_by_slug(&self, slug: &str) -> Result<Option<Article>, ContentError> {
        Ok(self.articles.iter().find(|a| a.slug == slug).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct BrokenClient;

    #[async_trait]
    impl ContentClient for BrokenClient {
        async fn all_posts(&self) -> Result<Vec<Article>, ContentError> {
            Err(ContentError::Transport("cms unreachable".to_owned()))
        }

        async fn post_by_slug(&self, _slug: &str) -> Result<Option<Article>, ContentError> {
            Err(ContentError::Transport("cms unreachable".to_owned()))
        }
    }

    #[tokio::test]
    async fn sample_posts_are_newest_first() {
        let service = ContentService::new(Arc::new(StaticContent::sample()));
        let posts = service.all_posts().await;

        assert_eq!(posts.len(), 3);
        assert_eq!(posts[0].slug, "reading-earnings-season");
        assert!(posts.windows(2).all(|w| w[0].published_at >= w[1].published_at));
    }

    #[tokio::test]
    async fn post_by_slug_finds_a_known_article() {
        let service = ContentService::new(Arc::new(StaticContent::sample()));
        let post = service.post_by_slug("etf-basics").await.unwrap();
        assert_eq!(post.title, "ETF basics for long-horizon investors");
    }

    #[tokio::test]
    async fn post_by_unknown_slug_is_none() {
        let service = ContentService::new(Arc::new(StaticContent::sample()));
        assert!(service.post_by_slug("missing").await.is_none());
    }

    #[tokio::test]
    async fn fetch_failure_degrades_to_empty_list() {
        let service = ContentService::new(Arc::new(BrokenClient));
        assert!(service.all_posts().await.is_empty());
        assert!(service.post_by_slug("anything").await.is_none());
    }

    #[test]
    fn article_serializes_with_camel_case_keys() {
        let content = StaticContent::sample();
        let json = serde_json::to_value(&content.articles[0]).unwrap();
        assert!(json.get("publishedAt").is_some());
        assert!(json.get("isFeatured").is_some());
        assert!(json.get("readingTime").is_some());
    }
}
