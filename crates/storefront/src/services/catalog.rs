//! Cached catalog reads.
//!
//! Product detail pages, the home page and unfiltered listing pages are
//! cached in `moka` for 60 seconds. Any admin catalog write and every order
//! that moves stock calls [`CatalogService::invalidate`].

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use serde::Serialize;
use sqlx::PgPool;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::db::{ProductRepository, RepositoryError};
use crate::models::{Page, ProductDetail, ProductFilter, ProductSummary};

const CACHE_TTL: Duration = Duration::from_secs(60);
const CACHE_CAPACITY: u64 = 1000;

/// Products shown in each home page row.
pub const HOME_ROW_SIZE: i64 = 8;

/// Errors from catalog reads.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("product not found")]
    NotFound,
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Everything the home page shows.
#[derive(Debug, Clone, Serialize)]
pub struct HomeContent {
    pub featured: Vec<ProductSummary>,
    pub newest: Vec<ProductSummary>,
    pub categories: Vec<String>,
}

/// Values for the listing filter controls.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Facets {
    pub categories: Vec<String>,
    pub brands: Vec<String>,
    pub sizes: Vec<String>,
}

#[derive(Debug, Clone, Hash, PartialEq, Eq)]
enum CacheKey {
    Product(String),
    Listing(ProductFilter),
    Home,
    Facets,
}

#[derive(Debug, Clone)]
enum CacheValue {
    Product(Arc<ProductDetail>),
    Listing(Arc<Page<ProductSummary>>),
    Home(Arc<HomeContent>),
    Facets(Arc<Facets>),
}

/// Catalog reads for the shop, backed by a short-lived cache.
#[derive(Clone)]
pub struct CatalogService {
    inner: Arc<CatalogInner>,
}

struct CatalogInner {
    pool: PgPool,
    cache: Cache<CacheKey, CacheValue>,
}

impl CatalogService {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        let cache = Cache::builder()
            .max_capacity(CACHE_CAPACITY)
            .time_to_live(CACHE_TTL)
            .build();
        Self {
            inner: Arc::new(CatalogInner { pool, cache }),
        }
    }

    fn products(&self) -> ProductRepository<'_> {
        ProductRepository::new(&self.inner.pool)
    }

    /// Drop every cached entry.
    pub fn invalidate(&self) {
        self.inner.cache.invalidate_all();
        debug!("Catalog cache invalidated");
    }

    /// Active product detail by slug.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::NotFound` if the product is missing or inactive.
    #[instrument(skip(self))]
    pub async fn product(&self, slug: &str) -> Result<Arc<ProductDetail>, CatalogError> {
        let key = CacheKey::Product(slug.to_string());
        if let Some(CacheValue::Product(detail)) = self.inner.cache.get(&key).await {
            debug!("Cache hit for product");
            return Ok(detail);
        }

        let detail = Arc::new(
            self.products()
                .get_detail_by_slug(slug, false)
                .await?
                .ok_or(CatalogError::NotFound)?,
        );
        self.inner
            .cache
            .insert(key, CacheValue::Product(Arc::clone(&detail)))
            .await;
        Ok(detail)
    }

    /// One listing page. Only unfiltered pages are cached.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::Repository` if the query fails.
    #[instrument(skip(self))]
    pub async fn list(
        &self,
        filter: &ProductFilter,
    ) -> Result<Arc<Page<ProductSummary>>, CatalogError> {
        let cacheable = filter.is_unfiltered();
        let key = CacheKey::Listing(filter.clone());
        if cacheable && let Some(CacheValue::Listing(page)) = self.inner.cache.get(&key).await {
            debug!("Cache hit for listing");
            return Ok(page);
        }

        let page = Arc::new(self.products().list(filter).await?);
        if cacheable {
            self.inner
                .cache
                .insert(key, CacheValue::Listing(Arc::clone(&page)))
                .await;
        }
        Ok(page)
    }

    /// Featured and newest products plus category chips.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::Repository` if a query fails.
    #[instrument(skip(self))]
    pub async fn home(&self) -> Result<Arc<HomeContent>, CatalogError> {
        if let Some(CacheValue::Home(home)) = self.inner.cache.get(&CacheKey::Home).await {
            return Ok(home);
        }

        let products = self.products();
        let newest = products
            .list(&ProductFilter {
                page: 1,
                ..ProductFilter::default()
            })
            .await?
            .items
            .into_iter()
            .take(usize::try_from(HOME_ROW_SIZE).unwrap_or(8))
            .collect();
        let home = Arc::new(HomeContent {
            featured: products.featured(HOME_ROW_SIZE).await?,
            newest,
            categories: products.categories().await?,
        });

        self.inner
            .cache
            .insert(CacheKey::Home, CacheValue::Home(Arc::clone(&home)))
            .await;
        Ok(home)
    }

    /// Categories, brands and size labels in the active catalog.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::Repository` if a query fails.
    pub async fn facets(&self) -> Result<Arc<Facets>, CatalogError> {
        if let Some(CacheValue::Facets(facets)) = self.inner.cache.get(&CacheKey::Facets).await {
            return Ok(facets);
        }

        let products = self.products();
        let facets = Arc::new(Facets {
            categories: products.categories().await?,
            brands: products.brands().await?,
            sizes: products.size_labels().await?,
        });
        self.inner
            .cache
            .insert(CacheKey::Facets, CacheValue::Facets(Arc::clone(&facets)))
            .await;
        Ok(facets)
    }
}
