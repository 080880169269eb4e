//! PostgreSQL catalog store

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgArguments, PgPoolOptions};
use sqlx::query::Query;
use sqlx::types::Json;
use sqlx::{FromRow, PgConnection, PgPool, Postgres};
use uuid::Uuid;

use crate::application::ports::{
    CategoryLookup, CategoryStore, ListingStore, OfferStore, Page, Promotion, PromotionStore, RequestStore,
};
use crate::domain::aggregates::{CatalogListing, CatalogRequest, Category, CategoryScope, ListingOffer, RequestStatus};
use crate::domain::value_objects::{AuditStamp, GalleryItem, ItemKind, ProductDetails};
use crate::StoreError;

const OFFER_SELLER_INDEX: &str = "listing_offers_active_seller_idx";
const SLUG_CONSTRAINTS: [&str; 3] =
    ["catalog_slugs_pkey", "catalog_requests_seo_slug_key", "catalog_listings_seo_slug_key"];

const DETAIL_COLUMNS: &str = "name, short_description, description, price, inventory, is_custom_order, \
     item_kind, download_path, category_id, image_path, gallery";
const DETAIL_COUNT: usize = 11;

const REQUEST_COLUMNS: &str = "id, seller_id, target_product_id, name, short_description, description, price, \
     inventory, is_custom_order, item_kind, download_path, category_id, image_path, gallery, seo_slug, status, \
     reviewer_id, reviewed_at, rejection_reason, approved_product_id, is_deleted, created_by, created_ip, \
     created_at, updated_by, updated_ip, updated_at";

const LISTING_COLUMNS: &str = "id, seller_id, name, short_description, description, price, inventory, \
     is_custom_order, item_kind, download_path, category_id, image_path, gallery, seo_slug, is_published, \
     published_at, approved_from_request_id, is_deleted, created_by, created_ip, created_at, updated_by, \
     updated_ip, updated_at";

const OFFER_COLUMNS: &str = "id, product_id, seller_id, price, inventory, is_published, published_at, \
     approved_from_request_id, is_deleted, created_by, created_ip, created_at, updated_by, updated_ip, updated_at";

type PgQuery<'q> = Query<'q, Postgres, PgArguments>;

/// `$from, $from+1, ...` for `count` parameters.
fn placeholders(from: usize, count: usize) -> String {
    (from..from + count).map(|n| format!("${n}")).collect::<Vec<_>>().join(", ")
}

fn count(columns: &str) -> usize {
    columns.split(',').count()
}

// =============================================================================
// Rows
// =============================================================================

#[derive(FromRow)]
struct DetailsRow {
    name: String,
    short_description: Option<String>,
    description: String,
    price: Option<i64>,
    inventory: i32,
    is_custom_order: bool,
    item_kind: String,
    download_path: Option<String>,
    category_id: Uuid,
    image_path: Option<String>,
    gallery: Json<Vec<GalleryItem>>,
}

impl TryFrom<DetailsRow> for ProductDetails {
    type Error = StoreError;

    fn try_from(row: DetailsRow) -> Result<Self, Self::Error> {
        let item_kind = ItemKind::parse(&row.item_kind)
            .ok_or_else(|| StoreError::Corrupt(format!("unknown item kind '{}'", row.item_kind)))?;
        Ok(ProductDetails {
            name: row.name,
            short_description: row.short_description,
            description: row.description,
            price: row.price,
            inventory: row.inventory,
            is_custom_order: row.is_custom_order,
            item_kind,
            download_path: row.download_path,
            category_id: row.category_id,
            image_path: row.image_path,
            gallery: row.gallery.0,
        })
    }
}

#[derive(FromRow)]
struct AuditRow {
    created_by: Option<Uuid>,
    created_ip: Option<String>,
    created_at: DateTime<Utc>,
    updated_by: Option<Uuid>,
    updated_ip: Option<String>,
    updated_at: Option<DateTime<Utc>>,
}

impl AuditRow {
    fn split(self) -> (AuditStamp, Option<AuditStamp>) {
        let created = AuditStamp { user_id: self.created_by, ip_address: self.created_ip, at: self.created_at };
        let updated = self
            .updated_at
            .map(|at| AuditStamp { user_id: self.updated_by, ip_address: self.updated_ip, at });
        (created, updated)
    }
}

#[derive(FromRow)]
struct RequestRow {
    id: Uuid,
    seller_id: Uuid,
    target_product_id: Option<Uuid>,
    #[sqlx(flatten)]
    details: DetailsRow,
    seo_slug: String,
    status: String,
    reviewer_id: Option<Uuid>,
    reviewed_at: Option<DateTime<Utc>>,
    rejection_reason: Option<String>,
    approved_product_id: Option<Uuid>,
    is_deleted: bool,
    #[sqlx(flatten)]
    audit: AuditRow,
}

impl TryFrom<RequestRow> for CatalogRequest {
    type Error = StoreError;

    fn try_from(row: RequestRow) -> Result<Self, Self::Error> {
        let status = row.status.parse::<RequestStatus>().map_err(StoreError::Corrupt)?;
        let (created, updated) = row.audit.split();
        Ok(CatalogRequest {
            id: row.id,
            seller_id: row.seller_id,
            target_product_id: row.target_product_id,
            details: row.details.try_into()?,
            seo_slug: row.seo_slug,
            status,
            reviewer_id: row.reviewer_id,
            reviewed_at: row.reviewed_at,
            rejection_reason: row.rejection_reason,
            approved_product_id: row.approved_product_id,
            is_deleted: row.is_deleted,
            created,
            updated,
            events: Vec::new(),
        })
    }
}

#[derive(FromRow)]
struct ListingRow {
    id: Uuid,
    seller_id: Option<Uuid>,
    #[sqlx(flatten)]
    details: DetailsRow,
    seo_slug: String,
    is_published: bool,
    published_at: Option<DateTime<Utc>>,
    approved_from_request_id: Option<Uuid>,
    is_deleted: bool,
    #[sqlx(flatten)]
    audit: AuditRow,
}

impl TryFrom<ListingRow> for CatalogListing {
    type Error = StoreError;

    fn try_from(row: ListingRow) -> Result<Self, Self::Error> {
        let (created, updated) = row.audit.split();
        Ok(CatalogListing {
            id: row.id,
            seller_id: row.seller_id,
            details: row.details.try_into()?,
            seo_slug: row.seo_slug,
            is_published: row.is_published,
            published_at: row.published_at,
            approved_from_request_id: row.approved_from_request_id,
            is_deleted: row.is_deleted,
            created,
            updated,
        })
    }
}

#[derive(FromRow)]
struct OfferRow {
    id: Uuid,
    product_id: Uuid,
    seller_id: Uuid,
    price: i64,
    inventory: i32,
    is_published: bool,
    published_at: Option<DateTime<Utc>>,
    approved_from_request_id: Option<Uuid>,
    is_deleted: bool,
    #[sqlx(flatten)]
    audit: AuditRow,
}

impl From<OfferRow> for ListingOffer {
    fn from(row: OfferRow) -> Self {
        let (created, updated) = row.audit.split();
        ListingOffer {
            id: row.id,
            product_id: row.product_id,
            seller_id: row.seller_id,
            price: row.price,
            inventory: row.inventory,
            is_published: row.is_published,
            published_at: row.published_at,
            approved_from_request_id: row.approved_from_request_id,
            is_deleted: row.is_deleted,
            created,
            updated,
        }
    }
}

#[derive(FromRow)]
struct CategoryRow {
    id: Uuid,
    name: String,
    scope: String,
    is_deleted: bool,
}

impl TryFrom<CategoryRow> for Category {
    type Error = StoreError;

    fn try_from(row: CategoryRow) -> Result<Self, Self::Error> {
        let scope = CategoryScope::parse(&row.scope)
            .ok_or_else(|| StoreError::Corrupt(format!("unknown category scope '{}'", row.scope)))?;
        Ok(Category { id: row.id, name: row.name, scope, is_deleted: row.is_deleted })
    }
}

// =============================================================================
// Binding
// =============================================================================

fn bind_details<'q>(query: PgQuery<'q>, d: &'q ProductDetails) -> PgQuery<'q> {
    query
        .bind(&d.name)
        .bind(&d.short_description)
        .bind(&d.description)
        .bind(d.price)
        .bind(d.inventory)
        .bind(d.is_custom_order)
        .bind(d.item_kind.as_str())
        .bind(&d.download_path)
        .bind(d.category_id)
        .bind(&d.image_path)
        .bind(Json(&d.gallery))
}

fn bind_created<'q>(query: PgQuery<'q>, stamp: &'q AuditStamp) -> PgQuery<'q> {
    query.bind(stamp.user_id).bind(&stamp.ip_address).bind(stamp.at)
}

fn bind_updated<'q>(query: PgQuery<'q>, stamp: Option<&'q AuditStamp>) -> PgQuery<'q> {
    query
        .bind(stamp.and_then(|s| s.user_id))
        .bind(stamp.and_then(|s| s.ip_address.as_deref()))
        .bind(stamp.map(|s| s.at))
}

/// The conflict a unique violation on `constraint` stands for, if the
/// services handle it. Slug conflicts only apply to writes carrying a slug.
fn unique_conflict(constraint: Option<&str>, slug: Option<&str>) -> Option<StoreError> {
    match (constraint?, slug) {
        (OFFER_SELLER_INDEX, _) => Some(StoreError::DuplicateOffer),
        (name, Some(slug)) if SLUG_CONSTRAINTS.contains(&name) => Some(StoreError::SlugConflict(slug.to_string())),
        _ => None,
    }
}

fn write_error(err: sqlx::Error, slug: Option<&str>) -> StoreError {
    if let sqlx::Error::Database(db) = &err {
        if db.is_unique_violation() {
            if let Some(conflict) = unique_conflict(db.constraint(), slug) {
                return conflict;
            }
        }
    }
    StoreError::Database(err)
}

async fn insert_request(conn: &mut PgConnection, r: &CatalogRequest) -> Result<(), StoreError> {
    let sql = format!(
        "INSERT INTO catalog_requests ({REQUEST_COLUMNS}) VALUES ({})",
        placeholders(1, count(REQUEST_COLUMNS))
    );
    let query = sqlx::query(&sql).bind(r.id).bind(r.seller_id).bind(r.target_product_id);
    let query = bind_details(query, &r.details)
        .bind(&r.seo_slug)
        .bind(r.status.as_str())
        .bind(r.reviewer_id)
        .bind(r.reviewed_at)
        .bind(&r.rejection_reason)
        .bind(r.approved_product_id)
        .bind(r.is_deleted);
    let query = bind_updated(bind_created(query, &r.created), r.updated.as_ref());
    query.execute(&mut *conn).await.map_err(|e| write_error(e, Some(&r.seo_slug)))?;
    Ok(())
}

/// Rewrites the mutable columns of a request. With `pending_only` the write
/// only lands on a live pending row. Returns the rows affected.
async fn update_request(conn: &mut PgConnection, r: &CatalogRequest, pending_only: bool) -> Result<u64, StoreError> {
    let columns = format!(
        "{DETAIL_COLUMNS}, seo_slug, status, reviewer_id, reviewed_at, rejection_reason, approved_product_id, \
         is_deleted, updated_by, updated_ip, updated_at"
    );
    let guard = if pending_only { " AND status = 'pending' AND NOT is_deleted" } else { "" };
    let sql = format!(
        "UPDATE catalog_requests SET ({columns}) = ROW({}) WHERE id = $1{guard}",
        placeholders(2, DETAIL_COUNT + 10)
    );
    let query = bind_details(sqlx::query(&sql).bind(r.id), &r.details)
        .bind(&r.seo_slug)
        .bind(r.status.as_str())
        .bind(r.reviewer_id)
        .bind(r.reviewed_at)
        .bind(&r.rejection_reason)
        .bind(r.approved_product_id)
        .bind(r.is_deleted);
    let result = bind_updated(query, r.updated.as_ref())
        .execute(&mut *conn)
        .await
        .map_err(|e| write_error(e, Some(&r.seo_slug)))?;
    Ok(result.rows_affected())
}

async fn insert_listing(conn: &mut PgConnection, l: &CatalogListing) -> Result<(), StoreError> {
    let sql = format!(
        "INSERT INTO catalog_listings ({LISTING_COLUMNS}) VALUES ({})",
        placeholders(1, count(LISTING_COLUMNS))
    );
    let query = bind_details(sqlx::query(&sql).bind(l.id).bind(l.seller_id), &l.details)
        .bind(&l.seo_slug)
        .bind(l.is_published)
        .bind(l.published_at)
        .bind(l.approved_from_request_id)
        .bind(l.is_deleted);
    let query = bind_updated(bind_created(query, &l.created), l.updated.as_ref());
    query.execute(&mut *conn).await.map_err(|e| write_error(e, Some(&l.seo_slug)))?;
    Ok(())
}

async fn insert_offer(conn: &mut PgConnection, o: &ListingOffer) -> Result<(), StoreError> {
    let sql = format!(
        "INSERT INTO listing_offers ({OFFER_COLUMNS}) VALUES ({})",
        placeholders(1, count(OFFER_COLUMNS))
    );
    let query = sqlx::query(&sql)
        .bind(o.id)
        .bind(o.product_id)
        .bind(o.seller_id)
        .bind(o.price)
        .bind(o.inventory)
        .bind(o.is_published)
        .bind(o.published_at)
        .bind(o.approved_from_request_id)
        .bind(o.is_deleted);
    let query = bind_updated(bind_created(query, &o.created), o.updated.as_ref());
    query.execute(&mut *conn).await.map_err(|e| write_error(e, None))?;
    Ok(())
}

// =============================================================================
// Store
// =============================================================================

#[derive(Clone)]
pub struct PgCatalogStore {
    pool: PgPool,
}

impl PgCatalogStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new().max_connections(max_connections).connect(url).await?;
        Ok(Self::new(pool))
    }

    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }
}

#[async_trait]
impl RequestStore for PgCatalogStore {
    async fn request_by_id(&self, id: Uuid) -> Result<Option<CatalogRequest>, StoreError> {
        let sql = format!("SELECT {REQUEST_COLUMNS} FROM catalog_requests WHERE id = $1");
        let row = sqlx::query_as::<_, RequestRow>(&sql).bind(id).fetch_optional(&self.pool).await?;
        row.map(CatalogRequest::try_from).transpose()
    }

    async fn request_slug_exists(&self, slug: &str, exclude_id: Option<Uuid>) -> Result<bool, StoreError> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM catalog_requests WHERE seo_slug = $1 AND ($2::uuid IS NULL OR id <> $2))",
        )
        .bind(slug)
        .bind(exclude_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn pending_request_exists(&self, seller_id: Uuid, product_id: Uuid) -> Result<bool, StoreError> {
        let exists = sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM catalog_requests
                WHERE seller_id = $1 AND target_product_id = $2 AND status = 'pending' AND NOT is_deleted
            )
            "#,
        )
        .bind(seller_id)
        .bind(product_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn add_request(&self, request: &CatalogRequest) -> Result<(), StoreError> {
        let mut conn = self.pool.acquire().await?;
        insert_request(&mut conn, request).await
    }

    async fn update_request(&self, request: &CatalogRequest) -> Result<(), StoreError> {
        let mut conn = self.pool.acquire().await?;
        match update_request(&mut conn, request, false).await? {
            0 => Err(StoreError::Missing(request.id)),
            _ => Ok(()),
        }
    }

    async fn list_requests(&self, status: Option<RequestStatus>, page: Page) -> Result<Vec<CatalogRequest>, StoreError> {
        let sql = format!(
            "SELECT {REQUEST_COLUMNS} FROM catalog_requests \
             WHERE NOT is_deleted AND ($1::text IS NULL OR status = $1) \
             ORDER BY created_at DESC, id DESC LIMIT $2 OFFSET $3"
        );
        let rows = sqlx::query_as::<_, RequestRow>(&sql)
            .bind(status.map(|s| s.as_str()))
            .bind(page.limit())
            .bind(page.offset())
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(CatalogRequest::try_from).collect()
    }
}

#[async_trait]
impl ListingStore for PgCatalogStore {
    async fn listing_by_id(&self, id: Uuid) -> Result<Option<CatalogListing>, StoreError> {
        let sql = format!("SELECT {LISTING_COLUMNS} FROM catalog_listings WHERE id = $1");
        let row = sqlx::query_as::<_, ListingRow>(&sql).bind(id).fetch_optional(&self.pool).await?;
        row.map(CatalogListing::try_from).transpose()
    }

    async fn listing_slug_exists(&self, slug: &str, exclude_id: Option<Uuid>) -> Result<bool, StoreError> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM catalog_listings WHERE seo_slug = $1 AND ($2::uuid IS NULL OR id <> $2))",
        )
        .bind(slug)
        .bind(exclude_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn add_listing(&self, listing: &CatalogListing) -> Result<(), StoreError> {
        let mut conn = self.pool.acquire().await?;
        insert_listing(&mut conn, listing).await
    }

    async fn update_listing(&self, l: &CatalogListing) -> Result<(), StoreError> {
        let sql = format!(
            "UPDATE catalog_listings SET ({DETAIL_COLUMNS}, seo_slug, is_published, published_at, is_deleted, \
             updated_by, updated_ip, updated_at) = ROW({}) WHERE id = $1",
            placeholders(2, DETAIL_COUNT + 7)
        );
        let query = bind_details(sqlx::query(&sql).bind(l.id), &l.details)
            .bind(&l.seo_slug)
            .bind(l.is_published)
            .bind(l.published_at)
            .bind(l.is_deleted);
        let result = bind_updated(query, l.updated.as_ref())
            .execute(&self.pool)
            .await
            .map_err(|e| write_error(e, Some(&l.seo_slug)))?;
        if result.rows_affected() == 0 {
            return Err(StoreError::Missing(l.id));
        }
        Ok(())
    }
}

#[async_trait]
impl OfferStore for PgCatalogStore {
    async fn active_offer_exists(&self, product_id: Uuid, seller_id: Uuid) -> Result<bool, StoreError> {
        let exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS(SELECT 1 FROM listing_offers WHERE product_id = $1 AND seller_id = $2 AND NOT is_deleted)",
        )
        .bind(product_id)
        .bind(seller_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    async fn add_offer(&self, offer: &ListingOffer) -> Result<(), StoreError> {
        let mut conn = self.pool.acquire().await?;
        insert_offer(&mut conn, offer).await
    }

    async fn offers_for_listing(&self, product_id: Uuid) -> Result<Vec<ListingOffer>, StoreError> {
        let sql = format!("SELECT {OFFER_COLUMNS} FROM listing_offers WHERE product_id = $1 ORDER BY price, id");
        let rows = sqlx::query_as::<_, OfferRow>(&sql).bind(product_id).fetch_all(&self.pool).await?;
        Ok(rows.into_iter().map(ListingOffer::from).collect())
    }
}

#[async_trait]
impl CategoryLookup for PgCatalogStore {
    async fn category(&self, id: Uuid) -> Result<Option<Category>, StoreError> {
        let row = sqlx::query_as::<_, CategoryRow>("SELECT id, name, scope, is_deleted FROM categories WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Category::try_from).transpose()
    }
}

#[async_trait]
impl CategoryStore for PgCatalogStore {
    async fn add_category(&self, category: &Category) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO categories (id, name, scope, is_deleted) VALUES ($1, $2, $3, $4)")
            .bind(category.id)
            .bind(&category.name)
            .bind(category.scope.as_str())
            .bind(category.is_deleted)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn categories(&self) -> Result<Vec<Category>, StoreError> {
        let rows = sqlx::query_as::<_, CategoryRow>(
            "SELECT id, name, scope, is_deleted FROM categories WHERE NOT is_deleted ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Category::try_from).collect()
    }
}

#[async_trait]
impl PromotionStore for PgCatalogStore {
    async fn commit_promotion(&self, request: &CatalogRequest, promotion: &Promotion) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        if update_request(&mut tx, request, true).await? == 0 {
            let exists = sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM catalog_requests WHERE id = $1)")
                .bind(request.id)
                .fetch_one(&mut *tx)
                .await?;
            return Err(if exists { StoreError::NotPending(request.id) } else { StoreError::Missing(request.id) });
        }
        match promotion {
            Promotion::Listing(listing) => insert_listing(&mut tx, listing).await?,
            Promotion::Offer(offer) => insert_offer(&mut tx, offer).await?,
        }

        tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholders() {
        assert_eq!(placeholders(2, 3), "$2, $3, $4");
        assert_eq!(count(REQUEST_COLUMNS), 27);
        assert_eq!(count(LISTING_COLUMNS), 24);
        assert_eq!(count(OFFER_COLUMNS), 15);
        assert_eq!(count(DETAIL_COLUMNS), DETAIL_COUNT);
    }

    #[test]
    fn test_corrupt_item_kind() {
        let row = DetailsRow {
            name: "Bag".into(),
            short_description: None,
            description: "Leather".into(),
            price: Some(10),
            inventory: 1,
            is_custom_order: false,
            item_kind: "hologram".into(),
            download_path: None,
            category_id: Uuid::now_v7(),
            image_path: None,
            gallery: Json(vec![]),
        };
        assert!(matches!(ProductDetails::try_from(row), Err(StoreError::Corrupt(_))));
    }

    #[test]
    fn test_audit_row_split() {
        let at = Utc::now();
        let row = AuditRow {
            created_by: None,
            created_ip: Some("10.0.0.1".into()),
            created_at: at,
            updated_by: Some(Uuid::now_v7()),
            updated_ip: None,
            updated_at: None,
        };
        let (created, updated) = row.split();
        assert_eq!(created.ip_address.as_deref(), Some("10.0.0.1"));
        assert!(updated.is_none());
    }

    #[test]
    fn test_unique_conflicts_by_constraint() {
        let slug = Some("abcd1234~bag");
        assert!(matches!(unique_conflict(Some("catalog_slugs_pkey"), slug), Some(StoreError::SlugConflict(s)) if s == "abcd1234~bag"));
        assert!(matches!(unique_conflict(Some("catalog_listings_seo_slug_key"), slug), Some(StoreError::SlugConflict(_))));
        assert!(matches!(unique_conflict(Some(OFFER_SELLER_INDEX), None), Some(StoreError::DuplicateOffer)));
        assert!(unique_conflict(Some("catalog_requests_pkey"), slug).is_none());
        assert!(unique_conflict(Some("catalog_slugs_pkey"), None).is_none());
        assert!(unique_conflict(None, slug).is_none());
    }
}
