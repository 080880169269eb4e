//! Slug allocation
//!
//! Requests and offers get plain slugs (`base`, `base-1`, `base-2`, ...),
//! listings get coded slugs (`code~base`) that retry with a new random code.
//! Every allocation ends in a slug: once the bounded probing is exhausted a
//! random token is appended without a further check, and the storage unique
//! index has the final word.

use async_trait::async_trait;
use rand::{rngs::StdRng, Rng, SeedableRng};
use sha2::{Digest, Sha256};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use uuid::Uuid;

use crate::domain::value_objects::{CodedSlug, ListingCode};
use crate::StoreError;

pub const PLAIN_SUFFIX_ATTEMPTS: u32 = 200;
pub const CODED_ATTEMPTS: u32 = 100;
pub const OFFER_SUFFIX_ATTEMPTS: u32 = 100;

const ZERO_WIDTH_NON_JOINER: char = '\u{200C}';

/// Source of 8-character lowercase hex tokens.
pub trait TokenSource: Send + Sync {
    fn hex_token(&self) -> String;
}

pub struct RandomTokens;

impl TokenSource for RandomTokens {
    fn hex_token(&self) -> String {
        format!("{:08x}", rand::thread_rng().gen::<u32>())
    }
}

/// Reproducible tokens from a fixed seed.
pub struct SeededTokens(Mutex<StdRng>);

impl SeededTokens {
    pub fn new(seed: u64) -> Self {
        Self(Mutex::new(StdRng::seed_from_u64(seed)))
    }
}

impl TokenSource for SeededTokens {
    fn hex_token(&self) -> String {
        let mut rng = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        format!("{:08x}", rng.gen::<u32>())
    }
}

/// Counter tokens: `00000001`, `00000002`, ...
#[derive(Default)]
pub struct SequentialTokens(AtomicU32);

impl TokenSource for SequentialTokens {
    fn hex_token(&self) -> String {
        format!("{:08x}", self.0.fetch_add(1, Ordering::Relaxed) + 1)
    }
}

/// Existence check backing every allocation.
///
/// Implementations must look at request slugs and listing slugs together,
/// skipping the record identified by `exclude_id`.
#[async_trait]
pub trait SlugProbe: Send + Sync {
    async fn is_taken(&self, slug: &str, exclude_id: Option<Uuid>) -> Result<bool, StoreError>;
}

/// Lower-cases `text` and keeps letters and digits of any script, joining
/// words separated by whitespace, `-`, `_` or ZWNJ with a single hyphen.
/// Other characters are dropped. May return an empty string.
pub fn slugify(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut separator = false;
    for c in text.trim().to_lowercase().chars() {
        if c.is_alphanumeric() {
            if separator && !out.is_empty() {
                out.push('-');
            }
            separator = false;
            out.push(c);
        } else if c.is_whitespace() || matches!(c, '-' | '_' | ZERO_WIDTH_NON_JOINER) {
            separator = true;
        }
    }
    out
}

/// First 8 hex characters of the SHA-256 of the seller id.
pub fn seller_fingerprint(seller_id: Uuid) -> String {
    let digest = Sha256::digest(seller_id.to_string().as_bytes());
    digest.iter().take(4).map(|b| format!("{b:02x}")).collect()
}

#[derive(Clone)]
pub struct SlugAllocator {
    tokens: Arc<dyn TokenSource>,
}

impl Default for SlugAllocator {
    fn default() -> Self {
        Self::new(Arc::new(RandomTokens))
    }
}

impl SlugAllocator {
    pub fn new(tokens: Arc<dyn TokenSource>) -> Self {
        Self { tokens }
    }

    /// [`slugify`] with a random token when nothing survives normalization.
    pub fn normalize(&self, text: &str) -> String {
        let slug = slugify(text);
        if slug.is_empty() {
            self.tokens.hex_token()
        } else {
            slug
        }
    }

    pub async fn allocate_unique<P: SlugProbe + ?Sized>(
        &self,
        candidate: &str,
        exclude_id: Option<Uuid>,
        probe: &P,
    ) -> Result<String, StoreError> {
        let base = self.normalize(candidate);
        self.with_numeric_suffix(base, PLAIN_SUFFIX_ATTEMPTS, exclude_id, probe).await
    }

    /// Coded listing slug. A `code~rest` candidate keeps its code; otherwise
    /// `preferred_code` (or a random one) prefixes the normalized text.
    pub async fn allocate_unique_coded<P: SlugProbe + ?Sized>(
        &self,
        candidate: &str,
        preferred_code: Option<&ListingCode>,
        exclude_id: Option<Uuid>,
        probe: &P,
    ) -> Result<String, StoreError> {
        let (code, rest) = match CodedSlug::parse(candidate) {
            Some(parsed) => (Some(parsed.code().clone()), self.normalize(parsed.rest())),
            None => (preferred_code.cloned(), self.normalize(candidate)),
        };
        let mut code = code.unwrap_or_else(|| self.fresh_code());

        for _ in 0..CODED_ATTEMPTS {
            let slug = CodedSlug::new(code.clone(), rest.as_str()).to_string();
            if !probe.is_taken(&slug, exclude_id).await? {
                return Ok(slug);
            }
            code = self.fresh_code();
        }
        tracing::warn!(rest = %rest, "coded slug probing exhausted, using unchecked code");
        Ok(CodedSlug::new(code, rest).to_string())
    }

    /// Request slug for an offer: `{target_slug}-offer-{seller fingerprint}`.
    pub async fn allocate_offer<P: SlugProbe + ?Sized>(
        &self,
        target_slug: &str,
        seller_id: Uuid,
        exclude_id: Option<Uuid>,
        probe: &P,
    ) -> Result<String, StoreError> {
        let base = format!("{target_slug}-offer-{}", seller_fingerprint(seller_id));
        self.with_numeric_suffix(base, OFFER_SUFFIX_ATTEMPTS, exclude_id, probe).await
    }

    async fn with_numeric_suffix<P: SlugProbe + ?Sized>(
        &self,
        base: String,
        attempts: u32,
        exclude_id: Option<Uuid>,
        probe: &P,
    ) -> Result<String, StoreError> {
        if !probe.is_taken(&base, exclude_id).await? {
            return Ok(base);
        }
        for n in 1..=attempts {
            let slug = format!("{base}-{n}");
            if !probe.is_taken(&slug, exclude_id).await? {
                return Ok(slug);
            }
        }
        tracing::warn!(base = %base, attempts, "slug suffixes exhausted, using random suffix");
        Ok(format!("{base}-{}", self.tokens.hex_token()))
    }

    fn fresh_code(&self) -> ListingCode {
        ListingCode::new(self.tokens.hex_token()).unwrap_or_else(|_| ListingCode::random())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct Taken {
        slugs: HashSet<String>,
        probes: AtomicUsize,
    }

    impl Taken {
        fn with(slugs: &[&str]) -> Self {
            Self { slugs: slugs.iter().map(|s| s.to_string()).collect(), probes: AtomicUsize::new(0) }
        }
    }

    #[async_trait]
    impl SlugProbe for Taken {
        async fn is_taken(&self, slug: &str, _exclude_id: Option<Uuid>) -> Result<bool, StoreError> {
            self.probes.fetch_add(1, Ordering::Relaxed);
            Ok(self.slugs.contains(slug))
        }
    }

    struct Everything;

    #[async_trait]
    impl SlugProbe for Everything {
        async fn is_taken(&self, _slug: &str, _exclude_id: Option<Uuid>) -> Result<bool, StoreError> {
            Ok(true)
        }
    }

    fn allocator() -> SlugAllocator {
        SlugAllocator::new(Arc::new(SequentialTokens::default()))
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("  Hello   World  "), "hello-world");
        assert_eq!(slugify("--Rust__Book--"), "rust-book");
        assert_eq!(slugify("دوره آموزشی"), "دوره-آموزشی");
        assert_eq!(slugify("می\u{200C}خواهم"), "می-خواهم");
        assert_eq!(slugify("C++ & Go!"), "c-go");
        assert_eq!(slugify("نسخه ۲"), "نسخه-۲");
        assert_eq!(slugify("?!"), "");
    }

    #[test]
    fn test_normalize_falls_back_to_token() {
        assert_eq!(allocator().normalize("  ***  "), "00000001");
        assert_eq!(allocator().normalize("Shoes"), "shoes");
    }

    #[test]
    fn test_seller_fingerprint_is_stable() {
        let seller = Uuid::nil();
        assert_eq!(seller_fingerprint(seller), seller_fingerprint(seller));
        assert_eq!(seller_fingerprint(seller).len(), 8);
        assert_ne!(seller_fingerprint(seller), seller_fingerprint(Uuid::from_u128(1)));
    }

    #[test]
    fn test_seeded_tokens_repeat() {
        let a = SeededTokens::new(42);
        let b = SeededTokens::new(42);
        assert_eq!(a.hex_token(), b.hex_token());
        assert!(a.hex_token().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[tokio::test]
    async fn test_allocate_unique_free_base() {
        let slug = allocator().allocate_unique("Leather Bag", None, &Taken::default()).await.unwrap();
        assert_eq!(slug, "leather-bag");
    }

    #[tokio::test]
    async fn test_allocate_unique_numeric_suffix() {
        let probe = Taken::with(&["leather-bag", "leather-bag-1"]);
        let slug = allocator().allocate_unique("Leather Bag", None, &probe).await.unwrap();
        assert_eq!(slug, "leather-bag-2");
    }

    #[tokio::test]
    async fn test_allocate_unique_exhausted_uses_token() {
        let slug = allocator().allocate_unique("bag", None, &Everything).await.unwrap();
        assert_eq!(slug, "bag-00000001");
    }

    #[tokio::test]
    async fn test_allocate_unique_probe_bound() {
        let mut taken = vec!["bag".to_string()];
        taken.extend((1..=PLAIN_SUFFIX_ATTEMPTS).map(|n| format!("bag-{n}")));
        let refs: Vec<&str> = taken.iter().map(String::as_str).collect();
        let probe = Taken::with(&refs);
        let slug = allocator().allocate_unique("bag", None, &probe).await.unwrap();
        assert_eq!(slug, "bag-00000001");
        assert_eq!(probe.probes.load(Ordering::Relaxed), PLAIN_SUFFIX_ATTEMPTS as usize + 1);
    }

    #[tokio::test]
    async fn test_coded_uses_preferred_code() {
        let code = ListingCode::new("abcdef12").unwrap();
        let slug = allocator()
            .allocate_unique_coded("Leather Bag", Some(&code), None, &Taken::default())
            .await
            .unwrap();
        assert_eq!(slug, "abcdef12~leather-bag");
    }

    #[tokio::test]
    async fn test_coded_keeps_explicit_code() {
        let preferred = ListingCode::new("99999999").unwrap();
        let slug = allocator()
            .allocate_unique_coded("ABCDEF12~Leather Bag", Some(&preferred), None, &Taken::default())
            .await
            .unwrap();
        assert_eq!(slug, "abcdef12~leather-bag");
    }

    #[tokio::test]
    async fn test_coded_collision_rolls_new_code() {
        let probe = Taken::with(&["abcdef12~bag", "00000001~bag"]);
        let code = ListingCode::new("abcdef12").unwrap();
        let slug = allocator().allocate_unique_coded("bag", Some(&code), None, &probe).await.unwrap();
        assert_eq!(slug, "00000002~bag");
    }

    #[tokio::test]
    async fn test_coded_exhausted_returns_fresh_code() {
        let slug = allocator().allocate_unique_coded("bag", None, None, &Everything).await.unwrap();
        // one initial code plus one per attempt
        assert_eq!(slug, format!("{:08x}~bag", CODED_ATTEMPTS + 1));
    }

    #[tokio::test]
    async fn test_offer_slug() {
        let seller = Uuid::now_v7();
        let base = format!("abcdef12~bag-offer-{}", seller_fingerprint(seller));
        let probe = Taken::with(&[base.as_str()]);
        let slug = allocator().allocate_offer("abcdef12~bag", seller, None, &probe).await.unwrap();
        assert_eq!(slug, format!("{base}-1"));
    }
}
