//! Response normalization
//!
//! The backend answers with several shapes (`products` vs `results`, numeric
//! vs string ids and prices, images as URLs, data URIs or raw base64).
//! Everything is folded into [`NormalizedResponse`] here and nowhere else.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::HashSet;

/// Inert inline image shown when a product has no usable picture
pub const PLACEHOLDER_IMAGE: &str = "data:image/svg+xml;utf8,\
<svg xmlns='http://www.w3.org/2000/svg' width='160' height='160' viewBox='0 0 160 160'>\
<rect width='160' height='160' fill='%23eeeeee'/>\
<text x='50%25' y='50%25' font-family='sans-serif' font-size='14' fill='%23999999' \
text-anchor='middle' dominant-baseline='middle'>No image</text></svg>";

/// Hosts of image placeholder services; such URLs are never fetched
const PLACEHOLDER_HOSTS: &[&str] = &[
    "placeholder.com",
    "placehold.co",
    "placehold.it",
    "dummyimage.com",
    "fakeimg.pl",
];

/// Fields that may carry a URL or data URI
const URL_FIELDS: &[&str] = &["image_url", "image_path", "image"];

/// Fields that may carry raw base64 image data
const BASE64_FIELDS: &[&str] = &["image_url", "image_path", "image", "image_base64", "image_data"];

/// A whole field value that looks like raw base64 image data
static BASE64_VALUE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9+/]{40,}={0,2}$").expect("valid regex"));

/// Where a product picture comes from
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "src")]
pub enum ImageSource {
    Url(String),
    DataUri(String),
    Placeholder,
}

impl ImageSource {
    /// Value usable as an image `src`
    pub fn as_src(&self) -> &str {
        match self {
            ImageSource::Url(url) => url,
            ImageSource::DataUri(uri) => uri,
            ImageSource::Placeholder => PLACEHOLDER_IMAGE,
        }
    }

    pub fn is_placeholder(&self) -> bool {
        matches!(self, ImageSource::Placeholder)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductResult {
    pub id: Option<String>,
    pub name: Option<String>,
    pub price: Option<String>,
    pub category: Option<String>,
    pub description: Option<String>,
    pub image_source: ImageSource,
    pub score: Option<f64>,
}

impl ProductResult {
    /// `id` when present, else `name`
    ///
    /// Keys are namespaced so an id never collides with a name.
    pub fn identity_key(&self) -> Option<String> {
        match (&self.id, &self.name) {
            (Some(id), _) => Some(format!("id:{}", id)),
            (None, Some(name)) => Some(format!("name:{}", name)),
            (None, None) => None,
        }
    }

    /// Name for display, falling back to the id
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .or(self.id.as_deref())
            .unwrap_or("(unnamed)")
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct NormalizedResponse {
    pub assistant_text: String,
    pub products: Vec<ProductResult>,
}

/// Fold a chat or search response into the canonical form
pub fn normalize_response(body: &Value) -> NormalizedResponse {
    let assistant_text = body
        .get("response")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let products_value = body
        .get("products")
        .filter(|v| !v.is_null())
        .or_else(|| body.get("results"));

    NormalizedResponse {
        assistant_text,
        products: products_value.map(normalize_products).unwrap_or_default(),
    }
}

/// Normalize and deduplicate a product list, keeping backend order
pub fn normalize_products(value: &Value) -> Vec<ProductResult> {
    let entries: Vec<&Value> = match value {
        Value::Array(items) => items.iter().collect(),
        Value::Object(_) => vec![value],
        _ => Vec::new(),
    };

    let mut seen = HashSet::new();
    entries
        .into_iter()
        .filter_map(|entry| entry.as_object().and_then(parse_product))
        .filter(|product| match product.identity_key() {
            Some(key) => seen.insert(key),
            None => false,
        })
        .collect()
}

fn parse_product(entry: &Map<String, Value>) -> Option<ProductResult> {
    let id = scalar_string(entry.get("id"));
    let name = scalar_string(entry.get("name"));
    if id.is_none() && name.is_none() {
        return None;
    }

    Some(ProductResult {
        id,
        name,
        price: scalar_string(entry.get("price")),
        category: scalar_string(entry.get("category")),
        description: scalar_string(entry.get("description")),
        image_source: resolve_image_source(entry),
        score: score(entry),
    })
}

/// Strings and numbers as a trimmed, non-empty string
fn scalar_string(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn score(entry: &Map<String, Value>) -> Option<f64> {
    ["score", "similarity_score"]
        .iter()
        .filter_map(|key| entry.get(*key))
        .find_map(|value| match value {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        })
}

/// Pick the picture for one product entry
pub fn resolve_image_source(entry: &Map<String, Value>) -> ImageSource {
    let field = |key: &str| entry.get(key).and_then(Value::as_str).map(str::trim);

    for key in URL_FIELDS {
        let Some(value) = field(key) else { continue };
        if is_data_uri(value) {
            return ImageSource::DataUri(value.to_string());
        }
        if let Some(url) = usable_url(value) {
            return ImageSource::Url(url);
        }
    }

    // Whole-value match only, so a rejected URL never qualifies
    for key in BASE64_FIELDS {
        let Some(value) = field(key) else { continue };
        if BASE64_VALUE.is_match(value) {
            return ImageSource::DataUri(format!("data:image/jpeg;base64,{}", value));
        }
    }

    ImageSource::Placeholder
}

fn is_data_uri(value: &str) -> bool {
    value.starts_with("data:") && value.contains(',')
}

/// Well-formed http(s) URL that does not point at a placeholder service
fn usable_url(value: &str) -> Option<String> {
    let url = url::Url::parse(value).ok()?;
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }
    let host = url.host_str()?.to_ascii_lowercase();
    if PLACEHOLDER_HOSTS.iter().any(|marker| host.contains(marker)) {
        tracing::debug!("Ignoring placeholder image URL {}", value);
        return None;
    }
    Some(value.to_string())
}
