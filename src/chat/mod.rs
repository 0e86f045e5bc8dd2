//! Product queries: request shaping, dispatch and response normalization

mod dispatcher;
mod normalize;
mod request;

pub use dispatcher::QueryDispatcher;
pub use normalize::{
    normalize_products, normalize_response, resolve_image_source, ImageSource,
    NormalizedResponse, ProductResult, PLACEHOLDER_IMAGE,
};
pub use request::{
    ImageInput, ImagePayload, Modality, QueryRequest, DEFAULT_IMAGE_MIME, DEFAULT_LIMIT,
};
