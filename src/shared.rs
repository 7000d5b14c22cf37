//! Process-wide default caches, for applications that only ever want one of each.
//!
//! These are a convenience for the composition root.  Library code should take an `Arc<BoundedCache<_>>` as a parameter
//! instead of reaching for these, so that it can be tested against its own cache.
use std::sync::{Arc, OnceLock};

use crate::*;

static IMAGE_CACHE: OnceLock<Arc<ImageCache>> = OnceLock::new();
static IMAGE_DATA_CACHE: OnceLock<Arc<ImageDataCache>> = OnceLock::new();

/// The shared decoded-image cache, created with the default limits on first use.
pub fn shared_image_cache() -> Arc<ImageCache> {
    IMAGE_CACHE.get_or_init(Default::default).clone()
}

/// The shared image-bytes cache, created with the default limits on first use.
pub fn shared_image_data_cache() -> Arc<ImageDataCache> {
    IMAGE_DATA_CACHE.get_or_init(Default::default).clone()
}
