//! The [ImageLoader] puts a [Source] and a [Decoder] in front of a shared [BoundedCache].
//!
//! A load checks the cache first.  On a miss the loader opens the key through its source, decodes the bytes, lets the
//! decoded value estimate its cost, and stores it.  Concurrent loads of the same key wait for the first one instead of
//! fetching the same thing several times.
//!
//! The cache is injected, so several loaders can share one cache, and tests can hand in a small one.
use std::io::Error as IoError;
use std::sync::{Arc, Mutex, PoisonError};

use crate::*;

type GuardMap = std::collections::HashMap<String, Arc<Mutex<()>>, ahash::RandomState>;

#[derive(Debug, thiserror::Error)]
pub enum LoadError<DecoderError: std::error::Error + 'static> {
    #[error("failed to fetch {key:?}")]
    Fetch {
        key: String,
        #[source]
        source: IoError,
    },
    #[error("failed to decode {key:?}")]
    Decode {
        key: String,
        #[source]
        source: DecoderError,
    },
}

pub struct ImageLoader<S: Source, D: Decoder> {
    cache: Arc<BoundedCache<D::Output>>,
    source: S,
    decoder: D,
    /// Mutexes that stop multiple threads loading the same key at once.
    loading_guards: Mutex<GuardMap>,
}

impl<S: Source, D: Decoder> ImageLoader<S, D> {
    pub fn new(cache: Arc<BoundedCache<D::Output>>, source: S, decoder: D) -> ImageLoader<S, D> {
        ImageLoader {
            cache,
            source,
            decoder,
            loading_guards: Default::default(),
        }
    }

    pub fn cache(&self) -> &Arc<BoundedCache<D::Output>> {
        &self.cache
    }

    fn guards(&self) -> std::sync::MutexGuard<'_, GuardMap> {
        self.loading_guards
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Get the value for `key`, fetching and decoding it if it isn't cached.
    pub fn load(&self, key: &str) -> Result<Arc<D::Output>, LoadError<D::Error>> {
        if let Some(x) = self.cache.get(key) {
            return Ok(x);
        }

        // Everyone loading this key shares one mutex; whoever gets it first does the work.
        let mutex = self
            .guards()
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        let res = {
            let _guard: std::sync::MutexGuard<()> =
                mutex.lock().unwrap_or_else(PoisonError::into_inner);

            // Someone else may have finished while we waited.
            match self.cache.get(key) {
                Some(x) => Ok(x),
                None => self.fetch_and_store(key),
            }
        };

        self.release_guard(key, mutex);
        res
    }

    /// Drop our handle on a key's mutex, removing it from the map if we were the last one using it.
    ///
    /// Handles are only cloned and dropped under the map lock, so the last user always sees a count of two: the map's
    /// and its own.  Until then the entry stays, and later callers queue on the same mutex as everyone else.
    fn release_guard(&self, key: &str, mutex: Arc<Mutex<()>>) {
        let mut guards = self.guards();
        let ours = guards.get(key).map_or(false, |m| Arc::ptr_eq(m, &mutex));
        if ours && Arc::strong_count(&mutex) == 2 {
            guards.remove(key);
        }
        drop(mutex);
    }

    fn fetch_and_store(&self, key: &str) -> Result<Arc<D::Output>, LoadError<D::Error>> {
        let reader = self.source.open(key).map_err(|source| {
            tracing::warn!(key, error = %source, "Image fetch failed");
            LoadError::Fetch {
                key: key.to_string(),
                source,
            }
        })?;
        let decoded = self.decoder.decode(reader).map_err(|source| {
            tracing::warn!(key, error = %source, "Image decode failed");
            LoadError::Decode {
                key: key.to_string(),
                source,
            }
        })?;

        let cost = decoded.estimate_cost();
        let value = Arc::new(decoded);
        self.cache.put_shared(key, value.clone(), cost);
        Ok(value)
    }

    /// Drop `key` from the cache, for example when the user asks for a refresh.
    pub fn evict(&self, key: &str) {
        self.cache.remove(key);
    }
}
