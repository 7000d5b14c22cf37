//! A bounded, thread-safe cache for images, plus the pieces needed to load images through it.
//!
//! Decoded images are large: a 1000x1000 RGBA picture is 4 MB no matter how small its PNG was.  An application that
//! lists many remote pictures wants to keep the recently shown ones around without letting the set grow forever, and
//! wants to give all of it back when the system runs short on memory.  This crate provides:
//!
//! - [CostBasedLru], a standard Lru cache bounded by both an entry count and a total cost.  This is the low-level
//!   building block, exposed because it's useful on its own.
//! - [BoundedCache], which wraps a [CostBasedLru] behind a single lock together with per-key access statistics.  It is
//!   generic over the payload; [ImageCache] holds decoded images and [ImageDataCache] holds encoded bytes.
//! - [MemoryPressureNotifier], which delivers host memory warnings to every cache registered with it, and
//!   [SystemMemoryMonitor], which produces such warnings from system memory usage where the platform doesn't.
//! - [ImageLoader], a cache-first loader driven by a [Source] and a [Decoder].
//!
//! Caches are plain values: construct one with a [CacheConfig] and share it with `Arc`.  For applications that only want
//! one of each, [shared_image_cache] and [shared_image_data_cache] hand out process-wide defaults.
//!
//! ```
//! use std::sync::Arc;
//! use bounded_image_cache::*;
//!
//! let config = CacheConfigBuilder::default()
//!     .count_limit(2)
//!     .total_cost_limit(1000)
//!     .build()
//!     .unwrap();
//! let cache = Arc::new(ImageDataCache::new(config).unwrap());
//!
//! let notifier = MemoryPressureNotifier::new();
//! let subscription = notifier.register(cache.clone());
//!
//! cache.put("x", vec![0; 400], 400);
//! cache.put("y", vec![0; 400], 400);
//! cache.put("z", vec![0; 400], 400);
//! assert!(cache.contains("z"));
//! assert_eq!(cache.len(), 2);
//!
//! notifier.notify();
//! assert!(cache.is_empty());
//! notifier.unregister(subscription);
//! ```
mod bounded_cache;
mod config;
mod cost_based_lru;
mod estimate_cost;
mod filesystem_source;
mod loader;
mod memory_monitor;
mod memory_pressure;
mod shared;
mod stats;
mod traits;

pub use bounded_cache::*;
pub use config::*;
pub use cost_based_lru::*;
pub use estimate_cost::*;
pub use filesystem_source::*;
pub use loader::*;
pub use memory_monitor::*;
pub use memory_pressure::*;
pub use shared::*;
pub use stats::CacheStats;
pub use traits::*;
