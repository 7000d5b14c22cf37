//! The [Source] trait turns string keys into byte streams, and a [Decoder] turns those bytes into the payload stored in
//! the cache.
//!
//! Both belong to the image loader.  The cache itself never sees a fetch or a decode failure.
use std::io::{Error, Read};

use crate::EstimateCost;

/// "fetch" a key and return a reader over its bytes.
///
/// Keys are usually URLs or paths.  Retries and backoff, if any, belong in the implementation.
pub trait Source: Send + Sync + 'static {
    type Reader: Read;

    fn open(&self, key: &str) -> Result<Self::Reader, Error>;
}

/// A `Decoder` knows how to get from a reader to a decoded representation in memory.
///
/// The output must be `Send + Sync` so that the cache can hand it out behind `Arc`, and must be able to estimate its own
/// cost so the loader can account for it.
pub trait Decoder: Send + Sync {
    type Output: EstimateCost + Send + Sync;
    type Error: std::error::Error + Send + Sync + 'static;

    fn decode<R: Read>(&self, reader: R) -> Result<Self::Output, Self::Error>;
}

/// Decodes any image format enabled in the `image` crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct ImageDecoder;

impl Decoder for ImageDecoder {
    type Output = image::DynamicImage;
    type Error = image::ImageError;

    fn decode<R: Read>(&self, mut reader: R) -> Result<image::DynamicImage, image::ImageError> {
        let mut bytes = vec![];
        reader
            .read_to_end(&mut bytes)
            .map_err(image::ImageError::IoError)?;
        image::load_from_memory(&bytes)
    }
}

/// Keeps the fetched bytes as they are.
#[derive(Debug, Default, Clone, Copy)]
pub struct RawBytesDecoder;

impl Decoder for RawBytesDecoder {
    type Output = Vec<u8>;
    type Error = Error;

    fn decode<R: Read>(&self, mut reader: R) -> Result<Vec<u8>, Error> {
        let mut bytes = vec![];
        reader.read_to_end(&mut bytes)?;
        Ok(bytes)
    }
}
