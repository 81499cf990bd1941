//! Image fingerprint functions.

use std::fmt;

use image::DynamicImage;
use image::imageops::FilterType;
use sha2::{Digest, Sha256};

use crate::Error;
use crate::config::HashAlgorithm;

/// Compact signature of an image.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Fingerprint {
    /// 64-bit perceptual hash; similarity is the Hamming distance.
    Perceptual(u64),
    /// SHA-256 of the raw bytes; only equality is meaningful.
    Exact([u8; 32]),
}

impl Fingerprint {
    /// Hamming distance to `other`, or `None` when the kinds differ.
    ///
    /// Exact fingerprints are either 0 (identical) or `u32::MAX` apart.
    pub fn distance(&self, other: &Fingerprint) -> Option<u32> {
        match (self, other) {
            (Fingerprint::Perceptual(a), Fingerprint::Perceptual(b)) => Some((a ^ b).count_ones()),
            (Fingerprint::Exact(a), Fingerprint::Exact(b)) => Some(if a == b { 0 } else { u32::MAX }),
            _ => None,
        }
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fingerprint::Perceptual(bits) => write!(f, "{bits:016x}"),
            Fingerprint::Exact(digest) => f.write_str(&hex::encode(digest)),
        }
    }
}

/// A fingerprint function over encoded image bytes.
pub trait ImageHasher: Send + Sync {
    fn algorithm(&self) -> HashAlgorithm;

    /// Compute the fingerprint of an encoded image.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidImage` if a perceptual hasher cannot decode
    /// the bytes.
    fn fingerprint(&self, bytes: &[u8]) -> Result<Fingerprint, Error>;
}

fn decode(bytes: &[u8]) -> Result<DynamicImage, Error> {
    image::load_from_memory(bytes).map_err(|e| Error::InvalidImage(e.to_string()))
}

/// Difference hash: 9x8 grayscale, one bit per horizontal gradient.
///
/// Bit `y * 8 + x` is set when pixel `(x, y)` is brighter than its right
/// neighbour. Robust to re-encoding and uniform brightness shifts.
#[derive(Debug, Clone, Copy, Default)]
pub struct DifferenceHasher;

impl ImageHasher for DifferenceHasher {
    fn algorithm(&self) -> HashAlgorithm {
        HashAlgorithm::Dhash
    }

    fn fingerprint(&self, bytes: &[u8]) -> Result<Fingerprint, Error> {
        let gray = decode(bytes)?.resize_exact(9, 8, FilterType::Triangle).to_luma8();

        let mut bits = 0u64;
        for y in 0..8u32 {
            for x in 0..8u32 {
                let left = gray.get_pixel(x, y)[0];
                let right = gray.get_pixel(x + 1, y)[0];
                if left > right {
                    bits |= 1 << (y * 8 + x);
                }
            }
        }

        Ok(Fingerprint::Perceptual(bits))
    }
}

/// Average hash: 8x8 grayscale, one bit per pixel above the mean.
#[derive(Debug, Clone, Copy, Default)]
pub struct AverageHasher;

impl ImageHasher for AverageHasher {
    fn algorithm(&self) -> HashAlgorithm {
        HashAlgorithm::Ahash
    }

    fn fingerprint(&self, bytes: &[u8]) -> Result<Fingerprint, Error> {
        let gray = decode(bytes)?.resize_exact(8, 8, FilterType::Triangle).to_luma8();

        let total: u32 = gray.pixels().map(|p| u32::from(p[0])).sum();
        let mean = total / 64;

        let bits = gray
            .pixels()
            .enumerate()
            .filter(|(_, p)| u32::from(p[0]) > mean)
            .fold(0u64, |acc, (i, _)| acc | (1 << i));

        Ok(Fingerprint::Perceptual(bits))
    }
}

/// Byte-exact SHA-256 content hash.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContentHasher;

impl ImageHasher for ContentHasher {
    fn algorithm(&self) -> HashAlgorithm {
        HashAlgorithm::Sha256
    }

    fn fingerprint(&self, bytes: &[u8]) -> Result<Fingerprint, Error> {
        let mut hasher = Sha256::new();
        hasher.update(bytes);
        Ok(Fingerprint::Exact(hasher.finalize().into()))
    }
}

/// Hasher implementing `algorithm`.
pub fn hasher_for(algorithm: HashAlgorithm) -> Box<dyn ImageHasher> {
    match algorithm {
        HashAlgorithm::Dhash => Box::new(DifferenceHasher),
        HashAlgorithm::Ahash => Box::new(AverageHasher),
        HashAlgorithm::Sha256 => Box::new(ContentHasher),
    }
}
