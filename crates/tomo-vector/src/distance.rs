//! Similarity primitives.
//!
//! Every score in this crate is an inner product of two L2-normalized
//! vectors, which is their cosine similarity. All backends go through
//! [`inner_product`] so they agree bit for bit on identical input.
//!
//! The loops are written in groups of four so release builds auto-vectorize
//! them.

/// Lower bound on the norm used as a divisor during normalization.
///
/// An all-zero vector divides by this instead of zero and stays all-zero.
pub const NORM_EPSILON: f32 = 1e-12;

/// Compute the inner (dot) product of two vectors.
///
/// # Example
///
/// ```
/// use tomo_vector::inner_product;
///
/// let a = [1.0, 2.0, 3.0];
/// let b = [4.0, 5.0, 6.0];
/// assert!((inner_product(&a, &b) - 32.0).abs() < 0.001);
/// ```
#[inline]
pub fn inner_product(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len(), "Vector dimensions must match");

    let mut sum = 0.0f32;
    let chunks = a.len() / 4;

    for i in 0..chunks {
        let base = i * 4;
        sum += a[base] * b[base]
            + a[base + 1] * b[base + 1]
            + a[base + 2] * b[base + 2]
            + a[base + 3] * b[base + 3];
    }

    for i in (chunks * 4)..a.len() {
        sum += a[i] * b[i];
    }

    sum
}

/// Euclidean (L2) norm of a vector.
#[inline]
pub fn l2_norm(v: &[f32]) -> f32 {
    inner_product(v, v).sqrt()
}

/// Return a unit-length copy of `v`: `v / max(||v||, NORM_EPSILON)`.
///
/// A zero vector comes back as a zero vector of the same length.
///
/// ```
/// use tomo_vector::{l2_norm, normalize};
///
/// let v = normalize(&[3.0, 4.0]);
/// assert!((v[0] - 0.6).abs() < 1e-6);
/// assert!((l2_norm(&v) - 1.0).abs() < 1e-6);
///
/// assert_eq!(normalize(&[0.0, 0.0]), vec![0.0, 0.0]);
/// ```
pub fn normalize(v: &[f32]) -> Vec<f32> {
    let mut out = v.to_vec();
    normalize_in_place(&mut out);
    out
}

/// Normalize `v` in place. See [`normalize`].
#[inline]
pub fn normalize_in_place(v: &mut [f32]) {
    let norm = l2_norm(v).max(NORM_EPSILON);
    for x in v.iter_mut() {
        *x /= norm;
    }
}

/// Cosine similarity of two arbitrary (not necessarily normalized) vectors.
///
/// Uses the same normalization as the index, so a zero vector scores 0
/// against anything.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    inner_product(&normalize(a), &normalize(b))
}
