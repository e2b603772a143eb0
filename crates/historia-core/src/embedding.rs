//! Vector utilities and the embedding-cache key.
//!
//! Concrete embedding providers (OpenAI, Ollama) and the cache-aware
//! embedder live in the `historia` app crate.

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`:
/// - `1.0` = identical direction
/// - `0.0` = orthogonal (unrelated)
/// - `-1.0` = opposite direction
///
/// Returns `0.0` for empty vectors, vectors of different lengths, and
/// whenever either vector has zero norm.
///
/// ```text
///            a · b
/// cos(θ) = ─────────
///          ‖a‖ × ‖b‖
/// ```
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    // Accumulate in f64 so small-magnitude vectors do not underflow.
    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;

    for (&x, &y) in a.iter().zip(b.iter()) {
        let (x, y) = (f64::from(x), f64::from(y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom == 0.0 || !denom.is_finite() {
        return 0.0;
    }

    let sim = dot / denom;
    if sim.is_nan() {
        0.0
    } else {
        sim.clamp(-1.0, 1.0) as f32
    }
}

/// A vector of `dims` zeros, used as the degraded embedding.
pub fn zero_vector(dims: usize) -> Vec<f32> {
    vec![0.0; dims]
}

/// True if every component is zero (or the vector is empty).
pub fn is_zero_vector(v: &[f32]) -> bool {
    v.iter().all(|x| *x == 0.0)
}

/// Cache key for a piece of text.
///
/// A 31-multiplier rolling hash over the UTF-16 code units, wrapped to
/// 32 bits. Distinct texts can collide (`"Aa"` and `"BB"` do); a
/// collision only produces a wrong cache hit, so callers must treat the
/// embedding cache as best-effort.
pub fn text_hash(text: &str) -> String {
    text.encode_utf16()
        .fold(0i32, |hash, unit| {
            hash.wrapping_mul(31).wrapping_add(i32::from(unit))
        })
        .to_string()
}
