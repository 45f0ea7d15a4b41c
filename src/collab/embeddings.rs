//! EmbeddingsService: semantic retrieval used by FreshContextBuilder.

use async_trait::async_trait;

#[async_trait]
pub trait EmbeddingsService: Send + Sync {
    async fn embed(&self, text: &str) -> Vec<f32>;
    async fn embed_batch(&self, texts: &[String]) -> Vec<Vec<f32>>;
    fn cosine(&self, a: &[f32], b: &[f32]) -> f32;
    fn top_k(&self, query: &[f32], candidates: &[Vec<f32>], k: usize) -> Vec<(usize, f32)>;
}

/// Hash-based bag-of-words embedding, deterministic and dependency-free —
/// a stand-in so FreshContextBuilder is runnable without a real model.
pub struct HashEmbeddingsService {
    dims: usize,
}

impl HashEmbeddingsService {
    pub fn new(dims: usize) -> Self {
        Self { dims }
    }
}

impl Default for HashEmbeddingsService {
    fn default() -> Self {
        Self::new(64)
    }
}

#[async_trait]
impl EmbeddingsService for HashEmbeddingsService {
    async fn embed(&self, text: &str) -> Vec<f32> {
        let mut vec = vec![0f32; self.dims];
        for word in text.split_whitespace() {
            let mut hash: u64 = 1469598103934665603;
            for byte in word.as_bytes() {
                hash ^= *byte as u64;
                hash = hash.wrapping_mul(1099511628211);
            }
            vec[(hash as usize) % self.dims] += 1.0;
        }
        let norm: f32 = vec.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in &mut vec {
                *v /= norm;
            }
        }
        vec
    }

    async fn embed_batch(&self, texts: &[String]) -> Vec<Vec<f32>> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await);
        }
        out
    }

    fn cosine(&self, a: &[f32], b: &[f32]) -> f32 {
        let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
        let na: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        let nb: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
        if na == 0.0 || nb == 0.0 {
            0.0
        } else {
            (dot / (na * nb)).clamp(-1.0, 1.0)
        }
    }

    fn top_k(&self, query: &[f32], candidates: &[Vec<f32>], k: usize) -> Vec<(usize, f32)> {
        let mut scored: Vec<(usize, f32)> = candidates
            .iter()
            .enumerate()
            .map(|(i, c)| (i, self.cosine(query, c)))
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap());
        scored.truncate(k);
        scored
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn identical_text_has_cosine_one() {
        let svc = HashEmbeddingsService::default();
        let a = svc.embed("fresh context builder").await;
        let b = svc.embed("fresh context builder").await;
        assert!((svc.cosine(&a, &b) - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn top_k_orders_by_similarity() {
        let svc = HashEmbeddingsService::default();
        let query = svc.embed("rate limit retry").await;
        let candidates = svc.embed_batch(&[
            "rate limit retry".to_string(),
            "unrelated topic entirely".to_string(),
        ]).await;
        let ranked = svc.top_k(&query, &candidates, 1);
        assert_eq!(ranked[0].0, 0);
    }
}
