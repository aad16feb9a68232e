use prism_similarity::{tokenize, BackendError, EmbeddingModel};

/// Signed feature hashing of tokens into a fixed-size, L2-normalized vector.
#[derive(Debug, Clone)]
pub struct HashEmbeddingModel {
    dims: usize,
}

impl HashEmbeddingModel {
    pub fn new(dims: usize) -> Self {
        Self { dims: dims.max(32) }
    }

    pub fn dims(&self) -> usize {
        self.dims
    }
}

impl EmbeddingModel for HashEmbeddingModel {
    fn model_name(&self) -> &'static str {
        "hash-fallback"
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, BackendError> {
        let mut vec = vec![0.0_f32; self.dims];

        for token in tokenize(text) {
            let hash = fnv1a(token.as_bytes());
            let index = (hash as usize) % self.dims;
            let sign = if (hash >> 63) == 0 { 1.0 } else { -1.0 };
            vec[index] += sign;
        }

        normalize(&mut vec);
        Ok(vec)
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    let mut hash: u64 = 0xcbf29ce484222325;
    for byte in bytes {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

fn normalize(values: &mut [f32]) {
    let norm = values.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for value in values.iter_mut() {
            *value /= norm;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embeddings_are_unit_length() {
        let model = HashEmbeddingModel::new(64);
        let vec = model.embed("paternity leave benefits").unwrap();
        let norm = vec.iter().map(|v| v * v).sum::<f32>().sqrt();

        assert_eq!(vec.len(), 64);
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn empty_text_embeds_to_zero() {
        let model = HashEmbeddingModel::new(8);
        assert_eq!(model.dims(), 32);
        assert!(model.embed("  ").unwrap().iter().all(|v| *v == 0.0));
    }
}
