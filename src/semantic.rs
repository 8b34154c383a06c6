use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub const DEFAULT_MODEL_ID: &str = "miniLM-L6-v2-local-v1";
pub const DEFAULT_MODEL_NAME: &str = "sentence-transformers/all-MiniLM-L6-v2";
pub const DEFAULT_EMBEDDING_DIM: usize = 384;
pub const DEFAULT_NORMALIZATION: &str = "l2";
pub const DEFAULT_BACKEND: &str = "local-hash-v1";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SemanticModelConfig {
    pub model_id: String,
    pub model_name: String,
    pub dimensions: usize,
    pub normalization: String,
    pub backend: String,
}

pub fn resolve_model_config(model_id: &str) -> SemanticModelConfig {
    let trimmed = model_id.trim();
    let resolved_id = if trimmed.is_empty() {
        DEFAULT_MODEL_ID
    } else {
        trimmed
    };

    let model_name = if resolved_id == DEFAULT_MODEL_ID {
        DEFAULT_MODEL_NAME
    } else {
        resolved_id
    };

    SemanticModelConfig {
        model_id: resolved_id.to_string(),
        model_name: model_name.to_string(),
        dimensions: DEFAULT_EMBEDDING_DIM,
        normalization: DEFAULT_NORMALIZATION.to_string(),
        backend: DEFAULT_BACKEND.to_string(),
    }
}

pub fn normalize_whitespace(input: &str) -> String {
    input.split_whitespace().collect::<Vec<&str>>().join(" ")
}

/// Text a candidate is embedded from: title, description and credit, in that order.
pub fn descriptor_text(title: &str, description: &str, credit: &str) -> String {
    [title, description, credit]
        .iter()
        .map(|value| normalize_whitespace(value))
        .filter(|value| !value.is_empty())
        .collect::<Vec<String>>()
        .join(" ")
}

pub fn embedding_text_hash(payload: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(payload.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Hashed word and bigram features folded into `dimensions` buckets, L2-normalized.
///
/// Buckets come from SHA-256 so cached vectors stay valid across toolchains.
/// Empty text embeds to the zero vector.
pub fn embed_text_local(payload: &str, dimensions: usize) -> Vec<f32> {
    let dims = dimensions.max(8);
    let mut vector = vec![0_f32; dims];

    for feature in text_features(payload) {
        let hash = feature_hash(&feature);
        let bucket = (hash % dims as u64) as usize;
        let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
        let weight = if feature.starts_with("b:") { 0.5 } else { 1.0 };
        vector[bucket] += sign * weight;
    }

    l2_normalize(&mut vector);
    vector
}

/// Cosine similarity in `[-1, 1]`. Mismatched, empty, or zero-norm inputs score 0.
pub fn cosine_similarity(left: &[f32], right: &[f32]) -> f64 {
    if left.len() != right.len() || left.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0_f64;
    let mut left_norm = 0.0_f64;
    let mut right_norm = 0.0_f64;
    for (left_value, right_value) in left.iter().zip(right.iter()) {
        let l = f64::from(*left_value);
        let r = f64::from(*right_value);
        dot += l * r;
        left_norm += l * l;
        right_norm += r * r;
    }

    let denominator = left_norm.sqrt() * right_norm.sqrt();
    if !denominator.is_finite() || denominator <= f64::EPSILON {
        return 0.0;
    }

    (dot / denominator).clamp(-1.0, 1.0)
}

/// Jaccard overlap of lower-cased whitespace tokens.
pub fn lexical_jaccard(left: &str, right: &str) -> f64 {
    let left_tokens = left
        .split_whitespace()
        .map(str::to_lowercase)
        .collect::<HashSet<String>>();
    let right_tokens = right
        .split_whitespace()
        .map(str::to_lowercase)
        .collect::<HashSet<String>>();

    let union = left_tokens.union(&right_tokens).count();
    if union == 0 {
        return 0.0;
    }

    let intersection = left_tokens.intersection(&right_tokens).count();
    intersection as f64 / union as f64
}

pub fn encode_embedding_blob(values: &[f32]) -> Vec<u8> {
    let mut out = Vec::<u8>::with_capacity(values.len() * 4);
    for value in values {
        out.extend_from_slice(&value.to_le_bytes());
    }
    out
}

pub fn decode_embedding_blob(blob: &[u8], expected_dim: usize) -> Option<Vec<f32>> {
    if expected_dim == 0 || blob.len() != expected_dim.saturating_mul(4) {
        return None;
    }

    let out = blob
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect::<Vec<f32>>();

    if out.len() == expected_dim {
        Some(out)
    } else {
        None
    }
}

fn feature_hash(feature: &str) -> u64 {
    let digest = Sha256::digest(feature.as_bytes());
    let mut bytes = [0_u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(bytes)
}

fn text_features(text: &str) -> Vec<String> {
    let words = text
        .split(|ch: char| !ch.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .map(str::to_lowercase)
        .collect::<Vec<String>>();

    let mut features = words
        .iter()
        .map(|word| format!("w:{word}"))
        .collect::<Vec<String>>();
    features.extend(
        words
            .windows(2)
            .map(|pair| format!("b:{}_{}", pair[0], pair[1])),
    );
    features
}

fn l2_normalize(values: &mut [f32]) {
    let norm = values
        .iter()
        .map(|value| f64::from(*value).powi(2))
        .sum::<f64>()
        .sqrt();
    if norm <= f64::EPSILON {
        return;
    }

    for value in values.iter_mut() {
        *value = (f64::from(*value) / norm) as f32;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_similarity_of_zero_vector_is_zero() {
        let zero = vec![0.0_f32; 4];
        let other = vec![1.0_f32, 0.0, 0.0, 0.0];
        assert_eq!(cosine_similarity(&zero, &other), 0.0);
        assert_eq!(cosine_similarity(&zero, &zero), 0.0);
    }

    #[test]
    fn cosine_similarity_handles_unnormalized_inputs() {
        let left = vec![3.0_f32, 0.0];
        let right = vec![10.0_f32, 0.0];
        assert!((cosine_similarity(&left, &right) - 1.0).abs() < 1e-9);

        let orthogonal = vec![0.0_f32, 5.0];
        assert!(cosine_similarity(&left, &orthogonal).abs() < 1e-9);
    }

    #[test]
    fn cosine_similarity_rejects_mismatched_dimensions() {
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0, 2.0, 3.0]), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
    }

    #[test]
    fn local_embedding_is_deterministic_and_normalized() {
        let first = embed_text_local("tumor histology micrograph", 64);
        let second = embed_text_local("tumor histology micrograph", 64);
        assert_eq!(first, second);

        let norm = first
            .iter()
            .map(|value| f64::from(*value) * f64::from(*value))
            .sum::<f64>()
            .sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn local_embedding_of_empty_text_is_zero_vector() {
        let vector = embed_text_local("  ", 16);
        assert_eq!(vector.len(), 16);
        assert!(vector.iter().all(|value| *value == 0.0));
    }

    #[test]
    fn lexical_jaccard_is_case_insensitive() {
        let score = lexical_jaccard("Tumor Cell", "tumor nucleus");
        assert!((score - 1.0 / 3.0).abs() < 1e-9);
        assert_eq!(lexical_jaccard("", ""), 0.0);
    }

    #[test]
    fn descriptor_text_skips_empty_parts() {
        assert_eq!(
            descriptor_text("  Tumor   slide ", "", "NCI"),
            "Tumor slide NCI".to_string()
        );
    }

    #[test]
    fn embedding_blob_decodes_only_expected_dimension() {
        let values = vec![0.5_f32, -1.25, 3.0];
        let blob = encode_embedding_blob(&values);
        assert_eq!(decode_embedding_blob(&blob, 3), Some(values));
        assert_eq!(decode_embedding_blob(&blob, 4), None);
    }
}
