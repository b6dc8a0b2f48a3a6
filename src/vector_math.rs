use std::collections::HashMap;

/// Cosine similarity of two dense vectors. Mismatched or empty inputs
/// score 0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    let denom = norm_a * norm_b;

    if denom <= f32::EPSILON {
        0.0
    } else {
        dot / denom
    }
}

/// Cosine mapped into [0, 1] for use as a relevance score. Negative
/// correlation is treated as irrelevant.
pub fn relevance_score(a: &[f32], b: &[f32]) -> f32 {
    cosine_similarity(a, b).clamp(0.0, 1.0)
}

/// Term-frequency cosine over lowercase alphanumeric tokens. Used for
/// near-duplicate detection when no embeddings are at hand.
pub fn text_cosine_similarity(a: &str, b: &str) -> f32 {
    let left = term_frequencies(a);
    let right = term_frequencies(b);
    if left.is_empty() || right.is_empty() {
        return 0.0;
    }

    let dot: f32 = left
        .iter()
        .filter_map(|(term, count)| right.get(term).map(|other| count * other))
        .sum();
    let norm_left: f32 = left.values().map(|c| c * c).sum::<f32>().sqrt();
    let norm_right: f32 = right.values().map(|c| c * c).sum::<f32>().sqrt();

    (dot / (norm_left * norm_right)).clamp(0.0, 1.0)
}

fn term_frequencies(text: &str) -> HashMap<String, f32> {
    let mut counts = HashMap::new();
    for token in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
    {
        *counts.entry(token.to_lowercase()).or_insert(0.0) += 1.0;
    }
    counts
}
