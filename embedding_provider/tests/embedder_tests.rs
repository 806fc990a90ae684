use embedding_provider::{Embedder, EmbedderError, HashingEmbedder, ProviderKind};

fn assert_unit_length(vector: &[f32]) {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    assert!((norm - 1.0).abs() < 1e-4, "vector norm {norm} is not 1");
}

#[test]
fn hashing_embedder_is_deterministic_and_normalized() {
    let embedder = HashingEmbedder::new(64).expect("valid dimension");

    let a = embedder.embed("quarterly budget forecast").unwrap();
    let b = embedder.embed("quarterly budget forecast").unwrap();

    assert_eq!(a.len(), 64);
    assert_eq!(a, b);
    assert_unit_length(&a);
}

#[test]
fn shared_words_pull_vectors_closer_than_disjoint_ones() {
    let embedder = HashingEmbedder::new(128).unwrap();

    let budget_a = embedder.embed("budget forecast").unwrap();
    let budget_b = embedder.embed("budget plan").unwrap();
    let unrelated = embedder.embed("marketing strategy").unwrap();

    let dot = |x: &[f32], y: &[f32]| x.iter().zip(y).map(|(a, b)| a * b).sum::<f32>();
    assert!(dot(&budget_a, &budget_b) > dot(&budget_a, &unrelated));
}

#[test]
fn embed_batch_matches_individual_embeddings() {
    let embedder = HashingEmbedder::new(32).unwrap();
    let inputs = ["embeddings unlock semantic search", "hybrid ranking mixes bm25 and vectors"];

    let batch = embedder.embed_batch(&inputs).unwrap();
    assert_eq!(batch.len(), inputs.len());
    for (input, vector) in inputs.iter().zip(batch.iter()) {
        assert_eq!(&embedder.embed(input).unwrap(), vector);
        assert_unit_length(vector);
    }
}

#[test]
fn empty_batch_is_fine() {
    let embedder = HashingEmbedder::new(16).unwrap();
    assert!(embedder.embed_batch(&[]).unwrap().is_empty());
}

#[test]
fn zero_dimension_is_rejected() {
    match HashingEmbedder::new(0) {
        Err(EmbedderError::InvalidConfiguration { .. }) => {}
        other => panic!("expected InvalidConfiguration, got {other:?}"),
    }
}

#[test]
fn info_reports_provider_and_dimension() {
    let embedder = HashingEmbedder::new(256).unwrap();
    let info = embedder.info();
    assert_eq!(info.provider, ProviderKind::Hashing);
    assert_eq!(info.dimension, 256);
    assert_eq!(embedder.dimension(), 256);
}
