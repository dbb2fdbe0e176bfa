use super::*;

fn record(embedding_len: usize) -> VectorRecord {
    VectorRecord::new("report.txt", "quarterly revenue grew", vec![0.5; embedding_len])
}

#[test]
fn record_structure() {
    let record = record(4);

    assert_eq!(record.filename, "report.txt");
    assert_eq!(record.chunk, "quarterly revenue grew");
    assert_eq!(record.embedding.len(), 4);
    assert_eq!(record.id.len(), 36);
    assert!(record.validate(4).is_ok());
}

#[test]
fn ids_are_never_reused() {
    let first = record(4);
    let second = record(4);
    assert_ne!(first.id, second.id);
}

#[test]
fn wrong_dimension_is_a_schema_violation() {
    assert!(matches!(
        record(3).validate(4),
        Err(RagError::StoreSchemaViolation(_))
    ));
    assert!(matches!(
        record(5).validate(4),
        Err(RagError::StoreSchemaViolation(_))
    ));
}

#[test]
fn field_limits_are_enforced() {
    let mut long_chunk = record(2);
    long_chunk.chunk = "x".repeat(MAX_CHUNK_CHARS + 1);
    assert!(matches!(
        long_chunk.validate(2),
        Err(RagError::StoreSchemaViolation(_))
    ));

    let mut at_limit = record(2);
    at_limit.chunk = "é".repeat(MAX_CHUNK_CHARS);
    assert!(at_limit.validate(2).is_ok());

    let mut long_name = record(2);
    long_name.filename = "f".repeat(MAX_FILENAME_CHARS + 1);
    assert!(matches!(
        long_name.validate(2),
        Err(RagError::StoreSchemaViolation(_))
    ));

    let mut long_id = record(2);
    long_id.id = "i".repeat(MAX_ID_CHARS + 1);
    assert!(long_id.validate(2).is_err());
}

#[test]
fn metric_display_matches_config_names() {
    assert_eq!(SimilarityMetric::InnerProduct.to_string(), "inner_product");
    assert_eq!(SimilarityMetric::Cosine.to_string(), "cosine");
    assert_eq!(SimilarityMetric::L2.to_string(), "l2");
    assert_eq!(SimilarityMetric::default(), SimilarityMetric::InnerProduct);
}
