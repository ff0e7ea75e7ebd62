//! Citation and semantic collaborators only ever see what a caller chose to
//! expose after an authorized retrieval.

use std::collections::BTreeMap;
use std::sync::Arc;

use sourcevault::{
    AccessLevel, AccessPolicy, Citation, CitationCatalog, MockProvider, SecurityContext, SemanticMatcher, Source,
    SourceStore, VaultError,
};

#[test]
fn test_cite_and_index_after_retrieval() {
    let store = SourceStore::new(Arc::new(MockProvider::new()));
    let policy = AccessPolicy::new(AccessLevel::Confidential, ["researcher1"], "default");
    let id = store
        .store(
            &Source::new(b"Shipping manifests were altered before the audit".to_vec())
                .with_metadata("title", "Secret Document"),
            &policy,
        )
        .unwrap();

    // 1. Authorized retrieval.
    let source = store.retrieve(&id, &SecurityContext::for_user("researcher1")).unwrap();

    // 2. Cite it.
    let catalog = CitationCatalog::default();
    let citation = Citation::new(id.clone(), "apa")
        .with_field("authors", "Smith, J.")
        .with_field("year", "2024")
        .with_field("title", &source.metadata["title"]);
    assert_eq!(catalog.format(&citation).unwrap(), "Smith, J. (2024). Secret Document. .");

    // 3. Index the plaintext the caller chose to expose.
    let matcher = SemanticMatcher::default();
    let indices = vec![
        matcher.index("city council minutes", "en"),
        matcher.index(source.text().unwrap(), "en"),
    ];
    let ranked = matcher.rank("altered shipping manifests", &indices);
    assert_eq!(ranked[0].position, 1);
    assert!(ranked.iter().all(|m| (-1.0..=1.0).contains(&m.score)));
}

#[test]
fn test_boundary_format_reports_missing_field() {
    let catalog = CitationCatalog::default();
    let mut fields = BTreeMap::new();
    fields.insert("source".to_string(), "Harbour official".to_string());

    let err = catalog
        .format_fields(&"src-1".into(), "journalism", &fields)
        .unwrap_err();
    assert!(matches!(err, VaultError::MissingField(f) if f == "date"));

    fields.insert("date".to_string(), "2024-03-01".to_string());
    assert_eq!(
        catalog.format_fields(&"src-1".into(), "journalism", &fields).unwrap(),
        "\"\" (Harbour official, 2024-03-01)"
    );
}
