//! Minimal example: a newsroom storing a confidential tip.
//!
//! Demonstrates policy-bound storage, refused and granted reads, citation
//! and an access log persisted to a file.
//! Run with: `RUST_LOG=sourcevault=debug cargo run --example newsroom_demo`

use sourcevault::{
    AccessLevel, AccessPolicy, Citation, CitationCatalog, FileAuditSink, SecurityContext, Source, SourceStore,
    VaultConfig,
};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    // 1. Setup. A real deployment would load this from a TOML file and pin the salt.
    let config = VaultConfig::from_toml_str("pbkdf2_iterations = 100000")?;
    let store = SourceStore::from_config(&config)?;

    let audit_path = std::env::temp_dir().join("sourcevault_access.jsonl");
    store.add_audit_sink(Box::new(FileAuditSink::new(&audit_path)?));

    // 2. Store a tip only the investigations editor may read, with 2FA.
    let tip = Source::new(b"The harbour manifests were altered on 3 March.".to_vec())
        .with_metadata("title", "Harbour tip")
        .with_metadata("desk", "investigations");
    let policy = AccessPolicy::new(AccessLevel::Confidential, ["editor"], "default").requiring_2fa();
    let id = store.store(&tip, &policy)?;
    println!("Stored tip as {id}");

    // 3. Refused reads.
    for (label, ctx) in [
        ("intern", SecurityContext::for_user("intern")),
        ("editor without 2FA", SecurityContext::for_user("editor")),
    ] {
        match store.retrieve(&id, &ctx) {
            Ok(_) => println!("{label}: unexpectedly granted"),
            Err(e) => println!("{label}: {e}"),
        }
    }

    // 4. Granted read, then cite it.
    let editor = SecurityContext::for_user("editor").with_second_factor("otp-verified");
    let source = store.retrieve(&id, &editor)?;
    println!("editor read {} bytes: {:?}", source.content.len(), source.text());

    let citation = Citation::new(id.clone(), "journalism")
        .with_field("source", "Port employee")
        .with_field("date", "2024-03-04")
        .with_quote("The manifests were changed overnight");
    println!("Citation: {}", CitationCatalog::default().format(&citation)?);

    // 5. Access log.
    for event in store.audit_events() {
        println!("  {:?} {:?} by {:?} @ {}", event.operation, event.outcome, event.user, event.timestamp);
    }
    println!("Access log also written to: {}", audit_path.display());

    Ok(())
}
