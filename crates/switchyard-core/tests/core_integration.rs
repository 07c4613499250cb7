#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use switchyard_core::*;

// ---------------------------------------------------------------------------
// 1. Catalog loaded from a TOML document
// ---------------------------------------------------------------------------

#[derive(serde::Deserialize)]
struct CatalogFile {
    workers: Vec<Worker>,
}

#[test]
fn catalog_from_toml_document() {
    let file: CatalogFile = toml::from_str(
        r#"
        [[workers]]
        id = "architect"
        name = "Architect"
        capabilities = ["design", "architecture"]
        core = true

        [[workers]]
        id = "backend"
        capabilities = ["api", "server"]
        concurrency = 3
        timeout_secs = 120

        [workers.triggers]
        globs = ["src/api/**/*.rs"]
        "#,
    )
    .unwrap();

    let catalog = Arc::new(Catalog::new(file.workers).unwrap());
    assert_eq!(catalog.len(), 2);

    let backend = catalog.get("backend").unwrap();
    assert_eq!(backend.concurrency_limit(), 3);
    assert_eq!(backend.timeout().as_secs(), 120);
    assert_eq!(backend.display_name(), "backend");
    assert_eq!(backend.triggers.globs, vec!["src/api/**/*.rs"]);

    assert_eq!(catalog.core_workers().len(), 1);
}

// ---------------------------------------------------------------------------
// 2. Plan document round trip keeps the exchanged field names
// ---------------------------------------------------------------------------

#[test]
fn plan_document_keeps_wire_names() {
    let selection = Selection::from_ids(["backend", "tester"], "route:keyword");
    let plan = Plan::new(vec![
        Task::new("T1", "Build API", "backend"),
        Task::new("T2", "Test API", "tester").depends_on(["T1"]),
    ]);
    let mut order = Order::new("O1", "tester");
    order.objectives.push("cover every endpoint".into());

    let doc = PlanDocument {
        agents: selection.agents(),
        plan,
        orders: vec![order],
    };

    let value = serde_json::to_value(&doc).unwrap();
    assert_eq!(value["plan"][1]["dependsOn"][0], "T1");
    assert_eq!(value["orders"][0]["agent_id"], "tester");
    assert_eq!(value["agents"][0]["id"], "backend");

    let parsed: PlanDocument = serde_json::from_value(value).unwrap();
    assert_eq!(parsed, doc);
}

// ---------------------------------------------------------------------------
// 3. Empty catalog is the fatal startup condition
// ---------------------------------------------------------------------------

#[test]
fn empty_catalog_is_fatal() {
    let err = Catalog::new(vec![]).unwrap_err();
    assert_eq!(err.to_string(), "Worker catalog is empty");
}
