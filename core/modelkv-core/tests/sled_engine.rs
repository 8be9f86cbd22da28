// sled 백엔드 통합 테스트: 엔진 재생성 후에도 행과 오버플로 객체 유지

use modelkv_core::query::Filter;
use modelkv_core::{
    Engine, EngineConfig, MkvError, MkvResult, ModelRegistry, OrderBy, Resource, SledBackend,
};
use serde_json::json;
use std::sync::Arc;

fn models() -> ModelRegistry {
    ModelRegistry::from_json_str(
        r#"[
            {
                "id": "acme.Report",
                "properties": {
                    "title": { "type": "string", "maxLength": 80 },
                    "body": { "type": "string" },
                    "score": { "type": "number" }
                },
                "required": ["title"]
            }
        ]"#,
    )
    .unwrap()
}

fn engine_on(db: &sled::Db) -> MkvResult<Engine> {
    let backend = SledBackend::from_db(db.clone());
    let objects = backend.object_store()?;
    Engine::new(
        models(),
        EngineConfig::default(),
        Arc::new(backend),
        Arc::new(objects),
    )
}

fn report(link: &str, time: i64, body: &str) -> Resource {
    Resource::new()
        .with("link", link)
        .with("permalink", "R0")
        .with("author", "carol")
        .with("time", time)
        .with("title", format!("report {link}"))
        .with("body", body)
}

#[tokio::test]
async fn test_rows_and_overflow_survive_new_engine() -> MkvResult<()> {
    let dir = tempfile::tempdir().unwrap();
    let db = sled::open(dir.path())?;
    let long_body = "lorem ipsum ".repeat(200);

    {
        let engine = engine_on(&db)?;
        let reports = engine.table("acme.Report")?;
        reports.create(report("R1", 1, &long_body)).await?;
        reports.create(report("R2", 2, "short")).await?;
    }

    // fresh caches: table creation reports "already exists" and succeeds
    let engine = engine_on(&db)?;
    let reports = engine.table("acme.Report")?;
    assert_eq!(reports.get("R1").await?, report("R1", 1, &long_body));

    let revisions = engine
        .list(
            "acme.Report",
            &Filter::from_json(&json!({ "EQ": { "permalink": "R0" } }))?,
            Some(&OrderBy::desc("time")),
            None,
        )
        .await?;
    let links: Vec<_> = revisions.iter().filter_map(Resource::link).collect();
    assert_eq!(links, vec!["R2", "R1"]);
    assert_eq!(revisions[1].get("body"), Some(&json!(long_body)));
    Ok(())
}

#[tokio::test]
async fn test_destroy_removes_from_index() -> MkvResult<()> {
    let db = sled::Config::new().temporary(true).open()?;
    let engine = engine_on(&db)?;
    let reports = engine.table("acme.Report")?;
    reports.create(report("R1", 1, "a")).await?;
    reports.create(report("R2", 2, "b")).await?;

    let removed = reports.destroy("R1").await?;
    assert_eq!(removed.link(), Some("R1"));

    let by_author = engine
        .list(
            "acme.Report",
            &Filter::new().eq("author", "carol"),
            None,
            None,
        )
        .await?;
    assert_eq!(by_author.len(), 1);
    assert_eq!(by_author[0].link(), Some("R2"));
    Ok(())
}

#[tokio::test]
async fn test_rejected_create_leaves_stored_resource_intact() -> MkvResult<()> {
    let db = sled::Config::new().temporary(true).open()?;
    let engine = engine_on(&db)?;
    let reports = engine.table("acme.Report")?;
    let long_body = "original body ".repeat(200);
    let original = report("R1", 1, &long_body);
    reports.create(original.clone()).await?;

    let intruder = report("R1", 9, &"intruder body ".repeat(200)).with("title", "intruder");
    let err = reports.create(intruder).await.unwrap_err();
    assert!(matches!(err, MkvError::ResourceExists(_)));

    // the row is minified, so this reads the overflow copy
    assert_eq!(reports.get("R1").await?, original);
    Ok(())
}
