//! Batch pipeline integration tests

use std::sync::Arc;

use defect_rag::config::{CategoryTable, RetrievalConfig};
use defect_rag::pipeline::{load_queries, write_rows};
use defect_rag::prompt::DEFAULT_SYSTEM_PROMPT;
use defect_rag::{
    BatchRunner, DefectQuery, EmbeddingProvider, NO_SIMILAR_CASE, PromptTemplates, Retriever,
    RowStatus,
};

mod common;
use common::{FakeEmbedder, build_index, layout};

async fn runner(prompt_dir: &std::path::Path) -> (BatchRunner, Arc<FakeEmbedder>) {
    let (kb, embedder) = layout(&[
        ("f1", "功能使用", 1.0),
        ("f2", "功能使用", 2.0),
        ("p1", "性能效率", 1.5),
    ]);
    let index = build_index(&kb, &embedder).await;
    let retriever = Retriever::new(
        index,
        Arc::clone(&embedder) as Arc<dyn EmbeddingProvider>,
        None,
        RetrievalConfig::default(),
    );

    let runner = BatchRunner::new(
        Arc::new(retriever),
        CategoryTable::default(),
        PromptTemplates::new(prompt_dir),
    );
    (runner, embedder)
}

fn query(title: &str, description: &str, category: Option<&str>) -> DefectQuery {
    DefectQuery {
        title: Some(title.to_string()),
        description: description.to_string(),
        category: category.map(ToString::to_string),
    }
}

#[tokio::test]
async fn rows_follow_input_order_and_skip_blank_descriptions() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("sys3.md"), "Performance analyst prompt\n").unwrap();
    let (runner, _) = runner(dir.path()).await;

    let rows = runner
        .run(&[
            query("first", "query about saving", Some("性能效率")),
            query("second", "   ", None),
            query("third", "query about login", Some("")),
        ])
        .await;

    assert_eq!(rows.len(), 3);
    assert_eq!(
        rows.iter().map(|r| r.index).collect::<Vec<_>>(),
        vec![0, 1, 2]
    );

    let first = &rows[0];
    assert_eq!(first.status, RowStatus::Analyzed);
    assert_eq!(first.category, "性能效率");
    assert_eq!(first.category_label, "Performance efficiency");
    // Sparse category, so every record is a candidate
    assert_eq!(first.cases.len(), 3);
    assert_eq!(first.cases[0].id, "f1");
    let prompt = first.prompt.as_ref().unwrap();
    assert_eq!(prompt.system, "Performance analyst prompt");
    assert!(prompt.user.contains("当前缺陷标题：\nfirst"));
    assert!(prompt.user.contains("评分分类：性能效率"));

    let second = &rows[1];
    assert_eq!(second.status, RowStatus::Skipped);
    assert!(second.prompt.is_none());
    assert!(second.context.is_none());

    let third = &rows[2];
    assert_eq!(third.category, "功能使用");
    // sys.md is absent from the prompt directory
    assert_eq!(third.prompt.as_ref().unwrap().system, DEFAULT_SYSTEM_PROMPT);
}

#[tokio::test]
async fn degraded_row_still_produces_prompts() {
    let dir = tempfile::tempdir().unwrap();
    let (runner, embedder) = runner(dir.path()).await;
    embedder.set_failing(true);

    let rows = runner.run(&[query("t", "query text", None)]).await;

    let row = &rows[0];
    assert_eq!(row.status, RowStatus::Analyzed);
    assert!(row.degraded);
    assert!(row.cases.is_empty());
    assert!(row.context.as_deref().unwrap().contains(NO_SIMILAR_CASE));
    assert!(row.prompt.as_ref().unwrap().user.contains(NO_SIMILAR_CASE));
}

#[tokio::test]
async fn batch_files_round_trip_through_disk() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("defects.json");
    std::fs::write(
        &input,
        r#"[{"缺陷标题": "卡顿", "缺陷描述": "query list scroll stutters", "评分分类": "性能效率"}]"#,
    )
    .unwrap();

    let queries = load_queries(&input).unwrap();
    let (runner, _) = runner(dir.path()).await;
    let rows = runner.run(&queries).await;

    let output = dir.path().join("out/results.json");
    write_rows(&output, &rows).unwrap();

    let written: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&output).unwrap()).unwrap();
    assert_eq!(written[0]["status"], "analyzed");
    assert_eq!(written[0]["title"], "卡顿");
    assert_eq!(written[0]["source"], "global");
    assert_eq!(written[0]["cases"].as_array().unwrap().len(), 3);
}

#[test]
fn malformed_batch_input_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("defects.json");
    std::fs::write(&input, "{\"not\": \"an array\"}").unwrap();
    assert!(load_queries(&input).is_err());
}
