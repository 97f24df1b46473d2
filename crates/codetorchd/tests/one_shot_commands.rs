use std::fs;

use codetorch_config::{CodetorchConfig, InferenceProviderKind, StorageBackendKind};
use codetorch_core::FunctionRecord;
use codetorch_infer::ProviderOverrides;
use codetorchd::commands::{run_annotate, run_list_functions, run_print_records};
use tempfile::tempdir;

const APP_TS: &str = "function foo() {\n  return 1;\n}\n\nconst bar = (x: number) => {\n  const y = x * 2;\n\n  return y;\n};\n";

fn mock_overrides() -> ProviderOverrides {
    ProviderOverrides {
        provider: Some(InferenceProviderKind::Mock),
        ..ProviderOverrides::default()
    }
}

#[test]
fn list_functions_prints_one_based_lines() -> Result<(), Box<dyn std::error::Error>> {
    let temp = tempdir()?;
    let workspace = temp.path();
    fs::create_dir_all(workspace.join("src"))?;
    fs::write(workspace.join("src/app.ts"), APP_TS)?;

    let mut out = Vec::new();
    run_list_functions(workspace, "src/app.ts".as_ref(), &mut out)?;

    assert_eq!(String::from_utf8(out)?, "1\tfoo\n5\tbar\n");
    Ok(())
}

#[tokio::test]
async fn annotate_generates_once_then_reuses_cache() -> Result<(), Box<dyn std::error::Error>> {
    let temp = tempdir()?;
    let workspace = temp.path();
    fs::create_dir_all(workspace.join("src"))?;
    fs::write(workspace.join("src/app.ts"), APP_TS)?;
    let config = CodetorchConfig::default();

    let mut first = Vec::new();
    run_annotate(workspace, &config, mock_overrides(), "src/app.ts".as_ref(), &mut first).await?;
    let first = String::from_utf8(first)?;
    assert_eq!(
        first,
        "1\tfunction\tMock typescript summary for `function foo() {`\n\
         5\tfunction\tMock typescript summary for `const bar = (x: number) => {`\n\
         8\tline\tMock block starting with `return y;`\n"
    );
    assert!(workspace.join(".codetorch/src_app.ts.summary.json").exists());

    let mut printed = Vec::new();
    run_print_records(workspace, &config, "src/app.ts".as_ref(), &mut printed)?;
    let records: Vec<FunctionRecord> = serde_json::from_slice(&printed)?;
    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|record| record.live_code == record.last_saved_code));

    let mut second = Vec::new();
    run_annotate(workspace, &config, mock_overrides(), "src/app.ts".as_ref(), &mut second).await?;
    assert_eq!(String::from_utf8(second)?, first);
    Ok(())
}

#[tokio::test]
async fn sqlite_backend_round_trips_through_print_records()
-> Result<(), Box<dyn std::error::Error>> {
    let temp = tempdir()?;
    let workspace = temp.path();
    fs::write(workspace.join("lib.rs"), "fn alpha() -> i32 {\n    1\n}\n")?;
    let mut config = CodetorchConfig::default();
    config.storage.backend = StorageBackendKind::Sqlite;

    let mut annotated = Vec::new();
    run_annotate(workspace, &config, mock_overrides(), "lib.rs".as_ref(), &mut annotated).await?;
    assert_eq!(
        String::from_utf8(annotated)?,
        "1\tfunction\tMock rust summary for `fn alpha() -> i32 {`\n"
    );

    let mut printed = Vec::new();
    run_print_records(workspace, &config, "lib.rs".as_ref(), &mut printed)?;
    let records: Vec<FunctionRecord> = serde_json::from_slice(&printed)?;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].start_line, 0);

    let mut missing = Vec::new();
    run_print_records(workspace, &config, "other.rs".as_ref(), &mut missing)?;
    assert_eq!(String::from_utf8(missing)?.trim(), "[]");
    Ok(())
}
