use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use codetorch_annotate::AnnotationEngine;
use codetorch_config::CodetorchConfig;
use codetorch_core::{DocumentKey, DocumentSnapshot};
use codetorch_infer::ProviderOverrides;
use codetorch_parse::{FunctionDetector, default_detector, default_registry};
use codetorch_store::open_record_store;

const PLAINTEXT_LANGUAGE_ID: &str = "plaintext";

/// A workspace file read from disk, keyed the way an editor would key it.
#[derive(Debug)]
pub struct SourceFile {
    pub path: PathBuf,
    pub snapshot: DocumentSnapshot,
}

impl SourceFile {
    pub fn read(workspace: &Path, file: &Path) -> Result<Self> {
        let path = resolve_file(workspace, file);
        let text = fs::read_to_string(&path)
            .with_context(|| format!("failed to read source file {}", path.display()))?;
        let snapshot = DocumentSnapshot::new(
            DocumentKey::from_path(workspace, &path),
            language_id_for_path(&path),
            text,
            false,
        );
        Ok(Self { path, snapshot })
    }
}

fn resolve_file(workspace: &Path, file: &Path) -> PathBuf {
    if file.is_absolute() {
        file.to_path_buf()
    } else {
        workspace.join(file)
    }
}

pub fn language_id_for_path(path: &Path) -> String {
    default_registry()
        .get_by_path(path)
        .and_then(|config| config.language_ids.first().copied())
        .unwrap_or(PLAINTEXT_LANGUAGE_ID)
        .to_owned()
}

pub fn run_list_functions(workspace: &Path, file: &Path, out: &mut dyn Write) -> Result<()> {
    let source = SourceFile::read(workspace, file)?;
    let spans = default_detector()
        .detect(&source.snapshot)
        .with_context(|| format!("failed to detect functions in {}", source.path.display()))?;

    for span in spans {
        writeln!(out, "{}\t{}", span.start_line + 1, span.name)
            .context("failed to write function list")?;
    }
    Ok(())
}

/// Opens `file` clean, waits for any summarization it needs and prints the
/// resulting annotations, one per line.
pub async fn run_annotate(
    workspace: &Path,
    config: &CodetorchConfig,
    overrides: ProviderOverrides,
    file: &Path,
    out: &mut dyn Write,
) -> Result<()> {
    let source = SourceFile::read(workspace, file)?;
    let key = source.snapshot.key.clone();
    let engine = AnnotationEngine::open_workspace(workspace, config, overrides)
        .context("failed to initialize annotation engine")?;
    engine.open_document(source.snapshot);

    let mut rendered = engine
        .render(&key)
        .context("document was not registered")?;
    if let Some(batch) = rendered.scheduled.take() {
        let report = batch.await.context("summarization batch panicked")?;
        tracing::info!(
            document = %key,
            generated = report.generated,
            failed = report.failed,
            "summarization finished"
        );
        rendered = engine
            .render(&key)
            .context("document was not registered")?;
    }

    for entry in &rendered.entries {
        writeln!(
            out,
            "{}\t{}\t{}",
            entry.line + 1,
            entry.kind.as_str(),
            entry.text
        )
        .context("failed to write annotations")?;
    }
    Ok(())
}

pub fn run_print_records(
    workspace: &Path,
    config: &CodetorchConfig,
    file: &Path,
    out: &mut dyn Write,
) -> Result<()> {
    let key = DocumentKey::from_path(workspace, &resolve_file(workspace, file));
    let store = open_record_store(workspace, &config.storage)
        .context("failed to initialize record store")?;

    let records = store
        .load(&key)
        .with_context(|| format!("failed to load records for {key}"))?
        .unwrap_or_default();
    let rendered =
        serde_json::to_string_pretty(&records).context("failed to encode records as JSON")?;
    writeln!(out, "{rendered}").context("failed to write records")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn language_ids_follow_extensions() {
        assert_eq!(language_id_for_path(Path::new("src/lib.rs")), "rust");
        assert_eq!(
            language_id_for_path(Path::new("web/app.tsx")),
            "typescriptreact"
        );
        assert_eq!(language_id_for_path(Path::new("tool.py")), "python");
        assert_eq!(language_id_for_path(Path::new("README.md")), "plaintext");
    }
}
