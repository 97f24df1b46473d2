use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use codetorch_annotate::{AnnotationEngine, EngineError, RenderEntry};
use codetorch_config::{AnnotationsConfig, CodetorchConfig};
use codetorch_core::{DocumentKey, DocumentSnapshot};
use codetorch_infer::ProviderOverrides;
use thiserror::Error;
use tokio::sync::broadcast::error::RecvError;
use tower_lsp::lsp_types::{
    CodeLens, CodeLensOptions, CodeLensParams, Command, DidChangeTextDocumentParams,
    DidCloseTextDocumentParams, DidOpenTextDocumentParams, DidSaveTextDocumentParams,
    ExecuteCommandOptions, ExecuteCommandParams, InitializeParams, InitializeResult,
    InitializedParams, MessageType, Position, Range, SaveOptions, ServerCapabilities,
    TextDocumentSyncCapability, TextDocumentSyncKind, TextDocumentSyncOptions,
    TextDocumentSyncSaveOptions, Url,
};
use tower_lsp::{Client, LanguageServer, LspService, Server};

mod text;

pub use text::TextBuffer;

/// Command bound to every annotation lens; executing it does nothing.
pub const NOOP_COMMAND: &str = "codetorch.nop";

#[derive(Debug, Error)]
pub enum LspServerError {
    #[error("annotation engine init error: {0}")]
    Engine(#[from] EngineError),
}

#[derive(Debug)]
struct OpenBuffer {
    language_id: String,
    buffer: TextBuffer,
}

pub struct CodetorchLspBackend {
    client: Client,
    workspace_root: PathBuf,
    annotations: AnnotationsConfig,
    engine: Arc<AnnotationEngine>,
    buffers: Mutex<HashMap<DocumentKey, OpenBuffer>>,
}

impl CodetorchLspBackend {
    pub fn new(
        client: Client,
        workspace_root: PathBuf,
        annotations: AnnotationsConfig,
        engine: Arc<AnnotationEngine>,
    ) -> Self {
        Self {
            client,
            workspace_root,
            annotations,
            engine,
            buffers: Mutex::new(HashMap::new()),
        }
    }

    fn key_for(&self, uri: &Url) -> Option<DocumentKey> {
        document_key_for_uri(&self.workspace_root, &self.annotations, uri)
    }

    fn buffers(&self) -> std::sync::MutexGuard<'_, HashMap<DocumentKey, OpenBuffer>> {
        self.buffers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn spawn_refresh_listener(&self) {
        let mut invalidations = self.engine.subscribe();
        let client = self.client.clone();
        tokio::spawn(async move {
            loop {
                match invalidations.recv().await {
                    Ok(key) => tracing::debug!(document = %key, "annotations invalidated"),
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::debug!(skipped, "coalesced annotation invalidations");
                    }
                    Err(RecvError::Closed) => break,
                }
                if let Err(err) = client.code_lens_refresh().await {
                    tracing::debug!(error = %err, "client rejected code lens refresh");
                }
            }
        });
    }
}

#[tower_lsp::async_trait]
impl LanguageServer for CodetorchLspBackend {
    async fn initialize(
        &self,
        _: InitializeParams,
    ) -> tower_lsp::jsonrpc::Result<InitializeResult> {
        Ok(InitializeResult {
            capabilities: server_capabilities(),
            ..InitializeResult::default()
        })
    }

    async fn initialized(&self, _: InitializedParams) {
        self.spawn_refresh_listener();
        let _ = self
            .client
            .log_message(MessageType::INFO, "CodeTorch LSP initialized")
            .await;
    }

    async fn shutdown(&self) -> tower_lsp::jsonrpc::Result<()> {
        Ok(())
    }

    async fn did_open(&self, params: DidOpenTextDocumentParams) {
        let document = params.text_document;
        let Some(key) = self.key_for(&document.uri) else {
            return;
        };

        self.buffers().insert(
            key.clone(),
            OpenBuffer {
                language_id: document.language_id.clone(),
                buffer: TextBuffer::new(document.text.clone()),
            },
        );
        self.engine.open_document(DocumentSnapshot::new(
            key,
            document.language_id,
            document.text,
            false,
        ));
    }

    async fn did_change(&self, params: DidChangeTextDocumentParams) {
        let Some(key) = self.key_for(&params.text_document.uri) else {
            return;
        };

        let mut buffers = self.buffers();
        let Some(open) = buffers.get_mut(&key) else {
            tracing::debug!(document = %key, "change for a document that was never opened");
            return;
        };

        // LSP content changes apply one after another, so each is shifted
        // against the text it was written for.
        for change in &params.content_changes {
            let change = open.buffer.apply(change);
            let snapshot = DocumentSnapshot::new(
                key.clone(),
                open.language_id.clone(),
                open.buffer.text(),
                true,
            );
            self.engine.apply_changes(snapshot, std::slice::from_ref(&change));
        }
    }

    async fn did_save(&self, params: DidSaveTextDocumentParams) {
        let Some(key) = self.key_for(&params.text_document.uri) else {
            return;
        };

        let text = {
            let mut buffers = self.buffers();
            let Some(open) = buffers.get_mut(&key) else {
                return;
            };
            if let Some(text) = params.text {
                open.buffer.replace(text);
            }
            open.buffer.text().to_owned()
        };
        self.engine.save_document(&key, text);
    }

    async fn did_close(&self, params: DidCloseTextDocumentParams) {
        let Some(key) = self.key_for(&params.text_document.uri) else {
            return;
        };

        self.buffers().remove(&key);
        self.engine.close_document(&key);
    }

    async fn code_lens(
        &self,
        params: CodeLensParams,
    ) -> tower_lsp::jsonrpc::Result<Option<Vec<CodeLens>>> {
        if !self.annotations.enabled {
            return Ok(None);
        }
        let Some(key) = self.key_for(&params.text_document.uri) else {
            return Ok(None);
        };
        let Some(rendered) = self.engine.render(&key) else {
            return Ok(None);
        };

        if rendered.scheduled.is_some() {
            tracing::debug!(document = %key, "summaries are being generated");
        }
        Ok(Some(rendered.entries.iter().map(code_lens_for).collect()))
    }

    async fn execute_command(
        &self,
        _: ExecuteCommandParams,
    ) -> tower_lsp::jsonrpc::Result<Option<serde_json::Value>> {
        Ok(None)
    }
}

pub async fn run_stdio(
    workspace_root: PathBuf,
    config: CodetorchConfig,
    overrides: ProviderOverrides,
) -> Result<(), LspServerError> {
    let engine = Arc::new(AnnotationEngine::open_workspace(
        &workspace_root,
        &config,
        overrides,
    )?);

    let stdin = tokio::io::stdin();
    let stdout = tokio::io::stdout();

    let (service, socket) = LspService::new(|client| {
        CodetorchLspBackend::new(
            client,
            workspace_root.clone(),
            config.annotations.clone(),
            engine.clone(),
        )
    });

    Server::new(stdin, stdout, socket).serve(service).await;
    Ok(())
}

pub fn server_capabilities() -> ServerCapabilities {
    ServerCapabilities {
        text_document_sync: Some(TextDocumentSyncCapability::Options(
            TextDocumentSyncOptions {
                open_close: Some(true),
                change: Some(TextDocumentSyncKind::INCREMENTAL),
                save: Some(TextDocumentSyncSaveOptions::SaveOptions(SaveOptions {
                    include_text: Some(true),
                })),
                ..TextDocumentSyncOptions::default()
            },
        )),
        code_lens_provider: Some(CodeLensOptions {
            resolve_provider: Some(false),
        }),
        execute_command_provider: Some(ExecuteCommandOptions {
            commands: vec![NOOP_COMMAND.to_owned()],
            ..ExecuteCommandOptions::default()
        }),
        ..ServerCapabilities::default()
    }
}

/// Workspace key for `uri`, or `None` for non-file URIs and ignored paths.
pub fn document_key_for_uri(
    workspace_root: &Path,
    annotations: &AnnotationsConfig,
    uri: &Url,
) -> Option<DocumentKey> {
    if uri.scheme() != "file" {
        return None;
    }
    let path = uri.to_file_path().ok()?;
    let key = DocumentKey::from_path(workspace_root, &path);
    if annotations.is_ignored(key.as_str()) {
        tracing::trace!(document = %key, "ignoring document");
        return None;
    }
    Some(key)
}

pub fn code_lens_for(entry: &RenderEntry) -> CodeLens {
    let position = Position::new(entry.line as u32, 0);
    CodeLens {
        range: Range::new(position, position),
        command: Some(Command {
            title: entry.text.clone(),
            command: NOOP_COMMAND.to_owned(),
            arguments: None,
        }),
        data: None,
    }
}

#[cfg(test)]
mod tests {
    use codetorch_annotate::RenderKind;

    use super::*;

    fn annotations() -> AnnotationsConfig {
        CodetorchConfig::default().annotations
    }

    #[test]
    fn file_uris_map_to_workspace_relative_keys() {
        let root = PathBuf::from("/work/project");
        let uri = Url::from_file_path("/work/project/src/app.ts").expect("file url");

        let key = document_key_for_uri(&root, &annotations(), &uri).expect("key");

        assert_eq!(key.as_str(), "src/app.ts");
    }

    #[test]
    fn non_file_and_ignored_documents_are_skipped() {
        let root = PathBuf::from("/work/project");
        let output = Url::parse("output:extension-output-codetorch").expect("url");
        let vendored =
            Url::from_file_path("/work/project/node_modules/pkg/index.js").expect("file url");

        assert!(document_key_for_uri(&root, &annotations(), &output).is_none());
        assert!(document_key_for_uri(&root, &annotations(), &vendored).is_none());
    }

    #[test]
    fn render_entries_become_noop_lenses() {
        let lens = code_lens_for(&RenderEntry {
            line: 4,
            text: "Adds two numbers".to_owned(),
            kind: RenderKind::FunctionSummary,
        });

        assert_eq!(lens.range.start, Position::new(4, 0));
        let command = lens.command.expect("command");
        assert_eq!(command.title, "Adds two numbers");
        assert_eq!(command.command, NOOP_COMMAND);
    }

    #[test]
    fn capabilities_request_incremental_sync_and_lenses() {
        let capabilities = server_capabilities();

        let Some(TextDocumentSyncCapability::Options(sync)) = capabilities.text_document_sync
        else {
            panic!("expected sync options");
        };
        assert_eq!(sync.change, Some(TextDocumentSyncKind::INCREMENTAL));
        assert!(capabilities.code_lens_provider.is_some());
    }
}
