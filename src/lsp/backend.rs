use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, watch};
use tower_lsp::lsp_types::*;
use tower_lsp::{Client, LanguageServer};

use crate::lsp::document::DocumentState;
use crate::lsp::handlers::{HandleCompletion, HandleDiagnostics, HandleHover};
use crate::shape::ShapeManager;
use crate::Config;

/// The main LSP backend that holds state and implements the Language Server Protocol
#[derive(Clone)]
pub struct Backend {
    pub client: Client,
    pub shape_manager: Arc<Mutex<ShapeManager>>,
    pub documents: Arc<Mutex<HashMap<Url, DocumentState>>>,
}

impl Backend {
    pub fn new(client: Client, config: &Config) -> Self {
        Self {
            client,
            shape_manager: Arc::new(Mutex::new(ShapeManager::new(config))),
            documents: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    async fn update_document(&self, uri: Url, content: String) {
        let doc_state = self.create_document_state(content).await;

        let mut docs = self.documents.lock().await;
        docs.insert(uri.clone(), doc_state);
        drop(docs); // Release the lock before calling publish_diagnostics

        self.publish_diagnostics(uri).await;
    }

    /// Re-resolve and re-check every open document after shapes changed
    async fn refresh_documents(&self) {
        let open: Vec<(Url, String)> = self
            .documents
            .lock()
            .await
            .iter()
            .map(|(uri, doc_state)| (uri.clone(), doc_state.content.clone()))
            .collect();

        log::debug!("Shapes reloaded, re-checking {} open document(s)", open.len());

        for (uri, content) in open {
            let doc_state = self.create_document_state(content).await;

            let mut docs = self.documents.lock().await;
            match docs.get_mut(&uri) {
                // Skip documents edited or closed in the meantime
                Some(current) if current.content == doc_state.content => *current = doc_state,
                _ => continue,
            }
            drop(docs);

            self.publish_diagnostics(uri).await;
        }
    }

    /// Re-check open documents whenever the shape manager reloads
    fn watch_reloads(&self, mut generation: watch::Receiver<u64>) {
        let backend = self.clone();
        tokio::spawn(async move {
            while generation.changed().await.is_ok() {
                backend.refresh_documents().await;
            }
        });
    }
}

#[tower_lsp::async_trait]
impl LanguageServer for Backend {
    async fn initialize(
        &self,
        _: InitializeParams,
    ) -> tower_lsp::jsonrpc::Result<InitializeResult> {
        Ok(InitializeResult {
            capabilities: ServerCapabilities {
                hover_provider: Some(HoverProviderCapability::Simple(true)),
                completion_provider: Some(CompletionOptions {
                    resolve_provider: Some(false),
                    trigger_characters: Some(vec!["\"".to_string()]),
                    work_done_progress_options: Default::default(),
                    all_commit_characters: None,
                    completion_item: None,
                }),
                text_document_sync: Some(TextDocumentSyncCapability::Kind(
                    TextDocumentSyncKind::FULL,
                )),
                ..Default::default()
            },
            server_info: Some(ServerInfo {
                name: "shape-language-server".to_string(),
                version: Some(env!("CARGO_PKG_VERSION").to_string()),
            }),
        })
    }

    async fn initialized(&self, _: InitializedParams) {
        let mut manager = self.shape_manager.lock().await;
        let generation = manager.subscribe();
        if let Err(e) = manager.initialize(Some(self.client.clone())).await {
            self.client
                .log_message(
                    MessageType::ERROR,
                    format!("Failed to initialize shapes: {:#}", e),
                )
                .await;
        }
        drop(manager);

        self.watch_reloads(generation);

        self.client
            .log_message(MessageType::INFO, "shape-language-server initialized")
            .await;
    }

    async fn shutdown(&self) -> tower_lsp::jsonrpc::Result<()> {
        Ok(())
    }

    async fn hover(&self, params: HoverParams) -> tower_lsp::jsonrpc::Result<Option<Hover>> {
        self.handle_hover(params).await
    }

    async fn completion(
        &self,
        params: CompletionParams,
    ) -> tower_lsp::jsonrpc::Result<Option<CompletionResponse>> {
        self.handle_completion(params).await
    }

    async fn did_open(&self, params: DidOpenTextDocumentParams) {
        self.update_document(params.text_document.uri, params.text_document.text)
            .await;
    }

    async fn did_change(&self, params: DidChangeTextDocumentParams) {
        let uri = params.text_document.uri;
        if let Some(change) = params.content_changes.into_iter().last() {
            self.update_document(uri, change.text).await;
        }
    }

    async fn did_close(&self, params: DidCloseTextDocumentParams) {
        let uri = params.text_document.uri;
        self.documents.lock().await.remove(&uri);
        self.client.publish_diagnostics(uri, Vec::new(), None).await;
    }
}
