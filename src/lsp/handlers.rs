use std::collections::HashSet;

use serde_json::Value;
use tower_lsp::jsonrpc::Result as LspResult;
use tower_lsp::lsp_types::*;

use crate::lsp::backend::Backend;
use crate::lsp::document::DocumentState;
use crate::lsp::locate::KeyIndex;
use crate::shape::{FieldDef, FieldType, Shape, ShapeResolution, SHAPE_DIRECTIVE_KEY};
use crate::validation::{validate_report, FieldError};

/// Source reported on every diagnostic
pub const DIAGNOSTIC_SOURCE: &str = "shape-ls";

/// Trait for handling hover requests
#[tower_lsp::async_trait]
pub trait HandleHover {
    async fn handle_hover(&self, params: HoverParams) -> LspResult<Option<Hover>>;
}

/// Trait for handling completion requests
#[tower_lsp::async_trait]
pub trait HandleCompletion {
    async fn handle_completion(
        &self,
        params: CompletionParams,
    ) -> LspResult<Option<CompletionResponse>>;
}

/// Trait for handling diagnostics
#[tower_lsp::async_trait]
pub trait HandleDiagnostics {
    async fn create_document_state(&self, content: String) -> DocumentState;
    async fn publish_diagnostics(&self, uri: Url);
}

#[tower_lsp::async_trait]
impl HandleHover for Backend {
    async fn handle_hover(&self, params: HoverParams) -> LspResult<Option<Hover>> {
        let tdpp = params.text_document_position_params;
        let uri = tdpp.text_document.uri;

        let docs = self.documents.lock().await;
        let doc_state = match docs.get(&uri) {
            Some(state) => state,
            None => return Ok(None),
        };

        Ok(hover_at(doc_state, tdpp.position).map(|value| Hover {
            contents: HoverContents::Markup(MarkupContent {
                kind: MarkupKind::Markdown,
                value,
            }),
            range: None,
        }))
    }
}

#[tower_lsp::async_trait]
impl HandleCompletion for Backend {
    async fn handle_completion(
        &self,
        params: CompletionParams,
    ) -> LspResult<Option<CompletionResponse>> {
        let uri = params.text_document_position.text_document.uri;
        let pos = params.text_document_position.position;

        let docs = self.documents.lock().await;
        let doc_state = match docs.get(&uri) {
            Some(state) => state,
            None => return Ok(None),
        };

        let completions = match doc_state.shape() {
            Some(shape) => field_completions(shape, &doc_state.keys, pos),
            None => {
                // No shape yet: offer the directive for every known shape
                let manager = self.shape_manager.lock().await;
                let mut items = Vec::new();
                for name in manager.list_shape_names().await {
                    let detail = manager
                        .get_shape(&name)
                        .await
                        .map(|loaded| loaded.shape.display_name().to_string());
                    items.push(directive_completion(&name, detail));
                }
                items
            }
        };

        if completions.is_empty() {
            Ok(None)
        } else {
            Ok(Some(CompletionResponse::Array(completions)))
        }
    }
}

#[tower_lsp::async_trait]
impl HandleDiagnostics for Backend {
    /// Create a new document state, resolving its shape
    async fn create_document_state(&self, content: String) -> DocumentState {
        let manager = self.shape_manager.lock().await;
        let resolution = manager.resolve_document_shape(&content).await;
        DocumentState::new(content, resolution)
    }

    /// Publish diagnostics for a document
    async fn publish_diagnostics(&self, uri: Url) {
        let docs = self.documents.lock().await;
        let doc_state = match docs.get(&uri) {
            Some(state) => state,
            None => return,
        };

        let diagnostics = document_diagnostics(doc_state);
        drop(docs);

        self.client
            .publish_diagnostics(uri, diagnostics, None)
            .await;
    }
}

/// Diagnostics for a document: syntax first, then the shape's checks
pub fn document_diagnostics(doc_state: &DocumentState) -> Vec<Diagnostic> {
    let payload: Value = match serde_json::from_str(&doc_state.content) {
        Ok(payload) => payload,
        Err(e) => {
            let position = syntax_error_position(&doc_state.content, &e);
            return vec![diagnostic(
                Range::new(position, position),
                DiagnosticSeverity::ERROR,
                Some("json_syntax"),
                format!("Invalid JSON: {}", e),
            )];
        }
    };

    let shape = match &doc_state.resolution {
        ShapeResolution::Found(loaded) => &loaded.shape,
        ShapeResolution::Unknown(name) => {
            let range = doc_state
                .keys
                .key_range(SHAPE_DIRECTIVE_KEY)
                .unwrap_or_default();
            return vec![diagnostic(
                range,
                DiagnosticSeverity::WARNING,
                Some("unknown_shape"),
                format!("Unknown shape '{}'", name),
            )];
        }
        ShapeResolution::None => return Vec::new(),
    };

    let report = validate_report(shape, &payload);
    let mut diagnostics: Vec<Diagnostic> = report
        .errors
        .iter()
        .map(|error| field_diagnostic(&doc_state.keys, error))
        .collect();

    for path in &report.unknown_keys {
        diagnostics.push(diagnostic(
            doc_state.keys.locate(path),
            DiagnosticSeverity::WARNING,
            Some("unknown_field"),
            format!("Field '{}' is not declared in shape '{}'", path, shape.name),
        ));
    }

    diagnostics
}

fn field_diagnostic(keys: &KeyIndex, error: &FieldError) -> Diagnostic {
    diagnostic(
        keys.locate(&error.path),
        DiagnosticSeverity::ERROR,
        Some(error.kind.code()),
        error.message.clone(),
    )
}

fn diagnostic(
    range: Range,
    severity: DiagnosticSeverity,
    code: Option<&str>,
    message: String,
) -> Diagnostic {
    Diagnostic::new(
        range,
        Some(severity),
        code.map(|c| NumberOrString::String(c.to_string())),
        Some(DIAGNOSTIC_SOURCE.to_string()),
        message,
        None,
        None,
    )
}

/// serde_json reports byte columns; LSP wants UTF-16 ones
fn syntax_error_position(content: &str, error: &serde_json::Error) -> Position {
    let line_idx = error.line().saturating_sub(1);
    let line = content.lines().nth(line_idx).unwrap_or("");

    let mut end = error.column().saturating_sub(1).min(line.len());
    while !line.is_char_boundary(end) {
        end -= 1;
    }
    let character = line[..end].encode_utf16().count();

    Position::new(line_idx as u32, character as u32)
}

/// Markdown shown when hovering a key
pub fn hover_at(doc_state: &DocumentState, position: Position) -> Option<String> {
    let path = doc_state.keys.path_at(position)?;

    if path == SHAPE_DIRECTIVE_KEY {
        return Some(match doc_state.shape() {
            Some(shape) => shape_hover(shape),
            None => "Shape directive: no shape by this name is loaded".to_string(),
        });
    }

    let field = doc_state.shape()?.field_at(path)?;
    Some(field_hover(field, path))
}

fn shape_hover(shape: &Shape) -> String {
    let mut text = format!("**{}** (`{}`)", shape.display_name(), shape.name);
    if let Some(version) = &shape.version {
        text.push_str(&format!(" v{}", version));
    }
    if let Some(description) = &shape.description {
        text.push_str(&format!("\n\n{}", description));
    }
    text.push_str(&format!("\n\n{} fields", shape.fields.len()));
    text
}

fn field_hover(field: &FieldDef, path: &str) -> String {
    let mut text = format!(
        "**{}** `{}`\n\nType: `{}`, {}",
        field.display_name(),
        path,
        field.field_type,
        if field.required { "required" } else { "optional" }
    );

    if let Some(description) = &field.description {
        text.push_str(&format!("\n\n{}", description));
    }

    if !field.constraints.is_empty() {
        text.push_str("\n\n**Constraints:**");
        for constraint in &field.constraints {
            text.push_str(&format!("\n- {}", constraint));
        }
    }

    if let Some(items) = &field.items {
        text.push_str(&format!("\n\nItems: `{}`", items.field_type));
    }

    text
}

/// Declared fields not yet written in the object under the cursor
pub fn field_completions(shape: &Shape, keys: &KeyIndex, position: Position) -> Vec<CompletionItem> {
    let object_path = keys.object_at(position).map(|o| o.path.as_str()).unwrap_or("");

    let fields: &[FieldDef] = if object_path.is_empty() {
        &shape.fields
    } else {
        match shape.field_at(object_path) {
            Some(field) if field.field_type == FieldType::Object => &field.fields,
            _ => return Vec::new(),
        }
    };

    let written: HashSet<&str> = keys.keys_in(object_path).collect();

    fields
        .iter()
        .filter(|field| !written.contains(field.name.as_str()))
        .map(|field| {
            let mut documentation = field.display_name().to_string();
            if let Some(description) = &field.description {
                documentation.push_str(&format!("\n\n{}", description));
            }

            CompletionItem {
                label: field.name.clone(),
                kind: Some(CompletionItemKind::PROPERTY),
                detail: Some(format!(
                    "{}{}",
                    field.field_type,
                    if field.required { ", required" } else { "" }
                )),
                documentation: Some(Documentation::MarkupContent(MarkupContent {
                    kind: MarkupKind::Markdown,
                    value: documentation,
                })),
                sort_text: Some(format!(
                    "{}{}",
                    if field.required { "0" } else { "1" },
                    field.name
                )),
                preselect: Some(field.required),
                filter_text: Some(field.name.clone()),
                ..Default::default()
            }
        })
        .collect()
}

fn directive_completion(name: &str, detail: Option<String>) -> CompletionItem {
    CompletionItem {
        label: name.to_string(),
        kind: Some(CompletionItemKind::ENUM_MEMBER),
        detail,
        insert_text: Some(format!("\"{}\": \"{}\"", SHAPE_DIRECTIVE_KEY, name)),
        filter_text: Some(name.to_string()),
        ..Default::default()
    }
}
