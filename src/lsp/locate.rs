//! Key Locations
//!
//! Maps dotted field paths to positions in a JSON payload document, so
//! field errors can be shown where the field is written. The scanner is
//! tolerant of half-typed documents; it never fails, it just knows less.
//!
//! Columns are UTF-16 code units, as LSP positions require.

use std::collections::HashMap;

use tower_lsp::lsp_types::{Position, Range};

use crate::validation::path::{join_path, parent_path};

/// A key written in the document
#[derive(Debug, Clone, PartialEq)]
pub struct KeySpan {
    /// Dotted path of the field the key introduces
    pub path: String,
    /// Decoded key text
    pub key: String,
    /// Range of the key, quotes included
    pub range: Range,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerKind {
    Object,
    Array,
}

/// An object or array value in the document
#[derive(Debug, Clone, PartialEq)]
pub struct Container {
    pub path: String,
    pub kind: ContainerKind,
    /// From the opening bracket to just past the closing one
    pub range: Range,
}

/// Index of keys and containers of one document
#[derive(Debug, Clone, Default)]
pub struct KeyIndex {
    keys: Vec<KeySpan>,
    containers: Vec<Container>,
    by_path: HashMap<String, usize>,
    /// String values written for keys, by path
    strings: HashMap<String, String>,
}

enum Frame {
    Object {
        path: String,
        key: Option<String>,
        in_value: bool,
        container: usize,
    },
    Array {
        path: String,
        index: usize,
        container: usize,
    },
}

impl Frame {
    fn container(&self) -> usize {
        match self {
            Frame::Object { container, .. } | Frame::Array { container, .. } => *container,
        }
    }
}

struct Cursor<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
    line: u32,
    character: u32,
}

impl<'a> Cursor<'a> {
    fn new(content: &'a str) -> Self {
        Self {
            chars: content.chars().peekable(),
            line: 0,
            character: 0,
        }
    }

    fn position(&self) -> Position {
        Position::new(self.line, self.character)
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.chars.next()?;
        if c == '\n' {
            self.line += 1;
            self.character = 0;
        } else {
            self.character += c.len_utf16() as u32;
        }
        Some(c)
    }

    /// Read a string literal; the cursor sits on the opening quote
    fn string(&mut self) -> String {
        self.bump();
        let mut raw = String::new();
        while let Some(c) = self.bump() {
            match c {
                '"' => break,
                '\\' => {
                    raw.push(c);
                    if let Some(escaped) = self.bump() {
                        raw.push(escaped);
                    }
                }
                '\n' => break,
                _ => raw.push(c),
            }
        }
        serde_json::from_str::<String>(&format!("\"{}\"", raw)).unwrap_or(raw)
    }

    /// Skip a number, literal or stray token
    fn scalar(&mut self) {
        while let Some(c) = self.peek() {
            if c.is_whitespace() || matches!(c, '{' | '}' | '[' | ']' | ',' | ':' | '"') {
                break;
            }
            self.bump();
        }
    }
}

impl KeyIndex {
    pub fn build(content: &str) -> Self {
        let mut index = KeyIndex::default();
        let mut stack: Vec<Frame> = Vec::new();
        let mut cursor = Cursor::new(content);

        while let Some(c) = cursor.peek() {
            let start = cursor.position();
            match c {
                '{' | '[' => {
                    cursor.bump();
                    let path = value_path(&stack);
                    let kind = if c == '{' {
                        ContainerKind::Object
                    } else {
                        ContainerKind::Array
                    };
                    let container = index.containers.len();
                    index.containers.push(Container {
                        path: path.clone(),
                        kind,
                        range: Range::new(start, start),
                    });
                    stack.push(match kind {
                        ContainerKind::Object => Frame::Object {
                            path,
                            key: None,
                            in_value: false,
                            container,
                        },
                        ContainerKind::Array => Frame::Array {
                            path,
                            index: 0,
                            container,
                        },
                    });
                }
                '}' | ']' => {
                    cursor.bump();
                    if let Some(frame) = stack.pop() {
                        index.containers[frame.container()].range.end = cursor.position();
                    }
                }
                ',' => {
                    cursor.bump();
                    match stack.last_mut() {
                        Some(Frame::Object { key, in_value, .. }) => {
                            *key = None;
                            *in_value = false;
                        }
                        Some(Frame::Array { index, .. }) => *index += 1,
                        None => {}
                    }
                }
                ':' => {
                    cursor.bump();
                    if let Some(Frame::Object { in_value, .. }) = stack.last_mut() {
                        *in_value = true;
                    }
                }
                '"' => {
                    let text = cursor.string();
                    match stack.last_mut() {
                        Some(Frame::Object {
                            path,
                            key,
                            in_value: false,
                            ..
                        }) => {
                            let field_path = join_path(path, &text);
                            index.by_path.entry(field_path.clone()).or_insert(index.keys.len());
                            index.keys.push(KeySpan {
                                path: field_path,
                                key: text.clone(),
                                range: Range::new(start, cursor.position()),
                            });
                            *key = Some(text);
                        }
                        Some(Frame::Object {
                            path,
                            key: Some(key),
                            in_value: true,
                            ..
                        }) => {
                            index.strings.entry(join_path(path, key)).or_insert(text);
                        }
                        _ => {}
                    }
                }
                c if c.is_whitespace() => {
                    cursor.bump();
                }
                _ => cursor.scalar(),
            }
        }

        // Unclosed containers run to the end of the document
        let end = cursor.position();
        for frame in stack {
            index.containers[frame.container()].range.end = end;
        }

        index
    }

    pub fn keys(&self) -> &[KeySpan] {
        &self.keys
    }

    /// Range of the key written for a path
    pub fn key_range(&self, path: &str) -> Option<Range> {
        self.by_path.get(path).map(|&i| self.keys[i].range)
    }

    /// String value written for a path, first occurrence wins
    pub fn string_value(&self, path: &str) -> Option<&str> {
        self.strings.get(path).map(String::as_str)
    }

    /// Opening bracket of the container value at a path
    pub fn container_start(&self, path: &str) -> Option<Range> {
        self.containers.iter().find(|c| c.path == path).map(|c| {
            let start = c.range.start;
            Range::new(start, Position::new(start.line, start.character + 1))
        })
    }

    /// Where to show an error for a path.
    ///
    /// A written key is used directly; a field that is not written points
    /// at the opening brace of its enclosing object. Falls back to the start
    /// of the document.
    pub fn locate(&self, path: &str) -> Range {
        if let Some(range) = self.key_range(path) {
            return range;
        }

        let mut current = parent_path(path);
        while let Some(candidate) = current {
            if let Some(range) = self.container_start(candidate) {
                return range;
            }
            current = parent_path(candidate);
        }

        if path.is_empty() {
            if let Some(range) = self.container_start("") {
                return range;
            }
        }

        Range::default()
    }

    /// Path of the key under a position
    pub fn path_at(&self, position: Position) -> Option<&str> {
        self.keys
            .iter()
            .find(|k| contains(k.range, position))
            .map(|k| k.path.as_str())
    }

    /// Innermost object enclosing a position
    pub fn object_at(&self, position: Position) -> Option<&Container> {
        self.containers
            .iter()
            .filter(|c| c.kind == ContainerKind::Object && contains(c.range, position))
            .max_by_key(|c| (c.range.start.line, c.range.start.character))
    }

    /// Keys written directly inside the object at `path`
    pub fn keys_in<'a>(&'a self, path: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.keys
            .iter()
            .filter(move |k| parent_path(&k.path) == Some(path))
            .map(|k| k.key.as_str())
    }
}

/// Path of the value about to be read at the top of the stack
fn value_path(stack: &[Frame]) -> String {
    match stack.last() {
        Some(Frame::Object {
            path, key: Some(key), ..
        }) => join_path(path, key),
        Some(Frame::Object { path, .. }) => path.clone(),
        Some(Frame::Array { path, index, .. }) => join_path(path, &index.to_string()),
        None => String::new(),
    }
}

fn contains(range: Range, position: Position) -> bool {
    let at = (position.line, position.character);
    (range.start.line, range.start.character) <= at && at < (range.end.line, range.end.character)
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r#"{
  "$shape": "invoice",
  "supplierName": "مؤسسة النور",
  "items": [
    { "description": "ورق", "quantity": 0 },
    { "description": "حبر" }
  ],
  "guarantor": {}
}"#;

    #[test]
    fn test_key_ranges_by_path() {
        let index = KeyIndex::build(DOC);

        assert_eq!(
            index.key_range("supplierName"),
            Some(Range::new(Position::new(2, 2), Position::new(2, 16)))
        );
        assert!(index.key_range("items.0.quantity").is_some());
        assert!(index.key_range("items.1.description").is_some());
        assert!(index.key_range("description").is_none());
    }

    #[test]
    fn test_utf16_columns_after_arabic_text() {
        let index = KeyIndex::build("{ \"name\": \"سالم\", \"age\": 3 }");
        let age = index.key_range("age").unwrap();
        // 4 Arabic letters are 4 UTF-16 units
        assert_eq!(age.start, Position::new(0, 18));
    }

    #[test]
    fn test_missing_field_points_at_enclosing_object() {
        let index = KeyIndex::build(DOC);

        let missing_nested = index.locate("items.1.quantity");
        assert_eq!(missing_nested.start, Position::new(5, 4));

        let missing_top = index.locate("invoiceDate");
        assert_eq!(missing_top, Range::new(Position::new(0, 0), Position::new(0, 1)));

        assert_eq!(index.locate("guarantor.name").start, Position::new(7, 15));
    }

    #[test]
    fn test_root_error_and_empty_document() {
        assert_eq!(KeyIndex::build("").locate(""), Range::default());
        assert_eq!(KeyIndex::build("[1, 2]").locate("title").start, Position::new(0, 0));
        assert_eq!(KeyIndex::build("  {}").locate("").start, Position::new(0, 2));
    }

    #[test]
    fn test_path_at_and_object_at() {
        let index = KeyIndex::build(DOC);

        assert_eq!(index.path_at(Position::new(4, 30)), Some("items.0.quantity"));
        assert_eq!(index.path_at(Position::new(2, 20)), None);

        let object = index.object_at(Position::new(5, 10)).unwrap();
        assert_eq!(object.path, "items.1");
        assert_eq!(index.object_at(Position::new(1, 0)).unwrap().path, "");

        let written: Vec<&str> = index.keys_in("items.0").collect();
        assert_eq!(written, vec!["description", "quantity"]);
    }

    #[test]
    fn test_unterminated_document_is_tolerated() {
        let index = KeyIndex::build("{\n  \"title\": \"عقد\",\n  \"amo");
        assert!(index.key_range("title").is_some());
        assert_eq!(index.object_at(Position::new(2, 3)).unwrap().path, "");
    }

    #[test]
    fn test_string_values_by_path() {
        let index = KeyIndex::build(DOC);
        assert_eq!(index.string_value("$shape"), Some("invoice"));
        assert_eq!(index.string_value("items.1.description"), Some("حبر"));
        assert_eq!(index.string_value("items.0.quantity"), None);

        let half_typed = KeyIndex::build("{\n  \"$shape\": \"contract.v2\",\n  \"title\": ");
        assert_eq!(half_typed.string_value("$shape"), Some("contract.v2"));
    }
}
