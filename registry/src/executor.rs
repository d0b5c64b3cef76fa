use serde_json::map::Entry;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::document::IndicatorDocument;
use crate::patch::{Operation, OperationType, Patch};

#[derive(Error, Debug)]
pub enum PatchError {
    #[error("invalid path {path}: {reason}")]
    InvalidPath { path: String, reason: &'static str },
    #[error("{0} operation on {1} requires a value")]
    MissingValue(&'static str, String),
    #[error("nothing found at {0}")]
    NotFound(String),
    #[error("index {index} is out of bounds at {path}")]
    IndexOutOfBounds { path: String, index: usize },
    #[error("expected {expected} at {path}")]
    UnexpectedType {
        path: String,
        expected: &'static str,
    },
    #[error("test failed at {0}")]
    TestFailed(String),
    #[error("failed to encode document: {0}")]
    Encoding(#[source] serde_json::Error),
    #[error("patched document is not valid: {0}")]
    InvalidResult(#[source] serde_json::Error),
}

/// Applies the operations of a single patch to a document.
pub trait PatchExecutor {
    fn apply(
        &self,
        document: &IndicatorDocument,
        patch: &Patch,
    ) -> Result<IndicatorDocument, PatchError>;
}

/// Executes operations against the JSON form of a document.
///
/// Paths are `/` separated, the leading `/` is optional. A segment is one of
///   - a map key (`spec`, `thresholds`)
///   - an array index (`0`)
///   - `-`, the position after the last array element
///   - `key=value`, the array element whose `key` field equals `value`
///
/// and a trailing `?` marks it optional: missing containers along the way are
/// created and a missing target is not an error. `~1` and `~0` escape `/` and `~`.
#[derive(Clone, Copy, Debug, Default)]
pub struct PathOpsExecutor;

impl PatchExecutor for PathOpsExecutor {
    fn apply(
        &self,
        document: &IndicatorDocument,
        patch: &Patch,
    ) -> Result<IndicatorDocument, PatchError> {
        let mut value = serde_json::to_value(document).map_err(PatchError::Encoding)?;

        for operation in &patch.operations {
            apply_operation(&mut value, operation)?;
        }

        serde_json::from_value(value).map_err(PatchError::InvalidResult)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum Step {
    Key,
    Index(usize),
    Append,
    Matching { key: String, value: String },
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct Token {
    step: Step,
    // Unescaped segment text, used as the key whenever the container is a map.
    raw: String,
    optional: bool,
}

fn parse_path(path: &str) -> Result<Vec<Token>, PatchError> {
    let trimmed = path.strip_prefix('/').unwrap_or(path);
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }

    trimmed
        .split('/')
        .map(|segment| parse_token(path, segment))
        .collect()
}

fn parse_token(path: &str, segment: &str) -> Result<Token, PatchError> {
    let (segment, optional) = match segment.strip_suffix('?') {
        Some(stripped) => (stripped, true),
        None => (segment, false),
    };
    let raw = segment.replace("~1", "/").replace("~0", "~");

    if raw.is_empty() {
        return Err(PatchError::InvalidPath {
            path: path.to_string(),
            reason: "empty segment",
        });
    }

    let step = if raw == "-" {
        Step::Append
    } else if let Ok(index) = raw.parse::<usize>() {
        Step::Index(index)
    } else if let Some((key, value)) = raw.split_once('=') {
        Step::Matching {
            key: key.to_string(),
            value: value.to_string(),
        }
    } else {
        Step::Key
    };

    Ok(Token {
        step,
        raw,
        optional,
    })
}

fn apply_operation(root: &mut Value, operation: &Operation) -> Result<(), PatchError> {
    let path = operation.path.as_str();
    let tokens = parse_path(path)?;

    match operation.op_type {
        OperationType::Test => {
            let expected = required_value(operation, "test")?;
            let actual = lookup(root, &tokens, path)?;
            match actual == expected {
                true => Ok(()),
                false => Err(PatchError::TestFailed(path.to_string())),
            }
        }
        OperationType::Remove => {
            let Some((last, parents)) = tokens.split_last() else {
                return Err(PatchError::InvalidPath {
                    path: path.to_string(),
                    reason: "cannot remove the document root",
                });
            };
            let parent = descend(root, parents, path, false)?;
            remove(parent, last, path)
        }
        OperationType::Replace | OperationType::Add => {
            let insert = operation.op_type == OperationType::Add;
            let name = if insert { "add" } else { "replace" };
            let value = required_value(operation, name)?.clone();

            match tokens.split_last() {
                None => {
                    *root = value;
                    Ok(())
                }
                Some((last, parents)) => {
                    let parent = descend(root, parents, path, true)?;
                    set(parent, last, value, insert, path)
                }
            }
        }
    }
}

fn required_value<'a>(
    operation: &'a Operation,
    name: &'static str,
) -> Result<&'a Value, PatchError> {
    operation
        .value
        .as_ref()
        .ok_or_else(|| PatchError::MissingValue(name, operation.path.clone()))
}

fn element_matches(element: &Value, key: &str, wanted: &str) -> bool {
    match element.get(key) {
        Some(Value::String(actual)) => actual == wanted,
        Some(other) => other.to_string() == wanted,
        None => false,
    }
}

fn empty_container(next: Option<&Token>) -> Value {
    match next.map(|token| &token.step) {
        Some(Step::Index(_) | Step::Append | Step::Matching { .. }) => Value::Array(Vec::new()),
        _ => Value::Object(Map::new()),
    }
}

fn descend<'a>(
    current: &'a mut Value,
    tokens: &[Token],
    path: &str,
    writing: bool,
) -> Result<&'a mut Value, PatchError> {
    let Some((token, rest)) = tokens.split_first() else {
        return Ok(current);
    };
    let next = child(current, token, rest.first(), path, writing)?;
    descend(next, rest, path, writing)
}

fn child<'a>(
    current: &'a mut Value,
    token: &Token,
    next: Option<&Token>,
    path: &str,
    writing: bool,
) -> Result<&'a mut Value, PatchError> {
    let creatable = writing && token.optional;
    let not_found = || PatchError::NotFound(path.to_string());

    match current {
        Value::Object(map) => match map.entry(token.raw.clone()) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) if creatable => Ok(entry.insert(empty_container(next))),
            Entry::Vacant(_) => Err(not_found()),
        },
        Value::Array(items) => match &token.step {
            Step::Index(index) => {
                let index = *index;
                items
                    .get_mut(index)
                    .ok_or_else(|| PatchError::IndexOutOfBounds {
                        path: path.to_string(),
                        index,
                    })
            }
            Step::Append if writing => {
                items.push(empty_container(next));
                items.last_mut().ok_or_else(not_found)
            }
            Step::Append => Err(PatchError::InvalidPath {
                path: path.to_string(),
                reason: "- can only be used when writing",
            }),
            Step::Matching { key, value } => {
                match items.iter().position(|item| element_matches(item, key, value)) {
                    Some(index) => Ok(&mut items[index]),
                    None if creatable => {
                        let mut element = Map::new();
                        element.insert(key.clone(), Value::String(value.clone()));
                        items.push(Value::Object(element));
                        items.last_mut().ok_or_else(not_found)
                    }
                    None => Err(not_found()),
                }
            }
            Step::Key => Err(PatchError::UnexpectedType {
                path: path.to_string(),
                expected: "array index",
            }),
        },
        _ => Err(PatchError::UnexpectedType {
            path: path.to_string(),
            expected: "map or array",
        }),
    }
}

fn lookup<'a>(current: &'a Value, tokens: &[Token], path: &str) -> Result<&'a Value, PatchError> {
    let not_found = || PatchError::NotFound(path.to_string());
    let Some((token, rest)) = tokens.split_first() else {
        return Ok(current);
    };

    let next = match (current, &token.step) {
        (Value::Object(map), _) => map.get(&token.raw).ok_or_else(not_found)?,
        (Value::Array(items), Step::Index(index)) => {
            items
                .get(*index)
                .ok_or_else(|| PatchError::IndexOutOfBounds {
                    path: path.to_string(),
                    index: *index,
                })?
        }
        (Value::Array(items), Step::Matching { key, value }) => items
            .iter()
            .find(|item| element_matches(item, key, value))
            .ok_or_else(not_found)?,
        _ => return Err(not_found()),
    };

    lookup(next, rest, path)
}

fn set(
    parent: &mut Value,
    last: &Token,
    value: Value,
    insert: bool,
    path: &str,
) -> Result<(), PatchError> {
    let out_of_bounds = |index| PatchError::IndexOutOfBounds {
        path: path.to_string(),
        index,
    };

    match parent {
        Value::Object(map) => {
            if !insert && !last.optional && !map.contains_key(&last.raw) {
                return Err(PatchError::NotFound(path.to_string()));
            }
            map.insert(last.raw.clone(), value);
            Ok(())
        }
        Value::Array(items) => match &last.step {
            Step::Index(index) if insert => {
                if *index > items.len() {
                    return Err(out_of_bounds(*index));
                }
                items.insert(*index, value);
                Ok(())
            }
            Step::Index(index) => {
                let slot = items.get_mut(*index).ok_or_else(|| out_of_bounds(*index))?;
                *slot = value;
                Ok(())
            }
            Step::Append => {
                items.push(value);
                Ok(())
            }
            Step::Matching { key, value: wanted } => {
                match items.iter().position(|item| element_matches(item, key, wanted)) {
                    Some(index) => {
                        items[index] = value;
                        Ok(())
                    }
                    None if insert || last.optional => {
                        items.push(value);
                        Ok(())
                    }
                    None => Err(PatchError::NotFound(path.to_string())),
                }
            }
            Step::Key => Err(PatchError::UnexpectedType {
                path: path.to_string(),
                expected: "array index",
            }),
        },
        _ => Err(PatchError::UnexpectedType {
            path: path.to_string(),
            expected: "map or array",
        }),
    }
}

fn remove(parent: &mut Value, last: &Token, path: &str) -> Result<(), PatchError> {
    let missing = |error: PatchError| match last.optional {
        true => Ok(()),
        false => Err(error),
    };

    match parent {
        Value::Object(map) => match map.remove(&last.raw) {
            Some(_) => Ok(()),
            None => missing(PatchError::NotFound(path.to_string())),
        },
        Value::Array(items) => match &last.step {
            Step::Index(index) if *index < items.len() => {
                items.remove(*index);
                Ok(())
            }
            Step::Index(index) => missing(PatchError::IndexOutOfBounds {
                path: path.to_string(),
                index: *index,
            }),
            Step::Matching { key, value } => {
                match items.iter().position(|item| element_matches(item, key, value)) {
                    Some(index) => {
                        items.remove(index);
                        Ok(())
                    }
                    None => missing(PatchError::NotFound(path.to_string())),
                }
            }
            Step::Append => Err(PatchError::InvalidPath {
                path: path.to_string(),
                reason: "- can only be used when writing",
            }),
            Step::Key => Err(PatchError::UnexpectedType {
                path: path.to_string(),
                expected: "array index",
            }),
        },
        _ => Err(PatchError::UnexpectedType {
            path: path.to_string(),
            expected: "map or array",
        }),
    }
}
