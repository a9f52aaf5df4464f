//! slskd options document: decode the API payload and rewrite `soulseek.listen_port`.

use crate::domain::GlueforwardError;
use serde_yaml::{Mapping, Value};
use tracing::debug;

const SECTION: &str = "soulseek";
const LISTEN_PORT: &str = "listen_port";

/// Extract YAML text from a `GET /api/v0/options/yaml` body.
///
/// slskd answers with a JSON string, a JSON object carrying a `yaml` field, or
/// (older versions) the raw document.
pub fn extract_yaml(body: &str) -> String {
    match serde_json::from_str::<serde_json::Value>(body) {
        Ok(serde_json::Value::String(yaml)) => yaml,
        Ok(serde_json::Value::Object(map)) => map
            .get("yaml")
            .and_then(serde_json::Value::as_str)
            .unwrap_or_default()
            .to_string(),
        _ => body.to_string(),
    }
}

/// Set `soulseek.listen_port` to `port`, creating the section if needed.
/// Every other key keeps its value and position.
///
/// The text is edited in place so comments and layout survive. The edit is
/// checked against a parsed update of the same document; when they disagree the
/// parsed update is serialized instead.
pub fn set_listen_port(yaml: &str, port: u32) -> Result<String, GlueforwardError> {
    let expected = with_listen_port(parse(yaml)?, port)?;

    let edited = edit_in_place(yaml, port)
        .filter(|text| parse(text).is_ok_and(|doc| doc == expected));
    if let Some(edited) = edited {
        return Ok(edited);
    }

    debug!("options document not editable in place; rewriting it");
    serde_yaml::to_string(&expected).map_err(|e| GlueforwardError::ConfigDocument {
        reason: format!("serialize: {}", e),
    })
}

fn parse(yaml: &str) -> Result<Value, GlueforwardError> {
    if yaml.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_yaml::from_str(yaml).map_err(|e| GlueforwardError::ConfigDocument {
        reason: format!("parse: {}", e),
    })
}

fn with_listen_port(mut doc: Value, port: u32) -> Result<Value, GlueforwardError> {
    if doc.is_null() {
        doc = Value::Mapping(Mapping::new());
    }

    let root = doc
        .as_mapping_mut()
        .ok_or_else(|| GlueforwardError::ConfigDocument {
            reason: "document root is not a mapping".to_string(),
        })?;
    if !root.get(SECTION).is_some_and(Value::is_mapping) {
        root.insert(Value::from(SECTION), Value::Mapping(Mapping::new()));
    }
    let section = root
        .get_mut(SECTION)
        .and_then(Value::as_mapping_mut)
        .ok_or_else(|| GlueforwardError::ConfigDocument {
            reason: format!("'{}' is not a mapping", SECTION),
        })?;
    section.insert(Value::from(LISTEN_PORT), Value::Number(port.into()));
    Ok(doc)
}

/// Rewrite only the lines that carry `soulseek` / `listen_port`.
/// `None` when the layout is not plain block style.
fn edit_in_place(yaml: &str, port: u32) -> Option<String> {
    let lines: Vec<&str> = yaml.split_inclusive('\n').collect();

    let Some(header) = lines
        .iter()
        .position(|l| is_top_level(l) && key_of(l) == Some(SECTION))
    else {
        let mut out = yaml.to_string();
        if !out.is_empty() && !out.ends_with('\n') {
            out.push('\n');
        }
        out.push_str(&format!("{SECTION}:\n  {LISTEN_PORT}: {port}\n"));
        return Some(out);
    };

    let end = lines[header + 1..]
        .iter()
        .position(|l| is_top_level(l))
        .map_or(lines.len(), |i| header + 1 + i);
    let body = &lines[header + 1..end];
    let mut out: Vec<String> = lines.iter().map(|l| l.to_string()).collect();

    match body.iter().find(|l| is_content(l)) {
        Some(first) => {
            let indent = indentation(first);
            let existing = body
                .iter()
                .position(|l| indentation(l) == indent && key_of(l) == Some(LISTEN_PORT));
            match existing {
                Some(i) => out[header + 1 + i] = replace_value(body[i], port)?,
                None => {
                    let at = header + 1 + body.iter().rposition(|l| is_content(l))?;
                    if !out[at].ends_with('\n') {
                        out[at].push('\n');
                    }
                    out.insert(
                        at + 1,
                        format!("{}{LISTEN_PORT}: {port}\n", " ".repeat(indent)),
                    );
                }
            }
        }
        None => {
            // Null or inline scalar section: becomes a block mapping.
            let (_, rest) = line_content(lines[header]).split_once(':')?;
            out[header] = format!("{SECTION}:{}\n", trailing_comment(rest));
            out.insert(header + 1, format!("  {LISTEN_PORT}: {port}\n"));
        }
    }
    Some(out.concat())
}

/// `key: value  # comment` -> `key: port  # comment`, keeping the line ending.
fn replace_value(line: &str, port: u32) -> Option<String> {
    let content = line_content(line);
    let eol = &line[content.len()..];
    let (head, rest) = content.split_once(':')?;
    Some(format!("{head}: {port}{}{eol}", trailing_comment(rest)))
}

/// Comment after a value, with the whitespace that separated them.
fn trailing_comment(rest: &str) -> &str {
    match rest.find(" #") {
        Some(i) => &rest[rest[..i].trim_end().len()..],
        None => "",
    }
}

fn line_content(line: &str) -> &str {
    line.trim_end_matches(['\r', '\n'])
}

fn indentation(line: &str) -> usize {
    line.len() - line.trim_start_matches(' ').len()
}

fn is_content(line: &str) -> bool {
    let t = line.trim();
    !t.is_empty() && !t.starts_with('#')
}

fn is_top_level(line: &str) -> bool {
    is_content(line) && indentation(line) == 0
}

/// Key of a `key:` / `key: value` line.
fn key_of(line: &str) -> Option<&str> {
    let (key, rest) = line.trim().split_once(':')?;
    (rest.is_empty() || rest.starts_with([' ', '\t'])).then_some(key)
}
