use thiserror::Error;
use tracing::warn;

use crate::models::DocumentView;
use crate::paths::{DocumentPath, ARCHIVE_EXTENSION};

pub const NONE_VALUE: &str = "none";

const PREFERRED_EXTENSIONS: &[(&str, &str)] = &[
    ("application/pdf", "pdf"),
    ("image/jpeg", "jpg"),
    ("image/png", "png"),
    ("image/tiff", "tiff"),
    ("image/gif", "gif"),
    ("text/plain", "txt"),
    ("text/csv", "csv"),
    ("application/vnd.oasis.opendocument.text", "odt"),
];

/// The configured filename template. A blank template means plain numeric naming.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NamingConfig {
    template: Option<String>,
}

impl NamingConfig {
    pub fn new(template: Option<String>) -> Self {
        Self {
            template: template.filter(|value| !value.trim().is_empty()),
        }
    }

    pub fn numeric() -> Self {
        Self::default()
    }

    pub fn template(&self) -> Option<&str> {
        self.template.as_deref()
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TemplateError {
    #[error("unclosed placeholder starting at offset {0}")]
    UnclosedPlaceholder(usize),
    #[error("single '}}' encountered at offset {0}")]
    StrayClosingBrace(usize),
    #[error("unexpected '{{' inside placeholder at offset {0}")]
    NestedPlaceholder(usize),
    #[error("empty placeholder at offset {0}")]
    EmptyPlaceholder(usize),
    #[error("unknown field '{0}'")]
    UnknownField(String),
    #[error("unsupported field access '{0}'")]
    UnsupportedAccess(String),
}

#[derive(Debug, PartialEq, Eq)]
enum Segment<'a> {
    Literal(String),
    Field(Placeholder<'a>),
}

#[derive(Debug, PartialEq, Eq)]
struct Placeholder<'a> {
    raw: &'a str,
    name: &'a str,
    key: Option<&'a str>,
}

/// Canonical location for `document` under `naming`. Never fails: a missing or broken
/// template yields the numeric default.
pub fn resolve(document: &DocumentView, naming: &NamingConfig) -> DocumentPath {
    let rendered = naming
        .template()
        .and_then(|template| match evaluate(document, template) {
            Ok(path) => Some(path),
            Err(err) => {
                warn!(
                    document_id = document.id,
                    template,
                    error = %err,
                    "invalid filename template; falling back to default naming"
                );
                None
            }
        })
        .filter(|path| !path.is_empty());

    match rendered {
        Some(path) => DocumentPath::new(
            format!("{path}-{:07}", document.id),
            default_extension(&document.mime_type),
            document.storage_type.is_encrypted(),
        ),
        None => fallback_path(document),
    }
}

pub fn fallback_path(document: &DocumentView) -> DocumentPath {
    DocumentPath::new(
        format!("{:07}", document.id),
        default_extension(&document.mime_type),
        document.storage_type.is_encrypted(),
    )
}

/// Renders `template` for `document` into a sanitized relative path without id or
/// extension. An empty string means the template produced nothing usable.
pub fn evaluate(document: &DocumentView, template: &str) -> Result<String, TemplateError> {
    let mut rendered = String::with_capacity(template.len());
    for segment in parse(template)? {
        match segment {
            Segment::Literal(text) => rendered.push_str(&text),
            Segment::Field(placeholder) => rendered.push_str(&render_field(document, &placeholder)?),
        }
    }
    Ok(finish_path(&rendered))
}

fn parse(template: &str) -> Result<Vec<Segment<'_>>, TemplateError> {
    let mut segments = Vec::new();
    let mut literal = String::new();
    let mut chars = template.char_indices().peekable();

    while let Some((offset, ch)) = chars.next() {
        match ch {
            '{' => {
                if matches!(chars.peek(), Some((_, '{'))) {
                    chars.next();
                    literal.push('{');
                    continue;
                }

                let mut end = None;
                for (inner_offset, inner) in chars.by_ref() {
                    match inner {
                        '}' => {
                            end = Some(inner_offset);
                            break;
                        }
                        '{' => return Err(TemplateError::NestedPlaceholder(inner_offset)),
                        _ => {}
                    }
                }
                let end = end.ok_or(TemplateError::UnclosedPlaceholder(offset))?;

                if !literal.is_empty() {
                    segments.push(Segment::Literal(std::mem::take(&mut literal)));
                }
                segments.push(Segment::Field(parse_placeholder(
                    &template[offset + 1..end],
                    offset,
                )?));
            }
            '}' => {
                if matches!(chars.peek(), Some((_, '}'))) {
                    chars.next();
                    literal.push('}');
                    continue;
                }
                return Err(TemplateError::StrayClosingBrace(offset));
            }
            _ => literal.push(ch),
        }
    }

    if !literal.is_empty() {
        segments.push(Segment::Literal(literal));
    }
    Ok(segments)
}

fn parse_placeholder(raw: &str, offset: usize) -> Result<Placeholder<'_>, TemplateError> {
    if raw.is_empty() {
        return Err(TemplateError::EmptyPlaceholder(offset));
    }

    let (name, key) = match raw.find('[') {
        Some(open) => {
            let rest = &raw[open + 1..];
            let key = rest
                .strip_suffix(']')
                .filter(|key| !key.is_empty() && !key.contains(['[', ']']))
                .ok_or_else(|| TemplateError::UnsupportedAccess(raw.to_string()))?;
            (&raw[..open], Some(key))
        }
        None => (raw, None),
    };

    if name.contains(['.', ':', '!']) {
        return Err(TemplateError::UnsupportedAccess(raw.to_string()));
    }
    if name.is_empty() || !name.chars().all(|ch| ch.is_ascii_alphanumeric() || ch == '_') {
        return Err(TemplateError::UnknownField(raw.to_string()));
    }

    Ok(Placeholder { raw, name, key })
}

fn render_field(document: &DocumentView, placeholder: &Placeholder<'_>) -> Result<String, TemplateError> {
    let value = match (placeholder.name, placeholder.key) {
        ("tags", Some(key)) => tag_value(document, key),
        (_, Some(_)) => return Err(TemplateError::UnsupportedAccess(placeholder.raw.to_string())),
        ("correspondent", None) => slug_or_none(document.correspondent.as_ref().map(|c| c.name.as_str())),
        ("document_type", None) => {
            slug_or_none(document.document_type.as_ref().map(|t| t.name.as_str()))
        }
        ("title", None) => document
            .title
            .as_deref()
            .map(sanitize_component)
            .filter(|title| !title.is_empty())
            .unwrap_or_else(|| NONE_VALUE.to_string()),
        ("created", None) => document.created.format("%Y-%m-%d").to_string(),
        ("created_year", None) => document.created.format("%Y").to_string(),
        ("created_month", None) => document.created.format("%m").to_string(),
        ("created_day", None) => document.created.format("%d").to_string(),
        ("added", None) => document.added.format("%Y-%m-%d").to_string(),
        ("added_year", None) => document.added.format("%Y").to_string(),
        ("added_month", None) => document.added.format("%m").to_string(),
        ("added_day", None) => document.added.format("%d").to_string(),
        ("tags" | "tag_list", None) => tag_list(document),
        _ => return Err(TemplateError::UnknownField(placeholder.raw.to_string())),
    };
    Ok(value)
}

/// `tags[2]` picks by position; `tags[type]` looks for a tag named `type_<value>` or
/// `type-<value>`.
fn tag_value(document: &DocumentView, key: &str) -> String {
    if key.chars().all(|ch| ch.is_ascii_digit()) {
        return key
            .parse::<usize>()
            .ok()
            .and_then(|index| document.tags.get(index))
            .map(|tag| slug_or_none(Some(&tag.name)))
            .unwrap_or_else(|| NONE_VALUE.to_string());
    }

    if !key.chars().all(|ch| ch.is_alphanumeric() || ch == '_' || ch == '-') {
        return NONE_VALUE.to_string();
    }

    document
        .tags
        .iter()
        .filter_map(|tag| split_tag_name(&tag.name))
        .find(|(prefix, _)| slugify(prefix) == key)
        .map(|(_, value)| slug_or_none(Some(value)))
        .unwrap_or_else(|| NONE_VALUE.to_string())
}

fn split_tag_name(name: &str) -> Option<(&str, &str)> {
    name.split_once('_').or_else(|| name.split_once('-'))
}

fn tag_list(document: &DocumentView) -> String {
    let mut names: Vec<&str> = document.tags.iter().map(|tag| tag.name.as_str()).collect();
    names.sort_unstable();
    let joined = sanitize_component(&names.join(","));
    if joined.is_empty() {
        NONE_VALUE.to_string()
    } else {
        joined
    }
}

fn slug_or_none(value: Option<&str>) -> String {
    value
        .map(slugify)
        .filter(|slug| !slug.is_empty())
        .unwrap_or_else(|| NONE_VALUE.to_string())
}

/// Lower-cased, with runs of whitespace and dashes collapsed to a single `-` and anything
/// that is not a word character dropped.
pub fn slugify(value: &str) -> String {
    let mut slug = String::with_capacity(value.len());
    let mut pending_dash = false;

    for ch in value.chars().flat_map(char::to_lowercase) {
        if ch == '-' || ch.is_whitespace() {
            pending_dash = true;
        } else if ch.is_alphanumeric() || ch == '_' {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(ch);
        }
    }

    slug.trim_matches('_').to_string()
}

fn is_illegal(ch: char) -> bool {
    ch.is_control() || matches!(ch, '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|')
}

/// Makes `value` safe as a single path component, separators included.
pub fn sanitize_component(value: &str) -> String {
    value
        .chars()
        .map(|ch| if is_illegal(ch) { '-' } else { ch })
        .collect::<String>()
        .trim()
        .to_string()
}

fn finish_path(rendered: &str) -> String {
    let mut segments: Vec<String> = rendered
        .trim()
        .split('/')
        .map(sanitize_component)
        .filter(|segment| !segment.is_empty() && segment != "." && segment != "..")
        .collect();

    if let Some(leaf) = segments.last_mut() {
        *leaf = leaf.to_lowercase();
    }
    segments.join("/")
}

/// Extension used for originals of `mime_type`, without the leading dot.
pub fn default_extension(mime_type: &str) -> String {
    let essence = mime_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    if let Some((_, ext)) = PREFERRED_EXTENSIONS.iter().find(|(mime, _)| *mime == essence) {
        return (*ext).to_string();
    }

    mime_guess::get_mime_extensions_str(&essence)
        .and_then(|extensions| extensions.first())
        .map(|ext| (*ext).to_string())
        .unwrap_or_else(|| "bin".to_string())
}

/// Human-readable name for a document's file outside the storage trees, e.g. in exports.
pub fn public_filename(document: &DocumentView, archive: bool) -> String {
    let mut name = document.created.format("%Y-%m-%d").to_string();
    if let Some(correspondent) = &document.correspondent {
        name.push(' ');
        name.push_str(&correspondent.name);
    }
    if let Some(title) = document.title.as_deref().filter(|t| !t.trim().is_empty()) {
        name.push(' ');
        name.push_str(title);
    }

    let extension = if archive {
        ARCHIVE_EXTENSION.to_string()
    } else {
        default_extension(&document.mime_type)
    };
    format!("{}.{extension}", sanitize_component(&name))
}
