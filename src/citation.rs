//! Citation formatting for sources a caller has already retrieved.
//!
//! Citations carry only an identifier and caller-supplied fields; they are
//! never given ciphertext and never touch the store.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::error::{Result, VaultError};
use crate::source::SourceId;

/// A request to cite one source in a given style.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    pub source_id: SourceId,
    /// Catalog key of the style, e.g. `"apa"`.
    pub style: String,
    pub context: BTreeMap<String, String>,
    #[serde(default)]
    pub page_number: Option<String>,
    #[serde(default)]
    pub quote: Option<String>,
}

impl Citation {
    /// A citation with no fields set.
    pub fn new(source_id: SourceId, style: impl Into<String>) -> Self {
        Self {
            source_id,
            style: style.into(),
            context: BTreeMap::new(),
            page_number: None,
            quote: None,
        }
    }

    /// Set a template field.
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    pub fn with_page(mut self, page: impl Into<String>) -> Self {
        self.page_number = Some(page.into());
        self
    }

    pub fn with_quote(mut self, quote: impl Into<String>) -> Self {
        self.quote = Some(quote.into());
        self
    }
}

/// Formatting rules for one citation style.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CitationStyle {
    pub name: String,
    /// Text with `{field}` placeholders.
    pub template: String,
    pub required_fields: Vec<String>,
    #[serde(default)]
    pub optional_fields: Vec<String>,
}

impl CitationStyle {
    pub fn new<I, S>(name: impl Into<String>, template: impl Into<String>, required: I, optional: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            template: template.into(),
            required_fields: required.into_iter().map(Into::into).collect(),
            optional_fields: optional.into_iter().map(Into::into).collect(),
        }
    }
}

/// Turns a citation into text according to a style.
pub trait CitationFormatter: Send + Sync {
    fn format(&self, citation: &Citation, style: &CitationStyle) -> Result<String>;
}

/// `{field}` substitution.
///
/// Fields available to the template are the citation's context plus
/// `source_id`, `page` and `quote` when set. A declared optional field that
/// is absent renders as an empty string; any other unknown placeholder is a
/// [`VaultError::MissingField`]. `{{` and `}}` produce literal braces.
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateFormatter;

impl CitationFormatter for TemplateFormatter {
    fn format(&self, citation: &Citation, style: &CitationStyle) -> Result<String> {
        if let Some(missing) = style
            .required_fields
            .iter()
            .find(|field| !citation.context.contains_key(field.as_str()))
        {
            return Err(VaultError::MissingField(missing.clone()));
        }

        let mut fields: BTreeMap<&str, &str> = citation
            .context
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        fields.insert("source_id", citation.source_id.as_str());
        if let Some(page) = &citation.page_number {
            fields.insert("page", page);
        }
        if let Some(quote) = &citation.quote {
            fields.insert("quote", quote);
        }
        let optional: BTreeSet<&str> = style.optional_fields.iter().map(String::as_str).collect();

        render(&style.template, &fields, &optional)
    }
}

fn render(template: &str, fields: &BTreeMap<&str, &str>, optional: &BTreeSet<&str>) -> Result<String> {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '{' => {
                let mut name = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some(ch) => name.push(ch),
                        None => return Err(VaultError::MissingField(format!("unterminated placeholder {{{name}"))),
                    }
                }
                match fields.get(name.as_str()) {
                    Some(value) => out.push_str(value),
                    None if optional.contains(name.as_str()) => {}
                    None => return Err(VaultError::MissingField(name)),
                }
            }
            other => out.push(other),
        }
    }

    Ok(out)
}

/// Registered styles plus the formatter that applies them.
pub struct CitationCatalog {
    formatter: Box<dyn CitationFormatter>,
    styles: BTreeMap<String, CitationStyle>,
}

impl Default for CitationCatalog {
    fn default() -> Self {
        Self::new(TemplateFormatter)
    }
}

impl CitationCatalog {
    /// A catalog with the built-in `apa` and `journalism` styles.
    pub fn new(formatter: impl CitationFormatter + 'static) -> Self {
        let mut catalog = Self {
            formatter: Box::new(formatter),
            styles: BTreeMap::new(),
        };
        catalog.register(
            "apa",
            CitationStyle::new(
                "APA",
                "{authors} ({year}). {title}. {publisher}.",
                vec!["authors", "year", "title"],
                vec!["publisher", "doi"],
            ),
        );
        catalog.register(
            "journalism",
            CitationStyle::new(
                "Journalism",
                "\"{quote}\" ({source}, {date})",
                vec!["source", "date"],
                vec!["quote"],
            ),
        );
        catalog
    }

    /// Add or replace a style under `key`.
    pub fn register(&mut self, key: impl Into<String>, style: CitationStyle) {
        self.styles.insert(key.into(), style);
    }

    pub fn style(&self, key: &str) -> Option<&CitationStyle> {
        self.styles.get(key)
    }

    /// Format `citation` in its named style.
    pub fn format(&self, citation: &Citation) -> Result<String> {
        let style = self
            .styles
            .get(&citation.style)
            .ok_or_else(|| VaultError::UnknownStyle(citation.style.clone()))?;
        self.formatter.format(citation, style)
    }

    /// Boundary form: cite `source_id` in `style` using `fields`.
    pub fn format_fields(&self, source_id: &SourceId, style: &str, fields: &BTreeMap<String, String>) -> Result<String> {
        let citation = Citation {
            source_id: source_id.clone(),
            style: style.to_string(),
            context: fields.clone(),
            page_number: None,
            quote: None,
        };
        self.format(&citation)
    }

    /// Whether the style exists and every required field is present.
    pub fn validate(&self, citation: &Citation) -> bool {
        self.styles.get(&citation.style).is_some_and(|style| {
            style
                .required_fields
                .iter()
                .all(|field| citation.context.contains_key(field.as_str()))
        })
    }
}
