//! Minimal text template engine used for code generation.
//!
//! Supported syntax:
//!
//! - `{{ path.to.value }}` prints a value from the context, with optional
//!   filters: `{{ name | capitalize }}`. Filters are `capitalize`, `upper`,
//!   `lower` and `title`. Missing values print as an empty string.
//! - `{% for item in path %}...{% endfor %}` iterates an array (or the keys
//!   of an object); `{% for key, value in path %}` iterates an object's
//!   entries, or an array's `(index, item)` pairs. Loops nest.
//!
//! A block tag swallows the newline directly after it, so loop tags can sit
//! on lines of their own.

use regex::Regex;
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TemplateError {
    #[error("Malformed tag: '{0}'")]
    MalformedTag(String),

    #[error("Malformed expression: '{0}'")]
    MalformedExpression(String),

    #[error("Unknown filter: '{0}'")]
    UnknownFilter(String),

    #[error("Unterminated tag near: '{0}'")]
    Unterminated(String),

    #[error("Unexpected endfor")]
    UnexpectedEndFor,

    #[error("Unclosed for loop over '{0}'")]
    UnclosedFor(String),

    #[error("Cannot iterate over {kind} '{path}'")]
    NotIterable { path: String, kind: &'static str },

    #[error("Invalid template pattern: {0}")]
    Pattern(#[from] regex::Error),
}

// ---------------------------------------------------------------------------
// Syntax tree
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Filter {
    Capitalize,
    Upper,
    Lower,
    Title,
}

impl Filter {
    fn parse(name: &str) -> Result<Self, TemplateError> {
        match name {
            "capitalize" => Ok(Self::Capitalize),
            "upper" => Ok(Self::Upper),
            "lower" => Ok(Self::Lower),
            "title" => Ok(Self::Title),
            other => Err(TemplateError::UnknownFilter(other.to_owned())),
        }
    }

    fn apply(self, text: &str) -> String {
        match self {
            Self::Upper => text.to_uppercase(),
            Self::Lower => text.to_lowercase(),
            Self::Capitalize => {
                let mut chars = text.chars();
                match chars.next() {
                    Some(first) => first
                        .to_uppercase()
                        .chain(chars.as_str().to_lowercase().chars())
                        .collect(),
                    None => String::new(),
                }
            }
            Self::Title => {
                let mut out = String::with_capacity(text.len());
                let mut word_start = true;
                for c in text.chars() {
                    if word_start {
                        out.extend(c.to_uppercase());
                    } else {
                        out.extend(c.to_lowercase());
                    }
                    word_start = !c.is_alphanumeric();
                }
                out
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Loop {
    first: String,
    second: Option<String>,
    path: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Text(String),
    Print { path: Vec<String>, filters: Vec<Filter> },
    For { header: Loop, body: Vec<Node> },
}

// ---------------------------------------------------------------------------
// TemplateEngine
// ---------------------------------------------------------------------------

/// Parses and renders templates against a JSON context.
#[derive(Debug, Clone)]
pub struct TemplateEngine {
    tags: Regex,
    for_tag: Regex,
    path: Regex,
}

impl TemplateEngine {
    /// # Errors
    ///
    /// Returns `TemplateError::Pattern` if the tag patterns fail to compile.
    pub fn new() -> Result<Self, TemplateError> {
        Ok(Self {
            tags: Regex::new(r"(?s)\{\{(.*?)\}\}|\{%(.*?)%\}\n?")?,
            for_tag: Regex::new(
                r"^for\s+([A-Za-z_]\w*)(?:\s*,\s*([A-Za-z_]\w*))?\s+in\s+(\S+)$",
            )?,
            path: Regex::new(r"^[A-Za-z_]\w*(?:\.\w+)*$")?,
        })
    }

    /// Render `source` with `context` as the root scope.
    ///
    /// # Errors
    ///
    /// Returns a `TemplateError` for malformed syntax, unknown filters, or a
    /// loop over a scalar value.
    pub fn render(&self, source: &str, context: &Value) -> Result<String, TemplateError> {
        let nodes = self.parse(source)?;
        let mut out = String::with_capacity(source.len());
        let mut scopes = Vec::new();
        render_nodes(&nodes, context, &mut scopes, &mut out)?;
        Ok(out)
    }

    fn parse(&self, source: &str) -> Result<Vec<Node>, TemplateError> {
        let mut root = Vec::new();
        let mut open: Vec<(Loop, Vec<Node>)> = Vec::new();
        let mut last = 0;

        for caps in self.tags.captures_iter(source) {
            let Some(whole) = caps.get(0) else { continue };
            let nodes = open.last_mut().map_or(&mut root, |(_, body)| body);
            push_text(nodes, &source[last..whole.start()])?;
            last = whole.end();

            if let Some(expr) = caps.get(1) {
                nodes.push(self.parse_print(expr.as_str())?);
                continue;
            }
            let tag = caps.get(2).map_or("", |m| m.as_str()).trim();
            if tag == "endfor" {
                let (header, body) = open.pop().ok_or(TemplateError::UnexpectedEndFor)?;
                let parent = open.last_mut().map_or(&mut root, |(_, body)| body);
                parent.push(Node::For { header, body });
            } else {
                open.push((self.parse_loop(tag)?, Vec::new()));
            }
        }

        let nodes = open.last_mut().map_or(&mut root, |(_, body)| body);
        push_text(nodes, &source[last..])?;
        if let Some((header, _)) = open.pop() {
            return Err(TemplateError::UnclosedFor(header.path.join(".")));
        }
        Ok(root)
    }

    fn parse_print(&self, expr: &str) -> Result<Node, TemplateError> {
        let mut parts = expr.split('|').map(str::trim);
        let path = parts.next().unwrap_or_default();
        let path = self.parse_path(path, expr)?;
        let filters = parts.map(Filter::parse).collect::<Result<Vec<_>, _>>()?;
        Ok(Node::Print { path, filters })
    }

    fn parse_loop(&self, tag: &str) -> Result<Loop, TemplateError> {
        let caps = self
            .for_tag
            .captures(tag)
            .ok_or_else(|| TemplateError::MalformedTag(tag.to_owned()))?;
        let first = caps.get(1).map_or("", |m| m.as_str()).to_owned();
        let second = caps.get(2).map(|m| m.as_str().to_owned());
        let path = self.parse_path(caps.get(3).map_or("", |m| m.as_str()), tag)?;
        Ok(Loop {
            first,
            second,
            path,
        })
    }

    fn parse_path(&self, path: &str, expr: &str) -> Result<Vec<String>, TemplateError> {
        if !self.path.is_match(path) {
            return Err(TemplateError::MalformedExpression(expr.trim().to_owned()));
        }
        Ok(path.split('.').map(str::to_owned).collect())
    }
}

fn push_text(nodes: &mut Vec<Node>, text: &str) -> Result<(), TemplateError> {
    if let Some(index) = text.find("{{").or_else(|| text.find("{%")) {
        let snippet: String = text[index..].chars().take(20).collect();
        return Err(TemplateError::Unterminated(snippet));
    }
    if !text.is_empty() {
        nodes.push(Node::Text(text.to_owned()));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Rendering
// ---------------------------------------------------------------------------

type Scope = (String, Value);

fn render_nodes(
    nodes: &[Node],
    context: &Value,
    scopes: &mut Vec<Scope>,
    out: &mut String,
) -> Result<(), TemplateError> {
    for node in nodes {
        match node {
            Node::Text(text) => out.push_str(text),
            Node::Print { path, filters } => {
                let mut text = resolve(path, context, scopes).map(display).unwrap_or_default();
                for filter in filters {
                    text = filter.apply(&text);
                }
                out.push_str(&text);
            }
            Node::For { header, body } => {
                let iterable = resolve(&header.path, context, scopes).cloned();
                let (keyed, entries) = iteration(iterable, &header.path)?;
                for (key, item) in entries {
                    match &header.second {
                        None => {
                            let bound = if keyed { key } else { item };
                            scopes.push((header.first.clone(), bound));
                        }
                        Some(second) => {
                            scopes.push((header.first.clone(), key));
                            scopes.push((second.clone(), item));
                        }
                    }
                    let result = render_nodes(body, context, scopes, out);
                    scopes.truncate(scopes.len() - if header.second.is_some() { 2 } else { 1 });
                    result?;
                }
            }
        }
    }
    Ok(())
}

/// Loop entries as `(key, item)`: `(index, item)` for arrays and
/// `(key, value)` for objects. The flag is set for objects, whose single
/// loop variable binds the key rather than the value.
fn iteration(
    value: Option<Value>,
    path: &[String],
) -> Result<(bool, Vec<(Value, Value)>), TemplateError> {
    match value {
        None | Some(Value::Null) => Ok((false, Vec::new())),
        Some(Value::Array(items)) => Ok((
            false,
            items
                .into_iter()
                .enumerate()
                .map(|(index, item)| (Value::from(index), item))
                .collect(),
        )),
        Some(Value::Object(map)) => Ok((
            true,
            map.into_iter()
                .map(|(key, value)| (Value::String(key), value))
                .collect(),
        )),
        Some(other) => Err(TemplateError::NotIterable {
            path: path.join("."),
            kind: match other {
                Value::Bool(_) => "bool",
                Value::Number(_) => "number",
                _ => "string",
            },
        }),
    }
}

fn resolve<'a>(path: &[String], context: &'a Value, scopes: &'a [Scope]) -> Option<&'a Value> {
    let (head, rest) = path.split_first()?;
    let mut current = scopes
        .iter()
        .rev()
        .find(|(name, _)| name == head)
        .map(|(_, value)| value)
        .or_else(|| context.get(head))?;
    for segment in rest {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

fn display(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn render(source: &str, context: &Value) -> Result<String, TemplateError> {
        TemplateEngine::new().unwrap().render(source, context)
    }

    #[test]
    fn prints_values_and_paths() {
        let context = json!({"name": "shop", "pos": [3, 4], "meta": {"count": 2, "flag": true}});
        assert_eq!(
            render(
                "{{ name }} at {{pos.0}},{{ pos.1 }} x{{ meta.count }} {{ meta.flag }}",
                &context
            )
            .unwrap(),
            "shop at 3,4 x2 true"
        );
        assert_eq!(render("[{{ missing.deep }}]", &context).unwrap(), "[]");
        assert_eq!(render("{{ pos }}", &context).unwrap(), "[3,4]");
    }

    #[test]
    fn applies_filters_in_order() {
        let context = json!({"name": "oRDER item"});
        assert_eq!(render("{{ name | capitalize }}", &context).unwrap(), "Order item");
        assert_eq!(render("{{ name | upper }}", &context).unwrap(), "ORDER ITEM");
        assert_eq!(render("{{ name | title }}", &context).unwrap(), "Order Item");
        assert_eq!(render("{{ name | upper | lower }}", &context).unwrap(), "order item");
        assert_eq!(
            render("{{ name | shout }}", &context),
            Err(TemplateError::UnknownFilter("shout".into()))
        );
    }

    #[test]
    fn loops_over_arrays_and_objects() {
        let context = json!({
            "blocks": [
                {"name": "a", "attributes": {"x": 1, "y": "two"}},
                {"name": "b", "attributes": {}}
            ]
        });
        let source = "\
{% for block in blocks %}
{{ block.name }}:
{% for key, value in block.attributes %}
  {{ key }}={{ value }}
{% endfor %}
{% endfor %}
";
        assert_eq!(render(source, &context).unwrap(), "a:\n  x=1\n  y=two\nb:\n");
    }

    #[test]
    fn loop_variants_bind_expected_values() {
        let context = json!({"items": ["p", "q"], "map": {"k1": 1, "k2": 2}});
        assert_eq!(
            render("{% for i, v in items %}{{i}}{{v}} {% endfor %}", &context).unwrap(),
            "0p 1q "
        );
        assert_eq!(render("{% for k in map %}{{k}};{% endfor %}", &context).unwrap(), "k1;k2;");
        assert_eq!(render("{% for k in nothing %}x{% endfor %}done", &context).unwrap(), "done");
        // The loop variable shadows the context and goes away afterwards.
        let context = json!({"items": ["inner"], "item": "outer"});
        assert_eq!(
            render("{% for item in items %}{{item}}{% endfor %}/{{item}}", &context).unwrap(),
            "inner/outer"
        );
    }

    #[test]
    fn rejects_malformed_templates() {
        let context = json!({"n": 1, "items": []});
        assert_eq!(
            render("{% for x in items %}", &context),
            Err(TemplateError::UnclosedFor("items".into()))
        );
        assert_eq!(render("{% endfor %}", &context), Err(TemplateError::UnexpectedEndFor));
        assert_eq!(
            render("{% if n %}", &context),
            Err(TemplateError::MalformedTag("if n".into()))
        );
        assert!(matches!(
            render("{{ 9lives }}", &context),
            Err(TemplateError::MalformedExpression(_))
        ));
        assert!(matches!(render("a {{ n", &context), Err(TemplateError::Unterminated(_))));
        assert_eq!(
            render("{% for x in n %}{% endfor %}", &context),
            Err(TemplateError::NotIterable { path: "n".into(), kind: "number" })
        );
    }
}
