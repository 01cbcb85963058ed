//! Mustache-style templates.
//!
//! Supported tags: `{{name}}` (HTML-escaped), `{{{name}}}` and `{{& name}}`
//! (raw), `{{#name}}..{{/name}}` (section), `{{^name}}..{{/name}}`
//! (inverted section), `{{> partial}}` and `{{! comment}}`. Names may be
//! dotted paths; `.` is the current section item.

use std::collections::HashMap;

use serde_json::Value;

use crate::error::AppError;

/// Nested partials deeper than this are treated as a cycle.
const MAX_PARTIAL_DEPTH: usize = 16;

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Text(String),
    Var { path: String, escape: bool },
    Section { path: String, inverted: bool, children: Vec<Node> },
    Partial(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    nodes: Vec<Node>,
}

struct OpenSection {
    path: String,
    inverted: bool,
    parent: Vec<Node>,
}

impl Template {
    pub fn parse(source: &str) -> Result<Self, AppError> {
        let mut open: Vec<OpenSection> = Vec::new();
        let mut current: Vec<Node> = Vec::new();
        let mut rest = source;

        while let Some(start) = rest.find("{{") {
            if start > 0 {
                current.push(Node::Text(rest[..start].to_string()));
            }
            let after = &rest[start + 2..];

            if let Some(inner) = after.strip_prefix('{') {
                let end = inner
                    .find("}}}")
                    .ok_or_else(|| AppError::Template("unclosed `{{{` tag".to_string()))?;
                current.push(Node::Var {
                    path: tag_name(&inner[..end])?,
                    escape: false,
                });
                rest = &inner[end + 3..];
                continue;
            }

            let end = after
                .find("}}")
                .ok_or_else(|| AppError::Template("unclosed `{{` tag".to_string()))?;
            let tag = after[..end].trim();
            rest = &after[end + 2..];

            match tag.as_bytes().first() {
                Some(b'#') | Some(b'^') => open.push(OpenSection {
                    path: tag_name(&tag[1..])?,
                    inverted: tag.starts_with('^'),
                    parent: std::mem::take(&mut current),
                }),
                Some(b'/') => {
                    let name = tag_name(&tag[1..])?;
                    let Some(section) = open.pop() else {
                        return Err(AppError::Template(format!(
                            "closing tag `{name}` without an open section"
                        )));
                    };
                    if section.path != name {
                        return Err(AppError::Template(format!(
                            "section `{}` closed by `{name}`",
                            section.path
                        )));
                    }
                    let children = std::mem::replace(&mut current, section.parent);
                    current.push(Node::Section {
                        path: section.path,
                        inverted: section.inverted,
                        children,
                    });
                }
                Some(b'>') => current.push(Node::Partial(tag_name(&tag[1..])?)),
                Some(b'!') => {}
                Some(b'&') => current.push(Node::Var {
                    path: tag_name(&tag[1..])?,
                    escape: false,
                }),
                _ => current.push(Node::Var {
                    path: tag_name(tag)?,
                    escape: true,
                }),
            }
        }

        if !rest.is_empty() {
            current.push(Node::Text(rest.to_string()));
        }
        if let Some(section) = open.pop() {
            return Err(AppError::Template(format!(
                "section `{}` is never closed",
                section.path
            )));
        }
        Ok(Self { nodes: current })
    }

    /// Render against `ctx`, resolving `{{> name}}` through `partials`.
    pub fn render(
        &self,
        ctx: &Value,
        partials: &HashMap<String, Template>,
    ) -> Result<String, AppError> {
        let mut out = String::new();
        let mut stack = vec![ctx];
        render_nodes(&self.nodes, &mut stack, partials, 0, &mut out)?;
        Ok(out)
    }
}

fn tag_name(raw: &str) -> Result<String, AppError> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(AppError::Template("empty tag".to_string()));
    }
    Ok(name.to_string())
}

fn render_nodes<'a>(
    nodes: &[Node],
    stack: &mut Vec<&'a Value>,
    partials: &HashMap<String, Template>,
    depth: usize,
    out: &mut String,
) -> Result<(), AppError> {
    for node in nodes {
        match node {
            Node::Text(text) => out.push_str(text),
            Node::Var { path, escape } => {
                let text = lookup(stack, path).map(to_text).unwrap_or_default();
                if *escape {
                    escape_html(&text, out);
                } else {
                    out.push_str(&text);
                }
            }
            Node::Section {
                path,
                inverted,
                children,
            } => {
                let value = lookup(stack, path);
                let truthy = value.is_some_and(is_truthy);
                if *inverted {
                    if !truthy {
                        render_nodes(children, stack, partials, depth, out)?;
                    }
                    continue;
                }
                let Some(value) = value.filter(|v| is_truthy(v)) else {
                    continue;
                };
                let items: Vec<&'a Value> = match value {
                    Value::Array(items) => items.iter().collect(),
                    other => vec![other],
                };
                for item in items {
                    stack.push(item);
                    let rendered = render_nodes(children, stack, partials, depth, out);
                    stack.pop();
                    rendered?;
                }
            }
            Node::Partial(name) => {
                if depth >= MAX_PARTIAL_DEPTH {
                    return Err(AppError::Template(format!(
                        "partial `{name}` nested too deeply"
                    )));
                }
                let partial = partials
                    .get(name)
                    .ok_or_else(|| AppError::Template(format!("unknown partial `{name}`")))?;
                render_nodes(&partial.nodes, stack, partials, depth + 1, out)?;
            }
        }
    }
    Ok(())
}

fn lookup<'a>(stack: &[&'a Value], path: &str) -> Option<&'a Value> {
    if path == "." {
        return stack.last().copied();
    }
    let mut parts = path.split('.');
    let first = parts.next()?;
    let mut value = stack.iter().rev().copied().find_map(|frame| frame.get(first))?;
    for part in parts {
        value = value.get(part)?;
    }
    Some(value)
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Number(_) | Value::Object(_) => true,
    }
}

fn to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null | Value::Array(_) | Value::Object(_) => String::new(),
    }
}

fn escape_html(text: &str, out: &mut String) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn render(source: &str, ctx: Value) -> String {
        Template::parse(source)
            .expect("parse")
            .render(&ctx, &HashMap::new())
            .expect("render")
    }

    #[test]
    fn variables_are_escaped_unless_triple() {
        let ctx = json!({ "name": "<b>Tom & Jerry</b>" });
        assert_eq!(
            render("{{name}}|{{{name}}}|{{& name}}", ctx),
            "&lt;b&gt;Tom &amp; Jerry&lt;/b&gt;|<b>Tom & Jerry</b>|<b>Tom & Jerry</b>"
        );
    }

    #[test]
    fn sections_iterate_and_fall_back_to_outer_scope() {
        let ctx = json!({
            "prefix": "#",
            "books": [{ "title": "Dune" }, { "title": "Emma" }]
        });
        assert_eq!(
            render("{{#books}}{{prefix}}{{title}} {{/books}}", ctx),
            "#Dune #Emma "
        );
    }

    #[test]
    fn inverted_sections_render_for_falsy_values() {
        let tpl = "{{#isAuthenticated}}out{{/isAuthenticated}}{{^isAuthenticated}}in{{/isAuthenticated}}";
        assert_eq!(render(tpl, json!({ "isAuthenticated": true })), "out");
        assert_eq!(render(tpl, json!({ "isAuthenticated": false })), "in");
        assert_eq!(render("{{^items}}none{{/items}}", json!({ "items": [] })), "none");
    }

    #[test]
    fn dotted_paths_and_missing_values() {
        let ctx = json!({ "user": { "email": "a@b.c" } });
        assert_eq!(render("[{{user.email}}][{{user.name}}][{{nope}}]", ctx), "[a@b.c][][]");
        assert_eq!(render("{{#tags}}{{.}},{{/tags}}", json!({ "tags": ["a", 1] })), "a,1,");
    }

    #[test]
    fn partials_share_the_context() {
        let mut partials = HashMap::new();
        partials.insert(
            "row".to_string(),
            Template::parse("<li>{{name}}</li>").unwrap(),
        );
        let tpl = Template::parse("<ul>{{#authors}}{{> row}}{{/authors}}</ul>{{! note }}").unwrap();
        let out = tpl
            .render(&json!({ "authors": [{ "name": "Le Guin" }] }), &partials)
            .unwrap();
        assert_eq!(out, "<ul><li>Le Guin</li></ul>");
    }

    #[test]
    fn malformed_templates_are_rejected() {
        assert!(Template::parse("{{#a}}x").is_err());
        assert!(Template::parse("{{#a}}x{{/b}}").is_err());
        assert!(Template::parse("{{/a}}").is_err());
        assert!(Template::parse("{{name").is_err());
        assert!(Template::parse("{{}}").is_err());
    }

    #[test]
    fn self_including_partial_is_an_error() {
        let mut partials = HashMap::new();
        partials.insert("loop".to_string(), Template::parse("{{> loop}}").unwrap());
        let tpl = Template::parse("{{> loop}}").unwrap();
        assert!(tpl.render(&json!({}), &partials).is_err());
    }
}
