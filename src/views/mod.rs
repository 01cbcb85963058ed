//! Server-side HTML views.
//!
//! Templates are loaded once at startup from the views directory and keyed
//! by their path relative to it, without the `.html` extension
//! (`views/authors/index.html` is `authors/index`). Every page is wrapped in
//! the `layouts/layout` template, which receives the page as `{{{body}}}`.

pub mod template;

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use axum::response::Html;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::error::AppError;
use crate::oidc::session::UserProfile;
pub use template::Template;

pub const LAYOUT: &str = "layouts/layout";

/// Per-request values every template can see.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ViewLocals {
    #[serde(rename = "isAuthenticated")]
    pub is_authenticated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<UserProfile>,
}

impl ViewLocals {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn signed_in(user: UserProfile) -> Self {
        Self {
            is_authenticated: true,
            user: Some(user),
        }
    }
}

pub struct Views {
    templates: HashMap<String, Template>,
}

impl Views {
    /// Load and parse every `.html` file below `dir`.
    pub fn load(dir: &Path) -> Result<Self, AppError> {
        let mut sources = Vec::new();
        collect_sources(dir, dir, &mut sources)?;
        info!(path = %dir.display(), count = sources.len(), "views loaded");
        Self::from_sources(sources.iter().map(|(n, s)| (n.as_str(), s.as_str())))
    }

    pub fn from_sources<'a>(
        sources: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Result<Self, AppError> {
        let templates = sources
            .into_iter()
            .map(|(name, source)| {
                Template::parse(source)
                    .map(|t| (name.to_string(), t))
                    .map_err(|e| AppError::Template(format!("{name}: {e}")))
            })
            .collect::<Result<HashMap<_, _>, _>>()?;
        Ok(Self { templates })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.templates.contains_key(name)
    }

    /// Render a single template without the layout.
    pub fn render_template(&self, name: &str, ctx: &Value) -> Result<String, AppError> {
        let template = self
            .templates
            .get(name)
            .ok_or_else(|| AppError::Template(format!("unknown view `{name}`")))?;
        template.render(ctx, &self.templates)
    }

    /// Render a page inside the layout. `data` must be a JSON object (or null);
    /// `isAuthenticated` and `user` from `locals` are added to it.
    pub fn render_page(
        &self,
        name: &str,
        locals: &ViewLocals,
        data: Value,
    ) -> Result<Html<String>, AppError> {
        let mut ctx = page_context(locals, data)?;
        let body = self.render_template(name, &ctx)?;
        debug!(view = name, "view rendered");

        if !self.contains(LAYOUT) {
            return Ok(Html(body));
        }
        if let Value::Object(map) = &mut ctx {
            map.insert("body".to_string(), Value::String(body));
        }
        Ok(Html(self.render_template(LAYOUT, &ctx)?))
    }
}

/// Merge the request locals into the page data.
pub fn page_context(locals: &ViewLocals, data: Value) -> Result<Value, AppError> {
    let mut map = match data {
        Value::Object(map) => map,
        Value::Null => Map::new(),
        _ => {
            return Err(AppError::Template(
                "view data must be a JSON object".to_string(),
            ));
        }
    };
    if let Value::Object(locals) = serde_json::to_value(locals)? {
        map.extend(locals);
    }
    if let Some(user) = locals.user.as_ref() {
        map.insert(
            "userName".to_string(),
            Value::String(user.display_name().to_string()),
        );
    }
    Ok(Value::Object(map))
}

fn collect_sources(
    root: &Path,
    dir: &Path,
    out: &mut Vec<(String, String)>,
) -> Result<(), AppError> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_sources(root, &path, out)?;
            continue;
        }
        if !is_html_file(&path) {
            continue;
        }
        let Ok(relative) = path.with_extension("").strip_prefix(root).map(Path::to_path_buf)
        else {
            continue;
        };
        let name = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        out.push((name, fs::read_to_string(&path)?));
    }
    Ok(())
}

fn is_html_file(path: &Path) -> bool {
    path.extension()
        .and_then(|s| s.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("html"))
        == Some(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn views() -> Views {
        Views::from_sources([
            (
                LAYOUT,
                "<nav>{{#isAuthenticated}}Hi {{userName}}{{/isAuthenticated}}{{^isAuthenticated}}Log in{{/isAuthenticated}}</nav>{{{body}}}",
            ),
            ("index", "<h1>{{title}}</h1>"),
        ])
        .unwrap()
    }

    #[test]
    fn page_is_wrapped_in_layout() {
        let Html(html) = views()
            .render_page("index", &ViewLocals::anonymous(), json!({ "title": "Books" }))
            .unwrap();
        assert_eq!(html, "<nav>Log in</nav><h1>Books</h1>");
    }

    #[test]
    fn context_carries_auth_state() {
        let user = UserProfile {
            sub: "auth0|1".to_string(),
            name: Some("Ada".to_string()),
            nickname: None,
            email: None,
            picture: None,
        };
        let ctx = page_context(&ViewLocals::signed_in(user.clone()), Value::Null).unwrap();
        assert_eq!(ctx["isAuthenticated"], json!(true));
        assert_eq!(ctx["user"]["name"], json!("Ada"));

        let ctx = page_context(&ViewLocals::anonymous(), json!({})).unwrap();
        assert_eq!(ctx["isAuthenticated"], json!(false));
        assert!(ctx.get("user").is_none());

        let Html(html) = views()
            .render_page("index", &ViewLocals::signed_in(user), json!({ "title": "x" }))
            .unwrap();
        assert!(html.starts_with("<nav>Hi Ada</nav>"));
    }

    #[test]
    fn unknown_view_is_an_error() {
        assert!(views().render_template("missing", &json!({})).is_err());
        assert!(page_context(&ViewLocals::anonymous(), json!([1])).is_err());
    }

    #[test]
    fn load_walks_subdirectories() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("authors")).unwrap();
        fs::write(dir.path().join("authors/index.html"), "{{name}}").unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let views = Views::load(dir.path()).unwrap();
        assert!(views.contains("authors/index"));
        assert!(!views.contains("notes"));
    }

    #[test]
    fn bundled_views_parse() {
        let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("views");
        let views = Views::load(&dir).unwrap();
        for name in [
            LAYOUT,
            "index",
            "authors/index",
            "authors/new",
            "authors/edit",
            "authors/show",
            "books/index",
            "books/new",
            "books/edit",
            "books/show",
        ] {
            assert!(views.contains(name), "missing view {name}");
        }
    }
}
