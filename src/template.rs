//! Template rendering for Template path mappings
//!
//! Templates use `{{` / `}}` delimiters and are rendered with handlebars,
//! without HTML escaping. Field references may be written with a leading dot
//! (`{{ .Port }}`, `{{#if .Build}}`); the dot is dropped before rendering and
//! a bare `{{ . }}` means the current value.
//!
//! Helpers: `getUnixPath`, `getWindowsPath`, `lower`, `upper`, `title`,
//! `camel`, `snake`, `kebab`, `join` and `default`.

use handlebars::{handlebars_helper, no_escape, Handlebars};
use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

fn mustache_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)\{\{.*?\}\}").expect("valid regex"))
}

fn dotted_field_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(^|[\s(#/~{])\.([A-Za-z_])").expect("valid regex"))
}

fn dot_argument_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(\s)\.(\s|~?\}\})").expect("valid regex"))
}

fn bare_dot_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\{\{(~?)\s*\.\s*(~?)\}\}$").expect("valid regex"))
}

/// Rewrites dotted field references into handlebars paths
pub fn normalize_syntax(template: &str) -> String {
    mustache_regex()
        .replace_all(template, |caps: &regex::Captures| {
            let tag = &caps[0];
            if bare_dot_regex().is_match(tag) {
                return bare_dot_regex().replace(tag, "{{${1}this${2}}}").into_owned();
            }
            let tag = dotted_field_regex().replace_all(tag, "${1}${2}");
            dot_argument_regex()
                .replace_all(&tag, "${1}this${2}")
                .into_owned()
        })
        .into_owned()
}

fn words(s: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current = String::new();
    let mut prev_lower = false;
    for c in s.chars() {
        if !c.is_alphanumeric() {
            if !current.is_empty() {
                out.push(std::mem::take(&mut current));
            }
            prev_lower = false;
            continue;
        }
        if c.is_uppercase() && prev_lower && !current.is_empty() {
            out.push(std::mem::take(&mut current));
        }
        prev_lower = c.is_lowercase() || c.is_ascii_digit();
        current.extend(c.to_lowercase());
    }
    if !current.is_empty() {
        out.push(current);
    }
    out
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        Value::Bool(b) => !b,
        Value::Number(_) => false,
    }
}

fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

handlebars_helper!(get_unix_path: |p: str| p.replace('\\', "/"));
handlebars_helper!(get_windows_path: |p: str| p.replace('/', "\\"));
handlebars_helper!(lower: |s: str| s.to_lowercase());
handlebars_helper!(upper: |s: str| s.to_uppercase());
handlebars_helper!(title: |s: str| words(s).iter().map(|w| capitalize(w)).collect::<Vec<_>>().join(" "));
handlebars_helper!(camel: |s: str| {
    let parts = words(s);
    let mut out = String::new();
    for (i, w) in parts.iter().enumerate() {
        if i == 0 { out.push_str(w) } else { out.push_str(&capitalize(w)) }
    }
    out
});
handlebars_helper!(snake: |s: str| words(s).join("_"));
handlebars_helper!(kebab: |s: str| words(s).join("-"));
handlebars_helper!(join: |items: array, sep: str| {
    items.iter().map(scalar_to_string).collect::<Vec<_>>().join(sep)
});
handlebars_helper!(default_value: |value: Json, fallback: Json| {
    if is_empty_value(value) { fallback.clone() } else { value.clone() }
});

pub struct TemplateRenderer {
    registry: Handlebars<'static>,
}

impl Default for TemplateRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateRenderer {
    pub fn new() -> Self {
        let mut registry = Handlebars::new();
        registry.register_escape_fn(no_escape);
        registry.register_helper("getUnixPath", Box::new(get_unix_path));
        registry.register_helper("getWindowsPath", Box::new(get_windows_path));
        registry.register_helper("lower", Box::new(lower));
        registry.register_helper("upper", Box::new(upper));
        registry.register_helper("title", Box::new(title));
        registry.register_helper("camel", Box::new(camel));
        registry.register_helper("snake", Box::new(snake));
        registry.register_helper("kebab", Box::new(kebab));
        registry.register_helper("join", Box::new(join));
        registry.register_helper("default", Box::new(default_value));
        Self { registry }
    }

    pub fn render(&self, template: &str, data: &Value) -> Result<String, String> {
        self.registry
            .render_template(&normalize_syntax(template), data)
            .map_err(|e| e.to_string())
    }
}

/// Whether file contents should go through the renderer
pub fn is_template(contents: &[u8]) -> bool {
    match std::str::from_utf8(contents) {
        Ok(text) => text.contains("{{"),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use yare::parameterized;

    #[parameterized(
        field = { "{{ .Port }}", "{{ Port }}" },
        block = { "{{#if .Build}}x{{/if}}", "{{#if Build}}x{{/if}}" },
        helper_args = { "{{join .Images .Sep}}", "{{join Images Sep}}" },
        bare = { "{{ . }}", "{{this}}" },
        untouched = { "echo ${HOME}.x", "echo ${HOME}.x" },
        nested = { "{{ .Svc.Name }}", "{{ Svc.Name }}" },
        each_dot = { "{{#each .}}", "{{#each this}}" },
    )]
    fn test_normalize_syntax(input: &str, expected: &str) {
        assert_eq!(normalize_syntax(input), expected);
    }

    #[test]
    fn test_render_with_dot_fields() {
        let r = TemplateRenderer::new();
        let out = r
            .render(
                "FROM node:{{ .NodeVersion }}\n{{#if .Build}}RUN npm run build\n{{/if}}EXPOSE {{ .Port }}",
                &json!({"NodeVersion": "18", "Build": true, "Port": 3000}),
            )
            .unwrap();
        assert_eq!(out, "FROM node:18\nRUN npm run build\nEXPOSE 3000");
    }

    #[test]
    fn test_no_html_escaping() {
        let r = TemplateRenderer::new();
        let out = r.render("{{ .Cmd }}", &json!({"Cmd": "a && b < c"})).unwrap();
        assert_eq!(out, "a && b < c");
    }

    #[test]
    fn test_helpers() {
        let r = TemplateRenderer::new();
        let data = json!({"Ctx": "source\\web", "Name": "my-web_app", "Tags": ["a", "b"], "Empty": ""});
        assert_eq!(r.render("{{getUnixPath .Ctx}}", &data).unwrap(), "source/web");
        assert_eq!(r.render("{{getWindowsPath \"a/b\"}}", &data).unwrap(), "a\\b");
        assert_eq!(r.render("{{upper .Name}}", &data).unwrap(), "MY-WEB_APP");
        assert_eq!(r.render("{{camel .Name}}", &data).unwrap(), "myWebApp");
        assert_eq!(r.render("{{snake \"MyWebApp\"}}", &data).unwrap(), "my_web_app");
        assert_eq!(r.render("{{kebab .Name}}", &data).unwrap(), "my-web-app");
        assert_eq!(r.render("{{title .Name}}", &data).unwrap(), "My Web App");
        assert_eq!(r.render("{{join .Tags \",\"}}", &data).unwrap(), "a,b");
        assert_eq!(r.render("{{default .Empty \"x\"}}", &data).unwrap(), "x");
    }

    #[test]
    fn test_each_over_top_level_array() {
        let r = TemplateRenderer::new();
        let out = r
            .render(
                "{{#each .}}{{ .ImageName }};{{/each}}",
                &json!([{"ImageName": "a"}, {"ImageName": "b"}]),
            )
            .unwrap();
        assert_eq!(out, "a;b;");
    }

    #[test]
    fn test_missing_field_renders_empty() {
        let r = TemplateRenderer::new();
        assert_eq!(r.render("a{{ .Missing }}b", &json!({})).unwrap(), "ab");
    }

    #[test]
    fn test_each_over_object_keys() {
        let r = TemplateRenderer::new();
        let out = r
            .render(
                "s2i build .{{#each .Env}} -e {{@key}}={{this}}{{/each}} img",
                &json!({"Env": {"A": "1", "B": "2"}}),
            )
            .unwrap();
        assert_eq!(out, "s2i build . -e A=1 -e B=2 img");
    }

    #[test]
    fn test_is_template() {
        assert!(is_template(b"FROM {{ .Image }}"));
        assert!(!is_template(b"plain"));
        assert!(!is_template(&[0xff, 0xfe, b'{', b'{']));
    }
}
