//! Tera rendering engine: [`Renderer`] over a directory of device templates.
//!
//! # Template directory
//!
//! | File                        | Template name       |
//! |-----------------------------|---------------------|
//! | `management_switch.j2`      | `management_switch` |
//! | `core_switch.tera`          | `core_switch`       |
//!
//! Each template is compiled into its own `Tera` instance the first time it
//! is used and cached by name until [`Renderer::reload`]. Templates it pulls
//! in with `include`, `import` or `extends` are loaded from the same
//! directory into that instance; a reference that cannot be found leaves
//! the template invalid.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tera::Tera;

use netdeploy_core::{DeviceRole, Variables};

use crate::error::{error_chain, RenderError};
use crate::filters;
use crate::variables::{self, InferredVariables};

const EXTENSIONS: &[&str] = &["j2", "tera"];

// ---------------------------------------------------------------------------
// Template loading helpers
// ---------------------------------------------------------------------------

fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> RenderError {
    RenderError::Io { path: path.into(), source }
}

/// `core_switch.j2` → `core_switch`; bare names pass through.
fn template_stem(name: &str) -> &str {
    EXTENSIONS
        .iter()
        .find_map(|ext| name.strip_suffix(ext)?.strip_suffix('.'))
        .unwrap_or(name)
}

/// Locate a referenced template: `"common.j2"` as written, `"common"` by
/// trying each extension. Paths leaving `dir` are never resolved.
fn resolve_reference(dir: &Path, reference: &str) -> Option<PathBuf> {
    let relative = Path::new(reference);
    if !relative.components().all(|c| matches!(c, Component::Normal(_))) {
        return None;
    }
    let exact = dir.join(relative);
    if exact.is_file() {
        return Some(exact);
    }
    EXTENSIONS
        .iter()
        .map(|ext| dir.join(format!("{reference}.{ext}")))
        .find(|path| path.is_file())
}

/// Read a template file. Content that is not UTF-8 is `Ok(Err(reason))` so
/// it can be reported as a validation error.
fn read_source(path: &Path) -> Result<(u64, Result<String, String>), RenderError> {
    let bytes = std::fs::read(path).map_err(|e| io_err(path, e))?;
    let size = bytes.len() as u64;
    let source = String::from_utf8(bytes)
        .map(normalize_newlines)
        .map_err(|e| format!("{}: not valid UTF-8: {e}", path.display()));
    Ok((size, source))
}

fn normalize_newlines(text: String) -> String {
    if text.contains('\r') {
        text.replace("\r\n", "\n")
    } else {
        text
    }
}

/// Pull the dotted path out of tera's
/// "Variable `a.b` not found in context while rendering 'x'".
fn undefined_variable(err: &tera::Error) -> Option<String> {
    let mut source: Option<&(dyn std::error::Error + 'static)> = Some(err);
    while let Some(e) = source {
        let msg = e.to_string();
        if let Some(rest) = msg.strip_prefix("Variable `") {
            if let Some((path, tail)) = rest.split_once('`') {
                if tail.trim_start().starts_with("not found in context") {
                    return Some(path.to_string());
                }
            }
        }
        source = e.source();
    }
    None
}

// ---------------------------------------------------------------------------
// Template
// ---------------------------------------------------------------------------

/// One loaded template file.
pub struct Template {
    pub name: String,
    pub path: PathBuf,
    pub size: u64,
    pub variables: InferredVariables,
    /// Parse errors; empty when the template compiled.
    pub errors: Vec<String>,
    tera: Option<Tera>,
}

impl Template {
    fn compile(name: &str, path: PathBuf, dir: &Path) -> Result<Self, RenderError> {
        let (size, source) = read_source(&path)?;
        let mut template = Template {
            name: name.to_string(),
            path,
            size,
            variables: InferredVariables::default(),
            errors: Vec::new(),
            tera: None,
        };
        let source = match source {
            Ok(source) => source,
            Err(reason) => {
                template.errors.push(reason);
                return Ok(template);
            }
        };

        template.variables = variables::infer(&source);
        let mut pending = variables::references(&source);
        let mut loaded = HashSet::from([name.to_string()]);
        let mut sources = vec![(name.to_string(), source)];
        while let Some(reference) = pending.pop() {
            if !loaded.insert(reference.name.clone()) {
                continue;
            }
            let Some(dep_path) = resolve_reference(dir, &reference.name) else {
                if !reference.optional {
                    template.errors.push(format!(
                        "referenced template '{}' not found in {}",
                        reference.name,
                        dir.display()
                    ));
                }
                continue;
            };
            match read_source(&dep_path)?.1 {
                Ok(text) => {
                    template.variables.merge(variables::infer(&text));
                    pending.extend(variables::references(&text));
                    sources.push((reference.name, text));
                }
                Err(reason) => template.errors.push(reason),
            }
        }
        if !template.errors.is_empty() {
            return Ok(template);
        }

        let mut tera = Tera::default();
        tera.autoescape_on(vec![]);
        filters::register(&mut tera);
        match tera.add_raw_templates(sources) {
            Ok(()) => template.tera = Some(tera),
            Err(e) => template.errors.push(error_chain(&e)),
        }
        Ok(template)
    }

    pub fn is_valid(&self) -> bool {
        self.tera.is_some()
    }

    fn validation(&self) -> TemplateValidation {
        TemplateValidation {
            name: self.name.clone(),
            valid: self.is_valid(),
            errors: self.errors.clone(),
            variables: self.variables.required.iter().cloned().collect(),
            optional_variables: self.variables.optional.iter().cloned().collect(),
            size: self.size,
        }
    }
}

impl std::fmt::Debug for Template {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Template")
            .field("name", &self.name)
            .field("path", &self.path)
            .field("size", &self.size)
            .field("variables", &self.variables)
            .field("errors", &self.errors)
            .finish()
    }
}

/// Outcome of parsing a template without rendering it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TemplateValidation {
    pub name: String,
    pub valid: bool,
    pub errors: Vec<String>,
    /// Required context variables, sorted.
    pub variables: Vec<String>,
    pub optional_variables: Vec<String>,
    pub size: u64,
}

/// File metadata plus validation, for `info`-style listings.
#[derive(Debug, Clone, Serialize)]
pub struct TemplateInfo {
    pub name: String,
    pub path: PathBuf,
    pub size: u64,
    pub modified: Option<DateTime<Utc>>,
    pub validation: TemplateValidation,
}

// ---------------------------------------------------------------------------
// Renderer
// ---------------------------------------------------------------------------

/// Tera-based renderer for one template directory.
///
/// Create once with [`Renderer::new`] and reuse; it is `Send + Sync`.
#[derive(Debug)]
pub struct Renderer {
    dir: PathBuf,
    role_templates: HashMap<DeviceRole, String>,
    cache: RwLock<HashMap<String, Arc<Template>>>,
}

impl Renderer {
    /// Renderer over `dir`. Fails if the directory cannot be read.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, RenderError> {
        let dir = dir.into();
        std::fs::read_dir(&dir).map_err(|e| io_err(&dir, e))?;
        let role_templates = DeviceRole::all()
            .iter()
            .map(|role| (*role, role.default_template().to_string()))
            .collect();
        Ok(Renderer {
            dir,
            role_templates,
            cache: RwLock::new(HashMap::new()),
        })
    }

    /// Map `role` to a different template than its default.
    pub fn with_role_template(mut self, role: DeviceRole, template: impl Into<String>) -> Self {
        self.role_templates.insert(role, template.into());
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Template used for `role` by [`Renderer::generate_config`].
    pub fn role_template(&self, role: DeviceRole) -> &str {
        self.role_templates
            .get(&role)
            .map(String::as_str)
            .unwrap_or_else(|| role.default_template())
    }

    /// Sorted template names found in the directory. Does not parse anything.
    pub fn list_templates(&self) -> Result<Vec<String>, RenderError> {
        let entries = std::fs::read_dir(&self.dir).map_err(|e| io_err(&self.dir, e))?;
        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| io_err(&self.dir, e))?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let ext = path.extension().and_then(|s| s.to_str()).unwrap_or_default();
            if !EXTENSIONS.contains(&ext) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                names.push(stem.to_string());
            }
        }
        names.sort();
        names.dedup();
        Ok(names)
    }

    fn resolve(&self, name: &str) -> Result<PathBuf, RenderError> {
        EXTENSIONS
            .iter()
            .map(|ext| self.dir.join(format!("{name}.{ext}")))
            .find(|path| path.is_file())
            .ok_or_else(|| RenderError::TemplateNotFound {
                name: name.to_string(),
                dir: self.dir.clone(),
            })
    }

    /// Load (or fetch from cache) the template called `name`.
    pub fn template(&self, name: &str) -> Result<Arc<Template>, RenderError> {
        let name = template_stem(name);
        {
            let cache = self.cache.read().unwrap_or_else(|e| e.into_inner());
            if let Some(template) = cache.get(name) {
                return Ok(Arc::clone(template));
            }
        }

        let path = self.resolve(name)?;
        let template = Arc::new(Template::compile(name, path, &self.dir)?);
        if !template.is_valid() {
            tracing::warn!(template = %name, errors = ?template.errors, "template failed to parse");
        } else {
            tracing::debug!(template = %name, size = template.size, "template loaded");
        }
        self.cache
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(name.to_string(), Arc::clone(&template));
        Ok(template)
    }

    /// Parse `name` without rendering. Malformed content is reported in the
    /// result; only a missing file or an I/O failure is an `Err`.
    pub fn validate(&self, name: &str) -> Result<TemplateValidation, RenderError> {
        Ok(self.template(name)?.validation())
    }

    /// [`Renderer::validate`] for every template in the directory.
    pub fn validate_all(&self) -> Result<BTreeMap<String, TemplateValidation>, RenderError> {
        let mut out = BTreeMap::new();
        for name in self.list_templates()? {
            let validation = self.validate(&name)?;
            out.insert(name, validation);
        }
        Ok(out)
    }

    /// Render `name` with `variables` under strict undefined semantics.
    pub fn render(&self, name: &str, variables: &Variables) -> Result<String, RenderError> {
        let template = self.template(name)?;
        let Some(tera) = template.tera.as_ref() else {
            return Err(RenderError::Syntax {
                template: template.name.clone(),
                errors: template.errors.clone(),
            });
        };

        if let Some(missing) = template.variables.missing(variables).into_iter().next() {
            return Err(RenderError::UndefinedVariable {
                template: template.name.clone(),
                name: missing,
            });
        }

        let ctx = tera::Context::from_value(serde_json::to_value(variables)?)?;
        let rendered = tera.render(&template.name, &ctx).map_err(|e| {
            match undefined_variable(&e) {
                Some(path) => RenderError::UndefinedVariable {
                    template: template.name.clone(),
                    name: path,
                },
                None => RenderError::Tera(e),
            }
        })?;
        Ok(normalize_newlines(rendered))
    }

    /// Render the template mapped to `role` (e.g. `"core"` → `core_switch`).
    pub fn generate_config(&self, role: &str, variables: &Variables) -> Result<String, RenderError> {
        let role: DeviceRole = role.parse()?;
        self.render(self.role_template(role), variables)
    }

    /// Path, size, modification time and validation of one template.
    pub fn info(&self, name: &str) -> Result<TemplateInfo, RenderError> {
        let template = self.template(name)?;
        let meta = std::fs::metadata(&template.path).map_err(|e| io_err(&template.path, e))?;
        Ok(TemplateInfo {
            name: template.name.clone(),
            path: template.path.clone(),
            size: meta.len(),
            modified: meta.modified().ok().map(DateTime::<Utc>::from),
            validation: template.validation(),
        })
    }

    /// Drop every cached template; the next use re-reads from disk.
    pub fn reload(&self) {
        self.cache.write().unwrap_or_else(|e| e.into_inner()).clear();
        tracing::debug!(dir = %self.dir.display(), "template cache cleared");
    }

    /// Number of templates currently cached.
    pub fn cached(&self) -> usize {
        self.cache.read().unwrap_or_else(|e| e.into_inner()).len()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use netdeploy_core::VariableValue;
    use tempfile::TempDir;

    fn dir_with(files: &[(&str, &str)]) -> TempDir {
        let dir = TempDir::new().unwrap();
        for (name, content) in files {
            std::fs::write(dir.path().join(name), content).unwrap();
        }
        dir
    }

    fn vars(pairs: &[(&str, &str)]) -> Variables {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), VariableValue::from(*v)))
            .collect()
    }

    #[test]
    fn template_stem_strips_known_extensions() {
        assert_eq!(template_stem("core_switch.j2"), "core_switch");
        assert_eq!(template_stem("core_switch.tera"), "core_switch");
        assert_eq!(template_stem("core_switch"), "core_switch");
        assert_eq!(template_stem("notes.txt"), "notes.txt");
    }

    #[test]
    fn list_ignores_other_files() {
        let dir = dir_with(&[
            ("b.j2", "x"),
            ("a.tera", "y"),
            ("README.md", "z"),
            ("a.j2", "dup"),
        ]);
        let r = Renderer::new(dir.path()).unwrap();
        assert_eq!(r.list_templates().unwrap(), ["a", "b"]);
    }

    #[test]
    fn missing_directory_is_io_error() {
        let dir = TempDir::new().unwrap();
        let err = Renderer::new(dir.path().join("nope")).unwrap_err();
        assert!(matches!(err, RenderError::Io { .. }));
    }

    #[test]
    fn cache_is_filled_lazily_and_cleared_on_reload() {
        let dir = dir_with(&[("t.j2", "v1 {{ x }}")]);
        let r = Renderer::new(dir.path()).unwrap();
        assert_eq!(r.cached(), 0);
        assert_eq!(r.render("t", &vars(&[("x", "a")])).unwrap(), "v1 a");
        assert_eq!(r.cached(), 1);

        std::fs::write(dir.path().join("t.j2"), "v2 {{ x }}").unwrap();
        assert_eq!(r.render("t", &vars(&[("x", "a")])).unwrap(), "v1 a", "served from cache");
        r.reload();
        assert_eq!(r.cached(), 0);
        assert_eq!(r.render("t", &vars(&[("x", "a")])).unwrap(), "v2 a");
    }

    #[test]
    fn crlf_is_normalised() {
        let dir = dir_with(&[("t.j2", "line1\r\n{{ x }}\r\n")]);
        let r = Renderer::new(dir.path()).unwrap();
        let out = r.render("t", &vars(&[("x", "a")])).unwrap();
        assert!(!out.contains('\r'));
        assert_eq!(out, "line1\na\n");
    }

    #[test]
    fn html_is_not_escaped() {
        let dir = dir_with(&[("t.j2", "{{ banner }}")]);
        let r = Renderer::new(dir.path()).unwrap();
        let out = r.render("t", &vars(&[("banner", "<authorized & only>")])).unwrap();
        assert_eq!(out, "<authorized & only>");
    }

    #[test]
    fn guard_in_one_block_does_not_cover_another() {
        let dir = dir_with(&[(
            "t.j2",
            "{% if snmp is defined %}a{% endif %}\
             {% if snmp %}snmp-agent community {{ community }}{% endif %}\n\
             sysname {{ hostname }}",
        )]);
        let r = Renderer::new(dir.path()).unwrap();
        let err = r.render("t", &vars(&[("hostname", "SW1")])).unwrap_err();
        assert!(
            matches!(&err, RenderError::UndefinedVariable { name, .. } if name == "snmp"),
            "got {err:?}"
        );
    }

    #[test]
    fn include_is_loaded_from_the_directory() {
        let dir = dir_with(&[
            ("core.j2", "sysname {{ hostname }}\n{% include \"common\" %}"),
            ("common.j2", "ntp-service unicast-server {{ ntp_server }}"),
        ]);
        let r = Renderer::new(dir.path()).unwrap();
        let v = r.validate("core").unwrap();
        assert!(v.valid, "{:?}", v.errors);
        assert_eq!(v.variables, ["hostname", "ntp_server"]);

        let out = r
            .render("core", &vars(&[("hostname", "SW1"), ("ntp_server", "10.0.0.1")]))
            .unwrap();
        assert_eq!(out, "sysname SW1\nntp-service unicast-server 10.0.0.1");
    }

    #[test]
    fn extends_resolves_parent_by_file_name() {
        let dir = dir_with(&[
            ("base.j2", "#\n{% block body %}{% endblock body %}\nreturn"),
            (
                "edge.j2",
                "{% extends \"base.j2\" %}{% block body %}sysname {{ hostname }}{% endblock body %}",
            ),
        ]);
        let r = Renderer::new(dir.path()).unwrap();
        let out = r.render("edge", &vars(&[("hostname", "R1")])).unwrap();
        assert_eq!(out, "#\nsysname R1\nreturn");
    }

    #[test]
    fn missing_include_makes_template_invalid() {
        let dir = dir_with(&[("core.j2", "sysname {{ hostname }}\n{% include \"common\" %}")]);
        let r = Renderer::new(dir.path()).unwrap();
        let v = r.validate("core").unwrap();
        assert!(!v.valid);
        assert!(v.errors[0].contains("'common' not found"), "{:?}", v.errors);

        let err = r.render("core", &vars(&[("hostname", "SW1")])).unwrap_err();
        assert!(matches!(err, RenderError::Syntax { .. }), "got {err:?}");
    }

    #[test]
    fn include_cannot_leave_the_directory() {
        let dir = dir_with(&[("core.j2", "{% include \"../secret.j2\" %}")]);
        let r = Renderer::new(dir.path()).unwrap();
        assert!(!r.validate("core").unwrap().valid);
    }

    #[test]
    fn non_utf8_template_is_invalid_not_an_error() {
        let dir = dir_with(&[("good.j2", "sysname {{ hostname }}")]);
        std::fs::write(dir.path().join("bad.j2"), b"sysname \xff\xfe").unwrap();
        let r = Renderer::new(dir.path()).unwrap();

        let all = r.validate_all().unwrap();
        assert!(all["good"].valid);
        assert!(!all["bad"].valid);
        assert!(all["bad"].errors[0].contains("not valid UTF-8"), "{:?}", all["bad"].errors);
        assert_eq!(all["bad"].size, 10);

        let err = r.render("bad", &Variables::new()).unwrap_err();
        assert!(matches!(err, RenderError::Syntax { .. }), "got {err:?}");
    }

    #[test]
    fn undefined_variable_message_extraction() {
        let mut tera = Tera::default();
        tera.add_raw_template("t", "{{ a.b }}").unwrap();
        let mut ctx = tera::Context::new();
        ctx.insert("a", &serde_json::json!({}));
        let err = tera.render("t", &ctx).unwrap_err();
        assert_eq!(undefined_variable(&err).as_deref(), Some("a.b"));
    }
}
