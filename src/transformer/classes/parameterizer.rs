//! Parameterized deployment packaging
//!
//! Takes a directory of plain Kubernetes manifests and a set of rules that
//! pick fields out of them, and writes three flavours of the same
//! deployment where those fields become per-environment parameters:
//!
//! - a Helm chart (`Chart.yaml`, `values.yaml`, `values-<env>.yaml`, `templates/`)
//! - a Kustomize base with one overlay per environment
//! - an OpenShift template with one parameter file per environment
//!
//! Rules live in YAML files with `kind: Parameterizer` next to the
//! transformer descriptor:
//!
//! ```yaml
//! kind: Parameterizer
//! spec:
//!   parameterizers:
//!     - target: spec.template.spec.containers[*].image
//!       template: "{{ .name }}.{{ .element.name }}.image"
//!       filters:
//!         - kind: Deployment
//!     - target: spec.replicas
//!       values:
//!         prod: 3
//! ```

use super::DEPLOY_DIR;
use crate::artifact::{Artifact, ArtifactType, PathMapping, PathType};
use crate::environment::paths::unix_path;
use crate::error::PipelineError;
use crate::template::TemplateRenderer;
use crate::transformer::{TransformOutput, Transformer, TransformerConfig};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

pub const RULE_KIND: &str = "Parameterizer";
const PARAMETERIZED_DIR: &str = "parameterized";
const DEFAULT_CHART_NAME: &str = "chart";
const KUSTOMIZE_API_VERSION: &str = "kustomize.config.k8s.io/v1beta1";

fn default_helm() -> String {
    "helm-chart".to_string()
}

fn default_kustomize() -> String {
    "kustomize".to_string()
}

fn default_octemplates() -> String {
    "openshift-templates".to_string()
}

fn default_envs() -> Vec<String> {
    vec!["dev".to_string(), "staging".to_string(), "prod".to_string()]
}

/// Where each packaging flavour is written; an empty directory skips it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterizerTargets {
    #[serde(default = "default_helm")]
    pub helm: String,
    #[serde(default = "default_kustomize")]
    pub kustomize: String,
    #[serde(default = "default_octemplates", alias = "ocTemplates")]
    pub octemplates: String,
    #[serde(default = "default_envs")]
    pub envs: Vec<String>,
    /// Chart and template name
    #[serde(default)]
    pub project_name: String,
}

impl Default for ParameterizerTargets {
    fn default() -> Self {
        Self {
            helm: default_helm(),
            kustomize: default_kustomize(),
            octemplates: default_octemplates(),
            envs: default_envs(),
            project_name: String::new(),
        }
    }
}

impl ParameterizerTargets {
    fn chart_name(&self) -> &str {
        if self.project_name.is_empty() {
            DEFAULT_CHART_NAME
        } else {
            &self.project_name
        }
    }

    fn dirs(&self) -> impl Iterator<Item = &str> {
        [self.helm.as_str(), self.kustomize.as_str(), self.octemplates.as_str()]
            .into_iter()
            .filter(|d| !d.is_empty())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceFilter {
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub api_version: String,
}

impl ResourceFilter {
    fn matches(&self, resource: &Resource) -> bool {
        (self.kind.is_empty() || self.kind == resource.kind)
            && (self.name.is_empty() || self.name == resource.name)
            && (self.api_version.is_empty() || self.api_version == resource.api_version)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterizerRule {
    /// Dotted field path; `[*]` walks every array element, `[n]` one
    pub target: String,
    /// Parameter key template over `kind`, `name`, `apiVersion`, `field`,
    /// `index` and `element`
    #[serde(default)]
    pub template: String,
    /// Default value; the field's current value when absent
    #[serde(default)]
    pub default: Option<Value>,
    /// Per-environment values
    #[serde(default)]
    pub values: BTreeMap<String, Value>,
    #[serde(default)]
    pub filters: Vec<ResourceFilter>,
}

impl ParameterizerRule {
    fn applies_to(&self, resource: &Resource) -> bool {
        self.filters.is_empty() || self.filters.iter().any(|f| f.matches(resource))
    }
}

#[derive(Debug, Deserialize)]
struct RuleFile {
    kind: String,
    #[serde(default)]
    spec: RuleFileSpec,
}

#[derive(Debug, Default, Deserialize)]
struct RuleFileSpec {
    #[serde(default)]
    parameterizers: Vec<ParameterizerRule>,
}

fn is_yaml(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml") | Some("yml")
    )
}

/// Rules from every `kind: Parameterizer` file under `dir`, in file name order
pub fn collect_rules(dir: &Path) -> Vec<ParameterizerRule> {
    let mut rules = Vec::new();
    for entry in WalkDir::new(dir).sort_by_file_name().into_iter().filter_map(|e| e.ok()) {
        let path = entry.path();
        if !entry.file_type().is_file() || !is_yaml(path) {
            continue;
        }
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Unable to read parameterizer file");
                continue;
            }
        };
        match serde_yaml::from_str::<RuleFile>(&contents) {
            Ok(file) if file.kind == RULE_KIND => {
                debug!(path = %path.display(), rules = file.spec.parameterizers.len(), "Loaded parameterizers");
                rules.extend(file.spec.parameterizers);
            }
            Ok(_) => {}
            Err(e) => debug!(path = %path.display(), error = %e, "Not a parameterizer file"),
        }
    }
    rules
}

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Key(String),
    Index(usize),
    All,
}

fn parse_target(target: &str) -> Result<Vec<Segment>, PipelineError> {
    let invalid = || PipelineError::InvalidInput(format!("invalid parameterizer target '{}'", target));
    let mut segments = Vec::new();
    for part in target.split('.') {
        let (key, mut rest) = match part.find('[') {
            Some(i) => (&part[..i], &part[i..]),
            None => (part, ""),
        };
        if !key.is_empty() {
            segments.push(Segment::Key(key.to_string()));
        } else if rest.is_empty() {
            return Err(invalid());
        }
        while !rest.is_empty() {
            let end = rest.find(']').ok_or_else(invalid)?;
            let inner = &rest[1..end];
            segments.push(match inner {
                "*" => Segment::All,
                n => Segment::Index(n.parse().map_err(|_| invalid())?),
            });
            rest = &rest[end + 1..];
            if !rest.is_empty() && !rest.starts_with('[') {
                return Err(invalid());
            }
        }
    }
    Ok(segments)
}

fn escape_pointer(key: &str) -> String {
    key.replace('~', "~0").replace('/', "~1")
}

struct FieldMatch {
    pointer: String,
    value: Value,
    index: Option<usize>,
    element: Value,
}

fn resolve(
    value: &Value,
    segments: &[Segment],
    pointer: String,
    wildcard: Option<(usize, &Value)>,
    out: &mut Vec<FieldMatch>,
) {
    let Some((segment, rest)) = segments.split_first() else {
        out.push(FieldMatch {
            pointer,
            value: value.clone(),
            index: wildcard.map(|(i, _)| i),
            element: wildcard.map(|(_, e)| e.clone()).unwrap_or(Value::Null),
        });
        return;
    };
    match segment {
        Segment::Key(key) => {
            if let Some(child) = value.get(key.as_str()) {
                resolve(child, rest, format!("{}/{}", pointer, escape_pointer(key)), wildcard, out);
            }
        }
        Segment::Index(i) => {
            if let Some(child) = value.get(*i) {
                resolve(child, rest, format!("{}/{}", pointer, i), wildcard, out);
            }
        }
        Segment::All => {
            if let Some(items) = value.as_array() {
                for (i, child) in items.iter().enumerate() {
                    resolve(child, rest, format!("{}/{}", pointer, i), Some((i, child)), out);
                }
            }
        }
    }
}

#[derive(Debug, Clone)]
struct Resource {
    /// Path relative to the input directory
    file: PathBuf,
    api_version: String,
    kind: String,
    name: String,
    value: Value,
}

fn load_resources(input: &Path) -> Result<Vec<Resource>, PipelineError> {
    let mut resources = Vec::new();
    for entry in WalkDir::new(input).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            PipelineError::io(input, std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))
        })?;
        let path = entry.path();
        if !entry.file_type().is_file() || !is_yaml(path) {
            continue;
        }
        let contents = fs::read_to_string(path).map_err(|e| PipelineError::io(path, e))?;
        let value: Value = match serde_yaml::from_str(&contents) {
            Ok(value) => value,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Skipping unparseable manifest");
                continue;
            }
        };
        let Some(kind) = value.get("kind").and_then(Value::as_str).map(str::to_string) else {
            debug!(path = %path.display(), "Skipping file without a kind");
            continue;
        };
        let file = path
            .strip_prefix(input)
            .map(Path::to_path_buf)
            .map_err(|e| PipelineError::InvalidInput(e.to_string()))?;
        resources.push(Resource {
            file,
            api_version: value["apiVersion"].as_str().unwrap_or_default().to_string(),
            name: value["metadata"]["name"].as_str().unwrap_or_default().to_string(),
            kind,
            value,
        });
    }
    Ok(resources)
}

#[derive(Debug, Clone, PartialEq)]
struct Parameter {
    default: Value,
    per_env: BTreeMap<String, Value>,
}

impl Parameter {
    fn value_for(&self, env: &str) -> &Value {
        self.per_env.get(env).unwrap_or(&self.default)
    }
}

/// A field of one resource bound to a parameter key
#[derive(Debug, Clone)]
struct Binding {
    pointer: String,
    key: String,
}

struct Parameterization {
    resources: Vec<(Resource, Vec<Binding>)>,
    parameters: BTreeMap<String, Parameter>,
}

fn default_key_template(segments: &[Segment]) -> &'static str {
    if segments.contains(&Segment::All) {
        "{{ .name }}.{{ .index }}.{{ .field }}"
    } else {
        "{{ .name }}.{{ .field }}"
    }
}

fn bind(resources: Vec<Resource>, rules: &[ParameterizerRule]) -> Result<Parameterization, PipelineError> {
    let renderer = TemplateRenderer::new();
    let mut parameters: BTreeMap<String, Parameter> = BTreeMap::new();
    let mut bound = Vec::with_capacity(resources.len());

    let parsed: Vec<(&ParameterizerRule, Vec<Segment>)> = rules
        .iter()
        .map(|rule| parse_target(&rule.target).map(|segments| (rule, segments)))
        .collect::<Result<_, _>>()?;

    for resource in resources {
        let mut bindings: Vec<Binding> = Vec::new();
        for (rule, segments) in &parsed {
            if !rule.applies_to(&resource) {
                continue;
            }
            let mut matches = Vec::new();
            resolve(&resource.value, segments, String::new(), None, &mut matches);
            let field = segments
                .iter()
                .rev()
                .find_map(|s| match s {
                    Segment::Key(k) => Some(k.as_str()),
                    _ => None,
                })
                .unwrap_or_default();
            let template = if rule.template.is_empty() {
                default_key_template(segments)
            } else {
                rule.template.as_str()
            };

            for m in matches {
                let data = json!({
                    "kind": resource.kind,
                    "name": resource.name,
                    "apiVersion": resource.api_version,
                    "field": field,
                    "index": m.index,
                    "element": m.element,
                });
                let key = renderer
                    .render(template, &data)
                    .map_err(|reason| PipelineError::TemplateRender {
                        path: resource.file.clone(),
                        reason,
                    })?;
                if key.trim().is_empty() {
                    warn!(target = %rule.target, resource = %resource.name, "Parameter key rendered empty, skipping");
                    continue;
                }
                let parameter = Parameter {
                    default: rule.default.clone().unwrap_or(m.value),
                    per_env: rule.values.clone(),
                };
                match parameters.get(&key) {
                    Some(existing) if *existing != parameter => {
                        warn!(key = %key, resource = %resource.name, "Parameter key reused with different values, keeping the first");
                    }
                    Some(_) => {}
                    None => {
                        parameters.insert(key.clone(), parameter);
                    }
                }
                if bindings.iter().any(|b| b.pointer == m.pointer) {
                    continue;
                }
                bindings.push(Binding { pointer: m.pointer, key });
            }
        }
        bound.push((resource, bindings));
    }

    Ok(Parameterization {
        resources: bound,
        parameters,
    })
}

fn sentinel(i: usize) -> String {
    format!("kubelift-parameter-{}-sentinel", i)
}

/// Serializes `value` with every bound field replaced by `placeholder(key, default)`
fn render_with_placeholders(
    value: &Value,
    bindings: &[Binding],
    parameters: &BTreeMap<String, Parameter>,
    placeholder: impl Fn(&str, &Value) -> String,
) -> Result<String, PipelineError> {
    let mut value = value.clone();
    for (i, binding) in bindings.iter().enumerate() {
        if let Some(field) = value.pointer_mut(&binding.pointer) {
            *field = Value::String(sentinel(i));
        }
    }
    let mut yaml = to_yaml(&value)?;
    for (i, binding) in bindings.iter().enumerate() {
        let default = parameters
            .get(&binding.key)
            .map(|p| &p.default)
            .unwrap_or(&Value::Null);
        yaml = yaml.replace(&sentinel(i), &placeholder(&binding.key, default));
    }
    Ok(yaml)
}

fn to_yaml<T: Serialize>(value: &T) -> Result<String, PipelineError> {
    serde_yaml::to_string(value).map_err(|e| PipelineError::InvalidInput(e.to_string()))
}

fn scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// OpenShift parameter names are upper snake case
fn template_parameter_name(key: &str) -> String {
    let mut name: String = key
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
        .collect();
    if name.starts_with(|c: char| c.is_ascii_digit()) {
        name.insert(0, '_');
    }
    name
}

struct Writer {
    written: Vec<PathBuf>,
}

impl Writer {
    fn write(&mut self, path: PathBuf, contents: impl AsRef<[u8]>) -> Result<(), PipelineError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| PipelineError::io(parent, e))?;
        }
        fs::write(&path, contents).map_err(|e| PipelineError::io(&path, e))?;
        self.written.push(path);
        Ok(())
    }
}

fn write_helm(
    dir: &Path,
    targets: &ParameterizerTargets,
    p: &Parameterization,
    out: &mut Writer,
) -> Result<(), PipelineError> {
    let chart = targets.chart_name();
    out.write(
        dir.join("Chart.yaml"),
        to_yaml(&json!({
            "apiVersion": "v2",
            "name": chart,
            "description": format!("A Helm chart for {}", chart),
            "type": "application",
            "version": "0.1.0",
            "appVersion": "1.0.0",
        }))?,
    )?;
    let defaults: BTreeMap<&str, &Value> =
        p.parameters.iter().map(|(k, v)| (k.as_str(), &v.default)).collect();
    out.write(dir.join("values.yaml"), to_yaml(&defaults)?)?;
    for env in &targets.envs {
        let values: BTreeMap<&str, &Value> =
            p.parameters.iter().map(|(k, v)| (k.as_str(), v.value_for(env))).collect();
        out.write(dir.join(format!("values-{}.yaml", env)), to_yaml(&values)?)?;
    }
    for (resource, bindings) in &p.resources {
        let yaml = render_with_placeholders(&resource.value, bindings, &p.parameters, |key, default| {
            if default.is_string() {
                format!("{{{{ index .Values \"{}\" | quote }}}}", key)
            } else {
                format!("{{{{ index .Values \"{}\" }}}}", key)
            }
        })?;
        out.write(dir.join("templates").join(&resource.file), yaml)?;
    }
    Ok(())
}

fn patch_target(resource: &Resource) -> Value {
    let (group, version) = match resource.api_version.rsplit_once('/') {
        Some((group, version)) => (group, version),
        None => ("", resource.api_version.as_str()),
    };
    let mut target = json!({"version": version, "kind": resource.kind, "name": resource.name});
    if !group.is_empty() {
        target["group"] = json!(group);
    }
    target
}

fn write_kustomize(
    dir: &Path,
    targets: &ParameterizerTargets,
    p: &Parameterization,
    out: &mut Writer,
) -> Result<(), PipelineError> {
    let base = dir.join("base");
    let mut files = Vec::new();
    for (resource, _) in &p.resources {
        out.write(base.join(&resource.file), to_yaml(&resource.value)?)?;
        files.push(unix_path(&resource.file.to_string_lossy()));
    }
    out.write(
        base.join("kustomization.yaml"),
        to_yaml(&json!({
            "apiVersion": KUSTOMIZE_API_VERSION,
            "kind": "Kustomization",
            "resources": files,
        }))?,
    )?;

    for env in &targets.envs {
        let mut patches = Vec::new();
        for (resource, bindings) in &p.resources {
            let ops: Vec<Value> = bindings
                .iter()
                .filter_map(|b| {
                    let value = p.parameters.get(&b.key)?.per_env.get(env)?;
                    Some(json!({"op": "replace", "path": b.pointer, "value": value}))
                })
                .collect();
            if ops.is_empty() {
                continue;
            }
            patches.push(json!({"target": patch_target(resource), "patch": to_yaml(&ops)?}));
        }
        let mut kustomization = json!({
            "apiVersion": KUSTOMIZE_API_VERSION,
            "kind": "Kustomization",
            "resources": ["../../base"],
        });
        if !patches.is_empty() {
            kustomization["patches"] = json!(patches);
        }
        out.write(
            dir.join("overlays").join(env).join("kustomization.yaml"),
            to_yaml(&kustomization)?,
        )?;
    }
    Ok(())
}

fn write_openshift(
    dir: &Path,
    targets: &ParameterizerTargets,
    p: &Parameterization,
    out: &mut Writer,
) -> Result<(), PipelineError> {
    let name = targets.chart_name();
    let mut objects = Vec::new();
    let mut bindings_all = Vec::new();
    for (resource, bindings) in &p.resources {
        let mut value = resource.value.clone();
        for binding in bindings {
            if let Some(field) = value.pointer_mut(&binding.pointer) {
                *field = Value::String(sentinel(bindings_all.len()));
                bindings_all.push(binding.clone());
            }
        }
        objects.push(value);
    }
    let parameters: Vec<Value> = p
        .parameters
        .iter()
        .map(|(key, param)| json!({"name": template_parameter_name(key), "value": scalar(&param.default)}))
        .collect();
    let mut yaml = to_yaml(&json!({
        "apiVersion": "template.openshift.io/v1",
        "kind": "Template",
        "metadata": {"name": name},
        "objects": objects,
        "parameters": parameters,
    }))?;
    for (i, binding) in bindings_all.iter().enumerate() {
        let param = template_parameter_name(&binding.key);
        let is_string = p
            .parameters
            .get(&binding.key)
            .map(|p| p.default.is_string())
            .unwrap_or(true);
        let placeholder = if is_string {
            format!("${{{}}}", param)
        } else {
            format!("${{{{{}}}}}", param)
        };
        yaml = yaml.replace(&sentinel(i), &placeholder);
    }
    out.write(dir.join(format!("{}-template.yaml", name)), yaml)?;

    for env in &targets.envs {
        let lines: String = p
            .parameters
            .iter()
            .map(|(key, param)| format!("{}={}\n", template_parameter_name(key), scalar(param.value_for(env))))
            .collect();
        out.write(dir.join(format!("parameters-{}.env", env)), lines)?;
    }
    Ok(())
}

/// Parameterizes every manifest under `input` into `output`, returning the
/// files written
pub fn parameterize(
    input: &Path,
    output: &Path,
    targets: &ParameterizerTargets,
    rules: &[ParameterizerRule],
) -> Result<Vec<PathBuf>, PipelineError> {
    let resources = load_resources(input)?;
    let parameterization = bind(resources, rules)?;
    let mut out = Writer { written: Vec::new() };

    if !targets.helm.is_empty() {
        let dir = output.join(&targets.helm).join(targets.chart_name());
        write_helm(&dir, targets, &parameterization, &mut out)?;
    }
    if !targets.kustomize.is_empty() {
        write_kustomize(&output.join(&targets.kustomize), targets, &parameterization, &mut out)?;
    }
    if !targets.octemplates.is_empty() {
        write_openshift(&output.join(&targets.octemplates), targets, &parameterization, &mut out)?;
    }

    info!(
        resources = parameterization.resources.len(),
        parameters = parameterization.parameters.len(),
        files = out.written.len(),
        "Parameterized manifests"
    );
    Ok(out.written)
}

#[derive(Debug, Default)]
pub struct Parameterizer {
    targets: ParameterizerTargets,
    rules: Vec<ParameterizerRule>,
}

#[async_trait]
impl Transformer for Parameterizer {
    fn init(&mut self, config: &TransformerConfig) -> Result<(), PipelineError> {
        self.targets = config
            .descriptor
            .config_as()
            .map_err(|e| PipelineError::transformer(config.name(), "-", "init", e))?;
        if self.targets.project_name.is_empty() {
            self.targets.project_name = config.env.project_name().to_string();
        }
        self.rules = collect_rules(config.env.context());
        Ok(())
    }

    async fn transform(
        &self,
        config: &TransformerConfig,
        new: &[Artifact],
        _seen: &[Artifact],
    ) -> Result<TransformOutput, PipelineError> {
        let env = &config.env;
        let mut output = TransformOutput::default();

        for artifact in new.iter().filter(|a| a.artifact_type == ArtifactType::KUBERNETES_YAMLS) {
            for input in artifact.paths_of(PathType::KUBERNETES_YAMLS) {
                env.check_cancelled()?;
                let dest = env.output().join(PARAMETERIZED_DIR);
                parameterize(input, &dest, &self.targets, &self.rules).map_err(|e| {
                    PipelineError::transformer(config.name(), &artifact.name, "parameterize", e)
                })?;
                for dir in self.targets.dirs() {
                    output
                        .path_mappings
                        .push(PathMapping::copy(dest.join(dir), Path::new(DEPLOY_DIR).join(dir)));
                }
            }
        }
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    const DEPLOYMENT: &str = r#"apiVersion: apps/v1
kind: Deployment
metadata:
  name: web
spec:
  replicas: 1
  template:
    spec:
      containers:
        - name: web
          image: web:latest
        - name: sidecar
          image: proxy:1
"#;

    const SERVICE: &str = r#"apiVersion: v1
kind: Service
metadata:
  name: web
spec:
  ports:
    - port: 80
"#;

    const RULES: &str = r#"kind: Parameterizer
spec:
  parameterizers:
    - target: spec.replicas
      filters:
        - kind: Deployment
      values:
        prod: 3
    - target: spec.template.spec.containers[*].image
      template: "{{ .name }}.{{ .element.name }}.image"
"#;

    fn fixture() -> (TempDir, PathBuf, Vec<ParameterizerRule>) {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("k8s-resources");
        fs::create_dir_all(&input).unwrap();
        fs::write(input.join("web-deployment.yaml"), DEPLOYMENT).unwrap();
        fs::write(input.join("web-service.yaml"), SERVICE).unwrap();
        let rules_dir = dir.path().join("rules");
        fs::create_dir_all(&rules_dir).unwrap();
        fs::write(rules_dir.join("params.yaml"), RULES).unwrap();
        fs::write(rules_dir.join("transformer.yaml"), "kind: Transformer\nname: x\nclass: y\n").unwrap();
        let rules = collect_rules(&rules_dir);
        (dir, input, rules)
    }

    fn yaml(path: &Path) -> Value {
        serde_yaml::from_str(&fs::read_to_string(path).unwrap()).unwrap()
    }

    fn targets() -> ParameterizerTargets {
        ParameterizerTargets {
            envs: vec!["dev".into(), "prod".into()],
            project_name: "shop".into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_parse_target() {
        assert_eq!(
            parse_target("spec.containers[*].ports[0]").unwrap(),
            vec![
                Segment::Key("spec".into()),
                Segment::Key("containers".into()),
                Segment::All,
                Segment::Key("ports".into()),
                Segment::Index(0),
            ]
        );
        assert!(parse_target("spec..x").is_err());
        assert!(parse_target("spec[x]").is_err());
    }

    #[test]
    fn test_collect_rules_ignores_other_kinds() {
        let (_dir, _input, rules) = fixture();
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0].target, "spec.replicas");
    }

    #[test]
    fn test_parameterize_writes_all_flavours() {
        let (dir, input, rules) = fixture();
        let output = dir.path().join("out");
        let written = parameterize(&input, &output, &targets(), &rules).unwrap();

        // helm: chart, values, 2 env values, 2 templates
        // kustomize: 2 base files, base kustomization, 2 overlays
        // openshift: template, 2 parameter files
        assert_eq!(written.len(), 14);

        let chart = output.join("helm-chart/shop");
        assert_eq!(yaml(&chart.join("Chart.yaml"))["name"], "shop");
        assert_eq!(
            yaml(&chart.join("values.yaml")),
            json!({"web.replicas": 1, "web.web.image": "web:latest", "web.sidecar.image": "proxy:1"})
        );
        assert_eq!(yaml(&chart.join("values-prod.yaml"))["web.replicas"], 3);
        assert_eq!(yaml(&chart.join("values-dev.yaml"))["web.replicas"], 1);

        let template = fs::read_to_string(chart.join("templates/web-deployment.yaml")).unwrap();
        assert!(template.contains(r#"replicas: {{ index .Values "web.replicas" }}"#));
        assert!(template.contains(r#"image: {{ index .Values "web.sidecar.image" | quote }}"#));
        let service = fs::read_to_string(chart.join("templates/web-service.yaml")).unwrap();
        assert!(!service.contains("{{"));

        let kustomize = output.join("kustomize");
        assert_eq!(
            yaml(&kustomize.join("base/kustomization.yaml"))["resources"],
            json!(["web-deployment.yaml", "web-service.yaml"])
        );
        let prod = yaml(&kustomize.join("overlays/prod/kustomization.yaml"));
        assert_eq!(prod["patches"][0]["target"]["group"], "apps");
        let ops: Value = serde_yaml::from_str(prod["patches"][0]["patch"].as_str().unwrap()).unwrap();
        assert_eq!(ops, json!([{"op": "replace", "path": "/spec/replicas", "value": 3}]));
        assert!(yaml(&kustomize.join("overlays/dev/kustomization.yaml"))
            .get("patches")
            .is_none());

        let oc = output.join("openshift-templates");
        let template = fs::read_to_string(oc.join("shop-template.yaml")).unwrap();
        assert!(template.contains("replicas: ${{WEB_REPLICAS}}"));
        assert!(template.contains("image: ${WEB_WEB_IMAGE}"));
        let prod_env = fs::read_to_string(oc.join("parameters-prod.env")).unwrap();
        assert!(prod_env.contains("WEB_REPLICAS=3\n"));
        assert!(prod_env.contains("WEB_SIDECAR_IMAGE=proxy:1\n"));
    }

    #[test]
    fn test_empty_target_dir_is_skipped() {
        let (dir, input, rules) = fixture();
        let output = dir.path().join("out");
        let targets = ParameterizerTargets {
            kustomize: String::new(),
            octemplates: String::new(),
            ..targets()
        };
        let written = parameterize(&input, &output, &targets, &rules).unwrap();
        assert_eq!(written.len(), 6);
        assert!(!output.join("kustomize").exists());
    }

    #[test]
    fn test_parameterize_is_deterministic() {
        let (dir, input, rules) = fixture();
        let a = dir.path().join("a");
        let b = dir.path().join("b");
        let first = parameterize(&input, &a, &targets(), &rules).unwrap();
        parameterize(&input, &b, &targets(), &rules).unwrap();
        for file in first {
            let rel = file.strip_prefix(&a).unwrap();
            assert_eq!(fs::read(&file).unwrap(), fs::read(b.join(rel)).unwrap());
        }
    }
}
