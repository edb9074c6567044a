//! Binding schema pipeline (spec §4.9 steps 1, 2, 5, 6): locate game
//! installations, cache extracted default-profile XML, parse it into
//! [`BindingAction`]s, and diff two parsed schemas across builds.

use crate::binding::binxml::XmlNode;
use crate::error::{AsteriqError, Result, SchemaDiffWarning};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Search priority for known install roots (spec §4.9 step 1).
pub const ENVIRONMENT_PRIORITY: &[&str] = &["LIVE", "PTU", "EPTU", "TECH-PREVIEW", "HOTFIX"];

#[derive(Debug, Clone)]
pub struct Installation {
    pub environment: String,
    pub root: PathBuf,
    pub archive_path: PathBuf,
    pub mappings_dir: PathBuf,
    pub build_id: Option<String>,
}

/// Probe `candidate_roots` (one candidate path per environment, caller-
/// supplied since the actual install-root guesses are a platform/launcher
/// concern outside this module) and return installations found, ordered
/// by [`ENVIRONMENT_PRIORITY`].
pub fn locate_installations(candidate_roots: &HashMap<String, PathBuf>) -> Vec<Installation> {
    let mut found = Vec::new();
    for env in ENVIRONMENT_PRIORITY {
        let Some(root) = candidate_roots.get(*env) else {
            continue;
        };
        let archive_path = root.join("Data.p4k");
        let mappings_dir = root.join("USER").join("Client").join("0").join("Controls").join("Mappings");
        if !archive_path.exists() {
            continue;
        }
        let build_id = read_build_id(root);
        found.push(Installation {
            environment: env.to_string(),
            root: root.clone(),
            archive_path,
            mappings_dir,
            build_id,
        });
    }
    found
}

fn read_build_id(root: &Path) -> Option<String> {
    let manifest = root.join("build_manifest.id");
    let text = fs::read_to_string(manifest).ok()?;
    text.lines()
        .find_map(|line| line.strip_prefix("ShelveName="))
        .map(|s| s.trim().to_string())
}

/// Cache key for extracted default-profile XML (spec §4.9 step 2).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CacheKey {
    BuildId { environment: String, build_id: String },
    ArchiveFingerprint { environment: String, size: u64, modified_unix: u64 },
}

impl CacheKey {
    pub fn for_installation(installation: &Installation) -> Result<Self> {
        if let Some(build_id) = &installation.build_id {
            return Ok(CacheKey::BuildId {
                environment: installation.environment.clone(),
                build_id: build_id.clone(),
            });
        }
        let meta = fs::metadata(&installation.archive_path)?;
        let modified_unix = meta
            .modified()?
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        Ok(CacheKey::ArchiveFingerprint {
            environment: installation.environment.clone(),
            size: meta.len(),
            modified_unix,
        })
    }
}

pub struct SchemaCache {
    root: PathBuf,
}

impl SchemaCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, key: &CacheKey) -> PathBuf {
        let name = match key {
            CacheKey::BuildId { environment, build_id } => format!("{environment}-{build_id}.xml"),
            CacheKey::ArchiveFingerprint { environment, size, modified_unix } => {
                format!("{environment}-{size}-{modified_unix}.xml")
            }
        };
        self.root.join(name)
    }

    pub fn get(&self, key: &CacheKey) -> Option<Vec<u8>> {
        fs::read(self.path_for(key)).ok()
    }

    pub fn put(&self, key: &CacheKey, blob: &[u8]) -> Result<()> {
        fs::create_dir_all(&self.root)?;
        fs::write(self.path_for(key), blob)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InputKind {
    Button,
    Axis,
    Hat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActivationMode {
    Press,
    Hold,
    DoubleTap,
    TripleTap,
    DelayedPress,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefaultBinding {
    pub device_prefix: String,
    pub input_token: String,
    pub inverted: bool,
    pub activation_mode: ActivationMode,
    pub modifiers: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindingAction {
    pub action_map: String,
    pub action_name: String,
    pub category: String,
    pub expected_input_kind: InputKind,
    pub default_bindings: Vec<DefaultBinding>,
}

#[derive(Debug, Clone, Default)]
pub struct ParsedSchema {
    pub actions: Vec<BindingAction>,
}

/// Infer input kind from action-name conventions and the presence of
/// axis-style tokens among its default bindings (spec §4.9 step 5).
fn infer_input_kind(action_name: &str, bindings: &[DefaultBinding]) -> InputKind {
    let lower = action_name.to_ascii_lowercase();
    if bindings.iter().any(|b| is_axis_token(&b.input_token)) {
        return InputKind::Axis;
    }
    if lower.contains("pov") || lower.contains("hat") {
        return InputKind::Hat;
    }
    if lower.contains("axis")
        || lower.contains("throttle")
        || lower.contains("translation")
        || lower.contains("rotation")
        || lower.contains("strafe")
        || lower.contains("pitch")
        || lower.contains("yaw")
        || lower.contains("roll")
    {
        return InputKind::Axis;
    }
    InputKind::Button
}

fn is_axis_token(token: &str) -> bool {
    const AXIS_SUFFIXES: &[&str] = &["x", "y", "z", "rotx", "roty", "rotz", "slider"];
    AXIS_SUFFIXES.iter().any(|s| token.eq_ignore_ascii_case(s))
}

/// Split `modifier+key` strings into the leaf token plus the list of
/// preceding modifier names (spec §4.9 step 5).
fn split_modifiers(raw: &str) -> (Vec<String>, String) {
    let mut parts: Vec<&str> = raw.split('+').collect();
    let token = parts.pop().unwrap_or("").to_string();
    (parts.into_iter().map(|s| s.to_string()).collect(), token)
}

fn parse_activation_mode(attr: Option<&str>) -> ActivationMode {
    match attr {
        Some("hold") => ActivationMode::Hold,
        Some("double_tap") => ActivationMode::DoubleTap,
        Some("triple_tap") => ActivationMode::TripleTap,
        Some("delayed_press") => ActivationMode::DelayedPress,
        _ => ActivationMode::Press,
    }
}

fn parse_rebind(node: &XmlNode, prefix: &str) -> Option<DefaultBinding> {
    let raw_input = node.attr("input")?;
    let (modifiers, token) = split_modifiers(raw_input);
    Some(DefaultBinding {
        device_prefix: prefix.to_string(),
        input_token: token,
        inverted: node.attr("invert").map(|v| v == "1").unwrap_or(false),
        activation_mode: parse_activation_mode(node.attr("activationMode")),
        modifiers,
    })
}

fn parse_action(action_map: &str, node: &XmlNode) -> Option<BindingAction> {
    let action_name = node.attr("name")?.to_string();
    let category = node.attr("UICategory").unwrap_or("").to_string();
    let mut default_bindings = Vec::new();

    if let Some(kb) = node.children_named("keyboard").next() {
        default_bindings.extend(parse_rebind(kb, "kb"));
    }
    if let Some(mo) = node.children_named("mouse").next() {
        default_bindings.extend(parse_rebind(mo, "mo"));
    }
    for js in node.children_named("joystick") {
        default_bindings.extend(parse_rebind(js, "js"));
        for rebind in js.children_named("rebind") {
            default_bindings.extend(parse_rebind(rebind, "js"));
        }
    }
    for rebind in node.children_named("rebind") {
        default_bindings.extend(parse_rebind(rebind, "js"));
    }

    let expected_input_kind = infer_input_kind(&action_name, &default_bindings);
    Some(BindingAction {
        action_map: action_map.to_string(),
        action_name,
        category,
        expected_input_kind,
        default_bindings,
    })
}

/// Traverse an `ActionMaps` tree into a flat list of actions (spec §4.9
/// step 5).
pub fn parse_schema(root: &XmlNode) -> Result<ParsedSchema> {
    if root.name != "ActionMaps" {
        return Err(AsteriqError::BinaryXmlParseError(format!(
            "expected root element `ActionMaps`, found `{}`",
            root.name
        )));
    }
    let mut actions = Vec::new();
    for action_map in root.children_named("actionmap") {
        let Some(map_name) = action_map.attr("name") else {
            continue;
        };
        for action in action_map.children_named("action") {
            if let Some(parsed) = parse_action(map_name, action) {
                actions.push(parsed);
            }
        }
    }
    Ok(ParsedSchema { actions })
}

/// Compare two parsed schemas, flagging added/removed actions and
/// best-effort renames by token overlap within the same action map
/// (spec §4.9 step 6).
pub fn diff_schemas(old: &ParsedSchema, new: &ParsedSchema) -> SchemaDiffWarning {
    let old_keys: HashMap<String, &BindingAction> = old
        .actions
        .iter()
        .map(|a| (format!("{}/{}", a.action_map, a.action_name), a))
        .collect();
    let new_keys: HashMap<String, &BindingAction> = new
        .actions
        .iter()
        .map(|a| (format!("{}/{}", a.action_map, a.action_name), a))
        .collect();

    let mut removed: Vec<String> = old_keys
        .keys()
        .filter(|k| !new_keys.contains_key(*k))
        .cloned()
        .collect();
    let mut added: Vec<String> = new_keys
        .keys()
        .filter(|k| !old_keys.contains_key(*k))
        .cloned()
        .collect();

    let mut renamed = Vec::new();
    removed.retain(|removed_key| {
        let removed_action = old_keys[removed_key];
        if let Some(best) = added
            .iter()
            .filter(|added_key| added_key.starts_with(&format!("{}/", removed_action.action_map)))
            .max_by_key(|added_key| token_overlap(removed_key, added_key))
        {
            if token_overlap(removed_key, best) >= 2 {
                renamed.push((removed_key.clone(), best.clone()));
                let best = best.clone();
                added.retain(|k| k != &best);
                return false;
            }
        }
        true
    });

    SchemaDiffWarning { added, removed, renamed }
}

fn token_overlap(a: &str, b: &str) -> usize {
    let a_tokens: Vec<&str> = a.rsplit('/').next().unwrap_or("").split('_').collect();
    let b_tokens: Vec<&str> = b.rsplit('/').next().unwrap_or("").split('_').collect();
    a_tokens.iter().filter(|t| b_tokens.contains(t)).count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::binxml::decode;

    fn sample_schema(pitch_name: &str) -> ParsedSchema {
        let xml = format!(
            r#"<ActionMaps>
                <actionmap name="spaceship_general">
                    <action name="{pitch_name}" UICategory="flight">
                        <joystick input="js1_roty"/>
                    </action>
                    <action name="v_toggle_landing_gear" UICategory="flight">
                        <keyboard input="alt+n"/>
                    </action>
                </actionmap>
            </ActionMaps>"#
        );
        let node = decode(xml.as_bytes()).unwrap();
        parse_schema(&node).unwrap()
    }

    #[test]
    fn infers_axis_from_token_and_button_from_default() {
        let schema = sample_schema("v_pitch");
        let pitch = schema.actions.iter().find(|a| a.action_name == "v_pitch").unwrap();
        assert_eq!(pitch.expected_input_kind, InputKind::Axis);
        let gear = schema
            .actions
            .iter()
            .find(|a| a.action_name == "v_toggle_landing_gear")
            .unwrap();
        assert_eq!(gear.expected_input_kind, InputKind::Button);
        assert_eq!(gear.default_bindings[0].modifiers, vec!["alt".to_string()]);
    }

    #[test]
    fn diff_detects_added_removed_and_renamed() {
        let old = sample_schema("v_pitch");
        let new = sample_schema("v_pitch_axis");
        let diff = diff_schemas(&old, &new);
        assert!(diff.renamed.iter().any(|(from, to)| from.ends_with("v_pitch") && to.ends_with("v_pitch_axis")));
        assert!(diff.added.is_empty());
        assert!(diff.removed.is_empty());
    }
}
