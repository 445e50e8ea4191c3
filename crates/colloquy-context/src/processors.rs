use std::collections::HashMap;

use serde_json::Value;
use tracing::debug;

use colloquy_core::types::Metadata;

type Processor = Box<dyn Fn(&Metadata) -> String + Send + Sync>;

/// Registry of caller-context processors, keyed by the payload's `type`
/// field. Each processor renders a human-readable prefix for the system
/// message. Unknown types degrade to `general`; they never crash.
pub struct ContextProcessors {
    processors: HashMap<String, Processor>,
}

impl Default for ContextProcessors {
    fn default() -> Self {
        Self::new()
    }
}

impl ContextProcessors {
    pub fn new() -> Self {
        let mut p = Self {
            processors: HashMap::new(),
        };
        p.register("general", Box::new(render_general));
        p.register("user_profile", Box::new(render_user_profile));
        p.register("domain", Box::new(render_domain));
        p.register("system", Box::new(render_system));
        p.register("location", Box::new(render_location));
        p.register("custom", Box::new(render_custom));
        p
    }

    /// Register (or replace) the processor for one type tag.
    pub fn register(&mut self, context_type: &str, processor: Processor) {
        self.processors.insert(context_type.to_string(), processor);
    }

    /// Render the caller context into a system-message prefix.
    pub fn process(&self, context: &Metadata) -> String {
        let requested = context
            .get("type")
            .and_then(|v| v.as_str())
            .unwrap_or("general");
        let processor = self.processors.get(requested).unwrap_or_else(|| {
            debug!(context_type = requested, "unknown context type, using general");
            &self.processors["general"]
        });
        processor(context)
    }
}

/// Stable flat enumeration of every field except the dispatch tag. Keys are
/// sorted so repeated assembly of the same payload is byte-identical.
fn flat_fields(context: &Metadata) -> Vec<(String, String)> {
    let mut fields: Vec<(String, String)> = context
        .iter()
        .filter(|(k, _)| *k != "type")
        .map(|(k, v)| (k.clone(), render_value(v)))
        .collect();
    fields.sort();
    fields
}

fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn render_general(context: &Metadata) -> String {
    let fields = flat_fields(context);
    if fields.is_empty() {
        return String::new();
    }
    let pairs: Vec<String> = fields.iter().map(|(k, v)| format!("{k}={v}")).collect();
    format!("User context: {}.", pairs.join(", "))
}

fn render_user_profile(context: &Metadata) -> String {
    let name = context
        .get("name")
        .and_then(|v| v.as_str())
        .unwrap_or("unknown");
    let mut out = format!("User is {name}.");
    if let Some(prefs) = context.get("preferences") {
        match prefs {
            Value::Object(map) => {
                let mut keys: Vec<&String> = map.keys().collect();
                keys.sort();
                let rendered: Vec<String> = keys
                    .into_iter()
                    .map(|k| format!("{k}={}", render_value(&map[k])))
                    .collect();
                out.push_str(&format!(" Preferences: {}.", rendered.join(", ")));
            }
            other => out.push_str(&format!(" Preferences: {}.", render_value(other))),
        }
    }
    out
}

fn render_domain(context: &Metadata) -> String {
    let mut out = String::from("Relevant domain knowledge:");
    match context.get("facts") {
        Some(Value::Array(items)) => {
            for item in items {
                out.push_str(&format!("\n- {}", render_value(item)));
            }
        }
        _ => {
            for (k, v) in flat_fields(context) {
                out.push_str(&format!("\n- {k}: {v}"));
            }
        }
    }
    out
}

fn render_system(context: &Metadata) -> String {
    let fields = flat_fields(context);
    let pairs: Vec<String> = fields.iter().map(|(k, v)| format!("{k}={v}")).collect();
    format!("Current system state: {}.", pairs.join(", "))
}

fn render_location(context: &Metadata) -> String {
    let place = context
        .get("place")
        .and_then(|v| v.as_str())
        .unwrap_or("an unknown location");
    let coords = match (context.get("lat"), context.get("lon")) {
        (Some(lat), Some(lon)) => format!(" (coords {},{})", render_value(lat), render_value(lon)),
        _ => String::new(),
    };
    format!("User is located at {place}{coords}.")
}

fn render_custom(context: &Metadata) -> String {
    context
        .get("text")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(json: serde_json::Value) -> Metadata {
        match json {
            Value::Object(map) => map,
            _ => panic!("test context must be an object"),
        }
    }

    #[test]
    fn general_enumerates_sorted_fields() {
        let p = ContextProcessors::new();
        let out = p.process(&ctx(serde_json::json!({
            "type": "general", "b": "two", "a": 1
        })));
        assert_eq!(out, "User context: a=1, b=two.");
    }

    #[test]
    fn unknown_type_degrades_to_general() {
        let p = ContextProcessors::new();
        let out = p.process(&ctx(serde_json::json!({
            "type": "galactic", "x": "y"
        })));
        assert_eq!(out, "User context: x=y.");
    }

    #[test]
    fn user_profile_names_user_and_preferences() {
        let p = ContextProcessors::new();
        let out = p.process(&ctx(serde_json::json!({
            "type": "user_profile",
            "name": "Ada",
            "preferences": {"tone": "brief", "language": "en"}
        })));
        assert_eq!(out, "User is Ada. Preferences: language=en, tone=brief.");
    }

    #[test]
    fn domain_bullets_facts() {
        let p = ContextProcessors::new();
        let out = p.process(&ctx(serde_json::json!({
            "type": "domain",
            "facts": ["ICBC is a bank", "Founded 1984"]
        })));
        assert_eq!(
            out,
            "Relevant domain knowledge:\n- ICBC is a bank\n- Founded 1984"
        );
    }

    #[test]
    fn location_renders_coords_when_present() {
        let p = ContextProcessors::new();
        let out = p.process(&ctx(serde_json::json!({
            "type": "location", "place": "Lisbon", "lat": 38.72, "lon": -9.14
        })));
        assert_eq!(out, "User is located at Lisbon (coords 38.72,-9.14).");
    }

    #[test]
    fn custom_passes_text_verbatim() {
        let p = ContextProcessors::new();
        let out = p.process(&ctx(serde_json::json!({
            "type": "custom", "text": "Remember: the user is on call."
        })));
        assert_eq!(out, "Remember: the user is on call.");
    }

    #[test]
    fn processing_is_idempotent() {
        let p = ContextProcessors::new();
        let payload = ctx(serde_json::json!({
            "type": "general", "k1": "v1", "k2": "v2", "k3": 3
        }));
        assert_eq!(p.process(&payload), p.process(&payload));
    }
}
