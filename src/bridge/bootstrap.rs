//! Background context bootstrap.
//!
//! Builds the script evaluated once when the bridge is set up: extension
//! metadata and the locale catalog first, then every background script in
//! configuration order. Missing resources are skipped with a warning.

use serde::Serialize;
use serde_json::Value;

use crate::config::{BridgeConfig, ManifestInfo};
use crate::error::BridgeResult;
use crate::host::ResourceBundle;

/// Arguments of a `setup` call from the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetupRequest {
    /// Base URI the background page is served from.
    pub base_uri: String,
    pub manifest: ManifestInfo,
}

impl SetupRequest {
    pub fn describe(&self) -> String {
        format!(
            "{} ({} {})",
            self.base_uri, self.manifest.id, self.manifest.version
        )
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Environment<'a> {
    base_uri: &'a str,
    manifest: &'a ManifestInfo,
    locale: Option<&'a str>,
    messages: Value,
}

/// Resource path of a locale's message catalog.
pub fn locale_resource(language: &str) -> String {
    format!("_locales/{}/messages.json", language)
}

/// Compose the bootstrap script for `request`.
pub fn build_script(
    request: &SetupRequest,
    config: &BridgeConfig,
    bundle: &dyn ResourceBundle,
) -> BridgeResult<String> {
    let locale = config.locale.default.as_deref();
    let messages = match locale {
        Some(language) => load_catalog(bundle, language),
        None => Value::Object(Default::default()),
    };

    let environment = Environment {
        base_uri: &request.base_uri,
        manifest: &request.manifest,
        locale,
        messages,
    };

    let mut script = format!(
        "globalThis.__tabrelayEnvironment = {};\n",
        serde_json::to_string(&environment)?
    );

    for name in &config.background.scripts {
        match bundle.read_text(name) {
            Some(source) => {
                script.push_str(&format!("// {}\n", name));
                script.push_str(&source);
                if !source.ends_with('\n') {
                    script.push('\n');
                }
            }
            None => tracing::warn!("Background script '{}' not found in bundle, skipping", name),
        }
    }

    Ok(script)
}

fn load_catalog(bundle: &dyn ResourceBundle, language: &str) -> Value {
    let resource = locale_resource(language);
    let Some(text) = bundle.read_text(&resource) else {
        tracing::warn!("Locale catalog '{}' not found in bundle", resource);
        return Value::Object(Default::default());
    };

    match serde_json::from_str::<Value>(&text) {
        Ok(catalog @ Value::Object(_)) => catalog,
        Ok(_) => {
            tracing::warn!("Locale catalog '{}' is not a JSON object", resource);
            Value::Object(Default::default())
        }
        Err(e) => {
            tracing::warn!("Failed to parse locale catalog '{}': {}", resource, e);
            Value::Object(Default::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::RecordingHost;

    fn request() -> SetupRequest {
        SetupRequest {
            base_uri: "safari-web-extension://abc/".to_string(),
            manifest: ManifestInfo {
                name: "Reader".to_string(),
                version: "1.0".to_string(),
                id: "com.example.reader".to_string(),
            },
        }
    }

    #[test]
    fn test_scripts_in_config_order_and_missing_skipped() {
        let bundle = RecordingHost::new();
        bundle.add_resource("a.js", "first();");
        bundle.add_resource("c.js", "third();\n");

        let mut config = BridgeConfig::default();
        config.background.scripts = vec!["a.js".into(), "b.js".into(), "c.js".into()];

        let script = build_script(&request(), &config, &bundle).unwrap();
        let first = script.find("first();").unwrap();
        let third = script.find("third();").unwrap();
        assert!(first < third);
        assert!(!script.contains("// b.js"));
        assert!(script.starts_with("globalThis.__tabrelayEnvironment = "));
    }

    #[test]
    fn test_environment_carries_manifest_and_catalog() {
        let bundle = RecordingHost::new();
        bundle.add_resource(
            locale_resource("en"),
            r#"{"greeting": {"message": "Hello"}}"#,
        );

        let script = build_script(&request(), &BridgeConfig::default(), &bundle).unwrap();
        let line = script.lines().next().unwrap();
        let json = line
            .trim_start_matches("globalThis.__tabrelayEnvironment = ")
            .trim_end_matches(';');
        let env: Value = serde_json::from_str(json).unwrap();

        assert_eq!(env["manifest"]["id"], "com.example.reader");
        assert_eq!(env["baseUri"], "safari-web-extension://abc/");
        assert_eq!(env["locale"], "en");
        assert_eq!(env["messages"]["greeting"]["message"], "Hello");
    }

    #[test]
    fn test_bad_catalog_becomes_empty() {
        let bundle = RecordingHost::new();
        bundle.add_resource(locale_resource("en"), "not json");

        let script = build_script(&request(), &BridgeConfig::default(), &bundle).unwrap();
        assert!(script.contains(r#""messages":{}"#));
    }
}
