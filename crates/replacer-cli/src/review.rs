//! Admission-style review of ConfigMap and Secret documents.
//!
//! A resource is substituted with a replacer configured from its own
//! annotations. The outcome is a [`Verdict`]: allowed unchanged, allowed with
//! a JSON patch, or rejected with the failure message.

use anyhow::{Context, Result};
use base64::{engine::general_purpose, Engine as _};
use replacer_core::{ProviderRegistry, Replacer, ReplacerSettings};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Resource {
    #[serde(default)]
    pub kind: String,
    #[serde(default)]
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub data: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ObjectMeta {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub annotations: HashMap<String, String>,
}

/// A single JSON-Patch operation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PatchOperation {
    pub op: String,
    pub path: String,
    pub value: String,
}

impl PatchOperation {
    fn replace_data(key: &str, value: String) -> Self {
        Self {
            op: "replace".to_string(),
            path: format!("/data/{}", escape_pointer(key)),
            value,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Verdict {
    pub allowed: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub patch: Vec<PatchOperation>,
}

impl Verdict {
    fn allowed(message: &str) -> Self {
        Self {
            allowed: true,
            message: message.to_string(),
            patch: Vec::new(),
        }
    }

    fn patched(patch: Vec<PatchOperation>) -> Self {
        Self {
            allowed: true,
            message: "replacer changes".to_string(),
            patch,
        }
    }

    fn rejected(err: &anyhow::Error) -> Self {
        Self {
            allowed: false,
            message: format!("{:#}", err),
            patch: Vec::new(),
        }
    }
}

/// Escape a JSON pointer reference token.
fn escape_pointer(token: &str) -> String {
    token.replace('~', "~0").replace('/', "~1")
}

#[derive(Clone, Copy, PartialEq)]
enum Encoding {
    Plain,
    Base64,
}

pub struct Reviewer {
    registry: Arc<ProviderRegistry>,
    settings: ReplacerSettings,
}

impl Reviewer {
    pub fn new(registry: Arc<ProviderRegistry>, settings: ReplacerSettings) -> Self {
        Self { registry, settings }
    }

    /// Review a raw JSON document.
    pub async fn review_json(&self, document: &str) -> Verdict {
        match serde_json::from_str::<Resource>(document).context("failed to decode resource") {
            Ok(resource) => self.review(&resource).await,
            Err(e) => Verdict::rejected(&e),
        }
    }

    pub async fn review(&self, resource: &Resource) -> Verdict {
        let encoding = match resource.kind.as_str() {
            "Secret" => Encoding::Base64,
            "ConfigMap" => Encoding::Plain,
            _ => return Verdict::allowed("not a secret or configmap"),
        };
        if resource.data.is_empty() {
            return Verdict::allowed("no data to replace");
        }

        info!(
            "Reviewing {} {}/{}",
            resource.kind, resource.metadata.namespace, resource.metadata.name
        );

        match self.patches(resource, encoding).await {
            Ok(patch) if patch.is_empty() => Verdict::allowed("no changes"),
            Ok(patch) => {
                debug!("{} data keys changed", patch.len());
                Verdict::patched(patch)
            }
            Err(e) => {
                warn!("Rejecting {}: {:#}", resource.metadata.name, e);
                Verdict::rejected(&e)
            }
        }
    }

    async fn patches(
        &self,
        resource: &Resource,
        encoding: Encoding,
    ) -> Result<Vec<PatchOperation>> {
        let mut replacer = Replacer::with_settings(
            self.registry.clone(),
            resource.metadata.annotations.clone(),
            self.settings.clone(),
        )?;

        let mut patch = Vec::new();
        for (key, raw) in &resource.data {
            let old = match encoding {
                Encoding::Plain => raw.clone(),
                Encoding::Base64 => match decode_secret_value(key, raw)? {
                    Some(text) => text,
                    None => {
                        debug!("Skipping binary data key {}", key);
                        continue;
                    }
                },
            };

            let new = replacer.replace_all(&old).await?;
            if new == old {
                continue;
            }

            let value = match encoding {
                Encoding::Plain => new,
                Encoding::Base64 => general_purpose::STANDARD.encode(new),
            };
            patch.push(PatchOperation::replace_data(key, value));
        }

        Ok(patch)
    }
}

/// Decode a Secret data value. Binary payloads yield `None`; they cannot
/// hold directives.
fn decode_secret_value(key: &str, raw: &str) -> Result<Option<String>> {
    let bytes = general_purpose::STANDARD
        .decode(raw)
        .with_context(|| format!("data key {} is not valid base64", key))?;
    Ok(String::from_utf8(bytes).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use replacer_core::StaticProvider;
    use serde_json::json;

    fn reviewer() -> Reviewer {
        let registry = Arc::new(ProviderRegistry::new());
        registry.register("test", || {
            Ok(Box::new(
                StaticProvider::new()
                    .with_value("user", "admin")
                    .with_value("password", "hunter2"),
            ))
        });
        Reviewer::new(registry, ReplacerSettings::default())
    }

    fn document(kind: &str, data: serde_json::Value) -> String {
        json!({
            "kind": kind,
            "metadata": {
                "name": "app",
                "namespace": "default",
                "annotations": { "replacer.agb.dev/provider": "test" }
            },
            "data": data
        })
        .to_string()
    }

    #[tokio::test]
    async fn test_configmap_patch() {
        let doc = document(
            "ConfigMap",
            json!({
                "app.conf": "user=<replace:user>",
                "static": "nothing here",
                "a/b": "<replace(test):password>"
            }),
        );

        let verdict = reviewer().review_json(&doc).await;
        assert!(verdict.allowed);
        assert_eq!(verdict.message, "replacer changes");
        assert_eq!(
            verdict.patch,
            vec![
                PatchOperation::replace_data("a/b", "hunter2".to_string()),
                PatchOperation::replace_data("app.conf", "user=admin".to_string()),
            ]
        );
        assert_eq!(verdict.patch[0].path, "/data/a~1b");
    }

    #[tokio::test]
    async fn test_secret_values_are_base64() {
        let encoded = general_purpose::STANDARD.encode("pw=<replace:password>");
        let doc = document("Secret", json!({ "creds": encoded }));

        let verdict = reviewer().review_json(&doc).await;
        assert!(verdict.allowed);
        assert_eq!(verdict.patch.len(), 1);
        assert_eq!(verdict.patch[0].path, "/data/creds");
        assert_eq!(verdict.patch[0].value, general_purpose::STANDARD.encode("pw=hunter2"));
    }

    #[tokio::test]
    async fn test_binary_secret_values_are_left_alone() {
        let binary = general_purpose::STANDARD.encode([0xff, 0xfe, 0x00, 0x01]);
        let r = reviewer();

        let doc = document("Secret", json!({ "keystore.p12": binary.clone() }));
        let verdict = r.review_json(&doc).await;
        assert!(verdict.allowed, "{}", verdict.message);
        assert_eq!(verdict.message, "no changes");

        let text = general_purpose::STANDARD.encode("user=<replace:user>");
        let verdict = r
            .review_json(&document("Secret", json!({ "keystore.p12": binary, "app.env": text })))
            .await;
        assert!(verdict.allowed);
        assert_eq!(verdict.patch.len(), 1);
        assert_eq!(verdict.patch[0].path, "/data/app.env");
    }

    #[tokio::test]
    async fn test_allowed_without_changes() {
        let r = reviewer();

        let verdict = r.review_json(&document("Pod", json!({ "k": "<replace:user>" }))).await;
        assert!(verdict.allowed);
        assert_eq!(verdict.message, "not a secret or configmap");

        let verdict = r.review_json(&document("ConfigMap", json!({}))).await;
        assert_eq!(verdict.message, "no data to replace");

        let verdict = r.review_json(&document("ConfigMap", json!({ "k": "plain" }))).await;
        assert!(verdict.allowed);
        assert_eq!(verdict.message, "no changes");
        assert!(verdict.patch.is_empty());
    }

    #[tokio::test]
    async fn test_rejections() {
        let r = reviewer();

        let doc = document("ConfigMap", json!({ "k": "<replace:missing>" }));
        let verdict = r.review_json(&doc).await;
        assert!(!verdict.allowed);
        assert!(verdict.message.contains("missing"), "{}", verdict.message);

        let verdict = r.review_json(&document("Secret", json!({ "k": "%%%" }))).await;
        assert!(!verdict.allowed);
        assert!(verdict.message.contains("not valid base64"));

        let verdict = r.review_json("{ not json").await;
        assert!(!verdict.allowed);
        assert!(verdict.message.starts_with("failed to decode resource"));
    }

    #[tokio::test]
    async fn test_unknown_provider_rejected() {
        let doc = json!({
            "kind": "ConfigMap",
            "metadata": { "annotations": { "replacer.agb.dev/provider": "nope" } },
            "data": { "k": "<replace:user>" }
        })
        .to_string();

        let verdict = reviewer().review_json(&doc).await;
        assert!(!verdict.allowed);
        assert!(verdict.message.contains("nope"));
    }

    #[test]
    fn test_verdict_serialization() {
        let value = serde_json::to_value(Verdict::allowed("no changes")).unwrap();
        assert_eq!(value, json!({ "allowed": true, "message": "no changes" }));
    }
}
