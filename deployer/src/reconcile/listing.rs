//! List-then-create helpers shared by the ensure steps

use serde_json::Value;
use tracing::debug;
use url::Url;

use crate::errors::DeployError;
use crate::exec::command::{CommandOptions, FailureKind};
use crate::reconcile::StepContext;

/// JSON keys that carry a resource name in provider listings
const NAME_KEYS: &[&str] = &["name", "Project Name", "project_name", "title"];

/// Whether an ensure call found or made the resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ensured {
    Existing,
    Created,
}

impl Ensured {
    pub fn describe(&self, what: &str, name: &str) -> String {
        match self {
            Ensured::Existing => format!("{} {} already exists", what, name),
            Ensured::Created => format!("Created {} {}", what, name),
        }
    }
}

/// Resource names out of a listing: JSON name fields, or the first token
/// of each line for plain output
pub fn parse_names(output: &str) -> Vec<String> {
    match serde_json::from_str::<Value>(output.trim()) {
        Ok(value) => {
            let mut names = Vec::new();
            collect_json_names(&value, &mut names);
            names
        }
        Err(_) => output
            .lines()
            .filter_map(|line| line.split_whitespace().next())
            .map(normalize_name)
            .filter(|name| !name.is_empty())
            .collect(),
    }
}

fn collect_json_names(value: &Value, names: &mut Vec<String>) {
    match value {
        Value::Array(items) => items.iter().for_each(|item| collect_json_names(item, names)),
        Value::String(name) => names.push(normalize_name(name)),
        Value::Object(map) => {
            if let Some(name) = NAME_KEYS.iter().find_map(|k| map.get(*k).and_then(Value::as_str)) {
                names.push(normalize_name(name));
            } else if let Some(inner) = map.get("result").or_else(|| map.get("results")) {
                collect_json_names(inner, names);
            }
        }
        _ => {}
    }
}

/// `gs://bucket/` -> `bucket`
fn normalize_name(raw: &str) -> String {
    let name = raw.split_once("://").map_or(raw, |(_, rest)| rest);
    name.trim_end_matches('/').to_string()
}

/// Make sure `name` exists: list first, create only when absent.
///
/// A listing that reports "not found" counts as empty, and a create that
/// reports "already exists" counts as existing.
pub async fn ensure_exists(
    ctx: &StepContext<'_>,
    name: &str,
    list_command: &str,
    list_options: &CommandOptions,
    create_command: &str,
    create_options: &CommandOptions,
) -> Result<Ensured, DeployError> {
    let existing = match ctx.run(list_command, list_options).await {
        Ok(result) => parse_names(&result.stdout),
        Err(err) if err.kind == FailureKind::NotFound => {
            debug!("Listing for {} reported not found, treating as empty", name);
            Vec::new()
        }
        Err(err) => return Err(err.into()),
    };

    if existing.iter().any(|n| n == name) {
        return Ok(Ensured::Existing);
    }

    ctx.progress(&format!("Creating {}", name));
    match ctx.run(create_command, create_options).await {
        Ok(_) => Ok(Ensured::Created),
        Err(err) if err.kind == FailureKind::AlreadyExists => {
            ctx.log(&format!("{} already exists", name));
            Ok(Ensured::Existing)
        }
        Err(err) => Err(err.into()),
    }
}

/// First URL in `text` whose host is `name` or a subdomain label under it,
/// reduced to scheme and host. Bare host names count as https.
pub fn extract_url(text: &str, name: &str) -> Option<String> {
    let prefix = format!("{}.", name.to_lowercase());

    text.split(|c: char| c.is_whitespace() || ",\"'<>()[]".contains(c))
        .map(|token| token.trim_end_matches(['.', ';']))
        .filter(|token| token.contains('.'))
        .filter_map(|token| {
            let candidate = if token.contains("://") {
                token.to_string()
            } else {
                format!("https://{}", token)
            };
            Url::parse(&candidate).ok()
        })
        .filter(|url| matches!(url.scheme(), "https" | "http"))
        .find_map(|url| {
            let host = url.host_str()?.to_lowercase();
            host.starts_with(&prefix)
                .then(|| format!("{}://{}", url.scheme(), host))
        })
}
