// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Activity intents: a stable fingerprint and a human-readable summary of
//! `(type, parameters)`.

use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::models::{ActivityType, Intent};

/// Serialize `value` with object keys sorted at every level.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            out.push('{');
            for (i, (key, value)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(key.clone()).to_string());
                out.push(':');
                write_canonical(value, out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

/// Lowercase hex SHA-256 of `type || 0x00 || canonical_json(parameters)`.
pub fn fingerprint(activity_type: ActivityType, parameters: &Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(activity_type.as_str().as_bytes());
    hasher.update([0u8]);
    hasher.update(canonical_json(parameters).as_bytes());
    alloy::hex::encode(hasher.finalize())
}

fn param<'a>(parameters: &'a Value, key: &str) -> &'a str {
    parameters.get(key).and_then(Value::as_str).unwrap_or("?")
}

pub fn summarize(activity_type: ActivityType, parameters: &Value) -> String {
    match activity_type {
        ActivityType::CreateOrganization => {
            format!("Create organization \"{}\"", param(parameters, "name"))
        }
        ActivityType::UpdateOrganization => match parameters.get("name").and_then(Value::as_str) {
            Some(name) => format!("Rename organization to \"{name}\""),
            None => "Update organization".to_string(),
        },
        ActivityType::CreateUser => format!(
            "Create user {} <{}>",
            param(parameters, "username"),
            param(parameters, "email")
        ),
        ActivityType::UpdateUser => match parameters.get("is_active").and_then(Value::as_bool) {
            Some(true) => format!("Reactivate user {}", param(parameters, "user_id")),
            Some(false) => format!("Deactivate user {}", param(parameters, "user_id")),
            None => format!("Update user {}", param(parameters, "user_id")),
        },
        ActivityType::CreateAuthMethod => format!(
            "Add auth method \"{}\" for user {}",
            param(parameters, "name"),
            param(parameters, "user_id")
        ),
        ActivityType::AddQuorumMember => {
            format!("Add user {} to the root quorum", param(parameters, "user_id"))
        }
        ActivityType::RemoveQuorumMember => {
            format!("Remove user {} from the root quorum", param(parameters, "user_id"))
        }
        ActivityType::UpdateRootQuorum => format!(
            "Set root quorum threshold to {}",
            parameters.get("threshold").map_or_else(|| "?".to_string(), Value::to_string)
        ),
        ActivityType::CreateWallet => {
            let accounts = parameters
                .get("accounts")
                .and_then(Value::as_array)
                .map_or(0, Vec::len);
            format!(
                "Create wallet \"{}\" with {accounts} account(s)",
                param(parameters, "name")
            )
        }
        ActivityType::DeleteWallet => format!("Delete wallet {}", param(parameters, "wallet_id")),
        ActivityType::EnrollUser => format!(
            "Enroll {} via {}",
            param(parameters, "email"),
            param(parameters, "provider")
        ),
    }
}

pub fn intent_for(activity_type: ActivityType, parameters: &Value) -> Intent {
    Intent {
        fingerprint: fingerprint(activity_type, parameters),
        summary: summarize(activity_type, parameters),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn canonical_json_sorts_nested_keys() {
        let value = json!({ "b": 1, "a": { "d": [ { "y": 1, "x": 2 } ], "c": "s\"q" } });
        assert_eq!(
            canonical_json(&value),
            r#"{"a":{"c":"s\"q","d":[{"x":2,"y":1}]},"b":1}"#
        );
    }

    #[test]
    fn fingerprint_ignores_key_order_but_not_content() {
        let a = json!({ "name": "W1", "mnemonic_length": 12 });
        let b = json!({ "mnemonic_length": 12, "name": "W1" });
        let c = json!({ "mnemonic_length": 24, "name": "W1" });

        let fa = fingerprint(ActivityType::CreateWallet, &a);
        assert_eq!(fa, fingerprint(ActivityType::CreateWallet, &b));
        assert_ne!(fa, fingerprint(ActivityType::CreateWallet, &c));
        assert_ne!(fa, fingerprint(ActivityType::DeleteWallet, &a));
        assert_eq!(fa.len(), 64);
        assert_eq!(fa, fa.to_lowercase());
    }

    #[test]
    fn summaries_name_the_subject() {
        let summary = summarize(
            ActivityType::CreateWallet,
            &json!({ "name": "Treasury", "accounts": [{}, {}] }),
        );
        assert_eq!(summary, "Create wallet \"Treasury\" with 2 account(s)");

        let summary = summarize(ActivityType::UpdateRootQuorum, &json!({ "threshold": 2 }));
        assert_eq!(summary, "Set root quorum threshold to 2");

        let summary = summarize(
            ActivityType::UpdateUser,
            &json!({ "user_id": "u1", "is_active": false }),
        );
        assert_eq!(summary, "Deactivate user u1");
    }
}
