// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! JSON object handling.
//!
//! Single-file objects and data bag items are JSON documents. The same
//! object can be written in many textually different ways: keys in another
//! order, other whitespace, or with default values left out. Before two
//! documents are compared, both are __normalized__ by filling in the
//! defaults of their object kind, then rendered in a __canonical__ form with
//! the identity key first and every other key sorted.
//!
//! Documents written to the local repository are __minimized__ instead,
//! dropping every key that still holds its default value.

use crate::address::{ObjectAddress, TopLevel};

use serde_json::{json, Map, Value};

/// Content of a leaf entry.
#[derive(Debug, Clone, PartialEq)]
pub enum Content {
    /// Parsed and normalized JSON object.
    Json(Value),

    /// Raw bytes, e.g., cookbook files or unparsable JSON.
    Raw(Vec<u8>),
}

impl Content {
    /// Render content as bytes, JSON in canonical pretty form.
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Self::Json(value) => to_pretty(value).into_bytes(),
            Self::Raw(bytes) => bytes.clone(),
        }
    }

    /// Render content as text for display.
    pub fn to_text(&self) -> String {
        String::from_utf8_lossy(&self.to_bytes()).into_owned()
    }

    /// Check if two contents are semantically equal.
    ///
    /// JSON values compare structurally, anything else compares by its
    /// rendered bytes.
    pub fn same_as(&self, other: &Content) -> bool {
        match (self, other) {
            (Self::Json(left), Self::Json(right)) => left == right,
            (left, right) => left.to_bytes() == right.to_bytes(),
        }
    }
}

/// Key holding the identity of the object at target address.
pub fn identity_key(address: &ObjectAddress) -> &'static str {
    match address {
        ObjectAddress::DataBagItem { .. } => "id",
        _ => "name",
    }
}

/// Default document of the object at target address.
///
/// Returns `None` for addresses that do not hold JSON objects.
pub fn defaults(address: &ObjectAddress) -> Option<Map<String, Value>> {
    let value = match address {
        ObjectAddress::Object { top, name } => match top {
            TopLevel::Roles => json!({
                "name": name,
                "description": "",
                "json_class": "Chef::Role",
                "chef_type": "role",
                "default_attributes": {},
                "override_attributes": {},
                "run_list": [],
                "env_run_lists": {},
            }),
            TopLevel::Environments => json!({
                "name": name,
                "description": "",
                "cookbook_versions": {},
                "json_class": "Chef::Environment",
                "chef_type": "environment",
                "default_attributes": {},
                "override_attributes": {},
            }),
            TopLevel::Nodes => json!({
                "name": name,
                "json_class": "Chef::Node",
                "chef_type": "node",
                "chef_environment": "_default",
                "override": {},
                "normal": {},
                "default": {},
                "automatic": {},
                "run_list": [],
            }),
            TopLevel::Clients => json!({
                "name": name,
                "clientname": name,
                "admin": false,
                "validator": false,
                "chef_type": "client",
            }),
            TopLevel::Users => json!({
                "name": name,
                "admin": false,
            }),
            TopLevel::Cookbooks | TopLevel::DataBags => return None,
        },
        ObjectAddress::DataBagItem { item, .. } => json!({ "id": item }),
        _ => return None,
    };

    match value {
        Value::Object(map) => Some(map),
        _ => None,
    }
}

/// Fill in defaults of the object kind, then canonicalize.
///
/// Non-object documents are left untouched.
pub fn normalize(address: &ObjectAddress, value: Value) -> Value {
    let Some(mut result) = defaults(address) else {
        return value;
    };
    let object = match value {
        Value::Object(object) => object,
        value => return value,
    };

    for (key, value) in object {
        result.insert(key, value);
    }

    canonicalize(address, &Value::Object(result))
}

/// Drop every key holding its default value, keeping the identity key.
pub fn minimize(address: &ObjectAddress, value: &Value) -> Value {
    let (Some(defaults), Value::Object(object)) = (defaults(address), value) else {
        return value.clone();
    };

    let identity = identity_key(address);
    let minimized = object
        .iter()
        .filter(|(key, value)| key.as_str() == identity || defaults.get(key.as_str()) != Some(*value))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect::<Map<_, _>>();

    canonicalize(address, &Value::Object(minimized))
}

/// Order keys canonically: identity key first, everything else sorted, at
/// every nesting level.
pub fn canonicalize(address: &ObjectAddress, value: &Value) -> Value {
    let identity = identity_key(address);
    match value {
        Value::Object(object) => {
            let mut result = Map::new();
            if let Some(id) = object.get(identity) {
                result.insert(identity.to_string(), sort_keys(id));
            }

            let mut keys = object.keys().filter(|key| *key != identity).collect::<Vec<_>>();
            keys.sort();
            for key in keys {
                result.insert(key.clone(), sort_keys(&object[key]));
            }

            Value::Object(result)
        }
        value => sort_keys(value),
    }
}

fn sort_keys(value: &Value) -> Value {
    match value {
        Value::Object(object) => {
            let mut keys = object.keys().collect::<Vec<_>>();
            keys.sort();
            Value::Object(
                keys.into_iter()
                    .map(|key| (key.clone(), sort_keys(&object[key])))
                    .collect(),
            )
        }
        Value::Array(items) => Value::Array(items.iter().map(sort_keys).collect()),
        value => value.clone(),
    }
}

/// Render JSON value in pretty form with trailing newline.
pub fn to_pretty(value: &Value) -> String {
    // INVARIANT: Serializing a `Value` cannot fail, its keys are strings.
    let mut text = serde_json::to_string_pretty(value).unwrap_or_default();
    text.push('\n');
    text
}
