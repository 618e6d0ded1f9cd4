//! Schema validation for the declarative inventory.
//!
//! Inventory documents are parsed into untyped YAML first and walked against a
//! static field table. Every problem is recorded as a [`Violation`] with the
//! dotted path of the field, so a single run reports all of them at once.
//! Only documents that pass are deserialized into the typed configuration.

use serde_yaml::Value;

use crate::error::Violation;
use crate::utils::duration::parse_duration_to_seconds;
use crate::utils::ip_utils::parse_prefix;

/// Expected shape of a YAML value
#[derive(Clone, Copy)]
pub enum Kind {
    Any,
    Str,
    NonEmptyStr,
    Bool,
    Int { min: i64, max: i64 },
    /// An integer or the literal string `auto`
    IntOrAuto { min: i64, max: i64 },
    /// An integer, or a string holding one (e.g. `latency_us: "5000"`)
    Numeric { min: i64, max: i64 },
    Ipv4,
    Ip,
    Prefix,
    Duration,
    OneOf(&'static [&'static str]),
    /// A string checked by a custom predicate
    Text(fn(&str) -> Result<(), String>),
    List(&'static Kind),
    /// String-keyed mapping with uniform values
    Map(&'static Kind),
    /// Mapping with a fixed field set; unknown keys are violations
    Object(&'static [Field]),
    /// Mapping with a fixed field set; unknown keys are ignored
    Record(&'static [Field]),
}

/// One field of an object schema
#[derive(Clone, Copy)]
pub struct Field {
    pub name: &'static str,
    pub alias: Option<&'static str>,
    pub kind: Kind,
    pub required: bool,
}

impl Field {
    pub const fn required(name: &'static str, kind: Kind) -> Self {
        Field {
            name,
            alias: None,
            kind,
            required: true,
        }
    }

    pub const fn optional(name: &'static str, kind: Kind) -> Self {
        Field {
            name,
            alias: None,
            kind,
            required: false,
        }
    }

    /// Accept an alternative key for this field
    pub const fn or_alias(self, alias: &'static str) -> Self {
        Field {
            alias: Some(alias),
            ..self
        }
    }

    fn matches(&self, key: &str) -> bool {
        self.name == key || self.alias == Some(key)
    }
}

/// Validate a whole document against an object schema rooted at `root`
pub fn check_document(value: &Value, fields: &'static [Field], root: &str) -> Vec<Violation> {
    let mut violations = Vec::new();
    check_value(value, &Kind::Object(fields), root, &mut violations);
    violations
}

/// Validate one value, appending every violation found below `path`
pub fn check_value(value: &Value, kind: &Kind, path: &str, out: &mut Vec<Violation>) {
    match kind {
        Kind::Any => {}
        Kind::Str => {
            if value.as_str().is_none() {
                out.push(Violation::new(path, "expected a string"));
            }
        }
        Kind::NonEmptyStr => match value.as_str() {
            Some(s) if !s.trim().is_empty() => {}
            Some(_) => out.push(Violation::new(path, "must not be empty")),
            None => out.push(Violation::new(path, "expected a non-empty string")),
        },
        Kind::Bool => {
            if value.as_bool().is_none() {
                out.push(Violation::new(path, "expected a boolean"));
            }
        }
        Kind::Int { min, max } => {
            if !int_in_range(value.as_i64(), *min, *max) {
                out.push(Violation::new(
                    path,
                    format!("expected an integer between {} and {}", min, max),
                ));
            }
        }
        Kind::IntOrAuto { min, max } => {
            let ok = match value {
                Value::String(s) => s == "auto",
                other => int_in_range(other.as_i64(), *min, *max),
            };
            if !ok {
                out.push(Violation::new(
                    path,
                    format!("expected \"auto\" or an integer between {} and {}", min, max),
                ));
            }
        }
        Kind::Numeric { min, max } => {
            let parsed = match value {
                Value::String(s) => s.trim().parse::<i64>().ok(),
                other => other.as_i64(),
            };
            if !int_in_range(parsed, *min, *max) {
                out.push(Violation::new(
                    path,
                    format!("expected a number between {} and {}", min, max),
                ));
            }
        }
        Kind::Ipv4 => match value.as_str() {
            Some(s) if s.parse::<std::net::Ipv4Addr>().is_ok() => {}
            _ => out.push(Violation::new(path, "expected an IPv4 address")),
        },
        Kind::Ip => match value.as_str() {
            Some(s) if s.parse::<std::net::IpAddr>().is_ok() => {}
            _ => out.push(Violation::new(path, "expected an IP address")),
        },
        Kind::Prefix => match value.as_str() {
            Some(s) if s.contains('/') => {
                if let Err(e) = parse_prefix(s) {
                    out.push(Violation::new(path, e));
                }
            }
            _ => out.push(Violation::new(path, "expected an address prefix (address/length)")),
        },
        Kind::Duration => {
            let ok = match value {
                Value::String(s) => parse_duration_to_seconds(s).is_ok(),
                other => other.as_u64().is_some(),
            };
            if !ok {
                out.push(Violation::new(
                    path,
                    "expected a duration such as 30, \"30s\" or \"2m\"",
                ));
            }
        }
        Kind::OneOf(choices) => match value.as_str() {
            Some(s) if choices.contains(&s) => {}
            _ => out.push(Violation::new(
                path,
                format!("expected one of: {}", choices.join(", ")),
            )),
        },
        Kind::Text(check) => match value.as_str() {
            Some(s) => {
                if let Err(e) = check(s) {
                    out.push(Violation::new(path, e));
                }
            }
            None => out.push(Violation::new(path, "expected a string")),
        },
        Kind::List(item) => match value.as_sequence() {
            Some(items) => {
                for (index, entry) in items.iter().enumerate() {
                    check_value(entry, item, &format!("{}[{}]", path, index), out);
                }
            }
            None => out.push(Violation::new(path, "expected a list")),
        },
        Kind::Map(item) => match value.as_mapping() {
            Some(map) => {
                for (key, entry) in map {
                    match key.as_str() {
                        Some(k) => check_value(entry, item, &child(path, k), out),
                        None => out.push(Violation::new(path, "mapping keys must be strings")),
                    }
                }
            }
            None => out.push(Violation::new(path, "expected a mapping")),
        },
        Kind::Object(fields) => check_object(value, fields, path, true, out),
        Kind::Record(fields) => check_object(value, fields, path, false, out),
    }
}

fn check_object(
    value: &Value,
    fields: &[Field],
    path: &str,
    strict: bool,
    out: &mut Vec<Violation>,
) {
    // An empty YAML document or a bare key deserializes as null
    if value.is_null() {
        for field in fields.iter().filter(|f| f.required) {
            out.push(Violation::new(child(path, field.name), "required field missing"));
        }
        return;
    }

    let Some(map) = value.as_mapping() else {
        out.push(Violation::new(path, "expected a mapping"));
        return;
    };

    for field in fields {
        let present = map
            .iter()
            .find(|(k, _)| k.as_str().map_or(false, |k| field.matches(k)));
        match present {
            Some((key, entry)) => {
                let key = key.as_str().unwrap_or(field.name);
                check_value(entry, &field.kind, &child(path, key), out);
            }
            None if field.required => {
                out.push(Violation::new(child(path, field.name), "required field missing"));
            }
            None => {}
        }
    }

    if strict {
        for key in map.keys() {
            match key.as_str() {
                Some(k) if fields.iter().any(|f| f.matches(k)) => {}
                // Connection variables belong to the deployment tool, not the model
                Some(k) if k.starts_with("ansible_") => {}
                Some(k) => out.push(Violation::new(child(path, k), "unknown field")),
                None => out.push(Violation::new(path, "mapping keys must be strings")),
            }
        }
    }
}

fn int_in_range(value: Option<i64>, min: i64, max: i64) -> bool {
    value.map_or(false, |v| v >= min && v <= max)
}

/// Join a parent path and a field name with a dot
pub fn child(path: &str, name: &str) -> String {
    if path.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", path, name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PEER: &[Field] = &[
        Field::required("name", Kind::NonEmptyStr),
        Field::required("latency_us", Kind::Numeric { min: 0, max: 10_000_000 }),
        Field::optional("listen_port", Kind::IntOrAuto { min: 1, max: 65535 }),
        Field::optional("country", Kind::NonEmptyStr).or_alias("iso_3166_country_code"),
    ];

    const ROUTER: &[Field] = &[
        Field::required("loopback", Kind::Ipv4),
        Field::required("wan", Kind::Ip),
        Field::optional("hold", Kind::Duration),
        Field::optional("peers", Kind::List(&Kind::Object(PEER))),
    ];

    fn doc(yaml: &str) -> Value {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn test_missing_field_reported_with_path() {
        let value = doc("wan: 203.0.113.161\n");
        let violations = check_document(&value, ROUTER, "host_vars/lhr-r001");
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].field, "host_vars/lhr-r001.loopback");
        assert_eq!(violations[0].message, "required field missing");
    }

    #[test]
    fn test_collects_every_violation() {
        let value = doc(
            r#"
loopback: 300.1.1.1
wan: nowhere
hold: forever
colour: blue
peers:
  - name: ""
    latency_us: fast
    listen_port: 70000
"#,
        );
        let violations = check_document(&value, ROUTER, "r");
        let fields: Vec<&str> = violations.iter().map(|v| v.field.as_str()).collect();
        assert_eq!(violations.len(), 7, "{:?}", fields);
        assert!(fields.contains(&"r.loopback"));
        assert!(fields.contains(&"r.wan"));
        assert!(fields.contains(&"r.hold"));
        assert!(fields.contains(&"r.colour"));
        assert!(fields.contains(&"r.peers[0].name"));
        assert!(fields.contains(&"r.peers[0].latency_us"));
        assert!(fields.contains(&"r.peers[0].listen_port"));
    }

    #[test]
    fn test_numeric_strings_and_aliases_accepted() {
        let value = doc(
            r#"
loopback: 172.22.144.1
wan: 203.0.113.161
hold: 30s
peers:
  - name: kioubit
    latency_us: "5000"
    listen_port: auto
    iso_3166_country_code: DE
"#,
        );
        assert!(check_document(&value, ROUTER, "r").is_empty());
    }

    #[test]
    fn test_empty_document_reports_required_fields() {
        let violations = check_document(&Value::Null, ROUTER, "r");
        let fields: Vec<&str> = violations.iter().map(|v| v.field.as_str()).collect();
        assert_eq!(fields, vec!["r.loopback", "r.wan"]);
    }
}
