//! `{{KEY}}` 占位符解析
//!
//! 占位符内容（去掉首尾空白后）由字母、数字、`_`、`-`、`.` 组成时才视为占位符，
//! 其余 `{{...}}` 原样保留。取值先按原样匹配密钥名，找不到再忽略大小写匹配
//! （环境变量覆盖进来的密钥名会被小写化）。

use std::collections::{BTreeMap, HashMap};

use serde_json::Value;

use crate::{SchedulerError, SchedulerResult};

fn is_key_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.')
}

fn lookup<'a>(key: &str, secrets: &'a HashMap<String, String>) -> Option<&'a String> {
    secrets.get(key).or_else(|| {
        secrets
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v)
    })
}

/// 解析字符串中的全部占位符，任何一个找不到都视为失败
pub fn resolve_template(raw: &str, secrets: &HashMap<String, String>) -> SchedulerResult<String> {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after_open = &rest[start + 2..];
        let Some(end) = after_open.find("}}") else {
            out.push_str(&rest[start..]);
            return Ok(out);
        };

        let key = after_open[..end].trim();
        if !key.is_empty() && key.chars().all(is_key_char) {
            let value = lookup(key, secrets).ok_or_else(|| {
                SchedulerError::TemplateResolutionFailed {
                    key: key.to_string(),
                }
            })?;
            out.push_str(value);
        } else {
            out.push_str(&rest[start..start + 2 + end + 2]);
        }
        rest = &after_open[end + 2..];
    }

    out.push_str(rest);
    Ok(out)
}

pub fn resolve_map(
    raw: &BTreeMap<String, String>,
    secrets: &HashMap<String, String>,
) -> SchedulerResult<BTreeMap<String, String>> {
    raw.iter()
        .map(|(k, v)| Ok((k.clone(), resolve_template(v, secrets)?)))
        .collect()
}

/// 递归解析JSON中的字符串值（对象的键不解析）
pub fn resolve_json(raw: &Value, secrets: &HashMap<String, String>) -> SchedulerResult<Value> {
    Ok(match raw {
        Value::String(s) => Value::String(resolve_template(s, secrets)?),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|v| resolve_json(v, secrets))
                .collect::<SchedulerResult<_>>()?,
        ),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| Ok((k.clone(), resolve_json(v, secrets)?)))
                .collect::<SchedulerResult<_>>()?,
        ),
        other => other.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn secrets() -> HashMap<String, String> {
        HashMap::from([
            ("BASE_URL".to_string(), "https://a".to_string()),
            ("token".to_string(), "s3cr3t".to_string()),
        ])
    }

    #[test]
    fn resolves_base_url() {
        assert_eq!(
            resolve_template("{{BASE_URL}}/x", &secrets()).unwrap(),
            "https://a/x"
        );
    }

    #[test]
    fn unresolved_key_fails() {
        let err = resolve_template("{{MISSING}}/x", &secrets()).unwrap_err();
        assert!(matches!(
            err,
            SchedulerError::TemplateResolutionFailed { ref key } if key == "MISSING"
        ));
    }

    #[test]
    fn tolerates_whitespace_and_case() {
        assert_eq!(
            resolve_template("Bearer {{ TOKEN }}", &secrets()).unwrap(),
            "Bearer s3cr3t"
        );
    }

    #[test]
    fn leaves_non_placeholders_alone() {
        let secrets = secrets();
        assert_eq!(resolve_template("plain", &secrets).unwrap(), "plain");
        assert_eq!(resolve_template("{{a b}} x", &secrets).unwrap(), "{{a b}} x");
        assert_eq!(resolve_template("open {{BASE_URL", &secrets).unwrap(), "open {{BASE_URL");
    }

    #[test]
    fn resolves_multiple_placeholders() {
        assert_eq!(
            resolve_template("{{BASE_URL}}?t={{token}}", &secrets()).unwrap(),
            "https://a?t=s3cr3t"
        );
    }

    #[test]
    fn resolves_nested_json_strings() {
        let body = json!({"url": "{{BASE_URL}}", "list": ["{{token}}", 3], "flag": true});
        let resolved = resolve_json(&body, &secrets()).unwrap();
        assert_eq!(
            resolved,
            json!({"url": "https://a", "list": ["s3cr3t", 3], "flag": true})
        );
    }

    #[test]
    fn map_fails_on_first_unresolved_value() {
        let headers = BTreeMap::from([
            ("Authorization".to_string(), "{{token}}".to_string()),
            ("X-Other".to_string(), "{{NOPE}}".to_string()),
        ]);
        assert!(resolve_map(&headers, &secrets()).is_err());
    }
}
