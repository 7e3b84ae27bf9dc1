use anyhow::{bail, Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;
use std::collections::BTreeMap;

/// 处理层数据来源标识
pub const PROCESSED_SOURCE: &str = "worker";

/// 统一的时间戳格式：RFC 3339，毫秒精度，`Z` 结尾
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// 富化原始负载
///
/// 保留输入的全部字段，再写入 `eventId`、`eventType`、`processedAt`、`source`，
/// 同名输入字段被覆盖。键按字典序输出，相同输入得到逐字节相同的结果。
pub fn enrich(
    payload: &[u8],
    event_id: &str,
    event_type: &str,
    processed_at: DateTime<Utc>,
) -> Result<Vec<u8>> {
    let value: Value = serde_json::from_slice(payload).context("raw payload is not valid JSON")?;
    let mut fields: BTreeMap<String, Value> = match value {
        Value::Object(fields) => fields.into_iter().collect(),
        other => bail!("raw payload must be a JSON object, got {}", json_kind(&other)),
    };

    fields.insert("eventId".to_string(), Value::String(event_id.to_string()));
    fields.insert("eventType".to_string(), Value::String(event_type.to_string()));
    fields.insert(
        "processedAt".to_string(),
        Value::String(format_timestamp(processed_at)),
    );
    fields.insert(
        "source".to_string(),
        Value::String(PROCESSED_SOURCE.to_string()),
    );

    serde_json::to_vec(&fields).context("Failed to serialize processed payload")
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
