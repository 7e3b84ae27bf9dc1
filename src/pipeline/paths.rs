//! 对象路径推导
//!
//! 路径只由 `(event_type, event_id)` 决定。`event_type` 段做百分号编码，
//! 包含 `/` 的类型不会逃出自身前缀。

const RAW_PREFIX: &str = "raw";
const PROCESSED_PREFIX: &str = "silver";

pub fn raw_key(event_type: &str, event_id: &str) -> String {
    build_key(RAW_PREFIX, event_type, event_id)
}

pub fn processed_key(event_type: &str, event_id: &str) -> String {
    build_key(PROCESSED_PREFIX, event_type, event_id)
}

fn build_key(prefix: &str, event_type: &str, event_id: &str) -> String {
    format!(
        "{}/{}/{}.json",
        prefix,
        encode_segment(event_type),
        urlencoding::encode(event_id)
    )
}

/// `.` 与 `..` 作为独立段时同样编码
fn encode_segment(segment: &str) -> String {
    match segment {
        "." => "%2E".to_string(),
        ".." => "%2E%2E".to_string(),
        other => urlencoding::encode(other).into_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keys_are_deterministic() {
        let id = "3f2b9c1e-8a4d-4c6b-9e0f-1a2b3c4d5e6f";
        assert_eq!(
            raw_key("order.created", id),
            format!("raw/order.created/{}.json", id)
        );
        assert_eq!(
            processed_key("order.created", id),
            format!("silver/order.created/{}.json", id)
        );
        assert_eq!(raw_key("order.created", id), raw_key("order.created", id));
        assert_ne!(raw_key("order.created", id), processed_key("order.created", id));
    }

    #[test]
    fn test_event_type_cannot_escape_prefix() {
        let key = raw_key("../../etc/passwd", "e-1");
        assert_eq!(key, "raw/..%2F..%2Fetc%2Fpasswd/e-1.json");
        assert_eq!(key.matches('/').count(), 2);

        assert_ne!(raw_key("a/b", "c"), raw_key("a", "b/c"));
        assert_eq!(raw_key("..", "e-1"), "raw/%2E%2E/e-1.json");
    }
}
