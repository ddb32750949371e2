use serde_json::{json, Value};
use std::sync::LazyLock;

pub static CONFIG_SCHEMA: LazyLock<Value> = LazyLock::new(|| {
    json!({
        "$schema": "http://json-schema.org/draft-07/schema#",
        "type": "object",
        "properties": {
            "target": {
                "type": "object",
                "properties": {
                    "endpoints": { "type": "array", "items": { "$ref": "#/$defs/endpoint" } }
                }
            },
            "session": {
                "type": "object",
                "properties": {
                    "cookies": { "type": "object", "additionalProperties": { "type": "string" } },
                    "headers": { "type": "object", "additionalProperties": { "type": "string" } },
                    "session_token": { "type": "string" },
                    "url_token": { "type": "string" },
                    "user_agent": { "type": "string" }
                }
            },
            "race": {
                "type": "object",
                "properties": {
                    "concurrency": { "type": "integer", "minimum": 1, "maximum": 100 },
                    "warmup_requests": { "type": "integer", "minimum": 0 },
                    "settle_ms": { "type": "integer", "minimum": 0 },
                    "request_timeout_secs": { "type": "integer", "minimum": 1 },
                    "round_timeout_secs": { "type": "integer", "minimum": 1 },
                    "body_preview_bytes": { "type": "integer", "minimum": 0 },
                    "min_results": { "type": "integer", "minimum": 2 },
                    "payload": { "type": "object" }
                }
            },
            "idempotency": {
                "type": "object",
                "properties": {
                    "header": { "type": "string" },
                    "concurrency": { "type": "integer", "minimum": 1, "maximum": 100 },
                    "pause_ms": { "type": "integer", "minimum": 0 },
                    "expiry_hours": { "type": "integer", "minimum": 1 },
                    "case_probe_key": { "type": "string" }
                }
            },
            "websocket": {
                "type": "object",
                "properties": {
                    "concurrency": { "type": "integer", "minimum": 1, "maximum": 100 },
                    "poll_interval_ms": { "type": "integer", "minimum": 1 },
                    "response_timeout_ms": { "type": "integer", "minimum": 0 },
                    "replay_delay_ms": { "type": "integer", "minimum": 0 }
                }
            },
            "scan": {
                "type": "object",
                "properties": {
                    "max_parallel_endpoints": { "type": "integer", "minimum": 1 },
                    "dry_run": { "type": "boolean" },
                    "payment_only": { "type": "boolean" },
                    "endpoint_timeout_secs": { "type": "integer", "minimum": 1 },
                    "tests": {
                        "type": "object",
                        "properties": {
                            "race_condition": { "type": "boolean" },
                            "multi_endpoint": { "type": "boolean" },
                            "idempotency": { "type": "boolean" }
                        }
                    }
                }
            }
        },
        "$defs": {
            "endpoint": {
                "type": "object",
                "required": ["url"],
                "properties": {
                    "url": { "type": "string" },
                    "method": { "type": "string", "enum": ["GET", "POST", "PUT", "PATCH", "DELETE"] },
                    "type": { "type": "string" },
                    "source": { "type": "string" }
                }
            }
        }
    })
});
