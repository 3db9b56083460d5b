//! LLM reply parser.
//!
//! Accepts `{"reasoning": string, "orders": [...]}`, tolerating code fences,
//! leading prose, and unknown extra fields. Each malformed order is dropped
//! with a recorded warning; a whole-document failure yields an empty order
//! list and one recorded error, never a panic or an exception path.

use serde::Deserialize;
use tracing::warn;

use crate::types::Order;

/// Result of parsing one reply. Always constructed — parse problems are
/// data here, not control flow.
#[derive(Debug, Clone, Default)]
pub struct ParsedReply {
    pub reasoning: String,
    pub orders: Vec<Order>,
    /// One entry per dropped order
    pub warnings: Vec<String>,
    /// Set when the whole document was unusable
    pub error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ReplyEnvelope {
    #[serde(default)]
    reasoning: String,
    #[serde(default)]
    orders: Vec<serde_json::Value>,
}

/// Parse a raw reply into orders.
pub fn parse_reply(raw: &str) -> ParsedReply {
    let Some(document) = extract_json_document(raw) else {
        warn!("reply contains no JSON document");
        return ParsedReply {
            error: Some("reply contains no JSON document".to_string()),
            ..Default::default()
        };
    };

    let envelope: ReplyEnvelope = match serde_json::from_str(&document) {
        Ok(env) => env,
        Err(e) => {
            warn!(error = %e, "reply JSON does not match the orders envelope");
            return ParsedReply {
                error: Some(format!("bad orders envelope: {e}")),
                ..Default::default()
            };
        }
    };

    let mut orders = Vec::with_capacity(envelope.orders.len());
    let mut warnings = Vec::new();
    for (index, raw_order) in envelope.orders.into_iter().enumerate() {
        match serde_json::from_value::<Order>(raw_order) {
            Ok(order) if !order.command_type.trim().is_empty() => orders.push(order),
            Ok(_) => {
                let message = format!("orders[{index}]: empty command type, dropped");
                warn!("{message}");
                warnings.push(message);
            }
            Err(e) => {
                let message = format!("orders[{index}]: {e}, dropped");
                warn!("{message}");
                warnings.push(message);
            }
        }
    }

    ParsedReply {
        reasoning: envelope.reasoning,
        orders,
        warnings,
        error: None,
    }
}

/// Serialize orders back into the reply shape (used by the per-AO log and
/// the round-trip tests).
pub fn serialize_reply(reasoning: &str, orders: &[Order]) -> String {
    serde_json::json!({
        "reasoning": reasoning,
        "orders": orders,
    })
    .to_string()
}

/// Pull the outermost JSON object out of a possibly fenced, possibly chatty
/// reply.
fn extract_json_document(raw: &str) -> Option<String> {
    let trimmed = raw.trim();

    // Strip markdown fences if the whole reply is fenced
    let unfenced = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .map(|rest| rest.trim_end_matches("```").trim())
        .unwrap_or(trimmed);

    if unfenced.starts_with('{') && unfenced.ends_with('}') {
        return Some(unfenced.to_string());
    }

    // Fall back to the widest brace span
    let start = unfenced.find('{')?;
    let end = unfenced.rfind('}')?;
    if end > start {
        Some(unfenced[start..=end].to_string())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_clean_reply() {
        let raw = r#"{
            "reasoning": "Reinforce the crossroads before the assault lands.",
            "orders": [
                {"type": "defend_area", "group_id": "GRP_EAST_1",
                 "parameters": {"position": [5000, 5000, 0], "radius": 150}, "priority": 9}
            ]
        }"#;
        let parsed = parse_reply(raw);
        assert!(parsed.error.is_none());
        assert_eq!(parsed.orders.len(), 1);
        assert_eq!(parsed.orders[0].command_type, "defend_area");
        assert_eq!(parsed.orders[0].priority, Some(9.0));
        assert!(parsed.reasoning.contains("crossroads"));
    }

    #[test]
    fn strips_code_fences_and_prose() {
        let raw = "Here is my plan:\n```json\n{\"reasoning\":\"hold\",\"orders\":[]}\n```";
        let parsed = parse_reply(raw);
        assert!(parsed.error.is_none());
        assert_eq!(parsed.reasoning, "hold");
    }

    #[test]
    fn tolerates_extra_fields() {
        let raw = r#"{"reasoning":"x","confidence":0.9,"orders":[
            {"type":"move_to","group_id":"G1","parameters":{"position":[1,2,0]},"mood":"bold"}
        ]}"#;
        let parsed = parse_reply(raw);
        assert_eq!(parsed.orders.len(), 1);
    }

    #[test]
    fn drops_malformed_orders_keeps_rest() {
        let raw = r#"{"reasoning":"x","orders":[
            {"type":"move_to","group_id":"G1","parameters":{"position":[1,2,0]}},
            "not an order",
            {"group_id":"G2","parameters":{}},
            {"type":"defend_area","group_id":"G3","parameters":{"position":[3,4,0],"radius":100}}
        ]}"#;
        let parsed = parse_reply(raw);
        assert_eq!(parsed.orders.len(), 2);
        assert_eq!(parsed.warnings.len(), 2);
        assert!(parsed.error.is_none());
    }

    #[test]
    fn whole_document_failure_is_one_error() {
        let parsed = parse_reply("I cannot comply with that request.");
        assert!(parsed.orders.is_empty());
        assert!(parsed.error.is_some());
        assert!(parsed.warnings.is_empty());
    }

    #[test]
    fn garbage_json_is_one_error() {
        let parsed = parse_reply("{\"reasoning\": \"x\", \"orders\": 17}");
        assert!(parsed.orders.is_empty());
        assert!(parsed.error.is_some());
    }

    #[test]
    fn round_trips_accepted_orders() {
        let orders = vec![
            Order {
                command_type: "move_to".to_string(),
                group_id: "G1".to_string(),
                parameters: serde_json::json!({"position": [100.0, 200.0, 0.0]}),
                priority: Some(7.0),
                objective_id: Some("obj_a".to_string()),
            },
            Order {
                command_type: "deploy_asset".to_string(),
                group_id: String::new(),
                parameters: serde_json::json!({
                    "side": "EAST", "asset_type": "infantry_squad",
                    "unit_classes": ["RIFLEMAN"], "position": [5000.0, 5000.0, 0.0]
                }),
                priority: None,
                objective_id: None,
            },
        ];
        let parsed = parse_reply(&serialize_reply("rationale", &orders));
        assert!(parsed.error.is_none());
        assert_eq!(parsed.orders, orders);
        assert_eq!(parsed.reasoning, "rationale");
    }
}
