//! Fixups for data source query models that unified alerting cannot run as-is.

use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::unified::AlertQuery;

const GRAPHITE_TARGET: &str = "target";
const GRAPHITE_TARGET_FULL: &str = "targetFull";

/// Rewrites every non-expression query model. A model that is not a JSON
/// object fails the whole rule.
pub fn migrate_alert_rule_queries(
    data: Vec<AlertQuery>,
) -> Result<Vec<AlertQuery>, serde_json::Error> {
    data.into_iter()
        .map(|mut query| {
            if query.is_expression() {
                return Ok(query);
            }
            let mut model: Map<String, Value> = serde_json::from_value(query.model)?;
            model.remove("hide");
            fix_graphite_referenced_sub_queries(&mut model);
            fix_prometheus_both_type_query(&mut model);
            query.model = Value::Object(model);
            Ok(query)
        })
        .collect()
}

/// Graphite's `targetFull` holds `target` with referenced sub-queries expanded.
fn fix_graphite_referenced_sub_queries(model: &mut Map<String, Value>) {
    if let Some(full) = model.remove(GRAPHITE_TARGET_FULL) {
        model.insert(GRAPHITE_TARGET.to_string(), full);
    }
}

fn parse_flag(model: &Map<String, Value>, field: &str) -> Result<bool, ()> {
    match model.get(field) {
        None | Some(Value::Null) => Ok(false),
        Some(Value::Bool(b)) => Ok(*b),
        Some(_) => Err(()),
    }
}

/// Prometheus "Both" queries (instant and range) become range queries.
fn fix_prometheus_both_type_query(model: &mut Map<String, Value>) {
    let mut flags = [false; 2];
    for (slot, field) in flags.iter_mut().zip(["instant", "range"]) {
        match parse_flag(model, field) {
            Ok(value) => *slot = value,
            Err(()) => {
                if matches!(is_prometheus_query(model), Ok(true)) {
                    info!(field, value = %model[field], "failed to parse flag on Prometheus query");
                }
                return;
            }
        }
    }
    let [instant, range] = flags;
    if !instant || !range {
        return;
    }

    match is_prometheus_query(model) {
        Ok(true) => {
            warn!("Prometheus 'Both' type queries are not supported in unified alerting, converting to range query");
            model.insert("instant".to_string(), Value::Bool(false));
        }
        Ok(false) => {}
        Err(reason) => {
            info!(reason, "unable to convert query resembling a Prometheus 'Both' type query to range");
        }
    }
}

fn is_prometheus_query(model: &Map<String, Value>) -> Result<bool, &'static str> {
    let datasource = model.get("datasource").ok_or("missing datasource field")?;
    let kind = datasource
        .as_object()
        .ok_or("datasource is not an object")?
        .get("type")
        .and_then(Value::as_str)
        .unwrap_or_default();
    if kind.is_empty() {
        return Err("missing datasource type");
    }
    Ok(kind == "prometheus")
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::unified::RelativeTimeRange;
    use crate::unified::rule::EXPRESSION_DATASOURCE_UID;

    fn query(datasource_uid: &str, model: Value) -> AlertQuery {
        AlertQuery {
            ref_id: "A".into(),
            query_type: String::new(),
            relative_time_range: RelativeTimeRange { from: 600, to: 0 },
            datasource_uid: datasource_uid.into(),
            model,
        }
    }

    fn rewrite(model: Value) -> Value {
        migrate_alert_rule_queries(vec![query("ds", model)])
            .unwrap()
            .remove(0)
            .model
    }

    #[test]
    fn untouched_models_keep_their_shape() {
        let model = json!({"refId": "A", "expr": "up", "datasource": {"type": "loki"}});
        assert_eq!(rewrite(model.clone()), model);
    }

    #[test]
    fn prometheus_both_becomes_range() {
        let out = rewrite(json!({"datasource": {"type": "prometheus"}, "instant": true, "range": true}));
        assert_eq!(out, json!({"datasource": {"type": "prometheus"}, "instant": false, "range": true}));

        let other = json!({"datasource": {"type": "other"}, "instant": true, "range": true});
        assert_eq!(rewrite(other.clone()), other);
    }

    #[test]
    fn unparsable_flags_leave_model_alone() {
        let model = json!({"datasource": {"type": "prometheus"}, "instant": "yes", "range": true});
        assert_eq!(rewrite(model.clone()), model);
    }

    #[test]
    fn graphite_full_target_replaces_target() {
        assert_eq!(
            rewrite(json!({"targetFull": "full", "target": "half"})),
            json!({"target": "full"})
        );
        assert_eq!(rewrite(json!({"target": "half"})), json!({"target": "half"}));
    }

    #[test]
    fn hidden_flag_is_removed() {
        assert_eq!(rewrite(json!({"hide": true})), json!({}));
    }

    #[test]
    fn expressions_are_skipped_and_bad_models_fail() {
        let expr = query(EXPRESSION_DATASOURCE_UID, json!("not an object"));
        let out = migrate_alert_rule_queries(vec![expr.clone()]).unwrap();
        assert_eq!(out[0], expr);

        assert!(migrate_alert_rule_queries(vec![query("ds", json!([1, 2]))]).is_err());
    }
}
