//! Classic condition translation.
//!
//! A legacy alert evaluates `reducer(query) evaluator params` per condition
//! and joins the results left to right with `and`/`or`. The unified rule gets
//! the same graph as data source queries followed by one reduce and one
//! threshold expression per condition and, with several conditions, a math
//! expression joining the thresholds in the original order.

use std::collections::{BTreeMap, HashMap, HashSet};

use sea_orm::DatabaseTransaction;
use serde_json::{Map, Value, json};
use thiserror::Error;

use crate::error::RepositoryError;
use crate::legacy::{DashAlertCondition, DashAlertSettings};
use crate::services::{DatasourceCache, DatasourceRef};
use crate::unified::rule::EXPRESSION_DATASOURCE_UID;
use crate::unified::{AlertQuery, Duration, RelativeTimeRange};

use super::short_uid;

const REF_ID_ALPHABET: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const REF_ID_ATTEMPTS: usize = 20;
const DEFAULT_MAX_DATA_POINTS: i64 = 43200;
const DEFAULT_INTERVAL_MS: i64 = 1000;
const NO_VALUE_EVALUATOR: &str = "no_value";

#[derive(Debug, Error)]
pub enum ConditionError {
    #[error("alert has no conditions")]
    Empty,
    #[error("unexpected number of query parameters in cond {index}, want 3 got {got}")]
    QueryParams { index: usize, got: usize },
    #[error("failed to parse time range {value:?} of cond {index}")]
    TimeRange { index: usize, value: String },
    #[error("query model of cond {0} is not a JSON object")]
    Model(usize),
    #[error("unsupported evaluator {kind:?} in cond {index}")]
    Evaluator { index: usize, kind: String },
    #[error("evaluator {kind:?} in cond {index} needs {want} parameters, got {got}")]
    EvaluatorParams {
        index: usize,
        kind: String,
        want: usize,
        got: usize,
    },
    #[error("failed to get datasource {0}: not found")]
    DatasourceNotFound(i64),
    #[error("failed to get datasource {id}: {source}")]
    Datasource { id: i64, source: RepositoryError },
    #[error("failed to generate unique RefID")]
    RefIdExhausted,
}

/// Queries and condition reference of a translated rule.
#[derive(Debug, Clone, PartialEq)]
pub struct TranslatedCondition {
    pub condition: String,
    pub data: Vec<AlertQuery>,
}

/// Looks up every referenced data source and translates the conditions.
pub async fn trans_conditions(
    txn: &DatabaseTransaction,
    datasources: &dyn DatasourceCache,
    org_id: i64,
    settings: &DashAlertSettings,
) -> Result<TranslatedCondition, ConditionError> {
    let mut refs = HashMap::new();
    for cond in &settings.conditions {
        let id = cond.query.datasource_id;
        if refs.contains_key(&id) {
            continue;
        }
        let found = datasources
            .get_datasource(txn, org_id, id)
            .await
            .map_err(|source| ConditionError::Datasource { id, source })?
            .ok_or(ConditionError::DatasourceNotFound(id))?;
        refs.insert(id, found);
    }
    build_condition(settings, &refs)
}

/// Pure translation given the resolved data sources, keyed by legacy id.
pub fn build_condition(
    settings: &DashAlertSettings,
    datasources: &HashMap<i64, DatasourceRef>,
) -> Result<TranslatedCondition, ConditionError> {
    let conds = &settings.conditions;
    if conds.is_empty() {
        return Err(ConditionError::Empty);
    }

    let mut by_ref_id: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
    for (i, cond) in conds.iter().enumerate() {
        if cond.query.params.len() != 3 {
            return Err(ConditionError::QueryParams {
                index: i + 1,
                got: cond.query.params.len(),
            });
        }
        by_ref_id.entry(cond.query.params[0].as_str()).or_default().push(i);
    }

    // Keep a query's letter while all its conditions share one time range,
    // otherwise give every distinct range its own query.
    let mut used: HashSet<String> = HashSet::new();
    let mut cond_ref_id: Vec<String> = vec![String::new(); conds.len()];
    let mut split: Vec<Vec<Vec<usize>>> = Vec::new();
    for (ref_id, idxes) in &by_ref_id {
        let mut ranges: BTreeMap<(&str, &str), Vec<usize>> = BTreeMap::new();
        for &i in idxes {
            let p = &conds[i].query.params;
            ranges.entry((p[1].as_str(), p[2].as_str())).or_default().push(i);
        }
        if ranges.len() == 1 {
            used.insert((*ref_id).to_string());
            for &i in idxes {
                cond_ref_id[i] = (*ref_id).to_string();
            }
        } else {
            split.push(ranges.into_values().collect());
        }
    }
    for groups in split {
        for idxes in groups {
            let ref_id = new_ref_id(&mut used)?;
            for i in idxes {
                cond_ref_id[i] = ref_id.clone();
            }
        }
    }

    let mut first_cond: BTreeMap<&str, usize> = BTreeMap::new();
    for (i, ref_id) in cond_ref_id.iter().enumerate() {
        first_cond.entry(ref_id.as_str()).or_insert(i);
    }

    let mut data = Vec::with_capacity(first_cond.len() + conds.len() * 2 + 1);
    for (ref_id, &i) in &first_cond {
        data.push(data_query(i, &conds[i], ref_id, datasources)?);
    }

    let mut thresholds = Vec::with_capacity(conds.len());
    for (i, cond) in conds.iter().enumerate() {
        let reduce_ref = new_ref_id(&mut used)?;
        data.push(expression(
            &reduce_ref,
            json!({
                "type": "reduce",
                "expression": cond_ref_id[i],
                "reducer": reducer(&cond.reducer.kind),
            }),
        ));

        let threshold_ref = new_ref_id(&mut used)?;
        let model = if cond.evaluator.kind == NO_VALUE_EVALUATOR {
            // Strict reduce yields NaN for an empty or all-null series.
            json!({
                "type": "math",
                "expression": format!("is_null(${reduce_ref}) || is_nan(${reduce_ref})"),
            })
        } else {
            json!({
                "type": "threshold",
                "expression": reduce_ref,
                "conditions": [{"evaluator": evaluator(i, cond)?}],
            })
        };
        data.push(expression(&threshold_ref, model));
        thresholds.push(threshold_ref);
    }

    if thresholds.len() == 1 {
        let condition = thresholds.remove(0);
        return Ok(TranslatedCondition { condition, data });
    }

    let mut combined = format!("${}", thresholds[0]);
    for (cond, ref_id) in conds.iter().zip(&thresholds).skip(1) {
        let op = if cond.operator.kind == "or" { "||" } else { "&&" };
        combined = format!("({combined}) {op} ${ref_id}");
    }
    let math_ref = new_ref_id(&mut used)?;
    data.push(expression(
        &math_ref,
        json!({"type": "math", "expression": combined}),
    ));

    Ok(TranslatedCondition {
        condition: math_ref,
        data,
    })
}

fn data_query(
    index: usize,
    cond: &DashAlertCondition,
    ref_id: &str,
    datasources: &HashMap<i64, DatasourceRef>,
) -> Result<AlertQuery, ConditionError> {
    let mut model: Map<String, Value> = match &cond.query.model {
        Value::Object(m) => m.clone(),
        Value::Null => Map::new(),
        _ => return Err(ConditionError::Model(index + 1)),
    };
    let query_type = model
        .get("queryType")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    model.insert("refId".into(), Value::from(ref_id));
    model
        .entry("maxDataPoints")
        .or_insert(Value::from(DEFAULT_MAX_DATA_POINTS));
    model
        .entry("intervalMs")
        .or_insert(Value::from(DEFAULT_INTERVAL_MS));
    let datasource = datasources.get(&cond.query.datasource_id);
    if let Some(ds) = datasource {
        model.insert(
            "datasource".into(),
            json!({"type": ds.plugin_type, "uid": ds.uid}),
        );
    }

    let params = &cond.query.params;
    let relative_time_range = RelativeTimeRange {
        from: parse_relative(&params[1])
            .ok_or_else(|| time_range_error(index, &params[1]))?,
        to: parse_relative(&params[2])
            .ok_or_else(|| time_range_error(index, &params[2]))?,
    };

    Ok(AlertQuery {
        ref_id: ref_id.to_string(),
        query_type,
        relative_time_range,
        datasource_uid: datasource.map(|ds| ds.uid.clone()).unwrap_or_default(),
        model: Value::Object(model),
    })
}

fn time_range_error(index: usize, value: &str) -> ConditionError {
    ConditionError::TimeRange {
        index: index + 1,
        value: value.to_string(),
    }
}

/// `now` is 0, `now-5m` and `5m` are 300.
fn parse_relative(raw: &str) -> Option<i64> {
    if raw == "now" {
        return Some(0);
    }
    let raw = raw.strip_prefix("now-").unwrap_or(raw);
    Duration::parse(raw).ok().map(|d| d.as_secs())
}

fn expression(ref_id: &str, mut model: Value) -> AlertQuery {
    if let Value::Object(m) = &mut model {
        m.insert("refId".into(), Value::from(ref_id));
        m.insert(
            "datasource".into(),
            json!({"type": EXPRESSION_DATASOURCE_UID, "uid": EXPRESSION_DATASOURCE_UID}),
        );
    }
    AlertQuery {
        ref_id: ref_id.to_string(),
        query_type: String::new(),
        relative_time_range: RelativeTimeRange::default(),
        datasource_uid: EXPRESSION_DATASOURCE_UID.to_string(),
        model,
    }
}

fn reducer(kind: &str) -> &str {
    match kind {
        "avg" => "mean",
        "count_non_null" => "count",
        other => other,
    }
}

fn evaluator(index: usize, cond: &DashAlertCondition) -> Result<Value, ConditionError> {
    let kind = cond.evaluator.kind.as_str();
    let want = match kind {
        "gt" | "lt" => 1,
        "within_range" | "outside_range" => 2,
        _ => {
            return Err(ConditionError::Evaluator {
                index: index + 1,
                kind: kind.to_string(),
            });
        }
    };
    let params = &cond.evaluator.params;
    if params.len() < want {
        return Err(ConditionError::EvaluatorParams {
            index: index + 1,
            kind: kind.to_string(),
            want,
            got: params.len(),
        });
    }
    Ok(json!({"type": kind, "params": &params[..want]}))
}

fn new_ref_id(used: &mut HashSet<String>) -> Result<String, ConditionError> {
    let letter = REF_ID_ALPHABET
        .chars()
        .map(String::from)
        .find(|candidate| !used.contains(candidate));
    let ref_id = match letter {
        Some(letter) => letter,
        None => (0..REF_ID_ATTEMPTS)
            .map(|_| short_uid())
            .find(|candidate| !used.contains(candidate))
            .ok_or(ConditionError::RefIdExhausted)?,
    };
    used.insert(ref_id.clone());
    Ok(ref_id)
}
