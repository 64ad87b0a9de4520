//! Sort-key extractors: map a raw record to a comparable scalar.
//!
//! Built-in keys cover the fleet list's own columns; additional keys resolve
//! through externally supplied lookup tables (custom field paths, ticket
//! indexes) via a fixed-priority resolver chain.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use smallvec::SmallVec;

use trellis_core::{resolve_path, ResourceId};

/// Comparable scalar produced by an extractor.
///
/// Values extracted for one key share a variant; the derived variant order
/// only decides the fallback between heterogeneous values from generic
/// custom paths, and keeps the total order consistent either way.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum SortValue {
    Rank(u8),
    Int(i64),
    Time(i64),
    Version(SmallVec<[u64; 4]>),
    Text(String),
    Operation { state_rank: u8, progress: i64 },
    Readiness { tier: u8, since: i64 },
}

/// Purpose importance, most critical first. Unknown purposes rank after all
/// known ones. Overridable per call through [`SortContext::purpose_ranks`].
pub const PURPOSE_RANKS: &[(&str, u8)] = &[
    ("infrastructure", 0),
    ("production", 1),
    ("development", 2),
    ("evaluation", 3),
];
pub const PURPOSE_RANK_UNKNOWN: u8 = 4;

// lastOperation state ranks, severity first.
const OP_ERROR: u8 = 0;
const OP_ERROR_IN_PROGRESS: u8 = 1;
const OP_IN_PROGRESS: u8 = 2;
const OP_OK: u8 = 3;

// readiness tiers
const READY_ERRORED: u8 = 0;
const READY_UNHEALTHY: u8 = 1;
const READY_OK: u8 = 2;

/// One externally configured list column, keyed by the sort-key name it
/// registers; `path` is a dotted path into the raw record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomField {
    pub path: String,
}

/// Most recently updated ticket for one cluster, epoch seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketRef {
    pub updated_at: i64,
}

/// Externally supplied lookup context consulted at key-resolution and
/// extraction time. All tables are owned by the host and refreshed on its
/// schedule; the engine only reads them.
#[derive(Debug, Clone, Default)]
pub struct SortContext {
    pub custom_fields: FxHashMap<String, CustomField>,
    pub ticket_labels: FxHashMap<ResourceId, Vec<String>>,
    pub latest_ticket: FxHashMap<ResourceId, TicketRef>,
    /// Full replacement for [`PURPOSE_RANKS`] when set.
    pub purpose_ranks: Option<FxHashMap<String, u8>>,
}

/// A resolved sort key. Extraction returns None for "no value here": the
/// composer pins such records last regardless of direction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldExtractor {
    Name,
    CreationTimestamp,
    K8sVersion,
    Infrastructure,
    Purpose,
    LastOperation,
    Readiness,
    IssueSince,
    Path(String),
    TicketUpdated,
    TicketLabelCount,
}

/// Capability interface for turning a sort-key name into an extractor.
pub trait Resolver {
    fn resolve(&self, key: &str, ctx: &SortContext) -> Option<FieldExtractor>;
}

/// Fixed table of the list's own columns.
pub struct BuiltinResolver;

impl Resolver for BuiltinResolver {
    fn resolve(&self, key: &str, _ctx: &SortContext) -> Option<FieldExtractor> {
        match key {
            "name" => Some(FieldExtractor::Name),
            "creationTimestamp" => Some(FieldExtractor::CreationTimestamp),
            "k8sVersion" => Some(FieldExtractor::K8sVersion),
            "infrastructure" => Some(FieldExtractor::Infrastructure),
            "purpose" => Some(FieldExtractor::Purpose),
            "lastOperation" => Some(FieldExtractor::LastOperation),
            "readiness" => Some(FieldExtractor::Readiness),
            "issueSince" => Some(FieldExtractor::IssueSince),
            _ => None,
        }
    }
}

/// Columns registered through external configuration, keyed by name.
pub struct CustomFieldResolver;

impl Resolver for CustomFieldResolver {
    fn resolve(&self, key: &str, ctx: &SortContext) -> Option<FieldExtractor> {
        ctx.custom_fields
            .get(key)
            .map(|field| FieldExtractor::Path(field.path.clone()))
    }
}

/// Keys backed by the per-cluster ticket indexes.
pub struct TicketResolver;

impl Resolver for TicketResolver {
    fn resolve(&self, key: &str, _ctx: &SortContext) -> Option<FieldExtractor> {
        match key {
            "ticket" => Some(FieldExtractor::TicketUpdated),
            "ticketLabels" => Some(FieldExtractor::TicketLabelCount),
            _ => None,
        }
    }
}

/// Resolve a key through the chain: built-ins, then custom fields, then
/// ticket indexes. Unknown keys resolve to None and compare as a no-op.
pub fn resolve_key(key: &str, ctx: &SortContext) -> Option<FieldExtractor> {
    let chain: [&dyn Resolver; 3] = [&BuiltinResolver, &CustomFieldResolver, &TicketResolver];
    chain.iter().find_map(|resolver| resolver.resolve(key, ctx))
}

fn text_at<'a>(raw: &'a Value, pointer: &str) -> Option<&'a str> {
    raw.pointer(pointer).and_then(Value::as_str)
}

fn parse_ts(text: &str) -> Option<i64> {
    chrono::DateTime::parse_from_rfc3339(text)
        .ok()
        .map(|dt| dt.timestamp())
}

/// Earliest `lastTransitionTime` among conditions whose status is not
/// `"True"`. The bool reports whether any such condition exists.
fn earliest_issue(raw: &Value) -> (bool, i64) {
    let mut unhealthy = false;
    let mut since = i64::MAX;
    if let Some(conditions) = raw.pointer("/status/conditions").and_then(Value::as_array) {
        for condition in conditions {
            if condition.get("status").and_then(Value::as_str) == Some("True") {
                continue;
            }
            unhealthy = true;
            if let Some(ts) = condition
                .get("lastTransitionTime")
                .and_then(Value::as_str)
                .and_then(parse_ts)
            {
                since = since.min(ts);
            }
        }
    }
    (unhealthy, since)
}

fn has_last_errors(raw: &Value) -> bool {
    raw.pointer("/status/lastErrors")
        .and_then(Value::as_array)
        .map_or(false, |errors| !errors.is_empty())
}

impl FieldExtractor {
    pub fn extract(&self, raw: &Value, ctx: &SortContext) -> Option<SortValue> {
        match self {
            Self::Name => Some(SortValue::Text(
                text_at(raw, "/metadata/name").unwrap_or("").to_string(),
            )),
            Self::CreationTimestamp => {
                // Missing or unparseable timestamps cluster at the far end.
                let ts = text_at(raw, "/metadata/creationTimestamp")
                    .and_then(parse_ts)
                    .unwrap_or(i64::MAX);
                Some(SortValue::Time(ts))
            }
            Self::K8sVersion => {
                let mut parts: SmallVec<[u64; 4]> = SmallVec::new();
                if let Some(version) = text_at(raw, "/spec/kubernetes/version") {
                    for segment in version.split('.') {
                        parts.push(segment.parse().unwrap_or(0));
                    }
                }
                while parts.len() < 3 {
                    parts.push(0);
                }
                Some(SortValue::Version(parts))
            }
            Self::Infrastructure => {
                // The rendered column shows provider type and region, so the
                // ordering compares the same composite.
                let provider = text_at(raw, "/spec/provider/type").unwrap_or("");
                let region = text_at(raw, "/spec/region").unwrap_or("");
                Some(SortValue::Text(format!("{} {}", provider, region)))
            }
            Self::Purpose => {
                let purpose = text_at(raw, "/spec/purpose").unwrap_or("");
                let rank = match &ctx.purpose_ranks {
                    Some(table) => table.get(purpose).copied().unwrap_or(PURPOSE_RANK_UNKNOWN),
                    None => PURPOSE_RANKS
                        .iter()
                        .find(|(name, _)| *name == purpose)
                        .map(|(_, rank)| *rank)
                        .unwrap_or(PURPOSE_RANK_UNKNOWN),
                };
                Some(SortValue::Rank(rank))
            }
            Self::LastOperation => {
                let operation = raw.pointer("/status/lastOperation");
                let state = operation
                    .and_then(|op| op.get("state"))
                    .and_then(Value::as_str)
                    .unwrap_or("");
                let progress = operation
                    .and_then(|op| op.get("progress"))
                    .and_then(Value::as_i64);
                let failed = state == "Failed";
                let errored = failed || has_last_errors(raw);
                // Zero progress means nothing is in flight yet.
                let in_progress = !failed && progress.map_or(false, |p| p != 0 && p != 100);
                let state_rank = match (errored, in_progress) {
                    (true, false) => OP_ERROR,
                    (true, true) => OP_ERROR_IN_PROGRESS,
                    (false, true) => OP_IN_PROGRESS,
                    (false, false) => OP_OK,
                };
                Some(SortValue::Operation { state_rank, progress: progress.unwrap_or(0) })
            }
            Self::Readiness => {
                let (unhealthy, since) = earliest_issue(raw);
                let tier = if has_last_errors(raw) {
                    READY_ERRORED
                } else if unhealthy {
                    READY_UNHEALTHY
                } else {
                    READY_OK
                };
                Some(SortValue::Readiness { tier, since })
            }
            Self::IssueSince => {
                let (_, since) = earliest_issue(raw);
                Some(SortValue::Time(since))
            }
            Self::Path(path) => match resolve_path(raw, path)? {
                Value::String(s) => Some(SortValue::Text(s.clone())),
                Value::Number(n) => n
                    .as_i64()
                    .or_else(|| n.as_f64().map(|f| f as i64))
                    .map(SortValue::Int),
                Value::Bool(b) => Some(SortValue::Int(*b as i64)),
                _ => None,
            },
            Self::TicketUpdated => ctx
                .latest_ticket
                .get(&ResourceId::of(raw))
                .map(|ticket| SortValue::Time(ticket.updated_at)),
            Self::TicketLabelCount => ctx
                .ticket_labels
                .get(&ResourceId::of(raw))
                .map(|labels| SortValue::Int(labels.len() as i64)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use smallvec::smallvec;

    #[test]
    fn version_components_compare_numerically() {
        let ctx = SortContext::default();
        let nine = json!({ "spec": { "kubernetes": { "version": "1.9.0" } } });
        let ten = json!({ "spec": { "kubernetes": { "version": "1.10.0" } } });
        let v9 = FieldExtractor::K8sVersion.extract(&nine, &ctx).unwrap();
        let v10 = FieldExtractor::K8sVersion.extract(&ten, &ctx).unwrap();
        assert!(v9 < v10);

        let oh = json!({ "spec": { "kubernetes": { "version": "1.0.0" } } });
        let one = json!({ "spec": { "kubernetes": { "version": "1.1.0" } } });
        assert!(
            FieldExtractor::K8sVersion.extract(&oh, &ctx).unwrap()
                < FieldExtractor::K8sVersion.extract(&one, &ctx).unwrap()
        );
    }

    #[test]
    fn malformed_version_components_default_to_zero() {
        let ctx = SortContext::default();
        let raw = json!({ "spec": { "kubernetes": { "version": "1.2.3-rc1" } } });
        assert_eq!(
            FieldExtractor::K8sVersion.extract(&raw, &ctx),
            Some(SortValue::Version(smallvec![1, 2, 0]))
        );
        // short versions pad with zeros, absent versions sort first
        let short = json!({ "spec": { "kubernetes": { "version": "1.2" } } });
        assert_eq!(
            FieldExtractor::K8sVersion.extract(&short, &ctx),
            Some(SortValue::Version(smallvec![1, 2, 0]))
        );
        assert_eq!(
            FieldExtractor::K8sVersion.extract(&json!({}), &ctx),
            Some(SortValue::Version(smallvec![0, 0, 0]))
        );
    }

    #[test]
    fn unknown_purpose_ranks_least_important() {
        let ctx = SortContext::default();
        let production = json!({ "spec": { "purpose": "production" } });
        let mystery = json!({ "spec": { "purpose": "chaos-testing" } });
        let bare = json!({});
        assert_eq!(
            FieldExtractor::Purpose.extract(&production, &ctx),
            Some(SortValue::Rank(1))
        );
        assert_eq!(
            FieldExtractor::Purpose.extract(&mystery, &ctx),
            Some(SortValue::Rank(PURPOSE_RANK_UNKNOWN))
        );
        assert_eq!(
            FieldExtractor::Purpose.extract(&bare, &ctx),
            Some(SortValue::Rank(PURPOSE_RANK_UNKNOWN))
        );
    }

    #[test]
    fn purpose_ranks_are_overridable() {
        let mut ctx = SortContext::default();
        let mut table = FxHashMap::default();
        table.insert("sandbox".to_string(), 0u8);
        ctx.purpose_ranks = Some(table);
        let sandbox = json!({ "spec": { "purpose": "sandbox" } });
        let production = json!({ "spec": { "purpose": "production" } });
        assert_eq!(
            FieldExtractor::Purpose.extract(&sandbox, &ctx),
            Some(SortValue::Rank(0))
        );
        // override is a full replacement, not a merge
        assert_eq!(
            FieldExtractor::Purpose.extract(&production, &ctx),
            Some(SortValue::Rank(PURPOSE_RANK_UNKNOWN))
        );
    }

    #[test]
    fn operation_severity_orders_failures_first() {
        let ctx = SortContext::default();
        let failed = json!({ "status": { "lastOperation": { "state": "Failed", "progress": 80 } } });
        let reconciling =
            json!({ "status": { "lastOperation": { "state": "Processing", "progress": 40 } } });
        let done =
            json!({ "status": { "lastOperation": { "state": "Succeeded", "progress": 100 } } });
        let vf = FieldExtractor::LastOperation.extract(&failed, &ctx).unwrap();
        let vr = FieldExtractor::LastOperation.extract(&reconciling, &ctx).unwrap();
        let vd = FieldExtractor::LastOperation.extract(&done, &ctx).unwrap();
        assert!(vf < vr && vr < vd);
    }

    #[test]
    fn last_errors_make_a_succeeded_operation_errored() {
        let ctx = SortContext::default();
        let raw = json!({
            "status": {
                "lastOperation": { "state": "Succeeded", "progress": 100 },
                "lastErrors": [ { "description": "node pool degraded" } ]
            }
        });
        assert_eq!(
            FieldExtractor::LastOperation.extract(&raw, &ctx),
            Some(SortValue::Operation { state_rank: OP_ERROR, progress: 100 })
        );
    }

    #[test]
    fn issue_since_without_findings_is_far_future() {
        let ctx = SortContext::default();
        let healthy = json!({
            "status": { "conditions": [ { "status": "True", "lastTransitionTime": "2020-03-01T20:00:00Z" } ] }
        });
        assert_eq!(
            FieldExtractor::IssueSince.extract(&healthy, &ctx),
            Some(SortValue::Time(i64::MAX))
        );

        let degraded = json!({
            "status": { "conditions": [
                { "status": "False", "lastTransitionTime": "2020-02-01T20:00:00Z" },
                { "status": "False", "lastTransitionTime": "2020-01-01T20:00:00Z" }
            ] }
        });
        assert_eq!(
            FieldExtractor::IssueSince.extract(&degraded, &ctx),
            Some(SortValue::Time(parse_ts("2020-01-01T20:00:00Z").unwrap()))
        );
    }

    #[test]
    fn resolver_chain_priority() {
        let mut ctx = SortContext::default();
        assert_eq!(resolve_key("name", &ctx), Some(FieldExtractor::Name));
        assert_eq!(resolve_key("ticket", &ctx), Some(FieldExtractor::TicketUpdated));
        assert_eq!(resolve_key("bogus", &ctx), None);

        ctx.custom_fields.insert(
            "Z_Env".to_string(),
            CustomField { path: "metadata.namespace".to_string() },
        );
        assert_eq!(
            resolve_key("Z_Env", &ctx),
            Some(FieldExtractor::Path("metadata.namespace".to_string()))
        );
        // built-ins shadow a custom field registered under the same name
        ctx.custom_fields
            .insert("name".to_string(), CustomField { path: "spec.purpose".to_string() });
        assert_eq!(resolve_key("name", &ctx), Some(FieldExtractor::Name));
    }

    #[test]
    fn ticket_extractors_read_context_indexes() {
        let mut ctx = SortContext::default();
        let id = ResourceId::new("garden", "aster");
        ctx.latest_ticket.insert(id.clone(), TicketRef { updated_at: 1_600_000_000 });
        ctx.ticket_labels.insert(id, vec!["kind/bug".to_string(), "priority/critical".to_string()]);

        let raw = json!({ "metadata": { "name": "aster", "namespace": "garden" } });
        let other = json!({ "metadata": { "name": "begonia", "namespace": "garden" } });
        assert_eq!(
            FieldExtractor::TicketUpdated.extract(&raw, &ctx),
            Some(SortValue::Time(1_600_000_000))
        );
        assert_eq!(FieldExtractor::TicketUpdated.extract(&other, &ctx), None);
        assert_eq!(
            FieldExtractor::TicketLabelCount.extract(&raw, &ctx),
            Some(SortValue::Int(2))
        );
        assert_eq!(FieldExtractor::TicketLabelCount.extract(&other, &ctx), None);
    }
}
