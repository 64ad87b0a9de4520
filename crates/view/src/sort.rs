//! Comparator composition and the freeze-aware sorter.
//!
//! `compose` builds one total order out of an ordered key list; `ViewSorter`
//! applies it to the live collection, or replays the armed freeze frame so a
//! user mid-interaction never sees rows move underneath the pointer.

use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Instant;

use rustc_hash::FxHashMap;
use serde_json::Value;
use tracing::debug;

use trellis_core::ResourceId;

use crate::fields::{resolve_key, FieldExtractor, SortContext};

/// Compare one resolved key under its direction. Records without a value
/// (None) pin last regardless of direction.
fn compare_key(
    extractor: &FieldExtractor,
    desc: bool,
    a: &Value,
    b: &Value,
    ctx: &SortContext,
) -> Ordering {
    match (extractor.extract(a, ctx), extractor.extract(b, ctx)) {
        (Some(va), Some(vb)) => {
            let ord = va.cmp(&vb);
            if desc { ord.reverse() } else { ord }
        }
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Build a total, direction-aware order over raw records.
///
/// Keys apply in order; equal comparisons fall through to the next key.
/// Unknown keys resolve to a no-op. A full tie falls back to name then
/// namespace, ascending, independent of the requested directions.
pub fn compose<'a>(
    sort_by: &[String],
    sort_desc: &[bool],
    ctx: &'a SortContext,
) -> impl Fn(&Value, &Value) -> Ordering + 'a {
    let keys: Vec<(Option<FieldExtractor>, bool)> = sort_by
        .iter()
        .enumerate()
        .map(|(i, key)| (resolve_key(key, ctx), sort_desc.get(i).copied().unwrap_or(false)))
        .collect();

    move |a, b| {
        for (extractor, desc) in &keys {
            let Some(extractor) = extractor else { continue };
            match compare_key(extractor, *desc, a, b, ctx) {
                Ordering::Equal => {}
                ord => return ord,
            }
        }
        let ia = ResourceId::of(a);
        let ib = ResourceId::of(b);
        ia.name.cmp(&ib.name).then_with(|| ia.namespace.cmp(&ib.namespace))
    }
}

/// One row of the derived view. While frozen, a row whose backing record
/// left the live collection carries the last-known record and `stale`.
#[derive(Debug, Clone)]
pub struct ViewRow {
    pub resource: Arc<Value>,
    pub stale: bool,
}

#[derive(Debug, Clone)]
struct FrozenEntry {
    id: ResourceId,
    last_seen: Arc<Value>,
}

/// Snapshot of the on-screen order, armed while the user is mid-interaction.
///
/// Mutation discipline: written on arm, read (and refreshed with current
/// records) on every frozen replay, cleared on release or reset.
#[derive(Debug, Default)]
pub struct FreezeFrame {
    entries: Option<Vec<FrozenEntry>>,
}

impl FreezeFrame {
    pub fn armed(&self) -> bool {
        self.entries.is_some()
    }

    fn arm(&mut self, order: &[(ResourceId, Arc<Value>)]) {
        debug!(rows = order.len(), "freeze frame armed");
        self.entries = Some(
            order
                .iter()
                .map(|(id, last)| FrozenEntry { id: id.clone(), last_seen: Arc::clone(last) })
                .collect(),
        );
    }

    fn release(&mut self) {
        if self.entries.take().is_some() {
            debug!("freeze frame released");
        }
    }

    fn reset(&mut self) {
        self.entries = None;
    }

    /// Replay the frozen order against the current input: still-present
    /// records are emitted at their frozen position (refreshing the
    /// last-known copy), vanished records are emitted stale, and records
    /// absent from the frame are suppressed entirely.
    fn replay(&mut self, items: &[Arc<Value>]) -> Vec<ViewRow> {
        let Some(entries) = self.entries.as_mut() else {
            return Vec::new();
        };
        let current: FxHashMap<ResourceId, &Arc<Value>> =
            items.iter().map(|record| (ResourceId::of(record), record)).collect();
        entries
            .iter_mut()
            .map(|entry| match current.get(&entry.id) {
                Some(record) => {
                    entry.last_seen = Arc::clone(record);
                    ViewRow { resource: Arc::clone(record), stale: false }
                }
                None => ViewRow { resource: Arc::clone(&entry.last_seen), stale: true },
            })
            .collect()
    }
}

/// Stateful sorter for one list-view session.
///
/// Owns the cached order of the most recent live pass and the freeze frame;
/// both are mutated only on the hosting UI's call sequence (single writer).
#[derive(Debug, Default)]
pub struct ViewSorter {
    last_order: Vec<(ResourceId, Arc<Value>)>,
    frame: FreezeFrame,
}

impl ViewSorter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a freeze frame is currently armed.
    pub fn frozen(&self) -> bool {
        self.frame.armed()
    }

    /// Drop the armed frame and the cached live order. A subsequent frozen
    /// call re-arms from a fresh order of the then-current input.
    pub fn reset(&mut self) {
        debug!("view sorter reset");
        self.last_order.clear();
        self.frame.reset();
    }

    /// Derive the view for the current input.
    ///
    /// Live: sort the input with the composed order. Frozen: replay the
    /// armed frame, arming it first from the order already on screen (the
    /// most recent live pass), not from a fresh sort of the current input.
    pub fn sort_items(
        &mut self,
        items: &[Arc<Value>],
        sort_by: &[String],
        sort_desc: &[bool],
        ctx: &SortContext,
        frozen: bool,
    ) -> Vec<ViewRow> {
        if frozen {
            if !self.frame.armed() {
                if self.last_order.is_empty() {
                    // No live pass to pin; freeze whatever the input holds
                    // now. An empty input arms an empty frame.
                    self.refresh_live(items, sort_by, sort_desc, ctx);
                }
                self.frame.arm(&self.last_order);
            }
            let rows = self.frame.replay(items);
            metrics::gauge!("view_rows", rows.len() as f64);
            metrics::gauge!(
                "view_stale_rows",
                rows.iter().filter(|row| row.stale).count() as f64
            );
            return rows;
        }

        self.frame.release();
        metrics::gauge!("view_stale_rows", 0.0);
        self.refresh_live(items, sort_by, sort_desc, ctx)
    }

    fn refresh_live(
        &mut self,
        items: &[Arc<Value>],
        sort_by: &[String],
        sort_desc: &[bool],
        ctx: &SortContext,
    ) -> Vec<ViewRow> {
        let started = Instant::now();
        let cmp = compose(sort_by, sort_desc, ctx);
        let mut sorted: Vec<Arc<Value>> = items.to_vec();
        sorted.sort_by(|a, b| cmp(a, b));
        self.last_order = sorted
            .iter()
            .map(|record| (ResourceId::of(record), Arc::clone(record)))
            .collect();
        metrics::histogram!("view_sort_ms", started.elapsed().as_secs_f64() * 1_000.0);
        metrics::gauge!("view_rows", sorted.len() as f64);
        sorted
            .into_iter()
            .map(|resource| ViewRow { resource, stale: false })
            .collect()
    }
}
