//! Trellis view engine: multi-key, direction-aware ordering over raw
//! cluster records, and the freeze-aware sorter that keeps a live,
//! externally-refreshed list visually stable for a user mid-interaction.

#![forbid(unsafe_code)]

pub mod fields;
pub mod sort;

pub use fields::{
    resolve_key, CustomField, FieldExtractor, Resolver, SortContext, SortValue, TicketRef,
    PURPOSE_RANKS, PURPOSE_RANK_UNKNOWN,
};
pub use sort::{compose, FreezeFrame, ViewRow, ViewSorter};
