//! Outbound bulk dispatch.
//!
//! Three modes over one sequential engine: fixed-text list sends with a
//! short fixed delay, label-segment sends, and campaign sends drawing a
//! random variant per recipient with wide randomized pacing. Validation
//! happens before any side effect; after that, per-recipient failures are
//! isolated and reported, never raised.

pub mod catalog;
pub mod dispatcher;
pub mod error;

pub use {
    catalog::{CampaignCatalog, CatalogError},
    dispatcher::{DispatchItem, DispatchReport, ItemStatus, OutboundDispatcher, Pacing},
    error::{Error, Result},
};
