// ABOUTME: Everything that talks to the Power BI REST API
// ABOUTME: Transport, upstream models, pagination and the resource/history calls

pub mod api;
pub mod client;
pub mod models;
pub mod pagination;

pub use api::PowerBiApi;
pub use client::{HttpTransport, Transport};
pub use models::{
    Dataflow, Dataset, Page, RawHistoryEntry, RawRefreshEntry, RawTransactionEntry,
    RefreshAttempt, Workspace,
};
pub use pagination::fetch_all_pages;
