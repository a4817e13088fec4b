//! Resilient extraction pipeline for promotional-offer and order-line data
//! on a virtualized merchant order dashboard.
//!
//! The dashboard is a single-page app with a virtualized order table: rows
//! only exist once scrolled past, per-order detail lives in a slide-in
//! drawer, and the client-side router intermittently corrupts its own URL.
//! The pipeline treats all of that as weather, not as errors: every
//! interaction is attempted through redundant mechanisms, every wait is
//! bounded, and per-order failures degrade to sentinel values instead of
//! aborting the run.
//!
//! # Architecture
//!
//! - [`PageAdapter`] is the seam to the host page: element queries, routing,
//!   storage, clock. Production embeds a live tab; tests ship a scripted
//!   in-memory page.
//! - [`PageElement`] wraps a page node behind a boxed trait object, so the
//!   locators and extractors are engine-agnostic.
//! - [`Selector`] is a small query language (`testid:`, `aria:`, `role:`,
//!   `baseweb:`, `text:`) matched structurally against elements.
//! - [`Harvester`] is the orchestrator: one cooperative task drives
//!   locate, click, validate, extract, record, close across all rows,
//!   scrolling for more whenever a pass makes no progress.
//! - [`SummaryReport`] is the final aggregation, including the
//!   buy-one-get-one attribution of each offer to its likely line items.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use offer_harvest::{Harvester, NullStatusSink, PageAdapter};
//!
//! async fn run(page: Arc<dyn PageAdapter>) -> anyhow::Result<()> {
//!     let harvester = Harvester::new(page, Arc::new(NullStatusSink));
//!     if harvester.resume_if_requested().await?.is_none() {
//!         let report = harvester.run().await?;
//!         println!("{}", report.render());
//!     }
//!     Ok(())
//! }
//! ```

pub mod element;
pub mod errors;
pub mod extract;
pub mod harvester;
pub mod interaction;
pub mod locator;
pub mod navigation;
pub mod page;
pub mod report;
pub mod scroll;
pub mod selector;
pub mod session;
pub mod wait;

pub use element::{InputEvent, PageElement, PageNode};
pub use errors::HarvestError;
pub use harvester::{Harvester, HarvestConfig};
pub use page::{Dialog, DialogKind, NullStatusSink, PageAdapter, Route, StatusSink};
pub use report::{Attribution, DateSummary, SummaryReport};
pub use selector::Selector;
pub use session::{LineItem, Money, OrderRecord, RunState};
