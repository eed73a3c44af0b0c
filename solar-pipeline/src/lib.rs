//! Solar quotation pricing and project provisioning.
//!
//! A quotation is priced by a staged candidate pipeline: its product rows and
//! complementary item rows are loaded by two sources, valued by a hydrator,
//! then aggregated and run through the markup cascade. Approving a quotation
//! provisions exactly one project and cost center for it.
//!
//! Storage sits behind [`store::QuotationStore`]; [`memory_store::MemoryStore`]
//! is the in-process implementation.

pub mod candidate_pipeline;
pub mod clock;
pub mod components;
pub mod config;
pub mod error;
pub mod hydrator;
pub mod memory_store;
pub mod pipelines;
pub mod project_history;
pub mod query_hydrator;
pub mod quotation_loader;
pub mod service;
pub mod side_effect;
pub mod source;
pub mod store;
pub mod transition;
pub mod types;
pub mod util;

pub use candidate_pipeline::{CandidatePipeline, PipelineResult, PipelineStage, StageError};
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::PricingConfig;
pub use error::{
    ConfigError, LoaderError, PricingError, ServiceError, StoreError, ValidationError,
};
pub use memory_store::MemoryStore;
pub use pipelines::quotation_pricing::{PricingOutcome, QuotationPricingPipeline};
pub use service::{PricedQuotation, QuotationDraft, QuotationService, QuotationUpdate};
pub use store::QuotationStore;
pub use transition::{ProvisioningResult, StatusTransitionHandler, TransitionOutcome};
pub use types::{Actor, LineDraft, LineKind, Quotation, QuotationId, QuotationStatus};
