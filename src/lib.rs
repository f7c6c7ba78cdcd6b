//! Access-Pattern Risk Scoring
//!
//! Batch pipeline that turns stored per-user login events into an anomaly
//! count, classifies that count into a risk tier, forecasts a future tier
//! from static profile attributes, and fuses everything with the
//! questionnaire-derived risk into one persisted record per user.
//!
//! # Modules
//!
//! - `data`: Document shapes, validation and ingestion of events/profiles
//! - `features`: One-hot encoding and standardization of event attributes
//! - `anomaly`: Seeded isolation forest and the per-event anomaly detector
//! - `risk`: Risk tiers, anomaly aggregation and questionnaire tiering
//! - `forecast`: Linear regression and the future-risk regressor
//! - `store`: Document source / risk record store traits and implementation
//! - `fusion`: Record fusion and idempotent upserts
//! - `pipeline`: Batch orchestration
//!
//! # Example
//!
//! ```no_run
//! use access_risk_scoring::{
//!     pipeline::{PipelineContext, RiskPipeline},
//!     store::DocumentStore,
//!     utils::PipelineConfig,
//! };
//!
//! let store = DocumentStore::open("data").unwrap();
//! let config = PipelineConfig::default();
//! let pipeline = RiskPipeline::new(&store, config);
//!
//! let ctx = PipelineContext::now(42);
//! let summary = pipeline.run(&ctx).unwrap();
//! println!("Scored {} users", summary.users_scored);
//! ```

pub mod anomaly;
pub mod data;
pub mod error;
pub mod features;
pub mod forecast;
pub mod fusion;
pub mod pipeline;
pub mod risk;
pub mod store;
pub mod utils;

pub use error::{Result, RiskError};
