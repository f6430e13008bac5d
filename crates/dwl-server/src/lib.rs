//! DWL Server Library
//!
//! HTTP front end for loading CSV files into a PostgreSQL data warehouse.
//!
//! # Overview
//!
//! A client posts a batch of CSV files. The server:
//!
//! 1. stages every file durably under the staging directory,
//! 2. subscribes to the transform job's notification topic,
//! 3. calls the transform procedure with the staged paths,
//! 4. drains the progress notices the procedure published,
//! 5. counts rows in the destination relation to verify the load,
//! 6. appends one line to the audit log and answers with an outcome report.
//!
//! # Modules
//!
//! - [`staging`]: durable, atomic writes of uploaded files
//! - [`notify`]: subscription to the transform job's progress notices
//! - [`transform`]: transform job invocation and load verification
//! - [`audit`]: append-only audit and fault logs
//! - [`pipeline`]: the orchestrator tying the above together
//! - [`features`] and [`api`]: the axum HTTP surface
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use dwl_server::{
//!     audit::FileLineLog,
//!     notify::MemoryNotificationChannel,
//!     pipeline::{OrchestratorSettings, PipelineComponents, UploadOrchestrator},
//!     staging::{StagingStore, UploadBatch, UploadEntry},
//!     config::PipelineConfig,
//! };
//! # use dwl_server::transform::{TransformJob, LoadVerifier};
//! # async fn example(
//! #     job: Arc<dyn TransformJob>,
//! #     verifier: Arc<dyn LoadVerifier>,
//! # ) -> anyhow::Result<()> {
//! let config = PipelineConfig::default();
//! let components = PipelineComponents {
//!     staging: StagingStore::new(&config.staging_dir),
//!     channel: Arc::new(MemoryNotificationChannel::new()),
//!     job,
//!     verifier,
//!     audit: Arc::new(FileLineLog::open(&config.audit_log).await?),
//!     faults: Arc::new(FileLineLog::open(&config.fault_log).await?),
//! };
//! let orchestrator = UploadOrchestrator::new(components, OrchestratorSettings::from(&config));
//!
//! let batch: UploadBatch = [UploadEntry::new("sales.csv", b"id,amount\n1,9.5\n".to_vec())]
//!     .into_iter()
//!     .collect();
//! let report = orchestrator.run(batch).await;
//! println!("{}", report.message);
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod audit;
pub mod config;
pub mod error;
pub mod features;
pub mod middleware;
pub mod notify;
pub mod pipeline;
pub mod staging;
pub mod transform;

pub use config::Config;
pub use error::AppError;
