//! User Search - Segment Query Compiler
//!
//! Compiles a flat set of search-page parameters into a human description of
//! the segment and a SQL template that an external reporting service runs
//! later against the real identifier set.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  Parameters: include:<n>, <n>_<item>, overrides, columns         │
//! └─────────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  Parser -> FilterGroups (FilterCatalog lookups)                 │
//! └─────────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  Predicate builders (Geocoder, ContactLog) -> QueryPlan         │
//! │  AND within a group, OR across groups, overrides, extensions    │
//! └─────────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  SqlRenderer / SentinelCapture -> CompiledQuery                 │
//! └─────────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  ReportDispatcher -> ReportService (create + background run)    │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use usersearch::{FilterCatalog, QueryCompiler, SearchConfig};
//!
//! let config = SearchConfig::from_env()?;
//! let compiler = QueryCompiler::new(
//!     Arc::new(FilterCatalog::standard()),
//!     config.geocoder()?,
//!     Arc::new(db.contact_log()),
//! )
//! .with_config(config.compiler.clone());
//!
//! let compiled = compiler.compile("include:1=country&1_country=US").await?;
//! println!("{}\n{}", compiled.human_query, compiled.sql_template);
//! ```

pub mod builders;
pub mod catalog;
pub mod columns;
pub mod compiler;
pub mod config;
pub mod contacts;
#[cfg(feature = "database")]
pub mod database;
pub mod error;
pub mod geo;
pub mod params;
pub mod parser;
pub mod plan;
pub mod report;
pub mod sql;
pub mod store;

pub use catalog::{BuilderKind, FilterCatalog, FilterSpec};
pub use columns::{ExtensionColumn, ExtensionRegistry, SearchColumn, SearchColumnStore};
pub use compiler::{AssembledQuery, CompiledQuery, QueryCompiler};
pub use config::{CompilerConfig, SearchConfig};
pub use contacts::{ContactCriteria, ContactLog};
pub use error::{Result, SearchError, ValidationError};
pub use geo::Geocoder;
pub use params::QueryParams;
pub use plan::{Predicate, QueryPlan};
pub use report::{ReportDispatcher, ReportService};
pub use store::{MemoryUserStore, UserRecord, UserStore};
