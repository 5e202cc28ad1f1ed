//! # valigator
//!
//! Validation pipeline around the Spectral linting engine.
//!
//! The crate holds the HTTP-agnostic stages of a validation request:
//! content negotiation ([`negotiate`]), rule set resolution
//! ([`RulesetCatalog`]), staging of the inbound document
//! ([`stage_document`]), invocation of the engine ([`Spectral`]) and
//! post-processing of its report ([`strip_banner`]).
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use valigator::{
//!     LintInvocation, RulesetCatalog, Spectral, ValigatorConfig, negotiate, stage_document,
//! };
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ValigatorConfig::default();
//! let catalog = RulesetCatalog::fixed(["v5"]);
//!
//! let format = negotiate("application/json").ok_or("unsupported Accept")?;
//! let ruleset = catalog.resolve("V5").ok_or("unknown rule set")?;
//! let staged = stage_document(&config.staging_dir, b"openapi: 3.0.0\n").await?;
//!
//! let outcome = Spectral::from_config(&config)
//!     .lint(&LintInvocation {
//!         document: staged.path().to_path_buf(),
//!         ruleset: ruleset.location.clone(),
//!         format,
//!         skip_rules: config.skip_rules.clone(),
//!         display_only_failures: false,
//!     })
//!     .await?;
//! staged.remove().await;
//!
//! println!("findings: {}", outcome.has_findings());
//! # Ok(())
//! # }
//! ```

mod config;
mod engine;
mod error;
mod format;
mod report;
mod ruleset;
mod stage;

pub use config::{OutputMode, ValigatorConfig};
pub use engine::{ExitClass, LintInvocation, LintOutcome, Spectral, classify_exit};
pub use error::{ConfigError, LintError, StageError};
pub use format::{OutputFormat, SUPPORTED_MEDIA_TYPES, negotiate};
pub use report::{LEGACY_FORMAT_BANNER, strip_banner};
pub use ruleset::{Ruleset, RulesetCatalog};
pub use stage::{StagedDocument, stage_document};
