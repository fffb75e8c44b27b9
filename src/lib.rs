//! Shareholder Election Core
//!
//! Election lifecycle, weighted vote admission, tallies and voter reports for
//! a corporate general assembly.
//!
//! ```rust
//! use assembly_vote::AssemblyService;
//! use assembly_vote::config::ElectionConfig;
//! use assembly_vote::types::{Caller, Voter};
//! use assembly_vote::voting::NewPosition;
//! use chrono::NaiveDate;
//! use rust_decimal::Decimal;
//!
//! let (service, _audit) = AssemblyService::in_memory(ElectionConfig::default());
//! let admin = Caller::admin();
//!
//! let day = NaiveDate::from_ymd_opt(2026, 12, 20).unwrap();
//! let election = service.create_open_election(&admin, "AGM 2026", day).unwrap();
//! let board = service
//!     .create_position(&admin, election.id, NewPosition {
//!         name: "Board".into(),
//!         description: String::new(),
//!         max_candidates: Some(2),
//!         max_votes: 2,
//!     })
//!     .unwrap();
//! let alice = service.register_candidate(&admin, "Alice", "", None).unwrap();
//! service.assign_candidate(&admin, alice.id, board.id).unwrap();
//! service.activate_position(&admin, board.id).unwrap();
//!
//! let voter = Voter::new("SH-1", "Bob", Decimal::new(100, 0), true).unwrap();
//! service.register_voter(&admin, voter).unwrap();
//! service.cast_candidate_vote(&admin, "SH-1", board.id, alice.id).unwrap();
//!
//! let tally = service.tally_candidate_votes(board.id).unwrap();
//! assert_eq!(tally.get("Alice"), Some(Decimal::new(100, 0)));
//! ```

pub mod audit;
pub mod config;
pub mod errors;
pub mod service;
pub mod store;
pub mod types;
pub mod voting;

// Re-export commonly used types
pub use errors::{Error, ErrorKind, Result};
pub use service::AssemblyService;

use config::LoggingConfig;
use tracing_subscriber::EnvFilter;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize logging from `RUST_LOG`, defaulting to `assembly_vote=info`
pub fn init() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "assembly_vote=info".into()),
        )
        .try_init()
        .map_err(|e| Error::internal(format!("Failed to install tracing subscriber: {e}")))?;

    tracing::info!("Election core v{} initialized", VERSION);
    Ok(())
}

/// Initialize logging from a [`LoggingConfig`]
pub fn init_with(logging: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_new(&logging.level)
        .map_err(|e| Error::validation(format!("Invalid LOG_LEVEL {:?}: {e}", logging.level)))?;
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    let installed = match logging.format.as_str() {
        "pretty" => builder.pretty().try_init(),
        "compact" => builder.compact().try_init(),
        "full" => builder.try_init(),
        other => {
            return Err(Error::validation(format!(
                "Invalid LOG_FORMAT {other:?}: expected full, compact or pretty"
            )));
        }
    };
    installed.map_err(|e| Error::internal(format!("Failed to install tracing subscriber: {e}")))?;

    tracing::info!(format = %logging.format, "Election core v{} initialized", VERSION);
    Ok(())
}
