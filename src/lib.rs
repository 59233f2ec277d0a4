pub mod error;
pub mod html;
pub mod parser;
pub mod report;
pub mod runner;
pub mod server;
pub mod store;
pub mod utils;

// Re-export common items
pub use error::{ExecutionError, RowError, RunError, SessionError, StoreError};
pub use html::extract_selector_candidates;
pub use parser::validate::preview;
pub use report::generate_report;
pub use runner::ExecutionCoordinator;
pub use store::{ScenarioRepository, ScenarioSession};
