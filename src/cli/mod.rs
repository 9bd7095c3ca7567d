//! CLI commands for prodmap.
//!
//! - **learn**: learn mappings from a corpus file
//! - **translate**: translate an order document
//! - **mappings**: list or show stored mappings

pub mod learn;
pub mod logging;
pub mod mappings;
pub mod translate;

pub use learn::LearnCommand;
pub use logging::init_logging;
pub use mappings::MappingsCommand;
pub use translate::TranslateCommand;
