//! Command line adapter for the repdb engine
//!
//! Parses instruction scripts, feeds them to a [`TransactionCoordinator`]
//! and renders the resulting events.

pub mod error;
pub mod output;
pub mod parser;

pub use error::{ParseError, Result};
pub use output::{TextEvent, json_line};
pub use parser::{ParsedLine, parse_line, parse_script};

use repdb_engine::{Event, TransactionCoordinator};

/// Run a script to completion, collecting every event
///
/// Lines that do not parse and instructions the engine rejects are logged
/// and skipped.
pub fn execute_script(coordinator: &mut TransactionCoordinator, source: &str) -> Vec<Event> {
    let mut events = Vec::new();

    for parsed in parse_script(source) {
        let ParsedLine { line, instruction } = match parsed {
            Ok(parsed) => parsed,
            Err(err) => {
                tracing::warn!(line = err.line(), "skipping line: {}", err);
                continue;
            }
        };

        match coordinator.execute(instruction) {
            Ok(produced) => events.extend(produced),
            Err(err) => tracing::warn!(line, ?instruction, "instruction rejected: {}", err),
        }
    }

    events
}
