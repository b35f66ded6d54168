//! The build state machine.
//!
//! One byte-string of state lives in the store, so a restarted process
//! resumes where the previous one stopped. Phases re-run from scratch:
//! each begins by resetting the tables it owns.

use treestat_types::{make_error_msg, Result, StatusCode};

use crate::aggregate;
use crate::config::Settings;
use crate::ingest;
use crate::store::{TreeStore, ROOT_PATH};

/// Persisted driver states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    /// Fresh store; nothing has run yet. Persisted as the empty string.
    Fresh,
    InputProcessing,
    InputProcessed,
    Finalize,
    TreeReady,
    Failed,
}

impl DriverState {
    pub fn as_str(&self) -> &'static str {
        match self {
            DriverState::Fresh => "",
            DriverState::InputProcessing => "inputProcessing",
            DriverState::InputProcessed => "inputProcessed",
            DriverState::Finalize => "finalize",
            DriverState::TreeReady => "treeReady",
            DriverState::Failed => "failed",
        }
    }

    pub fn parse(raw: &str) -> Result<Self> {
        match raw {
            "" => Ok(DriverState::Fresh),
            "inputProcessing" => Ok(DriverState::InputProcessing),
            "inputProcessed" => Ok(DriverState::InputProcessed),
            "finalize" => Ok(DriverState::Finalize),
            "treeReady" => Ok(DriverState::TreeReady),
            "failed" => Ok(DriverState::Failed),
            other => make_error_msg(
                StatusCode::INVALID_STATE,
                format!("unknown driver state '{other}'"),
            ),
        }
    }
}

/// Drive the store to `treeReady`, running whichever phases its persisted
/// state still requires. Returns once the tree is ready to query.
pub fn run(store: &TreeStore, settings: &Settings) -> Result<()> {
    settings.validate()?;
    loop {
        let state = DriverState::parse(&store.state()?)?;
        tracing::info!(state = state.as_str(), "driver state");
        match state {
            DriverState::Fresh => {
                store.set_state(DriverState::InputProcessing.as_str())?;
            }
            DriverState::InputProcessing => match ingest::process_input(store, settings) {
                Ok(summary) => {
                    tracing::info!(
                        lines = summary.lines_dispatched,
                        nodes = summary.nodes_created,
                        "input processed"
                    );
                    store.set_state(DriverState::InputProcessed.as_str())?;
                }
                Err(status) => {
                    store.set_state(DriverState::Failed.as_str())?;
                    return Err(status);
                }
            },
            DriverState::InputProcessed => {
                store.set_state(DriverState::Finalize.as_str())?;
            }
            DriverState::Finalize => {
                match aggregate::finalize(store, ROOT_PATH, settings) {
                    Ok(summary) => {
                        tracing::info!(nodes = summary.nodes_finalized, "tree finalized");
                        store.set_state(DriverState::TreeReady.as_str())?;
                    }
                    Err(status) => {
                        store.set_state(DriverState::Failed.as_str())?;
                        return Err(status);
                    }
                }
            }
            DriverState::TreeReady => {
                let counts = store.table_counts()?;
                tracing::info!(
                    nodes = counts.nodes,
                    stat_mappings = counts.stat_mappings,
                    aggregates = counts.aggregates,
                    "tree ready"
                );
                return Ok(());
            }
            DriverState::Failed => {
                return make_error_msg(
                    StatusCode::INVALID_STATE,
                    "previous build failed; remove the store and rebuild",
                );
            }
        }
    }
}
