//! Integration tests for the annal state ledger

mod cli_commands;
mod compaction;
mod concurrency;
mod ledger_queries;
mod persistence;
mod test_utils;
mod transport_replay;
