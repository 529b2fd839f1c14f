//! CLI domain: parse, route and output only.

mod output;
mod parse;
mod route;

pub use output::{format_frames_json, format_frames_text, map_error};
pub use parse::{Cli, Commands};
pub use route::RunContext;
