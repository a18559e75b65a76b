use std::path::Path;
use std::process;

use certify_core::layout::{Layout, DEFAULT_LAYOUT};

use crate::{print_json, report_error, LayoutCommands, OutputFormat};

pub(crate) fn cmd_layout(command: LayoutCommands, output: OutputFormat, quiet: bool) {
    match command {
        LayoutCommands::Default => match output {
            OutputFormat::Text => print!("{}", DEFAULT_LAYOUT),
            OutputFormat::Json => print_json(&serde_json::json!({ "layout": DEFAULT_LAYOUT })),
        },
        LayoutCommands::Check { path } => check(&path, output, quiet),
    }
}

/// Parse the layout and merge it with placeholder values, so a missing or
/// misspelt field is reported before any batch runs.
fn check(path: &Path, output: OutputFormat, quiet: bool) {
    let result = Layout::load(path).and_then(|layout| layout.check_fields());
    match result {
        Ok(()) => match output {
            OutputFormat::Text => {
                if !quiet {
                    println!("{}: ok", path.display());
                }
            }
            OutputFormat::Json => print_json(&serde_json::json!({
                "path": path,
                "valid": true,
            })),
        },
        Err(e) => {
            report_error(&format!("{}: {}", path.display(), e), output, quiet);
            process::exit(1);
        }
    }
}
