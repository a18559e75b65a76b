use std::path::Path;
use std::process;

use certify_core::roster::{random_entries, sample_entries, write_entries, RosterEntry};
use rand::rngs::StdRng;
use rand::{RngCore, SeedableRng};

use crate::{print_json, report_error, OutputFormat, RosterCommands};

pub(crate) fn cmd_roster(command: RosterCommands, output: OutputFormat, quiet: bool) {
    let (path, entries) = match command {
        RosterCommands::Sample { path } => (path, sample_entries()),
        RosterCommands::Random { path, count, seed } => {
            let mut rng: Box<dyn RngCore> = match seed {
                Some(seed) => Box::new(StdRng::seed_from_u64(seed)),
                None => Box::new(rand::thread_rng()),
            };
            (path, random_entries(count, &mut *rng))
        }
    };
    write(&path, &entries, output, quiet);
}

fn write(path: &Path, entries: &[RosterEntry], output: OutputFormat, quiet: bool) {
    let result = std::fs::File::create(path)
        .map_err(|e| e.to_string())
        .and_then(|file| {
            write_entries(entries, std::io::BufWriter::new(file)).map_err(|e| e.to_string())
        });
    if let Err(e) = result {
        let msg = format!("error writing roster '{}': {}", path.display(), e);
        report_error(&msg, output, quiet);
        process::exit(1);
    }

    match output {
        OutputFormat::Text => {
            if !quiet {
                println!("Wrote {} participants to {}", entries.len(), path.display());
            }
        }
        OutputFormat::Json => print_json(&serde_json::json!({
            "path": path,
            "participants": entries.len(),
        })),
    }
}
