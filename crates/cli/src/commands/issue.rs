use std::path::Path;
use std::process;

use certify_core::{
    deliver_all, load_roster, save_report, BatchOutcome, Config, DeliveryTally, Issuer, Layout,
    Outbox,
};

use crate::{print_json, report_error, OutputFormat};

/// Ingest a roster, issue every certificate and write the report.
///
/// Exits 0 when the batch ran, even if some records failed; those are in
/// the report. Exits 1 when the batch could not run at all.
pub(crate) fn cmd_issue(
    config: Config,
    roster_path: &Path,
    layout_path: Option<&Path>,
    report_path: &Path,
    outbox_dir: Option<&Path>,
    output: OutputFormat,
    quiet: bool,
) {
    let participants = match load_roster(roster_path, &config) {
        Ok(p) => p,
        Err(e) => {
            let msg = format!("error loading roster '{}': {}", roster_path.display(), e);
            fail(output, quiet, msg)
        }
    };

    let layout = match layout_path {
        Some(path) => Layout::load(path),
        None => Layout::default_layout(),
    };
    let layout = match layout {
        Ok(l) => l,
        Err(e) => fail(output, quiet, format!("error loading layout: {}", e)),
    };

    let issuer = match Issuer::new(config, layout) {
        Ok(i) => i,
        Err(e) => fail(output, quiet, format!("cannot start batch: {}", e)),
    };
    let outcome = issuer.run(&participants);

    if let Err(e) = save_report(&outcome.records, report_path) {
        fail(output, quiet, e.to_string());
    }

    let delivery = outbox_dir.map(|dir| match Outbox::new(dir) {
        Ok(mut outbox) => {
            deliver_all(&outcome.records, &mut outbox, &issuer.config().organization)
        }
        Err(e) => fail(output, quiet, e.to_string()),
    });

    print_summary(&outcome, issuer.config(), report_path, delivery, output, quiet);
}

fn fail(output: OutputFormat, quiet: bool, msg: String) -> ! {
    report_error(&msg, output, quiet);
    process::exit(1);
}

fn print_summary(
    outcome: &BatchOutcome,
    config: &Config,
    report_path: &Path,
    delivery: Option<DeliveryTally>,
    output: OutputFormat,
    quiet: bool,
) {
    match output {
        OutputFormat::Text => {
            if quiet {
                return;
            }
            println!("Processed: {}", outcome.total());
            println!("Succeeded: {}", outcome.succeeded);
            println!("Failed:    {}", outcome.failed);
            if let Some(tally) = delivery {
                println!("Delivered: {} ({} failed)", tally.sent, tally.failed);
            }
            println!("Certificates: {}", config.pdf_dir.display());
            println!("QR codes:     {}", config.qr_dir.display());
            println!("Report:       {}", report_path.display());
            for issued in outcome.records.iter().filter(|r| !r.outcome.is_success()) {
                println!(
                    "  #{} {}: {}",
                    issued.participant.id,
                    issued.participant.full_name,
                    issued.outcome.error.as_deref().unwrap_or("unknown error")
                );
            }
        }
        OutputFormat::Json => print_json(&serde_json::json!({
            "processed": outcome.total(),
            "succeeded": outcome.succeeded,
            "failed": outcome.failed,
            "delivery": delivery,
            "pdf_dir": config.pdf_dir,
            "qr_dir": config.qr_dir,
            "report": report_path,
            "records": outcome.records,
        })),
    }
}
