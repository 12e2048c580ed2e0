use crate::cli::RunArgs;
use crate::config::file::ProtocolFile;
use crate::config::load_registry;
use crate::config::models::{AppConfig, ProtocolStep, ReportSelection};
use crate::error::{CliError, Result};
use crate::utils::progress::CliProgressHandler;
use std::path::Path;
use tracing::{debug, error, info, warn};
use welltrack::core::models::deck::Deck;
use welltrack::engine::actuator::{Actuator, RecordingActuator};
use welltrack::engine::error::EngineError;
use welltrack::engine::progress::{Progress, ProgressReporter};
use welltrack::workflows::mixing::{mix, mix_with_pattern, wet_tip};
use welltrack::workflows::report::WellReport;
use welltrack::workflows::transfer::{transfer_forward, transfer_reverse};

pub fn run(args: RunArgs) -> Result<()> {
    info!("Starting protocol replay...");
    debug!("Run arguments: {:?}", &args);

    let mut protocol = ProtocolFile::from_file(&args.protocol)?;
    protocol.apply_set_values(&args.set_values)?;

    let base_dir = args.protocol.parent().unwrap_or(Path::new("."));
    let registry = load_registry(base_dir, &protocol.calibration, &args.calibration)?;
    let AppConfig {
        mut deck,
        steps,
        report,
    } = protocol.into_app_config(&registry)?;

    let handler = if args.no_progress {
        CliProgressHandler::hidden()
    } else {
        CliProgressHandler::new()
    };
    let reporter = ProgressReporter::with_callback(handler.get_callback());
    let mut actuator = RecordingActuator::new();

    let failed = execute_steps(&mut deck, &mut actuator, &reporter, &steps, args.strict)?;
    info!(
        commands = actuator.commands().len(),
        "Protocol replay finished."
    );

    for well in collect_reports(&deck, &report)? {
        print!("{}", well);
    }

    if failed > 0 {
        return Err(CliError::StepsFailed {
            failed,
            total: steps.len(),
        });
    }
    Ok(())
}

/// Runs every step in order and returns how many failed.
///
/// A failed step leaves the deck as it was before that step's failing pass. In strict mode the
/// first failure is returned instead.
pub fn execute_steps(
    deck: &mut Deck,
    actuator: &mut dyn Actuator,
    reporter: &ProgressReporter,
    steps: &[ProtocolStep],
    strict: bool,
) -> Result<usize> {
    let mut failed = 0;
    for (index, step) in steps.iter().enumerate() {
        reporter.report(Progress::StepStart { name: step.kind() });
        let result = run_step(deck, actuator, reporter, step);
        reporter.report(Progress::StepFinish);

        if let Err(e) = result {
            if strict {
                return Err(e.into());
            }
            error!(step = index + 1, kind = step.kind(), "Step failed: {}", e);
            failed += 1;
        }
    }
    Ok(failed)
}

fn run_step(
    deck: &mut Deck,
    actuator: &mut dyn Actuator,
    reporter: &ProgressReporter,
    step: &ProtocolStep,
) -> std::result::Result<(), EngineError> {
    match step {
        ProtocolStep::TransferForward { request, options } => {
            let report = transfer_forward(deck, actuator, reporter, request, options)?;
            note_cancelled(reporter, report.cancelled_passes());
        }
        ProtocolStep::TransferReverse { request, options } => {
            let report = transfer_reverse(deck, actuator, reporter, request, options)?;
            note_cancelled(reporter, report.cancelled_passes());
        }
        ProtocolStep::Mix {
            pipette,
            well,
            params,
        } => {
            let report = mix(deck, actuator, *pipette, *well, params)?;
            info!(
                fraction = report.mixing_fraction,
                cycles = report.completed_cycles,
                "Mixed."
            );
        }
        ProtocolStep::MixPattern {
            pipette,
            well,
            volume,
            cycles,
            pattern,
        } => {
            let report =
                mix_with_pattern(deck, actuator, *pipette, *well, *volume, *cycles, *pattern)?;
            info!(
                fraction = report.mixing_fraction,
                cycles = report.completed_cycles,
                "Mixed."
            );
        }
        ProtocolStep::Wet {
            pipette,
            well,
            volume,
            cycles,
        } => {
            let warnings = wet_tip(deck, actuator, *pipette, *volume, *well, *cycles)?;
            debug!(warnings = warnings.len(), "Tip wetting done.");
        }
    }
    Ok(())
}

fn note_cancelled(reporter: &ProgressReporter, cancelled: usize) {
    if cancelled > 0 {
        warn!(cancelled, "Passes were skipped to avoid overflowing the destination.");
        reporter.report(Progress::Message(format!(
            "{} pass(es) cancelled to prevent overflow",
            cancelled
        )));
    }
}

/// Reports of the selected wells, keeping only the selected constituents.
pub fn collect_reports(deck: &Deck, selection: &ReportSelection) -> Result<Vec<WellReport>> {
    let mut reports = if selection.wells.is_empty() {
        WellReport::capture_all(deck)?
    } else {
        selection
            .wells
            .iter()
            .map(|&id| WellReport::capture(deck, id))
            .collect::<std::result::Result<Vec<_>, _>>()?
    };
    if !selection.constituents.is_empty() {
        for report in &mut reports {
            report
                .constituents
                .retain(|line| selection.constituents.contains(&line.name));
        }
    }
    Ok(reports)
}
