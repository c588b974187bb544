/// This file contains the `main` program logic which loads an input with its
/// format (and track if there is one), then runs every configured mutation
/// stage against it, writing each unique mutant to the output directory

use strata::config::parse_args;
use strata::corpus::{load_baseline, DiskSink};
use strata::mutators::create_stage;
use strata::stats::Stats;
use strata::{fatal, prompt, prompt_warn};

fn main() {
    // Parse the command line
    let config = parse_args().unwrap_or_else(|error| {
        fatal!(error);
    });

    prompt!("Input path: '{}'", config.input);
    prompt!("Format path: '{}'", config.format);
    match &config.track {
        Some(track) => prompt!("Track path: '{}'", track),
        None => prompt_warn!("No track provided, the describing stage has nothing to do"),
    }

    // Load the baseline, tree must agree with the input
    prompt!("Loading baseline...");
    let baseline = load_baseline(&config).unwrap_or_else(|error| {
        fatal!(error);
    });

    prompt!(
        "Baseline is {} bytes described by {} chunks",
        baseline.buf.len(),
        baseline.tree.live_count()
    );
    if let Some(track) = &baseline.track {
        prompt!(
            "Track declares {} enums, {} lengths, {} offsets, {} constraints",
            track.enums.len(),
            track.lengths.len(),
            track.offsets.len(),
            track.constraints.len()
        );
    }

    // Create the sink trials are written to
    let mut sink = DiskSink::new(&config).unwrap_or_else(|error| {
        fatal!(error);
    });
    prompt!("Writing mutants to '{}'", sink.inputs_dir);

    match config.trials_per_stage {
        Some(budget) => prompt!("Stages stop after {} trials", budget),
        None => prompt_warn!("No trial budget provided, stages run to completion"),
    }

    let stage_config = config.stage_config();
    let mut stats = Stats::new();
    stats.start_session();

    for name in &config.stages {
        let mut stage = create_stage(name, &stage_config).unwrap_or_else(|error| {
            fatal!(error);
        });

        prompt!("Running stage '{}' ({})...", stage.name(), stage.short_name());
        sink.begin_stage();
        stats.start_stage();

        let report = stage.run_tagged(&baseline, &mut sink).unwrap_or_else(|error| {
            fatal!(error);
        });

        stats.finish_stage(stage.name(), &report);
        prompt!(
            "Stage '{}' submitted {} trials{}",
            stage.name(),
            report.trials,
            if report.stopped { " (stopped)" } else { "" }
        );
    }

    stats.saved = sink.saved;
    stats.duplicates = sink.duplicates;
    stats.print_stats();

    // Campaign over
    prompt!("Campaign finished");
}
