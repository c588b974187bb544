/// This file contains all of the logic necessary to formulate a coherent
/// Config data structure that the driver passes around so that we can parse
/// args appropriately. We use the `clap` crate and parse args here
use clap::{Arg, ArgAction, ArgMatches, Command};

use crate::err::StrataErr;
use crate::mutators::{
    StageConfig, DEFAULT_HAVOC_MULTIPLIER, DEFAULT_HAVOC_STACK, DEFAULT_MAX_INPUT_SIZE, STAGE_NAMES,
};

// Struct that contains all of the configurable information the driver needs
#[derive(Clone, Debug)]
pub struct Config {
    pub input: String,
    pub format: String,
    pub track: Option<String>,
    pub output_dir: String,
    pub stages: Vec<String>,
    pub mutator_seed: Option<usize>,
    pub trials_per_stage: Option<usize>,
    pub havoc_multiplier: usize,
    pub havoc_stack: usize,
    pub max_input_size: usize,
    pub verify_trees: bool,
}

impl Config {
    /// The knobs the library stages care about
    pub fn stage_config(&self) -> StageConfig {
        StageConfig {
            seed: self.mutator_seed,
            havoc_multiplier: self.havoc_multiplier,
            havoc_stack: self.havoc_stack,
            max_input_size: self.max_input_size,
            verify_trees: self.verify_trees,
        }
    }
}

fn command() -> Command {
    Command::new("strata")
        .version("0.0.1")
        .about("Structure-aware Mutation Engine Driven by Input Descriptions")
        .arg(Arg::new("input")
            .long("input")
            .value_name("INPUT")
            .help("File path of the input to mutate")
            .required(true))
        .arg(Arg::new("format")
            .long("format")
            .value_name("FORMAT")
            .help("File path of the JSON structural description of the input")
            .required(true))
        .arg(Arg::new("track")
            .long("track")
            .value_name("TRACK")
            .help("File path of the field semantics (enums, lengths, offsets) of the input (optional)"))
        .arg(Arg::new("output-dir")
            .long("output-dir")
            .value_name("OUTPUT_DIR")
            .help("Directory to store mutated inputs and their formats")
            .required(true))
        .arg(Arg::new("stages")
            .long("stages")
            .value_name("STAGES")
            .help("Comma separated stages to run (field_flip,havoc,describing by default)")
            .value_delimiter(','))
        .arg(Arg::new("mutator-seed")
            .long("mutator-seed")
            .value_name("SEED")
            .help("Optional seed value provided to mutator pRNG (usize)"))
        .arg(Arg::new("trials-per-stage")
            .long("trials-per-stage")
            .value_name("TRIALS")
            .help("Number of trials after which each stage is stopped (unlimited default)"))
        .arg(Arg::new("havoc-multiplier")
            .long("havoc-multiplier")
            .value_name("MULTIPLIER")
            .help("Number of havoc bursts per candidate chunk (16 default)"))
        .arg(Arg::new("havoc-stack")
            .long("havoc-stack")
            .value_name("STACK")
            .help("Maximum number of edits stacked in one havoc burst (8 default)"))
        .arg(Arg::new("max-input-size")
            .long("max-input-size")
            .value_name("BYTES")
            .help("Size havoc never grows an input past (1MiB default)"))
        .arg(Arg::new("verify-trees")
            .long("verify-trees")
            .help("Check every mutated tree for consistency before it is saved")
            .action(ArgAction::SetTrue))
}

// Optional numeric argument, present but malformed is an error
fn parse_usize(matches: &ArgMatches, name: &str) -> Result<Option<usize>, StrataErr> {
    match matches.get_one::<String>(name) {
        None => Ok(None),
        Some(str_repr) => {
            let Ok(value) = str_repr.parse::<usize>() else {
                return Err(StrataErr::from(&format!("Invalid --{} value", name)));
            };

            Ok(Some(value))
        }
    }
}

fn required(matches: &ArgMatches, name: &str) -> Result<String, StrataErr> {
    matches
        .get_one::<String>(name)
        .cloned()
        .ok_or_else(|| StrataErr::from(&format!("No '--{}' argument", name)))
}

/// Build a Config from an explicit argument list, first item is the program
pub fn parse_args_from<I, T>(args: I) -> Result<Config, StrataErr>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    let matches = command()
        .try_get_matches_from(args)
        .map_err(|e| StrataErr::from(&e.to_string()))?;

    let input = required(&matches, "input")?;
    let format = required(&matches, "format")?;
    let output_dir = required(&matches, "output-dir")?;
    let track = matches.get_one::<String>("track").cloned();
    let verify_trees = matches.get_flag("verify-trees");

    // Stage selection, everything in run order if none were named
    let stages: Vec<String> = match matches.get_many::<String>("stages") {
        None => STAGE_NAMES.iter().map(|name| name.to_string()).collect(),
        Some(names) => names
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())
            .collect(),
    };

    for stage in &stages {
        if !STAGE_NAMES.contains(&stage.as_str()) {
            return Err(StrataErr::from(&format!("Unrecognized stage '{}'", stage)));
        }
    }

    if stages.is_empty() {
        return Err(StrataErr::from("No stages selected"));
    }

    let mutator_seed = parse_usize(&matches, "mutator-seed")?;
    let trials_per_stage = parse_usize(&matches, "trials-per-stage")?;
    let havoc_multiplier =
        parse_usize(&matches, "havoc-multiplier")?.unwrap_or(DEFAULT_HAVOC_MULTIPLIER);
    let havoc_stack = parse_usize(&matches, "havoc-stack")?.unwrap_or(DEFAULT_HAVOC_STACK);

    if havoc_stack == 0 {
        return Err(StrataErr::from("Invalid --havoc-stack value"));
    }

    let max_input_size =
        parse_usize(&matches, "max-input-size")?.unwrap_or(DEFAULT_MAX_INPUT_SIZE);

    // Create and return Config
    Ok(Config {
        input,
        format,
        track,
        output_dir,
        stages,
        mutator_seed,
        trials_per_stage,
        havoc_multiplier,
        havoc_stack,
        max_input_size,
        verify_trees,
    })
}

pub fn parse_args() -> Result<Config, StrataErr> {
    parse_args_from(std::env::args_os())
}
