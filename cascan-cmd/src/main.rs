use std::fs;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use cascan_lib::bitfield::BitField;
use cascan_lib::ca::processor::{CaConfig, CaProcessor};
use cascan_lib::registry::{TestRegistry, ALL_TESTS};
use cascan_lib::runner::{RunnerConfig, TestRunner};
use cascan_lib::CoreError;
use clap::Parser;

mod cmd_args;
mod detect;
mod report;
mod sink;

use cmd_args::CmdArgs;
use sink::ConsoleSink;

/// Exit code when every selected test passed.
const EXIT_PASSED: u8 = 0;
/// Exit code when at least one test failed or could not run.
const EXIT_FAILED: u8 = 1;
/// Exit code for input and configuration errors.
const EXIT_CONFIG: u8 = 2;
/// Exit code for internal failures (worker panics, cancellation).
const EXIT_INTERNAL: u8 = 3;

/// An error bundled with the exit code it maps to.
struct CliError {
    code: u8,
    source: anyhow::Error,
}

impl CliError {
    fn config(source: anyhow::Error) -> Self {
        Self {
            code: EXIT_CONFIG,
            source,
        }
    }

    fn from_core(error: CoreError) -> Self {
        let code = match &error {
            CoreError::Config(_) => EXIT_CONFIG,
            CoreError::WorkerFailed(_) | CoreError::Cancelled { .. } => EXIT_INTERNAL,
        };
        Self {
            code,
            source: error.into(),
        }
    }
}

fn main() -> ExitCode {
    // clap itself exits with 2 on malformed flags, matching EXIT_CONFIG
    let args = CmdArgs::parse();

    match run(args) {
        Ok(true) => ExitCode::from(EXIT_PASSED),
        Ok(false) => ExitCode::from(EXIT_FAILED),
        Err(error) => {
            eprintln!("error: {:#}", error.source);
            ExitCode::from(error.code)
        }
    }
}

fn run(args: CmdArgs) -> Result<bool, CliError> {
    // load the input
    let bytes = fs::read(&args.input_file)
        .with_context(|| format!("failed to read input file \"{}\"", args.input_file.display()))
        .map_err(CliError::config)?;
    if bytes.is_empty() {
        return Err(CliError::config(anyhow::anyhow!(
            "input file \"{}\" is empty",
            args.input_file.display()
        )));
    }
    let field = BitField::from_bytes(&bytes);

    let tier = detect::vector_tier();
    println!(
        "Analyzing \"{}\": {} bits, rule {:?}, {} iteration(s), vector tier {tier}",
        args.input_file.display(),
        field.len(),
        args.rule.0,
        args.iterations,
    );

    let progress = Arc::new(ConsoleSink::new());

    // stage 1: the automaton transform
    let begin = Instant::now();
    let processor = CaProcessor::new(CaConfig {
        rule: args.rule.0.clone(),
        neighborhood: args.neighborhood.into(),
        iterations: args.iterations,
        width: args.width,
        threads: args.threads,
        tier,
    })
    .map_err(CliError::from_core)?
    .with_progress(progress.clone());
    let transformed = processor.run(field).map_err(CliError::from_core)?;

    // stage 2: the statistical battery
    let selection: Vec<&str> = if args.tests.iter().any(|name| name == "all") {
        ALL_TESTS.to_vec()
    } else {
        args.tests.iter().map(String::as_str).collect()
    };

    let runner = TestRunner::new(
        TestRegistry::standard(),
        RunnerConfig {
            alpha: args.alpha,
            threads: args.threads,
            ..Default::default()
        },
    )
    .map_err(CliError::from_core)?
    .with_progress(progress);
    let results = runner
        .run(&transformed, &selection)
        .map_err(CliError::from_core)?;
    let elapsed = begin.elapsed();

    // report
    println!();
    for result in &results {
        println!("{}", report::console_line(result));
    }

    if let Some(path) = &args.report {
        report::write_csv(path, &results).map_err(CliError::config)?;
    }

    let passed = results.iter().all(cascan_lib::TestResult::passed);
    println!();
    if passed {
        println!(
            "All {} results passed at alpha = {} ({:.1}s).",
            results.len(),
            args.alpha,
            elapsed.as_secs_f64()
        );
    } else {
        let failed = results.iter().filter(|r| !r.passed()).count();
        println!(
            "{failed} of {} results failed at alpha = {} ({:.1}s).",
            results.len(),
            args.alpha,
            elapsed.as_secs_f64()
        );
    }

    Ok(passed)
}
