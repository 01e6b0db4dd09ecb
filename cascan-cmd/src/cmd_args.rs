//! Command line argument parsing.

use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::str::FromStr;

use cascan_lib::ca::{CaNeighborhood, CaRule};
use clap::{Parser, ValueEnum};

/// The command line arguments.
#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
pub struct CmdArgs {
    /// Path to the input file. Its raw bytes are analyzed, MSB-first.
    pub input_file: PathBuf,

    /// The automaton rule: 30, 82, 110, 150, or custom:<code> with an
    /// arbitrary 8-bit truth table (1d only).
    #[arg(long, default_value = "30")]
    pub rule: RuleArg,

    /// The neighborhood the rule is applied over.
    #[arg(long, value_enum, default_value = "1d")]
    pub neighborhood: NeighborhoodArg,

    /// Automaton iterations before testing. 0 tests the raw input.
    #[arg(long, default_value_t = 1)]
    pub iterations: u32,

    /// Grid width for the 2-D neighborhoods; 0 picks a square layout.
    #[arg(long, default_value_t = 0)]
    pub width: u32,

    /// Worker threads; defaults to the hardware parallelism.
    #[arg(long)]
    pub threads: Option<NonZeroUsize>,

    /// Significance level: a test passes iff its p-value reaches it.
    #[arg(long, default_value_t = cascan_lib::DEFAULT_ALPHA)]
    pub alpha: f64,

    /// Comma-separated test names from the registry, or "all".
    #[arg(long, value_delimiter = ',', default_value = "all")]
    pub tests: Vec<String>,

    /// Additionally write a machine-readable CSV report to this path.
    #[arg(long)]
    pub report: Option<PathBuf>,
}

/// Neighborhood choice on the command line.
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum NeighborhoodArg {
    /// Linear field with toroidal wrap.
    #[value(name = "1d")]
    OneDimensional,
    /// 4-neighbor rectangular grid.
    VonNeumann,
    /// 8-neighbor rectangular grid.
    Moore,
}

impl From<NeighborhoodArg> for CaNeighborhood {
    fn from(value: NeighborhoodArg) -> Self {
        match value {
            NeighborhoodArg::OneDimensional => CaNeighborhood::OneDimensional,
            NeighborhoodArg::VonNeumann => CaNeighborhood::VonNeumann,
            NeighborhoodArg::Moore => CaNeighborhood::Moore,
        }
    }
}

/// Rule choice on the command line; see [CmdArgs::rule] for the syntax.
#[derive(Clone, Debug)]
pub struct RuleArg(pub CaRule);

impl FromStr for RuleArg {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let rule = match value {
            "30" => CaRule::Rule30,
            "82" => CaRule::Rule82,
            "110" => CaRule::Rule110,
            "150" => CaRule::Rule150,
            other => {
                let code = other.strip_prefix("custom:").ok_or_else(|| {
                    format!("unknown rule \"{other}\" (expected 30, 82, 110, 150 or custom:<code>)")
                })?;
                let code = code
                    .parse::<u8>()
                    .map_err(|e| format!("invalid rule code \"{code}\": {e}"))?;
                CaRule::Wolfram(code)
            }
        };
        Ok(Self(rule))
    }
}
