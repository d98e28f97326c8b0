use analysis::solvers::Approximation;
use clap::{Parser as CommandLineParser, ValueEnum};
use llir_lib::{
    analysis::{
        Analyses,
        liveness::{Granularity, LivenessResult},
    },
    ir::{self, print_dot},
    lexer::Lexer,
    parser::Parser,
    session::{AnalysisSession, SessionConfig},
};
use log::{LevelFilter, debug};
use utils::DiagnosticEmitter;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, ValueEnum)]
pub enum CLIAnalyses {
    Sign,
    Interval,
    LivenessBlock,
    LivenessBranch,
    LivenessInstruction,
    Typestate,
}

impl From<CLIAnalyses> for Analyses {
    fn from(value: CLIAnalyses) -> Self {
        match value {
            CLIAnalyses::Sign => Analyses::Sign,
            CLIAnalyses::Interval => Analyses::Interval,
            CLIAnalyses::LivenessBlock => Analyses::Liveness(Granularity::Block),
            CLIAnalyses::LivenessBranch => Analyses::Liveness(Granularity::Branch),
            CLIAnalyses::LivenessInstruction => Analyses::Liveness(Granularity::Instruction),
            CLIAnalyses::Typestate => Analyses::Typestate,
        }
    }
}

#[derive(Debug, CommandLineParser, Default)]
#[command(
    name = "llir",
    version,
    about = "Run dataflow analyses over a small LLVM-like IR."
)]
pub struct Opt {
    /// Dump the control flow graph representation of the program in graphviz format.
    #[arg(long)]
    pub dump_cfg: bool,

    /// Name of the analysis to execute
    #[arg(long, value_name = "ANALYSIS_NAME")]
    pub analyze: Option<CLIAnalyses>,

    /// Analyze calls separately for each calling context in the sign analysis.
    #[arg(long)]
    pub context_sensitive: bool,

    /// Number of visits per node before an analysis gives up, zero means no limit.
    #[arg(long, default_value_t = 20)]
    pub node_limit: usize,

    /// Only analyze and report this function.
    #[arg(long, value_name = "FUNCTION")]
    pub function: Option<String>,

    /// Write the live variables of each line into this file.
    #[arg(long, value_name = "FILE")]
    pub liveness_output: Option<String>,

    /// Only consider variables live on every path.
    #[arg(long)]
    pub must_liveness: bool,

    /// Print statistics about the functions.
    #[arg(long)]
    pub stats: bool,

    /// Functions returning a freshly opened file, replaces the defaults.
    #[arg(long = "open-fn", value_name = "FUNCTION")]
    pub open_functions: Vec<String>,

    /// Functions closing their file arguments, replaces the defaults.
    #[arg(long = "close-fn", value_name = "FUNCTION")]
    pub close_functions: Vec<String>,

    /// Functions requiring their file arguments to be open, replaces the defaults.
    #[arg(long = "use-fn", value_name = "FUNCTION")]
    pub use_functions: Vec<String>,

    /// Print more log messages, can be repeated.
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// File containing the program written in the language.
    pub filename: String,
}

impl Opt {
    pub fn log_level(&self) -> LevelFilter {
        match self.verbose {
            0 => LevelFilter::Warn,
            1 => LevelFilter::Info,
            2 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    }

    pub fn session_config(&self) -> SessionConfig {
        let mut config = SessionConfig {
            node_limit: self.node_limit,
            context_sensitive: self.context_sensitive,
            function: self.function.clone(),
            ..SessionConfig::default()
        };
        if self.must_liveness {
            config.liveness_approximation = Approximation::Must;
        }
        let protocol = &mut config.protocol;
        for (names, overrides) in [
            (&mut protocol.open, &self.open_functions),
            (&mut protocol.close, &self.close_functions),
            (&mut protocol.uses, &self.use_functions),
        ] {
            if !overrides.is_empty() {
                names.clone_from(overrides);
            }
        }
        config
    }
}

fn write_liveness(
    session: &AnalysisSession,
    results: &[LivenessResult],
    path: &str,
    diag: &mut DiagnosticEmitter,
) -> Option<()> {
    let unit = session.unit();
    let contents: String = results.iter().map(|r| r.render_lines(unit)).collect();
    if let Err(err) = std::fs::write(path, contents) {
        diag.err_ln(&format!("Failed to write '{path}': {err}"));
        return None;
    }
    debug!("liveness written to '{path}'");
    Some(())
}

pub fn process_source(src: &str, diag: &mut DiagnosticEmitter, opts: &Opt) -> Option<()> {
    let lexer = Lexer::new(src, diag);
    let tokens = lexer.lex_all();
    if tokens.tokens.is_empty() {
        return None;
    }
    let parser = Parser::new(tokens, diag);
    let unit = parser.parse()?;

    if opts.dump_cfg {
        diag.out_ln(&print_dot(&unit));
    }

    let session = AnalysisSession::new(&unit, opts.session_config());

    if opts.stats {
        match session.stats() {
            Ok(stats) => stats.iter().for_each(|s| diag.out(&s.render())),
            Err(err) => {
                diag.err_ln(&format!("Error: {err}"));
                return None;
            }
        }
    }

    let Some(analysis) = opts.analyze else {
        if !opts.dump_cfg && !opts.stats {
            diag.out(&ir::print(&unit, &ir::AnnotationMap::new()));
        }
        return Some(());
    };

    // The liveness results are shared by the report and the output file.
    let report = match Analyses::from(analysis) {
        Analyses::Liveness(granularity) => session.liveness(granularity).map(|results| {
            let report = session.liveness_report(&results);
            (report, Some(results))
        }),
        other => session.report(other).map(|report| (report, None)),
    };
    let (report, liveness) = match report {
        Ok(report) => report,
        Err(err) => {
            diag.err_ln(&format!("Error: {err}"));
            return None;
        }
    };
    diag.out(&report);

    if let (Some(path), Some(results)) = (&opts.liveness_output, liveness) {
        write_liveness(&session, &results, path, diag)?;
    }

    Some(())
}

#[cfg(test)]
mod driver_tests;
