use std::path::PathBuf;

use clap::{value_parser, ArgAction, Args, Parser, Subcommand};
use rsv_core::GlobalOptions;

#[derive(Parser, Debug)]
#[command(
    name = "rsv",
    version,
    about = "Collect testbed build results and merge them into the package index",
    after_help = "Examples:\n  rsv collect results 8812345678 -o results.json\n  rsv save results.json index"
)]
pub struct RsvCli {
    #[arg(short, long, help = "Only log errors", global = true)]
    pub quiet: bool,
    #[arg(
        short,
        long,
        action = ArgAction::Count,
        help = "Increase logging (-vv reaches trace)",
        global = true
    )]
    pub verbose: u8,
    #[arg(long, help = "Force trace logging regardless of -v/-q", global = true)]
    pub trace: bool,
    #[command(subcommand)]
    pub command: RsvCommand,
}

impl RsvCli {
    pub fn global_options(&self) -> GlobalOptions {
        GlobalOptions {
            quiet: self.quiet,
            verbose: self.verbose,
            trace: self.trace,
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum RsvCommand {
    #[command(
        about = "Gather per-package results of a testbed run into a manifest",
        override_usage = "rsv collect <RESULTS> <RUN_ID> [ATTEMPT] [-m FILE] [-o FILE] [-D INDEX] [-R OWNER/NAME] [-j N]"
    )]
    Collect(CollectArgs),
    #[command(
        about = "Merge a results manifest into the hierarchical index",
        override_usage = "rsv save <RESULTS> <INDEX>"
    )]
    Save(SaveArgs),
}

#[derive(Args, Debug)]
pub struct CollectArgs {
    #[arg(value_parser = value_parser!(PathBuf), help = "Directory of downloaded testbed artifacts")]
    pub results: PathBuf,
    #[arg(help = "Workflow run id of the testbed")]
    pub run_id: u64,
    #[arg(default_value_t = 1, help = "Run attempt")]
    pub attempt: u32,
    #[arg(
        short,
        long,
        value_parser = value_parser!(PathBuf),
        help = "Testbed matrix (default: RESULTS/matrix/matrix.json)"
    )]
    pub matrix: Option<PathBuf>,
    #[arg(
        short,
        long,
        value_parser = value_parser!(PathBuf),
        help = "Write the manifest here instead of stdout"
    )]
    pub output: Option<PathBuf>,
    #[arg(
        short = 'D',
        long,
        value_parser = value_parser!(PathBuf),
        help = "Also record the builds in this index's existing build logs"
    )]
    pub index_dir: Option<PathBuf>,
    #[arg(short = 'R', long, help = "Repository that ran the testbed")]
    pub repo: Option<String>,
    #[arg(short = 'j', long = "jobs", help = "Number of collector workers")]
    pub jobs: Option<usize>,
}

#[derive(Args, Debug)]
pub struct SaveArgs {
    #[arg(value_parser = value_parser!(PathBuf), help = "Results manifest from `rsv collect`")]
    pub results: PathBuf,
    #[arg(value_parser = value_parser!(PathBuf), help = "Index directory to update")]
    pub index: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collect_defaults_attempt_and_counts_verbosity() {
        let cli = RsvCli::parse_from(["rsv", "-vv", "collect", "results", "17"]);
        assert_eq!(cli.global_options().log_level(), "trace");
        let RsvCommand::Collect(args) = cli.command else {
            panic!("expected collect");
        };
        assert_eq!(args.run_id, 17);
        assert_eq!(args.attempt, 1);
        assert!(args.matrix.is_none());
        assert!(args.index_dir.is_none());
    }

    #[test]
    fn global_flags_follow_the_subcommand() {
        let cli = RsvCli::parse_from(["rsv", "save", "results.json", "index", "-q"]);
        assert_eq!(cli.global_options().log_level(), "error");
        assert!(matches!(cli.command, RsvCommand::Save(_)));
    }

    #[test]
    fn collect_accepts_short_options() {
        let cli = RsvCli::parse_from([
            "rsv", "collect", "out", "5", "2", "-m", "m.json", "-o", "r.json", "-D", "index", "-R",
            "acme/bed", "-j", "3",
        ]);
        let RsvCommand::Collect(args) = cli.command else {
            panic!("expected collect");
        };
        assert_eq!(args.attempt, 2);
        assert_eq!(args.repo.as_deref(), Some("acme/bed"));
        assert_eq!(args.jobs, Some(3));
        assert_eq!(args.output, Some(PathBuf::from("r.json")));
        assert_eq!(args.index_dir, Some(PathBuf::from("index")));
    }
}
