use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::backend::BackendKind;
use crate::error::PatternError;
use crate::matcher::NamePattern;

#[derive(Debug, Clone, Parser)]
#[command(name = "batch-decompile")]
#[command(about = "Decompile a whole package, a single class or every class of a jar in parallel")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Java launcher used to run the decompilers
    #[arg(long, value_name = "BIN", global = true)]
    pub java: Option<PathBuf>,

    #[arg(long, value_name = "FILE", global = true)]
    pub cfr: Option<PathBuf>,

    #[arg(long, value_name = "FILE", global = true)]
    pub fernflower: Option<PathBuf>,

    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Commands {
    /// Decompile the selected classes and bundle the sources
    Decompile {
        #[arg(value_name = "JAR")]
        jar_path: PathBuf,

        #[command(flatten)]
        selection: Selection,

        #[arg(short = 't', long, value_name = "N", default_value_t = 2)]
        threads: usize,

        /// Per-class timeout in seconds
        #[arg(long, value_name = "SECS", default_value_t = 10)]
        timeout: u64,

        #[arg(long, value_enum, default_value_t = BackendKind::Cfr)]
        decompiler: BackendKind,

        /// Where to write the source file or archive; nothing is written without it
        #[arg(short = 'o', long, value_name = "FILE")]
        output: Option<PathBuf>,
    },
    /// Print the classes of a jar, optionally filtered
    List {
        #[arg(value_name = "JAR")]
        jar_path: PathBuf,

        #[arg(long, value_name = "PAT")]
        pattern: Option<String>,
    },
}

#[derive(Debug, Clone, Args)]
#[group(required = true, multiple = false)]
pub struct Selection {
    #[arg(long, value_name = "NAME")]
    pub class: Option<String>,

    /// Every class under this package, nested packages included
    #[arg(long, value_name = "NAME")]
    pub package: Option<String>,

    #[arg(long)]
    pub all: bool,

    /// `*`, `pkg/*`, `re:<regex>` or an exact name
    #[arg(long, value_name = "PAT")]
    pub pattern: Option<String>,
}

impl Selection {
    pub fn to_pattern(&self) -> Result<NamePattern, PatternError> {
        if let Some(class) = self.class.as_deref() {
            return NamePattern::parse_exact(class);
        }
        if let Some(package) = self.package.as_deref() {
            return NamePattern::parse_package(package);
        }
        if let Some(pattern) = self.pattern.as_deref() {
            return NamePattern::parse(pattern);
        }
        Ok(NamePattern::All)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn decompile_defaults() {
        let cli = Cli::parse_from(["batch-decompile", "decompile", "lib.jar", "--all"]);
        let Commands::Decompile {
            threads,
            timeout,
            decompiler,
            output,
            selection,
            ..
        } = cli.command
        else {
            panic!("expected decompile");
        };
        assert_eq!(threads, 2);
        assert_eq!(timeout, 10);
        assert_eq!(decompiler, BackendKind::Cfr);
        assert!(output.is_none());
        assert_eq!(selection.to_pattern().unwrap(), NamePattern::All);
    }

    #[test]
    fn selection_is_exclusive_and_required() {
        assert!(Cli::try_parse_from(["batch-decompile", "decompile", "lib.jar"]).is_err());
        assert!(
            Cli::try_parse_from([
                "batch-decompile",
                "decompile",
                "lib.jar",
                "--all",
                "--class",
                "a.B",
            ])
            .is_err()
        );
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::parse_from([
            "batch-decompile",
            "decompile",
            "lib.jar",
            "--package",
            "org.example",
            "--java",
            "/opt/jdk/bin/java",
            "-v",
            "--decompiler",
            "fernflower",
        ]);
        assert_eq!(cli.java, Some(PathBuf::from("/opt/jdk/bin/java")));
        assert!(cli.verbose);
        let Commands::Decompile {
            selection,
            decompiler,
            ..
        } = cli.command
        else {
            panic!("expected decompile");
        };
        assert_eq!(decompiler, BackendKind::Fernflower);
        assert_eq!(
            selection.to_pattern().unwrap(),
            NamePattern::Package("org/example".to_string())
        );
    }
}
