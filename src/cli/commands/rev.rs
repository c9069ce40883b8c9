//! `tcc rev` command - Letter revision codes

use clap::{Args, Subcommand};
use console::style;
use miette::{bail, IntoDiagnostic, Result};

use crate::cli::GlobalOpts;
use crate::core::revision::{
    next_revision_code, previous_revision_code, sort_revision_codes, validate_revision_code,
};

#[derive(Subcommand, Debug)]
pub enum RevCommands {
    /// Print the revision after CURRENT (A when omitted)
    Next(NextArgs),

    /// Print the revision before CODE (nothing for A)
    Prev(CodeArgs),

    /// Check that codes contain only the letters A-Z
    Validate(CodesArgs),

    /// Sort codes in revision order (Z before AA)
    Sort(CodesArgs),
}

#[derive(Args, Debug)]
pub struct NextArgs {
    pub current: Option<String>,
}

#[derive(Args, Debug)]
pub struct CodeArgs {
    pub code: String,
}

#[derive(Args, Debug)]
pub struct CodesArgs {
    #[arg(required = true)]
    pub codes: Vec<String>,
}

pub fn run(cmd: RevCommands, global: &GlobalOpts) -> Result<()> {
    match cmd {
        RevCommands::Next(args) => {
            let next = next_revision_code(args.current.as_deref()).into_diagnostic()?;
            println!("{}", next);
        }
        RevCommands::Prev(args) => {
            match previous_revision_code(&args.code).into_diagnostic()? {
                Some(previous) => println!("{}", previous),
                None if !global.quiet => eprintln!("{} has no previous revision", args.code),
                None => {}
            }
        }
        RevCommands::Validate(args) => {
            let invalid: Vec<&String> = args
                .codes
                .iter()
                .filter(|c| !validate_revision_code(c))
                .collect();
            if !global.quiet {
                for code in &args.codes {
                    if validate_revision_code(code) {
                        println!("{} {}", style("✓").green(), code);
                    } else {
                        println!("{} {}", style("✗").red(), code);
                    }
                }
            }
            if !invalid.is_empty() {
                bail!("{} invalid revision code(s)", invalid.len());
            }
        }
        RevCommands::Sort(args) => {
            for code in sort_revision_codes(&args.codes) {
                println!("{}", code);
            }
        }
    }
    Ok(())
}
