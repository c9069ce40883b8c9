//! `tcc source` command - Manufacturer and supplier links for parts

use clap::{Args, Subcommand};
use console::style;
use miette::{IntoDiagnostic, Result};

use crate::cli::helpers::{open_project, print_serialized};
use crate::cli::{GlobalOpts, OutputFormat};
use crate::core::sourcing::{SourceKind, SourcingBook};

#[derive(Subcommand, Debug)]
pub enum SourceCommands {
    /// List known sources, or the sources linked to one part
    List(ListArgs),

    /// Link a source to a part
    Link(LinkArgs),

    /// Remove a link
    Unlink(LinkArgs),
}

#[derive(Args, Debug)]
pub struct ListArgs {
    #[arg(value_enum)]
    pub kind: SourceKind,

    /// Only sources linked to this part
    #[arg(long)]
    pub part: Option<String>,
}

#[derive(Args, Debug)]
pub struct LinkArgs {
    #[arg(value_enum)]
    pub kind: SourceKind,

    /// Part id
    pub part: String,

    /// Manufacturer or supplier name
    pub source: String,
}

pub fn run(cmd: SourceCommands, global: &GlobalOpts) -> Result<()> {
    let project = open_project(global)?;
    let path = project.sourcing_path();
    let mut book = SourcingBook::load(&path).into_diagnostic()?;

    match cmd {
        SourceCommands::List(args) => {
            let sources = match args.part {
                Some(ref part) => book.linked(args.kind, part),
                None => book.list(args.kind),
            };
            if matches!(global.format, OutputFormat::Json | OutputFormat::Yaml) {
                return print_serialized(&sources, global.format);
            }
            for source in sources {
                println!("{}", source);
            }
        }
        SourceCommands::Link(args) => {
            let added = book.link(args.kind, &args.part, &args.source);
            book.save(&path).into_diagnostic()?;
            if !global.quiet {
                if added {
                    println!(
                        "{} Linked {} {} to {}",
                        style("✓").green(),
                        args.kind,
                        style(&args.source).cyan(),
                        args.part
                    );
                } else {
                    println!("{} {} is already linked to {}", args.kind, args.source, args.part);
                }
            }
        }
        SourceCommands::Unlink(args) => {
            let removed = book.unlink(args.kind, &args.part, &args.source);
            if removed {
                book.save(&path).into_diagnostic()?;
            }
            if !global.quiet {
                if removed {
                    println!(
                        "{} Unlinked {} {} from {}",
                        style("✓").green(),
                        args.kind,
                        style(&args.source).cyan(),
                        args.part
                    );
                } else {
                    println!("{} {} was not linked to {}", args.kind, args.source, args.part);
                }
            }
        }
    }
    Ok(())
}
