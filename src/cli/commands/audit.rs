//! `tcc audit` command - Audit trail verification and export

use clap::{Args, Subcommand};
use console::style;
use miette::{IntoDiagnostic, Result};
use std::fs::File;
use std::path::PathBuf;

use crate::cli::helpers::Session;
use crate::cli::GlobalOpts;
use crate::core::audit::write_csv;

#[derive(Subcommand, Debug)]
pub enum AuditCommands {
    /// Recompute the hash chain of one or every change order
    Verify(VerifyArgs),

    /// Export a change order's audit trail as CSV
    Export(ExportArgs),
}

#[derive(Args, Debug)]
pub struct VerifyArgs {
    /// Change order id or number (default: every change order in the project)
    pub id: Option<String>,
}

#[derive(Args, Debug)]
pub struct ExportArgs {
    /// Change order id or number
    pub id: String,

    /// Write to file instead of stdout
    #[arg(long, short = 'o')]
    pub output: Option<PathBuf>,
}

pub fn run(cmd: AuditCommands, global: &GlobalOpts) -> Result<()> {
    match cmd {
        AuditCommands::Verify(args) => run_verify(args, global),
        AuditCommands::Export(args) => run_export(args, global),
    }
}

fn run_verify(args: VerifyArgs, global: &GlobalOpts) -> Result<()> {
    let session = Session::open(global)?;
    let engine = session.engine()?;

    let ids = match args.id {
        Some(ref key) => vec![engine.resolve(key).into_diagnostic()?],
        None => engine
            .list(Some(&session.project_id()))
            .into_diagnostic()?
            .into_iter()
            .map(|co| co.id)
            .collect(),
    };

    let mut total = 0;
    for id in &ids {
        total += engine.verify_audit(id).into_diagnostic()?;
    }
    if !global.quiet {
        println!(
            "{} Verified {} audit entr{} across {} change order(s)",
            style("✓").green(),
            total,
            if total == 1 { "y" } else { "ies" },
            ids.len()
        );
    }
    Ok(())
}

fn run_export(args: ExportArgs, global: &GlobalOpts) -> Result<()> {
    let session = Session::open(global)?;
    let engine = session.engine()?;
    let id = engine.resolve(&args.id).into_diagnostic()?;
    let entries = engine.audit(&id).into_diagnostic()?;

    match args.output {
        Some(path) => {
            let file = File::create(&path).into_diagnostic()?;
            write_csv(&entries, file).into_diagnostic()?;
            if !global.quiet {
                println!(
                    "{} Wrote {} audit entries to {}",
                    style("✓").green(),
                    entries.len(),
                    style(path.display()).cyan()
                );
            }
        }
        None => write_csv(&entries, std::io::stdout()).into_diagnostic()?,
    }
    Ok(())
}
