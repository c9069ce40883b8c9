//! `tcc bom` command - BOM consistency checks and where-used queries

use clap::{Args, Subcommand};
use console::style;
use miette::{bail, IntoDiagnostic, Result};
use std::collections::HashMap;
use std::fs::File;
use std::path::PathBuf;

use crate::cli::helpers::{print_rows, print_serialized, Session};
use crate::cli::{GlobalOpts, OutputFormat};
use crate::core::bom::{find_where_used, validate_bom_tree};
use crate::core::catalog::{MemoryCatalog, PartCatalog};

#[derive(Subcommand, Debug)]
pub enum BomCommands {
    /// Check a part's BOM for cycles, missing parts and excess depth
    Check(CheckArgs),

    /// List the direct parents of a part
    WhereUsed(WhereUsedArgs),
}

#[derive(Args, Debug)]
pub struct CheckArgs {
    /// Root part id
    pub root: String,

    /// Override the configured bom.max_depth
    #[arg(long)]
    pub max_depth: Option<usize>,

    /// Extra edges from CSV (parent_id,child_id,quantity,unit,position)
    #[arg(long)]
    pub edges: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct WhereUsedArgs {
    /// Part id
    pub part: String,

    /// Extra edges from CSV (parent_id,child_id,quantity,unit,position)
    #[arg(long)]
    pub edges: Option<PathBuf>,
}

pub fn run(cmd: BomCommands, global: &GlobalOpts) -> Result<()> {
    match cmd {
        BomCommands::Check(args) => run_check(args, global),
        BomCommands::WhereUsed(args) => run_where_used(args, global),
    }
}

fn load_catalog(session: &Session, edges: Option<&PathBuf>) -> Result<MemoryCatalog> {
    let mut catalog = session.catalog()?;
    if let Some(path) = edges {
        let file = File::open(path).into_diagnostic()?;
        let count = catalog.import_edges_csv(file).into_diagnostic()?;
        tracing::debug!(path = %path.display(), count, "imported BOM edges");
    }
    Ok(catalog)
}

fn run_check(args: CheckArgs, global: &GlobalOpts) -> Result<()> {
    let session = Session::open(global)?;
    let catalog = load_catalog(&session, args.edges.as_ref())?;
    let max_depth = match args.max_depth {
        Some(depth) => depth,
        None => session.config.engine_config().into_diagnostic()?.max_depth,
    };

    let parts: HashMap<String, _> = catalog.parts().map(|p| (p.id.clone(), p)).collect();
    let edges = catalog.bom_edges(&args.root);
    let validation = validate_bom_tree(&args.root, &parts, &edges, max_depth);

    let format = session.format(global);
    if matches!(format, OutputFormat::Json | OutputFormat::Yaml) {
        print_serialized(&validation, format)?;
    } else if validation.valid {
        if !global.quiet {
            println!(
                "{} BOM of {} is valid ({} edge(s), max depth {})",
                style("✓").green(),
                style(&args.root).cyan(),
                edges.len(),
                max_depth
            );
        }
    } else {
        for message in validation.messages() {
            println!("{} {}", style("✗").red(), message);
        }
    }

    if !validation.valid {
        bail!(
            "BOM check of {} failed with {} issue(s)",
            args.root,
            validation.errors.len()
        );
    }
    Ok(())
}

fn run_where_used(args: WhereUsedArgs, global: &GlobalOpts) -> Result<()> {
    let session = Session::open(global)?;
    let catalog = load_catalog(&session, args.edges.as_ref())?;
    let parents = find_where_used(&args.part, &catalog.edges());

    let format = session.format(global);
    if matches!(format, OutputFormat::Json | OutputFormat::Yaml) {
        return print_serialized(&parents, format);
    }
    if parents.is_empty() {
        if !global.quiet {
            eprintln!("{} is not used in any assembly", args.part);
        }
        return Ok(());
    }

    let rows: Vec<Vec<String>> = parents
        .iter()
        .map(|id| {
            let part = catalog.part(id);
            vec![
                id.clone(),
                part.as_ref().map(|p| p.part_number.clone()).unwrap_or_default(),
                part.map(|p| p.name).unwrap_or_default(),
            ]
        })
        .collect();
    print_rows(&["PARENT", "PART NUMBER", "NAME"], &rows, format)
}
