//! `tcc init` command - Initialize a new change control project

use console::style;
use miette::{IntoDiagnostic, Result};

use crate::cli::GlobalOpts;
use crate::core::project::{Project, ProjectError};

#[derive(clap::Args, Debug)]
pub struct InitArgs {
    /// Directory to initialize (default: current directory)
    #[arg(default_value = ".")]
    pub path: std::path::PathBuf,

    /// Deepest BOM level walked during impact analysis
    #[arg(long, default_value_t = 20)]
    pub max_depth: usize,
}

pub fn run(args: InitArgs, global: &GlobalOpts) -> Result<()> {
    let path = if args.path.as_os_str() == "." {
        std::env::current_dir().into_diagnostic()?
    } else {
        args.path.clone()
    };

    if !path.exists() {
        std::fs::create_dir_all(&path).into_diagnostic()?;
    }

    match Project::init(&path, args.max_depth) {
        Ok(project) => {
            if global.quiet {
                return Ok(());
            }
            println!(
                "{} Initialized change control project at {}",
                style("✓").green(),
                style(project.root().display()).cyan()
            );
            println!();
            println!("Created:");
            println!("  .tcc/config.yaml   project settings (bom.max_depth: {})", args.max_depth);
            println!("  .tcc/team.yaml     team roster and approval matrix");
            println!("  parts/             part catalog (one YAML file per part)");
            println!();
            println!("Next steps:");
            println!(
                "  {} Add team members",
                style("tcc team add").yellow()
            );
            println!(
                "  {} Raise your first change request",
                style("tcc eco new").yellow()
            );
            Ok(())
        }
        Err(ProjectError::AlreadyExists(path)) => {
            println!(
                "{} Change control project already exists at {}",
                style("!").yellow(),
                style(path.display()).cyan()
            );
            Ok(())
        }
        Err(e) => Err(miette::miette!("{}", e)),
    }
}
