//! Shared helper functions for CLI commands
//!
//! Project discovery, engine wiring and the output formats shared by the
//! command modules.

use clap::ValueEnum;
use miette::{IntoDiagnostic, Result};
use serde::Serialize;
use std::io::Write;
use tabled::{builder::Builder, settings::Style};

use crate::cli::{GlobalOpts, OutputFormat};
use crate::core::catalog::MemoryCatalog;
use crate::core::events::WILDCARD;
use crate::core::store::SqliteStore;
use crate::core::team::{IdentityProvider, TeamRoster};
use crate::core::workflow::ChangeOrderEngine;
use crate::core::{Config, Project};

/// Engine as wired by the command line: SQLite store, YAML part catalog
pub type Engine = ChangeOrderEngine<SqliteStore, MemoryCatalog>;

/// Locate the project from `--project` or the current directory
pub fn open_project(global: &GlobalOpts) -> Result<Project> {
    match &global.project {
        Some(path) => Project::discover_from(path).into_diagnostic(),
        None => Project::discover().into_diagnostic(),
    }
}

/// Project, configuration and acting user for one command
pub struct Session {
    pub project: Project,
    pub config: Config,
    pub actor: String,
    /// Only a roster with members restricts access
    pub roster: Option<TeamRoster>,
}

impl Session {
    pub fn open(global: &GlobalOpts) -> Result<Self> {
        let project = open_project(global)?;
        let config = Config::load(Some(&project));
        let actor = global.author.clone().unwrap_or_else(|| config.author());
        let roster =
            TeamRoster::load_from_path(&project.team_path()).filter(|r| !r.members.is_empty());
        Ok(Self {
            project,
            config,
            actor,
            roster,
        })
    }

    pub fn project_id(&self) -> String {
        self.config.project_id(&self.project)
    }

    pub fn catalog(&self) -> Result<MemoryCatalog> {
        MemoryCatalog::load_dir(&self.project.parts_dir()).into_diagnostic()
    }

    /// Wire the engine; fails when `bom.max_depth` is not configured
    pub fn engine(&self) -> Result<Engine> {
        let engine_config = self.config.engine_config().into_diagnostic()?;
        let store = SqliteStore::open(&self.project.db_path()).into_diagnostic()?;
        let mut engine = ChangeOrderEngine::new(store, self.catalog()?, engine_config);
        if let Some(roster) = self.roster.clone() {
            engine = engine.with_policy(roster);
        }

        let _ = engine.events().subscribe(WILDCARD, |event, name| {
            tracing::info!(event = name, id = %event.change_order_id(), "published");
            Ok(())
        });
        Ok(engine)
    }

    /// `--format`, falling back to the configured default
    pub fn format(&self, global: &GlobalOpts) -> OutputFormat {
        if global.format != OutputFormat::Auto {
            return global.format;
        }
        self.config
            .default_format
            .as_deref()
            .and_then(|f| OutputFormat::from_str(f, true).ok())
            .unwrap_or(OutputFormat::Auto)
    }

    /// Display name for a user, or the id itself
    pub fn display_name(&self, user_id: &str) -> String {
        self.roster
            .as_ref()
            .and_then(|r| r.display_name(user_id))
            .unwrap_or_else(|| user_id.to_string())
    }
}

/// Print a value as YAML or JSON
pub fn print_serialized<T: Serialize>(value: &T, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(value).into_diagnostic()?;
            println!("{}", json);
        }
        _ => {
            let yaml = serde_yml::to_string(value).into_diagnostic()?;
            print!("{}", yaml);
        }
    }
    Ok(())
}

/// Print rows as a table (auto), TSV, CSV or first column only (id)
pub fn print_rows(header: &[&str], rows: &[Vec<String>], format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Id => {
            for row in rows {
                if let Some(first) = row.first() {
                    println!("{}", first);
                }
            }
        }
        OutputFormat::Tsv => {
            println!("{}", header.join("\t"));
            for row in rows {
                println!("{}", row.join("\t"));
            }
        }
        OutputFormat::Csv => {
            let mut writer = csv::Writer::from_writer(std::io::stdout());
            writer.write_record(header).into_diagnostic()?;
            for row in rows {
                writer.write_record(row).into_diagnostic()?;
            }
            writer.flush().into_diagnostic()?;
        }
        _ => {
            let mut builder = Builder::default();
            builder.push_record(header.iter().copied());
            for row in rows {
                builder.push_record(row.iter().map(String::as_str));
            }
            let mut stdout = std::io::stdout();
            writeln!(stdout, "{}", builder.build().with(Style::rounded())).into_diagnostic()?;
        }
    }
    Ok(())
}

/// Truncate a string to max_len characters, adding "..." if truncated
pub fn truncate_str(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
