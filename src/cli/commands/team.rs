//! Team command - Team roster management

use clap::{Args, Subcommand};
use miette::{bail, miette, IntoDiagnostic, Result};

use crate::cli::helpers::{open_project, print_rows, print_serialized, truncate_str};
use crate::cli::{GlobalOpts, OutputFormat};
use crate::core::team::{Action, Role, TeamMember, TeamRoster};
use crate::core::Config;

/// Team roster management
#[derive(Debug, Subcommand)]
pub enum TeamCommands {
    /// List team members
    List(TeamListArgs),
    /// Show the acting user's roles and permitted actions
    Whoami,
    /// Initialize team roster template
    Init(TeamInitArgs),
    /// Add a team member
    Add(TeamAddArgs),
    /// Remove a team member
    Remove(TeamRemoveArgs),
}

/// List team members
#[derive(Debug, Args)]
pub struct TeamListArgs {
    /// Filter by role
    #[arg(long, short = 'r')]
    pub role: Option<Role>,
}

/// Initialize team roster
#[derive(Debug, Args)]
pub struct TeamInitArgs {
    /// Overwrite existing team.yaml
    #[arg(long)]
    pub force: bool,
}

/// Add a team member
#[derive(Debug, Args)]
pub struct TeamAddArgs {
    /// Member's full name
    #[arg(long)]
    pub name: String,

    /// Member's email
    #[arg(long)]
    pub email: String,

    /// Username used as actor and approver id
    #[arg(long)]
    pub username: String,

    /// Roles (comma-separated: engineering,quality,management,admin)
    #[arg(long, value_delimiter = ',')]
    pub roles: Vec<Role>,
}

/// Remove a team member
#[derive(Debug, Args)]
pub struct TeamRemoveArgs {
    /// Username to remove
    pub username: String,

    /// Skip confirmation
    #[arg(long, short = 'y')]
    pub yes: bool,
}

const ACTIONS: [Action; 7] = [
    Action::Create,
    Action::EditApprovers,
    Action::Submit,
    Action::AcceptForReview,
    Action::Review,
    Action::Implement,
    Action::Delete,
];

impl TeamCommands {
    pub fn run(&self, global: &GlobalOpts) -> Result<()> {
        match self {
            TeamCommands::List(args) => args.run(global),
            TeamCommands::Whoami => run_whoami(global),
            TeamCommands::Init(args) => args.run(global),
            TeamCommands::Add(args) => args.run(global),
            TeamCommands::Remove(args) => args.run(global),
        }
    }
}

impl TeamListArgs {
    pub fn run(&self, global: &GlobalOpts) -> Result<()> {
        let project = open_project(global)?;

        let Some(roster) = TeamRoster::load_from_path(&project.team_path()) else {
            bail!("No team roster found. Run 'tcc team init' to create one.");
        };

        let members: Vec<&TeamMember> = roster
            .members
            .iter()
            .filter(|m| m.active)
            .filter(|m| self.role.map_or(true, |r| m.has_role(r)))
            .collect();

        if members.is_empty() {
            if !global.quiet {
                println!("No team members found.");
            }
            return Ok(());
        }

        if matches!(global.format, OutputFormat::Json | OutputFormat::Yaml) {
            return print_serialized(&members, global.format);
        }

        let rows: Vec<Vec<String>> = members
            .iter()
            .map(|m| {
                let roles: Vec<String> = m.roles.iter().map(|r| r.to_string()).collect();
                vec![
                    m.username.clone(),
                    truncate_str(&m.name, 24),
                    truncate_str(&m.email, 30),
                    roles.join(", "),
                ]
            })
            .collect();
        print_rows(&["USERNAME", "NAME", "EMAIL", "ROLES"], &rows, global.format)
    }
}

fn run_whoami(global: &GlobalOpts) -> Result<()> {
    let project = open_project(global)?;
    let config = Config::load(Some(&project));
    let actor = global.author.clone().unwrap_or_else(|| config.author());

    let Some(roster) = TeamRoster::load_from_path(&project.team_path()) else {
        bail!("No team roster found. Run 'tcc team init' to create one.");
    };

    let Some(user) = roster.find_member(&actor) else {
        bail!(
            "You ({}) are not in the team roster.\n\
             Add yourself with: tcc team add --name \"{}\" --email your@email.com --username {} --roles engineering",
            actor,
            actor,
            actor
        );
    };

    println!("Name:     {}", user.name);
    println!("Email:    {}", user.email);
    println!("Username: {}", user.username);
    println!(
        "Roles:    {}",
        user.roles
            .iter()
            .map(|r| r.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    );

    let permitted: Vec<&str> = ACTIONS
        .iter()
        .filter(|a| roster.can_perform(user, **a))
        .map(|a| a.as_str())
        .collect();
    println!("May:      {}", permitted.join(", "));

    Ok(())
}

impl TeamInitArgs {
    pub fn run(&self, global: &GlobalOpts) -> Result<()> {
        let project = open_project(global)?;
        let team_path = project.team_path();

        if team_path.exists() && !self.force {
            bail!(
                "Team roster already exists at {}\n\
                 Use --force to overwrite.",
                team_path.display()
            );
        }

        std::fs::write(&team_path, TeamRoster::default_template()).into_diagnostic()?;

        if !global.quiet {
            println!("Created team roster at {}", team_path.display());
            println!("\nEdit this file to add your team members, or use:");
            println!("  tcc team add --name \"Jane Smith\" --email jane@co.com --username jsmith --roles engineering,quality");
        }
        Ok(())
    }
}

impl TeamAddArgs {
    pub fn run(&self, global: &GlobalOpts) -> Result<()> {
        let project = open_project(global)?;
        let team_path = project.team_path();

        let mut roster = TeamRoster::load_from_path(&team_path).unwrap_or_default();

        if roster.find_member(&self.username).is_some() {
            bail!(
                "User '{}' already exists in the team roster.\n\
                 Use 'tcc team remove {}' first to update.",
                self.username,
                self.username
            );
        }

        roster.add_member(TeamMember {
            name: self.name.clone(),
            email: self.email.clone(),
            username: self.username.clone(),
            roles: self.roles.clone(),
            active: true,
        });
        roster.save_to_path(&team_path).into_diagnostic()?;

        if !global.quiet {
            println!("Added {} ({}) to team roster", self.name, self.username);
        }
        Ok(())
    }
}

impl TeamRemoveArgs {
    pub fn run(&self, global: &GlobalOpts) -> Result<()> {
        let project = open_project(global)?;
        let team_path = project.team_path();

        let mut roster = TeamRoster::load_from_path(&team_path)
            .ok_or_else(|| miette!("No team roster found."))?;

        let name = roster
            .find_member(&self.username)
            .map(|m| m.name.clone())
            .ok_or_else(|| miette!("User '{}' not found in team roster.", self.username))?;

        if !self.yes {
            print!("Remove {} ({}) from team roster? [y/N] ", name, self.username);
            std::io::Write::flush(&mut std::io::stdout()).into_diagnostic()?;
            let mut input = String::new();
            std::io::stdin().read_line(&mut input).into_diagnostic()?;
            if !input.trim().eq_ignore_ascii_case("y") {
                println!("Aborted.");
                return Ok(());
            }
        }

        if !roster.remove_member(&self.username) {
            bail!("Failed to remove user.");
        }
        roster.save_to_path(&team_path).into_diagnostic()?;
        if !global.quiet {
            println!("Removed {} ({}) from team roster", name, self.username);
        }
        Ok(())
    }
}
