//! `tcc eco` command - Engineering change order lifecycle

use clap::{Args, Subcommand};
use console::style;
use miette::{IntoDiagnostic, Result};

use crate::cli::helpers::{print_rows, print_serialized, truncate_str, Session};
use crate::cli::{GlobalOpts, OutputFormat};
use crate::core::audit::write_csv;
use crate::core::entity::{ChangeStatus, ChangeType, Entity, Priority};
use crate::core::workflow::allowed_transitions;
use crate::entities::change_order::{ApprovalStatus, ChangeOrder, ChangeOrderInput, Decision};

#[derive(Subcommand, Debug)]
pub enum EcoCommands {
    /// Raise a new change order (starts in draft)
    New(NewArgs),

    /// List change orders
    List(ListArgs),

    /// Show a change order's full record
    Show(IdArgs),

    /// Submit a draft for review
    Submit(IdArgs),

    /// Accept a submitted change order for review
    Accept(IdArgs),

    /// Record an approver's decision
    Review(ReviewArgs),

    /// Implement an approved change order and allocate new revisions
    Implement(IdArgs),

    /// Delete a draft change order
    Delete(IdArgs),

    /// Add or remove approvers while the change order is a draft
    #[command(subcommand)]
    Approver(ApproverCommands),

    /// Show the audit trail of a change order
    History(IdArgs),

    /// Analyze the BOM impact of a change order without changing it
    Impact(IdArgs),
}

#[derive(Args, Debug)]
pub struct NewArgs {
    /// Change order type
    #[arg(long = "type", short = 't', value_enum, default_value = "ecr")]
    pub change_type: ChangeType,

    /// Short title
    #[arg(long)]
    pub title: String,

    /// Why the change is needed
    #[arg(long, short = 'r')]
    pub reason: String,

    /// Longer description
    #[arg(long, short = 'd', default_value = "")]
    pub description: String,

    #[arg(long, short = 'p', value_enum, default_value = "medium")]
    pub priority: Priority,

    /// Approver user ids, in review order (comma-separated or repeated)
    #[arg(long = "approver", short = 'a', value_delimiter = ',')]
    pub approvers: Vec<String>,

    /// Affected part ids from the part catalog
    #[arg(long = "part", value_delimiter = ',')]
    pub parts: Vec<String>,

    /// Rejected change order this one replaces
    #[arg(long)]
    pub supersedes: Option<String>,
}

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Filter by status
    #[arg(long, short = 's')]
    pub status: Option<ChangeStatus>,

    /// Filter by type
    #[arg(long = "type", short = 't', value_enum)]
    pub change_type: Option<ChangeType>,

    /// Include change orders of every project in the database
    #[arg(long)]
    pub all_projects: bool,
}

#[derive(Args, Debug)]
pub struct IdArgs {
    /// Change order id or number (e.g. ECR-0003)
    pub id: String,
}

#[derive(Args, Debug)]
pub struct ReviewArgs {
    /// Change order id or number
    pub id: String,

    #[arg(value_enum)]
    pub decision: Decision,

    /// Approver whose vote this is (default: the acting user). Voting for
    /// someone else needs the admin role once a team roster is in place.
    #[arg(long = "as")]
    pub approver: Option<String>,

    /// Comment recorded with the vote (the reason when rejecting)
    #[arg(long, short = 'm')]
    pub comment: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum ApproverCommands {
    /// Add an approver
    Add(ApproverArgs),
    /// Remove an approver
    Remove(ApproverArgs),
}

#[derive(Args, Debug)]
pub struct ApproverArgs {
    /// Change order id or number
    pub id: String,

    /// Approver user id
    pub user: String,
}

pub fn run(cmd: EcoCommands, global: &GlobalOpts) -> Result<()> {
    match cmd {
        EcoCommands::New(args) => run_new(args, global),
        EcoCommands::List(args) => run_list(args, global),
        EcoCommands::Show(args) => run_show(args, global),
        EcoCommands::Submit(args) => {
            let session = Session::open(global)?;
            let mut engine = session.engine()?;
            let id = engine.resolve(&args.id).into_diagnostic()?;
            let co = engine.submit(&id, &session.actor).into_diagnostic()?;
            report(&session, global, &co, "Submitted")
        }
        EcoCommands::Accept(args) => {
            let session = Session::open(global)?;
            let mut engine = session.engine()?;
            let id = engine.resolve(&args.id).into_diagnostic()?;
            let co = engine
                .accept_for_review(&id, &session.actor)
                .into_diagnostic()?;
            report(&session, global, &co, "Accepted for review")
        }
        EcoCommands::Review(args) => run_review(args, global),
        EcoCommands::Implement(args) => run_implement(args, global),
        EcoCommands::Delete(args) => {
            let session = Session::open(global)?;
            let mut engine = session.engine()?;
            let id = engine.resolve(&args.id).into_diagnostic()?;
            engine.delete(&id, &session.actor).into_diagnostic()?;
            if !global.quiet {
                println!("{} Deleted {}", style("✓").green(), style(&id).cyan());
            }
            Ok(())
        }
        EcoCommands::Approver(cmd) => run_approver(cmd, global),
        EcoCommands::History(args) => run_history(args, global),
        EcoCommands::Impact(args) => run_impact(args, global),
    }
}

fn run_new(args: NewArgs, global: &GlobalOpts) -> Result<()> {
    let session = Session::open(global)?;
    let mut engine = session.engine()?;

    let supersedes = match args.supersedes {
        Some(ref key) => Some(engine.resolve(key).into_diagnostic()?),
        None => None,
    };

    let mut input = ChangeOrderInput::new(
        session.project_id(),
        args.change_type,
        args.title,
        args.reason,
    )
    .with_approvers(args.approvers)
    .with_parts(args.parts);
    input.description = args.description;
    input.priority = args.priority;
    input.supersedes = supersedes;

    let co = engine.create(input, &session.actor).into_diagnostic()?;
    report(&session, global, &co, "Created")
}

fn run_list(args: ListArgs, global: &GlobalOpts) -> Result<()> {
    let session = Session::open(global)?;
    let engine = session.engine()?;

    let project_id = session.project_id();
    let scope = (!args.all_projects).then_some(project_id.as_str());
    let orders: Vec<ChangeOrder> = engine
        .list(scope)
        .into_diagnostic()?
        .into_iter()
        .filter(|co| args.status.map_or(true, |s| co.status == s))
        .filter(|co| args.change_type.map_or(true, |t| co.change_type == t))
        .collect();

    let format = session.format(global);
    if matches!(format, OutputFormat::Json | OutputFormat::Yaml) {
        return print_serialized(&orders, format);
    }

    let rows: Vec<Vec<String>> = orders
        .iter()
        .map(|co| {
            let approved = co
                .approvers
                .approvers()
                .iter()
                .filter(|a| a.status == ApprovalStatus::Approved)
                .count();
            vec![
                co.id().to_string(),
                co.display_number(),
                truncate_str(co.title(), 40),
                co.status().to_string(),
                co.priority.to_string(),
                format!("{}/{}", approved, co.approvers.len()),
                co.author().to_string(),
            ]
        })
        .collect();
    print_rows(
        &["ID", "NUMBER", "TITLE", "STATUS", "PRIORITY", "APPROVALS", "AUTHOR"],
        &rows,
        format,
    )?;

    if format == OutputFormat::Auto && !global.quiet {
        println!("{} change order(s) found", style(orders.len()).cyan());
    }
    Ok(())
}

fn run_show(args: IdArgs, global: &GlobalOpts) -> Result<()> {
    let session = Session::open(global)?;
    let engine = session.engine()?;
    let id = engine.resolve(&args.id).into_diagnostic()?;
    let co = engine.get(&id).into_diagnostic()?;

    match session.format(global) {
        OutputFormat::Id => println!("{}", co.id),
        OutputFormat::Json => print_serialized(&co, OutputFormat::Json)?,
        _ => {
            print_serialized(&co, OutputFormat::Yaml)?;
            if !global.quiet {
                let next: Vec<String> = allowed_transitions(co.status)
                    .iter()
                    .map(|s| s.to_string())
                    .collect();
                if !next.is_empty() {
                    eprintln!("# next: {}", next.join(", "));
                }
            }
        }
    }
    Ok(())
}

fn run_review(args: ReviewArgs, global: &GlobalOpts) -> Result<()> {
    let session = Session::open(global)?;
    let mut engine = session.engine()?;
    let id = engine.resolve(&args.id).into_diagnostic()?;
    let approver = args.approver.unwrap_or_else(|| session.actor.clone());

    let co = engine
        .review(
            &id,
            &approver,
            args.decision,
            args.comment.as_deref(),
            &session.actor,
        )
        .into_diagnostic()?;

    let verb = match (args.decision, co.status) {
        (_, ChangeStatus::Approved) => "Approved",
        (_, ChangeStatus::Rejected) => "Rejected",
        (Decision::Approve, _) => "Recorded approval on",
        (Decision::Reject, _) => "Recorded rejection on",
    };
    report(&session, global, &co, verb)?;

    if co.status == ChangeStatus::InReview && !global.quiet {
        let waiting: Vec<String> = co
            .approvers
            .pending()
            .map(|a| session.display_name(&a.user_id))
            .collect();
        println!("  waiting on: {}", waiting.join(", "));
    }
    Ok(())
}

fn run_implement(args: IdArgs, global: &GlobalOpts) -> Result<()> {
    let session = Session::open(global)?;
    let mut engine = session.engine()?;
    let id = engine.resolve(&args.id).into_diagnostic()?;
    let co = engine.implement(&id, &session.actor).into_diagnostic()?;

    report(&session, global, &co, "Implemented")?;

    let format = session.format(global);
    if format != OutputFormat::Auto || global.quiet {
        return Ok(());
    }
    if let Some(ref record) = co.implementation {
        let rows: Vec<Vec<String>> = record
            .assignments
            .iter()
            .map(|a| {
                vec![
                    a.part_id.clone(),
                    a.part_number.clone(),
                    a.from_revision.clone().unwrap_or_else(|| "-".to_string()),
                    a.to_revision.clone(),
                    a.where_used.join(", "),
                ]
            })
            .collect();
        print_rows(
            &["PART", "PART NUMBER", "FROM", "TO", "WHERE USED"],
            &rows,
            format,
        )?;
    }
    Ok(())
}

fn run_approver(cmd: ApproverCommands, global: &GlobalOpts) -> Result<()> {
    let session = Session::open(global)?;
    let mut engine = session.engine()?;

    let (co, verb) = match cmd {
        ApproverCommands::Add(args) => {
            let id = engine.resolve(&args.id).into_diagnostic()?;
            let co = engine
                .add_approver(&id, &args.user, &session.actor)
                .into_diagnostic()?;
            (co, format!("Added approver {} to", args.user))
        }
        ApproverCommands::Remove(args) => {
            let id = engine.resolve(&args.id).into_diagnostic()?;
            let co = engine
                .remove_approver(&id, &args.user, &session.actor)
                .into_diagnostic()?;
            (co, format!("Removed approver {} from", args.user))
        }
    };
    report(&session, global, &co, &verb)
}

fn run_history(args: IdArgs, global: &GlobalOpts) -> Result<()> {
    let session = Session::open(global)?;
    let engine = session.engine()?;
    let id = engine.resolve(&args.id).into_diagnostic()?;
    let entries = engine.audit(&id).into_diagnostic()?;

    let format = session.format(global);
    match format {
        OutputFormat::Json | OutputFormat::Yaml => print_serialized(&entries, format),
        OutputFormat::Csv => write_csv(&entries, std::io::stdout()).into_diagnostic(),
        _ => {
            let rows: Vec<Vec<String>> = entries
                .iter()
                .map(|e| {
                    vec![
                        e.id.to_string(),
                        e.sequence.to_string(),
                        e.timestamp.format("%Y-%m-%d %H:%M:%S").to_string(),
                        session.display_name(&e.actor_id),
                        e.event.to_string(),
                        e.from_status.map(|s| s.to_string()).unwrap_or_default(),
                        e.to_status.to_string(),
                        e.comment.clone().unwrap_or_default(),
                    ]
                })
                .collect();
            print_rows(
                &["ID", "SEQ", "TIME", "ACTOR", "EVENT", "FROM", "TO", "COMMENT"],
                &rows,
                format,
            )
        }
    }
}

fn run_impact(args: IdArgs, global: &GlobalOpts) -> Result<()> {
    let session = Session::open(global)?;
    let engine = session.engine()?;
    let id = engine.resolve(&args.id).into_diagnostic()?;
    let report = engine.impact(&id).into_diagnostic()?;

    let format = session.format(global);
    if matches!(format, OutputFormat::Json | OutputFormat::Yaml) {
        return print_serialized(&report, format);
    }

    let rows: Vec<Vec<String>> = report
        .parts
        .iter()
        .map(|p| {
            vec![
                p.part_id.clone(),
                p.part_number.clone(),
                p.current_revision.clone().unwrap_or_else(|| "-".to_string()),
                p.next_revision.clone().unwrap_or_else(|| "?".to_string()),
                p.where_used.join(", "),
                if p.bom.valid {
                    "ok".to_string()
                } else {
                    format!("{} issue(s)", p.bom.errors.len())
                },
            ]
        })
        .collect();
    print_rows(
        &["PART", "PART NUMBER", "REV", "NEXT", "WHERE USED", "BOM"],
        &rows,
        format,
    )?;

    if format == OutputFormat::Auto {
        for part in report.parts.iter().filter(|p| !p.bom.valid) {
            for message in part.bom.messages() {
                println!("{} {}: {}", style("✗").red(), part.part_id, message);
            }
        }
        if report.is_clear() && !global.quiet {
            println!("{} {} is clear to implement", style("✓").green(), report.number);
        }
    }
    Ok(())
}

/// Print the outcome of a lifecycle command in the requested format
fn report(session: &Session, global: &GlobalOpts, co: &ChangeOrder, verb: &str) -> Result<()> {
    match session.format(global) {
        OutputFormat::Id => println!("{}", co.id),
        OutputFormat::Json => print_serialized(co, OutputFormat::Json)?,
        OutputFormat::Yaml => print_serialized(co, OutputFormat::Yaml)?,
        _ => {
            if !global.quiet {
                println!(
                    "{} {} {} ({})",
                    style("✓").green(),
                    verb,
                    style(co.display_number()).cyan(),
                    co.status
                );
            }
        }
    }
    Ok(())
}
