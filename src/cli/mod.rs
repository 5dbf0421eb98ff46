//! Thin CLI over the orchestrator. Runs offline with the scripted
//! collaborators and the built-in shell/file tools.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use console::style;

use crate::collaborator::{ScriptedReasoner, ScriptedResearch};
use crate::config::WayfarerConfig;
use crate::error::Result;
use crate::escalation::Resolution;
use crate::gateway::{FileReadTool, ShellTool};
use crate::orchestrator::Orchestrator;

#[derive(Debug, Parser)]
#[command(name = "wayfarer", about = "Autonomous mission agent", version)]
pub struct Cli {
    /// Data directory for missions, memory and knowledge.
    #[arg(long, default_value = ".wayfarer", global = true)]
    pub data_dir: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Create a mission from a prime directive and run it to completion.
    Run {
        directive: String,
    },
    /// List known missions.
    Missions,
    /// Show one mission's plan and task states.
    Show {
        mission_id: String,
    },
    /// List knowledge-base documents, or print one.
    Knowledge {
        name: Option<String>,
    },
    /// Deliver an operator resolution for a blocked task.
    Resolve {
        mission_id: String,
        task_id: String,
        /// Cancel the task instead of marking it resolved.
        #[arg(long)]
        cancel: bool,
        /// Observation content recorded for the resolved task.
        #[arg(long, default_value = "resolved manually")]
        note: String,
    },
}

pub async fn execute(cli: Cli) -> Result<()> {
    let config = WayfarerConfig::load(&cli.data_dir).await.unwrap_or_default();
    let research = ScriptedResearch::new().with_finding(
        "http",
        "builtin-playbook",
        "route http requests through the shell tool",
        0.7,
    );
    let (orchestrator, mut escalations) = Orchestrator::open(
        &cli.data_dir,
        config,
        Arc::new(ScriptedReasoner::new()),
        Arc::new(research),
    )
    .await?;

    let gateway = orchestrator.gateway();
    gateway.mount(Arc::new(ShellTool), 0.9);
    gateway.mount(Arc::new(FileReadTool), 0.9);

    match cli.command {
        Command::Run { directive } => {
            let mission = orchestrator.create_mission(&directive).await?;
            println!("{} {}", style("mission").dim(), style(&mission.id).cyan());

            let report = orchestrator.run(&mission.id).await?;
            while let Ok(payload) = escalations.try_recv() {
                println!(
                    "{} task {} needs attention: {} ({} records)",
                    style("escalation").red().bold(),
                    payload.task_id,
                    payload.reason,
                    payload.history.len()
                );
            }
            println!(
                "{} {} — {}/{} tasks succeeded in {} rounds",
                style(&report.mission_id).cyan(),
                report.status,
                report.tasks_succeeded,
                report.tasks_total,
                report.iterations
            );
        }
        Command::Missions => {
            for snapshot in orchestrator.missions().await? {
                println!(
                    "{}  {:<10} {}",
                    style(&snapshot.mission.id).cyan(),
                    snapshot.mission.status.to_string(),
                    snapshot.mission.prime_directive
                );
            }
        }
        Command::Show { mission_id } => {
            let snapshot = orchestrator.snapshot(&mission_id).await?;
            println!(
                "{} [{}] {}",
                style(&snapshot.mission.id).cyan(),
                snapshot.mission.status,
                snapshot.mission.prime_directive
            );
            if let Some(plan) = &snapshot.plan {
                for task in plan.tasks() {
                    println!(
                        "  {}  {:<18} retries={}  {}",
                        style(&task.id).green(),
                        task.state.to_string(),
                        task.retry_count,
                        task.description
                    );
                }
            }
        }
        Command::Knowledge { name } => {
            let store = orchestrator.knowledge();
            match name {
                Some(name) => {
                    let doc = store.read(&name)?;
                    println!(
                        "{} v{} ({})",
                        style(&doc.name).cyan(),
                        doc.version,
                        doc.updated_at
                    );
                    println!("{}", doc.content);
                }
                None => {
                    for name in store.list()? {
                        let doc = store.read(&name)?;
                        println!("{}  v{}", style(&name).cyan(), doc.version);
                    }
                }
            }
        }
        Command::Resolve {
            mission_id,
            task_id,
            cancel,
            note,
        } => {
            let resolution = if cancel {
                Resolution::CancelTask
            } else {
                Resolution::SyntheticObservation { content: note }
            };
            orchestrator.resolve(&mission_id, &task_id, resolution).await?;
            println!("{} {}/{}", style("resolved").green(), mission_id, task_id);
        }
    }

    Ok(())
}
