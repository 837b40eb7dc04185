mod cleanup;
mod config;
mod contract;
mod errors;
mod events;
mod locks;
mod panes;
mod process;
mod queue;
mod ready_source;
mod readiness;
mod render;
mod resume;
mod runtime;
mod scm;
mod status;
mod world;
mod worktrees;

use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};

use errors::{exit_code_for, EXIT_ERROR, EXIT_PARTIAL, EXIT_SUCCESS};
use process::RealProcessRunner;
use scm::{GitScm, Scm};
use world::World;

#[derive(Parser)]
#[command(
    name = "village",
    about = "Orchestrate multiple AI-coding workers over one git repository",
    version = env!("VILLAGE_VERSION")
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render lock/worktree/session state
    Status {
        #[arg(long)]
        short: bool,
        #[arg(long)]
        json: bool,
        #[arg(long)]
        workers: bool,
        #[arg(long)]
        locks: bool,
        #[arg(long)]
        orphans: bool,
    },
    /// Readiness assessment with suggested next actions
    Ready {
        #[arg(long)]
        json: bool,
    },
    /// Create session and state directories (idempotent)
    Up {
        #[arg(long, alias = "plan")]
        dry_run: bool,
        #[arg(long)]
        no_dashboard: bool,
    },
    /// Kill the multiplexer session (leaves state on disk)
    Down {
        #[arg(long, alias = "plan")]
        dry_run: bool,
    },
    /// Plan or execute the next N task admissions
    Queue {
        #[arg(long)]
        plan: bool,
        #[arg(long)]
        dry_run: bool,
        #[arg(short = 'n')]
        count: Option<u32>,
        #[arg(long)]
        agent: Option<String>,
        #[arg(long)]
        max_workers: Option<u32>,
        #[arg(long)]
        json: bool,
        #[arg(long)]
        force: bool,
    },
    /// Plan for or execute resuming a specific task
    Resume {
        task_id: Option<String>,
        #[arg(long)]
        agent: Option<String>,
        #[arg(long)]
        detached: bool,
        #[arg(long)]
        dry_run: bool,
        #[arg(long)]
        json: bool,
    },
    /// List locks with ACTIVE/STALE classification
    Locks {
        #[arg(long)]
        json: bool,
    },
    /// Remove a lock file
    Unlock {
        task_id: String,
        #[arg(long)]
        force: bool,
    },
    /// Plan or apply reconciliation of stale locks and worktrees
    Cleanup {
        #[arg(long, alias = "dry-run")]
        plan: bool,
        #[arg(long)]
        apply: bool,
        #[arg(long)]
        json: bool,
    },
    /// Query the append-only event log
    Events {
        #[arg(long = "task-id")]
        task_id: Option<String>,
        #[arg(long)]
        status: Option<String>,
        #[arg(long)]
        since: Option<String>,
        #[arg(long)]
        last: Option<String>,
        #[arg(long)]
        json: bool,
    },
}

fn parse_duration(spec: &str) -> Option<chrono::Duration> {
    let spec = spec.trim();
    let (num, unit) = spec.split_at(spec.len().saturating_sub(1));
    let n: i64 = num.parse().ok()?;
    match unit {
        "s" => Some(chrono::Duration::seconds(n)),
        "m" => Some(chrono::Duration::minutes(n)),
        "h" => Some(chrono::Duration::hours(n)),
        "d" => Some(chrono::Duration::days(n)),
        _ => None,
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    ctrlc::set_handler(|| {
        resume::INTERRUPTED.store(true, std::sync::atomic::Ordering::SeqCst);
    })
    .ok();

    match run() {
        Ok(code) => ExitCode::from(code as u8),
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::from(exit_code_for(&e) as u8)
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    let runner = RealProcessRunner;
    let git_root = GitScm.rev_parse_root(&runner)?;
    let config = config::load(&git_root)?;
    let mut world = World::new(config, &runner);
    world.panes.clear_cache();

    dispatch(&cli.command, &mut world)
}

#[allow(clippy::too_many_lines)]
fn dispatch(command: &Commands, world: &mut World) -> Result<i32> {
    let config = world.config.clone();
    let runner = world.runner;
    let scm = GitScm;

    match command {
        Commands::Status {
            short,
            json,
            workers,
            locks,
            orphans,
        } => {
            let full = status::collect_full_status(
                runner,
                &world.panes,
                &config.session_name,
                &config.locks_dir(),
                &config.worktrees_dir(),
                config.dirs_exist(),
            )?;
            if *json {
                println!("{}", render::json::render_status_json(&full));
            } else if *short {
                println!("{}", render::text::render_summary(&full.summary));
            } else {
                println!("{}", render::text::render_full_status(&full, *workers || *locks, *orphans));
            }
            Ok(EXIT_SUCCESS)
        }

        Commands::Ready { json } => {
            let assessment = readiness::assess_readiness(
                runner,
                &world.panes,
                &config.git_root,
                &config.locks_dir(),
                &config.worktrees_dir(),
                &config.session_name,
                &config.default_agent,
                config.dirs_exist(),
            )?;
            if *json {
                println!("{}", render::json::render_ready_json(&assessment));
            } else {
                println!("{}", render::text::render_ready_text(&assessment));
            }
            Ok(EXIT_SUCCESS)
        }

        Commands::Up { dry_run, no_dashboard } => {
            let state = runtime::collect_runtime_state(runner, &config.session_name, &config.village_dir(), &config.git_root)?;
            let plan = runtime::plan_initialization(state);
            runtime::execute_initialization(
                runner,
                plan,
                &config.session_name,
                &config.village_dir(),
                &config.locks_dir(),
                &config.worktrees_dir(),
                &config.git_root,
                *dry_run,
                !no_dashboard,
            )?;
            println!("village runtime is up (session '{}')", config.session_name);
            Ok(EXIT_SUCCESS)
        }

        Commands::Down { dry_run } => {
            if !*dry_run {
                runtime::shutdown_runtime(runner, &config.session_name)?;
            }
            println!("session '{}' stopped", config.session_name);
            Ok(EXIT_SUCCESS)
        }

        Commands::Queue {
            plan,
            dry_run,
            count,
            agent,
            max_workers,
            json,
            force,
        } => {
            let default_agent = agent.clone().unwrap_or_else(|| config.default_agent.clone());
            let limit = max_workers.unwrap_or(config.max_workers);
            let mut queue_plan = queue::generate_queue_plan(
                runner,
                &world.panes,
                &config.git_root,
                &config.locks_dir(),
                &config.event_log_path(),
                &config.session_name,
                &default_agent,
                limit,
                config.queue_ttl_minutes,
                *force,
            )?;

            if let Some(n) = count
                && (queue_plan.available_tasks.len() as u32) > *n
            {
                let overflow = queue_plan.available_tasks.split_off(*n as usize);
                queue_plan.blocked_tasks.extend(overflow.into_iter().map(|mut t| {
                    t.skip_reason = Some("count_limit");
                    t
                }));
            }

            if *json {
                println!("{}", render::json::render_queue_plan_json(&queue_plan));
            } else {
                println!("{}", render::text::render_queue_plan(&queue_plan));
            }

            if *plan || *dry_run {
                return Ok(EXIT_SUCCESS);
            }

            let mut failures = 0u32;
            for task in &queue_plan.available_tasks {
                let result = resume::execute_resume(
                    &scm,
                    runner,
                    &world.panes,
                    &config.git_root,
                    &config.worktrees_dir(),
                    &config.locks_dir(),
                    &config.event_log_path(),
                    &config.session_name,
                    &task.task_id,
                    &task.agent,
                    false,
                );
                if !result.success {
                    failures += 1;
                    eprintln!("failed to start {}: {}", task.task_id, result.error.unwrap_or_default());
                }
            }

            if failures > 0 && failures < queue_plan.available_tasks.len() as u32 {
                Ok(EXIT_PARTIAL)
            } else if failures > 0 {
                Ok(EXIT_ERROR)
            } else {
                Ok(EXIT_SUCCESS)
            }
        }

        Commands::Resume {
            task_id,
            agent,
            detached: _,
            dry_run,
            json,
        } => {
            let task_id = match task_id {
                Some(id) => id.clone(),
                None => {
                    let tasks = ready_source::list(runner, &config.git_root, &config.default_agent);
                    let Some(first) = tasks.into_iter().next() else {
                        anyhow::bail!(errors::VillageError::Blocked("no ready tasks to resume".to_string()));
                    };
                    first.task_id
                }
            };
            let agent = agent.clone().unwrap_or_else(|| config.default_agent.clone());

            let result = resume::execute_resume(
                &scm,
                runner,
                &world.panes,
                &config.git_root,
                &config.worktrees_dir(),
                &config.locks_dir(),
                &config.event_log_path(),
                &config.session_name,
                &task_id,
                &agent,
                *dry_run,
            );

            if *json {
                println!("{}", render::json::render_resume_json(&result));
            } else if result.success {
                println!(
                    "resumed {} in window '{}' (pane {})",
                    result.task_id, result.window_name, result.pane_id
                );
            } else {
                eprintln!("resume failed: {}", result.error.unwrap_or_default());
            }

            Ok(if result.success { EXIT_SUCCESS } else { EXIT_ERROR })
        }

        Commands::Locks { json } => {
            let workers = status::collect_workers(&config.locks_dir(), runner, &world.panes, &config.session_name)?;
            if *json {
                let summary = status::collect_summary(
                    runner,
                    &config.session_name,
                    &config.worktrees_dir(),
                    config.dirs_exist(),
                    &workers,
                    &[],
                )?;
                let full = status::FullStatus {
                    summary,
                    workers,
                    orphans: Vec::new(),
                };
                println!("{}", render::json::render_status_json(&full));
            } else {
                println!("{}", render::text::render_worker_table(&workers));
            }
            Ok(EXIT_SUCCESS)
        }

        Commands::Unlock { task_id, force } => {
            let live_panes = world.panes.panes(runner, &config.session_name, false)?;
            let path = locks::lock_path(&config.locks_dir(), task_id);
            if !path.exists() {
                anyhow::bail!(errors::VillageError::UserInput(format!("no lock found for task '{task_id}'")));
            }
            if let Ok(lock) = locks::parse_lock(&path)?
                && locks::is_active(&lock, &live_panes)
                && !force
            {
                anyhow::bail!(errors::VillageError::Blocked(format!(
                    "task '{task_id}' has an ACTIVE lock; pass --force to remove anyway"
                )));
            }
            locks::remove_lock(&config.locks_dir(), task_id)?;
            events::log_ok(&config.event_log_path(), "unlock", Some(task_id), None)?;
            println!("removed lock for '{task_id}'");
            Ok(EXIT_SUCCESS)
        }

        Commands::Cleanup { plan, apply, json } => {
            let cleanup_plan = cleanup::plan_cleanup(
                runner,
                &world.panes,
                &config.locks_dir(),
                &config.worktrees_dir(),
                &config.session_name,
                *apply,
            )?;

            if *json {
                println!("{}", render::json::render_cleanup_plan_json(&cleanup_plan));
            } else {
                println!(
                    "Stale locks: {}\nOrphan worktrees: {}\nStale worktrees: {}\nCorrupted locks: {}",
                    cleanup_plan.stale_locks.len(),
                    cleanup_plan.orphan_worktrees.len(),
                    cleanup_plan.stale_worktrees.len(),
                    cleanup_plan.corrupted_locks.len(),
                );
            }

            if *plan {
                return Ok(EXIT_SUCCESS);
            }

            cleanup::execute_cleanup(
                &cleanup_plan,
                &scm,
                runner,
                &config.git_root,
                &config.locks_dir(),
                &config.worktrees_dir(),
                &config.event_log_path(),
            )?;
            println!("cleanup applied");
            Ok(EXIT_SUCCESS)
        }

        Commands::Events {
            task_id,
            status,
            since,
            last,
            json,
        } => {
            let filters = events::EventFilters {
                task_id: task_id.clone(),
                status: status.clone(),
                since: since.as_deref().and_then(|s| {
                    chrono::DateTime::parse_from_rfc3339(s).ok().map(|d| d.with_timezone(&chrono::Utc))
                }),
                last: last.as_deref().and_then(parse_duration),
            };
            let events = events::query_events(&config.event_log_path(), &filters)?;
            if *json {
                println!("{}", render::json::render_events_json(&events));
            } else {
                for e in &events {
                    println!(
                        "{} {} {} {}",
                        e.ts,
                        e.cmd,
                        e.task_id.as_deref().unwrap_or("-"),
                        e.result.as_deref().unwrap_or("start"),
                    );
                }
            }
            Ok(EXIT_SUCCESS)
        }
    }
}
