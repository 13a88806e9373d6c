use clap::error::ErrorKind;
use clap::{CommandFactory, Parser};
use std::io::{self, BufRead};
use std::iter;
use std::sync::Arc;
use tabled::settings::Style;
use tabled::{Table, Tabled};
use taskbell_cli::cli::{Cli, Command, parse_due};
use taskbell_core::clock::{Clock, SystemClock};
use taskbell_core::config::{self, Config};
use taskbell_core::error::{AppError, Result};
use taskbell_core::model::{Task, TaskDraft};
use taskbell_core::notify::{self, AlarmQueue, DispatchOutcome, ScheduledAlarm};
use taskbell_core::query::{TaskQuery, is_overdue};
use taskbell_core::reminder::message::reminder_preview;
use taskbell_core::storage::{self, Database, SqliteTaskRepository};
use taskbell_core::task_api::{LifecycleOutcome, ServiceSettings, TaskService};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use tracing::warn;
use tracing_subscriber::EnvFilter;

/// Everything one command needs: the hydrated service plus the alarm queue
/// it schedules into.
struct App {
    service: TaskService,
    queue: Arc<AlarmQueue>,
    config: Config,
    clock: Arc<SystemClock>,
}

impl App {
    async fn open(overrides: &[String], clock: Arc<SystemClock>) -> Result<Self> {
        let loaded = config::load_config_with_fallback();
        if let Some(err) = &loaded.error {
            warn!(error = %err, "config file ignored, using defaults");
        }
        let overrides = overrides
            .iter()
            .map(|raw| config::parse_override(raw))
            .collect::<Result<Vec<_>>>()?;
        let config = config::merge_overrides(&loaded.config, &overrides);

        let path = storage::database_path(config.database_path.as_deref())?;
        let db = Database::open(&path)?;
        let queue = Arc::new(AlarmQueue::new(db.clone()));
        let repository = Arc::new(SqliteTaskRepository::new(db));
        let service = TaskService::start(
            repository,
            queue.clone(),
            clock.clone(),
            ServiceSettings::from(&config),
        )
        .await?;

        Ok(Self {
            service,
            queue,
            config,
            clock,
        })
    }

    fn local(&self, instant: OffsetDateTime) -> String {
        let format = format_description!("[year]-[month]-[day] [hour]:[minute]");
        let local = instant
            .checked_to_offset(self.clock.local_offset())
            .unwrap_or(instant);
        local.format(&format).unwrap_or_else(|_| local.to_string())
    }

    fn status(&self, task: &Task) -> &'static str {
        if task.is_completed {
            "done"
        } else if is_overdue(task, self.clock.now_utc()) {
            "overdue"
        } else {
            "pending"
        }
    }

    fn reminder_label(&self, task: &Task) -> String {
        if task.reminder.is_present() {
            let offset = task.offset_or(self.service.scheduler().default_offset_minutes());
            format!("{offset}m before")
        } else {
            "-".to_string()
        }
    }
}

#[derive(Tabled)]
struct TaskRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Description")]
    description: String,
    #[tabled(rename = "Due")]
    due: String,
    #[tabled(rename = "Priority")]
    priority: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Reminder")]
    reminder: String,
}

#[derive(Tabled)]
struct AlarmRow {
    #[tabled(rename = "Handle")]
    handle: String,
    #[tabled(rename = "Task")]
    task_id: String,
    #[tabled(rename = "Fires")]
    fires: String,
    #[tabled(rename = "Description")]
    description: String,
}

fn print_tasks_plain(app: &App, tasks: &[Task]) {
    if tasks.is_empty() {
        println!("No tasks.");
        return;
    }

    let rows = tasks.iter().map(|task| TaskRow {
        id: task.id.clone(),
        description: task.description.clone(),
        due: app.local(task.due_at),
        priority: task.priority.to_string(),
        status: app.status(task).to_string(),
        reminder: app.reminder_label(task),
    });
    println!("{}", Table::new(rows).with(Style::sharp()));
}

fn task_json(app: &App, task: &Task) -> Result<serde_json::Value> {
    let mut value =
        serde_json::to_value(task).map_err(|err| AppError::invalid_data(err.to_string()))?;
    value["status"] = serde_json::Value::from(app.status(task));
    Ok(value)
}

fn print_task_json(app: &App, task: &Task) -> Result<()> {
    println!("{}", task_json(app, task)?);
    Ok(())
}

fn print_tasks_json(app: &App, tasks: &[Task]) -> Result<()> {
    let payload = tasks
        .iter()
        .map(|task| task_json(app, task))
        .collect::<Result<Vec<_>>>()?;
    println!("{}", serde_json::Value::Array(payload));
    Ok(())
}

fn alarm_json(alarm: &ScheduledAlarm) -> serde_json::Value {
    serde_json::json!({
        "handle": alarm.handle,
        "task_id": alarm.task_id,
        "fire_at": alarm.fire_at.format(&Rfc3339).ok(),
        "title": alarm.payload.title,
        "body": alarm.payload.body,
    })
}

fn print_task_detail(app: &App, task: &Task) {
    println!("ID: {}", task.id);
    println!("Description: {}", task.description);
    println!("Due: {}", app.local(task.due_at));
    println!("Priority: {}", task.priority);
    println!("Status: {}", app.status(task));
    let offset = task.offset_or(app.service.scheduler().default_offset_minutes());
    match app.service.scheduler().fire_time_for(task) {
        Some(fire_at) if task.reminder.is_present() => println!(
            "Reminder: {} (at {})",
            reminder_preview(&task.description, offset),
            app.local(fire_at)
        ),
        _ => println!("Reminder: none"),
    }
}

/// Degraded steps do not fail the command; they are surfaced as warnings.
fn report_failures<T>(outcome: &LifecycleOutcome<T>) {
    for failure in &outcome.failures {
        eprintln!("WARNING: {failure}");
    }
}

fn report_dispatch(app: &App, outcome: &DispatchOutcome, json: bool) {
    for failure in &outcome.failures {
        eprintln!(
            "WARNING: reminder {} for {} was not shown: {}",
            failure.handle, failure.task_id, failure.error
        );
    }

    if json {
        let delivered: Vec<_> = outcome.delivered.iter().map(alarm_json).collect();
        let failed: Vec<_> = outcome
            .failures
            .iter()
            .map(|failure| {
                serde_json::json!({
                    "handle": failure.handle,
                    "task_id": failure.task_id,
                    "error": failure.error.to_string(),
                })
            })
            .collect();
        println!("{}", serde_json::json!({ "delivered": delivered, "failed": failed }));
        return;
    }

    for alarm in &outcome.delivered {
        println!(
            "Reminder sent: {} ({}) due {}",
            alarm.payload.description,
            alarm.task_id,
            app.local(alarm.payload.due_at)
        );
    }
    if outcome.delivered.is_empty() && outcome.failures.is_empty() {
        println!("No reminders due.");
    }
}

fn normalize_parse_error(err: clap::Error) -> AppError {
    let rendered = err.to_string();
    let first_line = rendered.lines().next().unwrap_or("invalid command").trim();
    let message = first_line
        .strip_prefix("error: ")
        .unwrap_or(first_line)
        .to_string();
    AppError::validation(message)
}

/// Splits an interactive line into arguments. Double quotes group words and
/// may start mid-word; inside them only `\"` and `\\` are escapes.
fn split_command_line(line: &str) -> Result<Vec<String>> {
    let mut args = Vec::new();
    let mut chars = line.chars().peekable();

    loop {
        while chars.next_if(|ch| ch.is_whitespace()).is_some() {}
        if chars.peek().is_none() {
            return Ok(args);
        }

        let mut word = String::new();
        while let Some(ch) = chars.next_if(|ch| !ch.is_whitespace()) {
            if ch != '"' {
                word.push(ch);
                continue;
            }
            loop {
                match chars.next() {
                    Some('"') => break,
                    Some('\\') => {
                        let escaped = chars.next_if(|next| matches!(next, '"' | '\\'));
                        word.push(escaped.unwrap_or('\\'));
                    }
                    Some(ch) => word.push(ch),
                    None => return Err(AppError::validation("unterminated quote in command")),
                }
            }
        }
        args.push(word);
    }
}

fn print_help() {
    let mut cmd = Cli::command();
    let help = cmd.render_help();
    println!("{help}");
}

async fn watch(app: &App, json: bool) -> Result<()> {
    let notifier = notify::notifier_from_env()?;
    let secs = app.config.dispatch_interval_secs();
    let mut ticker = tokio::time::interval(std::time::Duration::from_secs(secs));
    if !json {
        println!("Watching for due reminders every {secs}s (Ctrl-C to stop)");
    }

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match app.queue.dispatch_due(app.clock.now_utc(), notifier.as_ref()) {
                    Ok(outcome) if !outcome.delivered.is_empty() || !outcome.failures.is_empty() => {
                        report_dispatch(app, &outcome, json);
                    }
                    Ok(_) => {}
                    Err(err) => warn!(error = %err, "reminder dispatch pass failed"),
                }
            }
            signal = tokio::signal::ctrl_c() => {
                signal?;
                break;
            }
        }
    }

    Ok(())
}

async fn run_command(app: &mut App, command: Command, json: bool) -> Result<()> {
    match command {
        Command::Add {
            description,
            due,
            priority,
            remind,
        } => {
            let description = match description {
                Some(value) if !value.trim().is_empty() => value,
                _ => return Err(AppError::validation("description is required")),
            };
            let due_at = parse_due(&due, app.clock.local_offset())?;
            let mut draft =
                TaskDraft::new(description, due_at, priority.unwrap_or(app.config.priority()));
            if let Some(minutes) = remind {
                draft = draft.with_offset(minutes);
            }

            let outcome = app.service.create(draft).await?;
            report_failures(&outcome);
            let task = &outcome.value;
            if json {
                print_task_json(app, task)?;
            } else {
                println!("Added task: {} ({})", task.description, task.id);
                if task.reminder.is_present() {
                    if let Some(fire_at) = app.service.scheduler().fire_time_for(task) {
                        println!("Reminder set for {}", app.local(fire_at));
                    }
                }
            }
        }
        Command::Edit {
            id,
            description,
            due,
            priority,
            remind,
        } => {
            let existing = app
                .service
                .get(&id)
                .ok_or_else(|| AppError::not_found(id.as_str()))?;
            let mut draft = TaskDraft::from(existing);
            if let Some(description) = description {
                draft.description = description;
            }
            if let Some(due) = due {
                draft.due_at = parse_due(&due, app.clock.local_offset())?;
            }
            if let Some(priority) = priority {
                draft.priority = priority;
            }
            if let Some(minutes) = remind {
                draft.reminder_offset_minutes = Some(minutes);
            }

            let outcome = app.service.edit(&id, draft).await?;
            report_failures(&outcome);
            if json {
                print_task_json(app, &outcome.value)?;
            } else {
                println!(
                    "Updated task: {} ({})",
                    outcome.value.description, outcome.value.id
                );
            }
        }
        Command::Done { id } => {
            let outcome = app.service.complete(&id).await?;
            report_failures(&outcome);
            if json {
                print_task_json(app, &outcome.value)?;
            } else {
                println!(
                    "Completed task: {} ({})",
                    outcome.value.description, outcome.value.id
                );
            }
        }
        Command::Delete { id } => {
            let outcome = app.service.delete(&id).await?;
            report_failures(&outcome);
            if json {
                print_task_json(app, &outcome.value)?;
            } else {
                println!(
                    "Deleted task: {} ({})",
                    outcome.value.description, outcome.value.id
                );
            }
        }
        Command::ClearCompleted => {
            let outcome = app.service.clear_completed().await;
            report_failures(&outcome);
            if json {
                print_tasks_json(app, &outcome.value)?;
            } else {
                println!("Cleared {} completed task(s)", outcome.value.len());
            }
        }
        Command::ClearAll => {
            let outcome = app.service.clear_all().await;
            report_failures(&outcome);
            if json {
                print_tasks_json(app, &outcome.value)?;
            } else {
                println!("Cleared {} task(s)", outcome.value.len());
            }
        }
        Command::Show { id } => {
            let task = app
                .service
                .get(&id)
                .ok_or_else(|| AppError::not_found(id.as_str()))?;
            if json {
                print_task_json(app, task)?;
            } else {
                print_task_detail(app, task);
            }
        }
        Command::List {
            completed,
            all,
            priority,
            bucket,
            sort,
        } => {
            let query = TaskQuery {
                completed: if all { None } else { Some(completed) },
                priority,
                bucket,
                order: sort,
            };
            let tasks = app.service.query(&query);
            if json {
                print_tasks_json(app, &tasks)?;
            } else {
                print_tasks_plain(app, &tasks);
            }
        }
        Command::Reminders => {
            let alarms = app.queue.scheduled()?;
            if json {
                let payload: Vec<_> = alarms.iter().map(alarm_json).collect();
                println!("{}", serde_json::Value::Array(payload));
            } else if alarms.is_empty() {
                println!("No reminders scheduled.");
            } else {
                let rows = alarms.iter().map(|alarm| AlarmRow {
                    handle: alarm.handle.clone(),
                    task_id: alarm.task_id.clone(),
                    fires: app.local(alarm.fire_at),
                    description: alarm.payload.description.clone(),
                });
                println!("{}", Table::new(rows).with(Style::sharp()));
            }
        }
        Command::Notify { at } => {
            let now = match at {
                Some(raw) => parse_due(&raw, app.clock.local_offset())?,
                None => app.clock.now_utc(),
            };
            let notifier = notify::notifier_from_env()?;
            let outcome = app.queue.dispatch_due(now, notifier.as_ref())?;
            report_dispatch(app, &outcome, json);
        }
        Command::Watch => watch(app, json).await?,
    }

    Ok(())
}

/// Interactive mode keeps one hydrated service for the whole session. A line
/// with `--config-override` runs against its own service, after which the
/// shared one is reloaded.
struct Session {
    clock: Arc<SystemClock>,
    app: Option<App>,
}

impl Session {
    async fn run(&mut self, cli: Cli) -> Result<()> {
        if !cli.config_override.is_empty() {
            self.app = None;
            let mut app = App::open(&cli.config_override, self.clock.clone()).await?;
            return run_command(&mut app, cli.command, cli.json).await;
        }

        let app = match self.app.take() {
            Some(app) => app,
            None => App::open(&[], self.clock.clone()).await?,
        };
        let app = self.app.insert(app);
        run_command(app, cli.command, cli.json).await
    }
}

enum Line {
    Blank,
    Exit,
    Help,
    Run(Cli),
}

fn read_line(line: &str) -> Result<Line> {
    let line = line.trim();
    if line.eq_ignore_ascii_case("exit") || line.eq_ignore_ascii_case("quit") {
        return Ok(Line::Exit);
    }
    if line == "help" || line == "?" {
        return Ok(Line::Help);
    }

    let args = split_command_line(line)?;
    if args.is_empty() {
        return Ok(Line::Blank);
    }
    let argv = iter::once("taskbell".to_string()).chain(args);
    Cli::try_parse_from(argv)
        .map(Line::Run)
        .map_err(normalize_parse_error)
}

/// Runs commands from stdin until `exit`, end of input or a fatal error.
fn run_interactive(runtime: &tokio::runtime::Runtime, clock: Arc<SystemClock>) -> Result<()> {
    let mut session = Session { clock, app: None };

    for line in io::stdin().lock().lines() {
        let result = match read_line(&line?) {
            Ok(Line::Blank) => continue,
            Ok(Line::Exit) => break,
            Ok(Line::Help) => {
                print_help();
                continue;
            }
            Ok(Line::Run(cli)) => runtime.block_on(session.run(cli)),
            Err(err) => Err(err),
        };

        match result {
            Err(err) if err.is_fatal() => return Err(err),
            Err(err) => eprintln!("ERROR: {err}"),
            Ok(()) => {}
        }
    }

    Ok(())
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_env("TASKBELL_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

fn main() {
    init_tracing();

    // The local offset can only be read safely before any other thread exists.
    let clock = Arc::new(SystemClock::new());
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("ERROR: {}", AppError::from(err));
            std::process::exit(1);
        }
    };

    let mut args = std::env::args_os();
    args.next();
    if args.next().is_none() {
        if let Err(err) = run_interactive(&runtime, clock) {
            eprintln!("ERROR: {}", err);
            std::process::exit(1);
        }
        return;
    }

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) if matches!(err.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            let _ = err.print();
            return;
        }
        Err(err) => {
            eprintln!("ERROR: {}", normalize_parse_error(err));
            std::process::exit(1);
        }
    };

    let outcome = runtime.block_on(async {
        let mut app = App::open(&cli.config_override, clock).await?;
        run_command(&mut app, cli.command, cli.json).await
    });
    if let Err(err) = outcome {
        eprintln!("ERROR: {}", err);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::split_command_line;

    #[test]
    fn split_command_line_keeps_quoted_words_together() {
        let args = split_command_line(r#"add "Buy milk" --due "2025-12-20 11:00""#).unwrap();
        assert_eq!(args, vec!["add", "Buy milk", "--due", "2025-12-20 11:00"]);
    }

    #[test]
    fn split_command_line_handles_escaped_quotes() {
        let args = split_command_line(r#"edit task-1 --description "Say \"hi\"""#).unwrap();
        assert_eq!(args[3], r#"Say "hi""#);
    }

    #[test]
    fn split_command_line_joins_quotes_inside_a_word() {
        let args = split_command_line(r#"add --due="2025-12-20 11:00" "" x"#).unwrap();
        assert_eq!(args, vec!["add", "--due=2025-12-20 11:00", "", "x"]);
    }

    #[test]
    fn split_command_line_keeps_other_backslashes() {
        let args = split_command_line(r#"add "C:\tmp\notes" plain\word"#).unwrap();
        assert_eq!(args, vec!["add", r"C:\tmp\notes", r"plain\word"]);
    }

    #[test]
    fn split_command_line_rejects_unterminated_quote() {
        let err = split_command_line(r#"add "Buy milk"#).unwrap_err();
        assert!(err.to_string().contains("unterminated quote"));
    }
}
