//! TabRunner CLI Entry Point
//!
//! Runs workflow definitions from the terminal, standing in for the
//! browser shell: prompt nodes are answered interactively on stdin, tab
//! content comes from a local text file, and notify nodes that require
//! acknowledgment pause until the user confirms.
//!
//! # Usage
//!
//! ```bash
//! # Execute a workflow
//! tabrunner workflow.json
//!
//! # Provide page text for prompts that use tab context
//! tabrunner workflow.json --page article.txt
//!
//! # Validate without executing
//! tabrunner workflow.json --validate
//!
//! # Raise the step budget for long-running graphs
//! tabrunner workflow.json --max-steps 5000
//! ```

use std::env;
use std::fs;
use std::io::{self, BufRead, Write};
use std::process::ExitCode;
use std::sync::mpsc::channel;
use std::sync::Arc;

use colored::Colorize;
use log::{error, info};

use tabrunner::events::{ChannelSink, ExecutionEvent};
use tabrunner::execution::{
    ActionError, ActionRunner, Engine, ExecutionRegistry, ExecutionStatus,
};
use tabrunner::workflow::{graph, store};
use tabrunner::{APP_NAME, VERSION};

/// Default per-execution step budget.
const DEFAULT_MAX_STEPS: u64 = tabrunner::execution::DEFAULT_MAX_STEPS;

/// Command-line configuration parsed from arguments.
#[derive(Debug)]
struct Config {
    workflow_path: String,
    tab_id: Option<String>,
    page_path: Option<String>,
    max_steps: u64,
    validate_only: bool,
    verbose: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workflow_path: String::new(),
            tab_id: None,
            page_path: None,
            max_steps: DEFAULT_MAX_STEPS,
            validate_only: false,
            verbose: false,
        }
    }
}

/// Configures the logging system with appropriate formatting.
fn setup_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format(|buf, record| {
            match record.level() {
                log::Level::Warn | log::Level::Error => {
                    writeln!(buf, "[{}] {}", record.level(), record.args())
                }
                _ => writeln!(buf, "{}", record.args()),
            }
        })
        .init();
}

/// Prints the application banner with version information.
fn print_banner() {
    println!();
    println!("{} v{}", APP_NAME, VERSION);
    println!("Visual Workflow Execution Engine");
    println!();
}

/// Prints usage information.
fn print_usage() {
    println!("Usage: tabrunner [OPTIONS] <WORKFLOW_FILE>");
    println!();
    println!("Arguments:");
    println!("  <WORKFLOW_FILE>     Path to a workflow definition (.json or .yaml)");
    println!();
    println!("Options:");
    println!("  --tab ID            Bind a browsing-tab id for prompt context");
    println!("  --page FILE         Use a text file as the bound tab's content");
    println!("  --max-steps N       Step budget per execution (default: {})", DEFAULT_MAX_STEPS);
    println!("  --validate          Check the workflow structure and exit");
    println!("  --verbose           Enable debug logging");
    println!("  --help              Show this help message");
    println!("  --version           Show version information");
    println!();
    println!("Examples:");
    println!("  tabrunner summarize.json");
    println!("  tabrunner summarize.json --page article.txt");
    println!("  tabrunner summarize.json --validate");
}

/// Parses command-line arguments into a Config struct.
fn parse_arguments(args: &[String]) -> Result<Config, String> {
    let mut config = Config::default();
    let mut i = 1; // Skip program name

    while i < args.len() {
        let arg = &args[i];

        match arg.as_str() {
            "--help" | "-h" => {
                print_usage();
                std::process::exit(0);
            }
            "--version" | "-V" => {
                println!("{} {}", APP_NAME, VERSION);
                std::process::exit(0);
            }
            "--validate" => {
                config.validate_only = true;
            }
            "--verbose" | "-v" => {
                config.verbose = true;
            }
            "--tab" => {
                i += 1;
                if i >= args.len() {
                    return Err("--tab requires an id argument".to_string());
                }
                config.tab_id = Some(args[i].clone());
            }
            "--page" => {
                i += 1;
                if i >= args.len() {
                    return Err("--page requires a file argument".to_string());
                }
                config.page_path = Some(args[i].clone());
            }
            "--max-steps" => {
                i += 1;
                if i >= args.len() {
                    return Err("--max-steps requires a number argument".to_string());
                }
                config.max_steps = args[i]
                    .parse()
                    .map_err(|_| format!("Invalid max-steps value: {}", args[i]))?;
            }
            arg if arg.starts_with('-') => {
                return Err(format!("Unknown option: {}", arg));
            }
            _ => {
                if !config.workflow_path.is_empty() {
                    return Err(format!("Unexpected argument: {}", arg));
                }
                config.workflow_path = arg.clone();
            }
        }
        i += 1;
    }

    if config.workflow_path.is_empty() {
        return Err("No workflow file specified".to_string());
    }

    Ok(config)
}

/// Terminal collaborator: the user plays the model, a local file plays
/// the browsing tab.
struct ConsoleRunner {
    page_text: Option<String>,
}

impl ActionRunner for ConsoleRunner {
    fn run_prompt(&self, instruction: &str, page_text: Option<&str>) -> Result<String, ActionError> {
        println!();
        println!("{} {}", "prompt:".cyan().bold(), instruction);
        if let Some(page) = page_text {
            println!("{} {} chars of page text attached", "note:".dimmed(), page.len());
        }
        print!("{} ", "answer>".cyan());
        io::stdout().flush().ok();

        let mut line = String::new();
        io::stdin()
            .lock()
            .read_line(&mut line)
            .map_err(|e| ActionError::Prompt(format!("stdin closed: {}", e)))?;
        Ok(line.trim_end().to_string())
    }

    fn tab_text(&self, tab_id: &str) -> Result<String, ActionError> {
        match &self.page_text {
            Some(text) => Ok(text.clone()),
            None => Err(ActionError::TabRead {
                tab_id: tab_id.to_string(),
                reason: "no page file bound (use --page)".to_string(),
            }),
        }
    }
}

/// Prints one engine event to the terminal.
fn print_event(event: &ExecutionEvent) {
    match event {
        ExecutionEvent::ExecutionUpdate { status, error, .. } => {
            let label = match status {
                ExecutionStatus::Completed => "completed".green().bold(),
                ExecutionStatus::Failed => "failed".red().bold(),
                ExecutionStatus::Paused => "paused".yellow().bold(),
                ExecutionStatus::Running => "running".blue(),
                ExecutionStatus::Idle => "idle".dimmed(),
            };
            match error {
                Some(e) => println!("  {} {} ({})", "status:".dimmed(), label, e),
                None => println!("  {} {}", "status:".dimmed(), label),
            }
        }
        ExecutionEvent::NodeStart { node_id, node_kind, .. } => {
            println!("  {} {} ({})", "->".dimmed(), node_id, node_kind);
        }
        ExecutionEvent::NodeComplete { node_id, error: Some(e), .. } => {
            println!("  {} {} {}", "x".red(), node_id, e.red());
        }
        ExecutionEvent::NodeComplete { .. } => {}
        ExecutionEvent::HumanNotification { message, requires_acknowledgment, .. } => {
            let mark = if *requires_acknowledgment { "!!" } else { "!" };
            println!("  {} {}", mark.yellow().bold(), message.yellow());
        }
    }
}

/// Asks the user to acknowledge a paused notification.
fn read_acknowledgment() -> (bool, Option<String>) {
    print!("{} ", "acknowledge? [y/N]".yellow());
    io::stdout().flush().ok();

    let mut line = String::new();
    if io::stdin().lock().read_line(&mut line).is_err() {
        return (false, None);
    }
    let acknowledged = matches!(line.trim(), "y" | "Y" | "yes");

    print!("{} ", "response (optional)>".dimmed());
    io::stdout().flush().ok();
    let mut response = String::new();
    if io::stdin().lock().read_line(&mut response).is_err() {
        return (acknowledged, None);
    }
    let response = response.trim_end().to_string();

    (
        acknowledged,
        if response.is_empty() { None } else { Some(response) },
    )
}

/// Main application entry point.
fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args: Vec<String> = env::args().collect();

    // Parse arguments
    let config = parse_arguments(&args).map_err(|e| {
        eprintln!("Error: {}", e);
        eprintln!();
        print_usage();
        e
    })?;

    // Setup logging
    setup_logging(config.verbose);

    // Print banner
    print_banner();

    // Load workflow
    info!("Loading workflow: {}", config.workflow_path);
    let workflow = store::load_workflow_file(&config.workflow_path).map_err(|e| {
        error!("Failed to load workflow: {}", e);
        format!(
            "Could not load workflow from '{}': {}",
            config.workflow_path, e
        )
    })?;

    info!(
        "Workflow loaded: '{}' ({} nodes, {} edges)",
        workflow.name,
        workflow.nodes.len(),
        workflow.edges.len()
    );

    if config.validate_only {
        let problems = graph::quick_validate(&workflow);
        if problems.is_empty() {
            println!("{}", "Workflow is valid".green().bold());
            return Ok(());
        }
        for problem in &problems {
            println!("  {} {}", "x".red(), problem);
        }
        return Err(format!("{} validation problem(s) found", problems.len()).into());
    }

    // Load page text if a file is bound
    let page_text = match &config.page_path {
        Some(path) => Some(fs::read_to_string(path).map_err(|e| {
            format!("Could not read page file '{}': {}", path, e)
        })?),
        None => None,
    };

    // A bound page implies a tab to read it from
    let tab_id = config
        .tab_id
        .clone()
        .or_else(|| page_text.as_ref().map(|_| "local-page".to_string()));

    // Wire up the engine
    let registry = Arc::new(ExecutionRegistry::new());
    let (tx, events) = channel();
    let mut engine = Engine::new(
        Arc::clone(&registry),
        Arc::new(ConsoleRunner { page_text }),
    );
    engine.set_event_sink(Arc::new(ChannelSink::new(tx)));
    engine.set_max_steps(config.max_steps);

    // Execute
    let execution_id = engine.execute(workflow, tab_id)?;
    println!("{} {}", "execution:".bold(), execution_id);

    // Event loop: print progress, acknowledge pauses, stop on terminal
    for event in events {
        print_event(&event);

        match &event {
            ExecutionEvent::ExecutionUpdate { status, .. } if status.is_terminal() => {
                if *status == ExecutionStatus::Failed {
                    let error = registry
                        .get(&execution_id)
                        .and_then(|e| e.error)
                        .unwrap_or_else(|| "unknown error".to_string());
                    return Err(format!("Workflow failed: {}", error).into());
                }
                break;
            }
            ExecutionEvent::ExecutionUpdate { status, .. }
                if *status == ExecutionStatus::Paused =>
            {
                let (acknowledged, response) = read_acknowledgment();
                engine.resume(&execution_id, acknowledged, response)?;
            }
            _ => {}
        }
    }

    println!();
    println!("{}", "Workflow completed successfully".green().bold());
    Ok(())
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!();
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
