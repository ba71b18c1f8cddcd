//! querylab — the query console CLI
//!
//! # Usage
//!
//! ```bash
//! # One-shot query against the in-memory store
//! querylab 'db.courses.find({ price: { $lt: 30 } }).limit(5)'
//!
//! # Load fixtures first
//! querylab --seed data/seed.json 'db.courses.countDocuments({})'
//!
//! # Interactive session
//! querylab repl --seed data/seed.json
//! ```

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use colored::*;
use querylab::config::Config;
use querylab::dispatch::COLLECTIONS;
use querylab::prelude::*;

#[derive(Parser)]
#[command(name = "querylab")]
#[command(version)]
#[command(about = "Shell-dialect console for a course-catalog document store", long_about = None)]
#[command(after_help = "EXAMPLES:
    querylab 'db.courses.find({ level: \"beginner\" }).sort({ rating: -1 }).limit(5)'
    querylab 'db.students.distinct(\"country\")' --seed data/seed.json
    querylab repl --seed data/seed.json")]
struct Cli {
    /// The console line to execute
    query: Option<String>,

    /// JSON seed file: an object mapping collection names to arrays
    #[arg(short, long, env = "QUERYLAB_SEED")]
    seed: Option<PathBuf>,

    /// Pretty-print the result payload
    #[arg(short, long)]
    pretty: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a line and show the planned operation without executing it
    Explain {
        /// The console line to explain
        query: String,
    },
    /// Interactive REPL mode
    Repl,
    /// List the collections the console accepts
    Collections,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let result = match &cli.command {
        Some(Commands::Explain { query }) => explain_query(query),
        Some(Commands::Repl) => match build_console(&cli) {
            Ok((console, pretty)) => {
                run_repl(&console, pretty).await;
                Ok(())
            }
            Err(e) => Err(e),
        },
        Some(Commands::Collections) => {
            for name in COLLECTIONS {
                println!("{name}");
            }
            Ok(())
        }
        None => match &cli.query {
            Some(query) => run_once(query, &cli).await,
            None => {
                println!("{}", "querylab — document store query console".cyan().bold());
                println!();
                println!("Usage: querylab <QUERY> [OPTIONS]");
                println!();
                println!("Try: querylab --help");
                Ok(())
            }
        },
    };

    if let Err(e) = result {
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

/// Build the console, seeding the store from --seed, the environment,
/// or the config file, in that order of preference. Returns the
/// effective pretty-print setting alongside.
fn build_console(cli: &Cli) -> anyhow::Result<(QueryConsole<MemoryStore>, bool)> {
    let config = Config::load()?;
    if config.no_color == Some(true) {
        colored::control::set_override(false);
    }
    let pretty = cli.pretty || config.pretty.unwrap_or(false);
    let seed_path = cli.seed.clone().or(config.seed);

    let store = match seed_path {
        Some(path) => {
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("reading seed file {}", path.display()))?;
            let json: serde_json::Value = serde_json::from_str(&text)
                .with_context(|| format!("parsing seed file {}", path.display()))?;
            MemoryStore::from_seed_json(&json)?
        }
        None => MemoryStore::new(),
    };
    Ok((QueryConsole::new(store), pretty))
}

async fn run_once(query: &str, cli: &Cli) -> anyhow::Result<()> {
    if cli.verbose {
        println!("{} {}", "Input:".dimmed(), query.yellow());
    }

    let (console, pretty) = build_console(cli)?;
    let response = console.execute(query).await;
    print_response(&response, pretty);

    if response.success {
        Ok(())
    } else {
        std::process::exit(1);
    }
}

fn print_response(response: &Response, pretty: bool) {
    match response.success {
        true => {
            if let Some(q) = &response.executed_query {
                println!(
                    "{} {}",
                    "Executed:".dimmed(),
                    format!("{}.{}", q.collection, q.method).cyan()
                );
            }
            if let Some(result) = &response.result {
                let rendered = if pretty {
                    serde_json::to_string_pretty(result)
                } else {
                    serde_json::to_string(result)
                };
                match rendered {
                    Ok(text) => println!("{text}"),
                    Err(e) => eprintln!("{} {}", "Error:".red().bold(), e),
                }
            }
        }
        false => {
            let msg = response.error.as_deref().unwrap_or("unknown error");
            eprintln!("{} {}", "✗".red().bold(), msg.red());
        }
    }
}

fn explain_query(query: &str) -> anyhow::Result<()> {
    let cmd = querylab::parse(query)?;
    let op = querylab::dispatch::plan(&cmd)?;

    println!("{}", "Parsed command:".green().bold());
    println!("  {} {}", "collection:".dimmed(), cmd.collection.cyan());
    println!("  {} {}", "method:".dimmed(), cmd.method.cyan());
    for (i, arg) in cmd.args.iter().enumerate() {
        println!("  {} {}", format!("arg[{i}]:").dimmed(), arg);
    }
    for call in &cmd.chain {
        println!("  {} .{}({} args)", "chain:".dimmed(), call.method.yellow(), call.args.len());
    }
    println!();
    println!("{}", "Planned operation:".green().bold());
    println!("  {} {}", "kind:".dimmed(), op.method_name().cyan());
    println!(
        "  {} {}",
        "writes:".dimmed(),
        if op.is_write() { "yes".yellow() } else { "no".normal() }
    );
    Ok(())
}

async fn run_repl(console: &QueryConsole<MemoryStore>, pretty: bool) {
    use rustyline::DefaultEditor;
    use rustyline::error::ReadlineError;

    println!("{}", "querylab — interactive console".cyan().bold());
    println!("{}", "Type db.collection.method(...) lines. Commands:".dimmed());
    println!("  {}        - Exit", ".exit".yellow());
    println!("  {}        - Show help", ".help".yellow());
    println!("  {}       - Clear screen", ".clear".yellow());
    println!("  {} - List collections", ".collections".yellow());
    println!();

    let mut rl = match DefaultEditor::new() {
        Ok(editor) => editor,
        Err(e) => {
            eprintln!("{} {}", "Failed to initialize REPL:".red(), e);
            return;
        }
    };

    let history_path = dirs::home_dir()
        .map(|p| p.join(".querylab_history"))
        .unwrap_or_default();
    let _ = rl.load_history(&history_path);

    loop {
        let prompt = "querylab> ".cyan().bold().to_string();
        match rl.readline(&prompt) {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let _ = rl.add_history_entry(line);

                match line {
                    ".exit" | ".quit" | "exit" | "quit" => {
                        println!("{}", "Goodbye!".green());
                        break;
                    }
                    ".help" | "help" => {
                        show_repl_help();
                        continue;
                    }
                    ".clear" | "clear" => {
                        print!("\x1B[2J\x1B[1;1H");
                        continue;
                    }
                    ".collections" => {
                        for name in COLLECTIONS {
                            println!("  {}", name.cyan());
                        }
                        continue;
                    }
                    _ => {}
                }

                let response = console.execute(line).await;
                print_response(&response, pretty);
            }
            Err(ReadlineError::Interrupted) => {
                println!("{}", "(^C — use .exit to quit)".dimmed());
            }
            Err(ReadlineError::Eof) => break,
            Err(e) => {
                eprintln!("{} {}", "Read error:".red(), e);
                break;
            }
        }
    }

    let _ = rl.save_history(&history_path);
}

fn show_repl_help() {
    println!("{}", "Supported methods".green().bold());
    println!(
        "  find findOne insertOne insertMany updateOne updateMany\n  deleteOne deleteMany countDocuments aggregate distinct"
    );
    println!();
    println!("{}", "Chain modifiers on find".green().bold());
    println!("  .sort({{ field: 1|-1 }})  .limit(n)  .skip(n)");
    println!();
    println!("{}", "Literals".green().bold());
    println!("  ObjectId(\"<24 hex>\")   new Date()   new Date(\"2024-01-01\")");
}
