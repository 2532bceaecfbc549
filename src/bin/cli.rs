use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use rustyline::Editor;
use tracing_subscriber::EnvFilter;

use bayunshard::config::load_config;
use bayunshard::runtime::{plan_statement, ExecutionPlan};
use bayunshard::{DataValue, HintManager, ShardingRule, StatementContext};

const HISTORY_FILE: &str = ".bayunshard_history";

#[derive(Parser)]
#[command(author, version, about = "BayunShard CLI - inspect how SQL is routed and rewritten across shards")]
struct Cli {
    /// Sharding rule file (JSON)
    #[arg(short, long, default_value = "sharding.json")]
    config: PathBuf,

    /// Log level used when RUST_LOG is not set
    #[arg(long, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start an interactive shell
    Shell,

    /// Show the execution units a statement becomes
    Preview {
        /// SQL statement, `?` marks a parameter
        sql: String,

        /// Parameter values in order: integers, floats, NULL, true/false, or text
        #[arg(short, long = "param")]
        params: Vec<String>,

        /// Force every sharding table onto this data source
        #[arg(long)]
        hint_data_source: Option<String>,
    },

    /// Validate the rule file and list its data nodes
    Check,
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(format!("bayunshard={level}")))
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).init();
}

fn load_rule(path: &Path) -> Result<ShardingRule> {
    let config = load_config(path).with_context(|| format!("Failed to load {}", path.display()))?;
    ShardingRule::new(config).context("Invalid sharding rule")
}

/// Interpret a command-line parameter the way a SQL literal would read
fn parse_param(raw: &str) -> DataValue {
    let trimmed = raw.trim();
    if trimmed.eq_ignore_ascii_case("null") {
        return DataValue::Null;
    }
    if let Ok(b) = trimmed.parse::<bool>() {
        return DataValue::Boolean(b);
    }
    if let Ok(i) = trimmed.parse::<i64>() {
        return DataValue::Integer(i);
    }
    if let Ok(f) = trimmed.parse::<f64>() {
        return DataValue::Float(f);
    }
    let unquoted = trimmed
        .strip_prefix('\'')
        .and_then(|s| s.strip_suffix('\''))
        .unwrap_or(trimmed);
    DataValue::Text(unquoted.to_string())
}

fn preview(rule: &ShardingRule, sql: &str, params: &[DataValue], hint: Option<&HintManager>) -> Result<ExecutionPlan> {
    let statement = StatementContext::bind(sql)?;
    let available = rule.data_sources().to_vec();
    Ok(plan_statement(rule, &statement, params, hint, Some(&available))?)
}

fn display_plan(plan: &ExecutionPlan) {
    println!("Route ({} units):", plan.route.units.len());
    for unit in &plan.route.units {
        println!("  {}", unit);
    }
    if let Some(keys) = &plan.generated_keys {
        let values: Vec<String> = keys.values.iter().map(|v| v.to_string()).collect();
        println!("Generated {}: {}", keys.column, values.join(", "));
    }
    println!("SQL:");
    for unit in &plan.rewrite.units {
        println!("  {}", unit);
    }
    if plan.rewrite.derived_columns > 0 {
        println!("({} derived columns hidden from the merged result)", plan.rewrite.derived_columns);
    }
}

fn display_rule(rule: &ShardingRule) {
    println!("Data sources: {}", rule.data_sources().join(", "));
    if let Some(ds) = rule.default_data_source() {
        println!("Default data source: {}", ds);
    }
    for table in rule.table_rules() {
        let nodes: Vec<String> = table.data_nodes.iter().map(|n| n.to_string()).collect();
        println!("  {} -> {}", table.logic_table, nodes.join(", "));
    }
}

fn print_help() {
    println!("Available commands:");
    println!("  <sql>                 - Preview routing and rewriting of a statement");
    println!("  params <v1> <v2> ...  - Bind parameters for the following statements");
    println!("  params                - Clear bound parameters");
    println!("  hint <data source>    - Force routing to one data source");
    println!("  hint                  - Clear the hint");
    println!("  rule                  - Show the loaded rule");
    println!("  help                  - Display this help message");
    println!("  exit                  - Exit the CLI");
}

fn run_shell(rule: &ShardingRule) -> Result<()> {
    println!("Welcome to BayunShard CLI. Type 'help' for assistance or 'exit' to quit.");

    let mut rl = Editor::<(), DefaultHistory>::new()?;
    if let Err(err) = rl.load_history(HISTORY_FILE) {
        if !err.to_string().contains("No such file or directory") {
            println!("Error loading history: {}", err);
        }
    }

    let mut params: Vec<DataValue> = Vec::new();
    let mut hint = HintManager::new();
    loop {
        match rl.readline("bayunshard> ") {
            Ok(line) => {
                let _ = rl.add_history_entry(&line);
                let line = line.trim().trim_end_matches(';');
                if line.is_empty() {
                    continue;
                }
                let (command, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
                match command.to_lowercase().as_str() {
                    "exit" | "quit" => {
                        println!("Goodbye!");
                        break;
                    }
                    "help" => print_help(),
                    "rule" => display_rule(rule),
                    "params" => {
                        params = rest.split_whitespace().map(parse_param).collect();
                        println!("{} parameters bound", params.len());
                    }
                    "hint" => {
                        hint.clear();
                        if !rest.trim().is_empty() {
                            hint.set_data_source(rest.trim());
                        }
                    }
                    _ => {
                        let hint = (!hint.is_empty()).then_some(&hint);
                        match preview(rule, line, &params, hint) {
                            Ok(plan) => display_plan(&plan),
                            Err(err) => println!("Error: {}", err),
                        }
                    }
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("CTRL-C");
                break;
            }
            Err(ReadlineError::Eof) => {
                println!("CTRL-D");
                break;
            }
            Err(err) => {
                println!("Error: {}", err);
                break;
            }
        }
    }

    if let Err(err) = rl.save_history(HISTORY_FILE) {
        println!("Error saving history: {}", err);
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    let rule = load_rule(&cli.config)?;
    match cli.command {
        Some(Commands::Preview { sql, params, hint_data_source }) => {
            let params: Vec<DataValue> = params.iter().map(|p| parse_param(p)).collect();
            let mut hint = HintManager::new();
            if let Some(ds) = hint_data_source {
                if !rule.data_sources().contains(&ds) {
                    bail!("Unknown data source '{}'", ds);
                }
                hint.set_data_source(ds);
            }
            let hint = (!hint.is_empty()).then_some(&hint);
            display_plan(&preview(&rule, &sql, &params, hint)?);
        }
        Some(Commands::Check) => {
            println!("{} is valid", cli.config.display());
            display_rule(&rule);
        }
        Some(Commands::Shell) | None => run_shell(&rule)?,
    }
    Ok(())
}
