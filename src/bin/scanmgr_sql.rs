use std::path::PathBuf;

use clap::Parser;
use comfy_table::{Cell, Table, presets::UTF8_FULL};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use scanmgr_sql::{RowIterator, SqlConfig, SqlEngine, SqlError, SqliteBackend, SqliteStatement};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// Run statements against the scan manager database through the
/// retrying statement engine
#[derive(Parser, Debug)]
#[command(name = "scanmgr-sql")]
#[command(about = "Diagnostic SQL shell for the scan manager database", long_about = None)]
struct Args {
    /// Database file (overrides the configuration), or :memory:
    #[arg(short = 'd', long)]
    database: Option<String>,

    /// Configuration file
    #[arg(short = 'f', long)]
    config: Option<PathBuf>,

    /// Run a single statement and exit
    #[arg(short = 'c', long)]
    command: Option<String>,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn new_table(rows: &RowIterator<SqliteStatement>) -> Result<Table, SqlError> {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    let mut names = Vec::new();
    for column in 0..rows.column_count()? {
        names.push(rows.column_name(column)?.unwrap_or_default());
    }
    table.set_header(names);
    Ok(table)
}

fn row_cells(rows: &RowIterator<SqliteStatement>) -> Result<Vec<Cell>, SqlError> {
    let mut cells = Vec::new();
    for column in 0..rows.column_count()? {
        let text = if rows.is_null(column)? {
            "NULL".to_string()
        } else {
            rows.string(column)?.map(|s| s.into_owned()).unwrap_or_default()
        };
        cells.push(Cell::new(text));
    }
    Ok(cells)
}

/// Run one statement; rows, if any, are printed as a table.
fn run(db: &SqlEngine<SqliteBackend>, sql: &str) -> Result<(), SqlError> {
    let mut rows = db.iterator(sql, &[])?;
    let mut table: Option<Table> = None;
    let mut count = 0usize;

    while rows.next()? {
        if table.is_none() {
            table = Some(new_table(&rows)?);
        }
        if let Some(table) = table.as_mut() {
            table.add_row(row_cells(&rows)?);
        }
        count += 1;
    }
    rows.cleanup();

    match table {
        Some(table) => {
            println!("{table}");
            println!("({count} {})", if count == 1 { "row" } else { "rows" });
        }
        None => println!("OK"),
    }
    Ok(())
}

fn print_help() {
    println!("Meta-commands:");
    println!("  \\q, \\quit          - Quit");
    println!("  \\dt                - List tables");
    println!("  \\counters          - Show retry counters");
    println!("  \\?, \\help          - Show this help");
    println!("\nOne SQL statement per line.");
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    init_tracing();

    let mut config = SqlConfig::load(args.config.as_deref())?;
    if let Some(database) = args.database {
        config.database = database;
    }
    info!(database = %config.database, "opening database");
    let db = SqlEngine::open(&config)?;

    if let Some(command) = args.command {
        run(&db, &command)?;
        return Ok(());
    }

    let mut rl = DefaultEditor::new()?;
    let history_file = dirs::home_dir().map(|mut p| {
        p.push(".scanmgr_sql_history");
        p
    });
    if let Some(ref path) = history_file {
        let _ = rl.load_history(path);
    }

    println!("scanmgr-sql {} on {}", env!("CARGO_PKG_VERSION"), config.database);
    println!("Type \\? for help, \\q to quit.\n");

    loop {
        match rl.readline("scanmgr> ") {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let _ = rl.add_history_entry(line);

                match line {
                    "\\q" | "\\quit" | "quit" | "exit" => break,
                    "\\?" | "\\help" => print_help(),
                    "\\counters" => println!("{:?}", db.counters()),
                    "\\dt" => {
                        if let Err(err) = run(
                            &db,
                            "SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name;",
                        ) {
                            eprintln!("Error: {err}");
                        }
                    }
                    _ if line.starts_with('\\') => {
                        println!("Unknown meta-command: {line}. Use \\? for help.");
                    }
                    sql => {
                        if let Err(err) = run(&db, sql) {
                            eprintln!("Error: {err}");
                        }
                    }
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("^C");
                break;
            }
            Err(ReadlineError::Eof) => break,
            Err(err) => {
                if let Some(ref path) = history_file {
                    let _ = rl.save_history(path);
                }
                return Err(err.into());
            }
        }
    }

    if let Some(ref path) = history_file {
        let _ = rl.save_history(path);
    }
    debug!(counters = ?db.counters(), "session closed");
    Ok(())
}
