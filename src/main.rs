// Only compile UI module when TUI feature is enabled
#[cfg(feature = "tui")]
mod ui;

use anyhow::{bail, Context, Result};
use chrono::Local;
use clap::{Parser, Subcommand};
use rusqlite::Connection;
use std::path::{Path, PathBuf};

use holdings_pivot::{
    delete_snapshot, get_snapshot, list_snapshots, save_snapshot, write_csv, write_xlsx,
    BatchReport, Config, FileOutcome, PivotTable, Snapshot, SortColumn, SortDirection, SortSpec,
    UploadSession,
};

#[derive(Parser)]
#[command(name = "holdings-pivot", version, about = "Consolidate broker holding statements into one pivot")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Import statement files and save the resulting pivot as a snapshot
    Import {
        /// Statement files (.xlsx, .xlsm, .csv, .tsv, .txt)
        #[arg(required = true)]
        files: Vec<PathBuf>,
        /// Snapshot name (defaults to the import time)
        #[arg(long)]
        name: Option<String>,
        /// Print the pivot without saving it
        #[arg(long)]
        no_save: bool,
    },
    /// List saved snapshots, newest first
    List,
    /// Export a snapshot to .csv or .xlsx
    Export {
        /// Snapshot id, or "latest"
        snapshot: String,
        /// Output path; the extension picks the format
        output: PathBuf,
        /// Column to sort by (default: Total Holdings, descending)
        #[arg(long)]
        sort: Option<String>,
        /// Sort descending
        #[arg(long)]
        desc: bool,
    },
    /// Browse a pivot interactively (given files, or the latest snapshot)
    View { files: Vec<PathBuf> },
    /// Delete a snapshot
    Delete { id: String },
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ {}", e);
            std::process::exit(1);
        }
    };

    match cli.command {
        Command::Import { files, name, no_save } => run_import(&config, &files, name, no_save),
        Command::List => run_list(&config),
        Command::Export { snapshot, output, sort, desc } => {
            run_export(&config, &snapshot, &output, sort_spec(sort, desc))
        }
        Command::View { files } => run_view(&config, &files),
        Command::Delete { id } => run_delete(&config, &id),
    }
}

/// Identity plus an open store, or exit with a configuration error
fn open_store(config: &Config) -> (String, Connection) {
    let opened = config
        .require_user()
        .map(str::to_string)
        .and_then(|user| config.open_store().map(|conn| (user, conn)));

    match opened {
        Ok(pair) => pair,
        Err(e) => {
            eprintln!("❌ {}", e);
            std::process::exit(1);
        }
    }
}

fn sort_spec(sort: Option<String>, desc: bool) -> SortSpec {
    match sort {
        None => SortSpec::default(),
        Some(label) => {
            let direction = if desc { SortDirection::Desc } else { SortDirection::Asc };
            SortSpec::new(SortColumn::from_label(&label), direction)
        }
    }
}

fn run_import(config: &Config, files: &[PathBuf], name: Option<String>, no_save: bool) -> Result<()> {
    println!("📥 Holdings Import - statements → pivot");
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    // Fail on configuration before reading anything
    let store = if no_save { None } else { Some(open_store(config)) };

    let mut session = UploadSession::new();
    if let Some(user) = store.as_ref().map(|(user, _)| user.as_str()).or(config.user.as_deref()) {
        session.sign_in(user);
    }

    println!("\n📂 Reading {} file(s)...", files.len());
    print_report(session.ingest_paths(files));

    let table = session.table();
    println!("\n📊 Pivot");
    print_summary(table);

    let Some((user, conn)) = store else {
        println!("\n✓ Not saved (--no-save)");
        return Ok(());
    };

    if table.is_empty() {
        println!("\n⚠️  Nothing to save");
        return Ok(());
    }

    let name = name.unwrap_or_else(|| format!("Import {}", Local::now().format("%Y-%m-%d %H:%M")));
    let snapshot = save_snapshot(&conn, &user, &name, table)?;

    println!("\n━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("✅ Saved snapshot '{}'", snapshot.name);
    println!("   id: {}", snapshot.id);

    Ok(())
}

fn run_list(config: &Config) -> Result<()> {
    let (user, conn) = open_store(config);
    let snapshots = list_snapshots(&conn, &user)?;

    if snapshots.is_empty() {
        println!("No snapshots saved for {}", user);
        return Ok(());
    }

    println!("🗂️  Snapshots for {}", user);
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    for snapshot in &snapshots {
        println!(
            "{}  {:<30}  {:>5} companies  {}",
            snapshot.id,
            snapshot.name,
            snapshot.table.len(),
            snapshot.created_at.with_timezone(&Local).format("%Y-%m-%d %H:%M")
        );
    }

    Ok(())
}

fn find_snapshot(conn: &Connection, user: &str, id: &str) -> Result<Snapshot> {
    let found = if id == "latest" {
        list_snapshots(conn, user)?.into_iter().next()
    } else {
        get_snapshot(conn, user, id)?
    };

    match found {
        Some(snapshot) => Ok(snapshot),
        None => bail!("snapshot '{}' not found", id),
    }
}

fn run_export(config: &Config, id: &str, output: &Path, spec: SortSpec) -> Result<()> {
    let (user, conn) = open_store(config);
    let snapshot = find_snapshot(&conn, &user, id)?;

    let is_xlsx = output
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("xlsx"))
        .unwrap_or(false);

    if is_xlsx {
        let bytes = write_xlsx(&snapshot.table, &spec)?;
        std::fs::write(output, bytes)
            .with_context(|| format!("Failed to write {}", output.display()))?;
    } else {
        let file = std::fs::File::create(output)
            .with_context(|| format!("Failed to create {}", output.display()))?;
        write_csv(&snapshot.table, &spec, file)?;
    }

    println!(
        "✅ Exported '{}' ({} companies) to {}",
        snapshot.name,
        snapshot.table.len(),
        output.display()
    );
    Ok(())
}

fn run_delete(config: &Config, id: &str) -> Result<()> {
    let (user, conn) = open_store(config);

    if delete_snapshot(&conn, &user, id)? {
        println!("🗑️  Deleted snapshot {}", id);
        Ok(())
    } else {
        bail!("snapshot '{}' not found", id)
    }
}

#[cfg(feature = "tui")]
fn run_view(config: &Config, files: &[PathBuf]) -> Result<()> {
    println!("🖥️  Loading Holdings Pivot UI...\n");

    let (table, report) = if files.is_empty() {
        let (user, conn) = open_store(config);
        let snapshot = find_snapshot(&conn, &user, "latest")?;
        println!("📊 Snapshot '{}'", snapshot.name);
        (snapshot.table, BatchReport::default())
    } else {
        let mut session = UploadSession::new();
        let report = session.ingest_paths(files).clone();
        (session.table().clone(), report)
    };

    println!("✓ Loaded {} companies\n", table.len());
    println!("Starting UI... (Press 'q' to quit)\n");

    let mut app = ui::App::new(table, report);
    ui::run_ui(&mut app)?;

    println!("\n✅ UI closed successfully");
    Ok(())
}

#[cfg(not(feature = "tui"))]
fn run_view(_config: &Config, _files: &[PathBuf]) -> Result<()> {
    eprintln!("❌ TUI mode not available!");
    eprintln!("   Rebuild with: cargo build --features tui");
    eprintln!("   Or use the web API: cargo run --bin holdings-server --features server");
    std::process::exit(1);
}

fn print_report(report: &BatchReport) {
    for file in &report.files {
        match &file.outcome {
            FileOutcome::Imported { records, .. } => {
                println!("✓ {} → {} ({} holdings)", file.file_name, file.owner, records)
            }
            FileOutcome::DecodeFailed { error } => println!("❌ {}", error),
            FileOutcome::NoDataFound { preview } => {
                println!("⚠️  {}: no holdings found, first rows:", file.file_name);
                for row in preview.iter().take(5) {
                    let cells: Vec<String> = row.iter().map(|c| c.as_text()).collect();
                    println!("     {}", cells.join(" | "));
                }
            }
        }
    }

    println!(
        "\n✓ {} imported, {} failed, {} without data, {} holdings",
        report.imported(),
        report.failed(),
        report.empty(),
        report.records()
    );
}

fn print_summary(table: &PivotTable) {
    println!("✓ {} companies, {} owners", table.len(), table.owners().len());
    println!("✓ Owners: {}", table.owners().join(", "));
    println!("✓ Grand total: {}", table.grand_total());
}
