use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use litebrowse_core::{Column, DeclaredType, PageRequest, Value, render_for_display};
use litebrowse_sqlite::registry;
use litebrowse_sqlite::{
    AddColumn, AdminConfig, Database, ExportFormat, ForeignKeySummary, ForeignKeyTarget,
    ImportFormat, OpenMode, Ordering, RowPage, Session, TableQuery,
};
use serde::Serialize;
use tracing::{Level, debug};

/// CLI-specific output format enum with clap argument parsing support.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
enum CliOutputFormat {
    Text,
    Json,
}

/// File format for `export` and `import`.
#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum CliFileFormat {
    Json,
    Csv,
}

impl From<CliFileFormat> for ExportFormat {
    fn from(fmt: CliFileFormat) -> Self {
        match fmt {
            CliFileFormat::Json => Self::Json,
            CliFileFormat::Csv => Self::Csv,
        }
    }
}

impl From<CliFileFormat> for ImportFormat {
    fn from(fmt: CliFileFormat) -> Self {
        match fmt {
            CliFileFormat::Json => Self::Json,
            CliFileFormat::Csv => Self::Csv,
        }
    }
}

#[derive(Debug, Parser)]
#[command(name = "litebrowse")]
#[command(about = "Browse and administer a SQLite database")]
#[command(version)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Args)]
struct GlobalArgs {
    /// Database file path.
    #[arg(long, global = true)]
    db: Option<PathBuf>,
    /// Open the database read-only.
    #[arg(long, global = true)]
    read_only: bool,
    /// YAML configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Rows per page when browsing (overrides the configuration file).
    #[arg(long, global = true)]
    rows_per_page: Option<u64>,
    /// Output format.
    #[arg(long, global = true, default_value = "text")]
    format: CliOutputFormat,
    /// Log level: trace, debug, info, warn or error.
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,
    /// Log format: text or json.
    #[arg(long, global = true, default_value = "text")]
    log_format: String,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Show file name, size, timestamps and SQLite version.
    Info,
    /// List tables, views and virtual tables.
    Tables,
    /// Show the columns, keys, indexes and triggers of a table or view.
    Structure(TableArgs),
    /// Browse one page of a table.
    Rows(RowsArgs),
    /// Show one row, identified by its primary-key token, as editable values.
    Get(RowKeyArgs),
    /// Run an ad-hoc SQL statement.
    Query(QueryArgs),
    /// Insert a row from COLUMN=VALUE pairs.
    Insert(InsertArgs),
    /// Update the row identified by a primary-key token.
    Update(UpdateArgs),
    /// Delete the row identified by a primary-key token.
    Delete(RowKeyArgs),
    /// Add a column to a table.
    AddColumn(AddColumnArgs),
    /// Drop a column (and any index covering it) from a table.
    DropColumn(ColumnArgs),
    /// Rename a column.
    RenameColumn(RenameColumnArgs),
    /// Create an index on one or more columns.
    AddIndex(AddIndexArgs),
    /// Drop an index.
    DropIndex(NamedArgs),
    /// Drop a trigger.
    DropTrigger(NamedArgs),
    /// Drop a table or view.
    DropTable(TableArgs),
    /// Create a table with an auto-incrementing `id` primary key.
    CreateTable(TableArgs),
    /// Export a table or query result as JSON or CSV.
    Export(ExportArgs),
    /// Import JSON or CSV rows into a table.
    Import(ImportArgs),
    /// List the database handles open in this process.
    Handles,
    /// Print the effective configuration as YAML.
    Config,
}

#[derive(Debug, Args)]
struct TableArgs {
    /// Table or view name.
    table: String,
}

#[derive(Debug, Args)]
struct RowsArgs {
    /// Table or view name.
    table: String,
    /// Page number, or `last`.
    #[arg(long, default_value = "1")]
    page: String,
    /// Equality filter as COLUMN=VALUE; `null` matches NULL.
    #[arg(long = "filter", value_parser = parse_assignment)]
    filters: Vec<(String, String)>,
    /// Ordering column; prefix with `-` for descending.
    #[arg(long, allow_hyphen_values = true)]
    order: Option<String>,
    /// Show labels for foreign-key values.
    #[arg(long)]
    labels: bool,
}

#[derive(Debug, Args)]
struct RowKeyArgs {
    /// Table or view name.
    table: String,
    /// Primary-key token, as shown by `rows`.
    key: String,
}

#[derive(Debug, Args)]
struct QueryArgs {
    /// SQL statement.
    sql: String,
    /// 1-based result column to order by; negative sorts descending.
    #[arg(long, allow_hyphen_values = true)]
    order: Option<i64>,
}

#[derive(Debug, Args)]
struct InsertArgs {
    /// Table or view name.
    table: String,
    /// Values as COLUMN=VALUE.
    #[arg(value_parser = parse_assignment)]
    values: Vec<(String, String)>,
}

#[derive(Debug, Args)]
struct UpdateArgs {
    /// Table or view name.
    table: String,
    /// Primary-key token, as shown by `rows`.
    key: String,
    /// New values as COLUMN=VALUE.
    #[arg(required = true, value_parser = parse_assignment)]
    values: Vec<(String, String)>,
}

#[derive(Debug, Args)]
struct AddColumnArgs {
    /// Table name.
    table: String,
    /// New column name.
    name: String,
    /// Column type (e.g. INTEGER, TEXT, BOOL); ignored with --references.
    #[arg(default_value = "")]
    column_type: String,
    /// Reject NULL values.
    #[arg(long)]
    not_null: bool,
    /// Default value, decoded like any other input.
    #[arg(long, allow_hyphen_values = true)]
    default: Option<String>,
    /// Foreign-key target as TABLE.COLUMN.
    #[arg(long, value_parser = parse_reference)]
    references: Option<ForeignKeyTarget>,
}

#[derive(Debug, Args)]
struct ColumnArgs {
    /// Table name.
    table: String,
    /// Column name.
    column: String,
}

#[derive(Debug, Args)]
struct RenameColumnArgs {
    /// Table name.
    table: String,
    /// Current column name.
    old: String,
    /// New column name.
    new: String,
}

#[derive(Debug, Args)]
struct AddIndexArgs {
    /// Table name.
    table: String,
    /// Indexed columns, in key order.
    #[arg(required = true)]
    columns: Vec<String>,
    /// Create a UNIQUE index.
    #[arg(long)]
    unique: bool,
}

#[derive(Debug, Args)]
struct NamedArgs {
    /// Table the index or trigger belongs to.
    table: String,
    /// Index or trigger name.
    name: String,
}

#[derive(Debug, Args)]
struct ExportArgs {
    /// Table to export; omit when using --query.
    #[arg(required_unless_present = "query")]
    table: Option<String>,
    /// Export the result of this statement instead of a table.
    #[arg(long, conflicts_with = "table")]
    query: Option<String>,
    /// Comma-separated columns (default: all).
    #[arg(long)]
    columns: Option<String>,
    /// File format.
    #[arg(long = "as", default_value = "json")]
    file_format: CliFileFormat,
    /// Write to this file instead of stdout.
    #[arg(long)]
    output: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct ImportArgs {
    /// Target table.
    table: String,
    /// JSON or CSV file to import.
    input: PathBuf,
    /// File format (default: from the file extension).
    #[arg(long = "as")]
    file_format: Option<CliFileFormat>,
    /// Ignore fields that are not columns instead of adding them.
    #[arg(long)]
    strict: bool,
}

fn main() {
    let Cli { global, command } = Cli::parse();

    if let Err(err) = init_logging(&global.log_level, &global.log_format) {
        eprintln!("error: {err}");
        std::process::exit(1);
    }

    let result = run(&global, command);
    if let Err(err) = result {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn init_logging(level: &str, format: &str) -> Result<(), String> {
    let level = match level.to_ascii_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        other => return Err(format!("unknown log level '{other}'")),
    };

    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false);

    match format {
        "json" => subscriber.json().init(),
        "text" => subscriber.init(),
        other => return Err(format!("unknown log format '{other}'")),
    }
    Ok(())
}

fn run(global: &GlobalArgs, command: Command) -> Result<(), String> {
    let config = load_config(global)?;
    match command {
        Command::Config => run_config(&config),
        command => run_on_database(global, config, command),
    }
}

fn run_on_database(
    global: &GlobalArgs,
    config: AdminConfig,
    command: Command,
) -> Result<(), String> {
    let db = open_database(global, config)?;
    let session = db
        .session()
        .map_err(|e| format!("Failed to open session on '{}': {e}", db.path().display()))?;
    let out = global.format;

    match command {
        Command::Info => run_info(&db, out),
        Command::Tables => run_tables(&session, out),
        Command::Structure(args) => run_structure(&session, out, args),
        Command::Rows(args) => run_rows(&session, out, args),
        Command::Get(args) => run_get(&session, out, args),
        Command::Query(args) => run_query(&session, out, args),
        Command::Insert(args) => run_insert(&session, args),
        Command::Update(args) => run_update(&session, args),
        Command::Delete(args) => run_delete(&session, args),
        Command::AddColumn(args) => run_add_column(&session, args),
        Command::DropColumn(args) => run_drop_column(&session, args),
        Command::RenameColumn(args) => run_rename_column(&session, args),
        Command::AddIndex(args) => run_add_index(&session, args),
        Command::DropIndex(args) => run_drop_index(&session, args),
        Command::DropTrigger(args) => run_drop_trigger(&session, args),
        Command::DropTable(args) => run_drop_table(&session, args),
        Command::CreateTable(args) => run_create_table(&session, args),
        Command::Export(args) => run_export(&session, args),
        Command::Import(args) => run_import(&session, args),
        Command::Handles => run_handles(out),
        Command::Config => unreachable!("config is handled before the database is opened"),
    }
}

fn load_config(global: &GlobalArgs) -> Result<AdminConfig, String> {
    let mut config = match &global.config {
        Some(path) => AdminConfig::load(path)
            .map_err(|e| format!("Failed to load config '{}': {e}", path.display()))?,
        None => AdminConfig::default(),
    };
    if let Some(rows) = global.rows_per_page {
        config.rows_per_page = rows;
    }
    debug!(?config, "effective configuration");
    Ok(config)
}

fn open_database(global: &GlobalArgs, config: AdminConfig) -> Result<Database, String> {
    let path = global
        .db
        .as_deref()
        .ok_or_else(|| "missing --db <PATH>".to_string())?;
    let mode = if global.read_only {
        OpenMode::ReadOnly
    } else {
        OpenMode::ReadWrite
    };
    Database::open(path, mode, config)
        .map_err(|e| format!("Failed to open database '{}': {e}", path.display()))
}

// ---------------------------------------------------------------------------
// Read-only commands
// ---------------------------------------------------------------------------

fn run_config(config: &AdminConfig) -> Result<(), String> {
    let yaml =
        serde_yaml::to_string(config).map_err(|e| format!("Failed to render config: {e}"))?;
    print!("{yaml}");
    Ok(())
}

fn run_info(db: &Database, out: CliOutputFormat) -> Result<(), String> {
    let info = db.info().map_err(|e| e.to_string())?;
    if out == CliOutputFormat::Json {
        return print_json(&info);
    }

    println!("File: {}", info.filename);
    println!("Path: {}", info.path.display());
    println!("Size: {} bytes", info.size);
    if let Some(created) = info.created {
        println!("Created: {}", created.format("%Y-%m-%d %H:%M:%S"));
    }
    if let Some(modified) = info.modified {
        println!("Modified: {}", modified.format("%Y-%m-%d %H:%M:%S"));
    }
    println!("Read-only: {}", if info.read_only { "yes" } else { "no" });
    println!("SQLite version: {}", info.sqlite_version);
    Ok(())
}

#[derive(Serialize)]
struct TableListing {
    tables: Vec<String>,
    views: Vec<String>,
    virtual_tables: Vec<String>,
}

fn run_tables(session: &Session<'_>, out: CliOutputFormat) -> Result<(), String> {
    let catalog = session.catalog();
    let virtual_tables = catalog.list_virtual_tables().map_err(|e| e.to_string())?;
    let tables: Vec<String> = catalog
        .list_visible_tables()
        .map_err(|e| e.to_string())?
        .into_iter()
        .filter(|t| !virtual_tables.contains(t))
        .collect();
    let views = catalog
        .list_views()
        .map_err(|e| e.to_string())?
        .into_iter()
        .map(|v| v.name)
        .collect();
    let listing = TableListing {
        tables,
        views,
        virtual_tables: virtual_tables.into_iter().collect(),
    };

    if out == CliOutputFormat::Json {
        return print_json(&listing);
    }
    for table in &listing.tables {
        println!("{table}");
    }
    for view in &listing.views {
        println!("{view} (view)");
    }
    for table in &listing.virtual_tables {
        println!("{table} (virtual)");
    }
    Ok(())
}

fn run_structure(
    session: &Session<'_>,
    out: CliOutputFormat,
    args: TableArgs,
) -> Result<(), String> {
    let meta = session.metadata(&args.table).map_err(|e| e.to_string())?;
    let view = if meta.is_view {
        session
            .catalog()
            .get_view(&meta.name)
            .map_err(|e| e.to_string())?
    } else {
        None
    };

    if out == CliOutputFormat::Json {
        #[derive(Serialize)]
        struct Structure<'a> {
            #[serde(flatten)]
            table: &'a litebrowse_core::TableMetadata,
            #[serde(skip_serializing_if = "Option::is_none")]
            view: Option<&'a litebrowse_core::View>,
        }
        return print_json(&Structure {
            table: &meta,
            view: view.as_ref(),
        });
    }

    println!("{} {}", if meta.is_view { "View" } else { "Table" }, meta.name);
    println!("\nColumns:");
    for column in &meta.columns {
        println!("  {}", describe_column(column));
    }
    if !meta.foreign_keys.is_empty() {
        println!("\nForeign keys:");
        for fk in &meta.foreign_keys {
            println!("  {} -> {}.{}", fk.column, fk.dest_table, fk.dest_column);
        }
    }
    if !meta.indexes.is_empty() {
        println!("\nIndexes:");
        for index in &meta.indexes {
            let columns = index
                .columns
                .as_ref()
                .map_or_else(|| "<expression>".to_string(), |c| c.join(", "));
            let unique = if index.unique { " UNIQUE" } else { "" };
            println!("  {}{unique} ({columns})", index.name);
        }
    }
    if !meta.triggers.is_empty() {
        println!("\nTriggers:");
        for trigger in &meta.triggers {
            println!("  {}", trigger.name);
        }
    }
    if let Some(view) = view {
        let operations: Vec<String> = view
            .operations
            .iter()
            .map(|op| format!("{op:?}").to_ascii_lowercase())
            .collect();
        println!("\nEditable operations: {}", display_list(&operations));
        println!("\n{}", view.sql);
    }
    Ok(())
}

fn describe_column(column: &Column) -> String {
    let mut line = column.name.clone();
    let declared = column.declared_type.as_sql();
    if !declared.is_empty() {
        line.push(' ');
        line.push_str(declared);
    }
    if let Some(position) = column.primary_key_position {
        line.push_str(&format!(" PRIMARY KEY({position})"));
    }
    if column.auto_increment {
        line.push_str(" AUTOINCREMENT");
    }
    if !column.nullable {
        line.push_str(" NOT NULL");
    }
    if let Some(default) = &column.default_value {
        line.push_str(&format!(" DEFAULT {default}"));
    }
    line
}

#[derive(Serialize)]
struct BrowseOutput<'a> {
    #[serde(flatten)]
    page: &'a RowPage,
    #[serde(skip_serializing_if = "Option::is_none")]
    labels: Option<&'a BTreeMap<String, ForeignKeySummary>>,
}

fn run_rows(session: &Session<'_>, out: CliOutputFormat, args: RowsArgs) -> Result<(), String> {
    let ordering = match args.order.as_deref() {
        Some(raw) => Some(Ordering::parse(raw).ok_or_else(|| "empty --order".to_string())?),
        None => None,
    };
    let query = TableQuery {
        filter: args.filters,
        ordering,
        page: PageRequest::parse(&args.page),
    };
    let rows = session.rows();
    let page = rows.browse(&args.table, &query).map_err(|e| e.to_string())?;
    let labels = if args.labels {
        Some(
            rows.summarize_foreign_keys(&args.table)
                .map_err(|e| e.to_string())?,
        )
    } else {
        None
    };

    if out == CliOutputFormat::Json {
        return print_json(&BrowseOutput {
            page: &page,
            labels: labels.as_ref(),
        });
    }

    let meta = session.metadata(&args.table).map_err(|e| e.to_string())?;
    let max_len = session.database().config().display_max_length;
    let no_labels = BTreeMap::new();
    let labels = labels.as_ref().unwrap_or(&no_labels);

    let mut header = vec!["key".to_string()];
    header.extend(page.columns.iter().cloned());
    println!("{}", header.join("\t"));
    for row in &page.rows {
        let mut cells = vec![row.key.as_ref().map_or("", |k| k.as_str()).to_string()];
        for (name, value) in row.values.iter() {
            let declared = meta
                .column(name)
                .map_or(DeclaredType::Native(String::new()), |c| {
                    c.declared_type.clone()
                });
            let mut cell = render_for_display(value, &declared, max_len)
                .summary()
                .to_string();
            let label = labels
                .get(name)
                .and_then(|summary| value.key_text().and_then(|key| summary.label(&key)));
            if let Some(label) = label {
                cell.push_str(&format!(" ({label})"));
            }
            cells.push(cell);
        }
        println!("{}", cells.join("\t"));
    }

    let p = &page.pagination;
    println!(
        "-- page {} of {} ({} row{})",
        p.page,
        p.total_pages,
        p.total_rows,
        if p.total_rows == 1 { "" } else { "s" }
    );
    if let Some(sums) = &page.sums {
        for (column, sum) in sums {
            println!("-- sum({column}) = {sum}");
        }
    }
    Ok(())
}

fn run_get(session: &Session<'_>, out: CliOutputFormat, args: RowKeyArgs) -> Result<(), String> {
    let rows = session.rows();
    let row = rows.fetch(&args.table, &args.key).map_err(|e| e.to_string())?;
    if out == CliOutputFormat::Json {
        return print_json(&row);
    }
    for (column, value) in rows.edit_values(&args.table, &row).map_err(|e| e.to_string())? {
        println!("{column}={value}");
    }
    Ok(())
}

fn run_query(session: &Session<'_>, out: CliOutputFormat, args: QueryArgs) -> Result<(), String> {
    let outcome = session.run_query(&args.sql, args.order);
    if let Some(err) = outcome.error {
        return Err(format!("query failed: {err}"));
    }
    if out == CliOutputFormat::Json {
        return print_json(&outcome);
    }

    if outcome.columns.is_empty() {
        println!("{} row(s) affected", outcome.row_count);
        return Ok(());
    }
    println!("{}", outcome.columns.join("\t"));
    for row in &outcome.rows {
        let cells: Vec<String> = row
            .iter()
            .map(|(_, value)| match value {
                Value::Null => "NULL".to_string(),
                other => other.to_string(),
            })
            .collect();
        println!("{}", cells.join("\t"));
    }
    if outcome.truncated {
        println!(
            "-- showing first {} rows; result truncated",
            outcome.row_count
        );
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Row writes
// ---------------------------------------------------------------------------

fn run_insert(session: &Session<'_>, args: InsertArgs) -> Result<(), String> {
    let inserted = session
        .rows()
        .insert(&args.table, &args.values)
        .map_err(|e| e.to_string())?;
    println!("Inserted {inserted} row(s) into '{}'.", args.table);
    Ok(())
}

fn run_update(session: &Session<'_>, args: UpdateArgs) -> Result<(), String> {
    let updated = session
        .rows()
        .update(&args.table, &args.key, &args.values)
        .map_err(|e| e.to_string())?;
    println!("Updated {updated} row(s) in '{}'.", args.table);
    Ok(())
}

fn run_delete(session: &Session<'_>, args: RowKeyArgs) -> Result<(), String> {
    let deleted = session
        .rows()
        .delete(&args.table, &args.key)
        .map_err(|e| e.to_string())?;
    println!("Deleted {deleted} row(s) from '{}'.", args.table);
    Ok(())
}

// ---------------------------------------------------------------------------
// Structural changes
// ---------------------------------------------------------------------------

fn run_add_column(session: &Session<'_>, args: AddColumnArgs) -> Result<(), String> {
    let column = AddColumn {
        name: args.name,
        declared_type: args.column_type,
        nullable: !args.not_null,
        default: args.default,
        foreign_key: args.references,
    };
    session
        .mutator()
        .add_column(&args.table, &column)
        .map_err(|e| e.to_string())?;
    println!("Added column '{}' to '{}'.", column.name, args.table);
    Ok(())
}

fn run_drop_column(session: &Session<'_>, args: ColumnArgs) -> Result<(), String> {
    session
        .mutator()
        .drop_column(&args.table, &args.column)
        .map_err(|e| e.to_string())?;
    println!("Dropped column '{}' from '{}'.", args.column, args.table);
    Ok(())
}

fn run_rename_column(session: &Session<'_>, args: RenameColumnArgs) -> Result<(), String> {
    session
        .mutator()
        .rename_column(&args.table, &args.old, &args.new)
        .map_err(|e| e.to_string())?;
    println!(
        "Renamed column '{}' to '{}' in '{}'.",
        args.old, args.new, args.table
    );
    Ok(())
}

fn run_add_index(session: &Session<'_>, args: AddIndexArgs) -> Result<(), String> {
    let name = session
        .mutator()
        .add_index(&args.table, &args.columns, args.unique)
        .map_err(|e| e.to_string())?;
    println!("Created index '{name}' on '{}'.", args.table);
    Ok(())
}

fn run_drop_index(session: &Session<'_>, args: NamedArgs) -> Result<(), String> {
    session
        .mutator()
        .drop_index(&args.table, &args.name)
        .map_err(|e| e.to_string())?;
    println!("Dropped index '{}'.", args.name);
    Ok(())
}

fn run_drop_trigger(session: &Session<'_>, args: NamedArgs) -> Result<(), String> {
    session
        .mutator()
        .drop_trigger(&args.table, &args.name)
        .map_err(|e| e.to_string())?;
    println!("Dropped trigger '{}'.", args.name);
    Ok(())
}

fn run_drop_table(session: &Session<'_>, args: TableArgs) -> Result<(), String> {
    session
        .mutator()
        .drop_table(&args.table)
        .map_err(|e| e.to_string())?;
    println!("Dropped '{}'.", args.table);
    Ok(())
}

fn run_create_table(session: &Session<'_>, args: TableArgs) -> Result<(), String> {
    let created = session
        .mutator()
        .create_table(&args.table)
        .map_err(|e| e.to_string())?;
    if created {
        println!("Created table '{}'.", args.table);
    } else {
        println!("Table '{}' already exists.", args.table);
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Transfer
// ---------------------------------------------------------------------------

fn run_export(session: &Session<'_>, args: ExportArgs) -> Result<(), String> {
    let format = ExportFormat::from(args.file_format);
    let transfer = session.transfer();
    let export = match (&args.table, &args.query) {
        (_, Some(sql)) => transfer.export_query(sql, format, None),
        (Some(table), None) => {
            let columns = match args.columns.as_deref() {
                Some(raw) => parse_csv_list(raw),
                None => session
                    .metadata(table)
                    .map_err(|e| e.to_string())?
                    .columns
                    .iter()
                    .map(|c| c.name.clone())
                    .collect(),
            };
            transfer.export(table, &columns, format)
        }
        (None, None) => return Err("export needs a table or --query".to_string()),
    }
    .map_err(|e| e.to_string())?;

    match args.output {
        Some(path) => {
            let path = if path.is_dir() {
                path.join(&export.filename)
            } else {
                path
            };
            fs::write(&path, &export.body)
                .map_err(|e| format!("Failed to write '{}': {e}", path.display()))?;
            eprintln!("Wrote {}", path.display());
        }
        None => println!("{}", export.body),
    }
    Ok(())
}

fn run_import(session: &Session<'_>, args: ImportArgs) -> Result<(), String> {
    let format = match args.file_format {
        Some(fmt) => fmt,
        None => format_from_extension(&args.input)?,
    };
    let file = fs::File::open(&args.input)
        .map_err(|e| format!("Failed to open '{}': {e}", args.input.display()))?;
    let imported = session
        .transfer()
        .import(
            &args.table,
            ImportFormat::from(format),
            std::io::BufReader::new(file),
            args.strict,
        )
        .map_err(|e| e.to_string())?;
    println!("Imported {imported} row(s) into '{}'.", args.table);
    Ok(())
}

fn run_handles(out: CliOutputFormat) -> Result<(), String> {
    let handles = registry::open_handles();
    if out == CliOutputFormat::Json {
        return print_json(&handles);
    }
    for handle in &handles {
        println!(
            "{:?}\t{:?}\t{}\t{}",
            handle.id,
            handle.mode,
            handle.opened_at.format("%Y-%m-%d %H:%M:%S"),
            handle.path.display()
        );
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), String> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| format!("Failed to serialize output: {e}"))?;
    println!("{text}");
    Ok(())
}

/// Parses `COLUMN=VALUE`; the value may itself contain `=`.
fn parse_assignment(raw: &str) -> Result<(String, String), String> {
    let (column, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected COLUMN=VALUE, got '{raw}'"))?;
    let column = column.trim();
    if column.is_empty() {
        return Err(format!("missing column name in '{raw}'"));
    }
    Ok((column.to_string(), value.to_string()))
}

fn parse_reference(raw: &str) -> Result<ForeignKeyTarget, String> {
    match raw.split_once('.') {
        Some((table, column)) if !table.is_empty() && !column.is_empty() => {
            Ok(ForeignKeyTarget {
                table: table.to_string(),
                column: column.to_string(),
            })
        }
        _ => Err(format!("expected TABLE.COLUMN, got '{raw}'")),
    }
}

fn parse_csv_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(ToString::to_string)
        .collect()
}

fn format_from_extension(path: &Path) -> Result<CliFileFormat, String> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);
    match extension.as_deref() {
        Some("json") => Ok(CliFileFormat::Json),
        Some("csv") => Ok(CliFileFormat::Csv),
        _ => Err(format!(
            "cannot infer format of '{}'; pass --as json or --as csv",
            path.display()
        )),
    }
}

fn display_list(items: &[String]) -> String {
    if items.is_empty() {
        "none".to_string()
    } else {
        items.join(", ")
    }
}
