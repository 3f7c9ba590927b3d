use std::{fs, path::Path, process, time::Duration};

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use rxndb_app::cli::{
    Cli, Commands, DbArgs, DbBuildArgs, DbCommands, DbRebuildArgs, DbSearchArgs, DbSwapArgs,
    SourcesArgs,
};
use rxndb_app::config::{self, AppConfig};
use rxndb_app::error::AppError;
use rxndb_app::ingestion::{Collection, collect_sources};
use rxndb_app::paths::AppPaths;
use rxndb_app::services::{
    OfflineBuilder, ProgressSink, RebuildEvent, RebuildOptions, RebuildSummary, Rebuilder,
    SwapOptions, log_event, swap_into_place,
};
use rxndb_app::store::{StoreCounts, open_or_create, reaction_with_measurements, search_reactions};
use serde_json::{Value, json};
use tracing_subscriber::{filter::LevelFilter, fmt};

fn main() {
    let cli = Cli::parse();
    let log_level = determine_log_level(&cli);
    init_tracing(log_level);

    if let Err(err) = run(cli) {
        eprintln!("{err}");
        process::exit(1);
    }
}

fn init_tracing(level: LevelFilter) {
    let subscriber = fmt().with_max_level(level).with_target(false).finish();

    if tracing::subscriber::set_global_default(subscriber).is_err() {
        tracing::warn!("Tracing subscriber already set; skipping re-initialization.");
    }
}

fn run(cli: Cli) -> Result<(), AppError> {
    match cli.command {
        Some(Commands::Sources(args)) => run_sources(args)?,
        Some(Commands::Db(args)) => run_db(args)?,
        None => Cli::print_help(),
    }
    Ok(())
}

fn determine_log_level(cli: &Cli) -> LevelFilter {
    match cli.command.as_ref() {
        Some(Commands::Sources(_)) => match cli.verbose {
            0 => LevelFilter::WARN,
            1 => LevelFilter::INFO,
            2 => LevelFilter::DEBUG,
            _ => LevelFilter::TRACE,
        },
        Some(Commands::Db(_)) | None => match cli.verbose {
            0 => LevelFilter::INFO,
            1 => LevelFilter::DEBUG,
            _ => LevelFilter::TRACE,
        },
    }
}

fn collect(config: &AppConfig) -> Result<Collection, AppError> {
    let paths = AppPaths::new(&config.data.base_dir)?;
    Ok(collect_sources(&paths, &config.data.collections))
}

fn run_sources(args: SourcesArgs) -> Result<(), AppError> {
    let config = config::load()?;
    let collection = collect(&config)?;

    for task in &collection.tasks {
        if args.json {
            let row = json!({
                "table": task.collection,
                "source": task.source.display().to_string(),
                "validated": task.record.validated,
                "by": task.record.by,
                "at": task.record.at,
            });
            println!("{}", serde_json::to_string(&row)?);
        } else {
            println!(
                "table{}\t{}\tvalidated={}",
                task.collection,
                task.source.display(),
                task.record.validated
            );
        }
    }
    for issue in &collection.issues {
        eprintln!("[{}] {issue}", issue.tag().as_str());
    }
    eprintln!(
        "{} tasks, {} skipped entries",
        collection.tasks.len(),
        collection.issues.len()
    );
    Ok(())
}

fn run_db(args: DbArgs) -> Result<(), AppError> {
    match args.command {
        DbCommands::Rebuild(sub) => db_rebuild(sub)?,
        DbCommands::Build(sub) => db_build(sub)?,
        DbCommands::Swap(sub) => db_swap(sub)?,
        DbCommands::Stats => db_stats()?,
        DbCommands::Search(sub) => db_search(sub)?,
    }
    Ok(())
}

fn db_rebuild(args: DbRebuildArgs) -> Result<(), AppError> {
    let config = config::load()?;
    let live = config.live_path();
    ensure_parent(&live)?;
    let mut options = RebuildOptions::from_config(&config, live);
    if let Some(batch_size) = args.batch_size {
        options.batch_size = batch_size;
    }

    let collection = collect(&config)?;
    let mut sink = ProgressBarSink::new();
    let result = Rebuilder::new(options).rebuild(collection, &mut sink);
    sink.finish();
    print_summary(&result?);
    Ok(())
}

fn db_build(args: DbBuildArgs) -> Result<(), AppError> {
    let config = config::load()?;
    let out = args.out.unwrap_or_else(|| config.build_path());
    ensure_parent(&out)?;
    let mut options = RebuildOptions::from_config(&config, out.clone());
    if let Some(batch_size) = args.batch_size {
        options.batch_size = batch_size;
    }

    let collection = collect(&config)?;
    let mut sink = ProgressBarSink::new();
    let result = OfflineBuilder::new(options).build(collection, &mut sink);
    sink.finish();
    print_summary(&result?);
    println!("build store ready at {}", out.display());
    Ok(())
}

fn db_swap(args: DbSwapArgs) -> Result<(), AppError> {
    let config = config::load()?;
    let build = args.from.unwrap_or_else(|| config.build_path());
    let live = config.live_path();
    let mut options = SwapOptions::from_config(&config);
    if args.no_backup {
        options.backup = false;
    }

    let report = swap_into_place(&build, &live, &options)?;
    println!("live store: {}", report.live.display());
    match report.backup {
        Some(backup) => println!("previous store backed up to {}", backup.display()),
        None => println!("no backup taken"),
    }
    Ok(())
}

fn db_stats() -> Result<(), AppError> {
    let config = config::load()?;
    let live = config.live_path();
    if !live.is_file() {
        return Err(AppError::MissingStore { path: live });
    }
    let conn = open_or_create(&live)?;
    let counts = StoreCounts::load(&conn)?;
    let summary = json!({
        "path": live.display().to_string(),
        "counts": counts,
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

fn db_search(args: DbSearchArgs) -> Result<(), AppError> {
    let DbSearchArgs {
        query,
        table,
        limit,
        details,
        pretty,
    } = args;
    let config = config::load()?;
    let live = config.live_path();
    if !live.is_file() {
        return Err(AppError::MissingStore { path: live });
    }
    let conn = open_or_create(&live)?;
    let hits = search_reactions(&conn, &query, table, limit)?;

    let mut rows = Vec::with_capacity(hits.len());
    for hit in hits {
        let row = if details {
            match reaction_with_measurements(&conn, hit.id)? {
                Some(detail) => serde_json::to_value(detail)?,
                None => continue,
            }
        } else {
            serde_json::to_value(hit)?
        };
        rows.push(row);
    }
    emit_json_rows(&rows, pretty)
}

fn emit_json_rows(rows: &[Value], pretty: bool) -> Result<(), AppError> {
    if pretty {
        let array = Value::Array(rows.to_vec());
        println!("{}", serde_json::to_string_pretty(&array)?);
    } else {
        for row in rows {
            println!("{}", serde_json::to_string(row)?);
        }
    }
    Ok(())
}

fn print_summary(summary: &RebuildSummary) {
    println!(
        "tasks={} failed={} batches={} rows_imported={} validation_updates={}{}",
        summary.tasks,
        summary.failed,
        summary.batches,
        summary.rows_imported,
        summary.validation_updates,
        if summary.recreated { " (store recreated)" } else { "" }
    );
}

fn ensure_parent(path: &Path) -> Result<(), AppError> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            fs::create_dir_all(parent).map_err(|source| AppError::CreateDir {
                path: parent.to_path_buf(),
                source,
            })
        }
        _ => Ok(()),
    }
}

/// Drives a progress bar from `PROGRESS` events and logs every event above it.
struct ProgressBarSink {
    bar: ProgressBar,
}

impl ProgressBarSink {
    fn new() -> Self {
        Self {
            bar: make_progress_bar(),
        }
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl ProgressSink for ProgressBarSink {
    fn emit(&mut self, event: RebuildEvent) {
        match &event {
            RebuildEvent::Started { total, .. } => {
                self.bar.set_length(*total as u64);
                self.bar.set_position(0);
            }
            RebuildEvent::BatchCompleted {
                processed,
                imported,
                validation_updates,
                ..
            } => {
                self.bar.set_position(*processed as u64);
                self.bar.set_message(format!(
                    "imported={imported} validated={validation_updates}"
                ));
            }
            _ => {}
        }
        self.bar.suspend(|| log_event(&event));
    }
}

fn make_progress_bar() -> ProgressBar {
    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::with_template(
            "{spinner:.cyan} [{elapsed_precise}] {pos}/{len} sources ({eta}) {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_draw_target(ProgressDrawTarget::stderr_with_hz(12));
    pb.enable_steady_tick(Duration::from_millis(120));
    pb
}
