// src/main.rs

use clap::Parser;
use log::LevelFilter;
use log4rs::{
    append::console::ConsoleAppender,
    append::file::FileAppender,
    config::{Appender, Root},
    encode::pattern::PatternEncoder,
    filter::threshold::ThresholdFilter,
    Config,
};
use school_timetable::{
    render_ics, render_schedule, CalendarOptions, CommandLineInput, OutputFormat, QueryConfig,
    QueryError, ScheduleResponse, TimetableService,
};
use std::fs;

/// Sets up logging configuration.
fn setup_logging(verbose: bool) -> Result<(), Box<dyn std::error::Error>> {
    let log_level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Warn
    };

    let log_file_path = std::env::temp_dir().join("school_timetable.log");
    if let Some(parent) = log_file_path.parent() {
        fs::create_dir_all(parent)?;
    }

    let pattern = if verbose {
        "{d(%Y-%m-%d %H:%M:%S)} [{l}] - {m}{n}"
    } else {
        "{m}{n}"
    };

    let stderr_appender = ConsoleAppender::builder()
        .target(log4rs::append::console::Target::Stderr)
        .encoder(Box::new(PatternEncoder::new(pattern)))
        .build();

    let file_appender = FileAppender::builder()
        .encoder(Box::new(PatternEncoder::new(
            "{d(%Y-%m-%d %H:%M:%S)} [{l}] - {m}{n}",
        )))
        .build(&log_file_path)?;

    let config = Config::builder()
        .appender(Appender::builder().build("stderr", Box::new(stderr_appender)))
        .appender(
            Appender::builder()
                .filter(Box::new(ThresholdFilter::new(LevelFilter::Debug)))
                .build("file", Box::new(file_appender)),
        )
        .build(
            Root::builder()
                .appender("stderr")
                .appender("file")
                .build(log_level),
        )?;

    log4rs::init_config(config)?;
    log::info!("Logging initialized. Log file: {}", log_file_path.display());
    Ok(())
}

/// Looks up the requested schedule and prints it.
async fn run(config: &QueryConfig) -> Result<(), QueryError> {
    let service = TimetableService::from_config(&config.timetable)?;
    let response = service.schedule(&config.identifier, config.refresh).await?;

    match config.format {
        OutputFormat::Json => print_json(&response)?,
        OutputFormat::Ics => {
            let mut options = CalendarOptions::for_semester(chrono::Local::now().naive_local());
            options.location = config.location.clone();
            print!("{}", render_ics(&response.schedule, &options));
        }
        OutputFormat::Markdown => {
            print!("{}", render_schedule(&response.schedule, &config.timetable.bounds));
            if !response.schedule.is_clean() {
                eprintln!(
                    "⚠️  {} contradiction(s) between class and teacher pages.",
                    response.schedule.contradictions.len()
                );
            }
        }
    }
    Ok(())
}

fn print_json(response: &ScheduleResponse) -> Result<(), QueryError> {
    let json = serde_json::to_string_pretty(response).map_err(|e| QueryError::Internal {
        message: format!("failed to serialize schedule: {}", e),
    })?;
    println!("{}", json);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = CommandLineInput::parse();

    setup_logging(cli.verbose)?;

    let config = QueryConfig::resolve(cli)?;

    if let Err(e) = run(&config).await {
        if config.format == OutputFormat::Json {
            let body = serde_json::json!({ "error": e.code(), "message": e.to_string() });
            println!("{}", body);
        }
        return Err(e.into());
    }

    Ok(())
}
