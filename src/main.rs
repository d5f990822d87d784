//! content-relay - Incremental, cancelable field extraction
//!
//! Entry point for the CLI application.

use anyhow::{bail, Context, Result};
use clap::Parser;
use content_relay::backend::TextFileBackend;
use content_relay::config::{resolve_field, CliArgs, Command, RelayConfig, UnitArg};
use content_relay::fields::{Field, FieldKind, COMPARE_BASE_INDEX};
use content_relay::progress::{
    print_compare_summary, print_extract_summary, print_fields, result_label, CompareProgress,
};
use content_relay::relay::{
    CompareResult, DualStreamComparator, ProgressControl, RequestCoordinator, RequestFlags,
    ResultCode,
};
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<ExitCode> {
    let args = CliArgs::parse();
    setup_logging(args.verbose)?;

    let config = RelayConfig::from_args(&args).context("Invalid configuration")?;

    match &args.command {
        Command::Fields => {
            print_fields(&config.catalog.entries());
            Ok(ExitCode::SUCCESS)
        }
        Command::Extract {
            source,
            field,
            unit,
            find,
            max_chunks,
        } => {
            let field = resolve_field(field)?;
            extract(config, source, field, *unit, find.as_deref(), *max_chunks)
        }
        Command::Compare {
            source_a,
            source_b,
            field,
            progress,
        } => {
            let field = resolve_field(field)?;
            compare(config, source_a, source_b, field, *progress)
        }
    }
}

fn extract(
    config: RelayConfig,
    source: &Path,
    field: Field,
    unit: UnitArg,
    find: Option<&str>,
    max_chunks: Option<usize>,
) -> Result<ExitCode> {
    let backend = Arc::new(TextFileBackend::new(config.encoding));
    let context = config.text_context().shared();
    let show_progress = config.show_progress;
    let mut relay = RequestCoordinator::new(backend, context, Arc::new(config));
    let flags = RequestFlags::default();

    if field.kind() != FieldKind::Streaming {
        let unit_index = match field {
            Field::PageWidth | Field::PageHeight => unit.unit_index(),
            _ => 0,
        };
        let result = relay.submit(source, field.index(), unit_index, None, flags);
        let output = relay
            .value()
            .map(|value| value.to_string())
            .unwrap_or_else(|| relay.text());
        relay.teardown();

        return match result {
            ResultCode::Success(_) => {
                println!("{}", output);
                Ok(ExitCode::SUCCESS)
            }
            ResultCode::Empty => {
                info!(field = field.name(), "Field is empty");
                Ok(ExitCode::SUCCESS)
            }
            ResultCode::IoError => bail!("Failed to read '{}'", source.display()),
            other => bail!("Field '{}' unavailable: {:?}", field.name(), other),
        };
    }

    let started = Instant::now();
    let mut units = 0u64;
    let mut chunks = 0u64;
    let mut found = false;
    let mut unit_index = 0;

    loop {
        match relay.submit(source, field.index(), unit_index, None, flags) {
            ResultCode::Success(_) => {
                let text = relay.text();
                chunks += 1;
                units += text.encode_utf16().count() as u64;
                print!("{}", text);

                found = find.is_some_and(|needle| text.contains(needle));
                let limit = max_chunks.is_some_and(|max| chunks as usize >= max);
                if found || limit {
                    relay.submit(source, field.index(), -1, None, flags);
                    break;
                }
                unit_index += 1;
            }
            ResultCode::Empty => break,
            ResultCode::IoError => {
                relay.teardown();
                bail!("Failed to read '{}'", source.display());
            }
            other => {
                relay.teardown();
                bail!("Field '{}' unavailable: {:?}", field.name(), other);
            }
        }
    }
    println!();

    let stats = relay.stats();
    relay.teardown();

    if show_progress {
        print_extract_summary(field.name(), units, chunks, &stats, started.elapsed());
    }
    if let Some(needle) = find {
        info!(needle, found, "Search finished");
        if !found {
            return Ok(ExitCode::FAILURE);
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn compare(
    config: RelayConfig,
    source_a: &Path,
    source_b: &Path,
    field: Field,
    show: bool,
) -> Result<ExitCode> {
    let backend = Arc::new(TextFileBackend::new(config.encoding));
    let context = config.text_context().shared();
    let show_summary = config.show_progress;
    let mut comparator = DualStreamComparator::new(backend, context, Arc::new(config));

    let mut spinner = (show && show_summary).then(CompareProgress::new);
    let mut report = |units: u64| {
        if let Some(spinner) = spinner.as_mut() {
            spinner.advance(units);
        }
        ProgressControl::Continue
    };

    let result = comparator.compare(
        source_a,
        source_b,
        COMPARE_BASE_INDEX + field.index(),
        Some(&mut report),
    );
    if let Some(spinner) = &spinner {
        spinner.finish_and_clear();
    }

    let summary = comparator.last_summary();
    comparator.teardown();

    if show_summary {
        print_compare_summary(source_a, source_b, &summary);
    } else {
        println!("{}", result_label(result));
    }

    match result {
        CompareResult::Eq | CompareResult::EqText => Ok(ExitCode::SUCCESS),
        CompareResult::NotEq => Ok(ExitCode::from(1)),
        CompareResult::Next => bail!("Field '{}' cannot be compared", field.name()),
        CompareResult::Error | CompareResult::Abort => {
            bail!("Comparison {}", result_label(result))
        }
    }
}

fn setup_logging(verbose: bool) -> Result<()> {
    let filter = if verbose {
        EnvFilter::new("content_relay=debug,warn")
    } else {
        EnvFilter::new("content_relay=info,warn")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    Ok(())
}
