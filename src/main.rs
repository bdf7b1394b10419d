use std::{env, process::ExitCode, time::Instant};

use cooc_matrix::{Fallible, LineDocuments, LinkLineExtractor, TermDocBuilder};
use tracing_subscriber::EnvFilter;

const THREADS_ENV: &str = "COOC_THREADS";

fn print_usage() {
    eprintln!("Usage: cooc-build <links-file> <out-dir> <save-name> [num-threads]");
    eprintln!("Input lines: <prefix>_<id>\\t<entity> <entity> ...");
    eprintln!("Writes <out-dir>/<save-name>.{{lex,colptr,rowidx,val,doc}}");
    eprintln!("num-threads falls back to ${THREADS_ENV}, then to the number of cores.");
}

struct Args {
    links_path: String,
    out_dir: String,
    save_name: String,
    threads: Option<usize>,
}

fn parse_threads(raw: &str) -> Result<usize, String> {
    match raw.parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(format!("thread count must be a positive integer, got '{raw}'")),
    }
}

fn parse_args() -> Result<Option<Args>, String> {
    let mut positional = Vec::new();
    for a in env::args().skip(1) {
        match a.as_str() {
            "-h" | "--help" => return Ok(None),
            _ => positional.push(a),
        }
    }
    if !(3..=4).contains(&positional.len()) {
        return Err(format!("expected 3 or 4 arguments, got {}", positional.len()));
    }
    let threads = match positional.get(3) {
        Some(raw) => Some(parse_threads(raw)?),
        None => match env::var(THREADS_ENV) {
            Ok(raw) => Some(parse_threads(&raw)?),
            Err(_) => None,
        },
    };
    let mut positional = positional.into_iter();
    // length checked above
    let mut next = || positional.next().unwrap_or_default();
    Ok(Some(Args {
        links_path: next(),
        out_dir: next(),
        save_name: next(),
        threads,
    }))
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = match parse_args() {
        Ok(Some(args)) => args,
        Ok(None) => {
            print_usage();
            return ExitCode::SUCCESS;
        }
        Err(msg) => {
            eprintln!("[error] {msg}");
            print_usage();
            return ExitCode::from(2);
        }
    };

    let program_start = Instant::now();
    let lines = match LineDocuments::open(&args.links_path) {
        Ok(lines) => lines,
        Err(e) => {
            tracing::error!(path = %args.links_path, error = %e, "cannot open links file");
            return ExitCode::FAILURE;
        }
    };

    // unreadable lines are recorded as failures like malformed ones
    let mut builder = TermDocBuilder::new(lines, Fallible(LinkLineExtractor));
    if let Some(threads) = args.threads {
        builder = builder.num_workers(threads);
    }
    let (matrix, report) = match builder.build_with_report() {
        Ok(built) => built,
        Err(e) => {
            tracing::error!(error = %e, "build failed");
            return ExitCode::FAILURE;
        }
    };
    if !report.is_clean() {
        tracing::warn!(
            failures = report.failures.len(),
            "some documents could not be processed"
        );
    }

    if let Err(e) = matrix.save(&args.out_dir, &args.save_name) {
        tracing::error!(dir = %args.out_dir, save_name = %args.save_name, error = %e, "save failed");
        return ExitCode::FAILURE;
    }
    tracing::info!(
        matrix = %matrix,
        skipped = report.skipped,
        dir = %args.out_dir,
        elapsed_ms = program_start.elapsed().as_millis() as u64,
        "saved"
    );
    ExitCode::SUCCESS
}
