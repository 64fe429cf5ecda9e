use anyhow::{Context, Result};
use clap::Parser;
use std::io::{self, BufWriter, Write};
use tracing_subscriber::EnvFilter;

use functor_pool::FunctorPool;

mod cli;
mod platform;
mod readers;
mod transforms;

use cli::Cli;
use platform::{ExitCode, SignalHandler, UntilTerminated};
use transforms::LineTransform;

fn init_logging(cli: &Cli) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cli.log_level()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn run(cli: &Cli) -> Result<()> {
    let config = cli.pool_config()?;
    let inputs = readers::open_inputs(&cli.files)?;

    let mut pool = FunctorPool::with_config(&config, LineTransform::new(cli.transform))?;
    pool.start()?;
    pool.until_all_ready()?;
    tracing::info!(
        workers = config.num_workers,
        chunk_size = config.chunk_size,
        transform = ?cli.transform,
        "processing input"
    );

    let mut read_error = None;
    {
        let stdout = io::stdout();
        let mut output = BufWriter::new(stdout.lock());
        let lines = UntilTerminated::new(readers::lines(inputs, &mut read_error));

        for line in pool.imap(lines, config.chunk_size)? {
            writeln!(output, "{}", line?)?;
        }
        output.flush()?;
    }

    if let Some(err) = read_error {
        return Err(err).context("failed to read input");
    }

    if cli.stats {
        let stats = pool.stats();
        eprintln!(
            "fpmap: {} chunks dispatched, {} released, {} lines written",
            stats.chunks_dispatched, stats.chunks_released, stats.items_yielded
        );
    }

    pool.shutdown()?;
    Ok(())
}

fn is_broken_pipe(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        cause
            .downcast_ref::<io::Error>()
            .is_some_and(|io_err| io_err.kind() == io::ErrorKind::BrokenPipe)
    })
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            if err.use_stderr() {
                ExitCode::InvalidUsage.exit();
            }
            ExitCode::Success.exit();
        }
    };

    init_logging(&cli);

    let _signal_handler = match SignalHandler::new() {
        Ok(handler) => handler,
        Err(e) => {
            eprintln!("fpmap: Failed to initialize signal handling: {}", e);
            ExitCode::GeneralError.exit();
        }
    };

    if let Err(err) = run(&cli) {
        if is_broken_pipe(&err) {
            ExitCode::SignalPipe.exit();
        }
        eprintln!("fpmap: Error: {:#}", err);
        ExitCode::GeneralError.exit();
    }

    if let Some(code) = SignalHandler::termination_exit_code() {
        code.exit();
    }
    ExitCode::Success.exit();
}
