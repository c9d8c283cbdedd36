use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, bail};

use replay_core::orchestrator::{self, OrchestratorState};
use replay_core::platform::create_platform;
use replay_core::runner::RunState;
use replay_core::settings::Settings;
use replay_core::testset::TestSet;
use replay_core::types::Command;
use replay_core::logger::{self, Level, Record};

struct Args {
    set: PathBuf,
    test: Option<String>,
    stub: bool,
    seed: Option<u64>,
}

fn parse_args() -> Result<Args> {
    let mut set = None;
    let mut test = None;
    let mut stub = false;
    let mut seed = None;

    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--stub" => stub = true,
            "--seed" => {
                let v = it.next().context("--seed needs a value")?;
                seed = Some(v.parse().with_context(|| format!("bad seed '{}'", v))?);
            }
            s if s.starts_with("--") => bail!("unknown flag {}", s),
            _ if set.is_none() => set = Some(PathBuf::from(&arg)),
            _ if test.is_none() => test = Some(arg.clone()),
            _ => bail!("unexpected argument '{}'", arg),
        }
    }

    let Some(set) = set else {
        bail!("usage: replay <testset.json> [test-name] [--stub] [--seed N]");
    };
    Ok(Args { set, test, stub, seed })
}

/// Render one sink record with ANSI colors.
fn print_record(line: &str) {
    let Some(record) = Record::parse(line) else {
        println!("{}", line);
        return;
    };
    let level_color = match record.level {
        Level::Error => "\x1b[31m",
        Level::Warn => "\x1b[33m",
        Level::Info => "\x1b[0m",
    };
    let prefix_color = match record.color {
        logger::COLOR_GRAY => "\x1b[90m",
        logger::COLOR_BLUE => "\x1b[34m",
        logger::COLOR_GREEN => "\x1b[32m",
        _ => "\x1b[0m",
    };
    if record.prefix.is_empty() {
        println!("\x1b[90m{}\x1b[0m {}{}\x1b[0m", record.ts, level_color, record.msg);
    } else {
        println!(
            "\x1b[90m{}\x1b[0m {}[{}]\x1b[0m {}{}\x1b[0m",
            record.ts, prefix_color, record.prefix, level_color, record.msg
        );
    }
}

fn run(args: Args) -> Result<bool> {
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    let mut settings = Settings::load(&cwd.join("settings.json"));
    if args.seed.is_some() {
        settings.seed = args.seed;
    }

    logger::init(&cwd.join(&settings.log_dir));
    let (log_tx, log_rx) = mpsc::channel::<String>();
    logger::set_sink(log_tx);

    let set = TestSet::load(Path::new(&args.set))
        .with_context(|| format!("loading {}", args.set.display()))?;
    let test = match &args.test {
        Some(name) => set.test(name).with_context(|| format!("no test named '{}'", name))?,
        None => set.tests().first().context("test set has no tests")?,
    }
    .clone();
    logger::info(&format!(
        "loaded '{}' ({} step(s), {} pattern(s))",
        test.name,
        test.steps.len(),
        set.store().len()
    ));

    let platform = create_platform(args.stub);
    let handle = orchestrator::spawn(test, settings, platform);
    handle.commands.send(Command::Run)?;

    // Poll until the worker has produced a report or refused to start
    let report = loop {
        while let Ok(line) = log_rx.try_recv() {
            print_record(&line);
        }
        let status = handle
            .status
            .lock()
            .map_err(|_| anyhow::anyhow!("run status lock poisoned"))?
            .clone();
        if let Some(err) = status.error {
            bail!(err);
        }
        if status.state == OrchestratorState::Stopped {
            if let Some(report) = status.last_report {
                break report;
            }
        }
        thread::sleep(Duration::from_millis(50));
    };

    handle.commands.send(Command::Quit).ok();
    handle.thread.join().map_err(|_| anyhow::anyhow!("run worker panicked"))?;
    while let Ok(line) = log_rx.try_recv() {
        print_record(&line);
    }

    let ms = report.elapsed.as_millis();
    match report.state {
        RunState::Completed => println!("test took {} ms, {} step(s), {} jump(s)", ms, report.records.len(), report.jumps),
        RunState::Aborted(i) => println!(
            "aborted at step {} after {} ms: {}",
            i,
            ms,
            report.failure_reason().unwrap_or("unknown")
        ),
        RunState::Cancelled(i) => println!("cancelled before step {} after {} ms", i, ms),
        other => println!("ended in {:?} after {} ms", other, ms),
    }
    Ok(report.succeeded())
}

fn main() -> ExitCode {
    let result = parse_args().and_then(run);
    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(e) => {
            eprintln!("error: {:#}", e);
            ExitCode::from(2)
        }
    }
}
