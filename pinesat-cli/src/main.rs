//! Command line front end of the Pinesat SAT solver.
use std::fs::File;
use std::io::{self, Write};
use std::path::Path;
use std::process::exit;

use anyhow::{Context as _, Error};
use clap::{App, Arg};
use log::error;

use pinesat::{ProofFormat, SolveResult, Solver};

use pinesat_dimacs::{write_witness, DimacsParser, ParserMode};

fn main() {
    match run() {
        Ok(status) => exit(status),
        Err(err) => {
            error!("{:#}", err);
            exit(1);
        }
    }
}

fn run() -> Result<i32, Error> {
    let matches = App::new("pinesat")
        .version(env!("CARGO_PKG_VERSION"))
        .about("A CDCL based SAT solver with inprocessing")
        .arg(Arg::with_name("INPUT").help("DIMACS CNF input file, stdin when omitted"))
        .arg(
            Arg::with_name("strict")
                .long("strict")
                .help("Require the DIMACS header counts to match"),
        )
        .arg(
            Arg::with_name("quiet")
                .long("quiet")
                .short("q")
                .help("Suppress all informational output"),
        )
        .arg(
            Arg::with_name("verbose")
                .long("verbose")
                .short("v")
                .multiple(true)
                .help("Increase the logging verbosity"),
        )
        .arg(
            Arg::with_name("log")
                .long("log")
                .help("Enable debug logging"),
        )
        .arg(
            Arg::with_name("report")
                .long("report")
                .help("Periodic progress reports (implied by --verbose)"),
        )
        .arg(
            Arg::with_name("stats")
                .long("stats")
                .help("Print statistics after solving"),
        )
        .arg(
            Arg::with_name("color")
                .long("color")
                .overrides_with("no-color")
                .help("Force colored logging output"),
        )
        .arg(
            Arg::with_name("no-color")
                .long("no-color")
                .help("Disable colored logging output"),
        )
        .arg(
            Arg::with_name("binary")
                .long("binary")
                .help("Use the binary framing for DRAT/FRAT/LRAT proofs"),
        )
        .arg(
            Arg::with_name("config")
                .long("config")
                .takes_value(true)
                .possible_values(&["default", "plain", "sat", "unsat"])
                .help("Apply a bundled option set"),
        )
        .arg(
            Arg::with_name("option")
                .long("option")
                .short("O")
                .takes_value(true)
                .multiple(true)
                .number_of_values(1)
                .help("Set a solver option as name=value"),
        )
        .arg(proof_arg("drat", "Write a DRAT proof to the given file"))
        .arg(proof_arg("frat", "Write an FRAT proof to the given file"))
        .arg(proof_arg("lrat", "Write an LRAT proof to the given file"))
        .arg(proof_arg("veripb", "Write a VeriPB proof to the given file"))
        .arg(proof_arg("idrup", "Write an IDRUP proof to the given file"))
        .arg(proof_arg("lidrup", "Write an LIDRUP proof to the given file"))
        .get_matches();

    let quiet = matches.is_present("quiet");
    let verbose = matches.occurrences_of("verbose");

    let mut logger = env_logger::Builder::from_default_env();
    logger.format_timestamp(None);
    if quiet {
        logger.filter_level(log::LevelFilter::Error);
    } else if matches.is_present("log") {
        logger.filter_level(log::LevelFilter::Debug);
    } else if verbose > 0 || matches.is_present("report") {
        logger.filter_level(log::LevelFilter::Info);
    } else {
        logger.filter_level(log::LevelFilter::Warn);
    }
    if matches.is_present("no-color") {
        logger.write_style(env_logger::WriteStyle::Never);
    } else if matches.is_present("color") {
        logger.write_style(env_logger::WriteStyle::Always);
    }
    logger.init();

    let mut solver = Solver::new();

    if let Some(config) = matches.value_of("config") {
        solver.configure(config)?;
    }
    if let Some(options) = matches.values_of("option") {
        for option in options {
            let mut split = option.splitn(2, '=');
            let name = split.next().unwrap_or("");
            let value: i64 = split
                .next()
                .with_context(|| format!("missing value in option '{}'", option))?
                .parse()
                .with_context(|| format!("malformed value in option '{}'", option))?;
            solver.set_option(name, value)?;
        }
    }

    let binary = matches.is_present("binary");
    let proofs = [
        ("drat", ProofFormat::Drat, ProofFormat::BinaryDrat),
        ("frat", ProofFormat::Frat, ProofFormat::BinaryFrat),
        ("lrat", ProofFormat::Lrat, ProofFormat::BinaryLrat),
        ("veripb", ProofFormat::VeriPb, ProofFormat::VeriPb),
        ("idrup", ProofFormat::Idrup, ProofFormat::Idrup),
        ("lidrup", ProofFormat::Lidrup, ProofFormat::Lidrup),
    ];
    for &(name, ascii_format, binary_format) in proofs.iter() {
        if let Some(path) = matches.value_of_os(name) {
            let format = if binary { binary_format } else { ascii_format };
            solver
                .write_proof_file(Path::new(path), format)
                .with_context(|| format!("could not open proof file {:?}", path))?;
        }
    }

    let mode = if matches.is_present("strict") {
        ParserMode::Strict
    } else {
        ParserMode::Relaxed
    };
    let mut parser = DimacsParser::with_mode(mode);

    {
        let mut load = |input: &mut dyn io::Read| -> Result<(), Error> {
            use io::BufRead;
            let mut buffer = io::BufReader::new(input);
            loop {
                let data = buffer.fill_buf()?;
                if data.is_empty() {
                    break;
                }
                parser.parse_chunk(data)?;
                let len = data.len();
                buffer.consume(len);
                solver.add_formula(&parser.take_formula());
            }
            parser.eof()?;
            solver.add_formula(&parser.take_formula());
            parser.check_header()?;
            Ok(())
        };

        match matches.value_of_os("INPUT") {
            Some(path) => {
                let mut file = File::open(path)
                    .with_context(|| format!("could not open input file {:?}", path))?;
                load(&mut file)?
            }
            None => {
                let stdin = io::stdin();
                let mut lock = stdin.lock();
                load(&mut lock)?
            }
        }
    }

    // Options embedded in the input as `c --name=value` comments.
    for option in parser.embedded_options() {
        if let Ok(value) = option.value.parse() {
            if let Err(err) = solver.set_option(&option.name, value) {
                log::warn!("ignoring embedded option: {}", err);
            }
        }
    }

    let result = solver.solve();

    let stdout = io::stdout();
    let mut stdout = stdout.lock();

    match result {
        SolveResult::Satisfiable => {
            writeln!(stdout, "s SATISFIABLE")?;
            let model = solver.model().unwrap_or_default();
            write_witness(&mut stdout, &model)?;
        }
        SolveResult::Unsatisfiable => {
            writeln!(stdout, "s UNSATISFIABLE")?;
        }
        SolveResult::Interrupted => {
            writeln!(stdout, "s UNKNOWN")?;
        }
    }

    solver.close_proof();

    if matches.is_present("stats") {
        solver.log_stats();
    }

    Ok(result.status())
}

fn proof_arg<'a, 'b>(name: &'a str, help: &'a str) -> Arg<'a, 'b> {
    Arg::with_name(name)
        .long(name)
        .takes_value(true)
        .value_name("FILE")
        .help(help)
}
