/*!
  Binary for the CLI of orchestra: orc
*/

#![deny(
    missing_debug_implementations,
    missing_copy_implementations,
    trivial_casts,
    trivial_numeric_casts
)]
#![warn(
    missing_docs,
    unused_import_braces,
    unused_qualifications,
    unused_extern_crates,
    variant_size_differences
)]

pub mod cli;
pub mod error;

use std::{
    io::{StdoutLock, Write},
    time::Duration,
};

use clap::Parser;
use cli::{CliApp, DeltaDirection};
use colored::Colorize;
use error::CliError;
use orchestra::{
    config::ExchangeConfig,
    execution::{
        delta_rules::DeltaRules, exchange::UpdateExchange, memory_engine::MemoryEngine,
    },
    io::parser::load_exchange,
    meta::timing::TimedSorting,
    rule_model::relation::RelationKind,
};

fn print_finished_message(time: Duration, staged: usize, total: usize) {
    println!(
        "Reconciliation completed in {}{}. Staged {} of {} updates.",
        time.as_millis().to_string().green().bold(),
        "ms".green().bold(),
        staged.to_string().green().bold(),
        total,
    );
}

fn print_rules(out: &mut StdoutLock, exchange: &UpdateExchange) -> Result<(), CliError> {
    writeln!(out, "{}", "Mapping rules:".bold())?;
    for rule in exchange.rules().all_rules() {
        writeln!(out, "  {rule}")?;
    }

    for code in [exchange.deletion().code(), exchange.insertion().code()] {
        for sequence in code {
            write!(out, "{sequence}")?;
        }
    }

    Ok(())
}

fn print_relations(
    out: &mut StdoutLock,
    exchange: &UpdateExchange,
    engine: &MemoryEngine,
) -> Result<(), CliError> {
    for context in exchange
        .system()
        .catalog()
        .relations_of_kind(RelationKind::Peer)
    {
        let name = context.relation().name();
        let rows = engine.rows(name)?;
        writeln!(
            out,
            "{} {} ({} tuples)",
            context.peer().bold(),
            name.bold(),
            rows.len()
        )?;

        for row in rows {
            let values = row.iter().map(ToString::to_string).collect::<Vec<_>>();
            writeln!(out, "  {name}({})", values.join(", "))?;
        }
    }

    Ok(())
}

fn run(cli: CliApp) -> Result<(), CliError> {
    let config = match &cli.config {
        Some(path) => ExchangeConfig::from_file(path)?,
        None => ExchangeConfig::default(),
    };
    log::debug!("Exchange parameters: {config:?}");

    let file = load_exchange(&cli.file).map_err(|source| CliError::ExchangeLoading {
        filename: cli.file.to_string_lossy().to_string(),
        source,
    })?;

    let mut exchange = UpdateExchange::new(file.system, config)?;
    let mut stdout = std::io::stdout().lock();

    if cli.output.print_rules {
        print_rules(&mut stdout, &exchange)?;
    }

    if let Some(direction) = cli.output.xml {
        let document = match direction {
            DeltaDirection::Insertion => exchange.insertion().serialize(),
            DeltaDirection::Deletion => exchange.deletion().serialize(),
        };
        writeln!(stdout, "{}", document.to_xml_string()?)?;
    }

    let mut engine = exchange.create_engine()?;
    let staged = exchange.stage_updates(&mut engine, &file.updates)?;
    let time = exchange.map_updates(&mut engine)?;

    if cli.output.print_relations {
        print_relations(&mut stdout, &exchange, &engine)?;
    }

    print_finished_message(time, staged, file.updates.len());

    if cli.output.report {
        println!(
            "\n{}",
            engine
                .timing()
                .create_tree_string("orc", TimedSorting::LongestTime)
        );
    }

    Ok(())
}

fn main() {
    let cli = CliApp::parse();

    cli.logging.initialize_logging();
    log::info!("Version: {}", clap::crate_version!());
    log::debug!("Exchange file: {:?}", cli.file);

    run(cli).unwrap_or_else(|err| {
        log::error!("{} {err}", "error:".red().bold());
        std::process::exit(1)
    })
}
