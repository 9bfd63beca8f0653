//! Plans a dataset from the command line and prints the result.
//!
//! Run with: cargo run --bin dispatch-report -- --dataset SALT_LAKE --time 10:30:00
//!
//! A custom dataset is three header-less CSV files:
//! `--parcels parcels.csv --addresses addresses.csv --distances distances.csv`.

use clap::{Arg, ArgMatches, Command};
use std::process;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

use parcel_dispatch::config::DispatchConfig;
use parcel_dispatch::console;
use parcel_dispatch::demo_data::{available_datasets, generate_by_name};
use parcel_dispatch::domain::format_time_of_day;
use parcel_dispatch::error::DispatchError;
use parcel_dispatch::ingest::Dataset;
use parcel_dispatch::planner::Dispatcher;

const DATASET_ARG: &str = "dataset";
const PARCELS_ARG: &str = "parcels";
const ADDRESSES_ARG: &str = "addresses";
const DISTANCES_ARG: &str = "distances";
const CONFIG_ARG: &str = "config";
const TIME_ARG: &str = "time";
const JSON_ARG: &str = "json";

fn command() -> Command {
    Command::new("dispatch-report")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Plans parcel deliveries and reports routes and parcel status")
        .arg(
            Arg::new(DATASET_ARG)
                .help("Demo dataset name")
                .short('d')
                .long(DATASET_ARG)
                .value_parser(available_datasets().to_vec())
                .conflicts_with(PARCELS_ARG),
        )
        .arg(
            Arg::new(PARCELS_ARG)
                .help("Parcel table (CSV)")
                .long(PARCELS_ARG)
                .requires_all([ADDRESSES_ARG, DISTANCES_ARG]),
        )
        .arg(Arg::new(ADDRESSES_ARG).help("Address table (CSV)").long(ADDRESSES_ARG))
        .arg(Arg::new(DISTANCES_ARG).help("Distance table (CSV)").long(DISTANCES_ARG))
        .arg(
            Arg::new(CONFIG_ARG)
                .help("Dispatch configuration (JSON)")
                .short('c')
                .long(CONFIG_ARG),
        )
        .arg(
            Arg::new(TIME_ARG)
                .help("Print every parcel's status at this time of day (HH:MM:SS)")
                .short('t')
                .long(TIME_ARG),
        )
        .arg(
            Arg::new(JSON_ARG)
                .help("Print the plan summary as JSON")
                .long(JSON_ARG)
                .action(clap::ArgAction::SetTrue),
        )
}

fn load_config(matches: &ArgMatches) -> Result<DispatchConfig, DispatchError> {
    match matches.get_one::<String>(CONFIG_ARG) {
        Some(path) => DispatchConfig::from_json_file(path),
        None => Ok(DispatchConfig::default()),
    }
}

fn load_dataset(matches: &ArgMatches, config: &DispatchConfig) -> Result<Dataset, DispatchError> {
    let path = |name: &str| matches.get_one::<String>(name).cloned().unwrap_or_default();
    if matches.contains_id(PARCELS_ARG) {
        return Dataset::from_paths(
            path(PARCELS_ARG),
            path(ADDRESSES_ARG),
            path(DISTANCES_ARG),
            &config.ingest,
        );
    }
    let name = matches
        .get_one::<String>(DATASET_ARG)
        .map(String::as_str)
        .unwrap_or("SALT_LAKE");
    generate_by_name(name)
}

fn run(matches: &ArgMatches) -> Result<(), DispatchError> {
    let config = load_config(matches)?;
    let dataset = load_dataset(matches, &config)?;
    let json = matches.get_flag(JSON_ARG);

    if !json {
        console::print_banner();
        console::print_config(
            &dataset.name,
            config.vehicle_count,
            dataset.parcels.len(),
            dataset.distances.len(),
        );
    }

    let started = Instant::now();
    let mut dispatcher = Dispatcher::new(dataset, config)?;
    let summary = dispatcher.plan()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        console::print_plan_ended(started.elapsed(), &summary);
        for vehicle in &summary.vehicles {
            println!(
                "  Vehicle {} │ {} → {} │ {:>6.1} │ {:?}",
                vehicle.id,
                format_time_of_day(vehicle.start_time),
                vehicle.return_time.map(format_time_of_day).unwrap_or_default(),
                vehicle.total_distance,
                vehicle.route
            );
        }
        println!();
    }

    if let Some(time) = matches.get_one::<String>(TIME_ARG) {
        let snapshots = dispatcher.status_at(time)?;
        if json {
            println!("{}", serde_json::to_string_pretty(&snapshots)?);
        } else {
            println!("  Status at {}", time);
            console::print_status_table(&snapshots);
        }
    }
    Ok(())
}

fn main() {
    let filter = EnvFilter::from_default_env();
    let filter = match "parcel_dispatch=warn".parse() {
        Ok(directive) => filter.add_directive(directive),
        Err(_) => filter,
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let matches = command().get_matches();
    if let Err(err) = run(&matches) {
        eprintln!("dispatch-report: {}", err);
        process::exit(1);
    }
}
