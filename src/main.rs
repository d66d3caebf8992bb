use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use colored::Colorize;
use retprof::config::ProfilerConfig;
use retprof::demo::{Scenario, ScenarioKind};
use retprof::errors::err::ProfileErr;
use retprof::profiler::RetainerProfiler;

fn main() {
    let matches = Command::new("retprof")
        .version("0.1")
        .about("Retainer profiling passes over demonstration heaps")
        .arg(
            Arg::new("scenario")
                .long("scenario")
                .short('s')
                .value_parser(["chain", "shared", "cycle", "threads"])
                .default_value("threads"),
        )
        .arg(
            Arg::new("passes")
                .long("passes")
                .short('p')
                .value_parser(value_parser!(u32).range(1..))
                .default_value("2"),
        )
        .arg(Arg::new("chunk-frames").long("chunk-frames").value_parser(value_parser!(usize)))
        .arg(
            Arg::new("check")
                .long("check")
                .action(ArgAction::SetTrue)
                .help("check every visited object's retainer set after each pass"),
        )
        .arg(Arg::new("verbose").short('v').action(ArgAction::Count))
        .get_matches();

    let level = match matches.get_count("verbose") {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    if let Err(e) = run(&matches) {
        log::error!("{}", e);
        std::process::exit(1);
    }
}

fn run(matches: &ArgMatches) -> Result<(), ProfileErr> {
    let kind: ScenarioKind = matches
        .get_one::<String>("scenario")
        .and_then(|name| name.parse().ok())
        .unwrap_or(ScenarioKind::Threads);
    let passes = matches.get_one::<u32>("passes").copied().unwrap_or(1);

    let mut config = ProfilerConfig::default();
    if let Some(&frames) = matches.get_one::<usize>("chunk-frames") {
        config.chunk_frames = frames;
    }
    config.check_sets |= matches.get_flag("check");

    let mut scenario = Scenario::build(kind)?;
    let mut profiler = RetainerProfiler::new(config);
    println!("{} {} ({} objects)", "scenario".bold(), kind, scenario.heap.len());
    for _ in 0..passes {
        let stats = profiler.profile(&mut scenario.heap)?;
        println!("{}", stats.to_string().dimmed());
    }

    for (name, obj) in &scenario.labels {
        let name = format!("{:<10}", name);
        match profiler.current_retainer_set(&scenario.heap, *obj)? {
            Some(set) => println!("  {} {}", name.cyan(), set.to_string().green()),
            None => println!("  {} {}", name.cyan(), "unreached".red()),
        }
    }
    Ok(())
}
