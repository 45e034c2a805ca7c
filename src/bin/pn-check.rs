use anyhow::{Context, Result, bail};
use serde::Serialize;

use pn_stubborn::analysis::{Outcome, ReachabilityChecker, SearchOrder};
use pn_stubborn::config::CheckerConfig;
use pn_stubborn::net::io::{load_net, write_by_extension};
use pn_stubborn::options::Options;
use pn_stubborn::query::parse_query;
use pn_stubborn::stubborn::{IncidenceIndex, ReductionKind};

#[derive(Debug, Serialize)]
struct Report<'a> {
    net: &'a str,
    places: usize,
    transitions: usize,
    initial_tokens: u64,
    reduction: ReductionKind,
    search: SearchOrder,
    results: &'a [Outcome],
}

fn main() {
    if std::env::var("PN_LOG").is_ok() {
        let e = env_logger::Env::new()
            .filter("PN_LOG")
            .write_style("PN_LOG_STYLE");
        env_logger::init_from_env(e);
    }

    if let Err(err) = run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let mut options = match Options::parse_from_str(&std::env::var("PN_FLAGS").unwrap_or_default())
    {
        Ok(options) => options,
        Err(err) => bail!("invalid PN_FLAGS: {err}"),
    };
    log::debug!("PN options from environment: {:?}", options);

    let args: Vec<String> = std::env::args().skip(1).collect();
    match Options::parse_from_args(&args) {
        Ok(cli) => options.merge(cli),
        Err(err) => bail!("{err}"),
    }

    let mut config = CheckerConfig::load_from_file(&options.config)?;
    options.apply_to(&mut config);
    log::debug!("effective configuration: {:?}", config);

    let Some(net_path) = options.net.as_deref() else {
        bail!("no net given, use --net FILE");
    };
    if options.queries.is_empty() {
        bail!("no query given, use --query \"EF ...\"");
    }

    let net = load_net(net_path).with_context(|| format!("Failed to load net: {net_path}"))?;
    net.log_diagnostics();
    if net.deadlocked(&net.initial_marking()) {
        log::warn!("initial marking of {} is already dead", net_path);
    }
    let index = IncidenceIndex::build(&net).context("Failed to index net")?;
    log::info!(
        "loaded {} with {} places and {} transitions",
        net_path,
        net.places_len(),
        net.transitions_len()
    );

    let queries = options
        .queries
        .iter()
        .map(|text| parse_query(text).with_context(|| format!("Failed to parse query: {text}")))
        .collect::<Result<Vec<_>>>()?;

    let checker = ReachabilityChecker::new(&net, &index, config.search_config());
    let results = checker
        .check_all(queries)
        .into_iter()
        .zip(&options.queries)
        .map(|(result, text)| result.with_context(|| format!("Failed to check query: {text}")))
        .collect::<Result<Vec<_>>>()?;

    for outcome in &results {
        println!("{}: {}", outcome.query, outcome.verdict);
        if let Some(trace) = &outcome.trace {
            println!("  trace: {}", trace.join(" "));
        }
        println!(
            "  explored {} states, stored {}, fired {} transitions{}",
            outcome.stats.explored,
            outcome.stats.stored,
            outcome.stats.fired,
            if outcome.stats.truncated { " (truncated)" } else { "" }
        );
    }

    let report = Report {
        net: net_path,
        places: net.places_len(),
        transitions: net.transitions_len(),
        initial_tokens: net.initial_marking().total_tokens(),
        reduction: config.reduction,
        search: config.search,
        results: &results,
    };
    write_by_extension(&options.output, &report)
        .with_context(|| format!("Failed to write report: {}", options.output))?;

    if let Some(dot) = &options.dot {
        if results.len() > 1 {
            log::warn!("several queries given, writing the state space of the first one");
        }
        if let Some(space) = results.first().and_then(|o| o.state_space.as_ref()) {
            space
                .write_dot(&net, dot)
                .with_context(|| format!("Failed to write DOT file: {dot}"))?;
        }
    }
    Ok(())
}
