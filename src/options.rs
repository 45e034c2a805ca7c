//! Parsing Options.
//! `--net {file}` and one or more `--query {text}`; reduction and search
//! settings override the values read from `--config`.

use clap::{Arg, ArgAction, Command};
use std::error::Error;

use crate::analysis::SearchOrder;
use crate::config::CheckerConfig;
use crate::stubborn::ReductionKind;

fn make_options_parser() -> clap::Command {
    let parser = Command::new("pn-check")
        .no_binary_name(true)
        .version("v0.1.0")
        .arg(
            Arg::new("net")
                .short('n')
                .long("net")
                .value_name("FILE")
                .help("Petri net in JSON or RON format"),
        )
        .arg(
            Arg::new("query")
                .short('q')
                .long("query")
                .value_name("QUERY")
                .action(ArgAction::Append)
                .help("Reachability query, e.g. \"EF deadlock\" or \"AG p0 + p1 == 1\""),
        )
        .arg(
            Arg::new("reduction")
                .short('r')
                .long("reduction")
                .help("Partial order reduction")
                .value_parser(ReductionKind::NAMES),
        )
        .arg(
            Arg::new("search")
                .short('s')
                .long("search")
                .help("Search order")
                .value_parser(["dfs", "bfs"]),
        )
        .arg(
            Arg::new("state-limit")
                .long("state-limit")
                .value_name("N")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .default_value("pn-check.toml"),
        )
        .arg(
            Arg::new("output")
                .short('o')
                .long("output")
                .value_name("FILE")
                .help("Path to file where the check report will be stored (.json or .ron)")
                .default_value("report.json"),
        )
        .arg(
            Arg::new("dot")
                .long("dot")
                .value_name("FILE")
                .help("Write the explored state space as DOT"),
        );
    parser
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Options {
    pub net: Option<String>,
    pub queries: Vec<String>,
    pub reduction: Option<ReductionKind>,
    pub search: Option<SearchOrder>,
    pub state_limit: Option<usize>,
    pub config: String,
    pub output: String,
    pub dot: Option<String>,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            net: None,
            queries: Vec::new(),
            reduction: None,
            search: None,
            state_limit: None,
            config: "pn-check.toml".to_string(),
            output: "report.json".to_string(),
            dot: None,
        }
    }
}

impl Options {
    pub fn parse_from_str(s: &str) -> Result<Self, Box<dyn Error>> {
        let flags = shellwords::split(s)?;
        Self::parse_from_args(&flags)
    }

    pub fn parse_from_args(flags: &[String]) -> Result<Self, Box<dyn Error>> {
        let app = make_options_parser();
        let matches = app.try_get_matches_from(flags.iter())?;

        let reduction = match matches.get_one::<String>("reduction") {
            Some(name) => Some(name.parse::<ReductionKind>()?),
            None => None,
        };
        let search = match matches.get_one::<String>("search") {
            Some(name) => Some(name.parse::<SearchOrder>()?),
            None => None,
        };
        let queries = matches
            .get_many::<String>("query")
            .map(|values| values.cloned().collect())
            .unwrap_or_default();

        Ok(Options {
            net: matches.get_one::<String>("net").cloned(),
            queries,
            reduction,
            search,
            state_limit: matches.get_one::<usize>("state-limit").copied(),
            config: matches
                .get_one::<String>("config")
                .cloned()
                .unwrap_or_else(|| "pn-check.toml".to_string()),
            output: matches
                .get_one::<String>("output")
                .cloned()
                .unwrap_or_else(|| "report.json".to_string()),
            dot: matches.get_one::<String>("dot").cloned(),
        })
    }

    /// 用 `other` 中显式给出的值覆盖本选项。
    pub fn merge(&mut self, other: Options) {
        let defaults = Options::default();
        if other.net.is_some() {
            self.net = other.net;
        }
        self.queries.extend(other.queries);
        if other.reduction.is_some() {
            self.reduction = other.reduction;
        }
        if other.search.is_some() {
            self.search = other.search;
        }
        if other.state_limit.is_some() {
            self.state_limit = other.state_limit;
        }
        if other.config != defaults.config {
            self.config = other.config;
        }
        if other.output != defaults.output {
            self.output = other.output;
        }
        if other.dot.is_some() {
            self.dot = other.dot;
        }
    }

    /// 命令行优先于配置文件。
    pub fn apply_to(&self, config: &mut CheckerConfig) {
        if let Some(reduction) = self.reduction {
            config.reduction = reduction;
        }
        if let Some(search) = self.search {
            config.search = search;
        }
        if self.state_limit.is_some() {
            config.state_limit = self.state_limit;
        }
        if self.dot.is_some() {
            config.record_graph = true;
        }
    }
}
