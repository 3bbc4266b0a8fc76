use aipfilter::dsl::{
    self, Accept, Factor, Filter, Function, Member, Restriction, Sequence, Simple, Term, Visitor,
};
use anyhow::{Context, Result};
use clap::Parser;
use rayon::prelude::*;
use serde::Serialize;
use std::convert::Infallible;
use std::io::{BufRead, Write};
use std::path::PathBuf;

use crate::config::{AppConfig, OutputFormat};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Filter expressions to parse. A leading `-` is negation, so options
    /// have no short forms and go before the expressions.
    #[arg(allow_hyphen_values = true)]
    pub expressions: Vec<String>,

    /// Read expressions from a file, one per line ("-" for stdin)
    #[arg(long)]
    pub file: Option<PathBuf>,

    /// Configuration file (YAML)
    #[arg(long, env = "AIPFILTER_CONFIG")]
    pub config: Option<PathBuf>,

    /// Output format
    #[arg(long, value_enum)]
    pub format: Option<OutputFormat>,

    /// Maximum nesting of groups and call arguments
    #[arg(long)]
    pub max_depth: Option<usize>,

    /// Print visitor statistics instead of the tree
    #[arg(long)]
    pub stats: bool,

    /// Number of threads (default: all cores)
    #[arg(long)]
    pub threads: Option<usize>,

    /// Enable verbose output
    #[arg(long)]
    pub verbose: bool,
}

impl Cli {
    /// Apply command-line overrides on top of the loaded configuration.
    pub fn apply(&self, mut config: AppConfig) -> AppConfig {
        if let Some(format) = self.format {
            config.format = format;
        }
        if let Some(max_depth) = self.max_depth {
            config.parser.max_depth = max_depth;
        }
        config.stats |= self.stats;
        config
    }
}

/// Collect expressions from the command line and the `--file` input.
/// Blank lines and lines starting with `#` are skipped.
pub fn load_expressions(cli: &Cli) -> Result<Vec<String>> {
    let mut expressions = cli.expressions.clone();

    if let Some(path) = &cli.file {
        let reader: Box<dyn BufRead> = if path.as_os_str() == "-" {
            Box::new(std::io::stdin().lock())
        } else {
            let file = std::fs::File::open(path)
                .with_context(|| format!("Input: Failed to open {:?}", path))?;
            Box::new(std::io::BufReader::new(file))
        };
        for line in reader.lines() {
            let line = line.context("Input: Failed to read expression")?;
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') {
                continue;
            }
            expressions.push(trimmed.to_string());
        }
    }

    Ok(expressions)
}

/// Parse every expression in parallel, keeping input order.
pub fn parse_all(parser: &dsl::Parser, expressions: &[String]) -> Vec<Result<Filter, dsl::Error>> {
    expressions
        .par_iter()
        .map(|expression| parser.parse(expression))
        .collect()
}

/// Node counts gathered by walking a filter, including the inside of groups.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct FilterStats {
    pub sequences: usize,
    pub factors: usize,
    pub terms: usize,
    pub negations: usize,
    pub restrictions: usize,
    pub comparisons: usize,
    pub functions: usize,
    pub members: usize,
}

impl FilterStats {
    pub fn collect(filter: &Filter) -> Self {
        let mut stats = FilterStats::default();
        match dsl::visit(filter, &mut stats) {
            Ok(()) => stats,
            Err(never) => match never {},
        }
    }
}

impl Visitor for FilterStats {
    type Error = Infallible;

    fn visit_sequence(&mut self, _sequence: &Sequence) -> Result<(), Infallible> {
        self.sequences += 1;
        Ok(())
    }

    fn visit_factor(&mut self, _factor: &Factor) -> Result<(), Infallible> {
        self.factors += 1;
        Ok(())
    }

    fn visit_term(&mut self, term: &Term) -> Result<(), Infallible> {
        self.terms += 1;
        if term.negate {
            self.negations += 1;
        }
        // Groups are not walked by the engine.
        if let Simple::Composite(composite) = &term.simple {
            composite.expression.accept(self)?;
        }
        Ok(())
    }

    fn visit_restriction(&mut self, restriction: &Restriction) -> Result<(), Infallible> {
        self.restrictions += 1;
        if !restriction.is_global() {
            self.comparisons += 1;
        }
        Ok(())
    }

    fn visit_function(&mut self, _function: &Function) -> Result<(), Infallible> {
        self.functions += 1;
        Ok(())
    }

    fn visit_member(&mut self, _member: &Member) -> Result<(), Infallible> {
        self.members += 1;
        Ok(())
    }
}

#[derive(Serialize)]
struct Report<'a> {
    expression: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    filter: Option<&'a Filter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stats: Option<FilterStats>,
}

/// Render one parsed filter in the requested format.
pub fn render(expression: &str, filter: &Filter, config: &AppConfig) -> Result<String> {
    let stats = config.stats.then(|| FilterStats::collect(filter));

    let rendered = match config.format {
        OutputFormat::Text => match &stats {
            Some(stats) => format!("{}\t{:?}", filter, stats),
            None => filter.to_string(),
        },
        OutputFormat::Ast => match &stats {
            Some(stats) => format!("{:#?}", stats),
            None => format!("{:#?}", filter),
        },
        OutputFormat::Json => {
            let report = Report {
                expression,
                filter: stats.is_none().then_some(filter),
                stats,
            };
            serde_json::to_string(&report).context("Output: Failed to encode JSON")?
        }
        OutputFormat::Yaml => {
            let report = Report {
                expression,
                filter: stats.is_none().then_some(filter),
                stats,
            };
            let yaml = serde_yaml::to_string(&report).context("Output: Failed to encode YAML")?;
            format!("---\n{}", yaml.trim_end())
        }
    };
    Ok(rendered)
}

/// Parse and print every expression. Returns the number that failed.
pub fn run(expressions: &[String], config: &AppConfig, out: &mut impl Write) -> Result<usize> {
    let parser = dsl::Parser::new(config.parser);
    tracing::info!(
        "Parsing {} expression(s) (max depth {})",
        expressions.len(),
        parser.config().max_depth
    );

    let start = std::time::Instant::now();
    let results = parse_all(&parser, expressions);
    let mut failed = 0;

    for (expression, result) in expressions.iter().zip(&results) {
        match result {
            Ok(filter) => {
                let rendered = render(expression, filter, config)?;
                writeln!(out, "{}", rendered).context("Output: Failed to write")?;
            }
            Err(e) => {
                failed += 1;
                tracing::error!("{:?}: {}", expression, e);
                tracing::info!("Partial tree: {}", e.partial());
            }
        }
    }

    tracing::info!(
        "Done! Parsed {} expression(s), {} failed, in {:.2}ms",
        expressions.len(),
        failed,
        start.elapsed().as_secs_f64() * 1000.0
    );
    Ok(failed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(format: OutputFormat, stats: bool) -> AppConfig {
        AppConfig {
            format,
            stats,
            ..AppConfig::default()
        }
    }

    fn run_to_string(expressions: &[&str], config: &AppConfig) -> (String, usize) {
        let expressions: Vec<String> = expressions.iter().map(|e| e.to_string()).collect();
        let mut out = Vec::new();
        let failed = run(&expressions, config, &mut out).unwrap();
        (String::from_utf8(out).unwrap(), failed)
    }

    #[test]
    fn test_stats_descend_into_groups() {
        let filter = dsl::parse("a = 1 AND NOT (b OR f(c)) d:e").unwrap();
        assert_eq!(
            FilterStats::collect(&filter),
            FilterStats {
                sequences: 3,
                factors: 4,
                terms: 5,
                negations: 1,
                restrictions: 4,
                comparisons: 2,
                functions: 1,
                members: 3,
            }
        );
    }

    #[test]
    fn test_text_output_is_canonical() {
        let (out, failed) = run_to_string(&["a=1   OR  b", "-x"], &config(OutputFormat::Text, false));
        assert_eq!(failed, 0);
        assert_eq!(out, "a = 1 OR b\nNOT x\n");
    }

    #[test]
    fn test_failures_are_counted_and_skipped() {
        let (out, failed) = run_to_string(&["a AND", "b"], &config(OutputFormat::Text, false));
        assert_eq!(failed, 1);
        assert_eq!(out, "b\n");
    }

    #[test]
    fn test_json_output() {
        let (out, _) = run_to_string(&["prod"], &config(OutputFormat::Json, false));
        let value: serde_json::Value = serde_json::from_str(out.trim()).unwrap();
        assert_eq!(value["expression"], "prod");
        assert_eq!(
            value["filter"]["expressions"][0]["sequences"][0]["factors"][0]["terms"][0]["simple"]
                ["restriction"]["comparable"]["member"]["value"]["text"],
            "prod"
        );
        assert!(value.get("stats").is_none());
    }

    #[test]
    fn test_json_stats_output() {
        let (out, _) = run_to_string(&["a b"], &config(OutputFormat::Json, true));
        let value: serde_json::Value = serde_json::from_str(out.trim()).unwrap();
        assert_eq!(value["stats"]["members"], 2);
        assert!(value.get("filter").is_none());
    }

    #[test]
    fn test_yaml_output() {
        let (out, _) = run_to_string(&["a:b"], &config(OutputFormat::Yaml, false));
        assert!(out.starts_with("---\n"));
        let value: serde_yaml::Value = serde_yaml::from_str(&out).unwrap();
        assert_eq!(value["expression"].as_str(), Some("a:b"));
    }

    #[test]
    fn test_parse_all_keeps_order() {
        let expressions: Vec<String> = (0..200).map(|i| format!("field{} = {}", i, i)).collect();
        let results = parse_all(&dsl::Parser::default(), &expressions);
        for (i, result) in results.iter().enumerate() {
            assert_eq!(result.as_ref().unwrap().to_string(), expressions[i]);
        }
    }

    #[test]
    fn test_hyphen_expressions_are_not_flags() {
        let cli = Cli::parse_from(["aipfilter", "--verbose", "-file:\".java\"", "-c"]);
        assert!(cli.verbose);
        assert!(cli.file.is_none());
        assert!(cli.config.is_none());
        assert_eq!(cli.expressions, vec!["-file:\".java\"", "-c"]);
    }

    #[test]
    fn test_cli_overrides_config() {
        let cli = Cli::parse_from(["aipfilter", "--format", "json", "--max-depth", "4", "x"]);
        let config = cli.apply(AppConfig::default());
        assert_eq!(config.format, OutputFormat::Json);
        assert_eq!(config.parser.max_depth, 4);
        assert!(!config.stats);
        assert_eq!(cli.expressions, vec!["x"]);
    }
}
