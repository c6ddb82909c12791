//! Node identity and integrity CLI.
//!
//! Provides the `nodekey` binary for computing content-addressed node
//! identifiers, validating candidate nodes against the type hierarchy and
//! field rules, inspecting the registry and taxonomy, and checking query
//! scopes. Every command prints a JSON document to stdout; diagnostics go to
//! stderr through `tracing`.
//!
//! Configuration:
//! - `--registry <PATH>` / `NODEKEY_REGISTRY`: JSON registry table replacing
//!   the built-in one (`{"types": {"host": ["ip"], ...}}`).

use std::fs;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use clap::{ArgAction, Parser, Subcommand};
use serde_json::{json, Value};
use tracing::Level;

use nodekey_check::Validator;
use nodekey_core::{
    CanonicalId, CoreError, IdGenerator, MissionScope, Properties, Query, RegistryConfig, RunContext,
    Taxonomy, TypeRegistry,
};

const EXIT_REJECTED: i32 = 1;
const EXIT_BAD_INPUT: i32 = 2;
const EXIT_IO: i32 = 3;

/// Knowledge-graph node identity and integrity tools.
#[derive(Parser)]
#[command(name = "nodekey", about = "Knowledge-graph node identity and integrity tools")]
struct Cli {
    /// Registry table (JSON) to use instead of the built-in one.
    #[arg(long, env = "NODEKEY_REGISTRY", global = true)]
    registry: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Compute the identifier of a node.
    Id {
        /// Node type, e.g. `host`.
        #[arg(short = 't', long = "type")]
        node_type: String,

        /// Properties as a JSON object, or `@FILE` to read them from a file.
        #[arg(short, long)]
        props: String,
    },

    /// Check whether a node may be created.
    Validate {
        /// Node type, e.g. `port`.
        #[arg(short = 't', long = "type")]
        node_type: String,

        /// Properties as a JSON object, or `@FILE` to read them from a file.
        #[arg(short, long)]
        props: String,

        /// The node is created with a parent reference. When omitted, the
        /// parent reference field in the properties decides.
        #[arg(long)]
        has_parent: bool,
    },

    /// List registered node types and their identifying properties.
    Types,

    /// Show root types and parent relationships.
    Taxonomy,

    /// Validate a query scope and, given a run context, resolve it.
    Scope {
        /// current_run, same_mission or all (empty means all).
        #[arg(long, default_value = "")]
        scope: String,

        /// Mission name filter.
        #[arg(long)]
        mission_name: Option<String>,

        /// Explicit run-number filter.
        #[arg(long, allow_hyphen_values = true)]
        run_number: Option<i64>,

        /// Include run metadata in results.
        #[arg(long)]
        include_run_metadata: bool,

        /// Mission of the invoking run.
        #[arg(long)]
        current_mission: Option<String>,

        /// Run number of the invoking run.
        #[arg(long, allow_hyphen_values = true)]
        current_run: Option<i64>,
    },
}

/// Exit code plus the JSON document to print.
#[derive(Debug)]
struct Outcome {
    code: i32,
    output: Value,
}

impl Outcome {
    fn ok(output: Value) -> Self {
        Outcome { code: 0, output }
    }

    fn fail(code: i32, message: impl Into<String>) -> Self {
        let message = message.into();
        tracing::error!("{}", message);
        Outcome {
            code,
            output: json!({ "ok": false, "error": message }),
        }
    }
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let outcome = run(cli);
    let json = serde_json::to_string_pretty(&outcome.output).unwrap_or_else(|e| {
        format!("{{\"error\": \"failed to serialize result: {}\"}}", e)
    });
    println!("{}", json);
    process::exit(outcome.code);
}

fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: Cli) -> Outcome {
    // Only `id` and `types` read the registry.
    let registry_path = cli.registry.as_deref();

    match cli.command {
        Commands::Id { node_type, props } => {
            let registry = match load_registry(registry_path) {
                Ok(r) => Arc::new(r),
                Err(outcome) => return outcome,
            };
            match read_properties(&props) {
                Ok(props) => run_id(&IdGenerator::new(registry), &node_type, &props),
                Err(outcome) => outcome,
            }
        }
        Commands::Validate {
            node_type,
            props,
            has_parent,
        } => match read_properties(&props) {
            Ok(props) => run_validate(&Validator::standard(), &node_type, &props, has_parent),
            Err(outcome) => outcome,
        },
        Commands::Types => match load_registry(registry_path) {
            Ok(registry) => run_types(&registry),
            Err(outcome) => outcome,
        },
        Commands::Taxonomy => run_taxonomy(&Taxonomy::standard()),
        Commands::Scope {
            scope,
            mission_name,
            run_number,
            include_run_metadata,
            current_mission,
            current_run,
        } => {
            let scope = match scope.parse::<MissionScope>() {
                Ok(s) => s,
                Err(e) => return Outcome::fail(EXIT_REJECTED, e.to_string()),
            };
            let query = Query {
                mission_scope: scope,
                mission_name,
                run_number,
                include_run_metadata,
                ..Query::default()
            };
            let context = (current_mission.is_some() || current_run.is_some()).then(|| RunContext {
                mission_name: current_mission,
                run_number: current_run,
            });
            run_scope(&query, context.as_ref())
        }
    }
}

/// Loads the registry from `path`, or the built-in one when absent.
fn load_registry(path: Option<&Path>) -> Result<TypeRegistry, Outcome> {
    let Some(path) = path else {
        return Ok(TypeRegistry::standard());
    };
    let text = fs::read_to_string(path).map_err(|e| {
        Outcome::fail(EXIT_IO, format!("failed to read registry '{}': {}", path.display(), e))
    })?;
    let config: RegistryConfig = serde_json::from_str(&text).map_err(|e| {
        Outcome::fail(EXIT_BAD_INPUT, format!("invalid registry '{}': {}", path.display(), e))
    })?;
    let registry = TypeRegistry::from_config(&config)
        .map_err(|e| Outcome::fail(EXIT_BAD_INPUT, format!("invalid registry '{}': {}", path.display(), e)))?;
    tracing::info!(path = %path.display(), types = registry.len(), "loaded registry");
    Ok(registry)
}

/// Parses a JSON object argument, or reads it from a file for `@FILE`.
fn read_properties(arg: &str) -> Result<Properties, Outcome> {
    let text = match arg.strip_prefix('@') {
        Some(path) => fs::read_to_string(path)
            .map_err(|e| Outcome::fail(EXIT_IO, format!("failed to read '{}': {}", path, e)))?,
        None => arg.to_string(),
    };
    let value: Value = serde_json::from_str(&text)
        .map_err(|e| Outcome::fail(EXIT_BAD_INPUT, format!("invalid properties JSON: {}", e)))?;
    Properties::from_json(value)
        .ok_or_else(|| Outcome::fail(EXIT_BAD_INPUT, "properties must be a JSON object"))
}

fn run_id(generator: &IdGenerator, node_type: &str, props: &Properties) -> Outcome {
    let canonical = match generator.canonical_string(node_type, props) {
        Ok(c) => c,
        Err(e) => {
            let code = match e {
                CoreError::MissingIdentifyingProperties { .. } | CoreError::Canonicalization { .. } => {
                    EXIT_REJECTED
                }
                _ => EXIT_BAD_INPUT,
            };
            let mut outcome = Outcome::fail(code, e.to_string());
            if let CoreError::MissingIdentifyingProperties { missing, .. } = e {
                outcome.output["missing"] = json!(missing);
            }
            return outcome;
        }
    };
    let id = CanonicalId::from_canonical(node_type, &canonical);
    tracing::debug!(node_type, id = %id, "generated identifier");
    Outcome::ok(json!({ "ok": true, "id": id, "canonical": canonical }))
}

fn run_validate(validator: &Validator, node_type: &str, props: &Properties, has_parent: bool) -> Outcome {
    let result = if has_parent {
        validator.validate_node(node_type, props, true)
    } else {
        validator.validate_with_properties(node_type, props)
    };
    match result {
        Ok(()) => Outcome::ok(json!({ "ok": true, "node_type": node_type })),
        Err(err) => {
            tracing::warn!("{}", err);
            Outcome {
                code: EXIT_REJECTED,
                output: json!({
                    "ok": false,
                    "node_type": node_type,
                    "error": err.to_string(),
                    "violations": err.violations,
                }),
            }
        }
    }
}

fn run_types(registry: &TypeRegistry) -> Outcome {
    let types: serde_json::Map<String, Value> = registry
        .all_node_types()
        .into_iter()
        .filter_map(|t| {
            let props = registry.get_identifying_properties(&t).ok()?.to_vec();
            Some((t, json!(props)))
        })
        .collect();
    Outcome::ok(json!({ "types": types }))
}

fn run_taxonomy(taxonomy: &Taxonomy) -> Outcome {
    Outcome::ok(json!({
        "roots": taxonomy.root_types(),
        "relationships": taxonomy.relationships(),
    }))
}

fn run_scope(query: &Query, context: Option<&RunContext>) -> Outcome {
    if let Err(e) = query.validate() {
        return Outcome::fail(EXIT_REJECTED, e.to_string());
    }
    let Some(context) = context else {
        return Outcome::ok(json!({ "ok": true, "query": query }));
    };
    match query.resolve(context) {
        Ok(filter) => Outcome::ok(json!({ "ok": true, "query": query, "filter": filter })),
        Err(e) => Outcome::fail(EXIT_REJECTED, e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn id_command_prints_id_and_canonical() {
        let props = read_properties(r#"{"ip": "10.0.0.1", "hostname": "x"}"#).unwrap();
        let outcome = run_id(&IdGenerator::standard(), "host", &props);
        assert_eq!(outcome.code, 0);
        assert_eq!(outcome.output["id"], "host:7GFL93dZcGubGnAF");
        assert_eq!(outcome.output["canonical"], "host:ip=10.0.0.1");
    }

    #[test]
    fn id_command_lists_missing_properties() {
        let outcome = run_id(&IdGenerator::standard(), "host", &Properties::new());
        assert_eq!(outcome.code, EXIT_REJECTED);
        assert_eq!(outcome.output["missing"], json!(["ip"]));
    }

    #[test]
    fn id_command_unknown_type_is_bad_input() {
        let props = Properties::new().with("ip", "10.0.0.1");
        let outcome = run_id(&IdGenerator::standard(), "unknown_type", &props);
        assert_eq!(outcome.code, EXIT_BAD_INPUT);
    }

    #[test]
    fn properties_must_be_an_object() {
        assert_eq!(read_properties("[1, 2]").unwrap_err().code, EXIT_BAD_INPUT);
        assert_eq!(read_properties("{nope").unwrap_err().code, EXIT_BAD_INPUT);
        assert_eq!(read_properties("@/nonexistent/props.json").unwrap_err().code, EXIT_IO);
    }

    #[test]
    fn validate_command_reports_violations() {
        let props = read_properties(r#"{"number": 22, "protocol": "tcp"}"#).unwrap();
        let outcome = run_validate(&Validator::standard(), "port", &props, false);
        assert_eq!(outcome.code, EXIT_REJECTED);
        assert_eq!(outcome.output["violations"][0]["kind"], "parent_required");

        let outcome = run_validate(&Validator::standard(), "port", &props, true);
        assert_eq!(outcome.code, 0);
    }

    #[test]
    fn validate_command_rejects_foreign_parent_id() {
        let props =
            read_properties(r#"{"host_id": "domain:652KfmDGdzCge9o3", "number": 22, "protocol": "tcp"}"#)
                .unwrap();
        let outcome = run_validate(&Validator::standard(), "port", &props, false);
        assert_eq!(outcome.code, EXIT_REJECTED);
        assert_eq!(outcome.output["violations"][0]["field"], "host_id");
    }

    #[test]
    fn registry_is_loaded_only_by_commands_that_use_it() {
        let missing = "/nonexistent/registry.json";
        let taxonomy = Cli::try_parse_from(["nodekey", "--registry", missing, "taxonomy"]).unwrap();
        assert_eq!(run(taxonomy).code, 0);

        let scope = Cli::try_parse_from(["nodekey", "--registry", missing, "scope"]).unwrap();
        assert_eq!(run(scope).code, 0);

        let types = Cli::try_parse_from(["nodekey", "--registry", missing, "types"]).unwrap();
        assert_eq!(run(types).code, EXIT_IO);
    }

    #[test]
    fn types_command_is_sorted() {
        let outcome = run_types(&TypeRegistry::standard());
        let types = outcome.output["types"].as_object().unwrap();
        assert_eq!(types["port"], json!(["host_id", "number", "protocol"]));
    }

    #[test]
    fn taxonomy_command_lists_relationships() {
        let outcome = run_taxonomy(&Taxonomy::standard());
        let rels = outcome.output["relationships"].as_array().unwrap();
        assert!(rels.iter().any(|r| r["relationship"] == "HAS_PORT"));
    }

    #[test]
    fn scope_command() {
        let q = Query::default().with_mission_scope(MissionScope::SameMission);
        assert_eq!(run_scope(&q, None).code, EXIT_REJECTED);

        let named = q.with_mission_name("op");
        assert_eq!(run_scope(&named, None).code, 0);

        let current = Query::default().with_mission_scope(MissionScope::CurrentRun);
        let outcome = run_scope(&current, Some(&RunContext::new("op", 2)));
        assert_eq!(outcome.output["filter"]["kind"], "run");
        assert_eq!(outcome.output["filter"]["run_number"], 2);
    }

    #[test]
    fn parses_scope_subcommand() {
        let cli = Cli::try_parse_from([
            "nodekey", "scope", "--scope", "same_mission", "--mission-name", "op", "--run-number", "-1",
        ])
        .unwrap();
        match cli.command {
            Commands::Scope { run_number, .. } => assert_eq!(run_number, Some(-1)),
            _ => panic!("expected scope command"),
        }
    }
}
