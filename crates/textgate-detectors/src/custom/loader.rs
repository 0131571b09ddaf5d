//! Custom detector script loading
//!
//! Loads a user-supplied Rhai script after it passes the static security
//! gate, runs its top-level registration statements with the injected
//! utility functions in scope, and harvests every eligible top-level
//! function into an immutable detector table with precomputed signature
//! metadata.

use crate::custom::sandbox;
use indexmap::IndexMap;
use parking_lot::RwLock;
use rhai::{Dynamic, Engine, AST};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use textgate_core::{Error, Result};
use textgate_telemetry::InstrumentSet;

/// Utility names injected into the script's scope; user functions with
/// these names are never registered as detectors.
pub const RESERVED_NAMES: &[&str] = &["declare_counter", "non_blocking"];

/// Upper bound on script operations per evaluation; a runaway detector
/// surfaces as an internal error instead of wedging the request thread.
const MAX_SCRIPT_OPERATIONS: u64 = 10_000_000;

const MAX_CALL_LEVELS: usize = 64;

/// Load-time metadata for one registered script function
#[derive(Debug, Clone)]
pub struct FunctionMeta {
    pub name: String,
    pub doc: String,
    pub params: Vec<String>,
    /// Has a parameter literally named `headers`
    pub wants_headers: bool,
    /// Has a parameter literally named `kwargs`
    pub wants_kwargs: bool,
}

/// A loaded custom-detector module: the engine and AST it runs in, the
/// registered function table, and the non-blocking defaults declared at
/// load time. Immutable after construction; reload means building a new
/// one from the file's current contents.
pub struct CustomModule {
    pub(crate) engine: Arc<Engine>,
    pub(crate) ast: Arc<AST>,
    pub(crate) functions: IndexMap<String, FunctionMeta>,
    pub(crate) non_blocking: HashMap<String, Dynamic>,
}

impl std::fmt::Debug for CustomModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CustomModule")
            .field("functions", &self.functions)
            .field("non_blocking", &self.non_blocking)
            .finish_non_exhaustive()
    }
}

impl CustomModule {
    pub fn functions(&self) -> &IndexMap<String, FunctionMeta> {
        &self.functions
    }
}

/// Load and register a custom detector module from a file on disk
pub fn load_module(path: impl AsRef<Path>, instruments: &InstrumentSet) -> Result<CustomModule> {
    let path = path.as_ref();
    let source = std::fs::read_to_string(path).map_err(|error| {
        Error::config(format!(
            "failed to read custom detectors file {}: {error}",
            path.display()
        ))
    })?;
    load_module_from_source(&source, instruments)
}

/// Load and register a custom detector module from source text
pub fn load_module_from_source(source: &str, instruments: &InstrumentSet) -> Result<CustomModule> {
    // static gate first: nothing below runs if any violation exists
    let issues = sandbox::static_code_analysis(source);
    if !issues.is_empty() {
        tracing::error!(
            count = issues.len(),
            "potential security issues inside the custom detectors file: {issues:?}"
        );
        return Err(Error::unsafe_code(issues));
    }

    let non_blocking: Arc<RwLock<HashMap<String, Dynamic>>> = Arc::new(RwLock::new(HashMap::new()));
    let engine = build_engine(instruments, &non_blocking);

    let ast = engine
        .compile(source)
        .map_err(|error| Error::internal(format!("custom detectors failed to compile: {error}")))?;

    // run top-level statements: declare_counter / non_blocking calls land
    // in the registration context captured by the injected utilities
    engine.run_ast(&ast).map_err(|error| {
        Error::config(format!("custom detectors failed to initialize: {error}"))
    })?;

    let mut functions = IndexMap::new();
    for meta in ast.iter_functions() {
        if meta.access == rhai::FnAccess::Private {
            continue;
        }
        let name = meta.name.to_string();
        if name.starts_with('_') || RESERVED_NAMES.contains(&name.as_str()) {
            continue;
        }
        let params: Vec<String> = meta.params.iter().map(|p| p.to_string()).collect();
        functions.insert(
            name.clone(),
            FunctionMeta {
                doc: doc_from_comments(&meta.comments),
                wants_headers: params.iter().any(|p| p == "headers"),
                wants_kwargs: params.iter().any(|p| p == "kwargs"),
                name,
                params,
            },
        );
    }

    // every registered function gets a zero-valued series up front
    for name in functions.keys() {
        instruments.ensure_series("custom", name);
    }

    tracing::info!(
        "Registered the following custom detectors: {:?}",
        functions.keys().collect::<Vec<_>>()
    );

    let non_blocking = non_blocking.read().clone();
    Ok(CustomModule {
        engine: Arc::new(engine),
        ast: Arc::new(ast),
        functions,
        non_blocking,
    })
}

/// Build the script engine with safety limits and the injected utilities
fn build_engine(
    instruments: &InstrumentSet,
    non_blocking: &Arc<RwLock<HashMap<String, Dynamic>>>,
) -> Engine {
    let mut engine = Engine::new();
    engine.set_max_operations(MAX_SCRIPT_OPERATIONS);
    engine.set_max_call_levels(MAX_CALL_LEVELS);

    {
        let instruments = instruments.clone();
        engine.register_fn("declare_counter", move |name: &str, help: &str| {
            instruments.declare_counter(name, help);
        });
    }
    {
        let instruments = instruments.clone();
        engine.register_fn("increment_counter", move |name: &str| {
            instruments.increment_counter(name, 1);
        });
    }
    {
        let instruments = instruments.clone();
        engine.register_fn("increment_counter", move |name: &str, amount: i64| {
            instruments.increment_counter(name, amount.max(0) as u64);
        });
    }
    {
        let non_blocking = Arc::clone(non_blocking);
        engine.register_fn("non_blocking", move |name: &str, default: Dynamic| {
            non_blocking.write().insert(name.to_string(), default);
        });
    }
    engine.register_fn("getenv", |name: &str| {
        std::env::var(name).unwrap_or_default()
    });

    engine
}

// "/// comment" and "/** comment */" markers stripped, lines joined
fn doc_from_comments(comments: &[&str]) -> String {
    comments
        .iter()
        .map(|comment| {
            comment
                .trim_start_matches("///")
                .trim_start_matches("/**")
                .trim_end_matches("*/")
                .trim()
        })
        .collect::<Vec<_>>()
        .join("\n")
}
