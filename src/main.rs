//! `weft` is a command-line preprocessor that expands comment directives
//! (`import`, `ignore`, `if`/`else`, `foreach`, `var`) and `{{...}}` template
//! expressions embedded in text files.
//!
//! ### High-level structure:
//! 1. Arguments are parsed into a [`Config`].
//! 2. Variable files are loaded into a shared [`VariableStore`].
//! 3. Input paths (including glob patterns) are expanded and filtered
//!    through the whitelist/blacklist regexes.
//! 4. Each file is interpreted, optionally in parallel via `rayon`, sharing
//!    the `VariableStore` and a [`DependencyGraph`] across files.
//! 5. A file's output is only written once the whole file renders
//!    successfully; on error, nothing is written and the process exits
//!    nonzero.
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;

use log::{info, warn};
use rayon::prelude::*;
use regex::Regex;

use weft::config::{Config, LineEnding};
use weft::dependency::DependencyGraph;
use weft::directive;
use weft::error::WeftError;
use weft::interpreter::Interpreter;
use weft::variable::{Registry, VariableStore};

/// Print the given error message and exit the program.
///
/// Despite the header, this function does not return anything. It always
/// calls `std::process::exit(1)`. This lets it be used directly as the error
/// arm of an `unwrap_or_else`.
fn die(message: &str) -> ! {
	if message.starts_with("weft:") {
		eprintln!("{message}");
	} else {
		eprintln!("weft: {message}");
	}
	std::process::exit(1);
}

/// Loads one `--var-file` into the global registry, sub-keyed by basename.
/// Best-effort: a missing file or a line that fails tolerant parsing is
/// logged and skipped rather than aborting the whole run.
fn load_var_file(store: &VariableStore, path: &str) {
	let basename = Path::new(path).file_name().map(|s| s.to_string_lossy().to_string()).unwrap_or_else(|| path.to_string());
	let content = match fs::read_to_string(path) {
		Ok(c) => c,
		Err(e) => {
			warn!("var-file '{path}' could not be read: {e}");
			return;
		}
	};
	for (offset, line) in content.lines().enumerate() {
		let trimmed = line.trim();
		if trimmed.is_empty() || trimmed.starts_with('#') {
			continue;
		}
		let var = VariableStore::parse_declaration(trimmed);
		if var.is_empty() {
			warn!("{path}:{}: skipping malformed variable declaration", offset + 1);
			continue;
		}
		store.set(Registry::Global, &basename, var);
	}
}

fn expand_inputs(patterns: &[String]) -> Result<Vec<PathBuf>, String> {
	let mut out = Vec::new();
	for pattern in patterns {
		if Path::new(pattern).exists() {
			out.push(PathBuf::from(pattern));
			continue;
		}
		let mut matched = false;
		let entries = glob::glob(pattern).map_err(|e| format!("invalid glob pattern '{pattern}': {e}"))?;
		for entry in entries {
			out.push(entry.map_err(|e| format!("glob error: {e}"))?);
			matched = true;
		}
		if !matched {
			return Err(format!("no files matched '{pattern}'"));
		}
	}
	Ok(out)
}

fn compile_patterns(patterns: &[String]) -> Result<Vec<Regex>, String> {
	patterns.iter().map(|p| Regex::new(p).map_err(|e| format!("invalid regex '{p}': {e}"))).collect()
}

fn passes_filters(path: &Path, whitelist: &[Regex], blacklist: &[Regex]) -> bool {
	let text = path.to_string_lossy();
	if !whitelist.is_empty() && !whitelist.iter().any(|re| re.is_match(&text)) {
		return false;
	}
	!blacklist.iter().any(|re| re.is_match(&text))
}

fn output_path(cfg: &Config, input: &Path) -> PathBuf {
	match &cfg.output {
		Some(dest) if cfg.inputs.len() > 1 => Path::new(dest).join(input.file_name().unwrap_or_default()),
		Some(dest) => PathBuf::from(dest),
		None => input.to_path_buf(),
	}
}

fn run_one(store: &VariableStore, graph: &DependencyGraph, prefixes: &[String], cfg: &Config, path: &Path) -> Result<(), String> {
	let file = path.to_string_lossy().to_string();
	let content = fs::read_to_string(path).map_err(|e| format!("weft: {file}: {e}"))?;

	let interpreter = Interpreter::new(store, graph, prefixes.to_vec(), cfg.preserve_indent);
	let loader = |p: &str| fs::read_to_string(p).map_err(WeftError::from);

	let start = Instant::now();

	if cfg.check {
		interpreter.preflight_imports(&file, &content, &loader).map_err(|e| format!("weft: {e}"))?;
		info!("{file}: no import cycle detected");
		return Ok(());
	}

	let rendered = interpreter.run(&file, &content, &loader).map_err(|e| format!("weft: {e}"))?;

	let ending = cfg.line_ending.unwrap_or(LineEnding::Lf).as_str();
	let mut body = rendered.replace('\n', ending);
	body.push_str(ending);
	let dest = output_path(cfg, path);
	fs::write(&dest, body).map_err(|e| format!("weft: {}: {e}", dest.display()))?;

	if cfg.stats {
		info!("{file}: rendered in {:?}", start.elapsed());
	}
	Ok(())
}

fn main() -> ExitCode {
	let cfg = Config::parse().unwrap_or_else(|e| die(&e));

	let default_level = if cfg.trace {
		"trace"
	} else if cfg.verbose {
		"info"
	} else {
		"warn"
	};
	env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level)).init();

	let store = VariableStore::new();
	for var_file in &cfg.var_files {
		load_var_file(&store, var_file);
	}

	let whitelist = compile_patterns(&cfg.whitelist).unwrap_or_else(|e| die(&e));
	let blacklist = compile_patterns(&cfg.blacklist).unwrap_or_else(|e| die(&e));
	let inputs = expand_inputs(&cfg.inputs).unwrap_or_else(|e| die(&e));
	let inputs: Vec<PathBuf> = inputs.into_iter().filter(|p| passes_filters(p, &whitelist, &blacklist)).collect();
	if inputs.is_empty() {
		die("no input files survived whitelist/blacklist filtering");
	}

	let prefixes = if cfg.prefixes.is_empty() { directive::default_prefixes("weft") } else { cfg.prefixes.clone() };
	let graph = DependencyGraph::new();

	let errors: Vec<String> = if cfg.serial {
		inputs.iter().filter_map(|path| run_one(&store, &graph, &prefixes, &cfg, path).err()).collect()
	} else {
		inputs.par_iter().filter_map(|path| run_one(&store, &graph, &prefixes, &cfg, path).err()).collect()
	};

	if errors.is_empty() {
		ExitCode::SUCCESS
	} else {
		for err in &errors {
			eprintln!("{err}");
		}
		ExitCode::FAILURE
	}
}
