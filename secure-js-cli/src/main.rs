use clap::Parser;
use parking_lot::Mutex;
use secure_js::host::object::ObjectRef;
use secure_js::host::property::PropertyDescriptorPatch;
use secure_js::host::value::Value;
use secure_js::host::HostGlobals;
use secure_js::{
  EventName, InsecureReport, Notification, Problem, ProblemHandler, ProtectionStatus, Realm,
  RealmOptions, Secure, SecureOptions, StatusKey,
};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::stdout;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::Level;
use tracing_subscriber::fmt::format::FmtSpan;

#[derive(Parser, Debug)]
#[command(
  author,
  version,
  about = "Load the hardening layer into a reference realm and report its protection status"
)]
struct Cli {
  /// JSON file with `realm` and `secure` option objects.
  #[arg(long)]
  config: Option<PathBuf>,

  /// Before loading, assign VALUE to the global NAME (plain assignment).
  #[arg(long, value_name = "NAME=VALUE")]
  overwrite: Vec<String>,

  /// Before loading, redefine the global NAME as a non-writable, non-configurable VALUE.
  #[arg(long, value_name = "NAME=VALUE")]
  tamper: Vec<String>,

  /// Before locking, make a standard-library member non-writable and non-configurable
  /// (e.g. `Date.prototype.getTime`).
  #[arg(long, value_name = "PATH")]
  prelock: Vec<String>,

  /// Lock the standard library after loading.
  #[arg(long)]
  lock_stdlib: bool,

  /// Call `eval` with SOURCE after loading.
  #[arg(long = "eval", value_name = "SOURCE")]
  evals: Vec<String>,

  /// Exit with a failure status when the realm is not secure or some member was not locked.
  #[arg(long)]
  strict: bool,

  /// Emit tracing spans and events as JSON to stderr.
  #[arg(long)]
  trace: bool,
}

#[derive(Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
struct Config {
  realm: RealmOptions,
  secure: SecureOptions,
}

#[derive(Serialize)]
struct Evaluation {
  source: String,
  #[serde(skip_serializing_if = "Option::is_none")]
  result: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  error: Option<String>,
}

#[derive(Serialize)]
struct Report {
  secure: bool,
  status: ProtectionStatus,
  insecure_flags: Vec<StatusKey>,
  problems: Vec<Problem>,
  /// Caller frame of each observed `eval` call (`null` at top level).
  dynamic_executions: Vec<Option<String>>,
  evaluations: Vec<Evaluation>,
}

#[derive(Default)]
struct Observed {
  insecure_flags: Vec<StatusKey>,
  problems: Vec<Problem>,
  dynamic_executions: Vec<Option<String>>,
}

fn main() -> ExitCode {
  let args = Cli::parse();
  init_tracing(args.trace);

  let config = match load_config(args.config.as_ref()) {
    Ok(config) => config,
    Err(err) => {
      eprintln!("{err}");
      return ExitCode::FAILURE;
    }
  };

  let realm = Realm::with_options(config.realm);
  if let Err(err) = prepare_realm(&realm, &args) {
    eprintln!("{err}");
    return ExitCode::FAILURE;
  }

  let secure = Secure::load_with_options(&realm, config.secure);
  let observed = Arc::new(Mutex::new(Observed::default()));
  {
    let observed = Arc::clone(&observed);
    secure.on(EventName::Insecure, move |_host, notification| {
      let mut observed = observed.lock();
      match notification {
        Notification::Insecure(InsecureReport::FailedFlags(flags)) => {
          observed.insecure_flags.extend(flags.iter().copied())
        }
        Notification::Insecure(InsecureReport::Problems(problems)) => {
          observed.problems.extend(problems.iter().cloned())
        }
        Notification::DynamicExecution(_) => {}
      }
    });
  }
  {
    let observed = Arc::clone(&observed);
    secure.on(EventName::DynamicExecution, move |_host, notification| {
      if let Notification::DynamicExecution(caller) = notification {
        let caller = caller.as_ref().map(|caller| caller.name.to_string());
        observed.lock().dynamic_executions.push(caller);
      }
    });
  }
  realm.run_next_tick();

  if args.lock_stdlib {
    let result = secure.lock_standard_library(
      &realm,
      ProblemHandler::callback(|problems| observed.lock().problems.extend(problems.iter().cloned())),
    );
    if let Err(err) = result {
      eprintln!("{err}");
      return ExitCode::FAILURE;
    }
  }

  let evaluations = args
    .evals
    .iter()
    .map(|source| {
      let outcome = realm.with_frame("secure-js", |realm| {
        realm.call_global("eval", &[Value::string(source.as_str())])
      });
      match outcome {
        Ok(value) => Evaluation {
          source: source.clone(),
          result: Some(value.to_js_string().to_string()),
          error: None,
        },
        Err(err) => Evaluation {
          source: source.clone(),
          result: None,
          error: Some(err.to_string()),
        },
      }
    })
    .collect();

  let observed = std::mem::take(&mut *observed.lock());
  let report = Report {
    secure: secure.is_secure(),
    status: secure.status().clone(),
    insecure_flags: observed.insecure_flags,
    problems: observed.problems,
    dynamic_executions: observed.dynamic_executions,
    evaluations,
  };
  if let Err(err) = serde_json::to_writer_pretty(stdout(), &report) {
    eprintln!("failed to write report: {err}");
    return ExitCode::FAILURE;
  }
  println!();

  if args.strict && (!report.secure || !report.problems.is_empty()) {
    return ExitCode::FAILURE;
  }
  ExitCode::SUCCESS
}

fn init_tracing(enabled: bool) {
  if !enabled {
    return;
  }
  let _ = tracing_subscriber::fmt()
    .with_span_events(FmtSpan::CLOSE)
    .with_max_level(Level::DEBUG)
    .json()
    .with_ansi(false)
    .with_writer(std::io::stderr)
    .try_init();
}

fn load_config(path: Option<&PathBuf>) -> Result<Config, String> {
  let Some(path) = path else {
    return Ok(Config::default());
  };
  let raw = fs::read_to_string(path)
    .map_err(|err| format!("failed to read config {}: {err}", path.display()))?;
  serde_json::from_str(&raw)
    .map_err(|err| format!("invalid config {}: {err}", path.display()))
}

fn prepare_realm(realm: &Realm, args: &Cli) -> Result<(), String> {
  let global = realm.global();
  for assignment in &args.overwrite {
    let (name, value) = parse_assignment(assignment)?;
    realm
      .put(&global, name, value)
      .map_err(|err| format!("failed to overwrite {name}: {err}"))?;
  }
  for assignment in &args.tamper {
    let (name, value) = parse_assignment(assignment)?;
    global
      .define_property_or_throw(name, locked_patch(Some(value)))
      .map_err(|err| format!("failed to tamper with {name}: {err}"))?;
  }
  for path in &args.prelock {
    let (holder, member) = resolve_member(realm, &global, path)?;
    holder
      .define_property_or_throw(member, locked_patch(None))
      .map_err(|err| format!("failed to lock {path}: {err}"))?;
  }
  Ok(())
}

fn locked_patch(value: Option<Value>) -> PropertyDescriptorPatch {
  PropertyDescriptorPatch {
    value,
    writable: Some(false),
    configurable: Some(false),
    ..Default::default()
  }
}

fn parse_assignment(raw: &str) -> Result<(&str, Value), String> {
  let Some((name, value)) = raw.split_once('=') else {
    return Err(format!("expected NAME=VALUE, got `{raw}`"));
  };
  if name.is_empty() {
    return Err(format!("missing binding name in `{raw}`"));
  }
  Ok((name, parse_value(value)))
}

fn parse_value(raw: &str) -> Value {
  match raw {
    "undefined" => Value::Undefined,
    "null" => Value::Null,
    "true" => Value::Bool(true),
    "false" => Value::Bool(false),
    "NaN" => Value::Number(f64::NAN),
    _ => match raw.parse::<f64>() {
      Ok(n) => Value::Number(n),
      Err(_) => Value::string(raw),
    },
  }
}

/// Resolves `A.b.c` to the object holding `c`.
fn resolve_member<'p>(
  realm: &Realm,
  global: &ObjectRef,
  path: &'p str,
) -> Result<(ObjectRef, &'p str), String> {
  let Some((holder_path, member)) = path.rsplit_once('.') else {
    return Ok((global.clone(), path));
  };
  let mut holder = global.clone();
  for segment in holder_path.split('.') {
    let next = realm
      .get(&holder, segment)
      .map_err(|err| format!("failed to resolve {path}: {err}"))?;
    let Value::Object(next) = next else {
      return Err(format!("{path}: `{segment}` is not an object"));
    };
    holder = next;
  }
  Ok((holder, member))
}
