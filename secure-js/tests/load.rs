use parking_lot::Mutex;
use secure_js::host::object::{native_fn, NativeFn, ObjectRef};
use secure_js::host::property::{PropertyDescriptor, PropertyDescriptorPatch, PropertyKind};
use secure_js::host::value::Value;
use secure_js::host::{CallerIdentity, DeferredJob, HostGlobals};
use secure_js::{
  EventName, GuardedGlobal, HostError, InsecureReport, Notification, Realm, Secure, SecureOptions,
  StatusKey,
};
use std::sync::Arc;

fn insecure_reports(secure: &Secure) -> Arc<Mutex<Vec<InsecureReport>>> {
  let reports = Arc::new(Mutex::new(Vec::new()));
  let sink = Arc::clone(&reports);
  secure.on(EventName::Insecure, move |_host, notification| {
    if let Notification::Insecure(report) = notification {
      sink.lock().push(report.clone());
    }
  });
  reports
}

#[test]
fn fresh_realm_is_fully_secured() {
  let realm = Realm::new();
  let secure = Secure::load(&realm);

  assert!(secure.is_secure());
  for (key, flag) in secure.status().iter() {
    assert!(flag, "{key}");
  }
  let global = realm.global();
  for guarded in [
    GuardedGlobal::Undefined,
    GuardedGlobal::NaN,
    GuardedGlobal::Infinity,
    GuardedGlobal::IsNaN,
  ] {
    let desc = global.get_own_property(guarded.binding()).unwrap();
    assert!(desc.is_locked(), "{}", guarded.binding());
    assert!(!desc.enumerable, "{}", guarded.binding());
  }
  // Nothing to report, so nothing is scheduled.
  assert_eq!(realm.pending_ticks(), 0);
}

#[test]
fn status_has_every_key_exactly_once() {
  let realm = Realm::new();
  let secure = Secure::load(&realm);
  let keys: Vec<&str> = secure.status().iter().map(|(key, _)| key.as_str()).collect();
  assert_eq!(
    keys,
    [
      "EVAL",
      "UNDEFINED_VALUE",
      "UNDEFINED_PROTECTION",
      "NAN_VALUE",
      "NAN_PROTECTION",
      "INFINITY_VALUE",
      "INFINITY_PROTECTION",
      "ISNAN_VALUE",
      "ISNAN_PROTECTION",
    ]
  );

  let json = serde_json::to_value(secure.status()).unwrap();
  let object = json.as_object().unwrap();
  assert_eq!(object.len(), StatusKey::ALL.len());
  assert!(object.values().all(|flag| flag.is_boolean()));
}

#[test]
fn overwritten_sentinels_are_restored() -> Result<(), HostError> {
  let realm = Realm::new();
  let global = realm.global();
  realm.put(&global, "undefined", Value::Number(1.0))?;
  realm.put(&global, "NaN", Value::string("not a number"))?;
  realm.put(&global, "Infinity", Value::Number(0.0))?;

  let secure = Secure::load(&realm);
  assert!(secure.is_secure());
  assert_eq!(realm.get_global("undefined")?, Value::Undefined);
  assert!(matches!(realm.get_global("NaN")?, Value::Number(n) if n.is_nan()));
  assert_eq!(realm.get_global("Infinity")?, Value::Number(f64::INFINITY));

  // Later overwrites are ignored.
  assert!(!realm.put(&global, "undefined", Value::Number(2.0))?);
  assert_eq!(realm.get_global("undefined")?, Value::Undefined);
  Ok(())
}

#[test]
fn nan_locked_before_load_is_reported_on_the_next_tick() -> Result<(), HostError> {
  let realm = Realm::new();
  realm.global().define_property_or_throw(
    "NaN",
    PropertyDescriptorPatch {
      value: Some(Value::Number(42.0)),
      writable: Some(false),
      configurable: Some(false),
      ..Default::default()
    },
  )?;

  let secure = Secure::load(&realm);
  let status = secure.status();
  assert!(!status.get(StatusKey::NanProtection));
  assert!(!status.get(StatusKey::NanValue));
  assert!(status.get(StatusKey::UndefinedProtection));
  assert!(!secure.is_secure());
  // The binding was left alone.
  assert_eq!(realm.get_global("NaN")?, Value::Number(42.0));

  // Subscribing right after load still sees the startup report.
  let reports = insecure_reports(&secure);
  assert!(reports.lock().is_empty());
  assert_eq!(realm.run_next_tick(), 1);

  let reports = reports.lock();
  assert_eq!(reports.len(), 1);
  let InsecureReport::FailedFlags(flags) = &reports[0] else {
    panic!("expected failed flags, got {:?}", reports[0]);
  };
  assert!(flags.contains(&StatusKey::NanProtection));
  assert!(flags.contains(&StatusKey::NanValue));
  assert_eq!(flags.len(), 2);
  Ok(())
}

#[test]
fn broken_is_nan_is_replaced() -> Result<(), HostError> {
  let realm = Realm::new();
  let broken = realm.alloc_function(
    "isNaN",
    native_fn(|_host, _this, _args| Ok(Value::Bool(false))),
  );
  realm.put(&realm.global(), "isNaN", Value::Object(broken.clone()))?;

  let secure = Secure::load(&realm);
  assert!(secure.status().get(StatusKey::IsNanValue));
  assert!(secure.status().get(StatusKey::IsNanProtection));

  let current = realm.get_global("isNaN")?;
  assert_ne!(current, Value::Object(broken));
  assert_eq!(realm.call_global("isNaN", &[Value::string("x")])?, Value::Bool(true));
  assert_eq!(realm.call_global("isNaN", &[Value::Number(1.0)])?, Value::Bool(false));
  assert_eq!(realm.call_global("isNaN", &[Value::string("7")])?, Value::Bool(false));
  Ok(())
}

#[test]
fn non_function_is_nan_is_replaced() -> Result<(), HostError> {
  let realm = Realm::new();
  realm.put(&realm.global(), "isNaN", Value::Null)?;

  let secure = Secure::load(&realm);
  assert!(secure.is_secure());
  assert_eq!(realm.call_global("isNaN", &[Value::Undefined])?, Value::Bool(true));
  Ok(())
}

#[test]
fn working_is_nan_is_kept() -> Result<(), HostError> {
  let realm = Realm::new();
  let original = realm.get_global("isNaN")?;
  Secure::load(&realm);
  assert_eq!(realm.get_global("isNaN")?, original);
  Ok(())
}

#[test]
fn is_secure_is_the_conjunction_of_the_flags() {
  let realm = Realm::new();
  realm
    .global()
    .define_property_or_throw("Infinity", PropertyDescriptorPatch::frozen_value(Value::Number(1.0)))
    .unwrap();
  let secure = Secure::load(&realm);
  let status = secure.status();
  assert_eq!(secure.is_secure(), status.iter().all(|(_, flag)| flag));
  assert_eq!(
    status.failures(),
    vec![StatusKey::InfinityValue, StatusKey::InfinityProtection]
  );
}

#[test]
fn restoration_can_be_disabled() -> Result<(), HostError> {
  let realm = Realm::new();
  realm.put(&realm.global(), "undefined", Value::Number(1.0))?;
  let secure = Secure::load_with_options(
    &realm,
    SecureOptions {
      restore_globals: false,
      ..Default::default()
    },
  );
  assert!(secure.status().get(StatusKey::Eval));
  assert!(!secure.status().get(StatusKey::UndefinedValue));
  assert_eq!(realm.get_global("undefined")?, Value::Number(1.0));
  assert_eq!(realm.pending_ticks(), 1);
  Ok(())
}

#[test]
fn insecure_report_can_be_disabled() {
  let realm = Realm::new();
  realm
    .global()
    .define_property_or_throw("NaN", PropertyDescriptorPatch::frozen_value(Value::Number(0.0)))
    .unwrap();
  let secure = Secure::load_with_options(
    &realm,
    SecureOptions {
      report_insecure: false,
      ..Default::default()
    },
  );
  assert!(!secure.is_secure());
  assert_eq!(realm.pending_ticks(), 0);
}

#[test]
fn options_deserialize_with_defaults() {
  let options: SecureOptions = serde_json::from_str(r#"{"report_insecure": false}"#).unwrap();
  assert!(options.restore_globals);
  assert!(options.observe_dynamic_execution);
  assert!(!options.report_insecure);
  assert!(serde_json::from_str::<SecureOptions>(r#"{"bogus": 1}"#).is_err());
}

/// A minimal host: a bare global object with only the sentinel bindings (no `isNaN`, no
/// `eval`) and a job list instead of a scheduler.
struct BareHost {
  global: ObjectRef,
  jobs: Mutex<Vec<DeferredJob>>,
}

impl BareHost {
  fn new() -> Self {
    let global = ObjectRef::new(None);
    let legacy = |value| PropertyDescriptor::data(value, true, false, true);
    global.define_property("undefined", legacy(Value::Null));
    global.define_property("NaN", legacy(Value::Number(f64::NAN)));
    global.define_property("Infinity", legacy(Value::Number(f64::INFINITY)));
    Self {
      global,
      jobs: Mutex::new(Vec::new()),
    }
  }
}

impl HostGlobals for BareHost {
  fn global(&self) -> ObjectRef {
    self.global.clone()
  }

  fn get(&self, object: &ObjectRef, key: &str) -> Result<Value, HostError> {
    match object.get_own_property(key).map(|desc| desc.kind) {
      Some(PropertyKind::Data { value, .. }) => Ok(value),
      Some(PropertyKind::Accessor { get, .. }) => self.call(&get, Value::Object(object.clone()), &[]),
      None => Ok(Value::Undefined),
    }
  }

  fn call(&self, callee: &Value, this: Value, args: &[Value]) -> Result<Value, HostError> {
    let call = callee
      .as_object()
      .and_then(ObjectRef::native_call)
      .ok_or_else(|| HostError::TypeError("not a function".to_string()))?;
    call(self, this, args)
  }

  fn caller(&self) -> Option<CallerIdentity> {
    None
  }

  fn defer(&self, job: DeferredJob) {
    self.jobs.lock().push(job);
  }

  fn alloc_object(&self) -> ObjectRef {
    ObjectRef::new(None)
  }

  fn alloc_function(&self, name: &str, call: NativeFn) -> ObjectRef {
    ObjectRef::new_function(name, None, call)
  }
}

#[test]
fn load_works_against_any_host() {
  let host = BareHost::new();
  let secure = Secure::load(&host);

  let status = secure.status();
  assert!(status.get(StatusKey::UndefinedValue));
  assert!(status.get(StatusKey::NanValue));
  // `isNaN` was missing, so a replacement was installed and locked.
  assert!(status.get(StatusKey::IsNanValue));
  assert!(status.get(StatusKey::IsNanProtection));
  // No `eval` to observe.
  assert!(!status.get(StatusKey::Eval));
  assert_eq!(status.failures(), vec![StatusKey::Eval]);

  let jobs = std::mem::take(&mut *host.jobs.lock());
  assert_eq!(jobs.len(), 1);
  let seen = Arc::new(Mutex::new(Vec::new()));
  let sink = Arc::clone(&seen);
  secure.on(EventName::Insecure, move |_host, notification| {
    sink.lock().push(notification.clone());
  });
  for job in jobs {
    job(&host);
  }
  assert_eq!(
    *seen.lock(),
    vec![Notification::Insecure(InsecureReport::FailedFlags(vec![StatusKey::Eval]))]
  );
}
