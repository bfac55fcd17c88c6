use crate::channel::{
  EventName, InsecureReport, ListenerId, Notification, NotificationChannel,
};
use crate::error::{SecureError, SecurityError};
use crate::exports::problems_to_value;
use crate::guard::{self, GuardConfig};
use crate::host::object::ObjectRef;
use crate::host::value::Value;
use crate::host::HostGlobals;
use crate::observer::DynamicExecutionObserver;
use crate::problem::Problem;
use crate::restore::GlobalRestorer;
use crate::status::{ProtectionStatus, StatusBuilder};
use crate::stdlib::{self, LockState, ProblemHandler};
use parking_lot::Mutex;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, debug_span, warn};

/// Options for [`Secure::load_with_options`].
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct SecureOptions {
  /// Restore and lock `undefined`, `NaN`, `Infinity` and `isNaN`.
  pub restore_globals: bool,
  /// Replace `eval` with an observing accessor.
  pub observe_dynamic_execution: bool,
  /// Publish an `insecure` notification on the next tick when a status flag is false.
  pub report_insecure: bool,
}

impl Default for SecureOptions {
  fn default() -> Self {
    Self {
      restore_globals: true,
      observe_dynamic_execution: true,
      report_insecure: true,
    }
  }
}

struct SecureState {
  channel: Arc<NotificationChannel>,
  status: ProtectionStatus,
  lock: Mutex<LockState>,
}

/// The hardening layer loaded into a host.
///
/// Loading restores the guarded globals and starts observing `eval`; the remaining operations
/// only run when called. Clones share the same status, channel and lock state.
#[derive(Clone)]
pub struct Secure {
  inner: Arc<SecureState>,
}

impl std::fmt::Debug for Secure {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Secure")
      .field("status", &self.inner.status)
      .finish_non_exhaustive()
  }
}

impl Secure {
  pub fn load(host: &dyn HostGlobals) -> Self {
    Self::load_with_options(host, SecureOptions::default())
  }

  pub fn load_with_options(host: &dyn HostGlobals, options: SecureOptions) -> Self {
    let _span = debug_span!("secure_load").entered();
    let channel = Arc::new(NotificationChannel::new());
    let mut builder = StatusBuilder::new();
    if options.restore_globals {
      GlobalRestorer::new(host).run(&mut builder);
    }
    if options.observe_dynamic_execution {
      DynamicExecutionObserver::new(host, Arc::clone(&channel)).install(&mut builder);
    }
    let status = builder.freeze();

    let failures = status.failures();
    if failures.is_empty() {
      debug!("all guarded globals are secure");
    } else {
      for key in &failures {
        warn!(flag = key.as_str(), "global binding is not secure");
      }
      if options.report_insecure {
        let channel = Arc::clone(&channel);
        host.defer(Box::new(move |host: &dyn HostGlobals| {
          channel.emit(
            host,
            &Notification::Insecure(InsecureReport::FailedFlags(failures)),
          );
        }));
      }
    }

    Secure {
      inner: Arc::new(SecureState {
        channel,
        status,
        lock: Mutex::new(LockState::Armed),
      }),
    }
  }

  /// The frozen protection status recorded at load.
  pub fn status(&self) -> &ProtectionStatus {
    &self.inner.status
  }

  pub fn is_secure(&self) -> bool {
    self.inner.status.is_secure()
  }

  pub fn channel(&self) -> &Arc<NotificationChannel> {
    &self.inner.channel
  }

  pub fn on(
    &self,
    event: EventName,
    listener: impl Fn(&dyn HostGlobals, &Notification) + Send + Sync + 'static,
  ) -> ListenerId {
    self.inner.channel.on(event, listener)
  }

  pub fn once(
    &self,
    event: EventName,
    listener: impl Fn(&dyn HostGlobals, &Notification) + Send + Sync + 'static,
  ) -> ListenerId {
    self.inner.channel.once(event, listener)
  }

  pub fn unsubscribe(&self, event: EventName, id: ListenerId) -> bool {
    self.inner.channel.unsubscribe(event, id)
  }

  pub fn lock_state(&self) -> LockState {
    *self.inner.lock.lock()
  }

  /// Makes every own method of `target` non-writable. See [`guard::secure_methods`].
  ///
  /// Returns `target` for chaining. `on_problems` is called once when some member could not be
  /// protected.
  pub fn secure_methods(
    &self,
    target: &Value,
    config: &GuardConfig,
    on_problems: Option<&mut dyn FnMut(&[Problem])>,
  ) -> Result<Value, SecureError> {
    let object = expect_object(target)?;
    let outcome = guard::secure_methods(object, config);
    deliver_guard_problems(&outcome.problems, on_problems);
    Ok(target.clone())
  }

  /// Hides every own `_`-prefixed member of `target` from enumeration. See
  /// [`guard::secure_privates`].
  pub fn secure_privates(
    &self,
    target: &Value,
    config: &GuardConfig,
    on_problems: Option<&mut dyn FnMut(&[Problem])>,
  ) -> Result<Value, SecureError> {
    let object = expect_object(target)?;
    let outcome = guard::secure_privates(object, config);
    deliver_guard_problems(&outcome.problems, on_problems);
    Ok(target.clone())
  }

  /// Locks the methods of the standard library, once.
  ///
  /// The first call runs the pass and delivers its problems through `handler`. Every later call
  /// returns immediately without doing anything, whatever the first call reported.
  pub fn lock_standard_library(
    &self,
    host: &dyn HostGlobals,
    handler: ProblemHandler<'_>,
  ) -> Result<&Self, SecureError> {
    {
      let mut lock = self.inner.lock.lock();
      if *lock == LockState::Fired {
        debug!("standard library already locked");
        return Ok(self);
      }
      // Fired before the pass runs, so a listener calling back in gets the no-op.
      *lock = LockState::Fired;
    }

    let problems: Arc<[Problem]> = stdlib::lock_standard_library(host).into();
    if problems.is_empty() {
      return Ok(self);
    }
    match handler {
      ProblemHandler::Emit => {
        self.inner.channel.emit(
          host,
          &Notification::Insecure(InsecureReport::Problems(problems)),
        );
      }
      ProblemHandler::Fail => return Err(SecurityError::new(problems).into()),
      ProblemHandler::Callback(callback) => callback(&problems),
      ProblemHandler::Script(func) => {
        let payload = problems_to_value(host, &problems);
        host.call(&func, Value::Undefined, &[payload])?;
      }
    }
    Ok(self)
  }
}

fn expect_object(target: &Value) -> Result<&ObjectRef, SecureError> {
  match target {
    Value::Object(object) => Ok(object),
    Value::Null => Err(SecureError::invalid_argument("expected an object, got null")),
    other => Err(SecureError::invalid_argument(format_args!(
      "expected an object, got {}",
      other.type_of()
    ))),
  }
}

fn deliver_guard_problems(problems: &[Problem], on_problems: Option<&mut dyn FnMut(&[Problem])>) {
  if problems.is_empty() {
    return;
  }
  match on_problems {
    Some(callback) => callback(problems),
    None => debug!(count = problems.len(), "guard problems dropped, no callback"),
  }
}
