use crate::error::SecureError;
use crate::host::{CallerIdentity, HostGlobals};
use crate::problem::Problem;
use crate::status::StatusKey;
use ahash::AHashMap;
use parking_lot::Mutex;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// The events published on a [`NotificationChannel`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventName {
  /// The dynamic-execution primitive was invoked.
  DynamicExecution,
  /// Something could not be protected.
  Insecure,
}

impl EventName {
  pub fn as_str(self) -> &'static str {
    match self {
      EventName::DynamicExecution => "dynamic-execution",
      EventName::Insecure => "insecure",
    }
  }
}

impl fmt::Display for EventName {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for EventName {
  type Err = SecureError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "dynamic-execution" => Ok(EventName::DynamicExecution),
      "insecure" => Ok(EventName::Insecure),
      other => Err(SecureError::invalid_argument(format_args!(
        "unknown event '{other}'"
      ))),
    }
  }
}

/// Payload of an `insecure` notification.
#[derive(Clone, Debug, PartialEq)]
pub enum InsecureReport {
  /// Status flags left unset by the load-time pass.
  FailedFlags(Vec<StatusKey>),
  /// Members a protection pass could not lock.
  Problems(Arc<[Problem]>),
}

impl InsecureReport {
  pub fn len(&self) -> usize {
    match self {
      InsecureReport::FailedFlags(flags) => flags.len(),
      InsecureReport::Problems(problems) => problems.len(),
    }
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Notification {
  /// The frame that read the dynamic-execution primitive (`None` for top-level code).
  DynamicExecution(Option<CallerIdentity>),
  Insecure(InsecureReport),
}

impl Notification {
  pub fn event_name(&self) -> EventName {
    match self {
      Notification::DynamicExecution(_) => EventName::DynamicExecution,
      Notification::Insecure(_) => EventName::Insecure,
    }
  }
}

pub type Listener = Arc<dyn Fn(&dyn HostGlobals, &Notification) + Send + Sync>;

/// Token returned by [`NotificationChannel::on`] and [`NotificationChannel::once`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

impl ListenerId {
  pub fn as_u64(self) -> u64 {
    self.0
  }

  pub fn from_u64(id: u64) -> Self {
    ListenerId(id)
  }
}

struct Subscription {
  id: ListenerId,
  listener: Listener,
  once: bool,
}

/// Synchronous publish/subscribe channel.
///
/// Listeners run on the emitting thread, in registration order. Listeners added while an event is
/// being delivered do not receive that event.
#[derive(Default)]
pub struct NotificationChannel {
  next_id: AtomicU64,
  subscriptions: Mutex<AHashMap<EventName, Vec<Subscription>>>,
}

impl NotificationChannel {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn on(
    &self,
    event: EventName,
    listener: impl Fn(&dyn HostGlobals, &Notification) + Send + Sync + 'static,
  ) -> ListenerId {
    self.subscribe(event, Arc::new(listener), false)
  }

  /// Like [`NotificationChannel::on`], but the listener is removed before its first delivery.
  pub fn once(
    &self,
    event: EventName,
    listener: impl Fn(&dyn HostGlobals, &Notification) + Send + Sync + 'static,
  ) -> ListenerId {
    self.subscribe(event, Arc::new(listener), true)
  }

  pub fn subscribe(&self, event: EventName, listener: Listener, once: bool) -> ListenerId {
    let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
    self
      .subscriptions
      .lock()
      .entry(event)
      .or_default()
      .push(Subscription { id, listener, once });
    id
  }

  /// Removes a listener. Returns whether it was registered.
  pub fn unsubscribe(&self, event: EventName, id: ListenerId) -> bool {
    let mut subscriptions = self.subscriptions.lock();
    let Some(list) = subscriptions.get_mut(&event) else {
      return false;
    };
    let before = list.len();
    list.retain(|s| s.id != id);
    list.len() != before
  }

  pub fn listener_count(&self, event: EventName) -> usize {
    self.subscriptions.lock().get(&event).map_or(0, Vec::len)
  }

  /// Delivers `notification` to the listeners of its event. Returns how many were called.
  pub fn emit(&self, host: &dyn HostGlobals, notification: &Notification) -> usize {
    let listeners: Vec<Listener> = {
      let mut subscriptions = self.subscriptions.lock();
      let Some(list) = subscriptions.get_mut(&notification.event_name()) else {
        return 0;
      };
      let listeners = list.iter().map(|s| s.listener.clone()).collect();
      list.retain(|s| !s.once);
      listeners
    };
    for listener in &listeners {
      listener(host, notification);
    }
    listeners.len()
  }
}
