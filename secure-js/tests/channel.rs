use parking_lot::Mutex;
use secure_js::host::HostGlobals;
use secure_js::{
  EventName, InsecureReport, Notification, NotificationChannel, Realm, SecureError, StatusKey,
};
use std::sync::Arc;

fn insecure() -> Notification {
  Notification::Insecure(InsecureReport::FailedFlags(vec![StatusKey::Eval]))
}

#[test]
fn listeners_run_in_registration_order() {
  let realm = Realm::new();
  let channel = NotificationChannel::new();
  let order = Arc::new(Mutex::new(Vec::new()));
  for label in ["a", "b", "c"] {
    let order = Arc::clone(&order);
    channel.on(EventName::Insecure, move |_host, _notification| {
      order.lock().push(label);
    });
  }

  assert_eq!(channel.emit(&realm, &insecure()), 3);
  assert_eq!(*order.lock(), ["a", "b", "c"]);
}

#[test]
fn events_only_reach_their_own_listeners() {
  let realm = Realm::new();
  let channel = NotificationChannel::new();
  let seen = Arc::new(Mutex::new(0));
  let sink = Arc::clone(&seen);
  channel.on(EventName::DynamicExecution, move |_host, _notification| {
    *sink.lock() += 1;
  });

  assert_eq!(channel.emit(&realm, &insecure()), 0);
  assert_eq!(*seen.lock(), 0);
  assert_eq!(
    channel.emit(&realm, &Notification::DynamicExecution(None)),
    1
  );
  assert_eq!(*seen.lock(), 1);
}

#[test]
fn once_listeners_fire_a_single_time() {
  let realm = Realm::new();
  let channel = NotificationChannel::new();
  let count = Arc::new(Mutex::new(0));
  let sink = Arc::clone(&count);
  channel.once(EventName::Insecure, move |_host, _notification| {
    *sink.lock() += 1;
  });
  assert_eq!(channel.listener_count(EventName::Insecure), 1);

  channel.emit(&realm, &insecure());
  channel.emit(&realm, &insecure());
  assert_eq!(*count.lock(), 1);
  assert_eq!(channel.listener_count(EventName::Insecure), 0);
}

#[test]
fn unsubscribed_listeners_stop_receiving() {
  let realm = Realm::new();
  let channel = NotificationChannel::new();
  let count = Arc::new(Mutex::new(0));
  let sink = Arc::clone(&count);
  let id = channel.on(EventName::Insecure, move |_host, _notification| {
    *sink.lock() += 1;
  });

  channel.emit(&realm, &insecure());
  assert!(channel.unsubscribe(EventName::Insecure, id));
  channel.emit(&realm, &insecure());
  assert_eq!(*count.lock(), 1);

  // Already gone, or registered for another event.
  assert!(!channel.unsubscribe(EventName::Insecure, id));
  assert!(!channel.unsubscribe(EventName::DynamicExecution, id));
}

#[test]
fn listeners_added_during_delivery_wait_for_the_next_event() {
  let realm = Realm::new();
  let channel = Arc::new(NotificationChannel::new());
  let late_calls = Arc::new(Mutex::new(0));

  let registrar = Arc::clone(&channel);
  let late = Arc::clone(&late_calls);
  channel.once(EventName::Insecure, move |_host, _notification| {
    let late = Arc::clone(&late);
    registrar.on(EventName::Insecure, move |_host, _notification| {
      *late.lock() += 1;
    });
  });

  assert_eq!(channel.emit(&realm, &insecure()), 1);
  assert_eq!(*late_calls.lock(), 0);
  assert_eq!(channel.emit(&realm, &insecure()), 1);
  assert_eq!(*late_calls.lock(), 1);
}

#[test]
fn listeners_can_use_the_host() {
  let realm = Realm::new();
  let channel = NotificationChannel::new();
  let names = Arc::new(Mutex::new(Vec::new()));
  let sink = Arc::clone(&names);
  channel.on(EventName::DynamicExecution, move |host, _notification| {
    let global = host.global();
    let infinity = host.get(&global, "Infinity").unwrap();
    sink.lock().push(infinity);
  });

  channel.emit(&realm, &Notification::DynamicExecution(None));
  assert_eq!(
    *names.lock(),
    vec![secure_js::host::value::Value::Number(f64::INFINITY)]
  );
}

#[test]
fn event_names_parse_and_display() {
  for event in [EventName::DynamicExecution, EventName::Insecure] {
    assert_eq!(event.to_string().parse::<EventName>().unwrap(), event);
  }
  assert_eq!(EventName::DynamicExecution.to_string(), "dynamic-execution");
  let err = "tamper".parse::<EventName>().unwrap_err();
  assert!(matches!(err, SecureError::InvalidArgument(_)));
  assert_eq!(err.to_string(), "invalid argument: unknown event 'tamper'");
}

#[test]
fn notifications_know_their_event() {
  assert_eq!(insecure().event_name(), EventName::Insecure);
  assert_eq!(
    Notification::DynamicExecution(None).event_name(),
    EventName::DynamicExecution
  );
  let Notification::Insecure(report) = insecure() else {
    unreachable!();
  };
  assert_eq!(report.len(), 1);
  assert!(!report.is_empty());
}
