//! Runtime hardening for a JavaScript realm whose globals and built-ins are mutable.
//!
//! Loading the layer into a host ([`Secure::load`]):
//! - restores `undefined`, `NaN`, `Infinity` and `isNaN` to their canonical values and locks them
//!   (non-writable, non-configurable), recording the outcome in a frozen [`ProtectionStatus`];
//! - replaces `eval` with an accessor that publishes a `dynamic-execution` notification for every
//!   call without changing what `eval` does;
//! - schedules an `insecure` notification for the next tick when some flag could not be set, so
//!   callers can subscribe right after loading.
//!
//! The other operations run only when asked:
//! - [`Secure::secure_methods`] / [`Secure::secure_privates`] protect a caller's own object;
//! - [`Secure::lock_standard_library`] locks the methods of the standard objects, once;
//! - [`Secure::install_exports`] exposes all of the above to scripts.
//!
//! Protection failures are never thrown at code that did not ask for them: they are collected as
//! [`Problem`]s and delivered to whichever destination the caller chose.
//!
//! The layer only talks to its host through [`host::HostGlobals`] and
//! [`host::ReflectableObject`]. [`host::realm::Realm`] is a complete in-process host.

pub mod channel;
pub mod error;
mod exports;
pub mod guard;
pub mod host;
mod observer;
pub mod problem;
mod restore;
mod secure;
pub mod status;
pub mod stdlib;

pub use crate::channel::EventName;
pub use crate::channel::InsecureReport;
pub use crate::channel::ListenerId;
pub use crate::channel::Notification;
pub use crate::channel::NotificationChannel;
pub use crate::error::HostError;
pub use crate::error::SecureError;
pub use crate::error::SecurityError;
pub use crate::guard::GuardConfig;
pub use crate::guard::GuardOutcome;
pub use crate::host::realm::Realm;
pub use crate::host::realm::RealmOptions;
pub use crate::observer::DYNAMIC_EXECUTION_BINDING;
pub use crate::problem::Problem;
pub use crate::problem::ProblemKind;
pub use crate::secure::Secure;
pub use crate::secure::SecureOptions;
pub use crate::status::GuardedGlobal;
pub use crate::status::ProtectionStatus;
pub use crate::status::StatusKey;
pub use crate::stdlib::LockState;
pub use crate::stdlib::ProblemHandler;
