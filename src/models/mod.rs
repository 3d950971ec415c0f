// Models module - domain records of the cancellation lifecycle

pub mod actor;
pub mod cancellation;
pub mod document;
pub mod subscription;

pub use actor::Actor;
pub use cancellation::{ApprovedCancellation, Cancellation, PendingCancellation};
pub use document::{DocumentName, DocumentReference, Namespace, ResolvedDocument};
pub use subscription::{PlanType, PlateSet, Subscription, SubscriptionStatus};
