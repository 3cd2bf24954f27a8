pub mod events;
pub mod object;

pub use events::{DefaultFailureClassifier, EventsInformer, FailureClassifier};
pub use object::{Informer, ObjectEvent};
