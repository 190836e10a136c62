pub mod dispatcher;
pub mod notifiers;
pub mod traits;

pub use dispatcher::{Dispatcher, MessageFormatter};
pub use traits::{NotificationMessage, NotificationResult, NotifierPlugin};
