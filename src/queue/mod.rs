pub mod store;
pub mod subscriber;

pub use store::{Delivery, JobQueue, QueueError};
pub use subscriber::PullSubscriber;
