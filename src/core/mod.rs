pub mod currency;
pub mod error;
pub mod events;

pub use currency::Currency;
pub use error::{AppError, Result};
pub use events::{
    DomainEvent, EventDispatcher, EventDispatcherBuilder, EventLogSubscriber, EventName,
    EventSubscriber,
};
