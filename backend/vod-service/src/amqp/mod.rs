mod gateway;

pub use gateway::{
    AmqpGateway, Disposition, EventPublisher, MessageHandler, QueueError, Subscription,
};
