pub mod push_subscription;
pub mod reminder_delivery;
pub mod task;
pub mod task_event;

pub use push_subscription::PushSubscriptionRepository;
pub use reminder_delivery::ReminderDeliveryRepository;
pub use task::TaskRepository;
pub use task_event::TaskEventRepository;
