mod tick;

pub use tick::TickScheduler;
