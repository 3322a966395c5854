pub mod analytics;
pub mod navigation;
pub mod orders;
pub mod popout;
pub mod scheduler;
pub mod session;
pub mod store;
pub mod view;
