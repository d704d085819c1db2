pub mod activity;
pub mod session;
pub mod time_of_day;
pub mod trip;
pub mod user;
