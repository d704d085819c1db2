pub mod activities;
pub mod locks;
pub mod trips;

pub use activities::ActivityRepository;
pub use locks::TripLocks;
pub use trips::TripRepository;
