pub mod driver;
pub mod params;
pub mod target;
pub mod trigger;
pub mod verify;
