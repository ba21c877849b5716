pub mod doctor;
pub mod generate;
pub mod onboard;
pub mod providers;
