pub mod capture;
pub mod remind;
pub mod contacts;
