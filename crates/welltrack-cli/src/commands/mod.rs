pub mod library;
pub mod run;
