pub mod cli;
pub mod inspect;
pub mod script;
pub mod simulate;
