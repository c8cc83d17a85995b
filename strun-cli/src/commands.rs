mod run;

pub use self::run::{Context, Outcome, RunError, run};
