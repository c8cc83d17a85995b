pub mod command;
pub mod config;
pub mod exec_method;
pub mod path;
pub mod retry;
pub mod runner;
pub mod staging;

pub use self::{
    config::{Environment, InvocationConfig, ProcessEnvironment},
    exec_method::{Backend, ExecMethod},
    path::ResolvedPath,
    retry::RetryPolicy,
};
