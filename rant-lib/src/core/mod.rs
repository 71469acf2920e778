//! contains all important data structures

pub mod data;
pub use data::*;

pub mod program;
pub use program::*;

pub mod query;
pub use query::*;

pub mod scopes;
pub use scopes::*;

pub mod token;
pub use token::*;
